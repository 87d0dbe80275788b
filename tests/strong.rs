// Strong handle test suite.
//
// Invariants exercised:
// - use_count() equals the number of live Strong handles on a block.
// - The payload is destroyed exactly once, when the last Strong goes.
// - Adopted pointers are destroyed through their routine, exactly once.
// - Empty handles behave as "no object" everywhere.
mod common;

use common::{init_tracing, Tracked};
use rc_block::{make, Strong};
use std::cell::Cell;
use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::ptr::NonNull;
use std::rc::Rc;

// Test: concrete copy/drop walk-through on a colocated payload.
// Verifies: counts after make, clone, and drop of the first handle.
#[test]
fn copy_then_drop_tracks_use_count() {
    init_tracing();
    let a = make(42);
    assert_eq!(a.use_count(), 1);
    let b = a.clone();
    assert_eq!(a.use_count(), 2);
    assert_eq!(b.use_count(), 2);
    drop(a);
    assert_eq!(b.use_count(), 1);
    assert_eq!(*b, 42);
}

// Test: single colocated handle going out of scope.
// Verifies: the payload destructor runs exactly once.
#[test]
fn sole_handle_drop_destroys_payload_once() {
    let (t, drops) = Tracked::new(1);
    {
        let s = make(t);
        assert_eq!(s.value, 1);
        assert_eq!(drops.get(), 0);
    }
    assert_eq!(drops.get(), 1);
}

// Test: moves transfer ownership without touching the count.
#[test]
fn move_and_take_do_not_count() {
    let (t, drops) = Tracked::new(2);
    let mut a = Strong::new(t);
    let b = a.take();
    assert!(a.is_empty());
    assert_eq!(a.use_count(), 0);
    assert_eq!(b.use_count(), 1);

    let c = b;
    assert_eq!(c.use_count(), 1);
    drop(a);
    assert_eq!(drops.get(), 0);
    drop(c);
    assert_eq!(drops.get(), 1);
}

// Test: adopted pointer with a routine that flags when it runs.
// Verifies: the routine runs once, on the last strong drop, and a weak
// handle that outlives it does not run it again.
#[test]
fn adopted_routine_runs_exactly_once() {
    let freed = Rc::new(Cell::new(0));
    let f = freed.clone();
    let raw = NonNull::from(Box::leak(Box::new(7u32)));
    let s = unsafe {
        Strong::from_raw_with(raw, move |p: NonNull<u32>| {
            f.set(f.get() + 1);
            drop(Box::from_raw(p.as_ptr()));
        })
    };
    assert_eq!(*s, 7);
    assert_eq!(s.as_ptr(), Some(raw));

    let w = s.downgrade();
    drop(s);
    assert_eq!(freed.get(), 1);
    assert!(w.lock().is_empty());
    drop(w);
    assert_eq!(freed.get(), 1);
}

// Test: default routine for adopted boxes, including unsized payloads.
#[test]
fn from_box_drops_box_contents() {
    let (t, drops) = Tracked::new(3);
    let s = Strong::from_box(Box::new(t));
    let s2 = s.clone();
    drop(s);
    assert_eq!(drops.get(), 0);
    drop(s2);
    assert_eq!(drops.get(), 1);

    let slice: Strong<[u8]> = Strong::from_box(vec![1u8, 2, 3].into_boxed_slice());
    assert_eq!(&*slice, &[1, 2, 3]);
    let text: Strong<str> = Box::<str>::from("adopted").into();
    assert_eq!(&*text, "adopted");
}

// Test: reset(p, d) round-trip.
// Verifies: the routine runs exactly once, when the handle is dropped.
#[test]
fn reset_with_then_drop_runs_routine_once() {
    let freed = Rc::new(Cell::new(0));
    let f = freed.clone();
    let mut s: Strong<i64> = Strong::empty();
    let raw = NonNull::from(Box::leak(Box::new(99i64)));
    unsafe {
        s.reset_with(raw, move |p: NonNull<i64>| {
            f.set(f.get() + 1);
            drop(Box::from_raw(p.as_ptr()));
        })
    };
    assert_eq!(*s, 99);
    assert_eq!(s.use_count(), 1);
    assert_eq!(freed.get(), 0);
    drop(s);
    assert_eq!(freed.get(), 1);
}

// Test: reset() on a non-empty handle.
// Verifies: one release, handle left empty; a second reset is a no-op.
#[test]
fn reset_releases_once_and_empties() {
    let (t, drops) = Tracked::new(4);
    let mut s = make(t);
    s.reset();
    assert!(s.is_empty());
    assert!(s.get().is_none());
    assert_eq!(drops.get(), 1);
    s.reset();
    assert_eq!(drops.get(), 1);
}

// Test: reset replaces an existing reference and releases the old one.
#[test]
fn reset_box_releases_previous() {
    let (t1, d1) = Tracked::new(5);
    let (t2, d2) = Tracked::new(6);
    let mut s = make(t1);
    let keep = s.clone();
    s.reset_box(Box::new(t2));
    assert_eq!(s.value, 6);
    assert_eq!(keep.use_count(), 1);
    assert_eq!(d1.get(), 0);
    drop(keep);
    assert_eq!(d1.get(), 1);
    drop(s);
    assert_eq!(d2.get(), 1);
}

// Test: empty handles.
#[test]
fn empty_handle_is_no_object() {
    let e: Strong<u8> = Strong::default();
    assert!(e.is_empty());
    assert_eq!(e.use_count(), 0);
    assert_eq!(e.weak_count(), 0);
    assert!(e.get().is_none());
    assert!(e.as_ptr().is_none());
    assert_eq!(e, Strong::<u8>::empty());
    assert!(e.clone().is_empty());
}

// Test: dereferencing an empty handle is never tolerated silently.
#[test]
#[should_panic(expected = "empty Strong")]
fn deref_of_empty_panics() {
    let e: Strong<u32> = Strong::empty();
    let v: u32 = *e;
    assert_eq!(v, 0);
}

// Test: equality and hashing follow the payload address.
#[test]
fn equality_and_hash_by_payload_address() {
    let a = make(10);
    let a2 = a.clone();
    let b = make(10);
    assert!(a == a2);
    assert!(a != b);

    let mut h1 = DefaultHasher::new();
    a.hash(&mut h1);
    let mut h2 = DefaultHasher::new();
    a2.hash(&mut h2);
    assert_eq!(h1.finish(), h2.finish());
}

// Test: clone_from acts as copy assignment and tolerates self-assignment.
#[test]
fn clone_from_assigns_and_releases_previous() {
    let (t, drops) = Tracked::new(7);
    let src = make(Tracked::new(1).0);
    let mut dst = make(t);
    dst.clone_from(&src);
    assert_eq!(drops.get(), 1);
    assert_eq!(src.use_count(), 2);

    let same = src.clone();
    let mut again = same.clone();
    again.clone_from(&same);
    assert_eq!(src.use_count(), 4);
}

// Test: swap exchanges references without counting.
#[test]
fn swap_exchanges_handles() {
    let mut a = make(1);
    let mut b = make(2);
    a.swap(&mut b);
    assert_eq!((*a, *b), (2, 1));
    assert_eq!(a.use_count(), 1);
    assert_eq!(b.use_count(), 1);
}
