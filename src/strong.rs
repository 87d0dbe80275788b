//! `Strong<T>`: the owning handle.

use crate::block::{AdoptBlock, Anchor, BlockRef, StrongToken};
use crate::error::AllocError;
use crate::make;
use crate::tokens::StrongRefs;
use crate::weak::Weak;
use core::fmt;
use core::hash::{Hash, Hasher};
use core::marker::PhantomData;
use core::mem;
use core::ops::Deref;
use core::ptr::{self, NonNull};
use std::alloc;

/// Shared ownership of a payload. Cloning increments the block's strong
/// count; dropping the last clone releases the payload.
///
/// A handle may be empty. Empty handles hold no block, compare equal to each
/// other and report a `use_count` of zero.
pub struct Strong<T: ?Sized> {
    inner: Option<Anchor<T, StrongRefs>>,
    _owns: PhantomData<T>,
}

impl<T> Strong<T> {
    /// Allocate a block and construct `value` inside it.
    pub fn new(value: T) -> Self {
        make::make(value)
    }

    pub fn try_new(value: T) -> Result<Self, AllocError> {
        make::try_make(value)
    }
}

impl<T: ?Sized> Strong<T> {
    /// The empty handle.
    pub const fn empty() -> Self {
        Self {
            inner: None,
            _owns: PhantomData,
        }
    }

    pub(crate) fn from_parts(block: BlockRef, ptr: NonNull<T>, root: bool, token: StrongToken) -> Self {
        Self {
            inner: Some(Anchor {
                block,
                ptr,
                root,
                token,
            }),
            _owns: PhantomData,
        }
    }

    /// Adopt a boxed payload; dropping the last handle drops the box.
    pub fn from_box(b: Box<T>) -> Self {
        Self::try_from_box(b).unwrap_or_else(|e| alloc::handle_alloc_error(e.layout()))
    }

    /// Adopt a boxed payload. On failure the box has already been dropped.
    pub fn try_from_box(b: Box<T>) -> Result<Self, AllocError> {
        let ptr = NonNull::from(Box::leak(b));
        let deleter = |p: NonNull<T>| unsafe { drop_box(p) };
        // SAFETY: the pointer came from `Box::leak` and is rebuilt into a box
        // exactly once, by `drop_box`.
        unsafe { Self::try_from_raw_with(ptr, deleter) }
    }

    /// Adopt `ptr`, calling `deleter(ptr)` once the last strong handle is gone.
    ///
    /// # Safety
    /// `ptr` must be valid for reads and writes until `deleter` runs, and the
    /// handles must have exclusive access to the pointee for as long as the
    /// block exists: nothing else may read, write or destroy it.
    /// Anything `deleter` borrows must outlive every handle to the block.
    pub unsafe fn from_raw_with<D>(ptr: NonNull<T>, deleter: D) -> Self
    where
        D: FnOnce(NonNull<T>),
    {
        unsafe { Self::try_from_raw_with(ptr, deleter) }
            .unwrap_or_else(|e| alloc::handle_alloc_error(e.layout()))
    }

    /// Fallible [`Strong::from_raw_with`]. If the block cannot be allocated,
    /// `deleter(ptr)` runs before the error is returned.
    ///
    /// # Safety
    /// Same contract as [`Strong::from_raw_with`].
    pub unsafe fn try_from_raw_with<D>(ptr: NonNull<T>, deleter: D) -> Result<Self, AllocError>
    where
        D: FnOnce(NonNull<T>),
    {
        let (block, token) = AdoptBlock::allocate(ptr, deleter)?;
        Ok(Self::from_parts(block, ptr, true, token))
    }

    pub fn is_empty(&self) -> bool {
        self.inner.is_none()
    }

    /// Borrow the payload, or `None` for an empty handle.
    pub fn get(&self) -> Option<&T> {
        // SAFETY: the strong token keeps the payload alive for `&self`.
        self.inner.as_ref().map(|a| unsafe { a.ptr.as_ref() })
    }

    /// Mutable access when this is the only handle of any kind to the block
    /// and it points at the block's own payload. Handles made by `alias`,
    /// `project` or `map` always get `None`.
    pub fn get_mut(&mut self) -> Option<&mut T> {
        let a = self.inner.as_mut()?;
        let unique = unsafe { a.block.strong_count() == 1 && a.block.weak_count() == 0 };
        if a.root && unique {
            // SAFETY: no other handle can reach the payload while `&mut self` lives.
            Some(unsafe { a.ptr.as_mut() })
        } else {
            None
        }
    }

    /// The payload pointer this handle dereferences to.
    pub fn as_ptr(&self) -> Option<NonNull<T>> {
        self.inner.as_ref().map(|a| a.ptr)
    }

    /// Number of strong handles sharing this block; zero when empty.
    pub fn use_count(&self) -> usize {
        match &self.inner {
            Some(a) => unsafe { a.block.strong_count() },
            None => 0,
        }
    }

    /// Number of weak handles observing this block; zero when empty.
    pub fn weak_count(&self) -> usize {
        match &self.inner {
            Some(a) => unsafe { a.block.weak_count() },
            None => 0,
        }
    }

    /// True when both handles keep the same block alive, regardless of
    /// which payload each one points at.
    pub fn shares_owner<U: ?Sized>(&self, other: &Strong<U>) -> bool {
        self.block_addr() == other.block_addr()
    }

    pub(crate) fn block_addr(&self) -> *const () {
        self.inner.as_ref().map_or(ptr::null(), |a| a.block.addr())
    }

    fn addr(&self) -> *const () {
        self.inner
            .as_ref()
            .map_or(ptr::null(), |a| a.ptr.as_ptr() as *const ())
    }

    /// Payload address, plus the block address when the payload is
    /// zero-sized: separately adopted zero-sized boxes share one dangling
    /// address and are only told apart by their blocks.
    fn identity(&self) -> (*const (), *const ()) {
        match &self.inner {
            Some(a) => {
                let zero_sized = mem::size_of_val(unsafe { a.ptr.as_ref() }) == 0;
                let owner = if zero_sized { a.block.addr() } else { ptr::null() };
                (a.ptr.as_ptr() as *const (), owner)
            }
            None => (ptr::null(), ptr::null()),
        }
    }

    pub(crate) fn anchor(&self) -> Option<&Anchor<T, StrongRefs>> {
        self.inner.as_ref()
    }

    pub fn downgrade(&self) -> Weak<T> {
        Weak::from_strong(self)
    }

    /// Drop this handle's reference and leave it empty.
    pub fn reset(&mut self) {
        drop(mem::replace(self, Self::empty()));
    }

    /// Replace the current reference with ownership of `b`.
    pub fn reset_box(&mut self, b: Box<T>) {
        drop(mem::replace(self, Self::from_box(b)));
    }

    /// Replace the current reference with ownership of `ptr`.
    ///
    /// # Safety
    /// Same contract as [`Strong::from_raw_with`].
    pub unsafe fn reset_with<D>(&mut self, ptr: NonNull<T>, deleter: D)
    where
        D: FnOnce(NonNull<T>),
    {
        let next = unsafe { Self::from_raw_with(ptr, deleter) };
        drop(mem::replace(self, next));
    }

    pub fn swap(&mut self, other: &mut Self) {
        mem::swap(self, other);
    }

    /// Move the reference out, leaving this handle empty. No count changes.
    pub fn take(&mut self) -> Self {
        mem::replace(self, Self::empty())
    }
}

impl<T: ?Sized + 'static> Strong<T> {
    /// Aliasing constructor: share this handle's block but point at `ptr`.
    ///
    /// An empty handle yields an empty handle.
    ///
    /// # Safety
    /// `ptr` must stay valid for shared reads for as long as the block's
    /// payload is alive, e.g. because it points into that payload.
    pub unsafe fn alias<U: ?Sized>(&self, ptr: NonNull<U>) -> Strong<U> {
        match &self.inner {
            Some(a) => Strong::from_parts(a.block, ptr, false, unsafe { a.block.inc_strong() }),
            None => Strong::empty(),
        }
    }

    /// Safe aliasing: a new strong handle to a part of this payload that
    /// keeps the whole payload alive.
    pub fn project<U: ?Sized, F>(&self, f: F) -> Strong<U>
    where
        F: FnOnce(&T) -> &U,
    {
        match self.get() {
            // SAFETY: `f` returns a borrow of the payload, which lives as long
            // as any strong handle to the block.
            Some(v) => unsafe { self.alias(NonNull::from(f(v))) },
            None => Strong::empty(),
        }
    }

    /// Convert into a handle with a different view of the same payload,
    /// e.g. `|v| v as &dyn Trait`. The reference is moved, not counted again.
    pub fn map<U: ?Sized, F>(mut self, f: F) -> Strong<U>
    where
        F: FnOnce(&T) -> &U,
    {
        match self.inner.take() {
            Some(Anchor { block, ptr, token, .. }) => {
                let view = NonNull::from(f(unsafe { ptr.as_ref() }));
                Strong::from_parts(block, view, false, token)
            }
            None => Strong::empty(),
        }
    }
}

/// Default routine for adopted boxes.
///
/// # Safety
/// `p` came from `Box::leak`/`Box::into_raw` and is not used afterwards.
unsafe fn drop_box<T: ?Sized>(p: NonNull<T>) {
    drop(unsafe { Box::from_raw(p.as_ptr()) });
}

impl<T: ?Sized> Clone for Strong<T> {
    fn clone(&self) -> Self {
        match &self.inner {
            Some(a) => Self::from_parts(a.block, a.ptr, a.root, unsafe { a.block.inc_strong() }),
            None => Self::empty(),
        }
    }

    fn clone_from(&mut self, source: &Self) {
        if self.addr() == source.addr() && self.block_addr() == source.block_addr() {
            return;
        }
        *self = source.clone();
    }
}

impl<T: ?Sized> Drop for Strong<T> {
    fn drop(&mut self) {
        if let Some(Anchor { block, token, .. }) = self.inner.take() {
            unsafe { block.dec_strong(token) };
        }
    }
}

impl<T: ?Sized> Deref for Strong<T> {
    type Target = T;

    fn deref(&self) -> &T {
        match self.get() {
            Some(v) => v,
            None => panic!("dereferenced an empty Strong handle"),
        }
    }
}

impl<T: ?Sized> Default for Strong<T> {
    fn default() -> Self {
        Self::empty()
    }
}

impl<T> From<T> for Strong<T> {
    fn from(value: T) -> Self {
        Self::new(value)
    }
}

impl<T: ?Sized> From<Box<T>> for Strong<T> {
    fn from(b: Box<T>) -> Self {
        Self::from_box(b)
    }
}

/// Handles are equal when they point at the same payload address. Two
/// aliases into one block with different views are not equal. Zero-sized
/// payloads additionally have to share a block.
impl<T: ?Sized, U: ?Sized> PartialEq<Strong<U>> for Strong<T> {
    fn eq(&self, other: &Strong<U>) -> bool {
        self.identity() == other.identity()
    }
}

impl<T: ?Sized> Eq for Strong<T> {}

impl<T: ?Sized> Hash for Strong<T> {
    fn hash<H: Hasher>(&self, state: &mut H) {
        let (addr, owner) = self.identity();
        (addr as usize).hash(state);
        (owner as usize).hash(state);
    }
}

impl<T: ?Sized + fmt::Debug> fmt::Debug for Strong<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.get() {
            Some(v) => f.debug_tuple("Strong").field(&v).finish(),
            None => f.write_str("Strong(<empty>)"),
        }
    }
}

impl<T: ?Sized> fmt::Pointer for Strong<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Pointer::fmt(&self.addr(), f)
    }
}
