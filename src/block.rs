//! Control blocks: the counting state shared by every handle to one payload.
//!
//! A block is one heap allocation that starts with a type-erased [`Header`]
//! holding the strong and weak counters plus the two entry points that
//! differ between variants (`release` and `dealloc`). There are exactly two
//! variants:
//! - [`AdoptBlock`]: stores a pointer allocated elsewhere and the routine
//!   that destroys it.
//! - [`InlineBlock`]: stores the payload itself, constructed in place right
//!   after the block is allocated.
//!
//! Lifetime protocol
//! - strong reaches 0: the release hook runs, exactly once.
//! - strong and weak are both 0: the handle that performed the final
//!   decrement deallocates the block. The block never frees itself.
//!
//! Handles hold a [`BlockRef`] together with a token from the matching
//! counter; every unsafe method here assumes that pairing is intact.

use crate::error::AllocError;
use crate::tokens::{Count, Counter, StrongRefs, Token, WeakRefs};
use core::alloc::Layout;
use core::cell::UnsafeCell;
use core::mem::{self, ManuallyDrop, MaybeUninit};
use core::ptr::{self, NonNull};
use std::alloc;
use tracing::trace;

pub(crate) type StrongToken = Token<'static, Counter<StrongRefs>>;
pub(crate) type WeakToken = Token<'static, Counter<WeakRefs>>;

#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub(crate) enum BlockKind {
    Adopted,
    Inline,
}

/// Shared prefix of every block. Variants are `#[repr(C)]` with the header
/// first, so a `NonNull<Header>` can be cast back to the concrete block.
pub(crate) struct Header {
    strong: Counter<StrongRefs>,
    weak: Counter<WeakRefs>,
    kind: BlockKind,
    release: unsafe fn(NonNull<Header>),
    dealloc: unsafe fn(NonNull<Header>),
}

impl Header {
    fn new(
        kind: BlockKind,
        release: unsafe fn(NonNull<Header>),
        dealloc: unsafe fn(NonNull<Header>),
    ) -> Self {
        Self {
            strong: Counter::new(),
            weak: Counter::new(),
            kind,
            release,
            dealloc,
        }
    }
}

/// Untyped pointer to a live block.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub(crate) struct BlockRef(NonNull<Header>);

impl BlockRef {
    /// # Safety
    /// The block must not have been deallocated.
    #[inline]
    unsafe fn header<'a>(self) -> &'a Header {
        unsafe { self.0.as_ref() }
    }

    /// Address used for owner identity.
    #[inline]
    pub(crate) fn addr(self) -> *const () {
        self.0.as_ptr() as *const ()
    }

    /// # Safety
    /// The caller holds a token (strong or weak) for this block.
    #[inline]
    pub(crate) unsafe fn strong_count(self) -> usize {
        unsafe { self.header() }.strong.count()
    }

    /// # Safety
    /// The caller holds a token (strong or weak) for this block.
    #[inline]
    pub(crate) unsafe fn weak_count(self) -> usize {
        unsafe { self.header() }.weak.count()
    }

    /// # Safety
    /// The caller holds a strong token for this block.
    #[inline]
    pub(crate) unsafe fn inc_strong(self) -> StrongToken {
        unsafe { self.header() }.strong.get()
    }

    /// Promotion: succeeds only while the payload is alive.
    ///
    /// # Safety
    /// The caller holds a token (strong or weak) for this block.
    #[inline]
    pub(crate) unsafe fn try_inc_strong(self) -> Option<StrongToken> {
        unsafe { self.header() }.strong.try_get()
    }

    /// # Safety
    /// The caller holds a token (strong or weak) for this block.
    #[inline]
    pub(crate) unsafe fn inc_weak(self) -> WeakToken {
        unsafe { self.header() }.weak.get()
    }

    /// Return a strong token. Releases the payload when it was the last one
    /// and deallocates the block when no weak tokens remain either.
    ///
    /// # Safety
    /// `token` was minted by this block's strong counter.
    pub(crate) unsafe fn dec_strong(self, token: StrongToken) {
        let header = unsafe { self.header() };
        if !header.strong.put(token) {
            return;
        }
        // The payload's destructor may drop the last weak handle to this
        // block, so one weak unit pins it until the hook returns. The unit is
        // a bare count: an unwinding release leaks the block.
        mem::forget(header.weak.get());
        trace!(block = ?self.0, kind = ?header.kind, "releasing payload");
        unsafe { (header.release)(self.0) };
        if header.weak.put(Token::new()) {
            unsafe { self.dealloc() };
        }
    }

    /// Return a weak token. Deallocates the block when it was the last
    /// reference of any kind.
    ///
    /// # Safety
    /// `token` was minted by this block's weak counter.
    pub(crate) unsafe fn dec_weak(self, token: WeakToken) {
        let header = unsafe { self.header() };
        if header.weak.put(token) && header.strong.count() == 0 {
            unsafe { self.dealloc() };
        }
    }

    unsafe fn dealloc(self) {
        let header = unsafe { self.header() };
        trace!(block = ?self.0, kind = ?header.kind, "deallocating block");
        let dealloc = header.dealloc;
        unsafe { dealloc(self.0) }
    }
}

/// The pair every handle holds: the lifetime anchor, the (possibly
/// aliased) payload view, and the token proving one unit on the anchor.
///
/// `root` is set only when `ptr` is the pointer the block was created with,
/// which carries write permission. Views derived through a shared borrow
/// never do, so they must not hand out `&mut`.
pub(crate) struct Anchor<T: ?Sized, K> {
    pub(crate) block: BlockRef,
    pub(crate) ptr: NonNull<T>,
    pub(crate) root: bool,
    pub(crate) token: Token<'static, Counter<K>>,
}

fn allocate_raw<B>() -> Result<NonNull<B>, AllocError> {
    let layout = Layout::new::<B>();
    #[cfg(any(test, feature = "fault_injection"))]
    if crate::fault::take_failure() {
        return Err(AllocError::new(layout));
    }
    // SAFETY: every block embeds a `Header`, so the layout is never zero-sized.
    let raw = unsafe { alloc::alloc(layout) }.cast::<B>();
    NonNull::new(raw).ok_or(AllocError::new(layout))
}

/// # Safety
/// `ptr` came from `allocate_raw::<B>` and has not been freed.
unsafe fn free_raw<B>(ptr: NonNull<B>) {
    unsafe { alloc::dealloc(ptr.as_ptr().cast(), Layout::new::<B>()) }
}

/// Block for a payload allocated by the caller.
#[repr(C)]
pub(crate) struct AdoptBlock<T: ?Sized, D> {
    header: Header,
    ptr: NonNull<T>,
    deleter: UnsafeCell<ManuallyDrop<D>>,
}

impl<T: ?Sized, D: FnOnce(NonNull<T>)> AdoptBlock<T, D> {
    /// Allocate a block that owns `ptr`'s lifetime through `deleter`.
    ///
    /// On failure `deleter(ptr)` has already run: the pointer was adopted
    /// the moment it was passed in, so it must not leak.
    pub(crate) fn allocate(ptr: NonNull<T>, deleter: D) -> Result<(BlockRef, StrongToken), AllocError> {
        let raw = match allocate_raw::<Self>() {
            Ok(raw) => raw,
            Err(e) => {
                trace!(layout = ?e.layout(), "adoption failed, destroying adopted pointer");
                deleter(ptr);
                return Err(e);
            }
        };
        unsafe {
            raw.as_ptr().write(Self {
                header: Header::new(BlockKind::Adopted, Self::release, Self::dealloc),
                ptr,
                deleter: UnsafeCell::new(ManuallyDrop::new(deleter)),
            })
        };
        let block = BlockRef(raw.cast());
        trace!(block = ?block.0, size = mem::size_of::<Self>(), "allocated adopting block");
        let token = unsafe { block.header() }.strong.get();
        Ok((block, token))
    }

    unsafe fn release(header: NonNull<Header>) {
        let this = header.cast::<Self>().as_ptr();
        unsafe {
            let ptr = (*this).ptr;
            let deleter = ManuallyDrop::take(&mut *(*this).deleter.get());
            deleter(ptr);
        }
    }

    unsafe fn dealloc(header: NonNull<Header>) {
        // `release` already consumed the routine; the rest is plain data.
        unsafe { free_raw(header.cast::<Self>()) }
    }
}

/// Block with the payload stored inline, after the header.
#[repr(C)]
pub(crate) struct InlineBlock<T> {
    header: Header,
    value: UnsafeCell<MaybeUninit<T>>,
}

impl<T> InlineBlock<T> {
    /// Allocate the block, then construct the payload directly in its slot.
    ///
    /// If `init` panics the storage is freed and the panic propagates;
    /// nothing has been counted at that point.
    pub(crate) fn allocate_with<F>(init: F) -> Result<(BlockRef, NonNull<T>, StrongToken), AllocError>
    where
        F: FnOnce() -> T,
    {
        let raw = allocate_raw::<Self>()?;
        let this = raw.as_ptr();
        let guard = FreeOnUnwind(raw);
        let slot = unsafe { ptr::addr_of_mut!((*this).value) }.cast::<T>();
        unsafe { slot.write(init()) };
        mem::forget(guard);
        unsafe {
            ptr::addr_of_mut!((*this).header).write(Header::new(
                BlockKind::Inline,
                Self::release,
                Self::dealloc,
            ))
        };
        let block = BlockRef(raw.cast());
        trace!(block = ?block.0, size = mem::size_of::<Self>(), "allocated inline block");
        let token = unsafe { block.header() }.strong.get();
        // SAFETY: derived from a non-null allocation.
        let value = unsafe { NonNull::new_unchecked(slot) };
        Ok((block, value, token))
    }

    unsafe fn release(header: NonNull<Header>) {
        let this = header.cast::<Self>().as_ptr();
        // Destroy in place; the storage goes away with the block.
        unsafe { ptr::drop_in_place(ptr::addr_of_mut!((*this).value).cast::<T>()) }
    }

    unsafe fn dealloc(header: NonNull<Header>) {
        unsafe { free_raw(header.cast::<Self>()) }
    }
}

struct FreeOnUnwind<B>(NonNull<B>);

impl<B> Drop for FreeOnUnwind<B> {
    fn drop(&mut self) {
        unsafe { free_raw(self.0) }
    }
}
