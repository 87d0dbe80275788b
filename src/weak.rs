//! `Weak<T>`: the observing handle.

use crate::block::Anchor;
use crate::strong::Strong;
use crate::tokens::WeakRefs;
use core::fmt;
use core::marker::PhantomData;
use core::mem;
use core::ptr;

/// Non-owning observer of a block. It keeps the block's counters readable
/// after the payload is gone but never keeps the payload itself alive, and
/// cannot be dereferenced; use [`Weak::lock`] to obtain a [`Strong`].
pub struct Weak<T: ?Sized> {
    inner: Option<Anchor<T, WeakRefs>>,
    _observes: PhantomData<*const T>,
}

impl<T: ?Sized> Weak<T> {
    /// The empty weak handle; `lock` on it always fails.
    pub const fn new() -> Self {
        Self {
            inner: None,
            _observes: PhantomData,
        }
    }

    pub(crate) fn from_strong(strong: &Strong<T>) -> Self {
        match strong.anchor() {
            Some(a) => Self {
                inner: Some(Anchor {
                    block: a.block,
                    ptr: a.ptr,
                    root: a.root,
                    token: unsafe { a.block.inc_weak() },
                }),
                _observes: PhantomData,
            },
            None => Self::new(),
        }
    }

    /// Promote to a strong handle.
    ///
    /// Returns an empty `Strong` when this handle is empty or the payload
    /// has already been released. The liveness check and the increment are
    /// one counter operation, so a released payload is never resurrected.
    pub fn lock(&self) -> Strong<T> {
        let Some(a) = &self.inner else {
            return Strong::empty();
        };
        match unsafe { a.block.try_inc_strong() } {
            Some(token) => Strong::from_parts(a.block, a.ptr, a.root, token),
            None => Strong::empty(),
        }
    }

    /// True when `lock` would fail.
    pub fn expired(&self) -> bool {
        self.use_count() == 0
    }

    pub fn is_empty(&self) -> bool {
        self.inner.is_none()
    }

    /// Strong handles currently sharing the observed block.
    pub fn use_count(&self) -> usize {
        match &self.inner {
            Some(a) => unsafe { a.block.strong_count() },
            None => 0,
        }
    }

    /// Weak handles currently observing the block, this one included.
    pub fn weak_count(&self) -> usize {
        match &self.inner {
            Some(a) => unsafe { a.block.weak_count() },
            None => 0,
        }
    }

    /// True when this handle observes the block `other` keeps alive.
    pub fn shares_owner<U: ?Sized>(&self, other: &Strong<U>) -> bool {
        self.block_addr() == other.block_addr()
    }

    /// True when both weak handles observe the same payload through the same block.
    pub fn ptr_eq(&self, other: &Self) -> bool {
        self.block_addr() == other.block_addr() && self.addr() == other.addr()
    }

    fn block_addr(&self) -> *const () {
        self.inner.as_ref().map_or(ptr::null(), |a| a.block.addr())
    }

    fn addr(&self) -> *const () {
        self.inner
            .as_ref()
            .map_or(ptr::null(), |a| a.ptr.as_ptr() as *const ())
    }

    /// Stop observing and become empty.
    pub fn reset(&mut self) {
        drop(mem::replace(self, Self::new()));
    }

    pub fn swap(&mut self, other: &mut Self) {
        mem::swap(self, other);
    }
}

impl<T: ?Sized> Clone for Weak<T> {
    fn clone(&self) -> Self {
        match &self.inner {
            Some(a) => Self {
                inner: Some(Anchor {
                    block: a.block,
                    ptr: a.ptr,
                    root: a.root,
                    token: unsafe { a.block.inc_weak() },
                }),
                _observes: PhantomData,
            },
            None => Self::new(),
        }
    }

    fn clone_from(&mut self, source: &Self) {
        if self.ptr_eq(source) {
            return;
        }
        *self = source.clone();
    }
}

impl<T: ?Sized> Drop for Weak<T> {
    fn drop(&mut self) {
        if let Some(Anchor { block, token, .. }) = self.inner.take() {
            unsafe { block.dec_weak(token) };
        }
    }
}

impl<T: ?Sized> Default for Weak<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: ?Sized> From<&Strong<T>> for Weak<T> {
    fn from(strong: &Strong<T>) -> Self {
        Self::from_strong(strong)
    }
}

impl<T: ?Sized> fmt::Debug for Weak<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("(Weak)")
    }
}
