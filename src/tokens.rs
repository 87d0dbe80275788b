//! Lifetime-tied linear tokens and the counters that mint them.
//!
//! Every live handle owns exactly one token from the counter it is counted
//! against. Tokens are zero-sized proofs that a unit was acquired from a
//! particular kind of counter. Dropping a token panics; the only valid way
//! to dispose of it is to return it to its counter via `Count::put`.

use core::cell::Cell;
use core::fmt;
use core::marker::PhantomData;

/// Zero-sized, linear token tied to its originating counter via lifetime.
pub struct Token<'a, C: ?Sized> {
    // Lifetime is tracked separately from the counter type to avoid
    // imposing `'a` bounds on `C`.
    _lt: PhantomData<&'a ()>,
    _ctr: PhantomData<*const C>,
}

impl<'a, C: ?Sized> Token<'a, C> {
    #[inline]
    pub(crate) fn new() -> Self {
        Self {
            _lt: PhantomData,
            _ctr: PhantomData,
        }
    }
}

impl<'a, C: ?Sized> Drop for Token<'a, C> {
    fn drop(&mut self) {
        // Fail fast: a lost token is a reference count that never comes back.
        panic!("Token dropped without Count::put");
    }
}

/// A source of counted references, enforced by linear token flow.
pub trait Count {
    /// The token type minted by this counter.
    type Token<'a>: Sized
    where
        Self: 'a;

    /// Acquire one counted reference and return a linear token for it.
    ///
    /// Tokens are minted with a `'static` lifetime so handles can store them;
    /// they shorten covariantly when handed back through `put`.
    fn get(&self) -> Self::Token<'static>;

    /// Acquire one counted reference only if the count is non-zero.
    ///
    /// The zero check and the increment happen as one step, so a counter
    /// that already reached zero can never be brought back.
    fn try_get(&self) -> Option<Self::Token<'static>>;

    /// Return (consume) a previously acquired token.
    /// Returns true if the count is now zero.
    fn put<'a>(&'a self, t: Self::Token<'a>) -> bool;

    /// Current number of outstanding tokens.
    fn count(&self) -> usize;
}

/// Kind marker for counters of owning references.
pub enum StrongRefs {}

/// Kind marker for counters of observing references.
pub enum WeakRefs {}

/// Single-threaded counter. `K` brands the tokens so a strong token can
/// never be returned to a weak counter or vice versa.
pub struct Counter<K> {
    count: Cell<usize>,
    _kind: PhantomData<K>,
}

impl<K> Counter<K> {
    pub const fn new() -> Self {
        Self {
            count: Cell::new(0),
            _kind: PhantomData,
        }
    }
}

impl<K> Default for Counter<K> {
    fn default() -> Self {
        Self::new()
    }
}

impl<K> fmt::Debug for Counter<K> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Counter").field(&self.count.get()).finish()
    }
}

impl<K: 'static> Count for Counter<K> {
    type Token<'a>
        = Token<'a, Self>
    where
        Self: 'a;

    #[inline]
    fn get(&self) -> Self::Token<'static> {
        let n = self.count.get().wrapping_add(1);
        self.count.set(n);
        if n == 0 {
            // Follow Rc semantics: abort on overflow rather than continue unsafely.
            std::process::abort();
        }
        Token::<'static, Self>::new()
    }

    #[inline]
    fn try_get(&self) -> Option<Self::Token<'static>> {
        if self.count.get() == 0 {
            None
        } else {
            Some(self.get())
        }
    }

    #[inline]
    fn put<'a>(&'a self, t: Self::Token<'a>) -> bool {
        core::mem::forget(t);
        let c = self.count.get();
        assert!(c > 0, "reference count underflow");
        let n = c - 1;
        self.count.set(n);
        n == 0
    }

    #[inline]
    fn count(&self) -> usize {
        self.count.get()
    }
}
