//! Allocation fault injection.
//!
//! Lets tests force the next `n` control-block allocations on the current
//! thread to fail, so the `try_*` constructors and the adoption-undo path
//! can be exercised without a custom global allocator.

use core::cell::Cell;

thread_local! {
    static PENDING_FAILURES: Cell<usize> = const { Cell::new(0) };
}

/// Make the next `n` control-block allocations on this thread fail.
/// Replaces any previously requested count.
pub fn fail_next_allocations(n: usize) {
    PENDING_FAILURES.with(|p| p.set(n));
}

/// Consume one pending failure, if any.
pub(crate) fn take_failure() -> bool {
    PENDING_FAILURES.with(|p| {
        let n = p.get();
        if n == 0 {
            false
        } else {
            p.set(n - 1);
            true
        }
    })
}
