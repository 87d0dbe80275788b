//! rc-block: single-threaded strong/weak reference-counted handles whose
//! counting state lives in a separate control block.
//!
//! Internal Design:
//!
//! Summary
//! - Goal: `Rc`/`Weak`-like handles that can also adopt a pointer allocated
//!   elsewhere (with a caller-supplied destruction routine) and alias a
//!   sub-object while keeping the whole payload alive.
//! - Layers:
//!   - `tokens`: linear, zero-sized tokens and the `Counter<K>` that mints
//!     them. Every live handle owns exactly one token; losing one panics.
//!   - `block`: the control block. A type-erased `Header` (strong counter,
//!     weak counter, release and dealloc entry points) followed by either an
//!     adopted pointer plus routine (`AdoptBlock`) or the payload itself
//!     (`InlineBlock`).
//!   - `Strong<T>` / `Weak<T>`: public handles. Each holds the block, a
//!     direct payload pointer (which may differ from the block's payload when
//!     aliased) and its token.
//!   - `make*`: single-allocation construction of block plus payload.
//!
//! Counting protocol
//! - strong reaches 0: the payload is released exactly once.
//! - strong and weak both 0: the handle that performed the final decrement
//!   frees the block. There is no other owner.
//! - While the payload's release runs, the block holds one internal weak
//!   unit, so a payload that owns a `Weak` to its own block cannot free the
//!   block mid-release.
//! - Promotion (`Weak::lock`) increments only a non-zero strong count, in
//!   one counter operation.
//!
//! Constraints
//! - Single-threaded: handles are `!Send`/`!Sync` (no atomics).
//! - Not a garbage collector: a cycle of `Strong` handles leaks. Break
//!   cycles with `Weak`.
//! - Reference-count overflow aborts, matching `Rc`.
//!
//! Failure semantics
//! - Fallible constructors (`try_*`) return [`AllocError`]; the infallible
//!   ones route the same failure to `std::alloc::handle_alloc_error`.
//! - Adopting a pointer and then failing to allocate its block runs the
//!   destruction routine before reporting, so the pointer never leaks.
//! - Dereferencing an empty `Strong` panics; a failed promotion is just an
//!   empty `Strong`.
//!
//! Logging
//! - Block allocation, payload release and block deallocation emit
//!   `tracing` events at `trace` level. No subscriber is installed here.

mod block;
mod error;
#[cfg(any(test, feature = "fault_injection"))]
pub mod fault;
mod make;
mod strong;
mod tokens;
mod weak;

// Public surface
pub use error::AllocError;
pub use make::{make, make_with, try_make, try_make_with};
pub use strong::Strong;
pub use weak::Weak;
