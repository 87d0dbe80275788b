//! Single-allocation construction: the block and the payload share one
//! heap allocation, and the payload is built directly in the block.

use crate::block::InlineBlock;
use crate::error::AllocError;
use crate::strong::Strong;
use std::alloc;

/// Allocate a block holding `value` and return the first strong handle.
pub fn make<T>(value: T) -> Strong<T> {
    make_with(|| value)
}

/// Allocate a block, then construct the payload in it by calling `init`.
///
/// If `init` panics the block is freed and the panic propagates.
pub fn make_with<T, F>(init: F) -> Strong<T>
where
    F: FnOnce() -> T,
{
    try_make_with(init).unwrap_or_else(|e| alloc::handle_alloc_error(e.layout()))
}

pub fn try_make<T>(value: T) -> Result<Strong<T>, AllocError> {
    try_make_with(|| value)
}

/// Fallible [`make_with`]. `init` is not called if allocation fails.
pub fn try_make_with<T, F>(init: F) -> Result<Strong<T>, AllocError>
where
    F: FnOnce() -> T,
{
    let (block, ptr, token) = InlineBlock::allocate_with(init)?;
    Ok(Strong::from_parts(block, ptr, true, token))
}
