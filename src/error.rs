use core::alloc::Layout;
use thiserror::Error;

/// The global allocator could not provide memory for a control block.
///
/// Returned by the fallible constructors (`try_*`). When the failure
/// happens while adopting a pointer, the adopted pointer's destruction
/// routine has already run by the time this error is observed.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Error)]
#[error(
    "control block allocation failed ({} bytes, align {})",
    .layout.size(),
    .layout.align()
)]
pub struct AllocError {
    layout: Layout,
}

impl AllocError {
    pub(crate) fn new(layout: Layout) -> Self {
        Self { layout }
    }

    /// Layout of the block that could not be allocated.
    pub fn layout(&self) -> Layout {
        self.layout
    }
}
