//! Allocators that carve objects out of regions.

pub(crate) mod allocator;
pub use allocator::{AllocationError, Allocator};

mod bumpallocator;
pub use bumpallocator::BumpAllocator;

mod free_list_allocator;
pub use free_list_allocator::FreeListAllocator;

mod large_object_allocator;
pub use large_object_allocator::LargeObjectAllocator;

mod run_slots_allocator;
pub use run_slots_allocator::RunSlotsAllocator;
