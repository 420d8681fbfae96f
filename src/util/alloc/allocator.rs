use crate::object;
use crate::util::constants::MIN_OBJECT_ALIGNMENT;
use crate::util::Address;
use std::fmt;

/// The kinds of allocation failure a caller can see.
#[repr(C)]
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum AllocationError {
    /// The heap is exhausted even after a full collection.
    HeapOutOfMemory,
    /// The OS refused to give us (virtual) memory.
    MmapOutOfMemory,
}

impl fmt::Display for AllocationError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            AllocationError::HeapOutOfMemory => write!(f, "heap out of memory"),
            AllocationError::MmapOutOfMemory => write!(f, "cannot map memory for the heap"),
        }
    }
}

impl std::error::Error for AllocationError {}

/// Align the allocation cursor `region` up to `align`.
#[inline(always)]
pub fn align_allocation(region: Address, align: usize) -> Address {
    debug_assert!(align >= MIN_OBJECT_ALIGNMENT && align.is_power_of_two());
    region.align_up(align)
}

/// Keep the heap parseable across the padding skipped by `align_allocation`.
#[inline(always)]
pub fn fill_alignment_gap(immut_start: Address, end: Address) {
    if immut_start < end {
        object::fill_gap(immut_start, end);
    }
}

/// The common capability of all space allocators.
///
/// Allocators only hand out memory they already own. They never block and never
/// trigger a GC: on local exhaustion they return `None`, and the heap manager decides
/// whether to ask the region pool for more memory or to collect.
pub trait Allocator {
    /// Allocate `size` bytes aligned to `align`. The memory is zero.
    fn alloc(&mut self, size: usize, align: usize) -> Option<Address>;

    /// Return `size` bytes at `addr` to the allocator. Bump allocators ignore this:
    /// their memory is only reclaimed by the GC.
    fn free(&mut self, addr: Address, size: usize);

    /// The largest request this allocator serves. Larger requests belong to another
    /// size class and therefore to another allocator.
    fn max_allocation_size(&self) -> usize;
}
