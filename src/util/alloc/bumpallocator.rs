use super::allocator::{align_allocation, fill_alignment_gap};
use crate::util::alloc::Allocator;
use crate::util::Address;

/// A bump-pointer allocator over `[cursor, limit)`. Used for thread-local allocation
/// buffers in eden, and for the GC's survivor and promotion buffers.
pub struct BumpAllocator {
    cursor: Address,
    limit: Address,
    max_allocation_size: usize,
}

impl BumpAllocator {
    pub fn new(max_allocation_size: usize) -> Self {
        BumpAllocator {
            cursor: Address::ZERO,
            limit: Address::ZERO,
            max_allocation_size,
        }
    }

    pub fn set_limit(&mut self, cursor: Address, limit: Address) {
        debug_assert!(cursor <= limit);
        self.cursor = cursor;
        self.limit = limit;
    }

    pub fn reset(&mut self) {
        self.cursor = Address::ZERO;
        self.limit = Address::ZERO;
    }

    pub fn cursor(&self) -> Address {
        self.cursor
    }

    pub fn limit(&self) -> Address {
        self.limit
    }

    pub fn remaining(&self) -> usize {
        self.limit - self.cursor
    }

    pub fn is_bound(&self) -> bool {
        !self.limit.is_zero()
    }

    /// Give up the rest of the buffer. The unused tail is formatted as a free chunk so
    /// the region stays parseable. Returns the tail.
    pub fn retire(&mut self) -> Option<(Address, Address)> {
        if !self.is_bound() {
            return None;
        }
        let tail = (self.cursor, self.limit);
        fill_alignment_gap(self.cursor, self.limit);
        trace!("Retired buffer tail [{}, {})", tail.0, tail.1);
        self.reset();
        Some(tail)
    }
}

impl Allocator for BumpAllocator {
    #[inline(always)]
    fn alloc(&mut self, size: usize, align: usize) -> Option<Address> {
        let result = align_allocation(self.cursor, align);
        let new_cursor = result + size;
        if !self.is_bound() || new_cursor > self.limit {
            trace!("Bump buffer used up ({} bytes left)", self.limit - self.cursor);
            None
        } else {
            fill_alignment_gap(self.cursor, result);
            self.cursor = new_cursor;
            Some(result)
        }
    }

    fn free(&mut self, _addr: Address, _size: usize) {}

    fn max_allocation_size(&self) -> usize {
        self.max_allocation_size
    }
}
