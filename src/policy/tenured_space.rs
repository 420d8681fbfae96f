//! The old generation: free-list allocated, never copied by young GCs.
//!
//! Every tenured region is parseable from start to end at all times: fresh
//! regions start as a single free chunk, and allocation splits chunks.

use super::space::Space;
use crate::object;
use crate::util::alloc::{Allocator, FreeListAllocator};
use crate::util::constants::MIN_OBJECT_ALIGNMENT;
use crate::util::heap::{AllocatorKind, RegionFlags, RegionId, RegionPool, SpaceType};
use crate::util::Address;
use std::sync::{Arc, Mutex, MutexGuard};

pub struct TenuredSpace {
    pool: Arc<RegionPool>,
    free_list: Mutex<FreeListAllocator>,
}

impl TenuredSpace {
    pub fn new(pool: Arc<RegionPool>) -> Self {
        let max = pool.region_size();
        TenuredSpace {
            pool,
            free_list: Mutex::new(FreeListAllocator::new(max)),
        }
    }

    fn lock(&self) -> MutexGuard<FreeListAllocator> {
        self.free_list.lock().unwrap()
    }

    /// Add a fresh region to the free list.
    fn grow(&self, free_list: &mut FreeListAllocator) -> bool {
        match self.pool.allocate_region(SpaceType::Tenured, AllocatorKind::FreeList) {
            Ok(id) => {
                let (start, end) = (self.pool.region_start(id), self.pool.region_end(id));
                self.pool.region(id).set_top(end);
                free_list.add_chunk(start, end);
                trace!("Tenured space grew by {}", id);
                true
            }
            Err(e) => {
                debug!("Tenured space cannot grow: {}", e);
                false
            }
        }
    }

    /// Allocate `size` zeroed bytes. `None` if neither the free list nor the pool has room.
    pub fn alloc(&self, size: usize, align: usize) -> Option<Address> {
        let mut free_list = self.lock();
        if let Some(addr) = free_list.alloc(size, align) {
            return Some(addr);
        }
        if size > free_list.max_allocation_size() || !self.grow(&mut free_list) {
            return None;
        }
        free_list.alloc(size, align)
    }

    /// A promotion buffer for a GC worker: `preferred` bytes if possible, else at least `min`.
    pub fn alloc_plab(&self, min: usize, preferred: usize) -> Option<(Address, Address)> {
        let mut free_list = self.lock();
        for size in [preferred, min] {
            if let Some(addr) = free_list.alloc(size, MIN_OBJECT_ALIGNMENT) {
                return Some((addr, addr + size));
            }
        }
        if !self.grow(&mut free_list) {
            return None;
        }
        let size = preferred.min(free_list.max_allocation_size());
        free_list
            .alloc(size, MIN_OBJECT_ALIGNMENT)
            .map(|addr| (addr, addr + size))
    }

    pub fn free(&self, addr: Address, size: usize) {
        self.lock().free(addr, size)
    }

    pub fn free_bytes(&self) -> usize {
        self.lock().free_bytes()
    }

    /// Forget all free chunks before a sweep rebuilds them.
    pub fn reset_free_lists(&self) {
        self.lock().reset()
    }

    /// Give swept ranges back to the free list.
    pub fn add_free_ranges(&self, ranges: &[(Address, Address)]) {
        let mut free_list = self.lock();
        for &(start, end) in ranges {
            free_list.add_chunk(start, end);
        }
    }

    /// Return an empty region to the pool.
    pub fn release_region(&self, id: RegionId) {
        let (start, end) = (self.pool.region_start(id), self.pool.region_end(id));
        self.lock().remove_range(start, end);
        self.pool.free_region(id);
    }

    /// Turn a young region into a tenured one without moving its objects.
    /// Its unused tail becomes free memory of this space.
    pub fn adopt_region(&self, id: RegionId) {
        let region = self.pool.region(id);
        let (top, end) = (region.top(), self.pool.region_end(id));
        self.pool.retag_region(id, SpaceType::Tenured, AllocatorKind::FreeList);
        region.set_flags(RegionFlags::PROMOTED);
        if top < end {
            object::fill_gap(top, end);
        }
        region.set_top(end);
        trace!("Promoted {} in place", id);
    }
}

impl Space for TenuredSpace {
    fn name(&self) -> &'static str {
        "tenured"
    }

    fn space_type(&self) -> SpaceType {
        SpaceType::Tenured
    }

    fn pool(&self) -> &RegionPool {
        &self.pool
    }

    fn is_movable(&self) -> bool {
        // Only by full GC compaction.
        true
    }
}
