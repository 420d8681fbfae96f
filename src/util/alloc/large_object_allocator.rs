use crate::util::alloc::Allocator;
use crate::util::conversions;
use crate::util::heap::region::{AllocatorKind, RegionFlags, SpaceType};
use crate::util::heap::RegionPool;
use crate::util::Address;
use std::sync::Arc;

/// Allocates each humongous object in its own run of whole regions.
/// Humongous objects never move; they are reclaimed by releasing their regions.
pub struct LargeObjectAllocator {
    pool: Arc<RegionPool>,
}

impl LargeObjectAllocator {
    pub fn new(pool: Arc<RegionPool>) -> Self {
        LargeObjectAllocator { pool }
    }

    pub fn regions_for(&self, size: usize) -> usize {
        conversions::units_up(size, self.pool.log_region_size())
    }
}

impl Allocator for LargeObjectAllocator {
    fn alloc(&mut self, size: usize, align: usize) -> Option<Address> {
        // Region starts are aligned to the region size.
        debug_assert!(align <= self.pool.region_size());
        let count = self.regions_for(size);
        let head = match self
            .pool
            .allocate_contiguous(count, SpaceType::Humongous, AllocatorKind::Humongous)
        {
            Ok(head) => head,
            Err(e) => {
                debug!("Humongous allocation of {} bytes failed: {}", size, e);
                return None;
            }
        };
        let start = self.pool.region_start(head);
        let region = self.pool.region(head);
        region.set_span(count);
        region.set_top(start + size);
        let mut id = head;
        for _ in 1..count {
            id = match self.pool.next_region(id) {
                Some(next) => next,
                None => unreachable!("contiguous run ends past the heap"),
            };
            self.pool.region(id).insert_flag(RegionFlags::HUMONGOUS_CONT);
            self.pool.region(id).set_top(self.pool.region_end(id));
        }
        debug!(
            "Humongous allocation {} bytes in {} region(s) at {}",
            size, count, start
        );
        Some(start)
    }

    fn free(&mut self, addr: Address, _size: usize) {
        let Some(head) = self.pool.region_for(addr) else {
            panic!("{} is not a humongous object", addr);
        };
        debug_assert_eq!(self.pool.region_start(head), addr);
        let count = self.pool.region(head).span();
        debug_assert!(count > 0, "{} is not the start of a humongous object", addr);
        let mut id = head;
        for i in 0..count {
            let next = self.pool.next_region(id);
            self.pool.free_region(id);
            if i + 1 < count {
                id = match next {
                    Some(next) => next,
                    None => unreachable!("humongous object ends past the heap"),
                };
            }
        }
        debug!("Released humongous object at {} ({} regions)", addr, count);
    }

    fn max_allocation_size(&self) -> usize {
        self.pool.total_regions() * self.pool.region_size()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn spans_regions_and_releases_them() {
        let pool = Arc::new(RegionPool::new(8 << 16, 16).unwrap());
        let mut los = LargeObjectAllocator::new(pool.clone());
        let size = (2 << 16) + 8;
        let addr = los.alloc(size, 8).unwrap();
        let head = pool.region_for(addr).unwrap();
        assert_eq!(pool.region_start(head), addr);
        assert_eq!(pool.region(head).span(), 3);
        assert_eq!(pool.regions_in(SpaceType::Humongous), 3);
        let last = pool.region_for(addr + (size - 8)).unwrap();
        assert!(pool.region(last).has_flag(RegionFlags::HUMONGOUS_CONT));

        los.free(addr, size);
        assert_eq!(pool.regions_in(SpaceType::Humongous), 0);
        assert_eq!(pool.free_regions(), 8);
    }

    #[test]
    fn fails_when_no_run_is_free() {
        let pool = Arc::new(RegionPool::new(2 << 16, 16).unwrap());
        let mut los = LargeObjectAllocator::new(pool);
        assert!(los.alloc(3 << 16, 8).is_none());
    }
}
