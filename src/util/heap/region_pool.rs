use super::region::{AllocatorKind, Region, RegionFlags, RegionId, SpaceType};
use crate::util::memory;
use crate::util::Address;
use enum_map::EnumMap;
use std::collections::BTreeSet;
use std::fmt;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

/// The pool has no free region (or no run of free regions) to satisfy a request.
/// This never reaches a mutator: the heap manager reacts by collecting.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct RegionExhaustion {
    pub requested: usize,
    pub free: usize,
}

impl fmt::Display for RegionExhaustion {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(
            f,
            "cannot allocate {} region(s), {} free",
            self.requested, self.free
        )
    }
}

impl std::error::Error for RegionExhaustion {}

/// The region allocator. It reserves the whole heap budget as one aligned
/// range up front, and hands it out in fixed-size regions.
pub struct RegionPool {
    start: Address,
    end: Address,
    log_region_size: u8,
    regions: Box<[Region]>,
    /// Free region indices. We always hand out the lowest one.
    free: Mutex<BTreeSet<u32>>,
    free_count: AtomicUsize,
    regions_in_space: EnumMap<SpaceType, AtomicUsize>,
}

impl RegionPool {
    pub fn new(heap_size: usize, log_region_size: u8) -> std::io::Result<RegionPool> {
        let region_size = 1usize << log_region_size;
        let count = heap_size >> log_region_size;
        if count == 0 {
            return Err(std::io::Error::new(
                std::io::ErrorKind::InvalidInput,
                "heap is smaller than one region",
            ));
        }
        let size = count << log_region_size;
        let start = memory::reserve_aligned(size, region_size)?;
        let regions: Box<[Region]> = (0..count)
            .map(|i| Region::new(start + (i << log_region_size)))
            .collect();
        let regions_in_space: EnumMap<SpaceType, AtomicUsize> = EnumMap::default();
        regions_in_space[SpaceType::Free].store(count, Ordering::Relaxed);
        debug!(
            "Reserved {} regions of {} bytes at [{}, {})",
            count,
            region_size,
            start,
            start + size
        );
        Ok(RegionPool {
            start,
            end: start + size,
            log_region_size,
            regions,
            free: Mutex::new((0..count as u32).collect()),
            free_count: AtomicUsize::new(count),
            regions_in_space,
        })
    }

    pub fn region_size(&self) -> usize {
        1 << self.log_region_size
    }

    pub fn log_region_size(&self) -> u8 {
        self.log_region_size
    }

    pub fn heap_start(&self) -> Address {
        self.start
    }

    pub fn heap_end(&self) -> Address {
        self.end
    }

    pub fn total_regions(&self) -> usize {
        self.regions.len()
    }

    pub fn free_regions(&self) -> usize {
        self.free_count.load(Ordering::Relaxed)
    }

    pub fn regions_in(&self, space: SpaceType) -> usize {
        self.regions_in_space[space].load(Ordering::Relaxed)
    }

    pub fn contains(&self, addr: Address) -> bool {
        addr >= self.start && addr < self.end
    }

    /// Allocate one region for `space`. The region's memory is zero.
    pub fn allocate_region(
        &self,
        space: SpaceType,
        owner: AllocatorKind,
    ) -> Result<RegionId, RegionExhaustion> {
        self.allocate_contiguous(1, space, owner)
    }

    /// Allocate `count` adjacent regions for `space`, returning the first one.
    /// All of the memory is zero.
    pub fn allocate_contiguous(
        &self,
        count: usize,
        space: SpaceType,
        owner: AllocatorKind,
    ) -> Result<RegionId, RegionExhaustion> {
        debug_assert!(count > 0);
        debug_assert_ne!(space, SpaceType::Free);
        let mut free = self.free.lock().unwrap();
        let first = if count == 1 {
            free.iter().next().copied()
        } else {
            Self::find_run(&free, count)
        };
        let Some(first) = first else {
            return Err(RegionExhaustion {
                requested: count,
                free: free.len(),
            });
        };
        for i in first..first + count as u32 {
            let removed = free.remove(&i);
            debug_assert!(removed);
            let region = &self.regions[i as usize];
            region.set_owner(owner);
            region.set_space(space);
        }
        self.free_count.fetch_sub(count, Ordering::Relaxed);
        self.regions_in_space[SpaceType::Free].fetch_sub(count, Ordering::Relaxed);
        self.regions_in_space[space].fetch_add(count, Ordering::Relaxed);
        trace!(
            "Allocated {} region(s) from R{} for {} ({})",
            count,
            first,
            space,
            owner
        );
        Ok(RegionId(first))
    }

    fn find_run(free: &BTreeSet<u32>, count: usize) -> Option<u32> {
        let mut run_start = None;
        let mut run_len = 0;
        let mut prev: Option<u32> = None;
        for &i in free.iter() {
            if prev.map_or(false, |p| p + 1 == i) {
                run_len += 1;
            } else {
                run_start = Some(i);
                run_len = 1;
            }
            if run_len == count {
                return run_start;
            }
            prev = Some(i);
        }
        None
    }

    /// Return a region to the pool. Its memory is given back to the OS (and reads as zero).
    /// Freeing a free region is a bug: it asserts in debug builds and is a no-op otherwise.
    pub fn free_region(&self, id: RegionId) {
        let mut free = self.free.lock().unwrap();
        let region = self.region(id);
        let space = region.space();
        if space == SpaceType::Free {
            debug_assert!(false, "Double free of region {}", id);
            return;
        }
        let start = self.region_start(id);
        memory::decommit(start, self.region_size());
        region.reset(start);
        free.insert(id.0);
        self.free_count.fetch_add(1, Ordering::Relaxed);
        self.regions_in_space[space].fetch_sub(1, Ordering::Relaxed);
        self.regions_in_space[SpaceType::Free].fetch_add(1, Ordering::Relaxed);
        trace!("Freed region {} from {}", id, space);
    }

    /// Move a region to another space without touching its memory.
    pub(crate) fn retag_region(&self, id: RegionId, space: SpaceType, owner: AllocatorKind) {
        // Keep the accounting consistent with allocate/free.
        let _free = self.free.lock().unwrap();
        let region = self.region(id);
        let old = region.space();
        debug_assert_ne!(old, SpaceType::Free);
        region.set_space(space);
        region.set_owner(owner);
        self.regions_in_space[old].fetch_sub(1, Ordering::Relaxed);
        self.regions_in_space[space].fetch_add(1, Ordering::Relaxed);
    }

    /// O(1) lookup from any heap address to its region.
    pub fn region_for(&self, addr: Address) -> Option<RegionId> {
        if self.contains(addr) {
            Some(RegionId(((addr - self.start) >> self.log_region_size) as u32))
        } else {
            None
        }
    }

    /// The space an address belongs to. Addresses outside the heap are reported as `Free`.
    pub fn space_of(&self, addr: Address) -> SpaceType {
        self.region_for(addr)
            .map_or(SpaceType::Free, |id| self.region(id).space())
    }

    pub fn region(&self, id: RegionId) -> &Region {
        &self.regions[id.index()]
    }

    pub fn region_of(&self, addr: Address) -> Option<&Region> {
        self.region_for(addr).map(|id| self.region(id))
    }

    pub fn region_start(&self, id: RegionId) -> Address {
        self.start + (id.index() << self.log_region_size)
    }

    pub fn region_end(&self, id: RegionId) -> Address {
        self.region_start(id) + self.region_size()
    }

    /// The region that follows `id` in memory.
    pub fn next_region(&self, id: RegionId) -> Option<RegionId> {
        let next = id.0 + 1;
        if (next as usize) < self.regions.len() {
            Some(RegionId(next))
        } else {
            None
        }
    }

    /// All regions currently in `space`, in address order. Racy unless the caller
    /// stops allocation in that space.
    pub fn regions_of_space(&self, space: SpaceType) -> Vec<RegionId> {
        (0..self.regions.len() as u32)
            .map(RegionId)
            .filter(|&id| self.region(id).space() == space)
            .collect()
    }

    /// Heap regions that start an object graph walk: young, tenured and the first
    /// region of every humongous object.
    pub fn heap_regions(&self) -> Vec<RegionId> {
        (0..self.regions.len() as u32)
            .map(RegionId)
            .filter(|&id| {
                let r = self.region(id);
                r.space().is_heap() && !r.has_flag(RegionFlags::HUMONGOUS_CONT)
            })
            .collect()
    }
}

impl Drop for RegionPool {
    fn drop(&mut self) {
        if let Err(e) = memory::release(self.start, self.end - self.start) {
            warn!("Failed to release the heap reservation: {}", e);
        }
    }
}
