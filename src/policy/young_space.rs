//! Eden and survivor regions.
//!
//! Mutators take thread-local allocation buffers out of the current eden region,
//! and the young GC takes survivor buffers out of the current survivor region.
//! Both are bounded: once eden reaches its region budget, allocation fails and a
//! young GC is due; once survivors reach theirs, the GC promotes instead of copying.

use super::space::Space;
use crate::object;
use crate::util::heap::{AllocatorKind, RegionFlags, RegionId, RegionPool, SpaceType};
use crate::util::options::Options;
use crate::util::Address;
use std::sync::{Arc, Mutex, MutexGuard};

/// A list of regions of one kind, the last of which is carved into buffers.
struct RegionCarver {
    regions: Vec<RegionId>,
    current: Option<(RegionId, Address)>,
    max_regions: usize,
    flag: RegionFlags,
}

impl RegionCarver {
    fn new(max_regions: usize, flag: RegionFlags) -> Self {
        RegionCarver {
            regions: vec![],
            current: None,
            max_regions,
            flag,
        }
    }

    /// Carve out at least `min` and at most `preferred` bytes.
    fn carve(
        &mut self,
        pool: &RegionPool,
        min: usize,
        preferred: usize,
    ) -> Option<(Address, Address)> {
        debug_assert!(min <= preferred && min <= pool.region_size());
        loop {
            if let Some((id, cursor)) = self.current {
                let end = pool.region_end(id);
                let available = end - cursor;
                if available >= min {
                    let limit = cursor + preferred.min(available);
                    self.current = Some((id, limit));
                    pool.region(id).set_top(limit);
                    return Some((cursor, limit));
                }
                self.retire_current(pool);
            }
            if self.regions.len() >= self.max_regions {
                trace!("{:?} regions exhausted ({})", self.flag, self.regions.len());
                return None;
            }
            let id = pool.allocate_region(SpaceType::Young, AllocatorKind::Bump).ok()?;
            pool.region(id).insert_flag(self.flag);
            self.regions.push(id);
            self.current = Some((id, pool.region_start(id)));
        }
    }

    /// Make the uncarved tail of the current region parseable and stop carving it.
    fn retire_current(&mut self, pool: &RegionPool) {
        if let Some((id, cursor)) = self.current.take() {
            let end = pool.region_end(id);
            object::fill_gap(cursor, end);
            pool.region(id).set_top(end);
        }
    }

    fn take(&mut self, pool: &RegionPool) -> Vec<RegionId> {
        self.retire_current(pool);
        std::mem::take(&mut self.regions)
    }
}

struct YoungInner {
    eden: RegionCarver,
    survivors: RegionCarver,
}

pub struct YoungSpace {
    pool: Arc<RegionPool>,
    inner: Mutex<YoungInner>,
}

impl YoungSpace {
    pub fn new(pool: Arc<RegionPool>, options: &Options) -> Self {
        let region_size = pool.region_size();
        let max_eden = (*options.young_size / region_size)
            .min(pool.total_regions() / 2)
            .max(1);
        debug!(
            "Young space: up to {} eden and {} survivor regions",
            max_eden, options.max_survivor_regions
        );
        YoungSpace {
            pool,
            inner: Mutex::new(YoungInner {
                eden: RegionCarver::new(max_eden, RegionFlags::EDEN),
                survivors: RegionCarver::new(options.max_survivor_regions, RegionFlags::SURVIVOR),
            }),
        }
    }

    fn lock(&self) -> MutexGuard<YoungInner> {
        self.inner.lock().unwrap()
    }

    /// A buffer for mutator allocation: at least `min` bytes, at most `preferred`.
    /// The memory is zero. `None` means eden is full.
    pub fn alloc_eden(&self, min: usize, preferred: usize) -> Option<(Address, Address)> {
        self.lock().eden.carve(&self.pool, min, preferred)
    }

    /// A buffer for survivors during a young GC. `None` means survivor space is full.
    pub fn alloc_survivor(&self, min: usize, preferred: usize) -> Option<(Address, Address)> {
        self.lock().survivors.carve(&self.pool, min, preferred)
    }

    pub fn max_eden_regions(&self) -> usize {
        self.lock().eden.max_regions
    }

    pub fn eden_regions(&self) -> Vec<RegionId> {
        self.lock().eden.regions.clone()
    }

    pub fn survivor_regions(&self) -> Vec<RegionId> {
        self.lock().survivors.regions.clone()
    }

    pub fn young_bytes(&self) -> usize {
        let inner = self.lock();
        (inner.eden.regions.len() + inner.survivors.regions.len()) * self.pool.region_size()
    }

    /// Start a young GC: every eden and survivor region becomes part of the
    /// collection set. New survivors go to fresh regions.
    pub fn begin_collection(&self) -> Vec<RegionId> {
        let mut inner = self.lock();
        let mut cset = inner.eden.take(&self.pool);
        cset.append(&mut inner.survivors.take(&self.pool));
        for &id in &cset {
            self.pool.region(id).insert_flag(RegionFlags::IN_CSET);
        }
        cset
    }

    /// Finish a young GC: make the last survivor region parseable, and free the
    /// collection set regions that are still young.
    pub fn end_collection(&self, cset: &[RegionId]) -> usize {
        self.lock().survivors.retire_current(&self.pool);
        let mut freed = 0;
        for &id in cset {
            let region = self.pool.region(id);
            if region.space() == SpaceType::Young && region.has_flag(RegionFlags::IN_CSET) {
                self.pool.free_region(id);
                freed += 1;
            }
        }
        freed
    }

    /// Hand every young region over to the caller (a full GC promotes them in place).
    pub fn take_all_regions(&self) -> Vec<RegionId> {
        let mut inner = self.lock();
        let mut all = inner.eden.take(&self.pool);
        all.append(&mut inner.survivors.take(&self.pool));
        all
    }
}

impl Space for YoungSpace {
    fn name(&self) -> &'static str {
        "young"
    }

    fn space_type(&self) -> SpaceType {
        SpaceType::Young
    }

    fn pool(&self) -> &RegionPool {
        &self.pool
    }

    fn is_movable(&self) -> bool {
        true
    }
}
