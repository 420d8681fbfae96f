use crate::util::alloc::Allocator;
use crate::util::constants::*;
use crate::util::heap::region::{AllocatorKind, RegionId, SpaceType};
use crate::util::heap::RegionPool;
use crate::util::memory;
use crate::util::Address;
use std::sync::Arc;

/// log2 of the smallest slot.
const LOG_MIN_SLOT: usize = LOG_BYTES_IN_WORD as usize;
/// log2 of the largest slot.
const LOG_MAX_SLOT: usize = 11;
const NUM_SIZE_CLASSES: usize = LOG_MAX_SLOT - LOG_MIN_SLOT + 1;

/// The largest request served by the run-slots allocator.
pub const MAX_RUN_SLOT_SIZE: usize = 1 << LOG_MAX_SLOT;

/// One size class: a run (region) being bumped through, and the slots freed so far.
struct SizeClass {
    cursor: Address,
    limit: Address,
    free_slots: Vec<Address>,
}

/// Allocates small runtime metadata from the internal space.
///
/// Memory is handed out in power-of-two slots from 8 to 2048 bytes. Each size class
/// owns whole regions ("runs") of equally sized slots. The allocator belongs to one
/// thread and gives its regions back when dropped. The GC never scans internal memory.
pub struct RunSlotsAllocator {
    pool: Arc<RegionPool>,
    classes: [SizeClass; NUM_SIZE_CLASSES],
    runs: Vec<RegionId>,
}

fn size_class_of(size: usize) -> usize {
    let size = size.max(1 << LOG_MIN_SLOT).next_power_of_two();
    size.trailing_zeros() as usize - LOG_MIN_SLOT
}

const fn slot_size(class: usize) -> usize {
    1 << (class + LOG_MIN_SLOT)
}

impl RunSlotsAllocator {
    pub fn new(pool: Arc<RegionPool>) -> Self {
        RunSlotsAllocator {
            pool,
            classes: std::array::from_fn(|_| SizeClass {
                cursor: Address::ZERO,
                limit: Address::ZERO,
                free_slots: vec![],
            }),
            runs: vec![],
        }
    }

    /// The number of regions this allocator holds.
    pub fn runs(&self) -> usize {
        self.runs.len()
    }

    fn new_run(&mut self, class: usize) -> bool {
        match self
            .pool
            .allocate_region(SpaceType::Internal, AllocatorKind::RunSlots)
        {
            Ok(id) => {
                let c = &mut self.classes[class];
                c.cursor = self.pool.region_start(id);
                c.limit = self.pool.region_end(id);
                self.pool.region(id).set_top(c.limit);
                self.runs.push(id);
                debug!(
                    "New run {} for {}-byte slots",
                    id,
                    slot_size(class)
                );
                true
            }
            Err(e) => {
                debug!("No region for a new run: {}", e);
                false
            }
        }
    }
}

impl Allocator for RunSlotsAllocator {
    fn alloc(&mut self, size: usize, align: usize) -> Option<Address> {
        if size == 0 || size > MAX_RUN_SLOT_SIZE {
            return None;
        }
        let class = size_class_of(size);
        let slot = slot_size(class);
        // Slots are naturally aligned to their size within an aligned region.
        debug_assert!(align <= slot.max(BYTES_IN_WORD));
        if let Some(addr) = self.classes[class].free_slots.pop() {
            memory::zero(addr, slot);
            return Some(addr);
        }
        if self.classes[class].cursor + slot > self.classes[class].limit
            && !self.new_run(class)
        {
            return None;
        }
        let c = &mut self.classes[class];
        let addr = c.cursor;
        c.cursor += slot;
        Some(addr)
    }

    fn free(&mut self, addr: Address, size: usize) {
        debug_assert_eq!(self.pool.space_of(addr), SpaceType::Internal);
        let class = size_class_of(size);
        self.classes[class].free_slots.push(addr);
    }

    fn max_allocation_size(&self) -> usize {
        MAX_RUN_SLOT_SIZE
    }
}

impl Drop for RunSlotsAllocator {
    fn drop(&mut self) {
        for id in self.runs.drain(..) {
            self.pool.free_region(id);
        }
    }
}
