use super::space::Space;
use crate::util::alloc::RunSlotsAllocator;
use crate::util::heap::{RegionPool, SpaceType};
use std::sync::Arc;

/// Runtime metadata. Each mutator allocates here through its own run-slots
/// allocator; the GC neither scans nor moves anything in this space.
pub struct InternalSpace {
    pool: Arc<RegionPool>,
}

impl InternalSpace {
    pub fn new(pool: Arc<RegionPool>) -> Self {
        InternalSpace { pool }
    }

    /// A thread-local allocator over this space.
    pub fn new_allocator(&self) -> RunSlotsAllocator {
        RunSlotsAllocator::new(self.pool.clone())
    }
}

impl Space for InternalSpace {
    fn name(&self) -> &'static str {
        "internal"
    }

    fn space_type(&self) -> SpaceType {
        SpaceType::Internal
    }

    fn pool(&self) -> &RegionPool {
        &self.pool
    }

    fn is_movable(&self) -> bool {
        false
    }
}
