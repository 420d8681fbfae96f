use super::space::Space;
use crate::util::alloc::{Allocator, LargeObjectAllocator};
use crate::util::heap::{RegionFlags, RegionPool, SpaceType};
use crate::util::{Address, ObjectReference};
use std::sync::{Arc, Mutex};

/// Humongous objects. They are never copied; a humongous object dies with its regions.
pub struct LargeObjectSpace {
    pool: Arc<RegionPool>,
    allocator: Mutex<LargeObjectAllocator>,
}

impl LargeObjectSpace {
    pub fn new(pool: Arc<RegionPool>) -> Self {
        LargeObjectSpace {
            allocator: Mutex::new(LargeObjectAllocator::new(pool.clone())),
            pool,
        }
    }

    /// Allocate `size` zeroed bytes in their own run of regions.
    pub fn alloc(&self, size: usize) -> Option<Address> {
        self.allocator
            .lock()
            .unwrap()
            .alloc(size, crate::util::constants::MIN_OBJECT_ALIGNMENT)
    }

    /// Release a dead humongous object.
    pub fn release(&self, object: ObjectReference) {
        let addr = object.to_raw_address();
        let size = self
            .pool
            .region_of(addr)
            .map_or(0, |r| r.top() - addr);
        self.allocator.lock().unwrap().free(addr, size);
    }

    /// The humongous objects, in address order. Racy unless allocation is stopped.
    pub fn objects(&self) -> Vec<ObjectReference> {
        self.regions()
            .into_iter()
            .filter(|&id| !self.pool.region(id).has_flag(RegionFlags::HUMONGOUS_CONT))
            .filter_map(|id| ObjectReference::from_raw_address(self.pool.region_start(id)))
            .collect()
    }
}

impl Space for LargeObjectSpace {
    fn name(&self) -> &'static str {
        "humongous"
    }

    fn space_type(&self) -> SpaceType {
        SpaceType::Humongous
    }

    fn pool(&self) -> &RegionPool {
        &self.pool
    }

    fn is_movable(&self) -> bool {
        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn objects_and_release() {
        let pool = Arc::new(RegionPool::new(8 << 16, 16).unwrap());
        let los = LargeObjectSpace::new(pool.clone());
        let a = los.alloc(3 << 15).unwrap();
        let b = los.alloc(1 << 15).unwrap();
        let objects = los.objects();
        assert_eq!(objects.len(), 2);
        assert_eq!(objects[0].to_raw_address(), a);
        assert_eq!(objects[1].to_raw_address(), b);
        assert!(los.in_space(objects[0]));
        assert!(!los.is_movable());

        los.release(objects[0]);
        assert_eq!(los.objects().len(), 1);
        assert_eq!(pool.regions_in(SpaceType::Humongous), 1);
    }
}
