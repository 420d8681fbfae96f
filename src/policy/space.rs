use crate::util::heap::{RegionId, RegionPool, SpaceType};
use crate::util::{Address, ObjectReference};

/// The capabilities shared by all spaces. A space is a set of regions of one
/// `SpaceType` plus the allocator(s) that carve them up.
pub trait Space: Send + Sync {
    fn name(&self) -> &'static str;

    fn space_type(&self) -> SpaceType;

    fn pool(&self) -> &RegionPool;

    /// Do objects in this space move during collection?
    fn is_movable(&self) -> bool;

    /// Bytes in the regions this space holds, used or not.
    fn reserved_bytes(&self) -> usize {
        self.pool().regions_in(self.space_type()) * self.pool().region_size()
    }

    /// The regions of this space, in address order.
    fn regions(&self) -> Vec<RegionId> {
        self.pool().regions_of_space(self.space_type())
    }

    fn address_in_space(&self, addr: Address) -> bool {
        self.pool().space_of(addr) == self.space_type()
    }

    fn in_space(&self, object: ObjectReference) -> bool {
        self.address_in_space(object.to_raw_address())
    }
}
