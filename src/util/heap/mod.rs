//! Heap memory: the region pool and the GC trigger.

pub mod gc_trigger;
pub mod region;
mod region_pool;

pub use gc_trigger::{GCTrigger, GCTriggerPolicy, HeapUsage};
pub use region::{AllocatorKind, Region, RegionFlags, RegionId, SpaceType};
pub use region_pool::{RegionExhaustion, RegionPool};
