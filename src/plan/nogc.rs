use super::barriers::BarrierSelector;
use super::global::Collector;
use super::{GcTask, Generation};
use crate::heap::HeapContext;
use crate::util::ObjectReference;

/// Allocation only. Nothing is ever reclaimed; allocation fails once the heap is full.
pub struct NoGC;

impl Collector for NoGC {
    fn name(&self) -> &'static str {
        "NoGC"
    }

    fn trigger_cycle(&self, _heap: &HeapContext, task: &GcTask) -> Option<Generation> {
        warn!("{:?} requested, but this heap does not collect", task);
        None
    }

    fn mark_object(&self, _heap: &HeapContext, _object: ObjectReference) -> bool {
        false
    }

    fn is_marked(&self, _object: ObjectReference) -> bool {
        true
    }

    fn barrier_selector(&self) -> BarrierSelector {
        BarrierSelector::NoBarrier
    }

    fn collects(&self) -> bool {
        false
    }
}
