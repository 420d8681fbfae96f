//! The capabilities every collector algorithm provides, and the algorithm selected
//! for a heap.

use super::barriers::BarrierSelector;
use super::generational::GenerationalCollector;
use super::nogc::NoGC;
use super::{GcTask, Generation};
use crate::heap::HeapContext;
use crate::util::options::{Options, PlanSelector};
use crate::util::ObjectReference;

pub trait Collector: Send + Sync {
    fn name(&self) -> &'static str;

    /// Run the cycle for `task`. Called on the GC controller thread (or the requesting
    /// thread when collecting in place) with the world running; the collector stops it
    /// as needed. Returns what was collected, or `None` if the cycle was abandoned.
    fn trigger_cycle(&self, heap: &HeapContext, task: &GcTask) -> Option<Generation>;

    /// Mark `object` and account it as live. Returns true if this call marked it.
    fn mark_object(&self, heap: &HeapContext, object: ObjectReference) -> bool;

    fn is_marked(&self, object: ObjectReference) -> bool;

    /// The barrier mutators of this heap use.
    fn barrier_selector(&self) -> BarrierSelector;

    /// Does this collector ever reclaim memory?
    fn collects(&self) -> bool;
}

/// The collector algorithm of a heap.
pub enum GcAlgorithm {
    Generational(GenerationalCollector),
    NoOp(NoGC),
}

impl GcAlgorithm {
    pub fn new(options: &Options) -> Self {
        match options.plan {
            PlanSelector::Generational => {
                GcAlgorithm::Generational(GenerationalCollector::new(options.concurrent_marking))
            }
            PlanSelector::NoGC => GcAlgorithm::NoOp(NoGC),
        }
    }

    fn collector(&self) -> &dyn Collector {
        match self {
            GcAlgorithm::Generational(c) => c,
            GcAlgorithm::NoOp(c) => c,
        }
    }
}

impl Collector for GcAlgorithm {
    fn name(&self) -> &'static str {
        self.collector().name()
    }

    fn trigger_cycle(&self, heap: &HeapContext, task: &GcTask) -> Option<Generation> {
        self.collector().trigger_cycle(heap, task)
    }

    fn mark_object(&self, heap: &HeapContext, object: ObjectReference) -> bool {
        self.collector().mark_object(heap, object)
    }

    fn is_marked(&self, object: ObjectReference) -> bool {
        self.collector().is_marked(object)
    }

    fn barrier_selector(&self) -> BarrierSelector {
        self.collector().barrier_selector()
    }

    fn collects(&self) -> bool {
        self.collector().collects()
    }
}
