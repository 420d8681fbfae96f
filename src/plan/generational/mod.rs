//! The generational collector: copying young collections, and full collections
//! that mark (optionally concurrently) and then sweep or compact.

pub(crate) mod full;
pub(crate) mod marking;
pub(crate) mod young;

use super::barriers::BarrierSelector;
use super::global::Collector;
use super::{GcTask, Generation};
use crate::heap::HeapContext;
use crate::util::ObjectReference;
use full::FullKind;
use std::time::Instant;

pub use marking::SatbQueue;

pub struct GenerationalCollector {
    concurrent_marking: bool,
}

impl GenerationalCollector {
    pub fn new(concurrent_marking: bool) -> Self {
        GenerationalCollector { concurrent_marking }
    }

    fn young_cycle(&self, heap: &HeapContext, task: &GcTask) -> Generation {
        let world = heap.rendezvous.stop_the_world();
        let start = Instant::now();
        let before = heap.usage();
        heap.trigger.policy.on_gc_start(&before);
        heap.verify_heap("before young GC");

        let outcome = young::collect(heap);
        heap.stats.young_gc_done(1);
        let mut collected = Generation::Young;
        if outcome.evacuation_failed {
            info!("Evacuation failed, collecting the full heap in the same pause");
            full::collect(heap, FullKind::Normal);
            heap.stats.full_gc_done(1);
            collected = Generation::Full;
        }

        heap.verify_heap("after young GC");
        let after = heap.usage();
        heap.trigger.policy.on_gc_end(collected, &after);
        let pause = start.elapsed();
        heap.stats.record_pause(pause);
        drop(world);
        heap.log_cycle(task, collected, &before, &after, pause);
        collected
    }

    fn full_cycle_stop_the_world(
        &self,
        heap: &HeapContext,
        task: &GcTask,
        kind: FullKind,
    ) -> Generation {
        let world = heap.rendezvous.stop_the_world();
        let start = Instant::now();
        let before = heap.usage();
        heap.trigger.policy.on_gc_start(&before);
        heap.verify_heap("before full GC");

        let outcome = full::collect(heap, kind);
        heap.stats.full_gc_done(1);
        debug!(
            "Full GC: {} live bytes, {} regions released, {} compacted",
            outcome.live_bytes, outcome.released_regions, outcome.compacted_regions
        );

        heap.verify_heap("after full GC");
        let after = heap.usage();
        heap.trigger.policy.on_gc_end(Generation::Full, &after);
        let pause = start.elapsed();
        heap.stats.record_pause(pause);
        drop(world);
        heap.log_cycle(task, Generation::Full, &before, &after, pause);
        Generation::Full
    }

    /// Initial mark and remark are pauses; tracing in between runs alongside the
    /// mutators, with the snapshot-at-the-beginning barrier recording overwritten
    /// references. Returns `None` if marking was abandoned.
    fn full_cycle_concurrent(&self, heap: &HeapContext, task: &GcTask) -> Option<Generation> {
        let started = Instant::now();
        let before = heap.usage();
        let grey = {
            let _world = heap.rendezvous.stop_the_world();
            let pause = Instant::now();
            heap.trigger.policy.on_gc_start(&before);
            heap.verify_heap("before concurrent marking");
            for id in heap.pool.heap_regions() {
                heap.pool.region(id).reset_live_bytes();
            }
            heap.references.clear();
            heap.satb.activate();
            let grey = marking::mark_roots(heap);
            heap.stats.record_pause(pause.elapsed());
            debug!("Initial mark: {} objects reached from roots", grey.len());
            grey
        };

        let traced = marking::drain(heap, grey);
        debug!("Concurrent marking traced {} objects", traced);

        if task.cause.is_background() && heap.requester.has_pending_mandatory() {
            let _world = heap.rendezvous.stop_the_world();
            heap.satb.deactivate();
            marking::clear_marks(heap);
            heap.stats.concurrent_mark_aborted(1);
            info!("Abandoned concurrent marking for {:?}", task);
            return None;
        }

        let world = heap.rendezvous.stop_the_world();
        let pause = Instant::now();
        // Mutators flushed their barrier buffers when they stopped.
        let mut grey = marking::mark_roots(heap);
        let mut logged = 0;
        for object in heap.satb.take_all() {
            logged += 1;
            if marking::mark(heap, object) {
                grey.push(object);
            }
        }
        heap.satb.deactivate();
        let remarked = marking::drain(heap, grey);
        debug!("Remark: {} logged references, {} more objects", logged, remarked);
        marking::process_weak_refs(heap);
        heap.verify_marking();

        let outcome = full::reclaim(heap, FullKind::Normal);
        heap.stats.full_gc_done(1);
        debug!(
            "Full GC: {} live bytes, {} regions released, {} compacted",
            outcome.live_bytes, outcome.released_regions, outcome.compacted_regions
        );
        heap.verify_heap("after full GC");
        let after = heap.usage();
        heap.trigger.policy.on_gc_end(Generation::Full, &after);
        heap.stats.record_pause(pause.elapsed());
        drop(world);
        heap.log_cycle(task, Generation::Full, &before, &after, started.elapsed());
        Some(Generation::Full)
    }
}

impl Collector for GenerationalCollector {
    fn name(&self) -> &'static str {
        "Generational"
    }

    fn trigger_cycle(&self, heap: &HeapContext, task: &GcTask) -> Option<Generation> {
        match task.generation {
            Generation::Young => Some(self.young_cycle(heap, task)),
            Generation::Full if task.cause == super::GcCause::ForkPrepare => {
                Some(self.full_cycle_stop_the_world(heap, task, FullKind::Compacting))
            }
            Generation::Full if self.concurrent_marking => self.full_cycle_concurrent(heap, task),
            Generation::Full => Some(self.full_cycle_stop_the_world(heap, task, FullKind::Normal)),
        }
    }

    fn mark_object(&self, heap: &HeapContext, object: ObjectReference) -> bool {
        marking::mark(heap, object)
    }

    fn is_marked(&self, object: ObjectReference) -> bool {
        crate::object::is_marked(object)
    }

    fn barrier_selector(&self) -> BarrierSelector {
        BarrierSelector::Generational
    }

    fn collects(&self) -> bool {
        true
    }
}
