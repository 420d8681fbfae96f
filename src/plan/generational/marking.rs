//! Tracing for full collections, stop-the-world or concurrent.
//!
//! Marking is a tri-color traversal: an object is grey once its mark bit is set and
//! it sits in a work queue, and black once its fields were scanned. Setting the
//! mark bit is an atomic fetch-or, so each object is scanned exactly once.

use crate::heap::HeapContext;
use crate::object;
use crate::scheduler::parallel;
use crate::util::heap::RegionId;
use crate::util::linear_scan::CellIterator;
use crate::util::ObjectReference;
use crate::vm::RootVisitor;
use std::sync::atomic::{AtomicBool, Ordering};

/// Old values recorded by the snapshot-at-the-beginning pre-barrier.
pub struct SatbQueue {
    active: AtomicBool,
    buffers: spin::Mutex<Vec<Vec<ObjectReference>>>,
}

impl Default for SatbQueue {
    fn default() -> Self {
        Self::new()
    }
}

impl SatbQueue {
    pub fn new() -> Self {
        SatbQueue {
            active: AtomicBool::new(false),
            buffers: spin::Mutex::new(vec![]),
        }
    }

    /// Is concurrent marking running? New objects are allocated marked while it is.
    #[inline(always)]
    pub fn is_active(&self) -> bool {
        self.active.load(Ordering::Acquire)
    }

    pub(crate) fn activate(&self) {
        self.active.store(true, Ordering::Release);
    }

    pub(crate) fn deactivate(&self) {
        self.active.store(false, Ordering::Release);
        self.buffers.lock().clear();
    }

    pub fn push_buffer(&self, buffer: Vec<ObjectReference>) {
        self.buffers.lock().push(buffer);
    }

    pub(crate) fn take_all(&self) -> Vec<ObjectReference> {
        let buffers = std::mem::take(&mut *self.buffers.lock());
        buffers.into_iter().flatten().collect()
    }
}

/// Set the mark bit and account the object as live in its region.
/// Returns true if this call marked the object.
pub(crate) fn mark(heap: &HeapContext, object: ObjectReference) -> bool {
    if !object::try_mark(object) {
        return false;
    }
    if let Some(region) = heap.pool.region_of(object.to_raw_address()) {
        region.add_live_bytes(object::size_of(object, &heap.classes));
    }
    true
}

/// Mark the objects directly reachable from roots and return them (grey).
pub(crate) fn mark_roots(heap: &HeapContext) -> Vec<ObjectReference> {
    let mut grey = vec![];
    heap.visit_roots(&mut |slot: &mut Option<ObjectReference>| {
        if let Some(object) = *slot {
            if mark(heap, object) {
                grey.push(object);
            }
        }
    });
    grey
}

/// Mark everything reachable from `grey`. Referents of weak references are not
/// traced; the reference objects are handed to the reference processor instead.
pub(crate) fn drain(heap: &HeapContext, grey: Vec<ObjectReference>) -> usize {
    let mut contexts = vec![(0usize, Vec::new()); heap.options.threads];
    parallel::drain(&mut contexts, grey, |(count, references), object, queue| {
        *count += 1;
        object::for_each_strong_ref_slot(object, &heap.classes, |slot| {
            if let Some(child) = object::load_ref(slot) {
                if mark(heap, child) {
                    queue.push(child);
                }
            }
        });
        if object::referent_slot(object, &heap.classes).is_some() {
            references.push(object);
        }
    });
    let mut traced = 0;
    for (count, references) in contexts {
        traced += count;
        heap.references.add_candidates(references);
    }
    traced
}

/// Clear the referents that marking did not reach. Marking must be complete.
pub(crate) fn process_weak_refs(heap: &HeapContext) {
    let cleared = heap.references.scan_weak_refs(&heap.classes);
    heap.stats.cleared_references(cleared);
}

/// Mark from roots to completion. The world must be stopped.
pub(crate) fn mark_stop_the_world(heap: &HeapContext) -> usize {
    let grey = mark_roots(heap);
    drain(heap, grey)
}

/// Clear all marks and live counts, e.g. after an aborted concurrent marking.
pub(crate) fn clear_marks(heap: &HeapContext) {
    heap.references.clear();
    for id in heap.pool.heap_regions() {
        heap.pool.region(id).reset_live_bytes();
        for object in region_cells(heap, id).objects() {
            object::clear_mark(object);
        }
    }
}

/// The cells of a heap region that are parseable right now.
pub(crate) fn region_cells(heap: &HeapContext, id: RegionId) -> CellIterator<'_> {
    let start = heap.pool.region_start(id);
    let top = heap.pool.region(id).top();
    CellIterator::new(start, top, &heap.classes)
}

/// Collects root slots into a vector, for phases that revisit them.
pub(crate) struct RootCollector(pub Vec<ObjectReference>);

impl RootVisitor for RootCollector {
    fn visit_root(&mut self, slot: &mut Option<ObjectReference>) {
        if let Some(object) = *slot {
            self.0.push(object);
        }
    }
}
