//! The full collection: mark, then per tenured region either release it, slide
//! its live objects to the region start, or sweep its dead objects into the
//! free list. Young regions are promoted in place first, so the whole heap is
//! tenured or humongous afterwards and the card table can start out clean.

use super::marking;
use crate::heap::HeapContext;
use crate::object::{self, header::StatusWord};
use crate::scheduler::parallel;
use crate::util::heap::{RegionFlags, RegionId, SpaceType};
use crate::util::linear_scan::{Cell, CellIterator};
use crate::util::object_forwarding;
use crate::util::{Address, ObjectReference};

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub(crate) enum FullKind {
    Normal,
    /// Compact every region, e.g. before the process forks.
    Compacting,
}

/// What to do with a tenured region after marking.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
enum Reclaim {
    Release,
    Compact,
    Sweep,
}

/// One object to move during compaction.
struct Move {
    from: ObjectReference,
    to: Address,
    size: usize,
    status: StatusWord,
}

pub(crate) struct FullOutcome {
    pub released_regions: usize,
    pub compacted_regions: usize,
    pub live_bytes: usize,
}

fn decide(heap: &HeapContext, id: RegionId, kind: FullKind) -> Reclaim {
    let live = heap.pool.region(id).live_bytes();
    if live == 0 {
        Reclaim::Release
    } else if kind == FullKind::Compacting
        || live * 100 < heap.options.compact_threshold * heap.pool.region_size()
    {
        if holds_pinned(heap, id) {
            debug!("Sweeping {} instead of compacting it: it holds pinned objects", id);
            Reclaim::Sweep
        } else {
            Reclaim::Compact
        }
    } else {
        Reclaim::Sweep
    }
}

/// Does the region hold a live pinned object?
fn holds_pinned(heap: &HeapContext, id: RegionId) -> bool {
    let start = heap.pool.region_start(id);
    let end = heap.pool.region_end(id);
    CellIterator::new(start, end, &heap.classes)
        .objects()
        .any(|object| object::is_marked(object) && object::is_pinned(object))
}

/// Slide the marked objects of a region towards its start. Every marked object
/// that moves gets a forwarding header; all of them keep their status in the plan.
fn plan_compaction(heap: &HeapContext, id: RegionId) -> (Vec<Move>, Address) {
    let start = heap.pool.region_start(id);
    let end = heap.pool.region_end(id);
    let mut moves = vec![];
    let mut free = start;
    for cell in CellIterator::new(start, end, &heap.classes) {
        if let Cell::Object(object, size) = cell {
            if object::is_marked(object) {
                moves.push(Move {
                    from: object,
                    to: free,
                    size,
                    status: object::status(object),
                });
                free += size;
            }
        }
    }
    for m in &moves {
        if m.to != m.from.to_raw_address() {
            let to = unsafe { ObjectReference::from_raw_address_unchecked(m.to) };
            object_forwarding::forward_object(m.from, to);
        }
    }
    (moves, free)
}

fn remap_slot(slot: Address) {
    if let Some(target) = object::load_ref(slot) {
        let new = object_forwarding::resolve(target);
        if new != target {
            object::store_ref(slot, Some(new));
        }
    }
}

/// Point every reference held by a live object or a root at the new location.
fn remap(heap: &HeapContext, sweep: &[RegionId], plans: &[(RegionId, Vec<Move>, Address)]) {
    heap.visit_roots(&mut |slot: &mut Option<ObjectReference>| {
        if let Some(object) = *slot {
            *slot = Some(object_forwarding::resolve(object));
        }
    });
    let mut contexts = vec![(); heap.options.threads.max(1)];
    let mut live_regions: Vec<RegionId> = sweep.to_vec();
    live_regions.extend(heap.pool.regions_of_space(SpaceType::Humongous).into_iter().filter(
        |&id| !heap.pool.region(id).has_flag(RegionFlags::HUMONGOUS_CONT),
    ));
    parallel::for_each_parallel(&mut contexts, live_regions, |_, id| {
        for object in marking::region_cells(heap, id).objects() {
            if object::is_marked(object) {
                object::for_each_ref_slot(object, &heap.classes, remap_slot);
            }
        }
    });
    for (_, moves, _) in plans {
        for m in moves {
            object::for_each_ref_slot_with_status(m.from, m.status, &heap.classes, remap_slot);
        }
    }
}

/// Move the objects. Returns the free rest of the region.
fn execute_compaction(
    heap: &HeapContext,
    id: RegionId,
    moves: &[Move],
    new_top: Address,
) -> (Address, Address) {
    for m in moves {
        let from = m.from.to_raw_address();
        if m.to != from {
            object::copy_bytes(from, m.to, m.size);
        }
        let to = unsafe { ObjectReference::from_raw_address_unchecked(m.to) };
        object::store_status_raw(to, m.status.with_mark(false).raw());
    }
    (new_top, heap.pool.region_end(id))
}

/// Clear the marks of the live objects of a region and return the ranges between
/// them. The free list formats the ranges as free chunks.
fn sweep_region(heap: &HeapContext, id: RegionId) -> Vec<(Address, Address)> {
    let start = heap.pool.region_start(id);
    let end = heap.pool.region_end(id);
    let mut ranges = vec![];
    let mut run: Option<Address> = None;
    for cell in CellIterator::new(start, end, &heap.classes) {
        match cell {
            Cell::Object(object, _) if object::is_marked(object) => {
                object::clear_mark(object);
                if let Some(run_start) = run.take() {
                    ranges.push((run_start, object.to_raw_address()));
                }
            }
            Cell::Object(object, _) => {
                run.get_or_insert(object.to_raw_address());
            }
            Cell::Free(addr, _) => {
                run.get_or_insert(addr);
            }
        }
    }
    if let Some(run_start) = run {
        ranges.push((run_start, end));
    }
    ranges
}

/// Reclaim everything that the last marking left unmarked. The world must be
/// stopped and marking must be complete.
pub(crate) fn reclaim(heap: &HeapContext, kind: FullKind) -> FullOutcome {
    let young = heap.young.take_all_regions();
    let promoted_bytes: usize = young.iter().map(|&id| heap.pool.region(id).live_bytes()).sum();
    for &id in &young {
        heap.tenured.adopt_region(id);
    }
    heap.stats.promoted_bytes(promoted_bytes);
    debug!("Full GC: promoted {} young regions in place", young.len());

    let mut released = 0;
    for object in heap.los.objects() {
        if !object::is_marked(object) {
            trace!("Releasing humongous {}", object);
            let span = heap.pool.region_of(object.to_raw_address()).map_or(0, |r| r.span());
            heap.los.release(object);
            released += span;
        }
    }

    let mut sweep = vec![];
    let mut compact = vec![];
    let mut live_bytes = 0;
    heap.tenured.reset_free_lists();
    for id in heap.pool.regions_of_space(SpaceType::Tenured) {
        live_bytes += heap.pool.region(id).live_bytes();
        match decide(heap, id, kind) {
            Reclaim::Release => {
                heap.tenured.release_region(id);
                released += 1;
            }
            Reclaim::Compact => compact.push(id),
            Reclaim::Sweep => sweep.push(id),
        }
    }
    debug!(
        "Full GC: {} regions to sweep, {} to compact, {} released",
        sweep.len(),
        compact.len(),
        released
    );

    let plans: Vec<(RegionId, Vec<Move>, Address)> = compact
        .iter()
        .map(|&id| {
            let (moves, top) = plan_compaction(heap, id);
            (id, moves, top)
        })
        .collect();
    if !plans.is_empty() {
        remap(heap, &sweep, &plans);
    }
    let mut free_ranges = vec![];
    for (id, moves, top) in &plans {
        free_ranges.push(execute_compaction(heap, *id, moves, *top));
    }

    let mut contexts: Vec<Vec<(Address, Address)>> = vec![vec![]; heap.options.threads.max(1)];
    parallel::for_each_parallel(&mut contexts, sweep, |ranges, id| {
        ranges.extend(sweep_region(heap, id));
    });
    for ranges in contexts {
        free_ranges.extend(ranges);
    }
    heap.tenured.add_free_ranges(&free_ranges);

    for object in heap.los.objects() {
        object::clear_mark(object);
    }
    heap.card_table.clear_all();
    heap.stats.released_regions(released);
    FullOutcome {
        released_regions: released,
        compacted_regions: compact.len(),
        live_bytes,
    }
}

/// A full collection entirely inside one pause.
pub(crate) fn collect(heap: &HeapContext, kind: FullKind) -> FullOutcome {
    for id in heap.pool.heap_regions() {
        heap.pool.region(id).reset_live_bytes();
    }
    heap.references.clear();
    let marked = marking::mark_stop_the_world(heap);
    debug!("Full GC: marked {} objects", marked);
    marking::process_weak_refs(heap);
    heap.verify_marking();
    reclaim(heap, kind)
}
