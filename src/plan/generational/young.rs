//! The young collection: a parallel copying collector over eden and survivors.
//!
//! Roots are the mutator and global roots plus the tenured and humongous objects
//! on dirty cards. Every live young object is either copied to a survivor region,
//! promoted to tenured space (it is old enough, or survivor space is full), or
//! forwarded to itself. Pinned objects are always forwarded to themselves, other
//! objects only when neither space has room. The latter is an evacuation failure,
//! and the caller must follow up with a full collection. Regions holding
//! self-forwarded objects are promoted in place, and their dead objects become
//! free memory.

use crate::heap::HeapContext;
use crate::object::{self, header::HeaderState, header::StatusWord};
use crate::scheduler::parallel::{self, WorkQueue};
use crate::util::alloc::{Allocator, BumpAllocator};
use crate::util::constants::*;
use crate::util::heap::{RegionFlags, RegionId, SpaceType};
use crate::util::object_forwarding::{self, ForwardingClaim};
use crate::util::{Address, ObjectReference};
use std::collections::HashSet;

/// Bytes a GC worker takes from survivor space at a time.
const SURVIVOR_BUFFER_BYTES: usize = 32 * BYTES_IN_KBYTE;
/// Bytes a GC worker takes from tenured space at a time.
const PLAB_BYTES: usize = 16 * BYTES_IN_KBYTE;

/// An object whose fields still need to be scanned. The status word is carried
/// along because the object may be self-forwarded.
#[derive(Copy, Clone, Debug)]
pub(crate) struct ScanObject {
    object: ObjectReference,
    status: StatusWord,
}

pub(crate) struct YoungOutcome {
    /// Some objects could not be evacuated. A full collection is needed.
    pub evacuation_failed: bool,
    pub freed_regions: usize,
}

/// Per-worker state of a young collection.
struct CopyContext<'a> {
    heap: &'a HeapContext,
    tenuring_threshold: u8,
    survivor: BumpAllocator,
    plab: BumpAllocator,
    survivors_exhausted: bool,
    tenured_exhausted: bool,
    /// Objects forwarded to themselves for lack of room, with their original
    /// status words.
    self_forwarded: Vec<(ObjectReference, StatusWord)>,
    /// Pinned objects forwarded to themselves.
    pinned: Vec<(ObjectReference, StatusWord)>,
    copied: usize,
    copied_bytes: usize,
    promoted: usize,
    promoted_bytes: usize,
}

impl<'a> CopyContext<'a> {
    fn new(heap: &'a HeapContext) -> Self {
        let max = heap.pool.region_size();
        CopyContext {
            heap,
            tenuring_threshold: heap.options.tenuring_threshold,
            survivor: BumpAllocator::new(max),
            plab: BumpAllocator::new(max),
            survivors_exhausted: false,
            tenured_exhausted: false,
            self_forwarded: vec![],
            pinned: vec![],
            copied: 0,
            copied_bytes: 0,
            promoted: 0,
            promoted_bytes: 0,
        }
    }

    fn alloc_survivor(&mut self, size: usize) -> Option<Address> {
        if let Some(addr) = self.survivor.alloc(size, MIN_OBJECT_ALIGNMENT) {
            return Some(addr);
        }
        if self.survivors_exhausted {
            return None;
        }
        self.survivor.retire();
        match self
            .heap
            .young
            .alloc_survivor(size, size.max(SURVIVOR_BUFFER_BYTES))
        {
            Some((start, end)) => {
                self.survivor.set_limit(start, end);
                self.survivor.alloc(size, MIN_OBJECT_ALIGNMENT)
            }
            None => {
                debug!("Survivor space is full, promoting early");
                self.survivors_exhausted = true;
                None
            }
        }
    }

    fn alloc_tenured(&mut self, size: usize) -> Option<Address> {
        if let Some(addr) = self.plab.alloc(size, MIN_OBJECT_ALIGNMENT) {
            return Some(addr);
        }
        if self.tenured_exhausted {
            return None;
        }
        self.retire_plab();
        match self.heap.tenured.alloc_plab(size, size.max(PLAB_BYTES)) {
            Some((start, end)) => {
                self.plab.set_limit(start, end);
                self.plab.alloc(size, MIN_OBJECT_ALIGNMENT)
            }
            None => {
                debug!("Tenured space is full, cannot promote");
                self.tenured_exhausted = true;
                None
            }
        }
    }

    /// Where a reference to `object` points after this collection. Copies the
    /// object if this is the first time it is reached; a newly copied object is
    /// returned as work.
    fn evacuate(&mut self, object: ObjectReference) -> (ObjectReference, Option<ScanObject>) {
        if !self.heap.in_collection_set(object) {
            return (object, None);
        }
        let status = match object_forwarding::attempt_to_forward(object) {
            ForwardingClaim::AlreadyForwarded(new) => return (new, None),
            ForwardingClaim::Won(status) => status,
        };
        if status.is_pinned() {
            return self.keep_in_place(object, status, RegionFlags::PINNED);
        }
        let size = object::size_with_status(object, status, &self.heap.classes);
        let age = status.age().saturating_add(1);
        let promote = age >= self.tenuring_threshold;
        let destination = if promote {
            self.alloc_tenured(size)
                .map(|a| (a, true))
                .or_else(|| self.alloc_survivor(size).map(|a| (a, false)))
        } else {
            self.alloc_survivor(size)
                .map(|a| (a, false))
                .or_else(|| self.alloc_tenured(size).map(|a| (a, true)))
        };
        match destination {
            Some((addr, promoted)) => {
                object::copy_bytes(object.to_raw_address(), addr, size);
                let new_status = status.with_age(age).with_mark(false);
                let new = unsafe { ObjectReference::from_raw_address_unchecked(addr) };
                object::store_status_raw(new, new_status.raw());
                object_forwarding::forward_object(object, new);
                if promoted {
                    self.promoted += 1;
                    self.promoted_bytes += size;
                } else {
                    self.copied += 1;
                    self.copied_bytes += size;
                }
                (
                    new,
                    Some(ScanObject {
                        object: new,
                        status: new_status,
                    }),
                )
            }
            None => self.keep_in_place(object, status, RegionFlags::EVAC_FAILED),
        }
    }

    /// Forward `object` to itself. Its region gets `flag` and is promoted in place
    /// at the end of the collection.
    fn keep_in_place(
        &mut self,
        object: ObjectReference,
        status: StatusWord,
        flag: RegionFlags,
    ) -> (ObjectReference, Option<ScanObject>) {
        object_forwarding::forward_object(object, object);
        if let Some(region) = self.heap.pool.region_of(object.to_raw_address()) {
            region.insert_flag(flag);
        }
        if flag == RegionFlags::PINNED {
            self.pinned.push((object, status));
        } else {
            self.self_forwarded.push((object, status));
        }
        (object, Some(ScanObject { object, status }))
    }

    /// Update every reference field of `work`. Returns true if a field still points
    /// into young space afterwards.
    fn scan(&mut self, work: ScanObject, mut push: impl FnMut(ScanObject)) -> bool {
        let mut points_young = false;
        let heap = self.heap;
        object::for_each_ref_slot_with_status(work.object, work.status, &heap.classes, |slot| {
            if let Some(target) = object::load_ref(slot) {
                let (new, more) = self.evacuate(target);
                if new != target {
                    object::store_ref(slot, Some(new));
                }
                if let Some(more) = more {
                    push(more);
                }
                points_young |= heap.pool.space_of(new.to_raw_address()) == SpaceType::Young;
            }
        });
        points_young
    }

    /// Scan a copied object. A promoted copy that still points at a survivor gets
    /// its card marked, so the next young GC finds the edge.
    fn scan_copy(&mut self, work: ScanObject, queue: &WorkQueue<ScanObject>) {
        let points_young = self.scan(work, |w| queue.push(w));
        let space = self.heap.pool.space_of(work.object.to_raw_address());
        if points_young && space == SpaceType::Tenured {
            self.heap.card_table.mark_card(work.object.to_raw_address());
        }
    }

    /// The unused part of the promotion buffer goes back to the tenured free list.
    fn retire_plab(&mut self) {
        if let Some((cursor, limit)) = self.plab.retire() {
            if limit > cursor {
                self.heap.tenured.free(cursor, limit - cursor);
            }
        }
    }

    fn retire_buffers(&mut self) {
        self.survivor.retire();
        self.retire_plab();
    }
}

/// Scan the objects that start on dirty cards of one tenured or humongous region.
/// The cards are cleaned up front, so objects sharing a card are all scanned.
fn scan_dirty_cards(ctx: &mut CopyContext, id: RegionId, work: &mut Vec<ScanObject>) {
    let heap = ctx.heap;
    let pool = &heap.pool;
    let start = pool.region_start(id);
    let top = pool.region(id).top();
    let dirty = heap.card_table.take_dirty(start, top);
    if dirty.is_empty() {
        return;
    }
    let cells = crate::util::linear_scan::CellIterator::new(start, top, &heap.classes);
    let mut next = 0;
    let mut objects = 0;
    for object in cells.objects() {
        let addr = object.to_raw_address();
        let card = heap.card_table.card_start(addr);
        while next < dirty.len() && dirty[next] < card {
            next += 1;
        }
        if next == dirty.len() {
            break;
        }
        if dirty[next] != card {
            continue;
        }
        objects += 1;
        let status = object::status(object);
        let points_young = ctx.scan(ScanObject { object, status }, |w| work.push(w));
        if points_young {
            heap.card_table.mark_card(addr);
        }
    }
    trace!("Scanned {} objects on {} dirty cards of {}", objects, dirty.len(), id);
}

/// Turn a region with self-forwarded objects back into a parseable region. The
/// old copies of evacuated objects and the unreached objects become free
/// memory; the returned ranges cover them.
fn fix_retained_region(
    heap: &HeapContext,
    id: RegionId,
    kept: &HashSet<ObjectReference>,
) -> Vec<(Address, Address)> {
    let start = heap.pool.region_start(id);
    let top = heap.pool.region(id).top();
    let mut ranges = vec![];
    let mut run: Option<Address> = None;
    let mut cursor = start;
    while cursor < top {
        let raw = unsafe { cursor.load::<usize>() };
        if raw == 0 {
            run.get_or_insert(cursor);
            cursor += BYTES_IN_WORD;
            continue;
        }
        let object = unsafe { ObjectReference::from_raw_address_unchecked(cursor) };
        let (size, live) = match HeaderState::decode(raw) {
            HeaderState::Normal(status) => (
                object::size_with_status(object, status, &heap.classes),
                kept.contains(&object),
            ),
            HeaderState::Forwarded(new) => (object::size_of(new, &heap.classes), false),
            HeaderState::BeingForwarded => panic!("{} is still being forwarded", object),
        };
        if live {
            if let Some(run_start) = run.take() {
                ranges.push((run_start, cursor));
            }
        } else {
            run.get_or_insert(cursor);
        }
        cursor += size;
    }
    if let Some(run_start) = run {
        ranges.push((run_start, top));
    }
    for &(from, to) in &ranges {
        object::fill_gap(from, to);
    }
    ranges
}

/// Promote the regions with self-forwarded objects in place. Kept objects that
/// still point into young space get their cards marked.
fn retain_regions(
    heap: &HeapContext,
    cset: &[RegionId],
    retained: &[(ObjectReference, StatusWord)],
) {
    for &(object, status) in retained {
        object_forwarding::restore_status(object, status);
    }
    let kept: HashSet<ObjectReference> = retained.iter().map(|&(o, _)| o).collect();
    let mut free = vec![];
    for &id in cset {
        let region = heap.pool.region(id);
        if region.has_flag(RegionFlags::EVAC_FAILED) || region.has_flag(RegionFlags::PINNED) {
            let mut ranges = fix_retained_region(heap, id, &kept);
            let (top, end) = (region.top(), heap.pool.region_end(id));
            heap.tenured.adopt_region(id);
            match ranges.last().copied() {
                Some((from, to)) if to == top => {
                    ranges.pop();
                    ranges.push((from, end));
                }
                _ if top < end => ranges.push((top, end)),
                _ => {}
            }
            free.append(&mut ranges);
        }
    }
    heap.tenured.add_free_ranges(&free);
    for &(object, status) in retained {
        let mut points_young = false;
        object::for_each_ref_slot_with_status(object, status, &heap.classes, |slot| {
            if let Some(target) = object::load_ref(slot) {
                points_young |= heap.pool.space_of(target.to_raw_address()) == SpaceType::Young;
            }
        });
        if points_young {
            heap.card_table.mark_card(object.to_raw_address());
        }
    }
}

/// Run a young collection. The world must be stopped.
pub(crate) fn collect(heap: &HeapContext) -> YoungOutcome {
    let cset = heap.young.begin_collection();
    debug!("Young GC: collection set of {} regions", cset.len());

    let mut contexts: Vec<CopyContext> = (0..heap.options.threads.max(1))
        .map(|_| CopyContext::new(heap))
        .collect();
    let mut work = vec![];

    // Roots. Tenured objects on dirty cards are scanned serially, before any
    // worker can promote into the regions being walked.
    {
        let ctx = &mut contexts[0];
        let old_regions: Vec<RegionId> = heap
            .pool
            .heap_regions()
            .into_iter()
            .filter(|&id| heap.pool.region(id).space() != SpaceType::Young)
            .collect();
        for id in old_regions {
            scan_dirty_cards(ctx, id, &mut work);
        }
        heap.visit_roots(&mut |slot: &mut Option<ObjectReference>| {
            if let Some(object) = *slot {
                let (new, more) = ctx.evacuate(object);
                *slot = Some(new);
                work.extend(more);
            }
        });
    }
    debug!("Young GC: {} objects reached from roots", work.len());

    parallel::drain(&mut contexts, work, |ctx, item, queue| ctx.scan_copy(item, queue));

    let mut self_forwarded = vec![];
    let mut pinned = vec![];
    for ctx in contexts.iter_mut() {
        ctx.retire_buffers();
        heap.stats.copied(ctx.copied);
        heap.stats.copied_bytes(ctx.copied_bytes);
        heap.stats.promoted(ctx.promoted);
        heap.stats.promoted_bytes(ctx.promoted_bytes);
        self_forwarded.append(&mut ctx.self_forwarded);
        pinned.append(&mut ctx.pinned);
    }
    drop(contexts);

    let evacuation_failed = !self_forwarded.is_empty();
    if evacuation_failed {
        warn!(
            "Young GC: {} objects could not be evacuated",
            self_forwarded.len()
        );
        heap.stats.evacuation_failed(self_forwarded.len());
    }
    if !pinned.is_empty() {
        debug!("Young GC: {} pinned objects kept in place", pinned.len());
        heap.stats.kept_pinned(pinned.len());
    }
    if evacuation_failed || !pinned.is_empty() {
        self_forwarded.append(&mut pinned);
        retain_regions(heap, &cset, &self_forwarded);
    }

    let freed_regions = heap.young.end_collection(&cset);
    heap.stats.released_regions(freed_regions);
    YoungOutcome {
        evacuation_failed,
        freed_regions,
    }
}
