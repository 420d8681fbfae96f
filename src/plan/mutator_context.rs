//! The per-thread allocation and barrier context.
//!
//! A `Mutator` is bound to one thread. It owns a thread-local allocation buffer in
//! eden, a barrier, root handles, and an allocator for internal metadata. Every
//! allocation is a safepoint.

use super::barriers::{Barrier, BarrierSelector, GenerationalBarrier, NoBarrier};
use super::global::Collector;
use super::roots::RootHandle;
use super::{GcCause, Generation};
use crate::heap::HeapContext;
use crate::object;
use crate::scheduler::{MutatorId, MutatorShared};
use crate::util::alloc::{AllocationError, Allocator, BumpAllocator, RunSlotsAllocator};
use crate::util::constants::MIN_OBJECT_ALIGNMENT;
use crate::util::{Address, ObjectReference};
use crate::vm::ClassId;
use std::sync::Arc;

/// Where an object should be allocated.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Default)]
pub enum AllocationSemantics {
    /// Young space, unless the size says otherwise.
    #[default]
    Default,
    /// Straight into tenured space (pretenuring), unless the object is humongous.
    Tenured,
    /// In the humongous space, whatever the size.
    Humongous,
}

pub struct Mutator {
    heap: Arc<HeapContext>,
    shared: Arc<MutatorShared>,
    tlab: BumpAllocator,
    tlab_size: usize,
    barrier: Box<dyn Barrier>,
    internal: RunSlotsAllocator,
}

impl Mutator {
    pub(crate) fn new(heap: Arc<HeapContext>) -> Mutator {
        let shared = heap.rendezvous.register();
        let barrier: Box<dyn Barrier> = match heap.algorithm.barrier_selector() {
            BarrierSelector::NoBarrier => Box::new(NoBarrier),
            BarrierSelector::Generational => Box::new(GenerationalBarrier::new(
                heap.pool.clone(),
                heap.card_table.clone(),
                heap.satb.clone(),
            )),
        };
        let tlab_size = (*heap.options.tlab_size).min(heap.pool.region_size());
        let internal = heap.internal.new_allocator();
        debug!("Bound {}", shared.id());
        Mutator {
            tlab: BumpAllocator::new(tlab_size),
            tlab_size,
            barrier,
            internal,
            shared,
            heap,
        }
    }

    pub fn id(&self) -> MutatorId {
        self.shared.id()
    }

    pub fn heap(&self) -> &Arc<HeapContext> {
        &self.heap
    }

    /// Allocate an object of `class`. `length` is the element count for arrays and
    /// ignored otherwise. The object is zeroed apart from its header.
    pub fn alloc(
        &mut self,
        class: ClassId,
        length: usize,
        semantics: AllocationSemantics,
    ) -> Result<ObjectReference, AllocationError> {
        self.poll_safepoint();
        let info = self.heap.classes.expect(class);
        let length = if info.is_array() { length } else { 0 };
        let requested = info
            .requested_size(length)
            .ok_or(AllocationError::HeapOutOfMemory)?;
        let size = info
            .allocated_size(length)
            .ok_or(AllocationError::HeapOutOfMemory)?;

        if let Some(generation) = self.heap.trigger.on_allocation() {
            self.request_gc(GcCause::HeapThreshold, generation, true);
        }

        let addr = self.alloc_memory(size, requested, semantics)?;
        if self.heap.rendezvous.is_world_stopped() {
            self.heap.stats.allocation_during_pause(1);
        }
        // New objects are black while a marking is running.
        let marked = self.heap.satb.is_active();
        let object = object::initialize(addr, class, length, marked);
        if marked {
            if let Some(region) = self.heap.pool.region_of(addr) {
                region.add_live_bytes(size);
            }
        }
        trace!("Allocated {} ({} bytes, {})", object, size, class);
        Ok(object)
    }

    /// Try the allocation, collecting more and more aggressively when it fails.
    fn alloc_memory(
        &mut self,
        size: usize,
        requested: usize,
        semantics: AllocationSemantics,
    ) -> Result<Address, AllocationError> {
        if let Some(addr) = self.try_alloc(size, requested, semantics) {
            return Ok(addr);
        }
        // Young collections only help allocations that go to eden.
        if self.heap.allocates_young(requested, semantics) {
            self.request_gc(GcCause::AllocFailure, Generation::Young, true);
            if let Some(addr) = self.try_alloc(size, requested, semantics) {
                return Ok(addr);
            }
        }
        self.request_gc(GcCause::AllocFailure, Generation::Full, true);
        if let Some(addr) = self.try_alloc(size, requested, semantics) {
            return Ok(addr);
        }
        self.request_gc(GcCause::OutOfMemory, Generation::Full, true);
        if let Some(addr) = self.try_alloc(size, requested, semantics) {
            return Ok(addr);
        }
        warn!(
            "{}: out of memory allocating {} bytes ({:?})",
            self.id(),
            size,
            semantics
        );
        Err(AllocationError::HeapOutOfMemory)
    }

    fn try_alloc(
        &mut self,
        size: usize,
        requested: usize,
        semantics: AllocationSemantics,
    ) -> Option<Address> {
        let heap = &self.heap;
        if semantics == AllocationSemantics::Humongous || requested >= heap.humongous_threshold {
            return heap.alloc_humongous(size);
        }
        if semantics == AllocationSemantics::Tenured || requested >= heap.large_object_threshold {
            return heap.alloc_tenured(size);
        }
        if size > self.tlab_size {
            return heap.alloc_eden(size, size).map(|(start, _)| start);
        }
        if let Some(addr) = self.tlab.alloc(size, MIN_OBJECT_ALIGNMENT) {
            return Some(addr);
        }
        self.tlab.retire();
        let (start, end) = heap.alloc_eden(size, self.tlab_size)?;
        self.tlab.set_limit(start, end);
        self.tlab.alloc(size, MIN_OBJECT_ALIGNMENT)
    }

    /// Give up the allocation buffer and publish barrier buffers, so the collector
    /// sees a parseable heap and every logged reference.
    fn prepare_for_safepoint(&mut self) {
        self.tlab.retire();
        self.barrier.flush();
    }

    /// Stop here if a collection wants the world stopped, and run pending
    /// collections if this heap collects on the requesting thread.
    pub fn poll_safepoint(&mut self) {
        if self.heap.rendezvous.is_suspend_requested() {
            self.prepare_for_safepoint();
            self.heap.rendezvous.park(&self.shared);
        }
        if self.heap.runs_gc_in_place() && self.heap.requester.has_pending() {
            self.blocked(|heap| heap.run_pending_in_place());
        }
    }

    /// The thread is about to block (I/O, a lock, native code). It must not touch
    /// the heap until `leave_blocked`.
    pub fn enter_blocked(&mut self) {
        self.prepare_for_safepoint();
        self.heap.rendezvous.enter_blocked(&self.shared);
    }

    /// Waits while the world is stopped.
    pub fn leave_blocked(&mut self) {
        self.heap.rendezvous.leave_blocked(&self.shared);
    }

    fn blocked<R>(&mut self, f: impl FnOnce(&HeapContext) -> R) -> R {
        self.enter_blocked();
        let result = f(&self.heap);
        self.leave_blocked();
        result
    }

    /// Ask for a collection. With `wait`, returns once it (or a cycle that covers
    /// it) has finished.
    pub fn request_gc(&mut self, cause: GcCause, generation: Generation, wait: bool) {
        let Some(ticket) = self.heap.submit(cause, generation) else {
            return;
        };
        if self.heap.runs_gc_in_place() {
            if wait {
                self.blocked(|heap| heap.run_pending_in_place());
            }
            return;
        }
        if wait {
            self.blocked(|heap| heap.requester.wait_for(ticket));
        }
    }

    /// Wait until every collection requested so far has finished.
    pub fn wait_for_gc_finish(&mut self) {
        let ticket = self.heap.requester.last_ticket();
        if self.heap.runs_gc_in_place() {
            self.blocked(|heap| heap.run_pending_in_place());
        } else {
            self.blocked(|heap| heap.requester.wait_for(ticket));
        }
    }

    /// Store `target` into the reference field at `offset` bytes of `src`.
    #[inline(always)]
    pub fn write_ref(
        &mut self,
        src: ObjectReference,
        offset: usize,
        target: Option<ObjectReference>,
    ) {
        let slot = src.to_raw_address() + offset;
        self.barrier.object_reference_write(src, slot, target);
    }

    #[inline(always)]
    pub fn read_ref(&mut self, src: ObjectReference, offset: usize) -> Option<ObjectReference> {
        let slot = src.to_raw_address() + offset;
        self.barrier.object_reference_read(src, slot)
    }

    /// Load the referent of the weak reference `reference`. `None` if it was
    /// cleared, or if `reference` is not a weak reference.
    pub fn read_referent(&mut self, reference: ObjectReference) -> Option<ObjectReference> {
        let slot = object::referent_slot(reference, &self.heap.classes)?;
        self.barrier.weak_reference_read(slot)
    }

    /// Keep `object` where it is until it is unpinned. Young collections leave a
    /// pinned object in its region, and compaction skips regions holding one.
    /// Returns false if it was already pinned.
    pub fn pin_object(&mut self, object: ObjectReference) -> bool {
        object::set_pinned(object)
    }

    /// Returns false if `object` was not pinned.
    pub fn unpin_object(&mut self, object: ObjectReference) -> bool {
        object::unset_pinned(object)
    }

    pub fn is_pinned(&self, object: ObjectReference) -> bool {
        object::is_pinned(object)
    }

    /// A root owned by this mutator. The collector keeps the referent alive and
    /// updates the handle when the referent moves.
    pub fn new_root(&mut self, value: Option<ObjectReference>) -> RootHandle {
        self.shared.roots.lock().unwrap().add(value)
    }

    pub fn get_root(&self, handle: RootHandle) -> Option<ObjectReference> {
        self.shared.roots.lock().unwrap().get(handle)
    }

    pub fn set_root(&mut self, handle: RootHandle, value: Option<ObjectReference>) {
        self.shared.roots.lock().unwrap().set(handle, value)
    }

    pub fn remove_root(&mut self, handle: RootHandle) {
        self.shared.roots.lock().unwrap().remove(handle)
    }

    /// Allocate zeroed runtime metadata. The collector never looks at it.
    pub fn alloc_internal(&mut self, size: usize) -> Option<Address> {
        self.internal.alloc(size, MIN_OBJECT_ALIGNMENT)
    }

    pub fn free_internal(&mut self, addr: Address, size: usize) {
        self.internal.free(addr, size)
    }

    /// Call `visitor` on every object in the heap. With `safe`, the world is stopped
    /// for the walk; otherwise the caller must make sure nobody else allocates.
    pub fn for_each_object(&mut self, safe: bool, visitor: &mut dyn FnMut(ObjectReference)) {
        if safe {
            self.blocked(|heap| {
                let _cycle = heap.lock_cycle();
                let _world = heap.rendezvous.stop_the_world();
                heap.walk_objects(visitor);
            });
        } else {
            self.prepare_for_safepoint();
            self.heap.walk_objects(visitor);
        }
    }
}

impl Drop for Mutator {
    fn drop(&mut self) {
        self.prepare_for_safepoint();
        self.heap.rendezvous.unregister(&self.shared);
        debug!("Unbound {}", self.shared.id());
    }
}
