//! Runtime-to-heap interface: safe Rust APIs.
//!
//! The interpreter, the compilers and the rest of the runtime talk to the heap
//! through these functions. We expect a runtime to wrap them in its own entry
//! points, and to expose them to native code if necessary.
//!
//! A heap is created once with [`gc_init`] and shared as an `Arc<HeapContext>`.
//! Every thread that touches the heap binds a mutator with [`bind_mutator`] and
//! passes `&mut Mutator` to the allocation, barrier and safepoint functions.
//! A mutator is not `Sync`: it belongs to one thread.

use crate::heap::{HeapBuilder, HeapContext};
use crate::object;
use crate::plan::gc_requester::PostponeError;
use crate::plan::{AllocationSemantics, GcCause, Generation, Mutator, RootHandle};
use crate::util::alloc::AllocationError;
use crate::util::heap::SpaceType;
use crate::util::statistics::GcStatsSnapshot;
use crate::util::{Address, ObjectReference};
use crate::vm::{ClassId, ClassInfo, ClassRegistrationError};
use std::sync::Arc;

/// Initialize a heap. The runtime should call this before anything else.
///
/// We expect a runtime to initialize the heap in the following steps:
///
/// 1. Create a [`HeapBuilder`] and set options on it.
/// 2. Build the heap with this function. It reserves the whole heap up front.
/// 3. Register classes and bind mutators.
/// 4. Call [`initialize_collection`] once the runtime can cope with collections.
///    Before that, allocation failures are reported straight away.
///
/// This attempts to install a logger. If the runtime installs its own logger, it
/// should do so before calling this function.
pub fn gc_init(builder: HeapBuilder) -> Result<Arc<HeapContext>, AllocationError> {
    match crate::util::logger::try_init() {
        Ok(_) => debug!("gengc initialized the logger."),
        Err(_) => debug!("gengc failed to initialize the logger. Possibly a logger has been initialized by user."),
    }
    let heap = builder.build()?;
    info!(
        "Initialized a {:?} heap of {} bytes",
        heap.options().plan,
        *heap.options().heap_size
    );
    #[cfg(feature = "extreme_assertions")]
    warn!("The feature 'extreme_assertions' is enabled. The heap is verified around every GC. Slow performance should be expected.");
    Ok(heap)
}

/// Allow the heap to collect. Unless collections run in place, this spawns the
/// GC controller thread.
pub fn initialize_collection(heap: &Arc<HeapContext>) -> std::io::Result<()> {
    heap.initialize_collection()
}

pub fn is_collection_enabled(heap: &HeapContext) -> bool {
    heap.is_collection_enabled()
}

/// Register the calling thread as a mutator. The runtime should keep the mutator
/// somewhere the thread can reach it cheaply, e.g. in a thread local.
pub fn bind_mutator(heap: &Arc<HeapContext>) -> Box<Mutator> {
    Box::new(Mutator::new(heap.clone()))
}

/// Unregister a mutator. Its root handles die with it.
pub fn destroy_mutator(mutator: Box<Mutator>) {
    drop(mutator);
}

pub fn register_class(
    heap: &HeapContext,
    info: ClassInfo,
) -> Result<ClassId, ClassRegistrationError> {
    heap.register_class(info)
}

/// Allocate an instance of `class`. The object is zeroed apart from its header.
/// This is a safepoint.
#[inline(always)]
pub fn alloc_object(
    mutator: &mut Mutator,
    class: ClassId,
    semantics: AllocationSemantics,
) -> Result<ObjectReference, AllocationError> {
    mutator.alloc(class, 0, semantics)
}

/// Allocate an array of `length` elements. This is a safepoint.
#[inline(always)]
pub fn alloc_array(
    mutator: &mut Mutator,
    class: ClassId,
    length: usize,
    semantics: AllocationSemantics,
) -> Result<ObjectReference, AllocationError> {
    mutator.alloc(class, length, semantics)
}

/// The write barrier: store `target` into the reference field at `offset` of `src`.
#[inline(always)]
pub fn object_reference_write(
    mutator: &mut Mutator,
    src: ObjectReference,
    offset: usize,
    target: Option<ObjectReference>,
) {
    mutator.write_ref(src, offset, target)
}

/// The read barrier: load the reference field at `offset` of `src`.
#[inline(always)]
pub fn object_reference_read(
    mutator: &mut Mutator,
    src: ObjectReference,
    offset: usize,
) -> Option<ObjectReference> {
    mutator.read_ref(src, offset)
}

/// Load the referent of a weak reference. The runtime must read referents through
/// this, not `object_reference_read`, so that concurrent marking sees them.
pub fn weak_reference_get(
    mutator: &mut Mutator,
    reference: ObjectReference,
) -> Option<ObjectReference> {
    mutator.read_referent(reference)
}

/// Keep `object` at its address until [`unpin_object`]. Returns false if it was
/// already pinned.
pub fn pin_object(mutator: &mut Mutator, object: ObjectReference) -> bool {
    mutator.pin_object(object)
}

pub fn unpin_object(mutator: &mut Mutator, object: ObjectReference) -> bool {
    mutator.unpin_object(object)
}

pub fn is_pinned(object: ObjectReference) -> bool {
    object::is_pinned(object)
}

/// Read a non-reference word of an object. No barrier is needed.
pub fn read_word(object: ObjectReference, offset: usize) -> usize {
    object::read_word(object, offset)
}

pub fn write_word(object: ObjectReference, offset: usize, value: usize) {
    object::write_word(object, offset, value)
}

/// The address of element `index` of an array.
pub fn array_element_address(array: ObjectReference, index: usize) -> Address {
    array.to_raw_address() + object::array_element_offset(index)
}

pub fn array_length(array: ObjectReference) -> usize {
    object::array_length(array)
}

pub fn class_of(object: ObjectReference) -> ClassId {
    object::class_id(object)
}

/// A hash of the object that does not change when the object moves.
pub fn identity_hash(object: ObjectReference) -> u64 {
    object::identity_hash(object)
}

/// The number of young collections the object has survived.
pub fn object_age(object: ObjectReference) -> u8 {
    object::age(object)
}

/// Request a collection of `generation`. With `wait`, this returns once the
/// collection (or one that covers it) has finished.
pub fn request_gc(mutator: &mut Mutator, cause: GcCause, generation: Generation, wait: bool) {
    mutator.request_gc(cause, generation, wait)
}

/// Stop threshold, native-allocation and periodic collections until
/// [`postpone_gc_end`]. Explicit requests and allocation failures still collect.
pub fn postpone_gc_start(heap: &HeapContext) -> Result<(), PostponeError> {
    heap.requester.postpone_start()
}

pub fn postpone_gc_end(heap: &HeapContext) -> Result<(), PostponeError> {
    heap.requester.postpone_end()
}

/// The program asked for a collection (e.g. `System.gc()`). Collects the full heap
/// unless `full_heap_system_gc` is off, and waits for it. Ignored if
/// `ignore_explicit_gc` is set.
pub fn handle_user_collection_request(mutator: &mut Mutator) {
    let generation = if mutator.heap().options().full_heap_system_gc {
        Generation::Full
    } else {
        Generation::Young
    };
    mutator.request_gc(GcCause::Explicit, generation, true)
}

/// The process is about to fork. Compacts the heap so the child shares as many
/// pages as possible.
pub fn prepare_for_fork(mutator: &mut Mutator) {
    mutator.request_gc(GcCause::ForkPrepare, Generation::Full, true)
}

/// Wait for every collection requested so far.
pub fn wait_for_gc_finish(mutator: &mut Mutator) {
    mutator.wait_for_gc_finish()
}

/// Account memory allocated outside the heap on behalf of heap objects. Enough
/// of it requests a full collection.
pub fn notify_native_allocation(heap: &HeapContext, bytes: usize) {
    heap.notify_native_allocation(bytes)
}

pub fn notify_native_free(heap: &HeapContext, bytes: usize) {
    heap.notify_native_free(bytes)
}

/// Visit every object in the heap, live or not yet collected. With `safe`, the
/// world is stopped during the walk. Without it, the caller must make sure no
/// other mutator runs.
pub fn for_each_object(
    mutator: &mut Mutator,
    safe: bool,
    visitor: &mut dyn FnMut(ObjectReference),
) {
    mutator.for_each_object(safe, visitor)
}

/// Poll for a pending stop-the-world request. Compiled code calls this at method
/// entries and backward branches; the interpreter between bytecodes.
#[inline(always)]
pub fn safepoint_poll(mutator: &mut Mutator) {
    mutator.poll_safepoint()
}

/// The thread is about to block, or to run native code that does not touch the heap.
pub fn enter_blocked(mutator: &mut Mutator) {
    mutator.enter_blocked()
}

/// The thread is back. Waits if the world is stopped.
pub fn leave_blocked(mutator: &mut Mutator) {
    mutator.leave_blocked()
}

pub fn new_root(mutator: &mut Mutator, value: Option<ObjectReference>) -> RootHandle {
    mutator.new_root(value)
}

pub fn get_root(mutator: &Mutator, handle: RootHandle) -> Option<ObjectReference> {
    mutator.get_root(handle)
}

pub fn set_root(mutator: &mut Mutator, handle: RootHandle, value: Option<ObjectReference>) {
    mutator.set_root(handle, value)
}

pub fn remove_root(mutator: &mut Mutator, handle: RootHandle) {
    mutator.remove_root(handle)
}

pub fn add_global_root(heap: &HeapContext, value: Option<ObjectReference>) -> RootHandle {
    heap.add_global_root(value)
}

pub fn get_global_root(heap: &HeapContext, handle: RootHandle) -> Option<ObjectReference> {
    heap.get_global_root(handle)
}

pub fn set_global_root(heap: &HeapContext, handle: RootHandle, value: Option<ObjectReference>) {
    heap.set_global_root(handle, value)
}

pub fn remove_global_root(heap: &HeapContext, handle: RootHandle) {
    heap.remove_global_root(handle)
}

/// Allocate zeroed memory for runtime metadata from the internal space.
pub fn alloc_internal(mutator: &mut Mutator, size: usize) -> Option<Address> {
    mutator.alloc_internal(size)
}

pub fn free_internal(mutator: &mut Mutator, addr: Address, size: usize) {
    mutator.free_internal(addr, size)
}

/// Bytes in regions used by young, tenured and humongous objects.
pub fn used_bytes(heap: &HeapContext) -> usize {
    heap.used_bytes()
}

pub fn free_bytes(heap: &HeapContext) -> usize {
    heap.free_bytes()
}

pub fn total_bytes(heap: &HeapContext) -> usize {
    heap.total_bytes()
}

pub fn space_of(heap: &HeapContext, object: ObjectReference) -> SpaceType {
    heap.space_of(object)
}

pub fn stats(heap: &HeapContext) -> GcStatsSnapshot {
    heap.stats()
}
