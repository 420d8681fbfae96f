//! The heap: every component of one garbage-collected heap, wired together.
//!
//! Several heaps can live in one process. Everything that used to be global state
//! of the runtime hangs off a `HeapContext`, which mutators and the GC controller
//! share through an `Arc`.

use crate::object;
use crate::plan::gc_requester::GCRequester;
use crate::plan::generational::SatbQueue;
use crate::plan::global::{Collector, GcAlgorithm};
use crate::plan::mutator_context::AllocationSemantics;
use crate::plan::roots::{RootHandle, RootTable};
use crate::plan::{GcCause, GcTask, Generation};
use crate::policy::{InternalSpace, LargeObjectSpace, TenuredSpace, YoungSpace};
use crate::scheduler::controller::{is_controller_thread, GCController};
use crate::scheduler::Rendezvous;
use crate::util::alloc::AllocationError;
use crate::util::card_table::CardTable;
use crate::util::constants::BYTES_IN_KBYTE;
use crate::util::heap::{GCTrigger, HeapUsage, RegionFlags, RegionPool, SpaceType};
use crate::util::linear_scan::CellIterator;
use crate::util::options::Options;
use crate::util::reference_processor::ReferenceProcessor;
use crate::util::sanity;
use crate::util::statistics::{GcStats, GcStatsSnapshot};
use crate::util::{Address, ObjectReference};
use crate::vm::{
    ClassId, ClassInfo, ClassRegistrationError, ClassRegistry, NoScanning, RootVisitor, Scanning,
};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::thread::JoinHandle;
use std::time::Duration;

pub struct HeapContext {
    pub(crate) options: Options,
    pub(crate) pool: Arc<RegionPool>,
    pub(crate) card_table: Arc<CardTable>,
    pub(crate) classes: ClassRegistry,
    pub(crate) young: YoungSpace,
    pub(crate) tenured: TenuredSpace,
    pub(crate) los: LargeObjectSpace,
    pub(crate) internal: InternalSpace,
    pub(crate) rendezvous: Rendezvous,
    pub(crate) requester: Arc<GCRequester>,
    pub(crate) trigger: GCTrigger,
    pub(crate) algorithm: GcAlgorithm,
    pub(crate) satb: Arc<SatbQueue>,
    pub(crate) references: ReferenceProcessor,
    pub(crate) stats: GcStats,
    /// Requests of at least this many bytes are humongous.
    pub(crate) humongous_threshold: usize,
    /// Requests of at least this many bytes go straight to tenured space.
    pub(crate) large_object_threshold: usize,
    global_roots: Mutex<RootTable>,
    scanning: Box<dyn Scanning>,
    collection_enabled: AtomicBool,
    controller: Mutex<Option<JoinHandle<()>>>,
    /// Held while a cycle runs. Serializes everything that stops the world.
    cycle_lock: Mutex<()>,
    native_bytes: AtomicUsize,
    native_gc_threshold: AtomicUsize,
}

impl HeapContext {
    pub fn options(&self) -> &Options {
        &self.options
    }

    pub fn register_class(&self, info: ClassInfo) -> Result<ClassId, ClassRegistrationError> {
        self.classes.register(info)
    }

    pub fn classes(&self) -> &ClassRegistry {
        &self.classes
    }

    pub fn region_pool(&self) -> &RegionPool {
        &self.pool
    }

    pub fn card_table(&self) -> &CardTable {
        &self.card_table
    }

    pub fn collector(&self) -> &dyn Collector {
        &self.algorithm
    }

    /// Allow collections. Before this, allocation failures are reported straight away.
    pub(crate) fn initialize_collection(self: &Arc<Self>) -> std::io::Result<()> {
        let mut controller = self.controller.lock().unwrap();
        if self.collection_enabled.load(Ordering::Acquire) {
            return Ok(());
        }
        if !self.options.run_gc_in_place {
            let periodic = match self.options.periodic_gc_interval_ms {
                0 => None,
                ms => Some(Duration::from_millis(ms)),
            };
            let handle =
                GCController::new(Arc::downgrade(self), self.requester.clone(), periodic).spawn()?;
            *controller = Some(handle);
        }
        self.collection_enabled.store(true, Ordering::Release);
        info!(
            "Collection enabled: {} plan, {} heap, {} regions of {}K",
            self.algorithm.name(),
            crate::util::options::MemorySize(self.usage().total_bytes),
            self.pool.total_regions(),
            self.pool.region_size() / BYTES_IN_KBYTE
        );
        Ok(())
    }

    pub fn is_collection_enabled(&self) -> bool {
        self.collection_enabled.load(Ordering::Acquire)
    }

    pub(crate) fn runs_gc_in_place(&self) -> bool {
        self.options.run_gc_in_place
    }

    /// Queue a request. `None` if it is dropped: collection is not enabled yet, the
    /// request is explicit and explicit requests are ignored, or it is a background
    /// request while collections are postponed.
    pub(crate) fn submit(&self, cause: GcCause, generation: Generation) -> Option<u64> {
        if !self.is_collection_enabled() {
            debug!("{} {} GC requested before collection was enabled", cause, generation);
            return None;
        }
        if cause == GcCause::Explicit && self.options.ignore_explicit_gc {
            debug!("Ignoring explicit GC request");
            return None;
        }
        if cause.is_background() && self.requester.is_postponed() {
            debug!("Ignoring {} {} request: collections are postponed", cause, generation);
            return None;
        }
        Some(self.requester.request(cause, generation))
    }

    pub(crate) fn lock_cycle(&self) -> MutexGuard<()> {
        self.cycle_lock.lock().unwrap()
    }

    /// Run one task on this thread. Called by the controller.
    pub(crate) fn run_gc_task(&self, task: GcTask) {
        let _cycle = self.lock_cycle();
        self.run_task_locked(task);
    }

    /// Run every queued task on this thread. The caller must be blocked.
    pub(crate) fn run_pending_in_place(&self) {
        let _cycle = self.lock_cycle();
        while let Some(task) = self.requester.try_next_task() {
            self.run_task_locked(task);
        }
    }

    fn run_task_locked(&self, task: GcTask) {
        debug!("Running {:?}", task);
        let collected = crate::util::panic::abort_on_panic("Garbage collection", || {
            self.algorithm.trigger_cycle(self, &task)
        });
        if collected == Some(Generation::Full) {
            let native = self.native_bytes.load(Ordering::Relaxed);
            self.native_gc_threshold.store(
                native.saturating_add(*self.options.native_gc_watermark),
                Ordering::Relaxed,
            );
        }
        self.requester.finish(task, collected);
    }

    /// Visit every root: mutator handles, the runtime's mutator and global roots,
    /// and global handles. The world must be stopped.
    pub(crate) fn visit_roots(&self, visitor: &mut dyn RootVisitor) {
        for mutator in self.rendezvous.mutators() {
            mutator.roots.lock().unwrap().scan(visitor);
            self.scanning.scan_mutator_roots(mutator.id(), visitor);
        }
        self.global_roots.lock().unwrap().scan(visitor);
        self.scanning.scan_global_roots(visitor);
    }

    #[inline(always)]
    pub(crate) fn in_collection_set(&self, object: ObjectReference) -> bool {
        self.pool
            .region_of(object.to_raw_address())
            .map_or(false, |r| r.has_flag(RegionFlags::IN_CSET))
    }

    /// Would an allocation of this kind go to eden?
    pub(crate) fn allocates_young(&self, requested: usize, semantics: AllocationSemantics) -> bool {
        semantics == AllocationSemantics::Default && requested < self.large_object_threshold
    }

    pub(crate) fn alloc_humongous(&self, size: usize) -> Option<Address> {
        let addr = self.los.alloc(size)?;
        self.stats.allocated_bytes(size);
        self.poll_trigger();
        Some(addr)
    }

    pub(crate) fn alloc_tenured(&self, size: usize) -> Option<Address> {
        let addr = self.tenured.alloc(size, crate::util::constants::MIN_OBJECT_ALIGNMENT)?;
        self.stats.allocated_bytes(size);
        self.poll_trigger();
        Some(addr)
    }

    /// A buffer of at least `min` and at most `preferred` bytes in eden.
    pub(crate) fn alloc_eden(&self, min: usize, preferred: usize) -> Option<(Address, Address)> {
        let (start, end) = self.young.alloc_eden(min, preferred)?;
        self.stats.allocated_bytes(end - start);
        self.poll_trigger();
        Some((start, end))
    }

    /// Ask the trigger policy whether a background collection is due.
    fn poll_trigger(&self) {
        if !self.is_collection_enabled() {
            return;
        }
        if let Some(generation) = self.trigger.poll(&self.usage()) {
            self.submit(GcCause::HeapThreshold, generation);
        }
    }

    pub fn usage(&self) -> HeapUsage {
        let region_size = self.pool.region_size();
        let heap_regions = self.pool.total_regions()
            - self.pool.free_regions()
            - self.pool.regions_in(SpaceType::Internal);
        HeapUsage {
            used_bytes: heap_regions * region_size,
            total_bytes: self.pool.total_regions() * region_size,
            young_bytes: self.pool.regions_in(SpaceType::Young) * region_size,
        }
    }

    /// Bytes in heap regions that are in use (young, tenured and humongous).
    pub fn used_bytes(&self) -> usize {
        self.usage().used_bytes
    }

    pub fn total_bytes(&self) -> usize {
        self.usage().total_bytes
    }

    pub fn free_bytes(&self) -> usize {
        self.pool.free_regions() * self.pool.region_size()
    }

    pub fn stats(&self) -> GcStatsSnapshot {
        self.stats.snapshot(&self.pool)
    }

    pub fn space_of(&self, object: ObjectReference) -> SpaceType {
        self.pool.space_of(object.to_raw_address())
    }

    /// Account off-heap memory the runtime allocated on behalf of heap objects.
    pub fn notify_native_allocation(&self, bytes: usize) {
        let mut current = self.native_bytes.load(Ordering::Relaxed);
        loop {
            let new = current.saturating_add(bytes);
            match self.native_bytes.compare_exchange_weak(
                current,
                new,
                Ordering::Relaxed,
                Ordering::Relaxed,
            ) {
                Ok(_) => {
                    current = new;
                    break;
                }
                Err(actual) => current = actual,
            }
        }
        if current >= self.native_gc_threshold.load(Ordering::Relaxed) {
            debug!("{} native bytes registered, requesting a GC", current);
            self.submit(GcCause::NativeAlloc, Generation::Full);
        }
    }

    pub fn notify_native_free(&self, bytes: usize) {
        let _ = self
            .native_bytes
            .fetch_update(Ordering::Relaxed, Ordering::Relaxed, |v| {
                Some(v.saturating_sub(bytes))
            });
    }

    pub fn native_bytes(&self) -> usize {
        self.native_bytes.load(Ordering::Relaxed)
    }

    /// A root that does not belong to any mutator. Must be called by a running mutator.
    pub fn add_global_root(&self, value: Option<ObjectReference>) -> RootHandle {
        self.global_roots.lock().unwrap().add(value)
    }

    pub fn get_global_root(&self, handle: RootHandle) -> Option<ObjectReference> {
        self.global_roots.lock().unwrap().get(handle)
    }

    pub fn set_global_root(&self, handle: RootHandle, value: Option<ObjectReference>) {
        self.global_roots.lock().unwrap().set(handle, value)
    }

    pub fn remove_global_root(&self, handle: RootHandle) {
        self.global_roots.lock().unwrap().remove(handle)
    }

    /// Call `visitor` on every object in young, tenured and humongous regions.
    pub(crate) fn walk_objects(&self, visitor: &mut dyn FnMut(ObjectReference)) {
        for id in self.pool.heap_regions() {
            let start = self.pool.region_start(id);
            let top = self.pool.region(id).top();
            for object in CellIterator::new(start, top, &self.classes).objects() {
                visitor(object);
            }
        }
    }

    fn verification_enabled(&self) -> bool {
        self.options.verify_heap || cfg!(feature = "extreme_assertions")
    }

    fn report_verification(&self, what: &str, problems: Vec<String>) {
        if problems.is_empty() {
            trace!("Verified heap {}", what);
            return;
        }
        for p in &problems {
            error!("Heap verification {}: {}", what, p);
        }
        if self.options.fail_on_verification {
            panic!(
                "Heap verification {} found {} problem(s), first: {}",
                what,
                problems.len(),
                problems[0]
            );
        }
    }

    /// Check that everything reachable is intact. The world must be stopped.
    pub(crate) fn verify_heap(&self, what: &str) {
        if self.verification_enabled() {
            self.report_verification(what, sanity::verify_heap(self));
        }
    }

    /// Check that no marked object points at an unmarked one. The world must be
    /// stopped and marking complete.
    pub(crate) fn verify_marking(&self) {
        if self.verification_enabled() {
            self.report_verification("after marking", sanity::verify_tricolor(self));
        }
    }

    pub(crate) fn log_cycle(
        &self,
        task: &GcTask,
        collected: Generation,
        before: &HeapUsage,
        after: &HeapUsage,
        elapsed: Duration,
    ) {
        info!(
            "GC({}) {} ({}): {}K->{}K ({}K) {:.3}ms",
            self.stats.gc_count(),
            collected,
            task.cause,
            before.used_bytes / BYTES_IN_KBYTE,
            after.used_bytes / BYTES_IN_KBYTE,
            after.total_bytes / BYTES_IN_KBYTE,
            elapsed.as_secs_f64() * 1000.0
        );
    }

    /// The class of `object`. For diagnostics and the API.
    pub fn class_of(&self, object: ObjectReference) -> ClassId {
        object::class_id(object)
    }
}

impl Drop for HeapContext {
    fn drop(&mut self) {
        self.requester.shutdown();
        let handle = self.controller.get_mut().ok().and_then(|c| c.take());
        if let Some(handle) = handle {
            if is_controller_thread() {
                // The controller dropped the last reference; it exits on its own.
                return;
            }
            if handle.join().is_err() {
                error!("The GC controller thread panicked");
            }
        }
        debug!("Heap dropped: {}", self.stats());
    }
}

/// Collects options and collaborator hooks, then builds a heap.
pub struct HeapBuilder {
    pub options: Options,
    scanning: Box<dyn Scanning>,
}

impl Default for HeapBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl HeapBuilder {
    /// Default options, overridden by `GENGC_*` environment variables.
    pub fn new() -> Self {
        let mut builder = Self::new_no_env_vars();
        builder.options.read_env_var_settings();
        builder
    }

    pub fn new_no_env_vars() -> Self {
        HeapBuilder {
            options: Options::default(),
            scanning: Box::new(NoScanning),
        }
    }

    /// Set an option by name. Returns false (and keeps the old value) if it cannot be set.
    pub fn set_option(&mut self, name: &str, value: &str) -> bool {
        self.options.set_from_string(name, value)
    }

    /// Set options from a string of space-separated `name=value` pairs.
    pub fn set_options_bulk_by_str(&mut self, options: &str) -> bool {
        self.options.set_bulk_from_string(options)
    }

    pub fn set_scanning<S: Scanning + 'static>(&mut self, scanning: S) {
        self.scanning = Box::new(scanning);
    }

    pub fn build(self) -> Result<Arc<HeapContext>, AllocationError> {
        let options = self.options;
        let pool = RegionPool::new(*options.heap_size, options.log_region_size).map_err(|e| {
            error!("Cannot reserve a {} byte heap: {}", *options.heap_size, e);
            AllocationError::MmapOutOfMemory
        })?;
        let pool = Arc::new(pool);
        let card_table = Arc::new(CardTable::new(
            pool.heap_start(),
            pool.heap_end() - pool.heap_start(),
        ));
        let humongous_threshold = options.humongous_threshold_bytes();
        let large_object_threshold = options.large_object_threshold_bytes();
        debug!(
            "Building heap at [{}, {}): humongous >= {}B, tenured >= {}B",
            pool.heap_start(),
            pool.heap_end(),
            humongous_threshold,
            large_object_threshold
        );
        let native_gc_threshold = *options.native_gc_watermark;
        Ok(Arc::new(HeapContext {
            card_table,
            classes: ClassRegistry::new(),
            young: YoungSpace::new(pool.clone(), &options),
            tenured: TenuredSpace::new(pool.clone()),
            los: LargeObjectSpace::new(pool.clone()),
            internal: InternalSpace::new(pool.clone()),
            rendezvous: Rendezvous::new(),
            requester: Arc::new(GCRequester::new()),
            trigger: GCTrigger::new(&options),
            algorithm: GcAlgorithm::new(&options),
            satb: Arc::new(SatbQueue::new()),
            references: ReferenceProcessor::new(),
            stats: GcStats::default(),
            humongous_threshold,
            large_object_threshold,
            global_roots: Mutex::new(RootTable::default()),
            scanning: self.scanning,
            collection_enabled: AtomicBool::new(false),
            controller: Mutex::new(None),
            cycle_lock: Mutex::new(()),
            native_bytes: AtomicUsize::new(0),
            native_gc_threshold: AtomicUsize::new(native_gc_threshold),
            pool,
            options,
        }))
    }
}
