// Some fixtures are only used by some tests. We simply allow dead code in this module.
#![allow(dead_code)]

use atomic_refcell::AtomicRefCell;
use std::sync::Arc;
use std::sync::Once;

use crate::heap::{HeapBuilder, HeapContext};
use crate::memory_manager;
use crate::plan::Mutator;

/// Options for heaps created by fixtures: small, with verification on.
pub const TEST_OPTIONS: &str =
    "heap_size=8M log_region_size=16 young_size=1M threads=2 tlab_size=4K verify_heap=true gc_trigger=fixed";

pub trait FixtureContent {
    fn create() -> Self;
}

pub struct Fixture<T: FixtureContent> {
    content: AtomicRefCell<Option<Box<T>>>,
    once: Once,
}

unsafe impl<T: FixtureContent> Sync for Fixture<T> {}

impl<T: FixtureContent> Fixture<T> {
    pub fn new() -> Self {
        Self {
            content: AtomicRefCell::new(None),
            once: Once::new(),
        }
    }

    fn init(&self) {
        self.once.call_once(|| {
            let content = Box::new(T::create());
            let mut borrow = self.content.borrow_mut();
            *borrow = Some(content);
        });
    }

    pub fn with_fixture<F: FnOnce(&T)>(&self, func: F) {
        self.init();
        let borrow = self.content.borrow();
        func(borrow.as_ref().unwrap())
    }

    pub fn with_fixture_mut<F: FnOnce(&mut T)>(&self, func: F) {
        self.init();
        let mut borrow = self.content.borrow_mut();
        func(borrow.as_mut().unwrap())
    }
}

impl<T: FixtureContent> Default for Fixture<T> {
    fn default() -> Self {
        Self::new()
    }
}

/// Build a heap from `TEST_OPTIONS` plus `extra` options, with collection enabled.
pub fn test_heap(extra: &str) -> Arc<HeapContext> {
    let mut builder = HeapBuilder::new_no_env_vars();
    assert!(builder.set_options_bulk_by_str(TEST_OPTIONS));
    assert!(builder.set_options_bulk_by_str(extra));
    let heap = memory_manager::gc_init(builder).unwrap();
    memory_manager::initialize_collection(&heap).unwrap();
    heap
}

/// A heap with one mutator bound to the current thread.
pub struct SingleMutator {
    pub heap: Arc<HeapContext>,
    pub mutator: Box<Mutator>,
}

impl SingleMutator {
    pub fn with_options(extra: &str) -> Self {
        let heap = test_heap(extra);
        let mutator = memory_manager::bind_mutator(&heap);
        SingleMutator { heap, mutator }
    }
}

impl FixtureContent for SingleMutator {
    fn create() -> Self {
        Self::with_options("")
    }
}

/// Like `SingleMutator`, but collections run on the thread that requests them.
pub struct InPlaceMutator {
    pub heap: Arc<HeapContext>,
    pub mutator: Box<Mutator>,
}

impl FixtureContent for InPlaceMutator {
    fn create() -> Self {
        let heap = test_heap("run_gc_in_place=true");
        let mutator = memory_manager::bind_mutator(&heap);
        InPlaceMutator { heap, mutator }
    }
}
