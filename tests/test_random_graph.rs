//! Mutate a random object graph, collect now and then, and compare the heap with a
//! model of the graph after every collection.

use std::collections::HashMap;
use std::sync::Arc;

use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;

use gengc::memory_manager;
use gengc::plan::RootHandle;
use gengc::util::ObjectReference;
use gengc::vm::{ClassId, ClassInfo};
use gengc::{AllocationSemantics, GcCause, Generation, HeapBuilder, HeapContext, Mutator};

const FIELDS: [usize; 2] = [16, 24];
const ID: usize = 32;
const ROOTS: usize = 32;
const OPERATIONS: usize = 20_000;

struct Model {
    edges: HashMap<usize, [Option<usize>; 2]>,
    roots: Vec<Option<usize>>,
    next_id: usize,
}

struct World {
    heap: Arc<HeapContext>,
    mutator: Box<Mutator>,
    class: ClassId,
    handles: Vec<RootHandle>,
    model: Model,
}

impl World {
    fn new(options: &str) -> World {
        let mut builder = HeapBuilder::new_no_env_vars();
        assert!(builder.set_options_bulk_by_str(
            "heap_size=16M log_region_size=16 young_size=2M threads=4 tlab_size=8K verify_heap=true"
        ));
        assert!(builder.set_options_bulk_by_str(options));
        let heap = memory_manager::gc_init(builder).unwrap();
        memory_manager::initialize_collection(&heap).unwrap();
        let vertex = ClassInfo::instance("Vertex", 40, &FIELDS);
        let class = memory_manager::register_class(&heap, vertex).unwrap();
        let mut mutator = memory_manager::bind_mutator(&heap);
        let handles = (0..ROOTS).map(|_| memory_manager::new_root(&mut mutator, None)).collect();
        World {
            heap,
            mutator,
            class,
            handles,
            model: Model {
                edges: HashMap::new(),
                roots: vec![None; ROOTS],
                next_id: 1,
            },
        }
    }

    fn root(&self, r: usize) -> Option<ObjectReference> {
        memory_manager::get_root(&self.mutator, self.handles[r])
    }

    fn set_root(&mut self, r: usize, value: Option<(ObjectReference, usize)>) {
        memory_manager::set_root(&mut self.mutator, self.handles[r], value.map(|v| v.0));
        self.model.roots[r] = value.map(|v| v.1);
    }

    fn field(
        &mut self,
        object: ObjectReference,
        id: usize,
        f: usize,
    ) -> Option<(ObjectReference, usize)> {
        let target = memory_manager::object_reference_read(&mut self.mutator, object, FIELDS[f]);
        let expected = self.model.edges[&id][f];
        assert_eq!(target.map(|t| memory_manager::read_word(t, ID)), expected);
        target.zip(expected)
    }

    fn set_field(
        &mut self,
        object: ObjectReference,
        id: usize,
        f: usize,
        value: Option<(ObjectReference, usize)>,
    ) {
        let target = value.map(|v| v.0);
        memory_manager::object_reference_write(&mut self.mutator, object, FIELDS[f], target);
        self.model.edges.get_mut(&id).unwrap()[f] = value.map(|v| v.1);
    }

    /// Follow up to `steps` random edges from root `r`.
    fn walk(
        &mut self,
        rng: &mut ChaCha8Rng,
        r: usize,
        steps: usize,
    ) -> Option<(ObjectReference, usize)> {
        let mut at = self.root(r).zip(self.model.roots[r])?;
        for _ in 0..steps {
            match self.field(at.0, at.1, rng.random_range(0..2)) {
                Some(next) => at = next,
                None => break,
            }
        }
        Some(at)
    }

    fn step(&mut self, rng: &mut ChaCha8Rng) {
        let r = rng.random_range(0..ROOTS);
        match rng.random_range(0..10) {
            0..=3 => {
                let semantics = if rng.random_bool(0.05) {
                    AllocationSemantics::Tenured
                } else {
                    AllocationSemantics::Default
                };
                let object =
                    memory_manager::alloc_object(&mut self.mutator, self.class, semantics).unwrap();
                let id = self.model.next_id;
                self.model.next_id += 1;
                memory_manager::write_word(object, ID, id);
                self.model.edges.insert(id, [None, None]);
                // The old root may have moved during the allocation.
                let old = self.root(r).zip(self.model.roots[r]);
                self.set_field(object, id, rng.random_range(0..2), old);
                self.set_root(r, Some((object, id)));
            }
            4..=6 => {
                let s = rng.random_range(0..ROOTS);
                let steps = rng.random_range(0..5);
                if let Some((object, id)) = self.walk(rng, r, steps) {
                    let value = self.walk(rng, s, 2);
                    self.set_field(object, id, rng.random_range(0..2), value);
                }
            }
            7 => self.set_root(r, None),
            _ => {
                let s = rng.random_range(0..ROOTS);
                let value = self.walk(rng, s, 3);
                self.set_root(r, value);
            }
        }
    }

    /// Walk everything reachable and check it against the model. Every model node
    /// must map to exactly one object.
    fn verify(&mut self) -> usize {
        let mut addresses: HashMap<usize, ObjectReference> = HashMap::new();
        let mut stack: Vec<(ObjectReference, usize)> =
            (0..ROOTS).filter_map(|r| self.root(r).zip(self.model.roots[r])).collect();
        while let Some((object, id)) = stack.pop() {
            assert_eq!(memory_manager::read_word(object, ID), id);
            match addresses.insert(id, object) {
                Some(previous) => {
                    assert_eq!(previous, object, "node {} has two copies", id);
                    continue;
                }
                None => {
                    for f in 0..2 {
                        if let Some(next) = self.field(object, id, f) {
                            stack.push(next);
                        }
                    }
                }
            }
        }
        addresses.len()
    }
}

fn run(options: &str, seed: u64) {
    let mut world = World::new(options);
    let mut rng = ChaCha8Rng::seed_from_u64(seed);
    for i in 1..=OPERATIONS {
        world.step(&mut rng);
        if i % 500 == 0 {
            let generation = if i % 2000 == 0 {
                Generation::Full
            } else {
                Generation::Young
            };
            memory_manager::request_gc(&mut world.mutator, GcCause::Explicit, generation, true);
            world.verify();
        }
    }
    let reachable = world.verify();
    memory_manager::request_gc(&mut world.mutator, GcCause::Explicit, Generation::Full, true);
    assert_eq!(world.verify(), reachable);

    let mut objects = 0;
    memory_manager::for_each_object(&mut world.mutator, true, &mut |_| objects += 1);
    assert_eq!(objects, reachable);

    let stats = memory_manager::stats(&world.heap);
    assert!(stats.young_gcs >= OPERATIONS / 500 - OPERATIONS / 2000);
    assert!(stats.full_gcs >= OPERATIONS / 2000 + 1);
    assert_eq!(stats.allocations_during_pause, 0);
}

#[test]
fn random_graph_stop_the_world() {
    run("", 42);
}

#[test]
fn random_graph_concurrent_marking() {
    run("concurrent_marking=true", 7);
}

#[test]
fn random_graph_collecting_in_place() {
    run("run_gc_in_place=true gc_trigger=nth:997", 1234);
}
