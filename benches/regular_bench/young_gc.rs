use criterion::Criterion;

use gengc::memory_manager;
use gengc::util::test_util::fixtures::*;
use gengc::vm::ClassInfo;
use gengc::{AllocationSemantics, GcCause, Generation};

const NEXT: usize = 16;

pub fn bench(c: &mut Criterion) {
    let mut fixture = SingleMutator::with_options("heap_size=64M young_size=16M verify_heap=false");
    let node = fixture
        .heap
        .register_class(ClassInfo::instance("Node", 32, &[NEXT]))
        .unwrap();

    // A list that survives every young GC, so each one copies or scans it.
    let root = memory_manager::new_root(&mut fixture.mutator, None);
    for _ in 0..10_000 {
        let n = memory_manager::alloc_object(
            &mut fixture.mutator,
            node,
            AllocationSemantics::Default,
        )
        .unwrap();
        let head = memory_manager::get_root(&fixture.mutator, root);
        memory_manager::object_reference_write(&mut fixture.mutator, n, NEXT, head);
        memory_manager::set_root(&mut fixture.mutator, root, Some(n));
    }

    c.bench_function("young_gc", |b| {
        b.iter(|| {
            for _ in 0..1000 {
                let _ = memory_manager::alloc_object(
                    &mut fixture.mutator,
                    node,
                    AllocationSemantics::Default,
                );
            }
            let mutator = &mut fixture.mutator;
            memory_manager::request_gc(mutator, GcCause::Explicit, Generation::Young, true);
        })
    });
}
