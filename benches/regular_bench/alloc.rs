use criterion::Criterion;

use gengc::memory_manager;
use gengc::util::test_util::fixtures::*;
use gengc::vm::ClassInfo;
use gengc::AllocationSemantics;

pub fn bench(c: &mut Criterion) {
    // Collections only happen when eden fills up, which the TLAB fast path rarely sees.
    let mut fixture =
        SingleMutator::with_options("heap_size=256M young_size=64M verify_heap=false");
    let small = fixture
        .heap
        .register_class(ClassInfo::instance("Small", 32, &[16]))
        .unwrap();
    let array = fixture
        .heap
        .register_class(ClassInfo::primitive_array("int[]", 4))
        .unwrap();

    c.bench_function("alloc_small", |b| {
        b.iter(|| {
            memory_manager::alloc_object(&mut fixture.mutator, small, AllocationSemantics::Default)
        })
    });
    c.bench_function("alloc_array_1k", |b| {
        b.iter(|| {
            memory_manager::alloc_array(
                &mut fixture.mutator,
                array,
                256,
                AllocationSemantics::Default,
            )
        })
    });
    c.bench_function("alloc_tenured", |b| {
        b.iter(|| {
            memory_manager::alloc_object(&mut fixture.mutator, small, AllocationSemantics::Tenured)
        })
    });
}
