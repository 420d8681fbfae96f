use criterion::Criterion;

mod alloc;
mod young_gc;

pub fn bench(c: &mut Criterion) {
    alloc::bench(c);
    young_gc::bench(c);
}
