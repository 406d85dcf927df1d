//! Descriptor lookup benchmarks.
//!
//! Measures the registry fast path every allocation goes through, and the
//! descriptor dispatch the collector and teardown use.

use criterion::{Criterion, black_box, criterion_group, criterion_main};
use regent::{Cown, Managed, Object, ObjectStack, Region, RegionType, V, build_descriptor};
use std::ptr::NonNull;

struct Leaf;
impl Managed for Leaf {}

struct Node {
    next: Option<NonNull<Object>>,
}

impl Managed for Node {
    fn trace(&self, stack: &mut ObjectStack) {
        if let Some(next) = self.next {
            stack.push(next);
        }
    }
}

fn bench_lookup(c: &mut Criterion) {
    let mut group = c.benchmark_group("descriptor_lookup");

    build_descriptor::<Leaf, Object>();
    build_descriptor::<Leaf, Cown>();

    group.bench_function("object", |b| {
        b.iter(|| black_box(build_descriptor::<Leaf, Object>()));
    });
    group.bench_function("cown", |b| {
        b.iter(|| black_box(build_descriptor::<Leaf, Cown>()));
    });

    group.finish();
}

fn bench_dispatch(c: &mut Criterion) {
    let region = Region::new(RegionType::Trace);
    let tail = V::allocate_in_region(&region, Node { next: None }).unwrap();
    let head = V::allocate_in_region(&region, Node { next: Some(tail.as_object()) }).unwrap();

    c.bench_function("trace_dispatch", |b| {
        let mut stack = ObjectStack::new();
        b.iter(|| {
            unsafe { Object::trace(black_box(head.as_object()), &mut stack) };
            stack.pop()
        });
    });
}

criterion_group!(benches, bench_lookup, bench_dispatch);
criterion_main!(benches);
