//! Benchmarks for the scheduler crate.

use criterion::{Criterion, criterion_group, criterion_main};
use perfslice_scheduler::{TimeSlicedScheduler, next_boundary};
use std::hint::black_box;

fn bench_next_boundary(c: &mut Criterion) {
    c.bench_function("next_boundary", |b| {
        b.iter(|| black_box(next_boundary(black_box(1_700_000_123_456), black_box(60_000))));
    });
}

fn bench_idle_poll(c: &mut Criterion) {
    let mut scheduler = TimeSlicedScheduler::builder("bench").slice_ms(60_000).build();
    scheduler.poll(0);

    c.bench_function("idle_poll", |b| {
        b.iter(|| black_box(scheduler.poll(black_box(30_000))));
    });
}

criterion_group!(benches, bench_next_boundary, bench_idle_poll);
criterion_main!(benches);
