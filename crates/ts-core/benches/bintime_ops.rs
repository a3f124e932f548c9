//! Criterion benchmarks for bintime arithmetic and the timecounter
//! conversion it feeds, both on `clock.update`'s hot path.

use criterion::{black_box, criterion_group, criterion_main, Criterion};
use ts_core::bintime::{to_f64, Bintime};
use ts_core::counter;

fn bench_bintime_arith(c: &mut Criterion) {
    let mut group = c.benchmark_group("bintime");
    let a = Bintime::new(1_700_000_000, 1 << 40);
    let b = Bintime::new(1, 1 << 20);

    group.bench_function("add", |b_| {
        b_.iter(|| black_box(black_box(a) + black_box(b)));
    });

    group.bench_function("sub", |b_| {
        b_.iter(|| black_box(black_box(a) - black_box(b)));
    });

    group.bench_function("mul_scalar", |b_| {
        b_.iter(|| black_box(black_box(a) * black_box(3u64)));
    });

    group.bench_function("to_f64", |b_| {
        b_.iter(|| black_box(to_f64(black_box(a))));
    });

    group.finish();

    c.bench_function("counter_to_bintime", |b_| {
        b_.iter(|| black_box(counter::to_bintime(black_box(2_500_000_000), black_box(1_000_000_000))));
    });
}

criterion_group!(benches, bench_bintime_arith);
criterion_main!(benches);
