use cdfio::time::{leap_second, leap_second_branchless, scalar_to_ns_from_1970, to_ns_from_1970, Tt2000};
use criterion::{black_box, criterion_group, criterion_main, Criterion};

fn sorted_tt2000(count: usize) -> Vec<Tt2000> {
    let start = -869_399_957_816_000_000i64;
    let end = 700_000_000_000_000_000i64;
    let step = (end - start) / count as i64;
    (0..count)
        .map(|i| Tt2000(start + i as i64 * step))
        .collect()
}

fn criterion_benchmark(c: &mut Criterion) {
    let instants = sorted_tt2000(1 << 16);

    c.bench_function("leap_second_binary", |b| {
        b.iter(|| {
            let mut accumulator = 0i64;
            for instant in &instants {
                accumulator ^= leap_second(black_box(instant.0));
            }
            accumulator
        })
    });

    c.bench_function("leap_second_branchless", |b| {
        b.iter(|| {
            let mut accumulator = 0i64;
            for instant in &instants {
                accumulator ^= leap_second_branchless(black_box(instant.0));
            }
            accumulator
        })
    });

    let mut output = vec![0i64; instants.len()];
    c.bench_function("to_ns_from_1970_batch", |b| {
        b.iter(|| to_ns_from_1970(black_box(&instants), &mut output))
    });

    c.bench_function("to_ns_from_1970_scalar", |b| {
        b.iter(|| scalar_to_ns_from_1970(black_box(&instants), &mut output))
    });
}

criterion_group!(benches, criterion_benchmark);
criterion_main!(benches);
