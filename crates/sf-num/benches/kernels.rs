//! Criterion benchmarks for the hot elementwise kernels.

use criterion::{Criterion, black_box, criterion_group, criterion_main};
use sf_num::{AlignedVec, kernels};

fn bench_kernels(c: &mut Criterion) {
    let n = 1024;
    let a = AlignedVec::from_slice(&vec![0.5f32; n], 8);
    let b = AlignedVec::from_slice(&vec![0.25f32; n], 8);
    let mut out = AlignedVec::<f32>::new(n, 8);

    c.bench_function("vector_add_1024_f32", |bench| {
        bench.iter(|| {
            kernels::vector_add(black_box(&a), black_box(&b), &mut out, 8).unwrap();
        })
    });

    c.bench_function("vector_multiply_add_inplace_1024_f32", |bench| {
        bench.iter(|| {
            kernels::vector_multiply_add_inplace(black_box(&a), black_box(&b), &mut out, 8)
                .unwrap();
        })
    });

    let mut ramp = AlignedVec::<f32>::new(n, 8);
    kernels::vector_ramp(&mut ramp, 0.0, 1.0, true, false, 8).unwrap();
    c.bench_function("vector_ramp_scaling_1024_f32", |bench| {
        bench.iter(|| {
            kernels::vector_ramp_scaling(
                black_box(&a),
                black_box(&ramp),
                &mut out,
                0.7,
                0.3,
                true,
                8,
            )
            .unwrap();
        })
    });
}

criterion_group!(benches, bench_kernels);
criterion_main!(benches);
