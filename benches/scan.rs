//! Flat scan benchmarks
//!
//! Run with: cargo bench --bench scan

use criterion::{black_box, criterion_group, criterion_main, Criterion, Throughput};
use rand::Rng;
use retina_core::{dot_product, l2_normalized, FlatIndex};

fn random_unit_vector(dim: usize) -> Vec<f32> {
    let mut rng = rand::thread_rng();
    let v: Vec<f32> = (0..dim).map(|_| rng.gen::<f32>() - 0.5).collect();
    l2_normalized(&v)
}

fn bench_dot_product(c: &mut Criterion) {
    let dims = [128, 256, 512];

    let mut group = c.benchmark_group("dot_product");

    for dim in dims {
        group.throughput(Throughput::Elements(dim as u64));

        let a = random_unit_vector(dim);
        let b = random_unit_vector(dim);

        group.bench_function(format!("dim_{}", dim), |bencher| {
            bencher.iter(|| dot_product(black_box(&a), black_box(&b)))
        });
    }

    group.finish();
}

fn bench_flat_search(c: &mut Criterion) {
    let dim = 512;
    let sizes = [1_000, 10_000];

    let mut group = c.benchmark_group("flat_search");

    for size in sizes {
        group.throughput(Throughput::Elements(size as u64));

        let embeddings: Vec<Vec<f32>> = (0..size).map(|_| random_unit_vector(dim)).collect();
        let ids: Vec<i64> = (0..size as i64).collect();
        let index = FlatIndex::build(dim, &embeddings, &ids).unwrap();
        let query = random_unit_vector(dim);

        group.bench_function(format!("n_{}_top_10", size), |bencher| {
            bencher.iter(|| index.search(black_box(&query), 10).unwrap())
        });
    }

    group.finish();
}

criterion_group!(benches, bench_dot_product, bench_flat_search);
criterion_main!(benches);
