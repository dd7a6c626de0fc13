//! Benchmarks for vector index build and search.

use std::hint::black_box;

use criterion::{BenchmarkId, Criterion, criterion_group, criterion_main};
use groundrag::{Embedder, HashEmbedder, VectorIndex};

const DIMENSION: usize = 256;

fn corpus(n: usize) -> Vec<Vec<f32>> {
    let embedder = HashEmbedder::new(DIMENSION);
    let texts: Vec<String> = (0..n)
        .map(|i| format!("document {i} about topic {} and item {}", i % 17, i % 101))
        .collect();
    let refs: Vec<&str> = texts.iter().map(String::as_str).collect();
    embedder.embed_batch(&refs).unwrap()
}

fn index_build(c: &mut Criterion) {
    let mut group = c.benchmark_group("index_build");

    for n in [100, 1_000, 10_000] {
        let vectors = corpus(n);
        group.bench_with_input(BenchmarkId::from_parameter(n), &vectors, |b, v| {
            b.iter(|| VectorIndex::build(black_box(v.clone())).unwrap())
        });
    }

    group.finish();
}

fn index_search(c: &mut Criterion) {
    let mut group = c.benchmark_group("index_search");
    let query = HashEmbedder::new(DIMENSION)
        .embed("topic 3 and item 42")
        .unwrap();

    for n in [100, 1_000, 10_000] {
        let index = VectorIndex::build(corpus(n)).unwrap();
        for top_k in [1, 10] {
            group.bench_with_input(
                BenchmarkId::new(format!("top{top_k}"), n),
                &index,
                |b, index| b.iter(|| index.search(black_box(&query), top_k).unwrap()),
            );
        }
    }

    group.finish();
}

criterion_group!(benches, index_build, index_search);
criterion_main!(benches);
