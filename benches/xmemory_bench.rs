//! Theme assimilation and adaptive search benchmarks.
//!
//! Embeddings are deterministic pseudo-random vectors grouped around a few
//! topic directions, so attach, split and merge all get exercised.

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use std::sync::Arc;
use xmemory::{
    AdaptiveSearch, AdaptiveSearchOptions, HierarchicalMemoryGraph, InMemorySemanticStore,
    MemoryFs, SemanticMemory, ThemeConfig, ThemeManager,
};

const DIM: usize = 128;
const TOPICS: usize = 8;

fn embedding(i: usize) -> Vec<f32> {
    let topic = i % TOPICS;
    (0..DIM)
        .map(|j| {
            let noise = ((i * 7919 + j * 104_729) % 1000) as f32 / 10_000.0;
            let base = if j % TOPICS == topic { 1.0 } else { 0.0 };
            base + noise
        })
        .collect()
}

fn memories(n: usize) -> Vec<SemanticMemory> {
    (0..n)
        .map(|i| SemanticMemory::new(format!("m{}", i), format!("memory number {} about topic {}", i, i % TOPICS), embedding(i)))
        .collect()
}

fn bench_assimilate(c: &mut Criterion) {
    let mut group = c.benchmark_group("assimilate");
    for n in [50usize, 200, 500] {
        let batch = memories(n);
        group.bench_with_input(BenchmarkId::from_parameter(n), &batch, |b, batch| {
            b.iter(|| {
                let fs = Arc::new(MemoryFs::new());
                let mut themes = ThemeManager::new(fs, ThemeConfig::default());
                themes.assimilate(black_box(batch)).unwrap()
            });
        });
    }
    group.finish();
}

fn bench_search_themes(c: &mut Criterion) {
    let fs = Arc::new(MemoryFs::new());
    let mut themes = ThemeManager::new(fs, ThemeConfig::default());
    themes.assimilate(&memories(500)).unwrap();
    let query = embedding(3);

    c.bench_function("search_themes_500", |b| {
        b.iter(|| themes.search_themes(black_box(&query), 3));
    });
}

fn bench_adaptive_search(c: &mut Criterion) {
    let rt = tokio::runtime::Runtime::new().unwrap();
    let fs = Arc::new(MemoryFs::new());
    let batch = memories(500);
    let mut themes = ThemeManager::new(fs.clone(), ThemeConfig::default());
    themes.assimilate(&batch).unwrap();
    let graph = HierarchicalMemoryGraph::new(fs);
    let store = InMemorySemanticStore::new();
    store.insert_many(batch);

    // Off-topic query so the search expands to semantics.
    let query: Vec<f32> = (0..DIM).map(|j| if j % 2 == 0 { 1.0 } else { 0.2 }).collect();
    let options = AdaptiveSearchOptions::default();

    c.bench_function("adaptive_search_expand_500", |b| {
        b.iter(|| {
            rt.block_on(async {
                let mut search = AdaptiveSearch::new(&mut themes, &graph, &store);
                search.search("bench", black_box(&query), &options).await
            })
        });
    });
}

criterion_group!(benches, bench_assimilate, bench_search_themes, bench_adaptive_search);
criterion_main!(benches);
