use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use graph_memory::search::{self, Candidate, QueryTerms};
use graph_memory::storage::{SqliteStorage, Storage};
use graph_memory::{Entity, StorageConfig};

fn synthetic_entities(count: usize) -> Vec<Entity> {
    (0..count)
        .map(|i| {
            Entity::new(format!("component-{i}"), ["service", "library", "tool"][i % 3])
                .with_observations((0..5).map(|j| {
                    format!("Observation {j} for component {i}: handles request routing and caching")
                }))
        })
        .collect()
}

fn bench_rank(c: &mut Criterion) {
    let mut group = c.benchmark_group("rank");
    let terms = QueryTerms::parse("caching tool");

    for size in [100usize, 1_000, 10_000] {
        let entities = synthetic_entities(size);
        group.bench_with_input(BenchmarkId::from_parameter(size), &entities, |b, entities| {
            b.iter(|| {
                let candidates = entities.iter().cloned().map(|e| Candidate::new(e, 2));
                black_box(search::rank(&terms, candidates, 10, None))
            })
        });
    }
    group.finish();
}

fn bench_sqlite_search(c: &mut Criterion) {
    let dir = tempfile::TempDir::new().unwrap();
    let storage = SqliteStorage::new(StorageConfig::sqlite(dir.path().join("bench.db")));
    storage.initialize().unwrap();
    storage.create_entities(&synthetic_entities(2_000)).unwrap();

    c.bench_function("sqlite_search_fts", |b| {
        b.iter(|| black_box(storage.search_nodes("component-42", 10).unwrap()))
    });
}

criterion_group!(benches, bench_rank, bench_sqlite_search);
criterion_main!(benches);
