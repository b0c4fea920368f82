//! Insert and point-query throughput against a temp datafile.

use criterion::{criterion_group, criterion_main, BatchSize, Criterion};
use kitedb::{doc, Engine, Query};
use tempfile::tempdir;

fn bench_insert(c: &mut Criterion) {
    let dir = tempdir().unwrap();
    let db = Engine::open(dir.path().join("bench.db")).unwrap();

    c.bench_function("insert_100_autoid", |b| {
        b.iter_batched(
            || (0..100).map(|i| doc! { "n" => i, "name" => "user" }).collect::<Vec<_>>(),
            |docs| db.insert("bench_insert", docs).unwrap(),
            BatchSize::SmallInput,
        )
    });
}

fn bench_find(c: &mut Criterion) {
    let dir = tempdir().unwrap();
    let db = Engine::open(dir.path().join("bench.db")).unwrap();
    db.insert("bench_find", (0..10_000).map(|i| doc! { "_id" => i, "v" => i % 100 }))
        .unwrap();
    // build the secondary index outside the measurement
    db.ensure_index("bench_find", "v", false).unwrap();

    c.bench_function("find_eq_id", |b| {
        b.iter(|| db.find_one("bench_find", &Query::eq("_id", 5000)).unwrap())
    });

    c.bench_function("find_eq_secondary", |b| {
        b.iter(|| db.find("bench_find", &Query::eq("v", 42)).unwrap())
    });
}

criterion_group!(benches, bench_insert, bench_find);
criterion_main!(benches);
