//! Version Ledger Benchmarks
//!
//! Measures protocol overhead over the in-memory backend, so the numbers
//! reflect round-trip count and bookkeeping rather than network latency.

use criterion::{black_box, criterion_group, criterion_main, Criterion, Throughput};
use esorm_core::Document;
use esorm_engine::Session;
use serde_json::json;
use std::sync::atomic::{AtomicU64, Ordering};

fn person(uid: &str, n: u64) -> Document {
    Document::new(
        "Person",
        json!({"uid": uid, "n": n}).as_object().cloned().unwrap(),
    )
}

fn bench_insert(c: &mut Criterion) {
    let session = Session::in_memory().unwrap();
    let ledger = session.ledger();

    let mut group = c.benchmark_group("ledger");
    group.throughput(Throughput::Elements(1));

    let counter = AtomicU64::new(0);
    group.bench_function("insert_new_uid", |b| {
        b.iter(|| {
            let i = counter.fetch_add(1, Ordering::SeqCst);
            ledger.insert(&person(&format!("p{}", i), 0)).unwrap()
        });
    });

    let counter = AtomicU64::new(0);
    group.bench_function("insert_new_version", |b| {
        b.iter(|| {
            let i = counter.fetch_add(1, Ordering::SeqCst);
            ledger.insert(&person("hot", i)).unwrap()
        });
    });

    let unchanged = person("stable", 0);
    ledger.insert(&unchanged).unwrap();
    group.bench_function("insert_unchanged", |b| {
        b.iter(|| ledger.insert(black_box(&unchanged)).unwrap());
    });

    group.finish();
}

fn bench_reads(c: &mut Criterion) {
    let session = Session::in_memory().unwrap();
    let ledger = session.ledger();
    for i in 0..100 {
        ledger.insert(&person("p1", i)).unwrap();
    }

    let mut group = c.benchmark_group("ledger_reads");
    group.bench_function("get_all_versions_100", |b| {
        b.iter(|| ledger.get_all_versions(black_box("p1")).unwrap());
    });
    group.bench_function("get_doc_by_version", |b| {
        b.iter(|| ledger.get_doc_by_version(black_box("p1"), 50).unwrap());
    });
    group.finish();
}

criterion_group!(benches, bench_insert, bench_reads);
criterion_main!(benches);
