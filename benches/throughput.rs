//! Throughput Benchmark for TreapKV
//!
//! This benchmark measures the performance of the storage engine
//! under various workloads, with most attention on the treap-backed arrays.

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use std::sync::Arc;
use std::time::Duration;
use treapkv::persistence::{Persistence, SqlStore};
use treapkv::storage::{StorageEngine, Value};

/// Benchmark SET operations
fn bench_set(c: &mut Criterion) {
    let engine = Arc::new(StorageEngine::new());

    let mut group = c.benchmark_group("set");
    group.throughput(Throughput::Elements(1));

    group.bench_function("set_integer", |b| {
        let mut i = 0i64;
        b.iter(|| {
            engine.set(&format!("key:{}", i), Value::from(i), 0).unwrap();
            i += 1;
        });
    });

    group.bench_function("set_string_1kb", |b| {
        let mut i = 0u64;
        let value = Value::from("x".repeat(1024));
        b.iter(|| {
            engine.set(&format!("key:{}", i), value.clone(), 0).unwrap();
            i += 1;
        });
    });

    group.finish();
}

/// Benchmark GET operations
fn bench_get(c: &mut Criterion) {
    let engine = Arc::new(StorageEngine::new());

    // Pre-populate with data
    for i in 0..100_000 {
        engine
            .set(&format!("key:{}", i), Value::from(format!("value:{}", i)), 0)
            .unwrap();
    }

    let mut group = c.benchmark_group("get");
    group.throughput(Throughput::Elements(1));

    group.bench_function("get_existing", |b| {
        let mut i = 0u64;
        b.iter(|| {
            black_box(engine.get(&format!("key:{}", i % 100_000)));
            i += 1;
        });
    });

    group.bench_function("get_missing", |b| {
        let mut i = 0u64;
        b.iter(|| {
            black_box(engine.get(&format!("missing:{}", i)));
            i += 1;
        });
    });

    group.finish();
}

/// Benchmark array operations at several sizes
fn bench_arrays(c: &mut Criterion) {
    let mut group = c.benchmark_group("array");
    group.throughput(Throughput::Elements(1));

    for size in [1_000i64, 100_000] {
        let engine = StorageEngine::new();
        engine
            .rpush("list", (0..size).map(Value::from).collect())
            .unwrap();

        group.bench_with_input(BenchmarkId::new("lget", size), &size, |b, &size| {
            let mut i = 0i64;
            b.iter(|| {
                black_box(engine.lget("list", i % size).unwrap());
                i += 7;
            });
        });

        group.bench_with_input(BenchmarkId::new("lset", size), &size, |b, &size| {
            let mut i = 0i64;
            b.iter(|| {
                engine.lset("list", i % size, Value::from(i)).unwrap();
                i += 13;
            });
        });

        // Keeps the length steady so every iteration sees the same tree size
        group.bench_with_input(BenchmarkId::new("lpop_rpush", size), &size, |b, _| {
            b.iter(|| {
                let popped = engine.lpop("list", &[]).unwrap();
                engine.rpush("list", popped).unwrap();
            });
        });
    }

    group.bench_function("raddtoset_1000_distinct", |b| {
        let engine = StorageEngine::new();
        let mut i = 0i64;
        b.iter(|| {
            black_box(engine.raddtoset("set", vec![Value::from(i % 1000)]).unwrap());
            i += 1;
        });
    });

    group.finish();
}

/// Benchmark concurrent access
fn bench_concurrent(c: &mut Criterion) {
    use std::thread;

    let mut group = c.benchmark_group("concurrent");
    group.measurement_time(Duration::from_secs(10));

    group.bench_function("4_threads_mixed", |b| {
        b.iter(|| {
            let engine = Arc::new(StorageEngine::new());
            let handles: Vec<_> = (0..4)
                .map(|t| {
                    let engine = Arc::clone(&engine);
                    thread::spawn(move || {
                        for i in 0..10_000i64 {
                            let key = format!("key:{}:{}", t, i);
                            engine.set(&key, Value::from(i), 0).unwrap();
                            engine.get(&key);
                            engine.rpush("shared", vec![Value::from(i)]).unwrap();
                        }
                    })
                })
                .collect();

            for handle in handles {
                handle.join().unwrap();
            }

            black_box(engine.len());
        });
    });

    group.finish();
}

/// Benchmark expiry operations
fn bench_expiry(c: &mut Criterion) {
    let engine = Arc::new(StorageEngine::new());

    let mut group = c.benchmark_group("expiry");
    group.throughput(Throughput::Elements(1));

    group.bench_function("set_with_ttl", |b| {
        let mut i = 0u64;
        b.iter(|| {
            engine
                .set(&format!("key:{}", i), Value::from("value"), 3600)
                .unwrap();
            i += 1;
        });
    });

    group.bench_function("expire_existing", |b| {
        // Pre-create keys
        for i in 0..10_000 {
            engine
                .set(&format!("expire:{}", i), Value::from("value"), 0)
                .unwrap();
        }

        let mut i = 0u64;
        b.iter(|| {
            engine.expire(&format!("expire:{}", i % 10_000), 3600);
            i += 1;
        });
    });

    group.finish();
}

/// Benchmark a full snapshot into an in-memory SQLite store
fn bench_snapshot(c: &mut Criterion) {
    let engine = StorageEngine::new();
    for i in 0..10_000i64 {
        engine.set(&format!("key:{}", i), Value::from(i), 0).unwrap();
    }
    engine
        .rpush("list", (0..10_000i64).map(Value::from).collect())
        .unwrap();

    let persistence = Persistence::new().with_store(SqlStore::open_in_memory().unwrap());

    let mut group = c.benchmark_group("snapshot");
    group.sample_size(20);
    group.bench_function("save_20k_values", |b| {
        b.iter(|| persistence.save(&engine).unwrap());
    });
    group.finish();
}

criterion_group!(
    benches,
    bench_set,
    bench_get,
    bench_arrays,
    bench_concurrent,
    bench_expiry,
    bench_snapshot,
);

criterion_main!(benches);
