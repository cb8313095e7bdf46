//! Throughput benchmarks for the key-value service.
//!
//! Everything runs on the in-memory backend unless the group name says
//! otherwise, so the numbers mostly measure the lock and the map.

use bytes::Bytes;
use criterion::{black_box, criterion_group, criterion_main, BatchSize, Criterion, Throughput};
use std::sync::Arc;
use std::time::Duration;
use ttlkv::service::{KvService, ServiceConfig};
use ttlkv::storage::SqliteStorage;

fn populated(count: usize) -> KvService {
    let service = KvService::in_memory(ServiceConfig::default());
    for i in 0..count {
        service
            .set(
                Bytes::from(format!("key:{}", i)),
                Bytes::from(format!("value:{}", i)),
                3600,
            )
            .unwrap();
    }
    service
}

fn bench_set(c: &mut Criterion) {
    let service = KvService::in_memory(ServiceConfig::default());

    let mut group = c.benchmark_group("set");
    group.throughput(Throughput::Elements(1));

    group.bench_function("set_small", |b| {
        let mut i = 0u64;
        b.iter(|| {
            let key = Bytes::from(format!("key:{}", i));
            service.set(key, Bytes::from("small_value"), 60).unwrap();
            i += 1;
        });
    });

    group.bench_function("set_1kb", |b| {
        let mut i = 0u64;
        let value = Bytes::from("x".repeat(1024));
        b.iter(|| {
            let key = Bytes::from(format!("key:{}", i));
            service.set(key, value.clone(), 60).unwrap();
            i += 1;
        });
    });

    group.finish();
}

fn bench_get(c: &mut Criterion) {
    let service = populated(100_000);

    let mut group = c.benchmark_group("get");
    group.throughput(Throughput::Elements(1));

    group.bench_function("get_existing", |b| {
        let mut i = 0u64;
        b.iter(|| {
            let key = format!("key:{}", i % 100_000);
            black_box(service.get(key.as_bytes()).unwrap());
            i += 1;
        });
    });

    group.bench_function("get_missing", |b| {
        let mut i = 0u64;
        b.iter(|| {
            let key = format!("missing:{}", i);
            black_box(service.get(key.as_bytes()).unwrap());
            i += 1;
        });
    });

    group.finish();
}

/// 80% reads, 20% writes
fn bench_mixed(c: &mut Criterion) {
    let service = populated(10_000);

    let mut group = c.benchmark_group("mixed");
    group.throughput(Throughput::Elements(1));

    group.bench_function("80_read_20_write", |b| {
        let mut i = 0u64;
        b.iter(|| {
            if i % 5 == 0 {
                let key = Bytes::from(format!("new:{}", i));
                service.set(key, Bytes::from("value"), 60).unwrap();
            } else {
                let key = format!("key:{}", i % 10_000);
                black_box(service.get(key.as_bytes()).unwrap());
            }
            i += 1;
        });
    });

    group.finish();
}

fn bench_concurrent(c: &mut Criterion) {
    let mut group = c.benchmark_group("concurrent");
    group.measurement_time(Duration::from_secs(10));

    group.bench_function("4_threads_mixed", |b| {
        b.iter(|| {
            let service = Arc::new(KvService::in_memory(ServiceConfig::default()));
            std::thread::scope(|scope| {
                for t in 0..4 {
                    let service = &service;
                    scope.spawn(move || {
                        for i in 0..10_000 {
                            let key = Bytes::from(format!("key:{}:{}", t, i));
                            service.set(key.clone(), Bytes::from("value"), 60).unwrap();
                            service.get(&key).unwrap();
                        }
                    });
                }
            });
            black_box(service.len().unwrap());
        });
    });

    group.finish();
}

fn bench_snapshot(c: &mut Criterion) {
    let service = populated(10_000);

    let mut group = c.benchmark_group("snapshot");
    group.throughput(Throughput::Elements(10_000));

    group.bench_function("dump_10k", |b| {
        b.iter(|| black_box(service.dump().unwrap()));
    });

    let snapshot = service.dump().unwrap();
    group.bench_function("restore_10k", |b| {
        b.iter_batched(
            || snapshot.clone(),
            |entries| service.restore(entries).unwrap(),
            BatchSize::LargeInput,
        );
    });

    group.bench_function("evict_nothing_10k", |b| {
        b.iter(|| black_box(service.evict_expired().unwrap()));
    });

    group.finish();
}

fn bench_sqlite(c: &mut Criterion) {
    let service = KvService::new(
        Box::new(SqliteStorage::open_in_memory().unwrap()),
        Arc::new(ttlkv::clock::SystemClock),
        ServiceConfig::default(),
    );

    let mut group = c.benchmark_group("sqlite");
    group.throughput(Throughput::Elements(1));

    group.bench_function("set_get", |b| {
        let mut i = 0u64;
        b.iter(|| {
            let key = Bytes::from(format!("key:{}", i % 10_000));
            service.set(key.clone(), Bytes::from("value"), 60).unwrap();
            black_box(service.get(&key).unwrap());
            i += 1;
        });
    });

    group.finish();
}

criterion_group!(
    benches,
    bench_set,
    bench_get,
    bench_mixed,
    bench_concurrent,
    bench_snapshot,
    bench_sqlite,
);

criterion_main!(benches);
