//! Storage backend and collection benchmarks.

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use tempfile::TempDir;
use vbkv_bench::utils::{generate_documents, random_data};
use vbkv_storage::{
    Collection, FileBackend, InMemoryBackend, LogCollection, MemoryCollection, StorageBackend,
};

/// Benchmark InMemoryBackend append operations.
fn bench_inmemory_append(c: &mut Criterion) {
    let mut group = c.benchmark_group("inmemory_append");

    for size in [64, 256, 1024, 4096].iter() {
        group.throughput(Throughput::Bytes(*size as u64));
        group.bench_with_input(BenchmarkId::from_parameter(size), size, |b, &size| {
            let mut backend = InMemoryBackend::new();
            let data = random_data(size);

            b.iter(|| {
                let offset = backend.append(black_box(&data)).unwrap();
                black_box(offset);
            });
        });
    }

    group.finish();
}

/// Benchmark FileBackend append operations.
fn bench_file_append(c: &mut Criterion) {
    let mut group = c.benchmark_group("file_append");
    group.sample_size(50);

    for size in [256, 1024, 4096].iter() {
        group.throughput(Throughput::Bytes(*size as u64));
        group.bench_with_input(BenchmarkId::from_parameter(size), size, |b, &size| {
            let temp_dir = TempDir::new().unwrap();
            let mut backend = FileBackend::open(&temp_dir.path().join("bench.log")).unwrap();
            let data = random_data(size);

            b.iter(|| {
                let offset = backend.append(black_box(&data)).unwrap();
                black_box(offset);
            });
        });
    }

    group.finish();
}

/// Benchmark FileBackend sync after a small write.
fn bench_file_sync(c: &mut Criterion) {
    let mut group = c.benchmark_group("file_sync");
    group.sample_size(20); // fsync is slow

    let temp_dir = TempDir::new().unwrap();
    let mut backend = FileBackend::open(&temp_dir.path().join("bench.log")).unwrap();
    let data = random_data(1024);

    group.bench_function("after_1kb_write", |b| {
        b.iter(|| {
            backend.append(&data).unwrap();
            backend.sync().unwrap();
        });
    });

    group.finish();
}

/// Benchmark `set` on both collection kinds.
fn bench_collection_set(c: &mut Criterion) {
    let mut group = c.benchmark_group("collection_set");

    for size in [64, 1024].iter() {
        group.throughput(Throughput::Bytes(*size as u64));
        let docs = generate_documents(1000, *size);

        group.bench_with_input(BenchmarkId::new("memory", size), &docs, |b, docs| {
            let coll = MemoryCollection::new();
            let mut idx = 0;
            b.iter(|| {
                let (key, value) = &docs[idx % docs.len()];
                coll.set(black_box(key), black_box(value)).unwrap();
                idx += 1;
            });
        });

        group.bench_with_input(BenchmarkId::new("log", size), &docs, |b, docs| {
            let coll = LogCollection::in_memory();
            let mut idx = 0;
            b.iter(|| {
                let (key, value) = &docs[idx % docs.len()];
                coll.set(black_box(key), black_box(value)).unwrap();
                idx += 1;
            });
        });
    }

    group.finish();
}

/// Benchmark point reads on a populated log collection.
fn bench_collection_get(c: &mut Criterion) {
    let mut group = c.benchmark_group("collection_get");

    let docs = generate_documents(1000, 256);
    let coll = LogCollection::in_memory();
    for (key, value) in &docs {
        coll.set(key, value).unwrap();
    }

    group.bench_function("log_hit", |b| {
        let mut idx = 0;
        b.iter(|| {
            // Pseudo-random access order
            let (key, _) = &docs[(idx * 7) % docs.len()];
            black_box(coll.get(black_box(key)).unwrap());
            idx += 1;
        });
    });

    group.bench_function("log_miss", |b| {
        b.iter(|| black_box(coll.get(black_box(b"absent")).unwrap()));
    });

    group.finish();
}

/// Benchmark ordered traversal.
fn bench_collection_visit(c: &mut Criterion) {
    let mut group = c.benchmark_group("collection_visit");

    for count in [100, 1000, 10000].iter() {
        group.throughput(Throughput::Elements(*count as u64));
        let coll = MemoryCollection::new();
        for (key, value) in generate_documents(*count, 64) {
            coll.set(&key, &value).unwrap();
        }

        group.bench_with_input(BenchmarkId::from_parameter(count), &coll, |b, coll| {
            b.iter(|| {
                let mut seen = 0usize;
                coll.visit_ascend(b"", &mut |_, value| {
                    seen += value.len();
                    true
                })
                .unwrap();
                black_box(seen)
            });
        });
    }

    group.finish();
}

/// Benchmark replaying a log into a fresh collection.
fn bench_log_replay(c: &mut Criterion) {
    let mut group = c.benchmark_group("log_replay");
    group.sample_size(20);

    for count in [100, 1000].iter() {
        let coll = LogCollection::in_memory();
        for (key, value) in generate_documents(*count, 128) {
            coll.set(&key, &value).unwrap();
        }
        let bytes = coll.into_backend().data();

        group.throughput(Throughput::Elements(*count as u64));
        group.bench_with_input(BenchmarkId::from_parameter(count), &bytes, |b, bytes| {
            b.iter(|| {
                let replayed =
                    LogCollection::open(InMemoryBackend::with_data(bytes.clone()), false).unwrap();
                black_box(replayed.len())
            });
        });
    }

    group.finish();
}

criterion_group!(
    benches,
    bench_inmemory_append,
    bench_file_append,
    bench_file_sync,
    bench_collection_set,
    bench_collection_get,
    bench_collection_visit,
    bench_log_replay,
);

criterion_main!(benches);
