//! Bucket and partition benchmarks.

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use std::sync::mpsc;
use vbkv_bench::utils::{active_bucket, generate_documents, generate_keys, populate, random_data};
use vbkv_core::{
    Broadcaster, BucketEvent, Buckets, Mutation, MutationRequest, VBState, VbId, MAX_VBUCKETS,
};

/// Benchmark slot lookups.
fn bench_get_vbucket(c: &mut Criterion) {
    let mut group = c.benchmark_group("get_vbucket");
    let bucket = active_bucket(64);

    group.bench_function("occupied", |b| {
        let mut idx = 0u16;
        b.iter(|| {
            black_box(bucket.get_vbucket(VbId::new(black_box(idx % 64))));
            idx = idx.wrapping_add(1);
        });
    });

    group.bench_function("empty", |b| {
        b.iter(|| black_box(bucket.get_vbucket(VbId::new(black_box(MAX_VBUCKETS as u16 - 1)))));
    });

    group.bench_function("state", |b| {
        b.iter(|| black_box(bucket.get_vb_state(VbId::new(black_box(7)))));
    });

    group.finish();
}

/// Benchmark document reads through the bucket.
fn bench_get(c: &mut Criterion) {
    let mut group = c.benchmark_group("bucket_get");
    let bucket = active_bucket(1);
    let docs = generate_documents(1000, 256);
    populate(&bucket, &docs);
    let vb0 = VbId::new(0);

    group.bench_function("hit", |b| {
        let mut idx = 0;
        b.iter(|| {
            let (key, _) = &docs[(idx * 7) % docs.len()];
            black_box(bucket.get(vb0, black_box(key)).unwrap());
            idx += 1;
        });
    });

    group.bench_function("miss", |b| {
        b.iter(|| black_box(bucket.get(vb0, black_box(b"absent")).unwrap()));
    });

    group.bench_function("not_my_vbucket", |b| {
        b.iter(|| black_box(bucket.get(VbId::new(9), black_box(b"k")).unwrap()));
    });

    group.finish();
}

/// Benchmark unconditional writes across value sizes.
fn bench_set(c: &mut Criterion) {
    let mut group = c.benchmark_group("bucket_set");

    for size in [16, 256, 4096].iter() {
        group.throughput(Throughput::Bytes(*size as u64));
        group.bench_with_input(BenchmarkId::from_parameter(size), size, |b, &size| {
            let bucket = active_bucket(1);
            let keys = generate_keys(1000);
            let value = random_data(size);
            let mut idx = 0;

            b.iter(|| {
                let req = MutationRequest::set(keys[idx % keys.len()].clone(), value.clone());
                black_box(bucket.mutate(VbId::new(0), &req).unwrap());
                idx += 1;
            });
        });
    }

    group.finish();
}

/// Benchmark a read-modify-write loop on one document.
fn bench_cas_update(c: &mut Criterion) {
    let mut group = c.benchmark_group("bucket_cas_update");
    let bucket = active_bucket(1);
    let vb0 = VbId::new(0);
    let mut cas = bucket
        .mutate(vb0, &MutationRequest::set("counter", "0"))
        .unwrap()
        .cas;

    group.bench_function("match", |b| {
        b.iter(|| {
            let resp = bucket
                .mutate(vb0, &MutationRequest::set("counter", "n").with_cas(cas))
                .unwrap();
            cas = resp.cas;
        });
    });

    group.bench_function("conflict", |b| {
        b.iter(|| {
            let req = MutationRequest::set("counter", "n").with_cas(black_box(u64::MAX));
            black_box(bucket.mutate(vb0, &req).unwrap());
        });
    });

    group.finish();
}

/// Benchmark the partition lifecycle.
fn bench_lifecycle(c: &mut Criterion) {
    let mut group = c.benchmark_group("vbucket_lifecycle");
    let bucket = active_bucket(0);
    let vbid = VbId::new(3);

    group.bench_function("create_activate_destroy", |b| {
        b.iter(|| {
            bucket.create_vbucket(vbid).unwrap();
            bucket.set_vb_state(vbid, VBState::Active);
            assert!(bucket.destroy_vbucket(vbid));
        });
    });

    group.bench_function("registry_create_destroy", |b| {
        let buckets = Buckets::default();
        b.iter(|| {
            buckets.create("bench").unwrap();
            assert!(buckets.destroy("bench"));
        });
    });

    group.finish();
}

/// Benchmark event fan-out to a growing number of subscribers.
fn bench_broadcast(c: &mut Criterion) {
    let mut group = c.benchmark_group("broadcast_submit");

    for subscribers in [1, 4, 16].iter() {
        group.throughput(Throughput::Elements(*subscribers as u64));
        group.bench_with_input(
            BenchmarkId::from_parameter(subscribers),
            subscribers,
            |b, &subscribers| {
                let observer = Broadcaster::new();
                let receivers: Vec<_> = (0..subscribers)
                    .map(|_| {
                        let (tx, rx) = mpsc::channel();
                        observer.register(tx);
                        rx
                    })
                    .collect();
                let event = BucketEvent::Mutation(Mutation {
                    vbid: VbId::new(0),
                    key: b"key".to_vec(),
                    cas: 1,
                    deleted: false,
                });

                b.iter(|| {
                    observer.submit(event.clone());
                    for rx in &receivers {
                        black_box(rx.try_recv().unwrap());
                    }
                });
            },
        );
    }

    group.finish();
}

criterion_group!(
    benches,
    bench_get_vbucket,
    bench_get,
    bench_set,
    bench_cas_update,
    bench_lifecycle,
    bench_broadcast,
);

criterion_main!(benches);
