//! Stress tests for vbkv.
//!
//! These tests verify behavior under heavy load and concurrent access.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::mpsc;
use std::sync::{Arc, Barrier};
use std::thread;
use std::time::{Duration, Instant};
use vbkv_core::{Bucket, BucketEvent, MutationRequest, Status, VBState, VbId};

/// Result of a stress test run.
#[derive(Debug, Clone)]
pub struct StressTestResult {
    /// Total operations performed.
    pub total_ops: usize,
    /// Successful operations.
    pub successful_ops: usize,
    /// Operations that lost a race or were refused.
    pub failed_ops: usize,
    /// Total duration.
    pub duration: Duration,
    /// Operations per second.
    pub ops_per_second: f64,
}

impl StressTestResult {
    /// Creates a new result.
    pub fn new(successful: usize, failed: usize, duration: Duration) -> Self {
        let total = successful + failed;
        let ops_per_second = if duration.as_secs_f64() > 0.0 {
            total as f64 / duration.as_secs_f64()
        } else {
            0.0
        };

        Self {
            total_ops: total,
            successful_ops: successful,
            failed_ops: failed,
            duration,
            ops_per_second,
        }
    }

    /// Prints a summary of the test.
    pub fn print_summary(&self, name: &str) {
        println!("\n=== {} ===", name);
        println!("Total operations: {}", self.total_ops);
        println!("Successful: {}", self.successful_ops);
        println!("Failed: {}", self.failed_ops);
        println!("Duration: {:?}", self.duration);
        println!("Throughput: {:.2} ops/sec", self.ops_per_second);
    }
}

/// Configuration for stress tests.
#[derive(Debug, Clone)]
pub struct StressConfig {
    /// Number of operations to perform (split across threads).
    pub operations: usize,
    /// Number of concurrent threads.
    pub threads: usize,
    /// Size of document bodies in bytes.
    pub value_size: usize,
    /// Number of distinct keys.
    pub key_count: usize,
    /// Number of partitions used.
    pub vbuckets: u16,
}

impl Default for StressConfig {
    fn default() -> Self {
        Self {
            operations: 10_000,
            threads: 4,
            value_size: 256,
            key_count: 1_000,
            vbuckets: 8,
        }
    }
}

impl StressConfig {
    fn ops_per_thread(&self) -> usize {
        self.operations / self.threads.max(1)
    }
}

/// Tallies outcomes from many threads.
#[derive(Debug, Default)]
struct Tally {
    successful: AtomicUsize,
    failed: AtomicUsize,
}

impl Tally {
    fn record(&self, ok: bool) {
        if ok {
            self.successful.fetch_add(1, Ordering::Relaxed);
        } else {
            self.failed.fetch_add(1, Ordering::Relaxed);
        }
    }

    fn finish(&self, start: Instant) -> StressTestResult {
        StressTestResult::new(
            self.successful.load(Ordering::Relaxed),
            self.failed.load(Ordering::Relaxed),
            start.elapsed(),
        )
    }
}

fn run_threads<F>(threads: usize, body: F)
where
    F: Fn(usize) + Send + Sync + 'static,
{
    let body = Arc::new(body);
    let barrier = Arc::new(Barrier::new(threads));
    let handles: Vec<_> = (0..threads)
        .map(|t| {
            let body = Arc::clone(&body);
            let barrier = Arc::clone(&barrier);
            thread::spawn(move || {
                barrier.wait();
                body(t);
            })
        })
        .collect();

    for handle in handles {
        handle.join().expect("Thread panicked");
    }
}

/// Activates partitions `0..config.vbuckets`, creating any that are absent.
pub fn activate_all(bucket: &Bucket, config: &StressConfig) {
    for vbid in 0..config.vbuckets {
        let vbid = VbId::new(vbid);
        if bucket.get_vbucket(vbid).is_none() {
            bucket
                .create_vbucket(vbid)
                .expect("Failed to open vbucket storage");
        }
        bucket.set_vb_state(vbid, VBState::Active);
    }
}

/// Run a concurrent unconditional write stress test.
pub fn stress_concurrent_mutations(bucket: Arc<Bucket>, config: &StressConfig) -> StressTestResult {
    activate_all(&bucket, config);

    let tally = Arc::new(Tally::default());
    let ops = config.ops_per_thread();
    let (vbuckets, keys) = (config.vbuckets.max(1), config.key_count.max(1));
    let value = vec![0xABu8; config.value_size];

    let start = Instant::now();
    let body_tally = Arc::clone(&tally);
    run_threads(config.threads, move |t| {
        for i in 0..ops {
            let n = t * ops + i;
            let vbid = VbId::new((n % usize::from(vbuckets)) as u16);
            let req = MutationRequest::set(format!("key-{}", n % keys), value.clone());
            let ok = bucket
                .mutate(vbid, &req)
                .is_ok_and(|resp| resp.is_success());
            body_tally.record(ok);
        }
    });
    tally.finish(start)
}

/// Run a concurrent read stress test over pre-populated keys.
pub fn stress_concurrent_reads(bucket: Arc<Bucket>, config: &StressConfig) -> StressTestResult {
    activate_all(&bucket, config);

    let vbuckets = config.vbuckets.max(1);
    let keys = config.key_count.max(1);
    let value = vec![0xABu8; config.value_size];
    for n in 0..keys {
        let vbid = VbId::new((n % usize::from(vbuckets)) as u16);
        bucket
            .mutate(vbid, &MutationRequest::set(format!("key-{n}"), value.clone()))
            .expect("Failed to populate");
    }

    let tally = Arc::new(Tally::default());
    let ops = config.ops_per_thread();

    let start = Instant::now();
    let body_tally = Arc::clone(&tally);
    run_threads(config.threads, move |t| {
        for i in 0..ops {
            let n = (t * ops + i) % keys;
            let vbid = VbId::new((n % usize::from(vbuckets)) as u16);
            let ok = bucket
                .get(vbid, format!("key-{n}").as_bytes())
                .is_ok_and(|resp| resp.is_success());
            body_tally.record(ok);
        }
    });
    tally.finish(start)
}

/// Run a CAS increment stress test on a single counter document.
///
/// Every thread loops read, increment, conditional write until its write
/// lands; `successful_ops` counts landed increments and `failed_ops` counts
/// conflicts. The final counter value equals `successful_ops`.
pub fn stress_cas_increments(bucket: Arc<Bucket>, config: &StressConfig) -> (StressTestResult, u64) {
    let vbid = VbId::new(0);
    activate_all(&bucket, &StressConfig { vbuckets: 1, ..config.clone() });
    bucket
        .mutate(vbid, &MutationRequest::set("counter", "0"))
        .expect("Failed to seed counter");

    let tally = Arc::new(Tally::default());
    let ops = config.ops_per_thread();

    let start = Instant::now();
    let body_tally = Arc::clone(&tally);
    let body_bucket = Arc::clone(&bucket);
    run_threads(config.threads, move |_| {
        for _ in 0..ops {
            loop {
                let current = body_bucket.get(vbid, b"counter").expect("Failed to read counter");
                let n: u64 = parse_counter(current.value.as_deref());
                let req = MutationRequest::set("counter", (n + 1).to_string()).with_cas(current.cas);
                let resp = body_bucket.mutate(vbid, &req).expect("Failed to write counter");
                if resp.status == Status::Success {
                    body_tally.record(true);
                    break;
                }
                body_tally.record(false);
            }
        }
    });

    let result = tally.finish(start);
    let final_value = bucket
        .get(vbid, b"counter")
        .expect("Failed to read counter");
    (result, parse_counter(final_value.value.as_deref()))
}

fn parse_counter(value: Option<&[u8]>) -> u64 {
    value
        .and_then(|v| std::str::from_utf8(v).ok())
        .and_then(|s| s.parse().ok())
        .unwrap_or(0)
}

/// Run a create/destroy churn stress test against a few slots.
///
/// Returns the result and the number of destroy events broadcast, which
/// equals the number of successful destroys.
pub fn stress_vbucket_churn(bucket: Arc<Bucket>, config: &StressConfig) -> (StressTestResult, usize) {
    let (tx, rx) = mpsc::channel();
    bucket.observer().register(tx);

    let tally = Arc::new(Tally::default());
    let destroyed = Arc::new(AtomicUsize::new(0));
    let ops = config.ops_per_thread();
    let vbuckets = config.vbuckets.max(1);

    let start = Instant::now();
    let body_tally = Arc::clone(&tally);
    let body_destroyed = Arc::clone(&destroyed);
    let body_bucket = Arc::clone(&bucket);
    run_threads(config.threads, move |t| {
        for i in 0..ops {
            let vbid = VbId::new(((t + i) % usize::from(vbuckets)) as u16);
            let ok = match i % 3 {
                0 => body_bucket
                    .create_vbucket(vbid)
                    .is_ok_and(|vb| vb.is_some()),
                1 => body_bucket.set_vb_state(vbid, VBState::Active).is_some(),
                _ => {
                    let won = body_bucket.destroy_vbucket(vbid);
                    if won {
                        body_destroyed.fetch_add(1, Ordering::Relaxed);
                    }
                    won
                }
            };
            body_tally.record(ok);
        }
    });
    let result = tally.finish(start);

    let destroy_events = rx
        .try_iter()
        .filter(|event| matches!(event, BucketEvent::VBucketChange(c) if c.new_state == VBState::Dead))
        .count();
    assert_eq!(
        destroy_events,
        destroyed.load(Ordering::Relaxed),
        "destroy events must match successful destroys"
    );
    (result, destroy_events)
}
