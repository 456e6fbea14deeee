//! Test fixtures and bucket helpers.
//!
//! Provides convenience functions for setting up test buckets
//! and common test scenarios.

use std::path::Path;
use std::sync::mpsc::Receiver;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tempfile::TempDir;
use vbkv_core::{Bucket, BucketConfig, BucketEvent, Mutation, VBState, VBucketChange, VbId};

/// How long event helpers wait for a single event.
pub const EVENT_TIMEOUT: Duration = Duration::from_secs(5);

/// A test bucket with automatic cleanup.
pub struct TestBucket {
    /// The bucket instance.
    pub bucket: Arc<Bucket>,
    /// The temporary directory (kept alive to prevent cleanup).
    temp_dir: Option<TempDir>,
}

impl TestBucket {
    /// Creates a new in-memory test bucket.
    pub fn memory() -> Self {
        Self::with_config(BucketConfig::default())
    }

    /// Creates an in-memory test bucket with `vbuckets` slots.
    pub fn small(vbuckets: usize) -> Self {
        Self::with_config(BucketConfig::new().max_vbuckets(vbuckets))
    }

    /// Creates a test bucket from an explicit in-memory configuration.
    pub fn with_config(config: BucketConfig) -> Self {
        Self {
            bucket: Bucket::new("test", &config).expect("Failed to create bucket"),
            temp_dir: None,
        }
    }

    /// Creates a new test bucket whose partitions live in log files.
    pub fn directory() -> Self {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        let config = BucketConfig::new().directory(temp_dir.path(), false);

        Self {
            bucket: Bucket::new("test", &config).expect("Failed to create file bucket"),
            temp_dir: Some(temp_dir),
        }
    }

    /// Returns the storage directory if file-based, None if in-memory.
    pub fn path(&self) -> Option<&Path> {
        self.temp_dir.as_ref().map(TempDir::path)
    }

    /// Creates partition `vbid` and makes it Active.
    pub fn activate(&self, vbid: u16) -> Arc<vbkv_core::VBucket> {
        let vbid = VbId::new(vbid);
        self.bucket
            .create_vbucket(vbid)
            .expect("Failed to open vbucket storage")
            .expect("vbucket slot already occupied");
        self.bucket
            .set_vb_state(vbid, VBState::Active)
            .expect("vbucket replaced during activation")
    }
}

impl std::ops::Deref for TestBucket {
    type Target = Bucket;

    fn deref(&self) -> &Self::Target {
        &self.bucket
    }
}

/// Runs a test with a temporary in-memory bucket.
///
/// # Example
///
/// ```rust
/// use vbkv_testkit::with_temp_bucket;
/// use vbkv_core::VbId;
///
/// with_temp_bucket(|bucket| {
///     assert!(bucket.get_vbucket(VbId::new(0)).is_none());
/// });
/// ```
pub fn with_temp_bucket<F, R>(f: F) -> R
where
    F: FnOnce(&Bucket) -> R,
{
    let test_bucket = TestBucket::memory();
    f(&test_bucket.bucket)
}

/// Runs a test with a temporary directory-backed bucket.
pub fn with_directory_bucket<F, R>(f: F) -> R
where
    F: FnOnce(&Bucket, &Path) -> R,
{
    let test_bucket = TestBucket::directory();
    let path = test_bucket
        .path()
        .expect("Directory bucket should have a path")
        .to_path_buf();
    f(&test_bucket.bucket, &path)
}

/// Receives the next event, panicking after [`EVENT_TIMEOUT`].
pub fn next_event(rx: &Receiver<BucketEvent>) -> BucketEvent {
    rx.recv_timeout(EVENT_TIMEOUT)
        .expect("Timed out waiting for a bucket event")
}

/// Receives exactly `count` events.
pub fn collect_events(rx: &Receiver<BucketEvent>, count: usize) -> Vec<BucketEvent> {
    (0..count).map(|_| next_event(rx)).collect()
}

/// Drains events until none arrives for `quiet`.
pub fn drain_events(rx: &Receiver<BucketEvent>, quiet: Duration) -> Vec<BucketEvent> {
    let deadline = Instant::now() + EVENT_TIMEOUT;
    let mut events = Vec::new();
    while Instant::now() < deadline {
        match rx.recv_timeout(quiet) {
            Ok(event) => events.push(event),
            Err(_) => break,
        }
    }
    events
}

/// Keeps only the state changes, as `(vbid, old, new)`.
pub fn state_changes(events: &[BucketEvent]) -> Vec<(u16, VBState, VBState)> {
    events
        .iter()
        .filter_map(|event| match event {
            BucketEvent::VBucketChange(VBucketChange {
                vbid,
                old_state,
                new_state,
                ..
            }) => Some((vbid.as_u16(), *old_state, *new_state)),
            BucketEvent::Mutation(_) => None,
        })
        .collect()
}

/// Keeps only the mutations.
pub fn mutations(events: &[BucketEvent]) -> Vec<Mutation> {
    events
        .iter()
        .filter_map(|event| match event {
            BucketEvent::Mutation(m) => Some(m.clone()),
            BucketEvent::VBucketChange(_) => None,
        })
        .collect()
}

/// Test scenario helpers.
pub mod scenarios {
    use super::*;
    use vbkv_core::MutationRequest;

    /// Creates a bucket whose first `vbuckets` partitions are Active.
    pub fn active_bucket(vbuckets: u16) -> TestBucket {
        let test_bucket = TestBucket::memory();
        for vbid in 0..vbuckets {
            test_bucket.activate(vbid);
        }
        test_bucket
    }

    /// Creates a bucket with `docs_per_vbucket` documents in each of
    /// `vbuckets` Active partitions.
    ///
    /// Keys are `doc-<vbid>-<n>` and values `value-<n>`.
    pub fn populated_bucket(vbuckets: u16, docs_per_vbucket: usize) -> TestBucket {
        let test_bucket = active_bucket(vbuckets);
        for vbid in 0..vbuckets {
            for n in 0..docs_per_vbucket {
                let req = MutationRequest::set(format!("doc-{vbid}-{n}"), format!("value-{n}"));
                let resp = test_bucket
                    .mutate(VbId::new(vbid), &req)
                    .expect("Failed to store document");
                assert!(resp.is_success(), "store refused: {}", resp.status);
            }
        }
        test_bucket
    }

    /// Creates partitions with the given states, `Dead` ones included.
    pub fn bucket_with_states(states: &[(u16, VBState)]) -> TestBucket {
        let test_bucket = TestBucket::memory();
        for &(vbid, state) in states {
            let vbid = VbId::new(vbid);
            test_bucket
                .create_vbucket(vbid)
                .expect("Failed to open vbucket storage")
                .expect("vbucket slot already occupied");
            if state != VBState::Dead {
                test_bucket
                    .set_vb_state(vbid, state)
                    .expect("vbucket replaced during setup");
            }
        }
        test_bucket
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::mpsc;
    use vbkv_core::MutationRequest;

    #[test]
    fn memory_bucket() {
        let test_bucket = TestBucket::memory();
        assert!(test_bucket.available());
        assert!(test_bucket.path().is_none());
    }

    #[test]
    fn directory_bucket_has_path() {
        with_directory_bucket(|bucket, path| {
            assert!(path.exists());
            assert!(bucket.available());
        });
    }

    #[test]
    fn activate_makes_vbucket_active() {
        let test_bucket = TestBucket::small(4);
        let vb = test_bucket.activate(2);
        assert_eq!(vb.state(), VBState::Active);
    }

    #[test]
    fn populated_scenario() {
        let test_bucket = scenarios::populated_bucket(2, 5);
        let resp = test_bucket.get(VbId::new(1), b"doc-1-4").unwrap();
        assert_eq!(resp.value, Some(b"value-4".to_vec()));
    }

    #[test]
    fn event_helpers_split_kinds() {
        let test_bucket = scenarios::active_bucket(1);
        let (tx, rx) = mpsc::channel();
        test_bucket.observer().register(tx);

        test_bucket
            .mutate(VbId::new(0), &MutationRequest::set("k", "v"))
            .unwrap();
        test_bucket.set_vb_state(VbId::new(0), VBState::Replica);

        let events = collect_events(&rx, 2);
        assert_eq!(mutations(&events).len(), 1);
        assert_eq!(
            state_changes(&events),
            vec![(0, VBState::Active, VBState::Replica)]
        );
        assert!(drain_events(&rx, Duration::from_millis(20)).is_empty());
    }
}
