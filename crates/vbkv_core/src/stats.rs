//! Bucket statistics.
//!
//! # Usage
//!
//! ```rust,ignore
//! let stats = bucket.stats();
//! println!("gets: {} misses: {}", stats.gets, stats.misses);
//! println!("conflicts: {}", stats.conflicts);
//! ```

use std::sync::atomic::{AtomicU64, Ordering};

/// Counters shared by a bucket and its partitions.
///
/// All counters are atomic and monotonically increasing; read them while
/// operations are in progress through [`BucketStats::snapshot`].
#[derive(Debug, Default)]
pub struct BucketStats {
    // Document operations
    gets: AtomicU64,
    misses: AtomicU64,
    sets: AtomicU64,
    deletes: AtomicU64,
    conflicts: AtomicU64,
    not_my_vbucket: AtomicU64,

    // Partition lifecycle
    vbuckets_created: AtomicU64,
    vbuckets_destroyed: AtomicU64,
    state_changes: AtomicU64,
    suppressed_state_changes: AtomicU64,
}

impl BucketStats {
    /// Creates a new stats instance.
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn record_get(&self, hit: bool) {
        self.gets.fetch_add(1, Ordering::Relaxed);
        if !hit {
            self.misses.fetch_add(1, Ordering::Relaxed);
        }
    }

    pub(crate) fn record_set(&self) {
        self.sets.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_delete(&self) {
        self.deletes.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_conflict(&self) {
        self.conflicts.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_not_my_vbucket(&self) {
        self.not_my_vbucket.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_vbucket_created(&self) {
        self.vbuckets_created.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_vbucket_destroyed(&self) {
        self.vbuckets_destroyed.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_state_change(&self) {
        self.state_changes.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_suppressed_state_change(&self) {
        self.suppressed_state_changes.fetch_add(1, Ordering::Relaxed);
    }

    /// Returns a point-in-time copy of all counters.
    pub fn snapshot(&self) -> BucketStatsSnapshot {
        BucketStatsSnapshot {
            gets: self.gets.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            sets: self.sets.load(Ordering::Relaxed),
            deletes: self.deletes.load(Ordering::Relaxed),
            conflicts: self.conflicts.load(Ordering::Relaxed),
            not_my_vbucket: self.not_my_vbucket.load(Ordering::Relaxed),
            vbuckets_created: self.vbuckets_created.load(Ordering::Relaxed),
            vbuckets_destroyed: self.vbuckets_destroyed.load(Ordering::Relaxed),
            state_changes: self.state_changes.load(Ordering::Relaxed),
            suppressed_state_changes: self.suppressed_state_changes.load(Ordering::Relaxed),
        }
    }
}

/// A point-in-time copy of [`BucketStats`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BucketStatsSnapshot {
    /// Reads served (hits and misses).
    pub gets: u64,
    /// Reads of absent keys.
    pub misses: u64,
    /// Successful non-delete writes.
    pub sets: u64,
    /// Successful deletes.
    pub deletes: u64,
    /// Writes rejected on CAS or existence conflict.
    pub conflicts: u64,
    /// Operations addressed to an absent or inactive partition.
    pub not_my_vbucket: u64,
    /// Partitions created.
    pub vbuckets_created: u64,
    /// Partitions destroyed.
    pub vbuckets_destroyed: u64,
    /// State changes published.
    pub state_changes: u64,
    /// State changes dropped because the slot was replaced mid-transition.
    pub suppressed_state_changes: u64,
}
