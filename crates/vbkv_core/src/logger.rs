//! Event consumer that logs every bucket event.

use crate::bucket::Bucket;
use crate::event::BucketEvent;
use std::io;
use std::sync::mpsc::{self, Receiver};
use std::thread::{self, JoinHandle};
use tracing::info;

/// Counts of the events a mutation logger consumed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MutationLogSummary {
    /// Document writes that stored a value.
    pub mutations: u64,
    /// Document writes that removed a value.
    pub deletions: u64,
    /// Partition state changes, replayed ones included.
    pub state_changes: u64,
}

/// Logs every event from `events` until all senders hang up.
pub fn mutation_logger(events: Receiver<BucketEvent>) -> MutationLogSummary {
    let mut summary = MutationLogSummary::default();
    for event in events {
        match event {
            BucketEvent::Mutation(m) => {
                if m.deleted {
                    summary.deletions += 1;
                } else {
                    summary.mutations += 1;
                }
                info!(
                    vbid = %m.vbid,
                    key = %String::from_utf8_lossy(&m.key),
                    cas = m.cas,
                    deleted = m.deleted,
                    "mutation"
                );
            }
            BucketEvent::VBucketChange(change) => {
                summary.state_changes += 1;
                info!("{change}");
            }
        }
    }
    summary
}

/// Subscribes a fresh channel to `bucket` and logs it on a named thread.
///
/// The thread ends once the bucket and every other holder of its
/// broadcaster are gone.
///
/// # Errors
///
/// Returns an error if the thread cannot be spawned.
pub fn spawn_mutation_logger(bucket: &Bucket) -> io::Result<JoinHandle<MutationLogSummary>> {
    let (tx, rx) = mpsc::channel();
    let handle = thread::Builder::new()
        .name(format!("vbkv-mutation-log-{}", bucket.name()))
        .spawn(move || mutation_logger(rx))?;
    bucket.subscribe(tx);
    Ok(handle)
}
