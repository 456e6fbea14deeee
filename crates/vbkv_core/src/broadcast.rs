//! Fan-out of bucket events to subscribers.
//!
//! The broadcaster delivers every submitted [`BucketEvent`] to every
//! registered channel, enabling:
//! - Replication streams
//! - Mutation logging
//! - Index maintenance
//!
//! # Usage
//!
//! ```rust
//! use std::sync::mpsc;
//! use vbkv_core::{Broadcaster, BucketEvent, Mutation, VbId};
//!
//! let observer = Broadcaster::new();
//! let (tx, rx) = mpsc::channel();
//! observer.register(tx);
//!
//! observer.submit(BucketEvent::Mutation(Mutation {
//!     vbid: VbId::new(0),
//!     key: b"a".to_vec(),
//!     cas: 1,
//!     deleted: false,
//! }));
//! assert!(matches!(rx.recv().unwrap(), BucketEvent::Mutation(_)));
//! ```

use crate::event::BucketEvent;
use parking_lot::RwLock;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::mpsc::Sender;
use tracing::debug;

/// Distributes bucket events to subscriber channels.
///
/// The broadcaster:
/// - Sends each event to every live subscriber, never dropping one
/// - Preserves submission order per subscriber
/// - Prunes subscribers whose receiver has hung up
/// - Is thread-safe
///
/// Channels are unbounded; pacing a slow consumer is up to the integration
/// layer.
#[derive(Debug, Default)]
pub struct Broadcaster {
    subscribers: RwLock<Vec<Sender<BucketEvent>>>,
    submitted: AtomicU64,
}

impl Broadcaster {
    /// Creates a broadcaster with no subscribers.
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a subscriber channel.
    pub fn register(&self, subscriber: Sender<BucketEvent>) {
        self.subscribers.write().push(subscriber);
    }

    /// Delivers `event` to every registered subscriber.
    ///
    /// The subscriber list stays locked for the whole fan-out, so two
    /// concurrent submissions reach every subscriber in the same order.
    pub fn submit(&self, event: BucketEvent) {
        let mut subscribers = self.subscribers.write();
        let before = subscribers.len();
        subscribers.retain(|tx| tx.send(event.clone()).is_ok());
        self.submitted.fetch_add(1, Ordering::Relaxed);

        let pruned = before - subscribers.len();
        if pruned > 0 {
            debug!(pruned, remaining = subscribers.len(), "pruned hung-up subscribers");
        }
    }

    /// Returns the number of registered subscribers.
    pub fn subscriber_count(&self) -> usize {
        self.subscribers.read().len()
    }

    /// Returns the number of events submitted so far.
    pub fn submitted(&self) -> u64 {
        self.submitted.load(Ordering::Relaxed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::Mutation;
    use crate::types::VbId;
    use std::sync::mpsc;
    use std::sync::Arc;
    use std::thread;
    use std::time::Duration;

    fn mutation(cas: u64) -> BucketEvent {
        BucketEvent::Mutation(Mutation {
            vbid: VbId::new(0),
            key: b"k".to_vec(),
            cas,
            deleted: false,
        })
    }

    #[test]
    fn submit_and_receive() {
        let observer = Broadcaster::new();
        let (tx, rx) = mpsc::channel();
        observer.register(tx);

        observer.submit(mutation(1));
        assert_eq!(
            rx.recv_timeout(Duration::from_millis(100)).unwrap(),
            mutation(1)
        );
        assert_eq!(observer.submitted(), 1);
    }

    #[test]
    fn multiple_subscribers() {
        let observer = Broadcaster::new();
        let (tx1, rx1) = mpsc::channel();
        let (tx2, rx2) = mpsc::channel();
        observer.register(tx1);
        observer.register(tx2);

        observer.submit(mutation(7));
        assert_eq!(rx1.recv().unwrap(), mutation(7));
        assert_eq!(rx2.recv().unwrap(), mutation(7));
    }

    #[test]
    fn subscriber_cleanup() {
        let observer = Broadcaster::new();
        let (tx, rx) = mpsc::channel();
        observer.register(tx);
        assert_eq!(observer.subscriber_count(), 1);

        drop(rx);
        observer.submit(mutation(1));
        assert_eq!(observer.subscriber_count(), 0);
    }

    #[test]
    fn order_is_preserved_per_subscriber() {
        let observer = Arc::new(Broadcaster::new());
        let (tx, rx) = mpsc::channel();
        observer.register(tx);

        let submitter = Arc::clone(&observer);
        let handle = thread::spawn(move || {
            for cas in 1..=100 {
                submitter.submit(mutation(cas));
            }
        });
        handle.join().unwrap();

        let received: Vec<u64> = rx
            .try_iter()
            .map(|event| match event {
                BucketEvent::Mutation(m) => m.cas,
                BucketEvent::VBucketChange(_) => 0,
            })
            .collect();
        assert_eq!(received, (1..=100).collect::<Vec<_>>());
    }

    #[test]
    fn concurrent_submitters_agree_on_order() {
        let observer = Arc::new(Broadcaster::new());
        let (tx1, rx1) = mpsc::channel();
        let (tx2, rx2) = mpsc::channel();
        observer.register(tx1);
        observer.register(tx2);

        let handles: Vec<_> = (0..4u64)
            .map(|t| {
                let observer = Arc::clone(&observer);
                thread::spawn(move || {
                    for i in 0..50 {
                        observer.submit(mutation(t * 1000 + i));
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        let first: Vec<_> = rx1.try_iter().collect();
        let second: Vec<_> = rx2.try_iter().collect();
        assert_eq!(first.len(), 200);
        assert_eq!(first, second);
    }
}
