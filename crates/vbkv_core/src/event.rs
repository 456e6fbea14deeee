//! Events delivered to bucket subscribers.

use crate::bucket::Bucket;
use crate::types::{VBState, VbId};
use crate::vbucket::VBucket;
use std::fmt;
use std::sync::{Arc, Weak};

/// A document write applied by a partition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Mutation {
    /// Partition the document lives in.
    pub vbid: VbId,
    /// Document key.
    pub key: Vec<u8>,
    /// CAS assigned by the write.
    pub cas: u64,
    /// Whether the write removed the document.
    pub deleted: bool,
}

/// A partition state transition.
///
/// Emitted once per applied transition; a new subscriber also receives a
/// synthetic `Dead -> state` change for every live partition.
#[derive(Debug, Clone)]
pub struct VBucketChange {
    /// Bucket owning the partition.
    pub bucket: Weak<Bucket>,
    /// Partition id.
    pub vbid: VbId,
    /// State before the transition.
    pub old_state: VBState,
    /// State after the transition.
    pub new_state: VBState,
}

impl VBucketChange {
    /// Looks up the partition currently occupying the changed slot.
    ///
    /// Returns `None` if the bucket has gone away, is closed, or the slot is
    /// empty.
    #[must_use]
    pub fn vbucket(&self) -> Option<Arc<VBucket>> {
        self.bucket.upgrade()?.get_vbucket(self.vbid)
    }
}

impl PartialEq for VBucketChange {
    fn eq(&self, other: &Self) -> bool {
        Weak::ptr_eq(&self.bucket, &other.bucket)
            && self.vbid == other.vbid
            && self.old_state == other.old_state
            && self.new_state == other.new_state
    }
}

impl Eq for VBucketChange {}

impl fmt::Display for VBucketChange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "vbucket {} {} -> {}",
            self.vbid.as_u16(),
            self.old_state,
            self.new_state
        )
    }
}

/// Everything a bucket broadcasts.
///
/// Consumers match exhaustively; there is no other kind of event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BucketEvent {
    /// A document write.
    Mutation(Mutation),
    /// A partition state transition.
    VBucketChange(VBucketChange),
}

impl From<Mutation> for BucketEvent {
    fn from(mutation: Mutation) -> Self {
        Self::Mutation(mutation)
    }
}

impl From<VBucketChange> for BucketEvent {
    fn from(change: VBucketChange) -> Self {
        Self::VBucketChange(change)
    }
}
