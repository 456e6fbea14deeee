//! Buckets: named keyspaces split into partition slots.

use crate::broadcast::Broadcaster;
use crate::config::BucketConfig;
use crate::ddoc::CachedDDocs;
use crate::error::CoreResult;
use crate::event::{BucketEvent, VBucketChange};
use crate::ops::{MutationRequest, OpResponse, Status};
use crate::stats::{BucketStats, BucketStatsSnapshot};
use crate::types::{VBState, VbId, DDOC_VBID};
use crate::vbucket::{StateTransition, VBucket};
use arc_swap::ArcSwapOption;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::mpsc::Sender;
use std::sync::{Arc, Weak};
use std::thread;
use tracing::{debug, info, warn};
use uuid::Uuid;
use vbkv_storage::CollectionFactory;

/// Name of the collection backing the design-document partition.
const DDOC_COLLECTION: &str = "ddoc";

/// Name of the collection backing one partition instance.
fn vbucket_collection(vbid: VbId, generation: u64) -> String {
    format!("vb{:04}-g{generation}", vbid.as_u16())
}

/// Inverse of [`vbucket_collection`].
fn parse_vbucket_collection(name: &str) -> Option<(VbId, u64)> {
    let (vbid, generation) = name.strip_prefix("vb")?.split_once("-g")?;
    Some((VbId::new(vbid.parse().ok()?), generation.parse().ok()?))
}

/// A named keyspace split into up to [`crate::MAX_VBUCKETS`] partitions.
///
/// Each slot holds at most one [`VBucket`]. Reading a slot is a wait-free
/// atomic load; filling and emptying a slot are compare-and-swap operations,
/// so every lifecycle race has exactly one winner.
///
/// Once [`Bucket::close`] has been called the bucket stays closed, and all
/// partition operations become no-ops returning `None` or `false`.
///
/// With directory storage a bucket opened over an existing directory picks
/// up the partitions stored there. They come back `Dead`: states are not
/// persisted.
///
/// # Example
///
/// ```rust
/// use vbkv_core::{Bucket, BucketConfig, MutationRequest, Status, VBState, VbId};
///
/// let bucket = Bucket::new("default", &BucketConfig::default()).unwrap();
/// let vbid = VbId::new(0);
///
/// bucket.create_vbucket(vbid).unwrap().unwrap();
/// bucket.set_vb_state(vbid, VBState::Active).unwrap();
///
/// let resp = bucket.mutate(vbid, &MutationRequest::set("k", "v")).unwrap();
/// assert_eq!(resp.status, Status::Success);
/// ```
pub struct Bucket {
    name: String,
    id: Uuid,
    self_ref: Weak<Bucket>,
    vbuckets: Box<[ArcSwapOption<VBucket>]>,
    closed: AtomicBool,
    observer: Arc<Broadcaster>,
    storage: Arc<dyn CollectionFactory>,
    generation: AtomicU64,
    stats: Arc<BucketStats>,

    // Design documents
    ddoc_vbucket: Arc<VBucket>,
    pub(crate) ddocs: ArcSwapOption<CachedDDocs>,
    pub(crate) ddocs_version: AtomicU64,
}

impl Bucket {
    /// Creates an open bucket with every slot empty.
    ///
    /// The design-document partition is created Active along with the
    /// bucket. Partitions already present in the bucket's storage are
    /// reopened into their slots in the `Dead` state.
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration or name is invalid, or the
    /// bucket's stored collections cannot be opened.
    pub fn new(name: impl Into<String>, config: &BucketConfig) -> CoreResult<Arc<Self>> {
        config.validate()?;

        let name = name.into();
        let id = Uuid::new_v4();
        let storage = config.collection_factory(&name)?;
        let observer = Arc::new(Broadcaster::new());
        let stats = Arc::new(BucketStats::new());

        let ddoc_vbucket = Arc::new(VBucket::new(
            DDOC_VBID,
            VBState::Active,
            DDOC_COLLECTION,
            storage.open(DDOC_COLLECTION)?,
            Arc::clone(&observer),
            Arc::clone(&stats),
        )?);

        let vbuckets: Box<[ArcSwapOption<VBucket>]> = (0..config.max_vbuckets)
            .map(|_| ArcSwapOption::empty())
            .collect();
        let generation = recover_vbuckets(&name, storage.as_ref(), &vbuckets, &observer, &stats)?;

        info!(bucket = %name, %id, max_vbuckets = config.max_vbuckets, "bucket opened");

        Ok(Arc::new_cyclic(|self_ref| Self {
            name,
            id,
            self_ref: self_ref.clone(),
            vbuckets,
            closed: AtomicBool::new(false),
            observer,
            storage,
            generation: AtomicU64::new(generation),
            stats,
            ddoc_vbucket,
            ddocs: ArcSwapOption::empty(),
            ddocs_version: AtomicU64::new(0),
        }))
    }

    /// Returns the bucket name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the id of this bucket instance.
    ///
    /// A bucket re-created under the same name gets a new id.
    #[must_use]
    pub fn id(&self) -> Uuid {
        self.id
    }

    /// Returns the number of partition slots.
    #[must_use]
    pub fn max_vbuckets(&self) -> usize {
        self.vbuckets.len()
    }

    // ========================================================================
    // Availability
    // ========================================================================

    /// Returns true until the bucket is closed.
    #[must_use]
    pub fn available(&self) -> bool {
        !self.closed.load(Ordering::Acquire)
    }

    /// Closes the bucket.
    ///
    /// # Panics
    ///
    /// Panics if the bucket is already closed.
    pub fn close(&self) {
        let was_closed = self.closed.swap(true, Ordering::AcqRel);
        assert!(!was_closed, "bucket {} closed twice", self.name);
        info!(bucket = %self.name, "bucket closed");
    }

    // ========================================================================
    // Partition slots
    // ========================================================================

    fn slot(&self, vbid: VbId) -> Option<&ArcSwapOption<VBucket>> {
        if !self.available() {
            return None;
        }
        self.vbuckets.get(vbid.index())
    }

    /// Returns the partition occupying `vbid`, if any.
    ///
    /// Wait-free. Returns `None` when the bucket is closed, the id is out of
    /// range, or the slot is empty.
    #[must_use]
    pub fn get_vbucket(&self, vbid: VbId) -> Option<Arc<VBucket>> {
        self.slot(vbid)?.load_full()
    }

    /// Fills the empty slot `vbid` with a new `Dead` partition.
    ///
    /// Of any number of concurrent creators for one slot, exactly one gets
    /// the partition back; the rest get `Ok(None)`, as do callers on a closed
    /// bucket or with an out-of-range id.
    ///
    /// # Errors
    ///
    /// Returns an error if the partition's storage cannot be opened.
    pub fn create_vbucket(&self, vbid: VbId) -> CoreResult<Option<Arc<VBucket>>> {
        let Some(slot) = self.slot(vbid) else {
            return Ok(None);
        };
        if slot.load().is_some() {
            return Ok(None);
        }

        let generation = self.generation.fetch_add(1, Ordering::Relaxed);
        let collection_name = vbucket_collection(vbid, generation);
        let collection = self.storage.open(&collection_name)?;
        let vb = Arc::new(VBucket::new(
            vbid,
            VBState::Dead,
            collection_name,
            collection,
            Arc::clone(&self.observer),
            Arc::clone(&self.stats),
        )?);

        let prev = slot.compare_and_swap(&None::<Arc<VBucket>>, Some(Arc::clone(&vb)));
        if prev.is_some() {
            debug!(bucket = %self.name, %vbid, "lost vbucket create race");
            self.remove_collection(&vb);
            return Ok(None);
        }

        self.stats.record_vbucket_created();
        debug!(bucket = %self.name, %vbid, "vbucket created");
        Ok(Some(vb))
    }

    /// Moves the partition at `vbid` to `Dead` and empties its slot.
    ///
    /// Returns true for exactly one of any number of concurrent destroyers;
    /// only that caller's `old -> Dead` change is broadcast.
    pub fn destroy_vbucket(&self, vbid: VbId) -> bool {
        let Some(vb) = self.get_vbucket(vbid) else {
            return false;
        };
        let transition = vb.begin_transition(VBState::Dead);
        self.commit_destroy(&vb, transition)
    }

    /// Sets the state of the partition at `vbid`.
    ///
    /// Returns the partition if the change was published. If the slot was
    /// emptied or refilled while the transition was pending, the change is
    /// not broadcast and `None` is returned, even though the displaced
    /// instance's own state did change.
    pub fn set_vb_state(&self, vbid: VbId, state: VBState) -> Option<Arc<VBucket>> {
        let vb = self.get_vbucket(vbid)?;
        let transition = vb.begin_transition(state);
        if self.commit_state_change(&vb, transition) {
            Some(vb)
        } else {
            None
        }
    }

    /// Publishes a pending transition if `vb` still occupies its slot.
    ///
    /// The broadcast happens before the transition lock is released, so
    /// changes to one partition reach subscribers in the order they were
    /// applied. Returns false without publishing if `transition` was begun
    /// on a different instance.
    pub fn commit_state_change(&self, vb: &Arc<VBucket>, transition: StateTransition<'_>) -> bool {
        if !self.owns_transition(vb, &transition) {
            return false;
        }
        let vbid = vb.id();
        let current = self.get_vbucket(vbid);
        if !current.is_some_and(|current| Arc::ptr_eq(&current, vb)) {
            self.stats.record_suppressed_state_change();
            debug!(
                bucket = %self.name,
                %vbid,
                new_state = %transition.new_state(),
                "vbucket replaced during transition, change suppressed"
            );
            return false;
        }

        self.publish_change(vbid, &transition);
        self.stats.record_state_change();
        true
    }

    /// Empties `vb`'s slot if it still holds `vb`, then publishes the
    /// transition.
    ///
    /// The destroyed partition's collection is deleted from storage. Returns
    /// false without touching the slot if `transition` was begun on a
    /// different instance or is not a transition to `Dead`.
    pub fn commit_destroy(&self, vb: &Arc<VBucket>, transition: StateTransition<'_>) -> bool {
        if !self.owns_transition(vb, &transition) {
            return false;
        }
        if transition.new_state() != VBState::Dead {
            warn!(
                bucket = %self.name,
                vbid = %vb.id(),
                new_state = %transition.new_state(),
                "refusing to destroy vbucket with a non-dead transition"
            );
            return false;
        }
        let Some(slot) = self.vbuckets.get(vb.id().index()) else {
            return false;
        };

        let prev = slot.compare_and_swap(vb, None::<Arc<VBucket>>);
        if !matches!(&*prev, Some(removed) if Arc::ptr_eq(removed, vb)) {
            debug!(bucket = %self.name, vbid = %vb.id(), "lost vbucket destroy race");
            return false;
        }

        self.publish_change(vb.id(), &transition);
        self.stats.record_vbucket_destroyed();
        debug!(bucket = %self.name, vbid = %vb.id(), old_state = %transition.old_state(), "vbucket destroyed");
        drop(transition);
        self.remove_collection(vb);
        true
    }

    fn owns_transition(&self, vb: &VBucket, transition: &StateTransition<'_>) -> bool {
        if transition.is_for(vb) {
            return true;
        }
        warn!(
            bucket = %self.name,
            vbid = %vb.id(),
            transition_vbid = %transition.vbid(),
            "refusing to commit a transition begun on another vbucket"
        );
        false
    }

    fn remove_collection(&self, vb: &VBucket) {
        if let Err(err) = self.storage.remove(vb.collection_name()) {
            warn!(
                bucket = %self.name,
                collection = vb.collection_name(),
                error = %err,
                "failed to remove vbucket storage"
            );
        }
    }

    /// Deletes everything the bucket has stored. Called once the bucket is
    /// closed for good.
    pub(crate) fn remove_storage(&self) {
        if let Err(err) = self.storage.remove_all() {
            warn!(bucket = %self.name, error = %err, "failed to remove bucket storage");
        }
    }

    fn publish_change(&self, vbid: VbId, transition: &StateTransition<'_>) {
        self.observer.submit(
            VBucketChange {
                bucket: self.self_ref.clone(),
                vbid,
                old_state: transition.old_state(),
                new_state: transition.new_state(),
            }
            .into(),
        );
    }

    /// Returns the state of the partition at `vbid`, `Dead` if there is none.
    #[must_use]
    pub fn get_vb_state(&self, vbid: VbId) -> VBState {
        self.get_vbucket(vbid)
            .map_or(VBState::Dead, |vb| vb.state())
    }

    // ========================================================================
    // Events
    // ========================================================================

    /// Returns the bucket's broadcaster.
    #[must_use]
    pub fn observer(&self) -> &Arc<Broadcaster> {
        &self.observer
    }

    /// Registers `subscriber` for all future events, then replays the
    /// current state.
    ///
    /// The replay runs on a separate thread and sends a `Dead -> state`
    /// change for every non-`Dead` partition, in ascending id order. Replayed
    /// and live events may interleave.
    pub fn subscribe(&self, subscriber: Sender<BucketEvent>) {
        self.observer.register(subscriber.clone());

        let bucket = self.self_ref.clone();
        let replay_tx = subscriber.clone();
        let spawned = thread::Builder::new()
            .name(format!("vbkv-replay-{}", self.name))
            .spawn(move || replay_states(&bucket, &replay_tx));
        if let Err(err) = spawned {
            warn!(bucket = %self.name, error = %err, "replay thread failed to start, replaying inline");
            replay_states(&self.self_ref, &subscriber);
        }
    }

    // ========================================================================
    // Documents
    // ========================================================================

    /// Reads `key` from the partition at `vbid`.
    ///
    /// # Errors
    ///
    /// Returns an error if the partition's storage fails.
    pub fn get(&self, vbid: VbId, key: &[u8]) -> CoreResult<OpResponse> {
        match self.get_vbucket(vbid) {
            Some(vb) => vb.get(key),
            None => Ok(self.not_my_vbucket()),
        }
    }

    /// Applies `req` to the partition at `vbid`.
    ///
    /// # Errors
    ///
    /// Returns an error if the partition's storage fails.
    pub fn mutate(&self, vbid: VbId, req: &MutationRequest) -> CoreResult<OpResponse> {
        match self.get_vbucket(vbid) {
            Some(vb) => vb.mutate(req),
            None => Ok(self.not_my_vbucket()),
        }
    }

    fn not_my_vbucket(&self) -> OpResponse {
        self.stats.record_not_my_vbucket();
        OpResponse::status(Status::NotMyVBucket)
    }

    /// Returns the design-document partition, `None` once the bucket is
    /// closed.
    #[must_use]
    pub fn ddoc_vbucket(&self) -> Option<&Arc<VBucket>> {
        self.available().then_some(&self.ddoc_vbucket)
    }

    /// Returns a copy of the bucket's counters.
    #[must_use]
    pub fn stats(&self) -> BucketStatsSnapshot {
        self.stats.snapshot()
    }
}

/// Reopens the partitions found in `storage` into `slots`.
///
/// Only the newest generation of each partition is kept; older ones are
/// leftovers of instances that were replaced and are deleted. Returns the
/// first unused generation.
fn recover_vbuckets(
    bucket: &str,
    storage: &dyn CollectionFactory,
    slots: &[ArcSwapOption<VBucket>],
    observer: &Arc<Broadcaster>,
    stats: &Arc<BucketStats>,
) -> CoreResult<u64> {
    let mut newest: BTreeMap<VbId, (u64, String)> = BTreeMap::new();
    let mut next_generation = 0;
    for name in storage.existing()? {
        let Some((vbid, generation)) = parse_vbucket_collection(&name) else {
            continue;
        };
        next_generation = next_generation.max(generation + 1);
        let kept = newest.get(&vbid).map(|(kept, _)| *kept);
        let stale = if kept.is_some_and(|kept| kept > generation) {
            Some(name)
        } else {
            newest
                .insert(vbid, (generation, name))
                .map(|(_, replaced)| replaced)
        };
        if let Some(stale) = stale {
            debug!(bucket, collection = %stale, "removing replaced vbucket storage");
            storage.remove(&stale)?;
        }
    }

    for (vbid, (_, name)) in newest {
        let Some(slot) = slots.get(vbid.index()) else {
            warn!(bucket, %vbid, collection = %name, "stored vbucket is outside the slot range");
            continue;
        };
        let vb = VBucket::new(
            vbid,
            VBState::Dead,
            name.as_str(),
            storage.open(&name)?,
            Arc::clone(observer),
            Arc::clone(stats),
        )?;
        debug!(bucket, %vbid, items = vb.item_count(), "vbucket reopened");
        slot.store(Some(Arc::new(vb)));
    }
    Ok(next_generation)
}

fn replay_states(bucket: &Weak<Bucket>, subscriber: &Sender<BucketEvent>) {
    let Some(strong) = bucket.upgrade() else {
        return;
    };
    for index in 0..strong.max_vbuckets() {
        let Ok(raw) = u16::try_from(index) else {
            break;
        };
        let vbid = VbId::new(raw);
        let state = strong.get_vb_state(vbid);
        if state == VBState::Dead {
            continue;
        }
        let change = VBucketChange {
            bucket: bucket.clone(),
            vbid,
            old_state: VBState::Dead,
            new_state: state,
        };
        if subscriber.send(change.into()).is_err() {
            return;
        }
    }
}

impl std::fmt::Debug for Bucket {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Bucket")
            .field("name", &self.name)
            .field("id", &self.id)
            .field("available", &self.available())
            .field("max_vbuckets", &self.max_vbuckets())
            .finish_non_exhaustive()
    }
}
