//! A single partition of a bucket.

use crate::broadcast::Broadcaster;
use crate::error::CoreResult;
use crate::event::Mutation;
use crate::item::Item;
use crate::ops::{MutationOp, MutationRequest, OpResponse, Status};
use crate::stats::BucketStats;
use crate::types::{VBState, VbId};
use parking_lot::{Mutex, MutexGuard};
use std::sync::atomic::{AtomicU64, AtomicU8, Ordering};
use std::sync::Arc;
use tracing::trace;
use vbkv_storage::Collection;

/// One partition: a storage collection, a state and a CAS counter.
///
/// A `VBucket` is never swapped out from under a holder. When a slot is
/// replaced, the bucket installs a *new* instance and existing `Arc`s keep
/// working against the old one.
///
/// # Locking
///
/// - State transitions are serialized by a lock that covers the state field
///   and the commit that follows it, never document I/O.
/// - Writes are serialized by a second lock so compare-and-write is atomic.
/// - Reads go straight to the collection.
pub struct VBucket {
    id: VbId,
    state: AtomicU8,
    transition_lock: Mutex<()>,
    mutation_lock: Mutex<()>,
    cas_counter: AtomicU64,
    collection_name: String,
    collection: Box<dyn Collection>,
    observer: Arc<Broadcaster>,
    stats: Arc<BucketStats>,
}

/// A state change that has been applied but not yet committed.
///
/// Holds the partition's transition lock: no other transition on the same
/// instance can start until this token is dropped. The bucket commits it with
/// a slot check or slot removal and publishes the change only if that
/// succeeds.
#[must_use = "a transition holds the state lock until it is committed or dropped"]
pub struct StateTransition<'a> {
    vbucket: &'a VBucket,
    vbid: VbId,
    old_state: VBState,
    new_state: VBState,
    _guard: MutexGuard<'a, ()>,
}

impl StateTransition<'_> {
    /// Partition the transition applies to.
    #[must_use]
    pub fn vbid(&self) -> VbId {
        self.vbid
    }

    /// State before the transition.
    #[must_use]
    pub fn old_state(&self) -> VBState {
        self.old_state
    }

    /// State after the transition.
    #[must_use]
    pub fn new_state(&self) -> VBState {
        self.new_state
    }

    /// Returns true if the transition was begun on `vb`.
    #[must_use]
    pub fn is_for(&self, vb: &VBucket) -> bool {
        std::ptr::eq(self.vbucket, vb)
    }
}

impl std::fmt::Debug for StateTransition<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StateTransition")
            .field("vbid", &self.vbid)
            .field("old_state", &self.old_state)
            .field("new_state", &self.new_state)
            .finish()
    }
}

impl VBucket {
    /// Creates a partition over `collection`, opened under `collection_name`.
    ///
    /// The CAS counter resumes after the highest CAS already stored, so a
    /// reopened collection never hands out a version twice.
    pub(crate) fn new(
        id: VbId,
        initial_state: VBState,
        collection_name: impl Into<String>,
        collection: Box<dyn Collection>,
        observer: Arc<Broadcaster>,
        stats: Arc<BucketStats>,
    ) -> CoreResult<Self> {
        let mut max_cas = 0;
        visit_decoded(collection.as_ref(), b"", |item| {
            max_cas = max_cas.max(item.cas);
            true
        })?;

        Ok(Self {
            id,
            state: AtomicU8::new(initial_state.as_byte()),
            transition_lock: Mutex::new(()),
            mutation_lock: Mutex::new(()),
            cas_counter: AtomicU64::new(max_cas),
            collection_name: collection_name.into(),
            collection,
            observer,
            stats,
        })
    }

    /// Returns the partition id.
    #[must_use]
    pub fn id(&self) -> VbId {
        self.id
    }

    /// Returns the name of the storage collection holding the documents.
    #[must_use]
    pub fn collection_name(&self) -> &str {
        &self.collection_name
    }

    /// Returns the current state without blocking.
    #[must_use]
    pub fn state(&self) -> VBState {
        VBState::from_byte(self.state.load(Ordering::Acquire)).unwrap_or_default()
    }

    /// Applies `new_state` and returns the pending transition.
    ///
    /// Any state may follow any other. Blocks only while another transition
    /// on this instance is pending.
    pub fn begin_transition(&self, new_state: VBState) -> StateTransition<'_> {
        let guard = self.transition_lock.lock();
        let old = self.state.swap(new_state.as_byte(), Ordering::AcqRel);
        StateTransition {
            vbucket: self,
            vbid: self.id,
            old_state: VBState::from_byte(old).unwrap_or_default(),
            new_state,
            _guard: guard,
        }
    }

    /// Reads a document.
    ///
    /// # Errors
    ///
    /// Returns an error if the collection fails or the stored item is
    /// corrupt.
    pub fn get(&self, key: &[u8]) -> CoreResult<OpResponse> {
        if self.state() != VBState::Active {
            self.stats.record_not_my_vbucket();
            return Ok(OpResponse::status(Status::NotMyVBucket));
        }

        let item = self.load(key)?;
        self.stats.record_get(item.is_some());
        Ok(item.map_or(OpResponse::status(Status::NotFound), OpResponse::found))
    }

    /// Applies a write.
    ///
    /// A request CAS of zero writes unconditionally; a nonzero CAS writes
    /// only if it equals the stored CAS (`Conflict` otherwise, `NotFound` if
    /// the key is absent). Every applied write gets a fresh CAS and is
    /// broadcast as a [`Mutation`].
    ///
    /// # Errors
    ///
    /// Returns an error if the collection fails or the stored item is
    /// corrupt.
    pub fn mutate(&self, req: &MutationRequest) -> CoreResult<OpResponse> {
        if self.state() != VBState::Active {
            self.stats.record_not_my_vbucket();
            return Ok(OpResponse::status(Status::NotMyVBucket));
        }

        let _writer = self.mutation_lock.lock();
        let existing = self.load(&req.key)?;

        if let Some(status) = precondition_failure(req, existing.as_ref()) {
            if status == Status::Conflict {
                self.stats.record_conflict();
            }
            return Ok(OpResponse::status(status));
        }

        let cas = self.cas_counter.fetch_add(1, Ordering::Relaxed) + 1;
        let deleted = req.op == MutationOp::Delete;
        if deleted {
            self.collection.delete(&req.key)?;
            self.stats.record_delete();
        } else {
            let (flags, expiration, data) = match (req.op, existing) {
                (MutationOp::Append, Some(old)) => {
                    let mut data = old.data;
                    data.extend_from_slice(&req.body);
                    (old.flags, old.expiration, data)
                }
                (MutationOp::Prepend, Some(old)) => {
                    let mut data = req.body.clone();
                    data.extend_from_slice(&old.data);
                    (old.flags, old.expiration, data)
                }
                _ => (req.flags, req.expiration, req.body.clone()),
            };
            let item = Item {
                key: req.key.clone(),
                cas,
                flags,
                expiration,
                data,
            };
            self.collection.set(&req.key, &item.encode_value()?)?;
            self.stats.record_set();
        }

        trace!(vbid = %self.id, op = ?req.op, cas, "mutation applied");
        self.observer.submit(
            Mutation {
                vbid: self.id,
                key: req.key.clone(),
                cas,
                deleted,
            }
            .into(),
        );
        Ok(OpResponse::stored(cas))
    }

    /// Visits documents with key `>= start` in ascending order.
    ///
    /// An empty `start` begins at the first key; traversal stops when
    /// `visitor` returns false.
    ///
    /// # Errors
    ///
    /// Returns an error if the collection fails or an item is corrupt.
    pub fn visit<F>(&self, start: &[u8], mut visitor: F) -> CoreResult<()>
    where
        F: FnMut(&[u8], &[u8]) -> bool,
    {
        self.visit_items(start, |item| visitor(&item.key, &item.data))
    }

    /// Like [`VBucket::visit`], yielding whole items.
    ///
    /// # Errors
    ///
    /// Returns an error if the collection fails or an item is corrupt.
    pub fn visit_items<F>(&self, start: &[u8], visitor: F) -> CoreResult<()>
    where
        F: FnMut(Item) -> bool,
    {
        visit_decoded(self.collection.as_ref(), start, visitor)
    }

    /// Returns the number of stored documents.
    #[must_use]
    pub fn item_count(&self) -> usize {
        self.collection.len()
    }

    fn load(&self, key: &[u8]) -> CoreResult<Option<Item>> {
        match self.collection.get(key)? {
            Some(bytes) => Ok(Some(Item::decode(key, &bytes)?)),
            None => Ok(None),
        }
    }
}

impl std::fmt::Debug for VBucket {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VBucket")
            .field("id", &self.id)
            .field("state", &self.state())
            .field("collection", &self.collection_name)
            .field("items", &self.item_count())
            .finish_non_exhaustive()
    }
}

fn precondition_failure(req: &MutationRequest, existing: Option<&Item>) -> Option<Status> {
    match existing {
        None if req.cas != 0 => return Some(Status::NotFound),
        Some(item) if req.cas != 0 && item.cas != req.cas => return Some(Status::Conflict),
        _ => {}
    }

    match (req.op, existing) {
        (MutationOp::Add, Some(_)) => Some(Status::Conflict),
        (
            MutationOp::Replace | MutationOp::Delete | MutationOp::Append | MutationOp::Prepend,
            None,
        ) => Some(Status::NotFound),
        _ => None,
    }
}

fn visit_decoded<F>(collection: &dyn Collection, start: &[u8], mut visitor: F) -> CoreResult<()>
where
    F: FnMut(Item) -> bool,
{
    let mut decode_err = None;
    collection.visit_ascend(start, &mut |key, bytes| match Item::decode(key, bytes) {
        Ok(item) => visitor(item),
        Err(err) => {
            decode_err = Some(err);
            false
        }
    })?;
    decode_err.map_or(Ok(()), Err)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::BucketEvent;
    use proptest::prelude::*;
    use std::collections::HashMap;
    use std::sync::mpsc::{self, Receiver};
    use std::thread;
    use std::time::Duration;
    use vbkv_storage::MemoryCollection;

    fn vbucket_in(state: VBState) -> (VBucket, Receiver<BucketEvent>) {
        let observer = Arc::new(Broadcaster::new());
        let (tx, rx) = mpsc::channel();
        observer.register(tx);
        let vb = VBucket::new(
            VbId::new(0),
            state,
            "vb0000-g0",
            Box::new(MemoryCollection::new()),
            observer,
            Arc::new(BucketStats::new()),
        )
        .unwrap();
        (vb, rx)
    }

    fn mutations(rx: &Receiver<BucketEvent>) -> Vec<Mutation> {
        rx.try_iter()
            .filter_map(|event| match event {
                BucketEvent::Mutation(m) => Some(m),
                BucketEvent::VBucketChange(_) => None,
            })
            .collect()
    }

    #[test]
    fn cas_contract() {
        let (vb, _rx) = vbucket_in(VBState::Active);

        assert_eq!(vb.get(b"a").unwrap().status, Status::NotFound);

        let first = vb.mutate(&MutationRequest::set("a", "1")).unwrap();
        assert_eq!(first.status, Status::Success);
        assert_ne!(first.cas, 0);

        let second = vb
            .mutate(&MutationRequest::set("a", "2").with_cas(first.cas))
            .unwrap();
        assert_eq!(second.status, Status::Success);
        assert_ne!(second.cas, first.cas);

        let stale = vb
            .mutate(&MutationRequest::set("a", "3").with_cas(first.cas))
            .unwrap();
        assert_eq!(stale.status, Status::Conflict);

        let read = vb.get(b"a").unwrap();
        assert_eq!(read.value, Some(b"2".to_vec()));
        assert_eq!(read.cas, second.cas);
    }

    #[test]
    fn nonzero_cas_on_missing_key_is_not_found() {
        let (vb, _rx) = vbucket_in(VBState::Active);
        let resp = vb
            .mutate(&MutationRequest::set("ghost", "x").with_cas(99))
            .unwrap();
        assert_eq!(resp.status, Status::NotFound);
    }

    #[test]
    fn add_and_replace_check_existence() {
        let (vb, _rx) = vbucket_in(VBState::Active);

        assert_eq!(
            vb.mutate(&MutationRequest::replace("k", "v")).unwrap().status,
            Status::NotFound
        );
        assert!(vb.mutate(&MutationRequest::add("k", "v")).unwrap().is_success());
        assert_eq!(
            vb.mutate(&MutationRequest::add("k", "v")).unwrap().status,
            Status::Conflict
        );
        assert!(vb
            .mutate(&MutationRequest::replace("k", "w"))
            .unwrap()
            .is_success());
        assert_eq!(vb.get(b"k").unwrap().value, Some(b"w".to_vec()));
    }

    #[test]
    fn append_and_prepend_keep_flags() {
        let (vb, _rx) = vbucket_in(VBState::Active);
        vb.mutate(&MutationRequest::set("k", "mid").with_flags(7))
            .unwrap();
        vb.mutate(&MutationRequest::append("k", ">")).unwrap();
        vb.mutate(&MutationRequest::prepend("k", "<")).unwrap();

        let read = vb.get(b"k").unwrap();
        assert_eq!(read.value, Some(b"<mid>".to_vec()));
        assert_eq!(read.flags, 7);
        assert_eq!(
            vb.mutate(&MutationRequest::append("missing", "x"))
                .unwrap()
                .status,
            Status::NotFound
        );
    }

    #[test]
    fn delete_emits_deleted_mutation() {
        let (vb, rx) = vbucket_in(VBState::Active);
        let set = vb.mutate(&MutationRequest::set("k", "v")).unwrap();
        let del = vb.mutate(&MutationRequest::delete("k")).unwrap();
        assert!(del.is_success());
        assert!(del.cas > set.cas);
        assert_eq!(vb.get(b"k").unwrap().status, Status::NotFound);
        assert_eq!(
            vb.mutate(&MutationRequest::delete("k")).unwrap().status,
            Status::NotFound
        );

        let events = mutations(&rx);
        assert_eq!(events.len(), 2);
        assert!(!events[0].deleted);
        assert!(events[1].deleted);
        assert_eq!(events[1].cas, del.cas);
    }

    #[test]
    fn rejected_writes_emit_nothing() {
        let (vb, rx) = vbucket_in(VBState::Active);
        vb.mutate(&MutationRequest::set("k", "v").with_cas(5)).unwrap();
        vb.mutate(&MutationRequest::delete("k")).unwrap();
        assert!(mutations(&rx).is_empty());
    }

    #[test]
    fn inactive_partition_refuses_documents() {
        for state in [VBState::Dead, VBState::Replica, VBState::Pending] {
            let (vb, _rx) = vbucket_in(state);
            assert_eq!(vb.get(b"k").unwrap().status, Status::NotMyVBucket);
            assert_eq!(
                vb.mutate(&MutationRequest::set("k", "v")).unwrap().status,
                Status::NotMyVBucket
            );
        }
    }

    #[test]
    fn transition_reports_old_state() {
        let (vb, _rx) = vbucket_in(VBState::Dead);
        let t = vb.begin_transition(VBState::Replica);
        assert_eq!(t.old_state(), VBState::Dead);
        assert_eq!(t.new_state(), VBState::Replica);
        assert_eq!(vb.state(), VBState::Replica);
        drop(t);

        let t = vb.begin_transition(VBState::Pending);
        assert_eq!(t.old_state(), VBState::Replica);
    }

    #[test]
    fn transitions_do_not_interleave() {
        let (vb, _rx) = vbucket_in(VBState::Dead);
        let vb = Arc::new(vb);

        let held = vb.begin_transition(VBState::Active);
        let (tx, rx) = mpsc::channel();
        let other = Arc::clone(&vb);
        let handle = thread::spawn(move || {
            let t = other.begin_transition(VBState::Replica);
            tx.send(t.old_state()).unwrap();
        });

        assert!(rx.recv_timeout(Duration::from_millis(50)).is_err());
        drop(held);
        assert_eq!(rx.recv().unwrap(), VBState::Active);
        handle.join().unwrap();
        assert_eq!(vb.state(), VBState::Replica);
    }

    #[test]
    fn documents_readable_during_pending_transition() {
        let (vb, _rx) = vbucket_in(VBState::Active);
        vb.mutate(&MutationRequest::set("k", "v")).unwrap();

        let t = vb.begin_transition(VBState::Active);
        assert!(vb.get(b"k").unwrap().is_success());
        assert!(vb.mutate(&MutationRequest::set("k", "w")).unwrap().is_success());
        drop(t);
    }

    #[test]
    fn visit_from_start_and_stop_early() {
        let (vb, _rx) = vbucket_in(VBState::Active);
        for key in ["d", "a", "c", "b"] {
            vb.mutate(&MutationRequest::set(key, key.to_uppercase()))
                .unwrap();
        }

        let mut seen = Vec::new();
        vb.visit(b"b", |k, v| {
            seen.push((k.to_vec(), v.to_vec()));
            seen.len() < 2
        })
        .unwrap();
        assert_eq!(
            seen,
            vec![
                (b"b".to_vec(), b"B".to_vec()),
                (b"c".to_vec(), b"C".to_vec())
            ]
        );

        let mut all = 0;
        vb.visit_items(b"", |_| {
            all += 1;
            true
        })
        .unwrap();
        assert_eq!(all, 4);
        assert_eq!(vb.item_count(), 4);
    }

    #[test]
    fn cas_counter_resumes_after_stored_items() {
        let collection = MemoryCollection::new();
        let item = Item {
            key: b"old".to_vec(),
            cas: 41,
            flags: 0,
            expiration: 0,
            data: b"x".to_vec(),
        };
        collection
            .set(b"old", &item.encode_value().unwrap())
            .unwrap();

        let vb = VBucket::new(
            VbId::new(1),
            VBState::Active,
            "vb0001-g0",
            Box::new(collection),
            Arc::new(Broadcaster::new()),
            Arc::new(BucketStats::new()),
        )
        .unwrap();
        let resp = vb.mutate(&MutationRequest::set("new", "y")).unwrap();
        assert_eq!(resp.cas, 42);
    }

    #[test]
    fn corrupt_item_surfaces_as_error() {
        let collection = MemoryCollection::new();
        collection.set(b"bad", b"\xff").unwrap();
        let result = VBucket::new(
            VbId::new(1),
            VBState::Active,
            "vb0001-g0",
            Box::new(collection),
            Arc::new(Broadcaster::new()),
            Arc::new(BucketStats::new()),
        );
        assert!(result.is_err());
    }

    #[test]
    fn transition_knows_its_instance() {
        let (a, _rx) = vbucket_in(VBState::Dead);
        let (b, _rx) = vbucket_in(VBState::Dead);
        let transition = a.begin_transition(VBState::Active);
        assert!(transition.is_for(&a));
        assert!(!transition.is_for(&b));
    }

    /// How a generated write picks its CAS.
    #[derive(Debug, Clone, Copy)]
    enum CasChoice {
        Unconditional,
        Current,
        Stale,
    }

    fn op_strategy() -> impl Strategy<Value = MutationOp> {
        prop_oneof![
            Just(MutationOp::Set),
            Just(MutationOp::Add),
            Just(MutationOp::Replace),
            Just(MutationOp::Delete),
            Just(MutationOp::Append),
            Just(MutationOp::Prepend),
        ]
    }

    fn cas_strategy() -> impl Strategy<Value = CasChoice> {
        prop_oneof![
            2 => Just(CasChoice::Unconditional),
            2 => Just(CasChoice::Current),
            1 => Just(CasChoice::Stale),
        ]
    }

    proptest! {
        #[test]
        fn writes_follow_cas_contract(
            ops in prop::collection::vec((op_strategy(), 0u8..3, cas_strategy(), any::<u8>()), 1..64)
        ) {
            let (vb, rx) = vbucket_in(VBState::Active);
            let mut model: HashMap<Vec<u8>, (u64, Vec<u8>)> = HashMap::new();
            let mut last_cas = 0;
            let mut applied = 0;

            for (op, key, cas, byte) in ops {
                let key = vec![b'a' + key];
                let stored = model.get(&key).cloned();
                let req_cas = match (cas, &stored) {
                    (CasChoice::Unconditional, _) => 0,
                    (CasChoice::Current, Some((current, _))) => *current,
                    (CasChoice::Current, None) => 7,
                    (CasChoice::Stale, _) => u64::MAX,
                };

                let expected = match (&stored, req_cas) {
                    (None, c) if c != 0 => Status::NotFound,
                    (Some((current, _)), c) if c != 0 && c != *current => Status::Conflict,
                    (Some(_), _) if op == MutationOp::Add => Status::Conflict,
                    (None, _) if op != MutationOp::Set && op != MutationOp::Add => Status::NotFound,
                    _ => Status::Success,
                };

                let req = MutationRequest::new(op, key.clone(), vec![byte]).with_cas(req_cas);
                let resp = vb.mutate(&req).unwrap();
                prop_assert_eq!(resp.status, expected);
                if expected != Status::Success {
                    continue;
                }

                prop_assert!(resp.cas > last_cas);
                last_cas = resp.cas;
                applied += 1;
                let old = stored.map(|(_, data)| data).unwrap_or_default();
                match op {
                    MutationOp::Delete => {
                        model.remove(&key);
                    }
                    MutationOp::Append => {
                        model.insert(key, (resp.cas, [old, vec![byte]].concat()));
                    }
                    MutationOp::Prepend => {
                        model.insert(key, (resp.cas, [vec![byte], old].concat()));
                    }
                    _ => {
                        model.insert(key, (resp.cas, vec![byte]));
                    }
                }
            }

            prop_assert_eq!(vb.item_count(), model.len());
            for (key, (cas, data)) in &model {
                let read = vb.get(key).unwrap();
                prop_assert_eq!(read.cas, *cas);
                prop_assert_eq!(read.value.as_ref(), Some(data));
            }
            prop_assert_eq!(mutations(&rx).len(), applied);
        }
    }
}
