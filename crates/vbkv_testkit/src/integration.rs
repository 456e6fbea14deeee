//! Cross-crate integration test helpers.
//!
//! Provides utilities for checking a bucket against a simple model of the
//! document contract.

use crate::fixtures::TestBucket;
use std::collections::{BTreeMap, HashMap};
use vbkv_core::{MutationOp, MutationRequest, OpResponse, Status, VbId};
use vbkv_storage::{Collection, StorageBackend};

/// What the model expects to be stored under a key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModelDoc {
    /// CAS returned by the write that produced this document.
    pub cas: u64,
    /// Client flags.
    pub flags: u32,
    /// Document body.
    pub data: Vec<u8>,
}

/// A test harness that mirrors every write into a model and checks the
/// bucket agrees with it.
pub struct IntegrationHarness {
    /// The bucket under test.
    pub bucket: TestBucket,
    /// Documents by partition and key.
    docs: HashMap<VbId, BTreeMap<Vec<u8>, ModelDoc>>,
    /// Highest CAS seen per partition.
    last_cas: HashMap<VbId, u64>,
}

impl IntegrationHarness {
    /// Creates a harness over an in-memory bucket with `vbuckets` Active
    /// partitions.
    pub fn new(vbuckets: u16) -> Self {
        Self::with_bucket(TestBucket::memory(), vbuckets)
    }

    /// Creates a harness over `bucket`, activating its first `vbuckets`
    /// partitions.
    pub fn with_bucket(bucket: TestBucket, vbuckets: u16) -> Self {
        for vbid in 0..vbuckets {
            bucket.activate(vbid);
        }
        Self {
            bucket,
            docs: HashMap::new(),
            last_cas: HashMap::new(),
        }
    }

    /// Applies `req` to the bucket and the model, asserting both agree on
    /// the outcome.
    pub fn mutate(&mut self, vbid: VbId, req: &MutationRequest) -> OpResponse {
        let docs = self.docs.entry(vbid).or_default();
        let expected = expected_status(req, docs.get(&req.key));

        let resp = self
            .bucket
            .mutate(vbid, req)
            .expect("Failed to apply mutation");
        assert_eq!(
            resp.status, expected,
            "status mismatch for {:?} on {}",
            req.op, vbid
        );
        if !resp.is_success() {
            return resp;
        }

        let last = self.last_cas.entry(vbid).or_insert(0);
        assert!(resp.cas > *last, "CAS did not advance on {vbid}");
        *last = resp.cas;

        match req.op {
            MutationOp::Delete => {
                docs.remove(&req.key);
            }
            MutationOp::Append | MutationOp::Prepend => {
                let doc = docs
                    .get_mut(&req.key)
                    .expect("model lost a document the bucket still has");
                doc.data = if req.op == MutationOp::Append {
                    [doc.data.as_slice(), &req.body].concat()
                } else {
                    [req.body.as_slice(), &doc.data].concat()
                };
                doc.cas = resp.cas;
            }
            _ => {
                docs.insert(
                    req.key.clone(),
                    ModelDoc {
                        cas: resp.cas,
                        flags: req.flags,
                        data: req.body.clone(),
                    },
                );
            }
        }
        resp
    }

    /// Stores `value` unconditionally.
    pub fn set(&mut self, vbid: VbId, key: &[u8], value: &[u8]) -> u64 {
        self.mutate(vbid, &MutationRequest::set(key, value)).cas
    }

    /// Gets a document and verifies it matches the model.
    pub fn get_and_verify(&self, vbid: VbId, key: &[u8]) -> Option<Vec<u8>> {
        let resp = self.bucket.get(vbid, key).expect("Failed to get document");
        let expected = self.docs.get(&vbid).and_then(|docs| docs.get(key));

        match expected {
            Some(doc) => {
                assert_eq!(resp.status, Status::Success, "document missing on {vbid}");
                assert_eq!(resp.cas, doc.cas, "CAS mismatch on {vbid}");
                assert_eq!(resp.flags, doc.flags, "flags mismatch on {vbid}");
                assert_eq!(resp.value.as_ref(), Some(&doc.data), "data mismatch on {vbid}");
            }
            None => assert_eq!(resp.status, Status::NotFound, "unexpected document on {vbid}"),
        }
        resp.value
    }

    /// Verifies every partition holds exactly the modelled documents, in key
    /// order.
    pub fn verify_all(&self) {
        for (vbid, docs) in &self.docs {
            let vb = self
                .bucket
                .get_vbucket(*vbid)
                .expect("modelled vbucket is gone");
            let mut stored = Vec::new();
            vb.visit_items(b"", |item| {
                stored.push((item.key, item.cas, item.data));
                true
            })
            .expect("Failed to visit vbucket");

            let modelled: Vec<_> = docs
                .iter()
                .map(|(key, doc)| (key.clone(), doc.cas, doc.data.clone()))
                .collect();
            assert_eq!(stored, modelled, "contents mismatch on {vbid}");
        }
    }

    /// Returns the count of tracked documents.
    pub fn tracked_count(&self) -> usize {
        self.docs.values().map(BTreeMap::len).sum()
    }
}

fn expected_status(req: &MutationRequest, existing: Option<&ModelDoc>) -> Status {
    match existing {
        None if req.cas != 0 => Status::NotFound,
        Some(doc) if req.cas != 0 && doc.cas != req.cas => Status::Conflict,
        Some(_) if req.op == MutationOp::Add => Status::Conflict,
        None if req.op != MutationOp::Set && req.op != MutationOp::Add => Status::NotFound,
        _ => Status::Success,
    }
}

/// Storage integration checks.
pub mod storage {
    use super::*;

    /// Tests that the storage backend properly persists data.
    pub fn test_storage_persistence(backend: &mut dyn StorageBackend, data: &[u8]) {
        let offset = backend.append(data).expect("Failed to append");
        backend.sync().expect("Failed to sync");

        let retrieved = backend.read_at(offset, data.len()).expect("Failed to read");
        assert_eq!(data, &retrieved[..], "Retrieved data should match");
    }

    /// Tests that a collection visits keys in order from a start key and
    /// honours early stop.
    pub fn test_collection_ordering(collection: &dyn Collection) {
        for key in [b"c", b"a", b"d", b"b"] {
            collection.set(key, key).expect("Failed to set");
        }

        let mut seen = Vec::new();
        collection
            .visit_ascend(b"b", &mut |key, _| {
                seen.push(key.to_vec());
                seen.len() < 2
            })
            .expect("Failed to visit");
        assert_eq!(seen, vec![b"b".to_vec(), b"c".to_vec()]);
    }
}
