//! Benchmark utilities.

use rand::Rng;
use std::sync::Arc;
use vbkv_core::{Bucket, BucketConfig, MutationRequest, VBState, VbId};

/// Generate random document data of the specified size.
pub fn random_data(size: usize) -> Vec<u8> {
    let mut rng = rand::thread_rng();
    (0..size).map(|_| rng.gen()).collect()
}

/// Generate `count` distinct document keys.
pub fn generate_keys(count: usize) -> Vec<Vec<u8>> {
    (0..count)
        .map(|i| format!("key-{i:08}").into_bytes())
        .collect()
}

/// Generate test documents with specified payload size.
pub fn generate_documents(count: usize, payload_size: usize) -> Vec<(Vec<u8>, Vec<u8>)> {
    generate_keys(count)
        .into_iter()
        .map(|key| (key, random_data(payload_size)))
        .collect()
}

/// Creates an in-memory bucket with `vbuckets` Active partitions.
pub fn active_bucket(vbuckets: u16) -> Arc<Bucket> {
    let bucket = Bucket::new("bench", &BucketConfig::default()).expect("Failed to create bucket");
    for vbid in 0..vbuckets {
        let vbid = VbId::new(vbid);
        bucket
            .create_vbucket(vbid)
            .expect("Failed to open vbucket storage")
            .expect("slot already occupied");
        bucket
            .set_vb_state(vbid, VBState::Active)
            .expect("vbucket replaced during setup");
    }
    bucket
}

/// Stores `documents` in partition 0 of `bucket`.
pub fn populate(bucket: &Bucket, documents: &[(Vec<u8>, Vec<u8>)]) {
    for (key, value) in documents {
        bucket
            .mutate(VbId::new(0), &MutationRequest::set(key.clone(), value.clone()))
            .expect("Failed to store document");
    }
}
