//! Fuzz testing harnesses for vbkv.
//!
//! This module provides fuzz targets that can be used with cargo-fuzz
//! or other fuzzing frameworks. Every target must return normally for any
//! input.

use vbkv_core::{Bucket, BucketConfig, DDoc, Item, MutationOp, MutationRequest, VBState, VbId};
use vbkv_storage::{Collection, InMemoryBackend, LogCollection};

/// Slots used by [`fuzz_bucket_operations`].
const FUZZ_VBUCKETS: usize = 4;

/// Fuzz target for stored item decoding.
///
/// Arbitrary bytes either decode to an item or return an error.
pub fn fuzz_item_decode(data: &[u8]) {
    if let Ok(item) = Item::decode(b"fuzz", data) {
        let encoded = item.encode_value().expect("decoded item must re-encode");
        let again = Item::decode(b"fuzz", &encoded).expect("re-encoded item must decode");
        assert_eq!(item, again, "Roundtrip mismatch");
    }
}

/// Fuzz target for design document parsing.
pub fn fuzz_ddoc_parse(data: &[u8]) {
    let _ = DDoc::parse("_design/fuzz", data);
}

/// Fuzz target for log replay.
///
/// Arbitrary bytes as a log either replay (keeping the valid prefix) or
/// return an error; a replayed collection stays usable.
pub fn fuzz_log_replay(data: &[u8]) {
    let backend = InMemoryBackend::with_data(data.to_vec());
    if let Ok(collection) = LogCollection::open(backend, false) {
        let _ = collection.set(b"after-replay", b"ok");
        let value = collection.get(b"after-replay").expect("get after replay");
        assert_eq!(value.as_deref(), Some(&b"ok"[..]));
    }
}

/// Fuzz target for bucket operations.
///
/// Tests that arbitrary operation sequences don't cause panics and that the
/// bucket stays consistent with itself.
pub fn fuzz_bucket_operations(data: &[u8]) {
    let config = BucketConfig::new().max_vbuckets(FUZZ_VBUCKETS);
    let Ok(bucket) = Bucket::new("fuzz", &config) else {
        return;
    };

    for op in ops::parse_sequence(data) {
        ops::execute(&op, &bucket);
    }

    for vbid in 0..FUZZ_VBUCKETS as u16 {
        let vbid = VbId::new(vbid);
        let state = bucket.get_vb_state(vbid);
        assert_eq!(
            state,
            bucket.get_vbucket(vbid).map_or(VBState::Dead, |vb| vb.state())
        );
    }
}

/// Structured operations decoded from fuzz input.
pub mod ops {
    use super::*;

    /// A single fuzz operation.
    #[derive(Debug, Clone)]
    pub enum FuzzOp {
        /// Create a partition
        Create(VbId),
        /// Destroy a partition
        Destroy(VbId),
        /// Change a partition's state
        SetState(VbId, VBState),
        /// Write a document
        Mutate(VbId, MutationRequest),
        /// Read a document
        Get(VbId, Vec<u8>),
    }

    /// Decodes operations from raw bytes, three header bytes each.
    ///
    /// Byte 0 picks the operation, byte 1 the partition (modulo a few more
    /// than exist, to reach out-of-range ids), byte 2 the key or state.
    pub fn parse_sequence(data: &[u8]) -> Vec<FuzzOp> {
        let mut ops = Vec::new();
        let mut chunks = data.chunks_exact(3);
        for chunk in &mut chunks {
            let (op, vb, arg) = (chunk[0], chunk[1], chunk[2]);
            let vbid = VbId::new(u16::from(vb) % (FUZZ_VBUCKETS as u16 + 2));
            let key = vec![b'a' + arg % 4];
            let parsed = match op % 9 {
                0 => FuzzOp::Create(vbid),
                1 => FuzzOp::Destroy(vbid),
                2 => FuzzOp::SetState(
                    vbid,
                    VBState::from_byte(arg % 4).unwrap_or(VBState::Active),
                ),
                3 => FuzzOp::Get(vbid, key),
                4 => FuzzOp::Mutate(vbid, MutationRequest::set(key, [arg])),
                5 => FuzzOp::Mutate(vbid, MutationRequest::new(MutationOp::Add, key, [arg])),
                6 => FuzzOp::Mutate(vbid, MutationRequest::delete(key)),
                7 => FuzzOp::Mutate(vbid, MutationRequest::append(key, [arg])),
                _ => FuzzOp::Mutate(vbid, MutationRequest::set(key, [arg]).with_cas(u64::from(arg))),
            };
            ops.push(parsed);
        }
        ops
    }

    /// Executes one operation, ignoring outcomes.
    pub fn execute(op: &FuzzOp, bucket: &Bucket) {
        match op {
            FuzzOp::Create(vbid) => {
                let _ = bucket.create_vbucket(*vbid);
            }
            FuzzOp::Destroy(vbid) => {
                bucket.destroy_vbucket(*vbid);
            }
            FuzzOp::SetState(vbid, state) => {
                bucket.set_vb_state(*vbid, *state);
            }
            FuzzOp::Mutate(vbid, req) => {
                let _ = bucket.mutate(*vbid, req);
            }
            FuzzOp::Get(vbid, key) => {
                let _ = bucket.get(*vbid, key);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn item_decode_on_garbage() {
        fuzz_item_decode(&[]);
        fuzz_item_decode(&[0xff; 16]);
        fuzz_item_decode(&[0x84, 0x01, 0x02, 0x03, 0x40]);
    }

    #[test]
    fn ddoc_parse_on_garbage() {
        fuzz_ddoc_parse(b"");
        fuzz_ddoc_parse(b"{\"views\":");
        fuzz_ddoc_parse(b"{}");
    }

    #[test]
    fn log_replay_on_garbage() {
        fuzz_log_replay(&[]);
        fuzz_log_replay(&[1, 0, 0, 0]);
        fuzz_log_replay(&[0xAA; 64]);
    }

    #[test]
    fn bucket_operations_on_sequences() {
        fuzz_bucket_operations(&[]);
        fuzz_bucket_operations(&[0, 0, 0, 2, 0, 1, 4, 0, 0, 3, 0, 0, 1, 0, 0]);

        let data: Vec<u8> = (0..=255u8).cycle().take(3 * 500).collect();
        fuzz_bucket_operations(&data);
    }
}
