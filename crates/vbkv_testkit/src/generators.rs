//! Property-based test generators using proptest.
//!
//! Provides strategies for generating random test data
//! that maintains required invariants.

use proptest::prelude::*;
use vbkv_core::{MutationOp, MutationRequest, VBState, VbId};

/// Strategy for generating partition states.
pub fn vb_state_strategy() -> impl Strategy<Value = VBState> {
    prop::sample::select(VBState::ALL.to_vec())
}

/// Strategy for generating partition ids below `max`.
pub fn vbid_strategy(max: u16) -> impl Strategy<Value = VbId> {
    (0..max).prop_map(VbId::new)
}

/// Strategy for generating document keys from a small alphabet.
///
/// Keys collide often, which exercises the CAS and existence checks.
pub fn key_strategy() -> impl Strategy<Value = Vec<u8>> {
    prop::string::string_regex("[a-e]{1,3}")
        .expect("Invalid regex")
        .prop_map(String::into_bytes)
}

/// Strategy for generating document bodies (arbitrary bytes).
pub fn value_strategy() -> impl Strategy<Value = Vec<u8>> {
    prop::collection::vec(any::<u8>(), 0..256)
}

/// Strategy for generating design document bodies that parse.
pub fn ddoc_body_strategy() -> impl Strategy<Value = Vec<u8>> {
    prop::collection::btree_map(
        prop::string::string_regex("[a-z]{1,8}").expect("Invalid regex"),
        (
            prop::string::string_regex("[ -~]{0,32}").expect("Invalid regex"),
            prop::option::of(Just("_count".to_string())),
        ),
        0..4,
    )
    .prop_map(|views| {
        let views: serde_json::Map<String, serde_json::Value> = views
            .into_iter()
            .map(|(name, (map, reduce))| {
                let mut view = serde_json::json!({ "map": map });
                if let Some(reduce) = reduce {
                    view["reduce"] = serde_json::Value::String(reduce);
                }
                (name, view)
            })
            .collect();
        serde_json::to_vec(&serde_json::json!({ "views": views }))
            .expect("JSON serialization cannot fail for plain values")
    })
}

/// Strategy for generating write kinds.
pub fn mutation_op_strategy() -> impl Strategy<Value = MutationOp> {
    prop_oneof![
        4 => Just(MutationOp::Set),
        1 => Just(MutationOp::Add),
        1 => Just(MutationOp::Replace),
        2 => Just(MutationOp::Delete),
        1 => Just(MutationOp::Append),
        1 => Just(MutationOp::Prepend),
    ]
}

/// Strategy for generating unconditional writes.
pub fn mutation_request_strategy() -> impl Strategy<Value = MutationRequest> {
    (
        mutation_op_strategy(),
        key_strategy(),
        value_strategy(),
        any::<u32>(),
    )
        .prop_map(|(op, key, body, flags)| {
            MutationRequest::new(op, key, body).with_flags(flags)
        })
}

/// A single document operation.
#[derive(Debug, Clone)]
pub enum DocOperation {
    /// Apply a write
    Mutate(MutationRequest),
    /// Read a key
    Get {
        /// Document key
        key: Vec<u8>,
    },
}

/// Strategy for generating document operations.
pub fn doc_operation_strategy() -> impl Strategy<Value = DocOperation> {
    prop_oneof![
        3 => mutation_request_strategy().prop_map(DocOperation::Mutate),
        1 => key_strategy().prop_map(|key| DocOperation::Get { key }),
    ]
}

/// Strategy for generating a sequence of operations.
pub fn operation_sequence_strategy(
    min_ops: usize,
    max_ops: usize,
) -> impl Strategy<Value = Vec<DocOperation>> {
    prop::collection::vec(doc_operation_strategy(), min_ops..max_ops)
}

/// A partition lifecycle step.
#[derive(Debug, Clone, Copy)]
pub enum LifecycleOperation {
    /// Create the partition
    Create(VbId),
    /// Destroy the partition
    Destroy(VbId),
    /// Change the partition state
    SetState(VbId, VBState),
}

/// Strategy for generating lifecycle steps over partitions below `max`.
pub fn lifecycle_sequence_strategy(
    max: u16,
    max_ops: usize,
) -> impl Strategy<Value = Vec<LifecycleOperation>> {
    let step = prop_oneof![
        2 => vbid_strategy(max).prop_map(LifecycleOperation::Create),
        1 => vbid_strategy(max).prop_map(LifecycleOperation::Destroy),
        3 => (vbid_strategy(max), vb_state_strategy())
            .prop_map(|(vbid, state)| LifecycleOperation::SetState(vbid, state)),
    ];
    prop::collection::vec(step, 1..max_ops)
}

/// Configuration for property tests.
#[derive(Debug, Clone)]
pub struct PropTestConfig {
    /// Number of test cases to run.
    pub cases: u32,
    /// Maximum shrink iterations.
    pub max_shrink_iters: u32,
}

impl Default for PropTestConfig {
    fn default() -> Self {
        Self {
            cases: 256,
            max_shrink_iters: 1000,
        }
    }
}

impl PropTestConfig {
    /// Creates a configuration for quick tests.
    #[must_use]
    pub fn quick() -> Self {
        Self {
            cases: 32,
            max_shrink_iters: 100,
        }
    }

    /// Creates a configuration for thorough tests.
    #[must_use]
    pub fn thorough() -> Self {
        Self {
            cases: 1024,
            max_shrink_iters: 10000,
        }
    }

    /// Converts to proptest config.
    #[must_use]
    pub fn to_proptest_config(&self) -> ProptestConfig {
        ProptestConfig {
            cases: self.cases,
            max_shrink_iters: self.max_shrink_iters,
            ..ProptestConfig::default()
        }
    }
}
