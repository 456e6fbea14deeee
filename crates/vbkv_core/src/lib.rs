//! # vbkv Core
//!
//! Bucket and partition lifecycle engine for vbkv.
//!
//! This crate provides:
//! - A registry of named buckets ([`Buckets`])
//! - Buckets split into lock-free partition slots ([`Bucket`])
//! - A partition state machine with a CAS-protected document contract
//!   ([`VBucket`])
//! - Ordered fan-out of mutations and state changes, with replay of current
//!   state to late subscribers ([`Broadcaster`], [`Bucket::subscribe`])
//! - Design documents stored in a reserved partition
//!
//! ## Example
//!
//! ```rust
//! use std::sync::mpsc;
//! use vbkv_core::{BucketConfig, BucketEvent, Buckets, MutationRequest, VBState, VbId};
//!
//! let buckets = Buckets::new(BucketConfig::default());
//! let bucket = buckets.create("default").unwrap().unwrap();
//!
//! let (tx, rx) = mpsc::channel();
//! bucket.subscribe(tx);
//!
//! let vbid = VbId::new(0);
//! bucket.create_vbucket(vbid).unwrap().unwrap();
//! bucket.set_vb_state(vbid, VBState::Active).unwrap();
//! let resp = bucket.mutate(vbid, &MutationRequest::set("a", "1")).unwrap();
//!
//! let cas = rx.iter().find_map(|event| match event {
//!     BucketEvent::Mutation(m) => Some(m.cas),
//!     BucketEvent::VBucketChange(_) => None,
//! });
//! assert_eq!(cas, Some(resp.cas));
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod broadcast;
mod bucket;
mod config;
mod ddoc;
mod error;
mod event;
mod item;
mod logger;
mod ops;
mod registry;
mod stats;
mod types;
mod vbucket;

pub use broadcast::Broadcaster;
pub use bucket::Bucket;
pub use config::{BucketConfig, StorageConfig};
pub use ddoc::{DDoc, DDocOptions, DDocs, View};
pub use error::{CoreError, CoreResult};
pub use event::{BucketEvent, Mutation, VBucketChange};
pub use item::Item;
pub use logger::{mutation_logger, spawn_mutation_logger, MutationLogSummary};
pub use ops::{MutationOp, MutationRequest, OpResponse, Status};
pub use registry::Buckets;
pub use stats::{BucketStats, BucketStatsSnapshot};
pub use types::{VBState, VbId, DDOC_VBID, MAX_VBUCKETS};
pub use vbucket::{StateTransition, VBucket};

/// Crate version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
