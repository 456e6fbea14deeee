//! # vbkv Testkit
//!
//! Test utilities for vbkv.
//!
//! This crate provides:
//! - Test fixtures and bucket helpers
//! - Property-based test generators using proptest
//! - A model-checking integration harness
//! - Fuzz testing harnesses
//! - Stress testing utilities
//!
//! ## Usage
//!
//! ```rust
//! use vbkv_testkit::prelude::*;
//! use vbkv_core::{MutationRequest, VbId};
//!
//! let bucket = scenarios::active_bucket(1);
//! let resp = bucket.mutate(VbId::new(0), &MutationRequest::set("k", "v")).unwrap();
//! assert!(resp.is_success());
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

pub mod fixtures;
pub mod fuzz;
pub mod generators;
pub mod integration;
pub mod stress;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::fixtures::*;
    pub use crate::fuzz::*;
    pub use crate::generators::*;
    pub use crate::integration::*;
    pub use crate::stress::*;
}

pub use fixtures::*;
pub use fuzz::*;
pub use generators::*;
pub use integration::*;
pub use stress::*;
