//! # vbkv Bench
//!
//! Shared helpers for the vbkv criterion benchmarks.

#![deny(unsafe_code)]
#![warn(missing_docs)]

pub mod utils;
