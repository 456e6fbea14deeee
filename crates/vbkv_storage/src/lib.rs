//! # vbkv Storage
//!
//! Ordered collection abstraction and storage backends for vbkv partitions.
//!
//! Every partition owns one [`Collection`]: an ordered key to value map with
//! point get/set/delete and ascending visitation that can stop early. The
//! partition layer never looks inside the stored values' layout beyond its
//! own item encoding.
//!
//! ## Available Collections
//!
//! - [`MemoryCollection`] - volatile, for caches and tests
//! - [`LogCollection`] - in-memory index over a checksummed append log
//!
//! Log collections write through a [`StorageBackend`] byte store:
//!
//! - [`InMemoryBackend`] - For testing
//! - [`FileBackend`] - For on-disk partitions
//!
//! ## Example
//!
//! ```rust
//! use vbkv_storage::{Collection, CollectionFactory, MemoryCollectionFactory};
//!
//! let coll = MemoryCollectionFactory.open("vb0000").unwrap();
//! coll.set(b"b", b"2").unwrap();
//! coll.set(b"a", b"1").unwrap();
//!
//! let mut keys = Vec::new();
//! coll.visit_ascend(b"", &mut |k, _| {
//!     keys.push(k.to_vec());
//!     true
//! })
//! .unwrap();
//! assert_eq!(keys, vec![b"a".to_vec(), b"b".to_vec()]);
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod backend;
mod btree;
mod collection;
mod error;
mod file;
mod log;
mod memory;

pub use backend::StorageBackend;
pub use btree::{MemoryCollection, MemoryCollectionFactory};
pub use collection::{Collection, CollectionFactory, Visitor};
pub use error::{StorageError, StorageResult};
pub use file::FileBackend;
pub use log::{LogCollection, LogFileFactory, MAX_FIELD_LEN};
pub use memory::InMemoryBackend;
