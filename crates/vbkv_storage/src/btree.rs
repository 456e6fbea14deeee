//! Volatile ordered collection.

use crate::collection::{Collection, CollectionFactory, Visitor};
use crate::error::StorageResult;
use parking_lot::RwLock;
use std::collections::BTreeMap;
use std::ops::Bound;

/// A `BTreeMap` backed collection that lives only in memory.
///
/// # Example
///
/// ```rust
/// use vbkv_storage::{Collection, MemoryCollection};
///
/// let coll = MemoryCollection::new();
/// coll.set(b"a", b"1").unwrap();
/// assert_eq!(coll.get(b"a").unwrap(), Some(b"1".to_vec()));
/// ```
#[derive(Debug, Default)]
pub struct MemoryCollection {
    items: RwLock<BTreeMap<Vec<u8>, Vec<u8>>>,
}

impl MemoryCollection {
    /// Creates an empty collection.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

impl Collection for MemoryCollection {
    fn get(&self, key: &[u8]) -> StorageResult<Option<Vec<u8>>> {
        Ok(self.items.read().get(key).cloned())
    }

    fn set(&self, key: &[u8], value: &[u8]) -> StorageResult<()> {
        self.items.write().insert(key.to_vec(), value.to_vec());
        Ok(())
    }

    fn delete(&self, key: &[u8]) -> StorageResult<bool> {
        Ok(self.items.write().remove(key).is_some())
    }

    fn visit_ascend(&self, start: &[u8], visitor: &mut Visitor<'_>) -> StorageResult<()> {
        visit_range(&self.items.read(), start, visitor);
        Ok(())
    }

    fn len(&self) -> usize {
        self.items.read().len()
    }
}

pub(crate) fn visit_range(
    items: &BTreeMap<Vec<u8>, Vec<u8>>,
    start: &[u8],
    visitor: &mut Visitor<'_>,
) {
    let range = items.range::<[u8], _>((Bound::Included(start), Bound::Unbounded));
    for (key, value) in range {
        if !visitor(key, value) {
            break;
        }
    }
}

/// Factory producing a fresh [`MemoryCollection`] for every partition.
#[derive(Debug, Default, Clone, Copy)]
pub struct MemoryCollectionFactory;

impl CollectionFactory for MemoryCollectionFactory {
    fn open(&self, _name: &str) -> StorageResult<Box<dyn Collection>> {
        Ok(Box::new(MemoryCollection::new()))
    }
}
