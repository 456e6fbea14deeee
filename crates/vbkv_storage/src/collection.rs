//! Ordered key-value collection trait.

use crate::error::StorageResult;

/// Callback used by [`Collection::visit_ascend`].
///
/// Receives each `(key, value)` pair in ascending key order; returning
/// `false` stops the traversal.
pub type Visitor<'a> = dyn FnMut(&[u8], &[u8]) -> bool + 'a;

/// An ordered key to value collection backing one partition.
///
/// Keys are compared as raw bytes. Implementations use interior locking so a
/// collection can be shared behind `&self`; a single collection is owned by
/// exactly one partition instance.
///
/// # Implementors
///
/// - [`super::MemoryCollection`] - volatile, `BTreeMap` based
/// - [`super::LogCollection`] - `BTreeMap` index replayed from an append log
pub trait Collection: Send + Sync {
    /// Returns the value stored under `key`, if any.
    ///
    /// # Errors
    ///
    /// Returns an error if the underlying store fails.
    fn get(&self, key: &[u8]) -> StorageResult<Option<Vec<u8>>>;

    /// Stores `value` under `key`, replacing any previous value.
    ///
    /// # Errors
    ///
    /// Returns an error if the underlying store fails.
    fn set(&self, key: &[u8], value: &[u8]) -> StorageResult<()>;

    /// Removes `key`. Returns whether it was present.
    ///
    /// # Errors
    ///
    /// Returns an error if the underlying store fails.
    fn delete(&self, key: &[u8]) -> StorageResult<bool>;

    /// Visits entries with key `>= start` in ascending order.
    ///
    /// An empty `start` begins at the first key. Traversal stops as soon as
    /// `visitor` returns `false`. The visitor must not write to the same
    /// collection.
    ///
    /// # Errors
    ///
    /// Returns an error if the underlying store fails.
    fn visit_ascend(&self, start: &[u8], visitor: &mut Visitor<'_>) -> StorageResult<()>;

    /// Returns the number of stored keys.
    fn len(&self) -> usize;

    /// Returns true if no keys are stored.
    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Opens fresh collections for new partitions.
///
/// The caller chooses `name`; names are unique per partition instance so no
/// two partitions ever share a collection.
pub trait CollectionFactory: Send + Sync {
    /// Opens the collection called `name`.
    ///
    /// # Errors
    ///
    /// Returns an error if the collection cannot be opened.
    fn open(&self, name: &str) -> StorageResult<Box<dyn Collection>>;

    /// Returns the names of collections that already exist, sorted.
    ///
    /// Volatile factories have nothing to list.
    ///
    /// # Errors
    ///
    /// Returns an error if the underlying store cannot be listed.
    fn existing(&self) -> StorageResult<Vec<String>> {
        Ok(Vec::new())
    }

    /// Deletes collection `name`. Deleting a missing collection is not an
    /// error.
    ///
    /// A collection that is still open keeps working but its contents are
    /// no longer reachable by name.
    ///
    /// # Errors
    ///
    /// Returns an error if the collection exists and cannot be deleted.
    fn remove(&self, _name: &str) -> StorageResult<()> {
        Ok(())
    }

    /// Deletes every collection this factory manages.
    ///
    /// # Errors
    ///
    /// Returns an error if the underlying store cannot be deleted.
    fn remove_all(&self) -> StorageResult<()> {
        Ok(())
    }
}
