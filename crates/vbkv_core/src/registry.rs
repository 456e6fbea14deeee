//! Named bucket registry.

use crate::bucket::Bucket;
use crate::config::BucketConfig;
use crate::error::CoreResult;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::info;

/// Holder of named buckets.
///
/// The registry's lock covers only the name map. Bucket and partition
/// operations never take it.
///
/// # Example
///
/// ```rust
/// use vbkv_core::{BucketConfig, Buckets};
///
/// let buckets = Buckets::new(BucketConfig::default());
/// let b1 = buckets.create("b1").unwrap().unwrap();
/// assert!(buckets.create("b1").unwrap().is_none());
///
/// buckets.destroy("b1");
/// assert!(!b1.available());
/// assert!(buckets.get("b1").is_none());
/// ```
pub struct Buckets {
    config: BucketConfig,
    buckets: Mutex<HashMap<String, Arc<Bucket>>>,
}

impl Buckets {
    /// Creates an empty registry whose buckets use `config`.
    #[must_use]
    pub fn new(config: BucketConfig) -> Self {
        Self {
            config,
            buckets: Mutex::new(HashMap::new()),
        }
    }

    /// Returns the configuration used by [`Buckets::create`].
    #[must_use]
    pub fn config(&self) -> &BucketConfig {
        &self.config
    }

    /// Creates and registers bucket `name`.
    ///
    /// Returns `Ok(None)` if the name is taken.
    ///
    /// # Errors
    ///
    /// Returns an error if the bucket cannot be constructed.
    pub fn create(&self, name: &str) -> CoreResult<Option<Arc<Bucket>>> {
        self.create_with_config(name, &self.config)
    }

    /// Like [`Buckets::create`] with an explicit configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if `config` is invalid or the bucket's storage cannot
    /// be opened.
    pub fn create_with_config(
        &self,
        name: &str,
        config: &BucketConfig,
    ) -> CoreResult<Option<Arc<Bucket>>> {
        let mut buckets = self.buckets.lock();
        if buckets.contains_key(name) {
            return Ok(None);
        }

        let bucket = Bucket::new(name, config)?;
        buckets.insert(name.to_string(), Arc::clone(&bucket));
        info!(bucket = name, "bucket created");
        Ok(Some(bucket))
    }

    /// Returns bucket `name`, if registered.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<Arc<Bucket>> {
        self.buckets.lock().get(name).cloned()
    }

    /// Closes and unregisters bucket `name`, deleting its stored data.
    ///
    /// Returns false if no such bucket was registered; destroying an unknown
    /// name, or the same name twice, is harmless. Storage is removed before
    /// the name can be created again.
    pub fn destroy(&self, name: &str) -> bool {
        let mut buckets = self.buckets.lock();
        let Some(bucket) = buckets.remove(name) else {
            return false;
        };
        bucket.close();
        bucket.remove_storage();
        info!(bucket = name, "bucket destroyed");
        true
    }

    /// Returns the registered names in sorted order.
    #[must_use]
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<_> = self.buckets.lock().keys().cloned().collect();
        names.sort_unstable();
        names
    }

    /// Returns the number of registered buckets.
    #[must_use]
    pub fn len(&self) -> usize {
        self.buckets.lock().len()
    }

    /// Returns true if no bucket is registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.buckets.lock().is_empty()
    }

    /// Closes and unregisters every bucket.
    ///
    /// Stored data is kept: a registry over the same directory storage
    /// reopens it.
    pub fn shutdown(&self) {
        let drained: Vec<_> = self.buckets.lock().drain().collect();
        for (name, bucket) in drained {
            bucket.close();
            info!(bucket = %name, "bucket shut down");
        }
    }
}

impl Default for Buckets {
    fn default() -> Self {
        Self::new(BucketConfig::default())
    }
}

impl std::fmt::Debug for Buckets {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Buckets")
            .field("names", &self.names())
            .finish_non_exhaustive()
    }
}
