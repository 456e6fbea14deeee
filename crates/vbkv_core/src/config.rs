//! Bucket configuration.

use crate::error::{CoreError, CoreResult};
use crate::types::MAX_VBUCKETS;
use std::path::PathBuf;
use std::sync::Arc;
use vbkv_storage::{CollectionFactory, LogFileFactory, MemoryCollectionFactory};

/// Where partitions keep their documents.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum StorageConfig {
    /// Volatile in-memory collections.
    #[default]
    Memory,
    /// One append-log file per partition instance under `path`.
    ///
    /// A bucket opened over an existing subdirectory picks up the partitions
    /// and design documents stored there.
    Directory {
        /// Root directory; each bucket gets a subdirectory named after it.
        path: PathBuf,
        /// Whether to sync the log after every write.
        sync_on_write: bool,
    },
}

/// Configuration for creating a bucket.
#[derive(Debug, Clone)]
pub struct BucketConfig {
    /// Number of partition slots (at most [`MAX_VBUCKETS`]).
    pub max_vbuckets: usize,

    /// Storage for partition documents.
    pub storage: StorageConfig,
}

impl Default for BucketConfig {
    fn default() -> Self {
        Self {
            max_vbuckets: MAX_VBUCKETS,
            storage: StorageConfig::Memory,
        }
    }
}

impl BucketConfig {
    /// Creates a new configuration with default values.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the number of partition slots.
    #[must_use]
    pub const fn max_vbuckets(mut self, count: usize) -> Self {
        self.max_vbuckets = count;
        self
    }

    /// Keeps partition documents in memory.
    #[must_use]
    pub fn memory(mut self) -> Self {
        self.storage = StorageConfig::Memory;
        self
    }

    /// Keeps partition documents in log files under `path`.
    #[must_use]
    pub fn directory(mut self, path: impl Into<PathBuf>, sync_on_write: bool) -> Self {
        self.storage = StorageConfig::Directory {
            path: path.into(),
            sync_on_write,
        };
        self
    }

    /// Checks that the configuration is usable.
    ///
    /// # Errors
    ///
    /// Returns `InvalidConfig` if `max_vbuckets` is zero or above
    /// [`MAX_VBUCKETS`].
    pub fn validate(&self) -> CoreResult<()> {
        if self.max_vbuckets == 0 || self.max_vbuckets > MAX_VBUCKETS {
            return Err(CoreError::invalid_config(format!(
                "max_vbuckets must be in 1..={MAX_VBUCKETS}, got {}",
                self.max_vbuckets
            )));
        }
        Ok(())
    }

    /// Builds the collection factory for bucket `name`.
    ///
    /// Directory storage uses the name as a path component, so it must be
    /// non-empty ASCII letters, digits, `-`, `_` or `.`, and must not start
    /// with `.`.
    pub(crate) fn collection_factory(&self, name: &str) -> CoreResult<Arc<dyn CollectionFactory>> {
        match &self.storage {
            StorageConfig::Memory => Ok(Arc::new(MemoryCollectionFactory)),
            StorageConfig::Directory {
                path,
                sync_on_write,
            } => {
                if !is_directory_name(name) {
                    return Err(CoreError::invalid_config(format!(
                        "bucket name {name:?} cannot be used as a directory"
                    )));
                }
                Ok(Arc::new(LogFileFactory::new(path.join(name), *sync_on_write)))
            }
        }
    }
}

fn is_directory_name(name: &str) -> bool {
    !name.is_empty()
        && !name.starts_with('.')
        && name
            .bytes()
            .all(|b| b.is_ascii_alphanumeric() || matches!(b, b'-' | b'_' | b'.'))
}
