//! Error types for vbkv core.

use crate::ops::Status;
use thiserror::Error;

/// Result type for core operations.
pub type CoreResult<T> = Result<T, CoreError>;

/// Errors that can occur in vbkv core operations.
///
/// Missing keys, CAS conflicts and absent partitions are not errors: they
/// come back as a [`Status`] in an [`crate::OpResponse`] or as `None`.
#[derive(Debug, Error)]
pub enum CoreError {
    /// Storage collection error.
    #[error("storage error: {0}")]
    Storage(#[from] vbkv_storage::StorageError),

    /// A stored item could not be encoded or decoded.
    #[error("item codec error: {message}")]
    Codec {
        /// Description of the failure.
        message: String,
    },

    /// A design document body is not valid JSON for a design document.
    #[error("invalid design document {id}: {message}")]
    InvalidDesignDoc {
        /// Design document id.
        id: String,
        /// Parser message.
        message: String,
    },

    /// Writing a design document was refused by its partition.
    #[error("design document {id} not stored: {status}")]
    DesignDocNotStored {
        /// Design document id.
        id: String,
        /// Status returned by the partition.
        status: Status,
    },

    /// Bucket configuration is invalid.
    #[error("invalid configuration: {message}")]
    InvalidConfig {
        /// Description of the problem.
        message: String,
    },
}

impl CoreError {
    /// Creates an item codec error.
    pub fn codec(message: impl Into<String>) -> Self {
        Self::Codec {
            message: message.into(),
        }
    }

    /// Creates an invalid design document error.
    pub fn invalid_design_doc(id: impl Into<String>, message: impl ToString) -> Self {
        Self::InvalidDesignDoc {
            id: id.into(),
            message: message.to_string(),
        }
    }

    /// Creates an invalid configuration error.
    pub fn invalid_config(message: impl Into<String>) -> Self {
        Self::InvalidConfig {
            message: message.into(),
        }
    }
}
