//! Document operation requests and responses.

use crate::item::Item;
use std::fmt;

/// Outcome of a document operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Status {
    /// The operation was applied (or the key was found).
    Success,
    /// The key does not exist.
    NotFound,
    /// The supplied CAS did not match, or `Add` found an existing key.
    Conflict,
    /// The partition is absent or not active.
    NotMyVBucket,
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Success => "success",
            Self::NotFound => "not found",
            Self::Conflict => "conflict",
            Self::NotMyVBucket => "not my vbucket",
        };
        f.write_str(name)
    }
}

/// Kind of write carried by a [`MutationRequest`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MutationOp {
    /// Store unconditionally (subject to CAS).
    Set,
    /// Store only if the key does not exist.
    Add,
    /// Store only if the key exists.
    Replace,
    /// Remove the key.
    Delete,
    /// Concatenate the body after the existing value.
    Append,
    /// Concatenate the body before the existing value.
    Prepend,
}

/// A write against one partition.
///
/// A `cas` of zero means the write is unconditional; any other value makes
/// the write apply only if it equals the document's current CAS.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MutationRequest {
    /// Kind of write.
    pub op: MutationOp,
    /// Document key.
    pub key: Vec<u8>,
    /// New value (ignored for `Delete`).
    pub body: Vec<u8>,
    /// Opaque client flags stored with the document.
    pub flags: u32,
    /// Expiration stored with the document.
    pub expiration: u32,
    /// Expected current CAS, or zero.
    pub cas: u64,
}

impl MutationRequest {
    /// Creates a request with no flags, expiration or CAS.
    pub fn new(op: MutationOp, key: impl Into<Vec<u8>>, body: impl Into<Vec<u8>>) -> Self {
        Self {
            op,
            key: key.into(),
            body: body.into(),
            flags: 0,
            expiration: 0,
            cas: 0,
        }
    }

    /// Creates a `Set` request.
    pub fn set(key: impl Into<Vec<u8>>, body: impl Into<Vec<u8>>) -> Self {
        Self::new(MutationOp::Set, key, body)
    }

    /// Creates an `Add` request.
    pub fn add(key: impl Into<Vec<u8>>, body: impl Into<Vec<u8>>) -> Self {
        Self::new(MutationOp::Add, key, body)
    }

    /// Creates a `Replace` request.
    pub fn replace(key: impl Into<Vec<u8>>, body: impl Into<Vec<u8>>) -> Self {
        Self::new(MutationOp::Replace, key, body)
    }

    /// Creates a `Delete` request.
    pub fn delete(key: impl Into<Vec<u8>>) -> Self {
        Self::new(MutationOp::Delete, key, Vec::new())
    }

    /// Creates an `Append` request.
    pub fn append(key: impl Into<Vec<u8>>, body: impl Into<Vec<u8>>) -> Self {
        Self::new(MutationOp::Append, key, body)
    }

    /// Creates a `Prepend` request.
    pub fn prepend(key: impl Into<Vec<u8>>, body: impl Into<Vec<u8>>) -> Self {
        Self::new(MutationOp::Prepend, key, body)
    }

    /// Makes the write conditional on `cas`.
    #[must_use]
    pub fn with_cas(mut self, cas: u64) -> Self {
        self.cas = cas;
        self
    }

    /// Sets the client flags.
    #[must_use]
    pub fn with_flags(mut self, flags: u32) -> Self {
        self.flags = flags;
        self
    }

    /// Sets the expiration.
    #[must_use]
    pub fn with_expiration(mut self, expiration: u32) -> Self {
        self.expiration = expiration;
        self
    }
}

/// Result of a `get` or `mutate`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OpResponse {
    /// Outcome.
    pub status: Status,
    /// CAS of the document after the operation (zero unless `Success`).
    pub cas: u64,
    /// Client flags of the document read (zero for writes).
    pub flags: u32,
    /// Value read by `get`.
    pub value: Option<Vec<u8>>,
}

impl OpResponse {
    /// A response carrying only a status.
    #[must_use]
    pub const fn status(status: Status) -> Self {
        Self {
            status,
            cas: 0,
            flags: 0,
            value: None,
        }
    }

    /// A successful write that produced `cas`.
    #[must_use]
    pub const fn stored(cas: u64) -> Self {
        Self {
            status: Status::Success,
            cas,
            flags: 0,
            value: None,
        }
    }

    /// A successful read of `item`.
    #[must_use]
    pub fn found(item: Item) -> Self {
        Self {
            status: Status::Success,
            cas: item.cas,
            flags: item.flags,
            value: Some(item.data),
        }
    }

    /// Returns true if the status is `Success`.
    #[must_use]
    pub fn is_success(&self) -> bool {
        self.status == Status::Success
    }
}
