//! Core type definitions for vbkv.

use std::fmt;

/// Upper bound on the number of partition slots in one bucket.
pub const MAX_VBUCKETS: usize = 1024;

/// Identifier for a partition (vbucket) within a bucket.
///
/// Ids in `[0, max_vbuckets)` address partition slots. [`DDOC_VBID`] is
/// reserved for the design-document partition and never names a slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct VbId(pub u16);

impl VbId {
    /// Creates a new partition id.
    #[must_use]
    pub const fn new(id: u16) -> Self {
        Self(id)
    }

    /// Returns the raw id value.
    #[must_use]
    pub const fn as_u16(self) -> u16 {
        self.0
    }

    /// Returns the id as a slot index.
    #[must_use]
    pub const fn index(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Display for VbId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "vb:{}", self.0)
    }
}

impl From<u16> for VbId {
    fn from(id: u16) -> Self {
        Self(id)
    }
}

/// Partition id reserved for design documents.
pub const DDOC_VBID: VbId = VbId(MAX_VBUCKETS as u16);

/// State of a partition.
///
/// `Dead` is both the state of an empty slot and the terminal state of a
/// destroyed partition. The core allows a transition between any pair of
/// states; which transitions make sense is decided by whoever orchestrates
/// the cluster.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[repr(u8)]
pub enum VBState {
    /// No partition, or a destroyed one.
    #[default]
    Dead = 0,
    /// Serving reads and writes.
    Active = 1,
    /// Holding a copy fed by replication.
    Replica = 2,
    /// Receiving data before becoming active.
    Pending = 3,
}

impl VBState {
    /// All states, in discriminant order.
    pub const ALL: [VBState; 4] = [
        VBState::Dead,
        VBState::Active,
        VBState::Replica,
        VBState::Pending,
    ];

    /// Converts a byte to a state.
    #[must_use]
    pub const fn from_byte(b: u8) -> Option<Self> {
        match b {
            0 => Some(Self::Dead),
            1 => Some(Self::Active),
            2 => Some(Self::Replica),
            3 => Some(Self::Pending),
            _ => None,
        }
    }

    /// Converts the state to a byte.
    #[must_use]
    pub const fn as_byte(self) -> u8 {
        self as u8
    }

    /// Returns the lowercase name of the state.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Dead => "dead",
            Self::Active => "active",
            Self::Replica => "replica",
            Self::Pending => "pending",
        }
    }
}

impl fmt::Display for VBState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
