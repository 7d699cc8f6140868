//! Newtype wrappers for domain identifiers.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Custom Snowflake epoch: 2024-01-01T00:00:00Z in epoch milliseconds.
pub const SNOWFLAKE_EPOCH_MS: i64 = 1_704_067_200_000;

/// Bits reserved for the node id.
pub const NODE_BITS: u32 = 10;

/// Bits reserved for the per-millisecond sequence.
pub const SEQUENCE_BITS: u32 = 12;

pub const MAX_NODE_ID: u16 = (1 << NODE_BITS) - 1;
pub const MAX_SEQUENCE: u16 = (1 << SEQUENCE_BITS) - 1;

/// Identifies a delay message across every shard.
///
/// Layout (most significant first): 41 bits of milliseconds since
/// [`SNOWFLAKE_EPOCH_MS`], 10 bits of node id, 12 bits of sequence.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct MessageId(pub i64);

impl MessageId {
    /// Compose an id from its parts. Timestamps before the epoch clamp to zero.
    pub fn compose(timestamp_ms: i64, node: u16, sequence: u16) -> Self {
        let elapsed = (timestamp_ms - SNOWFLAKE_EPOCH_MS).max(0);
        let node = i64::from(node & MAX_NODE_ID);
        let sequence = i64::from(sequence & MAX_SEQUENCE);
        Self((elapsed << (NODE_BITS + SEQUENCE_BITS)) | (node << SEQUENCE_BITS) | sequence)
    }

    /// Epoch milliseconds encoded in the id.
    pub fn timestamp_ms(&self) -> i64 {
        (self.0 >> (NODE_BITS + SEQUENCE_BITS)) + SNOWFLAKE_EPOCH_MS
    }

    pub fn node(&self) -> u16 {
        ((self.0 >> SEQUENCE_BITS) & i64::from(MAX_NODE_ID)) as u16
    }

    pub fn sequence(&self) -> u16 {
        (self.0 & i64::from(MAX_SEQUENCE)) as u16
    }
}

impl fmt::Display for MessageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl FromStr for MessageId {
    type Err = std::num::ParseIntError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self(s.parse()?))
    }
}

impl From<i64> for MessageId {
    fn from(id: i64) -> Self {
        Self(id)
    }
}
