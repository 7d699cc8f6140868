//! The delay message and its one-way status.

use bytes::Bytes;
use serde::{Deserialize, Serialize};

use crate::id::MessageId;

/// Forwarding status. The only legal transition is `Waiting -> Completed`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(i16)]
pub enum DelayStatus {
    Waiting = 0,
    Completed = 1,
}

impl DelayStatus {
    pub fn as_i16(self) -> i16 {
        self as i16
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown delay status {0}")]
pub struct UnknownStatus(pub i16);

impl TryFrom<i16> for DelayStatus {
    type Error = UnknownStatus;

    fn try_from(value: i16) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(Self::Waiting),
            1 => Ok(Self::Completed),
            other => Err(UnknownStatus(other)),
        }
    }
}

/// A payload waiting to be forwarded to `topic` no earlier than `deadline`.
///
/// All timestamps are epoch milliseconds.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DelayMessage {
    pub id: MessageId,
    pub topic: String,
    pub value: Bytes,
    pub dedup_key: Option<String>,
    pub deadline: i64,
    pub status: DelayStatus,
    pub created_at: i64,
    pub updated_at: i64,
}

impl DelayMessage {
    /// Eligible for forwarding: still waiting and the deadline has passed.
    pub fn is_due(&self, now_ms: i64) -> bool {
        self.status == DelayStatus::Waiting && self.deadline <= now_ms
    }
}
