use std::sync::{Mutex, PoisonError};

use chrono::Utc;

use delay_domain::id::{MAX_NODE_ID, MAX_SEQUENCE, MessageId};

use crate::domain::repository::IdGenerator;
use crate::error::DelayError;

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
struct SnowflakeState {
    last_ms: i64,
    sequence: u16,
}

impl SnowflakeState {
    /// Timestamp and sequence for the next id observed at `now_ms`.
    ///
    /// Never moves backwards: a clock step back reuses the last timestamp, and
    /// an exhausted sequence borrows the following millisecond.
    fn advance(&mut self, now_ms: i64) -> (i64, u16) {
        if now_ms > self.last_ms {
            self.last_ms = now_ms;
            self.sequence = 0;
        } else if self.sequence == MAX_SEQUENCE {
            self.last_ms += 1;
            self.sequence = 0;
        } else {
            self.sequence += 1;
        }
        (self.last_ms, self.sequence)
    }
}

/// Per-node Snowflake id source. One node id per running process.
#[derive(Debug)]
pub struct SnowflakeGenerator {
    node: u16,
    state: Mutex<SnowflakeState>,
}

impl SnowflakeGenerator {
    pub fn new(node: u16) -> Result<Self, DelayError> {
        if node > MAX_NODE_ID {
            return Err(DelayError::InvalidRequest("snowflake node id exceeds 10 bits"));
        }
        Ok(Self {
            node,
            state: Mutex::new(SnowflakeState::default()),
        })
    }
}

impl IdGenerator for SnowflakeGenerator {
    fn next_id(&self) -> MessageId {
        let now = Utc::now().timestamp_millis();
        let (ts, seq) = self
            .state
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .advance(now);
        MessageId::compose(ts, self.node, seq)
    }
}
