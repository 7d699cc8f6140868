#![allow(async_fn_in_trait)]

use std::sync::Arc;
use std::time::Duration;

use delay_domain::id::MessageId;
use delay_domain::message::DelayMessage;
use delay_domain::shard::ShardId;

use crate::domain::types::InboundMessage;
use crate::error::DelayError;

/// Sharded persistent storage for delay messages.
pub trait DelayStore: Send + Sync {
    /// Write one row into `shard`. A dedup-key collision with a waiting row
    /// fails with [`DelayError::DuplicateKey`].
    async fn insert(&self, shard: ShardId, msg: &DelayMessage) -> Result<(), DelayError>;

    /// Up to `limit` waiting rows with `deadline <= now`, oldest submission first.
    async fn find_due(&self, shard: ShardId, limit: u64) -> Result<Vec<DelayMessage>, DelayError>;

    /// Flip waiting rows to completed. Already completed or unknown ids are ignored.
    async fn mark_complete(&self, shard: ShardId, ids: &[MessageId]) -> Result<(), DelayError>;
}

/// Consumer-group reader of the delay topic.
pub trait DelayConsumer: Send + Sync {
    /// Next delivery, waiting at most `timeout`. `None` when nothing arrived.
    async fn poll(&self, timeout: Duration) -> Result<Option<InboundMessage>, DelayError>;

    /// Acknowledge a delivery so the group never hands it out again.
    async fn commit(&self, msg: &InboundMessage) -> Result<(), DelayError>;
}

/// Outbound handle bound to a single topic.
pub trait TopicPublisher: Send + Sync {
    async fn publish(&self, key: Option<&str>, payload: &[u8]) -> Result<(), DelayError>;
}

/// Source of globally unique message ids.
pub trait IdGenerator: Send + Sync {
    fn next_id(&self) -> MessageId;
}

impl<T: IdGenerator + ?Sized> IdGenerator for Arc<T> {
    fn next_id(&self) -> MessageId {
        (**self).next_id()
    }
}
