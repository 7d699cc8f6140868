use std::time::Duration;

use chrono::Utc;
use tokio_util::sync::CancellationToken;

use delay_domain::id::MessageId;
use delay_domain::shard::ShardId;

use crate::dispatch::routing::ShardRouter;
use crate::domain::repository::{DelayConsumer, DelayStore, IdGenerator};
use crate::domain::types::{DelayEnvelope, InboundMessage};
use crate::error::{DelayError, with_timeout};

#[derive(Debug, Clone, Copy)]
pub struct ReceiverSettings {
    /// Longest a single poll waits for a delivery.
    pub poll_timeout: Duration,
    /// Bound on each insert and commit.
    pub store_timeout: Duration,
    /// Pause after a failed iteration.
    pub error_backoff: Duration,
}

/// What one receive step did with the delivery it got.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReceiveOutcome {
    /// Nothing arrived within the poll timeout.
    Idle,
    Stored { id: MessageId, shard: ShardId },
    /// The dedup key is already waiting; committed without storing.
    Duplicate { shard: ShardId },
    /// Undecodable request; committed and discarded.
    Dropped,
}

/// Receive-and-store path: delay topic -> shard row -> commit.
///
/// A delivery is committed only after its row is durably stored (or known to
/// exist already). Any other failure leaves it uncommitted for redelivery.
pub struct Receiver<C, S, G>
where
    C: DelayConsumer,
    S: DelayStore,
    G: IdGenerator,
{
    pub consumer: C,
    pub store: S,
    pub ids: G,
    pub router: ShardRouter,
    pub settings: ReceiverSettings,
}

impl<C, S, G> Receiver<C, S, G>
where
    C: DelayConsumer,
    S: DelayStore,
    G: IdGenerator,
{
    pub async fn receive_once(&self) -> Result<ReceiveOutcome, DelayError> {
        // 1. Wait for a delivery (bounded)
        let poll_limit = self.settings.poll_timeout + self.settings.store_timeout;
        let Some(inbound) =
            with_timeout(poll_limit, self.consumer.poll(self.settings.poll_timeout)).await?
        else {
            return Ok(ReceiveOutcome::Idle);
        };

        // 2. Decode; a poison message is dropped so it cannot block the partition
        let envelope = match DelayEnvelope::decode(&inbound.payload) {
            Ok(envelope) => envelope,
            Err(e) => {
                tracing::warn!(
                    offset = %inbound.offset,
                    kind = e.kind(),
                    error = %e,
                    "dropping malformed delay request"
                );
                self.commit(&inbound).await?;
                return Ok(ReceiveOutcome::Dropped);
            }
        };

        // 3. Assign id and shard
        let msg = envelope.into_message(self.ids.next_id(), Utc::now().timestamp_millis());
        let shard = self.router.shard_for(&msg);

        // 4. Store, then commit
        match with_timeout(self.settings.store_timeout, self.store.insert(shard, &msg)).await {
            Ok(()) => {
                self.commit(&inbound).await?;
                tracing::info!(
                    id = %msg.id,
                    %shard,
                    topic = %msg.topic,
                    deadline = msg.deadline,
                    "stored delay message"
                );
                Ok(ReceiveOutcome::Stored { id: msg.id, shard })
            }
            Err(DelayError::DuplicateKey(key)) => {
                tracing::info!(dedup_key = %key, %shard, "delay message already requested");
                self.commit(&inbound).await?;
                Ok(ReceiveOutcome::Duplicate { shard })
            }
            Err(e) => Err(e),
        }
    }

    async fn commit(&self, inbound: &InboundMessage) -> Result<(), DelayError> {
        with_timeout(self.settings.store_timeout, self.consumer.commit(inbound)).await
    }

    /// Receive until `cancel` fires. Errors are logged and never end the loop.
    pub async fn run(&self, cancel: CancellationToken) {
        tracing::info!("receiver started");
        while !cancel.is_cancelled() {
            if let Err(e) = self.receive_once().await {
                tracing::error!(kind = e.kind(), error = %e, "receive failed, delivery left uncommitted");
                tokio::select! {
                    _ = cancel.cancelled() => break,
                    _ = tokio::time::sleep(self.settings.error_backoff) => {}
                }
            }
        }
        tracing::info!("receiver stopped");
    }
}
