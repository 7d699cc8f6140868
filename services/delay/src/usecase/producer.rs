use std::time::Duration;

use bytes::Bytes;
use chrono::{DateTime, Utc};

use crate::domain::repository::TopicPublisher;
use crate::domain::types::DelayEnvelope;
use crate::error::DelayError;

pub struct SubmitInput {
    pub value: Bytes,
    pub topic: String,
    /// Earliest delivery instant. A past deadline is delivered on the next scan.
    pub deadline: DateTime<Utc>,
    pub dedup_key: Option<String>,
}

/// Client side of the platform: publishes delay requests to the delay topic.
pub struct Producer<P>
where
    P: TopicPublisher,
{
    pub delay_topic: P,
}

impl<P> Producer<P>
where
    P: TopicPublisher,
{
    pub async fn submit(&self, input: SubmitInput) -> Result<(), DelayError> {
        if input.topic.is_empty() {
            return Err(DelayError::InvalidRequest("target topic must not be empty"));
        }
        if input.value.is_empty() {
            return Err(DelayError::InvalidRequest("payload must not be empty"));
        }

        let envelope = DelayEnvelope {
            value: input.value,
            topic: input.topic,
            deadline: input.deadline.timestamp_millis(),
            dedup_key: input.dedup_key.filter(|k| !k.is_empty()),
        };
        let payload = envelope.encode()?;
        self.delay_topic
            .publish(envelope.dedup_key.as_deref(), &payload)
            .await?;

        tracing::debug!(
            topic = %envelope.topic,
            deadline = envelope.deadline,
            dedup_key = envelope.dedup_key.as_deref(),
            "submitted delay request"
        );
        Ok(())
    }

    /// Submit with `deadline = now + delay`.
    pub async fn submit_after(
        &self,
        value: Bytes,
        topic: impl Into<String>,
        delay: Duration,
        dedup_key: Option<String>,
    ) -> Result<(), DelayError> {
        let deadline = chrono::Duration::from_std(delay)
            .ok()
            .and_then(|delay| Utc::now().checked_add_signed(delay))
            .ok_or(DelayError::InvalidRequest("delay is out of range"))?;
        self.submit(SubmitInput {
            value,
            topic: topic.into(),
            deadline,
            dedup_key,
        })
        .await
    }
}
