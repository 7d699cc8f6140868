use bytes::Bytes;
use serde::{Deserialize, Serialize};

use delay_domain::id::MessageId;
use delay_domain::message::{DelayMessage, DelayStatus};

use crate::error::DelayError;

/// Wire format of a delay request on the delay topic (JSON).
///
/// ```json
/// { "value": "QQ==", "topic": "biz_topic", "deadline": 1718000000000, "dedupKey": "order-42" }
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DelayEnvelope {
    /// Opaque payload forwarded unchanged (base64 on the wire).
    #[serde(with = "delay_core::serde::base64_bytes")]
    pub value: Bytes,
    /// Business topic the payload is forwarded to.
    pub topic: String,
    /// Earliest delivery instant, epoch milliseconds.
    pub deadline: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dedup_key: Option<String>,
}

impl DelayEnvelope {
    pub fn encode(&self) -> Result<Vec<u8>, DelayError> {
        serde_json::to_vec(self).map_err(|e| DelayError::Transient(e.into()))
    }

    /// Decode an inbound payload. An empty key is treated as no key.
    pub fn decode(payload: &[u8]) -> Result<Self, DelayError> {
        let mut envelope: Self = serde_json::from_slice(payload).map_err(DelayError::Decode)?;
        if envelope.topic.is_empty() {
            return Err(DelayError::Decode(serde::de::Error::custom(
                "delay request has an empty topic",
            )));
        }
        envelope.dedup_key = envelope.dedup_key.filter(|k| !k.is_empty());
        Ok(envelope)
    }

    /// Build the row to store: waiting, created and updated at `now_ms`.
    pub fn into_message(self, id: MessageId, now_ms: i64) -> DelayMessage {
        DelayMessage {
            id,
            topic: self.topic,
            value: self.value,
            dedup_key: self.dedup_key,
            deadline: self.deadline,
            status: DelayStatus::Waiting,
            created_at: now_ms,
            updated_at: now_ms,
        }
    }
}

/// One delivery from the delay topic, committed by `offset` once handled.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InboundMessage {
    /// Transport position (Redis stream entry id, log index, ...).
    pub offset: String,
    pub payload: Bytes,
}

/// Default delay topic name.
pub const DEFAULT_DELAY_TOPIC: &str = "delay_topic";

/// Default consumer group of the receivers.
pub const DEFAULT_CONSUMER_GROUP: &str = "delay_msg_group";
