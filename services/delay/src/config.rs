use std::time::Duration;

use delay_domain::shard::{ShardId, ShardLayout, ShardLayoutError};
use serde::Deserialize;

use crate::domain::types::{DEFAULT_CONSUMER_GROUP, DEFAULT_DELAY_TOPIC};
use crate::usecase::receiver::ReceiverSettings;
use crate::usecase::sender::SenderSettings;

/// Delay service configuration loaded from environment variables.
///
/// Durations are milliseconds. Lists (`DELAY_BUSINESS_TOPICS`,
/// `DELAY_SENDER_SHARDS`) are comma separated.
#[derive(Debug, Clone, Deserialize)]
pub struct DelayConfig {
    /// PostgreSQL connection URL.
    pub database_url: String,
    /// Redis connection URL.
    pub redis_url: String,

    /// Stream the producers write delay requests to.
    #[serde(default = "default_delay_topic")]
    pub delay_topic: String,
    #[serde(default = "default_consumer_group")]
    pub delay_consumer_group: String,
    /// Consumer name prefix inside the group. Defaults to `delay-{node id}`, so a
    /// restarted process reads its own pending entries again.
    pub delay_consumer_name: Option<String>,
    /// Entries another consumer left unacknowledged this long are claimed by
    /// this process (default 60 s). Must exceed the time one request takes.
    #[serde(default = "default_claim_idle_ms")]
    pub delay_claim_idle_ms: u64,
    /// Number of receiver loops (default 1).
    #[serde(default = "default_receiver_count")]
    pub delay_receiver_count: usize,
    /// Topics a message may be forwarded to.
    #[serde(default)]
    pub delay_business_topics: Vec<String>,

    #[serde(default = "default_shard_count")]
    pub delay_shard_db_count: u32,
    #[serde(default = "default_shard_count")]
    pub delay_shard_table_count: u32,
    /// Flat shard indexes this process scans. Defaults to every shard.
    pub delay_sender_shards: Option<Vec<usize>>,

    /// Snowflake node id. Required, and must differ between running processes:
    /// two processes sharing one can mint the same id in the same millisecond.
    pub delay_node_id: u16,

    #[serde(default = "default_batch_size")]
    pub delay_batch_size: u64,
    #[serde(default = "default_idle_backoff_ms")]
    pub delay_idle_backoff_ms: u64,
    #[serde(default = "default_scan_timeout_ms")]
    pub delay_scan_timeout_ms: u64,
    #[serde(default = "default_forward_timeout_ms")]
    pub delay_forward_timeout_ms: u64,
    #[serde(default = "default_store_timeout_ms")]
    pub delay_store_timeout_ms: u64,
    #[serde(default = "default_poll_timeout_ms")]
    pub delay_poll_timeout_ms: u64,

    /// Port of the health endpoints (default 3120).
    #[serde(default = "default_health_port")]
    pub delay_health_port: u16,
}

impl delay_core::config::Config for DelayConfig {}

fn default_delay_topic() -> String {
    DEFAULT_DELAY_TOPIC.to_owned()
}

fn default_consumer_group() -> String {
    DEFAULT_CONSUMER_GROUP.to_owned()
}

fn default_claim_idle_ms() -> u64 {
    60_000
}

fn default_receiver_count() -> usize {
    1
}

fn default_shard_count() -> u32 {
    2
}

fn default_batch_size() -> u64 {
    10
}

fn default_idle_backoff_ms() -> u64 {
    1_000
}

fn default_scan_timeout_ms() -> u64 {
    10_000
}

fn default_forward_timeout_ms() -> u64 {
    3_000
}

fn default_store_timeout_ms() -> u64 {
    3_000
}

fn default_poll_timeout_ms() -> u64 {
    1_000
}

fn default_health_port() -> u16 {
    3120
}

impl DelayConfig {
    pub fn shard_layout(&self) -> Result<ShardLayout, ShardLayoutError> {
        ShardLayout::new(self.delay_shard_db_count, self.delay_shard_table_count)
    }

    /// Shards assigned to this process's senders.
    pub fn sender_shards(&self, layout: &ShardLayout) -> Result<Vec<ShardId>, ShardLayoutError> {
        match &self.delay_sender_shards {
            Some(indexes) => indexes.iter().map(|&i| layout.shard_at(i)).collect(),
            None => Ok(layout.shards().collect()),
        }
    }

    pub fn consumer_name(&self) -> String {
        self.delay_consumer_name
            .clone()
            .unwrap_or_else(|| format!("delay-{}", self.delay_node_id))
    }

    pub fn claim_idle(&self) -> Duration {
        Duration::from_millis(self.delay_claim_idle_ms)
    }

    pub fn receiver_settings(&self) -> ReceiverSettings {
        ReceiverSettings {
            poll_timeout: Duration::from_millis(self.delay_poll_timeout_ms),
            store_timeout: Duration::from_millis(self.delay_store_timeout_ms),
            error_backoff: Duration::from_millis(self.delay_idle_backoff_ms),
        }
    }

    pub fn sender_settings(&self) -> SenderSettings {
        SenderSettings {
            batch_size: self.delay_batch_size,
            idle_backoff: Duration::from_millis(self.delay_idle_backoff_ms),
            scan_timeout: Duration::from_millis(self.delay_scan_timeout_ms),
            forward_timeout: Duration::from_millis(self.delay_forward_timeout_ms),
            store_timeout: Duration::from_millis(self.delay_store_timeout_ms),
        }
    }
}
