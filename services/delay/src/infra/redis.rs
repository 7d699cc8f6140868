use std::collections::HashMap;
use std::sync::{Mutex, PoisonError};
use std::time::{Duration, Instant};

use anyhow::Context as _;
use bytes::Bytes;
use deadpool_redis::redis::{self, RedisError};
use deadpool_redis::{Connection, Pool};

use crate::domain::repository::{DelayConsumer, TopicPublisher};
use crate::domain::types::InboundMessage;
use crate::error::DelayError;

/// Stream entry field holding the opaque payload.
pub const PAYLOAD_FIELD: &str = "payload";
/// Stream entry field holding the message key, when there is one.
pub const KEY_FIELD: &str = "key";

/// How often a consumer re-reads its own pending entries list.
const PENDING_RECHECK_INTERVAL: Duration = Duration::from_secs(30);

/// `XREADGROUP` reply: `[[stream, [[entry_id, {field: value}], ...]], ...]`.
/// Fields are nil for entries trimmed from the stream while still pending.
type StreamReply = Option<Vec<(String, Vec<(String, EntryFields)>)>>;

async fn connection(pool: &Pool) -> Result<Connection, DelayError> {
    Ok(pool.get().await.context("get redis connection")?)
}

// ── Publisher ─────────────────────────────────────────────────────────────────

/// `XADD <stream> * payload <bytes> [key <key>]`.
#[derive(Clone)]
pub struct RedisStreamPublisher {
    pub pool: Pool,
    pub stream: String,
}

impl TopicPublisher for RedisStreamPublisher {
    async fn publish(&self, key: Option<&str>, payload: &[u8]) -> Result<(), DelayError> {
        let mut conn = connection(&self.pool).await?;
        let mut cmd = redis::cmd("XADD");
        cmd.arg(&self.stream).arg("*").arg(PAYLOAD_FIELD).arg(payload);
        if let Some(key) = key {
            cmd.arg(KEY_FIELD).arg(key);
        }
        let _entry_id: String = cmd
            .query_async(&mut conn)
            .await
            .with_context(|| format!("xadd to {}", self.stream))?;
        Ok(())
    }
}

// ── Consumer ──────────────────────────────────────────────────────────────────

/// Entry fields keyed by name.
type EntryFields = Option<HashMap<String, Vec<u8>>>;

/// `XPENDING <stream> <group> IDLE <ms> - + <count>` row:
/// entry id, owning consumer, idle ms, delivery count.
type PendingRow = (String, String, u64, u64);

/// Stale pending entries inspected per claim attempt.
const CLAIM_SCAN_COUNT: usize = 10;

/// When to look at pending entries instead of new ones.
///
/// Starts draining. Once a drain finds nothing, pending entries are looked at
/// again after [`PENDING_RECHECK_INTERVAL`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct PendingScan {
    draining: bool,
    next_check: Instant,
}

impl PendingScan {
    fn starting(now: Instant) -> Self {
        Self {
            draining: true,
            next_check: now,
        }
    }

    fn turn(&mut self, now: Instant) -> bool {
        if !self.draining && now >= self.next_check {
            self.draining = true;
        }
        self.draining
    }

    fn drained(&mut self, now: Instant) {
        self.draining = false;
        self.next_check = now + PENDING_RECHECK_INTERVAL;
    }
}

/// Consumer-group reader of one stream.
///
/// On a pending turn it first redelivers its own unacknowledged entries, then
/// claims entries other consumers of the group left unacknowledged for at
/// least `claim_idle` (a crashed process, or a consumer name that is no longer
/// in use). Otherwise it reads new entries.
pub struct RedisStreamConsumer {
    pool: Pool,
    stream: String,
    group: String,
    consumer: String,
    claim_idle: Duration,
    pending: Mutex<PendingScan>,
}

impl RedisStreamConsumer {
    /// Create the consumer group (and the stream) if missing.
    pub async fn connect(
        pool: Pool,
        stream: impl Into<String>,
        group: impl Into<String>,
        consumer: impl Into<String>,
        claim_idle: Duration,
    ) -> Result<Self, DelayError> {
        let this = Self {
            pool,
            stream: stream.into(),
            group: group.into(),
            consumer: consumer.into(),
            claim_idle,
            pending: Mutex::new(PendingScan::starting(Instant::now())),
        };
        this.ensure_group().await?;
        Ok(this)
    }

    async fn ensure_group(&self) -> Result<(), DelayError> {
        let mut conn = connection(&self.pool).await?;
        // A new group starts from the beginning of the stream.
        let created: Result<(), RedisError> = redis::cmd("XGROUP")
            .arg("CREATE")
            .arg(&self.stream)
            .arg(&self.group)
            .arg("0")
            .arg("MKSTREAM")
            .query_async(&mut conn)
            .await;
        match created {
            Ok(()) => {
                tracing::info!(stream = %self.stream, group = %self.group, "created consumer group");
                Ok(())
            }
            Err(e) if e.code() == Some("BUSYGROUP") => Ok(()),
            Err(e) => Err(anyhow::Error::new(e)
                .context(format!("create consumer group {} on {}", self.group, self.stream))
                .into()),
        }
    }

    fn pending_turn(&self) -> bool {
        self.pending
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .turn(Instant::now())
    }

    fn pending_drained(&self) {
        self.pending
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .drained(Instant::now());
    }

    async fn read(&self, id: &str, block: Option<Duration>) -> Result<StreamReply, DelayError> {
        let mut conn = connection(&self.pool).await?;
        let mut cmd = redis::cmd("XREADGROUP");
        cmd.arg("GROUP")
            .arg(&self.group)
            .arg(&self.consumer)
            .arg("COUNT")
            .arg(1);
        if let Some(block) = block {
            // BLOCK 0 would wait forever.
            cmd.arg("BLOCK").arg(block.as_millis().max(1) as u64);
        }
        cmd.arg("STREAMS").arg(&self.stream).arg(id);
        Ok(cmd
            .query_async(&mut conn)
            .await
            .with_context(|| format!("xreadgroup from {}", self.stream))?)
    }

    /// Take over one entry another consumer has left idle for `claim_idle`.
    async fn claim_stale(&self) -> Result<Option<InboundMessage>, DelayError> {
        let mut conn = connection(&self.pool).await?;
        let min_idle_ms = self.claim_idle.as_millis() as u64;
        let stale: Vec<PendingRow> = redis::cmd("XPENDING")
            .arg(&self.stream)
            .arg(&self.group)
            .arg("IDLE")
            .arg(min_idle_ms)
            .arg("-")
            .arg("+")
            .arg(CLAIM_SCAN_COUNT)
            .query_async(&mut conn)
            .await
            .with_context(|| format!("xpending on {}", self.stream))?;
        let Some((entry_id, owner)) = claimable(&stale, &self.consumer) else {
            return Ok(None);
        };

        // MIN-IDLE again so a concurrent claimer cannot steal it twice.
        let claimed: Vec<Option<(String, EntryFields)>> = redis::cmd("XCLAIM")
            .arg(&self.stream)
            .arg(&self.group)
            .arg(&self.consumer)
            .arg(min_idle_ms)
            .arg(entry_id)
            .query_async(&mut conn)
            .await
            .with_context(|| format!("xclaim {entry_id} on {}", self.stream))?;
        let msg = claimed
            .into_iter()
            .flatten()
            .next()
            .map(|(id, fields)| entry_message(id, fields));
        if let Some(msg) = &msg {
            tracing::info!(offset = %msg.offset, from = %owner, "claimed abandoned entry");
        }
        Ok(msg)
    }
}

/// First stale entry owned by some other consumer. Own entries are
/// redelivered through the pending read instead.
fn claimable<'a>(stale: &'a [PendingRow], own: &str) -> Option<(&'a str, &'a str)> {
    stale
        .iter()
        .find(|(_, owner, _, _)| owner != own)
        .map(|(id, owner, _, _)| (id.as_str(), owner.as_str()))
}

fn entry_message(entry_id: String, fields: EntryFields) -> InboundMessage {
    let payload = fields
        .and_then(|mut f| f.remove(PAYLOAD_FIELD))
        .unwrap_or_default();
    InboundMessage {
        offset: entry_id,
        payload: Bytes::from(payload),
    }
}

fn first_entry(reply: StreamReply) -> Option<InboundMessage> {
    let (entry_id, fields) = reply?.into_iter().flat_map(|(_, entries)| entries).next()?;
    Some(entry_message(entry_id, fields))
}

impl DelayConsumer for RedisStreamConsumer {
    async fn poll(&self, timeout: Duration) -> Result<Option<InboundMessage>, DelayError> {
        if self.pending_turn() {
            if let Some(msg) = first_entry(self.read("0", None).await?) {
                tracing::debug!(offset = %msg.offset, "redelivering pending entry");
                return Ok(Some(msg));
            }
            if let Some(msg) = self.claim_stale().await? {
                return Ok(Some(msg));
            }
            self.pending_drained();
        }
        Ok(first_entry(self.read(">", Some(timeout)).await?))
    }

    async fn commit(&self, msg: &InboundMessage) -> Result<(), DelayError> {
        let mut conn = connection(&self.pool).await?;
        let _acked: i64 = redis::cmd("XACK")
            .arg(&self.stream)
            .arg(&self.group)
            .arg(&msg.offset)
            .query_async(&mut conn)
            .await
            .with_context(|| format!("xack {} on {}", msg.offset, self.stream))?;
        Ok(())
    }
}
