use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicI64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use bytes::Bytes;
use chrono::Utc;

use delay_domain::id::MessageId;
use delay_domain::message::{DelayMessage, DelayStatus};
use delay_domain::shard::{ShardId, ShardLayout};
use delay_platform::dispatch::routing::ShardRouter;
use delay_platform::dispatch::topics::TopicRegistry;
use delay_platform::domain::repository::{DelayConsumer, DelayStore, IdGenerator, TopicPublisher};
use delay_platform::domain::types::InboundMessage;
use delay_platform::error::DelayError;
use delay_platform::usecase::producer::Producer;
use delay_platform::usecase::receiver::{Receiver, ReceiverSettings};
use delay_platform::usecase::sender::{Sender, SenderSettings};

pub const BIZ_TOPIC: &str = "biz_topic";

fn injected(what: &str) -> DelayError {
    DelayError::Transient(anyhow::anyhow!("injected {what} failure"))
}

/// Consume one unit from a failure budget, if any is left.
fn take_failure(budget: &AtomicUsize) -> bool {
    budget
        .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
        .is_ok()
}

pub fn now_ms() -> i64 {
    Utc::now().timestamp_millis()
}

// ── MemoryStore ──────────────────────────────────────────────────────────────

/// Sharded in-memory store with the same constraints as the database: the id
/// is the primary key of a shard, and a dedup key is unique among its waiting
/// rows. Only the dedup rule reports a duplicate request.
#[derive(Clone, Default)]
pub struct MemoryStore {
    pub rows: Arc<Mutex<HashMap<ShardId, Vec<DelayMessage>>>>,
    pub fail_inserts: Arc<AtomicUsize>,
    pub fail_finds: Arc<AtomicUsize>,
    pub fail_completes: Arc<AtomicUsize>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fail_next_inserts(&self, n: usize) {
        self.fail_inserts.store(n, Ordering::SeqCst);
    }

    pub fn fail_next_finds(&self, n: usize) {
        self.fail_finds.store(n, Ordering::SeqCst);
    }

    pub fn fail_next_completes(&self, n: usize) {
        self.fail_completes.store(n, Ordering::SeqCst);
    }

    /// Put a row straight into `shard`, bypassing dedup checks.
    pub fn seed(&self, shard: ShardId, msg: DelayMessage) {
        self.rows.lock().unwrap().entry(shard).or_default().push(msg);
    }

    pub fn rows_in(&self, shard: ShardId) -> Vec<DelayMessage> {
        self.rows
            .lock()
            .unwrap()
            .get(&shard)
            .cloned()
            .unwrap_or_default()
    }

    pub fn all_rows(&self) -> Vec<(ShardId, DelayMessage)> {
        let rows = self.rows.lock().unwrap();
        let mut all: Vec<_> = rows
            .iter()
            .flat_map(|(shard, msgs)| msgs.iter().map(|m| (*shard, m.clone())))
            .collect();
        all.sort_by_key(|(_, m)| m.id);
        all
    }

    pub fn count(&self, status: DelayStatus) -> usize {
        self.all_rows()
            .iter()
            .filter(|(_, m)| m.status == status)
            .count()
    }

    pub fn find(&self, id: MessageId) -> Option<DelayMessage> {
        self.all_rows()
            .into_iter()
            .map(|(_, m)| m)
            .find(|m| m.id == id)
    }
}

impl DelayStore for MemoryStore {
    async fn insert(&self, shard: ShardId, msg: &DelayMessage) -> Result<(), DelayError> {
        if take_failure(&self.fail_inserts) {
            return Err(injected("insert"));
        }
        let mut rows = self.rows.lock().unwrap();
        let table = rows.entry(shard).or_default();
        if table.iter().any(|m| m.id == msg.id) {
            return Err(DelayError::Transient(anyhow::anyhow!(
                "primary key {} already present in {shard}",
                msg.id
            )));
        }
        if let Some(key) = &msg.dedup_key {
            let taken = table
                .iter()
                .any(|m| m.status == DelayStatus::Waiting && m.dedup_key.as_ref() == Some(key));
            if taken {
                return Err(DelayError::DuplicateKey(key.clone()));
            }
        }
        table.push(msg.clone());
        Ok(())
    }

    async fn find_due(&self, shard: ShardId, limit: u64) -> Result<Vec<DelayMessage>, DelayError> {
        if take_failure(&self.fail_finds) {
            return Err(injected("find"));
        }
        let now = now_ms();
        let mut due: Vec<DelayMessage> = self
            .rows_in(shard)
            .into_iter()
            .filter(|m| m.is_due(now))
            .collect();
        due.sort_by_key(|m| (m.created_at, m.id));
        due.truncate(limit as usize);
        Ok(due)
    }

    async fn mark_complete(&self, shard: ShardId, ids: &[MessageId]) -> Result<(), DelayError> {
        if take_failure(&self.fail_completes) {
            return Err(injected("mark complete"));
        }
        let now = now_ms();
        let mut rows = self.rows.lock().unwrap();
        for m in rows.entry(shard).or_default().iter_mut() {
            if ids.contains(&m.id) && m.status == DelayStatus::Waiting {
                m.status = DelayStatus::Completed;
                m.updated_at = now;
            }
        }
        Ok(())
    }
}

// ── MemoryTopic ──────────────────────────────────────────────────────────────

/// A published entry with the instant it was appended.
#[derive(Debug, Clone)]
pub struct Published {
    pub key: Option<String>,
    pub payload: Bytes,
    pub at_ms: i64,
}

/// Unacknowledged delivery: which group member holds it and since when.
#[derive(Debug, Clone)]
struct PendingDelivery {
    consumer: String,
    since: Instant,
}

#[derive(Default)]
struct TopicLog {
    entries: Vec<Published>,
    /// Group cursor: entries below it were delivered to some member.
    delivered: usize,
    pending: HashMap<usize, PendingDelivery>,
    committed: HashSet<usize>,
}

/// Append-only log with a single consumer group. Offsets are entry indexes.
///
/// Mirrors a stream consumer group: a new entry goes to exactly one member
/// and stays in that member's pending list until committed. A member sees it
/// again by draining its own pending list, and another member only by
/// claiming it once it has been idle long enough.
#[derive(Clone, Default)]
pub struct MemoryTopic {
    log: Arc<Mutex<TopicLog>>,
    fail_publishes: Arc<AtomicUsize>,
    publish_delay: Option<Duration>,
}

impl MemoryTopic {
    pub fn new() -> Self {
        Self::default()
    }

    /// A topic whose publishes take `delay` to complete.
    pub fn slow(delay: Duration) -> Self {
        Self {
            publish_delay: Some(delay),
            ..Self::default()
        }
    }

    pub fn fail_next_publishes(&self, n: usize) {
        self.fail_publishes.store(n, Ordering::SeqCst);
    }

    pub fn published(&self) -> Vec<Published> {
        self.log.lock().unwrap().entries.clone()
    }

    pub fn payloads(&self) -> Vec<Bytes> {
        self.published().into_iter().map(|p| p.payload).collect()
    }

    pub fn committed_count(&self) -> usize {
        self.log.lock().unwrap().committed.len()
    }

    pub fn pending_count(&self) -> usize {
        self.log.lock().unwrap().pending.len()
    }

    pub fn push_raw(&self, payload: &[u8]) {
        self.log.lock().unwrap().entries.push(Published {
            key: None,
            payload: Bytes::copy_from_slice(payload),
            at_ms: now_ms(),
        });
    }

    /// Group member `name`. It starts by draining its own pending list, and
    /// takes over entries of other members idle for at least `claim_idle`.
    pub fn consumer(&self, name: &str, claim_idle: Duration) -> MemoryConsumer {
        MemoryConsumer {
            topic: self.clone(),
            name: name.to_owned(),
            claim_idle,
            draining: Mutex::new(true),
        }
    }
}

impl TopicPublisher for MemoryTopic {
    async fn publish(&self, key: Option<&str>, payload: &[u8]) -> Result<(), DelayError> {
        if let Some(delay) = self.publish_delay {
            tokio::time::sleep(delay).await;
        }
        if take_failure(&self.fail_publishes) {
            return Err(injected("publish"));
        }
        self.log.lock().unwrap().entries.push(Published {
            key: key.map(str::to_owned),
            payload: Bytes::copy_from_slice(payload),
            at_ms: now_ms(),
        });
        Ok(())
    }
}

pub struct MemoryConsumer {
    topic: MemoryTopic,
    name: String,
    claim_idle: Duration,
    draining: Mutex<bool>,
}

impl MemoryConsumer {
    /// Look at pending entries again on the next poll.
    pub fn recheck_pending(&self) {
        *self.draining.lock().unwrap() = true;
    }

    fn next_delivery(&self) -> Option<usize> {
        let mut log = self.topic.log.lock().unwrap();
        let now = Instant::now();
        let mut draining = self.draining.lock().unwrap();
        if *draining {
            let own = log
                .pending
                .iter()
                .filter(|(_, p)| p.consumer == self.name)
                .map(|(i, _)| *i)
                .min();
            if own.is_some() {
                return own;
            }
            let stale = log
                .pending
                .iter()
                .filter(|(_, p)| p.consumer != self.name)
                .filter(|(_, p)| now.duration_since(p.since) >= self.claim_idle)
                .map(|(i, _)| *i)
                .min();
            if let Some(i) = stale {
                log.pending.insert(
                    i,
                    PendingDelivery {
                        consumer: self.name.clone(),
                        since: now,
                    },
                );
                return Some(i);
            }
            *draining = false;
        }
        if log.delivered < log.entries.len() {
            let i = log.delivered;
            log.delivered += 1;
            log.pending.insert(
                i,
                PendingDelivery {
                    consumer: self.name.clone(),
                    since: now,
                },
            );
            return Some(i);
        }
        None
    }
}

impl DelayConsumer for MemoryConsumer {
    async fn poll(&self, timeout: Duration) -> Result<Option<InboundMessage>, DelayError> {
        let Some(i) = self.next_delivery() else {
            tokio::time::sleep(timeout).await;
            return Ok(None);
        };
        let payload = self.topic.log.lock().unwrap().entries[i].payload.clone();
        Ok(Some(InboundMessage {
            offset: i.to_string(),
            payload,
        }))
    }

    async fn commit(&self, msg: &InboundMessage) -> Result<(), DelayError> {
        let offset: usize = msg
            .offset
            .parse()
            .map_err(|_| DelayError::InvalidRequest("offset is not an entry index"))?;
        let mut log = self.topic.log.lock().unwrap();
        log.pending.remove(&offset);
        log.committed.insert(offset);
        Ok(())
    }
}

// ── Ids ──────────────────────────────────────────────────────────────────────

/// Ids 1, 2, 3, ... so unkeyed routing is predictable.
#[derive(Default)]
pub struct SequentialIds {
    next: AtomicI64,
}

impl IdGenerator for SequentialIds {
    fn next_id(&self) -> MessageId {
        MessageId(self.next.fetch_add(1, Ordering::SeqCst) + 1)
    }
}

/// Always the same id, as two processes sharing a node id would produce.
pub struct FixedIds(pub i64);

impl IdGenerator for FixedIds {
    fn next_id(&self) -> MessageId {
        MessageId(self.0)
    }
}

// ── Fixtures ─────────────────────────────────────────────────────────────────

pub fn layout() -> ShardLayout {
    ShardLayout::new(2, 2).unwrap()
}

pub fn receiver_settings() -> ReceiverSettings {
    ReceiverSettings {
        poll_timeout: Duration::from_millis(10),
        store_timeout: Duration::from_millis(500),
        error_backoff: Duration::from_millis(10),
    }
}

pub fn sender_settings() -> SenderSettings {
    SenderSettings {
        batch_size: 10,
        idle_backoff: Duration::from_millis(10),
        scan_timeout: Duration::from_secs(5),
        forward_timeout: Duration::from_millis(500),
        store_timeout: Duration::from_millis(500),
    }
}

/// Stable group member name of [`receiver`], kept across restarts.
pub const RECEIVER_NAME: &str = "receiver-0";
pub const CLAIM_IDLE: Duration = Duration::from_secs(60);

/// A receiver as one process would start it: same member name on every start.
pub fn receiver(
    topic: &MemoryTopic,
    store: &MemoryStore,
) -> Receiver<MemoryConsumer, MemoryStore, SequentialIds> {
    receiver_with(
        topic.consumer(RECEIVER_NAME, CLAIM_IDLE),
        store,
        SequentialIds::default(),
    )
}

pub fn receiver_with<G: IdGenerator>(
    consumer: MemoryConsumer,
    store: &MemoryStore,
    ids: G,
) -> Receiver<MemoryConsumer, MemoryStore, G> {
    Receiver {
        consumer,
        store: store.clone(),
        ids,
        router: ShardRouter::new(layout()),
        settings: receiver_settings(),
    }
}

pub fn registry(biz: &MemoryTopic) -> Arc<TopicRegistry<MemoryTopic>> {
    Arc::new(TopicRegistry::new([(BIZ_TOPIC.to_owned(), biz.clone())]))
}

pub fn sender(
    shard: ShardId,
    store: &MemoryStore,
    topics: &Arc<TopicRegistry<MemoryTopic>>,
) -> Sender<MemoryStore, MemoryTopic> {
    Sender {
        shard,
        store: store.clone(),
        topics: Arc::clone(topics),
        settings: sender_settings(),
    }
}

pub fn producer(delay_topic: &MemoryTopic) -> Producer<MemoryTopic> {
    Producer {
        delay_topic: delay_topic.clone(),
    }
}

/// A waiting message for `topic`, due `due_in_ms` from now (negative: overdue).
pub fn waiting_message(id: i64, topic: &str, due_in_ms: i64) -> DelayMessage {
    let now = now_ms();
    DelayMessage {
        id: MessageId(id),
        topic: topic.to_owned(),
        value: Bytes::from(format!("payload-{id}")),
        dedup_key: None,
        deadline: now + due_in_ms,
        status: DelayStatus::Waiting,
        created_at: now,
        updated_at: now,
    }
}
