use std::sync::Arc;
use std::time::Duration;

use futures::future::join_all;
use tokio_util::sync::CancellationToken;

use delay_domain::message::DelayMessage;
use delay_domain::shard::ShardId;

use crate::dispatch::topics::TopicRegistry;
use crate::domain::repository::{DelayStore, TopicPublisher};
use crate::error::{DelayError, with_timeout};

#[derive(Debug, Clone, Copy)]
pub struct SenderSettings {
    /// Most due messages taken per scan.
    pub batch_size: u64,
    /// Sleep after a scan that made no progress.
    pub idle_backoff: Duration,
    /// Bound on one whole scan cycle.
    pub scan_timeout: Duration,
    /// Bound on each publish.
    pub forward_timeout: Duration,
    /// Bound on each store call.
    pub store_timeout: Duration,
}

/// Counts from one scan cycle.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ScanReport {
    pub due: usize,
    pub forwarded: usize,
    pub failed: usize,
}

impl ScanReport {
    /// Nothing was forwarded, either because nothing was due or because every
    /// attempt failed.
    pub fn is_idle(&self) -> bool {
        self.forwarded == 0
    }
}

/// Scan-and-forward path for one shard.
pub struct Sender<S, H>
where
    S: DelayStore,
    H: TopicPublisher,
{
    pub shard: ShardId,
    pub store: S,
    pub topics: Arc<TopicRegistry<H>>,
    pub settings: SenderSettings,
}

impl<S, H> Sender<S, H>
where
    S: DelayStore,
    H: TopicPublisher,
{
    /// One scan cycle, bounded by `scan_timeout`. Never fails: store and
    /// publish errors are logged and leave rows waiting for the next scan.
    pub async fn scan_once(&self) -> ScanReport {
        match tokio::time::timeout(self.settings.scan_timeout, self.scan()).await {
            Ok(report) => report,
            Err(_) => {
                tracing::warn!(shard = %self.shard, "scan cycle timed out");
                ScanReport::default()
            }
        }
    }

    async fn scan(&self) -> ScanReport {
        let due = match with_timeout(
            self.settings.store_timeout,
            self.store.find_due(self.shard, self.settings.batch_size),
        )
        .await
        {
            Ok(due) => due,
            Err(e) => {
                tracing::error!(shard = %self.shard, kind = e.kind(), error = %e, "find due messages failed");
                return ScanReport::default();
            }
        };

        let mut report = ScanReport {
            due: due.len(),
            ..ScanReport::default()
        };
        if due.is_empty() {
            return report;
        }

        let results = join_all(due.iter().map(|msg| self.forward(msg))).await;
        for (msg, result) in due.iter().zip(results) {
            match result {
                Ok(()) => report.forwarded += 1,
                Err(e) => {
                    report.failed += 1;
                    self.log_failure(msg, &e);
                }
            }
        }
        tracing::debug!(
            shard = %self.shard,
            due = report.due,
            forwarded = report.forwarded,
            failed = report.failed,
            "scan finished"
        );
        report
    }

    /// Publish one message to its topic, then mark it complete.
    async fn forward(&self, msg: &DelayMessage) -> Result<(), DelayError> {
        let publisher = self.topics.resolve(&msg.topic)?;
        with_timeout(
            self.settings.forward_timeout,
            publisher.publish(msg.dedup_key.as_deref(), &msg.value),
        )
        .await?;

        with_timeout(
            self.settings.store_timeout,
            self.store.mark_complete(self.shard, &[msg.id]),
        )
        .await
        .map_err(|e| DelayError::PartialCompletion {
            id: msg.id,
            source: Box::new(e),
        })?;

        tracing::info!(id = %msg.id, shard = %self.shard, topic = %msg.topic, "forwarded delay message");
        Ok(())
    }

    fn log_failure(&self, msg: &DelayMessage, err: &DelayError) {
        match err {
            DelayError::UnknownTopic(topic) => tracing::warn!(
                id = %msg.id,
                shard = %self.shard,
                %topic,
                "no publisher for topic, message stays waiting"
            ),
            DelayError::PartialCompletion { source, .. } => tracing::error!(
                id = %msg.id,
                shard = %self.shard,
                error = %source,
                "published but not marked complete, message will be forwarded again"
            ),
            other => tracing::warn!(
                id = %msg.id,
                shard = %self.shard,
                kind = other.kind(),
                error = %other,
                "forward failed, retrying next scan"
            ),
        }
    }

    /// Scan until `cancel` fires, sleeping `idle_backoff` after scans that
    /// forwarded nothing.
    pub async fn run(&self, cancel: CancellationToken) {
        tracing::info!(shard = %self.shard, "sender started");
        while !cancel.is_cancelled() {
            let report = self.scan_once().await;
            if report.is_idle() {
                tokio::select! {
                    _ = cancel.cancelled() => break,
                    _ = tokio::time::sleep(self.settings.idle_backoff) => {}
                }
            }
        }
        tracing::info!(shard = %self.shard, "sender stopped");
    }
}

/// One sender per assigned shard, all driven together.
pub struct SenderPool<S, H>
where
    S: DelayStore,
    H: TopicPublisher,
{
    senders: Vec<Sender<S, H>>,
}

impl<S, H> SenderPool<S, H>
where
    S: DelayStore + Clone,
    H: TopicPublisher,
{
    pub fn new<I>(shards: I, store: S, topics: Arc<TopicRegistry<H>>, settings: SenderSettings) -> Self
    where
        I: IntoIterator<Item = ShardId>,
    {
        let senders = shards
            .into_iter()
            .map(|shard| Sender {
                shard,
                store: store.clone(),
                topics: Arc::clone(&topics),
                settings,
            })
            .collect();
        Self { senders }
    }

    pub fn len(&self) -> usize {
        self.senders.len()
    }

    pub fn is_empty(&self) -> bool {
        self.senders.is_empty()
    }

    /// Run every sender loop until `cancel` fires and all of them have stopped.
    pub async fn run(&self, cancel: CancellationToken) {
        join_all(self.senders.iter().map(|s| s.run(cancel.clone()))).await;
    }
}
