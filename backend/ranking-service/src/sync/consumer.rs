//! Redis Streams consumer-group reader for job outbox events.
//!
//! Delivery is at-least-once: an entry is acknowledged only after the
//! processor reports success, unless `ack_on_failure` is set. Unacked
//! entries stay in the group's pending list and are replayed by this
//! consumer on its next start, until they reach the delivery cap.

use super::processor::JobSyncProcessor;
use crate::config::SyncConfig;
use crate::error::Result;
use async_trait::async_trait;
use redis::aio::ConnectionManager;
use redis::streams::{StreamPendingCountReply, StreamReadOptions, StreamReadReply};
use redis::AsyncCommands;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tracing::{debug, error, info, warn};

const RETRY_BACKOFF: Duration = Duration::from_secs(5);
const DEFAULT_MAX_DELIVERIES: u64 = 5;

/// A stream entry with its fields decoded as strings.
#[derive(Debug, Clone, PartialEq)]
pub struct StreamEntry {
    pub id: String,
    pub fields: HashMap<String, String>,
    /// How many times the group has delivered this entry, including this read.
    pub delivery_count: u64,
}

#[async_trait]
pub trait JobEventStream: Send + Sync {
    /// Creates the consumer group (and the stream) if missing.
    async fn ensure_group(&self) -> Result<()>;

    /// Entries delivered to this consumer but never acknowledged, with ids
    /// greater than `after_id` and their delivery counts.
    async fn read_pending(&self, after_id: &str) -> Result<Vec<StreamEntry>>;

    /// Entries never delivered to any consumer of the group. May block.
    async fn read_new(&self) -> Result<Vec<StreamEntry>>;

    async fn ack(&self, entry_id: &str) -> Result<()>;
}

pub struct RedisJobStream {
    conn: ConnectionManager,
    config: SyncConfig,
}

impl RedisJobStream {
    pub fn new(conn: ConnectionManager, config: SyncConfig) -> Self {
        Self { conn, config }
    }

    async fn read_group(&self, id: &str, block: bool) -> Result<Vec<StreamEntry>> {
        let mut conn = self.conn.clone();
        let mut options = StreamReadOptions::default()
            .group(&self.config.consumer_group, &self.config.consumer_name)
            .count(self.config.batch_size);
        if block {
            options = options.block(self.config.block_ms as usize);
        }

        let reply: Option<StreamReadReply> = conn
            .xread_options(&[&self.config.stream_name], &[id], &options)
            .await?;

        let entries = reply
            .map(|reply| {
                reply
                    .keys
                    .into_iter()
                    .flat_map(|key| key.ids)
                    .map(|entry| StreamEntry {
                        fields: entry
                            .map
                            .iter()
                            .filter_map(|(k, v)| {
                                redis::from_redis_value::<String>(v)
                                    .ok()
                                    .map(|v| (k.clone(), v))
                            })
                            .collect(),
                        id: entry.id,
                        delivery_count: 1,
                    })
                    .collect()
            })
            .unwrap_or_default();
        Ok(entries)
    }
}

#[async_trait]
impl JobEventStream for RedisJobStream {
    async fn ensure_group(&self) -> Result<()> {
        let mut conn = self.conn.clone();
        let created: redis::RedisResult<()> = conn
            .xgroup_create_mkstream(&self.config.stream_name, &self.config.consumer_group, "0")
            .await;

        match created {
            Ok(()) => {
                info!(
                    stream = %self.config.stream_name,
                    group = %self.config.consumer_group,
                    "Created consumer group"
                );
                Ok(())
            }
            Err(e) if e.code() == Some("BUSYGROUP") => {
                debug!(group = %self.config.consumer_group, "Consumer group already exists");
                Ok(())
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn read_pending(&self, after_id: &str) -> Result<Vec<StreamEntry>> {
        let mut entries = self.read_group(after_id, false).await?;
        let (start, end) = match (entries.first(), entries.last()) {
            (Some(first), Some(last)) => (first.id.clone(), last.id.clone()),
            _ => return Ok(entries),
        };

        let mut conn = self.conn.clone();
        let reply: StreamPendingCountReply = conn
            .xpending_consumer_count(
                &self.config.stream_name,
                &self.config.consumer_group,
                start,
                end,
                entries.len(),
                &self.config.consumer_name,
            )
            .await?;
        let counts: HashMap<String, u64> = reply
            .ids
            .into_iter()
            .map(|pending| (pending.id, pending.times_delivered as u64))
            .collect();

        for entry in &mut entries {
            if let Some(count) = counts.get(&entry.id) {
                entry.delivery_count = *count;
            }
        }
        Ok(entries)
    }

    async fn read_new(&self) -> Result<Vec<StreamEntry>> {
        self.read_group(">", true).await
    }

    async fn ack(&self, entry_id: &str) -> Result<()> {
        let mut conn = self.conn.clone();
        let _: i64 = conn
            .xack(
                &self.config.stream_name,
                &self.config.consumer_group,
                &[entry_id],
            )
            .await?;
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BatchOutcome {
    pub received: usize,
    pub succeeded: usize,
    pub failed: usize,
    pub acked: usize,
    /// Failed entries acknowledged because they hit the delivery cap.
    pub dropped: usize,
}

impl BatchOutcome {
    fn merge(&mut self, other: BatchOutcome) {
        self.received += other.received;
        self.succeeded += other.succeeded;
        self.failed += other.failed;
        self.acked += other.acked;
        self.dropped += other.dropped;
    }
}

pub struct JobStreamConsumer {
    stream: Arc<dyn JobEventStream>,
    processor: JobSyncProcessor,
    ack_on_failure: bool,
    max_deliveries: u64,
    retry_backoff: Duration,
}

impl JobStreamConsumer {
    pub fn new(
        stream: Arc<dyn JobEventStream>,
        processor: JobSyncProcessor,
        ack_on_failure: bool,
    ) -> Self {
        Self {
            stream,
            processor,
            ack_on_failure,
            max_deliveries: DEFAULT_MAX_DELIVERIES,
            retry_backoff: RETRY_BACKOFF,
        }
    }

    /// 0 keeps failing entries pending forever.
    pub fn with_max_deliveries(mut self, max_deliveries: u64) -> Self {
        self.max_deliveries = max_deliveries;
        self
    }

    fn exhausted(&self, entry: &StreamEntry) -> bool {
        self.max_deliveries > 0 && entry.delivery_count >= self.max_deliveries
    }

    pub fn with_retry_backoff(mut self, backoff: Duration) -> Self {
        self.retry_backoff = backoff;
        self
    }

    /// Processes entries in order. Ack failures are logged and leave the
    /// entry pending.
    pub async fn process_batch(&self, entries: Vec<StreamEntry>) -> BatchOutcome {
        let mut outcome = BatchOutcome {
            received: entries.len(),
            ..BatchOutcome::default()
        };

        for entry in entries {
            let result = self.processor.process_stream_message(&entry.fields).await;
            let success = result.is_success();
            let mut drop_entry = false;
            if success {
                outcome.succeeded += 1;
                debug!(entry_id = %entry.id, ?result, "Processed stream entry");
            } else {
                outcome.failed += 1;
                drop_entry = !self.ack_on_failure && self.exhausted(&entry);
                error!(
                    entry_id = %entry.id,
                    delivery_count = entry.delivery_count,
                    error = result.error.as_deref().unwrap_or_default(),
                    event_type = entry.fields.get("eventType").map(String::as_str).unwrap_or_default(),
                    "Failed to process stream entry"
                );
                if drop_entry {
                    error!(
                        entry_id = %entry.id,
                        max_deliveries = self.max_deliveries,
                        "Dropping stream entry after repeated failures"
                    );
                }
            }

            if success || self.ack_on_failure || drop_entry {
                match self.stream.ack(&entry.id).await {
                    Ok(()) => {
                        outcome.acked += 1;
                        if drop_entry {
                            outcome.dropped += 1;
                        }
                    }
                    Err(e) => warn!(entry_id = %entry.id, error = %e, "Failed to ack stream entry"),
                }
            }
        }

        outcome
    }

    /// Re-delivers entries this consumer read before but never acknowledged.
    pub async fn replay_pending(&self) -> Result<BatchOutcome> {
        let mut total = BatchOutcome::default();
        let mut after = "0".to_string();
        loop {
            let entries = self.stream.read_pending(&after).await?;
            let Some(last) = entries.last() else { break };
            after = last.id.clone();
            total.merge(self.process_batch(entries).await);
        }
        if total.received > 0 {
            info!(
                received = total.received,
                failed = total.failed,
                dropped = total.dropped,
                "Replayed pending stream entries"
            );
        }
        Ok(total)
    }

    pub async fn poll_once(&self) -> Result<BatchOutcome> {
        let entries = self.stream.read_new().await?;
        if entries.is_empty() {
            return Ok(BatchOutcome::default());
        }
        let outcome = self.process_batch(entries).await;
        info!(
            received = outcome.received,
            succeeded = outcome.succeeded,
            failed = outcome.failed,
            "Processed stream batch"
        );
        Ok(outcome)
    }

    /// Runs until `shutdown` flips to true or its sender is dropped.
    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) -> Result<()> {
        self.stream.ensure_group().await?;
        info!("Job stream consumer started");

        if let Err(e) = self.replay_pending().await {
            warn!(error = %e, "Pending replay failed");
        }

        loop {
            if *shutdown.borrow() {
                break;
            }
            tokio::select! {
                _ = shutdown.changed() => break,
                polled = self.poll_once() => {
                    if let Err(e) = polled {
                        error!(error = %e, backoff_secs = self.retry_backoff.as_secs(), "Stream read failed");
                        tokio::select! {
                            _ = shutdown.changed() => break,
                            _ = tokio::time::sleep(self.retry_backoff) => {}
                        }
                    }
                }
            }
        }

        info!("Job stream consumer stopped");
        Ok(())
    }
}
