use super::job_document::JobDocument;
use crate::clients::{EmbeddingClient, JobRecord, VectorIndex};
use crate::error::{AppError, Result};
use serde::Serialize;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// What a job event asks the index to do.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobEventKind {
    Upsert,
    Delete,
    Ignored,
}

impl JobEventKind {
    pub fn classify(event_type: &str) -> Self {
        match event_type.trim().to_ascii_uppercase().as_str() {
            "JOB_CREATED" | "JOB_UPDATED" | "JOB_PUBLISHED" => JobEventKind::Upsert,
            "JOB_DELETED" | "JOB_CLOSED" | "JOB_EXPIRED" => JobEventKind::Delete,
            _ => JobEventKind::Ignored,
        }
    }
}

/// One transactional-outbox event as carried in a stream entry.
#[derive(Debug, Clone, PartialEq)]
pub struct OutboxMessage {
    pub id: String,
    pub aggregate_type: String,
    pub aggregate_id: String,
    pub event_type: String,
    /// JSON-encoded job (or list of jobs).
    pub payload: String,
    pub occurred_at: String,
    pub trace_id: String,
    pub attempts: u32,
}

impl OutboxMessage {
    pub fn from_fields(fields: &HashMap<String, String>) -> Result<Self> {
        let get = |key: &str| fields.get(key).cloned().unwrap_or_default();

        let event_type = get("eventType");
        if event_type.trim().is_empty() {
            return Err(AppError::Validation(
                "outbox message has no eventType".to_string(),
            ));
        }

        Ok(Self {
            id: get("id"),
            aggregate_type: get("aggregateType"),
            aggregate_id: get("aggregateId"),
            event_type,
            payload: get("payload"),
            occurred_at: get("occurredAt"),
            trace_id: get("traceId"),
            attempts: fields
                .get("attempts")
                .and_then(|a| a.trim().parse().ok())
                .unwrap_or(0),
        })
    }

    pub fn kind(&self) -> JobEventKind {
        JobEventKind::classify(&self.event_type)
    }

    fn aggregate_job_id(&self) -> Option<i64> {
        self.aggregate_id.trim().parse().ok()
    }

    fn payload_value(&self) -> Result<Value> {
        if self.payload.trim().is_empty() {
            return Ok(Value::Null);
        }
        Ok(serde_json::from_str(&self.payload)?)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SyncResult {
    pub processed: usize,
    pub inserted: usize,
    pub deleted: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl SyncResult {
    pub fn failed(error: impl Into<String>) -> Self {
        Self {
            error: Some(error.into()),
            ..Self::default()
        }
    }

    pub fn is_success(&self) -> bool {
        self.error.is_none()
    }
}

/// Applies job outbox events to the vector index.
pub struct JobSyncProcessor {
    embedder: Arc<dyn EmbeddingClient>,
    index: Arc<dyn VectorIndex>,
}

impl JobSyncProcessor {
    pub fn new(embedder: Arc<dyn EmbeddingClient>, index: Arc<dyn VectorIndex>) -> Self {
        Self { embedder, index }
    }

    /// Handles raw stream fields. Failures are reported in
    /// [`SyncResult::error`] instead of being returned.
    pub async fn process_stream_message(&self, fields: &HashMap<String, String>) -> SyncResult {
        let message = match OutboxMessage::from_fields(fields) {
            Ok(message) => message,
            Err(e) => return SyncResult::failed(e.to_string()),
        };
        match self.process_message(&message).await {
            Ok(result) => result,
            Err(e) => {
                warn!(
                    message_id = %message.id,
                    event_type = %message.event_type,
                    trace_id = %message.trace_id,
                    error = %e,
                    "Job sync failed"
                );
                SyncResult::failed(e.to_string())
            }
        }
    }

    pub async fn process_message(&self, message: &OutboxMessage) -> Result<SyncResult> {
        match message.kind() {
            JobEventKind::Upsert => {
                let jobs = Self::jobs_from_message(message)?;
                let inserted = self.upsert_jobs(&jobs).await?;
                info!(
                    event_type = %message.event_type,
                    aggregate_id = %message.aggregate_id,
                    inserted,
                    "Jobs upserted"
                );
                Ok(SyncResult {
                    processed: jobs.len(),
                    inserted,
                    ..SyncResult::default()
                })
            }
            JobEventKind::Delete => {
                let ids = Self::ids_from_message(message)?;
                let deleted = self.delete_jobs(&ids).await?;
                info!(
                    event_type = %message.event_type,
                    aggregate_id = %message.aggregate_id,
                    deleted,
                    "Jobs deleted"
                );
                Ok(SyncResult {
                    processed: ids.len(),
                    deleted,
                    ..SyncResult::default()
                })
            }
            JobEventKind::Ignored => {
                debug!(event_type = %message.event_type, "Skipping unsupported event type");
                Ok(SyncResult::default())
            }
        }
    }

    fn jobs_from_message(message: &OutboxMessage) -> Result<Vec<JobDocument>> {
        let fallback_id = message.aggregate_job_id();
        match message.payload_value()? {
            Value::Array(items) => items
                .iter()
                .map(|item| JobDocument::from_payload(item, None))
                .collect(),
            Value::Null => Err(AppError::Validation(format!(
                "{} event has no payload",
                message.event_type
            ))),
            value => Ok(vec![JobDocument::from_payload(&value, fallback_id)?]),
        }
    }

    fn ids_from_message(message: &OutboxMessage) -> Result<Vec<i64>> {
        if let Some(id) = message.aggregate_job_id() {
            return Ok(vec![id]);
        }
        let payload_id = match message.payload_value()? {
            Value::Object(obj) => obj.get("id").and_then(|id| match id {
                Value::Number(n) => n.as_i64(),
                Value::String(s) => s.trim().parse().ok(),
                _ => None,
            }),
            _ => None,
        };
        payload_id.map(|id| vec![id]).ok_or_else(|| {
            AppError::Validation(format!("{} event carries no job id", message.event_type))
        })
    }

    /// Embeds the combined text of every job in one batch and writes them.
    pub async fn upsert_jobs(&self, jobs: &[JobDocument]) -> Result<usize> {
        if jobs.is_empty() {
            return Ok(0);
        }

        let texts: Vec<String> = jobs.iter().map(JobDocument::combined_text).collect();
        let embeddings = self.embedder.embed(&texts).await?;
        if embeddings.dense.len() < jobs.len() {
            return Err(AppError::Embedding(format!(
                "expected {} dense vectors, got {}",
                jobs.len(),
                embeddings.dense.len()
            )));
        }

        let records: Vec<JobRecord> = jobs
            .iter()
            .enumerate()
            .map(|(i, job)| JobRecord {
                id: job.id,
                dense: embeddings.dense_at(i),
                sparse: embeddings.sparse_at(i),
                document: job.fields.clone(),
            })
            .collect();

        self.index.upsert_jobs(&records).await
    }

    pub async fn delete_jobs(&self, job_ids: &[i64]) -> Result<usize> {
        self.index.delete_jobs(job_ids).await
    }
}
