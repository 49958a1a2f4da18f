//! Keeps the job collection of the vector index in step with the job
//! service's transactional outbox, delivered over a Redis stream.

mod consumer;
mod job_document;
mod processor;

pub use consumer::{BatchOutcome, JobEventStream, JobStreamConsumer, RedisJobStream, StreamEntry};
pub use job_document::{clean_text, extract_skill_names, parse_timestamp_ms, JobDocument};
pub use processor::{JobEventKind, JobSyncProcessor, OutboxMessage, SyncResult};
