//! Collaborator boundaries: the embedding model, the vector index and the
//! Redis-backed cache / popularity store.

mod embedding;
mod milvus;
mod redis_store;

pub use embedding::HttpEmbeddingClient;
pub use milvus::MilvusClient;
pub use redis_store::RedisStore;

use crate::error::Result;
use crate::models::{
    DenseVector, Embeddings, IndexHit, JobSearchDocument, RecommendationCandidate, SparseVector,
};
use async_trait::async_trait;
use std::time::Duration;

/// Maps text to dense + sparse embeddings.
#[async_trait]
pub trait EmbeddingClient: Send + Sync {
    async fn embed(&self, texts: &[String]) -> Result<Embeddings>;
}

/// Two ANN subqueries (dense/cosine and sparse/inner-product) fused by a
/// weighted reranker.
#[derive(Debug, Clone, PartialEq)]
pub struct HybridQuery {
    pub dense: DenseVector,
    pub sparse: SparseVector,
    pub filter: String,
    /// Top-N requested from each subquery before fusion.
    pub subquery_limit: usize,
    /// Number of fused hits to return.
    pub limit: usize,
    /// Number of fused hits to skip.
    pub offset: usize,
    pub dense_weight: f32,
    pub sparse_weight: f32,
}

#[derive(Debug, Clone, PartialEq)]
pub struct DenseQuery {
    pub vector: DenseVector,
    pub filter: String,
    pub limit: usize,
}

/// A job row as written to the index by the sync pipeline.
#[derive(Debug, Clone, PartialEq)]
pub struct JobRecord {
    pub id: i64,
    pub dense: DenseVector,
    pub sparse: SparseVector,
    pub document: JobSearchDocument,
}

#[async_trait]
pub trait VectorIndex: Send + Sync {
    async fn upsert_user_vector(&self, user_id: i64, vector: &[f32]) -> Result<()>;

    /// `Ok(None)` when the job has no stored vector.
    async fn get_job_vector(&self, job_id: i64) -> Result<Option<DenseVector>>;

    async fn hybrid_search(&self, query: &HybridQuery) -> Result<Vec<IndexHit>>;

    async fn dense_search(&self, query: &DenseQuery) -> Result<Vec<IndexHit>>;

    /// Returns the number of rows written.
    async fn upsert_jobs(&self, jobs: &[JobRecord]) -> Result<usize>;

    /// Returns the number of rows removed.
    async fn delete_jobs(&self, job_ids: &[i64]) -> Result<usize>;
}

/// Short-lived key/value store for derived user vectors.
#[async_trait]
pub trait VectorCache: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>>;

    async fn set_with_ttl(&self, key: &str, value: &[u8], ttl: Duration) -> Result<()>;

    async fn delete(&self, key: &str) -> Result<()>;
}

/// Globally popular jobs, used when personalised ranking is unavailable.
#[async_trait]
pub trait PopularityStore: Send + Sync {
    async fn top_popular(&self, limit: usize) -> Result<Vec<RecommendationCandidate>>;
}
