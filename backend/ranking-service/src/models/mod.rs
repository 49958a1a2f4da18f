mod filters;
mod interactions;

pub use filters::{DateWindow, ExpiryPolicy, FilterSpec};
pub use interactions::{InteractionEntries, InteractionLog, InteractionType, LenientTimestamp};

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

/// Fixed-dimension embedding; empty means "unavailable".
pub type DenseVector = Vec<f32>;

/// Sparse term-index -> weight embedding.
pub type SparseVector = BTreeMap<u32, f32>;

/// Output of the embedding model for a batch of texts.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Embeddings {
    #[serde(default)]
    pub dense: Vec<DenseVector>,
    #[serde(default)]
    pub sparse: Vec<SparseVector>,
}

impl Embeddings {
    pub fn dense_at(&self, index: usize) -> DenseVector {
        self.dense.get(index).cloned().unwrap_or_default()
    }

    pub fn sparse_at(&self, index: usize) -> SparseVector {
        self.sparse.get(index).cloned().unwrap_or_default()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Preferences {
    pub remote: Option<bool>,
    pub relocation: Option<bool>,
}

/// Caller-owned profile snapshot for one request.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct UserProfile {
    pub id: Option<i64>,
    pub skills: BTreeSet<String>,
    pub education: Option<String>,
    pub location: Option<String>,
    pub preferences: Preferences,
}

/// A `(job_id, score)` pair produced by one of the ranking strategies.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RecommendationCandidate {
    pub job_id: i64,
    pub score: f32,
}

impl RecommendationCandidate {
    pub fn new(job_id: i64, score: f32) -> Self {
        Self { job_id, score }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecommendationSource {
    Vector,        // user-vector similarity against the job index
    Collaborative, // latent-factor exploration ranker
    Popular,       // popularity fallback
}

impl RecommendationSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            RecommendationSource::Vector => "vector",
            RecommendationSource::Collaborative => "collaborative",
            RecommendationSource::Popular => "popular",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Recommendation {
    pub job_id: i64,
    pub score: f32,
    pub source: RecommendationSource,
}

/// Stored job fields returned alongside index hits.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct JobSearchDocument {
    pub title: String,
    pub company: String,
    pub job_role: String,
    pub seniority: String,
    pub min_experience_years: i64,
    pub work_mode: String,
    pub salary_min: i64,
    pub salary_max: i64,
    pub currency: String,
    pub status: String,
    pub date_posted: i64,
    pub date_expires: i64,
    pub skills: Vec<String>,
    pub location: String,
}

/// One ranked hit from the vector index. `score` is `None` when the index
/// returned no distance for the hit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndexHit {
    pub id: i64,
    pub score: Option<f32>,
    #[serde(default)]
    pub document: Option<JobSearchDocument>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaginationInfo {
    pub limit: usize,
    pub offset: usize,
    pub count: usize,
    pub has_next: bool,
    pub has_prev: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchRequest {
    pub query: String,
    pub limit: Option<usize>,
    #[serde(default)]
    pub offset: usize,
    #[serde(default)]
    pub filters: Option<FilterSpec>,
}

impl SearchRequest {
    pub fn new(query: impl Into<String>) -> Self {
        Self {
            query: query.into(),
            limit: None,
            offset: 0,
            filters: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchResponse {
    pub job_ids: Vec<i64>,
    pub hits: Vec<IndexHit>,
    pub pagination: PaginationInfo,
}
