//! In-memory collaborators for integration tests.
//!
//! Each fake records what it was asked to do so tests can assert on the
//! queries the services built, not just on their results.

#![allow(dead_code)]

use async_trait::async_trait;
use job_ranking_service::clients::{
    DenseQuery, EmbeddingClient, HybridQuery, JobRecord, PopularityStore, VectorCache, VectorIndex,
};
use job_ranking_service::config::{DecayConfig, RecommendConfig, SynthesisConfig};
use job_ranking_service::models::{
    DenseVector, Embeddings, IndexHit, RecommendationCandidate, SparseVector,
};
use job_ranking_service::services::exploration::CfModelStore;
use job_ranking_service::{
    AppError, InteractionDecayEngine, RecommendationService, Result, UserVectorSynthesizer,
};
use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

pub const DIM: usize = 2;

// ============================================
// Embedding model
// ============================================

/// Returns the same dense vector for every text.
pub struct StaticEmbedder {
    dense: DenseVector,
    pub calls: AtomicUsize,
    pub texts: Mutex<Vec<String>>,
    fail: AtomicBool,
}

impl StaticEmbedder {
    pub fn new(dense: DenseVector) -> Self {
        Self {
            dense,
            calls: AtomicUsize::new(0),
            texts: Mutex::new(Vec::new()),
            fail: AtomicBool::new(false),
        }
    }

    pub fn failing() -> Self {
        let embedder = Self::new(vec![1.0, 0.0]);
        embedder.fail.store(true, Ordering::SeqCst);
        embedder
    }
}

#[async_trait]
impl EmbeddingClient for StaticEmbedder {
    async fn embed(&self, texts: &[String]) -> Result<Embeddings> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.texts.lock().unwrap().extend_from_slice(texts);
        if self.fail.load(Ordering::SeqCst) {
            return Err(AppError::Embedding("model unavailable".to_string()));
        }
        let sparse: SparseVector = BTreeMap::from([(7, 0.5)]);
        Ok(Embeddings {
            dense: texts.iter().map(|_| self.dense.clone()).collect(),
            sparse: texts.iter().map(|_| sparse.clone()).collect(),
        })
    }
}

// ============================================
// Vector index
// ============================================

#[derive(Default)]
pub struct InMemoryIndex {
    pub jobs: Mutex<BTreeMap<i64, JobRecord>>,
    pub user_vectors: Mutex<HashMap<i64, DenseVector>>,
    /// Returned verbatim by `hybrid_search`.
    pub hybrid_hits: Mutex<Vec<IndexHit>>,
    pub last_dense: Mutex<Option<DenseQuery>>,
    pub last_hybrid: Mutex<Option<HybridQuery>>,
    pub fail_searches: AtomicBool,
}

impl InMemoryIndex {
    pub fn with_jobs(jobs: &[(i64, DenseVector)]) -> Self {
        let index = Self::default();
        {
            let mut stored = index.jobs.lock().unwrap();
            for (id, dense) in jobs {
                stored.insert(
                    *id,
                    JobRecord {
                        id: *id,
                        dense: dense.clone(),
                        sparse: SparseVector::new(),
                        document: Default::default(),
                    },
                );
            }
        }
        index
    }

    pub fn set_hybrid_hits(&self, hits: Vec<IndexHit>) {
        *self.hybrid_hits.lock().unwrap() = hits;
    }

    pub fn fail_searches(&self) {
        self.fail_searches.store(true, Ordering::SeqCst);
    }

    fn check_available(&self) -> Result<()> {
        if self.fail_searches.load(Ordering::SeqCst) {
            Err(AppError::VectorIndex("index unavailable".to_string()))
        } else {
            Ok(())
        }
    }
}

fn dot(a: &[f32], b: &[f32]) -> f32 {
    a.iter().zip(b).map(|(x, y)| x * y).sum()
}

#[async_trait]
impl VectorIndex for InMemoryIndex {
    async fn upsert_user_vector(&self, user_id: i64, vector: &[f32]) -> Result<()> {
        self.user_vectors
            .lock()
            .unwrap()
            .insert(user_id, vector.to_vec());
        Ok(())
    }

    async fn get_job_vector(&self, job_id: i64) -> Result<Option<DenseVector>> {
        Ok(self
            .jobs
            .lock()
            .unwrap()
            .get(&job_id)
            .map(|job| job.dense.clone()))
    }

    async fn hybrid_search(&self, query: &HybridQuery) -> Result<Vec<IndexHit>> {
        *self.last_hybrid.lock().unwrap() = Some(query.clone());
        self.check_available()?;
        Ok(self.hybrid_hits.lock().unwrap().clone())
    }

    /// Ranks every stored job by inner product; the predicate is recorded
    /// but not evaluated.
    async fn dense_search(&self, query: &DenseQuery) -> Result<Vec<IndexHit>> {
        *self.last_dense.lock().unwrap() = Some(query.clone());
        self.check_available()?;

        let mut hits: Vec<IndexHit> = self
            .jobs
            .lock()
            .unwrap()
            .values()
            .map(|job| IndexHit {
                id: job.id,
                score: Some(dot(&query.vector, &job.dense)),
                document: Some(job.document.clone()),
            })
            .collect();
        hits.sort_by(|a, b| {
            b.score
                .unwrap_or(f32::MIN)
                .total_cmp(&a.score.unwrap_or(f32::MIN))
        });
        hits.truncate(query.limit);
        Ok(hits)
    }

    async fn upsert_jobs(&self, jobs: &[JobRecord]) -> Result<usize> {
        let mut stored = self.jobs.lock().unwrap();
        for job in jobs {
            stored.insert(job.id, job.clone());
        }
        Ok(jobs.len())
    }

    async fn delete_jobs(&self, job_ids: &[i64]) -> Result<usize> {
        let mut stored = self.jobs.lock().unwrap();
        Ok(job_ids
            .iter()
            .filter(|id| stored.remove(id).is_some())
            .count())
    }
}

// ============================================
// Cache and popularity
// ============================================

#[derive(Default)]
pub struct MemoryCache {
    pub entries: Mutex<HashMap<String, Vec<u8>>>,
    pub ttls: Mutex<HashMap<String, Duration>>,
    pub fail: AtomicBool,
}

impl MemoryCache {
    fn check_available(&self) -> Result<()> {
        if self.fail.load(Ordering::SeqCst) {
            Err(AppError::Cache("connection refused".to_string()))
        } else {
            Ok(())
        }
    }
}

#[async_trait]
impl VectorCache for MemoryCache {
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>> {
        self.check_available()?;
        Ok(self.entries.lock().unwrap().get(key).cloned())
    }

    async fn set_with_ttl(&self, key: &str, value: &[u8], ttl: Duration) -> Result<()> {
        self.check_available()?;
        self.entries
            .lock()
            .unwrap()
            .insert(key.to_string(), value.to_vec());
        self.ttls.lock().unwrap().insert(key.to_string(), ttl);
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<()> {
        self.check_available()?;
        self.entries.lock().unwrap().remove(key);
        Ok(())
    }
}

pub struct StaticPopularity {
    items: Vec<RecommendationCandidate>,
    fail: bool,
}

impl StaticPopularity {
    pub fn new(items: &[(i64, f32)]) -> Self {
        Self {
            items: items
                .iter()
                .map(|(id, score)| RecommendationCandidate::new(*id, *score))
                .collect(),
            fail: false,
        }
    }

    pub fn failing() -> Self {
        Self {
            items: Vec::new(),
            fail: true,
        }
    }
}

#[async_trait]
impl PopularityStore for StaticPopularity {
    async fn top_popular(&self, limit: usize) -> Result<Vec<RecommendationCandidate>> {
        if self.fail {
            return Err(AppError::Redis("popular set unavailable".to_string()));
        }
        Ok(self.items.iter().take(limit).copied().collect())
    }
}

// ============================================
// Service wiring
// ============================================

pub struct Harness {
    pub embedder: Arc<StaticEmbedder>,
    pub index: Arc<InMemoryIndex>,
    pub cache: Arc<MemoryCache>,
}

impl Harness {
    pub fn new(embedder: StaticEmbedder, index: InMemoryIndex) -> Self {
        Self {
            embedder: Arc::new(embedder),
            index: Arc::new(index),
            cache: Arc::new(MemoryCache::default()),
        }
    }

    pub fn synthesizer(&self) -> UserVectorSynthesizer {
        let decay = InteractionDecayEngine::new(self.index.clone(), DecayConfig::default());
        UserVectorSynthesizer::new(
            self.embedder.clone(),
            self.index.clone(),
            self.cache.clone(),
            decay,
            SynthesisConfig {
                dense_dim: DIM,
                short_term_ttl: Duration::from_secs(600),
            },
        )
    }

    pub fn recommendations(
        &self,
        popularity: StaticPopularity,
        cf_models: CfModelStore,
    ) -> RecommendationService {
        RecommendationService::new(
            self.synthesizer(),
            self.index.clone(),
            Arc::new(popularity),
            Arc::new(cf_models),
            RecommendConfig {
                max_top_k: 5,
                exclude_interacted: true,
            },
        )
    }
}
