use crate::error::{AppError, Result};
use crate::models::InteractionType;
use serde::Deserialize;
use std::collections::HashMap;
use std::time::Duration;
use tracing::warn;

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    // Collaborators
    pub redis_url: String,
    pub milvus_url: String,
    pub milvus_token: Option<String>,
    pub jobs_collection: String,
    pub users_collection: String,
    pub embedding_url: String,
    pub http_timeout_seconds: u64,

    // User vector synthesis
    pub dense_dim: usize,
    pub interaction_half_life_days: f64,
    /// JSON object overriding the default interaction weight table.
    pub interaction_weights: Option<String>,
    pub short_term_cache_ttl_seconds: u64,

    // Hybrid search
    pub search_score_threshold: f32,
    pub search_dense_weight: f32,
    pub search_sparse_weight: f32,
    pub search_default_limit: usize,
    pub search_max_limit: usize,

    // Recommendation
    pub cf_model_path: Option<String>,
    pub popular_jobs_key: String,
    pub recommend_max_top_k: usize,

    // Job sync worker
    pub sync_stream_name: String,
    pub sync_consumer_group: String,
    pub sync_consumer_name: Option<String>,
    pub sync_batch_size: usize,
    pub sync_block_ms: u64,
    pub sync_ack_on_failure: bool,
    /// Deliveries after which a failing entry is acknowledged and dropped; 0 retries forever.
    pub sync_max_deliveries: u64,
}

impl Config {
    pub fn from_env() -> std::result::Result<Self, config::ConfigError> {
        dotenvy::dotenv().ok();

        let config = config::Config::builder()
            .set_default("redis_url", "redis://localhost:6379")?
            .set_default("milvus_url", "http://localhost:19530")?
            .set_default("jobs_collection", "jobs")?
            .set_default("users_collection", "users")?
            .set_default("embedding_url", "http://localhost:8088")?
            .set_default("http_timeout_seconds", 30)?
            .set_default("dense_dim", 1024)? // BGE-M3
            .set_default("interaction_half_life_days", 30.0)?
            .set_default("short_term_cache_ttl_seconds", 3600)? // 1 hour
            .set_default("search_score_threshold", 0.0)?
            .set_default("search_dense_weight", 0.4)?
            .set_default("search_sparse_weight", 0.6)?
            .set_default("search_default_limit", 10)?
            .set_default("search_max_limit", 100)?
            .set_default("popular_jobs_key", "jobs:popular")?
            .set_default("recommend_max_top_k", 100)?
            .set_default("sync_stream_name", "job_outbox")?
            .set_default("sync_consumer_group", "job-ranking-sync")?
            .set_default("sync_batch_size", 10)?
            .set_default("sync_block_ms", 5000)?
            .set_default("sync_ack_on_failure", false)?
            .set_default("sync_max_deliveries", 5)?
            .add_source(config::Environment::default().try_parsing(true))
            .build()?;

        config.try_deserialize()
    }

    pub fn validate(&self) -> Result<()> {
        if self.dense_dim == 0 {
            return Err(AppError::Configuration(
                "dense_dim must be greater than 0".to_string(),
            ));
        }

        if !(self.interaction_half_life_days.is_finite() && self.interaction_half_life_days > 0.0) {
            return Err(AppError::Configuration(
                "interaction_half_life_days must be a positive number".to_string(),
            ));
        }

        if !self.search_dense_weight.is_finite() || !self.search_sparse_weight.is_finite() {
            return Err(AppError::Configuration(
                "search weights must be finite".to_string(),
            ));
        }

        if self.search_default_limit == 0 || self.search_default_limit > self.search_max_limit {
            return Err(AppError::Configuration(
                "search_default_limit must be between 1 and search_max_limit".to_string(),
            ));
        }

        if self.redis_url.is_empty() || self.milvus_url.is_empty() || self.embedding_url.is_empty() {
            return Err(AppError::Configuration(
                "redis_url, milvus_url and embedding_url are required".to_string(),
            ));
        }

        if self.sync_batch_size == 0 {
            return Err(AppError::Configuration(
                "sync_batch_size must be greater than 0".to_string(),
            ));
        }

        self.decay_config().map(|_| ())
    }

    pub fn http_timeout(&self) -> Duration {
        Duration::from_secs(self.http_timeout_seconds)
    }

    pub fn decay_config(&self) -> Result<DecayConfig> {
        let mut decay = DecayConfig {
            half_life_days: self.interaction_half_life_days,
            ..DecayConfig::default()
        };

        if let Some(raw) = self.interaction_weights.as_deref() {
            let overrides: HashMap<String, f32> = serde_json::from_str(raw).map_err(|e| {
                AppError::Configuration(format!("interaction_weights is not valid JSON: {}", e))
            })?;
            for (key, weight) in overrides {
                match InteractionType::parse(&key) {
                    Some(kind) => {
                        decay.weights.insert(kind, weight);
                    }
                    None => warn!(key = %key, "Ignoring weight for unknown interaction type"),
                }
            }
        }

        Ok(decay)
    }

    pub fn synthesis_config(&self) -> SynthesisConfig {
        SynthesisConfig {
            dense_dim: self.dense_dim,
            short_term_ttl: Duration::from_secs(self.short_term_cache_ttl_seconds),
        }
    }

    pub fn search_config(&self) -> SearchConfig {
        SearchConfig {
            dense_weight: self.search_dense_weight,
            sparse_weight: self.search_sparse_weight,
            score_threshold: self.search_score_threshold,
            default_limit: self.search_default_limit,
            max_limit: self.search_max_limit,
        }
    }

    pub fn recommend_config(&self) -> RecommendConfig {
        RecommendConfig {
            max_top_k: self.recommend_max_top_k.max(1),
            ..RecommendConfig::default()
        }
    }

    pub fn exploration_defaults(&self) -> ExplorationDefaults {
        ExplorationDefaults::default()
    }

    pub fn sync_config(&self) -> SyncConfig {
        SyncConfig {
            stream_name: self.sync_stream_name.clone(),
            consumer_group: self.sync_consumer_group.clone(),
            consumer_name: self
                .sync_consumer_name
                .clone()
                .unwrap_or_else(|| format!("worker-{}", uuid::Uuid::new_v4())),
            batch_size: self.sync_batch_size,
            block_ms: self.sync_block_ms,
            ack_on_failure: self.sync_ack_on_failure,
            max_deliveries: self.sync_max_deliveries,
        }
    }
}

/// Weight table and half-life for the interaction decay engine.
#[derive(Debug, Clone)]
pub struct DecayConfig {
    pub half_life_days: f64,
    pub weights: HashMap<InteractionType, f32>,
}

impl Default for DecayConfig {
    fn default() -> Self {
        let weights = HashMap::from([
            (InteractionType::Apply, 1.0),
            (InteractionType::Save, 0.8),
            (InteractionType::Click, 0.3),
            (InteractionType::ClickFromSimilar, 0.4),
            (InteractionType::ClickFromRecommended, 0.5),
            (InteractionType::ClickFromSearch, 0.5),
            (InteractionType::SkipFromSimilar, -0.2),
            (InteractionType::SkipFromRecommended, -0.3),
            (InteractionType::SkipFromSearch, -0.1),
        ]);

        Self {
            half_life_days: 30.0,
            weights,
        }
    }
}

impl DecayConfig {
    pub fn weight_for(&self, kind: InteractionType) -> Option<f32> {
        self.weights.get(&kind).copied()
    }
}

#[derive(Debug, Clone)]
pub struct SynthesisConfig {
    pub dense_dim: usize,
    pub short_term_ttl: Duration,
}

impl Default for SynthesisConfig {
    fn default() -> Self {
        Self {
            dense_dim: 1024,
            short_term_ttl: Duration::from_secs(3600),
        }
    }
}

#[derive(Debug, Clone)]
pub struct SearchConfig {
    pub dense_weight: f32,
    pub sparse_weight: f32,
    pub score_threshold: f32,
    pub default_limit: usize,
    pub max_limit: usize,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            dense_weight: 0.4,
            sparse_weight: 0.6,
            score_threshold: 0.0,
            default_limit: 10,
            max_limit: 100,
        }
    }
}

#[derive(Debug, Clone)]
pub struct RecommendConfig {
    pub max_top_k: usize,
    /// Keep jobs the user already interacted with out of vector results.
    pub exclude_interacted: bool,
}

impl Default for RecommendConfig {
    fn default() -> Self {
        Self {
            max_top_k: 100,
            exclude_interacted: true,
        }
    }
}

/// Parameters used when a caller picks an exploration strategy without
/// supplying its tuning value.
#[derive(Debug, Clone, Copy)]
pub struct ExplorationDefaults {
    pub epsilon: f64,
    pub noise_scale: f64,
    pub diversity_weight: f64,
    pub filter_seen: bool,
}

impl Default for ExplorationDefaults {
    fn default() -> Self {
        Self {
            epsilon: 0.15,
            noise_scale: 0.1,
            diversity_weight: 0.3,
            filter_seen: true,
        }
    }
}

#[derive(Debug, Clone)]
pub struct SyncConfig {
    pub stream_name: String,
    pub consumer_group: String,
    pub consumer_name: String,
    pub batch_size: usize,
    pub block_ms: u64,
    /// Acknowledge messages whose processing failed instead of leaving them pending.
    pub ack_on_failure: bool,
    pub max_deliveries: u64,
}
