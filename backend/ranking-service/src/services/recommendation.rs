use super::exploration::{CfModelStore, ExplorationStrategy};
use super::search::FilterBuilder;
use super::user_vector::UserVectorSynthesizer;
use super::vector_blend::VectorBlender;
use crate::clients::{DenseQuery, PopularityStore, VectorIndex};
use crate::config::RecommendConfig;
use crate::error::Result;
use crate::models::{
    FilterSpec, InteractionLog, Recommendation, RecommendationCandidate, RecommendationSource,
    UserProfile,
};
use chrono::Utc;
use rand::rngs::StdRng;
use rand::SeedableRng;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, warn};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum RecommendMode {
    /// User-vector similarity against the job index.
    Vector,
    /// Latent-factor ranking; no strategy means adaptive selection.
    Collaborative {
        #[serde(default)]
        strategy: Option<ExplorationStrategy>,
        #[serde(default)]
        seed: Option<u64>,
    },
}

impl Default for RecommendMode {
    fn default() -> Self {
        RecommendMode::Vector
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecommendRequest {
    pub user_id: i64,
    #[serde(default)]
    pub profile: Option<UserProfile>,
    #[serde(default)]
    pub interactions: InteractionLog,
    pub top_k: usize,
    #[serde(default)]
    pub filters: Option<FilterSpec>,
    #[serde(default)]
    pub mode: RecommendMode,
}

impl RecommendRequest {
    pub fn new(user_id: i64, top_k: usize) -> Self {
        Self {
            user_id,
            profile: None,
            interactions: InteractionLog::default(),
            top_k,
            filters: None,
            mode: RecommendMode::default(),
        }
    }
}

fn tag(candidates: Vec<RecommendationCandidate>, source: RecommendationSource) -> Vec<Recommendation> {
    candidates
        .into_iter()
        .map(|c| Recommendation {
            job_id: c.job_id,
            score: c.score,
            source,
        })
        .collect()
}

/// Caller-facing recommendations.
///
/// Never fails: personalised ranking degrades to the popularity list, and
/// that degrades to an empty list.
pub struct RecommendationService {
    synthesizer: UserVectorSynthesizer,
    index: Arc<dyn VectorIndex>,
    popularity: Arc<dyn PopularityStore>,
    cf_models: Arc<CfModelStore>,
    config: RecommendConfig,
}

impl RecommendationService {
    pub fn new(
        synthesizer: UserVectorSynthesizer,
        index: Arc<dyn VectorIndex>,
        popularity: Arc<dyn PopularityStore>,
        cf_models: Arc<CfModelStore>,
        config: RecommendConfig,
    ) -> Self {
        Self {
            synthesizer,
            index,
            popularity,
            cf_models,
            config,
        }
    }

    pub fn cf_models(&self) -> &Arc<CfModelStore> {
        &self.cf_models
    }

    pub async fn recommend(&self, request: &RecommendRequest) -> Vec<Recommendation> {
        if request.top_k == 0 {
            return Vec::new();
        }
        let started = Instant::now();
        let k = request.top_k.min(self.config.max_top_k);

        let personalized = match &request.mode {
            RecommendMode::Vector => self.vector_recommendations(request, k).await,
            RecommendMode::Collaborative { strategy, seed } => Ok(self
                .collaborative_recommendations(request, k, *strategy, *seed)
                .await),
        };

        let results = match personalized {
            Ok(results) if !results.is_empty() => results,
            Ok(_) => {
                debug!(user_id = request.user_id, "No personalized results, using popular jobs");
                self.popular(k).await
            }
            Err(e) => {
                warn!(
                    user_id = request.user_id,
                    error = %e,
                    upstream = e.is_upstream(),
                    "Personalized ranking failed, using popular jobs"
                );
                self.popular(k).await
            }
        };

        info!(
            user_id = request.user_id,
            top_k = k,
            returned = results.len(),
            source = results.first().map(|r| r.source.as_str()).unwrap_or("none"),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "Recommendations served"
        );
        results
    }

    async fn vector_recommendations(
        &self,
        request: &RecommendRequest,
        k: usize,
    ) -> Result<Vec<Recommendation>> {
        let mut profile = request.profile.clone().unwrap_or_default();
        profile.id.get_or_insert(request.user_id);

        let vector = self
            .synthesizer
            .synthesize(&profile, &request.interactions)
            .await?;
        if vector.is_empty() || VectorBlender::is_near_zero(&vector) {
            return Ok(Vec::new());
        }

        let mut filter = FilterBuilder::build(request.filters.as_ref(), Utc::now().timestamp_millis());
        if self.config.exclude_interacted {
            filter = FilterBuilder::exclude_ids(&filter, &request.interactions.job_ids());
        }

        let hits = self
            .index
            .dense_search(&DenseQuery {
                vector,
                filter,
                limit: k,
            })
            .await?;

        let candidates = hits
            .into_iter()
            .take(k)
            .map(|hit| RecommendationCandidate::new(hit.id, hit.score.unwrap_or(0.0)))
            .collect();
        Ok(tag(candidates, RecommendationSource::Vector))
    }

    async fn collaborative_recommendations(
        &self,
        request: &RecommendRequest,
        k: usize,
        strategy: Option<ExplorationStrategy>,
        seed: Option<u64>,
    ) -> Vec<Recommendation> {
        let Some(ranker) = self.cf_models.ranker().await else {
            debug!(user_id = request.user_id, "No CF model loaded");
            return Vec::new();
        };

        if request.filters.as_ref().is_some_and(|f| !f.is_empty()) {
            debug!(user_id = request.user_id, "Field filters are not applied to CF results");
        }

        let mut rng = match seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        let candidates = match strategy {
            Some(strategy) => ranker.recommend(request.user_id, k, strategy, &mut rng),
            None => ranker.recommend_adaptive(request.user_id, k, &mut rng),
        };
        tag(candidates, RecommendationSource::Collaborative)
    }

    async fn popular(&self, k: usize) -> Vec<Recommendation> {
        match self.popularity.top_popular(k).await {
            Ok(mut candidates) => {
                candidates.truncate(k);
                tag(candidates, RecommendationSource::Popular)
            }
            Err(e) => {
                warn!(error = %e, "Popularity fallback unavailable");
                Vec::new()
            }
        }
    }

    /// Clears the cached short-term vector after new interactions are recorded.
    pub async fn invalidate_user(&self, user_id: i64) -> Result<()> {
        self.synthesizer.invalidate(user_id).await
    }
}
