use super::interaction_decay::InteractionDecayEngine;
use super::maturity::MaturityTier;
use super::vector_blend::VectorBlender;
use crate::clients::{EmbeddingClient, VectorCache, VectorIndex};
use crate::config::SynthesisConfig;
use crate::error::Result;
use crate::models::{DenseVector, InteractionLog, UserProfile};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

pub const SHORT_TERM_KEY_PREFIX: &str = "user_vector:short_term:";
pub const EMPTY_PROFILE_TEXT: &str = "No profile data";

pub fn short_term_key(user_id: i64) -> String {
    format!("{}{}", SHORT_TERM_KEY_PREFIX, user_id)
}

fn yes_no(value: bool) -> &'static str {
    if value {
        "yes"
    } else {
        "no"
    }
}

/// Builds the per-user query vector from a profile (long-term) and recent
/// behaviour (short-term).
pub struct UserVectorSynthesizer {
    embedder: Arc<dyn EmbeddingClient>,
    index: Arc<dyn VectorIndex>,
    cache: Arc<dyn VectorCache>,
    decay: InteractionDecayEngine,
    config: SynthesisConfig,
}

impl UserVectorSynthesizer {
    pub fn new(
        embedder: Arc<dyn EmbeddingClient>,
        index: Arc<dyn VectorIndex>,
        cache: Arc<dyn VectorCache>,
        decay: InteractionDecayEngine,
        config: SynthesisConfig,
    ) -> Self {
        Self {
            embedder,
            index,
            cache,
            decay,
            config,
        }
    }

    /// One labelled line per present profile field.
    pub fn profile_text(profile: &UserProfile) -> String {
        let mut parts: Vec<String> = Vec::new();

        let skills: Vec<&str> = profile
            .skills
            .iter()
            .map(|s| s.trim())
            .filter(|s| !s.is_empty())
            .collect();
        if !skills.is_empty() {
            parts.push(format!("Skills: {}", skills.join(", ")));
        }

        if let Some(education) = profile.education.as_deref().map(str::trim) {
            if !education.is_empty() {
                parts.push(format!("Education: {}", education));
            }
        }

        if let Some(location) = profile.location.as_deref().map(str::trim) {
            if !location.is_empty() {
                parts.push(format!("Location: {}", location));
            }
        }

        if let Some(remote) = profile.preferences.remote {
            parts.push(format!("Prefers remote: {}", yes_no(remote)));
        }
        if let Some(relocation) = profile.preferences.relocation {
            parts.push(format!("Open to relocation: {}", yes_no(relocation)));
        }

        let text = parts.join("\n");
        if text.trim().is_empty() {
            EMPTY_PROFILE_TEXT.to_string()
        } else {
            text
        }
    }

    pub fn blend_weights(interaction_count: usize) -> (f32, f32) {
        MaturityTier::from_interaction_count(interaction_count).blend_weights()
    }

    /// Embeds the profile summary and stores it under the profile's user id.
    ///
    /// Persistence is best-effort. An empty vector means the embedding model
    /// returned nothing usable.
    pub async fn long_term_vector(&self, profile: &UserProfile) -> Result<DenseVector> {
        let text = Self::profile_text(profile);
        let embeddings = self.embedder.embed(&[text]).await?;
        let vector = VectorBlender::normalize(&embeddings.dense_at(0));

        if vector.is_empty() {
            warn!(user_id = ?profile.id, "Embedding model returned no dense vector for profile");
            return Ok(vector);
        }

        if let Some(user_id) = profile.id {
            if let Err(e) = self.index.upsert_user_vector(user_id, &vector).await {
                warn!(user_id, error = %e, "Failed to persist user vector");
            }
        }

        Ok(vector)
    }

    /// Behaviour vector, read through the short-term cache.
    ///
    /// `None` when the user has no usable interactions. Cache failures are
    /// logged and treated as a miss.
    pub async fn short_term_vector(
        &self,
        user_id: i64,
        interactions: &InteractionLog,
        cache_ttl: Duration,
    ) -> Option<DenseVector> {
        let key = short_term_key(user_id);

        match self.cache.get(&key).await {
            Ok(Some(bytes)) => match serde_json::from_slice::<DenseVector>(&bytes) {
                Ok(vector) if vector.len() == self.config.dense_dim => {
                    debug!(user_id, "Short-term vector cache hit");
                    return Some(vector);
                }
                Ok(vector) => {
                    debug!(user_id, len = vector.len(), "Ignoring cached vector with stale dimension");
                }
                Err(e) => warn!(user_id, error = %e, "Ignoring undecodable cached vector"),
            },
            Ok(None) => {}
            Err(e) => warn!(user_id, error = %e, "Short-term cache read failed"),
        }

        if interactions.is_empty() {
            return None;
        }

        let behavior = self.decay.decay(interactions, self.config.dense_dim).await;
        if VectorBlender::is_near_zero(&behavior) {
            return None;
        }
        let vector = VectorBlender::normalize(&behavior);

        match serde_json::to_vec(&vector) {
            Ok(bytes) => {
                if let Err(e) = self.cache.set_with_ttl(&key, &bytes, cache_ttl).await {
                    warn!(user_id, error = %e, "Short-term cache write failed");
                }
            }
            Err(e) => warn!(user_id, error = %e, "Failed to encode short-term vector"),
        }

        Some(vector)
    }

    /// Unit-length user vector blended by interaction maturity.
    pub async fn synthesize(
        &self,
        profile: &UserProfile,
        interactions: &InteractionLog,
    ) -> Result<DenseVector> {
        let long_term = self.long_term_vector(profile).await?;

        let Some(user_id) = profile.id else {
            return Ok(long_term);
        };

        let Some(short_term) = self
            .short_term_vector(user_id, interactions, self.config.short_term_ttl)
            .await
        else {
            return Ok(long_term);
        };

        let count = interactions.total_count();
        let tier = MaturityTier::from_interaction_count(count);
        let (profile_weight, behavior_weight) = tier.blend_weights();

        let blended = VectorBlender::combine(&long_term, &short_term, profile_weight, behavior_weight);

        info!(
            user_id,
            interactions = count,
            tier = tier.as_str(),
            "Synthesized user vector"
        );

        Ok(VectorBlender::normalize(&blended))
    }

    /// Drops the cached short-term vector; call after recording new interactions.
    pub async fn invalidate(&self, user_id: i64) -> Result<()> {
        self.cache.delete(&short_term_key(user_id)).await
    }
}
