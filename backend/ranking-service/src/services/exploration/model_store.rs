use super::latent_factors::{CfArtifact, CfSnapshot};
use super::{ExplorationRanker, Result};
use crate::config::{Config, ExplorationDefaults};
use std::path::Path;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{info, warn};

/// Holds the CF snapshot currently served.
///
/// Retraining swaps the whole snapshot; readers clone the `Arc` and release
/// the lock before ranking.
pub struct CfModelStore {
    snapshot: RwLock<Option<Arc<CfSnapshot>>>,
    defaults: ExplorationDefaults,
}

impl CfModelStore {
    pub fn new(defaults: ExplorationDefaults) -> Self {
        Self {
            snapshot: RwLock::new(None),
            defaults,
        }
    }

    pub fn with_snapshot(snapshot: CfSnapshot, defaults: ExplorationDefaults) -> Self {
        Self {
            snapshot: RwLock::new(Some(Arc::new(snapshot))),
            defaults,
        }
    }

    /// Store for `config.cf_model_path`. Without a path, or when the artifact
    /// cannot be loaded, the store starts empty and recommendations use the
    /// popularity fallback until a reload succeeds.
    pub async fn from_config(config: &Config) -> Self {
        Self::load_or_empty(config.cf_model_path.as_deref(), config.exploration_defaults()).await
    }

    pub async fn load_or_empty(path: Option<&str>, defaults: ExplorationDefaults) -> Self {
        let store = Self::new(defaults);
        let Some(path) = path.map(str::trim).filter(|p| !p.is_empty()) else {
            return store;
        };
        match store.reload_from_path(path).await {
            Ok(()) => info!(path, "CF model loaded"),
            Err(e) => warn!(path, error = %e, "CF model unavailable; serving without it"),
        }
        store
    }

    pub fn defaults(&self) -> ExplorationDefaults {
        self.defaults
    }

    pub async fn current(&self) -> Option<Arc<CfSnapshot>> {
        self.snapshot.read().await.clone()
    }

    pub async fn is_loaded(&self) -> bool {
        self.snapshot.read().await.is_some()
    }

    /// Ranker over the current snapshot; `None` while no model is loaded.
    pub async fn ranker(&self) -> Option<ExplorationRanker> {
        let snapshot = self.current().await?;
        Some(ExplorationRanker::new(snapshot).with_filter_seen(self.defaults.filter_seen))
    }

    pub async fn replace(&self, snapshot: CfSnapshot) {
        let users = snapshot.factors.num_users();
        let items = snapshot.factors.num_items();
        *self.snapshot.write().await = Some(Arc::new(snapshot));
        info!(users, items, "CF snapshot replaced");
    }

    pub async fn clear(&self) {
        *self.snapshot.write().await = None;
    }

    /// Loads a trainer artifact and swaps it in. The served snapshot is kept
    /// when loading fails.
    pub async fn reload_from_path(&self, path: impl AsRef<Path>) -> Result<()> {
        let artifact = CfArtifact::load(path.as_ref()).await?;
        let snapshot = CfSnapshot::from_artifact(artifact)?;
        self.replace(snapshot).await;
        Ok(())
    }

    /// Collaborative score for one pair; 0.0 without a model.
    pub async fn score(&self, user_id: i64, job_id: i64) -> f32 {
        match self.current().await {
            Some(snapshot) => snapshot.factors.score(user_id, job_id),
            None => 0.0,
        }
    }
}

impl Default for CfModelStore {
    fn default() -> Self {
        Self::new(ExplorationDefaults::default())
    }
}
