use crate::clients::VectorIndex;
use crate::config::DecayConfig;
use crate::models::{DenseVector, InteractionLog};
use chrono::Utc;
use futures::future::join_all;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, warn};

const SECONDS_PER_DAY: f64 = 86_400.0;
const WEIGHT_EPSILON: f64 = 1e-8;

/// Turns an interaction log into a signed, recency-weighted centroid of the
/// interacted jobs' dense vectors.
///
/// The result is not unit-normalized; callers normalize.
pub struct InteractionDecayEngine {
    index: Arc<dyn VectorIndex>,
    config: DecayConfig,
}

impl InteractionDecayEngine {
    pub fn new(index: Arc<dyn VectorIndex>, config: DecayConfig) -> Self {
        Self { index, config }
    }

    pub fn config(&self) -> &DecayConfig {
        &self.config
    }

    /// `exp(-ln2 * elapsed_days / half_life_days)`; a missing timestamp decays to 1.0.
    pub fn exp_time_decay(timestamp: Option<f64>, now_ts: f64, half_life_days: f64) -> f64 {
        let ts = match timestamp {
            Some(ts) if ts.is_finite() => ts,
            _ => return 1.0,
        };
        if !(half_life_days.is_finite() && half_life_days > 0.0) {
            return 1.0;
        }

        let elapsed_days = ((now_ts - ts) / SECONDS_PER_DAY).max(0.0);
        (-std::f64::consts::LN_2 * elapsed_days / half_life_days).exp()
    }

    pub async fn decay(&self, interactions: &InteractionLog, dimension: usize) -> DenseVector {
        let now_ts = Utc::now().timestamp_millis() as f64 / 1000.0;
        self.decay_at(interactions, dimension, now_ts).await
    }

    /// Same as [`decay`](Self::decay) against an explicit clock (epoch seconds).
    pub async fn decay_at(
        &self,
        interactions: &InteractionLog,
        dimension: usize,
        now_ts: f64,
    ) -> DenseVector {
        let mut weighted: Vec<(i64, f64)> = Vec::new();
        for (kind, entries) in interactions.typed() {
            let Some(base_weight) = self.config.weight_for(kind) else {
                continue;
            };
            for (job_id, ts) in entries.entries() {
                let decay = Self::exp_time_decay(ts, now_ts, self.config.half_life_days);
                weighted.push((job_id, base_weight as f64 * decay));
            }
        }

        if weighted.is_empty() || dimension == 0 {
            return vec![0.0; dimension];
        }

        let vectors = self.fetch_job_vectors(&weighted, dimension).await;

        let mut acc = vec![0.0f64; dimension];
        let mut weight_sum = 0.0f64;
        for (job_id, weight) in &weighted {
            let Some(vector) = vectors.get(job_id) else {
                continue;
            };
            for (slot, value) in acc.iter_mut().zip(vector.iter()) {
                *slot += weight * *value as f64;
            }
            weight_sum += weight.abs();
        }

        debug!(
            entries = weighted.len(),
            resolved = vectors.len(),
            weight_sum,
            "Computed behavior vector"
        );

        if weight_sum > WEIGHT_EPSILON {
            acc.iter().map(|v| (v / weight_sum) as f32).collect()
        } else {
            vec![0.0; dimension]
        }
    }

    /// Resolves each distinct job once; missing, mismatched or failed lookups
    /// are left out of the map.
    async fn fetch_job_vectors(
        &self,
        weighted: &[(i64, f64)],
        dimension: usize,
    ) -> HashMap<i64, DenseVector> {
        let mut job_ids: Vec<i64> = weighted.iter().map(|(id, _)| *id).collect();
        job_ids.sort_unstable();
        job_ids.dedup();

        let results = join_all(job_ids.iter().map(|id| self.index.get_job_vector(*id))).await;

        let mut vectors = HashMap::with_capacity(job_ids.len());
        for (job_id, result) in job_ids.into_iter().zip(results) {
            match result {
                Ok(Some(vector)) if vector.len() == dimension => {
                    vectors.insert(job_id, vector);
                }
                Ok(Some(vector)) => {
                    warn!(
                        job_id,
                        expected = dimension,
                        actual = vector.len(),
                        "Skipping job vector with mismatched dimension"
                    );
                }
                Ok(None) => debug!(job_id, "No stored vector for job"),
                Err(e) => warn!(job_id, error = %e, "Failed to fetch job vector"),
            }
        }
        vectors
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clients::{DenseQuery, HybridQuery, JobRecord};
    use crate::error::{AppError, Result};
    use crate::models::{IndexHit, InteractionEntries, InteractionType, LenientTimestamp};
    use async_trait::async_trait;

    const NOW: f64 = 1_700_000_000.0;

    struct StaticIndex {
        vectors: HashMap<i64, DenseVector>,
    }

    #[async_trait]
    impl VectorIndex for StaticIndex {
        async fn upsert_user_vector(&self, _user_id: i64, _vector: &[f32]) -> Result<()> {
            Ok(())
        }

        async fn get_job_vector(&self, job_id: i64) -> Result<Option<DenseVector>> {
            if job_id == 666 {
                return Err(AppError::VectorIndex("unavailable".into()));
            }
            Ok(self.vectors.get(&job_id).cloned())
        }

        async fn hybrid_search(&self, _query: &HybridQuery) -> Result<Vec<IndexHit>> {
            Ok(Vec::new())
        }

        async fn dense_search(&self, _query: &DenseQuery) -> Result<Vec<IndexHit>> {
            Ok(Vec::new())
        }

        async fn upsert_jobs(&self, jobs: &[JobRecord]) -> Result<usize> {
            Ok(jobs.len())
        }

        async fn delete_jobs(&self, job_ids: &[i64]) -> Result<usize> {
            Ok(job_ids.len())
        }
    }

    fn engine() -> InteractionDecayEngine {
        let vectors = HashMap::from([
            (1, vec![1.0, 0.0]),
            (2, vec![0.0, 1.0]),
            (3, vec![1.0, 1.0, 1.0]),
        ]);
        InteractionDecayEngine::new(Arc::new(StaticIndex { vectors }), DecayConfig::default())
    }

    fn ids(ids: &[i64]) -> InteractionEntries {
        InteractionEntries::Ids(ids.iter().copied().collect())
    }

    #[test]
    fn test_decay_is_monotonic_in_recency() {
        let recent = InteractionDecayEngine::exp_time_decay(Some(NOW - 86_400.0), NOW, 30.0);
        let older = InteractionDecayEngine::exp_time_decay(Some(NOW - 10.0 * 86_400.0), NOW, 30.0);
        assert!(recent > older);

        let half = InteractionDecayEngine::exp_time_decay(Some(NOW - 30.0 * 86_400.0), NOW, 30.0);
        assert!((half - 0.5).abs() < 1e-9);
    }

    #[test]
    fn test_missing_or_future_timestamp_does_not_decay() {
        assert_eq!(InteractionDecayEngine::exp_time_decay(None, NOW, 30.0), 1.0);
        assert_eq!(InteractionDecayEngine::exp_time_decay(Some(NOW + 500.0), NOW, 30.0), 1.0);
        assert_eq!(InteractionDecayEngine::exp_time_decay(Some(f64::NAN), NOW, 30.0), 1.0);
    }

    #[tokio::test]
    async fn test_weighted_centroid() {
        let log = InteractionLog::new()
            .with(InteractionType::Apply, ids(&[1]))
            .with(InteractionType::SkipFromSearch, ids(&[2]));

        let v = engine().decay_at(&log, 2, NOW).await;

        // (1.0 * [1,0] - 0.1 * [0,1]) / 1.1
        assert!((v[0] - 1.0 / 1.1).abs() < 1e-6);
        assert!((v[1] + 0.1 / 1.1).abs() < 1e-6);
    }

    #[tokio::test]
    async fn test_skips_missing_mismatched_and_failed_vectors() {
        let log = InteractionLog::new().with(InteractionType::Save, ids(&[1, 3, 99, 666]));

        let v = engine().decay_at(&log, 2, NOW).await;
        assert!((v[0] - 1.0).abs() < 1e-6);
        assert!(v[1].abs() < 1e-6);
    }

    #[tokio::test]
    async fn test_unknown_types_and_empty_log_yield_zero_vector() {
        let mut log = InteractionLog::new();
        log.insert("VIEW", ids(&[1, 2]));

        assert_eq!(engine().decay_at(&log, 2, NOW).await, vec![0.0, 0.0]);
        assert_eq!(engine().decay_at(&InteractionLog::new(), 3, NOW).await, vec![0.0; 3]);
    }

    #[tokio::test]
    async fn test_timestamps_shift_weight_towards_recent_jobs() {
        let entries = InteractionEntries::TimestampedIds(
            [
                (1, LenientTimestamp::at(NOW)),
                (2, LenientTimestamp::at(NOW - 60.0 * 86_400.0)),
            ]
            .into_iter()
            .collect(),
        );
        let log = InteractionLog::new().with(InteractionType::Click, entries);

        let v = engine().decay_at(&log, 2, NOW).await;
        // weights 1.0 and 0.25 (two half-lives) share the same base weight
        assert!((v[0] - 0.8).abs() < 1e-6);
        assert!((v[1] - 0.2).abs() < 1e-6);
    }
}
