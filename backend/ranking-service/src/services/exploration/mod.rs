// ============================================
// Exploration Module
// ============================================
//
// Collaborative-filtering recommendations with controllable explore/exploit
// balance, computed over a precomputed latent-factor snapshot.
//
// Strategies:
// - exploit:        top-k by user·item factor score
// - epsilon_greedy: floor(k·ε) slots sampled uniformly from unseen items
// - thompson:       Gaussian noise on the user factor perturbs selection,
//                   reported scores use the noise-free factor
// - diversity:      MMR re-rank of the top 3k exploit candidates
//
// Adaptive selection picks a strategy from the user's maturity tier,
// counted on their row of the interaction matrix.

mod latent_factors;
mod model_store;

pub use latent_factors::{CfArtifact, CfSnapshot, LatentFactors, UserItemMatrix};
pub use model_store::CfModelStore;

use super::maturity::MaturityTier;
use crate::config::ExplorationDefaults;
use crate::error::AppError;
use crate::models::RecommendationCandidate;
use ndarray::Array1;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use rand_distr::{Distribution, Normal};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, warn};

#[derive(Debug, Error)]
pub enum ExplorationError {
    #[error("Invalid model: {0}")]
    InvalidModel(String),

    #[error("Model artifact unreadable: {0}")]
    Io(String),
}

pub type Result<T> = std::result::Result<T, ExplorationError>;

impl From<ExplorationError> for AppError {
    fn from(err: ExplorationError) -> Self {
        AppError::Model(err.to_string())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "strategy", rename_all = "snake_case")]
pub enum ExplorationStrategy {
    Exploit,
    EpsilonGreedy { epsilon: f64 },
    Thompson { noise_scale: f64 },
    Diversity { diversity_weight: f64 },
}

impl ExplorationStrategy {
    pub fn name(&self) -> &'static str {
        match self {
            ExplorationStrategy::Exploit => "exploit",
            ExplorationStrategy::EpsilonGreedy { .. } => "epsilon_greedy",
            ExplorationStrategy::Thompson { .. } => "thompson",
            ExplorationStrategy::Diversity { .. } => "diversity",
        }
    }

    /// Strategy used by adaptive selection for a maturity tier.
    pub fn for_tier(tier: MaturityTier) -> Self {
        match tier {
            MaturityTier::ColdStart => ExplorationStrategy::EpsilonGreedy { epsilon: 0.30 },
            MaturityTier::Growing => ExplorationStrategy::Thompson { noise_scale: 0.1 },
            MaturityTier::Mature => ExplorationStrategy::Diversity {
                diversity_weight: 0.3,
            },
        }
    }

    /// Looks a strategy up by name, filling its parameter from `defaults`.
    pub fn from_name(name: &str, defaults: &ExplorationDefaults) -> Option<Self> {
        match name.trim().to_ascii_lowercase().as_str() {
            "none" | "exploit" => Some(ExplorationStrategy::Exploit),
            "epsilon_greedy" => Some(ExplorationStrategy::EpsilonGreedy {
                epsilon: defaults.epsilon,
            }),
            "thompson" => Some(ExplorationStrategy::Thompson {
                noise_scale: defaults.noise_scale,
            }),
            "diversity" => Some(ExplorationStrategy::Diversity {
                diversity_weight: defaults.diversity_weight,
            }),
            _ => None,
        }
    }
}

fn by_score_desc(a: &(usize, f32), b: &(usize, f32)) -> std::cmp::Ordering {
    b.1.total_cmp(&a.1)
}

/// Ranks jobs for a user over one CF snapshot.
///
/// Users without a row in the snapshot get an empty list. Ties keep item-row
/// order.
pub struct ExplorationRanker {
    snapshot: Arc<CfSnapshot>,
    filter_seen: bool,
}

impl ExplorationRanker {
    pub fn new(snapshot: Arc<CfSnapshot>) -> Self {
        Self {
            snapshot,
            filter_seen: true,
        }
    }

    /// Whether items already in the user's interaction row are masked out.
    pub fn with_filter_seen(mut self, filter_seen: bool) -> Self {
        self.filter_seen = filter_seen;
        self
    }

    /// Nonzero entries in the user's interaction row; `None` for unknown users.
    pub fn interaction_count(&self, user_id: i64) -> Option<usize> {
        let user_index = self.snapshot.factors.user_index(user_id)?;
        Some(self.snapshot.interactions.interaction_count(user_index))
    }

    pub fn adaptive_strategy(&self, user_id: i64) -> Option<ExplorationStrategy> {
        let count = self.interaction_count(user_id)?;
        Some(ExplorationStrategy::for_tier(
            MaturityTier::from_interaction_count(count),
        ))
    }

    pub fn recommend<R: Rng + ?Sized>(
        &self,
        user_id: i64,
        k: usize,
        strategy: ExplorationStrategy,
        rng: &mut R,
    ) -> Vec<RecommendationCandidate> {
        if k == 0 {
            return Vec::new();
        }
        let Some(user_index) = self.snapshot.factors.user_index(user_id) else {
            debug!(user_id, "User not present in CF model");
            return Vec::new();
        };

        let results = match strategy {
            ExplorationStrategy::Exploit => self.top_k_exploit(user_index, k),
            ExplorationStrategy::EpsilonGreedy { epsilon } => {
                self.top_k_epsilon_greedy(user_index, k, epsilon, rng)
            }
            ExplorationStrategy::Thompson { noise_scale } => {
                self.top_k_thompson(user_index, k, noise_scale, rng)
            }
            ExplorationStrategy::Diversity { diversity_weight } => {
                self.top_k_with_diversity(user_index, k, diversity_weight)
            }
        };

        debug!(
            user_id,
            strategy = strategy.name(),
            k,
            returned = results.len(),
            "CF recommendations ranked"
        );
        results
    }

    /// [`recommend`](Self::recommend) with a reproducible RNG when `seed` is set.
    pub fn recommend_seeded(
        &self,
        user_id: i64,
        k: usize,
        strategy: ExplorationStrategy,
        seed: Option<u64>,
    ) -> Vec<RecommendationCandidate> {
        let mut rng = match seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        self.recommend(user_id, k, strategy, &mut rng)
    }

    pub fn recommend_adaptive<R: Rng + ?Sized>(
        &self,
        user_id: i64,
        k: usize,
        rng: &mut R,
    ) -> Vec<RecommendationCandidate> {
        match self.adaptive_strategy(user_id) {
            Some(strategy) => self.recommend(user_id, k, strategy, rng),
            None => Vec::new(),
        }
    }

    fn seen_items(&self, user_index: usize) -> HashSet<usize> {
        if self.filter_seen {
            self.snapshot.interactions.seen_items(user_index)
        } else {
            HashSet::new()
        }
    }

    /// Maps ranked item rows to candidates, dropping rows without a job id.
    fn to_candidates<F>(&self, ranked: &[(usize, f32)], k: usize, score: F) -> Vec<RecommendationCandidate>
    where
        F: Fn(usize, f32) -> f32,
    {
        let factors = &self.snapshot.factors;
        ranked
            .iter()
            .take(k)
            .filter_map(|(idx, s)| {
                factors
                    .item_id(*idx)
                    .map(|job_id| RecommendationCandidate::new(job_id, score(*idx, *s)))
            })
            .collect()
    }

    fn top_k_exploit(&self, user_index: usize, k: usize) -> Vec<RecommendationCandidate> {
        if k == 0 {
            return Vec::new();
        }
        let factors = &self.snapshot.factors;
        let scores = factors.score_all(&factors.user_factor(user_index));
        let seen = self.seen_items(user_index);

        let mut ranked: Vec<(usize, f32)> = scores
            .iter()
            .copied()
            .enumerate()
            .filter(|(idx, _)| !seen.contains(idx))
            .collect();
        ranked.sort_by(by_score_desc);

        self.to_candidates(&ranked, k, |_, score| score)
    }

    fn top_k_epsilon_greedy<R: Rng + ?Sized>(
        &self,
        user_index: usize,
        k: usize,
        epsilon: f64,
        rng: &mut R,
    ) -> Vec<RecommendationCandidate> {
        let epsilon = if epsilon.is_finite() {
            epsilon.clamp(0.0, 1.0)
        } else {
            0.0
        };
        let explore_count = (k as f64 * epsilon).floor() as usize;
        let exploit_count = k - explore_count;

        let exploit = self.top_k_exploit(user_index, exploit_count);
        if explore_count == 0 {
            return exploit;
        }

        let factors = &self.snapshot.factors;
        let seen: HashSet<i64> = self
            .seen_items(user_index)
            .into_iter()
            .filter_map(|idx| factors.item_id(idx))
            .collect();
        let exploited: HashSet<i64> = exploit.iter().map(|c| c.job_id).collect();

        let available: Vec<i64> = factors
            .item_ids_sorted()
            .into_iter()
            .filter(|id| !seen.contains(id) && !exploited.contains(id))
            .collect();
        if available.is_empty() {
            return exploit;
        }

        let explore: Vec<RecommendationCandidate> = available
            .choose_multiple(rng, explore_count.min(available.len()))
            .filter_map(|job_id| {
                let item_index = factors.item_index(*job_id)?;
                Some(RecommendationCandidate::new(
                    *job_id,
                    factors.dot(user_index, item_index),
                ))
            })
            .collect();

        let mut merged = exploit;
        merged.extend(explore);
        merged.shuffle(rng);
        merged.truncate(k);
        merged
    }

    fn top_k_thompson<R: Rng + ?Sized>(
        &self,
        user_index: usize,
        k: usize,
        noise_scale: f64,
        rng: &mut R,
    ) -> Vec<RecommendationCandidate> {
        let factors = &self.snapshot.factors;
        let user_factor = factors.user_factor(user_index).to_owned();

        let noisy = match Normal::new(0.0f64, noise_scale) {
            Ok(dist) => {
                let noise: Array1<f32> = (0..user_factor.len())
                    .map(|_| dist.sample(rng) as f32)
                    .collect();
                &user_factor + &noise
            }
            Err(e) => {
                warn!(noise_scale, error = %e, "Invalid Thompson noise scale, sampling without noise");
                user_factor.clone()
            }
        };

        let scores = factors.score_all(&noisy.view());
        let seen = self.seen_items(user_index);

        let mut ranked: Vec<(usize, f32)> = scores
            .iter()
            .copied()
            .enumerate()
            .filter(|(idx, _)| !seen.contains(idx))
            .collect();
        ranked.sort_by(by_score_desc);

        self.to_candidates(&ranked, k, |idx, _| factors.dot(user_index, idx))
    }

    fn top_k_with_diversity(
        &self,
        user_index: usize,
        k: usize,
        diversity_weight: f64,
    ) -> Vec<RecommendationCandidate> {
        let candidates = self.top_k_exploit(user_index, k.saturating_mul(3));
        if candidates.len() <= k {
            return candidates;
        }

        let factors = &self.snapshot.factors;
        let mut remaining = candidates;
        let mut selected: Vec<RecommendationCandidate> = Vec::with_capacity(k);
        let mut selected_rows: Vec<usize> = Vec::with_capacity(k);

        while selected.len() < k && !remaining.is_empty() {
            let mut best_score = f64::NEG_INFINITY;
            let mut best_pos = 0;

            for (pos, candidate) in remaining.iter().enumerate() {
                let Some(item_index) = factors.item_index(candidate.job_id) else {
                    continue;
                };

                let diversity = if selected_rows.is_empty() {
                    1.0
                } else {
                    let item = factors.item_factor(item_index);
                    let total: f64 = selected_rows
                        .iter()
                        .map(|row| factors.item_factor(*row).dot(&item) as f64)
                        .sum();
                    1.0 - total / selected_rows.len() as f64
                };

                let mmr = (1.0 - diversity_weight) * candidate.score as f64
                    + diversity_weight * diversity;
                if mmr > best_score {
                    best_score = mmr;
                    best_pos = pos;
                }
            }

            let chosen = remaining.remove(best_pos);
            if let Some(item_index) = factors.item_index(chosen.job_id) {
                selected_rows.push(item_index);
            }
            selected.push(chosen);
        }

        selected
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    // Five items scored for user 1 as 5, 4, 3, 2, 1; user 1 has seen item 60.
    fn snapshot() -> Arc<CfSnapshot> {
        let factors = LatentFactors::new(
            array![[1.0, 0.0], [0.0, 1.0]],
            array![[5.0, 0.0], [4.0, 0.1], [3.0, 0.2], [2.0, 0.3], [1.0, 0.4], [6.0, 0.0]],
            &[1, 2],
            &[10, 20, 30, 40, 50, 60],
        )
        .unwrap();
        let interactions = UserItemMatrix::from_triplets(2, 6, vec![(0, 5, 1.0)]);
        Arc::new(CfSnapshot::new(factors, interactions))
    }

    fn ids(candidates: &[RecommendationCandidate]) -> Vec<i64> {
        candidates.iter().map(|c| c.job_id).collect()
    }

    #[test]
    fn test_exploit_masks_seen_items() {
        let ranker = ExplorationRanker::new(snapshot());
        let recs = ranker.recommend_seeded(1, 3, ExplorationStrategy::Exploit, Some(7));
        assert_eq!(ids(&recs), vec![10, 20, 30]);
        assert!((recs[0].score - 5.0).abs() < 1e-6);

        let unmasked = ExplorationRanker::new(snapshot()).with_filter_seen(false);
        let recs = unmasked.recommend_seeded(1, 1, ExplorationStrategy::Exploit, Some(7));
        assert_eq!(ids(&recs), vec![60]);
    }

    #[test]
    fn test_unknown_user_gets_nothing() {
        let ranker = ExplorationRanker::new(snapshot());
        let strategies = [
            ExplorationStrategy::Exploit,
            ExplorationStrategy::EpsilonGreedy { epsilon: 0.5 },
            ExplorationStrategy::Thompson { noise_scale: 0.1 },
            ExplorationStrategy::Diversity {
                diversity_weight: 0.3,
            },
        ];
        for strategy in strategies {
            assert!(ranker.recommend_seeded(999_999, 3, strategy, Some(1)).is_empty());
        }
        assert!(ranker
            .recommend_adaptive(999_999, 3, &mut StdRng::seed_from_u64(1))
            .is_empty());
    }

    #[test]
    fn test_zero_epsilon_equals_exploit() {
        let ranker = ExplorationRanker::new(snapshot());
        let exploit = ranker.recommend_seeded(1, 4, ExplorationStrategy::Exploit, Some(3));
        let greedy = ranker.recommend_seeded(
            1,
            4,
            ExplorationStrategy::EpsilonGreedy { epsilon: 0.0 },
            Some(3),
        );
        assert_eq!(greedy, exploit);
        assert_eq!(greedy.len(), 4);
    }

    #[test]
    fn test_epsilon_greedy_budget_and_no_seen_items() {
        let ranker = ExplorationRanker::new(snapshot());
        for seed in 0..20 {
            let recs = ranker.recommend_seeded(
                1,
                4,
                ExplorationStrategy::EpsilonGreedy { epsilon: 0.5 },
                Some(seed),
            );
            assert!(recs.len() <= 4);
            let unique: HashSet<i64> = ids(&recs).into_iter().collect();
            assert_eq!(unique.len(), recs.len());
            assert!(!unique.contains(&60));
            // exploit half is always the top two
            assert!(unique.contains(&10) && unique.contains(&20));
        }
    }

    #[test]
    fn test_epsilon_greedy_empty_pool_returns_exploit() {
        let ranker = ExplorationRanker::new(snapshot());
        let recs = ranker.recommend_seeded(
            1,
            10,
            ExplorationStrategy::EpsilonGreedy { epsilon: 0.5 },
            Some(1),
        );
        assert_eq!(ids(&recs), vec![10, 20, 30, 40, 50]);
    }

    #[test]
    fn test_seeded_runs_are_reproducible() {
        let ranker = ExplorationRanker::new(snapshot());
        let strategy = ExplorationStrategy::Thompson { noise_scale: 2.0 };
        assert_eq!(
            ranker.recommend_seeded(1, 3, strategy, Some(42)),
            ranker.recommend_seeded(1, 3, strategy, Some(42))
        );
    }

    #[test]
    fn test_thompson_reports_noise_free_scores() {
        let ranker = ExplorationRanker::new(snapshot());
        let recs = ranker.recommend_seeded(
            1,
            5,
            ExplorationStrategy::Thompson { noise_scale: 3.0 },
            Some(11),
        );
        let snapshot = snapshot();
        for rec in &recs {
            assert!((rec.score - snapshot.factors.score(1, rec.job_id)).abs() < 1e-6);
            assert_ne!(rec.job_id, 60);
        }
        assert_eq!(recs.len(), 5);
    }

    #[test]
    fn test_thompson_without_noise_matches_exploit() {
        let ranker = ExplorationRanker::new(snapshot());
        assert_eq!(
            ranker.recommend_seeded(1, 3, ExplorationStrategy::Thompson { noise_scale: 0.0 }, Some(1)),
            ranker.recommend_seeded(1, 3, ExplorationStrategy::Exploit, Some(1))
        );
    }

    #[test]
    fn test_mmr_without_diversity_is_top_k() {
        let ranker = ExplorationRanker::new(snapshot());
        let recs = ranker.recommend_seeded(
            1,
            2,
            ExplorationStrategy::Diversity {
                diversity_weight: 0.0,
            },
            None,
        );
        assert_eq!(ids(&recs), vec![10, 20]);
    }

    #[test]
    fn test_mmr_prefers_dissimilar_items() {
        // 10 and 20 point the same way; 30 scores lower but is dissimilar to 10.
        let factors = LatentFactors::new(
            array![[1.0, 0.0]],
            array![[1.0, 1.0], [0.9, 1.0], [0.8, -1.0]],
            &[1],
            &[10, 20, 30],
        )
        .unwrap();
        let ranker = ExplorationRanker::new(Arc::new(CfSnapshot::new(
            factors,
            UserItemMatrix::empty(1, 3),
        )));

        let relevance_only = ranker.recommend_seeded(
            1,
            2,
            ExplorationStrategy::Diversity {
                diversity_weight: 0.0,
            },
            None,
        );
        assert_eq!(ids(&relevance_only), vec![10, 20]);

        let diverse = ranker.recommend_seeded(
            1,
            2,
            ExplorationStrategy::Diversity {
                diversity_weight: 0.5,
            },
            None,
        );
        assert_eq!(ids(&diverse), vec![10, 30]);
        // reported scores stay the raw relevance
        assert!((diverse[1].score - 0.8).abs() < 1e-6);
    }

    #[test]
    fn test_adaptive_strategy_by_maturity() {
        let ranker = ExplorationRanker::new(snapshot());
        assert_eq!(
            ranker.adaptive_strategy(1),
            Some(ExplorationStrategy::EpsilonGreedy { epsilon: 0.30 })
        );
        assert_eq!(ranker.adaptive_strategy(999_999), None);
        assert_eq!(
            ExplorationStrategy::for_tier(MaturityTier::Growing),
            ExplorationStrategy::Thompson { noise_scale: 0.1 }
        );
        assert_eq!(
            ExplorationStrategy::for_tier(MaturityTier::Mature),
            ExplorationStrategy::Diversity {
                diversity_weight: 0.3
            }
        );
    }

    #[test]
    fn test_strategy_from_name() {
        let defaults = ExplorationDefaults::default();
        assert_eq!(
            ExplorationStrategy::from_name("none", &defaults),
            Some(ExplorationStrategy::Exploit)
        );
        assert_eq!(
            ExplorationStrategy::from_name("Epsilon_Greedy", &defaults),
            Some(ExplorationStrategy::EpsilonGreedy { epsilon: 0.15 })
        );
        assert_eq!(ExplorationStrategy::from_name("ucb", &defaults), None);
    }
}
