mod filter;

pub use filter::{FilterBuilder, DEFAULT_STATUS};

use crate::clients::{EmbeddingClient, HybridQuery, VectorIndex};
use crate::config::SearchConfig;
use crate::error::{AppError, Result};
use crate::models::{PaginationInfo, SearchRequest, SearchResponse};
use chrono::Utc;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info};

/// Free-text job search: dense + sparse subqueries fused by a weighted
/// reranker, thresholded and paginated.
///
/// `offset` is a page number. A next page is detected by over-fetching one
/// hit; no total count is queried. Collaborator failures are returned to the
/// caller.
pub struct HybridSearchPlanner {
    embedder: Arc<dyn EmbeddingClient>,
    index: Arc<dyn VectorIndex>,
    config: SearchConfig,
}

impl HybridSearchPlanner {
    pub fn new(
        embedder: Arc<dyn EmbeddingClient>,
        index: Arc<dyn VectorIndex>,
        config: SearchConfig,
    ) -> Self {
        Self {
            embedder,
            index,
            config,
        }
    }

    /// Missing or zero limits fall back to the default; large ones are capped.
    pub fn resolve_limit(&self, limit: Option<usize>) -> usize {
        match limit {
            Some(limit) if limit > 0 => limit.min(self.config.max_limit.max(1)),
            _ => self.config.default_limit.max(1),
        }
    }

    pub async fn search(&self, request: &SearchRequest) -> Result<SearchResponse> {
        self.search_at(request, Utc::now().timestamp_millis()).await
    }

    pub async fn search_at(&self, request: &SearchRequest, now_ms: i64) -> Result<SearchResponse> {
        let started = Instant::now();
        let limit = self.resolve_limit(request.limit);
        let offset = request.offset;

        let query_text = request.query.trim().to_lowercase();
        let embeddings = self.embedder.embed(&[query_text]).await?;
        let dense = embeddings.dense_at(0);
        if dense.is_empty() {
            return Err(AppError::Embedding(
                "embedding model returned no dense vector for query".to_string(),
            ));
        }
        let sparse = embeddings.sparse_at(0);

        let filter = FilterBuilder::build(request.filters.as_ref(), now_ms);
        debug!(filter = %filter, "Built search predicate");

        let query = HybridQuery {
            dense,
            sparse,
            filter,
            subquery_limit: limit,
            limit: limit + 1,
            offset: offset.saturating_mul(limit),
            dense_weight: self.config.dense_weight,
            sparse_weight: self.config.sparse_weight,
        };

        let mut hits = self.index.hybrid_search(&query).await?;
        let fetched = hits.len();

        let threshold = self.config.score_threshold;
        hits.retain(|hit| matches!(hit.score, Some(score) if score.is_finite() && score >= threshold));

        let has_next = hits.len() > limit;
        hits.truncate(limit);

        let pagination = PaginationInfo {
            limit,
            offset,
            count: hits.len(),
            has_next,
            has_prev: offset > 0,
        };

        info!(
            limit,
            offset,
            fetched,
            returned = hits.len(),
            has_next,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "Search completed"
        );

        Ok(SearchResponse {
            job_ids: hits.iter().map(|hit| hit.id).collect(),
            hits,
            pagination,
        })
    }
}
