use super::{PopularityStore, VectorCache};
use crate::error::{AppError, Result};
use crate::models::RecommendationCandidate;
use async_trait::async_trait;
use redis::{aio::ConnectionManager, AsyncCommands};
use std::time::Duration;
use tracing::debug;

/// Redis-backed short-term vector cache and popularity ranking.
///
/// Popular jobs are read from a sorted set (`ZREVRANGE ... WITHSCORES`) whose
/// members are job ids.
#[derive(Clone)]
pub struct RedisStore {
    conn: ConnectionManager,
    popular_jobs_key: String,
}

impl RedisStore {
    pub async fn new(redis_url: &str, popular_jobs_key: &str) -> Result<Self> {
        let client = redis::Client::open(redis_url)?;
        let conn = ConnectionManager::new(client).await?;

        Ok(Self::from_connection(conn, popular_jobs_key))
    }

    pub fn from_connection(conn: ConnectionManager, popular_jobs_key: &str) -> Self {
        Self {
            conn,
            popular_jobs_key: popular_jobs_key.to_string(),
        }
    }

    pub fn connection(&self) -> ConnectionManager {
        self.conn.clone()
    }
}

fn parse_popular(members: Vec<(String, f64)>) -> Vec<RecommendationCandidate> {
    members
        .into_iter()
        .filter_map(|(member, score)| match member.trim().parse::<i64>() {
            Ok(job_id) => Some(RecommendationCandidate::new(job_id, score as f32)),
            Err(_) => {
                debug!(member = %member, "Skipping non-numeric popular job member");
                None
            }
        })
        .collect()
}

#[async_trait]
impl VectorCache for RedisStore {
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>> {
        let mut conn = self.conn.clone();
        let value: Option<Vec<u8>> = conn
            .get(key)
            .await
            .map_err(|e| AppError::Cache(format!("GET {} failed: {}", key, e)))?;
        Ok(value)
    }

    async fn set_with_ttl(&self, key: &str, value: &[u8], ttl: Duration) -> Result<()> {
        let mut conn = self.conn.clone();
        let ttl_secs = ttl.as_secs().max(1);
        conn.set_ex::<_, _, ()>(key, value, ttl_secs)
            .await
            .map_err(|e| AppError::Cache(format!("SETEX {} failed: {}", key, e)))?;
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<()> {
        let mut conn = self.conn.clone();
        conn.del::<_, ()>(key)
            .await
            .map_err(|e| AppError::Cache(format!("DEL {} failed: {}", key, e)))?;
        Ok(())
    }
}

#[async_trait]
impl PopularityStore for RedisStore {
    async fn top_popular(&self, limit: usize) -> Result<Vec<RecommendationCandidate>> {
        if limit == 0 {
            return Ok(Vec::new());
        }

        let mut conn = self.conn.clone();
        let members: Vec<(String, f64)> = conn
            .zrevrange_withscores(&self.popular_jobs_key, 0, limit as isize - 1)
            .await?;

        Ok(parse_popular(members))
    }
}
