//! Milvus vector index over the v2 REST API.
//!
//! Jobs live in one collection with a dense field (COSINE) and a sparse field
//! (inner product); user vectors live in a second collection keyed by user id.

use super::{DenseQuery, HybridQuery, JobRecord, VectorIndex};
use crate::error::{AppError, Result};
use crate::models::{DenseVector, IndexHit, JobSearchDocument};
use async_trait::async_trait;
use reqwest::Client as HttpClient;
use serde::Deserialize;
use serde_json::{json, Value};
use std::time::Duration;
use tracing::debug;

const DENSE_FIELD: &str = "dense_vector";
const SPARSE_FIELD: &str = "sparse_vector";

const JOB_OUTPUT_FIELDS: [&str; 15] = [
    "id",
    "title",
    "company",
    "job_role",
    "seniority",
    "min_experience_years",
    "work_mode",
    "salary_min",
    "salary_max",
    "currency",
    "status",
    "date_posted",
    "date_expires",
    "skills",
    "location",
];

#[derive(Debug, Deserialize)]
struct MilvusResponse {
    code: i64,
    #[serde(default)]
    message: Option<String>,
    #[serde(default)]
    data: Value,
}

pub struct MilvusClient {
    client: HttpClient,
    base_url: String,
    token: Option<String>,
    jobs_collection: String,
    users_collection: String,
    dense_dim: usize,
}

impl MilvusClient {
    pub fn new(
        base_url: &str,
        token: Option<String>,
        jobs_collection: &str,
        users_collection: &str,
        dense_dim: usize,
        timeout: Duration,
    ) -> Result<Self> {
        let client = HttpClient::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| AppError::Configuration(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            token: token.filter(|t| !t.is_empty()),
            jobs_collection: jobs_collection.to_string(),
            users_collection: users_collection.to_string(),
            dense_dim,
        })
    }

    async fn call(&self, operation: &str, body: Value) -> Result<Value> {
        let url = format!("{}/v2/vectordb/entities/{}", self.base_url, operation);

        let mut request = self.client.post(&url).json(&body);
        if let Some(token) = &self.token {
            request = request.bearer_auth(token);
        }

        let response = request
            .send()
            .await
            .map_err(|e| AppError::VectorIndex(format!("Milvus {} failed: {}", operation, e)))?;

        if !response.status().is_success() {
            let status = response.status();
            let error_text = response.text().await.unwrap_or_default();
            return Err(AppError::VectorIndex(format!(
                "Milvus {} returned {}: {}",
                operation, status, error_text
            )));
        }

        let parsed: MilvusResponse = response
            .json()
            .await
            .map_err(|e| AppError::VectorIndex(format!("Parse error: {}", e)))?;

        if parsed.code != 0 {
            return Err(AppError::VectorIndex(format!(
                "Milvus {} error {}: {}",
                operation,
                parsed.code,
                parsed.message.unwrap_or_default()
            )));
        }

        Ok(parsed.data)
    }

    fn check_dimension(&self, vector: &[f32]) -> Result<()> {
        if vector.len() != self.dense_dim {
            return Err(AppError::Validation(format!(
                "Vector dimension mismatch: expected {}, got {}",
                self.dense_dim,
                vector.len()
            )));
        }
        Ok(())
    }
}

fn parse_hits(data: Value) -> Vec<IndexHit> {
    let rows = match data {
        Value::Array(rows) => rows,
        _ => return Vec::new(),
    };

    rows.into_iter()
        .filter_map(|row| {
            let id = row.get("id").and_then(Value::as_i64)?;
            let score = row
                .get("distance")
                .or_else(|| row.get("score"))
                .and_then(Value::as_f64)
                .map(|s| s as f32);
            let document = serde_json::from_value::<JobSearchDocument>(row).ok();
            Some(IndexHit {
                id,
                score,
                document,
            })
        })
        .collect()
}

fn id_list(ids: &[i64]) -> String {
    let joined = ids
        .iter()
        .map(|id| id.to_string())
        .collect::<Vec<_>>()
        .join(", ");
    format!("[{}]", joined)
}

fn count_field(data: &Value, field: &str) -> Option<usize> {
    data.get(field).and_then(Value::as_u64).map(|n| n as usize)
}

#[async_trait]
impl VectorIndex for MilvusClient {
    async fn upsert_user_vector(&self, user_id: i64, vector: &[f32]) -> Result<()> {
        self.check_dimension(vector)?;

        let body = json!({
            "collectionName": self.users_collection,
            "data": [{ "id": user_id, DENSE_FIELD: vector }],
        });
        self.call("upsert", body).await?;

        debug!(user_id, "Upserted user vector");
        Ok(())
    }

    async fn get_job_vector(&self, job_id: i64) -> Result<Option<DenseVector>> {
        let body = json!({
            "collectionName": self.jobs_collection,
            "id": [job_id],
            "outputFields": [DENSE_FIELD],
        });
        let data = self.call("get", body).await?;

        let vector = data
            .as_array()
            .and_then(|rows| rows.first())
            .and_then(|row| row.get(DENSE_FIELD))
            .and_then(|v| serde_json::from_value::<DenseVector>(v.clone()).ok());

        Ok(vector)
    }

    async fn hybrid_search(&self, query: &HybridQuery) -> Result<Vec<IndexHit>> {
        let mut body = json!({
            "collectionName": self.jobs_collection,
            "search": [
                {
                    "data": [query.dense],
                    "annsField": DENSE_FIELD,
                    "filter": query.filter,
                    "limit": query.subquery_limit,
                    "params": { "metricType": "COSINE" },
                },
                {
                    "data": [query.sparse],
                    "annsField": SPARSE_FIELD,
                    "filter": query.filter,
                    "limit": query.subquery_limit,
                    "params": { "metricType": "IP" },
                },
            ],
            "rerank": {
                "strategy": "weighted",
                "params": { "weights": [query.dense_weight, query.sparse_weight] },
            },
            "limit": query.limit,
            "outputFields": JOB_OUTPUT_FIELDS,
        });
        if query.offset > 0 {
            body["offset"] = json!(query.offset);
        }

        let data = self.call("hybrid_search", body).await?;
        Ok(parse_hits(data))
    }

    async fn dense_search(&self, query: &DenseQuery) -> Result<Vec<IndexHit>> {
        self.check_dimension(&query.vector)?;

        let body = json!({
            "collectionName": self.jobs_collection,
            "data": [query.vector],
            "annsField": DENSE_FIELD,
            "filter": query.filter,
            "limit": query.limit,
            "outputFields": JOB_OUTPUT_FIELDS,
            "searchParams": { "metricType": "COSINE" },
        });

        let data = self.call("search", body).await?;
        Ok(parse_hits(data))
    }

    async fn upsert_jobs(&self, jobs: &[JobRecord]) -> Result<usize> {
        if jobs.is_empty() {
            return Ok(0);
        }

        let mut rows = Vec::with_capacity(jobs.len());
        for job in jobs {
            self.check_dimension(&job.dense)?;
            let mut row = serde_json::to_value(&job.document)?;
            row["id"] = json!(job.id);
            row[DENSE_FIELD] = json!(job.dense);
            row[SPARSE_FIELD] = json!(job.sparse);
            rows.push(row);
        }

        let body = json!({
            "collectionName": self.jobs_collection,
            "data": rows,
        });
        let data = self.call("upsert", body).await?;

        Ok(count_field(&data, "upsertCount").unwrap_or(jobs.len()))
    }

    async fn delete_jobs(&self, job_ids: &[i64]) -> Result<usize> {
        if job_ids.is_empty() {
            return Ok(0);
        }

        let body = json!({
            "collectionName": self.jobs_collection,
            "filter": format!("id in {}", id_list(job_ids)),
        });
        let data = self.call("delete", body).await?;

        Ok(count_field(&data, "deleteCount").unwrap_or(job_ids.len()))
    }
}
