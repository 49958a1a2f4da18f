use super::EmbeddingClient;
use crate::error::{AppError, Result};
use crate::models::Embeddings;
use async_trait::async_trait;
use reqwest::Client as HttpClient;
use serde::Serialize;
use std::time::Duration;
use tracing::debug;

/// Embedding model served over HTTP (`POST {base}/embed`).
pub struct HttpEmbeddingClient {
    client: HttpClient,
    endpoint: String,
}

#[derive(Serialize)]
struct EmbedRequest<'a> {
    texts: &'a [String],
}

impl HttpEmbeddingClient {
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self> {
        let client = HttpClient::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| AppError::Configuration(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            client,
            endpoint: format!("{}/embed", base_url.trim_end_matches('/')),
        })
    }
}

#[async_trait]
impl EmbeddingClient for HttpEmbeddingClient {
    async fn embed(&self, texts: &[String]) -> Result<Embeddings> {
        if texts.is_empty() {
            return Ok(Embeddings::default());
        }

        let response = self
            .client
            .post(&self.endpoint)
            .json(&EmbedRequest { texts })
            .send()
            .await
            .map_err(|e| AppError::Embedding(format!("Embedding request failed: {}", e)))?;

        if !response.status().is_success() {
            let status = response.status();
            let error_text = response.text().await.unwrap_or_default();
            return Err(AppError::Embedding(format!(
                "Embedding service returned {}: {}",
                status, error_text
            )));
        }

        let embeddings: Embeddings = response
            .json()
            .await
            .map_err(|e| AppError::Embedding(format!("Parse error: {}", e)))?;

        debug!(
            texts = texts.len(),
            dense = embeddings.dense.len(),
            sparse = embeddings.sparse.len(),
            "Generated embeddings"
        );

        Ok(embeddings)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_endpoint_strips_trailing_slash() {
        let client = HttpEmbeddingClient::new("http://embedder:8088/", Duration::from_secs(5)).unwrap();
        assert_eq!(client.endpoint, "http://embedder:8088/embed");
    }

    #[tokio::test]
    async fn test_empty_batch_skips_request() {
        // Unroutable address: the call must not reach the network.
        let client = HttpEmbeddingClient::new("http://127.0.0.1:1", Duration::from_secs(1)).unwrap();
        let embeddings = client.embed(&[]).await.unwrap();
        assert!(embeddings.dense.is_empty());
        assert!(embeddings.sparse.is_empty());
    }
}
