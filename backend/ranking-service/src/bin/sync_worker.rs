//! Consumes job outbox events from a Redis stream and mirrors them into
//! the job collection of the vector index.
//!
//! Environment: see `Config::from_env`. `LOG_FORMAT=json` switches to JSON logs.

use anyhow::Context;
use job_ranking_service::clients::{HttpEmbeddingClient, MilvusClient};
use job_ranking_service::sync::{JobStreamConsumer, JobSyncProcessor, RedisJobStream};
use job_ranking_service::Config;
use redis::aio::ConnectionManager;
use std::sync::Arc;
use tokio::sync::watch;
use tracing::{error, info};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let json = std::env::var("LOG_FORMAT")
        .map(|v| v.eq_ignore_ascii_case("json"))
        .unwrap_or(false);

    if json {
        tracing_subscriber::registry()
            .with(fmt::layer().json())
            .with(filter)
            .init();
    } else {
        tracing_subscriber::registry()
            .with(fmt::layer())
            .with(filter)
            .init();
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing();

    let config = Config::from_env().context("Failed to load config")?;
    config.validate().context("Invalid config")?;
    let sync_config = config.sync_config();

    info!(
        stream = %sync_config.stream_name,
        group = %sync_config.consumer_group,
        consumer = %sync_config.consumer_name,
        "Starting job sync worker"
    );

    let embedder = HttpEmbeddingClient::new(&config.embedding_url, config.http_timeout())
        .context("Failed to build embedding client")?;
    let index = MilvusClient::new(
        &config.milvus_url,
        config.milvus_token.clone(),
        &config.jobs_collection,
        &config.users_collection,
        config.dense_dim,
        config.http_timeout(),
    )
    .context("Failed to build vector index client")?;

    let redis_client =
        redis::Client::open(config.redis_url.as_str()).context("Invalid Redis URL")?;
    let conn = ConnectionManager::new(redis_client)
        .await
        .context("Failed to connect to Redis")?;

    let ack_on_failure = sync_config.ack_on_failure;
    let max_deliveries = sync_config.max_deliveries;
    let stream = RedisJobStream::new(conn, sync_config);
    let processor = JobSyncProcessor::new(Arc::new(embedder), Arc::new(index));
    let consumer = JobStreamConsumer::new(Arc::new(stream), processor, ack_on_failure)
        .with_max_deliveries(max_deliveries);

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => info!("Received shutdown signal"),
            Err(e) => error!(error = %e, "Failed to listen for shutdown signal"),
        }
        let _ = shutdown_tx.send(true);
    });

    consumer.run(shutdown_rx).await?;
    info!("Job sync worker exited");
    Ok(())
}
