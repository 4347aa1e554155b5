use std::sync::Arc;

use anyhow::Context;
use tokio::sync::watch;
use tracing::{error, info};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use recommendation_service::config::Config;
use recommendation_service::db::{PgCatalogRepository, PgHistoryRepository};
use recommendation_service::services::cache::RedisVectorCache;
use recommendation_service::services::embedder::HttpEmbedder;
use recommendation_service::services::storage::S3AudioStore;
use recommendation_service::services::{EmbeddingHandlers, PersonalizationHandlers};
use recommendation_service::workers::{
    EmbeddingDispatcher, JobDispatcher, PersonalizationDispatcher, QueueWorker, RedisJobQueue,
    SonicDispatcher,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    let config = Config::from_env();
    info!(
        service = %config.service.service_name,
        version = env!("CARGO_PKG_VERSION"),
        "starting recommendation workers"
    );

    // Shared infrastructure clients
    let db_config = db_pool::DbConfig::from_env(&config.service.service_name)
        .map_err(anyhow::Error::msg)?;
    let pool = db_pool::create_pool(&db_config)
        .await
        .context("failed to create Postgres pool")?;

    let cache_pool = redis_utils::RedisPool::connect(&config.redis.url)
        .await
        .context("failed to connect to Redis")?;
    redis_utils::ping(&cache_pool.manager())
        .await
        .context("Redis did not answer PING")?;
    let queue_client = redis::Client::open(config.redis.url.clone())
        .context("failed to construct Redis client for queues")?;

    // Collaborators
    let catalog = Arc::new(PgCatalogRepository::new(pool.clone()));
    let history = Arc::new(PgHistoryRepository::new(pool));
    let embedder = Arc::new(HttpEmbedder::new(&config.embedder)?);
    let store = Arc::new(S3AudioStore::from_config(&config.storage).await);
    let cache = Arc::new(RedisVectorCache::new(cache_pool.manager()));

    let embedding_handlers = Arc::new(EmbeddingHandlers::new(
        catalog,
        embedder,
        store,
        config.storage.bucket.clone(),
    ));
    let personalization_handlers = Arc::new(PersonalizationHandlers::new(
        history,
        cache,
        config.personalization.clone(),
    ));

    // One worker per queue, all sharing the shutdown signal
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let mut workers = Vec::new();

    let embedding_dispatcher: Arc<dyn JobDispatcher> =
        Arc::new(EmbeddingDispatcher::new(embedding_handlers.clone()));
    let personalization_dispatcher: Arc<dyn JobDispatcher> =
        Arc::new(PersonalizationDispatcher::new(personalization_handlers));
    let sonic_dispatcher: Arc<dyn JobDispatcher> =
        Arc::new(SonicDispatcher::new(embedding_handlers));

    for (queue_name, dispatcher) in [
        (config.queues.embedding.clone(), embedding_dispatcher),
        (
            config.queues.personalization.clone(),
            personalization_dispatcher,
        ),
        (config.queues.sonic.clone(), sonic_dispatcher),
    ] {
        let queue = Arc::new(RedisJobQueue::new(
            queue_client.clone(),
            queue_name,
            config.queues.fetch_timeout_secs,
        ));
        let worker = QueueWorker::new(
            queue,
            dispatcher,
            config.worker.concurrency,
            shutdown_rx.clone(),
        );
        workers.push(tokio::spawn(worker.run()));
    }

    // Graceful shutdown: stop fetching, let in-flight jobs finish
    tokio::signal::ctrl_c()
        .await
        .context("failed to listen for shutdown signal")?;
    info!("shutdown signal received, draining workers");
    let _ = shutdown_tx.send(true);

    for handle in workers {
        if let Err(e) = handle.await {
            error!(error = %e, "worker task failed to join");
        }
    }

    info!("all workers stopped");
    Ok(())
}
