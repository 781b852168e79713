//! Insight: document upload and Q&A server.

use std::path::PathBuf;
use std::sync::Arc;

use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use insight_chat::{Answerer, LLMConfig, LlmAnswerer};
use insight_core::{InsightConfig, StorageBackend};
use insight_server::{build_router, AppState, IdentityProvider, StaticIdentityProvider};
use insight_store::{BlobStore, HttpBlobStore, LocalBlobStore, SqliteStore};

fn resolve_data_dir() -> PathBuf {
    std::env::var("INSIGHT_DATA_DIR")
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from("data"))
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let data_dir = resolve_data_dir();
    info!("Data directory: {}", data_dir.display());

    let config = InsightConfig::from_env(&data_dir)?;
    let port = config.port;

    let store = Arc::new(
        SqliteStore::open(&config.data_paths.db_file)
            .map_err(|e| anyhow::anyhow!("Failed to open store: {}", e))?,
    );

    let blobs: Arc<dyn BlobStore> = match &config.storage {
        StorageBackend::Local => Arc::new(LocalBlobStore::new(&config.data_paths.blobs)),
        StorageBackend::Http {
            base_url,
            service_key,
            bucket,
        } => Arc::new(HttpBlobStore::new(base_url, service_key, bucket)),
    };
    info!("Blob storage: {}", blobs.name());

    let identity: Arc<dyn IdentityProvider> = Arc::new(
        StaticIdentityProvider::load(&config.data_paths.credentials_file)
            .map_err(|e| anyhow::anyhow!("Failed to load credentials: {}", e))?,
    );

    let llm_config = LLMConfig::load(&config.data_paths.llm_config_file);
    let answerer = LlmAnswerer::new(store.clone(), llm_config);
    if !answerer.is_configured() {
        warn!("No LLM provider configured, chat requests will fail");
    }
    let answerer: Arc<dyn Answerer> = Arc::new(answerer);

    let state = Arc::new(AppState::new(config, store, blobs, identity, answerer));
    let app = build_router(state.clone());

    let addr = format!("0.0.0.0:{}", port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    info!("Insight server listening on {}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    state.chat_logger.shutdown().await;
    info!("Insight server stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!("Failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
    info!("Shutdown signal received");
}
