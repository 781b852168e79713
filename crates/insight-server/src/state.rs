//! Shared application state.

use std::sync::Arc;

use insight_chat::{Answerer, ChatLogger};
use insight_core::InsightConfig;
use insight_ingest::{Chunker, DocumentManager, Ingester};
use insight_store::{BlobStore, SqliteStore};

use crate::auth::IdentityProvider;

/// Shared application state accessible from all route handlers.
pub struct AppState {
    pub config: InsightConfig,
    pub store: Arc<SqliteStore>,
    pub identity: Arc<dyn IdentityProvider>,
    pub answerer: Arc<dyn Answerer>,
    pub ingester: Ingester,
    pub documents: DocumentManager,
    pub chat_logger: ChatLogger,
}

impl AppState {
    /// Wire the components together. Starts the chat-history workers, so this
    /// must run inside a tokio runtime.
    pub fn new(
        config: InsightConfig,
        store: Arc<SqliteStore>,
        blobs: Arc<dyn BlobStore>,
        identity: Arc<dyn IdentityProvider>,
        answerer: Arc<dyn Answerer>,
    ) -> Self {
        let chunker = Chunker::new(config.chunking);
        let ingester = Ingester::new(store.clone(), blobs.clone(), chunker);
        let documents = DocumentManager::new(store.clone(), blobs);
        let chat_logger = ChatLogger::start(store.clone(), config.chat_log);

        Self {
            config,
            store,
            identity,
            answerer,
            ingester,
            documents,
            chat_logger,
        }
    }
}
