//! Owner-scoped listing, deletion and chat history of documents.

use std::sync::Arc;

use tracing::{info, warn};

use insight_store::{BlobStore, ChatTurn, DocumentSummary, SqliteStore};

#[derive(Debug, thiserror::Error)]
pub enum LifecycleError {
    /// The document does not exist or belongs to someone else.
    #[error("document not found")]
    NotFoundOrForbidden,

    #[error("persistence failure: {0}")]
    Persistence(#[from] insight_core::Error),
}

pub struct DocumentManager {
    store: Arc<SqliteStore>,
    blobs: Arc<dyn BlobStore>,
}

impl DocumentManager {
    pub fn new(store: Arc<SqliteStore>, blobs: Arc<dyn BlobStore>) -> Self {
        Self { store, blobs }
    }

    /// Documents owned by `user_id`, newest first.
    pub fn list(&self, user_id: &str) -> Result<Vec<DocumentSummary>, LifecycleError> {
        Ok(self.store.list_documents(user_id)?)
    }

    /// Delete a document owned by `user_id`.
    ///
    /// Blob deletion is best effort: a failure is logged and the metadata is
    /// removed anyway. Chunks and chat history go with the document row.
    pub async fn delete(&self, user_id: &str, document_id: &str) -> Result<(), LifecycleError> {
        let storage_path = self
            .store
            .find_storage_path(document_id, user_id)?
            .ok_or(LifecycleError::NotFoundOrForbidden)?;

        if let Err(e) = self.blobs.delete(&storage_path).await {
            warn!(
                "Failed to delete blob {} for document {}, removing metadata anyway: {}",
                storage_path, document_id, e
            );
        }

        self.store.delete_document(document_id)?;
        info!("Deleted document {} for user {}", document_id, user_id);
        Ok(())
    }

    /// Chat history of a document owned by `user_id`, oldest first.
    pub fn history(&self, user_id: &str, document_id: &str) -> Result<Vec<ChatTurn>, LifecycleError> {
        if !self.store.is_document_owner(document_id, user_id)? {
            return Err(LifecycleError::NotFoundOrForbidden);
        }
        Ok(self.store.get_chat_history(document_id)?)
    }
}
