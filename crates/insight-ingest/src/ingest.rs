//! Document ingestion pipeline: upload → blob → text → chunks → store.

use std::sync::Arc;

use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::chunking::Chunker;
use crate::extract::{base_file_name, extract_text, ExtractError, FileType};
use insight_core::UserProfile;
use insight_store::{blob_path, BlobStore, NewDocument, SqliteStore};

/// The first pipeline stage that failed.
#[derive(Debug, thiserror::Error)]
pub enum IngestError {
    #[error("failed to sync user: {0}")]
    UserSyncFailed(String),

    #[error("failed to store file: {0}")]
    StorageWriteFailed(String),

    #[error("failed to extract text: {0}")]
    ExtractionFailed(#[from] ExtractError),

    #[error("failed to save document: {0}")]
    PersistenceFailed(String),
}

/// Handles document ingestion: user sync, blob write, extraction, chunking,
/// and the atomic document + chunks insert.
pub struct Ingester {
    store: Arc<SqliteStore>,
    blobs: Arc<dyn BlobStore>,
    chunker: Chunker,
}

impl Ingester {
    pub fn new(store: Arc<SqliteStore>, blobs: Arc<dyn BlobStore>, chunker: Chunker) -> Self {
        Self {
            store,
            blobs,
            chunker,
        }
    }

    /// Ingest an uploaded file for `user_id`. Returns the new document id.
    ///
    /// A blob written before a later stage fails is left in place.
    pub async fn ingest(
        &self,
        user_id: &str,
        profile: &UserProfile,
        file_bytes: Vec<u8>,
        file_name: &str,
    ) -> Result<String, IngestError> {
        // Unsupported files are rejected before anything is written.
        let file_type = FileType::from_file_name(file_name)?;

        self.store
            .upsert_user(user_id, &profile.email)
            .map_err(|e| IngestError::UserSyncFailed(e.to_string()))?;

        let doc_id = Uuid::new_v4().to_string();
        let storage_path = blob_path(user_id, &doc_id, base_file_name(file_name));
        self.blobs
            .put(&storage_path, file_bytes.clone(), file_type.content_type())
            .await
            .map_err(|e| IngestError::StorageWriteFailed(e.to_string()))?;
        debug!("Stored {} ({} bytes) via {}", storage_path, file_bytes.len(), self.blobs.name());

        let chunker = self.chunker;
        let name = file_name.to_string();
        let chunks = tokio::task::spawn_blocking(move || {
            extract_text(&file_bytes, &name).map(|text| {
                debug!("Extracted {} chars from {}", text.chars().count(), name);
                chunker.chunk(&text)
            })
        })
        .await
        .map_err(|e| ExtractError::CorruptInput(format!("extraction task failed: {}", e)))?
        .map_err(|e| {
            warn!("Extraction failed for {}, blob {} kept: {}", file_name, storage_path, e);
            e
        })?;
        debug!("Document {} split into {} chunks", doc_id, chunks.len());

        let doc = NewDocument {
            id: doc_id.clone(),
            user_id: user_id.to_string(),
            file_name: file_name.to_string(),
            storage_path,
        };
        self.store
            .insert_document_with_chunks(&doc, &chunks)
            .map_err(|e| {
                warn!("Rolled back document {}, blob {} kept: {}", doc.id, doc.storage_path, e);
                IngestError::PersistenceFailed(e.to_string())
            })?;

        info!("Ingested document {} ({}) with {} chunks", doc_id, file_name, chunks.len());
        Ok(doc_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use insight_core::ChunkingConfig;
    use insight_store::MemoryBlobStore;
    use tempfile::TempDir;

    struct Fixture {
        store: Arc<SqliteStore>,
        blobs: Arc<MemoryBlobStore>,
        ingester: Ingester,
        _dir: TempDir,
    }

    fn fixture() -> Fixture {
        let dir = TempDir::new().unwrap();
        let store = Arc::new(SqliteStore::open(dir.path().join("insight.db")).unwrap());
        let blobs = Arc::new(MemoryBlobStore::new());
        let ingester = Ingester::new(
            store.clone(),
            blobs.clone(),
            Chunker::new(ChunkingConfig::default()),
        );
        Fixture {
            store,
            blobs,
            ingester,
            _dir: dir,
        }
    }

    fn alice() -> UserProfile {
        UserProfile {
            user_id: "alice".into(),
            email: "alice@example.com".into(),
        }
    }

    #[tokio::test]
    async fn test_ingest_text_file() {
        let f = fixture();
        let text = "x".repeat(3200);

        let doc_id = f
            .ingester
            .ingest("alice", &alice(), text.clone().into_bytes(), "notes.txt")
            .await
            .unwrap();

        let doc = f.store.get_document(&doc_id).unwrap().unwrap();
        assert_eq!(doc.user_id, "alice");
        assert_eq!(doc.file_name, "notes.txt");
        assert_eq!(doc.storage_path, format!("alice/{}/notes.txt", doc_id));
        assert_eq!(f.blobs.get(&doc.storage_path).unwrap(), text.as_bytes());
        assert_eq!(
            f.blobs.content_type(&doc.storage_path).as_deref(),
            Some("text/plain; charset=utf-8")
        );

        let chunks = f.store.get_chunks_for_document(&doc_id).unwrap();
        let indices: Vec<i64> = chunks.iter().map(|c| c.chunk_index).collect();
        assert_eq!(indices, vec![0, 1, 2]);
        assert_eq!(f.store.get_user("alice").unwrap().unwrap().email, "alice@example.com");
    }

    #[tokio::test]
    async fn test_storage_path_uses_base_name() {
        let f = fixture();

        let doc_id = f
            .ingester
            .ingest("alice", &alice(), b"hello".to_vec(), "../reports/q3.txt")
            .await
            .unwrap();

        let doc = f.store.get_document(&doc_id).unwrap().unwrap();
        assert_eq!(doc.storage_path, format!("alice/{}/q3.txt", doc_id));
        assert_eq!(doc.file_name, "../reports/q3.txt");
    }

    #[tokio::test]
    async fn test_empty_text_stores_one_empty_chunk() {
        let f = fixture();

        let doc_id = f.ingester.ingest("alice", &alice(), Vec::new(), "empty.txt").await.unwrap();

        let chunks = f.store.get_chunks_for_document(&doc_id).unwrap();
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].content, "");
    }

    #[tokio::test]
    async fn test_unsupported_extension_writes_nothing() {
        let f = fixture();

        let err = f
            .ingester
            .ingest("alice", &alice(), b"binary".to_vec(), "photo.png")
            .await
            .unwrap_err();

        assert!(matches!(
            err,
            IngestError::ExtractionFailed(ExtractError::UnsupportedFormat(ref ext)) if ext == "png"
        ));
        assert!(f.store.get_user("alice").unwrap().is_none());
        assert!(f.blobs.is_empty());
        assert_eq!(f.store.count_documents().unwrap(), 0);
    }

    #[tokio::test]
    async fn test_blob_failure_records_no_document() {
        let f = fixture();
        f.blobs.fail_puts(true);

        let err = f
            .ingester
            .ingest("alice", &alice(), b"hello".to_vec(), "notes.txt")
            .await
            .unwrap_err();

        assert!(matches!(err, IngestError::StorageWriteFailed(_)));
        assert_eq!(f.store.count_documents().unwrap(), 0);
        assert_eq!(f.store.count_chunks(None).unwrap(), 0);
    }

    #[tokio::test]
    async fn test_corrupt_pdf_keeps_orphan_blob() {
        let f = fixture();

        let err = f
            .ingester
            .ingest("alice", &alice(), b"not a pdf".to_vec(), "broken.pdf")
            .await
            .unwrap_err();

        assert!(matches!(
            err,
            IngestError::ExtractionFailed(ExtractError::CorruptInput(_))
        ));
        assert_eq!(f.blobs.len(), 1);
        assert_eq!(f.store.count_documents().unwrap(), 0);
    }

    #[tokio::test]
    async fn test_chunk_insert_failure_rolls_back() {
        let f = fixture();
        f.store
            .with_connection(|conn| {
                conn.execute_batch(
                    "CREATE TRIGGER reject_second_chunk BEFORE INSERT ON document_chunks
                     WHEN NEW.chunk_index = 1
                     BEGIN SELECT RAISE(ABORT, 'rejected'); END;",
                )
            })
            .unwrap();

        let err = f
            .ingester
            .ingest("alice", &alice(), "y".repeat(3200).into_bytes(), "long.txt")
            .await
            .unwrap_err();

        assert!(matches!(err, IngestError::PersistenceFailed(_)));
        assert_eq!(f.store.count_documents().unwrap(), 0);
        assert_eq!(f.store.count_chunks(None).unwrap(), 0);
        // The blob is not reconciled.
        assert_eq!(f.blobs.len(), 1);
    }
}
