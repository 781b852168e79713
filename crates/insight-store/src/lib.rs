//! SQLite persistence for users, documents, chunks and chat history, plus the
//! blob storage port.

pub mod blob;
pub mod schema;
pub mod sqlite;
pub mod types;

pub use blob::{blob_path, BlobError, BlobStore, HttpBlobStore, LocalBlobStore, MemoryBlobStore};
pub use sqlite::SqliteStore;
pub use types::*;
