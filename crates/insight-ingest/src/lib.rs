//! Turning uploads into stored, chunked documents, and managing them afterwards.

pub mod chunking;
pub mod extract;
pub mod ingest;
pub mod lifecycle;

pub use chunking::Chunker;
pub use extract::{extract_text, ExtractError, FileType};
pub use ingest::{IngestError, Ingester};
pub use lifecycle::{DocumentManager, LifecycleError};
