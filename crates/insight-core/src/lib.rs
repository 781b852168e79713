//! Shared error type, configuration and caller identity for the Insight workspace.

pub mod config;
pub mod error;
pub mod profile;

pub use config::{ChatLogConfig, ChunkingConfig, DataPaths, InsightConfig, StorageBackend};
pub use error::{Error, Result};
pub use profile::UserProfile;
