//! Configuration and data directory management.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::error::{Error, Result};

/// Default chunk width in characters.
pub const DEFAULT_CHUNK_SIZE: usize = 1500;
/// Default overlap between consecutive chunks in characters.
pub const DEFAULT_CHUNK_OVERLAP: usize = 200;
/// Default upload limit (10 MiB).
pub const DEFAULT_MAX_UPLOAD_BYTES: usize = 10 << 20;
/// Default bucket name for the HTTP object store.
pub const DEFAULT_STORAGE_BUCKET: &str = "documents";

/// Paths to all Insight data files and directories.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DataPaths {
    /// Root data directory (e.g., `data/`).
    pub root: PathBuf,
    /// SQLite database file (`data/insight.db`).
    pub db_file: PathBuf,
    /// Local blob storage (`data/blobs/`).
    pub blobs: PathBuf,
    /// LLM configuration (`data/llm-config.json`).
    pub llm_config_file: PathBuf,
    /// Bearer credentials for the static identity provider (`data/credentials.json`).
    pub credentials_file: PathBuf,
}

impl DataPaths {
    /// Create data paths from a root directory. Creates directories if needed.
    pub fn new(root: impl AsRef<Path>) -> std::io::Result<Self> {
        let root = root.as_ref().to_path_buf();
        let paths = Self {
            db_file: root.join("insight.db"),
            blobs: root.join("blobs"),
            llm_config_file: root.join("llm-config.json"),
            credentials_file: root.join("credentials.json"),
            root,
        };
        paths.ensure_dirs()?;
        Ok(paths)
    }

    fn ensure_dirs(&self) -> std::io::Result<()> {
        std::fs::create_dir_all(&self.root)?;
        std::fs::create_dir_all(&self.blobs)?;
        Ok(())
    }
}

/// Sliding-window chunking parameters, measured in characters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChunkingConfig {
    pub chunk_size: usize,
    pub chunk_overlap: usize,
}

impl Default for ChunkingConfig {
    fn default() -> Self {
        Self {
            chunk_size: DEFAULT_CHUNK_SIZE,
            chunk_overlap: DEFAULT_CHUNK_OVERLAP,
        }
    }
}

impl ChunkingConfig {
    /// Reject configurations whose window would never advance.
    pub fn validate(&self) -> Result<()> {
        if self.chunk_size == 0 {
            return Err(Error::Config("chunk size must be greater than zero".into()));
        }
        if self.chunk_overlap >= self.chunk_size {
            return Err(Error::Config(format!(
                "chunk overlap ({}) must be smaller than chunk size ({})",
                self.chunk_overlap, self.chunk_size
            )));
        }
        Ok(())
    }
}

/// Sizing of the background chat-history writer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatLogConfig {
    /// Maximum number of pending turn pairs before new ones are dropped.
    pub queue_capacity: usize,
    /// Number of worker tasks draining the queue.
    pub workers: usize,
}

impl Default for ChatLogConfig {
    fn default() -> Self {
        Self {
            queue_capacity: 256,
            workers: 2,
        }
    }
}

/// Where uploaded blobs are written.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum StorageBackend {
    /// Files under `DataPaths::blobs`.
    Local,
    /// Supabase-style object storage REST API.
    Http {
        base_url: String,
        service_key: String,
        bucket: String,
    },
}

/// Top-level Insight configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InsightConfig {
    /// HTTP server port.
    pub port: u16,
    /// Data directory paths.
    pub data_paths: DataPaths,
    pub chunking: ChunkingConfig,
    /// Largest accepted upload body in bytes.
    pub max_upload_bytes: usize,
    pub chat_log: ChatLogConfig,
    pub storage: StorageBackend,
}

impl InsightConfig {
    /// Create configuration from environment and defaults.
    pub fn from_env(data_dir: impl AsRef<Path>) -> Result<Self> {
        Self::from_vars(data_dir, |key| std::env::var(key).ok())
    }

    /// Create configuration from an arbitrary variable lookup.
    pub fn from_vars<F>(data_dir: impl AsRef<Path>, lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let port = parse_var(&lookup, "PORT")?.unwrap_or(8080);

        let chunking = ChunkingConfig {
            chunk_size: parse_var(&lookup, "INSIGHT_CHUNK_SIZE")?.unwrap_or(DEFAULT_CHUNK_SIZE),
            chunk_overlap: parse_var(&lookup, "INSIGHT_CHUNK_OVERLAP")?
                .unwrap_or(DEFAULT_CHUNK_OVERLAP),
        };
        chunking.validate()?;

        let max_upload_bytes =
            parse_var(&lookup, "INSIGHT_MAX_UPLOAD_BYTES")?.unwrap_or(DEFAULT_MAX_UPLOAD_BYTES);

        let defaults = ChatLogConfig::default();
        let chat_log = ChatLogConfig {
            queue_capacity: parse_var(&lookup, "INSIGHT_CHAT_LOG_QUEUE")?
                .unwrap_or(defaults.queue_capacity)
                .max(1),
            workers: parse_var(&lookup, "INSIGHT_CHAT_LOG_WORKERS")?
                .unwrap_or(defaults.workers)
                .max(1),
        };

        let storage = match lookup("INSIGHT_STORAGE").as_deref() {
            None | Some("local") => StorageBackend::Local,
            Some("http") => {
                let base_url = lookup("SUPABASE_URL").filter(|v| !v.is_empty());
                let service_key = lookup("SUPABASE_SERVICE_KEY").filter(|v| !v.is_empty());
                match (base_url, service_key) {
                    (Some(base_url), Some(service_key)) => StorageBackend::Http {
                        base_url: base_url.trim_end_matches('/').to_string(),
                        service_key,
                        bucket: lookup("INSIGHT_STORAGE_BUCKET")
                            .unwrap_or_else(|| DEFAULT_STORAGE_BUCKET.to_string()),
                    },
                    _ => {
                        return Err(Error::Config(
                            "SUPABASE_URL and SUPABASE_SERVICE_KEY must be set for http storage"
                                .into(),
                        ))
                    }
                }
            }
            Some(other) => {
                return Err(Error::Config(format!("unknown storage backend: {}", other)));
            }
        };

        let mut data_paths = DataPaths::new(data_dir)?;
        if let Some(path) = lookup("INSIGHT_CREDENTIALS_FILE").filter(|v| !v.is_empty()) {
            data_paths.credentials_file = PathBuf::from(path);
        }

        Ok(Self {
            port,
            data_paths,
            chunking,
            max_upload_bytes,
            chat_log,
            storage,
        })
    }
}

fn parse_var<T, F>(lookup: &F, key: &str) -> Result<Option<T>>
where
    T: std::str::FromStr,
    F: Fn(&str) -> Option<String>,
{
    match lookup(key) {
        Some(raw) => raw
            .trim()
            .parse()
            .map(Some)
            .map_err(|_| Error::Config(format!("invalid value for {}: {:?}", key, raw))),
        None => Ok(None),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use tempfile::TempDir;

    fn vars(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_defaults() {
        let dir = TempDir::new().unwrap();
        let config = InsightConfig::from_vars(dir.path(), vars(&[])).unwrap();

        assert_eq!(config.port, 8080);
        assert_eq!(config.chunking, ChunkingConfig::default());
        assert_eq!(config.max_upload_bytes, 10 * 1024 * 1024);
        assert_eq!(config.storage, StorageBackend::Local);
        assert!(config.data_paths.blobs.is_dir());
        assert_eq!(config.data_paths.db_file, dir.path().join("insight.db"));
    }

    #[test]
    fn test_overrides() {
        let dir = TempDir::new().unwrap();
        let config = InsightConfig::from_vars(
            dir.path(),
            vars(&[
                ("PORT", "9000"),
                ("INSIGHT_CHUNK_SIZE", "100"),
                ("INSIGHT_CHUNK_OVERLAP", "10"),
                ("INSIGHT_CHAT_LOG_WORKERS", "0"),
            ]),
        )
        .unwrap();

        assert_eq!(config.port, 9000);
        assert_eq!(config.chunking.chunk_size, 100);
        assert_eq!(config.chunking.chunk_overlap, 10);
        // At least one worker always runs.
        assert_eq!(config.chat_log.workers, 1);
    }

    #[test]
    fn test_credentials_file_override() {
        let dir = TempDir::new().unwrap();
        let config = InsightConfig::from_vars(dir.path(), vars(&[])).unwrap();
        assert_eq!(
            config.data_paths.credentials_file,
            dir.path().join("credentials.json")
        );

        let config = InsightConfig::from_vars(
            dir.path(),
            vars(&[("INSIGHT_CREDENTIALS_FILE", "/etc/insight/tokens.json")]),
        )
        .unwrap();
        assert_eq!(
            config.data_paths.credentials_file,
            PathBuf::from("/etc/insight/tokens.json")
        );
    }

    #[test]
    fn test_overlap_must_be_smaller_than_size() {
        let dir = TempDir::new().unwrap();
        let err = InsightConfig::from_vars(
            dir.path(),
            vars(&[("INSIGHT_CHUNK_SIZE", "200"), ("INSIGHT_CHUNK_OVERLAP", "200")]),
        )
        .unwrap_err();
        assert!(matches!(err, Error::Config(_)));

        let zero = ChunkingConfig {
            chunk_size: 0,
            chunk_overlap: 0,
        };
        assert!(zero.validate().is_err());
    }

    #[test]
    fn test_invalid_number_is_rejected() {
        let dir = TempDir::new().unwrap();
        let err = InsightConfig::from_vars(dir.path(), vars(&[("PORT", "eighty")])).unwrap_err();
        assert!(err.to_string().contains("PORT"));
    }

    #[test]
    fn test_http_storage_requires_credentials() {
        let dir = TempDir::new().unwrap();
        let err = InsightConfig::from_vars(dir.path(), vars(&[("INSIGHT_STORAGE", "http")]))
            .unwrap_err();
        assert!(matches!(err, Error::Config(_)));

        let config = InsightConfig::from_vars(
            dir.path(),
            vars(&[
                ("INSIGHT_STORAGE", "http"),
                ("SUPABASE_URL", "https://example.supabase.co/"),
                ("SUPABASE_SERVICE_KEY", "secret"),
            ]),
        )
        .unwrap();
        assert_eq!(
            config.storage,
            StorageBackend::Http {
                base_url: "https://example.supabase.co".into(),
                service_key: "secret".into(),
                bucket: "documents".into(),
            }
        );
    }
}
