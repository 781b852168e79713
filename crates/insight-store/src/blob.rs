//! Object storage for uploaded files.
//!
//! Blobs are addressed by a relative path of the form
//! `{user_id}/{document_id}/{file_name}`. The database only records that path;
//! the bytes live behind a [`BlobStore`].

use std::collections::HashMap;
use std::path::{Component, Path, PathBuf};

use async_trait::async_trait;
use parking_lot::Mutex;
use reqwest::header::CONTENT_TYPE;
use reqwest::Url;
use tracing::debug;

#[derive(Debug, thiserror::Error)]
pub enum BlobError {
    #[error("invalid blob path: {0}")]
    InvalidPath(String),

    #[error("blob not found: {0}")]
    NotFound(String),

    #[error("blob I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("blob service error: {0}")]
    Remote(String),
}

/// Destination for uploaded file bytes.
#[async_trait]
pub trait BlobStore: Send + Sync {
    /// Write `bytes` at `path`, replacing any existing object.
    async fn put(&self, path: &str, bytes: Vec<u8>, content_type: &str) -> Result<(), BlobError>;

    /// Remove the object at `path`.
    async fn delete(&self, path: &str) -> Result<(), BlobError>;

    /// Short name for logs.
    fn name(&self) -> &str;
}

/// Storage path for an uploaded file.
pub fn blob_path(user_id: &str, document_id: &str, file_name: &str) -> String {
    format!("{}/{}/{}", user_id, document_id, file_name)
}

// ---------------------------------------------------------------
// Local filesystem
// ---------------------------------------------------------------

/// Blobs stored as plain files under a root directory.
pub struct LocalBlobStore {
    root: PathBuf,
}

impl LocalBlobStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Resolve a relative blob path under the root, rejecting escapes.
    fn resolve(&self, path: &str) -> Result<PathBuf, BlobError> {
        let relative = Path::new(path);
        if path.is_empty() || relative.is_absolute() {
            return Err(BlobError::InvalidPath(path.to_string()));
        }
        for component in relative.components() {
            match component {
                Component::Normal(_) => {}
                _ => return Err(BlobError::InvalidPath(path.to_string())),
            }
        }
        Ok(self.root.join(relative))
    }
}

#[async_trait]
impl BlobStore for LocalBlobStore {
    async fn put(&self, path: &str, bytes: Vec<u8>, _content_type: &str) -> Result<(), BlobError> {
        let target = self.resolve(path)?;
        if let Some(parent) = target.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::write(&target, bytes).await?;
        debug!("Wrote blob {}", target.display());
        Ok(())
    }

    async fn delete(&self, path: &str) -> Result<(), BlobError> {
        let target = self.resolve(path)?;
        match tokio::fs::remove_file(&target).await {
            Ok(()) => {}
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(BlobError::NotFound(path.to_string()));
            }
            Err(e) => return Err(e.into()),
        }

        // Drop now-empty parent directories up to the root.
        let mut dir = target.parent();
        while let Some(d) = dir {
            if d == self.root || tokio::fs::remove_dir(d).await.is_err() {
                break;
            }
            dir = d.parent();
        }
        Ok(())
    }

    fn name(&self) -> &str {
        "local"
    }
}

// ---------------------------------------------------------------
// HTTP object storage (Supabase storage REST API)
// ---------------------------------------------------------------

/// Blobs stored in a remote bucket behind the Supabase storage API.
pub struct HttpBlobStore {
    client: reqwest::Client,
    base_url: String,
    service_key: String,
    bucket: String,
}

impl HttpBlobStore {
    pub fn new(base_url: &str, service_key: &str, bucket: &str) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
            service_key: service_key.to_string(),
            bucket: bucket.to_string(),
        }
    }

    /// Object endpoint for `path`. Each path segment is percent-encoded, so
    /// the key stays exactly `{user}/{doc}/{file}` whatever the file name holds.
    fn object_url(&self, path: &str) -> Result<Url, BlobError> {
        let invalid = |reason: String| {
            BlobError::Remote(format!("invalid storage URL {}: {}", self.base_url, reason))
        };
        let mut url = Url::parse(&format!("{}/storage/v1/object", self.base_url))
            .map_err(|e| invalid(e.to_string()))?;
        url.path_segments_mut()
            .map_err(|_| invalid("cannot be a base".into()))?
            .pop_if_empty()
            .push(&self.bucket)
            .extend(path.split('/').filter(|segment| !segment.is_empty()));
        Ok(url)
    }

    async fn check(resp: reqwest::Response, path: &str) -> Result<(), BlobError> {
        let status = resp.status();
        if status.is_success() {
            return Ok(());
        }
        if status == reqwest::StatusCode::NOT_FOUND {
            return Err(BlobError::NotFound(path.to_string()));
        }
        let body = resp.text().await.unwrap_or_default();
        Err(BlobError::Remote(format!("{} ({}): {}", path, status, body)))
    }
}

#[async_trait]
impl BlobStore for HttpBlobStore {
    async fn put(&self, path: &str, bytes: Vec<u8>, content_type: &str) -> Result<(), BlobError> {
        let resp = self
            .client
            .post(self.object_url(path)?)
            .bearer_auth(&self.service_key)
            .header(CONTENT_TYPE, content_type)
            .body(bytes)
            .send()
            .await
            .map_err(|e| BlobError::Remote(e.to_string()))?;
        Self::check(resp, path).await
    }

    async fn delete(&self, path: &str) -> Result<(), BlobError> {
        let resp = self
            .client
            .delete(self.object_url(path)?)
            .bearer_auth(&self.service_key)
            .send()
            .await
            .map_err(|e| BlobError::Remote(e.to_string()))?;
        Self::check(resp, path).await
    }

    fn name(&self) -> &str {
        "http"
    }
}

// ---------------------------------------------------------------
// In-memory
// ---------------------------------------------------------------

/// Blobs held in a map. Used by tests and ephemeral deployments.
#[derive(Default)]
pub struct MemoryBlobStore {
    objects: Mutex<HashMap<String, (Vec<u8>, String)>>,
    fail_puts: Mutex<bool>,
}

impl MemoryBlobStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make subsequent `put` calls fail.
    pub fn fail_puts(&self, fail: bool) {
        *self.fail_puts.lock() = fail;
    }

    pub fn get(&self, path: &str) -> Option<Vec<u8>> {
        self.objects.lock().get(path).map(|(bytes, _)| bytes.clone())
    }

    pub fn content_type(&self, path: &str) -> Option<String> {
        self.objects.lock().get(path).map(|(_, ct)| ct.clone())
    }

    pub fn contains(&self, path: &str) -> bool {
        self.objects.lock().contains_key(path)
    }

    pub fn len(&self) -> usize {
        self.objects.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.objects.lock().is_empty()
    }
}

#[async_trait]
impl BlobStore for MemoryBlobStore {
    async fn put(&self, path: &str, bytes: Vec<u8>, content_type: &str) -> Result<(), BlobError> {
        if *self.fail_puts.lock() {
            return Err(BlobError::Remote(format!("put rejected: {}", path)));
        }
        self.objects
            .lock()
            .insert(path.to_string(), (bytes, content_type.to_string()));
        Ok(())
    }

    async fn delete(&self, path: &str) -> Result<(), BlobError> {
        match self.objects.lock().remove(path) {
            Some(_) => Ok(()),
            None => Err(BlobError::NotFound(path.to_string())),
        }
    }

    fn name(&self) -> &str {
        "memory"
    }
}
