//! Object storage for uploaded and rendered images
//!
//! Objects are addressed by slash-separated keys (`<job id>/<side>-<phase>.jpg`).
//! The local backend keeps them under one directory which the HTTP server also
//! exposes at `/objects`, so stored images have URLs the inference provider can
//! fetch.

use async_trait::async_trait;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use thiserror::Error;
use walkdir::WalkDir;

/// Object storage errors
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Invalid object key: {0}")]
    InvalidKey(String),

    #[error("Object not found: {0}")]
    NotFound(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Storage task failed: {0}")]
    Task(String),
}

/// Key/value blob store with public URLs
#[async_trait]
pub trait ObjectStorage: Send + Sync {
    /// Store `bytes` under `key` and return the object's public URL
    async fn upload(&self, bytes: Vec<u8>, key: &str, content_type: &str)
        -> Result<String, StorageError>;

    /// Keys under `prefix`, sorted
    async fn list(&self, prefix: &str) -> Result<Vec<String>, StorageError>;

    async fn read(&self, key: &str) -> Result<Vec<u8>, StorageError>;

    /// Remove every object under `prefix`; missing prefixes are not an error
    async fn delete_prefix(&self, prefix: &str) -> Result<(), StorageError>;

    fn public_url(&self, key: &str) -> String;
}

/// Filesystem-backed object storage
pub struct LocalObjectStorage {
    root: PathBuf,
    public_base_url: String,
}

impl LocalObjectStorage {
    pub fn new(root: impl Into<PathBuf>, public_base_url: impl Into<String>) -> Self {
        Self {
            root: root.into(),
            public_base_url: public_base_url.into().trim_end_matches('/').to_string(),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn object_path(&self, key: &str) -> Result<PathBuf, StorageError> {
        validate_key(key)?;
        Ok(self.root.join(key))
    }
}

/// Reject keys that could escape the storage root
fn validate_key(key: &str) -> Result<(), StorageError> {
    let invalid = key.is_empty()
        || key.starts_with('/')
        || key.contains('\\')
        || key.split('/').any(|segment| segment == "..");

    if invalid {
        return Err(StorageError::InvalidKey(key.to_string()));
    }
    Ok(())
}

#[async_trait]
impl ObjectStorage for LocalObjectStorage {
    async fn upload(
        &self,
        bytes: Vec<u8>,
        key: &str,
        content_type: &str,
    ) -> Result<String, StorageError> {
        let path = self.object_path(key)?;
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::write(&path, &bytes).await?;

        tracing::debug!(key, content_type, size = bytes.len(), "Stored object");
        Ok(self.public_url(key))
    }

    async fn list(&self, prefix: &str) -> Result<Vec<String>, StorageError> {
        validate_key(prefix)?;
        let root = self.root.clone();
        let prefix = prefix.to_string();

        tokio::task::spawn_blocking(move || {
            let start = match prefix.rfind('/') {
                Some(pos) => root.join(&prefix[..pos]),
                None => root.clone(),
            };
            if !start.is_dir() {
                return Vec::new();
            }

            let mut keys: Vec<String> = WalkDir::new(&start)
                .follow_links(false)
                .into_iter()
                .filter_map(|entry| match entry {
                    Ok(entry) => Some(entry),
                    Err(e) => {
                        tracing::warn!("Error accessing object entry: {}", e);
                        None
                    }
                })
                .filter(|entry| entry.file_type().is_file())
                .filter_map(|entry| {
                    let relative = entry.path().strip_prefix(&root).ok()?;
                    let key = relative
                        .components()
                        .map(|c| c.as_os_str().to_string_lossy())
                        .collect::<Vec<_>>()
                        .join("/");
                    key.starts_with(&prefix).then_some(key)
                })
                .collect();

            keys.sort();
            keys
        })
        .await
        .map_err(|e| StorageError::Task(e.to_string()))
    }

    async fn read(&self, key: &str) -> Result<Vec<u8>, StorageError> {
        let path = self.object_path(key)?;
        match tokio::fs::read(&path).await {
            Ok(bytes) => Ok(bytes),
            Err(e) if e.kind() == ErrorKind::NotFound => Err(StorageError::NotFound(key.to_string())),
            Err(e) => Err(e.into()),
        }
    }

    async fn delete_prefix(&self, prefix: &str) -> Result<(), StorageError> {
        let path = self.object_path(prefix.trim_end_matches('/'))?;
        match tokio::fs::remove_dir_all(&path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    fn public_url(&self, key: &str) -> String {
        format!("{}/objects/{}", self.public_base_url, key)
    }
}
