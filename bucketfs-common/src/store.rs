//! Object store capability set.
//!
//! Paths handed to an [`ObjectStore`] are `bucket/key` strings without a
//! leading slash. A path with no `/` names a bucket. Directory records and
//! marker objects have keys ending in `/`.

use bytes::Bytes;

use crate::documents::EntryType;

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("Not found: {0}")]
    NotFound(String),
    #[error("Unable to locate credentials")]
    MissingCredentials,
    #[error("Access denied: {0}")]
    AccessDenied(String),
    #[error("{code}: {message} (HTTP {status})")]
    Service {
        status: u16,
        code: String,
        message: String,
    },
    #[error("Malformed response: {0}")]
    Malformed(String),
    #[error("Invalid path: {0}")]
    InvalidPath(String),
}

/// A raw listing record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ObjectRecord {
    /// Full `bucket/key` path.
    pub key: String,
    pub kind: EntryType,
}

impl ObjectRecord {
    pub fn file(key: impl Into<String>) -> Self {
        Self { key: key.into(), kind: EntryType::File }
    }

    pub fn directory(key: impl Into<String>) -> Self {
        Self { key: key.into(), kind: EntryType::Directory }
    }
}

/// Split `bucket/key` into its bucket and key parts. The key may be empty.
pub fn split_path(path: &str) -> (&str, &str) {
    let path = path.trim_start_matches('/');
    match path.split_once('/') {
        Some((bucket, key)) => (bucket, key),
        None => (path, ""),
    }
}

/// Operations the filesystem layer needs from an object store.
#[async_trait::async_trait]
pub trait ObjectStore: Send + Sync {
    /// List bucket names visible to the current credentials.
    async fn list_buckets(&self) -> Result<Vec<String>, StoreError>;

    /// List the immediate children of a prefix (`""` lists buckets).
    ///
    /// Common prefixes come back as directory records; a marker object equal
    /// to the prefix itself is returned as a directory record too.
    async fn list_dir(&self, path: &str) -> Result<Vec<ObjectRecord>, StoreError>;

    /// Every object key under a prefix, recursively, as full paths.
    async fn walk(&self, path: &str) -> Result<Vec<String>, StoreError>;

    async fn get(&self, path: &str) -> Result<Bytes, StoreError>;

    async fn put(&self, path: &str, data: Bytes) -> Result<(), StoreError>;

    async fn copy(&self, src: &str, dst: &str) -> Result<(), StoreError>;

    /// Delete a single object. A bucket-only path removes the bucket.
    async fn delete(&self, path: &str) -> Result<(), StoreError>;

    /// Delete many keys from one bucket.
    async fn delete_many(&self, bucket: &str, keys: &[String]) -> Result<(), StoreError>;

    async fn exists(&self, path: &str) -> Result<bool, StoreError>;

    /// Create a bucket. Creating a bucket the caller already owns succeeds.
    async fn create_bucket(&self, bucket: &str) -> Result<(), StoreError>;

    /// Delete every object whose key starts with `prefix` inside `bucket`.
    /// Returns the number of removed objects.
    async fn delete_prefix(&self, bucket: &str, prefix: &str) -> Result<usize, StoreError> {
        let full = format!("{}/{}", bucket, prefix);
        let keys: Vec<String> = self
            .walk(&full)
            .await?
            .into_iter()
            .map(|path| split_path(&path).1.to_string())
            .collect();
        if keys.is_empty() {
            return Ok(0);
        }
        self.delete_many(bucket, &keys).await?;
        tracing::debug!(bucket = %bucket, prefix = %prefix, count = keys.len(), "Prefix deleted");
        Ok(keys.len())
    }

    /// Drop any cached listings so the next listing reflects external changes.
    fn invalidate_cache(&self) {}
}
