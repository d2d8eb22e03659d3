//! In-process object store.
//!
//! Mirrors S3 listing semantics over a bucket → key → bytes map. Used as the
//! `memory` backend for local development and by the test suite. One access
//! key / secret pair is accepted; any other explicit pair is denied and
//! ambient access is reported as missing credentials.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::{Arc, RwLock};

use async_trait::async_trait;
use bytes::Bytes;
use tracing::debug;

use bucketfs_common::documents::StoreConfig;
use bucketfs_common::store::{split_path, ObjectRecord, ObjectStore, StoreError};

use super::StoreProvider;

type Buckets = BTreeMap<String, BTreeMap<String, Bytes>>;

#[derive(Default)]
pub struct MemoryBackend {
    buckets: RwLock<Buckets>,
}

impl MemoryBackend {
    fn read<T>(&self, f: impl FnOnce(&Buckets) -> Result<T, StoreError>) -> Result<T, StoreError> {
        let buckets = self
            .buckets
            .read()
            .map_err(|_| StoreError::Malformed("memory store lock poisoned".to_string()))?;
        f(&buckets)
    }

    fn write<T>(
        &self,
        f: impl FnOnce(&mut Buckets) -> Result<T, StoreError>,
    ) -> Result<T, StoreError> {
        let mut buckets = self
            .buckets
            .write()
            .map_err(|_| StoreError::Malformed("memory store lock poisoned".to_string()))?;
        f(&mut buckets)
    }
}

pub struct MemoryProvider {
    backend: Arc<MemoryBackend>,
    access_key: String,
    secret_key: String,
}

impl MemoryProvider {
    pub fn new(access_key: impl Into<String>, secret_key: impl Into<String>) -> Self {
        Self {
            backend: Arc::new(MemoryBackend::default()),
            access_key: access_key.into(),
            secret_key: secret_key.into(),
        }
    }
}

impl StoreProvider for MemoryProvider {
    fn connect(&self, config: &StoreConfig) -> Result<Arc<dyn ObjectStore>, StoreError> {
        if !config.is_explicit() {
            return Err(StoreError::MissingCredentials);
        }
        let authorized = config.access_key == self.access_key && config.secret_key == self.secret_key;
        Ok(Arc::new(MemoryStore {
            backend: Arc::clone(&self.backend),
            authorized,
        }))
    }
}

pub struct MemoryStore {
    backend: Arc<MemoryBackend>,
    authorized: bool,
}

impl MemoryStore {
    /// A handle with full access, bypassing credential checks.
    #[cfg(test)]
    pub fn open(backend: Arc<MemoryBackend>) -> Self {
        Self { backend, authorized: true }
    }

    fn check_access(&self) -> Result<(), StoreError> {
        if self.authorized {
            Ok(())
        } else {
            Err(StoreError::AccessDenied(
                "The Access Key Id you provided does not exist in our records.".to_string(),
            ))
        }
    }
}

fn bucket_mut<'a>(
    buckets: &'a mut Buckets,
    bucket: &str,
) -> Result<&'a mut BTreeMap<String, Bytes>, StoreError> {
    buckets
        .get_mut(bucket)
        .ok_or_else(|| StoreError::NotFound(bucket.to_string()))
}

#[async_trait]
impl ObjectStore for MemoryStore {
    async fn list_buckets(&self) -> Result<Vec<String>, StoreError> {
        self.check_access()?;
        self.backend.read(|buckets| Ok(buckets.keys().cloned().collect()))
    }

    async fn list_dir(&self, path: &str) -> Result<Vec<ObjectRecord>, StoreError> {
        self.check_access()?;
        if path.is_empty() {
            return self.backend.read(|buckets| {
                Ok(buckets
                    .keys()
                    .map(|b| ObjectRecord::directory(format!("{}/", b)))
                    .collect())
            });
        }

        let (bucket, prefix) = split_path(path);
        self.backend.read(|buckets| {
            let objects = buckets
                .get(bucket)
                .ok_or_else(|| StoreError::NotFound(bucket.to_string()))?;

            let mut records = Vec::new();
            let mut common = BTreeSet::new();
            for key in objects.keys().filter(|k| k.starts_with(prefix)) {
                let rest = &key[prefix.len()..];
                if rest.is_empty() {
                    // marker object for the prefix itself
                    records.push(ObjectRecord::directory(format!("{}/{}", bucket, key)));
                } else if let Some(idx) = rest.find('/') {
                    common.insert(format!("{}{}", prefix, &rest[..=idx]));
                } else {
                    records.push(ObjectRecord::file(format!("{}/{}", bucket, key)));
                }
            }
            records.extend(
                common
                    .into_iter()
                    .map(|p| ObjectRecord::directory(format!("{}/{}", bucket, p))),
            );
            Ok(records)
        })
    }

    async fn walk(&self, path: &str) -> Result<Vec<String>, StoreError> {
        self.check_access()?;
        let (bucket, prefix) = split_path(path);
        self.backend.read(|buckets| {
            let objects = buckets
                .get(bucket)
                .ok_or_else(|| StoreError::NotFound(bucket.to_string()))?;
            Ok(objects
                .keys()
                .filter(|k| k.starts_with(prefix))
                .map(|k| format!("{}/{}", bucket, k))
                .collect())
        })
    }

    async fn get(&self, path: &str) -> Result<Bytes, StoreError> {
        self.check_access()?;
        let (bucket, key) = split_path(path);
        self.backend.read(|buckets| {
            buckets
                .get(bucket)
                .and_then(|objects| objects.get(key))
                .filter(|_| !key.is_empty())
                .cloned()
                .ok_or_else(|| StoreError::NotFound(path.to_string()))
        })
    }

    async fn put(&self, path: &str, data: Bytes) -> Result<(), StoreError> {
        self.check_access()?;
        let (bucket, key) = split_path(path);
        if key.is_empty() {
            return Err(StoreError::InvalidPath(path.to_string()));
        }
        self.backend.write(|buckets| {
            bucket_mut(buckets, bucket)?.insert(key.to_string(), data);
            Ok(())
        })?;
        debug!(path = %path, "Memory put");
        Ok(())
    }

    async fn copy(&self, src: &str, dst: &str) -> Result<(), StoreError> {
        self.check_access()?;
        let (src_bucket, src_key) = split_path(src);
        let (dst_bucket, dst_key) = split_path(dst);
        if src_key.is_empty() || dst_key.is_empty() {
            return Err(StoreError::InvalidPath(format!("{} -> {}", src, dst)));
        }
        self.backend.write(|buckets| {
            let data = buckets
                .get(src_bucket)
                .and_then(|objects| objects.get(src_key))
                .cloned()
                .ok_or_else(|| StoreError::NotFound(src.to_string()))?;
            bucket_mut(buckets, dst_bucket)?.insert(dst_key.to_string(), data);
            Ok(())
        })
    }

    async fn delete(&self, path: &str) -> Result<(), StoreError> {
        self.check_access()?;
        let (bucket, key) = split_path(path);
        self.backend.write(|buckets| {
            if key.is_empty() {
                let objects = buckets
                    .get(bucket)
                    .ok_or_else(|| StoreError::NotFound(bucket.to_string()))?;
                if !objects.is_empty() {
                    return Err(StoreError::Service {
                        status: 409,
                        code: "BucketNotEmpty".to_string(),
                        message: "The bucket you tried to delete is not empty".to_string(),
                    });
                }
                buckets.remove(bucket);
            } else if let Some(objects) = buckets.get_mut(bucket) {
                objects.remove(key);
            }
            Ok(())
        })
    }

    async fn delete_many(&self, bucket: &str, keys: &[String]) -> Result<(), StoreError> {
        self.check_access()?;
        self.backend.write(|buckets| {
            let objects = bucket_mut(buckets, bucket)?;
            for key in keys {
                objects.remove(key);
            }
            Ok(())
        })
    }

    async fn exists(&self, path: &str) -> Result<bool, StoreError> {
        self.check_access()?;
        let (bucket, key) = split_path(path);
        self.backend.read(|buckets| {
            Ok(match buckets.get(bucket) {
                Some(_) if key.is_empty() => true,
                Some(objects) => objects.contains_key(key),
                None => false,
            })
        })
    }

    async fn create_bucket(&self, bucket: &str) -> Result<(), StoreError> {
        self.check_access()?;
        if bucket.is_empty() || bucket.contains('/') {
            return Err(StoreError::InvalidPath(bucket.to_string()));
        }
        self.backend.write(|buckets| {
            buckets.entry(bucket.to_string()).or_default();
            Ok(())
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store() -> MemoryStore {
        MemoryStore::open(Arc::new(MemoryBackend::default()))
    }

    #[tokio::test]
    async fn test_roundtrip() {
        let store = store();
        store.create_bucket("data").await.unwrap();
        store.put("data/a/b.txt", Bytes::from("hello")).await.unwrap();
        assert_eq!(store.get("data/a/b.txt").await.unwrap(), Bytes::from("hello"));
        assert!(store.exists("data/a/b.txt").await.unwrap());
        assert!(store.exists("data").await.unwrap());
        assert!(!store.exists("data/a").await.unwrap());

        store.delete("data/a/b.txt").await.unwrap();
        assert!(matches!(store.get("data/a/b.txt").await, Err(StoreError::NotFound(_))));
    }

    #[tokio::test]
    async fn test_list_dir_groups_prefixes() {
        let store = store();
        store.create_bucket("data").await.unwrap();
        store.put("data/dir/", Bytes::new()).await.unwrap();
        store.put("data/dir/.keep", Bytes::new()).await.unwrap();
        store.put("data/dir/sub/x.txt", Bytes::from("x")).await.unwrap();
        store.put("data/dir/sub/y.txt", Bytes::from("y")).await.unwrap();
        store.put("data/top.txt", Bytes::from("t")).await.unwrap();

        let records = store.list_dir("data/dir/").await.unwrap();
        assert_eq!(
            records,
            vec![
                ObjectRecord::directory("data/dir/"),
                ObjectRecord::file("data/dir/.keep"),
                ObjectRecord::directory("data/dir/sub/"),
            ]
        );

        let root = store.list_dir("data/").await.unwrap();
        assert_eq!(
            root,
            vec![
                ObjectRecord::file("data/top.txt"),
                ObjectRecord::directory("data/dir/"),
            ]
        );

        assert_eq!(store.list_dir("").await.unwrap(), vec![ObjectRecord::directory("data/")]);
        assert_eq!(store.walk("data/dir/").await.unwrap().len(), 4);
    }

    #[tokio::test]
    async fn test_missing_bucket() {
        let store = store();
        assert!(matches!(store.list_dir("nope/").await, Err(StoreError::NotFound(_))));
        assert!(matches!(
            store.put("nope/key", Bytes::new()).await,
            Err(StoreError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_bucket_delete_requires_empty() {
        let store = store();
        store.create_bucket("data").await.unwrap();
        store.put("data/k", Bytes::new()).await.unwrap();
        assert!(matches!(store.delete("data").await, Err(StoreError::Service { status: 409, .. })));
        store.delete("data/k").await.unwrap();
        store.delete("data").await.unwrap();
        assert!(store.list_buckets().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_delete_prefix() {
        let store = store();
        store.create_bucket("data").await.unwrap();
        store.put("data/dir/", Bytes::new()).await.unwrap();
        store.put("data/dir/a", Bytes::new()).await.unwrap();
        store.put("data/dirty", Bytes::new()).await.unwrap();
        assert_eq!(store.delete_prefix("data", "dir/").await.unwrap(), 2);
        assert_eq!(store.walk("data").await.unwrap(), vec!["data/dirty".to_string()]);
    }

    #[tokio::test]
    async fn test_provider_credentials() {
        let provider = MemoryProvider::new("ak", "sk");
        let ok = provider
            .connect(&StoreConfig::new("memory://", "ak", "sk"))
            .unwrap();
        assert!(ok.list_buckets().await.is_ok());

        let denied = provider
            .connect(&StoreConfig::new("memory://", "ak", "wrong"))
            .unwrap();
        assert!(matches!(denied.list_buckets().await, Err(StoreError::AccessDenied(_))));

        assert!(matches!(
            provider.connect(&StoreConfig::default()),
            Err(StoreError::MissingCredentials)
        ));
    }
}
