//! Directory semantics over a flat key space.
//!
//! Directories are emulated with prefixes, marker objects (keys ending in
//! `/`) and `.keep` placeholders. Emptiness is inferred from listing
//! cardinality, which is best-effort when other clients mutate the same
//! prefix concurrently.

use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;

use bytes::Bytes;
use tracing::{debug, info};

use bucketfs_common::documents::FilesystemEntry;
use bucketfs_common::store::{split_path, ObjectRecord, ObjectStore};

use super::paths;
use super::{Empty, FileContent, GetResult, PutIntent, PutResult};
use crate::error::FsError;

/// Filesystem operations bound to one store handle.
pub struct Vfs {
    store: Arc<dyn ObjectStore>,
}

/// Source/destination pairs moved by a copy, and whether it was a tree.
struct Transfer {
    pairs: Vec<(String, String)>,
    tree: bool,
}

impl Vfs {
    pub fn new(store: Arc<dyn ObjectStore>) -> Self {
        Self { store }
    }

    /// Read a file, or list a directory when the path (or hint) says so.
    pub async fn get(&self, path: &str, directory_hint: bool) -> Result<GetResult, FsError> {
        if paths::is_file_read(path, directory_hint) {
            Ok(GetResult::File(self.read(path).await?))
        } else {
            Ok(GetResult::Listing(self.list(path).await?))
        }
    }

    pub async fn list(&self, path: &str) -> Result<Vec<FilesystemEntry>, FsError> {
        let prefix = paths::listing_prefix(path);
        self.store.invalidate_cache();
        let records = self.store.list_dir(&prefix).await?;
        Ok(paths::translate_listing(&prefix, &records))
    }

    pub async fn read(&self, path: &str) -> Result<FileContent, FsError> {
        let data = self.store.get(path).await?;
        Ok(FileContent::file(path, &data))
    }

    pub async fn put(&self, path: &str, intent: PutIntent) -> Result<PutResult, FsError> {
        match intent {
            PutIntent::Copy { source } => Ok(PutResult::File(self.copy(&source, path).await?)),
            PutIntent::Move { source } => Ok(PutResult::File(self.rename(&source, path).await?)),
            PutIntent::MakeDir => {
                self.mkdir(path).await?;
                Ok(PutResult::Empty(Empty::default()))
            }
            PutIntent::Write { content } => Ok(PutResult::File(self.write(path, &content).await?)),
            PutIntent::Noop => Ok(PutResult::Empty(Empty::default())),
        }
    }

    pub async fn write(&self, path: &str, content: &str) -> Result<FileContent, FsError> {
        let data = Bytes::copy_from_slice(content.as_bytes());
        self.store.put(path, data).await?;
        debug!(path = %path, size = content.len(), "File written");
        Ok(FileContent::file(path, content.as_bytes()))
    }

    /// Create a directory and its placeholder. Returns the normalised path.
    pub async fn mkdir(&self, path: &str) -> Result<String, FsError> {
        let dir = paths::directory_path(path);
        if paths::is_bucket_level(&dir) {
            self.store.create_bucket(dir.trim_end_matches('/')).await?;
        } else {
            self.store.put(&dir, Bytes::new()).await?;
        }
        self.store
            .put(&paths::placeholder_path(&dir), Bytes::new())
            .await?;
        info!(path = %dir, "Directory created");
        Ok(dir)
    }

    /// Copy `source` to `dest`, recursively when `source` is a prefix.
    pub async fn copy(&self, source: &str, dest: &str) -> Result<FileContent, FsError> {
        let source = source.trim_end_matches('/');
        let transfer = self.transfer(source, dest).await?;
        info!(src = %source, dst = %dest, objects = transfer.pairs.len(), "Copied");

        if paths::is_bucket_level(source) {
            // Keep the destination a directory even when the source held no placeholder.
            let placeholder = paths::placeholder_path(dest);
            if !self.store.exists(&placeholder).await? {
                self.store.put(&placeholder, Bytes::new()).await?;
            }
            return self.read(&placeholder).await;
        }
        self.read_back(dest, transfer.tree).await
    }

    /// Move `source` to `dest`: every object is copied before any source is removed.
    pub async fn rename(&self, source: &str, dest: &str) -> Result<FileContent, FsError> {
        let source = source.trim_end_matches('/');
        if source == dest.trim_end_matches('/') {
            debug!(path = %source, "Move onto itself skipped");
            let tree = !self.store.walk(&paths::listing_prefix(source)).await?.is_empty();
            return self.read_back(dest, tree).await;
        }
        let transfer = self.transfer(source, dest).await?;

        // A destination nested in the source tree must survive the cleanup.
        let targets: HashSet<&str> = transfer.pairs.iter().map(|(_, dst)| dst.as_str()).collect();
        let mut by_bucket: BTreeMap<String, Vec<String>> = BTreeMap::new();
        for (src, _) in &transfer.pairs {
            if targets.contains(src.as_str()) {
                continue;
            }
            let (bucket, key) = split_path(src);
            by_bucket
                .entry(bucket.to_string())
                .or_default()
                .push(key.to_string());
        }
        for (bucket, keys) in &by_bucket {
            self.store.delete_many(bucket, keys).await?;
        }
        if paths::is_bucket_level(source) && split_path(dest).0 != source {
            self.store.delete(source).await?;
        }
        info!(src = %source, dst = %dest, objects = transfer.pairs.len(), "Moved");

        self.read_back(dest, transfer.tree).await
    }

    /// Delete a file, or an empty directory together with its placeholder.
    pub async fn delete(&self, path: &str) -> Result<(), FsError> {
        let path = path.trim_end_matches('/');
        if path.is_empty() {
            return Err(FsError::Internal(anyhow::anyhow!(
                "Refusing to delete the store root"
            )));
        }
        let prefix = paths::listing_prefix(path);
        let placeholder = paths::placeholder_path(path);

        self.store.invalidate_cache();
        let listed = self.store.list_dir(&prefix).await?;
        // The placeholder never counts as remaining content.
        let matches: Vec<&ObjectRecord> = listed.iter().filter(|r| r.key != placeholder).collect();

        let is_directory = matches.len() > 1 || (matches.len() == 1 && matches[0].key != path);
        if is_directory && (matches.len() > 1 || matches[0].key != prefix) {
            info!(path = %path, entries = matches.len(), "Refusing to delete non-empty directory");
            return Err(FsError::DirectoryNotEmpty(path.to_string()));
        }

        let has_placeholder = self.store.exists(&placeholder).await?;
        if !is_directory && !has_placeholder && !self.store.exists(path).await? {
            return Err(FsError::NotFound(path.to_string()));
        }
        if has_placeholder {
            self.store.delete(&placeholder).await?;
        }

        if is_directory && !paths::is_bucket_level(path) {
            let (bucket, key) = split_path(path);
            let removed = self.store.delete_prefix(bucket, &format!("{}/", key)).await?;
            debug!(path = %path, removed, "Directory cascade-deleted");
        } else {
            self.store.delete(path).await?;
            debug!(path = %path, directory = is_directory, "Deleted");
        }
        Ok(())
    }

    async fn transfer(&self, source: &str, dest: &str) -> Result<Transfer, FsError> {
        let dest = dest.trim_end_matches('/');
        let keys = self.store.walk(&paths::listing_prefix(source)).await?;

        if keys.is_empty() && paths::is_bucket_level(source) {
            // An empty bucket copies as an empty directory.
            if paths::is_bucket_level(dest) {
                self.store.create_bucket(dest).await?;
            }
            self.store
                .put(&paths::placeholder_path(dest), Bytes::new())
                .await?;
            return Ok(Transfer {
                pairs: Vec::new(),
                tree: true,
            });
        }
        if keys.is_empty() {
            self.store.copy(source, dest).await?;
            return Ok(Transfer {
                pairs: vec![(source.to_string(), dest.to_string())],
                tree: false,
            });
        }

        if paths::is_bucket_level(dest) {
            self.store.create_bucket(dest).await?;
        }
        let mut pairs = Vec::with_capacity(keys.len());
        for key in keys {
            let relative = &key[source.len() + 1..];
            let target = format!("{}/{}", dest, relative);
            self.store.copy(&key, &target).await?;
            pairs.push((key, target));
        }
        Ok(Transfer { pairs, tree: true })
    }

    async fn read_back(&self, dest: &str, tree: bool) -> Result<FileContent, FsError> {
        if tree {
            Ok(FileContent::directory(paths::listing_prefix(dest)))
        } else {
            self.read(dest).await
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::memory::{MemoryBackend, MemoryStore};
    use base64::Engine;
    use bucketfs_common::documents::EntryType;
    use bucketfs_common::store::StoreError;

    fn vfs() -> (Vfs, Arc<dyn ObjectStore>) {
        let store: Arc<dyn ObjectStore> =
            Arc::new(MemoryStore::open(Arc::new(MemoryBackend::default())));
        (Vfs::new(Arc::clone(&store)), store)
    }

    fn decode(content: &FileContent) -> Vec<u8> {
        base64::engine::general_purpose::STANDARD
            .decode(&content.content)
            .unwrap()
    }

    fn names(entries: &[FilesystemEntry]) -> Vec<&str> {
        entries.iter().map(|e| e.name.as_str()).collect()
    }

    #[tokio::test]
    async fn test_write_then_read_roundtrip() {
        let (vfs, _) = vfs();
        vfs.mkdir("data").await.unwrap();
        let written = vfs.write("data/notes.txt", "hello wörld").await.unwrap();
        let read = vfs.read("data/notes.txt").await.unwrap();
        assert_eq!(written, read);
        assert_eq!(decode(&read), "hello wörld".as_bytes());
    }

    #[tokio::test]
    async fn test_get_dispatches_on_path_shape() {
        let (vfs, _) = vfs();
        vfs.mkdir("data").await.unwrap();
        vfs.write("data/a.txt", "a").await.unwrap();

        assert!(matches!(vfs.get("data/a.txt", false).await.unwrap(), GetResult::File(_)));
        assert!(matches!(vfs.get("data/", false).await.unwrap(), GetResult::Listing(_)));
        assert!(matches!(vfs.get("data", true).await.unwrap(), GetResult::Listing(_)));
        assert!(matches!(vfs.get("data/missing.txt", false).await, Err(FsError::NotFound(_))));
    }

    #[tokio::test]
    async fn test_mkdir_visible_in_parent_and_empty_itself() {
        let (vfs, store) = vfs();
        let dir = vfs.mkdir("ProjectA").await.unwrap();
        assert_eq!(dir, "projecta/");

        let root = vfs.list("").await.unwrap();
        assert_eq!(
            root,
            vec![FilesystemEntry {
                name: "projecta/".to_string(),
                path: "projecta/".to_string(),
                entry_type: EntryType::Directory,
            }]
        );
        assert!(vfs.list("projecta").await.unwrap().is_empty());
        assert_eq!(store.list_dir("projecta/").await.unwrap().len(), 1);

        vfs.mkdir("projecta/Sub").await.unwrap();
        assert_eq!(names(&vfs.list("projecta").await.unwrap()), vec!["sub/"]);
        assert!(vfs.list("projecta/sub/").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_delete_non_empty_directory_refused() {
        let (vfs, store) = vfs();
        vfs.mkdir("projecta").await.unwrap();
        vfs.write("projecta/notes.txt", "hello").await.unwrap();
        let before = store.walk("projecta").await.unwrap();

        let result = vfs.delete("projecta").await;
        assert!(matches!(result, Err(FsError::DirectoryNotEmpty(_))));
        assert_eq!(store.walk("projecta").await.unwrap(), before);

        vfs.mkdir("projecta/sub").await.unwrap();
        vfs.write("projecta/sub/x.txt", "x").await.unwrap();
        assert!(matches!(
            vfs.delete("projecta/sub").await,
            Err(FsError::DirectoryNotEmpty(_))
        ));
        assert!(store.exists("projecta/sub/.keep").await.unwrap());
    }

    #[tokio::test]
    async fn test_delete_empty_nested_directory() {
        let (vfs, store) = vfs();
        vfs.mkdir("data").await.unwrap();
        vfs.mkdir("data/empty").await.unwrap();

        vfs.delete("data/empty").await.unwrap();
        assert!(vfs.list("data").await.unwrap().is_empty());
        assert_eq!(store.walk("data").await.unwrap(), vec!["data/.keep".to_string()]);
    }

    #[tokio::test]
    async fn test_delete_empty_bucket_directory() {
        let (vfs, store) = vfs();
        vfs.mkdir("projecta").await.unwrap();
        vfs.write("projecta/notes.txt", "hello").await.unwrap();

        vfs.delete("projecta/notes.txt").await.unwrap();
        vfs.delete("projecta").await.unwrap();
        assert!(vfs.list("").await.unwrap().is_empty());
        assert!(store.list_buckets().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_delete_directory_without_marker() {
        let (vfs, store) = vfs();
        vfs.mkdir("data").await.unwrap();
        store.put("data/loose/.keep", Bytes::new()).await.unwrap();

        vfs.delete("data/loose").await.unwrap();
        assert!(!store.exists("data/loose/.keep").await.unwrap());
    }

    #[tokio::test]
    async fn test_delete_missing_bucket_is_not_found() {
        let (vfs, _) = vfs();
        assert!(matches!(vfs.delete("nope/file").await, Err(FsError::NotFound(_))));
    }

    #[tokio::test]
    async fn test_copy_keeps_source() {
        let (vfs, _) = vfs();
        vfs.mkdir("data").await.unwrap();
        vfs.write("data/a.txt", "payload").await.unwrap();

        let copied = vfs.copy("data/a.txt", "data/b.txt").await.unwrap();
        assert_eq!(copied.path, "data/b.txt");
        assert_eq!(decode(&copied), b"payload");
        assert_eq!(decode(&vfs.read("data/a.txt").await.unwrap()), b"payload");
    }

    #[tokio::test]
    async fn test_move_removes_source() {
        let (vfs, _) = vfs();
        vfs.mkdir("data").await.unwrap();
        vfs.write("data/a.txt", "payload").await.unwrap();

        let moved = vfs.rename("data/a.txt", "data/c.txt").await.unwrap();
        assert_eq!(decode(&moved), b"payload");
        assert!(matches!(vfs.read("data/a.txt").await, Err(FsError::NotFound(_))));
        assert_eq!(names(&vfs.list("data").await.unwrap()), vec!["c.txt"]);
    }

    #[tokio::test]
    async fn test_copy_directory_tree() {
        let (vfs, store) = vfs();
        vfs.mkdir("data").await.unwrap();
        vfs.mkdir("data/src").await.unwrap();
        vfs.write("data/src/one.txt", "1").await.unwrap();
        vfs.write("data/src/deep/two.txt", "2").await.unwrap();

        let result = vfs.copy("data/src", "data/dst").await.unwrap();
        assert_eq!(result.entry_type, EntryType::Directory);
        assert_eq!(result.path, "data/dst/");
        assert_eq!(decode(&vfs.read("data/dst/deep/two.txt").await.unwrap()), b"2");
        assert!(store.exists("data/dst/.keep").await.unwrap());
        assert!(store.exists("data/src/one.txt").await.unwrap());
    }

    #[tokio::test]
    async fn test_move_directory_tree() {
        let (vfs, store) = vfs();
        vfs.mkdir("data").await.unwrap();
        vfs.mkdir("data/src").await.unwrap();
        vfs.write("data/src/one.txt", "1").await.unwrap();

        vfs.rename("data/src", "data/moved").await.unwrap();
        assert!(store.walk("data/src/").await.unwrap().is_empty());
        assert_eq!(decode(&vfs.read("data/moved/one.txt").await.unwrap()), b"1");
        assert_eq!(names(&vfs.list("data").await.unwrap()), vec!["moved/"]);
    }

    #[tokio::test]
    async fn test_copy_bucket_level_source_keeps_directory() {
        let (vfs, store) = vfs();
        vfs.mkdir("projecta").await.unwrap();
        vfs.write("projecta/notes.txt", "hello").await.unwrap();
        vfs.mkdir("archive").await.unwrap();

        let result = vfs.copy("projecta", "archive/projecta").await.unwrap();
        assert_eq!(result.path, "archive/projecta/.keep");
        assert_eq!(result.entry_type, EntryType::File);
        assert!(result.content.is_empty());
        assert!(store.exists("archive/projecta/notes.txt").await.unwrap());
        assert_eq!(names(&vfs.list("archive/projecta").await.unwrap()), vec!["notes.txt"]);
    }

    #[tokio::test]
    async fn test_put_intents() {
        let (vfs, _) = vfs();
        assert_eq!(
            vfs.put("Data", PutIntent::MakeDir).await.unwrap(),
            PutResult::Empty(Empty::default())
        );
        let written = vfs
            .put("data/a.txt", PutIntent::Write { content: "x".to_string() })
            .await
            .unwrap();
        assert!(matches!(written, PutResult::File(ref f) if f.path == "data/a.txt"));
        assert_eq!(
            vfs.put("data/b.txt", PutIntent::Noop).await.unwrap(),
            PutResult::Empty(Empty::default())
        );
    }

    /// Store wrapper that keeps listings until told to drop them and records
    /// the order of cache drops and listings.
    struct CachingStore {
        inner: Arc<dyn ObjectStore>,
        cached: std::sync::Mutex<std::collections::HashMap<String, Vec<ObjectRecord>>>,
        events: std::sync::Mutex<Vec<&'static str>>,
    }

    impl CachingStore {
        fn new(inner: Arc<dyn ObjectStore>) -> Self {
            Self {
                inner,
                cached: Default::default(),
                events: Default::default(),
            }
        }

        fn events(&self) -> Vec<&'static str> {
            self.events.lock().unwrap().clone()
        }
    }

    #[async_trait::async_trait]
    impl ObjectStore for CachingStore {
        async fn list_buckets(&self) -> Result<Vec<String>, StoreError> {
            self.inner.list_buckets().await
        }

        async fn list_dir(&self, path: &str) -> Result<Vec<ObjectRecord>, StoreError> {
            self.events.lock().unwrap().push("list_dir");
            let hit = self.cached.lock().unwrap().get(path).cloned();
            if let Some(records) = hit {
                return Ok(records);
            }
            let records = self.inner.list_dir(path).await?;
            self.cached.lock().unwrap().insert(path.to_string(), records.clone());
            Ok(records)
        }

        async fn walk(&self, path: &str) -> Result<Vec<String>, StoreError> {
            self.inner.walk(path).await
        }

        async fn get(&self, path: &str) -> Result<Bytes, StoreError> {
            self.inner.get(path).await
        }

        async fn put(&self, path: &str, data: Bytes) -> Result<(), StoreError> {
            self.inner.put(path, data).await
        }

        async fn copy(&self, src: &str, dst: &str) -> Result<(), StoreError> {
            self.inner.copy(src, dst).await
        }

        async fn delete(&self, path: &str) -> Result<(), StoreError> {
            self.inner.delete(path).await
        }

        async fn delete_many(&self, bucket: &str, keys: &[String]) -> Result<(), StoreError> {
            self.inner.delete_many(bucket, keys).await
        }

        async fn exists(&self, path: &str) -> Result<bool, StoreError> {
            self.inner.exists(path).await
        }

        async fn create_bucket(&self, bucket: &str) -> Result<(), StoreError> {
            self.inner.create_bucket(bucket).await
        }

        fn invalidate_cache(&self) {
            self.events.lock().unwrap().push("invalidate");
            self.cached.lock().unwrap().clear();
        }
    }

    #[tokio::test]
    async fn test_listing_sees_external_writes() {
        let (_, inner) = vfs();
        let caching = Arc::new(CachingStore::new(Arc::clone(&inner)));
        let vfs = Vfs::new(caching.clone());
        vfs.mkdir("data").await.unwrap();

        assert!(vfs.list("data").await.unwrap().is_empty());
        inner.put("data/external.txt", Bytes::from("x")).await.unwrap();
        assert_eq!(names(&vfs.list("data").await.unwrap()), vec!["external.txt"]);

        assert_eq!(
            caching.events(),
            vec!["invalidate", "list_dir", "invalidate", "list_dir"]
        );
    }

    #[tokio::test]
    async fn test_delete_checks_fresh_listing() {
        let (_, inner) = vfs();
        let caching = Arc::new(CachingStore::new(Arc::clone(&inner)));
        let vfs = Vfs::new(caching.clone());
        vfs.mkdir("data").await.unwrap();
        vfs.mkdir("data/dir").await.unwrap();

        assert!(vfs.list("data/dir").await.unwrap().is_empty());
        inner.put("data/dir/late.txt", Bytes::from("x")).await.unwrap();

        assert!(matches!(
            vfs.delete("data/dir").await,
            Err(FsError::DirectoryNotEmpty(_))
        ));
        assert_eq!(
            caching.events(),
            vec!["invalidate", "list_dir", "invalidate", "list_dir"]
        );
        assert!(inner.exists("data/dir/late.txt").await.unwrap());
    }

    #[tokio::test]
    async fn test_move_onto_itself_keeps_object() {
        let (vfs, _) = vfs();
        vfs.mkdir("data").await.unwrap();
        vfs.write("data/a.txt", "payload").await.unwrap();

        let result = vfs.rename("data/a.txt", "data/a.txt").await.unwrap();
        assert_eq!(decode(&result), b"payload");
        assert_eq!(decode(&vfs.read("data/a.txt").await.unwrap()), b"payload");
    }

    #[tokio::test]
    async fn test_move_tree_onto_itself_keeps_tree() {
        let (vfs, store) = vfs();
        vfs.mkdir("data").await.unwrap();
        vfs.mkdir("data/src").await.unwrap();
        vfs.write("data/src/one.txt", "1").await.unwrap();

        let result = vfs.rename("data/src/", "data/src").await.unwrap();
        assert_eq!(result.entry_type, EntryType::Directory);
        assert!(store.exists("data/src/one.txt").await.unwrap());
    }

    #[tokio::test]
    async fn test_move_tree_into_itself() {
        let (vfs, store) = vfs();
        vfs.mkdir("data").await.unwrap();
        vfs.mkdir("data/src").await.unwrap();
        vfs.write("data/src/one.txt", "1").await.unwrap();

        vfs.rename("data/src", "data/src/nested").await.unwrap();
        assert_eq!(decode(&vfs.read("data/src/nested/one.txt").await.unwrap()), b"1");
        assert!(!store.exists("data/src/one.txt").await.unwrap());
    }

    #[tokio::test]
    async fn test_delete_missing_file_is_not_found() {
        let (vfs, _) = vfs();
        vfs.mkdir("data").await.unwrap();
        assert!(matches!(
            vfs.delete("data/ghost.txt").await,
            Err(FsError::NotFound(ref p)) if p == "data/ghost.txt"
        ));
    }

    #[tokio::test]
    async fn test_copy_empty_bucket() {
        let (vfs, store) = vfs();
        store.create_bucket("empty").await.unwrap();
        vfs.mkdir("archive").await.unwrap();

        let result = vfs.copy("empty", "archive/empty").await.unwrap();
        assert_eq!(result.path, "archive/empty/.keep");
        assert!(store.exists("archive/empty/.keep").await.unwrap());
        assert_eq!(names(&vfs.list("archive").await.unwrap()), vec!["empty/"]);
    }
}
