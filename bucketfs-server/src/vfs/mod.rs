//! Filesystem view over the object store.

pub mod directory;
pub mod paths;

use base64::Engine;
use serde::Serialize;

use bucketfs_common::documents::{EntryType, FilesystemEntry};

pub use directory::Vfs;

/// What a PUT asks for. Exactly one applies per request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PutIntent {
    Copy { source: String },
    Move { source: String },
    MakeDir,
    Write { content: String },
    Noop,
}

/// File-shaped response: the object's bytes, base64-encoded.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FileContent {
    pub path: String,
    #[serde(rename = "type")]
    pub entry_type: EntryType,
    pub content: String,
}

impl FileContent {
    pub fn file(path: impl Into<String>, data: &[u8]) -> Self {
        Self {
            path: path.into(),
            entry_type: EntryType::File,
            content: base64::engine::general_purpose::STANDARD.encode(data),
        }
    }

    /// Result of a transfer that produced a tree rather than one object.
    pub fn directory(path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            entry_type: EntryType::Directory,
            content: String::new(),
        }
    }
}

/// Serialises as `{}`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Empty {}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum GetResult {
    Listing(Vec<FilesystemEntry>),
    File(FileContent),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum PutResult {
    File(FileContent),
    Empty(Empty),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_result_shapes() {
        let file = GetResult::File(FileContent::file("projecta/notes.txt", b"hello"));
        assert_eq!(
            serde_json::to_value(&file).unwrap(),
            serde_json::json!({ "path": "projecta/notes.txt", "type": "file", "content": "aGVsbG8=" })
        );

        let listing = GetResult::Listing(Vec::new());
        assert_eq!(serde_json::to_value(&listing).unwrap(), serde_json::json!([]));

        let empty = PutResult::Empty(Empty::default());
        assert_eq!(serde_json::to_value(&empty).unwrap(), serde_json::json!({}));
    }
}
