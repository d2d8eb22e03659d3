//! Mapping between request paths, store keys and listing entries.

use bucketfs_common::documents::{EntryType, FilesystemEntry};
use bucketfs_common::store::ObjectRecord;

/// Placeholder object that keeps an otherwise empty directory listable.
pub const PLACEHOLDER: &str = ".keep";

/// Strip the leading slash and lower-case the bucket segment.
pub fn normalize(raw: &str) -> String {
    let trimmed = raw.trim_start_matches('/');
    match trimmed.split_once('/') {
        Some((bucket, rest)) => format!("{}/{}", bucket.to_lowercase(), rest),
        None => trimmed.to_lowercase(),
    }
}

/// Directory form used by mkdir: fully lower-cased, trailing `/`.
pub fn directory_path(path: &str) -> String {
    let lowered = path.trim_start_matches('/').to_lowercase();
    if lowered.ends_with('/') {
        lowered
    } else {
        format!("{}/", lowered)
    }
}

/// Prefix whose children make up the listing of `path`. The root is `""`.
pub fn listing_prefix(path: &str) -> String {
    let trimmed = path.trim_end_matches('/');
    if trimmed.is_empty() {
        String::new()
    } else {
        format!("{}/", trimmed)
    }
}

pub fn placeholder_path(path: &str) -> String {
    format!("{}/{}", path.trim_end_matches('/'), PLACEHOLDER)
}

/// A path with a single segment names a bucket.
pub fn is_bucket_level(path: &str) -> bool {
    !path.trim_end_matches('/').contains('/')
}

/// Whether a GET addresses an object rather than a listing.
pub fn is_file_read(path: &str, directory_hint: bool) -> bool {
    !path.is_empty() && !path.ends_with('/') && !directory_hint
}

/// Translate a raw listing record relative to the listed prefix.
///
/// The prefix's own marker and `.keep` placeholders get an empty name.
pub fn to_entry(prefix: &str, record: &ObjectRecord) -> FilesystemEntry {
    let rest = record.key.strip_prefix(prefix).unwrap_or(&record.key);
    let (name, path) = match record.kind {
        EntryType::Directory => {
            let last = rest.trim_end_matches('/').rsplit('/').next().unwrap_or("");
            let name = if last.is_empty() {
                String::new()
            } else {
                format!("{}/", last)
            };
            let path = if record.key.ends_with('/') {
                record.key.clone()
            } else {
                format!("{}/", record.key)
            };
            (name, path)
        }
        EntryType::File => {
            let last = rest.rsplit('/').next().unwrap_or("");
            let name = if last == PLACEHOLDER { "" } else { last };
            (name.to_string(), record.key.clone())
        }
    };

    FilesystemEntry {
        name,
        path,
        entry_type: record.kind,
    }
}

/// Translate a listing, dropping entries without a visible name.
pub fn translate_listing(prefix: &str, records: &[ObjectRecord]) -> Vec<FilesystemEntry> {
    records
        .iter()
        .map(|record| to_entry(prefix, record))
        .filter(|entry| !entry.name.is_empty())
        .collect()
}
