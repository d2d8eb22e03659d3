use bucketfs_common::store::StoreError;

/// Outcome classes of filesystem operations. Handlers map these to statuses.
#[derive(Debug, thiserror::Error)]
pub enum FsError {
    #[error("Not found: {0}")]
    NotFound(String),
    #[error("Directory not empty: {0}")]
    DirectoryNotEmpty(String),
    #[error("Invalid credentials: {0}")]
    CredentialInvalid(String),
    #[error(transparent)]
    Internal(anyhow::Error),
}

impl From<StoreError> for FsError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::NotFound(path) => FsError::NotFound(path),
            other => FsError::Internal(other.into()),
        }
    }
}
