pub mod listing_cache;
pub mod memory;
pub mod s3;
pub mod sigv4;

use std::sync::Arc;
use std::time::Duration;

use bucketfs_common::documents::StoreConfig;
use bucketfs_common::store::{ObjectStore, StoreError};

use crate::config::{Backend, ServerConfig};

use self::memory::MemoryProvider;
use self::s3::S3Provider;

/// Builds store handles from a config snapshot.
///
/// Explicit configs use their own credentials; anything else falls back to
/// ambient credentials, failing with [`StoreError::MissingCredentials`] when
/// there are none.
pub trait StoreProvider: Send + Sync {
    fn connect(&self, config: &StoreConfig) -> Result<Arc<dyn ObjectStore>, StoreError>;
}

/// Construct the provider selected by the server config.
pub fn from_config(settings: &ServerConfig) -> Arc<dyn StoreProvider> {
    match settings.backend {
        Backend::S3 => Arc::new(S3Provider::new(
            &settings.region,
            Duration::from_secs(settings.request_timeout_secs),
        )),
        Backend::Memory => {
            let (access_key, secret_key) = if settings.store.is_explicit() {
                (settings.store.access_key.clone(), settings.store.secret_key.clone())
            } else {
                ("minioadmin".to_string(), "minioadmin".to_string())
            };
            Arc::new(MemoryProvider::new(access_key, secret_key))
        }
    }
}
