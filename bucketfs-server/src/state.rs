use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;

use arc_swap::ArcSwap;

use bucketfs_common::documents::StoreConfig;
use bucketfs_common::store::ObjectStore;

use crate::config::ServerConfig;
use crate::error::FsError;
use crate::store::StoreProvider;
use crate::vfs::Vfs;

/// Shared application state
pub struct AppState {
    pub settings: ServerConfig,
    pub provider: Arc<dyn StoreProvider>,
    /// Credentials used for filesystem requests. Replaced only after validation.
    live: ArcSwap<StoreConfig>,
    /// Serialises credential updates so the profile and the live config agree.
    pub credentials_lock: tokio::sync::Mutex<()>,
    /// Where validated credentials are persisted
    pub profile_path: PathBuf,
    /// Server startup time for uptime calculation
    pub started_at: Instant,
}

impl AppState {
    pub fn new(settings: ServerConfig, provider: Arc<dyn StoreProvider>) -> Self {
        let live = ArcSwap::from_pointee(settings.store.clone());
        let profile_path = settings.credentials_path();
        Self {
            settings,
            provider,
            live,
            credentials_lock: tokio::sync::Mutex::new(()),
            profile_path,
            started_at: Instant::now(),
        }
    }

    /// Snapshot of the live credentials.
    pub fn store_config(&self) -> Arc<StoreConfig> {
        self.live.load_full()
    }

    pub fn replace_store_config(&self, config: StoreConfig) {
        self.live.store(Arc::new(config));
    }

    /// A store handle for one request, built from the current snapshot.
    pub fn connect(&self) -> Result<Arc<dyn ObjectStore>, FsError> {
        let config = self.store_config();
        Ok(self.provider.connect(&config)?)
    }

    pub fn vfs(&self) -> Result<Vfs, FsError> {
        Ok(Vfs::new(self.connect()?))
    }
}
