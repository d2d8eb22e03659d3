use std::path::{Path, PathBuf};

use serde::Deserialize;

use bucketfs_common::documents::StoreConfig;

const DEFAULT_BIND: &str = "127.0.0.1";
const DEFAULT_PORT: u16 = 8888;
const DEFAULT_REGION: &str = "us-east-1";
const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 300;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Backend {
    S3,
    Memory,
}

impl std::str::FromStr for Backend {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "s3" => Ok(Backend::S3),
            "memory" => Ok(Backend::Memory),
            other => anyhow::bail!("Unknown backend: {}", other),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub bind: String,
    pub port: u16,
    pub region: String,
    pub backend: Backend,
    /// Location of the persisted credential profile. Defaults to `~/.mc/config.json`.
    pub credentials_file: Option<PathBuf>,
    /// Token callers must present. When unset every request is admitted.
    pub api_token: Option<String>,
    pub request_timeout_secs: u64,
    /// Initial live credentials.
    pub store: StoreConfig,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: DEFAULT_BIND.to_string(),
            port: DEFAULT_PORT,
            region: DEFAULT_REGION.to_string(),
            backend: Backend::S3,
            credentials_file: None,
            api_token: None,
            request_timeout_secs: DEFAULT_REQUEST_TIMEOUT_SECS,
            store: StoreConfig::default(),
        }
    }
}

impl ServerConfig {
    /// Load from an optional TOML file, then apply environment overrides.
    pub fn load(path: Option<&Path>) -> anyhow::Result<Self> {
        let mut config = match path {
            Some(path) => {
                let content = std::fs::read_to_string(path)
                    .map_err(|e| anyhow::anyhow!("Failed to read {}: {}", path.display(), e))?;
                toml::from_str(&content)
                    .map_err(|e| anyhow::anyhow!("Failed to parse {}: {}", path.display(), e))?
            }
            None => ServerConfig::default(),
        };
        config.apply_env(|key| std::env::var(key).ok())?;
        config.validate()?;
        Ok(config)
    }

    fn apply_env<F>(&mut self, var: F) -> anyhow::Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(url) = var("MINIO_ENDPOINT") {
            self.store.url = url;
        }
        if let Some(key) = var("MINIO_ACCESS_KEY") {
            self.store.access_key = key;
        }
        if let Some(secret) = var("MINIO_SECRET_KEY") {
            self.store.secret_key = secret;
        }
        if let Some(bind) = var("BUCKETFS_BIND") {
            self.bind = bind;
        }
        if let Some(port) = var("BUCKETFS_PORT") {
            self.port = port
                .parse()
                .map_err(|e| anyhow::anyhow!("Invalid BUCKETFS_PORT {:?}: {}", port, e))?;
        }
        if let Some(region) = var("BUCKETFS_REGION") {
            self.region = region;
        }
        if let Some(backend) = var("BUCKETFS_BACKEND") {
            self.backend = backend.parse()?;
        }
        if let Some(file) = var("BUCKETFS_CREDENTIALS_FILE") {
            self.credentials_file = Some(PathBuf::from(file));
        }
        if let Some(token) = var("BUCKETFS_API_TOKEN") {
            self.api_token = Some(token).filter(|t| !t.is_empty());
        }
        if let Some(secs) = var("BUCKETFS_REQUEST_TIMEOUT_SECS") {
            self.request_timeout_secs = secs
                .parse()
                .map_err(|e| anyhow::anyhow!("Invalid BUCKETFS_REQUEST_TIMEOUT_SECS {:?}: {}", secs, e))?;
        }
        Ok(())
    }

    fn validate(&self) -> anyhow::Result<()> {
        if self.port == 0 {
            anyhow::bail!("port must not be 0");
        }
        if self.region.is_empty() {
            anyhow::bail!("region must not be empty");
        }
        if self.request_timeout_secs == 0 {
            anyhow::bail!("request_timeout_secs must be greater than 0");
        }
        Ok(())
    }

    /// Resolve where the credential profile lives.
    pub fn credentials_path(&self) -> PathBuf {
        if let Some(ref path) = self.credentials_file {
            return path.clone();
        }
        let home = std::env::var("HOME").map(PathBuf::from).unwrap_or_default();
        home.join(".mc").join("config.json")
    }
}
