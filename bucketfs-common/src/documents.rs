//! Documents shared between the server and its object-store adapters.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Alias name under which validated credentials are persisted.
pub const PROFILE_ALIAS: &str = "lakeStorage";

/// Connection settings for an object store.
///
/// Either all three fields are set (explicit credentials) or the store falls
/// back to ambient credentials. Partially filled configs count as ambient.
#[derive(Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoreConfig {
    #[serde(default)]
    pub url: String,
    #[serde(default)]
    pub access_key: String,
    #[serde(default)]
    pub secret_key: String,
}

impl StoreConfig {
    pub fn new(
        url: impl Into<String>,
        access_key: impl Into<String>,
        secret_key: impl Into<String>,
    ) -> Self {
        Self {
            url: url.into(),
            access_key: access_key.into(),
            secret_key: secret_key.into(),
        }
    }

    pub fn is_explicit(&self) -> bool {
        !self.url.is_empty() && !self.access_key.is_empty() && !self.secret_key.is_empty()
    }
}

impl fmt::Debug for StoreConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StoreConfig")
            .field("url", &self.url)
            .field("access_key", &self.access_key)
            .field("secret_key", &"<redacted>")
            .finish()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntryType {
    File,
    Directory,
}

/// One row of a directory listing as returned to clients.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FilesystemEntry {
    pub name: String,
    pub path: String,
    #[serde(rename = "type")]
    pub entry_type: EntryType,
}

/// A single alias in the MinIO client configuration format.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProfileAlias {
    #[serde(default)]
    pub url: String,
    #[serde(rename = "accessKey", default)]
    pub access_key: String,
    #[serde(rename = "secretKey", default)]
    pub secret_key: String,
    #[serde(default = "default_api")]
    pub api: String,
    #[serde(default = "default_path_style")]
    pub path: String,
}

fn default_api() -> String {
    "S3v4".to_string()
}

fn default_path_style() -> String {
    "auto".to_string()
}

/// Persisted credential profile (`~/.mc/config.json`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CredentialProfile {
    #[serde(default = "default_version")]
    pub version: String,
    #[serde(default)]
    pub aliases: std::collections::BTreeMap<String, ProfileAlias>,
}

fn default_version() -> String {
    "10".to_string()
}

impl CredentialProfile {
    /// Build a profile holding only the `lakeStorage` alias.
    pub fn from_config(config: &StoreConfig) -> Self {
        let mut aliases = std::collections::BTreeMap::new();
        aliases.insert(
            PROFILE_ALIAS.to_string(),
            ProfileAlias {
                url: config.url.clone(),
                access_key: config.access_key.clone(),
                secret_key: config.secret_key.clone(),
                api: default_api(),
                path: default_path_style(),
            },
        );
        Self {
            version: default_version(),
            aliases,
        }
    }

    pub fn alias(&self) -> Option<&ProfileAlias> {
        self.aliases.get(PROFILE_ALIAS)
    }

    /// The `lakeStorage` alias as a store config, if it carries an access key.
    pub fn store_config(&self) -> Option<StoreConfig> {
        let alias = self.alias()?;
        if alias.access_key.is_empty() {
            return None;
        }
        Some(StoreConfig::new(
            alias.url.clone(),
            alias.access_key.clone(),
            alias.secret_key.clone(),
        ))
    }
}
