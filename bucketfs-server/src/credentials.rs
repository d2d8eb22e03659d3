//! Validation, persistence and activation of store credentials.

use std::path::Path;

use tracing::{debug, error, info};

use bucketfs_common::documents::{CredentialProfile, StoreConfig};
use bucketfs_common::store::StoreError;

use crate::error::FsError;
use crate::state::AppState;
use crate::store::StoreProvider;

/// Connect with `config` and list buckets. Returns the bucket count.
async fn try_list(provider: &dyn StoreProvider, config: &StoreConfig) -> Result<usize, StoreError> {
    let store = provider.connect(config)?;
    let buckets = store.list_buckets().await?;
    Ok(buckets.len())
}

/// Check that `config` can list buckets.
pub async fn validate(provider: &dyn StoreProvider, config: &StoreConfig) -> Result<(), FsError> {
    match try_list(provider, config).await {
        Ok(count) => {
            debug!(url = %config.url, buckets = count, "Credentials validated");
            Ok(())
        }
        Err(e) => Err(FsError::CredentialInvalid(e.to_string())),
    }
}

/// Write the profile for `config` to `path` via a temp file and rename.
pub async fn persist(path: &Path, config: &StoreConfig) -> Result<(), FsError> {
    let profile = CredentialProfile::from_config(config);
    let json = serde_json::to_vec_pretty(&profile)
        .map_err(|e| FsError::Internal(anyhow::anyhow!("Failed to encode profile: {}", e)))?;

    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        tokio::fs::create_dir_all(parent).await.map_err(|e| {
            FsError::Internal(anyhow::anyhow!("Failed to create {}: {}", parent.display(), e))
        })?;
    }

    let tmp = path.with_extension(format!("tmp.{}", uuid::Uuid::new_v4()));
    let written = async {
        tokio::fs::write(&tmp, &json).await?;
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            tokio::fs::set_permissions(&tmp, std::fs::Permissions::from_mode(0o600)).await?;
        }
        tokio::fs::rename(&tmp, path).await
    }
    .await;

    if let Err(e) = written {
        let _ = tokio::fs::remove_file(&tmp).await;
        return Err(FsError::Internal(anyhow::anyhow!(
            "Failed to write {}: {}",
            path.display(),
            e
        )));
    }
    info!(path = %path.display(), "Credential profile saved");
    Ok(())
}

/// Read the persisted profile. A missing file is `Ok(None)`.
pub async fn load_profile(path: &Path) -> anyhow::Result<Option<CredentialProfile>> {
    let content = match tokio::fs::read_to_string(path).await {
        Ok(content) => content,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        Err(e) => anyhow::bail!("Failed to read {}: {}", path.display(), e),
    };
    let profile = serde_json::from_str(&content)
        .map_err(|e| anyhow::anyhow!("Failed to parse {}: {}", path.display(), e))?;
    Ok(Some(profile))
}

/// Whether the persisted profile, or ambient credentials when there is none,
/// grant access to the store.
pub async fn has_role_access(state: &AppState) -> bool {
    let profile = match load_profile(&state.profile_path).await {
        Ok(profile) => profile,
        Err(e) => {
            error!(error = %e, "Failed to load credential profile");
            return false;
        }
    };

    let config = match profile {
        Some(profile) => match profile.store_config() {
            Some(config) => config,
            None => {
                debug!("Credential profile has no access key");
                return false;
            }
        },
        None => StoreConfig::default(),
    };

    match try_list(state.provider.as_ref(), &config).await {
        Ok(_) => true,
        Err(StoreError::MissingCredentials) => {
            debug!("No ambient credentials available");
            false
        }
        Err(e) => {
            error!(error = %e, "Role access check failed");
            false
        }
    }
}

/// Whether any usable credentials exist: role access first, then the live
/// configuration.
pub async fn check_authenticated(state: &AppState) -> bool {
    if has_role_access(state).await {
        return true;
    }
    let live = state.store_config();
    if !live.is_explicit() {
        return false;
    }
    match validate(state.provider.as_ref(), &live).await {
        Ok(()) => true,
        Err(e) => {
            debug!(error = %e, "Live credentials rejected");
            false
        }
    }
}

/// Validate, persist, then activate `config`. Nothing changes on failure.
pub async fn set_credentials(state: &AppState, config: StoreConfig) -> Result<(), FsError> {
    if !config.is_explicit() {
        return Err(FsError::CredentialInvalid(
            "url, accessKey and secretKey are required".to_string(),
        ));
    }
    let _guard = state.credentials_lock.lock().await;
    validate(state.provider.as_ref(), &config).await?;
    persist(&state.profile_path, &config).await?;
    info!(url = %config.url, access_key = %config.access_key, "Store credentials updated");
    state.replace_store_config(config);
    Ok(())
}
