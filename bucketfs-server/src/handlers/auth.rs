use std::sync::Arc;

use axum::body::Bytes;
use axum::extract::State;
use axum::response::IntoResponse;
use axum::Json;
use serde::{Deserialize, Serialize};
use tracing::warn;

use bucketfs_common::documents::StoreConfig;

use crate::credentials;
use crate::error::FsError;
use crate::state::AppState;

#[derive(Debug, Serialize)]
pub struct AuthStatus {
    pub authenticated: bool,
}

#[derive(Debug, Serialize)]
pub struct SetCredentialsResult {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl SetCredentialsResult {
    fn failed(message: impl Into<String>) -> Self {
        Self {
            success: false,
            message: Some(message.into()),
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct CredentialsRequest {
    #[serde(default)]
    pub url: String,
    #[serde(rename = "accessKey", default)]
    pub access_key: String,
    #[serde(rename = "secretKey", default)]
    pub secret_key: String,
}

// ── GET /auth ──

pub async fn get_auth(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let authenticated = credentials::check_authenticated(&state).await;
    Json(AuthStatus { authenticated })
}

// ── POST /auth ──

pub async fn post_auth(State(state): State<Arc<AppState>>, body: Bytes) -> impl IntoResponse {
    let request: CredentialsRequest = match serde_json::from_slice(&body) {
        Ok(request) => request,
        Err(e) => {
            warn!(error = %e, "Malformed credentials request");
            return Json(SetCredentialsResult::failed(format!("Invalid request body: {}", e)));
        }
    };

    let config = StoreConfig::new(request.url, request.access_key, request.secret_key);
    match credentials::set_credentials(&state, config).await {
        Ok(()) => Json(SetCredentialsResult {
            success: true,
            message: None,
        }),
        Err(FsError::CredentialInvalid(message)) => {
            warn!(error = %message, "Credentials rejected");
            Json(SetCredentialsResult::failed(message))
        }
        Err(e) => {
            tracing::error!(error = %e, "Failed to update credentials");
            Json(SetCredentialsResult::failed(e.to_string()))
        }
    }
}
