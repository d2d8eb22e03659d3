pub mod auth;
pub mod files;

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;
use tracing::{debug, error, info};

use crate::error::FsError;

pub const NOT_FOUND_MESSAGE: &str = "The requested resource could not be found.";
const INTERNAL_MESSAGE: &str = "The object store request failed.";

/// Error body: `{"error": <status>, "message"}` or `{"error": 400, "code"}`.
#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub error: u16,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub code: Option<&'static str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl IntoResponse for FsError {
    fn into_response(self) -> Response {
        let (status, body) = match &self {
            FsError::NotFound(path) => {
                debug!(path = %path, "Not found");
                (
                    StatusCode::NOT_FOUND,
                    ErrorBody {
                        error: 404,
                        code: None,
                        message: Some(NOT_FOUND_MESSAGE.to_string()),
                    },
                )
            }
            FsError::DirectoryNotEmpty(path) => {
                info!(path = %path, "Directory not empty");
                (
                    StatusCode::BAD_REQUEST,
                    ErrorBody {
                        error: 400,
                        code: Some("DIR_NOT_EMPTY"),
                        message: None,
                    },
                )
            }
            FsError::CredentialInvalid(message) => (
                StatusCode::BAD_REQUEST,
                ErrorBody {
                    error: 400,
                    code: None,
                    message: Some(message.clone()),
                },
            ),
            FsError::Internal(e) => {
                error!(error = ?e, "Request failed");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    ErrorBody {
                        error: 500,
                        code: None,
                        message: Some(INTERNAL_MESSAGE.to_string()),
                    },
                )
            }
        };
        (status, Json(body)).into_response()
    }
}
