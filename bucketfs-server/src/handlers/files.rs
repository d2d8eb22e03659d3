use std::sync::Arc;

use axum::body::Bytes;
use axum::extract::{Path, State};
use axum::http::HeaderMap;
use axum::Json;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::FsError;
use crate::state::AppState;
use crate::vfs::{paths, Empty, GetResult, PutIntent, PutResult};

pub const COPY_SOURCE_HEADER: &str = "x-custom-s3-copy-src";
pub const MOVE_SOURCE_HEADER: &str = "x-custom-s3-move-src";
pub const IS_DIR_HEADER: &str = "x-custom-s3-is-dir";

#[derive(Debug, Serialize)]
#[serde(transparent)]
pub struct DeleteResult(Empty);

#[derive(Debug, Deserialize)]
struct WriteBody {
    content: Option<String>,
}

fn header_value(headers: &HeaderMap, name: &str) -> Option<String> {
    let raw = headers.get(name)?.to_str().ok()?;
    let decoded = urlencoding::decode(raw)
        .map(|s| s.into_owned())
        .unwrap_or_else(|_| raw.to_string());
    Some(decoded)
}

/// Resolve what a PUT asks for. Headers win over the body, in the order
/// copy, move, mkdir.
pub fn put_intent(headers: &HeaderMap, body: &[u8]) -> Result<PutIntent, FsError> {
    if let Some(source) = header_value(headers, COPY_SOURCE_HEADER) {
        return Ok(PutIntent::Copy {
            source: paths::normalize(&source),
        });
    }
    if let Some(source) = header_value(headers, MOVE_SOURCE_HEADER) {
        return Ok(PutIntent::Move {
            source: paths::normalize(&source),
        });
    }
    if headers.contains_key(IS_DIR_HEADER) {
        return Ok(PutIntent::MakeDir);
    }
    if body.iter().all(u8::is_ascii_whitespace) {
        return Ok(PutIntent::Noop);
    }
    let parsed: WriteBody = serde_json::from_slice(body)
        .map_err(|e| FsError::Internal(anyhow::anyhow!("Invalid request body: {}", e)))?;
    Ok(match parsed.content {
        Some(content) => PutIntent::Write { content },
        None => PutIntent::Noop,
    })
}

// ── GET /files ──

pub async fn get_root(
    State(state): State<Arc<AppState>>,
) -> Result<Json<GetResult>, FsError> {
    let vfs = state.vfs()?;
    Ok(Json(GetResult::Listing(vfs.list("").await?)))
}

// ── GET /files/{*path} ──

pub async fn get_path(
    State(state): State<Arc<AppState>>,
    Path(path): Path<String>,
    headers: HeaderMap,
) -> Result<Json<GetResult>, FsError> {
    let path = paths::normalize(&path);
    let directory_hint = headers.contains_key(IS_DIR_HEADER);
    debug!(path = %path, directory_hint, "GET file");
    let vfs = state.vfs()?;
    Ok(Json(vfs.get(&path, directory_hint).await?))
}

// ── PUT /files/{*path} ──

pub async fn put_path(
    State(state): State<Arc<AppState>>,
    Path(path): Path<String>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<PutResult>, FsError> {
    let path = paths::normalize(&path);
    let intent = put_intent(&headers, &body)?;
    debug!(path = %path, intent = intent_name(&intent), "PUT file");
    let vfs = state.vfs()?;
    Ok(Json(vfs.put(&path, intent).await?))
}

// ── DELETE /files/{*path} ──

pub async fn delete_path(
    State(state): State<Arc<AppState>>,
    Path(path): Path<String>,
) -> Result<Json<DeleteResult>, FsError> {
    let path = paths::normalize(&path);
    let vfs = state.vfs()?;
    vfs.delete(&path).await?;
    Ok(Json(DeleteResult(Empty::default())))
}

fn intent_name(intent: &PutIntent) -> &'static str {
    match intent {
        PutIntent::Copy { .. } => "copy",
        PutIntent::Move { .. } => "move",
        PutIntent::MakeDir => "mkdir",
        PutIntent::Write { .. } => "write",
        PutIntent::Noop => "noop",
    }
}
