use std::sync::Arc;

use axum::extract::State;
use axum::middleware;
use axum::response::IntoResponse;
use axum::routing::get;
use axum::{Json, Router};

use crate::auth::token;
use crate::handlers::{auth, files};
use crate::state::AppState;

pub fn build_router(state: Arc<AppState>) -> Router {
    let guarded_routes = Router::new()
        // Credentials
        .route("/auth", get(auth::get_auth).post(auth::post_auth))
        // Files
        .route("/files", get(files::get_root))
        .route("/files/", get(files::get_root))
        .route(
            "/files/{*path}",
            get(files::get_path)
                .put(files::put_path)
                .delete(files::delete_path),
        )
        .layer(middleware::from_fn_with_state(state.clone(), token::token_middleware));

    // Unauthenticated routes
    let public_routes = Router::new().route("/health", get(health));

    Router::new()
        .merge(public_routes)
        .merge(guarded_routes)
        .with_state(state)
}

// ── GET /health ──

async fn health(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    Json(serde_json::json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
        "uptime_secs": state.started_at.elapsed().as_secs(),
    }))
}
