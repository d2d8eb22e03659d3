use std::sync::Arc;

use axum::extract::{Request, State};
use axum::http::StatusCode;
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use hmac::Mac;
use sha2::Sha256;

use crate::state::AppState;

/// Extract the token from `token <t>` or `Bearer <t>`.
pub fn parse_authorization(header: &str) -> Option<&str> {
    let (scheme, value) = header.trim().split_once(' ')?;
    if scheme.eq_ignore_ascii_case("token") || scheme.eq_ignore_ascii_case("bearer") {
        Some(value.trim()).filter(|t| !t.is_empty())
    } else {
        None
    }
}

/// Compare tokens without short-circuiting on the first differing byte.
fn tokens_match(expected: &str, presented: &str) -> bool {
    let mut mac = match hmac::Hmac::<Sha256>::new_from_slice(b"bucketfs-api-token") {
        Ok(mac) => mac,
        Err(_) => return false,
    };
    mac.update(expected.as_bytes());
    let expected_tag = mac.finalize().into_bytes();

    let mut mac = match hmac::Hmac::<Sha256>::new_from_slice(b"bucketfs-api-token") {
        Ok(mac) => mac,
        Err(_) => return false,
    };
    mac.update(presented.as_bytes());
    mac.verify_slice(&expected_tag).is_ok()
}

/// Axum middleware that checks the configured API token.
/// Without a configured token every request is admitted.
pub async fn token_middleware(
    State(state): State<Arc<AppState>>,
    req: Request,
    next: Next,
) -> Response {
    let Some(expected) = state.settings.api_token.as_deref() else {
        return next.run(req).await;
    };

    let presented = req
        .headers()
        .get("authorization")
        .and_then(|v| v.to_str().ok())
        .and_then(parse_authorization);

    match presented {
        Some(token) if tokens_match(expected, token) => next.run(req).await,
        Some(_) => (StatusCode::UNAUTHORIZED, "Invalid token").into_response(),
        None => {
            (StatusCode::UNAUTHORIZED, "Missing or invalid Authorization header").into_response()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_authorization() {
        assert_eq!(parse_authorization("token abc"), Some("abc"));
        assert_eq!(parse_authorization("Bearer abc"), Some("abc"));
        assert_eq!(parse_authorization("Basic abc"), None);
        assert_eq!(parse_authorization("token "), None);
        assert_eq!(parse_authorization("abc"), None);
    }

    #[test]
    fn test_tokens_match() {
        assert!(tokens_match("secret", "secret"));
        assert!(!tokens_match("secret", "secreT"));
        assert!(!tokens_match("secret", ""));
    }
}
