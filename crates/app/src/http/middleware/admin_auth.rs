use axum::body::Body;
use axum::extract::State;
use axum::http::header::AUTHORIZATION;
use axum::http::{Request, StatusCode};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use hmac::{Hmac, Mac};
use sha2::Sha256;
use thiserror::Error;
use tracing::warn;

use crate::state::AppState;

#[derive(Debug, Error)]
pub enum AdminAuthError {
    #[error("admin auth not configured")]
    MissingConfig,
    #[error("admin token required")]
    MissingToken,
    #[error("admin token invalid")]
    InvalidToken,
}

pub async fn require_admin(
    State(state): State<AppState>,
    request: Request<Body>,
    next: Next,
) -> Result<Response, AdminAuthError> {
    let expected = state
        .config
        .admin_token
        .as_deref()
        .filter(|value| !value.is_empty())
        .ok_or(AdminAuthError::MissingConfig)?;
    let token = extract_bearer_token(&request).ok_or(AdminAuthError::MissingToken)?;
    if !token_matches(expected, &token) {
        warn!(path = %request.uri().path(), "rejected admin token");
        return Err(AdminAuthError::InvalidToken);
    }
    Ok(next.run(request).await)
}

/// Compares fixed-length HMAC digests of both tokens instead of the tokens
/// themselves, so timing reveals neither length nor matching prefix.
fn token_matches(expected: &str, provided: &str) -> bool {
    let Ok(mut reference) = Hmac::<Sha256>::new_from_slice(expected.as_bytes()) else {
        return false;
    };
    reference.update(expected.as_bytes());
    let reference = reference.finalize().into_bytes();

    let Ok(mut candidate) = Hmac::<Sha256>::new_from_slice(expected.as_bytes()) else {
        return false;
    };
    candidate.update(provided.as_bytes());
    candidate.verify_slice(&reference).is_ok()
}

fn extract_bearer_token<B>(request: &Request<B>) -> Option<String> {
    let header = request.headers().get(AUTHORIZATION)?.to_str().ok()?;
    let value = header.trim().strip_prefix("Bearer ")?.trim();
    if value.is_empty() {
        None
    } else {
        Some(value.to_string())
    }
}

impl IntoResponse for AdminAuthError {
    fn into_response(self) -> Response {
        let status = match self {
            AdminAuthError::MissingConfig => StatusCode::SERVICE_UNAVAILABLE,
            AdminAuthError::MissingToken | AdminAuthError::InvalidToken => {
                StatusCode::UNAUTHORIZED
            }
        };
        (status, self.to_string()).into_response()
    }
}
