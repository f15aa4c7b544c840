//! Bearer-token authentication.

use axum::{
    async_trait,
    extract::FromRequestParts,
    http::{header, request::Parts},
};
use uuid::Uuid;

use crate::error::ApiError;
use crate::state::AppState;

/// The user behind a valid `Authorization: Bearer <token>` header.
///
/// Rejects with 401 when the header is missing, malformed, or unknown.
#[derive(Debug, Clone, Copy)]
pub struct AuthUser {
    pub user_id: Uuid,
}

/// Extract the token from an `Authorization` header value.
fn bearer_token(value: &str) -> Option<&str> {
    let (scheme, token) = value.split_once(' ')?;
    if !scheme.eq_ignore_ascii_case("bearer") {
        return None;
    }
    let token = token.trim();
    (!token.is_empty()).then_some(token)
}

#[async_trait]
impl FromRequestParts<AppState> for AuthUser {
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, ApiError> {
        let token = parts
            .headers
            .get(header::AUTHORIZATION)
            .and_then(|v| v.to_str().ok())
            .and_then(bearer_token)
            .ok_or_else(|| ApiError::Unauthorized("Authentication required".to_string()))?;

        match state.sessions.resolve_token(token).await? {
            Some(user_id) => Ok(AuthUser { user_id }),
            None => Err(ApiError::Unauthorized(
                "Invalid or expired token".to_string(),
            )),
        }
    }
}
