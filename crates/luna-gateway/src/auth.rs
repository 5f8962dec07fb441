use axum::extract::FromRequestParts;
use axum::http::StatusCode;
use axum::http::header::AUTHORIZATION;
use axum::http::request::Parts;
use luna_db::User;
use tracing::debug;

use crate::error::ApiError;
use crate::state::SharedState;

/// The user behind a valid `Authorization: Bearer <access token>` header.
pub struct AuthUser(pub User);

fn unauthorized(message: &str) -> ApiError {
    ApiError::new(StatusCode::UNAUTHORIZED, message)
}

impl FromRequestParts<SharedState> for AuthUser {
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &SharedState) -> Result<Self, Self::Rejection> {
        let header = parts
            .headers
            .get(AUTHORIZATION)
            .and_then(|v| v.to_str().ok())
            .ok_or_else(|| unauthorized("missing bearer token"))?;

        let token = header
            .strip_prefix("Bearer ")
            .or_else(|| header.strip_prefix("bearer "))
            .map(str::trim)
            .filter(|t| !t.is_empty())
            .ok_or_else(|| unauthorized("missing bearer token"))?;

        let claims = state.tokens.verify_access(token).map_err(|e| {
            debug!("rejected access token: {e}");
            unauthorized("invalid or expired token")
        })?;

        let user = state
            .db
            .get_user(&claims.user_id())?
            .ok_or_else(|| unauthorized("account no longer exists"))?;

        Ok(Self(user))
    }
}
