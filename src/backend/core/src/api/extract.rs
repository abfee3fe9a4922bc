//! Acting-user extraction.

use axum::{async_trait, extract::FromRequestParts, http::request::Parts};

use super::AppState;
use crate::error::WarehubError;
use crate::models::User;

/// Header carrying the auth provider's user id.
pub const EXTERNAL_AUTH_HEADER: &str = "x-external-auth-id";

/// The synced user behind the request. Missing or unknown ids are rejected
/// with 401.
#[derive(Debug, Clone)]
pub struct CurrentUser(pub User);

#[async_trait]
impl FromRequestParts<AppState> for CurrentUser {
    type Rejection = WarehubError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        let external_id = parts
            .headers
            .get(EXTERNAL_AUTH_HEADER)
            .and_then(|v| v.to_str().ok())
            .map(str::trim)
            .filter(|v| !v.is_empty())
            .ok_or_else(|| WarehubError::unauthenticated("Authentication required"))?;

        state.identity.resolve(external_id).await.map(CurrentUser)
    }
}
