//! Authentication extractors for Axum

use async_trait::async_trait;
use axum::{
    extract::{Extension, FromRequestParts},
    http::{header::AUTHORIZATION, request::Parts},
};
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, warn};

use crate::common::helpers::safe_token_log;
use crate::common::{ApiError, AppState, AuthError};
use crate::services::tokens::extract_bearer;
use crate::store::User;

/// Authenticated user extractor
///
/// Requires `Authorization: Bearer <access token>`. The token must verify,
/// its user must still exist and its `ver` claim must match the user's
/// current token version. Every failure rejects with 401.
#[derive(Debug)]
pub struct AuthedUser {
    pub user: User,
}

impl AuthedUser {
    pub fn id(&self) -> &str {
        &self.user.id
    }

    /// Gate for routes that need a proven email
    pub fn require_verified(&self) -> Result<(), ApiError> {
        if self.user.is_verified {
            Ok(())
        } else {
            debug!(user_id = %self.user.id, "Unverified user hit a verified-only route");
            Err(ApiError::Forbidden("Email verification required".into()))
        }
    }
}

#[async_trait]
impl<S> FromRequestParts<S> for AuthedUser
where
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let Extension(state_lock): Extension<Arc<RwLock<AppState>>> =
            Extension::from_request_parts(parts, state)
                .await
                .map_err(|_| ApiError::InternalServer("missing app state".to_string()))?;

        let app_state = state_lock.read().await.clone();

        let Some(token) = parts
            .headers
            .get(AUTHORIZATION)
            .and_then(|h| h.to_str().ok())
            .and_then(extract_bearer)
        else {
            warn!("Authentication failed: missing or malformed Authorization header");
            return Err(ApiError::Unauthorized("Access token required".into()));
        };

        match app_state.auth.authenticate(token).await {
            Ok(user) => {
                debug!(user_id = %user.id, "Request authenticated");
                Ok(AuthedUser { user })
            }
            // Store outages keep their own status
            Err(err @ (AuthError::Unavailable(_) | AuthError::Internal(_))) => Err(err.into()),
            Err(err) => {
                warn!(token = %safe_token_log(token), error = %err, "Authentication failed");
                Err(ApiError::Unauthorized(err.to_string()))
            }
        }
    }
}
