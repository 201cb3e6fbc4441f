//! Account and session handlers under `/api/auth`

use axum::{
    extract::{Extension, Json},
    http::{header, HeaderMap, StatusCode},
    response::{IntoResponse, Response},
};
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{info, warn};

use super::cookies::{clear_refresh_cookie, read_refresh_cookie, refresh_cookie};
use super::extractors::AuthedUser;
use super::models::*;
use super::validators::validate;
use crate::common::{safe_email_log, ApiError, AppState};
use crate::services::email::AlertDetails;
use crate::services::TokenPair;
use crate::store::{ProfileUpdate, User};

/// Body for any response that opens a session: user, access token and the
/// refresh token as a cookie.
pub(crate) fn session_response(
    state: &AppState,
    status: StatusCode,
    message: &str,
    user: &User,
    tokens: &TokenPair,
) -> Response {
    let body = serde_json::json!({
        "success": true,
        "message": message,
        "data": {
            "user": UserView::from(user),
            "accessToken": tokens.access_token,
            "expiresIn": tokens.expires_in,
        }
    });
    with_refresh_cookie(state, tokens, (status, Json(body)).into_response())
}

pub(crate) fn with_refresh_cookie(
    state: &AppState,
    tokens: &TokenPair,
    mut response: Response,
) -> Response {
    let max_age = state.auth.tokens().refresh_ttl();
    match refresh_cookie(&tokens.refresh_token, max_age, state.config.cookie_secure) {
        Some(cookie) => {
            response.headers_mut().insert(header::SET_COOKIE, cookie);
        }
        None => warn!("Refresh token is not a valid cookie value"),
    }
    response
}

/// Client address and agent for security alert emails
pub(crate) fn alert_details(headers: &HeaderMap) -> AlertDetails {
    let header_str = |name: &str| {
        headers
            .get(name)
            .and_then(|v| v.to_str().ok())
            .map(str::trim)
            .filter(|v| !v.is_empty())
    };
    AlertDetails {
        ip: header_str("x-forwarded-for")
            .and_then(|v| v.split(',').next())
            .or_else(|| header_str("x-real-ip"))
            .map(|v| v.trim().to_string()),
        user_agent: header_str(header::USER_AGENT.as_str()).map(str::to_string),
    }
}

/// POST /api/auth/pre-register
/// Stages a signup and emails a verification code
pub async fn pre_register(
    Extension(state_lock): Extension<Arc<RwLock<AppState>>>,
    Json(request): Json<PreRegisterRequest>,
) -> Result<Json<serde_json::Value>, ApiError> {
    validate(&request)?;
    let state = state_lock.read().await.clone();

    state
        .auth
        .pre_register(&request.email, &request.password, &request.name)
        .await?;

    info!(email = %safe_email_log(&request.email), "Verification code sent for signup");
    Ok(Json(serde_json::json!({
        "success": true,
        "message": "Verification code sent to your email"
    })))
}

/// POST /api/auth/verify-registration
/// Confirms the signup code and opens a session
pub async fn verify_registration(
    Extension(state_lock): Extension<Arc<RwLock<AppState>>>,
    Json(request): Json<VerifyRegistrationRequest>,
) -> Result<Response, ApiError> {
    validate(&request)?;
    let state = state_lock.read().await.clone();

    let (user, tokens) = state
        .auth
        .verify_registration(&request.email, &request.otp)
        .await?;

    Ok(session_response(
        &state,
        StatusCode::CREATED,
        "Registration complete",
        &user,
        &tokens,
    ))
}

/// POST /api/auth/login
pub async fn login(
    Extension(state_lock): Extension<Arc<RwLock<AppState>>>,
    Json(request): Json<LoginRequest>,
) -> Result<Response, ApiError> {
    validate(&request)?;
    let state = state_lock.read().await.clone();

    let (user, tokens) = state.auth.login(&request.email, &request.password).await?;

    Ok(session_response(
        &state,
        StatusCode::OK,
        "Login successful",
        &user,
        &tokens,
    ))
}

/// POST /api/auth/refresh-token
/// Reads the refresh token from the cookie, falling back to the body
pub async fn refresh_token(
    Extension(state_lock): Extension<Arc<RwLock<AppState>>>,
    headers: HeaderMap,
    body: Option<Json<RefreshRequest>>,
) -> Result<Response, ApiError> {
    let state = state_lock.read().await.clone();

    let token = read_refresh_cookie(&headers)
        .or_else(|| body.and_then(|Json(b)| b.refresh_token))
        .filter(|t| !t.is_empty())
        .ok_or_else(|| ApiError::Unauthorized("Refresh token required".into()))?;

    let (_, tokens) = state.auth.refresh(&token).await?;

    let body = serde_json::json!({
        "success": true,
        "message": "Token refreshed successfully",
        "data": {
            "accessToken": tokens.access_token,
            "expiresIn": tokens.expires_in,
        }
    });
    Ok(with_refresh_cookie(&state, &tokens, Json(body).into_response()))
}

/// POST /api/auth/logout
/// Clears the refresh cookie; issued tokens stay valid until they expire
pub async fn logout(Extension(state_lock): Extension<Arc<RwLock<AppState>>>) -> Response {
    let secure = state_lock.read().await.config.cookie_secure;
    let body = serde_json::json!({
        "success": true,
        "message": "Logout successful"
    });
    (
        [(header::SET_COOKIE, clear_refresh_cookie(secure))],
        Json(body),
    )
        .into_response()
}

/// POST /api/auth/logout-all
/// Revokes every token issued to the caller
pub async fn logout_all(
    Extension(state_lock): Extension<Arc<RwLock<AppState>>>,
    authed: AuthedUser,
) -> Result<Response, ApiError> {
    let state = state_lock.read().await.clone();
    state.auth.logout_all(authed.id()).await?;

    let body = serde_json::json!({
        "success": true,
        "message": "Logged out from all sessions"
    });
    Ok((
        [(
            header::SET_COOKIE,
            clear_refresh_cookie(state.config.cookie_secure),
        )],
        Json(body),
    )
        .into_response())
}

/// GET /api/auth/profile
pub async fn get_profile(
    Extension(state_lock): Extension<Arc<RwLock<AppState>>>,
    authed: AuthedUser,
) -> Result<Json<serde_json::Value>, ApiError> {
    let state = state_lock.read().await.clone();
    let (user, accounts) = state.auth.profile(authed.id()).await?;

    Ok(Json(serde_json::json!({
        "success": true,
        "data": { "user": ProfileView::new(&user, &accounts) }
    })))
}

/// PUT /api/auth/profile
pub async fn update_profile(
    Extension(state_lock): Extension<Arc<RwLock<AppState>>>,
    authed: AuthedUser,
    Json(request): Json<UpdateProfileRequest>,
) -> Result<Json<serde_json::Value>, ApiError> {
    validate(&request)?;
    let state = state_lock.read().await.clone();

    let user = state
        .auth
        .update_profile(
            authed.id(),
            ProfileUpdate {
                name: request.name,
                avatar_url: request.avatar_url,
            },
        )
        .await?;

    Ok(Json(serde_json::json!({
        "success": true,
        "message": "Profile updated successfully",
        "data": { "user": UserView::from(&user) }
    })))
}

/// PUT /api/auth/change-password
/// Verified users only. Other sessions are revoked; the caller gets a new pair.
pub async fn change_password(
    Extension(state_lock): Extension<Arc<RwLock<AppState>>>,
    authed: AuthedUser,
    headers: HeaderMap,
    Json(request): Json<ChangePasswordRequest>,
) -> Result<Response, ApiError> {
    authed.require_verified()?;
    validate(&request)?;
    let state = state_lock.read().await.clone();

    let tokens = state
        .auth
        .change_password(
            authed.id(),
            &request.current_password,
            &request.new_password,
            &alert_details(&headers),
        )
        .await?;

    let body = serde_json::json!({
        "success": true,
        "message": "Password changed successfully",
        "data": {
            "accessToken": tokens.access_token,
            "expiresIn": tokens.expires_in,
        }
    });
    Ok(with_refresh_cookie(&state, &tokens, Json(body).into_response()))
}

/// DELETE /api/auth/account
pub async fn delete_account(
    Extension(state_lock): Extension<Arc<RwLock<AppState>>>,
    authed: AuthedUser,
    body: Option<Json<DeleteAccountRequest>>,
) -> Result<Response, ApiError> {
    let state = state_lock.read().await.clone();
    let request = body.map(|Json(b)| b).unwrap_or_default();

    state
        .auth
        .delete_account(authed.id(), request.password.as_deref())
        .await?;

    let body = serde_json::json!({
        "success": true,
        "message": "Account deleted successfully"
    });
    Ok((
        [(
            header::SET_COOKIE,
            clear_refresh_cookie(state.config.cookie_secure),
        )],
        Json(body),
    )
        .into_response())
}
