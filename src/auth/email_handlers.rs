//! Email verification and password reset handlers under `/api/email`

use axum::{
    extract::{Extension, Json},
    http::HeaderMap,
};
use std::sync::Arc;
use tokio::sync::RwLock;

use super::extractors::AuthedUser;
use super::handlers::alert_details;
use super::models::*;
use super::validators::validate;
use crate::common::{ApiError, AppState};

const RESET_SENT: &str = "If the email exists, a password reset code has been sent";

/// POST /api/email/send-verification
pub async fn send_verification(
    Extension(state_lock): Extension<Arc<RwLock<AppState>>>,
    Json(request): Json<EmailRequest>,
) -> Result<Json<serde_json::Value>, ApiError> {
    validate(&request)?;
    let state = state_lock.read().await.clone();
    state.auth.send_verification(&request.email).await?;

    Ok(Json(serde_json::json!({
        "success": true,
        "message": "If the account exists and is unverified, a verification code has been sent"
    })))
}

/// POST /api/email/verify
pub async fn verify_email(
    Extension(state_lock): Extension<Arc<RwLock<AppState>>>,
    Json(request): Json<VerifyEmailRequest>,
) -> Result<Json<serde_json::Value>, ApiError> {
    validate(&request)?;
    let state = state_lock.read().await.clone();
    let user = state.auth.verify_email(&request.email, &request.otp).await?;

    Ok(Json(serde_json::json!({
        "success": true,
        "message": "Email verified successfully",
        "data": { "user": UserView::from(&user) }
    })))
}

/// POST /api/email/forgot-password
/// Same answer whether or not the address has an account
pub async fn forgot_password(
    Extension(state_lock): Extension<Arc<RwLock<AppState>>>,
    Json(request): Json<EmailRequest>,
) -> Result<Json<serde_json::Value>, ApiError> {
    validate(&request)?;
    let state = state_lock.read().await.clone();
    state.auth.request_password_reset(&request.email).await?;

    Ok(Json(serde_json::json!({
        "success": true,
        "message": RESET_SENT
    })))
}

/// POST /api/email/reset-password
pub async fn reset_password(
    Extension(state_lock): Extension<Arc<RwLock<AppState>>>,
    headers: HeaderMap,
    Json(request): Json<ResetPasswordRequest>,
) -> Result<Json<serde_json::Value>, ApiError> {
    validate(&request)?;
    let state = state_lock.read().await.clone();
    state
        .auth
        .reset_password(
            &request.email,
            &request.otp,
            &request.new_password,
            &alert_details(&headers),
        )
        .await?;

    Ok(Json(serde_json::json!({
        "success": true,
        "message": "Password reset successfully"
    })))
}

/// POST /api/email/resend-verification
pub async fn resend_verification(
    Extension(state_lock): Extension<Arc<RwLock<AppState>>>,
    authed: AuthedUser,
) -> Result<Json<serde_json::Value>, ApiError> {
    let state = state_lock.read().await.clone();
    state.auth.resend_verification(authed.id()).await?;

    Ok(Json(serde_json::json!({
        "success": true,
        "message": "Verification code sent to your email"
    })))
}

/// POST /api/email/verify-authenticated
pub async fn verify_authenticated(
    Extension(state_lock): Extension<Arc<RwLock<AppState>>>,
    authed: AuthedUser,
    Json(request): Json<OtpRequest>,
) -> Result<Json<serde_json::Value>, ApiError> {
    validate(&request)?;
    let state = state_lock.read().await.clone();
    let user = state
        .auth
        .verify_email_authenticated(authed.id(), &request.otp)
        .await?;

    Ok(Json(serde_json::json!({
        "success": true,
        "message": "Email verified successfully",
        "data": { "user": UserView::from(&user) }
    })))
}
