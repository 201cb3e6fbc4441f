//! OAuth sign-in, linking and account management handlers

use axum::{
    extract::{Extension, Json, Path, Query},
    http::StatusCode,
    response::{IntoResponse, Redirect, Response},
};
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{error, info, warn};

use super::models::{CallbackQuery, ErrorQuery, LinkResponse, LinkedAccountView};
use crate::auth::handlers::with_refresh_cookie;
use crate::auth::models::UserView;
use crate::auth::AuthedUser;
use crate::common::{generate_raw_id, ApiError, AppState, AuthError};
use crate::services::OAuthIntent;
use crate::store::Provider;

fn parse_provider(raw: &str) -> Result<Provider, ApiError> {
    raw.parse::<Provider>()
        .map_err(|_| ApiError::ValidationError("Invalid OAuth provider".into()))
}

/// Mint a `state` nonce for `intent` and build the consent URL
async fn begin_flow(state: &AppState, intent: OAuthIntent) -> Result<String, ApiError> {
    let provider = intent.provider;
    if !state.oauth.is_configured(provider) {
        return Err(ApiError::NotFound(format!(
            "{} sign-in is not enabled",
            provider
        )));
    }

    let nonce = generate_raw_id(32);
    let url = state
        .oauth
        .authorize_url(provider, &nonce)
        .map_err(|e| ApiError::from(AuthError::from(e)))?;
    state.oauth_states.set(&nonce, intent).await;
    Ok(url)
}

fn error_redirect(state: &AppState, message: &str) -> Response {
    let url = format!(
        "{}/auth/error?message={}",
        state.config.frontend_url,
        urlencoding::encode(message)
    );
    Redirect::to(&url).into_response()
}

/// GET /api/auth/google
pub async fn google_start(
    Extension(state_lock): Extension<Arc<RwLock<AppState>>>,
) -> Result<Redirect, ApiError> {
    start(state_lock, Provider::Google).await
}

/// GET /api/auth/github
pub async fn github_start(
    Extension(state_lock): Extension<Arc<RwLock<AppState>>>,
) -> Result<Redirect, ApiError> {
    start(state_lock, Provider::Github).await
}

async fn start(state_lock: Arc<RwLock<AppState>>, provider: Provider) -> Result<Redirect, ApiError> {
    let state = state_lock.read().await.clone();
    let url = begin_flow(
        &state,
        OAuthIntent {
            provider,
            link_to: None,
        },
    )
    .await?;

    info!(provider = %provider, "Redirecting to OAuth provider");
    Ok(Redirect::to(&url))
}

/// GET /api/auth/google/callback
pub async fn google_callback(
    Extension(state_lock): Extension<Arc<RwLock<AppState>>>,
    Query(query): Query<CallbackQuery>,
) -> Response {
    callback(state_lock, Provider::Google, query).await
}

/// GET /api/auth/github/callback
pub async fn github_callback(
    Extension(state_lock): Extension<Arc<RwLock<AppState>>>,
    Query(query): Query<CallbackQuery>,
) -> Response {
    callback(state_lock, Provider::Github, query).await
}

/// Every outcome is a redirect back to the frontend
async fn callback(
    state_lock: Arc<RwLock<AppState>>,
    provider: Provider,
    query: CallbackQuery,
) -> Response {
    let state = state_lock.read().await.clone();

    if let Some(err) = query.error.as_deref() {
        warn!(provider = %provider, error = %err, "Provider reported an error");
        return error_redirect(&state, "OAuth authentication failed");
    }

    let (Some(code), Some(nonce)) = (query.code.as_deref(), query.state.as_deref()) else {
        warn!(provider = %provider, "Callback without code or state");
        return error_redirect(&state, "OAuth authentication failed");
    };

    // Single use: a replayed or expired state finds nothing
    let intent = match state.oauth_states.take(nonce).await {
        Some(intent) if intent.provider == provider => intent,
        _ => {
            warn!(provider = %provider, "Unknown or expired OAuth state");
            return error_redirect(&state, "OAuth session expired. Please try again.");
        }
    };

    match complete_sign_in(&state, &intent, code).await {
        Ok(response) => response,
        Err(err) => {
            error!(provider = %provider, error = %err, "OAuth sign-in failed");
            let message = match err {
                AuthError::Unauthorized(msg) | AuthError::Validation(msg) => msg,
                _ => "OAuth authentication failed".to_string(),
            };
            error_redirect(&state, &message)
        }
    }
}

async fn complete_sign_in(
    state: &AppState,
    intent: &OAuthIntent,
    code: &str,
) -> Result<Response, AuthError> {
    let assertion = state.oauth.fetch_assertion(intent.provider, code).await?;
    let resolution = state
        .identity
        .resolve(&assertion, intent.link_to.as_deref())
        .await?;
    let tokens = state.auth.issue_pair(&resolution.user)?;

    let url = format!(
        "{}/auth/callback?token={}&success=true",
        state.config.frontend_url,
        urlencoding::encode(&tokens.access_token)
    );
    Ok(with_refresh_cookie(
        state,
        &tokens,
        Redirect::to(&url).into_response(),
    ))
}

/// POST /api/auth/link/:provider
/// Returns the consent URL whose state attaches the identity to the caller
pub async fn link_provider(
    Extension(state_lock): Extension<Arc<RwLock<AppState>>>,
    authed: AuthedUser,
    Path(provider): Path<String>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let provider = parse_provider(&provider)?;
    let state = state_lock.read().await.clone();

    let url = begin_flow(
        &state,
        OAuthIntent {
            provider,
            link_to: Some(authed.id().to_string()),
        },
    )
    .await?;

    info!(user_id = %authed.id(), provider = %provider, "Account link started");
    Ok(Json(serde_json::json!({
        "success": true,
        "message": format!("Redirect to {} for account linking", provider),
        "data": LinkResponse { authorization_url: url }
    })))
}

/// DELETE /api/auth/unlink/:provider
pub async fn unlink_provider(
    Extension(state_lock): Extension<Arc<RwLock<AppState>>>,
    authed: AuthedUser,
    Path(provider): Path<String>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let provider = parse_provider(&provider)?;
    let state = state_lock.read().await.clone();

    state.identity.unlink(authed.id(), provider).await?;

    Ok(Json(serde_json::json!({
        "success": true,
        "message": format!("{} account unlinked successfully", provider)
    })))
}

/// GET /api/auth/accounts
pub async fn list_accounts(
    Extension(state_lock): Extension<Arc<RwLock<AppState>>>,
    authed: AuthedUser,
) -> Result<Json<serde_json::Value>, ApiError> {
    let state = state_lock.read().await.clone();
    let accounts = state.identity.list_accounts(authed.id()).await?;
    let accounts: Vec<LinkedAccountView> = accounts.iter().map(LinkedAccountView::from).collect();

    Ok(Json(serde_json::json!({
        "success": true,
        "data": { "accounts": accounts }
    })))
}

/// POST /api/auth/verify-github
pub async fn verify_github(
    Extension(state_lock): Extension<Arc<RwLock<AppState>>>,
    authed: AuthedUser,
) -> Result<Json<serde_json::Value>, ApiError> {
    if authed.user.is_github_verified {
        return Ok(Json(serde_json::json!({
            "success": true,
            "message": "GitHub already verified"
        })));
    }

    let state = state_lock.read().await.clone();
    let user = state.identity.verify_github(authed.id()).await?;

    Ok(Json(serde_json::json!({
        "success": true,
        "message": "GitHub verification completed",
        "data": { "user": UserView::from(&user) }
    })))
}

/// GET /api/auth/error
pub async fn oauth_error(Query(query): Query<ErrorQuery>) -> impl IntoResponse {
    (
        StatusCode::BAD_REQUEST,
        Json(serde_json::json!({
            "success": false,
            "message": "OAuth authentication failed",
            "error": query.error.unwrap_or_else(|| "Unknown error".to_string())
        })),
    )
}
