//! OAuth routes

use axum::{
    routing::{delete, get, post},
    Router,
};

use super::handlers;

/// Provider sign-in, callbacks and linked-account management
pub fn oauth_routes() -> Router {
    Router::new()
        .route("/api/auth/google", get(handlers::google_start))
        .route("/api/auth/google/callback", get(handlers::google_callback))
        .route("/api/auth/github", get(handlers::github_start))
        .route("/api/auth/github/callback", get(handlers::github_callback))
        .route("/api/auth/link/:provider", post(handlers::link_provider))
        .route("/api/auth/unlink/:provider", delete(handlers::unlink_provider))
        .route("/api/auth/accounts", get(handlers::list_accounts))
        .route("/api/auth/verify-github", post(handlers::verify_github))
        .route("/api/auth/error", get(handlers::oauth_error))
}
