//! Authentication routes

use axum::{
    routing::{delete, get, post, put},
    Router,
};

use super::{email_handlers, handlers};

/// Creates and returns the account/session router
///
/// # Routes
/// - `POST /api/auth/pre-register`, `POST /api/auth/verify-registration`
/// - `POST /api/auth/login`, `POST /api/auth/refresh-token`
/// - `POST /api/auth/logout`, `POST /api/auth/logout-all`
/// - `GET|PUT /api/auth/profile`, `PUT /api/auth/change-password`
/// - `DELETE /api/auth/account`
pub fn auth_routes() -> Router {
    Router::new()
        .route("/api/auth/pre-register", post(handlers::pre_register))
        .route(
            "/api/auth/verify-registration",
            post(handlers::verify_registration),
        )
        .route("/api/auth/login", post(handlers::login))
        .route("/api/auth/refresh-token", post(handlers::refresh_token))
        .route("/api/auth/logout", post(handlers::logout))
        .route("/api/auth/logout-all", post(handlers::logout_all))
        .route(
            "/api/auth/profile",
            get(handlers::get_profile).put(handlers::update_profile),
        )
        .route("/api/auth/change-password", put(handlers::change_password))
        .route("/api/auth/account", delete(handlers::delete_account))
}

/// Email verification and password reset
pub fn email_routes() -> Router {
    Router::new()
        .route(
            "/api/email/send-verification",
            post(email_handlers::send_verification),
        )
        .route("/api/email/verify", post(email_handlers::verify_email))
        .route(
            "/api/email/forgot-password",
            post(email_handlers::forgot_password),
        )
        .route(
            "/api/email/reset-password",
            post(email_handlers::reset_password),
        )
        .route(
            "/api/email/resend-verification",
            post(email_handlers::resend_verification),
        )
        .route(
            "/api/email/verify-authenticated",
            post(email_handlers::verify_authenticated),
        )
}
