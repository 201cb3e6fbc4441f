// src/main.rs
use axum::{
    extract::{Extension, Request},
    http::StatusCode,
    middleware,
    routing::get,
    Json, Router,
};
use dotenv::dotenv;
use reqwest::Client;
use sentry::integrations::tower::{NewSentryLayer, SentryHttpLayer};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use std::env;
use std::path::PathBuf;
use std::time::Duration;
use std::{net::SocketAddr, str::FromStr, sync::Arc};
use tokio::{net::TcpListener, sync::RwLock};
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::{error, info, warn};
use tracing_subscriber::{prelude::*, EnvFilter};

// ============================================================================
// MODULE IMPORTS
// ============================================================================

mod auth;
mod common;
mod identity;
mod logging_middleware;
mod oauth;
mod services;
mod store;

// ============================================================================
// COMMON IMPORTS
// ============================================================================

use auth::AuthService;
use common::clock::{Clock, SystemClock};
use common::config::AuthConfig;
use common::AppState;
use identity::IdentityService;
use oauth::OAuthClient;
use services::monitoring::{init_sentry, MonitoringConfig};
use services::{
    oauth_state_store, pending_registration_store, LogMailer, Mailer, OtpService,
    PasswordHasherService, SesMailer, TokenService,
};
use store::{CredentialStore, SqliteCredentialStore};

// ============================================================================
// MAIN APPLICATION ENTRY POINT
// ============================================================================

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv().ok();

    // Sentry first so the tracing layer has a client to report into
    let _sentry_guard = init_sentry(&MonitoringConfig::from_env());

    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(tracing_subscriber::fmt::layer().with_target(false))
        .with(sentry_tracing::layer())
        .init();

    // ========================================================================
    // ENVIRONMENT CONFIGURATION
    // ========================================================================

    let config = AuthConfig::from_env();
    config.validate()?;
    let config = Arc::new(config);

    let database_url =
        env::var("DATABASE_URL").unwrap_or_else(|_| "sqlite://authgate.db".to_string());

    // ========================================================================
    // DATABASE SETUP
    // ========================================================================

    if let Some(path_part) = database_url.strip_prefix("sqlite://") {
        let path_without_params = path_part.split('?').next().unwrap_or("");
        if !path_without_params.is_empty() && !path_without_params.starts_with(':') {
            let db_path = PathBuf::from(path_without_params);
            if let Some(parent) = db_path.parent() {
                if !parent.as_os_str().is_empty() {
                    tokio::fs::create_dir_all(parent).await?;
                }
            }
        }
    }

    let connect_options = SqliteConnectOptions::from_str(&database_url)?
        .create_if_missing(true)
        .foreign_keys(true);
    let pool = SqlitePoolOptions::new()
        .acquire_timeout(Duration::from_secs(config.db_acquire_timeout_seconds))
        .connect_with(connect_options)
        .await?;

    common::migrations::run_migrations(&pool).await?;

    // ========================================================================
    // SERVICE INITIALIZATION
    // ========================================================================

    let clock: Arc<dyn Clock> = Arc::new(SystemClock);
    let store: Arc<dyn CredentialStore> = Arc::new(SqliteCredentialStore::new(pool.clone()));

    let http_client = Client::builder()
        .timeout(Duration::from_secs(config.http_timeout_seconds))
        .build()?;

    let mailer: Arc<dyn Mailer> = match &config.ses_from_email {
        Some(from_email) => {
            let mailer = SesMailer::new(
                &config.ses_region,
                from_email.clone(),
                Duration::from_secs(config.http_timeout_seconds),
                config.otp_ttl_minutes,
            )
            .await;
            info!(region = %config.ses_region, "SES mailer initialized");
            Arc::new(mailer)
        }
        None => {
            warn!("SES_FROM_EMAIL not set, emails will only be logged");
            Arc::new(LogMailer::new(config.otp_ttl_minutes))
        }
    };

    let otp = OtpService::new(store.clone(), clock.clone(), config.otp_ttl_minutes);
    let pending = pending_registration_store(config.pending_registration_ttl_minutes, clock.clone());
    let oauth_states = oauth_state_store(clock.clone());
    let tokens = TokenService::new(&config, clock.clone());
    let hasher = PasswordHasherService::new(config.password_hash_iterations);

    let auth = AuthService::new(
        store.clone(),
        otp.clone(),
        pending.clone(),
        tokens,
        hasher,
        mailer,
        clock.clone(),
        config.otp_resend_window_minutes,
    );

    let oauth = OAuthClient::new(http_client, &config, clock.clone());
    let identity = IdentityService::new(store.clone(), clock.clone(), Arc::new(oauth.clone()));

    // ========================================================================
    // BACKGROUND TASKS
    // ========================================================================

    pending.start_sweep_task(config.pending_sweep_minutes);
    oauth_states.start_sweep_task(config.pending_sweep_minutes);
    otp.start_purge_task(config.otp_purge_minutes);
    info!("Expiry sweep tasks started");

    // ========================================================================
    // APPLICATION STATE
    // ========================================================================

    let app_state = AppState {
        config: config.clone(),
        db: pool,
        auth,
        identity,
        oauth,
        oauth_states,
    };

    let shared = Arc::new(RwLock::new(app_state));

    // ========================================================================
    // ROUTER COMPOSITION
    // ========================================================================

    let app = Router::new()
        .route("/health", get(health))
        // ====================================================================
        // ACCOUNT, SESSION AND OAUTH ROUTES
        // ====================================================================
        .merge(auth::auth_routes())
        .merge(oauth::oauth_routes())
        // ====================================================================
        // EMAIL VERIFICATION AND PASSWORD RESET
        // ====================================================================
        .merge(auth::email_routes())
        // ====================================================================
        // MIDDLEWARE AND LAYERS
        // ====================================================================
        .layer(middleware::from_fn(logging_middleware::log_request_response))
        .layer(Extension(shared.clone()))
        .layer(cors_layer(&config))
        .layer(TraceLayer::new_for_http())
        .layer(SentryHttpLayer::with_transaction())
        .layer(NewSentryLayer::<Request>::new_from_top());

    // ========================================================================
    // SERVER STARTUP
    // ========================================================================

    let port = env::var("PORT")
        .ok()
        .and_then(|p| p.parse::<u16>().ok())
        .unwrap_or(8080);

    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    info!("Listening on {}", addr);
    let listener = TcpListener::bind(addr).await?;
    axum::serve(listener, app.into_make_service()).await?;

    Ok(())
}

/// GET /health
async fn health(
    Extension(state_lock): Extension<Arc<RwLock<AppState>>>,
) -> (StatusCode, Json<serde_json::Value>) {
    let db = state_lock.read().await.db.clone();
    match sqlx::query("SELECT 1").execute(&db).await {
        Ok(_) => (
            StatusCode::OK,
            Json(serde_json::json!({ "success": true, "status": "ok" })),
        ),
        Err(e) => {
            error!(error = %e, "Health check database ping failed");
            (
                StatusCode::SERVICE_UNAVAILABLE,
                Json(serde_json::json!({ "success": false, "status": "degraded" })),
            )
        }
    }
}

/// Credentials-enabled CORS for the frontend origin plus `CORS_ORIGINS`
fn cors_layer(config: &AuthConfig) -> CorsLayer {
    let extra = env::var("CORS_ORIGINS").unwrap_or_default();
    let origins: Vec<axum::http::HeaderValue> = std::iter::once(config.frontend_url.as_str())
        .chain(extra.split(','))
        .map(str::trim)
        .filter(|origin| !origin.is_empty())
        .filter_map(|origin| origin.parse().ok())
        .collect();

    CorsLayer::new()
        .allow_origin(origins)
        .allow_methods([
            axum::http::Method::GET,
            axum::http::Method::POST,
            axum::http::Method::PUT,
            axum::http::Method::DELETE,
            axum::http::Method::OPTIONS,
        ])
        .allow_headers([
            axum::http::header::CONTENT_TYPE,
            axum::http::header::AUTHORIZATION,
        ])
        .allow_credentials(true)
}
