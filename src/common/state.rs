// Application state shared across all modules

use sqlx::SqlitePool;
use std::sync::Arc;

use super::config::AuthConfig;
use crate::auth::service::AuthService;
use crate::identity::IdentityService;
use crate::oauth::OAuthClient;
use crate::services::OAuthStateStore;

/// Database pool, configuration and the services the handlers call into
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<AuthConfig>,
    pub db: SqlitePool,
    pub auth: AuthService,
    pub identity: IdentityService,
    pub oauth: OAuthClient,
    pub oauth_states: OAuthStateStore,
}
