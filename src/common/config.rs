// src/common/config.rs
//! Environment-driven configuration for the identity and credential core.

use chrono::Duration;
use std::env;
use tracing::{info, warn};

/// `iss` claim of every token this service signs
pub const TOKEN_ISSUER: &str = "secure-auth-system";
/// `aud` claim of every token this service signs
pub const TOKEN_AUDIENCE: &str = "secure-auth-client";

/// Client credentials for one OAuth provider
#[derive(Debug, Clone)]
pub struct ProviderCredentials {
    pub client_id: String,
    pub client_secret: String,
    pub callback_url: String,
}

#[derive(Debug, Clone)]
pub struct AuthConfig {
    pub jwt_secret: String,
    pub jwt_refresh_secret: String,
    pub access_token_ttl: Duration,
    pub refresh_token_ttl: Duration,
    pub otp_ttl_minutes: i64,
    pub otp_resend_window_minutes: i64,
    pub otp_purge_minutes: u64,
    pub pending_registration_ttl_minutes: i64,
    pub pending_sweep_minutes: u64,
    pub password_hash_iterations: u32,
    pub cookie_secure: bool,
    pub frontend_url: String,
    pub http_timeout_seconds: u64,
    pub db_acquire_timeout_seconds: u64,
    pub google: Option<ProviderCredentials>,
    pub github: Option<ProviderCredentials>,
    pub ses_from_email: Option<String>,
    pub ses_region: String,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            jwt_secret: "replace_with_strong_access_secret".to_string(),
            jwt_refresh_secret: "replace_with_strong_refresh_secret".to_string(),
            access_token_ttl: Duration::minutes(15),
            refresh_token_ttl: Duration::days(7),
            otp_ttl_minutes: 10,
            otp_resend_window_minutes: 1,
            otp_purge_minutes: 15,
            pending_registration_ttl_minutes: 10,
            pending_sweep_minutes: 5,
            password_hash_iterations: 3,
            cookie_secure: false,
            frontend_url: "http://localhost:3000".to_string(),
            http_timeout_seconds: 10,
            db_acquire_timeout_seconds: 5,
            google: None,
            github: None,
            ses_from_email: None,
            ses_region: "us-east-1".to_string(),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("JWT_SECRET and JWT_REFRESH_SECRET must differ")]
    SharedTokenSecret,

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

impl AuthConfig {
    /// Load configuration from environment variables
    pub fn from_env() -> Self {
        let mut config = Self::default();

        match env::var("JWT_SECRET") {
            Ok(secret) if !secret.is_empty() => config.jwt_secret = secret,
            _ => warn!("JWT_SECRET not set, using development default"),
        }

        match env::var("JWT_REFRESH_SECRET") {
            Ok(secret) if !secret.is_empty() => config.jwt_refresh_secret = secret,
            _ => warn!("JWT_REFRESH_SECRET not set, using development default"),
        }

        // JWT_EXPIRES_IN / JWT_REFRESH_EXPIRES_IN - "15m", "7d", "3600s", "12h"
        if let Some(ttl) = env::var("JWT_EXPIRES_IN").ok().and_then(|v| parse_duration(&v)) {
            config.access_token_ttl = ttl;
        }
        if let Some(ttl) = env::var("JWT_REFRESH_EXPIRES_IN")
            .ok()
            .and_then(|v| parse_duration(&v))
        {
            config.refresh_token_ttl = ttl;
        }

        if let Some(val) = parse_env::<i64>("OTP_EXPIRES_MINUTES") {
            config.otp_ttl_minutes = val;
        }
        if let Some(val) = parse_env::<i64>("OTP_RESEND_WINDOW_MINUTES") {
            config.otp_resend_window_minutes = val;
        }
        if let Some(val) = parse_env::<u64>("OTP_PURGE_MINUTES") {
            config.otp_purge_minutes = val;
        }
        if let Some(val) = parse_env::<i64>("PENDING_REG_EXPIRY_MINUTES") {
            config.pending_registration_ttl_minutes = val;
        }
        if let Some(val) = parse_env::<u64>("PENDING_REG_SWEEP_MINUTES") {
            config.pending_sweep_minutes = val;
        }
        if let Some(val) = parse_env::<u32>("PASSWORD_HASH_ITERATIONS") {
            config.password_hash_iterations = val;
        }
        if let Some(val) = parse_env::<u64>("HTTP_TIMEOUT_SECONDS") {
            config.http_timeout_seconds = val;
        }
        if let Some(val) = parse_env::<u64>("DB_ACQUIRE_TIMEOUT_SECONDS") {
            config.db_acquire_timeout_seconds = val;
        }

        // COOKIE_SECURE wins over APP_ENV when both are present
        config.cookie_secure = match env::var("COOKIE_SECURE") {
            Ok(v) => v.to_lowercase() == "true",
            Err(_) => env::var("APP_ENV").map(|v| v == "production").unwrap_or(false),
        };

        if let Ok(url) = env::var("FRONTEND_URL") {
            config.frontend_url = url.trim_end_matches('/').to_string();
        }

        config.google = provider_from_env("GOOGLE");
        config.github = provider_from_env("GITHUB");

        config.ses_from_email = env::var("SES_FROM_EMAIL").ok().filter(|s| !s.is_empty());
        if let Ok(region) = env::var("SES_REGION") {
            config.ses_region = region;
        }

        info!(
            access_token_ttl_secs = config.access_token_ttl.num_seconds(),
            refresh_token_ttl_secs = config.refresh_token_ttl.num_seconds(),
            otp_ttl_minutes = config.otp_ttl_minutes,
            pending_registration_ttl_minutes = config.pending_registration_ttl_minutes,
            google_enabled = config.google.is_some(),
            github_enabled = config.github.is_some(),
            cookie_secure = config.cookie_secure,
            "Loaded auth configuration"
        );

        config
    }

    /// Reject configurations that would weaken the token model
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.jwt_secret == self.jwt_refresh_secret {
            return Err(ConfigError::SharedTokenSecret);
        }
        if self.access_token_ttl <= Duration::zero() || self.refresh_token_ttl <= Duration::zero()
        {
            return Err(ConfigError::Invalid("token lifetimes must be positive".to_string()));
        }
        if self.otp_ttl_minutes <= 0 || self.pending_registration_ttl_minutes <= 0 {
            return Err(ConfigError::Invalid("expiry windows must be positive".to_string()));
        }
        Ok(())
    }
}

fn parse_env<T: std::str::FromStr>(key: &str) -> Option<T> {
    env::var(key).ok().and_then(|v| v.trim().parse::<T>().ok())
}

fn provider_from_env(prefix: &str) -> Option<ProviderCredentials> {
    let client_id = env::var(format!("{prefix}_CLIENT_ID")).ok()?;
    let client_secret = env::var(format!("{prefix}_CLIENT_SECRET")).ok()?;
    let callback_url = env::var(format!("{prefix}_CALLBACK_URL")).ok()?;
    Some(ProviderCredentials {
        client_id,
        client_secret,
        callback_url,
    })
}

/// Parse a duration string such as `15m`, `7d`, `12h` or `900s`.
/// A bare number is read as seconds.
pub fn parse_duration(raw: &str) -> Option<Duration> {
    let raw = raw.trim();
    let split = raw.find(|c: char| !c.is_ascii_digit()).unwrap_or(raw.len());
    let (digits, unit) = raw.split_at(split);
    let value: i64 = digits.parse().ok()?;
    match unit {
        "" | "s" => Some(Duration::seconds(value)),
        "m" => Some(Duration::minutes(value)),
        "h" => Some(Duration::hours(value)),
        "d" => Some(Duration::days(value)),
        _ => None,
    }
}
