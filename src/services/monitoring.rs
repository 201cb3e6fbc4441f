// src/services/monitoring.rs
// Error tracking with Sentry

use std::env;
use tracing::info;

#[derive(Debug, Clone)]
pub struct MonitoringConfig {
    pub sentry_dsn: Option<String>,
    pub environment: String,
    pub traces_sample_rate: f32,
}

impl MonitoringConfig {
    pub fn from_env() -> Self {
        Self {
            sentry_dsn: env::var("SENTRY_DSN").ok().filter(|dsn| !dsn.is_empty()),
            environment: env::var("APP_ENV").unwrap_or_else(|_| "development".to_string()),
            traces_sample_rate: env::var("SENTRY_TRACES_SAMPLE_RATE")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(0.0),
        }
    }
}

/// Initialize the Sentry client. The returned guard must live as long as the process.
pub fn init_sentry(config: &MonitoringConfig) -> Option<sentry::ClientInitGuard> {
    let Some(dsn) = &config.sentry_dsn else {
        info!("Sentry DSN not configured");
        return None;
    };

    let guard = sentry::init((
        dsn.as_str(),
        sentry::ClientOptions {
            release: sentry::release_name!(),
            environment: Some(config.environment.clone().into()),
            traces_sample_rate: config.traces_sample_rate,
            ..Default::default()
        },
    ));

    info!(environment = %config.environment, "Sentry initialized");
    Some(guard)
}
