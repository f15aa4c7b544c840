//! Server configuration from environment variables.

use axum::http::HeaderValue;
use tracing::warn;
use uuid::Uuid;

use aera_core::defaults;

/// Settings for the HTTP server and its storage.
///
/// Provider settings are read separately by each backend's `from_env()`.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub host: String,
    pub port: u16,
    pub database_url: String,
    /// Root directory for uploaded objects.
    pub storage_path: String,
    /// HMAC key for signed object URLs.
    pub storage_signing_secret: String,
    /// Prefix for signed URLs handed to clients.
    pub public_base_url: String,
    pub rate_limit_enabled: bool,
    pub rate_limit_requests: u64,
    pub rate_limit_period_secs: u64,
    pub allowed_origins: Vec<String>,
    pub max_body_bytes: usize,
    pub reprocess_delay_min_ms: u64,
    pub reprocess_delay_max_ms: u64,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: defaults::SERVER_PORT,
            database_url: "postgres://localhost/aera".to_string(),
            storage_path: "./data/objects".to_string(),
            storage_signing_secret: String::new(),
            public_base_url: format!("http://localhost:{}", defaults::SERVER_PORT),
            rate_limit_enabled: true,
            rate_limit_requests: defaults::RATE_LIMIT_REQUESTS,
            rate_limit_period_secs: defaults::RATE_LIMIT_PERIOD_SECS,
            allowed_origins: vec!["http://localhost:3000".to_string()],
            max_body_bytes: defaults::MAX_BODY_SIZE_BYTES,
            reprocess_delay_min_ms: defaults::REPROCESS_DELAY_MIN_MS,
            reprocess_delay_max_ms: defaults::REPROCESS_DELAY_MAX_MS,
        }
    }
}

fn env_or<T: std::str::FromStr>(key: &str, default: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|v| v.trim().parse().ok())
        .unwrap_or(default)
}

impl AppConfig {
    /// Read settings, falling back to [`AppConfig::default`] per field.
    ///
    /// A missing `STORAGE_SIGNING_SECRET` gets a random per-process key, so
    /// signed URLs stop working across restarts.
    pub fn from_env() -> Self {
        let base = Self::default();
        let port = env_or("PORT", base.port);

        let storage_signing_secret = match std::env::var("STORAGE_SIGNING_SECRET") {
            Ok(secret) if !secret.trim().is_empty() => secret,
            _ => {
                warn!(
                    subsystem = "api",
                    "STORAGE_SIGNING_SECRET not set, using an ephemeral key"
                );
                format!("{}{}", Uuid::new_v4().simple(), Uuid::new_v4().simple())
            }
        };

        let allowed_origins = std::env::var("CORS_ALLOWED_ORIGINS")
            .ok()
            .map(|raw| {
                raw.split(',')
                    .map(str::trim)
                    .filter(|s| !s.is_empty())
                    .map(str::to_string)
                    .collect::<Vec<_>>()
            })
            .filter(|list| !list.is_empty())
            .unwrap_or(base.allowed_origins);

        Self {
            host: std::env::var("HOST").unwrap_or(base.host),
            port,
            database_url: std::env::var("DATABASE_URL").unwrap_or(base.database_url),
            storage_path: std::env::var("STORAGE_PATH").unwrap_or(base.storage_path),
            storage_signing_secret,
            public_base_url: std::env::var("PUBLIC_BASE_URL")
                .unwrap_or_else(|_| format!("http://localhost:{}", port)),
            rate_limit_enabled: std::env::var("RATE_LIMIT_ENABLED")
                .map(|v| v != "false" && v != "0")
                .unwrap_or(base.rate_limit_enabled),
            rate_limit_requests: env_or("RATE_LIMIT_REQUESTS", base.rate_limit_requests),
            rate_limit_period_secs: env_or("RATE_LIMIT_PERIOD_SECS", base.rate_limit_period_secs),
            allowed_origins,
            max_body_bytes: env_or("MAX_BODY_SIZE_BYTES", base.max_body_bytes),
            reprocess_delay_min_ms: env_or("REPROCESS_DELAY_MIN_MS", base.reprocess_delay_min_ms),
            reprocess_delay_max_ms: env_or("REPROCESS_DELAY_MAX_MS", base.reprocess_delay_max_ms),
        }
    }

    /// Allowed CORS origins as header values; unparsable entries are skipped.
    pub fn cors_origins(&self) -> Vec<HeaderValue> {
        self.allowed_origins
            .iter()
            .filter_map(|origin| match origin.parse::<HeaderValue>() {
                Ok(v) => Some(v),
                Err(e) => {
                    warn!(subsystem = "api", origin = %origin, error = %e, "Invalid CORS origin");
                    None
                }
            })
            .collect()
    }
}
