//! Service configuration.

use std::str::FromStr;
use std::time::Duration;

use paw_points_core::PointsConfig;

use crate::rate_limit::{RateLimitConfig, RateLimitRule};

/// Service configuration loaded from environment variables.
#[derive(Debug, Clone)]
pub struct ServiceConfig {
    /// Address to listen on (default: "0.0.0.0:8080").
    pub listen_addr: String,

    /// Path to `RocksDB` data directory (default: "/data/paw-points").
    pub data_dir: String,

    /// PostgreSQL connection URL. When set, PostgreSQL is used instead of `RocksDB`.
    pub database_url: Option<String>,

    /// PostgreSQL pool size.
    pub database_max_connections: u32,

    /// Identity provider base URL; JWKS is served from `/.well-known/jwks.json`.
    pub auth_base_url: String,

    /// Expected JWT audience (default: "paw-points").
    pub auth_audience: String,

    /// Emails allowed to use admin endpoints, lowercased.
    pub admin_emails: Vec<String>,

    /// CORS allowed origins.
    pub cors_origins: Vec<String>,

    /// Maximum request body size in bytes.
    pub max_body_bytes: usize,

    /// Request timeout in seconds.
    pub request_timeout_seconds: u64,

    /// Rate-limit rules per category.
    pub rate_limits: RateLimitConfig,

    /// Key rate limits on `X-Forwarded-For` / `X-Real-IP` (default: false).
    /// Enable only behind a proxy that sets these headers itself.
    pub trust_proxy_headers: bool,

    /// Action values, caps and the calendar-day offset.
    pub points: PointsConfig,

    /// Optional JSON catalog file. The built-in catalog is used when unset.
    pub catalog_path: Option<String>,
}

impl ServiceConfig {
    /// Load configuration from environment variables.
    #[must_use]
    pub fn from_env() -> Self {
        let defaults = Self::default();

        let mut points = defaults.points;
        points.day_offset_minutes = env_parse("DAY_OFFSET_MINUTES", points.day_offset_minutes);

        Self {
            listen_addr: std::env::var("LISTEN_ADDR").unwrap_or(defaults.listen_addr),
            data_dir: std::env::var("DATA_DIR").unwrap_or(defaults.data_dir),
            database_url: std::env::var("DATABASE_URL").ok().filter(|s| !s.is_empty()),
            database_max_connections: env_parse(
                "DATABASE_MAX_CONNECTIONS",
                defaults.database_max_connections,
            ),
            auth_base_url: std::env::var("AUTH_BASE_URL").unwrap_or(defaults.auth_base_url),
            auth_audience: std::env::var("AUTH_AUDIENCE").unwrap_or(defaults.auth_audience),
            admin_emails: std::env::var("ADMIN_EMAILS")
                .map(|s| parse_admin_emails(&s))
                .unwrap_or_default(),
            cors_origins: std::env::var("CORS_ORIGINS")
                .unwrap_or_else(|_| "*".into())
                .split(',')
                .map(|s| s.trim().to_string())
                .collect(),
            max_body_bytes: env_parse("MAX_BODY_BYTES", defaults.max_body_bytes),
            request_timeout_seconds: env_parse(
                "REQUEST_TIMEOUT_SECONDS",
                defaults.request_timeout_seconds,
            ),
            rate_limits: RateLimitConfig {
                general: env_rule("RATE_LIMIT_GENERAL", defaults.rate_limits.general),
                write: env_rule("RATE_LIMIT_WRITE", defaults.rate_limits.write),
            },
            trust_proxy_headers: env_parse(
                "TRUST_PROXY_HEADERS",
                defaults.trust_proxy_headers,
            ),
            points,
            catalog_path: std::env::var("CATALOG_PATH").ok().filter(|s| !s.is_empty()),
        }
    }

    /// Whether `email` is on the admin allow-list (case-insensitive).
    #[must_use]
    pub fn is_admin_email(&self, email: &str) -> bool {
        let email = email.trim().to_lowercase();
        self.admin_emails.iter().any(|admin| *admin == email)
    }
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            listen_addr: "0.0.0.0:8080".into(),
            data_dir: "/data/paw-points".into(),
            database_url: None,
            database_max_connections: 10,
            auth_base_url: "https://auth.pawpoints.local".into(),
            auth_audience: "paw-points".into(),
            admin_emails: Vec::new(),
            cors_origins: vec!["*".into()],
            max_body_bytes: 64 * 1024,
            request_timeout_seconds: 30,
            rate_limits: RateLimitConfig::default(),
            trust_proxy_headers: false,
            points: PointsConfig::default(),
            catalog_path: None,
        }
    }
}

/// Split a comma-separated allow-list into normalized emails.
fn parse_admin_emails(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(|s| s.trim().to_lowercase())
        .filter(|s| !s.is_empty())
        .collect()
}

fn env_parse<T: FromStr>(key: &str, default: T) -> T {
    match std::env::var(key) {
        Ok(raw) => raw.trim().parse().unwrap_or_else(|_| {
            tracing::warn!(key, value = %raw, "Ignoring unparseable environment variable");
            default
        }),
        Err(_) => default,
    }
}

/// Read `<PREFIX>_MAX` and `<PREFIX>_WINDOW_SECONDS`.
fn env_rule(prefix: &str, default: RateLimitRule) -> RateLimitRule {
    RateLimitRule {
        max_requests: env_parse(&format!("{prefix}_MAX"), default.max_requests),
        window: Duration::from_secs(env_parse(
            &format!("{prefix}_WINDOW_SECONDS"),
            default.window.as_secs(),
        )),
    }
}
