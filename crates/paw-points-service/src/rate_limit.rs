//! Request-rate admission control.
//!
//! The [`RateLimiter`] trait decides whether a `(client address, category)`
//! key may proceed. [`InMemoryRateLimiter`] keeps a sliding log of request
//! instants per key in process memory, so limits are exact for a single
//! instance and approximate (per instance) when the service is scaled out.
//!
//! Every check is recorded, including checks that end up denied.

use std::collections::{HashMap, VecDeque};
use std::net::SocketAddr;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use axum::extract::{ConnectInfo, Request, State};
use axum::http::header::RETRY_AFTER;
use axum::http::{HeaderMap, HeaderValue};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use tokio::time::Instant;

use crate::error::ApiError;
use crate::state::AppState;

/// `X-RateLimit-Limit` response header.
pub const LIMIT_HEADER: &str = "x-ratelimit-limit";

/// `X-RateLimit-Remaining` response header.
pub const REMAINING_HEADER: &str = "x-ratelimit-remaining";

/// `X-RateLimit-Reset` response header (seconds).
pub const RESET_HEADER: &str = "x-ratelimit-reset";

/// Class of endpoint sharing one quota.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RateCategory {
    /// Reads.
    General,
    /// Mutations (awards, purchases, equips, grants).
    Write,
}

impl RateCategory {
    /// Name used in logs.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::General => "general",
            Self::Write => "write",
        }
    }
}

/// Window and ceiling for one category.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimitRule {
    /// Requests admitted per window.
    pub max_requests: u32,
    /// Window length.
    pub window: Duration,
}

/// Rules for every category.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimitConfig {
    /// Rule for reads.
    pub general: RateLimitRule,
    /// Rule for mutations.
    pub write: RateLimitRule,
}

impl RateLimitConfig {
    /// The rule for a category.
    #[must_use]
    pub const fn rule(&self, category: RateCategory) -> RateLimitRule {
        match category {
            RateCategory::General => self.general,
            RateCategory::Write => self.write,
        }
    }
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            general: RateLimitRule {
                max_requests: 120,
                window: Duration::from_secs(60),
            },
            write: RateLimitRule {
                max_requests: 30,
                window: Duration::from_secs(60),
            },
        }
    }
}

/// Outcome of a rate check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateDecision {
    /// Whether the request may proceed.
    pub allowed: bool,
    /// Ceiling for the window.
    pub limit: u32,
    /// Requests left in the current window.
    pub remaining: u32,
    /// Time until the oldest counted request leaves the window.
    pub reset_in: Duration,
}

impl RateDecision {
    /// `reset_in` rounded up to whole seconds.
    #[must_use]
    pub fn reset_secs(&self) -> u64 {
        self.reset_in.as_secs() + u64::from(self.reset_in.subsec_nanos() > 0)
    }
}

/// Admission control keyed by client and category.
#[async_trait]
pub trait RateLimiter: Send + Sync {
    /// Record a request for `key` and decide whether it may proceed.
    async fn check(&self, key: &str, category: RateCategory) -> RateDecision;

    /// Drop keys whose window has fully elapsed. Returns how many were removed.
    async fn purge_expired(&self) -> usize;
}

/// Sliding-log limiter held in process memory.
pub struct InMemoryRateLimiter {
    config: RateLimitConfig,
    logs: Mutex<HashMap<(String, RateCategory), VecDeque<Instant>>>,
}

impl InMemoryRateLimiter {
    /// Create a limiter with the given rules.
    #[must_use]
    pub fn new(config: RateLimitConfig) -> Self {
        Self {
            config,
            logs: Mutex::new(HashMap::new()),
        }
    }

    /// Number of tracked keys.
    #[must_use]
    pub fn tracked_keys(&self) -> usize {
        self.logs
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }
}

#[async_trait]
impl RateLimiter for InMemoryRateLimiter {
    async fn check(&self, key: &str, category: RateCategory) -> RateDecision {
        let rule = self.config.rule(category);
        let max = usize::try_from(rule.max_requests).unwrap_or(usize::MAX);
        let now = Instant::now();

        let mut logs = self.logs.lock().unwrap_or_else(PoisonError::into_inner);
        let log = logs.entry((key.to_string(), category)).or_default();

        while log
            .front()
            .is_some_and(|&oldest| now.duration_since(oldest) >= rule.window)
        {
            log.pop_front();
        }

        let allowed = log.len() < max;
        log.push_back(now);
        // Denied checks still count; the log never holds more than the ceiling.
        while log.len() > max {
            log.pop_front();
        }

        let remaining = u32::try_from(max.saturating_sub(log.len())).unwrap_or(u32::MAX);
        let reset_in = log.front().map_or(rule.window, |&oldest| {
            (oldest + rule.window).saturating_duration_since(now)
        });

        RateDecision {
            allowed,
            limit: rule.max_requests,
            remaining,
            reset_in,
        }
    }

    async fn purge_expired(&self) -> usize {
        let now = Instant::now();
        let mut logs = self.logs.lock().unwrap_or_else(PoisonError::into_inner);
        let before = logs.len();

        logs.retain(|(_, category), log| {
            let window = self.config.rule(*category).window;
            log.back()
                .is_some_and(|&newest| now.duration_since(newest) < window)
        });

        before - logs.len()
    }
}

/// Periodically purge idle keys for the lifetime of the process.
pub fn spawn_purge_task(
    limiter: Arc<dyn RateLimiter>,
    every: Duration,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(every);
        loop {
            interval.tick().await;
            let removed = limiter.purge_expired().await;
            if removed > 0 {
                tracing::debug!(removed, "Purged idle rate-limit keys");
            }
        }
    })
}

// ============================================================================
// Middleware
// ============================================================================

/// Rate-limit middleware for read endpoints.
pub async fn limit_reads(
    State(state): State<Arc<AppState>>,
    request: Request,
    next: Next,
) -> Response {
    enforce(&state, RateCategory::General, request, next).await
}

/// Rate-limit middleware for mutation endpoints.
pub async fn limit_writes(
    State(state): State<Arc<AppState>>,
    request: Request,
    next: Next,
) -> Response {
    enforce(&state, RateCategory::Write, request, next).await
}

async fn enforce(
    state: &AppState,
    category: RateCategory,
    request: Request,
    next: Next,
) -> Response {
    let client = client_address(&request, state.config.trust_proxy_headers);
    let decision = state.rate_limiter.check(&client, category).await;

    if !decision.allowed {
        tracing::warn!(
            client = %client,
            category = category.as_str(),
            reset_secs = decision.reset_secs(),
            "Rate limit exceeded"
        );

        let mut response = ApiError::RateLimited {
            retry_after_secs: decision.reset_secs(),
        }
        .into_response();
        apply_headers(response.headers_mut(), &decision);
        response
            .headers_mut()
            .insert(RETRY_AFTER, HeaderValue::from(decision.reset_secs()));
        return response;
    }

    let mut response = next.run(request).await;
    apply_headers(response.headers_mut(), &decision);
    response
}

fn apply_headers(headers: &mut HeaderMap, decision: &RateDecision) {
    headers.insert(LIMIT_HEADER, HeaderValue::from(decision.limit));
    headers.insert(REMAINING_HEADER, HeaderValue::from(decision.remaining));
    headers.insert(RESET_HEADER, HeaderValue::from(decision.reset_secs()));
}

/// Best-effort client address.
///
/// `X-Forwarded-For` and `X-Real-IP` are only read when the service sits
/// behind a proxy that overwrites them; otherwise any client could pick its
/// own key. Falls back to the socket peer.
fn client_address(request: &Request, trust_proxy_headers: bool) -> String {
    let proxied = if trust_proxy_headers {
        proxy_address(request.headers())
    } else {
        None
    };

    proxied
        .or_else(|| {
            request
                .extensions()
                .get::<ConnectInfo<SocketAddr>>()
                .map(|ConnectInfo(addr)| addr.ip().to_string())
        })
        .unwrap_or_else(|| "unknown".to_string())
}

/// First `X-Forwarded-For` hop, else `X-Real-IP`.
fn proxy_address(headers: &HeaderMap) -> Option<String> {
    let forwarded = headers
        .get("x-forwarded-for")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.split(',').next())
        .map(str::trim)
        .filter(|v| !v.is_empty());

    let real_ip = headers
        .get("x-real-ip")
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|v| !v.is_empty());

    forwarded.or(real_ip).map(ToString::to_string)
}
