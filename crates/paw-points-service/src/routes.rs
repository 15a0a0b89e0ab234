//! Router configuration.
//!
//! This module sets up the Axum router with all routes and middleware.

use std::sync::Arc;
use std::time::Duration;

use axum::middleware;
use axum::routing::{get, post};
use axum::Router;
use tower::limit::ConcurrencyLimitLayer;
use tower_http::cors::{Any, CorsLayer};
use tower_http::limit::RequestBodyLimitLayer;
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::TraceLayer;

use crate::handlers::{accounts, admin, health, points, shop};
use crate::rate_limit::{limit_reads, limit_writes};
use crate::state::AppState;

/// Maximum concurrent in-flight requests across the API.
const API_MAX_CONCURRENT_REQUESTS: usize = 100;

/// Create the service router with all routes and middleware.
///
/// # Routes
///
/// ## Public
/// - `GET /health` - Health check
///
/// ## Mutations (JWT auth, `write` rate limit)
/// - `POST /accounts` - Create the caller's balance
/// - `POST /points/award` - Credit a client-triggered action
/// - `POST /points/daily-check` - Daily check-in
/// - `POST /purchase` - Buy a catalog item
/// - `POST /equip` - Replace the equipped snapshot
/// - `POST /admin/points` - Admin grant (admin only)
///
/// ## Reads (JWT auth, `general` rate limit)
/// - `GET /points` - Caller's balance
/// - `GET /points/leaderboard` - Top balances
/// - `GET /points/history` - Caller's transactions
/// - `GET /inventory` - Owned items and equipped snapshot
/// - `GET /catalog` - Shop catalog
pub fn create_router(state: AppState) -> Router {
    let cors_origins = state.config.cors_origins.clone();
    let max_body_bytes = state.config.max_body_bytes;
    let request_timeout_seconds = state.config.request_timeout_seconds;

    let cors = build_cors_layer(&cors_origins);

    let state = Arc::new(state);

    let write_routes = Router::new()
        .route("/accounts", post(accounts::create_account))
        .route("/points/award", post(points::award))
        .route("/points/daily-check", post(points::daily_check))
        .route("/purchase", post(shop::purchase))
        .route("/equip", post(shop::equip))
        .route("/admin/points", post(admin::grant_points))
        .route_layer(middleware::from_fn_with_state(
            Arc::clone(&state),
            limit_writes,
        ));

    let read_routes = Router::new()
        .route("/points", get(points::get_balance))
        .route("/points/leaderboard", get(points::leaderboard))
        .route("/points/history", get(points::history))
        .route("/inventory", get(shop::inventory))
        .route("/catalog", get(shop::catalog))
        .route_layer(middleware::from_fn_with_state(
            Arc::clone(&state),
            limit_reads,
        ));

    Router::new()
        // Health (public, no rate limit)
        .route("/health", get(health::health))
        .merge(write_routes)
        .merge(read_routes)
        // Global middleware
        .layer(ConcurrencyLimitLayer::new(API_MAX_CONCURRENT_REQUESTS))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .layer(RequestBodyLimitLayer::new(max_body_bytes))
        .layer(TimeoutLayer::new(Duration::from_secs(
            request_timeout_seconds,
        )))
        .with_state(state)
}

/// Build the CORS layer from configured origins.
fn build_cors_layer(origins: &[String]) -> CorsLayer {
    if origins.iter().any(|o| o == "*") {
        CorsLayer::new()
            .allow_origin(Any)
            .allow_methods(Any)
            .allow_headers(Any)
    } else {
        let origins: Vec<_> = origins.iter().filter_map(|o| o.parse().ok()).collect();

        CorsLayer::new()
            .allow_origin(origins)
            .allow_methods(Any)
            .allow_headers(Any)
    }
}
