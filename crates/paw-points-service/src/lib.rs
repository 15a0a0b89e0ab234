//! Paw Points HTTP API Service.
//!
//! This crate provides the HTTP API for the pet community's points economy:
//!
//! - Points ledger: awards with daily caps and one-time actions, admin grants
//! - Leaderboard and transaction history
//! - Shop purchases (debit, grant, compensate)
//! - Equip/inventory management
//! - Per-client rate limiting on every API route
//!
//! # Authentication
//!
//! End users authenticate with identity-provider JWTs (RS256, JWKS). Admins
//! are users on the `ADMIN_EMAILS` allow-list or with the account admin flag.

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
// Allow some pedantic lints that are noisy for Axum handler functions
#![allow(clippy::missing_errors_doc)] // Axum handlers all return Result
#![allow(clippy::unused_async)] // Handlers are async for the router even when they don't await

pub mod auth;
pub mod config;
pub mod error;
pub mod handlers;
pub mod inventory;
pub mod ledger;
pub mod purchase;
pub mod rate_limit;
pub mod routes;
pub mod state;

pub use config::ServiceConfig;
pub use error::ApiError;
pub use inventory::{Inventory, InventoryManager};
pub use ledger::{AwardRejection, AwardResult, HistoryPage, PointsLedger, RankedEntry};
pub use purchase::{PurchaseCoordinator, PurchaseReceipt};
pub use rate_limit::{
    spawn_purge_task, InMemoryRateLimiter, RateCategory, RateDecision, RateLimitConfig,
    RateLimitRule, RateLimiter,
};
pub use routes::create_router;
pub use state::AppState;
