//! Core types and utilities for paw-points.
//!
//! This crate provides the foundational types of the pet community's points economy:
//!
//! - **Identifiers**: `UserId`, `TransactionId`, `ItemSlug`
//! - **Balances**: `Account`, `Balance`, `LeaderboardEntry`
//! - **Ledger**: `PointsTransaction`, `ActionType`, `ActionRule`, `AwardRule`, `PointsConfig`
//! - **Shop**: `CatalogItem`, `CatalogProvider`, `StaticCatalog`
//! - **Inventory**: `OwnedItem`, `EquippedSnapshot`
//!
//! # Points
//!
//! Points are whole numbers stored as `i64`. A balance never goes below zero;
//! `total_earned` only ever grows.

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]

pub mod account;
pub mod actions;
pub mod catalog;
pub mod error;
pub mod ids;
pub mod inventory;
pub mod transaction;

pub use account::{Account, Balance, LeaderboardEntry};
pub use actions::{ActionRule, ActionType, AwardRule, PointsConfig, DEFAULT_ADMIN_MAX_GRANT};
pub use catalog::{CatalogError, CatalogItem, CatalogProvider, ItemCategory, StaticCatalog};
pub use error::{PointsError, Result};
pub use ids::{IdError, ItemSlug, TransactionId, UserId};
pub use inventory::{EquippedSnapshot, OwnedItem, MAX_EQUIPPED_ACCESSORIES};
pub use transaction::PointsTransaction;
