//! Storage layer for paw-points.
//!
//! This crate provides persistent storage for balances, the transaction log,
//! owned items and equipped snapshots, behind the [`Store`] trait.
//!
//! # Backends
//!
//! - [`RocksStore`] (feature `rocksdb-backend`, default): a `RocksDB`
//!   `TransactionDB`. Atomic operations run as pessimistic transactions that
//!   lock the account key first.
//! - [`PgStore`]: PostgreSQL via `sqlx`. Debits are a single conditional
//!   `UPDATE`, ownership uses the primary key as its uniqueness constraint.
//!
//! # Atomicity
//!
//! [`Store::apply_award`], [`Store::debit`], [`Store::refund`] and
//! [`Store::grant_item`] are each one atomic unit against the store.
//! Callers never read a balance and write it back; there are no in-process
//! locks around balances.
//!
//! # Example
//!
//! ```no_run
//! use paw_points_store::{RocksStore, Store};
//! use paw_points_core::{Account, UserId};
//!
//! # async fn example() -> paw_points_store::Result<()> {
//! let store = RocksStore::open("/tmp/paw-points-db")?;
//!
//! let user_id = UserId::generate();
//! store.create_account(&Account::new(user_id)).await?;
//!
//! let account = store.get_account(&user_id).await?;
//! # Ok(())
//! # }
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]

pub mod error;
pub mod keys;
pub mod postgres;
#[cfg(feature = "rocksdb-backend")]
pub mod rocks;
pub mod schema;

pub use error::{Result, StoreError};
pub use postgres::PgStore;
#[cfg(feature = "rocksdb-backend")]
pub use rocks::RocksStore;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use paw_points_core::{
    Account, AwardRule, Balance, EquippedSnapshot, ItemSlug, LeaderboardEntry, OwnedItem,
    PointsTransaction, UserId,
};

/// Result of [`Store::apply_award`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AwardOutcome {
    /// Points were credited and the transaction appended.
    Awarded {
        /// Balance after the credit.
        balance: Balance,
    },

    /// One-time action already credited; nothing written.
    AlreadyAwarded {
        /// Unchanged balance.
        balance: Balance,
    },

    /// The award would exceed today's cap; nothing written.
    DailyCapReached {
        /// Unchanged balance.
        balance: Balance,
        /// Points already credited today for this action.
        awarded_today: i64,
    },
}

impl AwardOutcome {
    /// Balance after the call, whether or not points were credited.
    #[must_use]
    pub const fn balance(&self) -> Balance {
        match self {
            Self::Awarded { balance }
            | Self::AlreadyAwarded { balance }
            | Self::DailyCapReached { balance, .. } => *balance,
        }
    }
}

/// Result of [`Store::debit`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DebitOutcome {
    /// The balance covered the amount and was decremented.
    Debited {
        /// Balance after the debit.
        balance: Balance,
    },

    /// The balance was too low; nothing changed.
    Insufficient {
        /// Unchanged balance.
        balance: Balance,
    },
}

/// The storage trait defining all database operations.
///
/// This trait abstracts the storage layer, allowing for different implementations
/// (`RocksDB` for single-node deployments and tests, PostgreSQL for shared deployments).
#[async_trait]
pub trait Store: Send + Sync {
    // =========================================================================
    // Account Operations
    // =========================================================================

    /// Insert a new account.
    ///
    /// # Errors
    ///
    /// Returns `StoreError::AlreadyExists` if the user already has an account.
    async fn create_account(&self, account: &Account) -> Result<()>;

    /// Get an account by user ID.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    async fn get_account(&self, user_id: &UserId) -> Result<Option<Account>>;

    /// Set the database admin flag.
    ///
    /// # Errors
    ///
    /// Returns `StoreError::NotFound` if the account doesn't exist.
    async fn set_admin(&self, user_id: &UserId, is_admin: bool) -> Result<()>;

    /// Top balances, highest first. Ties keep the store's natural order.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    async fn leaderboard(&self, limit: usize) -> Result<Vec<LeaderboardEntry>>;

    // =========================================================================
    // Ledger Operations
    // =========================================================================

    /// Credit `rule.points` unless a one-time or daily-cap rule forbids it.
    ///
    /// The checks and the write are one atomic unit: concurrent calls for the
    /// same user serialize, so at most one one-time award succeeds and today's
    /// sum for a capped action never exceeds the cap. `day_start` is the first
    /// instant of the current calendar day. `transaction` is appended only when
    /// points are credited; its `points_delta` must equal `rule.points`.
    ///
    /// # Errors
    ///
    /// Returns `StoreError::NotFound` if the account doesn't exist.
    async fn apply_award(
        &self,
        rule: &AwardRule,
        transaction: &PointsTransaction,
        day_start: DateTime<Utc>,
    ) -> Result<AwardOutcome>;

    /// Decrement the balance by `amount` only if it is at least `amount`.
    ///
    /// No transaction is appended; the caller records the debit once the
    /// operation it pays for has completed.
    ///
    /// # Errors
    ///
    /// Returns `StoreError::NotFound` if the account doesn't exist.
    async fn debit(&self, user_id: &UserId, amount: i64) -> Result<DebitOutcome>;

    /// Undo a debit: credit `refund.points_delta` back and append both the
    /// original `debit` record and the compensating `refund` record atomically.
    ///
    /// Refunds do not count towards `total_earned`.
    ///
    /// # Errors
    ///
    /// Returns `StoreError::NotFound` if the account doesn't exist.
    async fn refund(&self, debit: &PointsTransaction, refund: &PointsTransaction)
        -> Result<Balance>;

    /// List transactions for a user, ordered by time (newest first).
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    async fn list_transactions_by_user(
        &self,
        user_id: &UserId,
        limit: usize,
        offset: usize,
    ) -> Result<Vec<PointsTransaction>>;

    // =========================================================================
    // Inventory Operations
    // =========================================================================

    /// Get one owned item.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    async fn get_owned_item(
        &self,
        user_id: &UserId,
        item_slug: &ItemSlug,
    ) -> Result<Option<OwnedItem>>;

    /// Insert an ownership record and the `debit` that paid for it in one
    /// atomic write. The balance is not touched; [`Store::debit`] already
    /// took the points.
    ///
    /// # Errors
    ///
    /// Returns `StoreError::AlreadyExists` if `(user_id, item_slug)` is
    /// already owned; nothing is written in that case.
    async fn grant_item(&self, item: &OwnedItem, debit: &PointsTransaction) -> Result<()>;

    /// List everything a user owns, ordered by slug.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    async fn list_owned_items(&self, user_id: &UserId) -> Result<Vec<OwnedItem>>;

    /// Get the equipped snapshot, if one was ever written.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    async fn get_equipped(&self, user_id: &UserId) -> Result<Option<EquippedSnapshot>>;

    /// Overwrite the equipped snapshot.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    async fn put_equipped(&self, user_id: &UserId, snapshot: &EquippedSnapshot) -> Result<()>;
}
