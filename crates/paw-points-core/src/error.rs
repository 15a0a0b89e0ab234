//! Error types for paw-points.

use crate::ids::IdError;
use crate::ItemSlug;

/// Result type for paw-points operations.
pub type Result<T> = std::result::Result<T, PointsError>;

/// Domain errors of the points economy.
#[derive(Debug, thiserror::Error)]
pub enum PointsError {
    /// The action type is unknown or has no configured rule.
    #[error("invalid action: {0}")]
    InvalidAction(String),

    /// The action exists but clients may not trigger it.
    #[error("action not allowed: {0}")]
    ActionNotAllowed(String),

    /// A point amount is out of range.
    #[error("invalid amount: {0}")]
    InvalidAmount(String),

    /// Not enough points for a debit.
    #[error("insufficient points: balance={balance}, required={required}")]
    InsufficientFunds {
        /// Current balance.
        balance: i64,
        /// Required amount.
        required: i64,
    },

    /// No catalog item with this slug.
    #[error("item not found: {0}")]
    ItemNotFound(ItemSlug),

    /// The item is free and cannot be bought.
    #[error("item is not purchasable: {0}")]
    NotPurchasable(ItemSlug),

    /// The user already owns the item.
    #[error("item already owned: {0}")]
    AlreadyOwned(ItemSlug),

    /// The user does not own the item.
    #[error("item not owned: {0}")]
    NotOwned(ItemSlug),

    /// The item cannot go in the requested slot.
    #[error("item {slug} cannot be equipped as {slot}")]
    WrongCategory {
        /// Offending item.
        slug: ItemSlug,
        /// Slot it was requested for.
        slot: &'static str,
    },

    /// More accessories than allowed.
    #[error("too many accessories: {count} (max {max})")]
    TooManyAccessories {
        /// Requested count.
        count: usize,
        /// Allowed maximum.
        max: usize,
    },

    /// Account not found.
    #[error("account not found: {user_id}")]
    AccountNotFound {
        /// The user ID that was not found.
        user_id: String,
    },

    /// The purchase could not be completed and was rolled back (or the rollback failed).
    #[error("purchase failed: {0}")]
    PurchaseFailed(String),

    /// Invalid identifier.
    #[error("invalid identifier: {0}")]
    InvalidId(#[from] IdError),

    /// Storage error.
    #[error("storage error: {0}")]
    Storage(String),
}
