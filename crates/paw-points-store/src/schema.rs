//! Database schema definitions and column families.
//!
//! This module defines the column families used in `RocksDB` storage. The
//! PostgreSQL schema lives in the crate's `migrations/` directory.

/// Column family names for the `RocksDB` database.
pub mod cf {
    /// Balance records, keyed by `user_id`.
    pub const ACCOUNTS: &str = "accounts";

    /// Ledger transactions, keyed by `transaction_id` (ULID).
    pub const TRANSACTIONS: &str = "transactions";

    /// Index: transactions by user, keyed by `user_id || transaction_id`.
    /// Value is empty (index only).
    pub const TRANSACTIONS_BY_USER: &str = "transactions_by_user";

    /// Index: transactions by user and action, keyed by
    /// `user_id || action_code || transaction_id`.
    /// Value is the signed points delta (8 bytes, big endian).
    pub const TRANSACTIONS_BY_ACTION: &str = "transactions_by_action";

    /// Owned items, keyed by `user_id || item_slug`.
    pub const OWNED_ITEMS: &str = "owned_items";

    /// Equipped snapshots, keyed by `user_id`.
    pub const EQUIPPED: &str = "equipped";
}

/// Returns all column family names for database initialization.
#[must_use]
pub fn all_column_families() -> Vec<&'static str> {
    vec![
        cf::ACCOUNTS,
        cf::TRANSACTIONS,
        cf::TRANSACTIONS_BY_USER,
        cf::TRANSACTIONS_BY_ACTION,
        cf::OWNED_ITEMS,
        cf::EQUIPPED,
    ]
}
