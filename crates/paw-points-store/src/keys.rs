//! Key encoding utilities for `RocksDB`.
//!
//! This module provides functions for encoding and decoding keys used in column families.

use paw_points_core::{ActionType, ItemSlug, TransactionId, UserId};

/// Stable one-byte code for an action type.
///
/// Codes are persisted in index keys; never renumber an existing variant.
#[must_use]
pub const fn action_code(action: ActionType) -> u8 {
    match action {
        ActionType::DailyLogin => 1,
        ActionType::CreatePost => 2,
        ActionType::CreateComment => 3,
        ActionType::SharePost => 4,
        ActionType::ReportLostPet => 5,
        ActionType::CompleteProfile => 6,
        ActionType::RegisterPet => 7,
        ActionType::AdminGrant => 8,
        ActionType::Purchase => 9,
        ActionType::PurchaseRefund => 10,
    }
}

/// Create an account key from a user ID.
#[must_use]
pub fn account_key(user_id: &UserId) -> Vec<u8> {
    user_id.as_bytes().to_vec()
}

/// Create a transaction key from a transaction ID.
#[must_use]
pub fn transaction_key(transaction_id: &TransactionId) -> Vec<u8> {
    transaction_id.to_bytes().to_vec()
}

/// Create a user-transaction index key.
///
/// Format: `user_id (16 bytes) || transaction_id (16 bytes)`
///
/// Since ULIDs are time-ordered, transactions for a user will be sorted by time.
#[must_use]
pub fn user_transaction_key(user_id: &UserId, transaction_id: &TransactionId) -> Vec<u8> {
    let mut key = Vec::with_capacity(32);
    key.extend_from_slice(user_id.as_bytes());
    key.extend_from_slice(&transaction_id.to_bytes());
    key
}

/// Create a prefix for iterating all transactions for a user.
#[must_use]
pub fn user_transactions_prefix(user_id: &UserId) -> Vec<u8> {
    user_id.as_bytes().to_vec()
}

/// The largest possible index key for a user, for reverse iteration.
#[must_use]
pub fn user_transactions_upper_bound(user_id: &UserId) -> Vec<u8> {
    let mut key = Vec::with_capacity(32);
    key.extend_from_slice(user_id.as_bytes());
    key.extend_from_slice(&[0xff; 16]);
    key
}

/// Extract the transaction ID from a user-transaction index key.
///
/// Returns `None` if the key is shorter than 32 bytes.
#[must_use]
pub fn extract_transaction_id_from_user_key(key: &[u8]) -> Option<TransactionId> {
    let bytes: [u8; 16] = key.get(16..32)?.try_into().ok()?;
    Some(TransactionId::from_bytes(bytes))
}

/// Create a user-action index key.
///
/// Format: `user_id (16 bytes) || action_code (1 byte) || transaction_id (16 bytes)`
#[must_use]
pub fn action_transaction_key(
    user_id: &UserId,
    action: ActionType,
    transaction_id: &TransactionId,
) -> Vec<u8> {
    let mut key = action_transactions_prefix(user_id, action);
    key.extend_from_slice(&transaction_id.to_bytes());
    key
}

/// Create a prefix for iterating a user's transactions of one action type.
#[must_use]
pub fn action_transactions_prefix(user_id: &UserId, action: ActionType) -> Vec<u8> {
    let mut key = Vec::with_capacity(33);
    key.extend_from_slice(user_id.as_bytes());
    key.push(action_code(action));
    key
}

/// Encode a points delta stored as an index value.
#[must_use]
pub fn encode_delta(delta: i64) -> [u8; 8] {
    delta.to_be_bytes()
}

/// Decode a points delta index value. Malformed values decode as zero.
#[must_use]
pub fn decode_delta(value: &[u8]) -> i64 {
    value
        .try_into()
        .map(i64::from_be_bytes)
        .unwrap_or_default()
}

/// Create an owned-item key.
///
/// Format: `user_id (16 bytes) || item_slug (utf-8)`
#[must_use]
pub fn owned_item_key(user_id: &UserId, item_slug: &ItemSlug) -> Vec<u8> {
    let mut key = owned_items_prefix(user_id);
    key.extend_from_slice(item_slug.as_str().as_bytes());
    key
}

/// Create a prefix for iterating a user's owned items.
#[must_use]
pub fn owned_items_prefix(user_id: &UserId) -> Vec<u8> {
    user_id.as_bytes().to_vec()
}

/// Create an equipped-snapshot key from a user ID.
#[must_use]
pub fn equipped_key(user_id: &UserId) -> Vec<u8> {
    user_id.as_bytes().to_vec()
}
