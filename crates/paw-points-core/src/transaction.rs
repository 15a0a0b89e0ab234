//! Ledger transaction records.
//!
//! Every balance change appends one immutable [`PointsTransaction`]. The log is
//! the source of truth for history, daily caps and one-time checks.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{ActionType, ItemSlug, TransactionId, UserId};

/// An immutable ledger entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PointsTransaction {
    /// Unique transaction ID (ULID for time-ordering).
    pub id: TransactionId,

    /// The user whose balance was affected.
    pub user_id: UserId,

    /// What caused the change.
    pub action_type: ActionType,

    /// Signed change. Positive = credit, negative = debit.
    pub points_delta: i64,

    /// Caller-supplied context (post id, admin reason, item slug...).
    pub metadata: serde_json::Value,

    /// When the transaction was created.
    pub created_at: DateTime<Utc>,
}

impl PointsTransaction {
    /// Create a credit for an earning action or admin grant.
    #[must_use]
    pub fn credit(
        user_id: UserId,
        action_type: ActionType,
        points: i64,
        metadata: serde_json::Value,
    ) -> Self {
        Self {
            id: TransactionId::generate(),
            user_id,
            action_type,
            points_delta: points.abs(),
            metadata,
            created_at: Utc::now(),
        }
    }

    /// Create the debit recorded for a shop purchase.
    #[must_use]
    pub fn purchase(user_id: UserId, item_slug: &ItemSlug, price: i64) -> Self {
        Self {
            id: TransactionId::generate(),
            user_id,
            action_type: ActionType::Purchase,
            points_delta: -price.abs(), // Always negative for purchases
            metadata: serde_json::json!({ "item_slug": item_slug }),
            created_at: Utc::now(),
        }
    }

    /// Create the compensating credit for a purchase that was rolled back.
    #[must_use]
    pub fn purchase_refund(
        user_id: UserId,
        item_slug: &ItemSlug,
        price: i64,
        debit_id: TransactionId,
        reason: &str,
    ) -> Self {
        Self {
            id: TransactionId::generate(),
            user_id,
            action_type: ActionType::PurchaseRefund,
            points_delta: price.abs(),
            metadata: serde_json::json!({
                "item_slug": item_slug,
                "refunds": debit_id,
                "reason": reason,
            }),
            created_at: Utc::now(),
        }
    }

    /// Check if this entry added points.
    #[must_use]
    pub const fn is_credit(&self) -> bool {
        self.points_delta > 0
    }

    /// Check if this entry removed points.
    #[must_use]
    pub const fn is_debit(&self) -> bool {
        self.points_delta < 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn slug(s: &str) -> ItemSlug {
        s.parse().unwrap()
    }

    #[test]
    fn credit_is_positive() {
        let tx = PointsTransaction::credit(
            UserId::generate(),
            ActionType::CreatePost,
            10,
            serde_json::json!({ "post_id": 7 }),
        );

        assert_eq!(tx.points_delta, 10);
        assert!(tx.is_credit());
        assert_eq!(tx.metadata["post_id"], 7);
    }

    #[test]
    fn purchase_is_negative() {
        let tx = PointsTransaction::purchase(UserId::generate(), &slug("red-scarf"), 150);

        assert_eq!(tx.points_delta, -150);
        assert_eq!(tx.action_type, ActionType::Purchase);
        assert!(tx.is_debit());
        assert_eq!(tx.metadata["item_slug"], "red-scarf");
    }

    #[test]
    fn refund_references_debit() {
        let user_id = UserId::generate();
        let debit = PointsTransaction::purchase(user_id, &slug("red-scarf"), 150);
        let refund = PointsTransaction::purchase_refund(
            user_id,
            &slug("red-scarf"),
            150,
            debit.id,
            "already_owned",
        );

        assert_eq!(refund.points_delta + debit.points_delta, 0);
        assert_eq!(refund.metadata["refunds"], debit.id.to_string());
        assert_eq!(refund.metadata["reason"], "already_owned");
    }
}
