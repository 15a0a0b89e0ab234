//! Point balance records.
//!
//! An [`Account`] is the authoritative balance row for a user. It is created
//! at signup with zero points and afterwards only changed by ledger operations.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::UserId;

/// A user's point balance.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Account {
    /// The user ID (from the identity provider).
    pub user_id: UserId,

    /// Current spendable points. Never negative.
    pub points: i64,

    /// Lifetime sum of earned credits. Never decreases; refunds and
    /// spending do not touch it.
    pub total_earned: i64,

    /// Database-level admin flag, checked alongside the email allow-list.
    #[serde(default)]
    pub is_admin: bool,

    /// When the account was created.
    pub created_at: DateTime<Utc>,

    /// When the balance was last changed.
    pub updated_at: DateTime<Utc>,
}

impl Account {
    /// Create a new account with zero balance.
    #[must_use]
    pub fn new(user_id: UserId) -> Self {
        let now = Utc::now();
        Self {
            user_id,
            points: 0,
            total_earned: 0,
            is_admin: false,
            created_at: now,
            updated_at: now,
        }
    }

    /// Check if the account can cover a debit of `amount` points.
    #[must_use]
    pub fn can_afford(&self, amount: i64) -> bool {
        self.points >= amount
    }

    /// Snapshot of the balance fields.
    #[must_use]
    pub fn balance(&self) -> Balance {
        Balance {
            points: self.points,
            total_earned: self.total_earned,
        }
    }
}

/// The two balance figures reported back to callers after a mutation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Balance {
    /// Spendable points.
    pub points: i64,
    /// Lifetime earned points.
    pub total_earned: i64,
}

/// One row of the leaderboard projection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LeaderboardEntry {
    /// The ranked user.
    pub user_id: UserId,
    /// Their current spendable points.
    pub points: i64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_account_has_zero_balance() {
        let account = Account::new(UserId::generate());
        assert_eq!(account.points, 0);
        assert_eq!(account.total_earned, 0);
        assert!(!account.is_admin);
        assert_eq!(account.balance(), Balance::default());
    }

    #[test]
    fn can_afford_is_inclusive() {
        let mut account = Account::new(UserId::generate());
        account.points = 150;

        assert!(account.can_afford(100));
        assert!(account.can_afford(150));
        assert!(!account.can_afford(151));
    }

    #[test]
    fn admin_flag_defaults_when_missing() {
        let account = Account::new(UserId::generate());
        let mut json = serde_json::to_value(&account).unwrap();
        json.as_object_mut().unwrap().remove("is_admin");

        let parsed: Account = serde_json::from_value(json).unwrap();
        assert!(!parsed.is_admin);
    }
}
