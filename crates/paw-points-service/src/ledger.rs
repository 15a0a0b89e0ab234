//! Points ledger.
//!
//! Every credit resolves to an [`AwardRule`] and goes to
//! [`Store::apply_award`] as one atomic unit.
//! Regular actions, the daily check-in and admin grants differ only in how
//! the rule is built.

use chrono::Utc;
use serde::Serialize;

use paw_points_core::{
    ActionType, AwardRule, Balance, PointsConfig, PointsError, PointsTransaction, Result, UserId,
};
use paw_points_store::{AwardOutcome, Store};

/// Default page size for history.
pub const HISTORY_DEFAULT_LIMIT: usize = 20;

/// Largest page size for history.
pub const HISTORY_MAX_LIMIT: usize = 50;

/// Default leaderboard length.
pub const LEADERBOARD_DEFAULT_LIMIT: usize = 10;

/// Largest leaderboard length.
pub const LEADERBOARD_MAX_LIMIT: usize = 100;

/// Why an award credited nothing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AwardRejection {
    /// One-time action already credited.
    AlreadyAwarded,
    /// Today's cap for the action would be exceeded.
    DailyCapReached,
}

/// Result of an award attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AwardResult {
    /// Whether points were credited.
    pub success: bool,
    /// Set when `success` is false.
    pub reason: Option<AwardRejection>,
    /// Points credited by this call (0 on rejection).
    pub points_awarded: i64,
    /// Balance after the call.
    pub balance: Balance,
}

impl AwardResult {
    fn from_outcome(points: i64, outcome: AwardOutcome) -> Self {
        let (reason, points_awarded) = match outcome {
            AwardOutcome::Awarded { .. } => (None, points),
            AwardOutcome::AlreadyAwarded { .. } => (Some(AwardRejection::AlreadyAwarded), 0),
            AwardOutcome::DailyCapReached { .. } => (Some(AwardRejection::DailyCapReached), 0),
        };

        Self {
            success: reason.is_none(),
            reason,
            points_awarded,
            balance: outcome.balance(),
        }
    }
}

/// A page of transaction history.
#[derive(Debug, Clone, PartialEq)]
pub struct HistoryPage {
    /// Transactions, newest first.
    pub transactions: Vec<PointsTransaction>,
    /// Whether more transactions exist past this page.
    pub has_more: bool,
    /// Effective page size.
    pub limit: usize,
    /// Offset the page starts at.
    pub offset: usize,
}

/// One leaderboard row.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RankedEntry {
    /// 1-based position.
    pub rank: usize,
    /// The user.
    pub user_id: UserId,
    /// Current balance.
    pub points: i64,
}

/// Clamp an optional page size into `1..=max`.
#[must_use]
pub fn clamp_limit(requested: Option<usize>, default: usize, max: usize) -> usize {
    requested.unwrap_or(default).clamp(1, max)
}

/// Balance operations and ledger projections.
pub struct PointsLedger<'a> {
    store: &'a dyn Store,
    config: &'a PointsConfig,
}

impl<'a> PointsLedger<'a> {
    /// Create a ledger over a store.
    #[must_use]
    pub const fn new(store: &'a dyn Store, config: &'a PointsConfig) -> Self {
        Self { store, config }
    }

    /// Award a client-triggered action.
    ///
    /// # Errors
    ///
    /// `ActionNotAllowed` for server-only actions, `InvalidAction` if the
    /// action has no rule, `AccountNotFound` if the user has no balance.
    pub async fn award(
        &self,
        user_id: UserId,
        action: ActionType,
        metadata: serde_json::Value,
    ) -> Result<AwardResult> {
        if !action.is_client_triggerable() {
            return Err(PointsError::ActionNotAllowed(action.to_string()));
        }

        let rule = self.config.rule_for(action)?;
        self.apply(user_id, rule, metadata).await
    }

    /// Daily check-in: one success per calendar day.
    ///
    /// # Errors
    ///
    /// `AccountNotFound` if the user has no balance.
    pub async fn daily_check(&self, user_id: UserId) -> Result<AwardResult> {
        let rule = self.config.rule_for(ActionType::DailyLogin)?;
        self.apply(user_id, rule, serde_json::Value::Null).await
    }

    /// Admin grant: caller-chosen amount, no cap, repeatable.
    ///
    /// # Errors
    ///
    /// `InvalidAmount` outside `1..=admin_max_grant`, `AccountNotFound` if
    /// the target has no balance.
    pub async fn admin_grant(
        &self,
        granted_by: UserId,
        target: UserId,
        points: i64,
        reason: Option<&str>,
    ) -> Result<AwardResult> {
        let rule = self.config.admin_grant(points)?;
        let metadata = serde_json::json!({
            "granted_by": granted_by,
            "reason": reason,
        });

        let result = self.apply(target, rule, metadata).await?;

        tracing::info!(
            admin = %granted_by,
            target = %target,
            points,
            reason = reason.unwrap_or_default(),
            new_balance = result.balance.points,
            "Admin grant applied"
        );

        Ok(result)
    }

    async fn apply(
        &self,
        user_id: UserId,
        rule: AwardRule,
        metadata: serde_json::Value,
    ) -> Result<AwardResult> {
        let transaction = PointsTransaction::credit(user_id, rule.action, rule.points, metadata);
        let day_start = self.config.day_start(Utc::now());

        let outcome = self
            .store
            .apply_award(&rule, &transaction, day_start)
            .await
            .map_err(|e| {
                tracing::error!(
                    user_id = %user_id,
                    action = %rule.action,
                    points = rule.points,
                    error = %e,
                    "Award failed"
                );
                e
            })?;
        let result = AwardResult::from_outcome(rule.points, outcome);

        match result.reason {
            None => tracing::info!(
                user_id = %user_id,
                action = %rule.action,
                points = rule.points,
                balance = result.balance.points,
                transaction_id = %transaction.id,
                "Points awarded"
            ),
            Some(reason) => tracing::debug!(
                user_id = %user_id,
                action = %rule.action,
                reason = ?reason,
                "Award rejected"
            ),
        }

        Ok(result)
    }

    /// Current balance.
    ///
    /// # Errors
    ///
    /// `AccountNotFound` if the user has no balance.
    pub async fn balance(&self, user_id: &UserId) -> Result<Balance> {
        self.store
            .get_account(user_id)
            .await?
            .map(|account| account.balance())
            .ok_or_else(|| PointsError::AccountNotFound {
                user_id: user_id.to_string(),
            })
    }

    /// A page of the user's history, newest first.
    ///
    /// # Errors
    ///
    /// Returns an error if the store fails.
    pub async fn history(
        &self,
        user_id: &UserId,
        limit: Option<usize>,
        offset: usize,
    ) -> Result<HistoryPage> {
        let limit = clamp_limit(limit, HISTORY_DEFAULT_LIMIT, HISTORY_MAX_LIMIT);

        // One extra row tells us whether another page exists.
        let mut transactions = self
            .store
            .list_transactions_by_user(user_id, limit + 1, offset)
            .await?;
        let has_more = transactions.len() > limit;
        transactions.truncate(limit);

        Ok(HistoryPage {
            transactions,
            has_more,
            limit,
            offset,
        })
    }

    /// Top balances with 1-based ranks.
    ///
    /// # Errors
    ///
    /// Returns an error if the store fails.
    pub async fn leaderboard(&self, limit: Option<usize>) -> Result<Vec<RankedEntry>> {
        let limit = clamp_limit(limit, LEADERBOARD_DEFAULT_LIMIT, LEADERBOARD_MAX_LIMIT);

        let entries = self.store.leaderboard(limit).await?;

        Ok(entries
            .into_iter()
            .enumerate()
            .map(|(index, entry)| RankedEntry {
                rank: index + 1,
                user_id: entry.user_id,
                points: entry.points,
            })
            .collect())
    }
}
