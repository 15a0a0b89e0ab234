//! Point-earning actions and their rules.
//!
//! Every credit or debit in the ledger is tagged with an [`ActionType`]. Earning
//! actions have a static [`ActionRule`] (fixed value, optional daily cap,
//! optional one-time flag) held in [`PointsConfig`]. Admin grants resolve to the
//! same [`AwardRule`] shape with a caller-chosen value.

use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Duration, NaiveTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::PointsError;

/// Default upper bound for a single admin grant.
pub const DEFAULT_ADMIN_MAX_GRANT: i64 = 1_000_000;

/// Type of ledger entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionType {
    /// Daily check-in.
    DailyLogin,

    /// Published a community post.
    CreatePost,

    /// Commented on a post.
    CreateComment,

    /// Shared a post outside the community.
    SharePost,

    /// Filed a lost-pet report.
    ReportLostPet,

    /// Filled in the user profile (one-time).
    CompleteProfile,

    /// Registered a first pet (one-time).
    RegisterPet,

    /// Manual grant by an administrator.
    AdminGrant,

    /// Debit for a shop purchase.
    Purchase,

    /// Compensating credit for a purchase that could not be completed.
    PurchaseRefund,
}

impl ActionType {
    /// All action types, in declaration order.
    pub const ALL: [Self; 10] = [
        Self::DailyLogin,
        Self::CreatePost,
        Self::CreateComment,
        Self::SharePost,
        Self::ReportLostPet,
        Self::CompleteProfile,
        Self::RegisterPet,
        Self::AdminGrant,
        Self::Purchase,
        Self::PurchaseRefund,
    ];

    /// Wire name of the action.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::DailyLogin => "daily_login",
            Self::CreatePost => "create_post",
            Self::CreateComment => "create_comment",
            Self::SharePost => "share_post",
            Self::ReportLostPet => "report_lost_pet",
            Self::CompleteProfile => "complete_profile",
            Self::RegisterPet => "register_pet",
            Self::AdminGrant => "admin_grant",
            Self::Purchase => "purchase",
            Self::PurchaseRefund => "purchase_refund",
        }
    }

    /// Whether a client may request this action through the award endpoint.
    ///
    /// Daily login has its own endpoint; grants and purchase bookkeeping are
    /// server-side only.
    #[must_use]
    pub const fn is_client_triggerable(&self) -> bool {
        matches!(
            self,
            Self::CreatePost
                | Self::CreateComment
                | Self::SharePost
                | Self::ReportLostPet
                | Self::CompleteProfile
                | Self::RegisterPet
        )
    }

    /// Whether a positive entry of this type counts towards `total_earned`.
    #[must_use]
    pub const fn counts_as_earned(&self) -> bool {
        !matches!(self, Self::Purchase | Self::PurchaseRefund)
    }
}

impl fmt::Display for ActionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ActionType {
    type Err = PointsError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|action| action.as_str() == s)
            .ok_or_else(|| PointsError::InvalidAction(s.to_string()))
    }
}

/// Static rule for an earning action.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActionRule {
    /// Points credited per award.
    pub points: i64,
    /// Maximum points credited per user per calendar day.
    pub daily_cap: Option<i64>,
    /// Whether the action may be credited at most once per user, ever.
    pub one_time: bool,
}

impl ActionRule {
    const fn capped(points: i64, daily_cap: i64) -> Self {
        Self {
            points,
            daily_cap: Some(daily_cap),
            one_time: false,
        }
    }

    const fn once(points: i64) -> Self {
        Self {
            points,
            daily_cap: None,
            one_time: true,
        }
    }
}

/// Fully resolved parameters for one award.
///
/// Regular actions and admin grants both reduce to this shape before
/// reaching the store, so they share one atomic code path.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AwardRule {
    /// The action being credited.
    pub action: ActionType,
    /// Points to credit; always positive.
    pub points: i64,
    /// Cap on today's sum for `(user, action)`.
    pub daily_cap: Option<i64>,
    /// Reject if a prior nonzero entry for `(user, action)` exists.
    pub one_time: bool,
}

/// Points economy configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PointsConfig {
    /// Rules for earning actions.
    pub rules: HashMap<ActionType, ActionRule>,

    /// Largest single admin grant.
    pub admin_max_grant: i64,

    /// Offset of the community's calendar day from UTC, in minutes.
    pub day_offset_minutes: i32,
}

impl Default for PointsConfig {
    fn default() -> Self {
        let mut rules = HashMap::new();

        // One successful check-in per day: the cap equals the value.
        rules.insert(ActionType::DailyLogin, ActionRule::capped(10, 10));
        rules.insert(ActionType::CreatePost, ActionRule::capped(10, 50));
        rules.insert(ActionType::CreateComment, ActionRule::capped(2, 20));
        rules.insert(ActionType::SharePost, ActionRule::capped(1, 5));
        rules.insert(ActionType::ReportLostPet, ActionRule::capped(20, 40));
        rules.insert(ActionType::CompleteProfile, ActionRule::once(50));
        rules.insert(ActionType::RegisterPet, ActionRule::once(30));

        Self {
            rules,
            admin_max_grant: DEFAULT_ADMIN_MAX_GRANT,
            day_offset_minutes: 0,
        }
    }
}

impl PointsConfig {
    /// Resolve the award parameters for an earning action.
    ///
    /// # Errors
    ///
    /// Returns `PointsError::InvalidAction` if the action has no configured rule.
    pub fn rule_for(&self, action: ActionType) -> Result<AwardRule, PointsError> {
        let rule = self
            .rules
            .get(&action)
            .ok_or_else(|| PointsError::InvalidAction(action.to_string()))?;

        Ok(AwardRule {
            action,
            points: rule.points,
            daily_cap: rule.daily_cap,
            one_time: rule.one_time,
        })
    }

    /// Award parameters for an admin grant: caller-chosen amount, no cap, repeatable.
    ///
    /// # Errors
    ///
    /// Returns `PointsError::InvalidAmount` unless `1 <= points <= admin_max_grant`.
    pub fn admin_grant(&self, points: i64) -> Result<AwardRule, PointsError> {
        if points < 1 || points > self.admin_max_grant {
            return Err(PointsError::InvalidAmount(format!(
                "admin grant must be between 1 and {}, got {points}",
                self.admin_max_grant
            )));
        }

        Ok(AwardRule {
            action: ActionType::AdminGrant,
            points,
            daily_cap: None,
            one_time: false,
        })
    }

    /// Start of the calendar day containing `now`, as a UTC instant.
    #[must_use]
    pub fn day_start(&self, now: DateTime<Utc>) -> DateTime<Utc> {
        let offset = Duration::minutes(i64::from(self.day_offset_minutes));
        let local_midnight = (now + offset).date_naive().and_time(NaiveTime::MIN);
        local_midnight.and_utc() - offset
    }
}
