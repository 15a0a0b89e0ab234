//! Points balance, award and ledger read handlers.

use std::sync::Arc;

use axum::extract::{Query, State};
use axum::Json;
use serde::{Deserialize, Serialize};

use paw_points_core::{ActionType, PointsTransaction};

use crate::auth::AuthUser;
use crate::error::ApiError;
use crate::ledger::{AwardRejection, AwardResult, RankedEntry};
use crate::state::AppState;

/// Award request.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AwardRequest {
    /// Action being rewarded (e.g. `create_post`).
    pub action_type: String,
    /// Context stored verbatim on the transaction.
    #[serde(default)]
    pub metadata: serde_json::Value,
}

/// Award response. `success: false` with a reason is a normal outcome, not an error.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AwardResponse {
    /// Whether points were credited.
    pub success: bool,
    /// Why nothing was credited.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<AwardRejection>,
    /// Balance after the call.
    pub points: i64,
    /// Points credited by this call.
    pub earned: i64,
    /// Lifetime earned points.
    pub total_earned: i64,
}

impl From<AwardResult> for AwardResponse {
    fn from(result: AwardResult) -> Self {
        Self {
            success: result.success,
            reason: result.reason,
            points: result.balance.points,
            earned: result.points_awarded,
            total_earned: result.balance.total_earned,
        }
    }
}

/// Credit a client-triggered action.
pub async fn award(
    State(state): State<Arc<AppState>>,
    auth: AuthUser,
    Json(body): Json<AwardRequest>,
) -> Result<Json<AwardResponse>, ApiError> {
    let action: ActionType = body.action_type.parse()?;

    let result = state
        .ledger()
        .award(auth.user_id, action, body.metadata)
        .await?;

    Ok(Json(result.into()))
}

/// Daily check-in.
pub async fn daily_check(
    State(state): State<Arc<AppState>>,
    auth: AuthUser,
) -> Result<Json<AwardResponse>, ApiError> {
    let result = state.ledger().daily_check(auth.user_id).await?;

    Ok(Json(result.into()))
}

/// Balance response.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BalanceResponse {
    /// Spendable points.
    pub points: i64,
    /// Lifetime earned points.
    pub total_earned: i64,
}

/// Get the caller's balance.
pub async fn get_balance(
    State(state): State<Arc<AppState>>,
    auth: AuthUser,
) -> Result<Json<BalanceResponse>, ApiError> {
    let balance = state.ledger().balance(&auth.user_id).await?;

    Ok(Json(BalanceResponse {
        points: balance.points,
        total_earned: balance.total_earned,
    }))
}

/// Leaderboard query parameters.
#[derive(Debug, Deserialize)]
pub struct LeaderboardQuery {
    /// Number of entries (default 10, max 100).
    pub limit: Option<usize>,
}

/// Leaderboard row.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LeaderboardEntryResponse {
    /// 1-based position.
    pub rank: usize,
    /// User ID.
    pub user_id: String,
    /// Current balance.
    pub points: i64,
}

impl From<RankedEntry> for LeaderboardEntryResponse {
    fn from(entry: RankedEntry) -> Self {
        Self {
            rank: entry.rank,
            user_id: entry.user_id.to_string(),
            points: entry.points,
        }
    }
}

/// Leaderboard response.
#[derive(Debug, Serialize)]
pub struct LeaderboardResponse {
    /// Entries, highest balance first.
    pub entries: Vec<LeaderboardEntryResponse>,
}

/// Top balances.
pub async fn leaderboard(
    State(state): State<Arc<AppState>>,
    _auth: AuthUser,
    Query(query): Query<LeaderboardQuery>,
) -> Result<Json<LeaderboardResponse>, ApiError> {
    let entries = state.ledger().leaderboard(query.limit).await?;

    Ok(Json(LeaderboardResponse {
        entries: entries.into_iter().map(Into::into).collect(),
    }))
}

/// History query parameters.
#[derive(Debug, Deserialize)]
pub struct HistoryQuery {
    /// Page size (default 20, max 50).
    pub limit: Option<usize>,
    /// Offset for pagination (default: 0).
    #[serde(default)]
    pub offset: usize,
}

/// Transaction response.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TransactionResponse {
    /// Transaction ID.
    pub id: String,
    /// What caused the change.
    pub action_type: ActionType,
    /// Signed change.
    pub points_delta: i64,
    /// Caller-supplied context.
    pub metadata: serde_json::Value,
    /// Timestamp.
    pub created_at: String,
}

impl From<&PointsTransaction> for TransactionResponse {
    fn from(tx: &PointsTransaction) -> Self {
        Self {
            id: tx.id.to_string(),
            action_type: tx.action_type,
            points_delta: tx.points_delta,
            metadata: tx.metadata.clone(),
            created_at: tx.created_at.to_rfc3339(),
        }
    }
}

/// History response.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HistoryResponse {
    /// Transactions (newest first).
    pub transactions: Vec<TransactionResponse>,
    /// Whether there are more transactions.
    pub has_more: bool,
    /// Effective page size.
    pub limit: usize,
    /// Offset of this page.
    pub offset: usize,
}

/// The caller's transaction history.
pub async fn history(
    State(state): State<Arc<AppState>>,
    auth: AuthUser,
    Query(query): Query<HistoryQuery>,
) -> Result<Json<HistoryResponse>, ApiError> {
    let page = state
        .ledger()
        .history(&auth.user_id, query.limit, query.offset)
        .await?;

    Ok(Json(HistoryResponse {
        transactions: page.transactions.iter().map(Into::into).collect(),
        has_more: page.has_more,
        limit: page.limit,
        offset: page.offset,
    }))
}
