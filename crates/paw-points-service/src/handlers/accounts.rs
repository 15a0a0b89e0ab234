//! Account handlers.

use std::sync::Arc;

use axum::extract::State;
use axum::Json;
use serde::Serialize;

use paw_points_core::Account;

use crate::auth::AuthUser;
use crate::error::ApiError;
use crate::state::AppState;

/// Account response.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AccountResponse {
    /// User ID.
    pub user_id: String,
    /// Spendable points.
    pub points: i64,
    /// Lifetime earned points.
    pub total_earned: i64,
    /// Database admin flag.
    pub is_admin: bool,
    /// Created timestamp.
    pub created_at: String,
}

impl From<&Account> for AccountResponse {
    fn from(account: &Account) -> Self {
        Self {
            user_id: account.user_id.to_string(),
            points: account.points,
            total_earned: account.total_earned,
            is_admin: account.is_admin,
            created_at: account.created_at.to_rfc3339(),
        }
    }
}

/// Create the caller's balance at signup.
pub async fn create_account(
    State(state): State<Arc<AppState>>,
    auth: AuthUser,
) -> Result<Json<AccountResponse>, ApiError> {
    let account = Account::new(auth.user_id);

    // The store rejects duplicates atomically; that surfaces as 409.
    state.store.create_account(&account).await?;

    tracing::info!(user_id = %auth.user_id, "Account created");

    Ok(Json(AccountResponse::from(&account)))
}
