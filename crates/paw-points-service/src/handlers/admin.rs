//! Admin handlers.

use std::sync::Arc;

use axum::extract::State;
use axum::Json;
use serde::{Deserialize, Serialize};

use paw_points_core::UserId;

use crate::auth::AdminAuth;
use crate::error::ApiError;
use crate::state::AppState;

/// Admin grant request.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AdminGrantRequest {
    /// User receiving the points.
    pub target_user_id: String,
    /// Amount, `1..=1_000_000` by default.
    pub points: i64,
    /// Optional audit note.
    pub reason: Option<String>,
}

/// Admin grant response.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AdminGrantResponse {
    /// Always true; failures are errors.
    pub success: bool,
    /// Points granted.
    pub awarded: i64,
    /// Target's balance after the grant.
    pub new_total: i64,
}

/// Grant points to any user.
pub async fn grant_points(
    State(state): State<Arc<AppState>>,
    auth: AdminAuth,
    Json(body): Json<AdminGrantRequest>,
) -> Result<Json<AdminGrantResponse>, ApiError> {
    let target: UserId = body
        .target_user_id
        .parse()
        .map_err(|_| ApiError::BadRequest("Invalid target user ID".into()))?;

    let result = state
        .ledger()
        .admin_grant(auth.user_id, target, body.points, body.reason.as_deref())
        .await?;

    Ok(Json(AdminGrantResponse {
        success: result.success,
        awarded: result.points_awarded,
        new_total: result.balance.points,
    }))
}
