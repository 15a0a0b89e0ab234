//! Catalog, purchase, equip and inventory handlers.

use std::sync::Arc;

use axum::extract::State;
use axum::Json;
use serde::{Deserialize, Serialize};

use paw_points_core::{CatalogItem, EquippedSnapshot, ItemSlug, OwnedItem};

use crate::auth::AuthUser;
use crate::error::ApiError;
use crate::state::AppState;

/// Catalog response.
#[derive(Debug, Serialize)]
pub struct CatalogResponse {
    /// All items.
    pub items: Vec<CatalogItem>,
}

/// List the shop catalog.
pub async fn catalog(
    State(state): State<Arc<AppState>>,
    _auth: AuthUser,
) -> Json<CatalogResponse> {
    Json(CatalogResponse {
        items: state.catalog.items(),
    })
}

/// Purchase request.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PurchaseRequest {
    /// Item to buy.
    pub item_slug: String,
}

/// Purchase response.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PurchaseResponse {
    /// Always true; rejections are errors.
    pub success: bool,
    /// Balance after the debit.
    pub remaining_points: i64,
    /// Human-readable confirmation.
    pub message: String,
    /// The debit's ledger entry.
    pub transaction_id: String,
}

/// Buy a catalog item.
pub async fn purchase(
    State(state): State<Arc<AppState>>,
    auth: AuthUser,
    Json(body): Json<PurchaseRequest>,
) -> Result<Json<PurchaseResponse>, ApiError> {
    let slug: ItemSlug = body
        .item_slug
        .parse()
        .map_err(|_| ApiError::BadRequest("Invalid item slug".into()))?;

    let receipt = state.purchases().purchase(auth.user_id, &slug).await?;

    Ok(Json(PurchaseResponse {
        success: true,
        remaining_points: receipt.remaining_points,
        message: format!("Purchased {}", receipt.item.name),
        transaction_id: receipt.transaction_id.to_string(),
    }))
}

/// Equip request. Omit or null `characterSlug` and send `[]` to unequip.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EquipRequest {
    /// Character to equip.
    pub character_slug: Option<String>,
    /// Accessories to equip.
    #[serde(default)]
    pub accessory_slugs: Vec<String>,
}

/// Equipped snapshot in response format.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EquippedResponse {
    /// Equipped character.
    pub character_slug: Option<String>,
    /// Equipped accessories.
    pub accessory_slugs: Vec<String>,
    /// Display payloads keyed by slug.
    pub display: serde_json::Value,
    /// When the snapshot was written.
    pub updated_at: Option<String>,
}

impl From<&EquippedSnapshot> for EquippedResponse {
    fn from(snapshot: &EquippedSnapshot) -> Self {
        Self {
            character_slug: snapshot.character_slug.as_ref().map(ToString::to_string),
            accessory_slugs: snapshot
                .accessory_slugs
                .iter()
                .map(ToString::to_string)
                .collect(),
            display: snapshot.display.clone(),
            updated_at: snapshot.updated_at.map(|at| at.to_rfc3339()),
        }
    }
}

/// Equip response.
#[derive(Debug, Serialize)]
pub struct EquipResponse {
    /// Always true; rejections are errors.
    pub success: bool,
    /// The new snapshot.
    pub equipped: EquippedResponse,
}

/// Replace what the caller has equipped.
pub async fn equip(
    State(state): State<Arc<AppState>>,
    auth: AuthUser,
    Json(body): Json<EquipRequest>,
) -> Result<Json<EquipResponse>, ApiError> {
    let character = body
        .character_slug
        .as_deref()
        .map(str::parse::<ItemSlug>)
        .transpose()
        .map_err(|_| ApiError::BadRequest("Invalid character slug".into()))?;

    let accessories = body
        .accessory_slugs
        .iter()
        .map(|s| s.parse::<ItemSlug>())
        .collect::<Result<Vec<_>, _>>()
        .map_err(|_| ApiError::BadRequest("Invalid accessory slug".into()))?;

    let snapshot = state
        .inventory()
        .equip(auth.user_id, character, accessories)
        .await?;

    Ok(Json(EquipResponse {
        success: true,
        equipped: EquippedResponse::from(&snapshot),
    }))
}

/// Owned item in response format.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OwnedItemResponse {
    /// Item slug.
    pub item_slug: String,
    /// Points paid.
    pub purchase_price: i64,
    /// Purchase timestamp.
    pub purchased_at: String,
}

impl From<&OwnedItem> for OwnedItemResponse {
    fn from(item: &OwnedItem) -> Self {
        Self {
            item_slug: item.item_slug.to_string(),
            purchase_price: item.purchase_price,
            purchased_at: item.purchased_at.to_rfc3339(),
        }
    }
}

/// Inventory response.
#[derive(Debug, Serialize)]
pub struct InventoryResponse {
    /// Purchased items.
    pub items: Vec<OwnedItemResponse>,
    /// Current snapshot.
    pub equipped: EquippedResponse,
}

/// The caller's owned items and equipped snapshot.
pub async fn inventory(
    State(state): State<Arc<AppState>>,
    auth: AuthUser,
) -> Result<Json<InventoryResponse>, ApiError> {
    let inventory = state.inventory().inventory(auth.user_id).await?;

    Ok(Json(InventoryResponse {
        items: inventory.items.iter().map(Into::into).collect(),
        equipped: EquippedResponse::from(&inventory.equipped),
    }))
}
