//! Owned items and the equipped snapshot.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{ItemSlug, UserId};

/// Maximum number of accessories equipped at once.
pub const MAX_EQUIPPED_ACCESSORIES: usize = 3;

/// Proof that a user bought an item. Unique per `(user_id, item_slug)`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OwnedItem {
    /// Owner.
    pub user_id: UserId,
    /// Purchased item.
    pub item_slug: ItemSlug,
    /// Points debited for the item.
    pub purchase_price: i64,
    /// When the purchase completed.
    pub purchased_at: DateTime<Utc>,
}

impl OwnedItem {
    /// Create an ownership record stamped with the current time.
    #[must_use]
    pub fn new(user_id: UserId, item_slug: ItemSlug, purchase_price: i64) -> Self {
        Self {
            user_id,
            item_slug,
            purchase_price,
            purchased_at: Utc::now(),
        }
    }
}

/// Denormalized view of what a user currently has on.
///
/// Rebuilt from owned items and the catalog on every equip call; never
/// consulted for ownership decisions.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EquippedSnapshot {
    /// Equipped character, if any.
    pub character_slug: Option<ItemSlug>,

    /// Equipped accessories, at most [`MAX_EQUIPPED_ACCESSORIES`].
    pub accessory_slugs: Vec<ItemSlug>,

    /// Catalog display payloads keyed by slug, cached for rendering.
    pub display: serde_json::Value,

    /// When the snapshot was written.
    pub updated_at: Option<DateTime<Utc>>,
}

impl EquippedSnapshot {
    /// Iterate over every slug referenced by the snapshot.
    pub fn slugs(&self) -> impl Iterator<Item = &ItemSlug> {
        self.character_slug.iter().chain(self.accessory_slugs.iter())
    }
}
