//! Equip/inventory manager.
//!
//! Ownership always comes from owned-item rows (or the item being free).
//! The equipped snapshot is rebuilt on every call and is never consulted
//! for ownership.

use chrono::Utc;
use paw_points_core::{
    CatalogItem, CatalogProvider, EquippedSnapshot, ItemCategory, ItemSlug, OwnedItem,
    PointsError, Result, UserId, MAX_EQUIPPED_ACCESSORIES,
};
use paw_points_store::Store;

/// A user's owned items plus what they have equipped.
#[derive(Debug, Clone)]
pub struct Inventory {
    /// Purchased items.
    pub items: Vec<OwnedItem>,
    /// Current snapshot (empty if the user never equipped anything).
    pub equipped: EquippedSnapshot,
}

/// Validates equip requests and writes the snapshot.
pub struct InventoryManager<'a> {
    store: &'a dyn Store,
    catalog: &'a dyn CatalogProvider,
}

impl<'a> InventoryManager<'a> {
    /// Create a manager.
    #[must_use]
    pub const fn new(store: &'a dyn Store, catalog: &'a dyn CatalogProvider) -> Self {
        Self { store, catalog }
    }

    /// Replace what `user_id` has equipped.
    ///
    /// `None` and an empty list unequip. Duplicate accessories are collapsed,
    /// keeping the first occurrence.
    ///
    /// # Errors
    ///
    /// `TooManyAccessories`, `ItemNotFound`, `WrongCategory` or `NotOwned`;
    /// nothing is written on rejection.
    pub async fn equip(
        &self,
        user_id: UserId,
        character_slug: Option<ItemSlug>,
        accessory_slugs: Vec<ItemSlug>,
    ) -> Result<EquippedSnapshot> {
        let mut accessories: Vec<ItemSlug> = Vec::with_capacity(accessory_slugs.len());
        for slug in accessory_slugs {
            if !accessories.contains(&slug) {
                accessories.push(slug);
            }
        }

        if accessories.len() > MAX_EQUIPPED_ACCESSORIES {
            return Err(PointsError::TooManyAccessories {
                count: accessories.len(),
                max: MAX_EQUIPPED_ACCESSORIES,
            });
        }

        let mut display = serde_json::Map::new();

        if let Some(slug) = &character_slug {
            let item = self
                .resolve(&user_id, slug, ItemCategory::Character, "character")
                .await?;
            display.insert(slug.to_string(), item.display);
        }
        for slug in &accessories {
            let item = self
                .resolve(&user_id, slug, ItemCategory::Accessory, "accessory")
                .await?;
            display.insert(slug.to_string(), item.display);
        }

        let snapshot = EquippedSnapshot {
            character_slug,
            accessory_slugs: accessories,
            display: serde_json::Value::Object(display),
            updated_at: Some(Utc::now()),
        };

        self.store.put_equipped(&user_id, &snapshot).await?;

        tracing::debug!(
            user_id = %user_id,
            character = ?snapshot.character_slug.as_ref().map(ItemSlug::as_str),
            accessories = snapshot.accessory_slugs.len(),
            "Equipped snapshot updated"
        );

        Ok(snapshot)
    }

    /// Owned items and the current snapshot.
    ///
    /// # Errors
    ///
    /// Returns an error if the store fails.
    pub async fn inventory(&self, user_id: UserId) -> Result<Inventory> {
        let items = self.store.list_owned_items(&user_id).await?;
        let equipped = self
            .store
            .get_equipped(&user_id)
            .await?
            .unwrap_or_default();

        Ok(Inventory { items, equipped })
    }

    /// Look up `slug`, check its slot and that the user may use it.
    async fn resolve(
        &self,
        user_id: &UserId,
        slug: &ItemSlug,
        category: ItemCategory,
        slot: &'static str,
    ) -> Result<CatalogItem> {
        let item = self
            .catalog
            .get(slug)
            .ok_or_else(|| PointsError::ItemNotFound(slug.clone()))?;

        if item.category != category {
            return Err(PointsError::WrongCategory {
                slug: slug.clone(),
                slot,
            });
        }

        if !item.is_free() && self.store.get_owned_item(user_id, slug).await?.is_none() {
            return Err(PointsError::NotOwned(slug.clone()));
        }

        Ok(item)
    }
}
