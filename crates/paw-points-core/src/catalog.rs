//! Shop catalog.
//!
//! The catalog is static content owned outside the points economy. Services
//! consume it through the [`CatalogProvider`] trait; [`StaticCatalog`] is the
//! in-memory implementation loaded from the built-in item list or a JSON file.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::ItemSlug;

/// Kind of cosmetic item.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ItemCategory {
    /// The pet avatar itself. One may be equipped.
    Character,

    /// Worn on the character. Several may be equipped.
    Accessory,

    /// Profile background theme.
    Background,
}

/// A catalog entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CatalogItem {
    /// Stable identifier.
    pub slug: ItemSlug,

    /// Display name.
    pub name: String,

    /// Item kind.
    pub category: ItemCategory,

    /// Price in points. Zero means free/default.
    pub price: i64,

    /// Opaque rendering payload (image URL, colors, offsets...).
    #[serde(default)]
    pub display: serde_json::Value,
}

impl CatalogItem {
    /// Free items are usable by everyone without a purchase.
    #[must_use]
    pub const fn is_free(&self) -> bool {
        self.price == 0
    }
}

/// Read-only lookup of catalog items by slug.
pub trait CatalogProvider: Send + Sync {
    /// Look up an item.
    fn get(&self, slug: &ItemSlug) -> Option<CatalogItem>;

    /// All items, in a stable order.
    fn items(&self) -> Vec<CatalogItem>;
}

/// In-memory catalog.
#[derive(Debug, Clone)]
pub struct StaticCatalog {
    items: Vec<CatalogItem>,
    by_slug: HashMap<ItemSlug, usize>,
}

impl StaticCatalog {
    /// Build a catalog from a list of items. Later duplicates replace earlier ones.
    #[must_use]
    pub fn new(items: Vec<CatalogItem>) -> Self {
        let mut deduped: Vec<CatalogItem> = Vec::with_capacity(items.len());
        let mut by_slug = HashMap::new();

        for item in items {
            if let Some(&index) = by_slug.get(&item.slug) {
                deduped[index] = item;
            } else {
                by_slug.insert(item.slug.clone(), deduped.len());
                deduped.push(item);
            }
        }

        Self {
            items: deduped,
            by_slug,
        }
    }

    /// Parse a catalog from a JSON array of items.
    ///
    /// # Errors
    ///
    /// Returns an error if the JSON is malformed, a slug is invalid, or a price is negative.
    pub fn from_json(json: &str) -> Result<Self, CatalogError> {
        let items: Vec<CatalogItem> =
            serde_json::from_str(json).map_err(|e| CatalogError::Parse(e.to_string()))?;

        if let Some(item) = items.iter().find(|item| item.price < 0) {
            return Err(CatalogError::NegativePrice(item.slug.clone()));
        }

        Ok(Self::new(items))
    }
}

impl Default for StaticCatalog {
    fn default() -> Self {
        Self::new(default_items())
    }
}

impl CatalogProvider for StaticCatalog {
    fn get(&self, slug: &ItemSlug) -> Option<CatalogItem> {
        self.by_slug.get(slug).map(|&index| self.items[index].clone())
    }

    fn items(&self) -> Vec<CatalogItem> {
        self.items.clone()
    }
}

/// Errors raised while loading a catalog.
#[derive(Debug, thiserror::Error)]
pub enum CatalogError {
    /// The catalog document could not be parsed.
    #[error("invalid catalog: {0}")]
    Parse(String),

    /// An item has a negative price.
    #[error("item {0} has a negative price")]
    NegativePrice(ItemSlug),
}

fn item(
    slug: &str,
    name: &str,
    category: ItemCategory,
    price: i64,
    display: serde_json::Value,
) -> Option<CatalogItem> {
    Some(CatalogItem {
        slug: slug.parse().ok()?,
        name: name.to_string(),
        category,
        price,
        display,
    })
}

/// The built-in shop.
fn default_items() -> Vec<CatalogItem> {
    use serde_json::json;
    use ItemCategory::{Accessory, Background, Character};

    [
        item("mixed-puppy", "Mixed Puppy", Character, 0, json!({ "image": "/characters/mixed-puppy.png" })),
        item("tabby-kitten", "Tabby Kitten", Character, 0, json!({ "image": "/characters/tabby-kitten.png" })),
        item("golden-retriever", "Golden Retriever", Character, 300, json!({ "image": "/characters/golden-retriever.png" })),
        item("shiba-inu", "Shiba Inu", Character, 300, json!({ "image": "/characters/shiba-inu.png" })),
        item("persian-cat", "Persian Cat", Character, 450, json!({ "image": "/characters/persian-cat.png" })),
        item("red-scarf", "Red Scarf", Accessory, 150, json!({ "image": "/accessories/red-scarf.png", "anchor": "neck" })),
        item("straw-hat", "Straw Hat", Accessory, 120, json!({ "image": "/accessories/straw-hat.png", "anchor": "head" })),
        item("round-glasses", "Round Glasses", Accessory, 100, json!({ "image": "/accessories/round-glasses.png", "anchor": "eyes" })),
        item("bell-collar", "Bell Collar", Accessory, 80, json!({ "image": "/accessories/bell-collar.png", "anchor": "neck" })),
        item("name-tag", "Name Tag", Accessory, 0, json!({ "image": "/accessories/name-tag.png", "anchor": "neck" })),
        item("park-day", "Park Day", Background, 200, json!({ "color": "#9BD770" })),
        item("night-sky", "Night Sky", Background, 250, json!({ "color": "#1B2A49" })),
    ]
    .into_iter()
    .flatten()
    .collect()
}
