//! Canonical item instances keyed by asset identity.

use std::sync::Arc;

use fnv::FnvHashMap;
use parking_lot::RwLock;

use crate::types::{Asset, AssetKey, LibraryItem};

/// Resolve-or-create registry of [`LibraryItem`]s.
///
/// The registry owns the canonical instance for each asset key; collections
/// only hold shared references to it. Several collections can share one
/// registry so the same asset maps to the same instance everywhere.
#[derive(Debug, Default)]
pub struct ItemRegistry {
    items: RwLock<FnvHashMap<AssetKey, Arc<LibraryItem>>>,
}

impl ItemRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the canonical item for `asset`, creating it on first use.
    ///
    /// When the asset has moved since the item was created, the instance is
    /// replaced so the item reports the current path.
    pub fn item_for(&self, asset: &Asset) -> Arc<LibraryItem> {
        if let Some(existing) = self.items.read().get(&asset.key) {
            if describes(existing, asset) {
                return existing.clone();
            }
        }

        let mut items = self.items.write();
        if let Some(existing) = items.get(&asset.key) {
            if describes(existing, asset) {
                return existing.clone();
            }
        }
        let item = Arc::new(LibraryItem::from_asset(asset));
        items.insert(asset.key.clone(), item.clone());
        item
    }

    /// Returns the canonical item for `key` without creating one.
    pub fn get(&self, key: &AssetKey) -> Option<Arc<LibraryItem>> {
        self.items.read().get(key).cloned()
    }

    /// Drops the registry entry for `key`, e.g. after the asset was deleted.
    pub fn forget(&self, key: &AssetKey) -> Option<Arc<LibraryItem>> {
        self.items.write().remove(key)
    }

    pub fn len(&self) -> usize {
        self.items.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.read().is_empty()
    }
}

fn describes(item: &LibraryItem, asset: &Asset) -> bool {
    item.asset_path() == asset.path && item.kind() == asset.kind
}
