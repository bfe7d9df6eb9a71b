//! Seams to the external search backend and asset database.

use async_trait::async_trait;
use fnv::FnvHashMap;
use parking_lot::RwLock;

use crate::cancel::CancellationToken;
use crate::error::Result;
use crate::query::normalize_path_for_compare;
use crate::types::Asset;

/// A single match reported by the query engine.
///
/// Hits come from the global asset index and may be stale: the asset can be
/// gone by the time the hit is resolved.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SearchHit {
    pub path: String,
}

impl SearchHit {
    pub fn new(path: impl Into<String>) -> Self {
        Self { path: path.into() }
    }
}

/// Executes textual queries over the global asset index.
///
/// Implementations should return early once `cancel.is_cancelled()` reports
/// `None`; the caller discards results of superseded searches anyway.
#[async_trait]
pub trait QueryEngine: Send + Sync {
    async fn execute(&self, query: &str, cancel: CancellationToken) -> Result<Vec<SearchHit>>;
}

/// Resolves asset paths to live assets.
pub trait AssetResolver: Send + Sync {
    /// Returns `None` when nothing exists at `path` anymore.
    fn resolve(&self, path: &str) -> Option<Asset>;
}

/// In-memory asset database keyed by normalized path.
#[derive(Debug, Default)]
pub struct MemoryAssetResolver {
    assets: RwLock<FnvHashMap<String, Asset>>,
}

impl MemoryAssetResolver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_assets(assets: impl IntoIterator<Item = Asset>) -> Self {
        let resolver = Self::new();
        for asset in assets {
            resolver.insert(asset);
        }
        resolver
    }

    pub fn insert(&self, asset: Asset) {
        self.assets
            .write()
            .insert(normalize_path_for_compare(&asset.path), asset);
    }

    pub fn remove(&self, path: &str) -> Option<Asset> {
        self.assets.write().remove(&normalize_path_for_compare(path))
    }

    pub fn len(&self) -> usize {
        self.assets.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.assets.read().is_empty()
    }
}

impl AssetResolver for MemoryAssetResolver {
    fn resolve(&self, path: &str) -> Option<Asset> {
        self.assets
            .read()
            .get(&normalize_path_for_compare(path))
            .cloned()
    }
}
