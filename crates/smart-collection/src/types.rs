//! Core types shared by the collection, the registry and the search path.

use std::fmt;
use std::hash::{Hash, Hasher};

use serde::{Deserialize, Serialize};

/// Stable identity of an asset (survives moves and renames).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AssetKey(String);

impl AssetKey {
    pub fn new(key: impl Into<String>) -> Self {
        Self(key.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for AssetKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Asset kind enumeration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AssetKind {
    #[default]
    Asset,
    Folder,
}

impl AssetKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Asset => "asset",
            Self::Folder => "folder",
        }
    }
}

/// A resolved asset as reported by the host environment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Asset {
    pub key: AssetKey,
    pub path: String,
    pub kind: AssetKind,
}

impl Asset {
    pub fn new(key: impl Into<String>, path: impl Into<String>) -> Self {
        Self {
            key: AssetKey::new(key),
            path: path.into(),
            kind: AssetKind::Asset,
        }
    }

    pub fn folder(key: impl Into<String>, path: impl Into<String>) -> Self {
        Self {
            kind: AssetKind::Folder,
            ..Self::new(key, path)
        }
    }
}

/// A member handle for an asset.
///
/// Equality and hashing use the asset key only, so an item keeps its identity
/// when the underlying asset moves.
#[derive(Debug, Clone)]
pub struct LibraryItem {
    key: AssetKey,
    asset_path: String,
    kind: AssetKind,
}

impl LibraryItem {
    pub fn from_asset(asset: &Asset) -> Self {
        Self {
            key: asset.key.clone(),
            asset_path: asset.path.clone(),
            kind: asset.kind,
        }
    }

    pub fn key(&self) -> &AssetKey {
        &self.key
    }

    pub fn asset_path(&self) -> &str {
        &self.asset_path
    }

    pub fn kind(&self) -> AssetKind {
        self.kind
    }
}

impl PartialEq for LibraryItem {
    fn eq(&self, other: &Self) -> bool {
        self.key == other.key
    }
}

impl Eq for LibraryItem {}

impl Hash for LibraryItem {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.key.hash(state);
    }
}

/// Kind of membership change carried by a [`CollectionEvent`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChangeKind {
    Added,
    Removed,
    Cleared,
}

/// A membership change notification.
#[derive(Debug, Clone)]
pub struct CollectionEvent {
    pub kind: ChangeKind,
    pub items: Vec<std::sync::Arc<LibraryItem>>,
}

/// Search state of a smart collection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SearchState {
    Idle,
    Searching,
}

impl SearchState {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Searching => "searching",
        }
    }
}

/// Status snapshot of a smart collection.
#[derive(Debug, Clone)]
pub struct CollectionStatus {
    /// Collection name from configuration.
    pub name: String,
    /// Whether a full refresh is in flight.
    pub state: SearchState,
    /// Generation of the most recently started refresh.
    pub generation: u64,
    /// Number of current members.
    pub members: usize,
    /// Unix timestamp of the last applied refresh.
    pub last_refresh_at: Option<u64>,
    /// Hits returned by the last applied refresh.
    pub last_hit_count: usize,
    /// Hits skipped because their asset no longer resolved.
    pub last_skipped: usize,
    /// Count of refreshes applied since construction.
    pub refresh_count: u64,
}
