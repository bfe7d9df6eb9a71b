//! Full-refresh search orchestration for smart collections.
//!
//! This module provides:
//! - The query engine and asset resolver seams
//! - The SmartCollection membership engine

mod engine;
mod manager;

#[cfg(test)]
mod tests;

// Re-export main types
pub use engine::{AssetResolver, MemoryAssetResolver, QueryEngine, SearchHit};
pub use manager::{SmartCollection, SmartCollectionBuilder};
