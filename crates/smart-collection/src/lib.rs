//! Rule-driven smart collections for editor asset libraries.
//!
//! This crate maintains the membership of a "smart collection":
//! - Folder filters compiled into query fragments and path predicates
//! - Rule sets combined with folders into one search query
//! - Asynchronous full refreshes with generation-based cancellation
//! - Synchronous incremental re-evaluation of single items

pub mod cancel;
pub mod collection;
pub mod config;
pub mod error;
pub mod query;
pub mod registry;
pub mod rules;
pub mod search;
pub mod types;

// Re-export main types
pub use cancel::CancellationToken;
pub use collection::LibraryCollection;
pub use config::SmartCollectionConfig;
pub use error::{CollectionError, Result};
pub use query::{build_combined_query, FolderFilter, FolderFilterSet, FolderMatchOption};
pub use registry::ItemRegistry;
pub use rules::{CompositeRuleSet, PredicateRule, Rule, RuleMatch, RuleSet};
pub use search::{
    AssetResolver, MemoryAssetResolver, QueryEngine, SearchHit, SmartCollection,
    SmartCollectionBuilder,
};
pub use types::{
    Asset, AssetKey, AssetKind, ChangeKind, CollectionEvent, CollectionStatus, LibraryItem,
    SearchState,
};
