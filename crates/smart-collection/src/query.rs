//! Query compilation for smart collections.
//!
//! This module turns collection configuration into search queries:
//! - Folder filters (include/exclude, recursive or top-only)
//! - Folder path predicate for single-item evaluation
//! - Combination of folder and rule fragments into one query

mod compiler;
mod folder;
mod path;

pub use compiler::{build_combined_query, PROJECT_QUERY_PREFIX};
pub use folder::{
    FolderFilter, FolderFilterSet, FolderMatchOption, ASSETS_ROOT_TERM, TOP_ONLY_ANCHOR,
};
pub use path::normalize_path_for_compare;
