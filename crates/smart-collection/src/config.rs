//! Persisted smart collection configuration.

use fnv::FnvHashSet;
use serde::{Deserialize, Serialize};

use crate::error::{CollectionError, Result};
use crate::query::{normalize_path_for_compare, FolderFilter, FolderFilterSet};

/// Configuration surface of a smart collection.
///
/// ```json
/// {
///   "name": "Hero art",
///   "folders": [
///     { "path": "Assets/Art", "include": true, "matchOption": "recursive" },
///     { "path": "Assets/Art/Temp", "include": false }
///   ]
/// }
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SmartCollectionConfig {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub folders: FolderFilterSet,
}

impl SmartCollectionConfig {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            folders: FolderFilterSet::default(),
        }
    }

    pub fn with_folder(mut self, filter: FolderFilter) -> Self {
        self.folders.push(filter);
        self
    }

    /// Parses, normalizes and validates a JSON configuration.
    pub fn from_json(raw: &str) -> Result<Self> {
        let parsed: Self = serde_json::from_str(raw)?;
        let config = parsed.normalized();
        config.validate()?;
        Ok(config)
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Returns a copy with every folder path normalized.
    pub fn normalized(self) -> Self {
        let folders = self
            .folders
            .iter()
            .map(|filter| FolderFilter {
                path: normalize_path_for_compare(&filter.path),
                ..filter.clone()
            })
            .collect::<Vec<_>>();
        Self {
            name: self.name.trim().to_string(),
            folders: FolderFilterSet::new(folders),
        }
    }

    /// Rejects folder filters that target the same folder twice.
    ///
    /// Blank paths are allowed; they are ignored during evaluation.
    pub fn validate(&self) -> Result<()> {
        let mut seen = FnvHashSet::default();
        for filter in self.folders.iter() {
            let path = normalize_path_for_compare(&filter.path);
            if path.is_empty() {
                continue;
            }
            if !seen.insert(path.clone()) {
                return Err(CollectionError::Config(format!(
                    "duplicate folder filter: {path}"
                )));
            }
        }
        Ok(())
    }
}
