//! Folder filters: query fragment compilation and direct path matching.

use serde::{Deserialize, Serialize};

use super::path::{is_descendant_path, is_direct_child_path, normalize_path_for_compare};

/// Anchor appended to top-only folder fragments so nested paths do not match.
pub const TOP_ONLY_ANCHOR: &str = "[^/]*$";

/// Synthetic root term used when only exclude filters are configured.
///
/// This only approximates "everything under the project": results are wrong
/// for assets outside the assets area.
pub const ASSETS_ROOT_TERM: &str = "a:assets";

/// How deep below a folder a path may live to count as inside it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum FolderMatchOption {
    #[default]
    Recursive,
    TopOnly,
}

/// A single include/exclude folder constraint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FolderFilter {
    pub path: String,
    #[serde(default = "default_include")]
    pub include: bool,
    #[serde(default)]
    pub match_option: FolderMatchOption,
}

fn default_include() -> bool {
    true
}

impl FolderFilter {
    pub fn include(path: impl Into<String>, match_option: FolderMatchOption) -> Self {
        Self {
            path: normalize_path_for_compare(&path.into()),
            include: true,
            match_option,
        }
    }

    pub fn exclude(path: impl Into<String>, match_option: FolderMatchOption) -> Self {
        Self {
            include: false,
            ..Self::include(path, match_option)
        }
    }

    /// Returns the normalized folder path, or `None` when the path is blank.
    fn folder(&self) -> Option<String> {
        let folder = normalize_path_for_compare(&self.path);
        (!folder.is_empty()).then_some(folder)
    }

    /// Whether `path` (already normalized) lives inside this folder.
    fn contains(&self, folder: &str, path: &str) -> bool {
        match self.match_option {
            FolderMatchOption::TopOnly => is_direct_child_path(path, folder),
            FolderMatchOption::Recursive => is_descendant_path(path, folder),
        }
    }

    fn query_term(&self, folder: &str) -> String {
        let negation = if self.include { "" } else { "-" };
        let anchor = match self.match_option {
            FolderMatchOption::TopOnly => TOP_ONLY_ANCHOR,
            FolderMatchOption::Recursive => "",
        };
        format!("{negation}{folder}/{anchor}")
    }
}

/// Ordered folder filters of a smart collection.
///
/// Declaration order matters: [`FolderFilterSet::matches`] is first-match-wins.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FolderFilterSet {
    filters: Vec<FolderFilter>,
}

impl FolderFilterSet {
    pub fn new(filters: Vec<FolderFilter>) -> Self {
        Self { filters }
    }

    pub fn len(&self) -> usize {
        self.filters.len()
    }

    pub fn is_empty(&self) -> bool {
        self.filters.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &FolderFilter> {
        self.filters.iter()
    }

    pub fn push(&mut self, filter: FolderFilter) {
        self.filters.push(filter);
    }

    /// Removes the filter at `index`, returning it if present.
    pub fn remove(&mut self, index: usize) -> Option<FolderFilter> {
        (index < self.filters.len()).then(|| self.filters.remove(index))
    }

    /// Compiles the filters into a query fragment.
    ///
    /// Includes are OR-ed, excludes are AND-ed. An exclude-only set is scoped
    /// by [`ASSETS_ROOT_TERM`], which is a known approximation.
    pub fn build_query_fragment(&self) -> String {
        let mut includes = Vec::new();
        let mut excludes = Vec::new();
        for filter in &self.filters {
            let Some(folder) = filter.folder() else {
                continue;
            };
            let term = filter.query_term(&folder);
            if filter.include {
                includes.push(term);
            } else {
                excludes.push(term);
            }
        }

        let includes = includes.join(" or ");
        let excludes = excludes.join(" and ");
        match (includes.is_empty(), excludes.is_empty()) {
            (false, false) => format!("(({includes}) and ({excludes}))"),
            (false, true) => format!("({includes})"),
            (true, false) => format!("({ASSETS_ROOT_TERM} and ({excludes}))"),
            (true, true) => String::new(),
        }
    }

    /// Checks whether `path` passes the folder constraints.
    ///
    /// With no filters every path matches. Otherwise the first filter whose
    /// folder contains the path decides; if none does the path is rejected.
    pub fn matches(&self, path: &str) -> bool {
        if self.filters.is_empty() {
            return true;
        }
        let path = normalize_path_for_compare(path);
        for filter in &self.filters {
            let Some(folder) = filter.folder() else {
                continue;
            };
            if filter.contains(&folder, &path) {
                return filter.include;
            }
        }
        false
    }
}

impl From<Vec<FolderFilter>> for FolderFilterSet {
    fn from(filters: Vec<FolderFilter>) -> Self {
        Self::new(filters)
    }
}
