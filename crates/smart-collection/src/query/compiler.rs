//! Combined query compilation.

/// Prefix marking the combined query as a project search.
pub const PROJECT_QUERY_PREFIX: &str = "p: ";

/// Merges the folder fragment and the rule fragment into one query string.
///
/// Returns an empty string when both fragments are empty.
pub fn build_combined_query(folder_fragment: &str, rule_fragment: &str) -> String {
    match (folder_fragment.is_empty(), rule_fragment.is_empty()) {
        (false, false) => {
            format!("{PROJECT_QUERY_PREFIX}{folder_fragment} and ({rule_fragment})")
        }
        (false, true) => format!("{PROJECT_QUERY_PREFIX}{folder_fragment}"),
        (true, false) => format!("{PROJECT_QUERY_PREFIX}{rule_fragment}"),
        (true, true) => String::new(),
    }
}
