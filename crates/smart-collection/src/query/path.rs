//! Path normalization and containment utilities.

/// Normalizes an asset path for comparison (forward slashes, no trailing slash).
///
/// Unlike absolute filesystem paths, asset paths are project relative, so an
/// empty input stays empty.
pub fn normalize_path_for_compare(raw: &str) -> String {
    let mut normalized = raw.trim().replace('\\', "/");
    while normalized.ends_with('/') {
        normalized.pop();
    }
    normalized
}

/// Checks if a candidate path is a direct child of the parent path.
pub fn is_direct_child_path(candidate: &str, parent: &str) -> bool {
    match candidate.rsplit_once('/') {
        Some((candidate_parent, name)) => !name.is_empty() && candidate_parent == parent,
        None => false,
    }
}

/// Checks if a candidate path is a descendant of the parent path.
pub fn is_descendant_path(candidate: &str, parent: &str) -> bool {
    if candidate == parent {
        return false;
    }
    let prefix = format!("{parent}/");
    candidate.starts_with(prefix.as_str())
}
