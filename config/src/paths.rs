//! Dotted-path helpers.
//!
//! Paths join segments with `.`: tag names for records, decimal indices
//! for sequences, stringified keys for mappings. The first segment is
//! always the root config's name.

/// Append one segment to a path.
pub fn join(prefix: &str, segment: &str) -> String {
    if prefix.is_empty() {
        segment.to_string()
    } else {
        format!("{prefix}.{segment}")
    }
}

/// The path without its last segment.
pub fn parent(path: &str) -> &str {
    path.rsplit_once('.').map(|(parent, _)| parent).unwrap_or("")
}

/// Iterate the segments of a path.
pub fn segments(path: &str) -> impl Iterator<Item = &str> {
    path.split('.')
}
