//! Key and directory-prefix helpers.

/// Key prefix covering every entry inside `directory`.
///
/// `""` covers the whole key space, `"/"` covers every absolute key.
pub fn directory_prefix(directory: &str) -> String {
    if directory.is_empty() {
        return String::new();
    }
    let trimmed = directory.trim_end_matches('/');
    format!("{trimmed}/")
}

/// Marker key for `key`.
pub fn marker_key(key: &str, suffix: &str) -> String {
    format!("{key}{suffix}")
}

/// Strip the marker suffix, returning the entry key a marker belongs to.
pub fn entry_for_marker<'a>(marker: &'a str, suffix: &str) -> Option<&'a str> {
    marker.strip_suffix(suffix).filter(|key| !key.is_empty())
}

/// Name of the immediate subdirectory `relative` lives in, if any.
pub fn first_segment(relative: &str) -> Option<&str> {
    relative.split_once('/').map(|(segment, _)| segment)
}
