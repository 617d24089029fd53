use serde::{Deserialize, Serialize};

/// Default permission bits for `make_directory`.
pub const DEFAULT_DIRECTORY_MODE: u32 = 0o755;

/// Suffix appended to an entry's key to form its modification marker.
pub const DEFAULT_MARKER_SUFFIX: &str = "::lastModified";

/// How directory operations are interpreted.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum DirectoryMode {
    /// Directories do not exist in the key space; every directory
    /// operation succeeds without touching any entry.
    #[default]
    Flat,
    /// A directory is the set of entries whose key starts with `<dir>/`.
    Hierarchical,
}

/// Filesystem adapter configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FilesystemConfig {
    pub directory_mode: DirectoryMode,
    pub marker_suffix: String,
    /// Attempts made by `append`/`prepend`/`move` before giving up on a
    /// key that keeps changing underneath them.
    pub cas_max_retries: u32,
    /// Upper bound on keys fetched when enumerating a directory.
    pub scan_limit: usize,
}

impl Default for FilesystemConfig {
    fn default() -> Self {
        Self {
            directory_mode: DirectoryMode::Flat,
            marker_suffix: DEFAULT_MARKER_SUFFIX.to_string(),
            cas_max_retries: 16,
            scan_limit: 100_000,
        }
    }
}
