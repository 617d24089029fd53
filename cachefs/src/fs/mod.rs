//! Filesystem view over a key-value cache.
//!
//! Key components:
//!
//! - [`Filesystem`] - Whole-file operations addressed by path
//! - [`CacheFilesystem`] - Implementation backed by any [`KeyValueStore`]
//!
//! [`KeyValueStore`]: crate::core::KeyValueStore

mod cache_fs;
mod error;
mod ops;
pub mod path;
mod types;

pub use cache_fs::CacheFilesystem;
pub use error::{CacheFsError, FsResult};
pub use ops::Filesystem;
pub use types::{DEFAULT_DIRECTORY_MODE, DEFAULT_MARKER_SUFFIX, DirectoryMode, FilesystemConfig};
