pub mod config;
pub mod core;
pub mod fs;
pub mod logging;

// Re-export commonly used types
pub use crate::config::CacheFsConfig;
pub use crate::core::{CasToken, KVConfig, KVStats, KeyValueStore, MemoryStore, StoreError};
pub use fs::{
    CacheFilesystem, CacheFsError, DirectoryMode, Filesystem, FilesystemConfig, FsResult,
};
pub use logging::init_tracing;
