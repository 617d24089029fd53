use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

use crate::core::KVConfig;
use crate::fs::{DEFAULT_MARKER_SUFFIX, DirectoryMode, FilesystemConfig};

/// Top-level configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheFsConfig {
    pub kv_store: KVStoreConfig,
    pub filesystem: FilesystemSection,
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KVStoreConfig {
    pub max_memory_mb: usize,
    pub ttl_cleanup_interval_ms: u64,
    #[serde(default)]
    pub default_ttl_secs: Option<u64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FilesystemSection {
    pub directory_mode: DirectoryMode,
    pub marker_suffix: String,
    pub cas_max_retries: u32,
    pub scan_limit: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    pub level: String,
    pub format: String,
}

impl Default for CacheFsConfig {
    fn default() -> Self {
        Self {
            kv_store: KVStoreConfig {
                max_memory_mb: 512,
                ttl_cleanup_interval_ms: 100,
                default_ttl_secs: None,
            },
            filesystem: FilesystemSection {
                directory_mode: DirectoryMode::Flat,
                marker_suffix: DEFAULT_MARKER_SUFFIX.to_string(),
                cas_max_retries: 16,
                scan_limit: 100_000,
            },
            logging: LoggingConfig {
                level: "info".to_string(),
                format: "json".to_string(),
            },
        }
    }
}

impl CacheFsConfig {
    /// Load configuration from YAML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> anyhow::Result<Self> {
        let content = fs::read_to_string(path)?;
        let config: CacheFsConfig = serde_yaml::from_str(&content)?;
        Ok(config)
    }

    /// Convert to KVConfig
    pub fn to_kv_config(&self) -> KVConfig {
        KVConfig {
            max_memory_mb: self.kv_store.max_memory_mb,
            ttl_cleanup_interval_ms: self.kv_store.ttl_cleanup_interval_ms,
            default_ttl_secs: self.kv_store.default_ttl_secs,
        }
    }

    /// Convert to FilesystemConfig
    pub fn to_fs_config(&self) -> FilesystemConfig {
        FilesystemConfig {
            directory_mode: self.filesystem.directory_mode,
            marker_suffix: self.filesystem.marker_suffix.clone(),
            cas_max_retries: self.filesystem.cas_max_retries,
            scan_limit: self.filesystem.scan_limit,
        }
    }
}
