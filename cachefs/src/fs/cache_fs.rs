use async_trait::async_trait;
use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};
use tracing::{debug, info, warn};

use super::error::{CacheFsError, FsResult};
use super::ops::Filesystem;
use super::path;
use super::types::{DEFAULT_MARKER_SUFFIX, DirectoryMode, FilesystemConfig};
use crate::core::KeyValueStore;

/// Filesystem view over a key-value cache.
///
/// Each entry occupies two keys: the value itself and a modification
/// marker (`<key>::lastModified`) holding the unix time of the last write.
/// The marker alone decides whether an entry exists.
///
/// `append`, `prepend` and `move_file` are read-modify-write sequences and
/// go through the store's CAS primitives, so concurrent writers on the same
/// key do not lose updates. `copy` and `link` write a snapshot of the source.
#[derive(Clone)]
pub struct CacheFilesystem {
    store: Arc<dyn KeyValueStore>,
    config: FilesystemConfig,
}

impl CacheFilesystem {
    pub fn new(store: Arc<dyn KeyValueStore>, mut config: FilesystemConfig) -> Self {
        if config.marker_suffix.is_empty() {
            warn!(
                "Empty marker suffix would alias entries with their markers, using {}",
                DEFAULT_MARKER_SUFFIX
            );
            config.marker_suffix = DEFAULT_MARKER_SUFFIX.to_string();
        }

        info!(
            "Initializing cache filesystem with directory_mode={:?}, marker_suffix={}",
            config.directory_mode, config.marker_suffix
        );

        Self { store, config }
    }

    pub fn with_store(store: Arc<dyn KeyValueStore>) -> Self {
        Self::new(store, FilesystemConfig::default())
    }

    pub fn store(&self) -> &Arc<dyn KeyValueStore> {
        &self.store
    }

    pub fn config(&self) -> &FilesystemConfig {
        &self.config
    }

    fn hierarchical(&self) -> bool {
        self.config.directory_mode == DirectoryMode::Hierarchical
    }

    fn marker(&self, path: &str) -> String {
        path::marker_key(path, &self.config.marker_suffix)
    }

    /// Keys that can never name an entry: the empty key and marker keys
    fn is_reserved(&self, path: &str) -> bool {
        path.is_empty() || path.ends_with(&self.config.marker_suffix)
    }

    /// Write paths reject reserved keys; reads report them as NotFound.
    fn validate(&self, path: &str) -> FsResult<()> {
        if self.is_reserved(path) {
            return Err(CacheFsError::invalid_path(path));
        }
        Ok(())
    }

    /// Record "modified now" for `path`
    async fn touch(&self, path: &str) -> FsResult<()> {
        let now = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs())
            .unwrap_or_default();
        self.store
            .set(&self.marker(path), now.to_string().into_bytes())
            .await?;
        Ok(())
    }

    /// Store `contents` under `path`, marker first.
    ///
    /// If the value write fails, a marker created by this call is removed
    /// again so the entry does not appear to exist.
    async fn write_entry(&self, path: &str, contents: Vec<u8>) -> FsResult<bool> {
        let created = !self.exists(path).await?;
        self.touch(path).await?;

        let result = self.store.set(path, contents).await;
        if created && !matches!(result, Ok(true)) {
            if let Err(e) = self.store.delete_multi(&[self.marker(path)]).await {
                warn!("Failed to roll back marker for {}: {}", path, e);
            }
        }
        Ok(result?)
    }

    /// Read-modify-write `path` until the CAS lands.
    ///
    /// `build` receives the current value, or `None` when the entry does not
    /// exist. A value stored without a marker is not an entry and gets
    /// replaced. Writers mark before they store, so the value is read before
    /// the marker.
    async fn update<F>(&self, path: &str, build: F) -> FsResult<bool>
    where
        F: Fn(Option<&[u8]>) -> Vec<u8> + Send + Sync,
    {
        let attempts = self.config.cas_max_retries.max(1);
        for attempt in 1..=attempts {
            let current = self.store.gets(path).await?;
            let marked = self.exists(path).await?;
            self.touch(path).await?;

            let written = match current {
                Some((existing, token)) => {
                    let base = marked.then_some(existing.as_slice());
                    self.store.cas(path, build(base), token).await?
                }
                None => self.store.add(path, build(None)).await?,
            };

            if written {
                return Ok(true);
            }
            debug!("CAS lost key={}, attempt={}/{}", path, attempt, attempts);
        }

        warn!("Giving up on {} after {} CAS attempts", path, attempts);
        Err(CacheFsError::CasConflict(path.to_string()))
    }

    async fn remove_entries(&self, paths: &[String]) -> FsResult<bool> {
        let mut keys = Vec::with_capacity(paths.len() * 2);
        for path in paths {
            keys.push(path.clone());
            keys.push(self.marker(path));
        }
        Ok(self.store.delete_multi(&keys).await?)
    }

    /// Every entry below `directory`, found through its marker.
    ///
    /// Fails instead of returning a partial listing when the directory holds
    /// more than `scan_limit` entries.
    async fn entries_under(&self, directory: &str) -> FsResult<Vec<String>> {
        let prefix = path::directory_prefix(directory);
        let suffix = &self.config.marker_suffix;
        let limit = self.config.scan_limit;

        let markers = self
            .store
            .scan_prefix(&prefix, suffix, limit.saturating_add(1))
            .await?;
        if markers.len() > limit {
            warn!("Directory {} exceeds scan limit {}", directory, limit);
            return Err(CacheFsError::ScanLimitExceeded {
                directory: directory.to_string(),
                limit,
            });
        }

        let entries: BTreeSet<String> = markers
            .iter()
            .filter_map(|key| path::entry_for_marker(key, suffix))
            .filter(|entry| entry.len() > prefix.len())
            .map(str::to_string)
            .collect();

        Ok(entries.into_iter().collect())
    }

    /// Move or copy every entry under `from` to the same relative path
    /// under `to`. Returns false if any entry vanished mid-way.
    async fn transfer_tree(
        &self,
        entries: &[String],
        from: &str,
        to: &str,
        remove: bool,
    ) -> FsResult<bool> {
        let from_prefix = path::directory_prefix(from);
        let to_prefix = path::directory_prefix(to);

        let mut complete = true;
        for entry in entries {
            let relative = &entry[from_prefix.len()..];
            let target = format!("{to_prefix}{relative}");
            let result = if remove {
                self.move_file(entry, &target).await
            } else {
                self.copy(entry, &target).await
            };

            match result {
                Ok(_) => {}
                Err(CacheFsError::NotFound(missing)) => {
                    warn!("Entry {} disappeared during directory transfer", missing);
                    complete = false;
                }
                Err(e) => return Err(e),
            }
        }
        Ok(complete)
    }
}

#[async_trait]
impl Filesystem for CacheFilesystem {
    async fn exists(&self, path: &str) -> FsResult<bool> {
        let marker = self.store.get(&self.marker(path)).await?;
        Ok(marker.is_some_and(|m| !m.is_empty()))
    }

    async fn get(&self, path: &str) -> FsResult<Vec<u8>> {
        debug!("GET path={}", path);
        if self.is_reserved(path) {
            return Err(CacheFsError::not_found(path));
        }

        match self.store.get(path).await? {
            Some(data) if !data.is_empty() => Ok(data),
            _ => Err(CacheFsError::not_found(path)),
        }
    }

    async fn put(&self, path: &str, contents: &[u8]) -> FsResult<bool> {
        debug!("PUT path={}, size={}", path, contents.len());
        self.validate(path)?;
        self.write_entry(path, contents.to_vec()).await
    }

    async fn append(&self, path: &str, data: &[u8]) -> FsResult<bool> {
        debug!("APPEND path={}, size={}", path, data.len());
        self.validate(path)?;

        self.update(path, |current| match current {
            Some(existing) => [existing, data].concat(),
            None => data.to_vec(),
        })
        .await
    }

    async fn prepend(&self, path: &str, data: &[u8]) -> FsResult<bool> {
        debug!("PREPEND path={}, size={}", path, data.len());
        self.validate(path)?;

        self.update(path, |current| match current {
            Some(existing) => [data, existing].concat(),
            None => data.to_vec(),
        })
        .await
    }

    async fn chmod(&self, path: &str, mode: Option<u32>) -> FsResult<bool> {
        debug!("CHMOD path={}, mode={:?} (ignored)", path, mode);
        Ok(true)
    }

    async fn delete(&self, paths: &[&str]) -> FsResult<bool> {
        debug!("DELETE count={}", paths.len());

        let paths: Vec<String> = paths.iter().map(|p| p.to_string()).collect();
        self.remove_entries(&paths).await
    }

    async fn move_file(&self, path: &str, target: &str) -> FsResult<bool> {
        debug!("MOVE from={}, to={}", path, target);
        if self.is_reserved(path) {
            return Err(CacheFsError::not_found(path));
        }
        self.validate(target)?;

        if path == target {
            self.get(path).await?;
            return Ok(true);
        }

        let marker = self.marker(path);
        let attempts = self.config.cas_max_retries.max(1);
        for attempt in 1..=attempts {
            let (contents, token) = match self.store.gets(path).await? {
                Some((contents, token)) if !contents.is_empty() => (contents, token),
                _ => return Err(CacheFsError::not_found(path)),
            };
            let marker_token = self.store.gets(&marker).await?.map(|(_, token)| token);

            self.write_entry(target, contents).await?;

            // Only drop the source if nobody rewrote it since it was copied
            if self.store.delete_if(path, token).await? {
                // A writer that recreated the source has re-marked it
                if let Some(marker_token) = marker_token {
                    self.store.delete_if(&marker, marker_token).await?;
                }
                return Ok(true);
            }
            debug!(
                "Source changed during move key={}, attempt={}/{}",
                path, attempt, attempts
            );
        }

        warn!("Giving up moving {} after {} attempts", path, attempts);
        Err(CacheFsError::CasConflict(path.to_string()))
    }

    async fn copy(&self, path: &str, target: &str) -> FsResult<bool> {
        debug!("COPY from={}, to={}", path, target);
        self.validate(target)?;

        let contents = self.get(path).await?;
        self.write_entry(target, contents).await
    }

    async fn link(&self, target: &str, link: &str) -> FsResult<()> {
        debug!("LINK target={}, link={}", target, link);
        self.copy(target, link).await?;
        Ok(())
    }

    async fn last_modified(&self, path: &str) -> FsResult<u64> {
        let marker = self.store.get(&self.marker(path)).await?;
        Ok(marker
            .and_then(|m| String::from_utf8(m).ok())
            .and_then(|m| m.trim().parse::<u64>().ok())
            .unwrap_or(0))
    }

    async fn make_directory(
        &self,
        path: &str,
        mode: u32,
        recursive: bool,
        force: bool,
    ) -> FsResult<bool> {
        debug!(
            "MKDIR path={}, mode={:o}, recursive={}, force={}",
            path, mode, recursive, force
        );
        // Directories are implicit in both modes
        Ok(true)
    }

    async fn move_directory(&self, from: &str, to: &str, overwrite: bool) -> FsResult<bool> {
        debug!("MVDIR from={}, to={}, overwrite={}", from, to, overwrite);
        if !self.hierarchical() {
            return Ok(true);
        }

        let entries = self.entries_under(from).await?;
        if entries.is_empty() {
            return Ok(false);
        }

        let from_prefix = path::directory_prefix(from);
        let to_prefix = path::directory_prefix(to);
        if from_prefix == to_prefix {
            return Ok(true);
        }
        if to_prefix.starts_with(&from_prefix) || from_prefix.starts_with(&to_prefix) {
            warn!("Refusing to move directory {} into nested {}", from, to);
            return Ok(false);
        }

        if !self.entries_under(to).await?.is_empty() {
            if !overwrite {
                return Ok(false);
            }
            self.delete_directory(to, false).await?;
        }

        self.transfer_tree(&entries, from, to, true).await
    }

    async fn copy_directory(&self, directory: &str, destination: &str) -> FsResult<bool> {
        debug!("CPDIR from={}, to={}", directory, destination);
        if !self.hierarchical() {
            return Ok(true);
        }

        let entries = self.entries_under(directory).await?;
        if entries.is_empty() {
            return Ok(false);
        }

        self.transfer_tree(&entries, directory, destination, false).await
    }

    async fn delete_directory(&self, directory: &str, preserve: bool) -> FsResult<bool> {
        debug!("RMDIR path={}, preserve={}", directory, preserve);
        if !self.hierarchical() {
            return Ok(true);
        }

        let entries = self.entries_under(directory).await?;
        if entries.is_empty() {
            return Ok(false);
        }

        self.remove_entries(&entries).await?;
        Ok(true)
    }

    async fn delete_directories(&self, directory: &str) -> FsResult<bool> {
        debug!("RMDIRS path={}", directory);
        if !self.hierarchical() {
            return Ok(true);
        }

        let subdirectories = self.directories(directory).await?;
        for subdirectory in &subdirectories {
            self.delete_directory(subdirectory, false).await?;
        }
        Ok(!subdirectories.is_empty())
    }

    async fn clean_directory(&self, directory: &str) -> FsResult<bool> {
        debug!("CLEAN path={}", directory);
        self.delete_directory(directory, true).await?;
        Ok(true)
    }

    async fn is_directory(&self, directory: &str) -> FsResult<bool> {
        let prefix = path::directory_prefix(directory);
        if !self.hierarchical() || prefix.is_empty() || prefix == "/" {
            return Ok(true);
        }
        Ok(!self.entries_under(directory).await?.is_empty())
    }

    async fn files(&self, directory: &str) -> FsResult<Vec<String>> {
        if !self.hierarchical() {
            return Ok(Vec::new());
        }

        let prefix_len = path::directory_prefix(directory).len();
        Ok(self
            .entries_under(directory)
            .await?
            .into_iter()
            .filter(|entry| path::first_segment(&entry[prefix_len..]).is_none())
            .collect())
    }

    async fn all_files(&self, directory: &str) -> FsResult<Vec<String>> {
        if !self.hierarchical() {
            return Ok(Vec::new());
        }
        self.entries_under(directory).await
    }

    async fn directories(&self, directory: &str) -> FsResult<Vec<String>> {
        if !self.hierarchical() {
            return Ok(Vec::new());
        }

        let prefix = path::directory_prefix(directory);
        let subdirectories: BTreeSet<String> = self
            .entries_under(directory)
            .await?
            .iter()
            .filter_map(|entry| path::first_segment(&entry[prefix.len()..]))
            .filter(|segment| !segment.is_empty())
            .map(|segment| format!("{prefix}{segment}"))
            .collect();

        Ok(subdirectories.into_iter().collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{CasToken, MemoryStore, StoreError};
    use std::sync::atomic::{AtomicBool, Ordering};

    fn flat_fs() -> CacheFilesystem {
        CacheFilesystem::with_store(Arc::new(MemoryStore::default()))
    }

    /// Store whose writes always fail, to check errors pass through untouched
    struct BrokenStore;

    #[async_trait]
    impl KeyValueStore for BrokenStore {
        async fn get(&self, _key: &str) -> crate::core::error::Result<Option<Vec<u8>>> {
            Ok(None)
        }

        async fn set(&self, _key: &str, _value: Vec<u8>) -> crate::core::error::Result<bool> {
            Err(StoreError::Unavailable("connection refused".into()))
        }

        async fn delete_multi(&self, _keys: &[String]) -> crate::core::error::Result<bool> {
            Err(StoreError::Unavailable("connection refused".into()))
        }

        async fn gets(
            &self,
            _key: &str,
        ) -> crate::core::error::Result<Option<(Vec<u8>, CasToken)>> {
            Ok(None)
        }

        async fn cas(
            &self,
            _key: &str,
            _value: Vec<u8>,
            _token: CasToken,
        ) -> crate::core::error::Result<bool> {
            Ok(false)
        }

        async fn delete_if(
            &self,
            _key: &str,
            _token: CasToken,
        ) -> crate::core::error::Result<bool> {
            Ok(false)
        }

        async fn add(&self, _key: &str, _value: Vec<u8>) -> crate::core::error::Result<bool> {
            Ok(false)
        }

        async fn scan_prefix(
            &self,
            _prefix: &str,
            _suffix: &str,
            _limit: usize,
        ) -> crate::core::error::Result<Vec<String>> {
            Ok(Vec::new())
        }
    }

    /// MemoryStore that can refuse value writes or lose every CAS race
    #[derive(Default)]
    struct FlakyStore {
        inner: MemoryStore,
        reject_values: AtomicBool,
        lose_races: bool,
    }

    #[async_trait]
    impl KeyValueStore for FlakyStore {
        async fn get(&self, key: &str) -> crate::core::error::Result<Option<Vec<u8>>> {
            self.inner.get(key).await
        }

        async fn set(&self, key: &str, value: Vec<u8>) -> crate::core::error::Result<bool> {
            if self.reject_values.load(Ordering::SeqCst) && !key.ends_with(DEFAULT_MARKER_SUFFIX)
            {
                return Err(StoreError::MemoryLimitExceeded);
            }
            self.inner.set(key, value).await
        }

        async fn delete_multi(&self, keys: &[String]) -> crate::core::error::Result<bool> {
            self.inner.delete_multi(keys).await
        }

        async fn gets(
            &self,
            key: &str,
        ) -> crate::core::error::Result<Option<(Vec<u8>, CasToken)>> {
            self.inner.gets(key).await
        }

        async fn cas(
            &self,
            key: &str,
            value: Vec<u8>,
            token: CasToken,
        ) -> crate::core::error::Result<bool> {
            if self.lose_races {
                return Ok(false);
            }
            self.inner.cas(key, value, token).await
        }

        async fn delete_if(
            &self,
            key: &str,
            token: CasToken,
        ) -> crate::core::error::Result<bool> {
            if self.lose_races {
                return Ok(false);
            }
            self.inner.delete_if(key, token).await
        }

        async fn add(&self, key: &str, value: Vec<u8>) -> crate::core::error::Result<bool> {
            if self.lose_races {
                return Ok(false);
            }
            self.inner.add(key, value).await
        }

        async fn scan_prefix(
            &self,
            prefix: &str,
            suffix: &str,
            limit: usize,
        ) -> crate::core::error::Result<Vec<String>> {
            self.inner.scan_prefix(prefix, suffix, limit).await
        }
    }

    #[tokio::test]
    async fn test_put_writes_marker() {
        let fs = flat_fs();

        fs.put("views/home.php", b"<html>").await.unwrap();

        let marker = fs
            .store()
            .get("views/home.php::lastModified")
            .await
            .unwrap()
            .unwrap();
        let stamp: u64 = String::from_utf8(marker).unwrap().parse().unwrap();
        assert!(stamp > 0);
    }

    #[tokio::test]
    async fn test_exists_only_consults_marker() {
        let fs = flat_fs();

        // Value without a marker is invisible to exists
        fs.store().set("orphan", b"data".to_vec()).await.unwrap();
        assert!(!fs.exists("orphan").await.unwrap());
        assert_eq!(fs.get("orphan").await.unwrap(), b"data".to_vec());

        // Marker without a value reports existence but reads as missing
        fs.store()
            .set("ghost::lastModified", b"1700000000".to_vec())
            .await
            .unwrap();
        assert!(fs.exists("ghost").await.unwrap());
        assert!(fs.get("ghost").await.unwrap_err().is_not_found());
    }

    #[tokio::test]
    async fn test_empty_value_reads_as_missing() {
        let fs = flat_fs();

        fs.put("empty", b"").await.unwrap();
        assert!(fs.exists("empty").await.unwrap());
        assert!(fs.get("empty").await.unwrap_err().is_not_found());
    }

    #[tokio::test]
    async fn test_invalid_paths_rejected() {
        let fs = flat_fs();

        let err = fs.put("", b"x").await.unwrap_err();
        assert!(matches!(err, CacheFsError::InvalidPath(_)));

        let err = fs.put("a::lastModified", b"x").await.unwrap_err();
        assert!(matches!(err, CacheFsError::InvalidPath(_)));

        let err = fs.append("", b"x").await.unwrap_err();
        assert!(matches!(err, CacheFsError::InvalidPath(_)));
    }

    #[tokio::test]
    async fn test_reading_reserved_keys_is_not_found() {
        let fs = flat_fs();
        fs.put("x", b"data").await.unwrap();

        assert!(fs.get("").await.unwrap_err().is_not_found());
        // The marker exists in the store but is not an entry
        assert!(fs.get("x::lastModified").await.unwrap_err().is_not_found());
        assert!(fs.copy("x::lastModified", "y").await.unwrap_err().is_not_found());
        assert!(fs.move_file("", "y").await.unwrap_err().is_not_found());
        assert!(!fs.exists("y").await.unwrap());
    }

    #[tokio::test]
    async fn test_append_replaces_unmarked_value() {
        let fs = flat_fs();

        fs.store().set("k", b"stale".to_vec()).await.unwrap();
        assert!(!fs.exists("k").await.unwrap());

        fs.append("k", b"new").await.unwrap();
        assert_eq!(fs.get("k").await.unwrap(), b"new".to_vec());
        assert!(fs.exists("k").await.unwrap());

        fs.store().set("p", b"stale".to_vec()).await.unwrap();
        fs.prepend("p", b"new").await.unwrap();
        assert_eq!(fs.get("p").await.unwrap(), b"new".to_vec());
    }

    #[tokio::test]
    async fn test_failed_value_write_leaves_no_marker() {
        let store = Arc::new(FlakyStore::default());
        store.reject_values.store(true, Ordering::SeqCst);
        let fs = CacheFilesystem::with_store(store.clone());

        let err = fs.put("a", b"hello").await.unwrap_err();
        assert!(matches!(
            err,
            CacheFsError::Store(StoreError::MemoryLimitExceeded)
        ));
        assert!(!fs.exists("a").await.unwrap());
        assert_eq!(fs.last_modified("a").await.unwrap(), 0);
        assert!(fs.get("a").await.unwrap_err().is_not_found());
    }

    #[tokio::test]
    async fn test_failed_overwrite_keeps_existing_entry() {
        let store = Arc::new(FlakyStore::default());
        let fs = CacheFilesystem::with_store(store.clone());
        fs.put("a", b"hello").await.unwrap();

        store.reject_values.store(true, Ordering::SeqCst);
        assert!(fs.put("a", b"world").await.is_err());

        assert!(fs.exists("a").await.unwrap());
        assert_eq!(fs.get("a").await.unwrap(), b"hello".to_vec());
    }

    #[tokio::test]
    async fn test_last_modified_ignores_garbage_marker() {
        let fs = flat_fs();

        fs.store()
            .set("x::lastModified", b"not a number".to_vec())
            .await
            .unwrap();
        assert_eq!(fs.last_modified("x").await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_empty_marker_suffix_falls_back_to_default() {
        let fs = CacheFilesystem::new(
            Arc::new(MemoryStore::default()),
            FilesystemConfig {
                marker_suffix: String::new(),
                ..Default::default()
            },
        );
        assert_eq!(fs.config().marker_suffix, DEFAULT_MARKER_SUFFIX);
    }

    #[tokio::test]
    async fn test_move_onto_itself_keeps_entry() {
        let fs = flat_fs();

        fs.put("a", b"hello").await.unwrap();
        assert!(fs.move_file("a", "a").await.unwrap());
        assert_eq!(fs.get("a").await.unwrap(), b"hello".to_vec());
    }

    #[tokio::test]
    async fn test_store_errors_propagate() {
        let fs = CacheFilesystem::with_store(Arc::new(BrokenStore));

        let err = fs.put("a", b"hello").await.unwrap_err();
        assert!(matches!(
            err,
            CacheFsError::Store(StoreError::Unavailable(_))
        ));

        let err = fs.delete(&["a"]).await.unwrap_err();
        assert!(matches!(
            err,
            CacheFsError::Store(StoreError::Unavailable(_))
        ));
    }

    #[tokio::test]
    async fn test_cas_exhaustion_reports_conflict() {
        // Every cas and add loses
        let fs = CacheFilesystem::new(
            Arc::new(FlakyStore {
                lose_races: true,
                ..Default::default()
            }),
            FilesystemConfig {
                cas_max_retries: 3,
                ..Default::default()
            },
        );

        let err = fs.append("log", b"line").await.unwrap_err();
        assert!(matches!(err, CacheFsError::CasConflict(key) if key == "log"));
    }

    #[tokio::test]
    async fn test_prepend() {
        let fs = flat_fs();

        fs.prepend("log", b"world").await.unwrap();
        fs.prepend("log", b"hello ").await.unwrap();
        assert_eq!(fs.get("log").await.unwrap(), b"hello world".to_vec());
        assert!(fs.exists("log").await.unwrap());
    }
}
