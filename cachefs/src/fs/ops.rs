//! Filesystem operations trait.
//!
//! The shape follows a generic application-level filesystem abstraction:
//! whole-file reads and writes addressed by path, modification times,
//! and a handful of directory verbs. Where that abstraction has optional
//! parameters, callers pass the documented default explicitly.

use async_trait::async_trait;

use super::error::FsResult;

#[async_trait]
pub trait Filesystem: Send + Sync {
    // ========================================================================
    // Files
    // ========================================================================

    /// Determine if a file exists.
    async fn exists(&self, path: &str) -> FsResult<bool>;

    /// Get the contents of a file.
    ///
    /// Fails with `NotFound` when nothing (or an empty value) is stored.
    async fn get(&self, path: &str) -> FsResult<Vec<u8>>;

    /// Write the contents of a file, replacing whatever was there.
    async fn put(&self, path: &str, contents: &[u8]) -> FsResult<bool>;

    /// Append to a file, creating it if needed.
    async fn append(&self, path: &str, data: &[u8]) -> FsResult<bool>;

    /// Get or set the UNIX mode of a file. Default `mode`: `None`.
    async fn chmod(&self, path: &str, mode: Option<u32>) -> FsResult<bool>;

    /// Delete one or more files.
    async fn delete(&self, paths: &[&str]) -> FsResult<bool>;

    /// Move a file to a new location.
    async fn move_file(&self, path: &str, target: &str) -> FsResult<bool>;

    /// Copy a file to a new location.
    async fn copy(&self, path: &str, target: &str) -> FsResult<bool>;

    /// Create a link at `link` to the file at `target`.
    async fn link(&self, target: &str, link: &str) -> FsResult<()>;

    /// Last modification time as unix seconds, 0 when unknown.
    async fn last_modified(&self, path: &str) -> FsResult<u64>;

    // ========================================================================
    // Directories
    // ========================================================================

    /// Create a directory.
    ///
    /// Defaults: `mode = 0o755`, `recursive = false`, `force = false`.
    async fn make_directory(
        &self,
        path: &str,
        mode: u32,
        recursive: bool,
        force: bool,
    ) -> FsResult<bool>;

    /// Move a directory. Default `overwrite`: false.
    async fn move_directory(&self, from: &str, to: &str, overwrite: bool) -> FsResult<bool>;

    /// Copy a directory from one location to another.
    async fn copy_directory(&self, directory: &str, destination: &str) -> FsResult<bool>;

    /// Recursively delete a directory. Default `preserve`: false.
    async fn delete_directory(&self, directory: &str, preserve: bool) -> FsResult<bool>;

    /// Remove all of the directories within a given directory.
    async fn delete_directories(&self, directory: &str) -> FsResult<bool>;

    /// Empty the specified directory of all files and folders.
    async fn clean_directory(&self, directory: &str) -> FsResult<bool>;

    /// Determine if the given path is a directory.
    async fn is_directory(&self, directory: &str) -> FsResult<bool>;

    /// Files directly inside `directory`.
    async fn files(&self, directory: &str) -> FsResult<Vec<String>>;

    /// Files inside `directory` and all of its subdirectories.
    async fn all_files(&self, directory: &str) -> FsResult<Vec<String>>;

    /// Immediate subdirectories of `directory`.
    async fn directories(&self, directory: &str) -> FsResult<Vec<String>>;

    // ========================================================================
    // Convenience methods (default implementations)
    // ========================================================================

    /// Determine if a file is missing.
    async fn missing(&self, path: &str) -> FsResult<bool> {
        Ok(!self.exists(path).await?)
    }

    /// Determine if the given path is a file.
    async fn is_file(&self, path: &str) -> FsResult<bool> {
        self.exists(path).await
    }

    /// Size of a file in bytes.
    async fn size(&self, path: &str) -> FsResult<u64> {
        Ok(self.get(path).await?.len() as u64)
    }

    /// Prepend to a file, creating it if needed.
    async fn prepend(&self, path: &str, data: &[u8]) -> FsResult<bool> {
        if self.exists(path).await? {
            let mut contents = data.to_vec();
            contents.extend_from_slice(&self.get(path).await?);
            return self.put(path, &contents).await;
        }
        self.put(path, data).await
    }
}
