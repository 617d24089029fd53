//! Filesystem adapter error types.

use std::io;
use thiserror::Error;

use crate::core::StoreError;

/// Filesystem adapter error type.
#[derive(Debug, Error)]
pub enum CacheFsError {
    /// No value stored under the key, or the stored value is empty.
    #[error("File does not exist at path {0}")]
    NotFound(String),

    /// Error reported by the backing store, passed through untouched.
    #[error(transparent)]
    Store(#[from] StoreError),

    /// Optimistic write kept losing to concurrent writers.
    #[error("concurrent modification of {0}, retries exhausted")]
    CasConflict(String),

    /// Key that cannot name an entry.
    #[error("invalid path: {0}")]
    InvalidPath(String),

    /// Directory holds more entries than one scan may return.
    #[error("directory {directory} has more than {limit} entries")]
    ScanLimitExceeded { directory: String, limit: usize },
}

impl CacheFsError {
    /// Create a NotFound error.
    pub fn not_found(path: impl Into<String>) -> Self {
        Self::NotFound(path.into())
    }

    /// Create an InvalidPath error.
    pub fn invalid_path(path: impl Into<String>) -> Self {
        Self::InvalidPath(path.into())
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound(_))
    }
}

/// Convert CacheFsError to std::io::Error for callers that speak io.
impl From<CacheFsError> for io::Error {
    fn from(e: CacheFsError) -> Self {
        match e {
            CacheFsError::NotFound(msg) => io::Error::new(io::ErrorKind::NotFound, msg),
            CacheFsError::InvalidPath(msg) => io::Error::new(io::ErrorKind::InvalidInput, msg),
            CacheFsError::CasConflict(msg) => io::Error::new(io::ErrorKind::WouldBlock, msg),
            e @ CacheFsError::ScanLimitExceeded { .. } => io::Error::other(e),
            CacheFsError::Store(StoreError::MemoryLimitExceeded) => {
                io::Error::new(io::ErrorKind::StorageFull, "memory limit exceeded")
            }
            CacheFsError::Store(e) => io::Error::other(e),
        }
    }
}

/// Filesystem result type.
pub type FsResult<T> = Result<T, CacheFsError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_not_found_message() {
        let err = CacheFsError::not_found("views/home.php");
        assert_eq!(err.to_string(), "File does not exist at path views/home.php");
        assert!(err.is_not_found());
    }

    #[test]
    fn test_store_error_is_transparent() {
        let err: CacheFsError = StoreError::Unavailable("connection refused".into()).into();
        assert_eq!(err.to_string(), "Store unavailable: connection refused");
        assert!(!err.is_not_found());
    }

    #[test]
    fn test_io_conversion() {
        let io_err: io::Error = CacheFsError::not_found("a").into();
        assert_eq!(io_err.kind(), io::ErrorKind::NotFound);

        let io_err: io::Error = CacheFsError::Store(StoreError::MemoryLimitExceeded).into();
        assert_eq!(io_err.kind(), io::ErrorKind::StorageFull);

        let io_err: io::Error = CacheFsError::ScanLimitExceeded {
            directory: "views".into(),
            limit: 10,
        }
        .into();
        assert_eq!(io_err.to_string(), "directory views has more than 10 entries");
    }
}
