use thiserror::Error;

/// Errors raised by a key-value store backend
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Memory limit exceeded")]
    MemoryLimitExceeded,

    #[error("Store unavailable: {0}")]
    Unavailable(String),
}

/// Result type alias for store operations
pub type Result<T> = std::result::Result<T, StoreError>;
