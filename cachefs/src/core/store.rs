//! Key-value store seam.
//!
//! [`KeyValueStore`] is the only surface the filesystem adapter talks to.
//! The three plain verbs (`get`, `set`, `delete_multi`) are what any cache
//! client offers; `gets`/`cas`/`add`/`delete_if` are the versioned
//! primitives used to make read-modify-write sequences safe, and
//! `scan_prefix` backs directory enumeration.

use async_trait::async_trait;

use super::error::Result;
use super::types::CasToken;

#[async_trait]
pub trait KeyValueStore: Send + Sync {
    /// Get a value. `None` if the key is absent or expired.
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>>;

    /// Store a value unconditionally.
    async fn set(&self, key: &str, value: Vec<u8>) -> Result<bool>;

    /// Remove every listed key in one call.
    ///
    /// Returns true only if every key was present.
    async fn delete_multi(&self, keys: &[String]) -> Result<bool>;

    /// Get a value together with its current CAS token.
    async fn gets(&self, key: &str) -> Result<Option<(Vec<u8>, CasToken)>>;

    /// Store `value` only if the key still carries `token`.
    ///
    /// Returns false when the key was modified or removed in between.
    async fn cas(&self, key: &str, value: Vec<u8>, token: CasToken) -> Result<bool>;

    /// Remove the key only if it still carries `token`.
    async fn delete_if(&self, key: &str, token: CasToken) -> Result<bool>;

    /// Store `value` only if the key is absent.
    async fn add(&self, key: &str, value: Vec<u8>) -> Result<bool>;

    /// List live keys starting with `prefix` and ending with `suffix`,
    /// at most `limit` of them. An empty `suffix` matches every key.
    async fn scan_prefix(&self, prefix: &str, suffix: &str, limit: usize) -> Result<Vec<String>>;
}
