pub mod error;
pub mod kv_store;
pub mod store;
pub mod types;

pub use error::StoreError;
pub use kv_store::MemoryStore;
pub use store::KeyValueStore;
pub use types::{CasToken, KVConfig, KVStats, StoredValue};
