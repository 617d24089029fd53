use super::error::{Result, StoreError};
use super::store::KeyValueStore;
use super::types::{CasToken, KVConfig, KVStats, StoredValue};
use async_trait::async_trait;
use parking_lot::RwLock;
use radix_trie::{Trie, TrieCommon};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tracing::{debug, info, warn};

/// Embedded key-value cache using a radix trie for memory-efficient storage
/// and cheap prefix enumeration
#[derive(Clone)]
pub struct MemoryStore {
    data: Arc<RwLock<Trie<String, StoredValue>>>,
    stats: Arc<RwLock<KVStats>>,
    next_version: Arc<AtomicU64>,
    config: KVConfig,
}

impl MemoryStore {
    /// Create a new store with the given configuration
    pub fn new(config: KVConfig) -> Self {
        info!(
            "Initializing memory store with max_memory={}MB, default_ttl={:?}",
            config.max_memory_mb, config.default_ttl_secs
        );

        Self {
            data: Arc::new(RwLock::new(Trie::new())),
            stats: Arc::new(RwLock::new(KVStats::default())),
            next_version: Arc::new(AtomicU64::new(0)),
            config,
        }
    }

    /// Start background TTL cleanup task
    pub fn start_ttl_cleanup(&self) -> tokio::task::JoinHandle<()> {
        // tokio rejects a zero period
        let interval_ms = self.config.ttl_cleanup_interval_ms.max(1);
        info!("Starting TTL cleanup task (interval={}ms)", interval_ms);

        let store = self.clone();
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(Duration::from_millis(interval_ms));

            loop {
                interval.tick().await;
                store.cleanup_expired();
            }
        })
    }

    /// Set a value with an explicit TTL, overriding `default_ttl_secs`
    pub fn set_with_ttl(&self, key: &str, value: Vec<u8>, ttl_secs: Option<u64>) -> Result<()> {
        debug!("SET key={}, size={}, ttl={:?}", key, value.len(), ttl_secs);

        let mut data = self.data.write();
        self.insert_locked(&mut data, key, value, ttl_secs)?;
        Ok(())
    }

    /// Check if a live key exists
    pub fn contains_key(&self, key: &str) -> bool {
        let data = self.data.read();
        data.get(key).is_some_and(|value| !value.is_expired())
    }

    /// Get remaining TTL for a key, `None` when the key has no expiry or is absent
    pub fn ttl(&self, key: &str) -> Option<u64> {
        let data = self.data.read();
        data.get(key).and_then(|value| value.remaining_ttl_secs())
    }

    /// Get statistics
    pub fn stats(&self) -> KVStats {
        self.stats.read().clone()
    }

    /// Clean up expired keys
    pub fn cleanup_expired(&self) -> usize {
        let mut data = self.data.write();

        let expired_keys: Vec<String> = data
            .iter()
            .filter(|(_, v)| v.is_expired())
            .map(|(k, _)| k.clone())
            .collect();

        let count = expired_keys.len();
        if count > 0 {
            debug!("Cleaning up {} expired keys", count);
            let mut stats = self.stats.write();
            for key in expired_keys {
                Self::remove_locked(&mut data, &mut stats, &key);
            }
        }
        count
    }

    fn insert_locked(
        &self,
        data: &mut Trie<String, StoredValue>,
        key: &str,
        value: Vec<u8>,
        ttl_secs: Option<u64>,
    ) -> Result<CasToken> {
        let version = self.next_version.fetch_add(1, Ordering::Relaxed) + 1;
        let stored = StoredValue::new(value, ttl_secs, version);
        let token = stored.token();
        let entry_size = Self::estimate_entry_size(key, &stored);
        let previous_size = data
            .get(key)
            .map(|previous| Self::estimate_entry_size(key, previous))
            .unwrap_or(0);

        let mut stats = self.stats.write();

        // Check memory limits
        let max_bytes = self.config.max_memory_mb.saturating_mul(1024 * 1024);
        let projected = stats.total_memory_bytes.saturating_sub(previous_size) + entry_size;
        if projected > max_bytes {
            warn!(
                "Memory limit exceeded: {}/{}",
                stats.total_memory_bytes, max_bytes
            );
            return Err(StoreError::MemoryLimitExceeded);
        }

        let is_new = data.insert(key.to_string(), stored).is_none();

        stats.sets += 1;
        stats.total_memory_bytes = projected;
        if is_new {
            stats.total_keys += 1;
        }

        Ok(token)
    }

    fn remove_locked(
        data: &mut Trie<String, StoredValue>,
        stats: &mut KVStats,
        key: &str,
    ) -> Option<StoredValue> {
        let removed = data.remove(key)?;
        stats.total_keys = stats.total_keys.saturating_sub(1);
        stats.total_memory_bytes = stats
            .total_memory_bytes
            .saturating_sub(Self::estimate_entry_size(key, &removed));
        Some(removed)
    }

    /// Look up a live value, dropping it on the spot if it has expired
    fn lookup_locked<'a>(
        data: &'a mut Trie<String, StoredValue>,
        stats: &mut KVStats,
        key: &str,
    ) -> Option<&'a mut StoredValue> {
        stats.gets += 1;

        let expired = match data.get(key) {
            Some(value) => value.is_expired(),
            None => {
                stats.misses += 1;
                return None;
            }
        };

        if expired {
            debug!("Key expired: {}", key);
            Self::remove_locked(data, stats, key);
            stats.misses += 1;
            return None;
        }

        stats.hits += 1;
        let value = data.get_mut(key)?;
        value.update_access();
        Some(value)
    }

    /// Estimate memory size of an entry
    fn estimate_entry_size(key: &str, value: &StoredValue) -> usize {
        key.len() + value.data.len() + std::mem::size_of::<StoredValue>()
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new(KVConfig::default())
    }
}

#[async_trait]
impl KeyValueStore for MemoryStore {
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>> {
        debug!("GET key={}", key);

        let mut data = self.data.write();
        let mut stats = self.stats.write();
        Ok(Self::lookup_locked(&mut data, &mut stats, key).map(|value| value.data.clone()))
    }

    async fn set(&self, key: &str, value: Vec<u8>) -> Result<bool> {
        self.set_with_ttl(key, value, self.config.default_ttl_secs)?;
        Ok(true)
    }

    async fn delete_multi(&self, keys: &[String]) -> Result<bool> {
        debug!("MDEL count={}", keys.len());

        let mut data = self.data.write();
        let mut stats = self.stats.write();

        let mut all_present = true;
        for key in keys {
            match Self::remove_locked(&mut data, &mut stats, key) {
                Some(removed) if !removed.is_expired() => stats.dels += 1,
                _ => all_present = false,
            }
        }

        Ok(all_present)
    }

    async fn gets(&self, key: &str) -> Result<Option<(Vec<u8>, CasToken)>> {
        debug!("GETS key={}", key);

        let mut data = self.data.write();
        let mut stats = self.stats.write();
        Ok(Self::lookup_locked(&mut data, &mut stats, key)
            .map(|value| (value.data.clone(), value.token())))
    }

    async fn cas(&self, key: &str, value: Vec<u8>, token: CasToken) -> Result<bool> {
        debug!("CAS key={}, size={}, token={:?}", key, value.len(), token);

        let mut data = self.data.write();
        let current = data
            .get(key)
            .filter(|stored| !stored.is_expired())
            .map(StoredValue::token);

        if current != Some(token) {
            self.stats.write().cas_misses += 1;
            return Ok(false);
        }

        self.insert_locked(&mut data, key, value, self.config.default_ttl_secs)?;
        self.stats.write().cas_hits += 1;
        Ok(true)
    }

    async fn delete_if(&self, key: &str, token: CasToken) -> Result<bool> {
        debug!("DELETE_IF key={}, token={:?}", key, token);

        let mut data = self.data.write();
        let mut stats = self.stats.write();
        let current = data
            .get(key)
            .filter(|stored| !stored.is_expired())
            .map(StoredValue::token);

        if current != Some(token) {
            stats.cas_misses += 1;
            return Ok(false);
        }

        Self::remove_locked(&mut data, &mut stats, key);
        stats.dels += 1;
        stats.cas_hits += 1;
        Ok(true)
    }

    async fn add(&self, key: &str, value: Vec<u8>) -> Result<bool> {
        debug!("ADD key={}, size={}", key, value.len());

        let mut data = self.data.write();
        if data.get(key).is_some_and(|stored| !stored.is_expired()) {
            return Ok(false);
        }

        self.insert_locked(&mut data, key, value, self.config.default_ttl_secs)?;
        Ok(true)
    }

    async fn scan_prefix(&self, prefix: &str, suffix: &str, limit: usize) -> Result<Vec<String>> {
        debug!("SCAN prefix={}, suffix={}, limit={}", prefix, suffix, limit);

        let data = self.data.read();
        let live = |(k, v): (&String, &StoredValue)| {
            (!v.is_expired() && k.starts_with(prefix) && k.ends_with(suffix)).then(|| k.clone())
        };

        let keys: Vec<String> = if prefix.is_empty() {
            data.iter().filter_map(live).take(limit).collect()
        } else {
            data.get_raw_descendant(prefix)
                .map(|subtrie| subtrie.iter().filter_map(live).take(limit).collect())
                .unwrap_or_default()
        };

        Ok(keys)
    }
}
