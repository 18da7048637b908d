use super::{CacheError, CacheResult};
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::time::Duration;
use tokio::sync::RwLock;

/// Cache entry with absolute expiry.
#[derive(Clone, Debug)]
struct CacheEntry {
    data: String,
    expires_at: DateTime<Utc>,
}

impl CacheEntry {
    fn new(data: String, ttl: Duration) -> Self {
        let expires_at = Utc::now()
            + chrono::Duration::from_std(ttl).unwrap_or_else(|_| chrono::Duration::seconds(0));
        Self { data, expires_at }
    }

    fn is_expired(&self) -> bool {
        Utc::now() >= self.expires_at
    }
}

/// In-memory TTL cache. Entries are visible until their expiry and lazily
/// purged: a read that discovers an expired entry removes it, and every
/// write sweeps out whatever has expired since the last one. Keys that are
/// never read or written again still cannot pile up past one TTL window.
/// There is no background task and no capacity bound.
#[derive(Default)]
pub struct MemoryCache {
    store: RwLock<HashMap<String, CacheEntry>>,
}

impl MemoryCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Absent if never set or at/past expiry.
    pub async fn get<T>(&self, key: &str) -> CacheResult<Option<T>>
    where
        T: serde::de::DeserializeOwned,
    {
        let store = self.store.read().await;

        match store.get(key) {
            Some(entry) if entry.is_expired() => {
                drop(store);
                // Lazy eviction: delete the entry this access discovered.
                let mut store = self.store.write().await;
                if store.get(key).is_some_and(|e| e.is_expired()) {
                    store.remove(key);
                }
                Ok(None)
            }
            Some(entry) => {
                let value = serde_json::from_str(&entry.data)
                    .map_err(|e| CacheError::Serialization(e.to_string()))?;
                Ok(Some(value))
            }
            None => Ok(None),
        }
    }

    /// Overwrites any existing entry unconditionally, and sweeps expired
    /// entries while the write lock is held.
    pub async fn set<T>(&self, key: &str, value: &T, ttl: Duration) -> CacheResult<()>
    where
        T: serde::Serialize,
    {
        let data =
            serde_json::to_string(value).map_err(|e| CacheError::Serialization(e.to_string()))?;
        let entry = CacheEntry::new(data, ttl);

        let mut store = self.store.write().await;
        store.retain(|_, existing| !existing.is_expired());
        store.insert(key.to_string(), entry);
        Ok(())
    }

    pub async fn delete(&self, key: &str) {
        let mut store = self.store.write().await;
        store.remove(key);
    }

    pub async fn clear(&self) {
        let mut store = self.store.write().await;
        store.clear();
    }

    /// Number of resident entries, expired or not. For health reporting.
    pub async fn len(&self) -> usize {
        self.store.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.store.read().await.is_empty()
    }
}
