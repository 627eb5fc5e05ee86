//! Process-local TTL cache.
//!
//! The durable store is the sole source of truth; these caches are
//! disposable shortcuts. Clearing one at any time costs a recomputation,
//! never correctness. Entries are not shared or invalidated across process
//! instances.

use std::collections::HashMap;
use std::hash::Hash;

use chrono::{DateTime, Duration, Utc};
use tokio::sync::RwLock;

struct Entry<V> {
    value: V,
    stored_at: DateTime<Utc>,
}

/// Keyed cache whose entries lapse after a fixed TTL.
pub struct TtlCache<K, V> {
    ttl: Duration,
    entries: RwLock<HashMap<K, Entry<V>>>,
}

impl<K, V> TtlCache<K, V>
where
    K: Eq + Hash + Clone + Send + Sync,
    V: Clone + Send + Sync,
{
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            entries: RwLock::new(HashMap::new()),
        }
    }

    /// Fetch a fresh entry, if present.
    pub async fn get(&self, key: &K) -> Option<V> {
        self.get_at(key, Utc::now()).await
    }

    /// Fetch relative to an explicit clock (tests drive expiry this way).
    pub async fn get_at(&self, key: &K, now: DateTime<Utc>) -> Option<V> {
        let entries = self.entries.read().await;
        let entry = entries.get(key)?;
        if now.signed_duration_since(entry.stored_at) < self.ttl {
            Some(entry.value.clone())
        } else {
            None
        }
    }

    pub async fn set(&self, key: K, value: V) {
        self.set_at(key, value, Utc::now()).await;
    }

    pub async fn set_at(&self, key: K, value: V, now: DateTime<Utc>) {
        self.entries
            .write()
            .await
            .insert(key, Entry { value, stored_at: now });
    }

    /// Drop one entry.
    pub async fn invalidate(&self, key: &K) {
        self.entries.write().await.remove(key);
    }

    /// Drop everything.
    pub async fn clear(&self) {
        self.entries.write().await.clear();
    }

    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.entries.read().await.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn get_returns_fresh_entries() {
        let cache: TtlCache<String, u32> = TtlCache::new(Duration::hours(24));
        cache.set("k".to_string(), 7).await;
        assert_eq!(cache.get(&"k".to_string()).await, Some(7));
    }

    #[tokio::test]
    async fn entries_lapse_after_ttl() {
        let cache: TtlCache<String, u32> = TtlCache::new(Duration::hours(24));
        let stored = Utc::now();
        cache.set_at("k".to_string(), 7, stored).await;

        let just_before = stored + Duration::hours(23);
        assert_eq!(cache.get_at(&"k".to_string(), just_before).await, Some(7));

        let after = stored + Duration::hours(25);
        assert_eq!(cache.get_at(&"k".to_string(), after).await, None);
    }

    #[tokio::test]
    async fn invalidate_and_clear() {
        let cache: TtlCache<u32, u32> = TtlCache::new(Duration::hours(1));
        cache.set(1, 1).await;
        cache.set(2, 2).await;
        cache.invalidate(&1).await;
        assert_eq!(cache.get(&1).await, None);
        assert_eq!(cache.get(&2).await, Some(2));
        cache.clear().await;
        assert!(cache.is_empty().await);
    }
}
