//! In-process backend.
//!
//! Holds records in a map for the life of the process. The skin-cache variant
//! can expire keys itself, mirroring the Redis backend.

use super::{DataProvider, ProviderSet, StorageError};
use crate::clock::Clock;
use crate::skins::{SKIN_RETENTION, StalenessPolicy};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

struct Entry<V> {
    value: V,
    expires_at: Option<DateTime<Utc>>,
}

impl<V> Entry<V> {
    fn is_live(&self, now: DateTime<Utc>) -> bool {
        self.expires_at.is_none_or(|at| now < at)
    }
}

/// Map-backed provider with optional per-key expiry.
pub struct MemoryProvider<V> {
    entries: RwLock<HashMap<String, Entry<V>>>,
    ttl: Option<chrono::Duration>,
    clock: Arc<dyn Clock>,
}

impl<V> MemoryProvider<V> {
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
            ttl: None,
            clock,
        }
    }

    /// Expire every key `ttl` after its last write.
    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        self.ttl = chrono::Duration::from_std(ttl).ok();
        self
    }
}

#[async_trait]
impl<V: Clone + Send + Sync + 'static> DataProvider<V> for MemoryProvider<V> {
    fn name(&self) -> &str {
        "memory"
    }

    async fn get(&self, key: &str) -> Result<Option<V>, StorageError> {
        let now = self.clock.now();
        Ok(self
            .entries
            .read()
            .get(key)
            .filter(|entry| entry.is_live(now))
            .map(|entry| entry.value.clone()))
    }

    async fn put(&self, key: &str, value: V) -> Result<(), StorageError> {
        let expires_at = self
            .ttl
            .and_then(|ttl| self.clock.now().checked_add_signed(ttl));
        self.entries
            .write()
            .insert(key.to_string(), Entry { value, expires_at });
        Ok(())
    }

    async fn remove(&self, key: &str) -> Result<(), StorageError> {
        self.entries.write().remove(key);
        Ok(())
    }

    async fn keys(&self, pattern: Option<&str>) -> Result<Vec<String>, StorageError> {
        let now = self.clock.now();
        let mut entries = self.entries.write();
        entries.retain(|_, entry| entry.is_live(now));
        Ok(entries
            .keys()
            .filter(|key| pattern.is_none_or(|exact| key.as_str() == exact))
            .cloned()
            .collect())
    }
}

/// Providers for all record kinds.
///
/// With `native_ttl` the skin cache expires entries itself after
/// [`SKIN_RETENTION`]; otherwise the cache checks entry age on read.
pub fn providers(clock: Arc<dyn Clock>, native_ttl: bool) -> ProviderSet {
    let skin_data = MemoryProvider::new(clock.clone());
    let (skin_data, staleness) = if native_ttl {
        (skin_data.with_ttl(SKIN_RETENTION), StalenessPolicy::Native)
    } else {
        (skin_data, StalenessPolicy::Checked)
    };

    ProviderSet {
        nick: Arc::new(MemoryProvider::new(clock.clone())),
        skin: Arc::new(MemoryProvider::new(clock)),
        skin_data: Arc::new(skin_data),
        staleness,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::{ManualClock, SystemClock};

    #[tokio::test]
    async fn test_upsert_and_idempotent_remove() {
        let provider = MemoryProvider::<String>::new(Arc::new(SystemClock));
        provider.put("a", "one".to_string()).await.unwrap();
        provider.put("a", "two".to_string()).await.unwrap();
        assert_eq!(provider.get("a").await.unwrap().as_deref(), Some("two"));

        provider.remove("a").await.unwrap();
        provider.remove("a").await.unwrap();
        assert_eq!(provider.get("a").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_keys_exact_match() {
        let provider = MemoryProvider::<u32>::new(Arc::new(SystemClock));
        provider.put("alpha", 1).await.unwrap();
        provider.put("alphabet", 2).await.unwrap();

        let mut all = provider.keys(None).await.unwrap();
        all.sort();
        assert_eq!(all, vec!["alpha", "alphabet"]);
        assert_eq!(provider.keys(Some("alpha")).await.unwrap(), vec!["alpha"]);
    }

    #[tokio::test]
    async fn test_ttl_expires_keys() {
        let clock = Arc::new(ManualClock::default());
        let provider =
            MemoryProvider::<u32>::new(clock.clone()).with_ttl(Duration::from_secs(3600));
        provider.put("k", 7).await.unwrap();

        clock.advance(Duration::from_secs(3599));
        assert_eq!(provider.get("k").await.unwrap(), Some(7));

        clock.advance(Duration::from_secs(1));
        assert_eq!(provider.get("k").await.unwrap(), None);
        assert!(provider.keys(None).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_rewrite_refreshes_ttl() {
        let clock = Arc::new(ManualClock::default());
        let provider = MemoryProvider::<u32>::new(clock.clone()).with_ttl(Duration::from_secs(10));
        provider.put("k", 1).await.unwrap();
        clock.advance(Duration::from_secs(8));
        provider.put("k", 2).await.unwrap();
        clock.advance(Duration::from_secs(8));
        assert_eq!(provider.get("k").await.unwrap(), Some(2));
    }
}
