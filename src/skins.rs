//! Skin texture cache.
//!
//! Read-through/write-through cache keyed by skin reference (a username or
//! UUID string), layered over whichever [`DataProvider`] the active backend
//! supplies. A miss tells the skin-loading service to fetch a fresh texture and
//! [`SkinCache::put`] it back.
//!
//! Entries older than [`SKIN_RETENTION`] are stale. Who enforces that depends
//! on the backend, see [`StalenessPolicy`].

use crate::clock::{Clock, SystemClock};
use crate::storage::{DataProvider, StorageError};
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Age after which a cached texture is stale.
pub const SKIN_RETENTION: Duration = Duration::from_secs(3600);

/// How a backend treats entry age.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StalenessPolicy {
    /// The cache compares `load_time` against the clock; stale entries are
    /// reported as misses and evicted.
    Checked,
    /// The store expires keys itself; the cache trusts whatever it returns.
    Native,
}

/// A cached skin texture.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SkinData {
    /// Raw texture payload.
    #[serde(with = "blob")]
    pub blob: Vec<u8>,
    /// Insertion time, milliseconds since the Unix epoch.
    pub load_time: i64,
}

impl SkinData {
    pub fn new(blob: Vec<u8>, loaded_at: DateTime<Utc>) -> Self {
        Self {
            blob,
            load_time: loaded_at.timestamp_millis(),
        }
    }

    /// Whether the entry has outlived [`SKIN_RETENTION`] at `now`.
    ///
    /// A `load_time` too far in the past to measure counts as stale.
    pub fn is_stale(&self, now: DateTime<Utc>) -> bool {
        match now.timestamp_millis().checked_sub(self.load_time) {
            Some(age) => age > SKIN_RETENTION.as_millis() as i64,
            None => true,
        }
    }
}

/// Base64 text encoding for the texture bytes.
mod blob {
    use base64::Engine;
    use base64::engine::general_purpose::STANDARD;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(bytes: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&STANDARD.encode(bytes))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<u8>, D::Error> {
        let encoded = String::deserialize(deserializer)?;
        STANDARD
            .decode(encoded)
            .map_err(serde::de::Error::custom)
    }
}

type Slot = Option<(Arc<dyn DataProvider<SkinData>>, StalenessPolicy)>;

/// Skin texture cache.
pub struct SkinCache {
    slot: RwLock<Slot>,
    clock: Arc<dyn Clock>,
}

impl SkinCache {
    pub fn new() -> Self {
        Self::with_clock(Arc::new(SystemClock))
    }

    pub fn with_clock(clock: Arc<dyn Clock>) -> Self {
        Self {
            slot: RwLock::new(None),
            clock,
        }
    }

    /// Install the backing provider and its staleness policy.
    pub fn install(&self, provider: Arc<dyn DataProvider<SkinData>>, policy: StalenessPolicy) {
        info!(backend = provider.name(), policy = ?policy, "Skin cache provider installed");
        *self.slot.write() = Some((provider, policy));
    }

    /// Whether a provider has been installed.
    pub fn is_ready(&self) -> bool {
        self.slot.read().is_some()
    }

    fn current(&self) -> Slot {
        self.slot.read().clone()
    }

    /// Fetch a fresh cached texture.
    ///
    /// `None` means the caller should load the skin and [`put`](Self::put) it.
    /// Before a provider is installed every lookup misses.
    pub async fn get(&self, skin_ref: &str) -> Result<Option<SkinData>, StorageError> {
        let Some((provider, policy)) = self.current() else {
            return Ok(None);
        };

        let Some(data) = provider.get(skin_ref).await? else {
            return Ok(None);
        };

        if policy == StalenessPolicy::Checked && data.is_stale(self.clock.now()) {
            self.evict(provider.as_ref(), skin_ref).await;
            return Ok(None);
        }

        Ok(Some(data))
    }

    /// Drop a stale entry unless it was rewritten since it was read.
    async fn evict(&self, provider: &dyn DataProvider<SkinData>, skin_ref: &str) {
        match provider.get(skin_ref).await {
            Ok(Some(current)) if !current.is_stale(self.clock.now()) => return,
            Ok(None) => return,
            Ok(Some(_)) => {}
            Err(e) => {
                warn!(skin = %skin_ref, error = %e, "Failed to evict stale skin");
                return;
            }
        }

        debug!(skin = %skin_ref, "Evicting stale skin");
        if let Err(e) = provider.remove(skin_ref).await {
            warn!(skin = %skin_ref, error = %e, "Failed to evict stale skin");
        }
    }

    /// Store a texture, stamping its load time now.
    pub async fn put(&self, skin_ref: &str, blob: Vec<u8>) -> Result<(), StorageError> {
        let (provider, _) = self.current().ok_or(StorageError::NotReady)?;
        let data = SkinData::new(blob, self.clock.now());
        provider.put(skin_ref, data).await
    }

    /// Drop a cached texture.
    pub async fn remove(&self, skin_ref: &str) -> Result<(), StorageError> {
        let (provider, _) = self.current().ok_or(StorageError::NotReady)?;
        provider.remove(skin_ref).await
    }

    /// Delete every stale entry, returning how many were removed.
    ///
    /// Does nothing for [`StalenessPolicy::Native`] providers or before a
    /// provider is installed.
    pub async fn purge_stale(&self) -> Result<usize, StorageError> {
        let Some((provider, StalenessPolicy::Checked)) = self.current() else {
            return Ok(0);
        };

        let now = self.clock.now();
        let mut removed = 0;
        for key in provider.keys(None).await? {
            if let Some(data) = provider.get(&key).await?
                && data.is_stale(now)
            {
                info!(skin = %key, "Deleting old skin");
                provider.remove(&key).await?;
                removed += 1;
            }
        }
        Ok(removed)
    }
}

impl Default for SkinCache {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::storage::RecordKind;
    use crate::storage::local::LocalStore;
    use crate::storage::memory::{self, MemoryProvider};
    use async_trait::async_trait;

    fn cache_with(native_ttl: bool) -> (Arc<ManualClock>, SkinCache) {
        let clock = Arc::new(ManualClock::default());
        let cache = SkinCache::with_clock(clock.clone());
        let set = memory::providers(clock.clone(), native_ttl);
        cache.install(set.skin_data, set.staleness);
        (clock, cache)
    }

    #[test]
    fn skin_data_serializes_blob_as_base64() {
        let data = SkinData {
            blob: vec![0, 1, 2, 255],
            load_time: 42,
        };
        let json = serde_json::to_string(&data).unwrap();
        assert_eq!(json, r#"{"blob":"AAEC/w==","load_time":42}"#);
        assert_eq!(serde_json::from_str::<SkinData>(&json).unwrap(), data);
    }

    #[test]
    fn staleness_boundary_is_one_hour() {
        let loaded = Utc::now();
        let data = SkinData::new(vec![], loaded);
        assert!(!data.is_stale(loaded + chrono::Duration::seconds(3600)));
        assert!(data.is_stale(loaded + chrono::Duration::seconds(3601)));
    }

    #[test]
    fn unmeasurable_age_is_stale() {
        let data = SkinData {
            blob: vec![1],
            load_time: i64::MIN,
        };
        assert!(data.is_stale(Utc::now()));

        let future = SkinData {
            blob: vec![1],
            load_time: i64::MAX,
        };
        assert!(!future.is_stale(Utc::now()));
    }

    #[tokio::test]
    async fn test_corrupt_load_time_is_a_miss() {
        let clock = Arc::new(ManualClock::default());
        let provider = Arc::new(MemoryProvider::new(clock.clone()));
        let corrupt = SkinData {
            blob: vec![1],
            load_time: i64::MIN,
        };
        provider.put("Notch", corrupt.clone()).await.unwrap();
        provider.put("Jeb", corrupt).await.unwrap();

        let cache = SkinCache::with_clock(clock);
        cache.install(provider.clone(), StalenessPolicy::Checked);

        assert_eq!(cache.get("Notch").await.unwrap(), None);
        assert_eq!(provider.get("Notch").await.unwrap(), None);
        assert_eq!(cache.purge_stale().await.unwrap(), 1);
        assert_eq!(provider.get("Jeb").await.unwrap(), None);
    }

    /// Serves whatever it was seeded with and refuses deletes.
    struct Undeletable(MemoryProvider<SkinData>);

    #[async_trait]
    impl DataProvider<SkinData> for Undeletable {
        fn name(&self) -> &str {
            "undeletable"
        }
        async fn get(&self, key: &str) -> Result<Option<SkinData>, StorageError> {
            self.0.get(key).await
        }
        async fn put(&self, key: &str, value: SkinData) -> Result<(), StorageError> {
            self.0.put(key, value).await
        }
        async fn remove(&self, _key: &str) -> Result<(), StorageError> {
            Err(StorageError::NotReady)
        }
        async fn keys(&self, pattern: Option<&str>) -> Result<Vec<String>, StorageError> {
            self.0.keys(pattern).await
        }
    }

    #[tokio::test]
    async fn test_failed_eviction_still_misses() {
        let clock = Arc::new(ManualClock::default());
        let cache = SkinCache::with_clock(clock.clone());
        cache.install(
            Arc::new(Undeletable(MemoryProvider::new(clock.clone()))),
            StalenessPolicy::Checked,
        );

        cache.put("Notch", vec![1]).await.unwrap();
        clock.advance(SKIN_RETENTION + Duration::from_secs(1));
        assert_eq!(cache.get("Notch").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_eviction_spares_rewritten_entry() {
        let clock = Arc::new(ManualClock::default());
        let cache = SkinCache::with_clock(clock.clone());
        let provider = Arc::new(MemoryProvider::new(clock.clone()));
        cache.install(provider.clone(), StalenessPolicy::Checked);

        cache.put("Notch", vec![1]).await.unwrap();
        clock.advance(SKIN_RETENTION + Duration::from_secs(1));

        // Another writer refreshed the texture after the stale read.
        provider
            .put("Notch", SkinData::new(vec![2], clock.now()))
            .await
            .unwrap();
        cache.evict(provider.as_ref(), "Notch").await;
        assert_eq!(cache.get("Notch").await.unwrap().unwrap().blob, vec![2]);
    }

    #[tokio::test]
    async fn test_miss_before_install() {
        let cache = SkinCache::new();
        assert!(!cache.is_ready());
        assert_eq!(cache.get("Notch").await.unwrap(), None);
        assert!(matches!(
            cache.put("Notch", vec![1]).await,
            Err(StorageError::NotReady)
        ));
        assert_eq!(cache.purge_stale().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_put_then_get_returns_blob() {
        let (_clock, cache) = cache_with(false);
        cache.put("Notch", b"texture".to_vec()).await.unwrap();
        let hit = cache.get("Notch").await.unwrap().unwrap();
        assert_eq!(hit.blob, b"texture");
    }

    #[tokio::test]
    async fn test_checked_policy_evicts_after_retention() {
        let (clock, cache) = cache_with(false);
        cache.put("Notch", b"texture".to_vec()).await.unwrap();

        clock.advance(SKIN_RETENTION);
        assert!(cache.get("Notch").await.unwrap().is_some());

        clock.advance(Duration::from_secs(1));
        assert_eq!(cache.get("Notch").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_native_policy_relies_on_store_expiry() {
        let (clock, cache) = cache_with(true);
        cache.put("Notch", b"texture".to_vec()).await.unwrap();

        clock.advance(Duration::from_secs(3599));
        assert_eq!(cache.get("Notch").await.unwrap().unwrap().blob, b"texture");

        clock.advance(Duration::from_secs(1));
        assert_eq!(cache.get("Notch").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_native_policy_trusts_provider_contents() {
        // A store that never expires, declared native: the cache must not second-guess it.
        let clock = Arc::new(ManualClock::default());
        let cache = SkinCache::with_clock(clock.clone());
        cache.install(
            Arc::new(MemoryProvider::new(clock.clone())),
            StalenessPolicy::Native,
        );
        cache.put("Notch", b"texture".to_vec()).await.unwrap();
        clock.advance(SKIN_RETENTION * 2);
        assert!(cache.get("Notch").await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_shared_reference_serves_every_caller() {
        let (_clock, cache) = cache_with(false);
        cache.put("shared", vec![9]).await.unwrap();
        for _ in 0..3 {
            assert_eq!(cache.get("shared").await.unwrap().unwrap().blob, vec![9]);
        }
    }

    #[tokio::test]
    async fn test_purge_stale_on_local_store() {
        let store = LocalStore::open(":memory:").await.unwrap();
        let clock = Arc::new(ManualClock::default());
        let cache = SkinCache::with_clock(clock.clone());
        cache.install(
            Arc::new(store.provider(RecordKind::SkinData)),
            StalenessPolicy::Checked,
        );

        cache.put("old", vec![1]).await.unwrap();
        clock.advance(Duration::from_secs(1800));
        cache.put("fresh", vec![2]).await.unwrap();
        clock.advance(Duration::from_secs(1801));

        assert_eq!(cache.purge_stale().await.unwrap(), 1);
        assert!(cache.get("fresh").await.unwrap().is_some());
        assert_eq!(cache.get("old").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_remove_drops_entry() {
        let (_clock, cache) = cache_with(false);
        cache.put("Notch", vec![1]).await.unwrap();
        cache.remove("Notch").await.unwrap();
        cache.remove("Notch").await.unwrap();
        assert_eq!(cache.get("Notch").await.unwrap(), None);
    }
}
