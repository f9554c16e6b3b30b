//! Redis backend.
//!
//! Each record kind lives under its own key prefix (`nn_data_nick:` and so on),
//! so enumerating one kind never returns another's keys. The skin-cache
//! provider writes with `SET ... EX 3600` and leaves expiry to the server.

use super::{DataProvider, ProviderSet, RecordKind, StorageError, StoredValue};
use crate::config::RedisStorageConfig;
use crate::skins::{SKIN_RETENTION, StalenessPolicy};
use async_trait::async_trait;
use redis::AsyncCommands;
use redis::aio::MultiplexedConnection;
use regex::Regex;
use std::marker::PhantomData;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Semaphore, SemaphorePermit};
use tracing::{error, info};

/// Shared connection pool.
///
/// Every operation checks out a slot for its own duration; at most
/// `max-connections` operations are in flight at once.
#[derive(Clone)]
pub struct KvPool {
    conn: MultiplexedConnection,
    slots: Arc<Semaphore>,
}

impl KvPool {
    fn new(conn: MultiplexedConnection, max_connections: u32) -> Self {
        Self {
            conn,
            slots: Arc::new(Semaphore::new(max_connections.max(1) as usize)),
        }
    }

    /// Check out a connection. Fails once the pool is destroyed.
    async fn checkout(&self) -> Result<(SemaphorePermit<'_>, MultiplexedConnection), StorageError> {
        let permit = self
            .slots
            .acquire()
            .await
            .map_err(|_| StorageError::NotReady)?;
        Ok((permit, self.conn.clone()))
    }

    async fn ping(&self) -> Result<(), StorageError> {
        let (_slot, mut conn) = self.checkout().await?;
        redis::cmd("PING").query_async::<String>(&mut conn).await?;
        Ok(())
    }

    /// Refuse all further checkouts.
    fn destroy(&self) {
        self.slots.close();
    }
}

/// Connected Redis store.
pub struct KvStore {
    pool: KvPool,
}

impl KvStore {
    const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

    /// Connect and verify the server answers `PING`.
    ///
    /// Any failure destroys the pool and is fatal for this backend.
    pub async fn connect(config: &RedisStorageConfig) -> Result<Self, StorageError> {
        let url = connection_url(config);
        let client = redis::Client::open(url.as_str()).map_err(connect_error)?;

        let conn = tokio::time::timeout(
            Self::CONNECT_TIMEOUT,
            client.get_multiplexed_async_connection(),
        )
        .await
        .map_err(|_| StorageError::Connect {
            backend: "redis",
            reason: "connection timeout".to_string(),
        })?
        .map_err(connect_error)?;

        let pool = KvPool::new(conn, config.max_connections);
        if let Err(e) = pool.ping().await {
            pool.destroy();
            error!(error = %e, "Failed to connect to Redis");
            return Err(StorageError::Connect {
                backend: "redis",
                reason: e.to_string(),
            });
        }

        info!(host = %config.host, port = config.port, "Connected to Redis");
        Ok(Self { pool })
    }

    /// Provider for one record kind, optionally expiring keys after `ttl`.
    pub fn provider<V: StoredValue>(
        &self,
        kind: RecordKind,
        ttl: Option<Duration>,
    ) -> Result<KvProvider<V>, StorageError> {
        KvProvider::new(self.pool.clone(), kind, ttl)
    }

    /// Providers for all record kinds. Skin textures expire server-side.
    pub fn providers(&self) -> Result<ProviderSet, StorageError> {
        Ok(ProviderSet {
            nick: Arc::new(self.provider::<String>(RecordKind::Nick, None)?),
            skin: Arc::new(self.provider::<String>(RecordKind::Skin, None)?),
            skin_data: Arc::new(self.provider(RecordKind::SkinData, Some(SKIN_RETENTION))?),
            staleness: StalenessPolicy::Native,
        })
    }

    pub fn close(&self) {
        self.pool.destroy();
    }
}

fn connect_error(e: redis::RedisError) -> StorageError {
    error!(error = %e, "Failed to connect to Redis");
    StorageError::Connect {
        backend: "redis",
        reason: e.to_string(),
    }
}

fn connection_url(config: &RedisStorageConfig) -> String {
    match config.password() {
        Some(pass) => format!(
            "redis://:{}@{}:{}/",
            urlencoding::encode(pass),
            config.host,
            config.port
        ),
        None => format!("redis://{}:{}/", config.host, config.port),
    }
}

/// Redis-backed provider for one record kind.
pub struct KvProvider<V> {
    pool: KvPool,
    kind: RecordKind,
    scan: Regex,
    ttl: Option<Duration>,
    _value: PhantomData<fn() -> V>,
}

impl<V> KvProvider<V> {
    fn new(pool: KvPool, kind: RecordKind, ttl: Option<Duration>) -> Result<Self, StorageError> {
        Ok(Self {
            pool,
            kind,
            scan: anchored(kind.scan_pattern())?,
            ttl,
            _value: PhantomData,
        })
    }

    fn key(&self, id: &str) -> String {
        format!("{}{}", self.kind.key_prefix(), id)
    }

    async fn scan_keys(
        conn: &mut MultiplexedConnection,
        pattern: &str,
    ) -> Result<Vec<String>, StorageError> {
        let mut cursor: u64 = 0;
        let mut all_keys = Vec::new();

        loop {
            let (next_cursor, keys): (u64, Vec<String>) = redis::cmd("SCAN")
                .arg(cursor)
                .arg("MATCH")
                .arg(pattern)
                .arg("COUNT")
                .arg(100)
                .query_async(conn)
                .await?;

            all_keys.extend(keys);
            cursor = next_cursor;
            if cursor == 0 {
                break;
            }
        }

        Ok(all_keys)
    }
}

fn anchored(pattern: &str) -> Result<Regex, regex::Error> {
    Regex::new(&format!("^(?:{pattern})$"))
}

/// Record ids recovered from scanned keys.
///
/// `scan` must be the anchored scan pattern of one record kind; keys of other
/// kinds are dropped. `filter`, if given, must match the whole id.
fn record_ids(scan: &Regex, filter: Option<&Regex>, keys: &[String]) -> Vec<String> {
    keys.iter()
        .filter_map(|key| scan.captures(key).and_then(|caps| caps.get(1)))
        .map(|m| m.as_str())
        .filter(|id| filter.is_none_or(|re| re.is_match(id)))
        .map(str::to_string)
        .collect()
}

#[async_trait]
impl<V: StoredValue> DataProvider<V> for KvProvider<V> {
    fn name(&self) -> &str {
        "redis"
    }

    async fn get(&self, key: &str) -> Result<Option<V>, StorageError> {
        let (_slot, mut conn) = self.pool.checkout().await?;
        let data: Option<String> = conn.get(self.key(key)).await?;

        match data {
            Some(json) => Ok(Some(serde_json::from_str(&json)?)),
            None => Ok(None),
        }
    }

    async fn put(&self, key: &str, value: V) -> Result<(), StorageError> {
        let data = serde_json::to_string(&value)?;
        let (_slot, mut conn) = self.pool.checkout().await?;

        let mut cmd = redis::cmd("SET");
        cmd.arg(self.key(key)).arg(&data);
        if let Some(ttl) = self.ttl {
            cmd.arg("EX").arg(ttl.as_secs());
        }
        cmd.query_async::<()>(&mut conn).await?;
        Ok(())
    }

    async fn remove(&self, key: &str) -> Result<(), StorageError> {
        let (_slot, mut conn) = self.pool.checkout().await?;
        conn.del::<_, ()>(self.key(key)).await?;
        Ok(())
    }

    async fn keys(&self, pattern: Option<&str>) -> Result<Vec<String>, StorageError> {
        let filter = pattern.map(anchored).transpose()?;
        let (_slot, mut conn) = self.pool.checkout().await?;
        let glob = format!("{}*", self.kind.key_prefix());
        let keys = Self::scan_keys(&mut conn, &glob).await?;

        Ok(record_ids(&self.scan, filter.as_ref(), &keys))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scanned(keys: &[&str]) -> Vec<String> {
        keys.iter().map(|key| key.to_string()).collect()
    }

    fn ids(kind: RecordKind, filter: Option<&str>, keys: &[String]) -> Vec<String> {
        let scan = anchored(kind.scan_pattern()).unwrap();
        let filter = filter.map(|p| anchored(p).unwrap());
        record_ids(&scan, filter.as_ref(), keys)
    }

    #[test]
    fn scan_patterns_do_not_cross_record_kinds() {
        let player = "8667ba71-b85a-4004-af54-457a9734eed7";
        let keys = scanned(&[
            format!("nn_data_nick:{player}").as_str(),
            format!("nn_data_skin:{player}").as_str(),
            "nn_skins:Notch",
        ]);

        assert_eq!(ids(RecordKind::Nick, None, &keys), vec![player]);
        assert_eq!(ids(RecordKind::Skin, None, &keys), vec![player]);
        assert_eq!(ids(RecordKind::SkinData, None, &keys), vec!["Notch"]);
    }

    #[test]
    fn scan_pattern_rejects_foreign_keys() {
        let keys = scanned(&["other:nn_data_nick:x", "nn_data_nickx", "nn_data_nick:p1"]);
        assert_eq!(ids(RecordKind::Nick, None, &keys), vec!["p1"]);
    }

    #[test]
    fn key_filter_must_match_whole_id() {
        let keys = scanned(&[
            "nn_data_nick:p1",
            "nn_data_nick:p12",
            "nn_data_nick:xp1",
            "nn_data_skin:p1",
        ]);

        assert_eq!(ids(RecordKind::Nick, Some("p1"), &keys), vec!["p1"]);
        assert_eq!(ids(RecordKind::Nick, Some("p1.*"), &keys), vec!["p1", "p12"]);
        assert!(ids(RecordKind::Nick, Some("p"), &keys).is_empty());
        assert_eq!(ids(RecordKind::Nick, None, &keys).len(), 3);
        assert_eq!(ids(RecordKind::Skin, Some("p1"), &keys), vec!["p1"]);
    }

    #[test]
    fn connection_url_encodes_password() {
        let mut config = RedisStorageConfig {
            host: "cache".to_string(),
            port: 6380,
            ..Default::default()
        };
        assert_eq!(connection_url(&config), "redis://cache:6380/");

        config.pass = Some(String::new());
        assert_eq!(connection_url(&config), "redis://cache:6380/");

        config.pass = Some("p@ss word".to_string());
        assert_eq!(connection_url(&config), "redis://:p%40ss%20word@cache:6380/");
    }

    #[tokio::test]
    async fn test_unreachable_server_is_fatal() {
        let config = RedisStorageConfig {
            host: "127.0.0.1".to_string(),
            port: 1,
            ..Default::default()
        };
        let err = KvStore::connect(&config).await.err().unwrap();
        assert!(matches!(err, StorageError::Connect { backend: "redis", .. }), "{err}");
    }

    /// Runs against a live server when `NICKNAMER_TEST_REDIS_URL` is set.
    async fn live_store() -> Option<KvStore> {
        let url = std::env::var("NICKNAMER_TEST_REDIS_URL").ok()?;
        let client = redis::Client::open(url.as_str()).unwrap();
        let conn = client.get_multiplexed_async_connection().await.unwrap();
        Some(KvStore {
            pool: KvPool::new(conn, 4),
        })
    }

    #[tokio::test]
    async fn test_live_nick_and_skin_keys_stay_isolated() {
        let Some(store) = live_store().await else {
            return;
        };
        let nicks = store.provider::<String>(RecordKind::Nick, None).unwrap();
        let skins = store.provider::<String>(RecordKind::Skin, None).unwrap();
        let player = uuid::Uuid::new_v4().to_string();

        nicks.put(&player, "Bob".to_string()).await.unwrap();
        skins.put(&player, "Notch".to_string()).await.unwrap();

        let nick_keys = nicks.keys(Some(&regex::escape(&player))).await.unwrap();
        assert_eq!(nick_keys, vec![player.clone()]);
        assert_eq!(nicks.get(&player).await.unwrap().as_deref(), Some("Bob"));
        assert_eq!(skins.get(&player).await.unwrap().as_deref(), Some("Notch"));

        nicks.remove(&player).await.unwrap();
        nicks.remove(&player).await.unwrap();
        skins.remove(&player).await.unwrap();
        assert_eq!(nicks.get(&player).await.unwrap(), None);
        assert_eq!(skins.get(&player).await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_live_skin_cache_sets_expiry() {
        let Some(store) = live_store().await else {
            return;
        };
        let set = store.providers().unwrap();
        assert_eq!(set.staleness, StalenessPolicy::Native);

        let key = format!("test-{}", uuid::Uuid::new_v4());
        set.skin_data
            .put(&key, crate::skins::SkinData::new(vec![1, 2], chrono::Utc::now()))
            .await
            .unwrap();

        let (_slot, mut conn) = store.pool.checkout().await.unwrap();
        let ttl: i64 = conn.ttl(format!("nn_skins:{key}")).await.unwrap();
        assert!(ttl > 3500 && ttl <= 3600, "ttl was {ttl}");
        drop(_slot);

        set.skin_data.remove(&key).await.unwrap();
    }
}
