//! Embedded SQLite backend.
//!
//! The database file is created on first use. Opening probes the three record
//! tables; if the probe fails the schema is installed and probed again, and any
//! error after that is fatal.

use super::{DataProvider, ProviderSet, RecordKind, StorageError, StoredValue};
use crate::skins::StalenessPolicy;
use async_trait::async_trait;
use sqlx::SqlitePool;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use std::marker::PhantomData;
use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tracing::{info, trace};

static MEMDB_COUNTER: AtomicU64 = AtomicU64::new(0);

/// Row counts found when the store was opened.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RowCounts {
    pub nicks: i64,
    pub skins: i64,
    pub skin_data: i64,
}

/// One persisted record.
#[derive(Debug, sqlx::FromRow)]
struct Row {
    value: String,
    updated_at: i64,
}

/// Embedded store handle with its connection pool.
#[derive(Clone)]
pub struct LocalStore {
    pool: SqlitePool,
    counts: RowCounts,
}

impl LocalStore {
    /// Connection acquire timeout.
    const ACQUIRE_TIMEOUT: Duration = Duration::from_secs(5);

    /// Maximum time a connection can remain idle before being closed.
    const IDLE_TIMEOUT: Duration = Duration::from_secs(60);

    /// Open the store at `path`, installing the schema if it is missing.
    ///
    /// `":memory:"` opens a private in-memory database.
    pub async fn open(path: &str) -> Result<Self, StorageError> {
        let pool = if path == ":memory:" {
            // Named shared-cache database so parallel tests never collide.
            let id = MEMDB_COUNTER.fetch_add(1, Ordering::Relaxed);
            let memdb_uri = format!(
                "file:nicknamer-memdb-{}-{}?mode=memory&cache=shared",
                std::process::id(),
                id
            );

            let options = SqliteConnectOptions::new()
                .filename(&memdb_uri)
                .shared_cache(true)
                .create_if_missing(true);

            SqlitePoolOptions::new()
                .max_connections(1)
                .acquire_timeout(Self::ACQUIRE_TIMEOUT)
                .idle_timeout(Some(Self::IDLE_TIMEOUT))
                .connect_with(options)
                .await?
        } else {
            if let Some(parent) = Path::new(path).parent()
                && !parent.as_os_str().is_empty()
                && let Err(e) = std::fs::create_dir_all(parent)
            {
                tracing::warn!(path = %parent.display(), error = %e, "Failed to create database directory");
            }

            let options = SqliteConnectOptions::new()
                .filename(path)
                .create_if_missing(true);

            SqlitePoolOptions::new()
                .max_connections(5)
                .acquire_timeout(Self::ACQUIRE_TIMEOUT)
                .idle_timeout(Some(Self::IDLE_TIMEOUT))
                .connect_with(options)
                .await?
        };

        info!(path = %path, "Local database opened");

        let counts = match Self::probe(&pool).await {
            Ok(counts) => counts,
            Err(e) => {
                info!(reason = %e, "Installing database");
                Self::install_schema(&pool).await?;
                Self::probe(&pool).await?
            }
        };

        if counts.nicks > 0 {
            info!(count = counts.nicks, "Found player nick-data in database");
        }
        if counts.skins > 0 {
            info!(count = counts.skins, "Found player skin-data in database");
        }
        if counts.skin_data > 0 {
            info!(count = counts.skin_data, "Found skin textures in database");
        }

        Ok(Self { pool, counts })
    }

    /// Count rows of every record table. Fails if any table is missing.
    async fn probe(pool: &SqlitePool) -> Result<RowCounts, sqlx::Error> {
        let mut counts = [0i64; 3];
        for (slot, kind) in counts.iter_mut().zip(RecordKind::ALL) {
            let query = format!("SELECT COUNT(*) FROM {}", kind.table());
            *slot = sqlx::query_scalar::<_, i64>(&query)
                .fetch_one(pool)
                .await?;
        }
        Ok(RowCounts {
            nicks: counts[0],
            skins: counts[1],
            skin_data: counts[2],
        })
    }

    async fn install_schema(pool: &SqlitePool) -> Result<(), StorageError> {
        for kind in RecordKind::ALL {
            let ddl = format!(
                r#"
                CREATE TABLE IF NOT EXISTS {} (
                    id TEXT PRIMARY KEY NOT NULL,
                    value TEXT NOT NULL,
                    updated_at INTEGER NOT NULL
                )
                "#,
                kind.table()
            );
            sqlx::query(&ddl).execute(pool).await?;
        }
        Ok(())
    }

    /// Row counts observed when the store was opened.
    pub fn counts(&self) -> RowCounts {
        self.counts
    }

    /// Provider for one record kind.
    pub fn provider<V: StoredValue>(&self, kind: RecordKind) -> LocalProvider<V> {
        LocalProvider {
            pool: self.pool.clone(),
            table: kind.table(),
            _value: PhantomData,
        }
    }

    /// Providers for all record kinds. Skin age is checked by the cache.
    pub fn providers(&self) -> ProviderSet {
        ProviderSet {
            nick: Arc::new(self.provider::<String>(RecordKind::Nick)),
            skin: Arc::new(self.provider::<String>(RecordKind::Skin)),
            skin_data: Arc::new(self.provider(RecordKind::SkinData)),
            staleness: StalenessPolicy::Checked,
        }
    }

    pub async fn close(&self) {
        self.pool.close().await;
    }
}

/// SQLite-backed provider for one table.
pub struct LocalProvider<V> {
    pool: SqlitePool,
    table: &'static str,
    _value: PhantomData<fn() -> V>,
}

#[async_trait]
impl<V: StoredValue> DataProvider<V> for LocalProvider<V> {
    fn name(&self) -> &str {
        "local"
    }

    async fn get(&self, key: &str) -> Result<Option<V>, StorageError> {
        let query = format!(
            "SELECT value, updated_at FROM {} WHERE id = ?",
            self.table
        );
        let row = sqlx::query_as::<_, Row>(&query)
            .bind(key)
            .fetch_optional(&self.pool)
            .await?;

        match row {
            Some(row) => {
                trace!(table = self.table, key, updated_at = row.updated_at, "Row loaded");
                Ok(Some(serde_json::from_str(&row.value)?))
            }
            None => Ok(None),
        }
    }

    async fn put(&self, key: &str, value: V) -> Result<(), StorageError> {
        let data = serde_json::to_string(&value)?;
        let query = format!(
            r#"
            INSERT INTO {} (id, value, updated_at)
            VALUES (?, ?, ?)
            ON CONFLICT(id) DO UPDATE SET
                value = excluded.value,
                updated_at = excluded.updated_at
            "#,
            self.table
        );
        sqlx::query(&query)
            .bind(key)
            .bind(&data)
            .bind(chrono::Utc::now().timestamp_millis())
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn remove(&self, key: &str) -> Result<(), StorageError> {
        let query = format!("DELETE FROM {} WHERE id = ?", self.table);
        sqlx::query(&query).bind(key).execute(&self.pool).await?;
        Ok(())
    }

    async fn keys(&self, pattern: Option<&str>) -> Result<Vec<String>, StorageError> {
        let keys: Vec<String> = match pattern {
            Some(exact) => {
                let query = format!("SELECT id FROM {} WHERE id = ?", self.table);
                sqlx::query_scalar(&query)
                    .bind(exact)
                    .fetch_all(&self.pool)
                    .await?
            }
            None => {
                let query = format!("SELECT id FROM {}", self.table);
                sqlx::query_scalar(&query).fetch_all(&self.pool).await?
            }
        };
        Ok(keys)
    }
}
