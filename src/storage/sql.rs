//! PostgreSQL backend.
//!
//! One connection is opened for the life of the backend and shared by all
//! three record tables, so operations serialize on it under load.

use super::{DataProvider, ProviderSet, RecordKind, StorageError, StoredValue};
use crate::config::SqlStorageConfig;
use crate::skins::StalenessPolicy;
use async_trait::async_trait;
use sqlx::PgPool;
use sqlx::postgres::{PgConnectOptions, PgPoolOptions};
use std::marker::PhantomData;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info};

/// Connected PostgreSQL store.
pub struct SqlStore {
    pool: PgPool,
}

impl SqlStore {
    /// Connection acquire timeout.
    const ACQUIRE_TIMEOUT: Duration = Duration::from_secs(10);

    /// Connect and create the record tables if needed.
    ///
    /// Failure is fatal for this backend; there is no retry.
    pub async fn connect(config: &SqlStorageConfig) -> Result<Self, StorageError> {
        let mut options = PgConnectOptions::new()
            .host(&config.host)
            .port(config.port)
            .username(&config.user)
            .database(&config.database);
        if let Some(pass) = config.password() {
            options = options.password(pass);
        }

        let pool = PgPoolOptions::new()
            .max_connections(1)
            .acquire_timeout(Self::ACQUIRE_TIMEOUT)
            .connect_with(options)
            .await
            .map_err(|e| {
                error!(error = %e, "Failed to connect to database");
                StorageError::Connect {
                    backend: "sql",
                    reason: e.to_string(),
                }
            })?;

        info!(
            user = %config.user,
            host = %config.host,
            port = config.port,
            "Connected to SQL"
        );

        let store = Self { pool };
        store.migrate().await?;
        Ok(store)
    }

    async fn migrate(&self) -> Result<(), StorageError> {
        for kind in RecordKind::ALL {
            let ddl = format!(
                r#"
                CREATE TABLE IF NOT EXISTS {} (
                    id VARCHAR(255) PRIMARY KEY,
                    value TEXT NOT NULL,
                    updated_at BIGINT NOT NULL
                )
                "#,
                kind.table()
            );
            sqlx::query(&ddl).execute(&self.pool).await?;
        }
        Ok(())
    }

    /// Provider for one record kind.
    pub fn provider<V: StoredValue>(&self, kind: RecordKind) -> SqlProvider<V> {
        SqlProvider {
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

/// PostgreSQL-backed provider for one table.
pub struct SqlProvider<V> {
    pool: PgPool,
    table: &'static str,
    _value: PhantomData<fn() -> V>,
}

#[async_trait]
impl<V: StoredValue> DataProvider<V> for SqlProvider<V> {
    fn name(&self) -> &str {
        "sql"
    }

    async fn get(&self, key: &str) -> Result<Option<V>, StorageError> {
        let query = format!("SELECT value FROM {} WHERE id = $1", self.table);
        let data: Option<String> = sqlx::query_scalar(&query)
            .bind(key)
            .fetch_optional(&self.pool)
            .await?;

        match data {
            Some(json) => Ok(Some(serde_json::from_str(&json)?)),
            None => Ok(None),
        }
    }

    async fn put(&self, key: &str, value: V) -> Result<(), StorageError> {
        let data = serde_json::to_string(&value)?;
        let query = format!(
            r#"
            INSERT INTO {} (id, value, updated_at)
            VALUES ($1, $2, $3)
            ON CONFLICT (id) DO UPDATE SET
                value = $2,
                updated_at = $3
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
        let query = format!("DELETE FROM {} WHERE id = $1", self.table);
        sqlx::query(&query).bind(key).execute(&self.pool).await?;
        Ok(())
    }

    async fn keys(&self, pattern: Option<&str>) -> Result<Vec<String>, StorageError> {
        let keys: Vec<String> = match pattern {
            Some(exact) => {
                let query = format!("SELECT id FROM {} WHERE id = $1", self.table);
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

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    #[tokio::test]
    async fn test_unreachable_server_is_fatal() {
        let config = SqlStorageConfig {
            host: "127.0.0.1".to_string(),
            port: 1,
            ..Default::default()
        };
        let err = SqlStore::connect(&config).await.err().unwrap();
        assert!(matches!(err, StorageError::Connect { backend: "sql", .. }), "{err}");
    }

    /// Runs against a live server when `NICKNAMER_TEST_PG_URL` is set.
    async fn live_store() -> Option<SqlStore> {
        let url = std::env::var("NICKNAMER_TEST_PG_URL").ok()?;
        let options = PgConnectOptions::from_str(&url).unwrap();
        let pool = PgPoolOptions::new()
            .max_connections(1)
            .connect_with(options)
            .await
            .unwrap();
        let store = SqlStore { pool };
        store.migrate().await.unwrap();
        Some(store)
    }

    #[tokio::test]
    async fn test_live_provider_cycle() {
        let Some(store) = live_store().await else {
            return;
        };
        let nicks = store.provider::<String>(RecordKind::Nick);
        let player = uuid::Uuid::new_v4().to_string();

        nicks.put(&player, "Bob".to_string()).await.unwrap();
        nicks.put(&player, "Alice".to_string()).await.unwrap();
        assert_eq!(nicks.get(&player).await.unwrap().as_deref(), Some("Alice"));
        assert_eq!(nicks.keys(Some(&player)).await.unwrap(), vec![player.clone()]);

        nicks.remove(&player).await.unwrap();
        nicks.remove(&player).await.unwrap();
        assert_eq!(nicks.get(&player).await.unwrap(), None);
    }
}
