//! Storage backend configuration.

use serde::Deserialize;
use std::fmt;

use super::defaults::{
    default_host, default_local_path, default_max_connections, default_redis_port,
    default_sql_database, default_sql_port, default_sql_user,
};

/// Storage backend selector. Matched case-insensitively.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(try_from = "String")]
pub enum StorageType {
    /// Embedded SQLite file.
    #[default]
    Local,
    /// External PostgreSQL database.
    Sql,
    /// External Redis store.
    Redis,
}

impl TryFrom<String> for StorageType {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        match value.to_ascii_lowercase().as_str() {
            "local" => Ok(Self::Local),
            "sql" => Ok(Self::Sql),
            "redis" => Ok(Self::Redis),
            other => Err(format!(
                "unknown storage type '{other}', expected one of: local, sql, redis"
            )),
        }
    }
}

impl fmt::Display for StorageType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Local => "local",
            Self::Sql => "sql",
            Self::Redis => "redis",
        })
    }
}

/// `[storage]` section.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct StorageConfig {
    /// Active backend.
    #[serde(default, rename = "type")]
    pub kind: StorageType,
    #[serde(default)]
    pub local: LocalStorageConfig,
    #[serde(default)]
    pub sql: SqlStorageConfig,
    #[serde(default)]
    pub redis: RedisStorageConfig,
}

/// `[storage.local]` section.
#[derive(Debug, Clone, Deserialize)]
pub struct LocalStorageConfig {
    /// Path to the SQLite database file.
    #[serde(default = "default_local_path")]
    pub path: String,
}

impl Default for LocalStorageConfig {
    fn default() -> Self {
        Self {
            path: default_local_path(),
        }
    }
}

/// `[storage.sql]` section.
#[derive(Debug, Clone, Deserialize)]
pub struct SqlStorageConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_sql_port")]
    pub port: u16,
    #[serde(default = "default_sql_user")]
    pub user: String,
    #[serde(default)]
    pub pass: Option<String>,
    #[serde(default = "default_sql_database")]
    pub database: String,
}

impl SqlStorageConfig {
    /// Password to send, with an empty string meaning none.
    pub fn password(&self) -> Option<&str> {
        normalize_password(self.pass.as_deref())
    }
}

impl Default for SqlStorageConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_sql_port(),
            user: default_sql_user(),
            pass: None,
            database: default_sql_database(),
        }
    }
}

/// `[storage.redis]` section.
#[derive(Debug, Clone, Deserialize)]
pub struct RedisStorageConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_redis_port")]
    pub port: u16,
    #[serde(default)]
    pub pass: Option<String>,
    /// Upper bound on concurrent operations against the store.
    #[serde(default = "default_max_connections", rename = "max-connections")]
    pub max_connections: u32,
}

impl RedisStorageConfig {
    /// Password to send, with an empty string meaning none.
    pub fn password(&self) -> Option<&str> {
        normalize_password(self.pass.as_deref())
    }
}

impl Default for RedisStorageConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_redis_port(),
            pass: None,
            max_connections: default_max_connections(),
        }
    }
}

fn normalize_password(pass: Option<&str>) -> Option<&str> {
    pass.filter(|p| !p.is_empty())
}
