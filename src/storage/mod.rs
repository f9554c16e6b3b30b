//! Identity-data storage abstraction.
//!
//! Every backend exposes the same [`DataProvider`] contract over a string key
//! and a serde-serializable value:
//! - [`local`]: embedded SQLite store (schema probed and installed on open)
//! - [`sql`]: external PostgreSQL database over one shared connection
//! - [`kv`]: external Redis store with prefixed keys and native expiry
//! - [`memory`]: in-process store, used by embedders and tests
//!
//! # Persisted layout
//!
//! ```text
//! nick data:   table nicknamer_data_nick  | key nn_data_nick:<player>
//! skin data:   table nicknamer_data_skin  | key nn_data_skin:<player>
//! skin cache:  table nicknamer_skins      | key nn_skins:<skin reference>
//! ```

use crate::skins::{SkinData, StalenessPolicy};
use async_trait::async_trait;
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::fmt;
use std::sync::Arc;
use thiserror::Error;

pub mod kv;
pub mod local;
pub mod memory;
pub mod sql;

/// Storage errors.
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("database error: {0}")]
    Sqlx(#[from] sqlx::Error),
    #[error("redis error: {0}")]
    Redis(#[from] ::redis::RedisError),
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
    #[error("invalid key pattern: {0}")]
    Pattern(#[from] regex::Error),
    #[error("failed to connect to {backend}: {reason}")]
    Connect {
        backend: &'static str,
        reason: String,
    },
    #[error("storage backend not ready")]
    NotReady,
}

/// Values a provider can persist.
pub trait StoredValue: Serialize + DeserializeOwned + Send + Sync + 'static {}

impl<T> StoredValue for T where T: Serialize + DeserializeOwned + Send + Sync + 'static {}

/// Uniform key-value contract implemented by every backend.
///
/// Missing keys are `Ok(None)`, never an error. `remove` is idempotent.
#[async_trait]
pub trait DataProvider<V: Send + 'static>: Send + Sync {
    /// Backend label for logs.
    fn name(&self) -> &str;

    /// Fetch the value stored under `key`.
    async fn get(&self, key: &str) -> Result<Option<V>, StorageError>;

    /// Create or overwrite the value stored under `key`.
    async fn put(&self, key: &str, value: V) -> Result<(), StorageError>;

    /// Delete `key` if present.
    async fn remove(&self, key: &str) -> Result<(), StorageError>;

    /// Enumerate keys of this record type.
    ///
    /// `None` lists every key. With `Some(pattern)` relational and memory
    /// backends match the key exactly; the Redis backend treats the pattern
    /// as a regex that must match the whole unprefixed key.
    async fn keys(&self, pattern: Option<&str>) -> Result<Vec<String>, StorageError>;
}

/// The three record kinds persisted by the crate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RecordKind {
    /// player -> nickname
    Nick,
    /// player -> skin reference
    Skin,
    /// skin reference -> cached texture
    SkinData,
}

impl RecordKind {
    pub const ALL: [RecordKind; 3] = [RecordKind::Nick, RecordKind::Skin, RecordKind::SkinData];

    /// Relational table name.
    pub fn table(self) -> &'static str {
        match self {
            Self::Nick => "nicknamer_data_nick",
            Self::Skin => "nicknamer_data_skin",
            Self::SkinData => "nicknamer_skins",
        }
    }

    /// Key-value namespace prefix, including the trailing separator.
    pub fn key_prefix(self) -> &'static str {
        match self {
            Self::Nick => "nn_data_nick:",
            Self::Skin => "nn_data_skin:",
            Self::SkinData => "nn_skins:",
        }
    }

    /// Regex recovering the record id from a namespaced key.
    pub fn scan_pattern(self) -> &'static str {
        match self {
            Self::Nick => "nn_data_nick:(.*)",
            Self::Skin => "nn_data_skin:(.*)",
            Self::SkinData => "nn_skins:(.*)",
        }
    }
}

impl fmt::Display for RecordKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Nick => "nick",
            Self::Skin => "skin",
            Self::SkinData => "skin-data",
        })
    }
}

/// Providers for all record kinds, built by one backend.
pub struct ProviderSet {
    pub nick: Arc<dyn DataProvider<String>>,
    pub skin: Arc<dyn DataProvider<String>>,
    pub skin_data: Arc<dyn DataProvider<SkinData>>,
    /// How the skin cache must treat entry age for this backend.
    pub staleness: StalenessPolicy,
}

/// Owned backend resources, closed on shutdown.
pub enum StorageHandle {
    Local(local::LocalStore),
    Sql(sql::SqlStore),
    Kv(kv::KvStore),
    Memory,
}

impl StorageHandle {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Local(_) => "local",
            Self::Sql(_) => "sql",
            Self::Kv(_) => "redis",
            Self::Memory => "memory",
        }
    }

    /// Release pools and connections.
    pub async fn close(self) {
        match self {
            Self::Local(store) => store.close().await,
            Self::Sql(store) => store.close().await,
            Self::Kv(store) => store.close(),
            Self::Memory => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn record_kinds_use_disjoint_namespaces() {
        for a in RecordKind::ALL {
            for b in RecordKind::ALL {
                if a == b {
                    continue;
                }
                assert_ne!(a.table(), b.table());
                assert!(!a.key_prefix().starts_with(b.key_prefix()));
            }
        }
    }

    #[test]
    fn scan_pattern_extends_key_prefix() {
        for kind in RecordKind::ALL {
            assert_eq!(
                kind.scan_pattern(),
                format!("{}(.*)", kind.key_prefix()),
                "{kind}"
            );
        }
    }
}
