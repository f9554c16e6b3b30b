//! Configuration loading and management.
//!
//! This module is split into logical submodules:
//! - [`types`]: Top-level config struct and loading (Config, ConfigError)
//! - [`replace`]: Chat substitution switches (ReplaceConfig)
//! - [`storage`]: Storage backend selection and connection parameters (StorageConfig)
//! - [`validation`]: Startup checks for the selected backend

mod defaults;
mod replace;
mod storage;
mod types;
mod validation;

pub use replace::{ChatReplaceConfig, IncomingReplaceConfig, ReplaceConfig};
pub use storage::{
    LocalStorageConfig, RedisStorageConfig, SqlStorageConfig, StorageConfig, StorageType,
};
pub use types::{Config, ConfigError};
pub use validation::{ValidationError, validate};
