//! Configuration validation.
//!
//! Validates the selected storage backend at startup to catch common errors early.

use super::{Config, StorageType};
use std::path::Path;
use thiserror::Error;

/// Validation errors for configuration.
#[derive(Debug, Error)]
pub enum ValidationError {
    #[error("storage.local.path is required")]
    MissingLocalPath,
    #[error("storage.local.path parent directory is not a directory: {0}")]
    LocalPathInvalid(String),
    #[error("storage.sql.host is required")]
    MissingSqlHost,
    #[error("storage.sql.port must be non-zero")]
    InvalidSqlPort,
    #[error("storage.sql.user is required")]
    MissingSqlUser,
    #[error("storage.redis.host is required")]
    MissingRedisHost,
    #[error("storage.redis.port must be non-zero")]
    InvalidRedisPort,
    #[error("storage.redis.max-connections must be at least 1")]
    InvalidRedisConnections,
}

/// Validate a configuration, returning all errors found.
///
/// Only the section of the selected backend is checked.
pub fn validate(config: &Config) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();
    let storage = &config.storage;

    match storage.kind {
        StorageType::Local => {
            let path = &storage.local.path;
            if path.is_empty() {
                errors.push(ValidationError::MissingLocalPath);
            } else if path != ":memory:"
                && let Some(parent) = Path::new(path).parent()
                && parent.exists()
                && !parent.is_dir()
            {
                errors.push(ValidationError::LocalPathInvalid(path.clone()));
            }
        }
        StorageType::Sql => {
            if storage.sql.host.is_empty() {
                errors.push(ValidationError::MissingSqlHost);
            }
            if storage.sql.port == 0 {
                errors.push(ValidationError::InvalidSqlPort);
            }
            if storage.sql.user.is_empty() {
                errors.push(ValidationError::MissingSqlUser);
            }
        }
        StorageType::Redis => {
            if storage.redis.host.is_empty() {
                errors.push(ValidationError::MissingRedisHost);
            }
            if storage.redis.port == 0 {
                errors.push(ValidationError::InvalidRedisPort);
            }
            if storage.redis.max_connections == 0 {
                errors.push(ValidationError::InvalidRedisConnections);
            }
        }
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}
