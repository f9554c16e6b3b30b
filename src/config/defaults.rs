//! Default value functions for configuration.
//!
//! Separated into its own module for clarity and reuse.

/// Returns `true` (for serde defaults).
pub fn default_true() -> bool {
    true
}

// =============================================================================
// Storage Defaults
// =============================================================================

pub fn default_local_path() -> String {
    "nicknamer.db".to_string()
}

pub fn default_host() -> String {
    "localhost".to_string()
}

pub fn default_sql_port() -> u16 {
    5432
}

pub fn default_sql_user() -> String {
    "nicknamer".to_string()
}

pub fn default_sql_database() -> String {
    "nicknamer".to_string()
}

pub fn default_redis_port() -> u16 {
    6379
}

pub fn default_max_connections() -> u32 {
    8
}
