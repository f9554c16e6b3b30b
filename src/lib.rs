//! nicknamer - nickname and skin substitution core.
//!
//! Player nicknames and skin references live behind a pluggable
//! [`storage::DataProvider`] (SQLite, PostgreSQL, Redis or in-memory).
//! [`plugin::NickNamer`] wires the configured backend into the
//! [`identity::IdentityManager`], the [`skins::SkinCache`] and the
//! [`substitution::SubstitutionPipeline`] that rewrites names in chat and
//! tab-list events.

pub mod clock;
pub mod config;
pub mod identity;
pub mod plugin;
pub mod skins;
pub mod storage;
pub mod substitution;
pub mod telemetry;

pub use config::Config;
pub use plugin::{NickNamer, Startup};
