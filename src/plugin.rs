//! Plugin context.
//!
//! [`NickNamer`] is built once by the host and passed by reference to event
//! and command glue. It owns the identity manager, the skin cache, the
//! substitution pipeline and whatever storage backend the config selects.
//!
//! The local backend is ready when [`NickNamer::start_storage`] returns. The
//! SQL and Redis backends connect on a spawned task; until that task installs
//! its providers, lookups fail closed and events pass through unchanged.

use crate::config::{Config, StorageType};
use crate::identity::IdentityManager;
use crate::skins::SkinCache;
use crate::storage::kv::KvStore;
use crate::storage::local::LocalStore;
use crate::storage::sql::SqlStore;
use crate::storage::{ProviderSet, StorageError, StorageHandle};
use crate::substitution::{ReplacementEvent, Substitution, SubstitutionPipeline};
use crate::telemetry::spans;
use parking_lot::Mutex;
use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::{Instrument, error, info, warn};

/// Outcome of [`NickNamer::start_storage`].
pub enum Startup {
    /// Providers are installed.
    Ready,
    /// Providers will be installed when the task succeeds. A task error is
    /// fatal for the configured backend.
    Pending(JoinHandle<Result<(), StorageError>>),
}

/// Installs a backend's providers into the shared components.
#[derive(Clone)]
struct Installer {
    identity: Arc<IdentityManager>,
    skins: Arc<SkinCache>,
    storage: Arc<Mutex<Option<StorageHandle>>>,
}

impl Installer {
    async fn install(self, set: ProviderSet, handle: StorageHandle) {
        self.identity.install_nick_provider(set.nick);
        self.identity.install_skin_provider(set.skin);
        self.skins.install(set.skin_data, set.staleness);

        let backend = handle.name();
        let previous = self.storage.lock().replace(handle);
        if let Some(previous) = previous {
            previous.close().await;
        }

        match self.skins.purge_stale().await {
            Ok(0) => {}
            Ok(count) => info!(count, "Purged stale skin textures"),
            Err(e) => warn!(error = %e, "Failed to purge stale skin textures"),
        }
        info!(backend, "Storage ready");
    }
}

/// The plugin's shared state.
pub struct NickNamer {
    config: Config,
    identity: Arc<IdentityManager>,
    skins: Arc<SkinCache>,
    pipeline: SubstitutionPipeline,
    storage: Arc<Mutex<Option<StorageHandle>>>,
}

impl NickNamer {
    pub fn new(config: Config) -> Self {
        Self::with_skin_cache(config, SkinCache::new())
    }

    /// Build with a preconfigured skin cache (e.g. one with a custom clock).
    pub fn with_skin_cache(config: Config, skins: SkinCache) -> Self {
        let identity = Arc::new(IdentityManager::new());
        let pipeline = SubstitutionPipeline::new(identity.clone(), config.replace.clone());
        Self {
            config,
            identity,
            skins: Arc::new(skins),
            pipeline,
            storage: Arc::new(Mutex::new(None)),
        }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn identity(&self) -> &Arc<IdentityManager> {
        &self.identity
    }

    pub fn skins(&self) -> &Arc<SkinCache> {
        &self.skins
    }

    pub fn pipeline(&self) -> &SubstitutionPipeline {
        &self.pipeline
    }

    /// Run one replacement event through the pipeline.
    pub async fn handle(&self, event: &mut ReplacementEvent) -> Substitution {
        self.pipeline.handle(event).await
    }

    fn installer(&self) -> Installer {
        Installer {
            identity: self.identity.clone(),
            skins: self.skins.clone(),
            storage: self.storage.clone(),
        }
    }

    /// Bring up the configured storage backend.
    pub async fn start_storage(&self) -> Result<Startup, StorageError> {
        let storage = &self.config.storage;
        let installer = self.installer();

        match storage.kind {
            StorageType::Local => {
                info!(path = %storage.local.path, "Using local storage");
                let span = spans::storage("local");
                async {
                    let store = LocalStore::open(&storage.local.path).await?;
                    let set = store.providers();
                    installer.install(set, StorageHandle::Local(store)).await;
                    Ok::<_, StorageError>(Startup::Ready)
                }
                .instrument(span)
                .await
            }
            StorageType::Sql => {
                let config = storage.sql.clone();
                info!(
                    user = %config.user,
                    host = %config.host,
                    port = config.port,
                    "Using SQL storage"
                );
                let task = async move {
                    let store = SqlStore::connect(&config).await.inspect_err(|e| {
                        error!(error = %e, "SQL storage unavailable");
                    })?;
                    let set = store.providers();
                    installer.install(set, StorageHandle::Sql(store)).await;
                    Ok::<_, StorageError>(())
                };
                Ok(Startup::Pending(tokio::spawn(
                    task.instrument(spans::storage("sql")),
                )))
            }
            StorageType::Redis => {
                let config = storage.redis.clone();
                info!(host = %config.host, port = config.port, "Using Redis storage");
                let task = async move {
                    let store = KvStore::connect(&config).await.inspect_err(|e| {
                        error!(error = %e, "Redis storage unavailable");
                    })?;
                    let set = store.providers()?;
                    installer.install(set, StorageHandle::Kv(store)).await;
                    Ok::<_, StorageError>(())
                };
                Ok(Startup::Pending(tokio::spawn(
                    task.instrument(spans::storage("redis")),
                )))
            }
        }
    }

    /// Install in-process providers instead of a configured backend.
    pub async fn install_memory(&self, set: ProviderSet) {
        self.installer().install(set, StorageHandle::Memory).await;
    }

    /// Close the active backend's connections.
    pub async fn shutdown(&self) {
        let handle = self.storage.lock().take();
        if let Some(handle) = handle {
            info!(backend = handle.name(), "Closing storage");
            handle.close().await;
        }
    }
}
