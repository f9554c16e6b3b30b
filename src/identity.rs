//! Nick and skin-reference bookkeeping.
//!
//! [`IdentityManager`] owns the active nick and skin providers. Both are keyed
//! by the player's hyphenated UUID. Until the storage backend installs its
//! providers every read fails closed (not nicked, no skin) and writes return
//! [`StorageError::NotReady`].

use crate::storage::{DataProvider, StorageError};
use parking_lot::RwLock;
use std::collections::BTreeSet;
use std::sync::Arc;
use tracing::{debug, info, warn};
use uuid::Uuid;

type Provider = Arc<dyn DataProvider<String>>;

/// Player nick and skin state.
#[derive(Default)]
pub struct IdentityManager {
    nick: RwLock<Option<Provider>>,
    skin: RwLock<Option<Provider>>,
}

fn player_key(player: &Uuid) -> String {
    player.to_string()
}

impl IdentityManager {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn install_nick_provider(&self, provider: Provider) {
        info!(backend = provider.name(), "Nick provider installed");
        *self.nick.write() = Some(provider);
    }

    pub fn install_skin_provider(&self, provider: Provider) {
        info!(backend = provider.name(), "Skin provider installed");
        *self.skin.write() = Some(provider);
    }

    /// Whether both providers are installed.
    pub fn is_ready(&self) -> bool {
        self.nick.read().is_some() && self.skin.read().is_some()
    }

    fn nick_provider(&self) -> Option<Provider> {
        self.nick.read().clone()
    }

    fn skin_provider(&self) -> Option<Provider> {
        self.skin.read().clone()
    }

    // ------------------------------------------------------------------
    // Nicks
    // ------------------------------------------------------------------

    pub async fn is_nicked(&self, player: &Uuid) -> Result<bool, StorageError> {
        Ok(self.get_nick(player).await?.is_some())
    }

    /// The player's nickname, or `None` if they are not nicked.
    pub async fn get_nick(&self, player: &Uuid) -> Result<Option<String>, StorageError> {
        let Some(provider) = self.nick_provider() else {
            return Ok(None);
        };
        provider.get(&player_key(player)).await
    }

    pub async fn set_nick(&self, player: &Uuid, nick: &str) -> Result<(), StorageError> {
        let provider = self.nick_provider().ok_or(StorageError::NotReady)?;
        provider.put(&player_key(player), nick.to_string()).await?;
        debug!(%player, nick, "Nick set");
        Ok(())
    }

    /// Remove the player's nickname. Clearing an un-nicked player is a no-op.
    pub async fn clear_nick(&self, player: &Uuid) -> Result<(), StorageError> {
        let provider = self.nick_provider().ok_or(StorageError::NotReady)?;
        provider.remove(&player_key(player)).await?;
        debug!(%player, "Nick cleared");
        Ok(())
    }

    /// Every player with an active nickname.
    pub async fn nicked_players(&self) -> Result<Vec<Uuid>, StorageError> {
        let Some(provider) = self.nick_provider() else {
            return Ok(Vec::new());
        };
        Ok(parse_players(provider.keys(None).await?))
    }

    /// Distinct nicknames currently in use, sorted.
    pub async fn used_nicks(&self) -> Result<Vec<String>, StorageError> {
        let Some(provider) = self.nick_provider() else {
            return Ok(Vec::new());
        };
        let mut nicks = BTreeSet::new();
        for key in provider.keys(None).await? {
            if let Some(nick) = provider.get(&key).await? {
                nicks.insert(nick);
            }
        }
        Ok(nicks.into_iter().collect())
    }

    pub async fn is_nick_used(&self, nick: &str) -> Result<bool, StorageError> {
        Ok(!self.players_with_nick(nick).await?.is_empty())
    }

    /// Players currently using `nick`.
    pub async fn players_with_nick(&self, nick: &str) -> Result<Vec<Uuid>, StorageError> {
        match self.nick_provider() {
            Some(provider) => players_with_value(provider.as_ref(), nick).await,
            None => Ok(Vec::new()),
        }
    }

    // ------------------------------------------------------------------
    // Skins
    // ------------------------------------------------------------------

    /// The skin reference the player displays, if one is set.
    pub async fn get_skin(&self, player: &Uuid) -> Result<Option<String>, StorageError> {
        let Some(provider) = self.skin_provider() else {
            return Ok(None);
        };
        provider.get(&player_key(player)).await
    }

    pub async fn has_skin(&self, player: &Uuid) -> Result<bool, StorageError> {
        Ok(self.get_skin(player).await?.is_some())
    }

    pub async fn set_skin(&self, player: &Uuid, skin_ref: &str) -> Result<(), StorageError> {
        let provider = self.skin_provider().ok_or(StorageError::NotReady)?;
        provider
            .put(&player_key(player), skin_ref.to_string())
            .await?;
        debug!(%player, skin = skin_ref, "Skin set");
        Ok(())
    }

    pub async fn clear_skin(&self, player: &Uuid) -> Result<(), StorageError> {
        let provider = self.skin_provider().ok_or(StorageError::NotReady)?;
        provider.remove(&player_key(player)).await?;
        debug!(%player, "Skin cleared");
        Ok(())
    }

    /// Players currently displaying `skin_ref`.
    pub async fn players_with_skin(&self, skin_ref: &str) -> Result<Vec<Uuid>, StorageError> {
        match self.skin_provider() {
            Some(provider) => players_with_value(provider.as_ref(), skin_ref).await,
            None => Ok(Vec::new()),
        }
    }
}

async fn players_with_value(
    provider: &dyn DataProvider<String>,
    wanted: &str,
) -> Result<Vec<Uuid>, StorageError> {
    let mut matches = Vec::new();
    for key in provider.keys(None).await? {
        if provider.get(&key).await?.as_deref() == Some(wanted) {
            matches.push(key);
        }
    }
    Ok(parse_players(matches))
}

fn parse_players(keys: Vec<String>) -> Vec<Uuid> {
    keys.into_iter()
        .filter_map(|key| match Uuid::parse_str(&key) {
            Ok(player) => Some(player),
            Err(e) => {
                warn!(key = %key, error = %e, "Ignoring record with a non-UUID key");
                None
            }
        })
        .collect()
}
