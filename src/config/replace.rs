//! Chat substitution switches.

use serde::Deserialize;

use super::defaults::default_true;

/// `[replace]` section.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ReplaceConfig {
    #[serde(default)]
    pub chat: ChatReplaceConfig,
}

/// `[replace.chat]` section.
#[derive(Debug, Clone, Deserialize)]
pub struct ChatReplaceConfig {
    /// Replace the name in generic player-identity lookups.
    #[serde(default = "default_true")]
    pub player: bool,
    /// Replace the sender name on messages a player sends.
    #[serde(default = "default_true")]
    pub out: bool,
    /// Incoming message switches.
    #[serde(default, rename = "in")]
    pub incoming: IncomingReplaceConfig,
}

impl Default for ChatReplaceConfig {
    fn default() -> Self {
        Self {
            player: true,
            out: true,
            incoming: IncomingReplaceConfig::default(),
        }
    }
}

/// `[replace.chat.in]` section.
#[derive(Debug, Clone, Deserialize)]
pub struct IncomingReplaceConfig {
    /// Replace names in received messages.
    #[serde(default)]
    pub general: bool,
    /// Replace names in command input. Takes precedence over `general`.
    #[serde(default = "default_true")]
    pub command: bool,
}

impl Default for IncomingReplaceConfig {
    fn default() -> Self {
        Self {
            general: false,
            command: true,
        }
    }
}
