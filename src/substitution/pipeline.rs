//! Substitution rules.
//!
//! Each event is evaluated once: `Raw -> Evaluated -> {Unchanged | Replaced}`.
//! At most one rule fires per event and it sets the replacement at most once.
//!
//! Incoming events are checked in priority order: when command replacement is
//! enabled and the text is command-shaped, only the command rule applies.
//! Anything else falls through to the general rule.

use super::event::{EventKind, ReplacementEvent};
use crate::config::ReplaceConfig;
use crate::identity::IdentityManager;
use crate::telemetry::spans;
use std::sync::Arc;
use tracing::{Instrument, debug, warn};

/// Rule that selected an event for substitution.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Rule {
    Player,
    Outgoing,
    IncomingCommand,
    IncomingGeneral,
}

impl Rule {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Player => "player",
            Self::Outgoing => "outgoing",
            Self::IncomingCommand => "incoming_command",
            Self::IncomingGeneral => "incoming_general",
        }
    }
}

/// Final state of an evaluated event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Substitution {
    /// The original identity is kept.
    Unchanged,
    /// The replacement was set to the sender's nick.
    Replaced(Rule),
}

/// Applies nick substitution to replacement events.
pub struct SubstitutionPipeline {
    identity: Arc<IdentityManager>,
    flags: ReplaceConfig,
}

impl SubstitutionPipeline {
    pub fn new(identity: Arc<IdentityManager>, flags: ReplaceConfig) -> Self {
        Self { identity, flags }
    }

    /// The rule that governs `event`, if any is enabled for it.
    pub fn rule_for(&self, event: &ReplacementEvent) -> Option<Rule> {
        let chat = &self.flags.chat;
        match event.kind() {
            EventKind::Player => chat.player.then_some(Rule::Player),
            EventKind::Outgoing => chat.out.then_some(Rule::Outgoing),
            EventKind::Incoming { .. } => {
                if chat.incoming.command && event.is_command() {
                    Some(Rule::IncomingCommand)
                } else if chat.incoming.general {
                    Some(Rule::IncomingGeneral)
                } else {
                    None
                }
            }
        }
    }

    /// Evaluate `event`, setting its replacement if a rule fires and the
    /// sender is nicked.
    ///
    /// Storage failures are logged and leave the event unchanged.
    pub async fn handle(&self, event: &mut ReplacementEvent) -> Substitution {
        let span = spans::substitution(event.kind().as_str(), event.subject());
        self.evaluate(event).instrument(span).await
    }

    async fn evaluate(&self, event: &mut ReplacementEvent) -> Substitution {
        debug!(%event, "Replacement event");

        let Some(rule) = self.rule_for(event) else {
            return Substitution::Unchanged;
        };

        match self.identity.get_nick(event.subject()).await {
            Ok(Some(nick)) => {
                debug!(rule = rule.as_str(), nick = %nick, "Name replaced");
                event.set_replacement(nick);
                Substitution::Replaced(rule)
            }
            Ok(None) => Substitution::Unchanged,
            Err(e) => {
                warn!(rule = rule.as_str(), error = %e, "Nick lookup failed, leaving name unchanged");
                Substitution::Unchanged
            }
        }
    }
}
