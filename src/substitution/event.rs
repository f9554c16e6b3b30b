//! Replacement events raised by the host.

use std::fmt;
use uuid::Uuid;

/// Leading character that marks incoming text as a command.
pub const COMMAND_PREFIX: char = '/';

/// Where the name being rendered appears.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EventKind {
    /// Generic "who is this player" resolution.
    Player,
    /// A message the player sends, as seen by recipients.
    Outgoing,
    /// A message the player receives. `context` is the raw text, used to
    /// detect commands.
    Incoming { context: String },
}

impl EventKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Player => "player",
            Self::Outgoing => "outgoing",
            Self::Incoming { .. } => "incoming",
        }
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A name about to be rendered, with an optional replacement.
#[derive(Debug, Clone)]
pub struct ReplacementEvent {
    player: Uuid,
    kind: EventKind,
    original: String,
    replacement: Option<String>,
}

impl ReplacementEvent {
    pub fn new(player: Uuid, kind: EventKind, original: impl Into<String>) -> Self {
        Self {
            player,
            kind,
            original: original.into(),
            replacement: None,
        }
    }

    pub fn player(player: Uuid, original: impl Into<String>) -> Self {
        Self::new(player, EventKind::Player, original)
    }

    pub fn outgoing(player: Uuid, original: impl Into<String>) -> Self {
        Self::new(player, EventKind::Outgoing, original)
    }

    pub fn incoming(
        player: Uuid,
        original: impl Into<String>,
        context: impl Into<String>,
    ) -> Self {
        Self::new(
            player,
            EventKind::Incoming {
                context: context.into(),
            },
            original,
        )
    }

    /// The player whose name is rendered.
    pub fn subject(&self) -> &Uuid {
        &self.player
    }

    pub fn kind(&self) -> &EventKind {
        &self.kind
    }

    /// The name as the host would render it.
    pub fn original(&self) -> &str {
        &self.original
    }

    pub fn replacement(&self) -> Option<&str> {
        self.replacement.as_deref()
    }

    pub fn set_replacement(&mut self, name: impl Into<String>) {
        self.replacement = Some(name.into());
    }

    /// The name to render: the replacement if set, otherwise the original.
    pub fn rendered(&self) -> &str {
        self.replacement.as_deref().unwrap_or(&self.original)
    }

    /// Whether this is incoming text that starts with [`COMMAND_PREFIX`].
    pub fn is_command(&self) -> bool {
        matches!(&self.kind, EventKind::Incoming { context } if context.starts_with(COMMAND_PREFIX))
    }
}

impl fmt::Display for ReplacementEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}[player={}, original={}, replacement={}]",
            self.kind,
            self.player,
            self.original,
            self.replacement.as_deref().unwrap_or("-")
        )
    }
}
