//! Chat nick substitution.
//!
//! The host's event source wraps each chat or presence occurrence in a
//! [`ReplacementEvent`] and hands it to [`SubstitutionPipeline::handle`], which
//! decides whether the sender's displayed name is replaced by their nick.

mod event;
mod pipeline;

pub use event::{COMMAND_PREFIX, EventKind, ReplacementEvent};
pub use pipeline::{Rule, Substitution, SubstitutionPipeline};
