//! Tracing setup and span constructors.

use tracing_subscriber::EnvFilter;

/// Install the global fmt subscriber.
///
/// `RUST_LOG` overrides the default `info` filter; `NICKNAMER_LOG_FORMAT=json`
/// switches to JSON lines.
pub fn init() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true);

    if std::env::var("NICKNAMER_LOG_FORMAT").is_ok_and(|f| f.eq_ignore_ascii_case("json")) {
        builder.json().init();
    } else {
        builder.init();
    }
}

/// Standardized span constructors.
pub mod spans {
    use tracing::{Span, debug_span, info_span};
    use uuid::Uuid;

    /// Span for evaluating one replacement event.
    pub fn substitution(kind: &str, player: &Uuid) -> Span {
        debug_span!("substitution", kind = %kind, player = %player)
    }

    /// Span for bringing up a storage backend.
    pub fn storage(backend: &str) -> Span {
        info_span!("storage", backend = %backend)
    }
}
