//! nicknamer - nickname and skin substitution service.
//!
//! Loads the config, brings up the selected storage backend and keeps it open
//! until interrupted.

use nicknamer::config::Config;
use nicknamer::plugin::{NickNamer, Startup};
use nicknamer::telemetry;
use tracing::{error, info, warn};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    telemetry::init();

    // Load configuration
    let config_path = std::env::args()
        .nth(1)
        .unwrap_or_else(|| "config.toml".to_string());

    let config = Config::load(&config_path).map_err(|e| {
        error!(path = %config_path, error = %e, "Failed to load config");
        e
    })?;

    info!(
        storage = %config.storage.kind,
        player = config.replace.chat.player,
        out = config.replace.chat.out,
        "Starting nicknamer"
    );

    let plugin = NickNamer::new(config);

    match plugin.start_storage().await? {
        Startup::Ready => report(&plugin).await,
        Startup::Pending(task) => {
            tokio::select! {
                result = task => {
                    result??;
                    report(&plugin).await;
                }
                _ = tokio::signal::ctrl_c() => {
                    info!("Interrupted during storage startup");
                    plugin.shutdown().await;
                    return Ok(());
                }
            }
        }
    }

    tokio::signal::ctrl_c().await?;
    info!("Shutting down");
    plugin.shutdown().await;
    Ok(())
}

async fn report(plugin: &NickNamer) {
    match plugin.identity().nicked_players().await {
        Ok(players) => info!(count = players.len(), "Loaded nicked players"),
        Err(e) => warn!(error = %e, "Failed to count nicked players"),
    }
}
