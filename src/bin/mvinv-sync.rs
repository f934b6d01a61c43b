//! Multiverse-Inventories sync sidecar.
//!
//! Watches the Multiverse-Core world list, adds an inventory group for every
//! survival world, and reloads the plugin over RCON when the group file changed.

use anyhow::Context;
use clap::Parser;
use mvinv_sync::{Config, RconSession, SyncLoop};
use tracing::{info, warn};
use tracing_subscriber::{fmt, EnvFilter};

#[tokio::main(flavor = "current_thread")]
async fn main() -> anyhow::Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    fmt().with_env_filter(filter).with_target(false).init();

    let config = Config::parse();
    let rcon = config.rcon();

    info!(
        "Starting Multiverse-Inventories sync sidecar (target: {})",
        rcon.addr()
    );

    let mut sync = SyncLoop::new(RconSession::new(rcon), config.sync_targets());

    if config.once {
        let result = sync.tick().await;
        sync.close().await;

        let report = result.context("sync pass failed")?;
        info!(
            groups = report.groups,
            changed = report.changed,
            reloaded = report.reloaded,
            "sync pass done"
        );
        return Ok(());
    }

    sync.run(config.interval(), shutdown_signal()).await;
    info!("stopped");

    Ok(())
}

async fn shutdown_signal() {
    match tokio::signal::ctrl_c().await {
        Ok(()) => info!("received Ctrl-C, shutting down"),
        Err(err) => {
            warn!(error = %err, "cannot listen for Ctrl-C");
            std::future::pending::<()>().await;
        }
    }
}
