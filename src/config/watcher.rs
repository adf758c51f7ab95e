//! Configuration file watcher for hot reload.
//!
//! Reloads the file on modification and pushes the validated result over a
//! channel; the HTTP server swaps its live tap settings from that channel.
//! A file that fails to load keeps the current configuration.

use std::path::Path;
use std::time::Duration;

use notify::{Config, Event, RecommendedWatcher, RecursiveMode, Watcher};
use tokio::sync::mpsc;

use crate::config::loader::load_config;
use crate::config::schema::GatewayConfig;

/// Watch `path` for changes, returning the watcher (keep it alive) and the
/// stream of reloaded configurations.
pub fn watch(
    path: &Path,
) -> Result<(RecommendedWatcher, mpsc::UnboundedReceiver<GatewayConfig>), notify::Error> {
    let (tx, rx) = mpsc::unbounded_channel();
    let reload_path = path.to_path_buf();

    let mut watcher = RecommendedWatcher::new(
        move |res: notify::Result<Event>| {
            let event = match res {
                Ok(event) => event,
                Err(e) => {
                    tracing::error!(error = %e, "config watch error");
                    return;
                }
            };
            if !(event.kind.is_modify() || event.kind.is_create()) {
                return;
            }
            match load_config(&reload_path) {
                Ok(config) => {
                    tracing::info!(path = ?reload_path, "configuration reloaded");
                    let _ = tx.send(config);
                }
                Err(e) => {
                    tracing::error!(
                        error = %e,
                        "config reload failed, keeping current configuration"
                    );
                }
            }
        },
        Config::default().with_poll_interval(Duration::from_secs(2)),
    )?;

    watcher.watch(path, RecursiveMode::NonRecursive)?;
    tracing::info!(path = ?path, "config watcher started");

    Ok((watcher, rx))
}
