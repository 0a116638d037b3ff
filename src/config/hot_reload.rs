//! Config Hot-Reload - Re-read config.toml on an Interval
//!
//! Periodically re-reads config.toml and compares it with the last
//! version seen. If it changed and still validates, the new config is
//! published on a `tokio::sync::watch` channel. The binary uses this
//! to move the binder to a new feed endpoint without restarting.

use std::time::Duration;

use anyhow::Result;
use tokio::sync::{broadcast, watch};
use tracing::{debug, info, instrument, warn};

use super::AppConfig;

/// Watches config.toml for changes and broadcasts updates.
///
/// Polls the file rather than using a filesystem watcher, which has
/// portability issues across Linux/macOS/Docker volumes.
pub struct ConfigWatcher {
    /// Path to config.toml.
    config_path: String,
    /// Time between checks.
    interval: Duration,
    /// Watch channel sender for config updates.
    config_tx: watch::Sender<AppConfig>,
    /// Hash of the last file contents seen.
    last_hash: Option<u64>,
}

impl ConfigWatcher {
    /// Create a new config watcher.
    ///
    /// Returns the watcher and a receiver that yields every accepted config.
    pub fn new(
        config_path: &str,
        interval: Duration,
        initial_config: AppConfig,
    ) -> (Self, watch::Receiver<AppConfig>) {
        let (config_tx, config_rx) = watch::channel(initial_config);

        let watcher = Self {
            config_path: config_path.to_string(),
            interval,
            config_tx,
            last_hash: None,
        };

        (watcher, config_rx)
    }

    /// Run the config watcher loop until shutdown.
    ///
    /// # Errors
    /// Currently never fails; reload errors keep the previous config.
    #[instrument(skip(self, shutdown_rx), fields(path = %self.config_path))]
    pub async fn run(&mut self, mut shutdown_rx: broadcast::Receiver<()>) -> Result<()> {
        info!(interval_secs = self.interval.as_secs(), "Config watcher started");

        self.last_hash = self.compute_hash().await;

        loop {
            tokio::select! {
                biased;
                _ = shutdown_rx.recv() => {
                    info!("Config watcher shutting down");
                    return Ok(());
                }
                () = tokio::time::sleep(self.interval) => {
                    self.check_and_reload().await;
                }
            }
        }
    }

    /// Check if the file has changed and reload if so.
    ///
    /// Returns whether a new config was published.
    pub async fn check_and_reload(&mut self) -> bool {
        let new_hash = self.compute_hash().await;

        if new_hash == self.last_hash {
            debug!("Config unchanged");
            return false;
        }

        info!("Config change detected, reloading...");

        match super::loader::load_config(&self.config_path) {
            Ok(new_config) => {
                self.last_hash = new_hash;
                let changed = self.config_tx.send_if_modified(|current| {
                    if *current == new_config {
                        return false;
                    }
                    *current = new_config;
                    true
                });
                if changed {
                    info!("Config reloaded successfully");
                } else {
                    debug!("Config file changed without semantic changes");
                }
                changed
            }
            Err(e) => {
                warn!(error = %e, "Failed to reload config - keeping current");
                false
            }
        }
    }

    /// Hash the config file contents for diff detection.
    async fn compute_hash(&self) -> Option<u64> {
        use std::collections::hash_map::DefaultHasher;
        use std::hash::{Hash, Hasher};

        let content = tokio::fs::read_to_string(&self.config_path).await.ok()?;

        let mut hasher = DefaultHasher::new();
        content.hash(&mut hasher);
        Some(hasher.finish())
    }
}
