//! Live Feed Binder - Entry Point
//!
//! Connects to the configured vehicle feed and keeps the latest fleet
//! snapshot in memory until SIGINT.
//!
//! Wiring sequence:
//! 1. Load config.toml (or the path given as first argument) + validate
//! 2. Init tracing (JSON structured logging unless disabled)
//! 3. Create Prometheus registry + binder over the WebSocket connector
//! 4. Spawn health/metrics server (/live, /ready, /metrics)
//! 5. Spawn the renderer: one summary line per value change
//! 6. Spawn the config watcher (endpoint hot reload)
//! 7. Start the binder against the configured endpoint
//! 8. Apply endpoint changes until SIGINT → stop → exit

#[cfg(not(target_env = "msvc"))]
#[global_allocator]
static GLOBAL: tikv_jemallocator::Jemalloc = tikv_jemallocator::Jemalloc;

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use tokio::signal;
use tokio::sync::{broadcast, watch};
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use live_feed_binder::adapters::metrics::{HealthServer, HealthState, MetricsRegistry};
use live_feed_binder::adapters::ws::WsConnector;
use live_feed_binder::config::hot_reload::ConfigWatcher;
use live_feed_binder::config::{loader, AppConfig};
use live_feed_binder::domain::fleet::FleetSummary;
use live_feed_binder::usecases::binder::{Current, LiveFeedBinder};

#[tokio::main]
async fn main() -> Result<()> {
    // ── 1. Load configuration ───────────────────────────────
    let config_path = std::env::args()
        .nth(1)
        .unwrap_or_else(|| "config.toml".to_string());
    let config = loader::load_config(&config_path).context("Failed to load configuration")?;

    // ── 2. Initialize logging ───────────────────────────────
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.logging.level));
    if config.logging.json {
        tracing_subscriber::fmt().with_env_filter(filter).json().init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }

    info!(
        version = env!("CARGO_PKG_VERSION"),
        endpoint = %config.feed.endpoint,
        validation = ?config.feed.validation,
        "Starting live feed binder"
    );

    // ── 3. Shutdown channel, metrics, binder ────────────────
    let (shutdown_tx, _shutdown_rx) = broadcast::channel::<()>(1);

    let metrics = Arc::new(MetricsRegistry::new().context("Failed to create metrics registry")?);
    let mut binder = LiveFeedBinder::with_metrics(
        Arc::new(WsConnector::new()),
        config.feed.binder_options(),
        Arc::clone(&metrics),
    );

    // ── 4. Health/metrics server ────────────────────────────
    let health_handle = if config.metrics.enabled {
        let server = HealthServer::new(
            HealthState::new(binder.status(), Arc::clone(&metrics)),
            config.metrics.bind_address.clone(),
        );
        let health_shutdown = shutdown_tx.subscribe();
        Some(tokio::spawn(async move {
            if let Err(e) = server.run(health_shutdown).await {
                error!(error = %e, "Health server failed");
            }
        }))
    } else {
        None
    };

    // ── 5. Renderer ─────────────────────────────────────────
    let render_handle = tokio::spawn(render(binder.subscribe(), shutdown_tx.subscribe()));

    // ── 6. Config watcher ───────────────────────────────────
    let mut config_updates = if config.feed.reload_interval_secs > 0 {
        let (mut watcher, rx) = ConfigWatcher::new(
            &config_path,
            Duration::from_secs(config.feed.reload_interval_secs),
            config.clone(),
        );
        let watcher_shutdown = shutdown_tx.subscribe();
        tokio::spawn(async move {
            if let Err(e) = watcher.run(watcher_shutdown).await {
                error!(error = %e, "Config watcher failed");
            }
        });
        Some(rx)
    } else {
        None
    };

    // ── 7. Start the binder ─────────────────────────────────
    if let Err(e) = binder.start(config.feed.endpoint.as_str()).await {
        // No retry here: a reload with a different endpoint tries again.
        warn!(error = %e, "Initial feed connection failed");
    }

    // ── 8. Run until SIGINT ─────────────────────────────────
    loop {
        tokio::select! {
            _ = signal::ctrl_c() => {
                info!("SIGINT received, initiating graceful shutdown");
                break;
            }
            update = next_config(&mut config_updates) => {
                if let Some(new_config) = update {
                    apply_config(&mut binder, &new_config).await;
                }
            }
        }
    }

    // ── Graceful shutdown ───────────────────────────────────
    binder.stop().await;
    let _ = shutdown_tx.send(());

    let _ = tokio::time::timeout(Duration::from_secs(5), render_handle).await;
    if let Some(handle) = health_handle {
        let _ = tokio::time::timeout(Duration::from_secs(5), handle).await;
    }

    let stats = binder.stats();
    info!(
        frames_accepted = stats.frames_accepted,
        frames_rejected = stats.frames_rejected,
        connections = stats.connections_opened,
        "Shutdown complete"
    );
    Ok(())
}

/// Wait for the next published config. Pends forever when reload is off
/// or the watcher has gone away.
async fn next_config(updates: &mut Option<watch::Receiver<AppConfig>>) -> Option<AppConfig> {
    let Some(rx) = updates.as_mut() else {
        return std::future::pending().await;
    };

    if rx.changed().await.is_err() {
        warn!("Config watcher stopped, hot reload disabled");
        *updates = None;
        return None;
    }

    Some(rx.borrow_and_update().clone())
}

/// Move the binder to the endpoint of a reloaded config.
///
/// Edits that leave `feed.endpoint` alone do not touch the connection.
async fn apply_config(binder: &mut LiveFeedBinder, config: &AppConfig) {
    let endpoint = config.feed.endpoint.as_str();

    if let Err(e) = binder.follow_endpoint(endpoint).await {
        warn!(endpoint, error = %e, "Failed to switch feed endpoint");
    }
}

/// Rendering stand-in: log a fleet summary every time the value changes.
async fn render(mut rx: watch::Receiver<Current>, mut shutdown_rx: broadcast::Receiver<()>) {
    loop {
        tokio::select! {
            biased;
            _ = shutdown_rx.recv() => return,
            changed = rx.changed() => {
                if changed.is_err() {
                    return;
                }
                let current = rx.borrow_and_update().clone();
                let summary = FleetSummary::from_snapshots(&current);
                info!(
                    vehicles = summary.total,
                    available = summary.available,
                    full = summary.full,
                    unavailable = summary.unavailable,
                    open_seats = summary.open_seats,
                    newest_update = ?summary.newest_update,
                    "{summary}"
                );
            }
        }
    }
}
