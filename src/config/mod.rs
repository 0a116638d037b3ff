//! Configuration Module - TOML-based Feed Configuration
//!
//! Loads and validates configuration from `config.toml`. The feed
//! endpoint lives here and nowhere else, so hot reload can move the
//! binder to a new endpoint without a restart.

pub mod hot_reload;
pub mod loader;

use serde::Deserialize;

use crate::domain::snapshot::ElementValidation;
use crate::usecases::binder::BinderOptions;

/// Top-level configuration.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct AppConfig {
  /// Live feed connection and decoding.
  pub feed: FeedConfig,
  /// Log output.
  #[serde(default)]
  pub logging: LoggingConfig,
  /// Metrics and health endpoints.
  #[serde(default)]
  pub metrics: MetricsConfig,
}

/// Live feed configuration.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct FeedConfig {
  /// WebSocket endpoint (`ws://` or `wss://`).
  pub endpoint: String,
  /// Per-element checking: "lenient" or "strict".
  #[serde(default)]
  pub validation: ElementValidation,
  /// Clear the current value immediately when the endpoint changes.
  #[serde(default)]
  pub reset_on_endpoint_change: bool,
  /// Seconds between config file checks; 0 disables hot reload.
  #[serde(default = "default_reload_interval")]
  pub reload_interval_secs: u64,
}

impl FeedConfig {
  pub const fn binder_options(&self) -> BinderOptions {
    BinderOptions {
      validation: self.validation,
      reset_on_endpoint_change: self.reset_on_endpoint_change,
    }
  }
}

/// Logging configuration.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct LoggingConfig {
  /// Log level (trace, debug, info, warn, error). `RUST_LOG` wins.
  #[serde(default = "default_log_level")]
  pub level: String,
  /// Emit JSON lines instead of human-readable output.
  #[serde(default = "default_true")]
  pub json: bool,
}

impl Default for LoggingConfig {
  fn default() -> Self {
    Self {
      level: default_log_level(),
      json: true,
    }
  }
}

/// Metrics and monitoring configuration.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct MetricsConfig {
  /// Serve /live, /ready and /metrics.
  #[serde(default = "default_true")]
  pub enabled: bool,
  /// Server bind address.
  #[serde(default = "default_metrics_addr")]
  pub bind_address: String,
}

impl Default for MetricsConfig {
  fn default() -> Self {
    Self {
      enabled: true,
      bind_address: default_metrics_addr(),
    }
  }
}

// Default value functions for serde

fn default_log_level() -> String {
  "info".to_string()
}

const fn default_true() -> bool {
  true
}

const fn default_reload_interval() -> u64 {
  60
}

fn default_metrics_addr() -> String {
  "0.0.0.0:9090".to_string()
}
