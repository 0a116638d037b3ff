//! Configuration Loader - File Loading and Validation
//!
//! Handles loading `config.toml`, validating all parameters,
//! and providing clear error messages for misconfiguration.

use std::net::SocketAddr;
use std::path::Path;

use anyhow::{Context, Result};
use tracing::info;

use super::AppConfig;

/// Load and validate configuration from a TOML file.
///
/// # Errors
/// Returns detailed error if:
/// - File doesn't exist or can't be read
/// - TOML parsing fails
/// - Validation rules are violated
pub fn load_config(path: &str) -> Result<AppConfig> {
  let path = Path::new(path);

  let content = std::fs::read_to_string(path)
    .with_context(|| format!("Failed to read config file: {}", path.display()))?;

  let config = parse_config(&content)?;

  info!(
    endpoint = %config.feed.endpoint,
    validation = ?config.feed.validation,
    metrics = config.metrics.enabled,
    "Configuration loaded successfully"
  );

  Ok(config)
}

/// Parse and validate configuration from TOML text.
///
/// # Errors
/// Fails on TOML syntax errors or validation failures.
pub fn parse_config(content: &str) -> Result<AppConfig> {
  let config: AppConfig =
    toml::from_str(content).with_context(|| "Failed to parse config.toml")?;

  validate_config(&config)?;
  Ok(config)
}

/// Validate all configuration parameters.
fn validate_config(config: &AppConfig) -> Result<()> {
  let endpoint = config.feed.endpoint.trim();
  anyhow::ensure!(!endpoint.is_empty(), "Feed endpoint must not be empty");
  anyhow::ensure!(
    endpoint.starts_with("ws://") || endpoint.starts_with("wss://"),
    "Feed endpoint must use ws:// or wss://, got {endpoint}"
  );

  anyhow::ensure!(
    !config.logging.level.trim().is_empty(),
    "Log level must not be empty"
  );

  if config.metrics.enabled {
    config
      .metrics
      .bind_address
      .parse::<SocketAddr>()
      .with_context(|| {
        format!(
          "Invalid metrics bind_address: {}",
          config.metrics.bind_address
        )
      })?;
  }

  Ok(())
}
