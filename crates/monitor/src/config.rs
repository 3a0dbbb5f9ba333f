//! Configuration loading
//!
//! Values come from an optional `pod-monitor.{toml,yaml,json}` file in the
//! working directory, overridden by `MONITOR_*` environment variables.

use anyhow::{Context, Result};
use config::{Config, Environment, File};
use monitor_lib::{ConfigError, MonitorConfig};

/// Load and validate the monitor configuration
pub fn load() -> Result<MonitorConfig> {
    let config = Config::builder()
        .add_source(File::with_name("pod-monitor").required(false))
        .add_source(Environment::with_prefix("MONITOR").try_parsing(true))
        .build()
        .map_err(|e| ConfigError::Load(e.to_string()))?;

    from_source(config)
}

fn from_source(config: Config) -> Result<MonitorConfig> {
    let monitor: MonitorConfig = config
        .try_deserialize()
        .map_err(|e| ConfigError::Load(e.to_string()))?;

    monitor
        .validate()
        .context("refusing to start with invalid configuration")?;

    Ok(monitor)
}
