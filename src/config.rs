//! Configuration
//!
//! Layered configuration, later sources win:
//! - built-in defaults
//! - TOML config file (optional)
//! - environment variables
//! - command-line flags (applied by `main`)
//!
//! The loaded [`Config`] is passed explicitly; there is no global instance.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{info, warn};

pub const DEFAULT_STATUS_FILE: &str = "/etc/openvpn/server/logs/vpn-udp-status.log";
pub const DEFAULT_STATE_PATH: &str = "/etc/openvpn/server/logs/state.json";

/// Main configuration structure
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Logging configuration
    pub logging: LoggingConfig,

    /// Polling and persistence
    pub monitor: MonitorConfig,

    /// Table appearance
    pub display: DisplayConfig,

    /// Paths configuration
    pub paths: PathsConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String,
    pub format: String,
    pub output: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MonitorConfig {
    pub status_file: PathBuf,
    pub interval_secs: f64,
    pub persist_interval_secs: u64,
    /// Used when persistence is enabled without an explicit path
    pub state_path: PathBuf,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DisplayConfig {
    pub color: bool,
    pub ascii: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PathsConfig {
    pub log_directory: PathBuf,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "ERROR".to_string(),
            format: "pretty".to_string(),
            output: "console".to_string(),
        }
    }
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            status_file: PathBuf::from(DEFAULT_STATUS_FILE),
            interval_secs: 1.0,
            persist_interval_secs: 5,
            state_path: PathBuf::from(DEFAULT_STATE_PATH),
        }
    }
}

impl Default for DisplayConfig {
    fn default() -> Self {
        Self {
            color: true,
            ascii: false,
        }
    }
}

impl Default for PathsConfig {
    fn default() -> Self {
        Self {
            log_directory: PathBuf::from("logs"),
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            logging: LoggingConfig::default(),
            monitor: MonitorConfig::default(),
            display: DisplayConfig::default(),
            paths: PathsConfig::default(),
        }
    }
}

impl Config {
    /// Load configuration from an explicit file, or the first one found, then the environment
    pub fn load(explicit: Option<&Path>) -> Result<Self> {
        let mut config = match explicit {
            Some(path) => Self::load_from_file(path)?,
            None => Self::discover()?,
        };

        // Override with environment variables
        config.apply_env_overrides()?;

        Ok(config)
    }

    fn discover() -> Result<Self> {
        let config_paths = [
            Some(PathBuf::from("ovpn-usage.toml")),
            Some(PathBuf::from(".ovpn-usage.toml")),
            dirs::config_dir().map(|d| d.join("ovpn-usage").join("config.toml")),
        ];

        for path in config_paths.iter().flatten() {
            if path.exists() {
                info!(config_file = %path.display(), "Loading configuration from file");
                return Self::load_from_file(path);
            }
        }

        Ok(Config::default())
    }

    /// Load configuration from TOML file
    pub fn load_from_file(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        let config: Config = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?;

        Ok(config)
    }

    /// Apply environment variable overrides
    pub fn apply_env_overrides(&mut self) -> Result<()> {
        // Logging overrides
        if let Ok(val) = env::var("LOG_LEVEL") {
            self.logging.level = val;
        }
        if let Ok(val) = env::var("LOG_FORMAT") {
            self.logging.format = val;
        }
        if let Ok(val) = env::var("LOG_OUTPUT") {
            self.logging.output = val;
        }

        // Monitor overrides
        if let Ok(val) = env::var("OVPN_USAGE_STATUS_FILE") {
            self.monitor.status_file = PathBuf::from(val);
        }
        if let Ok(val) = env::var("OVPN_USAGE_INTERVAL") {
            self.monitor.interval_secs = val.parse().context("Invalid OVPN_USAGE_INTERVAL")?;
        }
        if let Ok(val) = env::var("OVPN_USAGE_STATE_PATH") {
            self.monitor.state_path = PathBuf::from(val);
        }
        if let Ok(val) = env::var("OVPN_USAGE_PERSIST_INTERVAL") {
            self.monitor.persist_interval_secs = val
                .parse()
                .context("Invalid OVPN_USAGE_PERSIST_INTERVAL")?;
        }

        // Path overrides
        if let Ok(val) = env::var("OVPN_USAGE_LOG_DIR") {
            self.paths.log_directory = PathBuf::from(val);
        }

        Ok(())
    }

    /// Poll interval as a [`Duration`]. Rejects anything that is not a
    /// positive, representable duration (NaN, negatives, values that round to
    /// zero, values past `Duration::MAX`).
    pub fn poll_interval(&self) -> Result<Duration> {
        let interval = self.monitor.interval_secs;
        match Duration::try_from_secs_f64(interval) {
            Ok(duration) if !duration.is_zero() => Ok(duration),
            _ => Err(anyhow::anyhow!(
                "Poll interval must be a positive number of seconds, got {}",
                interval
            )),
        }
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<()> {
        let interval = self.poll_interval()?;
        if interval < Duration::from_millis(100) {
            warn!(
                interval_secs = self.monitor.interval_secs,
                "Poll interval is very short"
            );
        }

        if self.monitor.persist_interval_secs == 0 {
            return Err(anyhow::anyhow!("Persist interval must be greater than 0"));
        }

        if !matches!(self.logging.format.as_str(), "pretty" | "json") {
            return Err(anyhow::anyhow!(
                "Log format must be 'pretty' or 'json', got '{}'",
                self.logging.format
            ));
        }

        if !matches!(self.logging.output.as_str(), "console" | "file" | "both") {
            return Err(anyhow::anyhow!(
                "Log output must be 'console', 'file' or 'both', got '{}'",
                self.logging.output
            ));
        }

        Ok(())
    }
}
