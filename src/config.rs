//! Configuration System using Figment
//!
//! Configuration is layered, later sources overriding earlier ones:
//! 1. Built-in defaults ([`SinkConfig::default`])
//! 2. `config/wsn_sink.toml` (or a file passed with `--config`), if present
//! 3. Environment variables prefixed with `WSN_SINK_`, `__` separating sections
//!
//! Command line flags are applied on top by the binary.
//!
//! # Example
//! ```no_run
//! use wsn_sink::config::SinkConfig;
//!
//! let config = SinkConfig::load()?;
//! println!("Listening on {} at {} baud", config.transport.port, config.transport.baud_rate);
//! # Ok::<(), wsn_sink::error::SinkError>(())
//! ```

use crate::error::{AppResult, SinkError};
use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Default location of the configuration file, relative to the working directory.
pub const DEFAULT_CONFIG_PATH: &str = "config/wsn_sink.toml";

/// Top-level sink configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SinkConfig {
    /// Application settings
    #[serde(default)]
    pub application: ApplicationConfig,
    /// Serial line source settings
    #[serde(default)]
    pub transport: TransportConfig,
    /// CSV persistence settings
    #[serde(default)]
    pub storage: StorageConfig,
    /// Chart refresh settings
    #[serde(default)]
    pub chart: ChartConfig,
}

/// Application-level configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ApplicationConfig {
    /// Application name, used as the window title
    #[serde(default = "default_name")]
    pub name: String,
    /// Logging level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub log_level: String,
    /// Log output format (pretty, compact, json)
    #[serde(default = "default_log_format")]
    pub log_format: String,
}

/// Serial line source configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransportConfig {
    /// Serial port path (e.g., "/dev/ttyUSB0", "COM6")
    #[serde(default = "default_port")]
    pub port: String,
    /// Communication speed
    #[serde(default = "default_baud_rate")]
    pub baud_rate: u32,
    /// Per-read timeout in milliseconds; bounds how long shutdown waits on the port
    #[serde(default = "default_read_timeout")]
    pub read_timeout_ms: u64,
}

/// CSV persistence configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StorageConfig {
    /// Append-only CSV file receiving one row per accepted record
    #[serde(default = "default_output_path")]
    pub output_path: PathBuf,
}

/// Chart renderer configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChartConfig {
    /// Redraw cadence in milliseconds
    #[serde(default = "default_refresh_interval")]
    pub refresh_interval_ms: u64,
    /// Log snapshot summaries instead of opening a window
    #[serde(default)]
    pub headless: bool,
}

// Default value functions
fn default_name() -> String {
    "WSN Sink".to_string()
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> String {
    "pretty".to_string()
}

fn default_port() -> String {
    "/dev/ttyUSB0".to_string()
}

fn default_baud_rate() -> u32 {
    9600
}

fn default_read_timeout() -> u64 {
    1000
}

fn default_output_path() -> PathBuf {
    PathBuf::from("sink_data.csv")
}

fn default_refresh_interval() -> u64 {
    1000
}

impl Default for ApplicationConfig {
    fn default() -> Self {
        Self {
            name: default_name(),
            log_level: default_log_level(),
            log_format: default_log_format(),
        }
    }
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            port: default_port(),
            baud_rate: default_baud_rate(),
            read_timeout_ms: default_read_timeout(),
        }
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            output_path: default_output_path(),
        }
    }
}

impl Default for ChartConfig {
    fn default() -> Self {
        Self {
            refresh_interval_ms: default_refresh_interval(),
            headless: false,
        }
    }
}

impl TransportConfig {
    /// Read timeout as a [`Duration`]
    pub fn read_timeout(&self) -> Duration {
        Duration::from_millis(self.read_timeout_ms)
    }
}

impl ChartConfig {
    /// Redraw cadence as a [`Duration`]
    pub fn refresh_interval(&self) -> Duration {
        Duration::from_millis(self.refresh_interval_ms)
    }
}

impl SinkConfig {
    /// Load configuration from the default file location and environment variables
    ///
    /// Environment variables override the file with prefix `WSN_SINK_`.
    /// Example: `WSN_SINK_TRANSPORT__BAUD_RATE=115200`
    pub fn load() -> AppResult<Self> {
        Self::load_from(DEFAULT_CONFIG_PATH)
    }

    /// Load configuration from a specific file path
    ///
    /// A missing file is not an error; defaults and environment still apply.
    pub fn load_from<P: AsRef<Path>>(path: P) -> AppResult<Self> {
        Self::figment(path.as_ref()).extract().map_err(SinkError::from)
    }

    fn figment(path: &Path) -> Figment {
        Figment::from(Serialized::defaults(SinkConfig::default()))
            .merge(Toml::file(path))
            .merge(Env::prefixed("WSN_SINK_").split("__"))
    }

    /// Validate configuration after loading
    pub fn validate(&self) -> AppResult<()> {
        let valid_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_levels.contains(&self.application.log_level.to_lowercase().as_str()) {
            return Err(SinkError::Configuration(format!(
                "Invalid log_level '{}'. Must be one of: {}",
                self.application.log_level,
                valid_levels.join(", ")
            )));
        }

        let valid_formats = ["pretty", "compact", "json"];
        if !valid_formats.contains(&self.application.log_format.as_str()) {
            return Err(SinkError::Configuration(format!(
                "Invalid log_format '{}'. Must be one of: {}",
                self.application.log_format,
                valid_formats.join(", ")
            )));
        }

        if self.transport.port.trim().is_empty() {
            return Err(SinkError::Configuration(
                "transport.port must not be empty".to_string(),
            ));
        }

        if self.transport.baud_rate == 0 {
            return Err(SinkError::Configuration(
                "transport.baud_rate must be greater than zero".to_string(),
            ));
        }

        if self.storage.output_path.as_os_str().is_empty() {
            return Err(SinkError::Configuration(
                "storage.output_path must not be empty".to_string(),
            ));
        }

        if self.chart.refresh_interval_ms == 0 {
            return Err(SinkError::Configuration(
                "chart.refresh_interval_ms must be greater than zero".to_string(),
            ));
        }

        Ok(())
    }
}
