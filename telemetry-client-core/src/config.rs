//! Configuration loading and management
//!
//! Configuration is loaded from `~/.config/telemetry-client/config.toml`
//!
//! This module follows the XDG Base Directory Specification:
//! - Config: `$XDG_CONFIG_HOME/telemetry-client/` (~/.config/telemetry-client/)
//! - Data: `$XDG_DATA_HOME/telemetry-client/` (~/.local/share/telemetry-client/)
//! - State/Logs: `$XDG_STATE_HOME/telemetry-client/` (~/.local/state/telemetry-client/)

use crate::error::{Error, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;
use uuid::Uuid;

const APP_DIR: &str = "telemetry-client";

/// File name of the signal snapshot inside the data directory
pub const SNAPSHOT_FILE_NAME: &str = "telemetrysignalcache";

/// Returns a best-effort home directory path.
fn home_dir() -> PathBuf {
    std::env::var_os("HOME")
        .map(PathBuf::from)
        .or_else(dirs::home_dir)
        .unwrap_or_else(|| PathBuf::from("."))
}

/// Returns XDG_CONFIG_HOME or ~/.config
fn xdg_config_home() -> PathBuf {
    std::env::var("XDG_CONFIG_HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| home_dir().join(".config"))
}

/// Returns XDG_DATA_HOME or ~/.local/share
fn xdg_data_home() -> PathBuf {
    std::env::var("XDG_DATA_HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| home_dir().join(".local/share"))
}

/// Returns XDG_STATE_HOME or ~/.local/state
fn xdg_state_home() -> PathBuf {
    std::env::var("XDG_STATE_HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| home_dir().join(".local/state"))
}

/// Main configuration struct
#[derive(Debug, Deserialize, Default, Clone)]
pub struct Config {
    /// Client identity and behaviour
    #[serde(default)]
    pub client: ClientConfig,

    /// Delivery cadence and HTTP settings
    #[serde(default)]
    pub delivery: DeliveryConfig,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Client configuration
///
/// Identifies the application to the ingestion service and controls which
/// signals are accepted.
#[derive(Debug, Deserialize, Clone)]
pub struct ClientConfig {
    /// Application ID issued by the ingestion service (UUID)
    pub app_id: Option<String>,

    /// Base URL of the ingestion API
    #[serde(default = "default_api_base_url")]
    pub api_base_url: String,

    /// Identifier used for every signal that does not name its own user
    pub default_user: Option<String>,

    /// Application version reported in the common payload
    pub app_version: Option<String>,

    /// Print per-signal and per-batch detail to the log
    #[serde(default)]
    pub show_debug_logs: bool,

    /// Accept signals from debug builds
    #[serde(default)]
    pub send_signals_in_debug: bool,

    /// Emit a `newSessionBegan` signal whenever a session starts
    #[serde(default = "default_true")]
    pub send_new_session_began_signal: bool,

    /// Override the directory holding the signal snapshot
    pub cache_dir: Option<PathBuf>,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            app_id: None,
            api_base_url: default_api_base_url(),
            default_user: None,
            app_version: None,
            show_debug_logs: false,
            send_signals_in_debug: false,
            send_new_session_began_signal: true,
            cache_dir: None,
        }
    }
}

impl ClientConfig {
    /// Check if the client has everything it needs to send signals
    pub fn is_ready(&self) -> bool {
        self.app_id.is_some()
    }

    /// Parse the configured application ID
    pub fn app_uuid(&self) -> Result<Uuid> {
        let raw = self
            .app_id
            .as_deref()
            .ok_or_else(|| Error::Config("client.app_id is required".to_string()))?;
        Uuid::parse_str(raw.trim())
            .map_err(|e| Error::Config(format!("client.app_id is not a valid UUID: {}", e)))
    }

    /// Validate configuration, returning error message if invalid
    pub fn validate(&self) -> Result<()> {
        self.app_uuid()?;

        reqwest::Url::parse(&self.api_base_url)
            .map_err(|e| Error::Config(format!("client.api_base_url is invalid: {}", e)))?;

        Ok(())
    }
}

fn default_api_base_url() -> String {
    "https://nom.telemetrydeck.com".to_string()
}

fn default_true() -> bool {
    true
}

/// Delivery configuration
#[derive(Debug, Deserialize, Clone)]
pub struct DeliveryConfig {
    /// Seconds between flush attempts
    #[serde(default = "default_flush_interval")]
    pub flush_interval_secs: u64,

    /// HTTP request timeout in seconds
    #[serde(default = "default_timeout")]
    pub timeout_secs: u64,
}

impl Default for DeliveryConfig {
    fn default() -> Self {
        Self {
            flush_interval_secs: default_flush_interval(),
            timeout_secs: default_timeout(),
        }
    }
}

impl DeliveryConfig {
    /// Interval between scheduler ticks, never shorter than one second
    pub fn flush_interval(&self) -> Duration {
        Duration::from_secs(self.flush_interval_secs.max(1))
    }

    /// HTTP request timeout
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    /// Validate configuration, returning error message if invalid
    pub fn validate(&self) -> Result<()> {
        if self.flush_interval_secs == 0 {
            return Err(Error::Config(
                "delivery.flush_interval_secs must be at least 1".to_string(),
            ));
        }
        if self.timeout_secs == 0 {
            return Err(Error::Config(
                "delivery.timeout_secs must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}

fn default_flush_interval() -> u64 {
    10
}

fn default_timeout() -> u64 {
    30
}

/// Logging configuration
#[derive(Debug, Deserialize, Clone)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Maximum number of log files to keep
    #[serde(default = "default_max_log_files")]
    pub max_files: usize,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            max_files: default_max_log_files(),
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_max_log_files() -> usize {
    5
}

impl Config {
    /// Load configuration from the default path
    pub fn load() -> Result<Self> {
        let config_path = Self::config_path();

        if !config_path.exists() {
            tracing::info!("No config file found at {:?}, using defaults", config_path);
            return Ok(Config::default());
        }

        Self::load_from(&config_path)
    }

    /// Load configuration from a specific path
    pub fn load_from(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| Error::Config(format!("failed to read config file {:?}: {}", path, e)))?;

        let config: Config = toml::from_str(&content)
            .map_err(|e| Error::Config(format!("failed to parse config: {}", e)))?;

        Ok(config)
    }

    /// Validate every section needed to deliver signals
    pub fn validate(&self) -> Result<()> {
        self.client.validate()?;
        self.delivery.validate()
    }

    /// Location of the signal snapshot for this configuration
    ///
    /// `client.cache_dir` wins over the XDG data directory.
    pub fn snapshot_path(&self) -> PathBuf {
        self.client
            .cache_dir
            .clone()
            .unwrap_or_else(Self::data_dir)
            .join(SNAPSHOT_FILE_NAME)
    }

    /// Returns the default config file path
    ///
    /// `$XDG_CONFIG_HOME/telemetry-client/config.toml`
    pub fn config_path() -> PathBuf {
        xdg_config_home().join(APP_DIR).join("config.toml")
    }

    /// Returns the data directory path (for the signal snapshot)
    ///
    /// `$XDG_DATA_HOME/telemetry-client/`
    pub fn data_dir() -> PathBuf {
        xdg_data_home().join(APP_DIR)
    }

    /// Returns the state directory path (for logs)
    ///
    /// `$XDG_STATE_HOME/telemetry-client/`
    pub fn state_dir() -> PathBuf {
        xdg_state_home().join(APP_DIR)
    }

    /// Returns the log file path
    ///
    /// `$XDG_STATE_HOME/telemetry-client/telemetry-client.log`
    pub fn log_path() -> PathBuf {
        Self::state_dir().join("telemetry-client.log")
    }

    /// Ensure XDG base directory environment variables are set.
    ///
    /// This is mainly for CLI binaries that want explicit, stable path behavior
    /// before invoking other components that read these env vars.
    pub fn ensure_xdg_env() {
        let home = home_dir();

        if std::env::var("XDG_DATA_HOME").is_err() {
            std::env::set_var("XDG_DATA_HOME", home.join(".local/share"));
        }

        if std::env::var("XDG_STATE_HOME").is_err() {
            std::env::set_var("XDG_STATE_HOME", home.join(".local/state"));
        }

        if std::env::var("XDG_CONFIG_HOME").is_err() {
            std::env::set_var("XDG_CONFIG_HOME", home.join(".config"));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const APP_ID: &str = "EA6FEF43-00E7-419F-B084-3F9BE80EB90A";

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert!(config.client.app_id.is_none());
        assert_eq!(config.client.api_base_url, "https://nom.telemetrydeck.com");
        assert!(!config.client.show_debug_logs);
        assert!(config.client.send_new_session_began_signal);
        assert_eq!(config.delivery.flush_interval_secs, 10);
        assert_eq!(config.delivery.timeout_secs, 30);
        assert_eq!(config.logging.level, "info");
        assert!(!config.client.is_ready());
    }

    #[test]
    fn test_parse_config() {
        let toml = r#"
[client]
app_id = "EA6FEF43-00E7-419F-B084-3F9BE80EB90A"
default_user = "TelemetryDeckUser"
show_debug_logs = true
send_new_session_began_signal = false

[delivery]
flush_interval_secs = 30

[logging]
level = "debug"
"#;
        let config: Config = toml::from_str(toml).unwrap();

        assert_eq!(config.client.app_id.as_deref(), Some(APP_ID));
        assert_eq!(
            config.client.default_user.as_deref(),
            Some("TelemetryDeckUser")
        );
        assert!(config.client.show_debug_logs);
        assert!(!config.client.send_new_session_began_signal);
        assert_eq!(config.delivery.flush_interval(), Duration::from_secs(30));
        assert_eq!(config.delivery.timeout_secs, 30);
        assert_eq!(config.logging.level, "debug");
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_client_config_validation() {
        // Missing app id
        let config = ClientConfig::default();
        assert!(config.validate().is_err());

        // Not a UUID
        let config = ClientConfig {
            app_id: Some("not-a-uuid".to_string()),
            ..Default::default()
        };
        assert!(config.validate().is_err());

        // Bad base URL
        let config = ClientConfig {
            app_id: Some(APP_ID.to_string()),
            api_base_url: "not a url".to_string(),
            ..Default::default()
        };
        assert!(config.validate().is_err());

        let config = ClientConfig {
            app_id: Some(APP_ID.to_string()),
            ..Default::default()
        };
        assert!(config.validate().is_ok());
        assert!(config.is_ready());
        assert_eq!(
            config.app_uuid().unwrap(),
            Uuid::parse_str(APP_ID).unwrap()
        );
    }

    #[test]
    fn test_delivery_config_validation() {
        let config = DeliveryConfig {
            flush_interval_secs: 0,
            ..Default::default()
        };
        assert!(config.validate().is_err());
        // Ticker never runs faster than once per second
        assert_eq!(config.flush_interval(), Duration::from_secs(1));

        assert!(DeliveryConfig::default().validate().is_ok());
    }

    #[test]
    fn test_snapshot_path_override() {
        let config = Config {
            client: ClientConfig {
                cache_dir: Some(PathBuf::from("/tmp/telemetry-cache")),
                ..Default::default()
            },
            ..Default::default()
        };
        assert_eq!(
            config.snapshot_path(),
            PathBuf::from("/tmp/telemetry-cache/telemetrysignalcache")
        );

        let config = Config::default();
        assert!(config.snapshot_path().ends_with(SNAPSHOT_FILE_NAME));
    }

    #[test]
    fn test_load_from_file() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "[client]\napp_id = \"not-valid\"\n").unwrap();

        let config = Config::load_from(&path).unwrap();
        assert_eq!(config.client.app_id.as_deref(), Some("not-valid"));
        assert!(config.validate().is_err());

        std::fs::write(&path, "[client\n").unwrap();
        assert!(matches!(Config::load_from(&path), Err(Error::Config(_))));
    }
}
