//! Configuration loading and config file resolution
//!
//! Bootstrap settings come from a TOML file. A missing or unreadable file never
//! stops the client: defaults are used and a warning is logged.
//!
//! Config file resolution priority:
//! 1. Command-line argument (highest priority)
//! 2. `JOBSCAN_CONFIG` environment variable
//! 3. Platform config directory (`~/.config/jobscan/config.toml` on Linux)

use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{info, warn};

/// Environment variable naming an explicit config file
pub const CONFIG_PATH_ENV: &str = "JOBSCAN_CONFIG";

/// Default processing backend address
pub const DEFAULT_SERVER_URL: &str = "http://127.0.0.1:8080";

/// Bootstrap configuration loaded from TOML file
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TomlConfig {
    /// Processing backend base URL
    #[serde(default)]
    pub server_url: Option<String>,

    /// Credential forwarded with each upload
    #[serde(default)]
    pub api_key: Option<String>,

    /// File selection limits
    #[serde(default)]
    pub limits: LimitsConfig,

    /// Real-time progress channel settings
    #[serde(default)]
    pub channel: ChannelConfig,

    /// Spreadsheet export settings
    #[serde(default)]
    pub export: ExportConfig,

    /// Notification lifetimes
    #[serde(default)]
    pub notifications: NotificationConfig,

    /// Logging configuration (optional)
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// File selection limits
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LimitsConfig {
    /// Maximum number of files per submission
    #[serde(default = "default_max_files")]
    pub max_files: usize,

    /// Maximum size of a single file
    #[serde(default = "default_max_file_size")]
    pub max_file_size_bytes: u64,

    /// Optional cap on the combined size of a selection
    #[serde(default)]
    pub max_total_size_bytes: Option<u64>,
}

/// Real-time channel connection and reconnect settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChannelConfig {
    #[serde(default = "default_connect_timeout_ms")]
    pub connect_timeout_ms: u64,

    /// Consecutive failed connection attempts tolerated before giving up
    #[serde(default = "default_max_reconnect_attempts")]
    pub max_reconnect_attempts: u32,

    #[serde(default = "default_reconnect_delay_ms")]
    pub reconnect_delay_ms: u64,

    #[serde(default = "default_reconnect_max_delay_ms")]
    pub reconnect_max_delay_ms: u64,

    /// Backoff multiplier; 1.0 keeps the delay fixed
    #[serde(default = "default_reconnect_multiplier")]
    pub reconnect_multiplier: f64,
}

/// Spreadsheet export settings
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExportConfig {
    /// Apps Script deployment used when no override is given
    #[serde(default)]
    pub apps_script_url: Option<String>,
}

/// Notification lifetimes
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NotificationConfig {
    /// Lifetime of success/info/warning notifications
    #[serde(default = "default_notification_ttl_ms")]
    pub ttl_ms: u64,

    /// Lifetime of error notifications
    #[serde(default = "default_error_notification_ttl_ms")]
    pub error_ttl_ms: u64,
}

/// Logging configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub level: String,
}

fn default_max_files() -> usize {
    10
}

fn default_max_file_size() -> u64 {
    16 * 1024 * 1024
}

fn default_connect_timeout_ms() -> u64 {
    10_000
}

fn default_max_reconnect_attempts() -> u32 {
    5
}

fn default_reconnect_delay_ms() -> u64 {
    1_000
}

fn default_reconnect_max_delay_ms() -> u64 {
    5_000
}

fn default_reconnect_multiplier() -> f64 {
    1.5
}

fn default_notification_ttl_ms() -> u64 {
    3_000
}

fn default_error_notification_ttl_ms() -> u64 {
    5_000
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for LimitsConfig {
    fn default() -> Self {
        Self {
            max_files: default_max_files(),
            max_file_size_bytes: default_max_file_size(),
            max_total_size_bytes: None,
        }
    }
}

impl Default for ChannelConfig {
    fn default() -> Self {
        Self {
            connect_timeout_ms: default_connect_timeout_ms(),
            max_reconnect_attempts: default_max_reconnect_attempts(),
            reconnect_delay_ms: default_reconnect_delay_ms(),
            reconnect_max_delay_ms: default_reconnect_max_delay_ms(),
            reconnect_multiplier: default_reconnect_multiplier(),
        }
    }
}

impl Default for NotificationConfig {
    fn default() -> Self {
        Self {
            ttl_ms: default_notification_ttl_ms(),
            error_ttl_ms: default_error_notification_ttl_ms(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

/// Config file path resolution
pub struct ConfigPathResolver {
    cli_path: Option<PathBuf>,
}

impl ConfigPathResolver {
    pub fn new(cli_path: Option<PathBuf>) -> Self {
        Self { cli_path }
    }

    /// Resolve config file path per priority order
    ///
    /// Returns `None` when no candidate location can be determined.
    pub fn resolve(&self) -> Option<PathBuf> {
        // Priority 1: Command-line argument
        if let Some(path) = &self.cli_path {
            return Some(path.clone());
        }

        // Priority 2: Environment variable
        if let Ok(path) = std::env::var(CONFIG_PATH_ENV) {
            if !path.trim().is_empty() {
                return Some(PathBuf::from(path));
            }
        }

        // Priority 3: Platform config directory
        default_config_path()
    }
}

/// Get default configuration file path for the platform
pub fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|d| d.join("jobscan").join("config.toml"))
}

/// Parse a TOML config file
pub fn load_toml_config(path: &Path) -> Result<TomlConfig> {
    let content = std::fs::read_to_string(path)
        .map_err(|e| Error::Config(format!("Read {} failed: {}", path.display(), e)))?;
    toml::from_str(&content)
        .map_err(|e| Error::Config(format!("Parse {} failed: {}", path.display(), e)))
}

/// Load config with graceful degradation
///
/// Missing file → info + defaults. Unparseable file → warning + defaults.
pub fn load_or_default(path: Option<&Path>) -> TomlConfig {
    let Some(path) = path else {
        info!("No config file location available, using defaults");
        return TomlConfig::default();
    };

    if !path.exists() {
        info!("Config file {} not found, using defaults", path.display());
        return TomlConfig::default();
    }

    match load_toml_config(path) {
        Ok(config) => {
            info!("Loaded config from {}", path.display());
            config
        }
        Err(e) => {
            warn!("{} - using defaults", e);
            TomlConfig::default()
        }
    }
}

/// Write TOML config to disk, creating parent directories as needed
pub fn write_toml_config(config: &TomlConfig, path: &Path) -> Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let content = toml::to_string_pretty(config)
        .map_err(|e| Error::Config(format!("Serialize config failed: {}", e)))?;
    std::fs::write(path, content)?;
    Ok(())
}
