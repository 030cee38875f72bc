//! Configuration resolution for jobscan-client
//!
//! Server URL priority: CLI → `JOBSCAN_SERVER_URL` → TOML → built-in default.
//! API key priority: CLI → `JOBSCAN_API_KEY` → TOML. A blank key counts as
//! missing.

use jobscan_common::config::{
    load_toml_config, write_toml_config, ChannelConfig, LimitsConfig, LoggingConfig,
    NotificationConfig, TomlConfig, DEFAULT_SERVER_URL,
};
use jobscan_common::{Error, Result};
use std::path::Path;
use tracing::{info, warn};

pub const SERVER_URL_ENV: &str = "JOBSCAN_SERVER_URL";
pub const API_KEY_ENV: &str = "JOBSCAN_API_KEY";

/// Fully resolved client settings
#[derive(Debug, Clone)]
pub struct ClientConfig {
    pub server_url: String,
    pub api_key: Option<String>,
    pub limits: LimitsConfig,
    pub channel: ChannelConfig,
    pub notifications: NotificationConfig,
    /// Default spreadsheet destination
    pub apps_script_url: Option<String>,
    pub logging: LoggingConfig,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self::resolve(TomlConfig::default(), None, None)
    }
}

impl ClientConfig {
    /// Merge CLI values, environment and TOML into one config
    pub fn resolve(toml: TomlConfig, cli_server_url: Option<&str>, cli_api_key: Option<&str>) -> Self {
        let server_url = resolve_server_url(cli_server_url, &toml);
        let api_key = resolve_api_key(cli_api_key, &toml);
        Self {
            server_url,
            api_key,
            limits: toml.limits,
            channel: toml.channel,
            notifications: toml.notifications,
            apps_script_url: toml.export.apps_script_url.filter(|url| !url.trim().is_empty()),
            logging: toml.logging,
        }
    }
}

/// Resolve the backend base URL
pub fn resolve_server_url(cli: Option<&str>, toml: &TomlConfig) -> String {
    let env = std::env::var(SERVER_URL_ENV).ok();
    [cli.map(str::to_string), env, toml.server_url.clone()]
        .into_iter()
        .flatten()
        .map(|url| url.trim().to_string())
        .find(|url| !url.is_empty())
        .unwrap_or_else(|| DEFAULT_SERVER_URL.to_string())
}

/// Resolve the upload credential
///
/// Warns when more than one source provides a key; the highest priority one
/// wins.
pub fn resolve_api_key(cli: Option<&str>, toml: &TomlConfig) -> Option<String> {
    let env_key = std::env::var(API_KEY_ENV).ok();
    let candidates = [
        ("command line", cli.map(str::to_string)),
        ("environment", env_key),
        ("TOML", toml.api_key.clone()),
    ];

    let valid: Vec<(&str, String)> = candidates
        .into_iter()
        .filter_map(|(source, key)| key.filter(|k| is_valid_key(k)).map(|k| (source, k)))
        .collect();

    if valid.len() > 1 {
        let sources: Vec<&str> = valid.iter().map(|(source, _)| *source).collect();
        warn!(
            "API key found in multiple sources: {}. Using {} (highest priority).",
            sources.join(", "),
            sources[0]
        );
    }

    valid.into_iter().next().map(|(source, key)| {
        info!("API key loaded from {}", source);
        key.trim().to_string()
    })
}

/// Validate API key (non-empty, non-whitespace)
pub fn is_valid_key(key: &str) -> bool {
    !key.trim().is_empty()
}

/// Store an API key in the TOML config, keeping every other setting
pub fn store_api_key(key: &str, toml_path: &Path) -> Result<()> {
    if !is_valid_key(key) {
        return Err(Error::InvalidInput("API key must not be blank".to_string()));
    }

    let mut config = if toml_path.exists() {
        load_toml_config(toml_path)?
    } else {
        TomlConfig::default()
    };
    config.api_key = Some(key.trim().to_string());

    write_toml_config(&config, toml_path)?;
    info!("API key saved to {}", toml_path.display());
    Ok(())
}
