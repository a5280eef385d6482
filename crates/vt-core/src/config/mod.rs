//! Configuration management for vm-tunnel

mod api;
mod bootstrap;
mod resolver;
pub mod serde_utils;
mod tunnel;

pub use api::ApiConfig;
pub use bootstrap::BootstrapSettings;
pub use resolver::ResolverConfig;
pub use tunnel::TunnelSettings;

use crate::error::ConfigError;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Contents of `config.toml`
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ConfigFile {
    /// Local ssh/relay settings
    pub tunnel: TunnelSettings,
    /// Remote bootstrap settings
    pub bootstrap: BootstrapSettings,
    /// VM API settings
    pub api: ApiConfig,
    /// Endpoint resolution settings
    pub resolver: ResolverConfig,
}

/// Get the default configuration directory
pub fn default_config_dir() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("vm-tunnel")
}

/// Get the default configuration file path
pub fn default_config_path() -> PathBuf {
    default_config_dir().join("config.toml")
}

/// Load configuration from a file
pub fn load_config<T: serde::de::DeserializeOwned>(path: &Path) -> Result<T, ConfigError> {
    if !path.exists() {
        return Err(ConfigError::NotFound(path.to_path_buf()));
    }

    let content = std::fs::read_to_string(path)
        .map_err(|e| ConfigError::Invalid(format!("Failed to read config: {}", e)))?;

    let config: T = toml::from_str(&content)?;
    Ok(config)
}

/// Load `path` if given, else the default file if it exists, else defaults
///
/// An explicitly named file must exist and parse. A broken default file is
/// logged and ignored.
pub fn load_or_default(path: Option<&Path>) -> Result<ConfigFile, ConfigError> {
    if let Some(path) = path {
        return load_config(path);
    }

    let default_path = default_config_path();
    if !default_path.exists() {
        tracing::debug!("No config file at {:?}, using defaults", default_path);
        return Ok(ConfigFile::default());
    }

    match load_config(&default_path) {
        Ok(config) => Ok(config),
        Err(e) => {
            tracing::warn!("Failed to load config from {:?}: {}", default_path, e);
            Ok(ConfigFile::default())
        }
    }
}

/// Save configuration to a file
pub fn save_config<T: serde::Serialize>(path: &Path, config: &T) -> Result<(), ConfigError> {
    let content = toml::to_string_pretty(config)?;

    // Ensure parent directory exists
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)
            .map_err(|e| ConfigError::Invalid(format!("Failed to create config dir: {}", e)))?;
    }

    std::fs::write(path, content)
        .map_err(|e| ConfigError::Invalid(format!("Failed to write config: {}", e)))?;

    Ok(())
}
