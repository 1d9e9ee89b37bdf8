//! Strategy configuration utilities

use anyhow::{Context, Result};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};

/// Load configuration from TOML file
pub fn load_config<T: DeserializeOwned>(path: impl AsRef<Path>) -> Result<T> {
    let path = path.as_ref();
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file {}", path.display()))?;
    let config = toml::from_str(&content)
        .with_context(|| format!("Failed to parse config file {}", path.display()))?;
    Ok(config)
}

/// Config path from `env_var`, falling back to `default_path`
pub fn resolve_config_path(env_var: &str, default_path: &str) -> PathBuf {
    std::env::var(env_var)
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from(default_path))
}

/// Where a loaded configuration came from
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigSource {
    File(PathBuf),
    /// Nothing at the path; built-in defaults were used
    Defaults(PathBuf),
}

impl fmt::Display for ConfigSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigSource::File(path) => write!(f, "{}", path.display()),
            ConfigSource::Defaults(path) => {
                write!(f, "built-in defaults (no file at {})", path.display())
            }
        }
    }
}

/// Load `path` if it exists, otherwise return `fallback`.
///
/// A file that exists but does not parse is an error. Nothing is logged;
/// callers report the returned `ConfigSource` once logging is initialised.
pub fn load_config_file<T: DeserializeOwned>(
    path: &Path,
    fallback: T,
) -> Result<(T, ConfigSource)> {
    if !path.exists() {
        return Ok((fallback, ConfigSource::Defaults(path.to_path_buf())));
    }

    let config = load_config(path)?;
    Ok((config, ConfigSource::File(path.to_path_buf())))
}

/// Common strategy configuration fields
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct BaseStrategyConfig {
    pub name: String,
    pub enabled: bool,
    pub log_level: Option<String>,
}

impl Default for BaseStrategyConfig {
    fn default() -> Self {
        Self {
            name: "unnamed_strategy".to_string(),
            enabled: true,
            log_level: Some("info".to_string()),
        }
    }
}
