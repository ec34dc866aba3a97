//! Configuration file loading helpers
//!
//! Settings resolve with ENV → TOML → compiled default priority. The TOML
//! file is optional; required settings missing from every tier are fatal
//! at startup.

use crate::{Error, Result};
use serde::de::DeserializeOwned;
use std::path::Path;

/// Read and parse a TOML configuration file
pub fn read_toml_config<T: DeserializeOwned>(path: &Path) -> Result<T> {
    let content = std::fs::read_to_string(path)
        .map_err(|e| Error::Config(format!("failed to read {}: {}", path.display(), e)))?;
    toml::from_str(&content)
        .map_err(|e| Error::Config(format!("failed to parse {}: {}", path.display(), e)))
}

/// Environment override: the variable's value when set and non-empty
pub fn env_override(var: &str) -> Option<String> {
    std::env::var(var).ok().filter(|v| !v.trim().is_empty())
}

/// Resolve an optional setting from an env var or a config-file value
pub fn optional_setting(var: &str, file_value: Option<String>) -> Option<String> {
    env_override(var).or(file_value)
}

/// Resolve a required setting from an env var or a config-file value
pub fn required_setting(var: &str, file_value: Option<String>) -> Result<String> {
    optional_setting(var, file_value).ok_or_else(|| {
        Error::Config(format!(
            "required setting missing: set {} or add it to the config file",
            var
        ))
    })
}
