// Configuration file loading shared by all verbum crates

use crate::error::{Error, Result};
use serde::de::DeserializeOwned;
use std::path::Path;

/// Supported configuration file formats
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigFormat {
    Json,
    Toml,
}

impl ConfigFormat {
    /// Guess the format from a file extension
    pub fn from_path(path: &Path) -> Option<Self> {
        match path.extension()?.to_str()?.to_ascii_lowercase().as_str() {
            "json" => Some(ConfigFormat::Json),
            "toml" => Some(ConfigFormat::Toml),
            _ => None,
        }
    }
}

/// Parse configuration text in the given format
pub fn parse_config<T: DeserializeOwned>(content: &str, format: ConfigFormat) -> Result<T> {
    match format {
        ConfigFormat::Json => serde_json::from_str(content)
            .map_err(|e| Error::Configuration(format!("invalid JSON: {}", e))),
        ConfigFormat::Toml => toml::from_str(content)
            .map_err(|e| Error::Configuration(format!("invalid TOML: {}", e))),
    }
}

/// Parse configuration text of unknown format: JSON first, then TOML
pub fn parse_config_any<T: DeserializeOwned>(content: &str) -> Result<T> {
    if let Ok(config) = serde_json::from_str::<T>(content) {
        return Ok(config);
    }
    parse_config(content, ConfigFormat::Toml)
}

/// Load a configuration file, choosing the format by extension
pub fn load_config<T: DeserializeOwned>(path: impl AsRef<Path>) -> Result<T> {
    let path = path.as_ref();
    let content = std::fs::read_to_string(path)?;
    match ConfigFormat::from_path(path) {
        Some(format) => parse_config(&content, format),
        None => parse_config_any(&content),
    }
}
