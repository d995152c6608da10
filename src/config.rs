use crate::error::{GeofullError, Result};
use serde::Deserialize;
use std::fs;
use std::path::Path;
use tracing::debug;

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    pub server: ServerConfig,
    pub extractor: ExtractorConfig,
    pub geocoder: GeocoderConfig,
    pub locality: LocalityConfig,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8000,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ExtractorConfig {
    pub model: String,
    pub base_url: String,
    pub timeout_seconds: u64,
}

impl Default for ExtractorConfig {
    fn default() -> Self {
        Self {
            model: "gemini-1.5-flash-latest".to_string(),
            base_url: "https://generativelanguage.googleapis.com".to_string(),
            timeout_seconds: 30,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct GeocoderConfig {
    pub base_url: String,
    pub user_agent: String,
    pub timeout_seconds: u64,
}

impl Default for GeocoderConfig {
    fn default() -> Self {
        Self {
            base_url: "https://nominatim.openstreetmap.org".to_string(),
            // Nominatim's usage policy wants a contact in the UA string.
            user_agent: "geofull/0.1 (mailto:ops@example.com)".to_string(),
            timeout_seconds: 10,
        }
    }
}

/// Fixed locality appended to every normalized address before geocoding.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LocalityConfig {
    pub city: String,
    pub region: String,
}

impl Default for LocalityConfig {
    fn default() -> Self {
        Self {
            city: "Medellin".to_string(),
            region: "Colombia".to_string(),
        }
    }
}

impl Config {
    pub fn load() -> Result<Self> {
        Self::load_from("config.toml")
    }

    /// Read the config file when present; otherwise run on defaults.
    pub fn load_from(path: &str) -> Result<Self> {
        if !Path::new(path).exists() {
            debug!("no config file at '{}', using defaults", path);
            return Ok(Config::default());
        }

        let content = fs::read_to_string(path).map_err(|e| {
            GeofullError::Config(format!("Failed to read config file '{}': {}", path, e))
        })?;

        let config: Config = toml::from_str(&content)?;
        Ok(config)
    }

    /// The extraction credential comes from the environment, never the
    /// config file.
    pub fn gemini_api_key() -> Option<String> {
        std::env::var("GEMINI_API_KEY")
            .ok()
            .filter(|key| !key.trim().is_empty())
    }
}
