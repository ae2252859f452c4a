use anyhow::{anyhow, Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

use crate::projections::ProjectionSettings;

/// Prefix of environment overrides, e.g. `DIVLY_API__TIMEOUT_SECONDS=10`
const ENV_PREFIX: &str = "DIVLY";

/// Application configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub api: ApiSettings,
    pub cache: CacheSettings,
    pub projection: ProjectionSettings,
    pub calendar: CalendarSettings,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ApiSettings {
    pub alpha_vantage_key: Option<String>,
    pub timeout_seconds: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheSettings {
    pub enabled: bool,
    pub ttl_hours: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CalendarSettings {
    /// Window of the default "upcoming" view
    pub default_days: i64,
}

impl Default for ApiSettings {
    fn default() -> Self {
        ApiSettings {
            alpha_vantage_key: None,
            timeout_seconds: 30,
        }
    }
}

impl Default for CacheSettings {
    fn default() -> Self {
        CacheSettings {
            enabled: true,
            ttl_hours: 24,
        }
    }
}

impl Default for CalendarSettings {
    fn default() -> Self {
        CalendarSettings { default_days: 30 }
    }
}

impl Config {
    /// Get the configuration directory path
    pub fn config_dir() -> Result<PathBuf> {
        let dir = dirs::config_dir()
            .ok_or_else(|| anyhow!("Could not determine config directory"))?
            .join("divly");

        Ok(dir)
    }

    /// Get the configuration file path
    pub fn config_file() -> Result<PathBuf> {
        Ok(Self::config_dir()?.join("config.toml"))
    }

    /// Load configuration from the default file plus environment overrides
    pub fn load() -> Result<Self> {
        Self::load_from(&Self::config_file()?)
    }

    /// Load configuration from `path` (optional) layered under `DIVLY_*` variables
    pub fn load_from(path: &Path) -> Result<Self> {
        let settings = ::config::Config::builder()
            .add_source(::config::File::from(path).required(false))
            .add_source(
                ::config::Environment::with_prefix(ENV_PREFIX)
                    .prefix_separator("_")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()
            .with_context(|| format!("Failed to read configuration from {:?}", path))?;

        let config: Config = settings
            .try_deserialize()
            .with_context(|| format!("Invalid configuration in {:?}", path))?;
        config
            .projection
            .validate()
            .with_context(|| format!("Invalid configuration in {:?}", path))?;

        if config.projection.horizon_cycles == 0 {
            log::warn!("projection.horizon_cycles is 0; only known dividends will be shown");
        }

        Ok(config)
    }

    /// Save configuration to the default file
    pub fn save(&self) -> Result<()> {
        self.save_to(&Self::config_file()?)
    }

    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(dir) = path.parent() {
            fs::create_dir_all(dir)
                .with_context(|| format!("Failed to create config directory: {:?}", dir))?;
        }

        let contents = toml::to_string_pretty(&self)?;
        fs::write(path, contents).with_context(|| format!("Failed to write {:?}", path))?;

        Ok(())
    }

    /// Get the Alpha Vantage API key
    pub fn get_api_key(&self) -> Result<String> {
        if let Some(ref key) = self.api.alpha_vantage_key {
            if !key.trim().is_empty() {
                return Ok(key.clone());
            }
        }

        if let Ok(key) = std::env::var("ALPHA_VANTAGE_API_KEY") {
            return Ok(key);
        }

        Err(anyhow!(
            "No Alpha Vantage API key found. Please set the ALPHA_VANTAGE_API_KEY environment variable \
             or add it to the config file at {:?}",
            Self::config_file()?
        ))
    }
}

/// Write a default configuration file for first-time setup
pub fn init_config(api_key: Option<String>) -> Result<PathBuf> {
    let mut config = Config::load().unwrap_or_default();
    if api_key.is_some() {
        config.api.alpha_vantage_key = api_key;
    }
    config.save()?;

    Config::config_file()
}
