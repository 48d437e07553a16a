//! Configuration management
//!
//! Manages the tutor configuration: the device endpoint preference, speech
//! feedback and the location of the letter database.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::device::{validate_endpoint, PayloadMode};
use crate::voice::TtsConfig;

/// Example shown when asking for the device URL
pub const EXAMPLE_DEVICE_URL: &str = "http://192.168.4.1/braille";

/// Main configuration structure
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Config {
    /// Braille device settings
    #[serde(default)]
    pub device: DeviceConfig,
    /// Spoken feedback settings
    #[serde(default)]
    pub speech: TtsConfig,
    /// Letter database settings
    #[serde(default)]
    pub storage: StorageConfig,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DeviceConfig {
    /// User-provided device URL (unset until the first prompt)
    #[serde(default)]
    pub url: Option<String>,
    /// Static device URL; when set it takes precedence and cannot be reset
    #[serde(default)]
    pub fixed_url: Option<String>,
    /// Fields included in the payload
    #[serde(default)]
    pub payload: PayloadMode,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StorageConfig {
    /// SQLite database file (defaults to the data directory)
    #[serde(default)]
    pub database_path: Option<PathBuf>,
}

impl StorageConfig {
    /// Database path, falling back to `<data dir>/braille.db`
    pub fn resolve_database_path(&self) -> Result<PathBuf> {
        match &self.database_path {
            Some(path) => Ok(path.clone()),
            None => Ok(data_dir()?.join("braille.db")),
        }
    }
}

impl Config {
    /// Load configuration from the default location, creating it if missing
    pub fn load() -> Result<Self> {
        Self::load_from(&config_path()?)
    }

    /// Load configuration from a specific file, creating it if missing
    pub fn load_from(path: &Path) -> Result<Self> {
        if path.exists() {
            let contents = std::fs::read_to_string(path)
                .context("Failed to read config file")?;
            let config: Config = toml::from_str(&contents)
                .context("Failed to parse config file")?;
            Ok(config)
        } else {
            let config = Config::default();
            config.save_to(path)?;
            Ok(config)
        }
    }

    /// Save configuration to a specific file
    pub fn save_to(&self, path: &Path) -> Result<()> {
        let parent = path.parent()
            .context("Config path has no parent")?;

        std::fs::create_dir_all(parent)
            .context("Failed to create config directory")?;

        let contents = toml::to_string_pretty(self)
            .context("Failed to serialize config")?;

        std::fs::write(path, contents)
            .context("Failed to write config file")?;

        Ok(())
    }
}

/// Get the configuration file path
pub fn config_path() -> Result<PathBuf> {
    let base = directories::ProjectDirs::from("com", "braille-tutor", "braille-tutor")
        .context("Failed to get project directories")?;
    Ok(base.config_dir().join("config.toml"))
}

/// Get the data directory path
pub fn data_dir() -> Result<PathBuf> {
    let base = directories::ProjectDirs::from("com", "braille-tutor", "braille-tutor")
        .context("Failed to get project directories")?;
    Ok(base.data_dir().to_path_buf())
}

/// Persist a new device URL
pub fn set_device_url(path: &Path, raw: &str) -> Result<String> {
    let url = validate_endpoint(raw)?;
    let mut config = Config::load_from(path)?;
    config.device.url = Some(url.clone());
    config.save_to(path)?;
    Ok(url)
}

/// Clear the persisted device URL
pub fn reset_device_url(path: &Path) -> Result<()> {
    let mut config = Config::load_from(path)?;
    config.device.url = None;
    config.save_to(path)?;
    Ok(())
}

/// Show current configuration
pub fn show_config(path: &Path) -> Result<()> {
    let config = Config::load_from(path)?;

    println!("Configuration file: {}", path.display());
    println!();
    println!("Device:");
    match (&config.device.fixed_url, &config.device.url) {
        (Some(fixed), _) => println!("  URL:      {} (fixed)", fixed),
        (None, Some(url)) => println!("  URL:      {}", url),
        (None, None) => println!("  URL:      not set (example: {})", EXAMPLE_DEVICE_URL),
    }
    println!("  Payload:  {:?}", config.device.payload);
    println!();
    println!("Speech:");
    println!("  Enabled:  {}", config.speech.enabled);
    println!("  Program:  {} {}", config.speech.program, config.speech.args.join(" "));
    println!("  Delay:    {}s", config.speech.delay_secs);
    println!();
    println!("Storage:");
    println!("  Database: {}", config.storage.resolve_database_path()?.display());

    Ok(())
}
