//! Configuration management for pilotlog.
//!
//! This module provides configuration loading and validation using figment,
//! supporting TOML config files, environment variables, and defaults.

use std::path::{Path, PathBuf};

use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Default configuration file name.
const CONFIG_FILE_NAME: &str = "config.toml";

/// Default data directory name.
const DATA_DIR_NAME: &str = "pilotlog";

/// Application configuration.
///
/// Configuration is loaded from (in order of precedence, highest first):
/// 1. Environment variables (prefixed with `PILOTLOG_`, sections split on `__`)
/// 2. TOML config file at `~/.config/pilotlog/config.toml`
/// 3. Default values
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Storage configuration.
    pub storage: StorageConfig,
    /// Synthetic data configuration.
    pub generation: GenerationConfig,
}

/// Where and how ledgers are stored.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Directory holding the master index and pilot ledgers.
    /// Defaults to `~/.local/share/pilotlog`
    pub data_dir: Option<PathBuf>,
    /// File name of the master index inside the data directory.
    pub index_file: String,
    /// File extension of every ledger file.
    pub ledger_extension: String,
}

/// Synthetic data settings for first-run seeding and random races.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GenerationConfig {
    /// Fixed seed for reproducible data. Random when unset.
    pub seed: Option<u64>,
    /// Races generated per pilot on first run.
    pub default_races: usize,
    /// Lower bound for a random pilot count.
    pub min_pilots: usize,
    /// Upper bound for a random pilot count.
    pub max_pilots: usize,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            data_dir: None, // Will be resolved to default at runtime
            index_file: "datos.csv".to_string(),
            ledger_extension: "csv".to_string(),
        }
    }
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self {
            seed: None,
            default_races: 5,
            min_pilots: 5,
            max_pilots: 20,
        }
    }
}

impl Config {
    /// Load configuration from all sources, reading `config_path` instead of
    /// the default file when given.
    ///
    /// # Errors
    ///
    /// Returns an error if configuration loading or parsing fails.
    pub fn load_from(config_path: Option<PathBuf>) -> Result<Self> {
        let config_file = config_path.unwrap_or_else(Self::default_config_path);

        let figment = Figment::new()
            .merge(Serialized::defaults(Config::default()))
            .merge(Toml::file(&config_file))
            .merge(Env::prefixed("PILOTLOG_").split("__"));

        let config: Config = figment.extract()?;
        config.validate()?;
        Ok(config)
    }

    /// Configuration rooted at `data_dir` with every other value defaulted.
    #[must_use]
    pub fn with_data_dir(data_dir: impl Into<PathBuf>) -> Self {
        let mut config = Self::default();
        config.storage.data_dir = Some(data_dir.into());
        config
    }

    /// Get the default configuration file path.
    #[must_use]
    pub fn default_config_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from(".config"))
            .join(DATA_DIR_NAME)
            .join(CONFIG_FILE_NAME)
    }

    /// Get the default data directory path.
    #[must_use]
    pub fn default_data_dir() -> PathBuf {
        dirs::data_local_dir()
            .unwrap_or_else(|| PathBuf::from(".local/share"))
            .join(DATA_DIR_NAME)
    }

    /// Validate the configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if any configuration values are invalid.
    pub fn validate(&self) -> Result<()> {
        let index_file = self.storage.index_file.trim();
        if index_file.is_empty() {
            return Err(Error::ConfigValidation {
                message: "index_file must not be empty".to_string(),
            });
        }
        if index_file.contains(['/', '\\']) {
            return Err(Error::ConfigValidation {
                message: format!("index_file ({index_file}) must be a file name, not a path"),
            });
        }

        let extension = self.storage.ledger_extension.trim_start_matches('.');
        if extension.is_empty() {
            return Err(Error::ConfigValidation {
                message: "ledger_extension must not be empty".to_string(),
            });
        }
        if Path::new(index_file).extension().and_then(|e| e.to_str()) != Some(extension) {
            return Err(Error::ConfigValidation {
                message: format!("index_file ({index_file}) must end in .{extension}"),
            });
        }

        let generation = &self.generation;
        if generation.min_pilots == 0 {
            return Err(Error::ConfigValidation {
                message: "min_pilots must be greater than 0".to_string(),
            });
        }
        if generation.min_pilots > generation.max_pilots {
            return Err(Error::ConfigValidation {
                message: format!(
                    "min_pilots ({}) cannot be greater than max_pilots ({})",
                    generation.min_pilots, generation.max_pilots
                ),
            });
        }

        Ok(())
    }

    /// Get the data directory, resolving defaults if not set.
    #[must_use]
    pub fn data_dir(&self) -> PathBuf {
        self.storage
            .data_dir
            .clone()
            .unwrap_or_else(Self::default_data_dir)
    }

    /// Get the master index path.
    #[must_use]
    pub fn index_path(&self) -> PathBuf {
        self.data_dir().join(self.storage.index_file.trim())
    }

    /// The ledger extension without a leading dot.
    #[must_use]
    pub fn ledger_extension(&self) -> &str {
        self.storage.ledger_extension.trim_start_matches('.')
    }

    /// Get the ledger path for a pilot.
    #[must_use]
    pub fn pilot_path(&self, name: &str) -> PathBuf {
        self.data_dir()
            .join(format!("{name}.{}", self.ledger_extension()))
    }
}
