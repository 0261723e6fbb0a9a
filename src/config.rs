//! Configuration for the array store using Figment.
//!
//! Configuration is loaded from (in order of precedence):
//! 1. Environment variables prefixed with `RUSTDAQ_`
//! 2. A TOML configuration file (default: `config/format.toml`)
//!
//! Nested keys are separated by a double underscore so that field names keep their
//! own underscores:
//!
//! ```text
//! RUSTDAQ_APPLICATION__LOG_LEVEL=debug
//! RUSTDAQ_STORAGE__BASE_LOCATION=/mnt/data
//! RUSTDAQ_STORAGE__CHUNK_ROWS=256
//! ```
//!
//! Every field has a default, so a missing file yields [`FormatConfig::default`].

use crate::error::{AppResult, DaqError};
use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Top-level configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FormatConfig {
    /// Application settings
    #[serde(default)]
    pub application: ApplicationConfig,
    /// Storage settings for the HDF5 formatter
    #[serde(default)]
    pub storage: StorageConfig,
}

/// Application-level configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ApplicationConfig {
    /// Logging level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

/// Storage configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StorageConfig {
    /// Root directory that data set locations are joined onto
    #[serde(default = "default_base_location")]
    pub base_location: PathBuf,
    /// Extension of the container file, without the dot
    #[serde(default = "default_file_extension")]
    pub file_extension: String,
    /// Rows per HDF5 chunk for growable arrays
    #[serde(default = "default_chunk_rows")]
    pub chunk_rows: usize,
    /// Deflate level (0 = uncompressed, 1-9)
    #[serde(default)]
    pub compression_level: u8,
}

impl Default for ApplicationConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
        }
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            base_location: default_base_location(),
            file_extension: default_file_extension(),
            chunk_rows: default_chunk_rows(),
            compression_level: 0,
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_base_location() -> PathBuf {
    PathBuf::from("./data")
}

fn default_file_extension() -> String {
    "hdf5".to_string()
}

fn default_chunk_rows() -> usize {
    64
}

impl FormatConfig {
    /// Load configuration from `config/format.toml` and environment variables.
    ///
    /// # Errors
    ///
    /// Returns an error if the sources cannot be extracted or validation fails.
    pub fn load() -> AppResult<Self> {
        Self::load_from("config/format.toml")
    }

    /// Load configuration from a specific file path, then apply `RUSTDAQ_` overrides.
    ///
    /// A missing file is not an error; defaults fill every field it would have set.
    ///
    /// # Errors
    ///
    /// Returns [`DaqError::Config`] if extraction fails and
    /// [`DaqError::Configuration`] if a value is out of range.
    pub fn load_from<P: AsRef<Path>>(path: P) -> AppResult<Self> {
        let config: Self = Figment::from(Serialized::defaults(Self::default()))
            .merge(Toml::file(path.as_ref()))
            .merge(Env::prefixed("RUSTDAQ_").split("__"))
            .extract()?;

        config.validate()?;
        Ok(config)
    }

    /// Validate configuration after loading
    ///
    /// Checks:
    /// - Log level is valid (trace, debug, info, warn, error)
    /// - File extension is non-empty and carries no leading dot
    /// - Chunk height is at least one row
    /// - Compression level is 0-9
    ///
    /// # Errors
    ///
    /// Returns [`DaqError::Configuration`] describing the first invalid value.
    pub fn validate(&self) -> AppResult<()> {
        let valid_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_levels.contains(&self.application.log_level.as_str()) {
            return Err(DaqError::Configuration(format!(
                "Invalid log_level '{}'. Must be one of: {}",
                self.application.log_level,
                valid_levels.join(", ")
            )));
        }

        let extension = &self.storage.file_extension;
        if extension.is_empty() || extension.starts_with('.') {
            return Err(DaqError::Configuration(format!(
                "Invalid file_extension '{}'. Expected a bare extension such as 'hdf5'",
                extension
            )));
        }

        if self.storage.chunk_rows == 0 {
            return Err(DaqError::Configuration(
                "chunk_rows must be at least 1".to_string(),
            ));
        }

        if self.storage.compression_level > 9 {
            return Err(DaqError::Configuration(format!(
                "Invalid compression_level {}. Must be 0-9",
                self.storage.compression_level
            )));
        }

        Ok(())
    }
}
