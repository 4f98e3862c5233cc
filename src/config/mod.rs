//! Configuration management for bulkfetch
//!
//! This module provides a layered configuration system that loads settings from:
//! 1. Default values (embedded in structs)
//! 2. TOML configuration file
//! 3. Environment variables (highest priority)
//!
//! # Usage
//!
//! ```no_run
//! use bulkfetch::config::Config;
//!
//! let config = Config::load(None).expect("Failed to load configuration");
//! println!("Downloading {} items of {}", config.project.size, config.project.name);
//! ```
//!
//! # Environment Variables
//!
//! Configuration can be overridden using environment variables with the pattern:
//! `BULKFETCH__<section>__<key>`
//!
//! Examples:
//! - `BULKFETCH__DOWNLOAD__WORKERS=20`
//! - `BULKFETCH__PROJECT__CONTRACT=0xb47e3cd837ddf8e4c57f05d70ab865de6e193bbb`
//! - `BULKFETCH__HTTP__MAX_BODY_BYTES=10MB`
//!
//! # Configuration File
//!
//! By default, the configuration is loaded from `config/bulkfetch.toml`.
//! This can be overridden using `--config` or the `BULKFETCH_CONFIG` environment variable.

mod models;
mod sources;
mod validation;

pub use crate::humanize::ByteSize;
pub use models::{Config, DelayRange, DownloadConfig, HttpConfig, ProjectConfig};
pub use validation::ValidationError;

use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to load configuration: {0}")]
    LoadError(#[from] config::ConfigError),

    #[error("Configuration validation failed: {0}")]
    ValidationError(#[from] ValidationError),
}

impl Config {
    /// Load configuration from all sources (file + environment)
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - Configuration file is malformed or `[project]` is missing
    /// - Validation fails
    pub fn load(path: Option<PathBuf>) -> Result<Self, ConfigError> {
        let config = sources::load(path)?;
        validation::validate(&config)?;
        Ok(config)
    }

    /// Load configuration from a specific path, skipping `.env`
    pub fn load_from_path(path: PathBuf) -> Result<Self, ConfigError> {
        let config = sources::load_from_sources(path)?;
        validation::validate(&config)?;
        Ok(config)
    }

    /// Re-run validation after command line overrides
    pub fn validate(&self) -> Result<(), ConfigError> {
        validation::validate(self)?;
        Ok(())
    }
}
