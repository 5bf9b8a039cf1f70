//! Configuration management for chapterbox
//!
//! This module provides a layered configuration system that loads settings from:
//! 1. Default values (embedded in structs)
//! 2. TOML configuration file
//! 3. Environment variables (highest priority)
//!
//! # Usage
//!
//! ```no_run
//! use chapterbox::config::Config;
//!
//! let config = Config::load().expect("Failed to load configuration");
//! println!("Running {} workers", config.pool.size);
//! ```
//!
//! # Environment Variables
//!
//! Configuration can be overridden using environment variables with the pattern:
//! `CHAPTERBOX__<section>__<key>`
//!
//! Examples:
//! - `CHAPTERBOX__POOL__SIZE=4`
//! - `CHAPTERBOX__FETCH__MAX_PAGE_BYTES=16MB`
//! - `CHAPTERBOX__DELIVERY__RATE_LIMIT_MARGIN_MS=500`
//!
//! # Configuration File
//!
//! By default, the configuration is loaded from `config/chapterbox.toml`.
//! This can be overridden using the `CHAPTERBOX_CONFIG` environment variable.

mod models;
mod sources;
mod validation;

pub use crate::humanize::ByteSize;
pub use models::{
    ArchiveConfig, Compression, Config, DeliveryConfig, FetchConfig, PoolConfig, ServerConfig,
    SourceConfig, SourceKind, StorageConfig, StorageProvider,
};
pub use validation::{MAX_PAGE_CONCURRENCY, ValidationError};

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
    /// Returns an error if the file is malformed or validation fails.
    pub fn load() -> Result<Self, ConfigError> {
        let config = sources::load()?;
        validation::validate(&config)?;
        Ok(config)
    }

    /// Load configuration from a specific path
    pub fn load_from_path(path: std::path::PathBuf) -> Result<Self, ConfigError> {
        let config = sources::load_from_sources(path)?;
        validation::validate(&config)?;
        Ok(config)
    }
}
