// src/config.rs

//! Configuration loading utilities.
//!
//! This module loads the TOML config, the line registry and the mention
//! registry from one storage directory.

use std::path::{Path, PathBuf};

use crate::error::{AppError, Result};
use crate::models::{Config, LineRegistry, MentionRegistry};

/// Default config file name inside the storage directory.
pub const CONFIG_FILE: &str = "config.toml";

/// Everything loaded from the storage directory.
#[derive(Debug, Clone)]
pub struct Settings {
    pub config: Config,
    pub registry: LineRegistry,
    pub mentions: MentionRegistry,
    pub storage_dir: PathBuf,
}

impl Settings {
    /// Path of a file named in `[paths]`, relative to the storage directory.
    pub fn resolve(&self, file: &str) -> PathBuf {
        self.storage_dir.join(file)
    }

    pub fn snapshot_path(&self) -> PathBuf {
        self.resolve(&self.config.paths.snapshot_file)
    }
}

/// Load configuration from a TOML file.
///
/// Falls back to defaults if loading fails.
pub fn load_config(path: &Path) -> Config {
    Config::load_or_default(path)
}

/// Load and validate config, line registry and mentions.
///
/// Missing files fall back to defaults; invalid values are an error.
pub fn load_all(storage_dir: &Path) -> Result<Settings> {
    let config = load_config(&storage_dir.join(CONFIG_FILE));
    config
        .validate()
        .map_err(|e| AppError::config(format!("Invalid config: {e}")))?;

    let registry = LineRegistry::load_or_default(storage_dir.join(&config.paths.lines_file));
    registry
        .validate()
        .map_err(|e| AppError::config(format!("Invalid line registry: {e}")))?;

    let mentions = MentionRegistry::load_or_empty(storage_dir.join(&config.paths.users_file));

    log::debug!(
        "Loaded {} lines from {} (mentions: {})",
        registry.len(),
        storage_dir.display(),
        !mentions.is_empty()
    );

    Ok(Settings {
        config,
        registry,
        mentions,
        storage_dir: storage_dir.to_path_buf(),
    })
}
