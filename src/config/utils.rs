//! Configuration utilities - loading and access helpers
//!
//! This module provides utility functions for working with the configuration system:
//! - Loading and validating configuration from disk
//! - Thread-safe global access helpers
use super::schemas::Config;
use once_cell::sync::OnceCell;
use parking_lot::RwLock;

use crate::logger::{self, LogTag};

/// Global configuration instance
///
/// Read it with `with_config` / `get_config_clone`. Runtime state such as the
/// connection Hub is never stored here; it is passed explicitly.
pub static CONFIG: OnceCell<RwLock<Config>> = OnceCell::new();

/// Default configuration file path
pub const CONFIG_FILE_PATH: &str = "data/config.toml";

/// Load configuration from the default path into the global CONFIG
pub fn load_config() -> Result<(), String> {
    load_config_from_path(CONFIG_FILE_PATH)
}

/// Load configuration from a specific file path into the global CONFIG
///
/// # Returns
/// - `Ok(())` - Configuration loaded and validated
/// - `Err(String)` - Read, parse or validation failure, or already initialized
pub fn load_config_from_path(path: &str) -> Result<(), String> {
    let config = read_config_file(path)?;
    init_config(config)
}

/// Install an already built configuration as the global CONFIG
pub fn init_config(config: Config) -> Result<(), String> {
    config.validate()?;
    CONFIG
        .set(RwLock::new(config))
        .map_err(|_| "Config already initialized".to_string())
}

/// Read, parse and validate a TOML configuration file without touching CONFIG
///
/// A missing file yields the defaults (with a warning).
pub fn read_config_file(path: &str) -> Result<Config, String> {
    let config = if std::path::Path::new(path).exists() {
        let contents = std::fs::read_to_string(path)
            .map_err(|e| format!("Failed to read config file '{}': {}", path, e))?;

        toml::from_str::<Config>(&contents)
            .map_err(|e| format!("Failed to parse config file '{}': {}", path, e))?
    } else {
        logger::warning(
            LogTag::Config,
            &format!("Config file '{}' not found, using default values", path),
        );
        Config::default()
    };

    config
        .validate()
        .map_err(|e| format!("Invalid config file '{}': {}", path, e))?;

    logger::debug(LogTag::Config, &format!("Loaded configuration from '{}'", path));

    Ok(config)
}

/// Execute a function with read access to the configuration
///
/// Falls back to defaults when the configuration was never loaded, so
/// library users and tests need no setup.
///
/// # Example
/// ```
/// use alerthub::config::with_config;
///
/// let buffer = with_config(|cfg| cfg.websocket.outbound_buffer);
/// assert!(buffer > 0);
/// ```
pub fn with_config<F, R>(f: F) -> R
where
    F: FnOnce(&Config) -> R,
{
    match CONFIG.get() {
        Some(lock) => f(&*lock.read()),
        None => f(&Config::default()),
    }
}

/// Get a clone of the entire configuration
///
/// Useful when values must be held across await points.
pub fn get_config_clone() -> Config {
    with_config(|cfg| cfg.clone())
}

/// Check whether load_config / init_config has run
pub fn is_config_initialized() -> bool {
    CONFIG.get().is_some()
}
