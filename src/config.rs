//! Configuration system using TOML files.
//!
//! Config is stored in the OS-standard config directory:
//! - Windows: %APPDATA%\cratedigger\config.toml
//! - macOS: ~/Library/Application Support/cratedigger/config.toml
//! - Linux: ~/.config/cratedigger/config.toml
//!
//! The config file is human-readable and editable. Settings are loaded
//! at startup; a missing or broken file degrades to defaults with a
//! logged warning, never a startup failure.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Application configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Scraping engine settings
    pub scraper: ScraperSettings,

    /// Metadata provider toggles
    pub providers: ProviderSettings,

    /// Cache settings
    pub cache: CacheSettings,
}

/// Scraping engine settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ScraperSettings {
    /// Whether headless-browser strategies may run. With this off,
    /// auto strategy selection stays on the static fetch.
    pub headless_enabled: bool,

    /// Ceiling on concurrent outbound requests.
    pub max_concurrent_requests: usize,

    /// Minimum spacing between request dispatches, in milliseconds.
    pub min_request_interval_ms: u64,
}

impl Default for ScraperSettings {
    fn default() -> Self {
        Self {
            headless_enabled: true,
            max_concurrent_requests: 4,
            min_request_interval_ms: 500,
        }
    }
}

/// Metadata provider toggles
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ProviderSettings {
    /// Catalog-scrape provider (needs headless execution).
    pub catalog_enabled: bool,

    /// Lightweight structured-lookup provider.
    pub fallback_enabled: bool,
}

impl Default for ProviderSettings {
    fn default() -> Self {
        Self {
            catalog_enabled: true,
            fallback_enabled: true,
        }
    }
}

/// Cache settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheSettings {
    /// Bound on memory-tier keys.
    pub memory_capacity: usize,
}

impl Default for CacheSettings {
    fn default() -> Self {
        Self {
            memory_capacity: 256,
        }
    }
}

// ============================================================================
// Config File Operations
// ============================================================================

/// Get the config directory path
pub fn config_dir() -> Option<PathBuf> {
    dirs::config_dir().map(|d| d.join("cratedigger"))
}

/// Get the full path to the config file
pub fn config_path() -> Option<PathBuf> {
    config_dir().map(|d| d.join("config.toml"))
}

/// Load configuration from disk
///
/// Returns default config if file doesn't exist or can't be parsed.
/// Logs warnings but doesn't fail - we always return a usable config.
pub fn load() -> Config {
    let Some(path) = config_path() else {
        tracing::warn!("Could not determine config directory, using defaults");
        return Config::default();
    };

    if !path.exists() {
        tracing::info!("No config file found at {:?}, using defaults", path);
        return Config::default();
    }

    match std::fs::read_to_string(&path) {
        Ok(contents) => match toml::from_str(&contents) {
            Ok(config) => {
                tracing::info!("Loaded config from {:?}", path);
                config
            }
            Err(e) => {
                tracing::error!("Failed to parse config file {:?}: {}", path, e);
                tracing::warn!("Using default configuration");
                Config::default()
            }
        },
        Err(e) => {
            tracing::error!("Failed to read config file {:?}: {}", path, e);
            Config::default()
        }
    }
}

/// Save configuration to disk
///
/// Creates the config directory if it doesn't exist.
pub fn save(config: &Config) -> Result<(), ConfigError> {
    let dir = config_dir().ok_or(ConfigError::NoConfigDir)?;
    let path = dir.join("config.toml");

    // Ensure directory exists
    std::fs::create_dir_all(&dir).map_err(|e| ConfigError::CreateDir(dir.clone(), e))?;

    // Serialize to pretty TOML
    let contents = toml::to_string_pretty(config).map_err(ConfigError::Serialize)?;

    // Write atomically (write to temp, then rename)
    let temp_path = path.with_extension("toml.tmp");
    std::fs::write(&temp_path, &contents).map_err(|e| ConfigError::Write(temp_path.clone(), e))?;
    std::fs::rename(&temp_path, &path)
        .map_err(|e| ConfigError::Rename(temp_path, path.clone(), e))?;

    tracing::info!("Saved config to {:?}", path);
    Ok(())
}

// ============================================================================
// Error Types
// ============================================================================

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Could not determine config directory")]
    NoConfigDir,

    #[error("Failed to create config directory {0}: {1}")]
    CreateDir(PathBuf, std::io::Error),

    #[error("Failed to serialize config: {0}")]
    Serialize(toml::ser::Error),

    #[error("Failed to write config to {0}: {1}")]
    Write(PathBuf, std::io::Error),

    #[error("Failed to rename temp file {0} to {1}: {2}")]
    Rename(PathBuf, PathBuf, std::io::Error),
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_serializes() {
        let config = Config::default();
        let toml = toml::to_string_pretty(&config).unwrap();
        assert!(toml.contains("[scraper]"));
        assert!(toml.contains("[providers]"));
        assert!(toml.contains("[cache]"));
    }

    #[test]
    fn test_config_roundtrip() {
        let mut config = Config::default();
        config.scraper.headless_enabled = false;
        config.scraper.max_concurrent_requests = 2;
        config.providers.catalog_enabled = false;

        let toml = toml::to_string_pretty(&config).unwrap();
        let parsed: Config = toml::from_str(&toml).unwrap();

        assert!(!parsed.scraper.headless_enabled);
        assert_eq!(parsed.scraper.max_concurrent_requests, 2);
        assert!(!parsed.providers.catalog_enabled);
    }

    #[test]
    fn test_partial_config_uses_defaults() {
        // Config with only some fields
        let toml = r#"
[scraper]
headless_enabled = false
"#;
        let config: Config = toml::from_str(toml).unwrap();

        // Specified field is set
        assert!(!config.scraper.headless_enabled);

        // Other fields use defaults
        assert_eq!(config.scraper.max_concurrent_requests, 4);
        assert!(config.providers.catalog_enabled);
        assert_eq!(config.cache.memory_capacity, 256);
    }
}
