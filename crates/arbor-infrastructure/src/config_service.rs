//! Configuration service implementation.
//!
//! Loads the sync configuration from `config.toml`, by default
//! `~/.config/arbor/config.toml`.

use arbor_core::config::SyncConfig;
use arbor_core::error::{ArborError, Result};
use std::path::{Path, PathBuf};
use std::sync::{Arc, PoisonError, RwLock};

const APP_DIR: &str = "arbor";
const CONFIG_FILE: &str = "config.toml";

/// Configuration service that loads and caches the sync configuration.
///
/// A missing file is not an error; the defaults apply until one is written.
#[derive(Debug, Clone)]
pub struct ConfigService {
    path: Option<PathBuf>,
    /// Cached configuration loaded from file.
    config: Arc<RwLock<Option<SyncConfig>>>,
}

impl ConfigService {
    /// Creates a service reading the default per-user config file.
    pub fn new() -> Self {
        Self {
            path: None,
            config: Arc::new(RwLock::new(None)),
        }
    }

    /// Creates a service reading an explicit file.
    pub fn with_path(path: impl Into<PathBuf>) -> Self {
        Self {
            path: Some(path.into()),
            config: Arc::new(RwLock::new(None)),
        }
    }

    /// Resolves the config file path.
    pub fn config_path(&self) -> Result<PathBuf> {
        if let Some(path) = &self.path {
            return Ok(path.clone());
        }
        let base = dirs::config_dir()
            .ok_or_else(|| ArborError::config("could not determine the config directory"))?;
        Ok(base.join(APP_DIR).join(CONFIG_FILE))
    }

    /// Gets the configuration, loading from file if not cached.
    ///
    /// A file that cannot be read or parsed is logged and the defaults are
    /// used.
    pub fn get_config(&self) -> SyncConfig {
        {
            let cached = self.config.read().unwrap_or_else(PoisonError::into_inner);
            if let Some(config) = cached.as_ref() {
                return config.clone();
            }
        }

        let loaded = self.load().unwrap_or_else(|err| {
            tracing::warn!("Using default configuration: {}", err);
            SyncConfig::default()
        });

        let mut cached = self.config.write().unwrap_or_else(PoisonError::into_inner);
        *cached = Some(loaded.clone());
        loaded
    }

    /// Reads the config file without touching the cache.
    pub fn load(&self) -> Result<SyncConfig> {
        let path = self.config_path()?;
        Self::load_from(&path)
    }

    fn load_from(path: &Path) -> Result<SyncConfig> {
        if !path.exists() {
            tracing::debug!(path = %path.display(), "No config file; using defaults");
            return Ok(SyncConfig::default());
        }
        let content = std::fs::read_to_string(path)?;
        let config: SyncConfig = toml::from_str(&content)?;
        tracing::info!(path = %path.display(), "Loaded configuration");
        Ok(config)
    }

    /// Writes `config` to the config file and refreshes the cache.
    pub fn save(&self, config: &SyncConfig) -> Result<()> {
        let path = self.config_path()?;
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content = toml::to_string_pretty(config)?;
        std::fs::write(&path, content)?;

        let mut cached = self.config.write().unwrap_or_else(PoisonError::into_inner);
        *cached = Some(config.clone());
        Ok(())
    }

    /// Invalidates the cache, forcing a reload on next access.
    pub fn invalidate_cache(&self) {
        let mut cached = self.config.write().unwrap_or_else(PoisonError::into_inner);
        *cached = None;
    }
}

impl Default for ConfigService {
    fn default() -> Self {
        Self::new()
    }
}
