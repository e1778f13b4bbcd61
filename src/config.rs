//! Persisted settings and API key resolution.
//!
//! Settings live in `<config dir>/citegap/config.json`. The API key is
//! resolved with precedence: explicit argument > `SEMANTIC_SCHOLAR_API_KEY`
//! > persisted settings > a `.s2_api_key` file in the working directory.

use crate::error::{GapError, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// Environment variable holding the Semantic Scholar API key
pub const API_KEY_ENV: &str = "SEMANTIC_SCHOLAR_API_KEY";

/// Project-local key file name
pub const KEY_FILE: &str = ".s2_api_key";

/// Default settings file path: `<config dir>/citegap/config.json`
fn default_settings_path() -> Result<PathBuf> {
    dirs::config_dir()
        .map(|p| p.join("citegap").join("config.json"))
        .ok_or_else(|| GapError::Config("Cannot determine config directory".to_string()))
}

/// Default cache directory: `<cache dir>/citegap`
pub fn default_cache_dir() -> PathBuf {
    dirs::cache_dir()
        .map(|p| p.join("citegap"))
        .unwrap_or_else(|| PathBuf::from(".citegap-cache"))
}

/// User settings persisted between runs
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Settings {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cache_dir: Option<PathBuf>,
}

/// Loads and saves [`Settings`]
pub struct SettingsManager {
    path: PathBuf,
}

impl SettingsManager {
    /// Create a manager for the default settings path
    pub fn new() -> Result<Self> {
        Ok(Self {
            path: default_settings_path()?,
        })
    }

    /// Create a manager for a custom path
    pub fn with_path(path: PathBuf) -> Self {
        Self { path }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Load settings from file
    ///
    /// Returns defaults if the file doesn't exist or is invalid
    pub fn load(&self) -> Settings {
        if !self.path.exists() {
            debug!("Settings file not found: {:?}", self.path);
            return Settings::default();
        }

        match std::fs::read_to_string(&self.path) {
            Ok(content) => match serde_json::from_str::<Settings>(&content) {
                Ok(settings) => settings,
                Err(e) => {
                    warn!("Failed to parse settings: {}", e);
                    Settings::default()
                }
            },
            Err(e) => {
                warn!("Failed to read settings file: {}", e);
                Settings::default()
            }
        }
    }

    /// Save settings to file, creating the parent directory if needed
    pub fn save(&self, settings: &Settings) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content = serde_json::to_string_pretty(settings)?;
        std::fs::write(&self.path, content)?;
        info!("Saved settings to {:?}", self.path);
        Ok(())
    }

    /// Persist a new API key, keeping other settings
    pub fn set_api_key(&self, key: &str) -> Result<()> {
        let key = key.trim();
        if key.is_empty() {
            return Err(GapError::Config("API key must not be empty".to_string()));
        }
        let mut settings = self.load();
        settings.api_key = Some(key.to_string());
        self.save(&settings)
    }
}

/// Resolve the API key from every source, first non-blank value wins.
pub fn resolve_api_key(explicit: Option<&str>, settings: &Settings, project_dir: &Path) -> Option<String> {
    let from_env = std::env::var(API_KEY_ENV).ok();
    let from_file = std::fs::read_to_string(project_dir.join(KEY_FILE)).ok();
    pick_api_key([
        explicit.map(str::to_string),
        from_env,
        settings.api_key.clone(),
        from_file,
    ])
}

fn pick_api_key<const N: usize>(candidates: [Option<String>; N]) -> Option<String> {
    candidates
        .into_iter()
        .flatten()
        .map(|k| k.trim().to_string())
        .find(|k| !k.is_empty())
}
