//! Configuration management for chalktalk

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::error::{ConfigError, Result};

/// Default model service, overridable per install or via CHALKTALK_API_HOST
pub const DEFAULT_BACKEND_HOST: &str = "https://models.chalktalk.dev";

/// Default narration voice
pub const DEFAULT_VOICE: &str = "kore";

/// Application configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Model service API key
    #[serde(skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,

    /// Base URL of the static archive deployment
    #[serde(skip_serializing_if = "Option::is_none")]
    pub archive_root: Option<String>,

    /// Base URL of the model service
    #[serde(skip_serializing_if = "Option::is_none")]
    pub backend_host: Option<String>,

    /// User preferences
    #[serde(default)]
    pub preferences: Preferences,
}

/// User preferences
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Preferences {
    /// Default output format
    #[serde(skip_serializing_if = "Option::is_none")]
    pub format: Option<String>,

    /// Narration voice
    #[serde(default = "default_voice")]
    pub voice: String,

    /// Narrate responses aloud by default
    #[serde(default)]
    pub narration: bool,
}

fn default_voice() -> String {
    DEFAULT_VOICE.to_string()
}

impl Default for Preferences {
    fn default() -> Self {
        Self {
            format: None,
            voice: default_voice(),
            narration: false,
        }
    }
}

impl Config {
    /// Get the default config file path
    pub fn default_path() -> Result<PathBuf> {
        let home = dirs::home_dir().ok_or(ConfigError::Invalid(
            "Could not determine home directory".to_string(),
        ))?;

        Ok(home.join(".chalktalk").join("config.yaml"))
    }

    /// Load configuration from the default path
    pub fn load() -> Result<Self> {
        Self::load_from(Self::default_path()?)
    }

    /// Load configuration from a specific path
    pub fn load_from(path: PathBuf) -> Result<Self> {
        if !path.exists() {
            return Err(ConfigError::NotFound.into());
        }

        let contents = std::fs::read_to_string(&path)?;
        let config: Config = serde_yaml::from_str(&contents).map_err(ConfigError::from)?;

        Ok(config)
    }

    /// Save configuration to the default path
    pub fn save(&self) -> Result<()> {
        self.save_to(Self::default_path()?)
    }

    /// Save configuration to a specific path
    pub fn save_to(&self, path: PathBuf) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let contents =
            serde_yaml::to_string(self).map_err(|e| ConfigError::SaveError(e.to_string()))?;

        std::fs::write(&path, contents)?;

        // Set file permissions to 600 on Unix systems
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let mut perms = std::fs::metadata(&path)?.permissions();
            perms.set_mode(0o600);
            std::fs::set_permissions(&path, perms)?;
        }

        Ok(())
    }

    /// Archive root, with the CHALKTALK_ARCHIVE_ROOT override for tests and
    /// local deployments
    pub fn archive_root(&self) -> Option<String> {
        std::env::var("CHALKTALK_ARCHIVE_ROOT")
            .ok()
            .filter(|v| !v.trim().is_empty())
            .or_else(|| self.archive_root.clone())
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            api_key: None,
            archive_root: None,
            backend_host: None,
            preferences: Preferences::default(),
        }
    }
}

/// Validated settings for the live generation backend. The key is taken
/// only from the configuration file, never from the ambient environment.
#[derive(Debug, Clone)]
pub struct BackendConfig {
    pub api_key: String,
    pub base_url: String,
    pub voice: String,
}

impl BackendConfig {
    /// Extract and validate backend settings. Fails fast when the API key
    /// is absent or blank.
    pub fn from_config(config: &Config) -> Result<Self> {
        let api_key = config
            .api_key
            .as_deref()
            .map(str::trim)
            .filter(|k| !k.is_empty())
            .ok_or(ConfigError::MissingApiKey)?
            .to_string();

        let base_url = std::env::var("CHALKTALK_API_HOST")
            .ok()
            .filter(|v| !v.trim().is_empty())
            .or_else(|| config.backend_host.clone())
            .unwrap_or_else(|| DEFAULT_BACKEND_HOST.to_string());

        Ok(Self {
            api_key,
            base_url,
            voice: config.preferences.voice.clone(),
        })
    }
}
