//! Engine configuration
//!
//! Loaded from YAML, with environment overrides for secrets and paths.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::cache::DEFAULT_STORAGE_KEY;
use crate::error::ConfigError;
use crate::providers::ZoomRange;
use crate::setup::FetchPolicy;

/// Environment variable naming a YAML config file
pub const CONFIG_PATH_ENV: &str = "TAGNAV_CONFIG";
pub const STORAGE_PATH_ENV: &str = "TAGNAV_STORAGE_PATH";
pub const ACCESS_TOKEN_ENV: &str = "MAPBOX_ACCESS_TOKEN";

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NavConfig {
    pub storage: StorageConfig,
    pub offline_pack: OfflinePackConfig,
    pub directions: DirectionsConfig,
    pub setup: SetupConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Directory holding persisted snapshots
    pub path: PathBuf,
    pub key: String,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from("tagnav-data"),
            key: DEFAULT_STORAGE_KEY.to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OfflinePackConfig {
    pub style_url: String,
    pub min_zoom: u8,
    pub max_zoom: u8,
    pub name_prefix: String,
}

impl Default for OfflinePackConfig {
    fn default() -> Self {
        Self {
            style_url: "mapbox://styles/mapbox/streets-v12".to_string(),
            min_zoom: 10,
            max_zoom: 16,
            name_prefix: "tagnav".to_string(),
        }
    }
}

impl OfflinePackConfig {
    pub fn zoom(&self) -> ZoomRange {
        ZoomRange {
            min: self.min_zoom,
            max: self.max_zoom,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DirectionsConfig {
    pub base_url: String,
    pub profile: String,
    #[serde(skip_serializing)]
    pub access_token: String,
    pub timeout_secs: u64,
}

impl Default for DirectionsConfig {
    fn default() -> Self {
        Self {
            base_url: "https://api.mapbox.com".to_string(),
            profile: "walking".to_string(),
            access_token: String::new(),
            timeout_secs: 30,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SetupConfig {
    pub fetch_policy: FetchPolicy,
}

impl NavConfig {
    pub fn from_yaml(yaml: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_yaml::from_str(yaml)?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let yaml = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_yaml(&yaml)
    }

    /// Defaults (or the file named by `TAGNAV_CONFIG`) plus environment overrides
    pub fn from_env() -> Result<Self, ConfigError> {
        let mut config = match std::env::var(CONFIG_PATH_ENV) {
            Ok(path) => {
                tracing::info!(path = %path, "loading configuration");
                Self::from_file(path)?
            }
            Err(_) => Self::default(),
        };

        if let Ok(token) = std::env::var(ACCESS_TOKEN_ENV) {
            config.directions.access_token = token;
        }
        if let Ok(path) = std::env::var(STORAGE_PATH_ENV) {
            config.storage.path = PathBuf::from(path);
        }

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.offline_pack.min_zoom > self.offline_pack.max_zoom {
            return Err(ConfigError::Invalid(format!(
                "offline_pack.min_zoom ({}) exceeds max_zoom ({})",
                self.offline_pack.min_zoom, self.offline_pack.max_zoom
            )));
        }
        if self.storage.key.is_empty() {
            return Err(ConfigError::Invalid("storage.key is empty".into()));
        }
        Ok(())
    }
}
