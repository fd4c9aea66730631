//! Application configuration.
//!
//! Loaded from `config.toml` under the platform config directory. Missing or
//! corrupt configuration at the default location degrades to defaults rather
//! than preventing startup; an explicitly requested path is loaded strictly.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, warn};

use crate::listener::ListenerSettings;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config at {path:?}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Failed to parse config at {path:?}: {source}")]
    Parse {
        path: PathBuf,
        source: toml::de::Error,
    },
}

#[derive(Deserialize, Serialize, Clone, Debug)]
#[serde(default)]
pub struct AppConfig {
    /// Listener polling frequency in Hz.
    pub tick_rate: u32,
    /// Seconds a held press needs to skip a button.
    pub skip_after_secs: u32,
    /// Layout used when none is given on the command line.
    pub default_layout: String,
    /// Directory for generated layout files; the working directory if unset.
    pub output_dir: Option<PathBuf>,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            tick_rate: 60,
            skip_after_secs: 3,
            default_layout: crate::mapping::FULL_LAYOUT.to_string(),
            output_dir: None,
        }
    }
}

impl AppConfig {
    /// `<platform config dir>/joymapper/config.toml`.
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join("joymapper").join("config.toml"))
    }

    /// Fail-safe load from the default location.
    pub fn load_default() -> Self {
        let Some(path) = Self::default_path() else {
            debug!("No config directory on this platform, using defaults");
            return Self::default();
        };
        if !path.exists() {
            debug!("No config at {:?}, using defaults", path);
            return Self::default();
        }

        match Self::load_from(&path) {
            Ok(config) => config,
            Err(e) => {
                warn!("Ignoring unusable config: {}", e);
                Self::default()
            }
        }
    }

    /// Strict load from an explicit path.
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let config = toml::from_str(&raw).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })?;
        debug!("Loaded config from {:?}: {:?}", path, config);
        Ok(config)
    }

    pub fn listener_settings(&self) -> ListenerSettings {
        ListenerSettings {
            tick_rate: self.tick_rate,
            skip_after_secs: self.skip_after_secs,
        }
    }

    pub fn output_dir(&self) -> PathBuf {
        self.output_dir
            .clone()
            .unwrap_or_else(|| PathBuf::from("."))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = AppConfig::default();
        assert_eq!(config.tick_rate, 60);
        assert_eq!(config.skip_after_secs, 3);
        assert_eq!(config.default_layout, "Full");
        assert_eq!(config.listener_settings().skip_ticks(), 180);
    }

    #[test]
    fn test_partial_config_fills_in_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "tick_rate = 120\ndefault_layout = \"Retro\"\n").unwrap();

        let config = AppConfig::load_from(&path).unwrap();
        assert_eq!(config.tick_rate, 120);
        assert_eq!(config.default_layout, "Retro");
        assert_eq!(config.skip_after_secs, 3);
    }

    #[test]
    fn test_strict_load_surfaces_parse_errors() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "tick_rate = \"fast\"").unwrap();

        assert!(matches!(
            AppConfig::load_from(&path),
            Err(ConfigError::Parse { .. })
        ));
    }
}
