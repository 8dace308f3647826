//! Control-plane configuration
//! Loaded once per process from `<config_dir>/spectrum/control.json`

use crate::error::StorageError;
use crate::gain::UNITY_FADER;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::LazyLock;
use std::time::Duration;
use tracing::{info, warn};

/// I/O Buffer size default
const DEFAULT_IO_BUFFER_SIZE: u32 = 256;

/// Get config directory path
fn config_dir() -> Option<PathBuf> {
    dirs::config_dir().map(|p| p.join("spectrum"))
}

/// Get config file path
pub fn config_path() -> Option<PathBuf> {
    config_dir().map(|p| p.join("control.json"))
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ControlConfig {
    /// Config version (for future migrations)
    pub version: u32,
    /// I/O buffer size, persisted with the session
    pub io_buffer_size: u32,
    /// Device inventory refresh interval
    pub inventory_poll_ms: u64,
    /// Level meter refreshes per second
    pub meter_refresh_hz: u32,
    /// Quiet period before a change is written to disk
    pub persist_debounce_ms: u64,
    /// Session state file; `~` is expanded. Defaults to the data dir.
    pub state_path: Option<String>,
    /// Transports treated as a shared channel multiplexer for feedback checks
    pub feedback_transports: Vec<String>,
    /// Send level for new connections (fader scale)
    pub default_send_level: f64,
}

impl Default for ControlConfig {
    fn default() -> Self {
        Self {
            version: 1,
            io_buffer_size: DEFAULT_IO_BUFFER_SIZE,
            inventory_poll_ms: 2000,
            meter_refresh_hz: 30,
            persist_debounce_ms: 2000,
            state_path: None,
            feedback_transports: vec!["Virtual".to_string()],
            default_send_level: UNITY_FADER,
        }
    }
}

impl ControlConfig {
    /// Load from the default location, falling back to defaults
    pub fn load() -> Self {
        match config_path() {
            Some(path) => Self::load_from(&path),
            None => {
                warn!("[config] could not determine config path, using defaults");
                Self::default()
            }
        }
    }

    pub fn load_from(path: &Path) -> Self {
        if !path.exists() {
            info!("[config] no config file at {}, using defaults", path.display());
            return Self::default();
        }
        match fs::read_to_string(path) {
            Ok(content) => match serde_json::from_str::<ControlConfig>(&content) {
                Ok(config) => {
                    info!("[config] loaded {}", path.display());
                    config
                }
                Err(e) => {
                    warn!(error = %e, "[config] failed to parse config, using defaults");
                    Self::default()
                }
            },
            Err(e) => {
                warn!(error = %e, "[config] failed to read config, using defaults");
                Self::default()
            }
        }
    }

    /// Save to the default location
    pub fn save(&self) -> Result<(), StorageError> {
        let path = config_path().ok_or(StorageError::NoPath)?;
        self.save_to(&path)
    }

    pub fn save_to(&self, path: &Path) -> Result<(), StorageError> {
        if let Some(dir) = path.parent() {
            if !dir.exists() {
                fs::create_dir_all(dir)?;
            }
        }
        let content = serde_json::to_string_pretty(self)?;
        fs::write(path, content)?;
        info!("[config] saved {}", path.display());
        Ok(())
    }

    pub fn inventory_interval(&self) -> Duration {
        Duration::from_millis(self.inventory_poll_ms.max(1))
    }

    pub fn meter_interval(&self) -> Duration {
        Duration::from_secs_f64(1.0 / f64::from(self.meter_refresh_hz.max(1)))
    }

    pub fn persist_debounce(&self) -> Duration {
        Duration::from_millis(self.persist_debounce_ms)
    }

    /// Resolved session state file
    pub fn state_file(&self) -> Result<PathBuf, StorageError> {
        match &self.state_path {
            Some(raw) => Ok(PathBuf::from(shellexpand::tilde(raw).into_owned())),
            None => crate::state::JsonFileStorage::default_path(),
        }
    }
}

// --- Global config state ---

static CONTROL_CONFIG: LazyLock<RwLock<ControlConfig>> =
    LazyLock::new(|| RwLock::new(ControlConfig::load()));

/// Current process-wide config
pub fn get_config() -> ControlConfig {
    CONTROL_CONFIG.read().clone()
}

/// Replace and persist the process-wide config
pub fn update_config(config: ControlConfig) -> Result<(), StorageError> {
    let mut current = CONTROL_CONFIG.write();
    *current = config;
    current.save()
}

/// Save I/O buffer size
pub fn save_io_buffer_size(size: u32) -> Result<(), StorageError> {
    let mut config = CONTROL_CONFIG.write();
    config.io_buffer_size = size;
    config.save()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_fields_take_defaults() {
        let config: ControlConfig = serde_json::from_str(r#"{ "meter_refresh_hz": 60 }"#).unwrap();
        assert_eq!(config.meter_refresh_hz, 60);
        assert_eq!(config.inventory_poll_ms, 2000);
        assert_eq!(config.feedback_transports, vec!["Virtual".to_string()]);
    }

    #[test]
    fn test_invalid_file_falls_back() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("control.json");
        fs::write(&path, "not json").unwrap();
        assert_eq!(ControlConfig::load_from(&path), ControlConfig::default());
    }

    #[test]
    fn test_save_and_reload() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("spectrum").join("control.json");
        let config = ControlConfig {
            io_buffer_size: 512,
            state_path: Some("~/graph.json".into()),
            ..Default::default()
        };
        config.save_to(&path).unwrap();
        assert_eq!(ControlConfig::load_from(&path), config);
    }

    #[test]
    fn test_tilde_expansion() {
        if dirs::home_dir().is_none() {
            return;
        }
        let config = ControlConfig {
            state_path: Some("~/spectrum/graph.json".into()),
            ..Default::default()
        };
        let file = config.state_file().unwrap();
        assert!(!file.to_string_lossy().starts_with('~'));
        assert!(file.ends_with("spectrum/graph.json"));
    }

    #[test]
    fn test_intervals() {
        let config = ControlConfig::default();
        assert_eq!(config.inventory_interval(), Duration::from_secs(2));
        assert_eq!(config.persist_debounce(), Duration::from_secs(2));
        assert!((config.meter_interval().as_secs_f64() - 1.0 / 30.0).abs() < 1e-9);
    }
}
