//! Configuration for the presentation client
//!
//! Loads configuration from TOML file at `~/.config/shm-present/config.toml`
//! Auto-generates default config file on first run if missing.

use anyhow::{Context, Result, bail};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, info, warn};

/// Largest pool the client will manage
pub const MAX_POOL_SIZE: usize = 8;

/// Main configuration structure
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub window: WindowConfig,
    pub image: ImageConfig,
    pub pool: PoolConfig,
    pub logging: LoggingConfig,
}

impl Config {
    /// Load configuration from the default location, or use defaults if the
    /// file doesn't exist
    pub fn load() -> Result<Self> {
        let config_path = Self::config_path()?;
        Self::load_from(&config_path)
    }

    /// Load configuration from a specific file. A missing file yields the
    /// defaults and a freshly written default file.
    pub fn load_from(config_path: &Path) -> Result<Self> {
        if !config_path.exists() {
            info!("Config file not found at {:?}, using defaults", config_path);
            if let Err(e) = Self::save_default(config_path) {
                warn!("Failed to create default config file: {}", e);
            }
            return Ok(Self::default());
        }

        let content = fs::read_to_string(config_path)
            .with_context(|| format!("Failed to read config file {:?}", config_path))?;

        let config: Config = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file {:?}", config_path))?;

        config.validate()?;

        info!("Configuration loaded from {:?}", config_path);
        debug!("Config: {:?}", config);

        Ok(config)
    }

    /// Get the path to the config file
    fn config_path() -> Result<PathBuf> {
        let config_dir = dirs::config_dir()
            .context("Failed to get config directory")?
            .join("shm-present");

        Ok(config_dir.join("config.toml"))
    }

    /// Save default configuration to file
    fn save_default(path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).context("Failed to create config directory")?;
        }

        let toml_string = toml::to_string_pretty(&Self::default())
            .context("Failed to serialize default config")?;

        fs::write(path, toml_string).context("Failed to write default config file")?;

        info!("Created default config file at {:?}", path);
        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        let WindowConfig { width, height, .. } = self.window;
        if width == 0 || height == 0 {
            bail!("window size {}x{} must be non-zero", width, height);
        }
        if width as u64 * height as u64 * 4 > i32::MAX as u64 {
            bail!("window size {}x{} exceeds the shared memory limit", width, height);
        }
        if !(1..=MAX_POOL_SIZE).contains(&self.pool.size) {
            bail!("pool size {} must be between 1 and {}", self.pool.size, MAX_POOL_SIZE);
        }
        Ok(())
    }
}

/// Window geometry
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WindowConfig {
    pub width: u32,
    pub height: u32,
    /// Byte written over new buffer memory, so undrawn padding is visible
    pub fill: u8,
}

impl Default for WindowConfig {
    fn default() -> Self {
        Self {
            width: 1920,
            height: 1080,
            fill: 0xff,
        }
    }
}

/// Image asset to present
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ImageConfig {
    pub path: PathBuf,
}

impl Default for ImageConfig {
    fn default() -> Self {
        let dir = dirs::desktop_dir()
            .or_else(dirs::home_dir)
            .unwrap_or_else(|| PathBuf::from("."));
        Self {
            path: dir.join("test.png"),
        }
    }
}

/// Shared buffer pool
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PoolConfig {
    /// Two buffers: one presented, one being painted
    pub size: usize,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self { size: 2 }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Seconds between presentation-rate reports
    pub fps_report_secs: u64,
}

impl LoggingConfig {
    pub fn report_interval(&self) -> Duration {
        Duration::from_secs(self.fps_report_secs.max(1))
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self { fps_report_secs: 5 }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_match_fixed_window() {
        let config = Config::default();
        assert_eq!((config.window.width, config.window.height), (1920, 1080));
        assert_eq!(config.pool.size, 2);
        assert_eq!(config.window.fill, 0xff);
        assert!(config.image.path.ends_with("test.png"));
        config.validate().unwrap();
    }

    #[test]
    fn test_missing_file_writes_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("config.toml");

        let config = Config::load_from(&path).unwrap();
        assert_eq!(config, Config::default());
        assert!(path.exists());

        // the generated file loads back to the same values
        assert_eq!(Config::load_from(&path).unwrap(), config);
    }

    #[test]
    fn test_partial_file_keeps_other_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        fs::write(&path, "[pool]\nsize = 3\n\n[image]\npath = \"/tmp/a.png\"\n").unwrap();

        let config = Config::load_from(&path).unwrap();
        assert_eq!(config.pool.size, 3);
        assert_eq!(config.image.path, PathBuf::from("/tmp/a.png"));
        assert_eq!(config.window, WindowConfig::default());
    }

    #[test]
    fn test_invalid_values_are_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");

        fs::write(&path, "[window]\nwidth = 0\n").unwrap();
        assert!(Config::load_from(&path).is_err());

        fs::write(&path, "[pool]\nsize = 0\n").unwrap();
        assert!(Config::load_from(&path).is_err());

        fs::write(&path, "[window]\nwidth = 60000\nheight = 60000\n").unwrap();
        assert!(Config::load_from(&path).is_err());

        fs::write(&path, "this is not toml [").unwrap();
        assert!(Config::load_from(&path).is_err());
    }

    #[test]
    fn test_report_interval_never_zero() {
        let logging = LoggingConfig { fps_report_secs: 0 };
        assert_eq!(logging.report_interval(), Duration::from_secs(1));
    }
}
