//! Configuration management with versioning and migration

use crate::error::{Result, TrayError};
use directories::ProjectDirs;
use log::{debug, info};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

/// Current configuration version
pub const CONFIG_VERSION: u32 = 1;

/// Portable mode marker filename
const PORTABLE_MARKER: &str = "portable.txt";

/// Configuration filename
const CONFIG_FILENAME: &str = "tray.toml";

/// Application name used for the platform config directory
const APP_DIR_NAME: &str = "tray-controller";

/// Controller configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrayConfig {
    /// Configuration version for migration
    #[serde(default = "default_version")]
    pub config_version: u32,

    /// Tray and native backend settings
    #[serde(default)]
    pub tray: TraySection,

    /// Logging settings
    #[serde(default)]
    pub logging: LoggingSection,
}

fn default_version() -> u32 {
    CONFIG_VERSION
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TraySection {
    /// Name registered with the notification subsystem
    #[serde(default = "default_app_name")]
    pub app_name: String,

    /// Prefix of the per-instance native identity
    #[serde(default = "default_identity_prefix")]
    pub identity_prefix: String,

    /// Upper bound for one blocking loop iteration on park-based backends
    #[serde(default = "default_idle_wait")]
    pub idle_wait_ms: u64,
}

fn default_app_name() -> String {
    "tray-icon".to_string()
}

fn default_identity_prefix() -> String {
    "trayid".to_string()
}

fn default_idle_wait() -> u64 {
    50
}

impl Default for TraySection {
    fn default() -> Self {
        Self {
            app_name: default_app_name(),
            identity_prefix: default_identity_prefix(),
            idle_wait_ms: default_idle_wait(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingSection {
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Maximum log file size in bytes
    #[serde(default = "default_max_log_size")]
    pub max_file_size: u64,

    /// Number of log files to keep
    #[serde(default = "default_max_log_files")]
    pub max_files: u32,

    /// Log directory override
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub log_dir: Option<PathBuf>,
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_max_log_size() -> u64 {
    5 * 1024 * 1024 // 5MB
}

fn default_max_log_files() -> u32 {
    3
}

impl Default for LoggingSection {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            max_file_size: default_max_log_size(),
            max_files: default_max_log_files(),
            log_dir: None,
        }
    }
}

impl Default for TrayConfig {
    fn default() -> Self {
        Self {
            config_version: CONFIG_VERSION,
            tray: TraySection::default(),
            logging: LoggingSection::default(),
        }
    }
}

impl TrayConfig {
    /// Parse a config document, filling in defaults and migrating old versions
    pub fn from_toml_str(content: &str) -> Result<Self> {
        let mut config: TrayConfig = toml::from_str(content)?;
        config.migrate();
        Ok(config)
    }

    /// Bring a document written by an older version up to date
    fn migrate(&mut self) {
        if self.config_version < CONFIG_VERSION {
            info!(
                "Migrating config from version {} to {}",
                self.config_version, CONFIG_VERSION
            );
            self.config_version = CONFIG_VERSION;
        }
    }
}

/// Manages configuration loading, saving, and migration
pub struct ConfigManager {
    config_path: PathBuf,
    is_portable: bool,
}

impl ConfigManager {
    /// Create a new config manager, detecting portable vs installed mode
    pub fn new() -> Result<Self> {
        let (config_path, is_portable) = Self::detect_config_path()?;
        Ok(Self {
            config_path,
            is_portable,
        })
    }

    /// Config manager bound to an explicit file
    pub fn with_path(config_path: impl Into<PathBuf>) -> Self {
        Self {
            config_path: config_path.into(),
            is_portable: true,
        }
    }

    /// Detect whether we're running in portable mode and get config path
    fn detect_config_path() -> Result<(PathBuf, bool)> {
        let exe_path = std::env::current_exe()
            .map_err(|e| TrayError::ConfigError(format!("Could not get exe path: {}", e)))?;
        let exe_dir = exe_path
            .parent()
            .ok_or_else(|| TrayError::ConfigError("Could not get exe directory".to_string()))?;

        if exe_dir.join(PORTABLE_MARKER).exists() {
            debug!("Portable mode detected via marker file");
            return Ok((exe_dir.join(CONFIG_FILENAME), true));
        }

        match ProjectDirs::from("com", APP_DIR_NAME, APP_DIR_NAME) {
            Some(dirs) => Ok((dirs.config_dir().join(CONFIG_FILENAME), false)),
            None => {
                debug!("No platform config directory, falling back to portable mode");
                Ok((exe_dir.join(CONFIG_FILENAME), true))
            }
        }
    }

    /// Check if running in portable mode
    pub fn is_portable(&self) -> bool {
        self.is_portable
    }

    /// Get the config file path
    pub fn config_path(&self) -> &Path {
        &self.config_path
    }

    /// Get the log directory
    pub fn log_dir(&self) -> PathBuf {
        let base = self
            .config_path
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_else(|| PathBuf::from("."));
        if self.is_portable {
            base.join("logs")
        } else {
            base
        }
    }

    /// Load configuration from file
    pub fn load(&self) -> Result<TrayConfig> {
        if !self.config_path.exists() {
            info!("Config file not found, using defaults");
            return Ok(TrayConfig::default());
        }

        let content = fs::read_to_string(&self.config_path)
            .map_err(|e| TrayError::ConfigError(format!("Could not read config: {}", e)))?;

        let stored_version = toml::from_str::<toml::Table>(&content)
            .ok()
            .and_then(|table| table.get("config_version").and_then(|v| v.as_integer()));

        let config = TrayConfig::from_toml_str(&content)?;

        if stored_version.is_some_and(|v| v < i64::from(CONFIG_VERSION)) {
            self.save(&config)?;
        }

        info!("Loaded config from {:?}", self.config_path);
        Ok(config)
    }

    /// Save configuration to file
    pub fn save(&self, config: &TrayConfig) -> Result<()> {
        if let Some(parent) = self.config_path.parent() {
            fs::create_dir_all(parent)?;
        }

        let content = toml::to_string_pretty(config)?;

        fs::write(&self.config_path, content)
            .map_err(|e| TrayError::ConfigError(format!("Could not write config: {}", e)))?;

        info!("Saved config to {:?}", self.config_path);
        Ok(())
    }
}
