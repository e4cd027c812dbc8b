//! Logger installation and size-based log rotation

use crate::error::{Result, TrayError};
use crate::settings::config::LoggingSection;
use log::LevelFilter;
use simplelog::{CombinedLogger, ConfigBuilder, SharedLogger, ThreadLogMode, WriteLogger};
#[cfg(debug_assertions)]
use simplelog::{ColorChoice, TermLogger, TerminalMode};
use std::fs::{self, OpenOptions};
use std::path::{Path, PathBuf};
use std::str::FromStr;

const LOG_FILENAME: &str = "tray_controller.log";

/// Where and how much to log
pub struct LoggingConfig {
    pub level: LevelFilter,
    pub log_dir: PathBuf,
    pub rotation: LogRotation,
}

impl LoggingConfig {
    /// Path of the active log file
    pub fn log_path(&self) -> PathBuf {
        self.log_dir.join(LOG_FILENAME)
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        LoggingConfig::from(&LoggingSection::default())
    }
}

impl From<&LoggingSection> for LoggingConfig {
    fn from(section: &LoggingSection) -> Self {
        Self {
            level: parse_log_level(&section.level),
            log_dir: section.log_dir.clone().unwrap_or_else(|| PathBuf::from(".")),
            rotation: LogRotation {
                max_size: section.max_file_size,
                keep: section.max_files,
            },
        }
    }
}

/// Size-triggered rotation keeping `keep` numbered backups (`.log.1` newest)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LogRotation {
    pub max_size: u64,
    pub keep: u32,
}

impl LogRotation {
    fn backup(path: &Path, index: u32) -> PathBuf {
        path.with_extension(format!("log.{}", index))
    }

    /// Shift backups up by one when `path` has reached `max_size`
    ///
    /// Returns whether a rotation happened.
    pub fn rotate(&self, path: &Path) -> Result<bool> {
        let size = match fs::metadata(path) {
            Ok(metadata) => metadata.len(),
            Err(_) => return Ok(false),
        };
        if size < self.max_size {
            return Ok(false);
        }
        log::debug!("Rotating {:?} at {} bytes", path, size);

        if self.keep == 0 {
            fs::remove_file(path)?;
            return Ok(true);
        }

        let oldest = Self::backup(path, self.keep);
        if oldest.exists() {
            fs::remove_file(&oldest)?;
        }
        for index in (1..self.keep).rev() {
            let from = Self::backup(path, index);
            if from.exists() {
                fs::rename(&from, Self::backup(path, index + 1))?;
            }
        }
        fs::rename(path, Self::backup(path, 1))?;
        Ok(true)
    }
}

/// Install the global logger: a terminal logger in debug builds plus the log file
pub fn init_logging(config: LoggingConfig) -> Result<()> {
    fs::create_dir_all(&config.log_dir)?;
    let log_path = config.log_path();
    config.rotation.rotate(&log_path)?;

    let log_file = OpenOptions::new().create(true).append(true).open(&log_path)?;

    // Updates hop between threads, so every line carries the thread name
    let format = ConfigBuilder::new()
        .set_time_format_rfc3339()
        .set_target_level(LevelFilter::Error)
        .set_location_level(LevelFilter::Debug)
        .set_thread_level(LevelFilter::Error)
        .set_thread_mode(ThreadLogMode::Both)
        .build();

    let mut loggers: Vec<Box<dyn SharedLogger>> = Vec::new();
    #[cfg(debug_assertions)]
    loggers.push(TermLogger::new(
        config.level,
        format.clone(),
        TerminalMode::Mixed,
        ColorChoice::Auto,
    ));
    loggers.push(WriteLogger::new(config.level, format, log_file));

    CombinedLogger::init(loggers).map_err(|e| TrayError::ConfigError(format!("Logger init failed: {}", e)))?;

    log::info!(
        "Logging at {} to {:?}",
        log_level_to_string(config.level),
        log_path
    );
    Ok(())
}

/// Level named in the config; unknown names fall back to info
pub fn parse_log_level(level: &str) -> LevelFilter {
    let level = level.trim();
    if level.eq_ignore_ascii_case("warning") {
        return LevelFilter::Warn;
    }
    LevelFilter::from_str(level).unwrap_or(LevelFilter::Info)
}

/// Config spelling of `level`
pub fn log_level_to_string(level: LevelFilter) -> String {
    level.as_str().to_ascii_lowercase()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_log_level() {
        assert_eq!(parse_log_level("info"), LevelFilter::Info);
        assert_eq!(parse_log_level("DEBUG"), LevelFilter::Debug);
        assert_eq!(parse_log_level(" Warning "), LevelFilter::Warn);
        assert_eq!(parse_log_level("off"), LevelFilter::Off);
        assert_eq!(parse_log_level("invalid"), LevelFilter::Info);
    }

    #[test]
    fn test_level_names_round_trip_through_config() {
        for level in [LevelFilter::Trace, LevelFilter::Warn, LevelFilter::Off] {
            assert_eq!(parse_log_level(&log_level_to_string(level)), level);
        }
        assert_eq!(log_level_to_string(LevelFilter::Info), "info");
    }

    #[test]
    fn test_rotation_shifts_backups() {
        let dir = tempfile::tempdir().unwrap();
        let log_path = dir.path().join(LOG_FILENAME);
        fs::write(&log_path, vec![b'x'; 64]).unwrap();
        fs::write(LogRotation::backup(&log_path, 1), b"older").unwrap();

        let rotation = LogRotation { max_size: 16, keep: 3 };
        assert!(rotation.rotate(&log_path).unwrap());

        assert!(!log_path.exists());
        assert_eq!(fs::read(LogRotation::backup(&log_path, 1)).unwrap().len(), 64);
        assert_eq!(fs::read(LogRotation::backup(&log_path, 2)).unwrap(), b"older");
    }

    #[test]
    fn test_small_or_missing_log_is_left_alone() {
        let dir = tempfile::tempdir().unwrap();
        let log_path = dir.path().join(LOG_FILENAME);
        let rotation = LogRotation { max_size: 1024, keep: 3 };

        assert!(!rotation.rotate(&log_path).unwrap());
        fs::write(&log_path, b"short").unwrap();
        assert!(!rotation.rotate(&log_path).unwrap());
        assert!(log_path.exists());
    }

    #[test]
    fn test_oldest_backup_is_dropped() {
        let dir = tempfile::tempdir().unwrap();
        let log_path = dir.path().join(LOG_FILENAME);
        fs::write(&log_path, vec![b'x'; 64]).unwrap();
        fs::write(LogRotation::backup(&log_path, 1), b"one").unwrap();
        fs::write(LogRotation::backup(&log_path, 2), b"two").unwrap();

        LogRotation { max_size: 16, keep: 2 }.rotate(&log_path).unwrap();
        assert_eq!(fs::read(LogRotation::backup(&log_path, 2)).unwrap(), b"one");
        assert!(!LogRotation::backup(&log_path, 3).exists());
    }

    #[test]
    fn test_config_from_section() {
        let section = LoggingSection {
            level: "debug".to_string(),
            max_file_size: 1024,
            max_files: 2,
            log_dir: None,
        };
        let config = LoggingConfig::from(&section);
        assert_eq!(config.level, LevelFilter::Debug);
        assert_eq!(config.rotation, LogRotation { max_size: 1024, keep: 2 });
        assert_eq!(config.log_path(), PathBuf::from(".").join(LOG_FILENAME));
    }
}
