//! Tests for configuration loading, saving, and migration

use std::fs;
use tray_controller::settings::config::{ConfigManager, TrayConfig, CONFIG_VERSION};

#[test]
fn test_default_tray_section() {
    let config = TrayConfig::default();

    assert_eq!(config.config_version, CONFIG_VERSION);
    assert_eq!(config.tray.app_name, "tray-icon");
    assert_eq!(config.tray.identity_prefix, "trayid");
    assert_eq!(config.tray.idle_wait_ms, 50);
}

#[test]
fn test_default_logging_config() {
    let config = TrayConfig::default();

    assert_eq!(config.logging.level, "info");
    assert_eq!(config.logging.max_file_size, 5 * 1024 * 1024);
    assert_eq!(config.logging.max_files, 3);
    assert!(config.logging.log_dir.is_none());
}

#[test]
fn test_config_roundtrip() {
    let mut config = TrayConfig::default();
    config.tray.app_name = "my-app".to_string();
    config.tray.identity_prefix = "myapp".to_string();
    config.logging.level = "debug".to_string();

    let toml_str = toml::to_string(&config).expect("Serialization failed");
    let parsed = TrayConfig::from_toml_str(&toml_str).expect("Deserialization failed");

    assert_eq!(parsed.tray.app_name, "my-app");
    assert_eq!(parsed.tray.identity_prefix, "myapp");
    assert_eq!(parsed.logging.level, "debug");
}

#[test]
fn test_config_partial_deserialization() {
    let partial_toml = r#"
        [tray]
        app_name = "partial"
    "#;

    let config = TrayConfig::from_toml_str(partial_toml).expect("Partial deserialization failed");

    assert_eq!(config.tray.app_name, "partial");
    // Defaults for missing fields
    assert_eq!(config.tray.identity_prefix, "trayid");
    assert_eq!(config.logging.max_files, 3);
}

#[test]
fn test_config_with_extra_fields() {
    let toml_with_extra = r#"
        config_version = 1
        unknown_field = "should be ignored"

        [tray]
        app_name = "extra"
        also_unknown = 123
    "#;

    let config = TrayConfig::from_toml_str(toml_with_extra).expect("Deserialization with extra fields failed");
    assert_eq!(config.tray.app_name, "extra");
}

#[test]
fn test_invalid_toml_is_config_error() {
    let result = TrayConfig::from_toml_str("[tray\napp_name = ");
    assert!(matches!(result, Err(tray_controller::TrayError::ConfigError(_))));
}

#[test]
fn test_load_missing_file_gives_defaults() {
    let dir = tempfile::tempdir().unwrap();
    let manager = ConfigManager::with_path(dir.path().join("tray.toml"));
    let config = manager.load().expect("Load failed");
    assert_eq!(config.tray.app_name, "tray-icon");
}

#[test]
fn test_save_then_load() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("nested").join("tray.toml");
    let manager = ConfigManager::with_path(&path);

    let mut config = TrayConfig::default();
    config.tray.idle_wait_ms = 10;
    manager.save(&config).expect("Save failed");

    let loaded = manager.load().expect("Load failed");
    assert_eq!(loaded.tray.idle_wait_ms, 10);
}

#[test]
fn test_old_config_is_migrated_on_disk() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("tray.toml");
    fs::write(&path, "config_version = 0\n[tray]\napp_name = \"old\"\n").unwrap();

    let manager = ConfigManager::with_path(&path);
    let config = manager.load().expect("Load failed");
    assert_eq!(config.config_version, CONFIG_VERSION);
    assert_eq!(config.tray.app_name, "old");

    let rewritten = fs::read_to_string(&path).unwrap();
    assert!(rewritten.contains(&format!("config_version = {}", CONFIG_VERSION)));
    assert!(rewritten.contains("idle_wait_ms"));
}

#[test]
fn test_current_config_is_not_rewritten() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("tray.toml");
    let original = format!("config_version = {}\n[tray]\napp_name = \"kept\"\n", CONFIG_VERSION);
    fs::write(&path, &original).unwrap();

    let config = ConfigManager::with_path(&path).load().expect("Load failed");
    assert_eq!(config.tray.app_name, "kept");
    assert_eq!(fs::read_to_string(&path).unwrap(), original);
}
