//! Settings and configuration module

pub mod config;

pub use config::{ConfigManager, TrayConfig};
