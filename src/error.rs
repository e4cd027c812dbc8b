use std::fmt;

#[derive(Debug)]
pub enum TrayError {
    SubsystemUnavailable(String),
    IconCreation(String),
    MenuCreation(String),
    NotificationFailed(String),
    AlreadyActive,
    ConfigError(String),
    IoError(std::io::Error),
}

impl fmt::Display for TrayError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TrayError::SubsystemUnavailable(msg) => write!(f, "UI subsystem unavailable: {}", msg),
            TrayError::IconCreation(msg) => write!(f, "Tray icon creation failed: {}", msg),
            TrayError::MenuCreation(msg) => write!(f, "Menu creation failed: {}", msg),
            TrayError::NotificationFailed(msg) => write!(f, "Notification failed: {}", msg),
            TrayError::AlreadyActive => write!(f, "Tray is already active"),
            TrayError::ConfigError(msg) => write!(f, "Configuration error: {}", msg),
            TrayError::IoError(e) => write!(f, "IO error: {}", e),
        }
    }
}

impl std::error::Error for TrayError {}

impl TrayError {
    /// How the host should treat this error
    pub fn severity(&self) -> ErrorSeverity {
        match self {
            TrayError::SubsystemUnavailable(_) | TrayError::IconCreation(_) => ErrorSeverity::Fatal,
            TrayError::MenuCreation(_) | TrayError::NotificationFailed(_) => ErrorSeverity::Recoverable,
            TrayError::AlreadyActive => ErrorSeverity::Minor,
            TrayError::ConfigError(_) | TrayError::IoError(_) => ErrorSeverity::Recoverable,
        }
    }
}

impl From<std::io::Error> for TrayError {
    fn from(err: std::io::Error) -> Self {
        TrayError::IoError(err)
    }
}

impl From<muda::Error> for TrayError {
    fn from(err: muda::Error) -> Self {
        TrayError::MenuCreation(err.to_string())
    }
}

impl From<tray_icon::Error> for TrayError {
    fn from(err: tray_icon::Error) -> Self {
        TrayError::IconCreation(err.to_string())
    }
}

impl From<tray_icon::BadIcon> for TrayError {
    fn from(err: tray_icon::BadIcon) -> Self {
        TrayError::IconCreation(err.to_string())
    }
}

impl From<image::ImageError> for TrayError {
    fn from(err: image::ImageError) -> Self {
        TrayError::IconCreation(format!("Failed to load image: {}", err))
    }
}

impl From<toml::de::Error> for TrayError {
    fn from(err: toml::de::Error) -> Self {
        TrayError::ConfigError(err.to_string())
    }
}

impl From<toml::ser::Error> for TrayError {
    fn from(err: toml::ser::Error) -> Self {
        TrayError::ConfigError(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, TrayError>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorSeverity {
    Fatal,
    Recoverable,
    Minor,
}

/// Log an error raised inside the UI loop where there is no caller to return it to
pub(crate) fn log_degraded(context: &str, err: &TrayError) {
    match err.severity() {
        ErrorSeverity::Fatal => log::error!("{}: {}", context, err),
        ErrorSeverity::Recoverable => log::warn!("{}: {}", context, err),
        ErrorSeverity::Minor => log::debug!("{}: {}", context, err),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_severity_classification() {
        assert_eq!(
            TrayError::SubsystemUnavailable("no display".into()).severity(),
            ErrorSeverity::Fatal
        );
        assert_eq!(
            TrayError::NotificationFailed("dbus".into()).severity(),
            ErrorSeverity::Recoverable
        );
        assert_eq!(TrayError::AlreadyActive.severity(), ErrorSeverity::Minor);
    }

    #[test]
    fn test_display() {
        let err = TrayError::IconCreation("bad rgba".into());
        assert_eq!(err.to_string(), "Tray icon creation failed: bad rgba");
    }
}
