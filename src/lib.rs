//! Cross-platform system tray controller
//!
//! A host describes its tray as a [`TrayState`] (icon, tooltip, menu tree and an
//! optional notification) and hands it to a [`TrayController`] living on the
//! UI-loop thread. Worker threads change the tray through a [`TrayHandle`];
//! each update blocks until the loop has applied it natively.

pub mod backend;
pub mod error;
pub mod logging;
pub mod settings;
pub mod tray;

pub use backend::{NativeBackend, TrayIconBackend};
pub use error::{ErrorSeverity, Result, TrayError};
pub use tray::{LifecycleState, MenuItem, Notification, TrayController, TrayHandle, TrayState};
