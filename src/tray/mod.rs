//! System tray core: state model, menu building, notifications and the
//! cross-thread update handshake

pub mod controller;
pub mod lifecycle;
pub mod menu;
pub mod model;
pub mod notification;
pub mod scheduler;

pub use controller::{TrayController, TrayHandle};
pub use lifecycle::LifecycleState;
pub use menu::{ActionId, MenuBuilder};
pub use model::{MenuItem, Notification, TrayState};
pub use notification::NotificationManager;
