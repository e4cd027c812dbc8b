//! Native UI backend abstraction
//!
//! The controller only ever talks to the platform through [`NativeBackend`].
//! Every method is called on the UI-loop thread, except the closure returned by
//! [`NativeBackend::waker`], which any thread may call.

pub mod events;
pub mod native;

#[cfg(any(test, feature = "test-mocks"))]
pub mod mock;

use crate::error::Result;
use crate::tray::menu::{ActionId, NativeMenu};
use std::sync::Arc;

pub use native::TrayIconBackend;

/// Handle to a live native tray icon
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct IconHandle(pub u64);

/// Handle to an installed native menu
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct MenuHandle(pub u64);

/// Handle to a displayed notification
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct NotificationHandle(pub u64);

/// Interrupts a blocking loop iteration from another thread
pub type LoopWaker = Arc<dyn Fn() + Send + Sync>;

/// User interaction reported by one loop iteration
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Activation {
    /// A menu entry carrying this action was activated
    Menu(ActionId),
    /// The default action of a notification was clicked
    NotificationClicked(NotificationHandle),
}

/// Outcome of one native loop iteration
#[derive(Debug, Default)]
pub struct LoopIteration {
    pub had_event: bool,
    pub activations: Vec<Activation>,
}

/// Platform operations the tray core depends on
pub trait NativeBackend {
    /// Bring up the toolkit and the notification subsystem
    fn init_subsystem(&mut self, app_name: &str) -> Result<()>;

    /// Undo [`NativeBackend::init_subsystem`]
    fn shutdown_subsystem(&mut self);

    /// Register a new tray icon under `identity`
    fn create_icon(&mut self, identity: &str, icon: &str, tooltip: &str) -> Result<IconHandle>;

    /// Resolve an icon ahead of time so later switches are cheap
    fn preload_icon(&mut self, icon: &str) -> Result<()>;

    fn set_icon(&mut self, handle: IconHandle, icon: &str) -> Result<()>;

    fn set_tooltip(&mut self, handle: IconHandle, tooltip: &str) -> Result<()>;

    /// Build native widgets for `menu` and attach them to the icon
    fn install_menu(&mut self, icon: IconHandle, menu: &NativeMenu) -> Result<MenuHandle>;

    fn release_menu(&mut self, menu: MenuHandle);

    /// Pop up the menu at the default position, returning false when unsupported
    fn show_menu(&mut self, icon: IconHandle, menu: MenuHandle) -> Result<bool>;

    fn show_notification(
        &mut self,
        title: &str,
        text: &str,
        icon: &str,
        clickable: bool,
    ) -> Result<NotificationHandle>;

    fn close_notification(&mut self, handle: NotificationHandle);

    /// Hide the icon from the shell before it is destroyed
    fn deactivate_icon(&mut self, handle: IconHandle);

    fn destroy_icon(&mut self, handle: IconHandle);

    /// Run one iteration of the native loop
    fn run_loop_iteration(&mut self, blocking: bool) -> LoopIteration;

    fn waker(&self) -> LoopWaker;
}
