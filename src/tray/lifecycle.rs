//! Ordered construction and teardown of native tray resources

use crate::backend::{IconHandle, MenuHandle, NativeBackend, NotificationHandle};
use crate::error::{log_degraded, Result, TrayError};
use crate::tray::menu::{ActionId, ActionRegistry, MenuBuilder};
use crate::tray::model::{MenuCallback, MenuItem, NotificationCallback, TrayState};
use crate::tray::notification::NotificationManager;
use log::{debug, error, info};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

/// Bumped on every init so no two icons ever share an identity
static IDENTITY_SEQ: AtomicU64 = AtomicU64::new(0);

/// Process-and-instance-unique identity for a new native icon
///
/// Only alphanumerics are used because some shells derive a bus object path
/// from the identity and strip everything else.
pub fn native_identity(prefix: &str) -> String {
    let seq = IDENTITY_SEQ.fetch_add(1, Ordering::SeqCst) + 1;
    format!("{}{}{}", prefix, std::process::id(), seq)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LifecycleState {
    #[default]
    Uninitialized,
    Active,
    ShuttingDown,
}

/// Lifecycle state and termination flag, readable from any thread
#[derive(Debug, Default)]
pub struct LifecycleStatus {
    state: Mutex<LifecycleState>,
    terminate: AtomicBool,
}

impl LifecycleStatus {
    pub fn get(&self) -> LifecycleState {
        *self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn set(&self, next: LifecycleState) {
        *self.state.lock().unwrap_or_else(PoisonError::into_inner) = next;
    }

    /// Move `Active` to `ShuttingDown` and request loop termination
    ///
    /// Returns false, changing nothing, from any other state.
    pub fn begin_shutdown(&self) -> bool {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        if *state != LifecycleState::Active {
            return false;
        }
        *state = LifecycleState::ShuttingDown;
        self.terminate.store(true, Ordering::SeqCst);
        true
    }

    pub fn termination_requested(&self) -> bool {
        self.terminate.load(Ordering::SeqCst)
    }

    pub(crate) fn reset_termination(&self) {
        self.terminate.store(false, Ordering::SeqCst);
    }
}

/// Owner of every native handle; lives on the UI-loop thread only
pub struct LifecycleManager {
    backend: Box<dyn NativeBackend>,
    status: Arc<LifecycleStatus>,
    builder: MenuBuilder,
    icon: Option<IconHandle>,
    identity: Option<String>,
    menu: Option<MenuHandle>,
    actions: ActionRegistry,
    notifications: NotificationManager,
}

impl LifecycleManager {
    pub(crate) fn new(backend: Box<dyn NativeBackend>, status: Arc<LifecycleStatus>) -> Self {
        Self {
            backend,
            status,
            builder: MenuBuilder::new(),
            icon: None,
            identity: None,
            menu: None,
            actions: ActionRegistry::default(),
            notifications: NotificationManager::new(),
        }
    }

    pub fn identity(&self) -> Option<&str> {
        self.identity.as_deref()
    }

    /// Bring up the subsystem and icon, then apply `state`
    pub(crate) fn init(&mut self, state: &TrayState, app_name: &str, identity_prefix: &str) -> Result<()> {
        if self.status.get() != LifecycleState::Uninitialized {
            return Err(TrayError::AlreadyActive);
        }

        self.backend.init_subsystem(app_name).map_err(|e| {
            error!("UI subsystem init failed: {}", e);
            e
        })?;

        let identity = native_identity(identity_prefix);
        let icon = match self.backend.create_icon(&identity, &state.icon, &state.tooltip) {
            Ok(icon) => icon,
            Err(e) => {
                error!("Tray icon creation failed for {}: {}", identity, e);
                self.backend.shutdown_subsystem();
                return Err(e);
            }
        };

        for path in &state.preload_icons {
            if let Err(e) = self.backend.preload_icon(path) {
                log_degraded("Icon preload failed", &e);
            }
        }

        info!("Tray icon {} active", identity);
        self.icon = Some(icon);
        self.identity = Some(identity);
        self.status.set(LifecycleState::Active);
        self.apply(state);
        Ok(())
    }

    /// Push `state` to the native objects; a no-op unless active
    pub(crate) fn apply(&mut self, state: &TrayState) {
        let icon = match (self.status.get(), self.icon) {
            (LifecycleState::Active, Some(icon)) => icon,
            (status, _) => {
                debug!("Update ignored, tray is {:?}", status);
                return;
            }
        };

        if let Err(e) = self.backend.set_icon(icon, &state.icon) {
            log_degraded("Icon update skipped", &e);
        }
        if let Err(e) = self.backend.set_tooltip(icon, &state.tooltip) {
            log_degraded("Tooltip update skipped", &e);
        }

        if state.menu.is_empty() {
            if let Some(previous) = self.menu.take() {
                self.backend.release_menu(previous);
            }
            self.actions.clear();
        } else {
            self.install_menu(icon, &state.menu);
        }

        if let Some(notification) = &state.notification {
            self.notifications
                .show_or_log(self.backend.as_mut(), notification, &state.icon);
        }
    }

    /// Swap in a menu built from `items`; the old one is released only after
    /// the new one is attached
    fn install_menu(&mut self, icon: IconHandle, items: &[MenuItem]) {
        let built = self.builder.build(items);
        match self.backend.install_menu(icon, &built.menu) {
            Ok(menu) => {
                let previous = self.menu.replace(menu);
                self.actions = built.actions;
                if let Some(previous) = previous {
                    self.backend.release_menu(previous);
                }
            }
            Err(e) => log_degraded("Menu update skipped", &e),
        }
    }

    /// Release everything in a fixed order and return to `Uninitialized`
    pub(crate) fn teardown(&mut self) {
        info!("Tearing down tray resources");

        self.notifications.close_current(self.backend.as_mut());

        if let Some(menu) = self.menu.take() {
            self.backend.release_menu(menu);
        }
        self.actions.clear();

        if let Some(icon) = self.icon.take() {
            self.backend.deactivate_icon(icon);
            self.backend.destroy_icon(icon);
        }
        self.identity = None;

        self.backend.shutdown_subsystem();
        self.status.set(LifecycleState::Uninitialized);
        info!("Tray torn down");
    }

    pub(crate) fn show_menu(&mut self) {
        let (Some(icon), Some(menu)) = (self.icon, self.menu) else {
            debug!("No menu to show");
            return;
        };
        match self.backend.show_menu(icon, menu) {
            Ok(true) => debug!("Menu shown"),
            Ok(false) => debug!("Backend cannot open the menu programmatically"),
            Err(e) => log_degraded("Showing menu failed", &e),
        }
    }

    pub(crate) fn run_loop_iteration(&mut self, blocking: bool) -> crate::backend::LoopIteration {
        self.backend.run_loop_iteration(blocking)
    }

    pub(crate) fn resolve_menu(&self, id: ActionId) -> Option<(MenuCallback, MenuItem)> {
        self.actions.resolve(id)
    }

    pub(crate) fn resolve_notification(&self, handle: NotificationHandle) -> Option<NotificationCallback> {
        self.notifications.handle_click(handle)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::mock::{MockBackend, NativeCall};
    use crate::tray::model::Notification;

    fn manager() -> (LifecycleManager, crate::backend::mock::MockProbe, Arc<LifecycleStatus>) {
        let (backend, probe) = MockBackend::new();
        let status = Arc::new(LifecycleStatus::default());
        (LifecycleManager::new(Box::new(backend), Arc::clone(&status)), probe, status)
    }

    #[test]
    fn test_identities_are_unique() {
        let a = native_identity("trayid");
        let b = native_identity("trayid");
        assert_ne!(a, b);
        assert!(a.starts_with(&format!("trayid{}", std::process::id())));
        assert!(a.chars().all(|c| c.is_ascii_alphanumeric()));
    }

    #[test]
    fn test_icon_failure_leaves_nothing_live() {
        let (mut manager, probe, status) = manager();
        probe.fail_icon_creation(true);

        let result = manager.init(&TrayState::new("icon", "tip"), "tray-icon", "trayid");
        assert!(matches!(result, Err(TrayError::IconCreation(_))));
        assert_eq!(status.get(), LifecycleState::Uninitialized);
        let snapshot = probe.snapshot();
        assert!(!snapshot.subsystem_up);
        assert!(snapshot.live_icons.is_empty());
    }

    #[test]
    fn test_teardown_order() {
        let (mut manager, probe, status) = manager();
        let state = TrayState::new("icon", "tip")
            .with_menu(vec![MenuItem::new("Hello")])
            .with_notification(Notification::new("Title", "Body"));
        manager.init(&state, "tray-icon", "trayid").unwrap();
        probe.clear_calls();

        assert!(status.begin_shutdown());
        manager.teardown();

        let calls = probe.snapshot().calls;
        let kinds: Vec<&str> = calls.iter().map(NativeCall::kind).collect();
        assert_eq!(
            kinds,
            vec![
                "close_notification",
                "release_menu",
                "deactivate_icon",
                "destroy_icon",
                "shutdown_subsystem"
            ]
        );
        assert_eq!(status.get(), LifecycleState::Uninitialized);
    }

    #[test]
    fn test_apply_while_shutting_down_is_noop() {
        let (mut manager, probe, status) = manager();
        manager.init(&TrayState::new("one", "tip"), "tray-icon", "trayid").unwrap();
        assert!(status.begin_shutdown());
        probe.clear_calls();

        manager.apply(&TrayState::new("two", "tip"));
        assert!(probe.snapshot().calls.is_empty());
    }

    #[test]
    fn test_empty_menu_releases_current() {
        let (mut manager, probe, _status) = manager();
        manager
            .init(&TrayState::new("icon", "tip").with_menu(vec![MenuItem::new("A")]), "tray-icon", "trayid")
            .unwrap();

        manager.apply(&TrayState::new("icon", "tip"));
        let snapshot = probe.snapshot();
        assert!(snapshot.live_menus.is_empty());
        assert_eq!(snapshot.double_releases, 0);

        probe.clear_calls();
        manager.show_menu();
        assert!(probe.snapshot().calls.is_empty());
    }

    #[test]
    fn test_menu_replaced_before_release() {
        let (mut manager, probe, _status) = manager();
        manager
            .init(&TrayState::new("icon", "tip").with_menu(vec![MenuItem::new("A")]), "tray-icon", "trayid")
            .unwrap();
        probe.clear_calls();

        manager.apply(&TrayState::new("icon", "tip").with_menu(vec![MenuItem::new("B")]));
        let kinds: Vec<&str> = probe.snapshot().calls.iter().map(NativeCall::kind).collect();
        let installed = kinds.iter().position(|k| *k == "install_menu").unwrap();
        let released = kinds.iter().position(|k| *k == "release_menu").unwrap();
        assert!(installed < released);
        assert_eq!(probe.snapshot().live_menus.len(), 1);
    }
}
