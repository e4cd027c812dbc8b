//! Recording backend for tests
//! Available in tests and with the "test-mocks" feature

use crate::backend::{
    Activation, IconHandle, LoopIteration, LoopWaker, MenuHandle, NativeBackend, NotificationHandle,
};
use crate::error::{Result, TrayError};
use crate::tray::menu::{ActionId, NativeEntry, NativeMenu};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::thread::{self, Thread};
use std::time::Duration;

/// How long a blocking iteration parks when nothing is pending
const IDLE_WAIT: Duration = Duration::from_millis(20);

/// One recorded backend call
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NativeCall {
    InitSubsystem(String),
    ShutdownSubsystem,
    CreateIcon { identity: String, icon: String },
    PreloadIcon(String),
    SetIcon(String),
    SetTooltip(String),
    InstallMenu(MenuHandle),
    ReleaseMenu(MenuHandle),
    ShowMenu(MenuHandle),
    ShowNotification(NotificationHandle),
    CloseNotification(NotificationHandle),
    DeactivateIcon(IconHandle),
    DestroyIcon(IconHandle),
}

impl NativeCall {
    pub fn kind(&self) -> &'static str {
        match self {
            NativeCall::InitSubsystem(_) => "init_subsystem",
            NativeCall::ShutdownSubsystem => "shutdown_subsystem",
            NativeCall::CreateIcon { .. } => "create_icon",
            NativeCall::PreloadIcon(_) => "preload_icon",
            NativeCall::SetIcon(_) => "set_icon",
            NativeCall::SetTooltip(_) => "set_tooltip",
            NativeCall::InstallMenu(_) => "install_menu",
            NativeCall::ReleaseMenu(_) => "release_menu",
            NativeCall::ShowMenu(_) => "show_menu",
            NativeCall::ShowNotification(_) => "show_notification",
            NativeCall::CloseNotification(_) => "close_notification",
            NativeCall::DeactivateIcon(_) => "deactivate_icon",
            NativeCall::DestroyIcon(_) => "destroy_icon",
        }
    }
}

#[derive(Debug, Clone)]
pub struct MockIcon {
    pub identity: String,
    pub icon: String,
    pub tooltip: String,
    pub active: bool,
    pub menu: Option<MenuHandle>,
}

#[derive(Debug, Clone)]
pub struct MockNotification {
    pub title: String,
    pub text: String,
    pub icon: String,
    pub clickable: bool,
}

/// Everything the mock has observed
#[derive(Debug, Clone, Default)]
pub struct MockState {
    pub calls: Vec<NativeCall>,
    pub subsystem_up: bool,
    pub identities: Vec<String>,
    pub live_icons: HashMap<IconHandle, MockIcon>,
    pub live_menus: HashMap<MenuHandle, NativeMenu>,
    pub live_notifications: HashMap<NotificationHandle, MockNotification>,
    pub closed_notifications: Vec<NotificationHandle>,
    /// Releases of handles that were not live
    pub double_releases: usize,
    pub iterations: usize,
    pending: Vec<Activation>,
    fail_subsystem: bool,
    fail_icon: bool,
    next_handle: u64,
}

impl MockState {
    fn handle(&mut self) -> u64 {
        self.next_handle += 1;
        self.next_handle
    }

    /// The single live icon, if exactly one exists
    pub fn icon(&self) -> Option<&MockIcon> {
        match self.live_icons.len() {
            1 => self.live_icons.values().next(),
            _ => None,
        }
    }

    /// Menu currently attached to the live icon
    pub fn installed_menu(&self) -> Option<&NativeMenu> {
        let handle = self.icon()?.menu?;
        self.live_menus.get(&handle)
    }

    pub fn count(&self, kind: &str) -> usize {
        self.calls.iter().filter(|call| call.kind() == kind).count()
    }
}

/// Test-side view of a [`MockBackend`], usable from any thread
#[derive(Clone)]
pub struct MockProbe {
    state: Arc<Mutex<MockState>>,
    loop_thread: Thread,
}

impl MockProbe {
    fn lock(&self) -> MutexGuard<'_, MockState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn snapshot(&self) -> MockState {
        self.lock().clone()
    }

    pub fn clear_calls(&self) {
        self.lock().calls.clear();
    }

    pub fn fail_subsystem(&self, fail: bool) {
        self.lock().fail_subsystem = fail;
    }

    pub fn fail_icon_creation(&self, fail: bool) {
        self.lock().fail_icon = fail;
    }

    /// Action id of the installed entry labelled `label`, searching submenus
    pub fn action_for(&self, label: &str) -> Option<ActionId> {
        fn find(menu: &NativeMenu, label: &str) -> Option<ActionId> {
            menu.entries.iter().find_map(|entry| {
                if entry.label() == Some(label) {
                    entry.action()
                } else {
                    entry.children().and_then(|children| find(children, label))
                }
            })
        }
        let state = self.lock();
        find(state.installed_menu()?, label)
    }

    /// Simulate the user activating a menu entry
    pub fn activate(&self, action: ActionId) {
        self.lock().pending.push(Activation::Menu(action));
        self.loop_thread.unpark();
    }

    /// Simulate the user clicking a notification
    pub fn click_notification(&self, handle: NotificationHandle) {
        self.lock().pending.push(Activation::NotificationClicked(handle));
        self.loop_thread.unpark();
    }
}

/// Backend that records calls instead of drawing anything
pub struct MockBackend {
    state: Arc<Mutex<MockState>>,
    loop_thread: Thread,
}

impl MockBackend {
    /// Create a backend bound to the current thread as its UI loop
    pub fn new() -> (Self, MockProbe) {
        let state = Arc::new(Mutex::new(MockState::default()));
        let loop_thread = thread::current();
        let probe = MockProbe {
            state: Arc::clone(&state),
            loop_thread: loop_thread.clone(),
        };
        (Self { state, loop_thread }, probe)
    }

    fn lock(&self) -> MutexGuard<'_, MockState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl NativeBackend for MockBackend {
    fn init_subsystem(&mut self, app_name: &str) -> Result<()> {
        let mut state = self.lock();
        if state.fail_subsystem {
            return Err(TrayError::SubsystemUnavailable("mock display unavailable".to_string()));
        }
        state.calls.push(NativeCall::InitSubsystem(app_name.to_string()));
        state.subsystem_up = true;
        Ok(())
    }

    fn shutdown_subsystem(&mut self) {
        let mut state = self.lock();
        state.calls.push(NativeCall::ShutdownSubsystem);
        state.subsystem_up = false;
    }

    fn create_icon(&mut self, identity: &str, icon: &str, tooltip: &str) -> Result<IconHandle> {
        let mut state = self.lock();
        if state.fail_icon || state.identities.iter().any(|used| used == identity) {
            return Err(TrayError::IconCreation(format!("identity {} rejected", identity)));
        }
        let handle = IconHandle(state.handle());
        state.calls.push(NativeCall::CreateIcon {
            identity: identity.to_string(),
            icon: icon.to_string(),
        });
        state.identities.push(identity.to_string());
        state.live_icons.insert(
            handle,
            MockIcon {
                identity: identity.to_string(),
                icon: icon.to_string(),
                tooltip: tooltip.to_string(),
                active: true,
                menu: None,
            },
        );
        Ok(handle)
    }

    fn preload_icon(&mut self, icon: &str) -> Result<()> {
        self.lock().calls.push(NativeCall::PreloadIcon(icon.to_string()));
        Ok(())
    }

    fn set_icon(&mut self, handle: IconHandle, icon: &str) -> Result<()> {
        let mut state = self.lock();
        let live = state
            .live_icons
            .get_mut(&handle)
            .ok_or_else(|| TrayError::IconCreation(format!("no icon {:?}", handle)))?;
        live.icon = icon.to_string();
        state.calls.push(NativeCall::SetIcon(icon.to_string()));
        Ok(())
    }

    fn set_tooltip(&mut self, handle: IconHandle, tooltip: &str) -> Result<()> {
        let mut state = self.lock();
        let live = state
            .live_icons
            .get_mut(&handle)
            .ok_or_else(|| TrayError::IconCreation(format!("no icon {:?}", handle)))?;
        live.tooltip = tooltip.to_string();
        state.calls.push(NativeCall::SetTooltip(tooltip.to_string()));
        Ok(())
    }

    fn install_menu(&mut self, icon: IconHandle, menu: &NativeMenu) -> Result<MenuHandle> {
        let mut state = self.lock();
        let handle = MenuHandle(state.handle());
        let live = state
            .live_icons
            .get_mut(&icon)
            .ok_or_else(|| TrayError::MenuCreation(format!("no icon {:?}", icon)))?;
        live.menu = Some(handle);
        state.live_menus.insert(handle, menu.clone());
        state.calls.push(NativeCall::InstallMenu(handle));
        Ok(handle)
    }

    fn release_menu(&mut self, menu: MenuHandle) {
        let mut state = self.lock();
        state.calls.push(NativeCall::ReleaseMenu(menu));
        if state.live_menus.remove(&menu).is_none() {
            state.double_releases += 1;
        }
    }

    fn show_menu(&mut self, _icon: IconHandle, menu: MenuHandle) -> Result<bool> {
        let mut state = self.lock();
        state.calls.push(NativeCall::ShowMenu(menu));
        Ok(state.live_menus.contains_key(&menu))
    }

    fn show_notification(
        &mut self,
        title: &str,
        text: &str,
        icon: &str,
        clickable: bool,
    ) -> Result<NotificationHandle> {
        let mut state = self.lock();
        if !state.subsystem_up {
            return Err(TrayError::NotificationFailed("subsystem down".to_string()));
        }
        let handle = NotificationHandle(state.handle());
        state.live_notifications.insert(
            handle,
            MockNotification {
                title: title.to_string(),
                text: text.to_string(),
                icon: icon.to_string(),
                clickable,
            },
        );
        state.calls.push(NativeCall::ShowNotification(handle));
        Ok(handle)
    }

    fn close_notification(&mut self, handle: NotificationHandle) {
        let mut state = self.lock();
        state.calls.push(NativeCall::CloseNotification(handle));
        if state.live_notifications.remove(&handle).is_some() {
            state.closed_notifications.push(handle);
        } else {
            state.double_releases += 1;
        }
    }

    fn deactivate_icon(&mut self, handle: IconHandle) {
        let mut state = self.lock();
        state.calls.push(NativeCall::DeactivateIcon(handle));
        if let Some(live) = state.live_icons.get_mut(&handle) {
            live.active = false;
        }
    }

    fn destroy_icon(&mut self, handle: IconHandle) {
        let mut state = self.lock();
        state.calls.push(NativeCall::DestroyIcon(handle));
        if state.live_icons.remove(&handle).is_none() {
            state.double_releases += 1;
        }
    }

    fn run_loop_iteration(&mut self, blocking: bool) -> LoopIteration {
        let idle = {
            let mut state = self.lock();
            state.iterations += 1;
            state.pending.is_empty()
        };
        if blocking && idle {
            thread::park_timeout(IDLE_WAIT);
        }

        let activations: Vec<Activation> = std::mem::take(&mut self.lock().pending);
        LoopIteration {
            had_event: !activations.is_empty(),
            activations,
        }
    }

    fn waker(&self) -> LoopWaker {
        let loop_thread = self.loop_thread.clone();
        Arc::new(move || loop_thread.unpark())
    }
}

/// Checked state of the entry labelled `label` in `menu`
pub fn checked_state(menu: &NativeMenu, label: &str) -> Option<bool> {
    menu.entries.iter().find_map(|entry| match entry {
        NativeEntry::Check { label: l, checked, .. } if l == label => Some(*checked),
        other => other.children().and_then(|children| checked_state(children, label)),
    })
}
