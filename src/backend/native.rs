//! Real backend on top of `tray-icon` and `muda`
//!
//! Icons and menus go through `tray-icon`/`muda` on every platform. The loop
//! iteration, the waker and notifications live in a per-platform `platform`
//! module. Menu clicks reach the owning backend through the process-wide
//! [`MenuRouter`](crate::backend::events::MenuRouter).

use crate::backend::events::{menu_id, menu_router, Inbox};
use crate::backend::{
    IconHandle, LoopIteration, LoopWaker, MenuHandle, NativeBackend, NotificationHandle,
};
use crate::error::{Result, TrayError};
use crate::tray::menu::{NativeEntry, NativeMenu};
use image::GenericImageView;
use log::{debug, info, warn};
use muda::{CheckMenuItem, IsMenuItem, Menu, PredefinedMenuItem, Submenu};
use std::collections::HashMap;
use std::sync::Once;
use std::time::Duration;
use tray_icon::{Icon, TrayIcon, TrayIconBuilder};

/// Edge length of the generated fallback icon
const FALLBACK_ICON_SIZE: usize = 32;

struct NativeIcon {
    tray: TrayIcon,
    identity: String,
    attached: Option<MenuHandle>,
}

/// [`NativeBackend`] that draws real tray icons
///
/// Must be created on the thread that will run the UI loop.
pub struct TrayIconBackend {
    app_name: String,
    idle_wait: Duration,
    next_handle: u64,
    icon_cache: HashMap<String, Icon>,
    icons: HashMap<IconHandle, NativeIcon>,
    menus: HashMap<MenuHandle, Menu>,
    inbox: Inbox,
    platform: platform::Platform,
}

impl TrayIconBackend {
    pub fn new() -> Self {
        Self::with_idle_wait(Duration::from_millis(50))
    }

    /// Backend whose blocking iterations wait at most `idle_wait` where the
    /// platform has no native blocking wait
    pub fn with_idle_wait(idle_wait: Duration) -> Self {
        let platform = platform::Platform::new();
        Self {
            app_name: String::new(),
            idle_wait,
            next_handle: 0,
            icon_cache: HashMap::new(),
            icons: HashMap::new(),
            menus: HashMap::new(),
            inbox: Inbox::new(platform.waker()),
            platform,
        }
    }

    fn handle(&mut self) -> u64 {
        self.next_handle += 1;
        self.next_handle
    }

    fn live_icon(&mut self, handle: IconHandle) -> Result<&mut NativeIcon> {
        self.icons
            .get_mut(&handle)
            .ok_or_else(|| TrayError::IconCreation(format!("no live icon {:?}", handle)))
    }

    /// Resolve `name` to an icon, through the cache
    fn resolve_icon(&mut self, name: &str) -> Result<Icon> {
        if let Some(icon) = self.icon_cache.get(name) {
            return Ok(icon.clone());
        }

        let icon = match load_icon_from_file(name) {
            Ok(icon) => {
                debug!("Loaded tray icon from {}", name);
                icon
            }
            Err(e) => {
                warn!("Failed to load icon from {}: {}, using fallback", name, e);
                generate_fallback_icon()?
            }
        };
        self.icon_cache.insert(name.to_string(), icon.clone());
        Ok(icon)
    }

}

impl Default for TrayIconBackend {
    fn default() -> Self {
        Self::new()
    }
}

/// Send `muda` and `tray-icon` events to their handlers instead of the global channels
///
/// Installed once per process. Menu clicks go to the router; icon clicks carry
/// no action and are only logged.
fn install_event_handlers() {
    static INSTALL: Once = Once::new();
    INSTALL.call_once(|| {
        muda::MenuEvent::set_event_handler(Some(|event: muda::MenuEvent| {
            menu_router().route(&event.id.0);
        }));
        tray_icon::TrayIconEvent::set_event_handler(Some(|event: tray_icon::TrayIconEvent| {
            log::trace!("Tray icon event {:?}", event);
        }));
    });
}

fn append_entries(
    identity: &str,
    menu: &NativeMenu,
    append: &mut dyn FnMut(&dyn IsMenuItem) -> muda::Result<()>,
) -> Result<()> {
    for entry in &menu.entries {
        match entry {
            NativeEntry::Separator => append(&PredefinedMenuItem::separator())?,
            NativeEntry::Item {
                label,
                enabled,
                action,
            } => {
                let item = match action {
                    Some(action) => muda::MenuItem::with_id(menu_id(identity, *action), label, *enabled, None),
                    None => muda::MenuItem::new(label, *enabled, None),
                };
                append(&item)?;
            }
            NativeEntry::Check {
                label,
                enabled,
                checked,
                action,
            } => {
                let item = match action {
                    Some(action) => {
                        CheckMenuItem::with_id(menu_id(identity, *action), label, *enabled, *checked, None)
                    }
                    None => CheckMenuItem::new(label, *enabled, *checked, None),
                };
                append(&item)?;
            }
            NativeEntry::Submenu {
                label,
                enabled,
                children,
                ..
            } => {
                let submenu = Submenu::new(label, *enabled);
                append_entries(identity, children, &mut |child: &dyn IsMenuItem| submenu.append(child))?;
                append(&submenu)?;
            }
        }
    }
    Ok(())
}

/// Load an icon image, trying the path as given and then next to the executable
fn load_icon_from_file(path: &str) -> Result<Icon> {
    let img = image::open(path).or_else(|e| {
        let beside_exe = std::env::current_exe()
            .ok()
            .and_then(|exe| exe.parent().map(|dir| dir.join(path)));
        match beside_exe {
            Some(full_path) => image::open(full_path),
            None => Err(e),
        }
    })?;

    let (width, height) = img.dimensions();
    let rgba = img.into_rgba8().into_raw();
    Ok(Icon::from_rgba(rgba, width, height)?)
}

/// Filled grey circle used when an icon cannot be loaded
fn generate_fallback_icon() -> Result<Icon> {
    let size = FALLBACK_ICON_SIZE;
    let mut rgba = vec![0u8; size * size * 4];

    let center = size as f32 / 2.0;
    let radius = size as f32 / 2.0 - 2.0;

    for y in 0..size {
        for x in 0..size {
            let dx = x as f32 - center;
            let dy = y as f32 - center;
            if (dx * dx + dy * dy).sqrt() <= radius {
                let idx = (y * size + x) * 4;
                rgba[idx..idx + 4].copy_from_slice(&[128, 128, 128, 255]);
            }
        }
    }

    Ok(Icon::from_rgba(rgba, size as u32, size as u32)?)
}

impl NativeBackend for TrayIconBackend {
    fn init_subsystem(&mut self, app_name: &str) -> Result<()> {
        self.platform.init(app_name)?;
        install_event_handlers();
        self.app_name = app_name.to_string();
        info!("UI subsystem ready for {}", app_name);
        Ok(())
    }

    fn shutdown_subsystem(&mut self) {
        self.platform.shutdown();
        self.icon_cache.clear();
        debug!("UI subsystem shut down");
    }

    fn create_icon(&mut self, identity: &str, icon: &str, tooltip: &str) -> Result<IconHandle> {
        let image = self.resolve_icon(icon)?;
        let tray = TrayIconBuilder::new()
            .with_id(identity)
            .with_icon(image)
            .with_tooltip(tooltip)
            .build()?;

        let handle = IconHandle(self.handle());
        menu_router().register(identity, self.inbox.clone());
        self.icons.insert(
            handle,
            NativeIcon {
                tray,
                identity: identity.to_string(),
                attached: None,
            },
        );
        info!("Tray icon {} created", identity);
        Ok(handle)
    }

    fn preload_icon(&mut self, icon: &str) -> Result<()> {
        self.resolve_icon(icon).map(|_| ())
    }

    fn set_icon(&mut self, handle: IconHandle, icon: &str) -> Result<()> {
        let image = self.resolve_icon(icon)?;
        self.live_icon(handle)?.tray.set_icon(Some(image))?;
        Ok(())
    }

    fn set_tooltip(&mut self, handle: IconHandle, tooltip: &str) -> Result<()> {
        self.live_icon(handle)?.tray.set_tooltip(Some(tooltip))?;
        Ok(())
    }

    fn install_menu(&mut self, icon: IconHandle, menu: &NativeMenu) -> Result<MenuHandle> {
        let identity = self.live_icon(icon)?.identity.clone();
        let native = Menu::new();
        append_entries(&identity, menu, &mut |item: &dyn IsMenuItem| native.append(item))?;

        let handle = MenuHandle(self.handle());
        let live = self.live_icon(icon)?;
        live.tray.set_menu(Some(Box::new(native.clone())));
        live.attached = Some(handle);
        self.menus.insert(handle, native);
        debug!("Installed menu {:?} on {}", handle, identity);
        Ok(handle)
    }

    fn release_menu(&mut self, menu: MenuHandle) {
        if self.menus.remove(&menu).is_none() {
            debug!("Menu {:?} already released", menu);
            return;
        }
        for icon in self.icons.values_mut() {
            if icon.attached == Some(menu) {
                icon.tray.set_menu(None);
                icon.attached = None;
            }
        }
    }

    fn show_menu(&mut self, icon: IconHandle, menu: MenuHandle) -> Result<bool> {
        self.live_icon(icon)?;
        match self.menus.get(&menu) {
            Some(native) => Ok(platform::popup_menu(native)),
            None => Ok(false),
        }
    }

    fn show_notification(
        &mut self,
        title: &str,
        text: &str,
        icon: &str,
        clickable: bool,
    ) -> Result<NotificationHandle> {
        let handle = NotificationHandle(self.handle());
        let clicks = clickable.then(|| self.inbox.clone());
        self.platform
            .show_notification(handle, &self.app_name, title, text, icon, clicks)?;
        Ok(handle)
    }

    fn close_notification(&mut self, handle: NotificationHandle) {
        self.platform.close_notification(handle);
    }

    fn deactivate_icon(&mut self, handle: IconHandle) {
        if let Some(icon) = self.icons.get_mut(&handle) {
            if let Err(e) = icon.tray.set_visible(false) {
                warn!("Failed to hide tray icon {}: {}", icon.identity, e);
            }
        }
    }

    fn destroy_icon(&mut self, handle: IconHandle) {
        match self.icons.remove(&handle) {
            Some(icon) => {
                menu_router().unregister(&icon.identity);
                info!("Tray icon {} destroyed", icon.identity);
            }
            None => debug!("Tray icon {:?} already destroyed", handle),
        }
    }

    fn run_loop_iteration(&mut self, blocking: bool) -> LoopIteration {
        let had_event = self.platform.iterate(blocking, self.idle_wait);

        let activations = self.inbox.take();
        LoopIteration {
            had_event: had_event || !activations.is_empty(),
            activations,
        }
    }

    fn waker(&self) -> LoopWaker {
        self.platform.waker()
    }
}

#[cfg(target_os = "linux")]
mod platform {
    use super::*;
    use crate::backend::events::{click_for_action, CLICK_ACTION};
    use gtk::prelude::*;
    use std::sync::Arc;
    use std::thread;

    enum LiveNotification {
        Plain(notify_rust::NotificationHandle),
        /// A helper thread owns the handle while it waits for the click
        Watched {
            id: u32,
            notification: notify_rust::Notification,
        },
    }

    impl LiveNotification {
        fn close(self) {
            match self {
                LiveNotification::Plain(handle) => handle.close(),
                LiveNotification::Watched { id, mut notification } => {
                    // Showing again under the same id yields a handle that can close it
                    match notification.id(id).show() {
                        Ok(handle) => handle.close(),
                        Err(e) => debug!("Notification {} already gone: {}", id, e),
                    }
                }
            }
        }
    }

    pub struct Platform {
        initialized: bool,
        notifications: HashMap<NotificationHandle, LiveNotification>,
    }

    impl Platform {
        pub fn new() -> Self {
            Self {
                initialized: false,
                notifications: HashMap::new(),
            }
        }

        pub fn init(&mut self, _app_name: &str) -> Result<()> {
            if !self.initialized {
                gtk::init().map_err(|e| TrayError::SubsystemUnavailable(e.to_string()))?;
                self.initialized = true;
            }
            Ok(())
        }

        /// GTK cannot be de-initialized; only the notifications go away
        pub fn shutdown(&mut self) {
            for (_, notification) in self.notifications.drain() {
                notification.close();
            }
        }

        pub fn iterate(&mut self, blocking: bool, _idle_wait: Duration) -> bool {
            gtk::main_iteration_do(blocking)
        }

        pub fn waker(&self) -> LoopWaker {
            Arc::new(|| gtk::glib::MainContext::default().wakeup())
        }

        pub fn show_notification(
            &mut self,
            handle: NotificationHandle,
            app_name: &str,
            title: &str,
            text: &str,
            icon: &str,
            clicks: Option<Inbox>,
        ) -> Result<()> {
            let mut notification = notify_rust::Notification::new();
            notification.appname(app_name).summary(title).body(text).icon(icon);
            if clicks.is_some() {
                notification.action(CLICK_ACTION, "Default");
            }
            let shown = notification
                .show()
                .map_err(|e| TrayError::NotificationFailed(e.to_string()))?;
            info!("Notification shown: {} - {}", title, text);

            let live = match clicks {
                Some(inbox) => {
                    let id = shown.id();
                    thread::Builder::new()
                        .name("notification-actions".to_string())
                        .spawn(move || {
                            // Returns on the click or when the notification closes
                            shown.wait_for_action(|action| {
                                if let Some(click) = click_for_action(handle, action) {
                                    inbox.push(click);
                                }
                            });
                        })?;
                    LiveNotification::Watched { id, notification }
                }
                None => LiveNotification::Plain(shown),
            };
            self.notifications.insert(handle, live);
            Ok(())
        }

        pub fn close_notification(&mut self, handle: NotificationHandle) {
            if let Some(notification) = self.notifications.remove(&handle) {
                notification.close();
            }
        }
    }

    pub fn popup_menu(menu: &Menu) -> bool {
        use muda::ContextMenu;
        menu.gtk_context_menu().popup_at_pointer(None);
        true
    }
}

#[cfg(windows)]
mod platform {
    use super::*;
    use crate::backend::Activation;
    use std::sync::Arc;
    use windows::core::{IInspectable, HSTRING};
    use windows::Data::Xml::Dom::XmlDocument;
    use windows::Foundation::TypedEventHandler;
    use windows::UI::Notifications::{ToastNotification, ToastNotificationManager, ToastNotifier};
    use windows::Win32::Foundation::{HWND, LPARAM, WPARAM};
    use windows::Win32::System::Threading::GetCurrentThreadId;
    use windows::Win32::UI::WindowsAndMessaging::{
        DispatchMessageW, GetMessageW, PeekMessageW, PostThreadMessageW, TranslateMessage, MSG,
        PM_REMOVE, WM_NULL,
    };

    pub struct Platform {
        thread_id: u32,
        notifier: Option<ToastNotifier>,
        toasts: HashMap<NotificationHandle, ToastNotification>,
    }

    impl Platform {
        pub fn new() -> Self {
            Self {
                thread_id: unsafe { GetCurrentThreadId() },
                notifier: None,
                toasts: HashMap::new(),
            }
        }

        /// Toasts are optional; without a registered app id the tray still works
        pub fn init(&mut self, app_name: &str) -> Result<()> {
            match ToastNotificationManager::CreateToastNotifierWithId(&HSTRING::from(app_name)) {
                Ok(notifier) => self.notifier = Some(notifier),
                Err(e) => warn!("Toast notifier unavailable for {}: {}", app_name, e),
            }
            Ok(())
        }

        pub fn shutdown(&mut self) {
            let handles: Vec<NotificationHandle> = self.toasts.keys().copied().collect();
            for handle in handles {
                self.close_notification(handle);
            }
            self.notifier = None;
        }

        pub fn iterate(&mut self, blocking: bool, _idle_wait: Duration) -> bool {
            let mut msg = MSG::default();
            let mut had_event = false;
            unsafe {
                if blocking && !PeekMessageW(&mut msg, HWND::default(), 0, 0, PM_REMOVE).as_bool() {
                    if GetMessageW(&mut msg, HWND::default(), 0, 0).0 <= 0 {
                        return false;
                    }
                    let _ = TranslateMessage(&msg);
                    let _ = DispatchMessageW(&msg);
                    had_event = true;
                } else if msg.message != 0 {
                    let _ = TranslateMessage(&msg);
                    let _ = DispatchMessageW(&msg);
                    had_event = true;
                }
                while PeekMessageW(&mut msg, HWND::default(), 0, 0, PM_REMOVE).as_bool() {
                    let _ = TranslateMessage(&msg);
                    let _ = DispatchMessageW(&msg);
                    had_event = true;
                }
            }
            had_event
        }

        pub fn waker(&self) -> LoopWaker {
            let thread_id = self.thread_id;
            Arc::new(move || unsafe {
                let _ = PostThreadMessageW(thread_id, WM_NULL, WPARAM(0), LPARAM(0));
            })
        }

        pub fn show_notification(
            &mut self,
            handle: NotificationHandle,
            _app_name: &str,
            title: &str,
            text: &str,
            icon: &str,
            clicks: Option<Inbox>,
        ) -> Result<()> {
            let notifier = self
                .notifier
                .as_ref()
                .ok_or_else(|| TrayError::NotificationFailed("no toast notifier".to_string()))?;

            let toast_xml = format!(
                r#"<toast>
                <visual>
                    <binding template="ToastGeneric">
                        <image placement="appLogoOverride" src="{}"/>
                        <text>{}</text>
                        <text>{}</text>
                    </binding>
                </visual>
                <audio silent="true"/>
            </toast>"#,
                escape_xml(icon),
                escape_xml(title),
                escape_xml(text)
            );

            let failed = |e: windows::core::Error| TrayError::NotificationFailed(e.to_string());
            let xml_doc = XmlDocument::new().map_err(failed)?;
            xml_doc.LoadXml(&HSTRING::from(&toast_xml)).map_err(failed)?;
            let toast = ToastNotification::CreateToastNotification(&xml_doc).map_err(failed)?;

            if let Some(inbox) = clicks {
                toast
                    .Activated(&TypedEventHandler::<ToastNotification, IInspectable>::new(
                        move |_, _| {
                            inbox.push(Activation::NotificationClicked(handle));
                            Ok(())
                        },
                    ))
                    .map_err(failed)?;
            }

            notifier.Show(&toast).map_err(failed)?;
            info!("Toast notification shown: {} - {}", title, text);
            self.toasts.insert(handle, toast);
            Ok(())
        }

        pub fn close_notification(&mut self, handle: NotificationHandle) {
            let (Some(toast), Some(notifier)) = (self.toasts.remove(&handle), self.notifier.as_ref()) else {
                return;
            };
            if let Err(e) = notifier.Hide(&toast) {
                debug!("Toast {:?} already gone: {}", handle, e);
            }
        }
    }

    /// Programmatic popup needs the icon's window, which tray-icon keeps private
    pub fn popup_menu(_menu: &Menu) -> bool {
        false
    }

    /// Escape special XML characters
    pub(super) fn escape_xml(s: &str) -> String {
        s.replace('&', "&amp;")
            .replace('<', "&lt;")
            .replace('>', "&gt;")
            .replace('"', "&quot;")
            .replace('\'', "&apos;")
    }

    #[cfg(test)]
    mod tests {
        use super::*;

        #[test]
        fn test_escape_xml() {
            assert_eq!(escape_xml("<a & 'b'>"), "&lt;a &amp; &apos;b&apos;&gt;");
            assert_eq!(escape_xml("plain"), "plain");
        }
    }
}

#[cfg(not(any(target_os = "linux", windows)))]
mod platform {
    use super::*;
    use std::sync::Arc;
    use std::thread::{self, Thread};

    pub struct Platform {
        loop_thread: Thread,
    }

    impl Platform {
        pub fn new() -> Self {
            Self {
                loop_thread: thread::current(),
            }
        }

        pub fn init(&mut self, _app_name: &str) -> Result<()> {
            Ok(())
        }

        pub fn shutdown(&mut self) {}

        pub fn iterate(&mut self, blocking: bool, idle_wait: Duration) -> bool {
            if blocking {
                thread::park_timeout(idle_wait);
            }
            false
        }

        pub fn waker(&self) -> LoopWaker {
            let loop_thread = self.loop_thread.clone();
            Arc::new(move || loop_thread.unpark())
        }

        pub fn show_notification(
            &mut self,
            _handle: NotificationHandle,
            _app_name: &str,
            title: &str,
            text: &str,
            _icon: &str,
            _clicks: Option<Inbox>,
        ) -> Result<()> {
            info!("Notification: {} - {}", title, text);
            Ok(())
        }

        pub fn close_notification(&mut self, _handle: NotificationHandle) {}
    }

    pub fn popup_menu(_menu: &Menu) -> bool {
        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_menu_id_format() {
        assert_eq!(menu_id("trayid42", crate::tray::menu::ActionId(7)), "trayid42-7");
    }

    #[test]
    fn test_fallback_icon_builds() {
        assert!(generate_fallback_icon().is_ok());
    }

    #[test]
    fn test_missing_icon_file_is_an_error() {
        assert!(load_icon_from_file("definitely/not/here.png").is_err());
    }
}
