//! Single-slot notification handling

use crate::backend::{NativeBackend, NotificationHandle};
use crate::error::{log_degraded, Result};
use crate::tray::model::{Notification, NotificationCallback};
use log::{debug, info};

struct LiveNotification {
    handle: NotificationHandle,
    on_click: Option<NotificationCallback>,
}

/// Keeps at most one notification alive under the tray's identity
#[derive(Default)]
pub struct NotificationManager {
    current: Option<LiveNotification>,
}

impl NotificationManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the current notification with `notification`
    ///
    /// Returns `Ok(None)` without touching the live notification when the
    /// text is empty.
    pub fn show(
        &mut self,
        backend: &mut dyn NativeBackend,
        notification: &Notification,
        fallback_icon: &str,
    ) -> Result<Option<NotificationHandle>> {
        if notification.text.is_empty() {
            debug!("Notification text empty, nothing to show");
            return Ok(None);
        }

        // The old one must be gone before the new one exists
        self.close_current(backend);

        let icon = notification
            .icon
            .as_deref()
            .filter(|icon| !icon.is_empty())
            .unwrap_or(fallback_icon);

        let handle = backend.show_notification(
            &notification.title,
            &notification.text,
            icon,
            notification.on_click.is_some(),
        )?;

        info!("Notification shown: {} - {}", notification.title, notification.text);
        self.current = Some(LiveNotification {
            handle,
            on_click: notification.on_click.clone(),
        });
        Ok(Some(handle))
    }

    /// Close and release the live notification, if any
    pub fn close_current(&mut self, backend: &mut dyn NativeBackend) {
        if let Some(live) = self.current.take() {
            debug!("Closing notification {:?}", live.handle);
            backend.close_notification(live.handle);
        }
    }

    /// Callback for a click on `handle`, if it is still the live notification
    pub fn handle_click(&self, handle: NotificationHandle) -> Option<NotificationCallback> {
        match &self.current {
            Some(live) if live.handle == handle => live.on_click.clone(),
            _ => {
                debug!("Ignoring click on stale notification {:?}", handle);
                None
            }
        }
    }

    pub fn current(&self) -> Option<NotificationHandle> {
        self.current.as_ref().map(|live| live.handle)
    }

    /// Show `notification`, logging instead of failing
    pub(crate) fn show_or_log(
        &mut self,
        backend: &mut dyn NativeBackend,
        notification: &Notification,
        fallback_icon: &str,
    ) {
        if let Err(e) = self.show(backend, notification, fallback_icon) {
            log_degraded("Notification update skipped", &e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::mock::{MockBackend, MockProbe};

    fn backend() -> (MockBackend, MockProbe) {
        let (mut backend, probe) = MockBackend::new();
        backend.init_subsystem("test").unwrap();
        (backend, probe)
    }

    #[test]
    fn test_replacement_leaves_one_live() {
        let (mut backend, probe) = backend();
        let mut manager = NotificationManager::new();

        let first = manager
            .show(&mut backend, &Notification::new("One", "first"), "icon")
            .unwrap()
            .unwrap();
        let second = manager
            .show(&mut backend, &Notification::new("Two", "second"), "icon")
            .unwrap()
            .unwrap();

        assert_ne!(first, second);
        let snapshot = probe.snapshot();
        assert_eq!(snapshot.live_notifications.len(), 1);
        assert!(snapshot.live_notifications.contains_key(&second));
        assert_eq!(snapshot.closed_notifications, vec![first]);
    }

    #[test]
    fn test_empty_text_is_noop() {
        let (mut backend, probe) = backend();
        let mut manager = NotificationManager::new();
        manager
            .show(&mut backend, &Notification::new("Shown", "text"), "icon")
            .unwrap();

        let result = manager
            .show(&mut backend, &Notification::new("Title only", ""), "icon")
            .unwrap();
        assert!(result.is_none());
        assert_eq!(probe.snapshot().live_notifications.len(), 1);
    }

    #[test]
    fn test_icon_falls_back_to_tray_icon() {
        let (mut backend, probe) = backend();
        let mut manager = NotificationManager::new();
        let handle = manager
            .show(&mut backend, &Notification::new("T", "body"), "tray-icon-name")
            .unwrap()
            .unwrap();
        assert_eq!(probe.snapshot().live_notifications[&handle].icon, "tray-icon-name");
    }

    #[test]
    fn test_click_only_for_live_handle() {
        let (mut backend, _probe) = backend();
        let mut manager = NotificationManager::new();
        let first = manager
            .show(&mut backend, &Notification::new("A", "a").on_click(|| {}), "icon")
            .unwrap()
            .unwrap();
        let second = manager
            .show(&mut backend, &Notification::new("B", "b").on_click(|| {}), "icon")
            .unwrap()
            .unwrap();

        assert!(manager.handle_click(first).is_none());
        assert!(manager.handle_click(second).is_some());

        manager.close_current(&mut backend);
        manager.close_current(&mut backend);
        assert!(manager.current().is_none());
    }
}
