//! Delivery of native events to the backend that owns them
//!
//! `muda` reports menu clicks on one process-wide channel. Each live icon
//! registers its identity with the [`MenuRouter`], which hands every click to
//! the [`Inbox`] of the backend that built the entry, so several controllers
//! can share a process without taking each other's events.

use crate::backend::{Activation, LoopWaker, NotificationHandle};
use crate::tray::menu::ActionId;
use log::debug;
use std::sync::{Arc, Mutex, MutexGuard, OnceLock, PoisonError};

/// Notification action that counts as a click
pub const CLICK_ACTION: &str = "default";

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Activations waiting for one backend's next loop iteration
#[derive(Clone)]
pub struct Inbox {
    pending: Arc<Mutex<Vec<Activation>>>,
    wake: LoopWaker,
}

impl Inbox {
    pub fn new(wake: LoopWaker) -> Self {
        Self {
            pending: Arc::new(Mutex::new(Vec::new())),
            wake,
        }
    }

    /// Queue `activation` and interrupt a blocking iteration; any thread
    pub fn push(&self, activation: Activation) {
        lock(&self.pending).push(activation);
        (self.wake)();
    }

    pub fn take(&self) -> Vec<Activation> {
        std::mem::take(&mut *lock(&self.pending))
    }
}

/// Native id of the entry carrying `action` under `identity`
pub fn menu_id(identity: &str, action: ActionId) -> String {
    format!("{}-{}", identity, action.0)
}

/// Action encoded in `id`, if `identity` built it
pub fn parse_menu_id(identity: &str, id: &str) -> Option<ActionId> {
    id.strip_prefix(identity)?
        .strip_prefix('-')?
        .parse()
        .ok()
        .map(ActionId)
}

/// Click activation for a notification action name
pub fn click_for_action(handle: NotificationHandle, action: &str) -> Option<Activation> {
    (action == CLICK_ACTION).then_some(Activation::NotificationClicked(handle))
}

/// Routes menu ids to the inbox of the icon identity that built them
#[derive(Default)]
pub struct MenuRouter {
    routes: Mutex<Vec<(String, Inbox)>>,
}

impl MenuRouter {
    pub fn register(&self, identity: &str, inbox: Inbox) {
        let mut routes = lock(&self.routes);
        routes.retain(|(known, _)| known != identity);
        routes.push((identity.to_string(), inbox));
    }

    pub fn unregister(&self, identity: &str) {
        lock(&self.routes).retain(|(known, _)| known != identity);
    }

    /// Deliver a clicked menu id to its owner; false when no live icon built it
    pub fn route(&self, id: &str) -> bool {
        let target = lock(&self.routes)
            .iter()
            .find_map(|(identity, inbox)| parse_menu_id(identity, id).map(|action| (action, inbox.clone())));
        match target {
            Some((action, inbox)) => {
                inbox.push(Activation::Menu(action));
                true
            }
            None => {
                debug!("Menu event {} belongs to no live icon", id);
                false
            }
        }
    }
}

/// Router shared by every backend in the process
pub fn menu_router() -> &'static MenuRouter {
    static ROUTER: OnceLock<MenuRouter> = OnceLock::new();
    ROUTER.get_or_init(MenuRouter::default)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::thread;

    fn counting_inbox() -> (Inbox, Arc<AtomicUsize>) {
        let wakes = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&wakes);
        let inbox = Inbox::new(Arc::new(move || {
            counter.fetch_add(1, Ordering::SeqCst);
        }));
        (inbox, wakes)
    }

    #[test]
    fn test_push_from_other_thread_wakes_loop() {
        let (inbox, wakes) = counting_inbox();
        let remote = inbox.clone();
        thread::spawn(move || remote.push(Activation::NotificationClicked(NotificationHandle(3))))
            .join()
            .unwrap();

        assert_eq!(wakes.load(Ordering::SeqCst), 1);
        assert_eq!(inbox.take(), vec![Activation::NotificationClicked(NotificationHandle(3))]);
        assert!(inbox.take().is_empty());
    }

    #[test]
    fn test_menu_id_parses_back_for_its_identity_only() {
        let id = menu_id("trayid12312", ActionId(5));
        assert_eq!(parse_menu_id("trayid12312", &id), Some(ActionId(5)));
        assert_eq!(parse_menu_id("trayid1231", &id), None);
        assert_eq!(parse_menu_id("trayid12312", "trayid12312-x"), None);
    }

    #[test]
    fn test_default_action_is_a_click() {
        let handle = NotificationHandle(9);
        assert_eq!(
            click_for_action(handle, CLICK_ACTION),
            Some(Activation::NotificationClicked(handle))
        );
        assert_eq!(click_for_action(handle, "__closed"), None);
    }

    #[test]
    fn test_router_keeps_instances_apart() {
        let router = MenuRouter::default();
        let (first, _) = counting_inbox();
        let (second, second_wakes) = counting_inbox();
        router.register("trayid1001", first.clone());
        router.register("trayid1002", second.clone());

        assert!(router.route(&menu_id("trayid1002", ActionId(4))));
        assert!(first.take().is_empty());
        assert_eq!(second.take(), vec![Activation::Menu(ActionId(4))]);
        assert_eq!(second_wakes.load(Ordering::SeqCst), 1);

        router.unregister("trayid1002");
        assert!(!router.route(&menu_id("trayid1002", ActionId(5))));
        assert!(router.route(&menu_id("trayid1001", ActionId(1))));
        assert_eq!(first.take(), vec![Activation::Menu(ActionId(1))]);
    }
}
