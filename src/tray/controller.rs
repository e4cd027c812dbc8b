//! Host-facing tray controller
//!
//! [`TrayController`] is created on, and stays on, the thread that runs the UI
//! loop. Other threads get a [`TrayHandle`] and go through the update
//! handshake in [`crate::tray::scheduler`].

use crate::backend::{Activation, NativeBackend};
use crate::error::Result;
use crate::settings::config::{TrayConfig, TraySection};
use crate::tray::lifecycle::{LifecycleManager, LifecycleState, LifecycleStatus};
use crate::tray::scheduler::{Task, UpdateScheduler};
use crate::tray::TrayState;
use log::{debug, info};
use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::mpsc::Receiver;
use std::sync::Arc;

static NEXT_INSTANCE: AtomicU64 = AtomicU64::new(1);

/// Loop-thread half of a controller: the native resources and the task queue
struct LoopEntry {
    manager: RefCell<LifecycleManager>,
    tasks: Receiver<Task>,
}

impl LoopEntry {
    /// Run every queued task; the manager is borrowed per task only
    fn run_pending(&self) -> usize {
        let mut ran = 0;
        while let Ok(task) = self.tasks.try_recv() {
            task(&mut *self.manager.borrow_mut());
            ran += 1;
        }
        ran
    }
}

thread_local! {
    /// Controllers whose UI loop is this thread, by instance id
    static LOOP_ENTRIES: RefCell<HashMap<u64, Rc<LoopEntry>>> = RefCell::new(HashMap::new());
}

fn loop_entry(instance: u64) -> Option<Rc<LoopEntry>> {
    LOOP_ENTRIES.with(|entries| entries.borrow().get(&instance).cloned())
}

/// State shared by the controller and all of its handles
struct Shared {
    instance: u64,
    status: Arc<LifecycleStatus>,
    scheduler: UpdateScheduler,
}

impl Shared {
    fn update(&self, state: &TrayState) {
        if self.status.get() != LifecycleState::Active {
            debug!("Update ignored, tray is {:?}", self.status.get());
            return;
        }

        self.scheduler.request_update(state, |state| match loop_entry(self.instance) {
            Some(entry) => entry.manager.borrow_mut().apply(state),
            None => debug!("No loop resources for instance {}", self.instance),
        });
    }

    fn exit(&self) {
        if self.scheduler.is_loop_thread() {
            // The loop cannot wait for itself; run what is queued instead
            if let Some(entry) = loop_entry(self.instance) {
                entry.run_pending();
            }
        } else {
            self.scheduler.slot().wait_idle();
        }

        if !self.status.begin_shutdown() {
            debug!("Exit ignored, tray is {:?}", self.status.get());
            return;
        }

        info!("Tray shutdown requested");
        self.scheduler
            .inject(Box::new(|manager: &mut LifecycleManager| manager.teardown()));
    }
}

/// Thread-safe handle for updating or stopping the tray from any thread
#[derive(Clone)]
pub struct TrayHandle {
    shared: Arc<Shared>,
}

impl TrayHandle {
    /// Apply `state`, returning once it is visible natively
    ///
    /// From a thread other than the UI loop this blocks until the loop has
    /// been pumped, so the loop thread must keep calling
    /// [`TrayController::pump`] or drop the controller.
    pub fn update(&self, state: &TrayState) {
        self.shared.update(state);
    }

    /// Begin shutdown; safe to call more than once
    pub fn exit(&self) {
        self.shared.exit();
    }

    pub fn state(&self) -> LifecycleState {
        self.shared.status.get()
    }

    /// Whether an update is queued or being applied right now
    pub fn update_pending(&self) -> bool {
        self.shared.scheduler.slot().is_pending()
    }
}

/// Owner of the tray on the UI-loop thread
pub struct TrayController {
    shared: Arc<Shared>,
    entry: Rc<LoopEntry>,
    settings: TraySection,
}

impl TrayController {
    /// Controller with default settings; the calling thread becomes the UI loop
    pub fn new(backend: Box<dyn NativeBackend>) -> Self {
        Self::with_config(backend, &TrayConfig::default())
    }

    pub fn with_config(backend: Box<dyn NativeBackend>, config: &TrayConfig) -> Self {
        let instance = NEXT_INSTANCE.fetch_add(1, Ordering::SeqCst);
        let status = Arc::new(LifecycleStatus::default());
        let (scheduler, tasks) = UpdateScheduler::new(backend.waker());

        let entry = Rc::new(LoopEntry {
            manager: RefCell::new(LifecycleManager::new(backend, Arc::clone(&status))),
            tasks,
        });
        LOOP_ENTRIES.with(|entries| entries.borrow_mut().insert(instance, Rc::clone(&entry)));

        Self {
            shared: Arc::new(Shared {
                instance,
                status,
                scheduler,
            }),
            entry,
            settings: config.tray.clone(),
        }
    }

    pub fn handle(&self) -> TrayHandle {
        TrayHandle {
            shared: Arc::clone(&self.shared),
        }
    }

    /// Create the native icon and apply `state`
    ///
    /// A teardown still sitting in the queue from an earlier `exit` runs
    /// first, so re-initialising right after `exit` works without pumping.
    pub fn init(&self, state: &TrayState) -> Result<()> {
        self.entry.run_pending();
        self.entry.manager.borrow_mut().init(
            state,
            &self.settings.app_name,
            &self.settings.identity_prefix,
        )?;
        self.shared.status.reset_termination();
        Ok(())
    }

    /// Run one loop iteration; returns true once termination was requested
    pub fn pump(&self, blocking: bool) -> bool {
        let ran = self.entry.run_pending();
        let iteration = self
            .entry
            .manager
            .borrow_mut()
            .run_loop_iteration(blocking && ran == 0);
        self.entry.run_pending();

        for activation in iteration.activations {
            self.dispatch(activation);
        }
        // Callbacks may have queued a teardown via exit
        self.entry.run_pending();

        self.shared.status.termination_requested()
    }

    /// Invoke the callback behind `activation` with no borrow held, so it may
    /// update or exit the tray itself
    fn dispatch(&self, activation: Activation) {
        match activation {
            Activation::Menu(id) => {
                let resolved = self.entry.manager.borrow().resolve_menu(id);
                match resolved {
                    Some((callback, item)) => {
                        debug!("Menu activation {} ({})", id, item.text);
                        callback(&item);
                    }
                    None => debug!("Menu activation {} has no callback", id),
                }
            }
            Activation::NotificationClicked(handle) => {
                let resolved = self.entry.manager.borrow().resolve_notification(handle);
                if let Some(callback) = resolved {
                    debug!("Notification {:?} clicked", handle);
                    callback();
                }
            }
        }
    }

    pub fn update(&self, state: &TrayState) {
        self.shared.update(state);
    }

    /// Open the current menu at the default position; no-op without one
    pub fn show_menu(&self) {
        self.entry.manager.borrow_mut().show_menu();
    }

    pub fn exit(&self) {
        self.shared.exit();
    }

    pub fn state(&self) -> LifecycleState {
        self.shared.status.get()
    }

    /// Native identity of the live icon
    pub fn identity(&self) -> Option<String> {
        self.entry.manager.borrow().identity().map(str::to_string)
    }
}

impl Drop for TrayController {
    fn drop(&mut self) {
        LOOP_ENTRIES.with(|entries| entries.borrow_mut().remove(&self.shared.instance));
        self.entry.run_pending();
        if self.shared.status.get() != LifecycleState::Uninitialized {
            self.entry.manager.borrow_mut().teardown();
        }
    }
}
