//! Cross-thread update handshake
//!
//! Native tray objects may only be touched on the UI-loop thread. Any other
//! thread that wants to change them claims the single pending slot, injects a
//! task into the loop's queue and blocks on that task's [`Completion`] until the
//! loop has run it. Updates are therefore applied one at a time, in the order
//! their callers claimed the slot, and each caller returns only after its
//! state is visible natively.

use crate::backend::LoopWaker;
use crate::tray::lifecycle::LifecycleManager;
use crate::tray::model::TrayState;
use log::debug;
use std::sync::mpsc::{self, Receiver, Sender};
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};
use std::thread::{self, ThreadId};

/// Unit of work executed on the UI-loop thread
pub(crate) type Task = Box<dyn FnOnce(&mut LifecycleManager) + Send>;

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// At-most-one queued update
#[derive(Default)]
pub struct PendingSlot {
    pending: Mutex<bool>,
    changed: Condvar,
}

impl PendingSlot {
    pub fn new() -> Self {
        Self::default()
    }

    /// Wait for the slot to be free, then take it
    pub fn acquire(&self) {
        let mut pending = lock(&self.pending);
        while *pending {
            pending = self.changed.wait(pending).unwrap_or_else(PoisonError::into_inner);
        }
        *pending = true;
    }

    pub fn release(&self) {
        *lock(&self.pending) = false;
        self.changed.notify_all();
    }

    /// Block until no update is queued or applying
    pub fn wait_idle(&self) {
        let mut pending = lock(&self.pending);
        while *pending {
            pending = self.changed.wait(pending).unwrap_or_else(PoisonError::into_inner);
        }
    }

    pub fn is_pending(&self) -> bool {
        *lock(&self.pending)
    }
}

#[derive(Default)]
struct CompletionState {
    done: Mutex<bool>,
    signal: Condvar,
}

/// Waiting half of a one-shot completion
pub struct Completion {
    state: Arc<CompletionState>,
}

impl Completion {
    /// Block until the paired [`Completer`] has completed or been dropped
    pub fn wait(self) {
        let mut done = lock(&self.state.done);
        while !*done {
            done = self.state.signal.wait(done).unwrap_or_else(PoisonError::into_inner);
        }
    }

    pub fn is_complete(&self) -> bool {
        *lock(&self.state.done)
    }
}

/// Signalling half of a one-shot completion
///
/// Completes on drop, so a task discarded without running still releases its
/// waiter and the pending slot.
pub struct Completer {
    state: Arc<CompletionState>,
    slot: Option<Arc<PendingSlot>>,
}

impl Completer {
    pub fn complete(self) {}
}

impl Drop for Completer {
    fn drop(&mut self) {
        *lock(&self.state.done) = true;
        self.state.signal.notify_all();
        if let Some(slot) = self.slot.take() {
            slot.release();
        }
    }
}

/// Create a linked completer/waiter pair, optionally releasing `slot` on completion
pub fn completion_pair(slot: Option<Arc<PendingSlot>>) -> (Completer, Completion) {
    let state = Arc::new(CompletionState::default());
    (
        Completer {
            state: Arc::clone(&state),
            slot,
        },
        Completion { state },
    )
}

/// Serializes tray updates onto the UI-loop thread
pub(crate) struct UpdateScheduler {
    loop_thread: ThreadId,
    slot: Arc<PendingSlot>,
    tasks: Mutex<Sender<Task>>,
    waker: LoopWaker,
}

impl UpdateScheduler {
    /// Scheduler bound to the calling thread as the UI loop
    pub fn new(waker: LoopWaker) -> (Self, Receiver<Task>) {
        let (tx, rx) = mpsc::channel();
        let scheduler = Self {
            loop_thread: thread::current().id(),
            slot: Arc::new(PendingSlot::new()),
            tasks: Mutex::new(tx),
            waker,
        };
        (scheduler, rx)
    }

    pub fn is_loop_thread(&self) -> bool {
        thread::current().id() == self.loop_thread
    }

    pub fn slot(&self) -> &PendingSlot {
        &self.slot
    }

    /// Queue `task` for the loop and wake it; false if the loop is gone
    pub fn inject(&self, task: Task) -> bool {
        let sent = lock(&self.tasks).send(task).is_ok();
        if sent {
            (self.waker)();
        } else {
            debug!("UI loop gone, task dropped");
        }
        sent
    }

    /// Apply `state` on the loop thread and return once it has been applied
    ///
    /// On the loop thread itself `apply_inline` runs immediately; waiting there
    /// would block the only thread able to run the task.
    pub fn request_update(&self, state: &TrayState, apply_inline: impl FnOnce(&TrayState)) {
        if self.is_loop_thread() {
            debug!("Applying update inline on the UI loop thread");
            apply_inline(state);
            return;
        }

        let snapshot = state.clone();
        self.submit_and_wait(Box::new(move |manager: &mut LifecycleManager| {
            manager.apply(&snapshot)
        }));
    }

    /// Claim the slot, inject `work` and block until it has run
    pub fn submit_and_wait(&self, work: Task) {
        self.slot.acquire();
        debug!("Pending slot claimed, injecting update");

        let (completer, completion) = completion_pair(Some(Arc::clone(&self.slot)));
        let task: Task = Box::new(move |manager: &mut LifecycleManager| {
            work(manager);
            completer.complete();
        });
        self.inject(task);

        completion.wait();
        debug!("Update applied, caller released");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    #[test]
    fn test_slot_serializes_holders() {
        let slot = Arc::new(PendingSlot::new());
        let inside = Arc::new(AtomicUsize::new(0));
        let max_inside = Arc::new(AtomicUsize::new(0));

        let workers: Vec<_> = (0..4)
            .map(|_| {
                let slot = Arc::clone(&slot);
                let inside = Arc::clone(&inside);
                let max_inside = Arc::clone(&max_inside);
                thread::spawn(move || {
                    for _ in 0..20 {
                        slot.acquire();
                        let now = inside.fetch_add(1, Ordering::SeqCst) + 1;
                        max_inside.fetch_max(now, Ordering::SeqCst);
                        thread::yield_now();
                        inside.fetch_sub(1, Ordering::SeqCst);
                        slot.release();
                    }
                })
            })
            .collect();

        for worker in workers {
            worker.join().unwrap();
        }
        assert_eq!(max_inside.load(Ordering::SeqCst), 1);
        assert!(!slot.is_pending());
    }

    #[test]
    fn test_dropped_completer_releases_waiter_and_slot() {
        let slot = Arc::new(PendingSlot::new());
        slot.acquire();
        let (completer, completion) = completion_pair(Some(Arc::clone(&slot)));

        let dropper = thread::spawn(move || {
            thread::sleep(Duration::from_millis(20));
            drop(completer);
        });

        completion.wait();
        dropper.join().unwrap();
        assert!(!slot.is_pending());
    }

    #[test]
    fn test_completion_reports_state() {
        let (completer, completion) = completion_pair(None);
        assert!(!completion.is_complete());
        completer.complete();
        assert!(completion.is_complete());
        completion.wait();
    }

    #[test]
    fn test_inject_after_loop_gone_does_not_hang() {
        let (scheduler, rx) = UpdateScheduler::new(Arc::new(|| {}));
        drop(rx);

        let scheduler = Arc::new(scheduler);
        let remote = Arc::clone(&scheduler);
        thread::spawn(move || remote.submit_and_wait(Box::new(|_| {})))
            .join()
            .unwrap();
        assert!(!scheduler.slot().is_pending());
    }
}
