//! Tray demo
//!
//! Shows a sample menu, toggles a checkbox from its own callback and updates
//! the tooltip from a worker thread until Quit is chosen.

use log::{error, info, warn};
use std::sync::{Arc, Mutex, PoisonError};
use std::thread;
use std::time::Duration;
use tray_controller::logging::{init_logging, LoggingConfig};
use tray_controller::settings::{ConfigManager, TrayConfig};
use tray_controller::{
    LifecycleState, MenuItem, Notification, TrayController, TrayHandle, TrayIconBackend, TrayState,
};

/// Path of the checkbox item in the sample menu
const CHECKBOX_PATH: [usize; 1] = [1];

/// How often the worker refreshes the tooltip
const TICK_INTERVAL: Duration = Duration::from_secs(2);

type SharedState = Arc<Mutex<TrayState>>;

/// Mutate the shared state, then push a copy of it to the tray
fn apply(shared: &SharedState, handle: &TrayHandle, change: impl FnOnce(&mut TrayState)) {
    let snapshot = {
        let mut state = shared.lock().unwrap_or_else(PoisonError::into_inner);
        change(&mut state);
        state.clone()
    };
    handle.update(&snapshot);
}

fn sample_menu(shared: &SharedState, handle: &TrayHandle) -> Vec<MenuItem> {
    let toggle = {
        let shared = Arc::clone(shared);
        let handle = handle.clone();
        move |item: &MenuItem| {
            let checked = !item.checked;
            info!("Checkbox toggled to {}", checked);
            apply(&shared, &handle, |state| {
                if let Some(entry) = state.item_mut(&CHECKBOX_PATH) {
                    entry.checked = checked;
                }
                state.notification = None;
            });
        }
    };

    let hello = {
        let shared = Arc::clone(shared);
        let handle = handle.clone();
        move |_: &MenuItem| {
            info!("Hello clicked");
            apply(&shared, &handle, |state| {
                state.notification = Some(
                    Notification::new("Hello", "Hello from the tray demo")
                        .on_click(|| info!("Notification clicked")),
                );
            });
        }
    };

    let quit = {
        let handle = handle.clone();
        move |_: &MenuItem| {
            info!("Quit selected");
            handle.exit();
        }
    };

    let log_click = |item: &MenuItem| info!("{} clicked", item.text);

    vec![
        MenuItem::new("Hello").with_callback(hello),
        MenuItem::new("Checked").checkbox(true).with_callback(toggle),
        MenuItem::new("Disabled").disabled(),
        MenuItem::separator(),
        MenuItem::new("SubMenu").with_submenu(vec![
            MenuItem::new("THIRD").with_submenu(vec![
                MenuItem::new("7").with_callback(log_click),
                MenuItem::separator(),
                MenuItem::new("8").with_callback(log_click),
            ]),
            MenuItem::new("FOUR").with_submenu(vec![
                MenuItem::new("5").with_callback(log_click),
                MenuItem::new("6").with_callback(log_click),
            ]),
        ]),
        MenuItem::separator(),
        MenuItem::new("Quit").with_callback(quit),
    ]
}

/// Worker that refreshes the tooltip until the tray goes away
fn spawn_ticker(shared: SharedState, handle: TrayHandle) -> std::io::Result<thread::JoinHandle<()>> {
    thread::Builder::new()
        .name("tooltip-ticker".to_string())
        .spawn(move || {
            let mut ticks = 0u64;
            loop {
                thread::sleep(TICK_INTERVAL);
                if handle.state() != LifecycleState::Active {
                    break;
                }
                ticks += 1;
                apply(&shared, &handle, |state| {
                    state.tooltip = format!("Tray demo, tick {}", ticks);
                    state.notification = None;
                });
            }
            info!("Ticker stopped after {} ticks", ticks);
        })
}

fn load_config() -> (TrayConfig, LoggingConfig) {
    let (config, default_log_dir) = match ConfigManager::new() {
        Ok(manager) => {
            let config = manager.load().unwrap_or_else(|e| {
                eprintln!("Failed to load config: {}, using defaults", e);
                TrayConfig::default()
            });
            (config, Some(manager.log_dir()))
        }
        Err(e) => {
            eprintln!("Failed to initialize config manager: {}", e);
            (TrayConfig::default(), None)
        }
    };

    let mut log_config = LoggingConfig::from(&config.logging);
    if config.logging.log_dir.is_none() {
        if let Some(dir) = default_log_dir {
            log_config.log_dir = dir;
        }
    }
    (config, log_config)
}

fn main() {
    let (config, log_config) = load_config();
    if let Err(e) = init_logging(log_config) {
        eprintln!("Failed to initialize logging: {}", e);
    }

    info!("Tray demo starting...");
    info!("Version: {}", env!("CARGO_PKG_VERSION"));

    let backend = TrayIconBackend::with_idle_wait(Duration::from_millis(config.tray.idle_wait_ms));
    let controller = TrayController::with_config(Box::new(backend), &config);
    let handle = controller.handle();

    let shared: SharedState = Arc::new(Mutex::new(TrayState::new("icon.png", "Tray demo")));
    {
        let menu = sample_menu(&shared, &handle);
        let mut state = shared.lock().unwrap_or_else(PoisonError::into_inner);
        state.menu = menu;
    }

    let initial = shared.lock().unwrap_or_else(PoisonError::into_inner).clone();
    if let Err(e) = controller.init(&initial) {
        error!("Failed to start tray: {}", e);
        return;
    }
    info!("Tray running as {}", controller.identity().unwrap_or_default());

    let ticker = spawn_ticker(Arc::clone(&shared), handle)
        .map_err(|e| warn!("Could not start ticker thread: {}", e))
        .ok();

    while !controller.pump(true) {}
    // Dropping the controller releases a ticker update that raced with Quit
    drop(controller);

    if let Some(ticker) = ticker {
        if ticker.join().is_err() {
            warn!("Ticker thread panicked");
        }
    }

    // Menu callbacks hold clones of the shared state; drop the menu to break the cycle
    shared.lock().unwrap_or_else(PoisonError::into_inner).menu.clear();
    info!("Tray demo stopped");
}
