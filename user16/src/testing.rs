//! Test fixtures: systems over in-memory windows and timers, a standard
//! message pump, and a window procedure that records what it receives.

use std::sync::{Arc, Weak};

use parking_lot::Mutex;

use crate::env::Env;
use crate::message::{Message, MessageRange, WindowFilter};
use crate::timer::TimerTable;
use crate::window::WindowTable;
use crate::{System, SystemConfig, TaskId, HWND};

pub(crate) type Fixture = (System, Arc<WindowTable>, Arc<TimerTable>);

/// System on the real clock
pub(crate) fn system() -> Fixture {
    system_with(SystemConfig::default())
}

/// System whose clock only moves through `advance_clock`
pub(crate) fn manual_system() -> Fixture {
    system_with(SystemConfig::manual())
}

pub(crate) fn system_with(config: SystemConfig) -> Fixture {
    let windows = Arc::new(WindowTable::new());
    let timers = Arc::new(TimerTable::new());
    let env = Env::new(windows.clone(), timers.clone());
    let sys = System::new(config, env).expect("valid test config");
    (sys, windows, timers)
}

/// Spawn a task running the usual get/translate/dispatch loop
pub(crate) fn spawn_pump(sys: &System, name: &str) -> TaskId {
    sys.spawn(name, |task| {
        loop {
            let msg = task.get_message(WindowFilter::All, MessageRange::ALL);
            if msg.is_quit() {
                break;
            }
            task.translate_message(&msg);
            task.dispatch_message(&msg);
        }
        0
    })
    .expect("spawn pump task")
}

/// Records every message reaching the windows it is attached to
#[derive(Clone, Default)]
pub(crate) struct Recorder {
    log: Arc<Mutex<Vec<Message>>>,
}

impl Recorder {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Record, then fall through to the default procedure
    pub(crate) fn attach(&self, windows: &Arc<WindowTable>, hwnd: HWND) {
        self.attach_with(windows, hwnd, |_| None);
    }

    /// Record, then answer with `handler`; `None` defers to the default
    /// procedure
    pub(crate) fn attach_with<F>(&self, windows: &Arc<WindowTable>, hwnd: HWND, handler: F)
    where
        F: Fn(&Message) -> Option<isize> + Send + Sync + 'static,
    {
        let log = self.log.clone();
        let table: Weak<WindowTable> = Arc::downgrade(windows);
        windows.set_window_proc(hwnd, move |task, hwnd, message, wparam, lparam| {
            let msg = Message {
                hwnd,
                message,
                wparam,
                lparam,
                time: task.message_time(),
                pt: task.message_pos(),
            };
            log.lock().push(msg);
            if let Some(result) = handler(&msg) {
                return result;
            }
            table
                .upgrade()
                .map_or(0, |t| t.def_window_proc(hwnd, message, wparam, lparam))
        });
    }

    pub(crate) fn clear(&self) {
        self.log.lock().clear();
    }

    pub(crate) fn messages(&self) -> Vec<Message> {
        self.log.lock().clone()
    }

    pub(crate) fn codes(&self) -> Vec<u32> {
        self.log.lock().iter().map(|m| m.message).collect()
    }
}
