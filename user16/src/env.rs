//! Collaborator interfaces
//!
//! The queue engine does not own windows, timers, painting or keyboard
//! layouts. It reaches them through these traits, bundled in [`Env`].
//! Implementations must not call back into the engine while holding their
//! own locks; window procedures and timer callbacks run unlocked.

use std::sync::Arc;

use crate::keyboard::{KeyboardLayout, UsLayout};
use crate::message::{Message, WindowFilter};
use crate::sched::Task;
use crate::timer::TimerTable;
use crate::window::{ClassStyle, WindowStyle, WindowStyleEx, WindowTable};
use crate::{Point, TaskId, HWND};

// ============================================================================
// Hit-test codes
// ============================================================================

pub const HTERROR: i16 = -2;
pub const HTTRANSPARENT: i16 = -1;
pub const HTNOWHERE: i16 = 0;
pub const HTCLIENT: i16 = 1;
pub const HTCAPTION: i16 = 2;
pub const HTSYSMENU: i16 = 3;
pub const HTBORDER: i16 = 18;

// ============================================================================
// Windows
// ============================================================================

/// What the engine needs to know about a window
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WindowInfo {
    /// Task whose queue receives the window's messages
    pub owner: Option<TaskId>,
    pub parent: HWND,
    pub style: WindowStyle,
    pub ex_style: WindowStyleEx,
    pub class_style: ClassStyle,
}

pub trait WindowDirectory: Send + Sync {
    fn window_info(&self, hwnd: HWND) -> Option<WindowInfo>;

    fn desktop(&self) -> HWND;

    /// Top-level windows, topmost first
    fn top_level_windows(&self) -> Vec<HWND>;

    fn is_window(&self, hwnd: HWND) -> bool {
        self.window_info(hwnd).is_some()
    }

    fn owner(&self, hwnd: HWND) -> Option<TaskId> {
        self.window_info(hwnd).and_then(|info| info.owner)
    }

    /// `hwnd` is a descendant of `parent` through child windows
    fn is_child(&self, parent: HWND, hwnd: HWND) -> bool {
        let mut current = hwnd;
        while let Some(info) = self.window_info(current) {
            if !info.style.contains(WindowStyle::CHILD) || !info.parent.is_valid() {
                return false;
            }
            if info.parent == parent {
                return true;
            }
            current = info.parent;
        }
        false
    }

    /// Nearest ancestor that is not a child window
    fn top_level(&self, hwnd: HWND) -> HWND {
        let mut current = hwnd;
        while let Some(info) = self.window_info(current) {
            if !info.style.contains(WindowStyle::CHILD) || !info.parent.is_valid() {
                break;
            }
            current = info.parent;
        }
        current
    }
}

pub trait HitTestProvider: Send + Sync {
    /// Deepest window under a screen point with its hit-test code
    fn window_from_point(&self, pt: Point) -> (HWND, i16);
}

pub trait CoordinateMapper: Send + Sync {
    fn screen_to_client(&self, hwnd: HWND, pt: Point) -> Point;
    fn client_to_screen(&self, hwnd: HWND, pt: Point) -> Point;
}

pub trait WindowProcInvoker: Send + Sync {
    /// Run the window procedure on the calling task's stack
    fn call_window_proc(
        &self,
        task: &Task,
        hwnd: HWND,
        message: u32,
        wparam: usize,
        lparam: isize,
    ) -> isize;
}

// ============================================================================
// Painting
// ============================================================================

/// Window chosen for the next WM_PAINT
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PaintTarget {
    pub hwnd: HWND,
    /// Minimized with a class icon: gets WM_PAINTICON
    pub iconic: bool,
    /// Only an internal paint request is pending
    pub internal_only: bool,
}

pub trait PaintTracker: Send + Sync {
    /// A window of `task` needing paint, within `scope` (NULL = any)
    fn find_window_to_repaint(&self, scope: HWND, task: TaskId) -> Option<PaintTarget>;
    fn clear_internal_paint(&self, hwnd: HWND);
    /// WM_PAINT is about to be delivered
    fn begin_paint_dispatch(&self, hwnd: HWND);
    /// The procedure began painting (or nothing is invalid)
    fn paint_acknowledged(&self, hwnd: HWND) -> bool;
    fn force_validate(&self, hwnd: HWND);
}

// ============================================================================
// Timers
// ============================================================================

pub trait TimerService: Send + Sync {
    /// Next due timer message for `task`; reschedules it when `remove`
    fn timer_message(
        &self,
        filter: WindowFilter,
        task: TaskId,
        remove: bool,
        now: u32,
    ) -> Option<Message>;

    /// Run the callback a timer message names; `None` when unknown
    fn call_timer_proc(&self, task: &Task, msg: &Message, now: u32) -> Option<isize>;

    /// Any timer of `task` at or past its deadline
    fn has_due_timer(&self, task: TaskId, now: u32) -> bool;

    /// Drop the timers of an exiting task
    fn kill_task_timers(&self, task: TaskId);
}

// ============================================================================
// Bundle
// ============================================================================

/// The set of collaborators a `System` runs against
#[derive(Clone)]
pub struct Env {
    pub windows: Arc<dyn WindowDirectory>,
    pub hit_test: Arc<dyn HitTestProvider>,
    pub coords: Arc<dyn CoordinateMapper>,
    pub procs: Arc<dyn WindowProcInvoker>,
    pub paint: Arc<dyn PaintTracker>,
    pub timers: Arc<dyn TimerService>,
    pub keyboard: Arc<dyn KeyboardLayout>,
}

impl Env {
    /// Wire the in-memory window and timer tables with a US layout
    pub fn new(windows: Arc<WindowTable>, timers: Arc<TimerTable>) -> Self {
        Env {
            windows: windows.clone(),
            hit_test: windows.clone(),
            coords: windows.clone(),
            procs: windows.clone(),
            paint: windows,
            timers,
            keyboard: Arc::new(UsLayout),
        }
    }

    pub fn with_keyboard(mut self, keyboard: Arc<dyn KeyboardLayout>) -> Self {
        self.keyboard = keyboard;
        self
    }
}
