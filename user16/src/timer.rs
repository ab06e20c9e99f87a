//! USER Timer Subsystem
//!
//! Window and task timers. Timers are not queued as messages: the dispatch
//! loop asks for the next due timer when nothing else is pending, and the
//! timer is rescheduled when its message is removed.
//!
//! # Functions
//!
//! - `set_timer` / `set_timer_proc` - create or reset a timer
//! - `kill_timer` - destroy a timer
//! - `timer_message` - next due WM_TIMER/WM_SYSTIMER for a task

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

use log::{debug, trace, warn};

use crate::clock::tick_reached;
use crate::env::TimerService;
use crate::message::{Message, WindowFilter, WM_SYSTIMER, WM_TIMER};
use crate::sched::Task;
use crate::{Point, TaskId, HWND};

// ============================================================================
// Constants
// ============================================================================

/// Maximum number of USER timers
const MAX_TIMERS: usize = 256;

/// Minimum timer interval in milliseconds
pub const USER_TIMER_MINIMUM: u32 = 10;

/// Maximum timer interval in milliseconds
pub const USER_TIMER_MAXIMUM: u32 = 0x7FFFFFFF;

/// Timer callback: (task, hwnd, message, timer id, tick)
pub type TimerProc = Arc<dyn Fn(&Task, HWND, u32, usize, u32) -> isize + Send + Sync>;

// ============================================================================
// Timer Structure
// ============================================================================

/// USER timer entry
#[derive(Debug, Clone, Copy)]
struct UserTimer {
    /// Task whose queue sees the timer
    owner: TaskId,

    /// Window that receives WM_TIMER messages (NULL for task timer)
    hwnd: HWND,

    /// Timer ID (unique per window)
    timer_id: usize,

    /// Interval in milliseconds
    interval_ms: u32,

    /// Next expiration time (system tick count)
    next_fire: u32,

    /// Callback key, 0 for WM_TIMER only
    callback: u32,

    /// Generates WM_SYSTIMER
    system: bool,
}

impl UserTimer {
    fn message(&self, now: u32) -> Message {
        let code = if self.system { WM_SYSTIMER } else { WM_TIMER };
        Message {
            hwnd: self.hwnd,
            message: code,
            wparam: self.timer_id,
            lparam: self.callback as isize,
            time: now,
            pt: Point::default(),
        }
    }
}

// ============================================================================
// Timer Table
// ============================================================================

#[derive(Default)]
struct Timers {
    timers: Vec<UserTimer>,
    callbacks: BTreeMap<u32, TimerProc>,
}

/// In-memory timer service
pub struct TimerTable {
    inner: spin::Mutex<Timers>,
    next_timer_id: AtomicU32,
    next_callback: AtomicU32,
}

impl Default for TimerTable {
    fn default() -> Self {
        Self::new()
    }
}

impl TimerTable {
    pub fn new() -> Self {
        Self {
            inner: spin::Mutex::new(Timers::default()),
            next_timer_id: AtomicU32::new(1),
            next_callback: AtomicU32::new(1),
        }
    }

    /// Create or reset a timer for a window (or the task when `hwnd` is
    /// NULL). Returns the timer ID, 0 on failure.
    pub fn set_timer(&self, owner: TaskId, hwnd: HWND, timer_id: usize, interval: u32, now: u32) -> usize {
        self.insert(owner, hwnd, timer_id, interval, now, None, false)
    }

    /// Timer whose expiry calls `proc_` instead of the window procedure
    pub fn set_timer_proc<F>(
        &self,
        owner: TaskId,
        hwnd: HWND,
        timer_id: usize,
        interval: u32,
        now: u32,
        proc_: F,
    ) -> usize
    where
        F: Fn(&Task, HWND, u32, usize, u32) -> isize + Send + Sync + 'static,
    {
        self.insert(owner, hwnd, timer_id, interval, now, Some(Arc::new(proc_)), false)
    }

    /// Timer generating WM_SYSTIMER (caret blink, menus)
    pub fn set_system_timer(&self, owner: TaskId, hwnd: HWND, timer_id: usize, interval: u32, now: u32) -> usize {
        self.insert(owner, hwnd, timer_id, interval, now, None, true)
    }

    #[allow(clippy::too_many_arguments)]
    fn insert(
        &self,
        owner: TaskId,
        hwnd: HWND,
        timer_id: usize,
        interval: u32,
        now: u32,
        proc_: Option<TimerProc>,
        system: bool,
    ) -> usize {
        // Clamp interval to valid range
        let interval = interval.clamp(USER_TIMER_MINIMUM, USER_TIMER_MAXIMUM);

        let mut table = self.inner.lock();
        let callback = match proc_ {
            Some(p) => {
                let key = self.next_callback.fetch_add(1, Ordering::Relaxed);
                table.callbacks.insert(key, p);
                key
            }
            None => 0,
        };

        // Check if this timer already exists (for modification)
        if timer_id != 0 {
            if let Some(timer) = table
                .timers
                .iter_mut()
                .find(|t| t.hwnd == hwnd && t.timer_id == timer_id && t.system == system && t.owner == owner)
            {
                let stale = timer.callback;
                timer.interval_ms = interval;
                timer.next_fire = now.wrapping_add(interval);
                timer.callback = callback;
                if stale != 0 {
                    table.callbacks.remove(&stale);
                }
                return timer_id;
            }
        }

        if table.timers.len() >= MAX_TIMERS {
            // No free timer slots
            warn!("[USER/Timer] No free timer slots");
            if callback != 0 {
                table.callbacks.remove(&callback);
            }
            return 0;
        }

        let id = if timer_id == 0 {
            self.next_timer_id.fetch_add(1, Ordering::Relaxed) as usize
        } else {
            timer_id
        };
        table.timers.push(UserTimer {
            owner,
            hwnd,
            timer_id: id,
            interval_ms: interval,
            next_fire: now.wrapping_add(interval),
            callback,
            system,
        });

        debug!(
            "[USER/Timer] Timer {} created for hwnd {} ({}), interval={}ms",
            id, hwnd, owner, interval
        );
        id
    }

    /// Destroy a timer. Returns false if the timer was not found.
    pub fn kill_timer(&self, hwnd: HWND, timer_id: usize) -> bool {
        self.remove(hwnd, timer_id, false)
    }

    pub fn kill_system_timer(&self, hwnd: HWND, timer_id: usize) -> bool {
        self.remove(hwnd, timer_id, true)
    }

    fn remove(&self, hwnd: HWND, timer_id: usize, system: bool) -> bool {
        let mut table = self.inner.lock();
        let Some(pos) = table
            .timers
            .iter()
            .position(|t| t.hwnd == hwnd && t.timer_id == timer_id && t.system == system)
        else {
            return false;
        };
        let timer = table.timers.remove(pos);
        if timer.callback != 0 {
            table.callbacks.remove(&timer.callback);
        }
        debug!("[USER/Timer] Timer {} destroyed", timer_id);
        true
    }

    /// Kill all timers for a window (called when window is destroyed)
    pub fn kill_window_timers(&self, hwnd: HWND) {
        self.retain(|t| t.hwnd != hwnd);
    }

    fn retain(&self, keep: impl Fn(&UserTimer) -> bool) {
        let mut table = self.inner.lock();
        let Timers { timers, callbacks } = &mut *table;
        timers.retain(|t| {
            let kept = keep(t);
            if !kept && t.callback != 0 {
                callbacks.remove(&t.callback);
            }
            kept
        });
    }

    pub fn count(&self) -> usize {
        self.inner.lock().timers.len()
    }

    /// Get the next timer expiration time (for sleep optimization)
    pub fn next_expiration(&self, now: u32) -> Option<u32> {
        self.inner
            .lock()
            .timers
            .iter()
            .map(|t| t.next_fire)
            .min_by_key(|&fire| fire.wrapping_sub(now) as i32)
    }
}

impl TimerService for TimerTable {
    fn timer_message(&self, filter: WindowFilter, task: TaskId, remove: bool, now: u32) -> Option<Message> {
        let mut table = self.inner.lock();
        let timer = table
            .timers
            .iter_mut()
            .filter(|t| t.owner == task && filter.matches(t.hwnd) && tick_reached(now, t.next_fire))
            .max_by_key(|t| now.wrapping_sub(t.next_fire) as i32)?;

        let msg = timer.message(now);
        if remove {
            // Schedule next fire time
            timer.next_fire = now.wrapping_add(timer.interval_ms);
        }
        trace!("[USER/Timer] Timer {} fired for {}", timer.timer_id, timer.hwnd);
        Some(msg)
    }

    fn call_timer_proc(&self, task: &Task, msg: &Message, now: u32) -> Option<isize> {
        let proc_ = self.inner.lock().callbacks.get(&(msg.lparam as u32)).cloned()?;
        Some(proc_(task, msg.hwnd, msg.message, msg.wparam, now))
    }

    fn has_due_timer(&self, task: TaskId, now: u32) -> bool {
        self.inner
            .lock()
            .timers
            .iter()
            .any(|t| t.owner == task && tick_reached(now, t.next_fire))
    }

    fn kill_task_timers(&self, task: TaskId) {
        self.retain(|t| t.owner != task);
    }
}
