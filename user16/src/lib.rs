//! USER - Cooperative Message Queue Subsystem
//!
//! Message queues, synchronous cross-task sends, hardware input translation
//! and window hooks for a cooperatively scheduled window system. Exactly one
//! task runs application code at any moment; every other task is parked at a
//! suspension point (`wait_bits`, a pending send, or an explicit yield).
//!
//! # Components
//!
//! - **queue**: per-task message ring, wake/change bits, hardware queue
//! - **input**: hardware event translation, double-click detection, journaling
//! - **hooks**: hook chains (CBT, mouse, keyboard, filters, journal)
//! - **sendmsg**: post, send and reply
//! - **dispatch**: peek/get/translate/dispatch
//! - **sched**: the cooperative scheduler, `System` and `Task` handles
//!
//! Window management, painting and timers are collaborators reached through
//! the traits in [`env`]; [`window::WindowTable`] and [`timer::TimerTable`]
//! are in-memory implementations of them.

pub mod clock;
pub mod config;
pub mod dispatch;
pub mod env;
pub mod hooks;
pub mod input;
pub mod keyboard;
pub mod message;
pub mod queue;
pub mod sched;
pub mod sendmsg;
pub mod timer;
pub mod window;

#[cfg(test)]
pub(crate) mod testing;

pub use config::{ConfigError, SystemConfig};
pub use env::Env;
pub use hooks::{HookHandle, HookKind, HookPayload, HookScope, Verdict};
pub use message::{Message, MessageRange, PeekFlags, QueueStatus, WindowFilter};
pub use sched::{QueueSnapshot, System, Task};

use core::fmt;

// ============================================================================
// Handle Types
// ============================================================================

/// USER handle (HWND)
#[repr(transparent)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct UserHandle(u32);

impl UserHandle {
    pub const NULL: UserHandle = UserHandle(0);

    pub const fn from_raw(raw: u32) -> Self {
        UserHandle(raw)
    }

    /// Check if handle is valid
    pub const fn is_valid(self) -> bool {
        self.0 != 0
    }

    /// Get raw handle value
    pub const fn raw(self) -> u32 {
        self.0
    }
}

impl fmt::Display for UserHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:#06x}", self.0)
    }
}

pub type HWND = UserHandle;

/// Target for broadcast post/send
pub const HWND_BROADCAST: HWND = UserHandle(0xFFFF);

/// Identifier of a cooperatively scheduled task (and of its queue)
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct TaskId(u32);

impl TaskId {
    pub const fn raw(self) -> u32 {
        self.0
    }

    pub(crate) const fn from_raw(raw: u32) -> Self {
        TaskId(raw)
    }
}

impl fmt::Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "task#{}", self.0)
    }
}

// ============================================================================
// Common Structures
// ============================================================================

/// Point structure
#[repr(C)]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Point {
    pub x: i32,
    pub y: i32,
}

impl Point {
    pub const fn new(x: i32, y: i32) -> Self {
        Point { x, y }
    }
}

/// Rectangle structure
#[repr(C)]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Rect {
    pub left: i32,
    pub top: i32,
    pub right: i32,
    pub bottom: i32,
}

impl Rect {
    pub const fn new(left: i32, top: i32, right: i32, bottom: i32) -> Self {
        Rect { left, top, right, bottom }
    }

    pub const fn width(&self) -> i32 {
        self.right - self.left
    }

    pub const fn height(&self) -> i32 {
        self.bottom - self.top
    }

    pub const fn is_empty(&self) -> bool {
        self.left >= self.right || self.top >= self.bottom
    }

    pub fn contains_point(&self, pt: Point) -> bool {
        pt.x >= self.left && pt.x < self.right &&
        pt.y >= self.top && pt.y < self.bottom
    }

    pub fn offset(&mut self, dx: i32, dy: i32) {
        self.left += dx;
        self.right += dx;
        self.top += dy;
        self.bottom += dy;
    }
}
