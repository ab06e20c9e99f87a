//! Message Definitions
//!
//! Message codes, the `Message` record, queue status bits and the filters
//! used to select messages out of a queue.
//!
//! # Message Types
//!
//! - **Posted**: Queued asynchronously (post_message)
//! - **Sent**: Synchronous, the caller waits for the reply (send_message)
//! - **Hardware**: Raw mouse/keyboard events from the shared system queue

use bitflags::bitflags;

use crate::{Point, HWND};

// ============================================================================
// Window Messages
// ============================================================================

pub const WM_NULL: u32 = 0x0000;
pub const WM_CREATE: u32 = 0x0001;
pub const WM_DESTROY: u32 = 0x0002;
pub const WM_ACTIVATE: u32 = 0x0006;
pub const WM_SETFOCUS: u32 = 0x0007;
pub const WM_KILLFOCUS: u32 = 0x0008;
pub const WM_PAINT: u32 = 0x000F;
pub const WM_CLOSE: u32 = 0x0010;
pub const WM_QUIT: u32 = 0x0012;
pub const WM_ERASEBKGND: u32 = 0x0014;
pub const WM_PAINTICON: u32 = 0x0026;
pub const WM_QUEUESYNC: u32 = 0x0023;
pub const WM_SETCURSOR: u32 = 0x0020;
pub const WM_MOUSEACTIVATE: u32 = 0x0021;

// Non-client messages
pub const WM_NCHITTEST: u32 = 0x0084;
pub const WM_NCMOUSEMOVE: u32 = 0x00A0;
pub const WM_NCLBUTTONDOWN: u32 = 0x00A1;
pub const WM_NCLBUTTONUP: u32 = 0x00A2;
pub const WM_NCLBUTTONDBLCLK: u32 = 0x00A3;
pub const WM_NCRBUTTONDOWN: u32 = 0x00A4;
pub const WM_NCMBUTTONDBLCLK: u32 = 0x00A9;

// Keyboard messages
pub const WM_KEYFIRST: u32 = 0x0100;
pub const WM_KEYDOWN: u32 = 0x0100;
pub const WM_KEYUP: u32 = 0x0101;
pub const WM_CHAR: u32 = 0x0102;
pub const WM_DEADCHAR: u32 = 0x0103;
pub const WM_SYSKEYDOWN: u32 = 0x0104;
pub const WM_SYSKEYUP: u32 = 0x0105;
pub const WM_SYSCHAR: u32 = 0x0106;
pub const WM_SYSDEADCHAR: u32 = 0x0107;
pub const WM_KEYLAST: u32 = 0x0108;

// Timer
pub const WM_TIMER: u32 = 0x0113;
pub const WM_SYSTIMER: u32 = 0x0118;

pub const WM_ENTERIDLE: u32 = 0x0121;

// Mouse messages
pub const WM_MOUSEFIRST: u32 = 0x0200;
pub const WM_MOUSEMOVE: u32 = 0x0200;
pub const WM_LBUTTONDOWN: u32 = 0x0201;
pub const WM_LBUTTONUP: u32 = 0x0202;
pub const WM_LBUTTONDBLCLK: u32 = 0x0203;
pub const WM_RBUTTONDOWN: u32 = 0x0204;
pub const WM_RBUTTONUP: u32 = 0x0205;
pub const WM_RBUTTONDBLCLK: u32 = 0x0206;
pub const WM_MBUTTONDOWN: u32 = 0x0207;
pub const WM_MBUTTONUP: u32 = 0x0208;
pub const WM_MBUTTONDBLCLK: u32 = 0x0209;
pub const WM_MOUSELAST: u32 = 0x0209;

pub const WM_PARENTNOTIFY: u32 = 0x0210;

// User-defined messages
pub const WM_USER: u32 = 0x0400;

/// First id handed out by `register_window_message`
pub const WM_REGISTERED_FIRST: u32 = 0xC000;

// ============================================================================
// Message Structure
// ============================================================================

/// Window message (MSG structure)
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Message {
    /// Target window
    pub hwnd: HWND,

    /// Message type
    pub message: u32,

    /// First parameter (unsigned)
    pub wparam: usize,

    /// Second parameter (signed)
    pub lparam: isize,

    /// Time the message was posted (system tick)
    pub time: u32,

    /// Cursor position, screen coordinates
    pub pt: Point,
}

impl Message {
    pub fn new(hwnd: HWND, message: u32, wparam: usize, lparam: isize) -> Self {
        Self {
            hwnd,
            message,
            wparam,
            lparam,
            time: 0,
            pt: Point::default(),
        }
    }

    /// Stamp time and point
    pub fn at(mut self, time: u32, pt: Point) -> Self {
        self.time = time;
        self.pt = pt;
        self
    }

    pub fn is_quit(&self) -> bool {
        self.message == WM_QUIT
    }

    pub fn is_mouse(&self) -> bool {
        is_mouse_message(self.message)
    }

    pub fn is_key(&self) -> bool {
        is_key_message(self.message)
    }
}

pub const fn is_mouse_message(message: u32) -> bool {
    message >= WM_MOUSEFIRST && message <= WM_MOUSELAST
}

pub const fn is_key_message(message: u32) -> bool {
    message >= WM_KEYFIRST && message <= WM_KEYLAST
}

/// Button-down messages that can be promoted to double clicks
pub const fn is_button_down(message: u32) -> bool {
    matches!(message, WM_LBUTTONDOWN | WM_RBUTTONDOWN | WM_MBUTTONDOWN)
}

// ============================================================================
// Parameter packing
// ============================================================================

pub const fn make_long(lo: u16, hi: u16) -> isize {
    (((hi as u32) << 16) | lo as u32) as isize
}

pub const fn loword(value: isize) -> u16 {
    value as u16
}

pub const fn hiword(value: isize) -> u16 {
    (value >> 16) as u16
}

pub const fn point_to_lparam(pt: Point) -> isize {
    make_long(pt.x as u16, pt.y as u16)
}

pub const fn lparam_to_point(lparam: isize) -> Point {
    Point::new(loword(lparam) as i16 as i32, hiword(lparam) as i16 as i32)
}

// ============================================================================
// Queue Status
// ============================================================================

bitflags! {
    /// Queue wake/change bits (QS_*)
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct QueueStatus: u32 {
        const KEY = 0x0001;
        const MOUSE = 0x0002;
        const POSTMESSAGE = 0x0004;
        const TIMER = 0x0008;
        const PAINT = 0x0010;
        const SENDMESSAGE = 0x0020;
        /// Sender may reuse its parameter slot
        const SMPARAMSFREE = 0x4000;
        /// A reply arrived for one of our sends
        const SMRESULT = 0x8000;

        const INPUT = Self::KEY.bits() | Self::MOUSE.bits();
        const ALLINPUT = Self::KEY.bits() | Self::MOUSE.bits() | Self::POSTMESSAGE.bits()
            | Self::TIMER.bits() | Self::PAINT.bits() | Self::SENDMESSAGE.bits();
    }
}

bitflags! {
    /// Peek options (PM_*)
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct PeekFlags: u32 {
        const REMOVE = 0x0001;
        const NOYIELD = 0x0002;
    }
}

impl PeekFlags {
    pub const NOREMOVE: PeekFlags = PeekFlags::empty();
}

// ============================================================================
// Filters
// ============================================================================

/// Window selection for peek/get
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum WindowFilter {
    /// Every window of the calling task, plus window-less messages
    #[default]
    All,
    /// Exactly this window for posted messages; the window or its
    /// descendants for input, paint and timers
    Window(HWND),
    /// Only messages with no window
    Unowned,
}

impl From<HWND> for WindowFilter {
    fn from(hwnd: HWND) -> Self {
        if hwnd.is_valid() {
            WindowFilter::Window(hwnd)
        } else {
            WindowFilter::All
        }
    }
}

impl WindowFilter {
    /// Posted message selection
    pub fn matches(&self, hwnd: HWND) -> bool {
        match *self {
            WindowFilter::All => true,
            WindowFilter::Window(h) => h == hwnd,
            WindowFilter::Unowned => !hwnd.is_valid(),
        }
    }

    /// Scope window for hardware/paint translation; `None` when the filter
    /// excludes every window
    pub fn scope(&self) -> Option<HWND> {
        match *self {
            WindowFilter::All => Some(HWND::NULL),
            WindowFilter::Window(h) => Some(h),
            WindowFilter::Unowned => None,
        }
    }
}

/// Inclusive message code range; a zero bound is open
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct MessageRange {
    pub first: u32,
    pub last: u32,
}

impl MessageRange {
    pub const ALL: MessageRange = MessageRange { first: 0, last: 0 };

    pub const fn new(first: u32, last: u32) -> Self {
        MessageRange { first, last }
    }

    pub const fn only(message: u32) -> Self {
        MessageRange { first: message, last: message }
    }

    pub const fn is_all(&self) -> bool {
        self.first == 0 && self.last == 0
    }

    pub const fn contains(&self, message: u32) -> bool {
        (self.first == 0 || message >= self.first) && (self.last == 0 || message <= self.last)
    }

    const fn overlaps(&self, lo: u32, hi: u32) -> bool {
        let upper = if self.last == 0 { u32::MAX } else { self.last };
        self.first <= hi && upper >= lo
    }

    /// Queue bits worth waking up for with this range
    pub fn interest_mask(&self) -> QueueStatus {
        let mut mask = QueueStatus::POSTMESSAGE | QueueStatus::SENDMESSAGE;
        if self.is_all() {
            return mask | QueueStatus::ALLINPUT;
        }
        if self.overlaps(WM_KEYFIRST, WM_KEYLAST) {
            mask |= QueueStatus::KEY;
        }
        if self.overlaps(WM_MOUSEFIRST, WM_MOUSELAST)
            || self.overlaps(WM_NCMOUSEMOVE, WM_NCMBUTTONDBLCLK)
        {
            mask |= QueueStatus::MOUSE;
        }
        if self.overlaps(WM_TIMER, WM_TIMER) || self.overlaps(WM_SYSTIMER, WM_SYSTIMER) {
            mask |= QueueStatus::TIMER;
        }
        if self.overlaps(WM_PAINT, WM_PAINT) {
            mask |= QueueStatus::PAINT;
        }
        mask
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn range_open_bounds() {
        assert!(MessageRange::ALL.contains(WM_QUIT));
        assert!(MessageRange::new(WM_KEYFIRST, 0).contains(WM_MOUSEMOVE));
        assert!(!MessageRange::new(WM_KEYFIRST, 0).contains(WM_PAINT));
        assert!(MessageRange::new(0, WM_KEYLAST).contains(WM_PAINT));
        assert!(!MessageRange::only(WM_TIMER).contains(WM_SYSTIMER));
    }

    #[test]
    fn interest_mask_by_range() {
        assert!(MessageRange::ALL.interest_mask().contains(QueueStatus::ALLINPUT));

        let keys = MessageRange::new(WM_KEYFIRST, WM_KEYLAST).interest_mask();
        assert!(keys.contains(QueueStatus::KEY | QueueStatus::POSTMESSAGE | QueueStatus::SENDMESSAGE));
        assert!(!keys.intersects(QueueStatus::MOUSE | QueueStatus::PAINT | QueueStatus::TIMER));

        let nc = MessageRange::only(WM_NCLBUTTONDOWN).interest_mask();
        assert!(nc.contains(QueueStatus::MOUSE));

        let systimer = MessageRange::only(WM_SYSTIMER).interest_mask();
        assert!(systimer.contains(QueueStatus::TIMER));

        let paint = MessageRange::only(WM_PAINT).interest_mask();
        assert_eq!(paint, QueueStatus::PAINT | QueueStatus::POSTMESSAGE | QueueStatus::SENDMESSAGE);
    }

    #[test]
    fn lparam_points_keep_sign() {
        let pt = Point::new(-5, 300);
        assert_eq!(lparam_to_point(point_to_lparam(pt)), pt);
        assert_eq!(loword(make_long(7, 9)), 7);
        assert_eq!(hiword(make_long(7, 9)), 9);
    }

    #[test]
    fn window_filter_selection() {
        let w = HWND::from_raw(3);
        assert_eq!(WindowFilter::from(HWND::NULL), WindowFilter::All);
        assert!(WindowFilter::Window(w).matches(w));
        assert!(!WindowFilter::Window(w).matches(HWND::from_raw(4)));
        assert!(WindowFilter::Unowned.matches(HWND::NULL));
        assert!(!WindowFilter::Unowned.matches(w));
        assert_eq!(WindowFilter::Unowned.scope(), None);
    }
}
