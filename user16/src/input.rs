//! Input Handling
//!
//! Raw mouse and keyboard events land in the system-wide hardware queue and
//! are translated lazily, by whichever task peeks next, into messages for a
//! specific window. Translation decides the target (capture, hit-test,
//! focus), promotes double clicks, runs the mouse/keyboard hooks and the
//! activation handshake, and hands events that belong to another task's
//! window over to that task.
//!
//! Journal hooks can record removed input and replay synthetic input.

use log::{debug, trace, warn};

use crate::env::{HTCLIENT, HTERROR, HTNOWHERE};
use crate::hooks::{
    EventMsg, HookKind, HookMessage, HookPayload, MouseHookInfo, PlaybackRequest, Verdict,
    HCBT_ACTIVATE,
    HCBT_CLICKSKIPPED, HCBT_KEYSKIPPED, HCBT_QS, HC_ACTION, HC_GETNEXT, HC_NOREMOVE, HC_SKIP,
};
use crate::message::{
    hiword, is_button_down, is_key_message, is_mouse_message, loword, make_long,
    point_to_lparam, Message, MessageRange, QueueStatus, WM_ACTIVATE, WM_KEYDOWN, WM_KEYUP,
    WM_KILLFOCUS, WM_LBUTTONDBLCLK, WM_LBUTTONDOWN, WM_LBUTTONUP, WM_MBUTTONDOWN, WM_MBUTTONUP,
    WM_MOUSEACTIVATE, WM_MOUSEMOVE, WM_NCMBUTTONDBLCLK, WM_NCMOUSEMOVE, WM_PARENTNOTIFY,
    WM_QUEUESYNC,
    WM_RBUTTONDOWN, WM_RBUTTONUP, WM_SETCURSOR, WM_SETFOCUS, WM_SYSKEYDOWN, WM_SYSKEYUP,
};
use crate::config::SystemConfig;
use crate::sched::{Shared, System, Task};
use crate::window::{WindowStyle, WindowStyleEx, ClassStyle};
use crate::{Point, TaskId, HWND};

// ============================================================================
// Virtual Key Codes
// ============================================================================

/// Virtual key codes (VK_*)
pub mod vk {
    pub const LBUTTON: u8 = 0x01;
    pub const RBUTTON: u8 = 0x02;
    pub const MBUTTON: u8 = 0x04;
    pub const BACK: u8 = 0x08;
    pub const TAB: u8 = 0x09;
    pub const RETURN: u8 = 0x0D;
    pub const SHIFT: u8 = 0x10;
    pub const CONTROL: u8 = 0x11;
    pub const MENU: u8 = 0x12; // Alt
    pub const CAPITAL: u8 = 0x14; // Caps Lock
    pub const ESCAPE: u8 = 0x1B;
    pub const SPACE: u8 = 0x20;
    pub const PRIOR: u8 = 0x21;
    pub const NEXT: u8 = 0x22;
    pub const END: u8 = 0x23;
    pub const HOME: u8 = 0x24;
    pub const LEFT: u8 = 0x25;
    pub const UP: u8 = 0x26;
    pub const RIGHT: u8 = 0x27;
    pub const DOWN: u8 = 0x28;
    pub const INSERT: u8 = 0x2D;
    pub const DELETE: u8 = 0x2E;

    // 0-9 are 0x30-0x39
    // A-Z are 0x41-0x5A

    pub const NUMPAD0: u8 = 0x60;
    pub const NUMPAD9: u8 = 0x69;
    pub const MULTIPLY: u8 = 0x6A;
    pub const ADD: u8 = 0x6B;
    pub const SUBTRACT: u8 = 0x6D;
    pub const DECIMAL: u8 = 0x6E;
    pub const DIVIDE: u8 = 0x6F;

    pub const F1: u8 = 0x70;
    pub const F12: u8 = 0x7B;

    pub const NUMLOCK: u8 = 0x90;
    pub const SCROLL: u8 = 0x91;

    pub const LSHIFT: u8 = 0xA0;
    pub const RSHIFT: u8 = 0xA1;
    pub const LCONTROL: u8 = 0xA2;
    pub const RCONTROL: u8 = 0xA3;
    pub const LMENU: u8 = 0xA4;
    pub const RMENU: u8 = 0xA5;

    // OEM punctuation, US layout
    pub const OEM_1: u8 = 0xBA; // ;:
    pub const OEM_PLUS: u8 = 0xBB;
    pub const OEM_COMMA: u8 = 0xBC;
    pub const OEM_MINUS: u8 = 0xBD;
    pub const OEM_PERIOD: u8 = 0xBE;
    pub const OEM_2: u8 = 0xBF; // /?
    pub const OEM_3: u8 = 0xC0; // `~
    pub const OEM_4: u8 = 0xDB; // [{
    pub const OEM_5: u8 = 0xDC; // \|
    pub const OEM_6: u8 = 0xDD; // ]}
    pub const OEM_7: u8 = 0xDE; // '"
}

// Mouse key flags (MK_*)
pub const MK_LBUTTON: usize = 0x0001;
pub const MK_RBUTTON: usize = 0x0002;
pub const MK_SHIFT: usize = 0x0004;
pub const MK_CONTROL: usize = 0x0008;
pub const MK_MBUTTON: usize = 0x0010;

// WM_MOUSEACTIVATE results
pub const MA_ACTIVATE: isize = 1;
pub const MA_ACTIVATEANDEAT: isize = 2;
pub const MA_NOACTIVATE: isize = 3;
pub const MA_NOACTIVATEANDEAT: isize = 4;

// WM_ACTIVATE states
pub const WA_INACTIVE: usize = 0;
pub const WA_ACTIVE: usize = 1;
pub const WA_CLICKACTIVE: usize = 2;

// ============================================================================
// Double Click
// ============================================================================

/// Last button-down seen by a removing peek
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DoubleClickTracker {
    message: u32,
    hwnd: HWND,
    pos: Point,
    time: u32,
}

impl DoubleClickTracker {
    /// Same button on the same window, within the interval and inside the
    /// tolerance rectangle centred on the previous click
    pub fn is_double_click(
        &self,
        message: u32,
        hwnd: HWND,
        pt: Point,
        time: u32,
        interval: u32,
        size: (i32, i32),
    ) -> bool {
        self.hwnd.is_valid()
            && self.message == message
            && self.hwnd == hwnd
            && time.wrapping_sub(self.time) < interval
            && (pt.x - self.pos.x).abs() < size.0 / 2
            && (pt.y - self.pos.y).abs() < size.1 / 2
    }

    pub fn record(&mut self, message: u32, hwnd: HWND, pt: Point, time: u32) {
        *self = DoubleClickTracker { message, hwnd, pos: pt, time };
    }

    /// After a double click fires, the next click starts a new pair
    pub fn reset(&mut self) {
        self.hwnd = HWND::NULL;
        self.time = 0;
    }
}

// ============================================================================
// Input State
// ============================================================================

/// System-wide input state
pub(crate) struct InputState {
    pub(crate) focus: HWND,
    pub(crate) active: HWND,
    pub(crate) capture: HWND,
    pub(crate) capture_hit: i16,
    pub(crate) cursor: Point,
    /// Physical key state: 0x80 down, 0x01 toggled
    pub(crate) keys: [u8; 256],
    pub(crate) dblclk: DoubleClickTracker,
    pub(crate) double_click_time: u32,
    pub(crate) double_click_size: (i32, i32),
    /// Pending dead key for character translation
    pub(crate) dead_char: u8,
}

impl InputState {
    pub(crate) fn new(config: &SystemConfig) -> Self {
        Self {
            focus: HWND::NULL,
            active: HWND::NULL,
            capture: HWND::NULL,
            capture_hit: HTCLIENT,
            cursor: Point::default(),
            keys: [0; 256],
            dblclk: DoubleClickTracker::default(),
            double_click_time: config.double_click_time,
            double_click_size: (config.double_click_width, config.double_click_height),
            dead_char: 0,
        }
    }

    fn is_down(&self, key: u8) -> bool {
        self.keys[key as usize] & 0x80 != 0
    }

    fn mouse_key_flags(&self) -> usize {
        let mut flags = 0;
        if self.is_down(vk::LBUTTON) {
            flags |= MK_LBUTTON;
        }
        if self.is_down(vk::RBUTTON) {
            flags |= MK_RBUTTON;
        }
        if self.is_down(vk::MBUTTON) {
            flags |= MK_MBUTTON;
        }
        if self.is_down(vk::SHIFT) {
            flags |= MK_SHIFT;
        }
        if self.is_down(vk::CONTROL) {
            flags |= MK_CONTROL;
        }
        flags
    }

    /// Record a key transition; returns whether the key was already down
    fn press(&mut self, key: u8, down: bool) -> bool {
        let state = &mut self.keys[key as usize];
        let was_down = *state & 0x80 != 0;
        if down {
            if !was_down {
                *state ^= 0x01;
            }
            *state |= 0x80;
        } else {
            *state &= !0x80;
        }
        was_down
    }
}

/// Convert scancode to virtual key code
fn scancode_to_vk(scancode: u8) -> u8 {
    // Basic US keyboard layout mapping
    match scancode {
        0x01 => vk::ESCAPE,
        0x02..=0x0A => b'1' + (scancode - 0x02),
        0x0B => b'0',
        0x0C => vk::OEM_MINUS,
        0x0D => vk::OEM_PLUS,
        0x0E => vk::BACK,
        0x0F => vk::TAB,
        0x10 => b'Q',
        0x11 => b'W',
        0x12 => b'E',
        0x13 => b'R',
        0x14 => b'T',
        0x15 => b'Y',
        0x16 => b'U',
        0x17 => b'I',
        0x18 => b'O',
        0x19 => b'P',
        0x1A => vk::OEM_4,
        0x1B => vk::OEM_6,
        0x1C => vk::RETURN,
        0x1D => vk::CONTROL,
        0x1E => b'A',
        0x1F => b'S',
        0x20 => b'D',
        0x21 => b'F',
        0x22 => b'G',
        0x23 => b'H',
        0x24 => b'J',
        0x25 => b'K',
        0x26 => b'L',
        0x27 => vk::OEM_1,
        0x28 => vk::OEM_7,
        0x29 => vk::OEM_3,
        0x2A => vk::LSHIFT,
        0x2B => vk::OEM_5,
        0x2C => b'Z',
        0x2D => b'X',
        0x2E => b'C',
        0x2F => b'V',
        0x30 => b'B',
        0x31 => b'N',
        0x32 => b'M',
        0x33 => vk::OEM_COMMA,
        0x34 => vk::OEM_PERIOD,
        0x35 => vk::OEM_2,
        0x36 => vk::RSHIFT,
        0x38 => vk::MENU,
        0x39 => vk::SPACE,
        0x3A => vk::CAPITAL,
        0x3B..=0x44 => vk::F1 + (scancode - 0x3B),
        0x47 => vk::HOME,
        0x48 => vk::UP,
        0x49 => vk::PRIOR,
        0x4B => vk::LEFT,
        0x4D => vk::RIGHT,
        0x4F => vk::END,
        0x50 => vk::DOWN,
        0x51 => vk::NEXT,
        0x52 => vk::INSERT,
        0x53 => vk::DELETE,
        _ => 0,
    }
}

/// Sided modifiers report as the generic key
fn generic_vk(key: u8) -> u8 {
    match key {
        vk::LSHIFT | vk::RSHIFT => vk::SHIFT,
        vk::LCONTROL | vk::RCONTROL => vk::CONTROL,
        vk::LMENU | vk::RMENU => vk::MENU,
        other => other,
    }
}

/// Make lparam for keyboard message
fn make_key_lparam(scancode: u8, pressed: bool, was_down: bool, alt: bool) -> isize {
    let repeat_count: u32 = 1;
    let scan_code: u32 = scancode as u32;
    let context: u32 = alt as u32;
    let previous: u32 = if pressed { was_down as u32 } else { 1 };
    let transition: u32 = if pressed { 0 } else { 1 };

    ((repeat_count & 0xFFFF) |
     ((scan_code & 0xFF) << 16) |
     ((context & 1) << 29) |
     ((previous & 1) << 30) |
     ((transition & 1) << 31)) as isize
}

// ============================================================================
// Injection
// ============================================================================

impl Shared {
    /// Window whose owner should hear about a new hardware event first
    fn presumed_owner(&self, message: u32, pt: Point) -> Option<TaskId> {
        let (capture, focus, active) = {
            let st = self.lock();
            (st.input.capture, st.input.focus, st.input.active)
        };
        let hwnd = if is_mouse_message(message) {
            if capture.is_valid() {
                capture
            } else {
                self.env.hit_test.window_from_point(pt).0
            }
        } else if is_key_message(message) {
            if focus.is_valid() { focus } else { active }
        } else {
            HWND::NULL
        };
        self.env.windows.owner(hwnd)
    }

    pub(crate) fn hardware_event(
        &self,
        message: u32,
        wparam: usize,
        lparam: isize,
        pt: Point,
        time: u32,
        extra_info: u32,
    ) {
        let owner = self.presumed_owner(message, pt);
        let class = if is_key_message(message) {
            QueueStatus::KEY
        } else {
            QueueStatus::MOUSE
        };
        let msg = Message { hwnd: HWND::NULL, message, wparam, lparam, time, pt };

        let mut st = self.lock();
        if is_mouse_message(message) {
            st.input.cursor = pt;
        }
        if !st.hardware.push(msg, class, extra_info) {
            warn!("[USER/Input] Hardware queue full, dropped message {:#x}", message);
            return;
        }
        trace!("[USER/Input] Queued hardware message {:#x} at ({}, {})", message, pt.x, pt.y);

        match owner.filter(|&t| st.is_alive(t)) {
            Some(task) => self.wake(&mut st, task, class),
            None => {
                for task in st.live_tasks() {
                    self.wake(&mut st, task, class);
                }
            }
        }
    }

    pub(crate) fn mouse_event(&self, message: u32, pt: Point, time: u32) {
        let wparam = {
            let mut st = self.lock();
            match message {
                WM_LBUTTONDOWN => { st.input.press(vk::LBUTTON, true); }
                WM_LBUTTONUP => { st.input.press(vk::LBUTTON, false); }
                WM_RBUTTONDOWN => { st.input.press(vk::RBUTTON, true); }
                WM_RBUTTONUP => { st.input.press(vk::RBUTTON, false); }
                WM_MBUTTONDOWN => { st.input.press(vk::MBUTTON, true); }
                WM_MBUTTONUP => { st.input.press(vk::MBUTTON, false); }
                _ => {}
            }
            st.input.mouse_key_flags()
        };
        self.hardware_event(message, wparam, point_to_lparam(pt), pt, time, 0);
    }

    pub(crate) fn key_event(&self, key: u8, scancode: u8, down: bool, time: u32) {
        let key = generic_vk(key);
        let (message, lparam, pt) = {
            let mut st = self.lock();
            let was_down = st.input.press(key, down);
            let alt = st.input.is_down(vk::MENU);
            let ctrl = st.input.is_down(vk::CONTROL);
            let system = key == vk::MENU || (alt && !ctrl);
            let message = match (down, system) {
                (true, false) => WM_KEYDOWN,
                (true, true) => WM_SYSKEYDOWN,
                (false, false) => WM_KEYUP,
                (false, true) => WM_SYSKEYUP,
            };
            (message, make_key_lparam(scancode, down, was_down, alt), st.input.cursor)
        };
        self.hardware_event(message, key as usize, lparam, pt, time, 0);
    }

    pub(crate) fn set_focus(&self, hwnd: HWND) -> HWND {
        let old_focus = {
            let mut st = self.lock();
            let old = st.input.focus;
            if old == hwnd {
                return old;
            }
            st.input.focus = hwnd;
            old
        };

        // Send kill focus to old window
        if old_focus.is_valid() {
            self.post_message(old_focus, WM_KILLFOCUS, hwnd.raw() as usize, 0);
        }
        // Send set focus to new window
        if hwnd.is_valid() {
            self.post_message(hwnd, WM_SETFOCUS, old_focus.raw() as usize, 0);
        }
        debug!("[USER/Input] Focus {} -> {}", old_focus, hwnd);
        old_focus
    }

    pub(crate) fn set_active_window(&self, hwnd: HWND) -> HWND {
        let old_active = {
            let mut st = self.lock();
            let old = st.input.active;
            if old == hwnd {
                return old;
            }
            st.input.active = hwnd;
            old
        };

        if hwnd.is_valid() {
            self.post_message(hwnd, WM_ACTIVATE, WA_ACTIVE, old_active.raw() as isize);
        }
        if old_active.is_valid() {
            self.post_message(old_active, WM_ACTIVATE, WA_INACTIVE, hwnd.raw() as isize);
        }
        old_active
    }

    pub(crate) fn set_capture(&self, hwnd: HWND) -> HWND {
        let mut st = self.lock();
        let old_capture = st.input.capture;
        st.input.capture = hwnd;
        st.input.capture_hit = HTCLIENT;
        old_capture
    }

    pub(crate) fn release_capture(&self) -> bool {
        let mut st = self.lock();
        if st.input.capture.is_valid() {
            st.input.capture = HWND::NULL;
            true
        } else {
            false
        }
    }
}

// ============================================================================
// Translation
// ============================================================================

/// Result of translating one hardware entry for the peeking task
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum HardwareStatus {
    /// Deliver this message
    Accept(Message),
    /// Drop the entry (eaten or vetoed)
    Skip { hwnd: HWND, hit_test: i16 },
    /// Not for this peek; look further down the queue
    Continue,
    /// Belongs to another task; stop and let it run
    Abandon,
}

impl Task {
    /// Hand an event over to the task owning its target window. Returns
    /// `None` when this task should keep the event.
    fn abandon_to_owner(&self, owner: Option<TaskId>, bit: QueueStatus) -> Option<HardwareStatus> {
        let owner = owner.filter(|&t| t != self.id())?;
        let mut st = self.shared.lock();
        if !st.is_alive(owner) {
            return Some(HardwareStatus::Skip { hwnd: HWND::NULL, hit_test: HTNOWHERE });
        }
        if let Some(queue) = st.queue_mut(self.id()) {
            queue.clear_wake_bits(bit);
        }
        self.shared.wake(&mut st, owner, bit);
        Some(HardwareStatus::Abandon)
    }

    fn out_of_scope(&self, scope: HWND, hwnd: HWND) -> bool {
        scope.is_valid() && hwnd != scope && !self.env().windows.is_child(scope, hwnd)
    }

    pub(crate) fn translate_mouse(
        &self,
        scope: HWND,
        range: MessageRange,
        raw: &Message,
        remove: bool,
    ) -> HardwareStatus {
        let env = self.env();
        let dir = &env.windows;
        let mouse_click = is_button_down(raw.message);

        let (capture, capture_hit) = {
            let st = self.shared.lock();
            (st.input.capture, st.input.capture_hit)
        };
        let (hwnd, hit_test, mut send_sc) = if capture.is_valid() && dir.is_window(capture) {
            (capture, capture_hit, false)
        } else {
            let (hwnd, hit_test) = env.hit_test.window_from_point(raw.pt);
            let hwnd = if dir.is_window(hwnd) { hwnd } else { dir.desktop() };
            (hwnd, hit_test, true)
        };
        let Some(info) = dir.window_info(hwnd) else {
            return HardwareStatus::Skip { hwnd, hit_test: HTERROR };
        };

        if let Some(status) = self.abandon_to_owner(info.owner, QueueStatus::MOUSE) {
            return status;
        }
        if self.out_of_scope(scope, hwnd) {
            return HardwareStatus::Continue;
        }

        let mut message = raw.message;
        let mut double_click = false;
        if mouse_click && (info.class_style.contains(ClassStyle::DBLCLKS) || hit_test != HTCLIENT) {
            let st = self.shared.lock();
            if st.input.dblclk.is_double_click(
                message,
                hwnd,
                raw.pt,
                raw.time,
                st.input.double_click_time,
                st.input.double_click_size,
            ) {
                message += WM_LBUTTONDBLCLK - WM_LBUTTONDOWN;
                double_click = true;
            }
        }

        let mut wparam = raw.wparam;
        let mut pt = raw.pt;
        if hit_test != HTCLIENT {
            message -= WM_MOUSEMOVE - WM_NCMOUSEMOVE;
            wparam = hit_test as u16 as usize;
        } else {
            pt = env.coords.screen_to_client(hwnd, pt);
        }

        if !range.contains(message) {
            return HardwareStatus::Continue;
        }

        if self.is_hooked(HookKind::Mouse) {
            let mut info = MouseHookInfo { pt: raw.pt, hwnd, hit_test, extra_info: 0 };
            let code = if remove { HC_ACTION } else { HC_NOREMOVE };
            match self.call_hooks(HookKind::Mouse, code, message as usize, &mut HookPayload::Mouse(&mut info)) {
                Verdict::Continue => {}
                Verdict::Veto => return HardwareStatus::Skip { hwnd, hit_test },
                Verdict::VetoWithCode(code) => {
                    return HardwareStatus::Skip { hwnd, hit_test: code as i16 }
                }
            }
        }

        let mut eat = false;
        if hit_test == HTERROR || hit_test == HTNOWHERE {
            eat = true;
            send_sc = true;
        } else if remove && mouse_click {
            {
                let mut st = self.shared.lock();
                if double_click {
                    st.input.dblclk.reset();
                } else {
                    st.input.dblclk.record(raw.message, hwnd, raw.pt, raw.time);
                }
            }

            if send_sc {
                self.send_parent_notify(hwnd, raw.message, raw.pt);

                let active = self.active_window();
                if hwnd != active && hwnd != dir.desktop() {
                    let top = dir.top_level(hwnd);
                    let ret = self.send_message(
                        hwnd,
                        WM_MOUSEACTIVATE,
                        top.raw() as usize,
                        make_long(hit_test as u16, raw.message as u16),
                    );
                    if ret == MA_ACTIVATEANDEAT || ret == MA_NOACTIVATEANDEAT {
                        eat = true;
                    }
                    if (ret == MA_ACTIVATE || ret == MA_ACTIVATEANDEAT)
                        && top != self.active_window()
                        && !self.activate_on_click(top)
                    {
                        eat = true;
                    }
                }
            }
        } else {
            send_sc = remove && send_sc;
        }

        if send_sc {
            self.send_message(
                hwnd,
                WM_SETCURSOR,
                hwnd.raw() as usize,
                make_long(hit_test as u16, raw.message as u16),
            );
        }
        if eat {
            return HardwareStatus::Skip { hwnd, hit_test };
        }

        HardwareStatus::Accept(Message {
            hwnd,
            message,
            wparam,
            lparam: point_to_lparam(pt),
            time: raw.time,
            pt: raw.pt,
        })
    }

    /// WM_PARENTNOTIFY up the chain of child windows
    fn send_parent_notify(&self, hwnd: HWND, event: u32, screen_pt: Point) {
        let env = self.env();
        let mut current = hwnd;
        while let Some(info) = env.windows.window_info(current) {
            if !info.style.contains(WindowStyle::CHILD)
                || info.ex_style.contains(WindowStyleEx::NOPARENTNOTIFY)
                || !info.parent.is_valid()
            {
                break;
            }
            let parent = info.parent;
            let pt = env.coords.screen_to_client(parent, screen_pt);
            self.send_message(parent, WM_PARENTNOTIFY, event as usize, point_to_lparam(pt));
            current = parent;
        }
    }

    /// Activate a top-level window after a click; false when a CBT hook
    /// refused the activation
    fn activate_on_click(&self, top: HWND) -> bool {
        if self.is_hooked(HookKind::Cbt)
            && self
                .call_hooks(HookKind::Cbt, HCBT_ACTIVATE, top.raw() as usize, &mut HookPayload::Window(top))
                .is_veto()
        {
            debug!("[USER/Input] Activation of {} vetoed", top);
            return false;
        }

        let dir = &self.env().windows;
        let (previous, move_focus) = {
            let mut st = self.shared.lock();
            let previous = st.input.active;
            st.input.active = top;
            let focus = st.input.focus;
            (previous, focus != top && !dir.is_child(top, focus))
        };
        if move_focus {
            self.shared.set_focus(top);
        }
        if previous.is_valid() && previous != top {
            self.shared.post_message(previous, WM_ACTIVATE, WA_INACTIVE, top.raw() as isize);
        }
        self.send_message(top, WM_ACTIVATE, WA_CLICKACTIVE, previous.raw() as isize);
        true
    }

    pub(crate) fn translate_keyboard(
        &self,
        scope: HWND,
        range: MessageRange,
        raw: &Message,
        remove: bool,
    ) -> HardwareStatus {
        let (focus, active) = {
            let st = self.shared.lock();
            (st.input.focus, st.input.active)
        };

        let mut message = raw.message;
        let hwnd = if focus.is_valid() {
            focus
        } else {
            // no focus: the active window gets the key as a system key
            if message < WM_SYSKEYDOWN {
                message += WM_SYSKEYDOWN - WM_KEYDOWN;
            }
            active
        };

        if let Some(status) = self.abandon_to_owner(self.env().windows.owner(hwnd), QueueStatus::KEY) {
            return status;
        }
        if self.out_of_scope(scope, hwnd) || !range.contains(message) {
            return HardwareStatus::Continue;
        }

        let code = if remove { HC_ACTION } else { HC_NOREMOVE };
        if self
            .call_hooks(HookKind::Keyboard, code, raw.wparam, &mut HookPayload::KeyData(raw.lparam))
            .is_veto()
        {
            return HardwareStatus::Skip { hwnd, hit_test: 0 };
        }

        HardwareStatus::Accept(Message { hwnd, message, ..*raw })
    }

    /// Translate hardware entries in order and return the first accepted
    /// one with its extra info
    pub(crate) fn peek_hardware(
        &self,
        scope: HWND,
        range: MessageRange,
        remove: bool,
    ) -> Option<(Message, u32)> {
        let mut pos = 0;
        loop {
            let entry = self.shared.lock().hardware.get(pos)?;
            let raw = entry.msg;
            let keyboard = is_key_message(raw.message);

            let status = if is_mouse_message(raw.message) {
                self.translate_mouse(scope, range, &raw, remove)
            } else if keyboard {
                self.translate_keyboard(scope, range, &raw, remove)
            } else {
                let mut hook = HookMessage {
                    hwnd: raw.hwnd,
                    message: raw.message,
                    wparam: raw.wparam,
                    lparam: raw.lparam,
                };
                let code = if remove { HC_ACTION } else { HC_NOREMOVE };
                if self
                    .call_hooks(HookKind::Hardware, code, 0, &mut HookPayload::Call(&mut hook))
                    .is_veto()
                {
                    self.shared.lock().hardware.remove_seq(entry.seq);
                    continue;
                }
                HardwareStatus::Accept(Message {
                    hwnd: hook.hwnd,
                    message: hook.message,
                    wparam: hook.wparam,
                    lparam: hook.lparam,
                    ..raw
                })
            };

            match status {
                HardwareStatus::Accept(msg) => {
                    if remove {
                        self.journal_record(&msg);
                        self.shared.lock().hardware.remove_seq(entry.seq);
                    }
                    return Some((msg, entry.extra_info));
                }
                HardwareStatus::Skip { hwnd, hit_test } => {
                    if self.is_hooked(HookKind::Cbt) {
                        if keyboard {
                            self.call_hooks(
                                HookKind::Cbt,
                                HCBT_KEYSKIPPED,
                                raw.wparam,
                                &mut HookPayload::KeyData(raw.lparam),
                            );
                        } else {
                            let mut info = MouseHookInfo {
                                pt: raw.pt,
                                hwnd,
                                hit_test,
                                extra_info: entry.extra_info,
                            };
                            self.call_hooks(
                                HookKind::Cbt,
                                HCBT_CLICKSKIPPED,
                                raw.message as usize,
                                &mut HookPayload::Mouse(&mut info),
                            );
                        }
                    }
                    if remove {
                        self.shared.lock().hardware.remove_seq(entry.seq);
                    } else {
                        pos += 1;
                    }
                }
                HardwareStatus::Continue => pos += 1,
                HardwareStatus::Abandon => return None,
            }
        }
    }

    // ========================================================================
    // Journaling
    // ========================================================================

    /// Report a removed input message to the journal recorder
    fn journal_record(&self, msg: &Message) {
        if !self.is_hooked(HookKind::JournalRecord) {
            return;
        }
        let mut event = EventMsg {
            message: msg.message,
            time: msg.time,
            hwnd: msg.hwnd,
            ..Default::default()
        };
        if msg.is_key() {
            let data = hiword(msg.lparam) as u32;
            event.param_l = (msg.wparam as u32 & 0xFF) | (data << 8);
            event.param_h = loword(msg.lparam) as u32 & 0x7FFF;
            if data & 0x0100 != 0 {
                event.param_h |= 0x8000;
            }
        } else {
            // recorded as client-area codes at screen positions
            if (WM_NCMOUSEMOVE..=WM_NCMBUTTONDBLCLK).contains(&msg.message) {
                event.message += WM_MOUSEMOVE - WM_NCMOUSEMOVE;
            }
            event.param_l = msg.pt.x as u32;
            event.param_h = msg.pt.y as u32;
        }
        self.call_hooks(HookKind::JournalRecord, HC_ACTION, 0, &mut HookPayload::Event(&mut event));
    }

    /// Pull the next event from a playback hook. Returns the input bits to
    /// wait on while the hook says the event is not yet due.
    pub(crate) fn journal_playback(&self) -> QueueStatus {
        if !self.is_hooked(HookKind::JournalPlayback) {
            if let Some(queue) = self.shared.lock().queue_mut(self.id()) {
                queue.playback_wait = QueueStatus::empty();
            }
            return QueueStatus::empty();
        }

        let mut request = PlaybackRequest::default();
        self.call_hooks(HookKind::JournalPlayback, HC_GETNEXT, 0, &mut HookPayload::Playback(&mut request));

        let held = if request.wait > 0 {
            QueueStatus::MOUSE | QueueStatus::KEY
        } else {
            QueueStatus::empty()
        };
        if let Some(queue) = self.shared.lock().queue_mut(self.id()) {
            queue.playback_wait = held;
        }
        if !held.is_empty() {
            if request.event.message == WM_QUEUESYNC && self.is_hooked(HookKind::Cbt) {
                self.call_hooks(HookKind::Cbt, HCBT_QS, 0, &mut HookPayload::None);
            }
            return held;
        }

        let event = request.event;
        if is_key_message(event.message) {
            let key = (event.param_l & 0xFF) as u8;
            let mut data = ((event.param_h & 0x7FFF) | ((event.param_l >> 8) << 16)) as u32;
            {
                let mut st = self.shared.lock();
                let down = matches!(event.message, WM_KEYDOWN | WM_SYSKEYDOWN);
                let was_down = st.input.press(key, down);
                if down {
                    if was_down {
                        data |= 0x4000_0000;
                    }
                } else {
                    data |= 0xC000_0000;
                }
                if st.input.is_down(vk::MENU) {
                    data |= 0x2000_0000;
                }
            }
            if event.param_h & 0x8000 != 0 {
                data |= 0x0100_0000;
            }
            let pt = self.cursor_pos();
            self.shared
                .hardware_event(event.message, key as usize, data as isize, pt, event.time, 0);
        } else if is_mouse_message(event.message) {
            let pt = Point::new(event.param_l as i32, event.param_h as i32);
            let wparam = {
                let mut st = self.shared.lock();
                match event.message {
                    WM_LBUTTONDOWN => { st.input.press(vk::LBUTTON, true); }
                    WM_LBUTTONUP => { st.input.press(vk::LBUTTON, false); }
                    WM_RBUTTONDOWN => { st.input.press(vk::RBUTTON, true); }
                    WM_RBUTTONUP => { st.input.press(vk::RBUTTON, false); }
                    WM_MBUTTONDOWN => { st.input.press(vk::MBUTTON, true); }
                    WM_MBUTTONUP => { st.input.press(vk::MBUTTON, false); }
                    _ => {}
                }
                st.input.mouse_key_flags()
            };
            self.shared
                .hardware_event(event.message, wparam, point_to_lparam(pt), pt, event.time, 0);
        } else {
            debug!("[USER/Input] Ignoring played back message {:#x}", event.message);
        }

        self.call_hooks(HookKind::JournalPlayback, HC_SKIP, 0, &mut HookPayload::Playback(&mut request));
        QueueStatus::empty()
    }

    // ========================================================================
    // State accessors
    // ========================================================================

    pub fn focus(&self) -> HWND {
        self.shared.lock().input.focus
    }

    pub fn set_focus(&self, hwnd: HWND) -> HWND {
        self.shared.set_focus(hwnd)
    }

    pub fn active_window(&self) -> HWND {
        self.shared.lock().input.active
    }

    pub fn set_active_window(&self, hwnd: HWND) -> HWND {
        self.shared.set_active_window(hwnd)
    }

    pub fn capture(&self) -> HWND {
        self.shared.lock().input.capture
    }

    pub fn set_capture(&self, hwnd: HWND) -> HWND {
        self.shared.set_capture(hwnd)
    }

    pub fn release_capture(&self) -> bool {
        self.shared.release_capture()
    }

    pub fn cursor_pos(&self) -> Point {
        self.shared.lock().input.cursor
    }

    /// Key state as of the last message this task removed: bit 15 down,
    /// bit 0 toggled
    pub fn get_key_state(&self, key: u8) -> i16 {
        let st = self.shared.lock();
        let value = st.queue(self.id()).map_or(0, |q| q.key_state[key as usize]);
        key_state_word(value)
    }

    /// Physical key state right now
    pub fn get_async_key_state(&self, key: u8) -> i16 {
        key_state_word(self.shared.lock().input.keys[key as usize])
    }

    /// Time of the last message retrieved
    pub fn message_time(&self) -> u32 {
        self.shared.lock().queue(self.id()).map_or(0, |q| q.last_time)
    }

    /// Cursor position of the last message retrieved
    pub fn message_pos(&self) -> Point {
        self.shared.lock().queue(self.id()).map_or(Point::default(), |q| q.last_pos)
    }

    pub fn message_extra_info(&self) -> u32 {
        self.shared.lock().queue(self.id()).map_or(0, |q| q.last_extra)
    }

    pub fn double_click_time(&self) -> u32 {
        self.shared.lock().input.double_click_time
    }
}

fn key_state_word(value: u8) -> i16 {
    let mut result: i16 = 0;
    if value & 0x80 != 0 {
        result |= 0x8000u16 as i16;
    }
    if value & 0x01 != 0 {
        result |= 1;
    }
    result
}

// ============================================================================
// Host input API
// ============================================================================

impl System {
    /// Queue a raw hardware event stamped with the current tick
    pub fn hardware_event(&self, message: u32, wparam: usize, lparam: isize, pt: Point, extra_info: u32) {
        let time = self.tick_count();
        self.shared().hardware_event(message, wparam, lparam, pt, time, extra_info);
    }

    /// Button or move event at a screen point
    pub fn mouse_event(&self, message: u32, pt: Point) {
        let time = self.tick_count();
        self.shared().mouse_event(message, pt, time);
    }

    /// Key transition for a virtual key
    pub fn key_event(&self, key: u8, scancode: u8, down: bool) {
        let time = self.tick_count();
        self.shared().key_event(key, scancode, down, time);
    }

    /// Key transition from a set-1 keyboard scancode
    pub fn scancode_event(&self, scancode: u8, pressed: bool) {
        let key = scancode_to_vk(scancode);
        if key == 0 {
            trace!("[USER/Input] Unmapped scancode {:#x}", scancode);
            return;
        }
        self.key_event(key, scancode, pressed);
    }

    pub fn focus(&self) -> HWND {
        self.shared().lock().input.focus
    }

    pub fn set_focus(&self, hwnd: HWND) -> HWND {
        self.shared().set_focus(hwnd)
    }

    pub fn active_window(&self) -> HWND {
        self.shared().lock().input.active
    }

    pub fn set_active_window(&self, hwnd: HWND) -> HWND {
        self.shared().set_active_window(hwnd)
    }

    pub fn capture(&self) -> HWND {
        self.shared().lock().input.capture
    }

    pub fn set_capture(&self, hwnd: HWND) -> HWND {
        self.shared().set_capture(hwnd)
    }

    pub fn release_capture(&self) -> bool {
        self.shared().release_capture()
    }

    pub fn cursor_pos(&self) -> Point {
        self.shared().lock().input.cursor
    }

    pub fn get_async_key_state(&self, key: u8) -> i16 {
        key_state_word(self.shared().lock().input.keys[key as usize])
    }

    pub fn double_click_time(&self) -> u32 {
        self.shared().lock().input.double_click_time
    }

    pub fn set_double_click_time(&self, ms: u32) {
        let ms = if ms == 0 { self.shared().config.double_click_time } else { ms };
        self.shared().lock().input.double_click_time = ms;
    }

    pub fn hardware_queue_len(&self) -> usize {
        self.shared().lock().hardware.len()
    }
}
