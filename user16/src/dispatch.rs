//! Message Retrieval and Dispatch
//!
//! The retrieval loop looks at a task's message sources in a fixed order:
//!
//! 1. Incoming sends (always drained completely)
//! 2. A posted quit
//! 3. Posted messages
//! 4. Journal playback, then the hardware queue
//! 5. Incoming sends again
//! 6. Windows needing paint
//! 7. Due timers (after yielding, unless told not to)
//!
//! A blocking retrieval that finds nothing parks the task until a source
//! it is interested in changes.

use log::{trace, warn};

use crate::hooks::{HookKind, HookPayload, HC_ACTION};
use crate::keyboard::ToAscii;
use crate::message::{
    hiword, Message, MessageRange, PeekFlags, QueueStatus, WindowFilter, WM_CHAR, WM_DEADCHAR,
    WM_ENTERIDLE, WM_KEYDOWN, WM_PAINT, WM_PAINTICON, WM_QUIT, WM_SYSCHAR, WM_SYSDEADCHAR,
    WM_SYSKEYDOWN, WM_SYSTIMER, WM_TIMER,
};
use crate::sched::Task;
use crate::HWND;

impl Task {
    /// Bookkeeping for a message handed to the application
    fn deliver(&self, msg: Message, extra_info: u32, remove: bool) -> Message {
        let mut st = self.shared.lock();
        if let Some(queue) = st.queue_mut(self.id()) {
            queue.record_last(&msg, extra_info);
            if remove {
                queue.update_key_state(msg.message, msg.wparam);
            }
        }
        trace!("[USER/Msg] {} got {:#x} for {}", self.id(), msg.message, msg.hwnd);
        msg
    }

    fn quit_message(&self, exit_code: i32) -> Message {
        let now = self.tick_count();
        let pt = self.cursor_pos();
        Message::new(HWND::NULL, WM_QUIT, exit_code as usize, 0).at(now, pt)
    }

    /// Core retrieval loop. Returns `None` only when not `blocking` and no
    /// source has a matching message.
    fn peek_or_get(
        &self,
        filter: WindowFilter,
        range: MessageRange,
        flags: PeekFlags,
        blocking: bool,
    ) -> Option<Message> {
        let me = self.id();
        let remove = flags.contains(PeekFlags::REMOVE);
        let mask = range.interest_mask();
        let scope = filter.scope();
        let env = self.env();

        loop {
            {
                let mut st = self.shared.lock();
                let queue = st.queue_mut(me)?;
                queue.change_bits = QueueStatus::empty();
            }

            self.drain_sends();

            {
                let mut st = self.shared.lock();
                let queue = st.queue_mut(me)?;

                if let Some(code) = queue.quit.filter(|_| range.contains(WM_QUIT)) {
                    if remove {
                        queue.take_quit();
                    }
                    drop(st);
                    let msg = self.quit_message(code);
                    return Some(self.deliver(msg, 0, remove));
                }

                if queue.wake_bits.intersects(mask & QueueStatus::POSTMESSAGE) {
                    let found = queue.find_first_matching(filter, range).and_then(|pos| {
                        if remove {
                            queue.dequeue_at(pos)
                        } else {
                            queue.messages.get(pos).copied()
                        }
                    });
                    if let Some(entry) = found {
                        drop(st);
                        return Some(self.deliver(entry.msg, entry.extra_info, remove));
                    }
                }
            }

            // a playback event not yet due holds back the hardware queue
            let playback_wait = self.journal_playback();

            if let Some(scope) = scope {
                let input_pending = self
                    .shared
                    .lock()
                    .queue(me)
                    .is_some_and(|q| q.wake_bits.intersects(mask & QueueStatus::INPUT));
                if playback_wait.is_empty() && input_pending {
                    if let Some((msg, extra_info)) = self.peek_hardware(scope, range, remove) {
                        return Some(self.deliver(msg, extra_info, remove));
                    }
                }
            }

            self.drain_sends();

            let paint_scope = scope.filter(|_| mask.contains(QueueStatus::PAINT));
            if let Some(scope) = paint_scope {
                match env.paint.find_window_to_repaint(scope, me) {
                    Some(target) => {
                        let (code, wparam) = if target.iconic { (WM_PAINTICON, 1) } else { (WM_PAINT, 0) };
                        if range.contains(code) {
                            if target.internal_only {
                                env.paint.clear_internal_paint(target.hwnd);
                            }
                            let msg = Message::new(target.hwnd, code, wparam, 0)
                                .at(self.tick_count(), self.cursor_pos());
                            return Some(self.deliver(msg, 0, remove));
                        }
                    }
                    None if !scope.is_valid() => {
                        if let Some(queue) = self.shared.lock().queue_mut(me) {
                            queue.wake_bits.remove(QueueStatus::PAINT);
                        }
                    }
                    None => {}
                }
            }

            if !flags.contains(PeekFlags::NOYIELD) {
                self.yield_now();
                self.drain_sends();
            }

            if mask.contains(QueueStatus::TIMER)
                && (range.contains(WM_TIMER) || range.contains(WM_SYSTIMER))
            {
                let now = self.tick_count();
                match env.timers.timer_message(filter, me, remove, now) {
                    Some(msg) => {
                        let msg = Message { pt: self.cursor_pos(), ..msg };
                        return Some(self.deliver(msg, 0, remove));
                    }
                    None => {
                        if !env.timers.has_due_timer(me, now) {
                            if let Some(queue) = self.shared.lock().queue_mut(me) {
                                queue.wake_bits.remove(QueueStatus::TIMER);
                            }
                        }
                    }
                }
            }

            if !blocking {
                return None;
            }
            if self.is_doomed() {
                trace!("[USER/Msg] {} doomed, returning WM_QUIT", me);
                let msg = self.quit_message(0);
                return Some(self.deliver(msg, 0, remove));
            }
            self.wait_bits(mask);
        }
    }

    /// Blocking retrieval that always yields a message
    fn next_message(&self, filter: WindowFilter, range: MessageRange, flags: PeekFlags) -> Message {
        self.peek_or_get(filter, range, flags, true)
            .unwrap_or_else(|| self.quit_message(0))
    }

    /// Look for a message without blocking (PeekMessage)
    pub fn peek_message(&self, filter: WindowFilter, range: MessageRange, flags: PeekFlags) -> Option<Message> {
        self.peek_or_get(filter, range, flags, false)
    }

    /// Run the system then application message filters. True when a
    /// filter vetoed the message.
    pub fn call_msg_filter(&self, msg: &mut Message, code: i32) -> bool {
        for kind in [HookKind::SysMsgFilter, HookKind::MsgFilter] {
            if self.is_hooked(kind)
                && self
                    .call_hooks(kind, code, 0, &mut HookPayload::Message(&mut *msg))
                    .is_veto()
            {
                trace!("[USER/Msg] Filter {} vetoed {:#x}", kind.id(), msg.message);
                return true;
            }
        }
        false
    }

    /// Wait for and remove the next message (GetMessage). Check
    /// `is_quit()` on the result to end a message loop.
    ///
    /// A message vetoed by a filter hook is discarded and retrieval starts
    /// over, so a filter that vetoes everything keeps this call from
    /// returning.
    pub fn get_message(&self, filter: WindowFilter, range: MessageRange) -> Message {
        loop {
            let mut msg = self.next_message(filter, range, PeekFlags::REMOVE);
            if self.call_msg_filter(&mut msg, HC_ACTION) {
                continue;
            }
            if self.is_hooked(HookKind::GetMessage) {
                self.call_hooks(HookKind::GetMessage, HC_ACTION, 0, &mut HookPayload::Message(&mut msg));
            }
            return msg;
        }
    }

    /// Retrieval loop of dialogs and menus. Filters run with `code` (a
    /// `MSGF_*` value). With `send_idle`, the `owner` window is sent
    /// WM_ENTERIDLE each time the queue runs dry.
    pub fn internal_get_message(
        &self,
        hwnd: HWND,
        owner: HWND,
        code: i32,
        flags: PeekFlags,
        send_idle: bool,
    ) -> Message {
        let filter = WindowFilter::All;
        let range = MessageRange::ALL;
        loop {
            let pending = if send_idle {
                self.peek_or_get(filter, range, flags, false)
            } else {
                None
            };
            let mut msg = match pending {
                Some(msg) => msg,
                None => {
                    if send_idle && owner.is_valid() {
                        self.send_message(owner, WM_ENTERIDLE, code as usize, hwnd.raw() as isize);
                    }
                    self.next_message(filter, range, flags)
                }
            };

            if self.call_msg_filter(&mut msg, code) {
                if !flags.contains(PeekFlags::REMOVE) {
                    self.peek_or_get(
                        filter,
                        MessageRange::only(msg.message),
                        PeekFlags::REMOVE | PeekFlags::NOYIELD,
                        false,
                    );
                }
                continue;
            }
            return msg;
        }
    }

    /// Block until the queue has something to retrieve (WaitMessage)
    pub fn wait_message(&self) {
        {
            let mut st = self.shared.lock();
            let Some(queue) = st.queue_mut(self.id()) else {
                return;
            };
            if !queue.messages.is_empty()
                || queue.quit.is_some()
                || queue
                    .wake_bits
                    .intersects(QueueStatus::SENDMESSAGE | QueueStatus::PAINT)
            {
                return;
            }
            queue.change_bits = QueueStatus::empty();
        }
        self.wait_bits(QueueStatus::ALLINPUT);
    }

    /// Post the character message a key press produces (TranslateMessage).
    /// A dead key is held and combined with the next character.
    pub fn translate_message(&self, msg: &Message) -> bool {
        let system = match msg.message {
            WM_KEYDOWN => false,
            WM_SYSKEYDOWN => true,
            _ => return false,
        };

        let state = match self.shared.lock().queue(self.id()) {
            Some(queue) => queue.key_state,
            None => return false,
        };
        let scancode = hiword(msg.lparam) & 0xFF;
        let translated = self
            .env()
            .keyboard
            .to_ascii(msg.wparam as u8, scancode, &state);

        match translated {
            ToAscii::None => false,
            ToAscii::Char(c) => {
                let dead = std::mem::take(&mut self.shared.lock().input.dead_char);
                let ch = match dead {
                    0 => c,
                    _ if c == b' ' => dead,
                    _ => self.shared.accents.compose(dead, c).unwrap_or(c),
                };
                let code = if system { WM_SYSCHAR } else { WM_CHAR };
                trace!("[USER/Msg] Translated key {:#x} to char {:#x}", msg.wparam, ch);
                self.post_message(msg.hwnd, code, ch as usize, msg.lparam);
                true
            }
            ToAscii::Dead(accent) => {
                self.shared.lock().input.dead_char = accent;
                let code = if system { WM_SYSDEADCHAR } else { WM_DEADCHAR };
                self.post_message(msg.hwnd, code, accent as usize, msg.lparam);
                true
            }
        }
    }

    /// Deliver a retrieved message to its window procedure, or to the timer
    /// callback it names (DispatchMessage)
    pub fn dispatch_message(&self, msg: &Message) -> isize {
        let env = self.env();

        if (msg.message == WM_TIMER || msg.message == WM_SYSTIMER) && msg.lparam != 0 {
            return env
                .timers
                .call_timer_proc(self, msg, self.tick_count())
                .unwrap_or(0);
        }

        if !msg.hwnd.is_valid() || !env.windows.is_window(msg.hwnd) {
            return 0;
        }

        let painting = msg.message == WM_PAINT;
        if painting {
            env.paint.begin_paint_dispatch(msg.hwnd);
        }
        let result = env
            .procs
            .call_window_proc(self, msg.hwnd, msg.message, msg.wparam, msg.lparam);

        if painting && !env.paint.paint_acknowledged(msg.hwnd) {
            warn!(
                "[USER/Msg] BeginPaint not called on WM_PAINT for {}, validating",
                msg.hwnd
            );
            env.paint.force_validate(msg.hwnd);
        }
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::env::Env;
    use crate::hooks::{HookScope, Verdict, MSGF_DIALOGBOX, MSGF_MENU};
    use crate::input::vk;
    use crate::keyboard::UsInternational;
    use crate::message::{WM_KEYUP, WM_USER};
    use crate::testing::{self, Recorder};
    use crate::timer::TimerTable;
    use crate::window::{WindowDesc, WindowStyle, WindowTable};
    use crate::{Point, Rect, System, SystemConfig};
    use parking_lot::Mutex;
    use std::sync::Arc;

    #[test]
    fn post_get_round_trip() {
        let (sys, windows, _) = testing::manual_system();
        let got = Arc::new(Mutex::new(None));
        let g = got.clone();
        let hwnd_cell = Arc::new(Mutex::new(HWND::NULL));
        let h = hwnd_cell.clone();
        let id = sys
            .spawn("roundtrip", move |task| {
                let hwnd = *h.lock();
                task.post_message(hwnd, WM_USER, 12, -34);
                *g.lock() = Some(task.get_message(WindowFilter::All, MessageRange::ALL));
                0
            })
            .unwrap();
        let hwnd = windows.create_window(WindowDesc::top_level(id, Rect::new(0, 0, 10, 10)));
        *hwnd_cell.lock() = hwnd;
        sys.mouse_event(crate::message::WM_MOUSEMOVE, Point::new(300, 300));
        sys.advance_clock(25);
        assert_eq!(sys.join(id), Some(0));

        let msg = got.lock().unwrap();
        assert_eq!((msg.hwnd, msg.message, msg.wparam, msg.lparam), (hwnd, WM_USER, 12, -34));
        assert_eq!(msg.time, 25);
        assert_eq!(msg.pt, Point::new(300, 300));
    }

    #[test]
    fn fifo_per_window_filter() {
        let (sys, windows, _) = testing::manual_system();
        let order = Arc::new(Mutex::new(Vec::new()));
        let o = order.clone();
        let pair = Arc::new(Mutex::new((HWND::NULL, HWND::NULL)));
        let p = pair.clone();
        let id = sys
            .spawn("fifo", move |task| {
                let (w1, w2) = *p.lock();
                for (hwnd, n) in [(w1, 1), (w2, 2), (w1, 3), (w2, 4)] {
                    task.post_message(hwnd, WM_USER, n, 0);
                }
                for _ in 0..2 {
                    o.lock().push(task.get_message(WindowFilter::Window(w2), MessageRange::ALL).wparam);
                }
                for _ in 0..2 {
                    o.lock().push(task.get_message(WindowFilter::All, MessageRange::ALL).wparam);
                }
                0
            })
            .unwrap();
        let w1 = windows.create_window(WindowDesc::top_level(id, Rect::new(0, 0, 10, 10)));
        let w2 = windows.create_window(WindowDesc::top_level(id, Rect::new(20, 0, 30, 10)));
        *pair.lock() = (w1, w2);
        assert_eq!(sys.join(id), Some(0));
        assert_eq!(*order.lock(), vec![2, 4, 1, 3]);
    }

    #[test]
    fn peek_without_remove_is_idempotent() {
        let (sys, _, _) = testing::manual_system();
        let ok = Arc::new(Mutex::new(false));
        let k = ok.clone();
        let id = sys
            .spawn("peek", move |task| {
                task.post_message(HWND::NULL, WM_USER, 1, 0);
                task.post_message(HWND::NULL, WM_USER, 2, 0);
                let before = task.queue_snapshot();
                let first = task.peek_message(WindowFilter::All, MessageRange::ALL, PeekFlags::NOREMOVE);
                let second = task.peek_message(WindowFilter::All, MessageRange::ALL, PeekFlags::NOREMOVE);
                let after = task.queue_snapshot();
                *k.lock() = first.is_some()
                    && first == second
                    && first.map(|m| m.wparam) == Some(1)
                    && before.len == after.len
                    && before.wake_bits == after.wake_bits;
                0
            })
            .unwrap();
        assert_eq!(sys.join(id), Some(0));
        assert!(*ok.lock());
    }

    #[test]
    fn quit_precedes_posted_unless_filtered() {
        let (sys, _, _) = testing::manual_system();
        let seen = Arc::new(Mutex::new(Vec::new()));
        let s = seen.clone();
        let id = sys
            .spawn("quit", move |task| {
                task.post_message(HWND::NULL, WM_USER, 0, 0);
                task.post_quit_message(7);
                let user = task.get_message(WindowFilter::All, MessageRange::only(WM_USER));
                s.lock().push((user.message, user.wparam));
                let peeked = task.peek_message(WindowFilter::All, MessageRange::ALL, PeekFlags::NOREMOVE);
                s.lock().push(peeked.map_or((0, 0), |m| (m.message, m.wparam)));
                let quit = task.get_message(WindowFilter::All, MessageRange::ALL);
                s.lock().push((quit.message, quit.wparam));
                let rest = task.peek_message(WindowFilter::All, MessageRange::ALL, PeekFlags::REMOVE);
                s.lock().push(rest.map_or((0, 0), |m| (m.message, m.wparam)));
                0
            })
            .unwrap();
        assert_eq!(sys.join(id), Some(0));
        assert_eq!(
            *seen.lock(),
            vec![(WM_USER, 0), (WM_QUIT, 7), (WM_QUIT, 7), (0, 0)]
        );
    }

    #[test]
    fn dead_key_composition() {
        let windows = Arc::new(WindowTable::new());
        let timers = Arc::new(TimerTable::new());
        let env = Env::new(windows.clone(), timers).with_keyboard(Arc::new(UsInternational));
        let sys = System::new(SystemConfig::manual(), env).unwrap();
        let rec = Recorder::new();
        let id = testing::spawn_pump(&sys, "intl");
        let hwnd = windows.create_window(WindowDesc::top_level(id, Rect::new(0, 0, 10, 10)));
        rec.attach(&windows, hwnd);
        sys.run_until_idle();
        sys.set_focus(hwnd);

        let tap = |key: u8, scan: u8| {
            sys.key_event(key, scan, true);
            sys.key_event(key, scan, false);
        };
        tap(vk::OEM_7, 0x28);
        tap(b'E', 0x12);
        tap(vk::OEM_7, 0x28);
        tap(vk::SPACE, 0x39);
        tap(b'X', 0x2D);
        sys.run_until_idle();

        let chars: Vec<(u32, usize)> = rec
            .messages()
            .into_iter()
            .filter(|m| m.message == WM_CHAR || m.message == WM_DEADCHAR)
            .map(|m| (m.message, m.wparam))
            .collect();
        assert_eq!(
            chars,
            vec![
                (WM_DEADCHAR, 0xB4),
                (WM_CHAR, 0xE9),
                (WM_DEADCHAR, 0xB4),
                (WM_CHAR, 0xB4),
                (WM_CHAR, b'x' as usize),
            ]
        );
    }

    #[test]
    fn only_key_downs_translate() {
        let (sys, _, _) = testing::manual_system();
        let results = Arc::new(Mutex::new(Vec::new()));
        let r = results.clone();
        let id = sys
            .spawn("translate", move |task| {
                let down = Message::new(HWND::NULL, WM_KEYDOWN, b'A' as usize, 0x001E_0001);
                let up = Message::new(HWND::NULL, WM_KEYUP, b'A' as usize, 0x001E_0001);
                let fkey = Message::new(HWND::NULL, WM_KEYDOWN, vk::F1 as usize, 0x003B_0001);
                r.lock().push(task.translate_message(&up));
                r.lock().push(task.translate_message(&fkey));
                r.lock().push(task.translate_message(&down));
                let ch = task.get_message(WindowFilter::All, MessageRange::ALL);
                r.lock().push(ch.message == WM_CHAR && ch.wparam == b'a' as usize);
                0
            })
            .unwrap();
        assert_eq!(sys.join(id), Some(0));
        assert_eq!(*results.lock(), vec![false, false, true, true]);
    }

    #[test]
    fn unacknowledged_paint_is_validated() {
        let (sys, windows, _) = testing::manual_system();
        let paints = Arc::new(Mutex::new(Vec::new()));
        let rec = Recorder::new();
        let id = testing::spawn_pump(&sys, "paint");
        let lazy = windows.create_window(WindowDesc::top_level(id, Rect::new(0, 0, 10, 10)));
        let icon = windows.create_window(
            WindowDesc::top_level(id, Rect::new(20, 0, 30, 10))
                .style(WindowStyle::VISIBLE | WindowStyle::MINIMIZE)
                .class_icon(),
        );
        let p = paints.clone();
        windows.set_window_proc(lazy, move |_, hwnd, msg, wparam, _| {
            if msg == WM_PAINT || msg == WM_PAINTICON {
                p.lock().push((hwnd, msg, wparam));
            }
            0
        });
        sys.run_until_idle();

        windows.invalidate(lazy);
        windows.invalidate(icon);
        sys.signal(id, QueueStatus::PAINT);
        sys.run_until_idle();

        // the icon uses the default procedure, which paints
        assert_eq!(*paints.lock(), vec![(lazy, WM_PAINT, 0)]);
        assert!(!windows.needs_paint(lazy));
        assert!(!windows.needs_paint(icon));

        windows.set_internal_paint(lazy);
        sys.signal(id, QueueStatus::PAINT);
        sys.run_until_idle();
        assert_eq!(paints.lock().len(), 2);
    }

    #[test]
    fn paint_icon_for_minimized_windows() {
        let (sys, windows, _) = testing::manual_system();
        let rec = Recorder::new();
        let id = testing::spawn_pump(&sys, "icon");
        let hwnd = windows.create_window(
            WindowDesc::top_level(id, Rect::new(0, 0, 10, 10))
                .style(WindowStyle::VISIBLE | WindowStyle::MINIMIZE)
                .class_icon(),
        );
        rec.attach(&windows, hwnd);
        sys.run_until_idle();

        windows.invalidate(hwnd);
        sys.signal(id, QueueStatus::PAINT);
        sys.run_until_idle();

        let icon = rec.messages().into_iter().find(|m| m.message == WM_PAINTICON);
        assert_eq!(icon.map(|m| m.wparam), Some(1));
        assert!(!rec.codes().contains(&WM_PAINT));
    }

    #[test]
    fn timer_callbacks_bypass_window_procedure() {
        let (sys, windows, timers) = testing::manual_system();
        let rec = Recorder::new();
        let id = testing::spawn_pump(&sys, "timers");
        let hwnd = windows.create_window(WindowDesc::top_level(id, Rect::new(0, 0, 10, 10)));
        rec.attach(&windows, hwnd);
        sys.run_until_idle();

        let fired = Arc::new(Mutex::new(Vec::new()));
        let f = fired.clone();
        timers.set_timer_proc(id, hwnd, 1, 50, sys.tick_count(), move |_, hwnd, msg, id, time| {
            f.lock().push((hwnd, msg, id, time));
            0
        });
        timers.set_timer(id, hwnd, 2, 80, sys.tick_count());

        sys.advance_clock(50);
        sys.run_until_idle();
        assert_eq!(*fired.lock(), vec![(hwnd, WM_TIMER, 1, 50)]);
        assert!(!rec.codes().contains(&WM_TIMER));

        sys.advance_clock(30);
        sys.run_until_idle();
        let ticks: Vec<usize> = rec
            .messages()
            .into_iter()
            .filter(|m| m.message == WM_TIMER)
            .map(|m| m.wparam)
            .collect();
        assert_eq!(ticks, vec![2]);
        assert_eq!(fired.lock().len(), 1);
    }

    #[test]
    fn message_filter_veto_discards() {
        let (sys, _, _) = testing::manual_system();
        let codes = Arc::new(Mutex::new(Vec::new()));
        let c = codes.clone();
        sys.install_hook(HookKind::MsgFilter, HookScope::Global, move |_, code, _, payload| {
            c.lock().push(code);
            match payload {
                HookPayload::Message(msg) if msg.message == WM_USER + 1 => Verdict::Veto,
                _ => Verdict::Continue,
            }
        });
        let results = Arc::new(Mutex::new(Vec::new()));
        let r = results.clone();
        let id = sys
            .spawn("dialog", move |task| {
                task.post_message(HWND::NULL, WM_USER + 1, 0, 0);
                task.post_message(HWND::NULL, WM_USER + 2, 0, 0);
                let msg = task.internal_get_message(
                    HWND::NULL,
                    HWND::NULL,
                    MSGF_DIALOGBOX,
                    PeekFlags::NOREMOVE,
                    false,
                );
                r.lock().push(msg.message);
                // still queued: it was only peeked
                r.lock().push(task.queue_snapshot().len as u32);
                0
            })
            .unwrap();
        assert_eq!(sys.join(id), Some(0));
        assert_eq!(*results.lock(), vec![WM_USER + 2, 1]);
        assert_eq!(*codes.lock(), vec![MSGF_DIALOGBOX, MSGF_DIALOGBOX]);
    }

    #[test]
    fn enter_idle_sent_when_dry() {
        let (sys, windows, _) = testing::manual_system();
        let idle = Arc::new(Mutex::new(Vec::new()));
        let i = idle.clone();
        let returned = Arc::new(Mutex::new(0));
        let r = returned.clone();
        let hwnds = Arc::new(Mutex::new((HWND::NULL, HWND::NULL)));
        let h = hwnds.clone();
        let id = sys
            .spawn("menu", move |task| {
                let (menu, owner) = *h.lock();
                let msg = task.internal_get_message(menu, owner, MSGF_MENU, PeekFlags::REMOVE, true);
                *r.lock() = msg.message;
                0
            })
            .unwrap();
        let owner = windows.create_window(WindowDesc::top_level(id, Rect::new(0, 0, 10, 10)));
        let menu = windows.create_window(WindowDesc::top_level(id, Rect::new(20, 0, 30, 10)));
        *hwnds.lock() = (menu, owner);
        windows.set_window_proc(owner, move |task, _, msg, wparam, lparam| {
            if msg == WM_ENTERIDLE {
                i.lock().push((wparam, lparam));
                task.post_message(HWND::NULL, WM_USER, 0, 0);
            }
            0
        });

        assert_eq!(sys.join(id), Some(0));
        assert_eq!(*idle.lock(), vec![(MSGF_MENU as usize, menu.raw() as isize)]);
        assert_eq!(*returned.lock(), WM_USER);
    }

    #[test]
    fn get_message_hook_rewrites() {
        let (sys, _, _) = testing::manual_system();
        sys.install_hook(HookKind::GetMessage, HookScope::Global, |_, _, _, payload| {
            if let HookPayload::Message(msg) = payload {
                msg.lparam = 99;
            }
            Verdict::Continue
        });
        let got = Arc::new(Mutex::new(0));
        let g = got.clone();
        let id = sys
            .spawn("getmsg", move |task| {
                task.post_message(HWND::NULL, WM_USER, 0, 1);
                *g.lock() = task.get_message(WindowFilter::All, MessageRange::ALL).lparam;
                0
            })
            .unwrap();
        assert_eq!(sys.join(id), Some(0));
        assert_eq!(*got.lock(), 99);
    }

    #[test]
    fn wait_message_returns_on_post() {
        let (sys, _, _) = testing::manual_system();
        let woke = Arc::new(Mutex::new(false));
        let w = woke.clone();
        let id = sys
            .spawn("waiter", move |task| {
                task.wait_message();
                *w.lock() = task
                    .peek_message(WindowFilter::Unowned, MessageRange::ALL, PeekFlags::REMOVE)
                    .is_some();
                0
            })
            .unwrap();
        sys.run_until_idle();
        assert!(!*woke.lock());
        assert_eq!(sys.queue_snapshot(id).map(|s| s.finished), Some(false));

        sys.post_app_message(id, WM_USER, 0, 0);
        assert_eq!(sys.join(id), Some(0));
        assert!(*woke.lock());
    }

    #[test]
    fn dispatch_to_invalid_window_returns_zero() {
        let (sys, _, _) = testing::manual_system();
        let result = Arc::new(Mutex::new(None));
        let r = result.clone();
        let id = sys
            .spawn("dispatch", move |task| {
                let msg = Message::new(HWND::from_raw(0x4444), WM_USER, 0, 0);
                *r.lock() = Some(task.dispatch_message(&msg));
                0
            })
            .unwrap();
        assert_eq!(sys.join(id), Some(0));
        assert_eq!(*result.lock(), Some(0));
    }
}
