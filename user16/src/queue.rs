//! Queue Store
//!
//! Per-task message queues and the shared hardware input queue. Both are
//! bounded rings that keep arrival order; removal from the middle compacts
//! the ring so later entries keep their relative order.

use std::collections::VecDeque;

use crate::message::{Message, MessageRange, QueueStatus, WindowFilter, WM_MOUSEMOVE};
use crate::{Point, TaskId};

// ============================================================================
// Ring
// ============================================================================

/// A queued message with the bookkeeping the dispatcher needs
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QueuedMessage {
    pub msg: Message,
    pub extra_info: u32,
    /// Wake bit this entry accounts for
    pub class: QueueStatus,
    /// Stable id, survives compaction
    pub seq: u64,
}

impl QueuedMessage {
    const EMPTY: QueuedMessage = QueuedMessage {
        msg: Message {
            hwnd: crate::HWND::NULL,
            message: 0,
            wparam: 0,
            lparam: 0,
            time: 0,
            pt: Point { x: 0, y: 0 },
        },
        extra_info: 0,
        class: QueueStatus::empty(),
        seq: 0,
    };
}

/// Fixed capacity message ring
#[derive(Debug)]
pub struct MessageRing {
    slots: Vec<QueuedMessage>,
    head: usize,
    tail: usize,
    count: usize,
    next_seq: u64,
}

impl MessageRing {
    pub fn new(capacity: usize) -> Self {
        Self {
            slots: vec![QueuedMessage::EMPTY; capacity],
            head: 0,
            tail: 0,
            count: 0,
            next_seq: 1,
        }
    }

    pub fn capacity(&self) -> usize {
        self.slots.len()
    }

    pub fn len(&self) -> usize {
        self.count
    }

    pub fn is_empty(&self) -> bool {
        self.count == 0
    }

    pub fn is_full(&self) -> bool {
        self.count >= self.slots.len()
    }

    fn slot(&self, pos: usize) -> usize {
        (self.head + pos) % self.slots.len()
    }

    /// Append at the tail; returns the entry's seq, or `None` when full
    pub fn push(&mut self, msg: Message, class: QueueStatus, extra_info: u32) -> Option<u64> {
        if self.is_full() {
            return None;
        }

        let seq = self.next_seq;
        self.next_seq += 1;
        self.slots[self.tail] = QueuedMessage { msg, extra_info, class, seq };
        self.tail = (self.tail + 1) % self.slots.len();
        self.count += 1;
        Some(seq)
    }

    /// Entry at logical position (0 = oldest)
    pub fn get(&self, pos: usize) -> Option<&QueuedMessage> {
        if pos >= self.count {
            return None;
        }
        Some(&self.slots[self.slot(pos)])
    }

    pub fn newest_mut(&mut self) -> Option<&mut QueuedMessage> {
        if self.count == 0 {
            return None;
        }
        let idx = self.slot(self.count - 1);
        Some(&mut self.slots[idx])
    }

    /// Remove the entry at logical position, shifting later entries down
    pub fn remove_at(&mut self, pos: usize) -> Option<QueuedMessage> {
        if pos >= self.count {
            return None;
        }

        let cap = self.slots.len();
        let idx = self.slot(pos);
        let entry = self.slots[idx];

        let mut j = idx;
        for _ in pos..self.count - 1 {
            let next = (j + 1) % cap;
            self.slots[j] = self.slots[next];
            j = next;
        }
        self.tail = if self.tail == 0 { cap - 1 } else { self.tail - 1 };
        self.count -= 1;
        Some(entry)
    }

    pub fn position_of_seq(&self, seq: u64) -> Option<usize> {
        self.iter().position(|e| e.seq == seq)
    }

    pub fn remove_seq(&mut self, seq: u64) -> Option<QueuedMessage> {
        let pos = self.position_of_seq(seq)?;
        self.remove_at(pos)
    }

    pub fn iter(&self) -> impl Iterator<Item = &QueuedMessage> + '_ {
        (0..self.count).map(move |pos| &self.slots[self.slot(pos)])
    }

    pub fn contains_class(&self, class: QueueStatus) -> bool {
        self.iter().any(|e| e.class.intersects(class))
    }

    /// First entry whose window and code pass both filters
    pub fn find_first_matching(&self, filter: WindowFilter, range: MessageRange) -> Option<usize> {
        self.iter()
            .position(|e| filter.matches(e.msg.hwnd) && range.contains(e.msg.message))
    }

    pub fn clear(&mut self) {
        self.head = 0;
        self.tail = 0;
        self.count = 0;
    }
}

// ============================================================================
// Send bookkeeping
// ============================================================================

/// Send transaction id
pub type TxId = u64;

/// A send issued by this queue's task, waiting for its reply
#[derive(Debug, Clone, Copy)]
pub struct SendTransaction {
    pub id: TxId,
    pub target: TaskId,
    pub msg: Message,
    pub result: Option<isize>,
}

/// A send delivered to this queue and not yet picked up
#[derive(Debug, Clone, Copy)]
pub struct PendingSend {
    pub tx: TxId,
    pub sender: TaskId,
    pub msg: Message,
}

/// A send this queue's task is currently servicing
#[derive(Debug, Clone, Copy)]
pub struct InSend {
    pub tx: TxId,
    pub sender: TaskId,
    pub replied: bool,
}

// ============================================================================
// Task Queue
// ============================================================================

/// Message queue of one task
#[derive(Debug)]
pub struct TaskQueue {
    pub(crate) messages: MessageRing,
    /// Conditions currently true
    pub(crate) wake_bits: QueueStatus,
    /// Conditions raised since the last clear
    pub(crate) change_bits: QueueStatus,
    /// Conditions the blocked task waits for
    pub(crate) wake_mask: QueueStatus,
    pub(crate) quit: Option<i32>,
    pub(crate) doomed: bool,
    /// Input bits held back by a playback event that is not yet due
    pub(crate) playback_wait: QueueStatus,
    pub(crate) incoming: VecDeque<PendingSend>,
    pub(crate) in_send: Vec<InSend>,
    pub(crate) outgoing: Vec<SendTransaction>,
    pub(crate) last_time: u32,
    pub(crate) last_pos: Point,
    pub(crate) last_extra: u32,
    pub(crate) key_state: [u8; 256],
}

impl TaskQueue {
    pub fn new(capacity: usize) -> Self {
        Self {
            messages: MessageRing::new(capacity),
            wake_bits: QueueStatus::SMPARAMSFREE,
            change_bits: QueueStatus::empty(),
            wake_mask: QueueStatus::empty(),
            quit: None,
            doomed: false,
            playback_wait: QueueStatus::empty(),
            incoming: VecDeque::new(),
            in_send: Vec::new(),
            outgoing: Vec::new(),
            last_time: 0,
            last_pos: Point::default(),
            last_extra: 0,
            key_state: [0; 256],
        }
    }

    /// Raise bits; true when the blocked task is waiting for any of them
    pub fn set_wake_bits(&mut self, bits: QueueStatus) -> bool {
        self.wake_bits |= bits;
        self.change_bits |= bits;
        self.wake_mask.intersects(bits)
    }

    pub fn clear_wake_bits(&mut self, bits: QueueStatus) {
        self.wake_bits.remove(bits);
        self.change_bits.remove(bits);
    }

    /// Append a posted message; false (and nothing stored) when full
    pub fn enqueue(&mut self, msg: Message, extra_info: u32) -> bool {
        if self.messages.push(msg, QueueStatus::POSTMESSAGE, extra_info).is_none() {
            return false;
        }
        self.set_wake_bits(QueueStatus::POSTMESSAGE);
        true
    }

    /// Remove by position and recompute the posted bit
    pub fn dequeue_at(&mut self, pos: usize) -> Option<QueuedMessage> {
        let entry = self.messages.remove_at(pos)?;
        self.refresh_post_bit();
        Some(entry)
    }

    pub fn find_first_matching(&self, filter: WindowFilter, range: MessageRange) -> Option<usize> {
        self.messages.find_first_matching(filter, range)
    }

    pub fn post_quit(&mut self, exit_code: i32) -> bool {
        self.quit = Some(exit_code);
        self.set_wake_bits(QueueStatus::POSTMESSAGE)
    }

    pub fn take_quit(&mut self) -> Option<i32> {
        let code = self.quit.take();
        self.refresh_post_bit();
        code
    }

    fn refresh_post_bit(&mut self) {
        if self.quit.is_none() && !self.messages.contains_class(QueueStatus::POSTMESSAGE) {
            self.wake_bits.remove(QueueStatus::POSTMESSAGE);
        }
    }

    /// Any send being serviced that has not been replied to
    pub fn in_send_message(&self) -> bool {
        self.in_send.iter().any(|s| !s.replied)
    }

    pub fn record_last(&mut self, msg: &Message, extra_info: u32) {
        self.last_time = msg.time;
        self.last_pos = msg.pt;
        self.last_extra = extra_info;
    }

    /// Track key transitions for messages the task removed
    pub fn update_key_state(&mut self, message: u32, vk: usize) {
        use crate::message::{WM_KEYDOWN, WM_KEYUP, WM_SYSKEYDOWN, WM_SYSKEYUP};

        let Some(state) = self.key_state.get_mut(vk & 0xFF) else {
            return;
        };
        match message {
            WM_KEYDOWN | WM_SYSKEYDOWN => {
                if *state & 0x80 == 0 {
                    *state ^= 0x01;
                }
                *state |= 0x80;
            }
            WM_KEYUP | WM_SYSKEYUP => {
                *state &= !0x80;
            }
            _ => {}
        }
    }

    /// Drop queued contents when the owning task is torn down
    pub fn reset(&mut self) {
        self.messages.clear();
        self.quit = None;
        self.wake_bits = QueueStatus::empty();
        self.change_bits = QueueStatus::empty();
        self.wake_mask = QueueStatus::empty();
        self.playback_wait = QueueStatus::empty();
    }
}

// ============================================================================
// Hardware Queue
// ============================================================================

/// System-wide queue of raw input events
#[derive(Debug)]
pub struct HardwareQueue {
    pub(crate) ring: MessageRing,
}

impl HardwareQueue {
    pub fn new(capacity: usize) -> Self {
        Self { ring: MessageRing::new(capacity) }
    }

    /// Queue a raw event. Consecutive mouse moves with the same button state
    /// collapse into the newest one. Returns false when the event was dropped.
    pub fn push(&mut self, msg: Message, class: QueueStatus, extra_info: u32) -> bool {
        if msg.message == WM_MOUSEMOVE {
            if let Some(last) = self.ring.newest_mut() {
                if last.msg.message == WM_MOUSEMOVE && last.msg.wparam == msg.wparam {
                    last.msg = msg;
                    last.extra_info = extra_info;
                    return true;
                }
            }
        }
        self.ring.push(msg, class, extra_info).is_some()
    }

    pub fn get(&self, pos: usize) -> Option<QueuedMessage> {
        self.ring.get(pos).copied()
    }

    pub fn remove_seq(&mut self, seq: u64) -> Option<QueuedMessage> {
        self.ring.remove_seq(seq)
    }

    pub fn len(&self) -> usize {
        self.ring.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ring.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message::{WM_KEYDOWN, WM_KEYUP, WM_LBUTTONDOWN, WM_PAINT, WM_USER};
    use crate::HWND;

    fn msg(hwnd: u32, code: u32, wparam: usize) -> Message {
        Message::new(HWND::from_raw(hwnd), code, wparam, 0)
    }

    #[test]
    fn ring_keeps_fifo_across_wrap() {
        let mut ring = MessageRing::new(3);
        for i in 0..3 {
            assert!(ring.push(msg(1, WM_USER, i), QueueStatus::POSTMESSAGE, 0).is_some());
        }
        assert_eq!(ring.remove_at(0).map(|e| e.msg.wparam), Some(0));
        assert!(ring.push(msg(1, WM_USER, 3), QueueStatus::POSTMESSAGE, 0).is_some());

        let order: Vec<usize> = ring.iter().map(|e| e.msg.wparam).collect();
        assert_eq!(order, vec![1, 2, 3]);
    }

    #[test]
    fn full_queue_keeps_oldest() {
        let mut q = TaskQueue::new(4);
        for i in 0..6 {
            let stored = q.enqueue(msg(1, WM_USER, i), 0);
            assert_eq!(stored, i < 4);
        }
        let kept: Vec<usize> = q.messages.iter().map(|e| e.msg.wparam).collect();
        assert_eq!(kept, vec![0, 1, 2, 3]);
    }

    #[test]
    fn removal_from_middle_compacts() {
        let mut q = TaskQueue::new(8);
        for i in 0..5 {
            q.enqueue(msg(1 + (i as u32 % 2), WM_USER, i), 0);
        }
        let pos = q.find_first_matching(WindowFilter::Window(HWND::from_raw(2)), MessageRange::ALL);
        assert_eq!(pos, Some(1));
        assert_eq!(q.dequeue_at(1).map(|e| e.msg.wparam), Some(1));

        let rest: Vec<usize> = q.messages.iter().map(|e| e.msg.wparam).collect();
        assert_eq!(rest, vec![0, 2, 3, 4]);
        assert_eq!(q.messages.len(), 4);
    }

    #[test]
    fn post_bit_tracks_contents() {
        let mut q = TaskQueue::new(4);
        assert!(!q.wake_bits.contains(QueueStatus::POSTMESSAGE));
        q.enqueue(msg(1, WM_USER, 0), 0);
        q.enqueue(msg(1, WM_USER, 1), 0);
        assert!(q.wake_bits.contains(QueueStatus::POSTMESSAGE));

        q.dequeue_at(0);
        assert!(q.wake_bits.contains(QueueStatus::POSTMESSAGE));
        q.dequeue_at(0);
        assert!(!q.wake_bits.contains(QueueStatus::POSTMESSAGE));

        q.post_quit(3);
        assert!(q.wake_bits.contains(QueueStatus::POSTMESSAGE));
        assert_eq!(q.take_quit(), Some(3));
        assert!(!q.wake_bits.contains(QueueStatus::POSTMESSAGE));
    }

    #[test]
    fn range_and_window_filters() {
        let mut q = TaskQueue::new(8);
        q.enqueue(msg(1, WM_PAINT, 0), 0);
        q.enqueue(msg(1, WM_USER, 1), 0);
        q.enqueue(msg(2, WM_USER, 2), 0);

        assert_eq!(q.find_first_matching(WindowFilter::All, MessageRange::only(WM_USER)), Some(1));
        assert_eq!(
            q.find_first_matching(WindowFilter::Window(HWND::from_raw(2)), MessageRange::ALL),
            Some(2)
        );
        assert_eq!(q.find_first_matching(WindowFilter::Unowned, MessageRange::ALL), None);
    }

    #[test]
    fn wake_mask_decides_readiness() {
        let mut q = TaskQueue::new(4);
        q.wake_mask = QueueStatus::KEY;
        assert!(!q.set_wake_bits(QueueStatus::MOUSE));
        assert!(q.set_wake_bits(QueueStatus::KEY));
        assert!(q.change_bits.contains(QueueStatus::KEY | QueueStatus::MOUSE));
    }

    #[test]
    fn key_state_toggles_on_first_press() {
        let mut q = TaskQueue::new(4);
        q.update_key_state(WM_KEYDOWN, 0x14);
        assert_eq!(q.key_state[0x14], 0x81);
        // autorepeat does not toggle again
        q.update_key_state(WM_KEYDOWN, 0x14);
        assert_eq!(q.key_state[0x14], 0x81);
        q.update_key_state(WM_KEYUP, 0x14);
        assert_eq!(q.key_state[0x14], 0x01);
        q.update_key_state(WM_KEYDOWN, 0x14);
        assert_eq!(q.key_state[0x14], 0x80);
    }

    #[test]
    fn mouse_moves_merge() {
        let mut hw = HardwareQueue::new(4);
        let mv = |x| Message::new(HWND::NULL, WM_MOUSEMOVE, 0, 0).at(0, Point::new(x, 0));
        assert!(hw.push(mv(1), QueueStatus::MOUSE, 0));
        assert!(hw.push(mv(2), QueueStatus::MOUSE, 0));
        assert_eq!(hw.len(), 1);
        assert_eq!(hw.get(0).map(|e| e.msg.pt.x), Some(2));

        let click = Message::new(HWND::NULL, WM_LBUTTONDOWN, 1, 0);
        assert!(hw.push(click, QueueStatus::MOUSE, 0));
        assert!(hw.push(mv(3), QueueStatus::MOUSE, 0));
        assert_eq!(hw.len(), 3);
    }

    #[test]
    fn hardware_removal_by_seq() {
        let mut hw = HardwareQueue::new(2);
        let key = Message::new(HWND::NULL, WM_KEYDOWN, 0x41, 0);
        assert!(hw.push(key, QueueStatus::KEY, 0));
        assert!(hw.push(key, QueueStatus::KEY, 0));
        assert!(!hw.push(key, QueueStatus::KEY, 0));

        let Some(second) = hw.get(1) else { panic!("missing entry") };
        assert!(hw.remove_seq(second.seq).is_some());
        assert!(hw.remove_seq(second.seq).is_none());
        assert_eq!(hw.len(), 1);
    }
}
