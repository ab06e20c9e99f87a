//! Posting and Sending
//!
//! Posted messages are queued on the owning task's ring and return at once.
//! Sent messages run the target window procedure before returning: directly
//! when the window belongs to the caller, otherwise through a transaction
//! handed to the owning task, with the caller parked until the reply.
//!
//! A task servicing a send may itself send, including back to its caller.
//! Each queue keeps a stack of the sends it is servicing, so every leg of a
//! reentrant chain is answered independently.

use log::{debug, trace, warn};

use crate::hooks::{HookKind, HookMessage, HookPayload, HC_ACTION};
use crate::message::{Message, QueueStatus};
use crate::queue::{InSend, PendingSend, SendTransaction, TxId};
use crate::sched::{Shared, System, Task};
use crate::window::WindowStyle;
use crate::{TaskId, HWND, HWND_BROADCAST};

impl Shared {
    /// Top-level windows that receive broadcasts
    fn broadcast_targets(&self) -> Vec<HWND> {
        let dir = &self.env.windows;
        dir.top_level_windows()
            .into_iter()
            .filter(|&hwnd| {
                dir.window_info(hwnd).is_some_and(|info| {
                    info.style.intersects(WindowStyle::POPUP | WindowStyle::CAPTION)
                })
            })
            .collect()
    }

    /// Queue a message for a task, stamped with the current tick and cursor.
    /// A full queue drops the message but still reports success.
    pub(crate) fn post_to_task(&self, task: TaskId, msg: Message) -> bool {
        let time = self.tick_count();
        let mut st = self.lock();
        let pt = st.input.cursor;
        let msg = msg.at(time, pt);

        let finished = st.tasks.get(&task).map_or(true, |slot| slot.finished);
        if finished {
            warn!("[USER/Msg] No queue for {}, message {:#x} dropped", task, msg.message);
            return false;
        }
        let Some(queue) = st.queue_mut(task) else {
            return false;
        };
        if !queue.enqueue(msg, 0) {
            warn!("[USER/Msg] Queue of {} full, message {:#x} dropped", task, msg.message);
            return true;
        }
        trace!("[USER/Msg] Posted {:#x} to {} for {}", msg.message, msg.hwnd, task);
        self.wake(&mut st, task, QueueStatus::POSTMESSAGE);
        true
    }

    /// Post to the task owning `hwnd`
    pub(crate) fn post_message(&self, hwnd: HWND, message: u32, wparam: usize, lparam: isize) -> bool {
        if hwnd == HWND_BROADCAST {
            trace!("[USER/Msg] Broadcast post {:#x}", message);
            for target in self.broadcast_targets() {
                self.post_message(target, message, wparam, lparam);
            }
            return true;
        }

        let Some(info) = self.env.windows.window_info(hwnd) else {
            warn!("[USER/Msg] Post {:#x} to invalid window {}", message, hwnd);
            return false;
        };
        let Some(owner) = info.owner else {
            warn!("[USER/Msg] Window {} has no queue, message {:#x} dropped", hwnd, message);
            return false;
        };
        self.post_to_task(owner, Message::new(hwnd, message, wparam, lparam))
    }
}

impl Task {
    /// Post to the task owning `hwnd`. A NULL window posts a window-less
    /// message to the calling task.
    pub fn post_message(&self, hwnd: HWND, message: u32, wparam: usize, lparam: isize) -> bool {
        if !hwnd.is_valid() {
            return self
                .shared
                .post_to_task(self.id(), Message::new(HWND::NULL, message, wparam, lparam));
        }
        self.shared.post_message(hwnd, message, wparam, lparam)
    }

    /// Post a window-less message to another task
    pub fn post_app_message(&self, task: TaskId, message: u32, wparam: usize, lparam: isize) -> bool {
        self.shared
            .post_to_task(task, Message::new(HWND::NULL, message, wparam, lparam))
    }

    /// Ask the calling task's message loop to end
    pub fn post_quit_message(&self, exit_code: i32) {
        let mut st = self.shared.lock();
        if let Some(queue) = st.queue_mut(self.id()) {
            queue.post_quit(exit_code);
            debug!("[USER/Msg] {} quit posted ({})", self.id(), exit_code);
        }
    }

    /// Call the window procedure of `hwnd` and return its result. Sends to
    /// another task's window park the caller until that task replies; a
    /// send to an invalid window or a doomed task returns 0.
    pub fn send_message(&self, hwnd: HWND, message: u32, wparam: usize, lparam: isize) -> isize {
        if hwnd == HWND_BROADCAST {
            trace!("[USER/Send] Broadcast send {:#x}", message);
            for target in self.shared.broadcast_targets() {
                self.send_message(target, message, wparam, lparam);
            }
            return 1;
        }

        let mut call = HookMessage { hwnd, message, wparam, lparam };
        if self.is_hooked(HookKind::CallWndProc) {
            self.call_hooks(HookKind::CallWndProc, HC_ACTION, 1, &mut HookPayload::Call(&mut call));
        }

        let env = self.env();
        let Some(info) = env.windows.window_info(call.hwnd) else {
            warn!("[USER/Send] Send {:#x} to invalid window {}", call.message, call.hwnd);
            return 0;
        };
        match info.owner {
            Some(owner) if owner != self.id() => self.send_to_task(
                owner,
                Message::new(call.hwnd, call.message, call.wparam, call.lparam),
            ),
            _ => env
                .procs
                .call_window_proc(self, call.hwnd, call.message, call.wparam, call.lparam),
        }
    }

    /// Wait until `bits` are present in the queue's wake bits
    fn wait_wake_bits(&self, bits: QueueStatus) {
        loop {
            {
                let mut st = self.shared.lock();
                let Some(queue) = st.queue_mut(self.id()) else {
                    return;
                };
                if queue.doomed || queue.wake_bits.contains(bits) {
                    return;
                }
                queue.change_bits.remove(bits);
            }
            self.wait_bits(bits);
        }
    }

    fn send_to_task(&self, target: TaskId, msg: Message) -> isize {
        let me = self.id();

        // one unreceived send per caller
        self.wait_wake_bits(QueueStatus::SMPARAMSFREE);

        let tx = {
            let mut st = self.shared.lock();
            if !st.is_alive(target) {
                warn!("[USER/Send] {:#x} to doomed {} returns 0", msg.message, target);
                return 0;
            }
            let tx = st.alloc_tx();
            let Some(queue) = st.queue_mut(me) else {
                return 0;
            };
            queue.clear_wake_bits(QueueStatus::SMRESULT | QueueStatus::SMPARAMSFREE);
            queue.outgoing.push(SendTransaction { id: tx, target, msg, result: None });
            if let Some(dest) = st.queue_mut(target) {
                dest.incoming.push_back(PendingSend { tx, sender: me, msg });
            }
            self.shared.wake(&mut st, target, QueueStatus::SENDMESSAGE);
            tx
        };
        debug!("[USER/Send] {} -> {}: {:#x} (tx {})", me, target, msg.message, tx);

        loop {
            self.directed_yield(target);

            let mut st = self.shared.lock();
            let Some(queue) = st.queue_mut(me) else {
                return 0;
            };
            if let Some(pos) = queue.outgoing.iter().position(|t| t.id == tx) {
                if let Some(result) = queue.outgoing[pos].result {
                    queue.outgoing.remove(pos);
                    trace!("[USER/Send] tx {} resolved: {}", tx, result);
                    return result;
                }
            } else {
                return 0;
            }
            if queue.doomed {
                queue.outgoing.retain(|t| t.id != tx);
                queue.wake_bits |= QueueStatus::SMPARAMSFREE;
                if let Some(dest) = st.queue_mut(target) {
                    dest.incoming.retain(|p| p.tx != tx);
                }
                debug!("[USER/Send] {} doomed while sending, tx {} dropped", me, tx);
                return 0;
            }
            queue.clear_wake_bits(QueueStatus::SMRESULT);
            drop(st);

            self.wait_bits(QueueStatus::SMRESULT);
        }
    }

    /// Service the oldest incoming send. Returns false when none is pending.
    pub(crate) fn receive_message(&self) -> bool {
        let me = self.id();
        let pending = {
            let mut st = self.shared.lock();
            let Some(queue) = st.queue_mut(me) else {
                return false;
            };
            let Some(pending) = queue.incoming.pop_front() else {
                queue.clear_wake_bits(QueueStatus::SENDMESSAGE);
                return false;
            };
            if queue.incoming.is_empty() {
                queue.wake_bits.remove(QueueStatus::SENDMESSAGE);
            }
            queue.in_send.push(InSend { tx: pending.tx, sender: pending.sender, replied: false });
            self.shared.wake(&mut st, pending.sender, QueueStatus::SMPARAMSFREE);
            pending
        };

        let msg = pending.msg;
        trace!("[USER/Send] {} receives {:#x} from {}", me, msg.message, pending.sender);
        let result = self
            .env()
            .procs
            .call_window_proc(self, msg.hwnd, msg.message, msg.wparam, msg.lparam);

        let replied = {
            let mut st = self.shared.lock();
            let Some(queue) = st.queue_mut(me) else {
                return true;
            };
            match queue.in_send.iter().position(|s| s.tx == pending.tx) {
                Some(pos) => queue.in_send.remove(pos).replied,
                None => true,
            }
        };
        if !replied {
            self.finish_send(pending.sender, pending.tx, result);
        }
        true
    }

    fn finish_send(&self, sender: TaskId, tx: TxId, result: isize) {
        {
            let mut st = self.shared.lock();
            self.shared.resolve_send(&mut st, sender, tx, result, QueueStatus::SMRESULT);
        }
        trace!("[USER/Send] {} replies {} to {} (tx {})", self.id(), result, sender, tx);
        self.directed_yield(sender);
    }

    /// Answer the send being serviced before the window procedure returns.
    /// False when no send is pending a reply.
    pub fn reply_message(&self, result: isize) -> bool {
        let target = {
            let mut st = self.shared.lock();
            let Some(queue) = st.queue_mut(self.id()) else {
                return false;
            };
            let Some(entry) = queue.in_send.iter_mut().rev().find(|s| !s.replied) else {
                return false;
            };
            entry.replied = true;
            (entry.sender, entry.tx)
        };
        self.finish_send(target.0, target.1, result);
        true
    }

    /// Whether the current code runs on behalf of another task's send
    pub fn in_send_message(&self) -> bool {
        self.shared
            .lock()
            .queue(self.id())
            .is_some_and(|q| q.in_send_message())
    }

    /// Process every pending incoming send
    pub(crate) fn drain_sends(&self) {
        while self.receive_message() {}
    }
}

impl System {
    /// Post from the host. Returns false for an invalid window.
    pub fn post_message(&self, hwnd: HWND, message: u32, wparam: usize, lparam: isize) -> bool {
        self.shared().post_message(hwnd, message, wparam, lparam)
    }

    pub fn post_app_message(&self, task: TaskId, message: u32, wparam: usize, lparam: isize) -> bool {
        self.shared()
            .post_to_task(task, Message::new(HWND::NULL, message, wparam, lparam))
    }
}
