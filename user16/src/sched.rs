//! Cooperative Scheduler
//!
//! Every task body runs on its own host thread, but only the task holding
//! the run token executes; all others are parked on the turn condvar. The
//! token moves only at suspension points:
//!
//! - `wait_bits`: block until a queue condition is raised
//! - `yield_any`: let every ready task run once
//! - `yield_to`: hand the token to one task and resume right after it
//!
//! Tasks run only while the host pumps (`run_until_idle`, `join`,
//! `shutdown`); between pumps no task code executes, so injected input and
//! posted messages are observed in a deterministic order.

use std::collections::{BTreeMap, VecDeque};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use log::{debug, error, info, trace, warn};
use parking_lot::{Condvar, Mutex, MutexGuard};

use crate::clock::Clock;
use crate::config::{ConfigError, SystemConfig};
use crate::env::Env;
use crate::hooks::HookTable;
use crate::input::InputState;
use crate::keyboard::AccentTable;
use crate::message::{QueueStatus, WM_REGISTERED_FIRST};
use crate::queue::{HardwareQueue, TaskQueue, TxId};
use crate::TaskId;

// ============================================================================
// Shared State
// ============================================================================

pub(crate) struct TaskSlot {
    pub(crate) name: String,
    pub(crate) queue: TaskQueue,
    pub(crate) finished: bool,
}

pub(crate) struct State {
    pub(crate) tasks: BTreeMap<TaskId, TaskSlot>,
    current: Option<TaskId>,
    ready: VecDeque<TaskId>,
    pumping: bool,
    next_task: u32,
    next_tx: TxId,
    pub(crate) hardware: HardwareQueue,
    pub(crate) input: InputState,
    atoms: Vec<String>,
}

impl State {
    pub(crate) fn queue(&self, id: TaskId) -> Option<&TaskQueue> {
        self.tasks.get(&id).map(|slot| &slot.queue)
    }

    pub(crate) fn queue_mut(&mut self, id: TaskId) -> Option<&mut TaskQueue> {
        self.tasks.get_mut(&id).map(|slot| &mut slot.queue)
    }

    /// Running and not torn down
    pub(crate) fn is_alive(&self, id: TaskId) -> bool {
        self.tasks
            .get(&id)
            .is_some_and(|slot| !slot.finished && !slot.queue.doomed)
    }

    fn is_runnable(&self, id: TaskId) -> bool {
        self.tasks.get(&id).is_some_and(|slot| !slot.finished)
    }

    pub(crate) fn live_tasks(&self) -> Vec<TaskId> {
        self.tasks
            .iter()
            .filter(|(_, slot)| !slot.finished && !slot.queue.doomed)
            .map(|(&id, _)| id)
            .collect()
    }

    pub(crate) fn alloc_tx(&mut self) -> TxId {
        self.next_tx += 1;
        self.next_tx
    }
}

pub(crate) struct Shared {
    state: Mutex<State>,
    turn: Condvar,
    pub(crate) hooks: HookTable,
    pub(crate) env: Env,
    pub(crate) clock: Clock,
    pub(crate) accents: AccentTable,
    pub(crate) config: SystemConfig,
}

impl Shared {
    pub(crate) fn lock(&self) -> MutexGuard<'_, State> {
        self.state.lock()
    }

    fn wait_turn(&self, st: &mut MutexGuard<'_, State>, me: TaskId) {
        while st.current != Some(me) {
            self.turn.wait(st);
        }
    }

    fn pass_on(&self, st: &mut State) {
        st.current = st.ready.pop_front();
        if let Some(next) = st.current {
            trace!("[USER/Sched] Switch to {}", next);
        }
        self.turn.notify_all();
    }

    pub(crate) fn make_ready(&self, st: &mut State, id: TaskId) {
        if st.current == Some(id) || st.ready.contains(&id) || !st.is_runnable(id) {
            return;
        }
        st.ready.push_back(id);
        if st.current.is_none() && st.pumping {
            self.pass_on(st);
        }
    }

    /// Raise queue bits and ready the task if it is waiting for them
    pub(crate) fn wake(&self, st: &mut State, id: TaskId, bits: QueueStatus) {
        let Some(queue) = st.queue_mut(id) else {
            return;
        };
        if queue.set_wake_bits(bits) {
            self.make_ready(st, id);
        }
    }

    /// Give up the token without requeueing; returns once readied
    fn suspend(&self, st: &mut MutexGuard<'_, State>, me: TaskId) {
        if st.current == Some(me) {
            self.pass_on(st);
        }
        self.wait_turn(st, me);
    }

    pub(crate) fn yield_any(&self, me: TaskId) {
        let mut st = self.lock();
        if st.ready.is_empty() || st.current != Some(me) {
            return;
        }
        st.ready.push_back(me);
        self.suspend(&mut st, me);
    }

    /// Run `target` now; the caller resumes ahead of every other ready task
    pub(crate) fn yield_to(&self, me: TaskId, target: TaskId) {
        let mut st = self.lock();
        if target == me || !st.is_runnable(target) || st.current != Some(me) {
            return;
        }
        st.ready.retain(|&t| t != target && t != me);
        st.ready.push_front(me);
        st.current = Some(target);
        trace!("[USER/Sched] {} yields to {}", me, target);
        self.turn.notify_all();
        self.wait_turn(&mut st, me);
    }

    /// Complete a send transaction owned by `sender`
    pub(crate) fn resolve_send(
        &self,
        st: &mut State,
        sender: TaskId,
        tx: TxId,
        result: isize,
        bits: QueueStatus,
    ) {
        let Some(queue) = st.queue_mut(sender) else {
            return;
        };
        if let Some(pending) = queue.outgoing.iter_mut().find(|t| t.id == tx) {
            pending.result = Some(result);
        }
        self.wake(st, sender, bits);
    }

    /// Fail every send addressed to `id` with 0
    fn abandon_sends(&self, st: &mut State, id: TaskId) {
        let Some(queue) = st.queue_mut(id) else {
            return;
        };
        let mut orphans: Vec<(TaskId, TxId)> =
            queue.incoming.drain(..).map(|p| (p.sender, p.tx)).collect();
        for entry in queue.in_send.iter_mut().filter(|s| !s.replied) {
            entry.replied = true;
            orphans.push((entry.sender, entry.tx));
        }
        queue.wake_bits.remove(QueueStatus::SENDMESSAGE);

        for (sender, tx) in orphans {
            debug!("[USER/Send] Abandoning send {} from {} to {}", tx, sender, id);
            self.resolve_send(
                st,
                sender,
                tx,
                0,
                QueueStatus::SMRESULT | QueueStatus::SMPARAMSFREE,
            );
        }
    }

    pub(crate) fn doom_locked(&self, st: &mut State, id: TaskId) {
        let Some(queue) = st.queue_mut(id) else {
            return;
        };
        if queue.doomed {
            return;
        }
        queue.doomed = true;
        debug!("[USER/Sched] {} doomed", id);
        self.abandon_sends(st, id);
        self.make_ready(st, id);
    }

    fn retire(&self, id: TaskId) {
        self.hooks.remove_task(id);
        self.env.timers.kill_task_timers(id);

        let mut st = self.lock();
        self.doom_locked(&mut st, id);
        self.abandon_sends(&mut st, id);
        if let Some(slot) = st.tasks.get_mut(&id) {
            slot.finished = true;
            slot.queue.reset();
            if thread::panicking() {
                error!("[USER/Sched] Task '{}' ({}) panicked", slot.name, id);
            } else {
                info!("[USER/Sched] Task '{}' ({}) exited", slot.name, id);
            }
        }
        st.ready.retain(|&t| t != id);
        if st.current == Some(id) {
            self.pass_on(&mut st);
        } else {
            self.turn.notify_all();
        }
    }

    fn pump(&self) {
        let mut st = self.lock();
        st.pumping = true;
        if st.current.is_none() {
            self.pass_on(&mut st);
        }
        while st.current.is_some() {
            self.turn.wait(&mut st);
        }
        st.pumping = false;
    }

    pub(crate) fn tick_count(&self) -> u32 {
        self.clock.now()
    }

    pub(crate) fn register_window_message(&self, name: &str) -> u32 {
        if name.is_empty() {
            return 0;
        }
        let mut st = self.lock();
        let index = match st.atoms.iter().position(|a| a.eq_ignore_ascii_case(name)) {
            Some(index) => index,
            None => {
                if st.atoms.len() >= (0x10000 - WM_REGISTERED_FIRST) as usize {
                    warn!("[USER/Msg] Registered message table full");
                    return 0;
                }
                st.atoms.push(name.to_owned());
                st.atoms.len() - 1
            }
        };
        WM_REGISTERED_FIRST + index as u32
    }

    pub(crate) fn snapshot(&self, id: TaskId) -> Option<QueueSnapshot> {
        let st = self.lock();
        let slot = st.tasks.get(&id)?;
        let queue = &slot.queue;
        Some(QueueSnapshot {
            len: queue.messages.len(),
            wake_bits: queue.wake_bits,
            change_bits: queue.change_bits,
            quit_pending: queue.quit.is_some(),
            doomed: queue.doomed,
            finished: slot.finished,
            pending_sends: queue.incoming.len(),
        })
    }

    /// Wake every live task that has a timer due, and every task holding
    /// back input for a playback event, so the hook is asked again
    pub(crate) fn poll_timers(&self) {
        let now = self.tick_count();
        let tasks = self.lock().live_tasks();
        let due: Vec<TaskId> = tasks
            .into_iter()
            .filter(|&t| self.env.timers.has_due_timer(t, now))
            .collect();

        let mut st = self.lock();
        for task in due {
            self.wake(&mut st, task, QueueStatus::TIMER);
        }
        let replay: Vec<(TaskId, QueueStatus)> = st
            .tasks
            .iter()
            .filter(|(_, slot)| !slot.finished && !slot.queue.playback_wait.is_empty())
            .map(|(&id, slot)| (id, slot.queue.playback_wait))
            .collect();
        for (task, bits) in replay {
            trace!("[USER/Sched] Playback poll wakes {}", task);
            self.wake(&mut st, task, bits);
        }
    }
}

/// Point-in-time view of a task's queue
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QueueSnapshot {
    pub len: usize,
    pub wake_bits: QueueStatus,
    pub change_bits: QueueStatus,
    pub quit_pending: bool,
    pub doomed: bool,
    pub finished: bool,
    pub pending_sends: usize,
}

// ============================================================================
// Task
// ============================================================================

/// Handle given to a running task body and to every procedure it calls
pub struct Task {
    id: TaskId,
    pub(crate) shared: Arc<Shared>,
}

impl Task {
    pub fn id(&self) -> TaskId {
        self.id
    }

    pub fn env(&self) -> &Env {
        &self.shared.env
    }

    pub fn tick_count(&self) -> u32 {
        self.shared.tick_count()
    }

    pub fn is_doomed(&self) -> bool {
        self.shared.lock().queue(self.id).map_or(true, |q| q.doomed)
    }

    /// Let other ready tasks run (Yield)
    pub fn yield_now(&self) {
        self.shared.yield_any(self.id);
    }

    /// Run `target` before any other ready task (DirectedYield)
    pub fn directed_yield(&self, target: TaskId) {
        self.shared.yield_to(self.id, target);
    }

    /// Block until one of `bits` is raised, servicing incoming sends while
    /// waiting. Returns at once for a doomed task.
    pub(crate) fn wait_bits(&self, bits: QueueStatus) {
        loop {
            let mut st = self.shared.lock();
            let Some(queue) = st.queue_mut(self.id) else {
                return;
            };
            if queue.doomed || queue.change_bits.intersects(bits) {
                queue.wake_mask = QueueStatus::empty();
                return;
            }
            if queue.wake_bits.contains(QueueStatus::SENDMESSAGE) {
                queue.wake_mask = QueueStatus::empty();
                drop(st);
                self.receive_message();
                continue;
            }
            queue.wake_mask = bits | QueueStatus::SENDMESSAGE;
            trace!("[USER/Sched] {} waits for {:?}", self.id, bits);
            self.shared.suspend(&mut st, self.id);
        }
    }

    /// Raise wake bits on another task's queue (paint or timer notices)
    pub fn signal(&self, task: TaskId, bits: QueueStatus) {
        let mut st = self.shared.lock();
        self.shared.wake(&mut st, task, bits);
    }

    pub fn queue_snapshot(&self) -> QueueSnapshot {
        self.shared.snapshot(self.id).unwrap_or(QueueSnapshot {
            len: 0,
            wake_bits: QueueStatus::empty(),
            change_bits: QueueStatus::empty(),
            quit_pending: false,
            doomed: true,
            finished: true,
            pending_sends: 0,
        })
    }

    pub fn register_window_message(&self, name: &str) -> u32 {
        self.shared.register_window_message(name)
    }
}

struct ExitGuard {
    shared: Arc<Shared>,
    id: TaskId,
}

impl Drop for ExitGuard {
    fn drop(&mut self) {
        self.shared.retire(self.id);
    }
}

// ============================================================================
// System
// ============================================================================

/// Host-side handle: owns the task threads and drives the scheduler
pub struct System {
    shared: Arc<Shared>,
    threads: Mutex<BTreeMap<TaskId, JoinHandle<i32>>>,
}

impl System {
    pub fn new(config: SystemConfig, env: Env) -> Result<Self, ConfigError> {
        config.validate()?;
        info!(
            "[USER/Sched] System up: queue {} hardware {} dblclk {}ms",
            config.queue_size, config.hardware_queue_size, config.double_click_time
        );

        let state = State {
            tasks: BTreeMap::new(),
            current: None,
            ready: VecDeque::new(),
            pumping: false,
            next_task: 1,
            next_tx: 0,
            hardware: HardwareQueue::new(config.hardware_queue_size),
            input: InputState::new(&config),
            atoms: Vec::new(),
        };
        let shared = Shared {
            state: Mutex::new(state),
            turn: Condvar::new(),
            hooks: HookTable::new(),
            env,
            clock: Clock::new(config.manual_clock),
            accents: AccentTable::new(),
            config,
        };
        Ok(System {
            shared: Arc::new(shared),
            threads: Mutex::new(BTreeMap::new()),
        })
    }

    pub(crate) fn shared(&self) -> &Arc<Shared> {
        &self.shared
    }

    /// Create a task and its queue. The body starts at the next pump and
    /// its return value is the task's exit code.
    pub fn spawn<F>(&self, name: &str, body: F) -> Option<TaskId>
    where
        F: FnOnce(&Task) -> i32 + Send + 'static,
    {
        let id = {
            let mut st = self.shared.lock();
            let id = TaskId::from_raw(st.next_task);
            st.next_task += 1;
            st.tasks.insert(
                id,
                TaskSlot {
                    name: name.to_owned(),
                    queue: TaskQueue::new(self.shared.config.queue_size),
                    finished: false,
                },
            );
            id
        };

        let shared = self.shared.clone();
        let spawned = thread::Builder::new()
            .name(format!("user16-{}", name))
            .spawn(move || {
                let _exit = ExitGuard { shared: shared.clone(), id };
                {
                    let mut st = shared.lock();
                    shared.wait_turn(&mut st, id);
                }
                let task = Task { id, shared };
                body(&task)
            });

        match spawned {
            Ok(handle) => {
                self.threads.lock().insert(id, handle);
                let mut st = self.shared.lock();
                self.shared.make_ready(&mut st, id);
                info!("[USER/Sched] Spawned task '{}' as {}", name, id);
                Some(id)
            }
            Err(e) => {
                error!("[USER/Sched] Failed to start task '{}': {}", name, e);
                self.shared.lock().tasks.remove(&id);
                None
            }
        }
    }

    /// Run tasks until every one of them is blocked or finished
    pub fn run_until_idle(&self) {
        self.shared.pump();
    }

    /// Pump, then collect the exit code if `id` has finished. `None` when
    /// the task is still blocked or panicked.
    pub fn join(&self, id: TaskId) -> Option<i32> {
        self.shared.pump();
        let finished = self
            .shared
            .lock()
            .tasks
            .get(&id)
            .is_some_and(|slot| slot.finished);
        if !finished {
            return None;
        }
        let handle = self.threads.lock().remove(&id)?;
        handle.join().ok()
    }

    /// Mark a task for termination: pending sends to it fail with 0 and its
    /// blocking get returns WM_QUIT
    pub fn doom_task(&self, id: TaskId) {
        let mut st = self.shared.lock();
        self.shared.doom_locked(&mut st, id);
    }

    /// Doom every task, let them unwind, and collect exit codes
    pub fn shutdown(&self) -> Vec<(TaskId, Option<i32>)> {
        {
            let mut st = self.shared.lock();
            for id in st.live_tasks() {
                self.shared.doom_locked(&mut st, id);
            }
        }
        self.shared.pump();

        let handles = std::mem::take(&mut *self.threads.lock());
        let mut results = Vec::with_capacity(handles.len());
        for (id, handle) in handles {
            let finished = self
                .shared
                .lock()
                .tasks
                .get(&id)
                .is_some_and(|slot| slot.finished);
            if finished {
                results.push((id, handle.join().ok()));
            } else {
                error!("[USER/Sched] {} did not exit on shutdown", id);
                results.push((id, None));
            }
        }
        results
    }

    pub fn signal(&self, task: TaskId, bits: QueueStatus) {
        let mut st = self.shared.lock();
        self.shared.wake(&mut st, task, bits);
    }

    pub fn queue_snapshot(&self, task: TaskId) -> Option<QueueSnapshot> {
        self.shared.snapshot(task)
    }

    pub fn tick_count(&self) -> u32 {
        self.shared.tick_count()
    }

    /// Advance a manual clock and wake tasks whose timers came due
    pub fn advance_clock(&self, ms: u32) -> bool {
        if !self.shared.clock.advance(ms) {
            return false;
        }
        self.shared.poll_timers();
        true
    }

    pub fn poll_timers(&self) {
        self.shared.poll_timers();
    }

    pub fn register_window_message(&self, name: &str) -> u32 {
        self.shared.register_window_message(name)
    }
}

impl Drop for System {
    fn drop(&mut self) {
        if !self.threads.lock().is_empty() {
            self.shutdown();
        }
    }
}
