//! Window Hooks
//!
//! Hooks let applications intercept input and messages:
//!
//! - **WH_KEYBOARD / WH_MOUSE**: raw input before it reaches a window
//! - **WH_GETMESSAGE / WH_CALLWNDPROC**: retrieved and sent messages
//! - **WH_CBT**: activation and skipped-input notifications
//! - **WH_MSGFILTER / WH_SYSMSGFILTER**: messages seen by modal loops
//! - **WH_JOURNALRECORD / WH_JOURNALPLAYBACK**: input recording and replay
//! - **WH_HARDWARE**: hardware events that are neither mouse nor keyboard
//!
//! Each kind keeps a chain of procedures called in installation order. The
//! first procedure that vetoes stops the chain. Procedures run on the stack
//! of the task that triggered the hook, with the table unlocked.

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

use log::{debug, trace};

use crate::message::Message;
use crate::sched::{System, Task};
use crate::{Point, TaskId, HWND};

// ============================================================================
// Hook Types
// ============================================================================

pub const WH_MSGFILTER: i32 = -1;
pub const WH_JOURNALRECORD: i32 = 0;
pub const WH_JOURNALPLAYBACK: i32 = 1;
pub const WH_KEYBOARD: i32 = 2;
pub const WH_GETMESSAGE: i32 = 3;
pub const WH_CALLWNDPROC: i32 = 4;
pub const WH_CBT: i32 = 5;
pub const WH_SYSMSGFILTER: i32 = 6;
pub const WH_MOUSE: i32 = 7;
pub const WH_HARDWARE: i32 = 8;

// ============================================================================
// Hook Codes
// ============================================================================

pub const HC_ACTION: i32 = 0;
pub const HC_GETNEXT: i32 = 1;
pub const HC_SKIP: i32 = 2;
pub const HC_NOREMOVE: i32 = 3;

// CBT hook codes
pub const HCBT_QS: i32 = 2;
pub const HCBT_ACTIVATE: i32 = 5;
pub const HCBT_CLICKSKIPPED: i32 = 6;
pub const HCBT_KEYSKIPPED: i32 = 7;

// Message filter codes
pub const MSGF_DIALOGBOX: i32 = 0;
pub const MSGF_MENU: i32 = 2;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum HookKind {
    MsgFilter,
    JournalRecord,
    JournalPlayback,
    Keyboard,
    GetMessage,
    CallWndProc,
    Cbt,
    SysMsgFilter,
    Mouse,
    Hardware,
}

impl HookKind {
    const COUNT: usize = 10;

    pub const fn id(self) -> i32 {
        match self {
            HookKind::MsgFilter => WH_MSGFILTER,
            HookKind::JournalRecord => WH_JOURNALRECORD,
            HookKind::JournalPlayback => WH_JOURNALPLAYBACK,
            HookKind::Keyboard => WH_KEYBOARD,
            HookKind::GetMessage => WH_GETMESSAGE,
            HookKind::CallWndProc => WH_CALLWNDPROC,
            HookKind::Cbt => WH_CBT,
            HookKind::SysMsgFilter => WH_SYSMSGFILTER,
            HookKind::Mouse => WH_MOUSE,
            HookKind::Hardware => WH_HARDWARE,
        }
    }

    pub const fn from_id(id: i32) -> Option<HookKind> {
        match id {
            WH_MSGFILTER => Some(HookKind::MsgFilter),
            WH_JOURNALRECORD => Some(HookKind::JournalRecord),
            WH_JOURNALPLAYBACK => Some(HookKind::JournalPlayback),
            WH_KEYBOARD => Some(HookKind::Keyboard),
            WH_GETMESSAGE => Some(HookKind::GetMessage),
            WH_CALLWNDPROC => Some(HookKind::CallWndProc),
            WH_CBT => Some(HookKind::Cbt),
            WH_SYSMSGFILTER => Some(HookKind::SysMsgFilter),
            WH_MOUSE => Some(HookKind::Mouse),
            WH_HARDWARE => Some(HookKind::Hardware),
            _ => None,
        }
    }

    fn index(self) -> usize {
        (self.id() - WH_MSGFILTER) as usize
    }
}

// ============================================================================
// Payloads
// ============================================================================

/// WH_MOUSE data
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MouseHookInfo {
    pub pt: Point,
    pub hwnd: HWND,
    pub hit_test: i16,
    pub extra_info: u32,
}

/// Journal record (EVENTMSG)
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct EventMsg {
    pub message: u32,
    pub param_l: u32,
    pub param_h: u32,
    pub time: u32,
    pub hwnd: HWND,
}

/// Journal playback request: the hook fills `event` and sets `wait` to the
/// milliseconds still to wait before it is due (0 = due now)
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PlaybackRequest {
    pub event: EventMsg,
    pub wait: i32,
}

/// WH_CALLWNDPROC / WH_HARDWARE data; hooks may rewrite it
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct HookMessage {
    pub hwnd: HWND,
    pub message: u32,
    pub wparam: usize,
    pub lparam: isize,
}

/// Data handed to a hook procedure
#[derive(Debug)]
pub enum HookPayload<'a> {
    None,
    /// WH_KEYBOARD key data (the lParam of the key message)
    KeyData(isize),
    Mouse(&'a mut MouseHookInfo),
    /// WH_GETMESSAGE and the filter hooks
    Message(&'a mut Message),
    /// WH_JOURNALRECORD
    Event(&'a mut EventMsg),
    /// WH_JOURNALPLAYBACK
    Playback(&'a mut PlaybackRequest),
    /// WH_CALLWNDPROC and WH_HARDWARE
    Call(&'a mut HookMessage),
    /// WH_CBT window argument
    Window(HWND),
}

/// Outcome of a hook procedure
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
    Continue,
    Veto,
    /// Veto carrying a replacement hit-test code for the skipped mouse
    /// event
    VetoWithCode(i32),
}

impl Verdict {
    pub fn is_veto(&self) -> bool {
        !matches!(self, Verdict::Continue)
    }
}

/// A hook procedure
pub trait HookProc: Send + Sync {
    fn call(&self, task: &Task, code: i32, extra: usize, payload: &mut HookPayload<'_>) -> Verdict;
}

impl<F> HookProc for F
where
    F: Fn(&Task, i32, usize, &mut HookPayload<'_>) -> Verdict + Send + Sync,
{
    fn call(&self, task: &Task, code: i32, extra: usize, payload: &mut HookPayload<'_>) -> Verdict {
        self(task, code, extra, payload)
    }
}

// ============================================================================
// Hook Table
// ============================================================================

/// Hook handle (HHOOK)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct HookHandle(u32);

/// Which tasks a hook applies to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HookScope {
    Global,
    Task(TaskId),
}

impl HookScope {
    fn applies_to(&self, task: TaskId) -> bool {
        match *self {
            HookScope::Global => true,
            HookScope::Task(t) => t == task,
        }
    }
}

#[derive(Clone)]
struct HookEntry {
    handle: HookHandle,
    scope: HookScope,
    proc_: Arc<dyn HookProc>,
}

pub(crate) struct HookTable {
    chains: spin::Mutex<[Vec<HookEntry>; HookKind::COUNT]>,
    next_handle: AtomicU32,
}

impl HookTable {
    pub(crate) fn new() -> Self {
        Self {
            chains: spin::Mutex::new(Default::default()),
            next_handle: AtomicU32::new(1),
        }
    }

    pub(crate) fn install(&self, kind: HookKind, scope: HookScope, proc_: Arc<dyn HookProc>) -> HookHandle {
        let handle = HookHandle(self.next_handle.fetch_add(1, Ordering::Relaxed));
        self.chains.lock()[kind.index()].push(HookEntry { handle, scope, proc_ });
        debug!("[USER/Hooks] Set hook type {} -> {:?} ({:?})", kind.id(), handle, scope);
        handle
    }

    pub(crate) fn remove(&self, handle: HookHandle) -> bool {
        let mut chains = self.chains.lock();
        for chain in chains.iter_mut() {
            if let Some(pos) = chain.iter().position(|e| e.handle == handle) {
                chain.remove(pos);
                debug!("[USER/Hooks] Removed hook {:?}", handle);
                return true;
            }
        }
        false
    }

    /// Drop the task-scoped hooks of an exiting task
    pub(crate) fn remove_task(&self, task: TaskId) {
        let mut chains = self.chains.lock();
        for chain in chains.iter_mut() {
            chain.retain(|e| e.scope != HookScope::Task(task));
        }
    }

    pub(crate) fn is_hooked(&self, kind: HookKind, task: TaskId) -> bool {
        self.chains.lock()[kind.index()]
            .iter()
            .any(|e| e.scope.applies_to(task))
    }

    fn chain_for(&self, kind: HookKind, task: TaskId) -> Vec<Arc<dyn HookProc>> {
        self.chains.lock()[kind.index()]
            .iter()
            .filter(|e| e.scope.applies_to(task))
            .map(|e| e.proc_.clone())
            .collect()
    }

    pub(crate) fn count(&self, kind: HookKind) -> usize {
        self.chains.lock()[kind.index()].len()
    }
}

impl Task {
    /// Run the chain for `kind`; `Continue` when nothing is installed
    pub fn call_hooks(
        &self,
        kind: HookKind,
        code: i32,
        extra: usize,
        payload: &mut HookPayload<'_>,
    ) -> Verdict {
        let chain = self.shared.hooks.chain_for(kind, self.id());
        for proc_ in chain {
            let verdict = proc_.call(self, code, extra, payload);
            if verdict.is_veto() {
                trace!("[USER/Hooks] Hook type {} vetoed code {}", kind.id(), code);
                return verdict;
            }
        }
        Verdict::Continue
    }

    pub(crate) fn is_hooked(&self, kind: HookKind) -> bool {
        self.shared.hooks.is_hooked(kind, self.id())
    }

    pub fn install_hook<F>(&self, kind: HookKind, scope: HookScope, hook: F) -> HookHandle
    where
        F: Fn(&Task, i32, usize, &mut HookPayload<'_>) -> Verdict + Send + Sync + 'static,
    {
        self.shared.hooks.install(kind, scope, Arc::new(hook))
    }

    pub fn uninstall_hook(&self, handle: HookHandle) -> bool {
        self.shared.hooks.remove(handle)
    }
}

impl System {
    pub fn install_hook<F>(&self, kind: HookKind, scope: HookScope, hook: F) -> HookHandle
    where
        F: Fn(&Task, i32, usize, &mut HookPayload<'_>) -> Verdict + Send + Sync + 'static,
    {
        self.shared().hooks.install(kind, scope, Arc::new(hook))
    }

    pub fn install_hook_proc(&self, kind: HookKind, scope: HookScope, hook: Arc<dyn HookProc>) -> HookHandle {
        self.shared().hooks.install(kind, scope, hook)
    }

    pub fn uninstall_hook(&self, handle: HookHandle) -> bool {
        self.shared().hooks.remove(handle)
    }

    pub fn hook_count(&self, kind: HookKind) -> usize {
        self.shared().hooks.count(kind)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing;
    use parking_lot::Mutex;

    #[test]
    fn kind_ids_round_trip() {
        for id in WH_MSGFILTER..=WH_HARDWARE {
            let kind = HookKind::from_id(id).unwrap();
            assert_eq!(kind.id(), id);
            assert!(kind.index() < HookKind::COUNT);
        }
        assert_eq!(HookKind::from_id(9), None);
    }

    #[test]
    fn chain_order_and_short_circuit() {
        let (sys, _, _) = testing::system();
        let calls = Arc::new(Mutex::new(Vec::new()));

        let c = calls.clone();
        sys.install_hook(HookKind::Cbt, HookScope::Global, move |_, code, _, _| {
            c.lock().push(("first", code));
            Verdict::Continue
        });
        let c = calls.clone();
        let veto = sys.install_hook(HookKind::Cbt, HookScope::Global, move |_, code, _, _| {
            c.lock().push(("second", code));
            Verdict::Veto
        });
        let c = calls.clone();
        sys.install_hook(HookKind::Cbt, HookScope::Global, move |_, code, _, _| {
            c.lock().push(("third", code));
            Verdict::Continue
        });

        let verdicts = Arc::new(Mutex::new(Vec::new()));
        let v = verdicts.clone();
        let uninstalled = Arc::new(Mutex::new(false));
        let u = uninstalled.clone();
        let id = sys
            .spawn("hooks", move |task| {
                v.lock().push(task.call_hooks(HookKind::Cbt, HCBT_ACTIVATE, 0, &mut HookPayload::None));
                *u.lock() = task.uninstall_hook(veto);
                v.lock().push(task.call_hooks(HookKind::Cbt, HCBT_QS, 0, &mut HookPayload::None));
                0
            })
            .unwrap();
        assert_eq!(sys.join(id), Some(0));

        assert!(*uninstalled.lock());
        assert_eq!(*verdicts.lock(), vec![Verdict::Veto, Verdict::Continue]);
        assert_eq!(
            *calls.lock(),
            vec![
                ("first", HCBT_ACTIVATE),
                ("second", HCBT_ACTIVATE),
                ("first", HCBT_QS),
                ("third", HCBT_QS),
            ]
        );
    }

    #[test]
    fn empty_chain_continues() {
        let (sys, _, _) = testing::system();
        let verdict = Arc::new(Mutex::new(None));
        let v = verdict.clone();
        let id = sys
            .spawn("nohooks", move |task| {
                assert!(!task.is_hooked(HookKind::Mouse));
                *v.lock() = Some(task.call_hooks(HookKind::Mouse, HC_ACTION, 0, &mut HookPayload::None));
                0
            })
            .unwrap();
        assert_eq!(sys.join(id), Some(0));
        assert_eq!(*verdict.lock(), Some(Verdict::Continue));
    }

    #[test]
    fn task_scoped_hooks() {
        let (sys, _, _) = testing::system();
        let hits = Arc::new(Mutex::new(Vec::new()));

        let h = hits.clone();
        let a = sys
            .spawn("a", move |task| {
                let h = h.clone();
                task.install_hook(HookKind::GetMessage, HookScope::Task(task.id()), move |t, _, _, _| {
                    h.lock().push(t.id());
                    Verdict::Continue
                });
                task.call_hooks(HookKind::GetMessage, HC_ACTION, 0, &mut HookPayload::None);
                task.yield_now();
                0
            })
            .unwrap();
        let b = sys
            .spawn("b", move |task| {
                task.call_hooks(HookKind::GetMessage, HC_ACTION, 0, &mut HookPayload::None);
                0
            })
            .unwrap();
        sys.run_until_idle();
        assert_eq!(*hits.lock(), vec![a]);

        // exiting task drops its hooks
        assert_eq!(sys.join(a), Some(0));
        assert_eq!(sys.join(b), Some(0));
        assert_eq!(sys.hook_count(HookKind::GetMessage), 0);
    }

    #[test]
    fn payload_rewrite_is_visible() {
        let (sys, _, _) = testing::system();
        sys.install_hook(HookKind::GetMessage, HookScope::Global, |_, _, _, payload| {
            if let HookPayload::Message(msg) = payload {
                msg.wparam += 1;
            }
            Verdict::Continue
        });
        let seen = Arc::new(Mutex::new(0));
        let s = seen.clone();
        let id = sys
            .spawn("rewrite", move |task| {
                let mut msg = Message::new(HWND::NULL, crate::message::WM_USER, 41, 0);
                task.call_hooks(HookKind::GetMessage, HC_ACTION, 0, &mut HookPayload::Message(&mut msg));
                *s.lock() = msg.wparam;
                0
            })
            .unwrap();
        assert_eq!(sys.join(id), Some(0));
        assert_eq!(*seen.lock(), 42);
    }
}
