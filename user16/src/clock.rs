//! System tick
//!
//! Millisecond tick used to stamp messages, drive timers and measure
//! double-click intervals. Wraps at `u32::MAX`; compare with
//! `wrapping_sub`.

use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Instant;

#[derive(Debug)]
pub(crate) enum Clock {
    /// Milliseconds since system creation
    Realtime(Instant),
    /// Advanced explicitly
    Manual(AtomicU32),
}

impl Clock {
    pub(crate) fn new(manual: bool) -> Self {
        if manual {
            Clock::Manual(AtomicU32::new(0))
        } else {
            Clock::Realtime(Instant::now())
        }
    }

    pub(crate) fn now(&self) -> u32 {
        match self {
            Clock::Realtime(start) => start.elapsed().as_millis() as u32,
            Clock::Manual(ticks) => ticks.load(Ordering::Acquire),
        }
    }

    /// Returns false for a realtime clock
    pub(crate) fn advance(&self, ms: u32) -> bool {
        match self {
            Clock::Realtime(_) => false,
            Clock::Manual(ticks) => {
                ticks.fetch_add(ms, Ordering::AcqRel);
                true
            }
        }
    }
}

/// `now` is at or past `deadline`, tolerating wraparound
pub(crate) fn tick_reached(now: u32, deadline: u32) -> bool {
    (now.wrapping_sub(deadline) as i32) >= 0
}
