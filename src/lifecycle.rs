//! Audit Cycle Lifecycle
//!
//! Tracks where the scheduler is in its cycle:
//! - **Idle**: waiting for the next tick, last cycle completed
//! - **Running**: a cycle is in progress
//! - **Error**: waiting for the next tick, last cycle was skipped
//!
//! Also keeps running totals for the engine.

use serde::Serialize;
use std::sync::atomic::{AtomicU64, AtomicU8, Ordering};
use tracing::debug;

/// Cycle states
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
#[repr(u8)]
pub enum CycleState {
    Idle = 0,
    Running = 1,
    Error = 2,
}

impl From<u8> for CycleState {
    fn from(v: u8) -> Self {
        match v {
            1 => CycleState::Running,
            2 => CycleState::Error,
            _ => CycleState::Idle,
        }
    }
}

/// Shared cycle state cell
#[derive(Debug)]
pub struct CycleTracker {
    state: AtomicU8,
}

impl Default for CycleTracker {
    fn default() -> Self {
        Self {
            state: AtomicU8::new(CycleState::Idle as u8),
        }
    }
}

impl CycleTracker {
    pub fn current(&self) -> CycleState {
        CycleState::from(self.state.load(Ordering::SeqCst))
    }

    pub fn is_running(&self) -> bool {
        self.current() == CycleState::Running
    }

    fn transition_to(&self, new_state: CycleState) {
        let old = self.state.swap(new_state as u8, Ordering::SeqCst);
        if old != new_state as u8 {
            debug!("Audit cycle: {:?} -> {:?}", CycleState::from(old), new_state);
        }
    }
}

/// Marks a cycle as running until it is finished or dropped
///
/// Dropping without `complete()` (early return, panic, cancelled future)
/// leaves the tracker in `Error`.
pub struct CycleGuard<'a> {
    tracker: &'a CycleTracker,
    succeeded: bool,
}

impl<'a> CycleGuard<'a> {
    pub fn enter(tracker: &'a CycleTracker) -> Self {
        tracker.transition_to(CycleState::Running);
        Self {
            tracker,
            succeeded: false,
        }
    }

    pub fn complete(mut self) {
        self.succeeded = true;
    }
}

impl Drop for CycleGuard<'_> {
    fn drop(&mut self) {
        let next = if self.succeeded {
            CycleState::Idle
        } else {
            CycleState::Error
        };
        self.tracker.transition_to(next);
    }
}

/// Running totals across cycles
#[derive(Debug, Default)]
pub struct AuditStats {
    pub cycles_run: AtomicU64,
    pub cycles_skipped: AtomicU64,
    pub violations_detected: AtomicU64,
    pub violations_resolved: AtomicU64,
    pub remediations_attempted: AtomicU64,
    pub remediations_succeeded: AtomicU64,
    pub notifications_sent: AtomicU64,
    pub notifications_failed: AtomicU64,
}

impl AuditStats {
    pub fn snapshot(&self) -> AuditStatsSnapshot {
        AuditStatsSnapshot {
            cycles_run: self.cycles_run.load(Ordering::Relaxed),
            cycles_skipped: self.cycles_skipped.load(Ordering::Relaxed),
            violations_detected: self.violations_detected.load(Ordering::Relaxed),
            violations_resolved: self.violations_resolved.load(Ordering::Relaxed),
            remediations_attempted: self.remediations_attempted.load(Ordering::Relaxed),
            remediations_succeeded: self.remediations_succeeded.load(Ordering::Relaxed),
            notifications_sent: self.notifications_sent.load(Ordering::Relaxed),
            notifications_failed: self.notifications_failed.load(Ordering::Relaxed),
        }
    }

    pub(crate) fn add(counter: &AtomicU64, n: usize) {
        counter.fetch_add(n as u64, Ordering::Relaxed);
    }
}

/// Point-in-time copy of `AuditStats`
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct AuditStatsSnapshot {
    pub cycles_run: u64,
    pub cycles_skipped: u64,
    pub violations_detected: u64,
    pub violations_resolved: u64,
    pub remediations_attempted: u64,
    pub remediations_succeeded: u64,
    pub notifications_sent: u64,
    pub notifications_failed: u64,
}
