//! Lock-free sweep progress shared between the sweep worker and observers.

use std::sync::atomic::{AtomicU8, AtomicUsize, Ordering};

use tiltscan_types::{ProgressSnapshot, SweepState};

/// Atomic counters written by the sweep loop and read by anyone.
///
/// The sweep never blocks on a reader: each field is an independent atomic,
/// and counters only grow within a sweep.
#[derive(Debug, Default)]
pub struct ProgressTracker {
    completed: AtomicUsize,
    total: AtomicUsize,
    skipped: AtomicUsize,
    state: AtomicU8,
}

impl ProgressTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Reset the counters for a sweep of `total` poses and mark it running.
    pub fn begin(&self, total: usize) {
        self.completed.store(0, Ordering::Release);
        self.skipped.store(0, Ordering::Release);
        self.total.store(total, Ordering::Release);
        self.state.store(SweepState::Running.as_u8(), Ordering::Release);
    }

    /// Count one visited pose.
    pub fn advance(&self, skipped: bool) {
        if skipped {
            self.skipped.fetch_add(1, Ordering::AcqRel);
        }
        self.completed.fetch_add(1, Ordering::AcqRel);
    }

    pub fn finish(&self, state: SweepState) {
        self.state.store(state.as_u8(), Ordering::Release);
    }

    pub fn snapshot(&self) -> ProgressSnapshot {
        let state = SweepState::from_u8(self.state.load(Ordering::Acquire));
        ProgressSnapshot {
            completed: self.completed.load(Ordering::Acquire),
            total: self.total.load(Ordering::Acquire),
            skipped: self.skipped.load(Ordering::Acquire),
            running: state == SweepState::Running,
            state,
        }
    }
}
