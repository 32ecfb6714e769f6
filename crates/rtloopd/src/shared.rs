//! State shared between the control plane, the worker and the watchdog.
//!
//! Every field is an atomic with a single writer per transition, so no
//! lock is ever held across the worker/control-plane boundary:
//!
//! | field          | set by                        | cleared by                 |
//! |----------------|-------------------------------|----------------------------|
//! | `state`        | `start` (Running), `stop` (ExitRequested) | worker exit (NotStarted) |
//! | `worker_alive` | worker entry                  | worker exit                |
//! | `overtime`     | watchdog expiry               | main loop reconcile        |
//!
//! A reader may observe a stale value for at most one scheduling quantum.

use std::sync::atomic::{AtomicBool, AtomicU64, AtomicU8, Ordering};
use std::time::Duration;

use rtloop_core::{DaemonState, DaemonStatus, LoopStatsSnapshot};

// ============================================================================
// Shared State
// ============================================================================

/// Process-wide daemon flags plus loop counters.
#[derive(Debug, Default)]
pub struct SharedState {
    state: AtomicU8,
    worker_alive: AtomicBool,
    overtime: AtomicBool,
    stats: LoopStats,
}

impl SharedState {
    /// Creates state for a daemon that has not started.
    pub fn new() -> Self {
        Self::default()
    }

    /// Current lifecycle state.
    pub fn state(&self) -> DaemonState {
        DaemonState::from_u8(self.state.load(Ordering::Acquire))
    }

    /// Status as reported by the `status` command.
    pub fn status(&self) -> DaemonStatus {
        DaemonStatus::from_parts(self.state(), self.worker_alive())
    }

    /// Loop continuation check.
    pub fn exit_requested(&self) -> bool {
        self.state() == DaemonState::ExitRequested
    }

    pub fn worker_alive(&self) -> bool {
        self.worker_alive.load(Ordering::Acquire)
    }

    /// Whether the watchdog fired and the loop has not reacted yet.
    pub fn overtime(&self) -> bool {
        self.overtime.load(Ordering::Acquire)
    }

    pub fn stats(&self) -> &LoopStats {
        &self.stats
    }

    /// `NotStarted -> Running`. Returns false if an instance exists.
    pub(crate) fn try_begin_start(&self) -> bool {
        self.state
            .compare_exchange(
                DaemonState::NotStarted.as_u8(),
                DaemonState::Running.as_u8(),
                Ordering::AcqRel,
                Ordering::Acquire,
            )
            .is_ok()
    }

    /// Rolls back [`SharedState::try_begin_start`] when no worker could be spawned.
    pub(crate) fn abort_start(&self) {
        self.state
            .store(DaemonState::NotStarted.as_u8(), Ordering::Release);
    }

    /// `Running -> ExitRequested`. Returns false if nothing was running.
    pub(crate) fn request_exit(&self) -> bool {
        self.state
            .compare_exchange(
                DaemonState::Running.as_u8(),
                DaemonState::ExitRequested.as_u8(),
                Ordering::AcqRel,
                Ordering::Acquire,
            )
            .is_ok()
    }

    pub(crate) fn mark_worker_alive(&self) {
        self.worker_alive.store(true, Ordering::Release);
    }

    /// Liveness is cleared before the state so a new `start` can never
    /// race with the exiting worker's bookkeeping.
    pub(crate) fn mark_worker_exited(&self) {
        self.worker_alive.store(false, Ordering::Release);
        self.state
            .store(DaemonState::NotStarted.as_u8(), Ordering::Release);
    }

    /// Watchdog side. Must stay non-blocking and allocation-free.
    pub(crate) fn set_overtime(&self) {
        self.overtime.store(true, Ordering::Release);
    }

    /// Main loop side.
    pub(crate) fn clear_overtime(&self) {
        self.overtime.store(false, Ordering::Release);
    }
}

// ============================================================================
// Loop Statistics
// ============================================================================

/// Iteration timing and overrun counters (observability only).
#[derive(Debug, Default)]
pub struct LoopStats {
    iterations: AtomicU64,
    overruns: AtomicU64,
    scheduling_failures: AtomicU64,
    last_iteration_us: AtomicU64,
    max_iteration_us: AtomicU64,
    total_iteration_us: AtomicU64,
}

impl LoopStats {
    /// Records one completed iteration of the user loop.
    pub fn record_iteration(&self, elapsed: Duration) {
        let micros = u64::try_from(elapsed.as_micros()).unwrap_or(u64::MAX);
        self.iterations.fetch_add(1, Ordering::Relaxed);
        self.last_iteration_us.store(micros, Ordering::Relaxed);
        self.max_iteration_us.fetch_max(micros, Ordering::Relaxed);
        self.total_iteration_us
            .fetch_add(micros, Ordering::Relaxed);
    }

    /// Counts an overrun and returns the new total.
    pub fn record_overrun(&self) -> u64 {
        self.overruns.fetch_add(1, Ordering::Relaxed) + 1
    }

    /// Counts a rejected priority change. Safe to call from the watchdog.
    pub fn record_scheduling_failure(&self) {
        self.scheduling_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub fn iterations(&self) -> u64 {
        self.iterations.load(Ordering::Relaxed)
    }

    pub fn overruns(&self) -> u64 {
        self.overruns.load(Ordering::Relaxed)
    }

    pub fn scheduling_failures(&self) -> u64 {
        self.scheduling_failures.load(Ordering::Relaxed)
    }

    /// Copies the counters into a serializable snapshot.
    pub fn snapshot(&self) -> LoopStatsSnapshot {
        let iterations = self.iterations();
        let total = self.total_iteration_us.load(Ordering::Relaxed);
        LoopStatsSnapshot {
            iterations,
            overruns: self.overruns(),
            scheduling_failures: self.scheduling_failures(),
            last_iteration_us: self.last_iteration_us.load(Ordering::Relaxed),
            max_iteration_us: self.max_iteration_us.load(Ordering::Relaxed),
            mean_iteration_us: total.checked_div(iterations).unwrap_or(0),
        }
    }
}
