//! The worker's main loop driver.
//!
//! Each iteration moves through three phases:
//!
//! ```text
//! ┌─────────┐     ┌───────────┐     ┌─────────────┐
//! │  Armed  │────▶│ Executing │────▶│ Reconciling │──┐
//! └─────────┘     └───────────┘     └─────────────┘  │
//!      ▲                                              │
//!      └──────────────── idle yield ◀─────────────────┘
//! ```
//!
//! - Armed: a fresh watchdog is armed with the overrun budget
//! - Executing: the user loop body runs synchronously
//! - Reconciling: the watchdog is disarmed; after an overrun the priority is
//!   restored to `Main` and the overrun counted; then the idle slice is
//!   yielded unconditionally so lower-priority drivers always get to run

use std::sync::Arc;
use std::time::{Duration, Instant};

use rtloop_core::{PriorityLevel, TimingConfig};
use tracing::{info, warn};

use crate::board::{ControlLoop, Scheduler};
use crate::priority::{set_priority_logged, PriorityController};
use crate::shared::SharedState;
use crate::watchdog::OvertimeWatchdog;

/// Outcome of one iteration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IterationReport {
    /// Time spent in the loop body
    pub elapsed: Duration,

    /// Whether the watchdog fired during the iteration
    pub overran: bool,
}

/// Runs the user loop under the overtime watchdog until stop is requested.
pub struct MainLoop {
    timing: TimingConfig,
    shared: Arc<SharedState>,
    priority: Arc<dyn PriorityController>,
    watchdog: OvertimeWatchdog,
    scheduler: Box<dyn Scheduler>,
}

impl MainLoop {
    pub fn new(
        timing: TimingConfig,
        shared: Arc<SharedState>,
        priority: Arc<dyn PriorityController>,
        watchdog: OvertimeWatchdog,
        scheduler: Box<dyn Scheduler>,
    ) -> Self {
        Self {
            timing,
            shared,
            priority,
            watchdog,
            scheduler,
        }
    }

    /// Iterates until the daemon state becomes `ExitRequested`.
    ///
    /// Stop is observed only between iterations; an iteration in progress
    /// always completes. Nothing is cleaned up on exit.
    pub fn run(&mut self, control: &mut dyn ControlLoop) {
        info!(
            budget_ms = self.timing.overrun_budget_ms,
            idle_yield_us = self.timing.idle_yield_us,
            "Main loop started"
        );

        while !self.shared.exit_requested() {
            self.run_iteration(control);
        }

        let stats = self.shared.stats();
        info!(
            iterations = stats.iterations(),
            overruns = stats.overruns(),
            "Main loop finished"
        );
    }

    /// Runs a single arm → execute → reconcile → yield cycle.
    pub fn run_iteration(&mut self, control: &mut dyn ControlLoop) -> IterationReport {
        self.watchdog.arm(self.timing.overrun_budget());
        let started = Instant::now();

        control.run_iteration();

        let elapsed = started.elapsed();
        self.watchdog.disarm();

        let overran = self.shared.overtime();
        if overran {
            set_priority_logged(
                self.priority.as_ref(),
                PriorityLevel::Main,
                self.shared.stats(),
            );
            self.shared.clear_overtime();
            let overruns = self.shared.stats().record_overrun();
            warn!(
                overruns,
                elapsed_ms = elapsed.as_millis() as u64,
                budget_ms = self.timing.overrun_budget_ms,
                "Loop iteration overran budget, priority restored"
            );
        }
        self.shared.stats().record_iteration(elapsed);

        self.scheduler.sleep_microseconds(self.timing.idle_yield_us);

        IterationReport { elapsed, overran }
    }
}
