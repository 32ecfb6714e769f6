//! One-shot overtime watchdog for loop iterations.
//!
//! Before each iteration the main loop arms the watchdog with the overrun
//! budget. If the iteration is still running when the budget elapses, the
//! timer callback demotes the worker to [`PriorityLevel::Overtime`] and sets
//! the overtime flag, so a loop spinning on a lower-priority driver gives
//! that driver CPU time. The loop body needs no cooperation for this.
//!
//! # Arming Protocol
//!
//! A single atomic slot holds the generation of the armed timer:
//!
//! ```text
//!   IDLE ──arm──▶ gen ──expiry──▶ FIRING ──▶ IDLE
//!                  │
//!                  └──disarm──▶ IDLE
//! ```
//!
//! Expiry only fires if it wins the `gen -> FIRING` exchange, so a timer
//! that was cancelled, or superseded by a later `arm`, can never fire.
//! `disarm` waits out an in-flight `FIRING` (a bounded syscall plus a
//! store) so the loop always sees the flag of a watchdog that fired.
//!
//! # Timer Thread
//!
//! The timer must preempt a worker spinning at `main` priority, so in the
//! daemon its timers run on a [`WatchdogTimer`]: a current-thread tokio
//! runtime on its own thread at `SCHED_FIFO` priority `priority.watchdog`.

use std::io;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{mpsc, Arc};
use std::thread;
use std::time::Duration;

use rtloop_core::PriorityLevel;
use tokio::runtime::{Builder, Handle};
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tracing::{info, warn};

use crate::error::ControlError;
use crate::priority::{promote_current_thread, PriorityController};
use crate::shared::SharedState;

const IDLE: u64 = 0;
const FIRING: u64 = u64::MAX;

/// Spins on an in-flight firing before backing off to short sleeps.
const FIRING_SPINS: u32 = 64;
const FIRING_BACKOFF: Duration = Duration::from_micros(20);

/// Name given to the timer thread.
pub const TIMER_THREAD_NAME: &str = "rtloop-watchdog";

/// Cancellable one-shot timer that demotes the worker on expiry.
///
/// Owned by the main loop driver; at most one timer is pending at a time.
pub struct OvertimeWatchdog {
    timer: Handle,
    shared: Arc<SharedState>,
    priority: Arc<dyn PriorityController>,
    slot: Arc<AtomicU64>,
    generation: u64,
    pending: Option<JoinHandle<()>>,
}

impl OvertimeWatchdog {
    /// Creates a disarmed watchdog whose timers run on `timer`.
    pub fn new(
        timer: Handle,
        shared: Arc<SharedState>,
        priority: Arc<dyn PriorityController>,
    ) -> Self {
        Self {
            timer,
            shared,
            priority,
            slot: Arc::new(AtomicU64::new(IDLE)),
            generation: IDLE,
            pending: None,
        }
    }

    /// Schedules expiry `budget` from now, cancelling any pending timer first.
    pub fn arm(&mut self, budget: Duration) {
        self.disarm();

        self.generation = next_generation(self.generation);
        let generation = self.generation;
        self.slot.store(generation, Ordering::Release);

        let slot = Arc::clone(&self.slot);
        let shared = Arc::clone(&self.shared);
        let priority = Arc::clone(&self.priority);
        self.pending = Some(self.timer.spawn(async move {
            tokio::time::sleep(budget).await;
            expire(&slot, generation, &shared, priority.as_ref());
        }));
    }

    /// Cancels the pending timer. No-op if it already fired or was cancelled.
    pub fn disarm(&mut self) {
        let mut spins = 0u32;
        loop {
            let current = self.slot.load(Ordering::Acquire);
            match current {
                IDLE => break,
                FIRING if spins < FIRING_SPINS => {
                    spins += 1;
                    std::hint::spin_loop();
                    thread::yield_now();
                }
                // Sleeping lets a timer thread the worker preempted finish
                FIRING => thread::sleep(FIRING_BACKOFF),
                armed => {
                    if self
                        .slot
                        .compare_exchange(armed, IDLE, Ordering::AcqRel, Ordering::Acquire)
                        .is_ok()
                    {
                        break;
                    }
                }
            }
        }

        if let Some(task) = self.pending.take() {
            task.abort();
        }
    }

    /// Whether a timer is pending.
    pub fn is_armed(&self) -> bool {
        !matches!(self.slot.load(Ordering::Acquire), IDLE)
    }
}

impl Drop for OvertimeWatchdog {
    fn drop(&mut self) {
        self.disarm();
    }
}

/// Generation counter that never lands on the sentinel values.
fn next_generation(current: u64) -> u64 {
    match current.wrapping_add(1) {
        IDLE | FIRING => 1,
        next => next,
    }
}

/// Timer callback body. Bounded, non-blocking and allocation-free.
fn expire(
    slot: &AtomicU64,
    generation: u64,
    shared: &SharedState,
    priority: &dyn PriorityController,
) {
    if slot
        .compare_exchange(generation, FIRING, Ordering::AcqRel, Ordering::Acquire)
        .is_err()
    {
        return;
    }

    if priority.set_priority(PriorityLevel::Overtime).is_err() {
        shared.stats().record_scheduling_failure();
    }
    shared.set_overtime();

    slot.store(IDLE, Ordering::Release);
}

// ============================================================================
// Timer Thread
// ============================================================================

/// Dedicated thread running the watchdog's timers above the worker.
///
/// Dropping it stops the runtime and joins the thread; pending timers are
/// discarded.
pub struct WatchdogTimer {
    handle: Handle,
    shutdown: Option<oneshot::Sender<()>>,
    thread: Option<thread::JoinHandle<()>>,
}

impl WatchdogTimer {
    /// Spawns the timer thread and moves it to `SCHED_FIFO` at `priority`.
    ///
    /// A rejected priority is logged and the thread keeps running at its
    /// default priority.
    ///
    /// # Errors
    ///
    /// - `ControlError::Spawn` if the thread or its runtime cannot be created
    pub fn spawn(priority: u8) -> Result<Self, ControlError> {
        let (handle_tx, handle_rx) = mpsc::channel::<io::Result<Handle>>();
        let (shutdown_tx, shutdown_rx) = oneshot::channel::<()>();

        let thread = thread::Builder::new()
            .name(TIMER_THREAD_NAME.to_string())
            .spawn(move || {
                let runtime = match Builder::new_current_thread().enable_time().build() {
                    Ok(runtime) => runtime,
                    Err(e) => {
                        let _ = handle_tx.send(Err(e));
                        return;
                    }
                };

                match promote_current_thread(priority) {
                    Ok(()) => info!(priority, "Watchdog timer thread running at SCHED_FIFO"),
                    Err(e) => warn!(error = %e, "Watchdog timer thread keeps default priority"),
                }

                if handle_tx.send(Ok(runtime.handle().clone())).is_err() {
                    return;
                }
                runtime.block_on(async {
                    let _ = shutdown_rx.await;
                });
            })
            .map_err(ControlError::Spawn)?;

        let handle = match handle_rx.recv() {
            Ok(Ok(handle)) => handle,
            Ok(Err(e)) => return Err(ControlError::Spawn(e)),
            Err(_) => {
                return Err(ControlError::Spawn(io::Error::other(
                    "watchdog timer thread exited during startup",
                )))
            }
        };

        Ok(Self {
            handle,
            shutdown: Some(shutdown_tx),
            thread: Some(thread),
        })
    }

    /// Runtime handle to pass to [`OvertimeWatchdog::new`].
    pub fn handle(&self) -> Handle {
        self.handle.clone()
    }
}

impl Drop for WatchdogTimer {
    fn drop(&mut self) {
        if let Some(shutdown) = self.shutdown.take() {
            let _ = shutdown.send(());
        }
        if let Some(thread) = self.thread.take() {
            if thread.join().is_err() {
                warn!("Watchdog timer thread panicked");
            }
        }
    }
}
