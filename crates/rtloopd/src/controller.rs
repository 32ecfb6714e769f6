//! Single-instance daemon controller.
//!
//! The controller owns the lifecycle of the one worker thread:
//!
//! ```text
//!             start                 stop
//! NotStarted ───────▶ Running ───────────▶ ExitRequested
//!     ▲                                         │
//!     └──────────── worker leaves its loop ─────┘
//! ```
//!
//! `start` spawns the worker and returns without waiting for it; `stop` only
//! raises the exit request, which the worker observes at its next iteration
//! boundary. The worker's join handle stays with the controller until
//! someone calls [`DaemonController::join`].
//!
//! # Panic-Free Guarantees
//!
//! - No `.unwrap()`, `.expect()`, `panic!()`, `unreachable!()`, `todo!()`
//! - A poisoned handle slot is recovered rather than propagated

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::thread::{self, JoinHandle};

use rtloop_core::{Config, DaemonStatus, DeviceConfig, PriorityLevel};
use tokio::runtime::Handle;
use tracing::{info, warn};

use crate::board::{Board, ControlLoop};
use crate::bringup::bring_up;
use crate::error::ControlError;
use crate::main_loop::MainLoop;
use crate::priority::{set_priority_logged, PriorityController};
use crate::shared::SharedState;
use crate::watchdog::OvertimeWatchdog;

/// Name given to the worker thread.
pub const WORKER_THREAD_NAME: &str = "rtloop-main";

/// Start/stop/status front for the worker thread.
pub struct DaemonController {
    config: Config,
    shared: Arc<SharedState>,
    priority: Arc<dyn PriorityController>,
    timer: Handle,
    worker: Mutex<Option<JoinHandle<()>>>,
}

impl DaemonController {
    /// Creates a controller in the `NotStarted` state.
    ///
    /// # Arguments
    ///
    /// * `config` - Timing, priority and baud settings handed to the worker
    /// * `priority` - Controller the worker binds to itself
    /// * `timer` - Runtime on which the overtime watchdog's timers run
    pub fn new(config: Config, priority: Arc<dyn PriorityController>, timer: Handle) -> Self {
        Self {
            config,
            shared: Arc::new(SharedState::new()),
            priority,
            timer,
            worker: Mutex::new(None),
        }
    }

    /// State shared with the worker.
    pub fn shared(&self) -> &Arc<SharedState> {
        &self.shared
    }

    pub fn status(&self) -> DaemonStatus {
        self.shared.status()
    }

    /// Configures the board's endpoints and spawns the worker.
    ///
    /// Returns immediately after the spawn.
    ///
    /// # Errors
    ///
    /// - `ControlError::AlreadyRunning` if a worker is running or exiting
    /// - `ControlError::Spawn` if the OS refused to create the thread
    pub fn start(
        &self,
        devices: &DeviceConfig,
        mut board: Board,
        control: Box<dyn ControlLoop>,
    ) -> Result<(), ControlError> {
        if !self.shared.try_begin_start() {
            info!(status = %self.status(), "Worker already running");
            return Err(ControlError::AlreadyRunning);
        }

        board.configure_endpoints(devices);
        info!(devices = %devices.banner(), "Starting worker");

        let worker = Worker {
            config: self.config.clone(),
            shared: Arc::clone(&self.shared),
            priority: Arc::clone(&self.priority),
            timer: self.timer.clone(),
        };

        let spawned = thread::Builder::new()
            .name(WORKER_THREAD_NAME.to_string())
            .stack_size(self.config.timing.worker_stack_bytes())
            .spawn(move || worker.run(board, control));

        match spawned {
            Ok(handle) => {
                *self.worker_slot() = Some(handle);
                Ok(())
            }
            Err(e) => {
                self.shared.abort_start();
                Err(ControlError::Spawn(e))
            }
        }
    }

    /// Requests a cooperative stop. Returns false if nothing was running.
    ///
    /// Does not wait for the worker.
    pub fn stop(&self) -> bool {
        let requested = self.shared.request_exit();
        if requested {
            info!("Stop requested");
        }
        requested
    }

    /// Takes the worker's join handle and waits for the thread to finish.
    ///
    /// Returns `None` if no worker was spawned or it was already joined;
    /// otherwise the thread's result (`Err` if the loop body panicked).
    pub fn join(&self) -> Option<thread::Result<()>> {
        let handle = self.worker_slot().take()?;
        Some(handle.join())
    }

    fn worker_slot(&self) -> MutexGuard<'_, Option<JoinHandle<()>>> {
        self.worker.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

// ============================================================================
// Worker
// ============================================================================

/// Everything the worker thread needs besides its collaborators.
struct Worker {
    config: Config,
    shared: Arc<SharedState>,
    priority: Arc<dyn PriorityController>,
    timer: Handle,
}

impl Worker {
    fn run(self, mut board: Board, mut control: Box<dyn ControlLoop>) {
        let _alive = AliveGuard::enter(&self.shared);
        info!("Worker started");

        if let Err(e) = self.priority.attach_current_thread() {
            self.shared.stats().record_scheduling_failure();
            warn!(error = %e, "Failed to bind priority controller to worker");
        }
        set_priority_logged(
            self.priority.as_ref(),
            PriorityLevel::Main,
            self.shared.stats(),
        );

        bring_up(
            &mut board,
            control.as_mut(),
            &self.config.baud,
            self.priority.as_ref(),
            self.shared.stats(),
        );

        // The remaining collaborators stay alive until the worker exits.
        let Board {
            transports: _transports,
            scheduler,
            rc_input: _rc_input,
            rc_output: _rc_output,
            analog_in: _analog_in,
            gpio: _gpio,
        } = board;

        let watchdog = OvertimeWatchdog::new(
            self.timer.clone(),
            Arc::clone(&self.shared),
            Arc::clone(&self.priority),
        );
        let mut driver = MainLoop::new(
            self.config.timing,
            Arc::clone(&self.shared),
            Arc::clone(&self.priority),
            watchdog,
            scheduler,
        );
        driver.run(control.as_mut());
    }
}

/// Marks the worker alive for its lifetime, including unwinding.
struct AliveGuard<'a> {
    shared: &'a SharedState,
}

impl<'a> AliveGuard<'a> {
    fn enter(shared: &'a SharedState) -> Self {
        shared.mark_worker_alive();
        Self { shared }
    }
}

impl Drop for AliveGuard<'_> {
    fn drop(&mut self) {
        self.shared.mark_worker_exited();
        if thread::panicking() {
            warn!("Worker exited while panicking");
        } else {
            info!("Worker exited");
        }
    }
}
