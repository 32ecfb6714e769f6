//! Real-time priority control for the worker thread.
//!
//! The worker binds the controller to itself once, after which any thread
//! (notably the overtime watchdog) can move the worker between priority
//! levels. On Linux this is `sched_setscheduler(tid, SCHED_FIFO, ..)`;
//! elsewhere every request fails with [`SchedulingError::Unsupported`].

use std::sync::atomic::{AtomicI32, AtomicU8, Ordering};

use rtloop_core::{PriorityConfig, PriorityLevel};
use tracing::{debug, warn};

use crate::error::SchedulingError;
use crate::shared::LoopStats;

/// Capability to change the scheduling priority of one worker task.
///
/// Implementations are called from the watchdog's timer context, so
/// `set_priority` must be bounded and must not block or allocate.
pub trait PriorityController: Send + Sync {
    /// Binds the controller to the calling thread.
    fn attach_current_thread(&self) -> Result<(), SchedulingError> {
        Ok(())
    }

    /// Applies `level` to the bound worker.
    fn set_priority(&self, level: PriorityLevel) -> Result<(), SchedulingError>;

    /// Level most recently applied successfully.
    fn current_priority(&self) -> Option<PriorityLevel>;
}

/// Applies a priority level, logging and counting a rejection.
///
/// Scheduling failures are never fatal: the loop keeps running at whatever
/// priority remains in effect. Returns whether the change was applied.
pub fn set_priority_logged(
    controller: &dyn PriorityController,
    level: PriorityLevel,
    stats: &LoopStats,
) -> bool {
    match controller.set_priority(level) {
        Ok(()) => {
            debug!(level = %level, "Worker priority changed");
            true
        }
        Err(e) => {
            stats.record_scheduling_failure();
            warn!(error = %e, level = %level, "Failed to set worker priority");
            false
        }
    }
}

// ============================================================================
// SCHED_FIFO Controller
// ============================================================================

/// `SCHED_FIFO` priority controller.
///
/// Maps [`PriorityLevel`]s to OS priorities through [`PriorityConfig`].
#[derive(Debug)]
pub struct FifoPriorityController {
    priorities: PriorityConfig,
    /// Kernel thread id of the worker, 0 until attached
    tid: AtomicI32,
    current: AtomicU8,
}

impl FifoPriorityController {
    pub fn new(priorities: PriorityConfig) -> Self {
        Self {
            priorities,
            tid: AtomicI32::new(0),
            current: AtomicU8::new(0),
        }
    }

    /// Kernel thread id of the bound worker, if attached.
    pub fn worker_tid(&self) -> Option<i32> {
        match self.tid.load(Ordering::Acquire) {
            0 => None,
            tid => Some(tid),
        }
    }
}

#[cfg(target_os = "linux")]
impl PriorityController for FifoPriorityController {
    fn attach_current_thread(&self) -> Result<(), SchedulingError> {
        // SAFETY: gettid takes no arguments and cannot fail.
        let tid = unsafe { libc::syscall(libc::SYS_gettid) } as libc::pid_t;
        self.tid.store(tid, Ordering::Release);
        debug!(tid, "Priority controller attached to worker thread");
        Ok(())
    }

    fn set_priority(&self, level: PriorityLevel) -> Result<(), SchedulingError> {
        let tid = self.worker_tid().ok_or(SchedulingError::NotAttached)?;
        let priority = self.priorities.value(level);

        sched_fifo(tid, priority).map_err(|source| SchedulingError::Rejected {
            level,
            priority,
            source,
        })?;

        self.current.store(level.as_u8(), Ordering::Release);
        Ok(())
    }

    fn current_priority(&self) -> Option<PriorityLevel> {
        PriorityLevel::from_u8(self.current.load(Ordering::Acquire))
    }
}

#[cfg(not(target_os = "linux"))]
impl PriorityController for FifoPriorityController {
    fn set_priority(&self, _level: PriorityLevel) -> Result<(), SchedulingError> {
        Err(SchedulingError::Unsupported)
    }

    fn current_priority(&self) -> Option<PriorityLevel> {
        PriorityLevel::from_u8(self.current.load(Ordering::Acquire))
    }
}

/// Moves the calling thread to `SCHED_FIFO` at `priority`.
///
/// Used for threads that must preempt the worker, such as the watchdog
/// timer thread.
#[cfg(target_os = "linux")]
pub fn promote_current_thread(priority: u8) -> Result<(), SchedulingError> {
    // tid 0 addresses the calling thread
    sched_fifo(0, priority).map_err(|source| SchedulingError::ThreadRejected { priority, source })
}

#[cfg(not(target_os = "linux"))]
pub fn promote_current_thread(_priority: u8) -> Result<(), SchedulingError> {
    Err(SchedulingError::Unsupported)
}

#[cfg(target_os = "linux")]
fn sched_fifo(tid: libc::pid_t, priority: u8) -> std::io::Result<()> {
    // SAFETY: sched_param is plain old data; zeroed is a valid value and
    // leaves platform-specific padding fields cleared.
    let mut param: libc::sched_param = unsafe { std::mem::zeroed() };
    param.sched_priority = libc::c_int::from(priority);

    // SAFETY: `param` outlives the call; `tid` is 0 or a thread of this process.
    let rc = unsafe { libc::sched_setscheduler(tid, libc::SCHED_FIFO, &param) };
    if rc != 0 {
        return Err(std::io::Error::last_os_error());
    }
    Ok(())
}
