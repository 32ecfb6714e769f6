//! Error types for the rtloop daemon.
//!
//! Errors are handled at the boundary where they are detected:
//! - `SchedulingError` is logged by the worker and never stops the loop
//! - `ControlError` is reported by the control-plane commands
//! - `UsageError` becomes usage text and exit code 1
//!
//! **Panic-Free Policy:** No `.unwrap()`, `.expect()`, `panic!()`,
//! `unreachable!()`, or `todo!()` outside of tests.

use std::io;
use std::path::PathBuf;

use rtloop_core::PriorityLevel;
use thiserror::Error;

// ============================================================================
// Scheduling
// ============================================================================

/// The OS refused a priority change.
#[derive(Error, Debug)]
pub enum SchedulingError {
    /// `sched_setscheduler` rejected the request (range or privilege)
    #[error("scheduler rejected {level} priority {priority}: {source}")]
    Rejected {
        level: PriorityLevel,
        priority: u8,
        #[source]
        source: io::Error,
    },

    /// `sched_setscheduler` rejected a priority for the calling thread
    #[error("scheduler rejected priority {priority} for the calling thread: {source}")]
    ThreadRejected {
        priority: u8,
        #[source]
        source: io::Error,
    },

    /// The controller has not been bound to the worker thread yet
    #[error("priority controller is not attached to a worker thread")]
    NotAttached,

    /// Real-time scheduling is not available on this platform
    #[error("real-time scheduling is not supported on this platform")]
    Unsupported,
}

// ============================================================================
// Control Plane
// ============================================================================

/// Errors from the daemon controller and its runtime files.
#[derive(Error, Debug)]
pub enum ControlError {
    /// A worker is already running (or still exiting). Benign.
    #[error("already running")]
    AlreadyRunning,

    /// The worker thread could not be spawned
    #[error("Failed to spawn worker thread: {0}")]
    Spawn(#[source] io::Error),

    /// A runtime file could not be written or removed
    #[error("Failed to access {path}: {source}")]
    RunFile {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// The stop signal could not be delivered
    #[error("Failed to signal process {pid}: {source}")]
    Signal {
        pid: u32,
        #[source]
        source: io::Error,
    },
}

impl ControlError {
    /// Returns true for outcomes that are reported but exit successfully.
    pub fn is_benign(&self) -> bool {
        matches!(self, Self::AlreadyRunning)
    }
}

// ============================================================================
// Usage
// ============================================================================

/// Malformed command-line invocation.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum UsageError {
    /// No start/stop/status command was given
    #[error("missing command (try 'rtloopd start')")]
    MissingCommand,

    /// Unknown command, unknown flag, or a flag without its argument
    #[error("{0}")]
    Invalid(String),

    /// `--help` or `--version` was requested; carries the rendered text
    #[error("{0}")]
    HelpRequested(String),
}

impl UsageError {
    /// Process exit code for this outcome.
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::HelpRequested(_) => 0,
            Self::MissingCommand | Self::Invalid(_) => 1,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rejected_display() {
        let err = SchedulingError::Rejected {
            level: PriorityLevel::Main,
            priority: 80,
            source: io::Error::from_raw_os_error(libc::EPERM),
        };
        let display = err.to_string();
        assert!(display.contains("main"));
        assert!(display.contains("80"));
    }

    #[test]
    fn test_already_running_is_benign() {
        assert!(ControlError::AlreadyRunning.is_benign());
        assert!(!ControlError::Spawn(io::Error::other("no threads")).is_benign());
    }

    #[test]
    fn test_usage_exit_codes() {
        assert_eq!(UsageError::MissingCommand.exit_code(), 1);
        assert_eq!(UsageError::Invalid("bad".to_string()).exit_code(), 1);
        assert_eq!(UsageError::HelpRequested("help".to_string()).exit_code(), 0);
    }

    #[test]
    fn test_missing_command_display() {
        assert_eq!(
            UsageError::MissingCommand.to_string(),
            "missing command (try 'rtloopd start')"
        );
    }
}
