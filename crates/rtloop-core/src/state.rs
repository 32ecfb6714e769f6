//! Daemon lifecycle state and the status derived from it.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Lifecycle state of the daemon.
///
/// Transitions:
/// - `NotStarted -> Running` on `start`
/// - `Running -> ExitRequested` on `stop`
/// - back to `NotStarted` only when the worker terminates its loop
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DaemonState {
    /// No worker has been started (or the last one finished)
    #[default]
    NotStarted,

    /// A worker was spawned and no stop was requested
    Running,

    /// Stop requested; the worker exits at its next loop boundary
    ExitRequested,
}

impl DaemonState {
    /// Compact encoding for storage in an atomic.
    pub fn as_u8(self) -> u8 {
        match self {
            Self::NotStarted => 0,
            Self::Running => 1,
            Self::ExitRequested => 2,
        }
    }

    /// Decodes [`DaemonState::as_u8`], treating unknown values as `NotStarted`.
    pub fn from_u8(value: u8) -> Self {
        match value {
            1 => Self::Running,
            2 => Self::ExitRequested,
            _ => Self::NotStarted,
        }
    }
}

/// Status reported by the `status` command.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DaemonStatus {
    /// Nothing is running
    NotStarted,

    /// The worker runs its loop
    Running,

    /// Stop was requested and the worker has not finished yet
    Exiting,
}

impl DaemonStatus {
    /// Derives the reported status from the lifecycle state and worker liveness.
    ///
    /// - `Exiting` when stop was requested and the worker is still alive
    /// - `Running` when the state is `Running`
    /// - `NotStarted` otherwise
    pub fn from_parts(state: DaemonState, worker_alive: bool) -> Self {
        match state {
            DaemonState::ExitRequested if worker_alive => Self::Exiting,
            DaemonState::Running => Self::Running,
            _ => Self::NotStarted,
        }
    }

    /// Text used in the `status` command output.
    pub fn label(self) -> &'static str {
        match self {
            Self::NotStarted => "not started",
            Self::Running => "running",
            Self::Exiting => "exiting",
        }
    }
}

impl fmt::Display for DaemonStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_state_u8_encoding() {
        for state in [
            DaemonState::NotStarted,
            DaemonState::Running,
            DaemonState::ExitRequested,
        ] {
            assert_eq!(DaemonState::from_u8(state.as_u8()), state);
        }
        assert_eq!(DaemonState::from_u8(200), DaemonState::NotStarted);
    }

    #[test]
    fn test_status_exiting_requires_live_worker() {
        assert_eq!(
            DaemonStatus::from_parts(DaemonState::ExitRequested, true),
            DaemonStatus::Exiting
        );
        assert_eq!(
            DaemonStatus::from_parts(DaemonState::ExitRequested, false),
            DaemonStatus::NotStarted
        );
    }

    #[test]
    fn test_status_running() {
        assert_eq!(
            DaemonStatus::from_parts(DaemonState::Running, true),
            DaemonStatus::Running
        );
        // Between spawn and the worker's first instruction
        assert_eq!(
            DaemonStatus::from_parts(DaemonState::Running, false),
            DaemonStatus::Running
        );
    }

    #[test]
    fn test_status_not_started() {
        assert_eq!(
            DaemonStatus::from_parts(DaemonState::NotStarted, false),
            DaemonStatus::NotStarted
        );
    }

    #[test]
    fn test_status_labels() {
        assert_eq!(DaemonStatus::NotStarted.to_string(), "not started");
        assert_eq!(DaemonStatus::Running.to_string(), "running");
        assert_eq!(DaemonStatus::Exiting.to_string(), "exiting");
    }
}
