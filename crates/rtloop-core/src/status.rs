//! Serializable loop statistics and daemon status snapshots.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::priority::PriorityLevel;
use crate::state::{DaemonState, DaemonStatus};

/// Point-in-time copy of the loop counters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct LoopStatsSnapshot {
    /// Completed loop iterations
    pub iterations: u64,

    /// Iterations during which the watchdog fired
    pub overruns: u64,

    /// Priority changes the scheduler rejected
    pub scheduling_failures: u64,

    /// Duration of the most recent iteration (callback only), in microseconds
    pub last_iteration_us: u64,

    /// Longest iteration seen, in microseconds
    pub max_iteration_us: u64,

    /// Mean iteration duration, in microseconds
    pub mean_iteration_us: u64,
}

impl LoopStatsSnapshot {
    /// Overruns as a fraction of iterations (0.0 when idle).
    pub fn overrun_ratio(&self) -> f64 {
        if self.iterations == 0 {
            return 0.0;
        }
        self.overruns as f64 / self.iterations as f64
    }
}

/// Status of a daemon process, published to its runtime directory so that
/// separate `status` invocations can report it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatusSnapshot {
    /// PID of the daemon process
    pub pid: u32,

    /// Lifecycle state at publish time
    pub state: DaemonState,

    /// Whether the worker thread was alive at publish time
    pub worker_alive: bool,

    /// Priority level last applied to the worker
    pub priority: Option<PriorityLevel>,

    /// Loop counters
    pub loop_stats: LoopStatsSnapshot,

    /// Daemon CPU usage (percent of one core)
    pub cpu_percent: f32,

    /// Daemon resident memory in MB
    pub memory_mb: u64,

    pub started_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl StatusSnapshot {
    /// Status derived from the published state.
    pub fn status(&self) -> DaemonStatus {
        DaemonStatus::from_parts(self.state, self.worker_alive)
    }

    /// Encodes the snapshot as pretty JSON.
    pub fn encode(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }

    /// Decodes a snapshot written by [`StatusSnapshot::encode`].
    pub fn decode(contents: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(contents)
    }
}
