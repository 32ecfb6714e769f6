//! Loop and process monitoring for the rtloop daemon.
//!
//! Periodically:
//! - samples the daemon's CPU and memory usage
//! - logs loop statistics, warning when new overruns occurred
//! - publishes a [`StatusSnapshot`] for `rtloopd status`
//!
//! A snapshot can also be published on demand (after start and stop) via
//! the task's `Notify`.

use std::process;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use rtloop_core::StatusSnapshot;
use sysinfo::{Pid, System};
use tokio::sync::Notify;
use tokio::time::interval;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::priority::PriorityController;
use crate::rundir::RunDir;
use crate::shared::SharedState;

// ============================================================================
// Process Sampler
// ============================================================================

/// CPU / memory reading of the daemon process.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct ProcessUsage {
    pub cpu_percent: f32,
    pub memory_mb: u64,
}

/// Samples resource usage of the current process with `sysinfo`.
///
/// CPU usage is relative to the previous sample, so the first reading
/// is usually 0.
pub struct ProcessSampler {
    system: System,
    pid: Pid,
}

impl ProcessSampler {
    pub fn new() -> Self {
        Self {
            system: System::new(),
            pid: Pid::from_u32(process::id()),
        }
    }

    pub fn sample(&mut self) -> ProcessUsage {
        // CPU percentages are only computed by a full refresh
        self.system.refresh_all();

        self.system
            .process(self.pid)
            .map(|p| ProcessUsage {
                cpu_percent: p.cpu_usage(),
                memory_mb: p.memory() / 1024 / 1024,
            })
            .unwrap_or_default()
    }
}

impl Default for ProcessSampler {
    fn default() -> Self {
        Self::new()
    }
}

// ============================================================================
// Status Publisher
// ============================================================================

/// Builds status snapshots and writes them to the runtime directory.
pub struct StatusPublisher {
    run_dir: RunDir,
    shared: Arc<SharedState>,
    priority: Arc<dyn PriorityController>,
    sampler: ProcessSampler,
    started_at: DateTime<Utc>,
    reported_overruns: u64,
}

impl StatusPublisher {
    pub fn new(
        run_dir: RunDir,
        shared: Arc<SharedState>,
        priority: Arc<dyn PriorityController>,
    ) -> Self {
        Self {
            run_dir,
            shared,
            priority,
            sampler: ProcessSampler::new(),
            started_at: Utc::now(),
            reported_overruns: 0,
        }
    }

    /// Captures the current state.
    pub fn snapshot(&mut self) -> StatusSnapshot {
        let usage = self.sampler.sample();
        StatusSnapshot {
            pid: process::id(),
            state: self.shared.state(),
            worker_alive: self.shared.worker_alive(),
            priority: self.priority.current_priority(),
            loop_stats: self.shared.stats().snapshot(),
            cpu_percent: usage.cpu_percent,
            memory_mb: usage.memory_mb,
            started_at: self.started_at,
            updated_at: Utc::now(),
        }
    }

    /// Captures and writes a snapshot. Write failures are logged.
    pub fn publish(&mut self) -> StatusSnapshot {
        let snapshot = self.snapshot();
        if let Err(e) = self.run_dir.write_snapshot(&snapshot) {
            warn!(error = %e, "Failed to publish status snapshot");
        }
        snapshot
    }

    /// Logs loop statistics, warning if overruns happened since the last call.
    fn log_snapshot(&mut self, snapshot: &StatusSnapshot) {
        let stats = &snapshot.loop_stats;
        let new_overruns = stats.overruns.saturating_sub(self.reported_overruns);
        self.reported_overruns = stats.overruns;

        if new_overruns > 0 {
            warn!(
                new_overruns,
                overruns = stats.overruns,
                iterations = stats.iterations,
                max_iteration_us = stats.max_iteration_us,
                "Loop overruns since last report"
            );
        } else {
            info!(
                iterations = stats.iterations,
                mean_iteration_us = stats.mean_iteration_us,
                max_iteration_us = stats.max_iteration_us,
                cpu_percent = format!("{:.1}", snapshot.cpu_percent),
                memory_mb = snapshot.memory_mb,
                "Loop status"
            );
        }
        if stats.scheduling_failures > 0 {
            debug!(
                scheduling_failures = stats.scheduling_failures,
                "Priority changes rejected so far"
            );
        }
    }
}

/// Spawns the monitoring task.
///
/// Publishes every `period` and whenever `publish_now` is notified, until
/// `cancel_token` is cancelled.
pub fn spawn_monitor_task(
    mut publisher: StatusPublisher,
    period: Duration,
    publish_now: Arc<Notify>,
    cancel_token: CancellationToken,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut tick = interval(period);

        info!(interval_ms = period.as_millis() as u64, "Loop monitor started");

        loop {
            tokio::select! {
                biased;

                _ = cancel_token.cancelled() => {
                    info!("Loop monitor shutting down");
                    break;
                }

                _ = publish_now.notified() => {
                    let snapshot = publisher.publish();
                    debug!(state = ?snapshot.state, "Published status on request");
                }

                _ = tick.tick() => {
                    let snapshot = publisher.publish();
                    publisher.log_snapshot(&snapshot);
                }
            }
        }

        debug!("Loop monitor task completed");
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::SchedulingError;
    use rtloop_core::{DaemonState, PriorityLevel};

    struct FixedPriority;

    impl PriorityController for FixedPriority {
        fn set_priority(&self, _level: PriorityLevel) -> Result<(), SchedulingError> {
            Ok(())
        }

        fn current_priority(&self) -> Option<PriorityLevel> {
            Some(PriorityLevel::Main)
        }
    }

    #[test]
    fn test_sampler_reports_memory() {
        let mut sampler = ProcessSampler::new();
        let usage = sampler.sample();
        assert!(usage.cpu_percent >= 0.0);
    }

    #[test]
    fn test_publish_writes_snapshot() {
        let temp = tempfile::tempdir().unwrap();
        let run_dir = RunDir::new(temp.path());
        let shared = Arc::new(SharedState::new());
        shared.stats().record_iteration(Duration::from_micros(500));

        let mut publisher =
            StatusPublisher::new(run_dir.clone(), shared, Arc::new(FixedPriority));
        let published = publisher.publish();

        let read = run_dir.read_snapshot().unwrap();
        assert_eq!(read.pid, process::id());
        assert_eq!(read.state, DaemonState::NotStarted);
        assert_eq!(read.priority, Some(PriorityLevel::Main));
        assert_eq!(read.loop_stats.iterations, 1);
        assert_eq!(read.loop_stats, published.loop_stats);
    }

    #[test]
    fn test_log_snapshot_tracks_overruns() {
        let temp = tempfile::tempdir().unwrap();
        let shared = Arc::new(SharedState::new());
        let mut publisher = StatusPublisher::new(
            RunDir::new(temp.path()),
            shared.clone(),
            Arc::new(FixedPriority),
        );

        shared.stats().record_overrun();
        let snapshot = publisher.snapshot();
        publisher.log_snapshot(&snapshot);
        assert_eq!(publisher.reported_overruns, 1);
    }

    #[tokio::test]
    async fn test_monitor_publishes_on_request_and_stops() {
        let temp = tempfile::tempdir().unwrap();
        let run_dir = RunDir::new(temp.path());
        let publisher = StatusPublisher::new(
            run_dir.clone(),
            Arc::new(SharedState::new()),
            Arc::new(FixedPriority),
        );
        let notify = Arc::new(Notify::new());
        let cancel = CancellationToken::new();

        let handle = spawn_monitor_task(
            publisher,
            Duration::from_secs(3600),
            notify.clone(),
            cancel.clone(),
        );
        notify.notify_one();

        for _ in 0..100 {
            if run_dir.status_file().exists() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        assert!(run_dir.status_file().exists());

        cancel.cancel();
        tokio::time::timeout(Duration::from_secs(1), handle)
            .await
            .expect("monitor should stop")
            .expect("monitor should not panic");
    }
}
