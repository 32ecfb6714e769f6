//! Stand-in collaborators for running the daemon without real drivers.
//!
//! These only log and track their own state. Line settings, sensor
//! protocols and RC decoding belong to real drivers.

use std::fs::{File, OpenOptions};
use std::path::{Path, PathBuf};
use std::thread;
use std::time::{Duration, Instant};

use rtloop_core::UartSlot;
use tracing::{debug, info, warn};

use crate::board::{ControlLoop, Peripheral, Scheduler, Transport};

// ============================================================================
// Serial Endpoint
// ============================================================================

/// Transport that opens its device node on `begin`.
#[derive(Debug)]
pub struct SerialEndpoint {
    slot: UartSlot,
    path: Option<PathBuf>,
    baud_rate: Option<u32>,
    port: Option<File>,
}

impl SerialEndpoint {
    pub fn new(slot: UartSlot) -> Self {
        Self {
            slot,
            path: None,
            baud_rate: None,
            port: None,
        }
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    pub fn baud_rate(&self) -> Option<u32> {
        self.baud_rate
    }

    /// Whether `begin` managed to open the device.
    pub fn is_open(&self) -> bool {
        self.port.is_some()
    }
}

impl Transport for SerialEndpoint {
    fn configure_endpoint(&mut self, path: &Path) {
        self.path = Some(path.to_path_buf());
    }

    fn begin(&mut self, baud_rate: u32) {
        self.baud_rate = Some(baud_rate);
        let Some(path) = self.path.as_deref() else {
            warn!(slot = %self.slot, "Transport has no device configured");
            return;
        };

        match OpenOptions::new().read(true).write(true).open(path) {
            Ok(file) => {
                info!(slot = %self.slot, device = %path.display(), baud_rate, "Transport opened");
                self.port = Some(file);
            }
            Err(e) => {
                warn!(
                    slot = %self.slot,
                    device = %path.display(),
                    error = %e,
                    "Failed to open transport"
                );
            }
        }
    }
}

// ============================================================================
// Scheduler
// ============================================================================

/// Scheduler backed by `std::thread::sleep`.
#[derive(Debug, Default)]
pub struct ThreadScheduler {
    initialized: bool,
    hal_initialized: bool,
    system_initialized: bool,
}

impl ThreadScheduler {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_system_initialized(&self) -> bool {
        self.system_initialized
    }
}

impl Scheduler for ThreadScheduler {
    fn init(&mut self) {
        self.initialized = true;
        debug!("Scheduler initialized");
    }

    fn mark_hal_initialized(&mut self) {
        self.hal_initialized = true;
        debug!("HAL initialized");
    }

    fn mark_system_initialized(&mut self) {
        self.system_initialized = true;
        info!("System initialized");
    }

    fn sleep_microseconds(&self, micros: u64) {
        thread::sleep(Duration::from_micros(micros));
    }
}

// ============================================================================
// Peripherals
// ============================================================================

/// Peripheral that only records and logs its initialization.
#[derive(Debug)]
pub struct NamedPeripheral {
    name: &'static str,
    initialized: bool,
}

impl NamedPeripheral {
    pub fn new(name: &'static str) -> Self {
        Self {
            name,
            initialized: false,
        }
    }

    pub fn is_initialized(&self) -> bool {
        self.initialized
    }
}

impl Peripheral for NamedPeripheral {
    fn init(&mut self) {
        self.initialized = true;
        debug!(peripheral = self.name, "Peripheral initialized");
    }
}

// ============================================================================
// Heartbeat Loop
// ============================================================================

/// Control loop that does no work and logs a heartbeat once per interval.
#[derive(Debug)]
pub struct HeartbeatLoop {
    interval: Duration,
    iterations: u64,
    last_beat: Option<Instant>,
}

impl HeartbeatLoop {
    pub fn new() -> Self {
        Self::with_interval(Duration::from_secs(1))
    }

    pub fn with_interval(interval: Duration) -> Self {
        Self {
            interval,
            iterations: 0,
            last_beat: None,
        }
    }

    pub fn iterations(&self) -> u64 {
        self.iterations
    }
}

impl Default for HeartbeatLoop {
    fn default() -> Self {
        Self::new()
    }
}

impl ControlLoop for HeartbeatLoop {
    fn setup(&mut self) {
        self.last_beat = Some(Instant::now());
        info!(interval_ms = self.interval.as_millis() as u64, "Heartbeat loop ready");
    }

    fn run_iteration(&mut self) {
        self.iterations += 1;
        let now = Instant::now();
        let due = self
            .last_beat
            .map_or(true, |last| now.duration_since(last) >= self.interval);
        if due {
            debug!(iterations = self.iterations, "Heartbeat");
            self.last_beat = Some(now);
        }
    }
}
