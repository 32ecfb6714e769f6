//! Recording fakes shared by the integration tests.
//!
//! Tests CAN use `.unwrap()` and `.expect()`.

#![allow(dead_code)]

use std::path::Path;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Condvar, Mutex};
use std::thread;
use std::time::{Duration, Instant};

use rtloop_core::{PriorityLevel, UartSlot};
use rtloopd::board::{Board, ControlLoop, Peripheral, Scheduler, Transport, Transports};
use rtloopd::error::SchedulingError;
use rtloopd::priority::PriorityController;

// ============================================================================
// Event Log
// ============================================================================

/// Ordered log of collaborator calls, shared by every fake of one test.
#[derive(Clone, Default)]
pub struct EventLog(Arc<Mutex<Vec<String>>>);

impl EventLog {
    pub fn push(&self, event: impl Into<String>) {
        self.0.lock().unwrap().push(event.into());
    }

    pub fn events(&self) -> Vec<String> {
        self.0.lock().unwrap().clone()
    }

    pub fn count(&self, event: &str) -> usize {
        self.0.lock().unwrap().iter().filter(|e| *e == event).count()
    }
}

// ============================================================================
// Priority Controller
// ============================================================================

/// Records every requested level and when it was requested.
#[derive(Default)]
pub struct RecordingPriority {
    calls: Mutex<Vec<(PriorityLevel, Instant)>>,
    reject: AtomicBool,
    events: Option<EventLog>,
}

impl RecordingPriority {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Fake that also appends `priority <level>` to an event log.
    pub fn logging(events: &EventLog) -> Arc<Self> {
        Arc::new(Self {
            events: Some(events.clone()),
            ..Self::default()
        })
    }

    /// Fake whose every request is refused.
    pub fn rejecting() -> Arc<Self> {
        let fake = Self::default();
        fake.reject.store(true, Ordering::SeqCst);
        Arc::new(fake)
    }

    pub fn levels(&self) -> Vec<PriorityLevel> {
        self.calls.lock().unwrap().iter().map(|(l, _)| *l).collect()
    }

    /// Time of the first request for `level`.
    pub fn first_request(&self, level: PriorityLevel) -> Option<Instant> {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .find(|(l, _)| *l == level)
            .map(|(_, at)| *at)
    }

    pub fn clear(&self) {
        self.calls.lock().unwrap().clear();
    }
}

impl PriorityController for RecordingPriority {
    fn set_priority(&self, level: PriorityLevel) -> Result<(), SchedulingError> {
        self.calls.lock().unwrap().push((level, Instant::now()));
        if let Some(events) = &self.events {
            events.push(format!("priority {level}"));
        }
        if self.reject.load(Ordering::SeqCst) {
            return Err(SchedulingError::Unsupported);
        }
        Ok(())
    }

    fn current_priority(&self) -> Option<PriorityLevel> {
        if self.reject.load(Ordering::SeqCst) {
            return None;
        }
        self.calls.lock().unwrap().last().map(|(l, _)| *l)
    }
}

// ============================================================================
// Board Collaborators
// ============================================================================

pub struct RecordingTransport {
    slot: UartSlot,
    events: EventLog,
}

impl Transport for RecordingTransport {
    fn configure_endpoint(&mut self, path: &Path) {
        self.events
            .push(format!("configure {} {}", self.slot, path.display()));
    }

    fn begin(&mut self, baud_rate: u32) {
        self.events.push(format!("begin {} {baud_rate}", self.slot));
    }
}

/// Scheduler that logs its flags and records (but does not perform) sleeps.
pub struct RecordingScheduler {
    events: EventLog,
    sleeps: Arc<Mutex<Vec<u64>>>,
}

impl RecordingScheduler {
    pub fn new(events: &EventLog) -> (Self, Arc<Mutex<Vec<u64>>>) {
        let sleeps = Arc::new(Mutex::new(Vec::new()));
        let scheduler = Self {
            events: events.clone(),
            sleeps: Arc::clone(&sleeps),
        };
        (scheduler, sleeps)
    }
}

impl Scheduler for RecordingScheduler {
    fn init(&mut self) {
        self.events.push("scheduler init");
    }

    fn mark_hal_initialized(&mut self) {
        self.events.push("scheduler hal_initialized");
    }

    fn mark_system_initialized(&mut self) {
        self.events.push("scheduler system_initialized");
    }

    fn sleep_microseconds(&self, micros: u64) {
        self.sleeps.lock().unwrap().push(micros);
    }
}

pub struct RecordingPeripheral {
    name: &'static str,
    events: EventLog,
}

impl Peripheral for RecordingPeripheral {
    fn init(&mut self) {
        self.events.push(format!("{} init", self.name));
    }
}

/// Board whose collaborators all log into `events`.
pub fn recording_board(events: &EventLog) -> (Board, Arc<Mutex<Vec<u64>>>) {
    let (scheduler, sleeps) = RecordingScheduler::new(events);
    let peripheral = |name: &'static str| -> Box<dyn Peripheral> {
        Box::new(RecordingPeripheral {
            name,
            events: events.clone(),
        })
    };
    let board = Board {
        transports: Transports::from_fn(|slot| {
            Box::new(RecordingTransport {
                slot,
                events: events.clone(),
            })
        }),
        scheduler: Box::new(scheduler),
        rc_input: peripheral("rcin"),
        rc_output: peripheral("rcout"),
        analog_in: peripheral("analogin"),
        gpio: peripheral("gpio"),
    };
    (board, sleeps)
}

// ============================================================================
// Control Loops
// ============================================================================

/// Loop whose iterations sleep for scripted durations (the last one repeats).
pub struct SleepLoop {
    durations: Vec<Duration>,
    iterations: Arc<AtomicU64>,
    events: EventLog,
}

impl SleepLoop {
    pub fn new(durations: Vec<Duration>, events: &EventLog) -> Self {
        Self {
            durations,
            iterations: Arc::new(AtomicU64::new(0)),
            events: events.clone(),
        }
    }

    pub fn iterations(&self) -> Arc<AtomicU64> {
        Arc::clone(&self.iterations)
    }
}

impl ControlLoop for SleepLoop {
    fn setup(&mut self) {
        self.events.push("setup");
    }

    fn run_iteration(&mut self) {
        let index = self.iterations.fetch_add(1, Ordering::SeqCst) as usize;
        let duration = self
            .durations
            .get(index)
            .or_else(|| self.durations.last())
            .copied()
            .unwrap_or_default();
        thread::sleep(duration);
    }
}

/// Gate that blocks iterations of a [`GateLoop`] while closed.
#[derive(Clone, Default)]
pub struct Gate(Arc<(Mutex<bool>, Condvar)>);

impl Gate {
    pub fn open(&self) {
        let (open, cvar) = &*self.0;
        *open.lock().unwrap() = true;
        cvar.notify_all();
    }

    fn wait(&self) {
        let (open, cvar) = &*self.0;
        let mut guard = open.lock().unwrap();
        while !*guard {
            guard = cvar.wait(guard).unwrap();
        }
    }
}

/// Loop whose iterations block until the gate is opened.
pub struct GateLoop {
    gate: Gate,
    entered: Arc<AtomicU64>,
    events: EventLog,
}

impl GateLoop {
    pub fn new(gate: &Gate, events: &EventLog) -> (Self, Arc<AtomicU64>) {
        let entered = Arc::new(AtomicU64::new(0));
        let control = Self {
            gate: gate.clone(),
            entered: Arc::clone(&entered),
            events: events.clone(),
        };
        (control, entered)
    }
}

impl ControlLoop for GateLoop {
    fn setup(&mut self) {
        self.events.push("setup");
    }

    fn run_iteration(&mut self) {
        self.entered.fetch_add(1, Ordering::SeqCst);
        self.gate.wait();
    }
}

/// Loop that panics in its first iteration.
pub struct PanicLoop;

impl ControlLoop for PanicLoop {
    fn setup(&mut self) {}

    fn run_iteration(&mut self) {
        panic!("control loop failure");
    }
}

// ============================================================================
// Helpers
// ============================================================================

/// Polls `condition` until it holds or `timeout` elapses.
pub async fn wait_until(timeout: Duration, condition: impl Fn() -> bool) -> bool {
    let deadline = Instant::now() + timeout;
    while Instant::now() < deadline {
        if condition() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    condition()
}
