//! Collaborator contracts consumed by the daemon core.
//!
//! The core never implements drivers. It only calls:
//! - [`Transport`]: `configure_endpoint` + `begin` for each serial endpoint
//! - [`Scheduler`]: init flags and the per-iteration idle sleep
//! - [`Peripheral`]: `init` for RC input/output, analog input and GPIO
//! - [`ControlLoop`]: the user's `setup` hook and per-iteration body
//!
//! Failures inside collaborators are the collaborators' concern; none of
//! these methods return errors to the core.

use std::path::Path;

use rtloop_core::{DeviceConfig, UartSlot};

use crate::drivers::{NamedPeripheral, SerialEndpoint, ThreadScheduler};

/// Serial transport endpoint.
pub trait Transport: Send {
    /// Sets the device path used by the next `begin`.
    fn configure_endpoint(&mut self, path: &Path);

    /// Opens the endpoint at `baud_rate`.
    fn begin(&mut self, baud_rate: u32);
}

/// Scheduler collaborator.
pub trait Scheduler: Send {
    fn init(&mut self);

    /// Called once all collaborators are initialized, before user setup.
    fn mark_hal_initialized(&mut self);

    /// Called once user setup has returned.
    fn mark_system_initialized(&mut self);

    /// Blocks the calling thread for at least `micros` microseconds.
    fn sleep_microseconds(&self, micros: u64);
}

/// RC input, RC output, analog input or GPIO driver.
pub trait Peripheral: Send {
    fn init(&mut self);
}

/// User hooks run by the worker.
///
/// `run_iteration` is treated as an atomic unit of work: it may block on
/// I/O owned by collaborators and the core has no visibility into it.
pub trait ControlLoop: Send {
    /// Called once, at startup priority, before the first iteration.
    fn setup(&mut self);

    /// Called every iteration at main priority.
    fn run_iteration(&mut self);
}

// ============================================================================
// Board
// ============================================================================

/// One transport per [`UartSlot`].
pub struct Transports {
    a: Box<dyn Transport>,
    b: Box<dyn Transport>,
    c: Box<dyn Transport>,
    d: Box<dyn Transport>,
    e: Box<dyn Transport>,
}

impl Transports {
    /// Builds a transport for every slot.
    pub fn from_fn(mut make: impl FnMut(UartSlot) -> Box<dyn Transport>) -> Self {
        Self {
            a: make(UartSlot::A),
            b: make(UartSlot::B),
            c: make(UartSlot::C),
            d: make(UartSlot::D),
            e: make(UartSlot::E),
        }
    }

    pub fn get_mut(&mut self, slot: UartSlot) -> &mut dyn Transport {
        match slot {
            UartSlot::A => self.a.as_mut(),
            UartSlot::B => self.b.as_mut(),
            UartSlot::C => self.c.as_mut(),
            UartSlot::D => self.d.as_mut(),
            UartSlot::E => self.e.as_mut(),
        }
    }
}

/// The full set of collaborators the worker brings up.
pub struct Board {
    pub transports: Transports,
    pub scheduler: Box<dyn Scheduler>,
    pub rc_input: Box<dyn Peripheral>,
    pub rc_output: Box<dyn Peripheral>,
    pub analog_in: Box<dyn Peripheral>,
    pub gpio: Box<dyn Peripheral>,
}

impl Board {
    /// Board of stand-in collaborators used by the `rtloopd` binary.
    pub fn standard() -> Self {
        Self {
            transports: Transports::from_fn(|slot| Box::new(SerialEndpoint::new(slot))),
            scheduler: Box::new(ThreadScheduler::new()),
            rc_input: Box::new(NamedPeripheral::new("rcin")),
            rc_output: Box::new(NamedPeripheral::new("rcout")),
            analog_in: Box::new(NamedPeripheral::new("analogin")),
            gpio: Box::new(NamedPeripheral::new("gpio")),
        }
    }

    /// Points every transport at its configured device.
    pub fn configure_endpoints(&mut self, devices: &DeviceConfig) {
        for slot in UartSlot::ALL {
            self.transports
                .get_mut(slot)
                .configure_endpoint(devices.path(slot));
        }
    }
}
