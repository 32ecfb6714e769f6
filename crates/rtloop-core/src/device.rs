//! Transport slots and their per-slot device settings.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};

/// One of the five serial transport endpoints the daemon brings up.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UartSlot {
    /// Console / primary telemetry link (`-d`)
    A,
    /// Primary GPS, config file only
    B,
    /// Secondary telemetry link (`-d2`)
    C,
    /// Third terminal device (`-d3`)
    D,
    /// Second GPS (`-d4`)
    E,
}

impl UartSlot {
    /// All slots in bring-up order.
    pub const ALL: [UartSlot; 5] = [Self::A, Self::B, Self::C, Self::D, Self::E];

    /// Returns the name used in logs and the start banner.
    pub fn label(self) -> &'static str {
        match self {
            Self::A => "uartA",
            Self::B => "uartB",
            Self::C => "uartC",
            Self::D => "uartD",
            Self::E => "uartE",
        }
    }
}

impl fmt::Display for UartSlot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

fn default_uart_a() -> PathBuf {
    PathBuf::from("/dev/ttyACM0")
}

fn default_uart_b() -> PathBuf {
    PathBuf::from("/dev/ttyS3")
}

fn default_uart_c() -> PathBuf {
    PathBuf::from("/dev/ttyS2")
}

fn default_null_device() -> PathBuf {
    PathBuf::from("/dev/null")
}

/// Device path for each transport slot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DeviceConfig {
    pub uart_a: PathBuf,
    pub uart_b: PathBuf,
    pub uart_c: PathBuf,
    pub uart_d: PathBuf,
    pub uart_e: PathBuf,
}

impl Default for DeviceConfig {
    fn default() -> Self {
        Self {
            uart_a: default_uart_a(),
            uart_b: default_uart_b(),
            uart_c: default_uart_c(),
            uart_d: default_null_device(),
            uart_e: default_null_device(),
        }
    }
}

impl DeviceConfig {
    /// Returns the device path configured for a slot.
    pub fn path(&self, slot: UartSlot) -> &Path {
        match slot {
            UartSlot::A => &self.uart_a,
            UartSlot::B => &self.uart_b,
            UartSlot::C => &self.uart_c,
            UartSlot::D => &self.uart_d,
            UartSlot::E => &self.uart_e,
        }
    }

    /// Overrides the device path of a slot.
    pub fn set_path(&mut self, slot: UartSlot, path: impl Into<PathBuf>) {
        let path = path.into();
        match slot {
            UartSlot::A => self.uart_a = path,
            UartSlot::B => self.uart_b = path,
            UartSlot::C => self.uart_c = path,
            UartSlot::D => self.uart_d = path,
            UartSlot::E => self.uart_e = path,
        }
    }

    /// One-line summary of the command-line configurable slots.
    ///
    /// Example: `uartA=/dev/ttyACM0 uartC=/dev/ttyS2 uartD=/dev/null uartE=/dev/null`
    pub fn banner(&self) -> String {
        [UartSlot::A, UartSlot::C, UartSlot::D, UartSlot::E]
            .iter()
            .map(|slot| format!("{}={}", slot, self.path(*slot).display()))
            .collect::<Vec<_>>()
            .join(" ")
    }
}

/// Baud rate passed to `begin` for each transport slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BaudConfig {
    pub uart_a: u32,
    pub uart_b: u32,
    pub uart_c: u32,
    pub uart_d: u32,
    pub uart_e: u32,
}

impl Default for BaudConfig {
    fn default() -> Self {
        Self {
            uart_a: 115_200,
            uart_b: 38_400,
            uart_c: 57_600,
            uart_d: 57_600,
            uart_e: 57_600,
        }
    }
}

impl BaudConfig {
    /// Returns the baud rate for a slot.
    pub fn rate(&self, slot: UartSlot) -> u32 {
        match slot {
            UartSlot::A => self.uart_a,
            UartSlot::B => self.uart_b,
            UartSlot::C => self.uart_c,
            UartSlot::D => self.uart_d,
            UartSlot::E => self.uart_e,
        }
    }
}
