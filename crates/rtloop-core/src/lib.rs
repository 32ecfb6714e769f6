//! rtloop Core - Shared types for the real-time loop daemon
//!
//! This crate provides the domain types shared between the daemon
//! library (`rtloopd`) and its command-line front end:
//! - `priority` - scheduling priority levels of the worker task
//! - `state` - daemon lifecycle state and the derived status report
//! - `device` - transport slots and their device paths / baud rates
//! - `config` - TOML configuration with validated defaults
//! - `status` - serializable loop statistics and status snapshots
//!
//! All code follows the panic-free policy: no `.unwrap()`, `.expect()`,
//! `panic!()`, `unreachable!()`, `todo!()`, or direct indexing `[i]`.

pub mod config;
pub mod device;
pub mod error;
pub mod priority;
pub mod state;
pub mod status;

// Re-exports for convenience
pub use config::{
    Config, MonitorConfig, PriorityConfig, TimingConfig, DEFAULT_IDLE_YIELD,
    DEFAULT_OVERRUN_BUDGET,
};
pub use device::{BaudConfig, DeviceConfig, UartSlot};
pub use error::{ConfigError, ConfigResult};
pub use priority::PriorityLevel;
pub use state::{DaemonState, DaemonStatus};
pub use status::{LoopStatsSnapshot, StatusSnapshot};
