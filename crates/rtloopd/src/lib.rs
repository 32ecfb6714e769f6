//! rtloop daemon - real-time loop driver and lifecycle control
//!
//! This crate provides the pieces the `rtloopd` binary is assembled from:
//! - `controller` - Single-instance start/stop/status front for the worker
//! - `bringup` - Ordered initialization of collaborators and user setup
//! - `main_loop` - Per-iteration arm/execute/reconcile/yield cycle
//! - `watchdog` - One-shot overtime timer that demotes a stuck worker, and
//!   the real-time thread its timers run on
//! - `priority` - `SCHED_FIFO` priority levels for the worker thread
//! - `monitor` - Loop statistics logging and status publishing
//! - `rundir` - Locked PID file, status and stop files used by the
//!   control-plane commands
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                       rtloopd daemon                        │
//! ├─────────────────────────────────────────────────────────────┤
//! │                                                             │
//! │  ┌─────────────────┐ spawn ┌─────────────────────────────┐  │
//! │  │DaemonController │──────▶│  worker thread (rtloop-main)│  │
//! │  │ start/stop/join │       │  bring_up → MainLoop::run   │  │
//! │  └────────┬────────┘       └──────┬───────────────▲──────┘  │
//! │           │                 arm/  │               │ demote  │
//! │           │ SharedState     disarm▼               │         │
//! │           ▼                ┌─────────────────────────────┐  │
//! │  ┌─────────────────┐       │  OvertimeWatchdog           │  │
//! │  │ StatusPublisher │       │  (tokio timer task on the   │  │
//! │  │ (monitor task)  │       │  timer thread, FIFO > main) │  │
//! │  └────────┬────────┘       └─────────────────────────────┘  │
//! │           │ rtloopd.status.json                             │
//! │           ▼                                                 │
//! │  `rtloopd status` / `rtloopd stop` (separate processes)     │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Panic-Free Guarantees
//!
//! - No `.unwrap()`, `.expect()`, `panic!()`, `unreachable!()`, `todo!()`
//!   outside of tests
//! - Scheduling failures are logged and counted, never fatal
//! - A panic in the user loop body ends the worker but not the daemon

pub mod board;
pub mod bringup;
pub mod cli;
pub mod controller;
pub mod drivers;
pub mod error;
pub mod main_loop;
pub mod monitor;
pub mod priority;
pub mod rundir;
pub mod shared;
pub mod watchdog;
