//! Daemon configuration loaded from TOML.
//!
//! Every section is optional; missing fields take their defaults. The
//! timing budget and priorities are fixed for the lifetime of a worker:
//! they are read once before the worker is spawned.
//!
//! ```toml
//! [timing]
//! overrun_budget_ms = 100
//! idle_yield_us = 250
//!
//! [priority]
//! startup = 10
//! main = 80
//! overtime = 10
//! watchdog = 90
//!
//! [devices]
//! uart_a = "/dev/ttyACM0"
//! ```

use std::env;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::device::{BaudConfig, DeviceConfig};
use crate::error::{ConfigError, ConfigResult};
use crate::priority::PriorityLevel;

/// Environment variable overriding the config file location.
pub const CONFIG_ENV_VAR: &str = "RTLOOP_CONFIG";

/// Time an iteration may run before the watchdog demotes it.
pub const DEFAULT_OVERRUN_BUDGET: Duration = Duration::from_millis(100);

/// Time yielded to lower-priority tasks after every iteration.
pub const DEFAULT_IDLE_YIELD: Duration = Duration::from_micros(250);

/// Lowest and highest SCHED_FIFO priority accepted in the config.
const FIFO_PRIORITY_RANGE: std::ops::RangeInclusive<u8> = 1..=99;

// ============================================================================
// Sections
// ============================================================================

/// Loop timing constants.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TimingConfig {
    /// Watchdog budget per iteration, in milliseconds
    pub overrun_budget_ms: u64,

    /// Idle slice after every iteration, in microseconds
    pub idle_yield_us: u64,

    /// Stack size of the worker thread, in KiB
    pub worker_stack_kb: usize,
}

impl Default for TimingConfig {
    fn default() -> Self {
        Self {
            overrun_budget_ms: DEFAULT_OVERRUN_BUDGET.as_millis() as u64,
            idle_yield_us: DEFAULT_IDLE_YIELD.as_micros() as u64,
            worker_stack_kb: 256,
        }
    }
}

impl TimingConfig {
    pub fn overrun_budget(&self) -> Duration {
        Duration::from_millis(self.overrun_budget_ms)
    }

    pub fn worker_stack_bytes(&self) -> usize {
        self.worker_stack_kb.saturating_mul(1024)
    }
}

/// OS scheduling priority used for each [`PriorityLevel`], plus the
/// priority of the watchdog timer thread.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PriorityConfig {
    pub startup: u8,
    pub main: u8,
    pub overtime: u8,

    /// Timer thread priority; must preempt the worker at `main`
    pub watchdog: u8,
}

impl Default for PriorityConfig {
    fn default() -> Self {
        Self {
            startup: 10,
            main: 80,
            overtime: 10,
            watchdog: 90,
        }
    }
}

impl PriorityConfig {
    /// Returns the OS priority number for a level.
    pub fn value(&self, level: PriorityLevel) -> u8 {
        match level {
            PriorityLevel::Startup => self.startup,
            PriorityLevel::Main => self.main,
            PriorityLevel::Overtime => self.overtime,
        }
    }

    fn validate(&self) -> ConfigResult<()> {
        for level in PriorityLevel::ALL {
            let value = self.value(level);
            if !FIFO_PRIORITY_RANGE.contains(&value) {
                return Err(ConfigError::invalid(
                    format!("priority.{level}"),
                    value,
                    "a SCHED_FIFO priority in 1..=99",
                ));
            }
        }
        if !FIFO_PRIORITY_RANGE.contains(&self.watchdog) {
            return Err(ConfigError::invalid(
                "priority.watchdog",
                self.watchdog,
                "a SCHED_FIFO priority in 1..=99",
            ));
        }
        if self.watchdog <= self.main {
            return Err(ConfigError::invalid(
                "priority.watchdog",
                self.watchdog,
                format!("a value above priority.main ({})", self.main),
            ));
        }
        if self.overtime >= self.main {
            return Err(ConfigError::invalid(
                "priority.overtime",
                self.overtime,
                format!("a value below priority.main ({})", self.main),
            ));
        }
        if self.startup >= self.main {
            return Err(ConfigError::invalid(
                "priority.startup",
                self.startup,
                format!("a value below priority.main ({})", self.main),
            ));
        }
        Ok(())
    }
}

/// Status publishing settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MonitorConfig {
    /// How often loop statistics are logged and published, in milliseconds
    pub status_interval_ms: u64,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            status_interval_ms: 1000,
        }
    }
}

impl MonitorConfig {
    pub fn status_interval(&self) -> Duration {
        Duration::from_millis(self.status_interval_ms)
    }
}

// ============================================================================
// Config
// ============================================================================

/// Complete daemon configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub timing: TimingConfig,
    pub priority: PriorityConfig,
    pub devices: DeviceConfig,
    pub baud: BaudConfig,
    pub monitor: MonitorConfig,
}

impl Config {
    /// Parses and validates a TOML document.
    pub fn from_toml_str(contents: &str) -> ConfigResult<Self> {
        let config: Config = toml::from_str(contents)?;
        config.validate()?;
        Ok(config)
    }

    /// Loads the config file at `path`.
    ///
    /// A missing file yields the defaults; any other read failure is an error.
    pub fn load(path: &Path) -> ConfigResult<Self> {
        match fs::read_to_string(path) {
            Ok(contents) => {
                debug!(path = %path.display(), "Loaded config file");
                Self::from_toml_str(&contents)
            }
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                debug!(path = %path.display(), "No config file, using defaults");
                Ok(Self::default())
            }
            Err(source) => Err(ConfigError::Read {
                path: path.to_path_buf(),
                source,
            }),
        }
    }

    /// Loads the config from `$RTLOOP_CONFIG` or the default location.
    pub fn load_default() -> ConfigResult<Self> {
        Self::load(&default_config_path())
    }

    /// Checks cross-field constraints.
    pub fn validate(&self) -> ConfigResult<()> {
        self.priority.validate()?;
        if self.timing.overrun_budget_ms == 0 {
            return Err(ConfigError::invalid(
                "timing.overrun_budget_ms",
                0,
                "a budget of at least 1ms",
            ));
        }
        if self.timing.worker_stack_kb < 16 {
            return Err(ConfigError::invalid(
                "timing.worker_stack_kb",
                self.timing.worker_stack_kb,
                "at least 16",
            ));
        }
        if self.monitor.status_interval_ms == 0 {
            return Err(ConfigError::invalid(
                "monitor.status_interval_ms",
                0,
                "a positive interval",
            ));
        }
        Ok(())
    }
}

/// Returns the config file path: `$RTLOOP_CONFIG`, else
/// `<config dir>/rtloop/rtloopd.toml`.
pub fn default_config_path() -> PathBuf {
    if let Ok(path) = env::var(CONFIG_ENV_VAR) {
        return PathBuf::from(path);
    }
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("/etc"))
        .join("rtloop")
        .join("rtloopd.toml")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::UartSlot;

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert_eq!(config.timing.overrun_budget(), DEFAULT_OVERRUN_BUDGET);
        assert_eq!(config.timing.idle_yield_us, 250);
        assert_eq!(config.priority.watchdog, 90);
        assert_eq!(config.priority.value(PriorityLevel::Main), 80);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_empty_document_is_default() {
        let config = Config::from_toml_str("").unwrap();
        assert_eq!(config, Config::default());
    }

    #[test]
    fn test_partial_document() {
        let config = Config::from_toml_str(
            r#"
            [timing]
            overrun_budget_ms = 50

            [devices]
            uart_c = "/dev/ttyUSB0"
            "#,
        )
        .unwrap();
        assert_eq!(config.timing.overrun_budget(), Duration::from_millis(50));
        assert_eq!(config.timing.idle_yield_us, 250);
        assert_eq!(config.devices.path(UartSlot::C), Path::new("/dev/ttyUSB0"));
        assert_eq!(config.devices.path(UartSlot::A), Path::new("/dev/ttyACM0"));
    }

    #[test]
    fn test_overtime_must_be_below_main() {
        let err = Config::from_toml_str("[priority]\nmain = 20\novertime = 20\n").unwrap_err();
        assert!(matches!(err, ConfigError::InvalidFieldValue { ref field, .. } if field == "priority.overtime"));
    }

    #[test]
    fn test_watchdog_must_preempt_main() {
        let err = Config::from_toml_str("[priority]\nwatchdog = 80\n").unwrap_err();
        assert!(matches!(err, ConfigError::InvalidFieldValue { ref field, .. } if field == "priority.watchdog"));
        assert!(Config::from_toml_str("[priority]\nmain = 60\nwatchdog = 61\n").is_ok());
    }

    #[test]
    fn test_priority_out_of_range() {
        let err = Config::from_toml_str("[priority]\nmain = 120\n").unwrap_err();
        assert!(err.to_string().contains("priority.main"));
    }

    #[test]
    fn test_zero_budget_rejected() {
        assert!(Config::from_toml_str("[timing]\noverrun_budget_ms = 0\n").is_err());
    }

    #[test]
    fn test_malformed_toml() {
        let err = Config::from_toml_str("[timing\n").unwrap_err();
        assert!(matches!(err, ConfigError::Parse(_)));
    }

    #[test]
    fn test_load_missing_file_uses_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = Config::load(&dir.path().join("absent.toml")).unwrap();
        assert_eq!(config, Config::default());
    }

    #[test]
    fn test_load_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("rtloopd.toml");
        fs::write(&path, "[baud]\nuart_a = 921600\n").unwrap();
        let config = Config::load(&path).unwrap();
        assert_eq!(config.baud.rate(UartSlot::A), 921_600);
    }
}
