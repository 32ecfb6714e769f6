//! Command-line surface of `rtloopd`.
//!
//! ```text
//! rtloopd [options] {start,stop,status}
//!   -d  DEVICE   set terminal device   (uartA)
//!   -d2 DEVICE   set second terminal   (uartC)
//!   -d3 DEVICE   set third terminal    (uartD)
//!   -d4 DEVICE   set second GPS device (uartE)
//! ```
//!
//! The `-d2`/`-d3`/`-d4` spellings are single-dash long options, which clap
//! does not accept directly; they are rewritten to `--d2`.. before parsing.
//! Options may appear before or after the command.

use std::ffi::{OsStr, OsString};
use std::path::PathBuf;

use clap::error::ErrorKind;
use clap::{CommandFactory, Parser, Subcommand};
use rtloop_core::{DeviceConfig, UartSlot};

use crate::error::UsageError;

/// rtloopd - real-time control loop daemon
#[derive(Parser, Debug)]
#[command(name = "rtloopd", version, about)]
#[command(override_usage = "rtloopd [options] {start,stop,status}")]
pub struct Args {
    #[command(subcommand)]
    pub command: Option<Command>,

    /// Set terminal device (default /dev/ttyACM0)
    #[arg(short = 'd', long = "device", value_name = "DEVICE", global = true)]
    pub device: Option<PathBuf>,

    /// Set second terminal device (default /dev/ttyS2)
    #[arg(long = "d2", value_name = "DEVICE", global = true)]
    pub device2: Option<PathBuf>,

    /// Set third terminal device (default /dev/null)
    #[arg(long = "d3", value_name = "DEVICE", global = true)]
    pub device3: Option<PathBuf>,

    /// Set second GPS device (default /dev/null)
    #[arg(long = "d4", value_name = "DEVICE", global = true)]
    pub device4: Option<PathBuf>,

    /// Run in the foreground instead of daemonizing
    #[arg(short = 'f', long, global = true)]
    pub foreground: bool,
}

#[derive(Subcommand, Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    /// Start the daemon (no-op if already running)
    Start,
    /// Ask the running daemon to stop
    Stop,
    /// Show daemon status
    Status,
}

/// Device paths given on the command line.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DeviceOverrides {
    pub uart_a: Option<PathBuf>,
    pub uart_c: Option<PathBuf>,
    pub uart_d: Option<PathBuf>,
    pub uart_e: Option<PathBuf>,
}

impl DeviceOverrides {
    /// Writes the overrides into a device config.
    pub fn apply_to(&self, devices: &mut DeviceConfig) {
        let overrides = [
            (UartSlot::A, &self.uart_a),
            (UartSlot::C, &self.uart_c),
            (UartSlot::D, &self.uart_d),
            (UartSlot::E, &self.uart_e),
        ];
        for (slot, path) in overrides {
            if let Some(path) = path {
                devices.set_path(slot, path.clone());
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StartOptions {
    pub devices: DeviceOverrides,
    pub foreground: bool,
}

/// A validated command-line invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Invocation {
    Start(StartOptions),
    Stop,
    Status,
}

/// Parses a full argument vector, program name first.
///
/// # Errors
///
/// - `UsageError::MissingCommand` if no command was given
/// - `UsageError::Invalid` for unknown commands/flags or a flag without value
/// - `UsageError::HelpRequested` for `--help` / `--version`
pub fn parse_invocation<I, T>(args: I) -> Result<Invocation, UsageError>
where
    I: IntoIterator<Item = T>,
    T: Into<OsString>,
{
    let args = Args::try_parse_from(normalize_legacy_flags(args)).map_err(|e| match e.kind() {
        ErrorKind::DisplayHelp | ErrorKind::DisplayVersion => {
            UsageError::HelpRequested(e.to_string())
        }
        _ => UsageError::Invalid(first_line(&e.to_string())),
    })?;

    let command = args.command.ok_or(UsageError::MissingCommand)?;
    Ok(match command {
        Command::Start => Invocation::Start(StartOptions {
            devices: DeviceOverrides {
                uart_a: args.device,
                uart_c: args.device2,
                uart_d: args.device3,
                uart_e: args.device4,
            },
            foreground: args.foreground,
        }),
        Command::Stop => Invocation::Stop,
        Command::Status => Invocation::Status,
    })
}

/// Rewrites `-d2`, `-d3` and `-d4` to their double-dash forms.
pub fn normalize_legacy_flags<I, T>(args: I) -> Vec<OsString>
where
    I: IntoIterator<Item = T>,
    T: Into<OsString>,
{
    args.into_iter()
        .map(Into::into)
        .map(|arg| {
            let legacy = [OsStr::new("-d2"), OsStr::new("-d3"), OsStr::new("-d4")];
            if legacy.contains(&arg.as_os_str()) {
                let mut long = OsString::from("-");
                long.push(&arg);
                long
            } else {
                arg
            }
        })
        .collect()
}

/// Full usage text, printed on malformed invocations.
pub fn usage() -> String {
    Args::command().render_help().to_string()
}

fn first_line(message: &str) -> String {
    message.lines().next().unwrap_or(message).trim().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(args: &[&str]) -> Result<Invocation, UsageError> {
        parse_invocation(std::iter::once("rtloopd").chain(args.iter().copied()))
    }

    #[test]
    fn test_normalize_legacy_flags() {
        let args = normalize_legacy_flags(["rtloopd", "-d2", "/dev/x", "-d", "/dev/y", "-d4"]);
        assert_eq!(
            args,
            vec!["rtloopd", "--d2", "/dev/x", "-d", "/dev/y", "--d4"]
                .into_iter()
                .map(OsString::from)
                .collect::<Vec<_>>()
        );
    }

    #[test]
    fn test_start_without_flags() {
        let invocation = parse(&["start"]).unwrap();
        assert_eq!(
            invocation,
            Invocation::Start(StartOptions {
                devices: DeviceOverrides::default(),
                foreground: false,
            })
        );
    }

    #[test]
    fn test_start_with_all_devices_after_command() {
        let invocation = parse(&[
            "start", "-d", "/dev/ttyUSB0", "-d2", "/dev/ttyUSB1", "-d3", "/dev/ttyUSB2", "-d4",
            "/dev/ttyUSB3",
        ])
        .unwrap();
        let Invocation::Start(options) = invocation else {
            panic!("expected start");
        };
        assert_eq!(options.devices.uart_a, Some(PathBuf::from("/dev/ttyUSB0")));
        assert_eq!(options.devices.uart_c, Some(PathBuf::from("/dev/ttyUSB1")));
        assert_eq!(options.devices.uart_d, Some(PathBuf::from("/dev/ttyUSB2")));
        assert_eq!(options.devices.uart_e, Some(PathBuf::from("/dev/ttyUSB3")));
    }

    #[test]
    fn test_flags_before_command() {
        let invocation = parse(&["-d", "/dev/ttyACM1", "--foreground", "start"]).unwrap();
        let Invocation::Start(options) = invocation else {
            panic!("expected start");
        };
        assert_eq!(options.devices.uart_a, Some(PathBuf::from("/dev/ttyACM1")));
        assert!(options.foreground);
    }

    #[test]
    fn test_stop_and_status() {
        assert_eq!(parse(&["stop"]).unwrap(), Invocation::Stop);
        assert_eq!(parse(&["status"]).unwrap(), Invocation::Status);
    }

    #[test]
    fn test_missing_command() {
        assert_eq!(parse(&[]).unwrap_err(), UsageError::MissingCommand);
        assert_eq!(
            parse(&["-d", "/dev/ttyS1"]).unwrap_err(),
            UsageError::MissingCommand
        );
    }

    #[test]
    fn test_unknown_command() {
        let err = parse(&["restart"]).unwrap_err();
        assert!(matches!(err, UsageError::Invalid(_)));
        assert_eq!(err.exit_code(), 1);
    }

    #[test]
    fn test_missing_flag_argument() {
        let err = parse(&["start", "-d2"]).unwrap_err();
        assert!(matches!(err, UsageError::Invalid(_)));
        assert_eq!(err.exit_code(), 1);
    }

    #[test]
    fn test_help_exits_zero() {
        let err = parse(&["--help"]).unwrap_err();
        assert!(matches!(err, UsageError::HelpRequested(_)));
        assert_eq!(err.exit_code(), 0);
    }

    #[test]
    fn test_overrides_apply_to_config() {
        let mut devices = DeviceConfig::default();
        DeviceOverrides {
            uart_c: Some(PathBuf::from("/dev/ttyAMA0")),
            ..Default::default()
        }
        .apply_to(&mut devices);
        assert_eq!(devices.path(UartSlot::C), PathBuf::from("/dev/ttyAMA0"));
        assert_eq!(devices.path(UartSlot::A), PathBuf::from("/dev/ttyACM0"));
    }

    #[test]
    fn test_usage_lists_device_flags() {
        let text = usage();
        assert!(text.contains("rtloopd [options] {start,stop,status}"));
        assert!(text.contains("--d2"));
        assert!(text.contains("--d4"));
    }

    #[test]
    fn test_clap_definition() {
        Args::command().debug_assert();
    }
}
