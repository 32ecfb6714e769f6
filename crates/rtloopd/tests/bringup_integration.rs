//! Integration tests for collaborator bring-up ordering.

mod common;

use rtloop_core::{BaudConfig, DeviceConfig, UartSlot};
use rtloopd::bringup::bring_up;
use rtloopd::shared::LoopStats;

use common::{recording_board, EventLog, RecordingPriority, SleepLoop};

#[test]
fn test_bring_up_order() {
    let events = EventLog::default();
    let (mut board, _) = recording_board(&events);
    let priority = RecordingPriority::logging(&events);
    let mut control = SleepLoop::new(Vec::new(), &events);
    let stats = LoopStats::default();

    bring_up(
        &mut board,
        &mut control,
        &BaudConfig::default(),
        priority.as_ref(),
        &stats,
    );

    assert_eq!(
        events.events(),
        vec![
            "begin uartA 115200",
            "begin uartB 38400",
            "begin uartC 57600",
            "begin uartD 57600",
            "begin uartE 57600",
            "scheduler init",
            "rcin init",
            "rcout init",
            "analogin init",
            "gpio init",
            "priority startup",
            "scheduler hal_initialized",
            "setup",
            "scheduler system_initialized",
            "priority main",
        ]
    );
    assert_eq!(stats.scheduling_failures(), 0);
}

#[test]
fn test_bring_up_continues_when_priority_rejected() {
    let events = EventLog::default();
    let (mut board, _) = recording_board(&events);
    let priority = RecordingPriority::rejecting();
    let mut control = SleepLoop::new(Vec::new(), &events);
    let stats = LoopStats::default();

    bring_up(
        &mut board,
        &mut control,
        &BaudConfig::default(),
        priority.as_ref(),
        &stats,
    );

    assert_eq!(events.count("setup"), 1);
    assert_eq!(events.count("scheduler system_initialized"), 1);
    assert_eq!(stats.scheduling_failures(), 2);
}

#[test]
fn test_configure_endpoints_uses_device_paths() {
    let events = EventLog::default();
    let (mut board, _) = recording_board(&events);
    let mut devices = DeviceConfig::default();
    devices.set_path(UartSlot::A, "/dev/ttyUSB0");

    board.configure_endpoints(&devices);

    assert_eq!(
        events.events(),
        vec![
            "configure uartA /dev/ttyUSB0",
            "configure uartB /dev/ttyS3",
            "configure uartC /dev/ttyS2",
            "configure uartD /dev/null",
            "configure uartE /dev/null",
        ]
    );
}

#[test]
fn test_custom_baud_rates() {
    let events = EventLog::default();
    let (mut board, _) = recording_board(&events);
    let priority = RecordingPriority::new();
    let mut control = SleepLoop::new(Vec::new(), &events);
    let baud = BaudConfig {
        uart_b: 9_600,
        ..BaudConfig::default()
    };

    bring_up(
        &mut board,
        &mut control,
        &baud,
        priority.as_ref(),
        &LoopStats::default(),
    );

    assert_eq!(events.count("begin uartB 9600"), 1);
    assert_eq!(events.count("begin uartA 115200"), 1);
}
