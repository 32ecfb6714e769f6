//! Straight-line collaborator bring-up run by the worker before its loop.

use rtloop_core::{BaudConfig, PriorityLevel, UartSlot};
use tracing::info;

use crate::board::{Board, ControlLoop};
use crate::priority::{set_priority_logged, PriorityController};
use crate::shared::LoopStats;

/// Initializes collaborators in a fixed order and runs the user setup hook.
///
/// Order:
/// 1. `begin` every transport (A..E) at its baud rate
/// 2. scheduler, RC input, RC output, analog input, GPIO `init`
/// 3. demote to `Startup`, mark the HAL initialized, run `setup()`
/// 4. mark the system initialized and raise to `Main`
///
/// Setup runs demoted so slow hardware probing cannot monopolize the CPU.
/// There is no retry and no rollback; a collaborator that fails to
/// initialize deals with that itself.
pub fn bring_up(
    board: &mut Board,
    control: &mut dyn ControlLoop,
    baud: &BaudConfig,
    priority: &dyn PriorityController,
    stats: &LoopStats,
) {
    for slot in UartSlot::ALL {
        board.transports.get_mut(slot).begin(baud.rate(slot));
    }

    board.scheduler.init();
    board.rc_input.init();
    board.rc_output.init();
    board.analog_in.init();
    board.gpio.init();

    set_priority_logged(priority, PriorityLevel::Startup, stats);
    board.scheduler.mark_hal_initialized();

    info!("Running setup hook");
    control.setup();
    board.scheduler.mark_system_initialized();

    set_priority_logged(priority, PriorityLevel::Main, stats);
    info!("Bring-up complete");
}
