//! Peripherals clocked by the Simulator and the interrupt controller.
//!
//! The core types here are:
//! - [`ClockedDevice`]: A peripheral that is advanced once per elapsed machine cycle.
//! - [`InterruptSource`]: The interrupt sources of the chip, with their enable/flag bit pairs.
//! - [`poll_interrupt`]: Checks whether an interrupt should be taken.
//!
//! This module also provides the chip's two timing peripherals:
//! - [`Timer0`]: The prescaled 8-bit timer/counter.
//! - [`Watchdog`]: The free-running watchdog timer with its postscaler.

mod timer;
mod watchdog;

pub use timer::Timer0;
pub use watchdog::{Watchdog, WatchdogEvent};

use super::mem::{regs, RegisterFile};

/// A peripheral which is advanced by the Simulator once per elapsed machine cycle.
///
/// Peripherals do not own any register state.
/// They read their configuration from (and report their status into) the register file.
pub trait ClockedDevice {
    /// What happened during a tick that the Simulator has to act on.
    type Event;

    /// Advances the device by one machine cycle.
    fn tick(&mut self, file: &mut RegisterFile, sleeping: bool) -> Self::Event;

    /// Resets the device's internal counters.
    fn reset(&mut self);
}

/// A source of interrupts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum InterruptSource {
    /// Level change on one of the RB4-RB7 input pins (`INTCON<RBIE, RBIF>`).
    PortBChange,
    /// Edge on the RB0/INT pin (`INTCON<INTE, INTF>`).
    External,
    /// Timer0 overflow (`INTCON<T0IE, T0IF>`).
    Timer0,
    /// EEPROM write complete (`INTCON<EEIE>`, `EECON1<EEIF>`).
    Eeprom,
}
impl InterruptSource {
    /// All interrupt sources.
    pub const ALL: [InterruptSource; 4] = [
        InterruptSource::PortBChange,
        InterruptSource::External,
        InterruptSource::Timer0,
        InterruptSource::Eeprom,
    ];

    /// Tests whether this source is both enabled and flagged.
    pub fn is_pending(self, file: &RegisterFile) -> bool {
        let (enable, flag_reg, flag) = match self {
            InterruptSource::PortBChange => (regs::RBIE, regs::INTCON, regs::RBIF),
            InterruptSource::External    => (regs::INTE, regs::INTCON, regs::INTF),
            InterruptSource::Timer0      => (regs::T0IE, regs::INTCON, regs::T0IF),
            InterruptSource::Eeprom      => (regs::EEIE, regs::EECON1, regs::EEIF),
        };

        file.get_raw_bit(regs::INTCON, enable) && file.get_raw_bit(flag_reg, flag)
    }
}

/// Finds the first enabled and flagged interrupt source, ignoring `INTCON<GIE>`.
///
/// The chip wakes from sleep on any such source, even with interrupts globally disabled.
pub fn pending_interrupt(file: &RegisterFile) -> Option<InterruptSource> {
    InterruptSource::ALL.into_iter()
        .find(|s| s.is_pending(file))
}

/// Checks whether an interrupt should be taken.
///
/// This is `None` whenever `INTCON<GIE>` is clear.
/// Otherwise, this is any source that is enabled and flagged (sources have no priority).
///
/// Flags are not cleared by taking an interrupt. The handler has to clear them.
pub fn poll_interrupt(file: &RegisterFile) -> Option<InterruptSource> {
    match file.get_raw_bit(regs::INTCON, regs::GIE) {
        true  => pending_interrupt(file),
        false => None,
    }
}
