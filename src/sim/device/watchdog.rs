use std::time::Duration;

use super::ClockedDevice;
use crate::sim::mem::{regs, RegisterFile};

/// What the watchdog did during a tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WatchdogEvent {
    /// Nothing happened.
    None,
    /// The watchdog timed out while the core was asleep. The core should wake up.
    Wake,
    /// The watchdog timed out while the core was running. The core should reset.
    Reset,
}

/// The watchdog timer.
///
/// It accumulates simulated time on every cycle (sleeping or not) and times out once
/// the accumulator reaches the base timeout, multiplied by `2^PS` while the
/// prescaler is assigned to it (`OPTION_REG<PSA> = 1`).
#[derive(Debug, Clone)]
pub struct Watchdog {
    elapsed: Duration,

    /// Whether the watchdog runs at all.
    pub enabled: bool,
    /// The unscaled time-out period.
    pub timeout: Duration,
    /// Simulated time per machine cycle.
    pub cycle_time: Duration,
}
impl Watchdog {
    /// Creates a new watchdog.
    pub fn new(enabled: bool, timeout: Duration, cycle_time: Duration) -> Self {
        Self { elapsed: Duration::ZERO, enabled, timeout, cycle_time }
    }

    /// Time accumulated since the last clear.
    pub fn elapsed(&self) -> Duration {
        self.elapsed
    }

    /// Restarts the time-out period (`CLRWDT`, `SLEEP`).
    pub fn clear(&mut self) {
        self.elapsed = Duration::ZERO;
    }

    /// The time-out period under the given `OPTION_REG` value.
    pub fn threshold(&self, option: u8) -> Duration {
        let postscaler = match option & (1 << regs::PSA) != 0 {
            true  => 1 << (option & 0b111),
            false => 1,
        };
        self.timeout * postscaler
    }
}
impl Default for Watchdog {
    /// Enabled, 18 ms time-out, 1 µs cycles (4 MHz crystal).
    fn default() -> Self {
        Self::new(true, Duration::from_millis(18), Duration::from_micros(1))
    }
}
impl ClockedDevice for Watchdog {
    type Event = WatchdogEvent;

    fn tick(&mut self, file: &mut RegisterFile, sleeping: bool) -> WatchdogEvent {
        if !self.enabled { return WatchdogEvent::None };

        self.elapsed += self.cycle_time;
        if self.elapsed < self.threshold(file.get_raw(regs::OPTION_REG)) {
            return WatchdogEvent::None;
        }

        self.clear();
        match sleeping {
            true  => WatchdogEvent::Wake,
            false => WatchdogEvent::Reset,
        }
    }

    fn reset(&mut self) {
        self.clear();
    }
}
