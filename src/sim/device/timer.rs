use super::ClockedDevice;
use crate::sim::mem::{regs, RegisterFile};

/// The Timer0 module.
///
/// TMR0 itself lives in the register file. This struct holds the hidden state
/// around it: the prescaler counter, the write-inhibit counter, and the last
/// sampled level of the RA4/T0CKI pin.
///
/// On every tick, depending on `OPTION_REG`:
/// - In timer mode (`T0CS = 0`), each cycle is a count. A direct write to TMR0
///   inhibits counting for the following two cycles.
/// - In counter mode (`T0CS = 1`), each configured edge of RA4 is a count
///   (`T0SE = 0` for rising, `T0SE = 1` for falling).
/// - If the prescaler is assigned to Timer0 (`PSA = 0`), TMR0 increments once every
///   `2^(PS + 1)` counts. Otherwise it increments on every count.
/// - When TMR0 overflows from `0xFF` to `0x00`, `INTCON<T0IF>` is set.
#[derive(Debug, Clone, Default)]
pub struct Timer0 {
    prescaler: u16,
    wait: u8,
    last_pin: bool,
}
impl Timer0 {
    /// Creates a new Timer0 in its reset state.
    pub fn new() -> Self {
        Default::default()
    }

    /// Called when TMR0 is written in timer mode.
    ///
    /// This clears the prescaler and inhibits increments for two cycles.
    pub fn tmr0_written(&mut self) {
        self.wait = 2;
        self.prescaler = 0;
    }

    /// Clears the prescaler counter.
    pub fn clear_prescaler(&mut self) {
        self.prescaler = 0;
    }

    /// The current prescaler count.
    pub fn prescaler(&self) -> u16 {
        self.prescaler
    }

    /// The number of cycles TMR0 is still inhibited for.
    pub fn wait_cycles(&self) -> u8 {
        self.wait
    }

    /// The prescaler ratio configured in `OPTION_REG<PS2:PS0>`.
    pub fn ratio(option: u8) -> u16 {
        2 << (option & 0b111)
    }

    /// Determines whether this cycle produces a count for the prescaler.
    fn count_source(&mut self, file: &RegisterFile) -> bool {
        let option = file.get_raw(regs::OPTION_REG);

        if option & (1 << regs::T0CS) != 0 {
            let pin = file.get_raw_bit(regs::PORTA, regs::T0CKI);
            let falling = option & (1 << regs::T0SE) != 0;
            let edge = match falling {
                true  => self.last_pin && !pin,
                false => !self.last_pin && pin,
            };
            self.last_pin = pin;
            edge
        } else if self.wait > 0 {
            self.wait -= 1;
            false
        } else {
            true
        }
    }
}
impl ClockedDevice for Timer0 {
    type Event = ();

    fn tick(&mut self, file: &mut RegisterFile, sleeping: bool) {
        if sleeping || !self.count_source(file) { return };

        let option = file.get_raw(regs::OPTION_REG);
        if option & (1 << regs::PSA) == 0 {
            self.prescaler += 1;
            if self.prescaler < Self::ratio(option) { return };
            self.prescaler = 0;
        }

        let (tmr0, overflow) = file.get_raw(regs::TMR0).overflowing_add(1);
        file.set_raw(regs::TMR0, tmr0);
        if overflow {
            file.set_raw_bit(regs::INTCON, regs::T0IF, true);
        }
    }

    fn reset(&mut self) {
        *self = Self::new();
    }
}
