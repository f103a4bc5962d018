//! Memory handling for the PIC16 simulator.
//!
//! This module consists of:
//! - [`RegisterFile`]: The banked data memory (file registers) and the data EEPROM.
//! - [`regs`]: Addresses and bit positions of the special function registers.
//! - [`ByteCreateStrategy`]: How general purpose registers are filled on power-on.
//!
//! # Banking
//!
//! The register file is addressed with 8-bit addresses.
//! Instructions only carry 7 bits, and the eighth bit comes from `STATUS<RP0>`.
//! Addresses passed to [`RegisterFile::get_file`] and [`RegisterFile::set_file`]
//! are resolved like this:
//!
//! - If the low 7 bits are `0x00` (INDF), the access is redirected (exactly once)
//!   to the address held in FSR, with `STATUS<IRP>` as bit 7.
//! - `0x02`-`0x04` and `0x0A`-`0x7F` are *aliased*: the same register appears in both banks.
//!   Writes update both physical cells and reads use the bank 0 cell.
//! - `0x01` and `0x05`-`0x09` are *private*: bank 0 and bank 1 hold different registers
//!   (e.g., `TMR0` and `OPTION_REG`). The bank is `STATUS<RP0>`, unless the address
//!   already has bit 7 set, in which case bank 1 is selected explicitly.
//!
//! ```
//! use pic16_sim::sim::mem::{RegisterFile, regs};
//!
//! let mut file = RegisterFile::new(&mut 0u8);
//! let _ = file.set_file(0x20, 0x42);
//! assert_eq!(file.get_file(0xA0), 0x42); // aliased general purpose register
//!
//! let _ = file.set_file(regs::TMR0, 0x42);
//! assert_eq!(file.get_file(regs::OPTION_REG), 0xFF); // private SFR, untouched
//! ```

use rand::rngs::StdRng;
use rand::Rng;

use super::observer::{AccessObserver, AccessSet};

/// Special function register addresses and bit positions.
pub mod regs {
    /// Indirect addressing (not a physical register).
    pub const INDF: u8 = 0x00;
    /// Timer0 counter.
    pub const TMR0: u8 = 0x01;
    /// Low byte of the program counter.
    pub const PCL: u8 = 0x02;
    /// Status register.
    pub const STATUS: u8 = 0x03;
    /// Indirect address pointer.
    pub const FSR: u8 = 0x04;
    /// Port A data.
    pub const PORTA: u8 = 0x05;
    /// Port B data.
    pub const PORTB: u8 = 0x06;
    /// EEPROM data.
    pub const EEDATA: u8 = 0x08;
    /// EEPROM address.
    pub const EEADR: u8 = 0x09;
    /// Upper bits of the program counter for writes to PCL, `GOTO` and `CALL`.
    pub const PCLATH: u8 = 0x0A;
    /// Interrupt control.
    pub const INTCON: u8 = 0x0B;
    /// Option register (Timer0, prescaler, edge selection).
    pub const OPTION_REG: u8 = 0x81;
    /// Port A direction (1 = input).
    pub const TRISA: u8 = 0x85;
    /// Port B direction (1 = input).
    pub const TRISB: u8 = 0x86;
    /// EEPROM control.
    pub const EECON1: u8 = 0x88;
    /// EEPROM unlock register.
    pub const EECON2: u8 = 0x89;

    /// `STATUS` carry bit.
    pub const C: u8 = 0;
    /// `STATUS` digit carry bit.
    pub const DC: u8 = 1;
    /// `STATUS` zero bit.
    pub const Z: u8 = 2;
    /// `STATUS` power-down bit (0 after `SLEEP`).
    pub const PD: u8 = 3;
    /// `STATUS` time-out bit (0 after a watchdog time-out).
    pub const TO: u8 = 4;
    /// `STATUS` bank select bit.
    pub const RP0: u8 = 5;
    /// `STATUS` indirect bank select bit.
    pub const IRP: u8 = 7;

    /// `OPTION_REG` prescaler assignment (1 = watchdog).
    pub const PSA: u8 = 3;
    /// `OPTION_REG` Timer0 source edge (1 = falling).
    pub const T0SE: u8 = 4;
    /// `OPTION_REG` Timer0 clock source (1 = RA4/T0CKI pin).
    pub const T0CS: u8 = 5;
    /// `OPTION_REG` RB0/INT edge (1 = rising).
    pub const INTEDG: u8 = 6;

    /// `INTCON` port B change flag.
    pub const RBIF: u8 = 0;
    /// `INTCON` RB0/INT flag.
    pub const INTF: u8 = 1;
    /// `INTCON` Timer0 overflow flag.
    pub const T0IF: u8 = 2;
    /// `INTCON` port B change enable.
    pub const RBIE: u8 = 3;
    /// `INTCON` RB0/INT enable.
    pub const INTE: u8 = 4;
    /// `INTCON` Timer0 overflow enable.
    pub const T0IE: u8 = 5;
    /// `INTCON` EEPROM write complete enable.
    pub const EEIE: u8 = 6;
    /// `INTCON` global interrupt enable.
    pub const GIE: u8 = 7;

    /// `EECON1` read control.
    pub const RD: u8 = 0;
    /// `EECON1` write control.
    pub const WR: u8 = 1;
    /// `EECON1` write enable.
    pub const WREN: u8 = 2;
    /// `EECON1` write complete flag.
    pub const EEIF: u8 = 4;

    /// `PORTA` bit of the RA4/T0CKI pin.
    pub const T0CKI: u8 = 4;
}

/// Number of bytes in the data EEPROM.
pub const EEPROM_SIZE: usize = 64;

const N: usize = 0x100;
const GPR_RANGE: std::ops::RangeInclusive<u8> = 0x0C..=0x4F;

/// Trait that describes types that can be used to create power-on values
/// for general purpose registers.
pub trait ByteFiller {
    /// Generate the data.
    fn generate(&mut self) -> u8;
}
impl ByteFiller for () {
    /// This creates unseeded, non-deterministic values.
    fn generate(&mut self) -> u8 {
        rand::random()
    }
}
impl ByteFiller for u8 {
    /// Sets each register to the given value.
    fn generate(&mut self) -> u8 {
        *self
    }
}
impl ByteFiller for StdRng {
    /// This creates values from the standard random number generator.
    ///
    /// This can be used to create deterministic, seeded values.
    fn generate(&mut self) -> u8 {
        self.gen()
    }
}

/// Strategy used to fill the general purpose registers on power-on.
///
/// Real hardware powers up with unknown data in these registers.
/// Special function registers always take their documented power-on values.
#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub enum ByteCreateStrategy {
    /// Initializes each register randomly and non-deterministically.
    Unseeded,

    /// Initializes each register randomly and deterministically.
    Seeded {
        /// The seed the RNG was initialized with.
        seed: u64
    },

    /// Initializes each register to a known value.
    Known {
        /// The value to initialize each register to.
        value: u8
    }
}
impl Default for ByteCreateStrategy {
    fn default() -> Self {
        ByteCreateStrategy::Known { value: 0 }
    }
}

impl ByteCreateStrategy {
    pub(super) fn generator(&self) -> impl ByteFiller {
        use rand::SeedableRng;

        match self {
            ByteCreateStrategy::Unseeded => BCGenerator::Unseeded,
            ByteCreateStrategy::Seeded { seed } => BCGenerator::Seeded(Box::new(StdRng::seed_from_u64(*seed))),
            ByteCreateStrategy::Known { value } => BCGenerator::Known(*value),
        }
    }
}

enum BCGenerator {
    Unseeded,
    Seeded(Box<StdRng>),
    Known(u8)
}
impl ByteFiller for BCGenerator {
    fn generate(&mut self) -> u8 {
        match self {
            BCGenerator::Unseeded  => ().generate(),
            BCGenerator::Seeded(r) => r.generate(),
            BCGenerator::Known(k)  => k.generate(),
        }
    }
}

/// A side effect of a register write that the register file cannot apply by itself.
///
/// Returned by [`RegisterFile::set_file`] and related methods so the owner of
/// the program counter and Timer0 can apply it.
#[must_use]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteEffect {
    /// Plain write.
    None,
    /// TMR0 was written while Timer0 was in timer mode.
    /// Timer0 increments are inhibited for the next two cycles.
    Tmr0Written,
    /// PCL was written. The program counter jumps to the contained address
    /// (`PCLATH<4:0>` as high bits, the written byte as low bits).
    PcWritten(u16),
}

/// The register file.
///
/// This holds the 256-byte banked data memory and the 64-byte data EEPROM.
///
/// Note that this struct provides two methods of accessing registers:
/// - [`RegisterFile::get_raw`]: direct access to a physical cell, without bank resolution
/// - [`RegisterFile::get_file`] and [`RegisterFile::set_file`]: access through bank resolution,
///     including all peripheral side effects
///
/// Unimplemented locations (`0x00`, `0x07`, `0x50`-`0x7F` and their bank 1 mirrors)
/// always read as 0 and ignore writes.
#[derive(Debug, Clone)]
pub struct RegisterFile {
    data: Box<[u8; N]>,
    eeprom: [u8; EEPROM_SIZE],
    pub(super) observer: AccessObserver
}

impl RegisterFile {
    /// Creates a new register file in its power-on state.
    ///
    /// General purpose registers are filled by the provided filler.
    pub fn new(filler: &mut impl ByteFiller) -> Self {
        let mut file = Self {
            data: Box::new([0; N]),
            eeprom: [0; EEPROM_SIZE],
            observer: AccessObserver::new()
        };
        file.clear_memory(filler);
        file
    }

    /// Restores every register to its power-on value.
    ///
    /// This leaves the EEPROM untouched (it is non-volatile).
    pub fn clear_memory(&mut self, filler: &mut impl ByteFiller) {
        self.data.fill(0);
        for addr in GPR_RANGE {
            let value = filler.generate();
            self.set_raw(addr, value);
        }

        self.set_raw(regs::STATUS, 0x18);
        self.set_raw(regs::PCLATH, 0x18);
        self.data[usize::from(regs::OPTION_REG)] = 0xFF;
        self.data[usize::from(regs::TRISA)] = 0x1F;
        self.data[usize::from(regs::TRISB)] = 0xFF;
    }

    /// Applies the bank rules to an address, returning the physical cell to access.
    ///
    /// Aliased registers resolve to their bank 0 cell.
    /// Returns `None` if the address is unimplemented.
    fn resolve(&self, addr: u8) -> Option<u8> {
        let addr = match addr & 0x7F {
            regs::INDF => {
                // one level of indirection only; FSR = 0 lands on the (unimplemented) INDF cell
                let irp = self.data[usize::from(regs::STATUS)] >> regs::IRP & 1;
                self.data[usize::from(regs::FSR)] | irp << 7
            },
            _ if addr & 0x80 != 0 => addr,
            f => f | (self.data[usize::from(regs::STATUS)] >> regs::RP0 & 1) << 7,
        };

        let phys = match Self::is_aliased(addr) {
            true  => addr & 0x7F,
            false => addr,
        };
        Self::is_implemented(phys).then_some(phys)
    }

    /// Whether the same register appears at this address in both banks.
    fn is_aliased(addr: u8) -> bool {
        matches!(addr & 0x7F, 0x02..=0x04 | 0x0A..=0x7F)
    }

    fn is_implemented(phys: u8) -> bool {
        !matches!(phys, 0x00 | 0x80 | 0x07 | 0x87 | 0x50..=0x7F | 0xD0..=0xFF)
    }

    /// Reads a register through bank resolution.
    ///
    /// Reading EEDATA returns the EEPROM byte at EEADR while `EECON1<RD>` is set, and 0 otherwise.
    pub fn get_file(&self, addr: u8) -> u8 {
        let Some(phys) = self.resolve(addr) else { return 0 };

        match phys {
            regs::EEDATA => match self.get_raw_bit(regs::EECON1, regs::RD) {
                true  => self.eeprom[self.eeprom_addr()],
                false => 0,
            },
            phys => self.data[usize::from(phys)],
        }
    }

    /// Writes a register through bank resolution, applying peripheral side effects.
    ///
    /// Side effects are evaluated in this order:
    /// 1. Unimplemented addresses ignore the write.
    /// 2. TMR0 writes in timer mode inhibit Timer0 ([`WriteEffect::Tmr0Written`]).
    /// 3. PCL writes move the program counter ([`WriteEffect::PcWritten`]).
    /// 4. PORTB writes can raise `INTCON<INTF>` (edge on RB0) or `INTCON<RBIF>` (change on RB4-RB7 inputs).
    /// 5. The write itself.
    /// 6. EECON1 writes with `WR` and `WREN` set commit EEDATA to the EEPROM.
    pub fn set_file(&mut self, addr: u8, value: u8) -> WriteEffect {
        let Some(phys) = self.resolve(addr) else { return WriteEffect::None };

        let effect = match phys {
            regs::TMR0 if !self.get_raw_bit(regs::OPTION_REG, regs::T0CS) => WriteEffect::Tmr0Written,
            regs::PCL => {
                let pclath = self.data[usize::from(regs::PCLATH)];
                WriteEffect::PcWritten(u16::from(pclath & 0x1F) << 8 | u16::from(value))
            },
            regs::PORTB => {
                self.detect_portb_change(value);
                WriteEffect::None
            },
            _ => WriteEffect::None
        };

        self.set_raw(phys, value);

        if phys == regs::EECON1 {
            self.commit_eeprom();
        }

        effect
    }

    /// Compares the old and new PORTB values and raises the matching interrupt flag.
    fn detect_portb_change(&mut self, new: u8) {
        let old = self.data[usize::from(regs::PORTB)];
        let rising_edge = self.get_raw_bit(regs::OPTION_REG, regs::INTEDG);
        let inputs = self.data[usize::from(regs::TRISB)];

        let rb0_changed = (old ^ new) & 1 != 0;
        if rb0_changed && (new & 1 != 0) == rising_edge {
            self.set_raw_bit(regs::INTCON, regs::INTF, true);
        } else if (old ^ new) & inputs & 0xF0 != 0 {
            self.set_raw_bit(regs::INTCON, regs::RBIF, true);
        }
    }

    fn commit_eeprom(&mut self) {
        let eecon1 = self.data[usize::from(regs::EECON1)];
        if eecon1 & (1 << regs::WR) != 0 && eecon1 & (1 << regs::WREN) != 0 {
            let addr = self.eeprom_addr();
            self.eeprom[addr] = self.data[usize::from(regs::EEDATA)];
            self.set_raw_bit(regs::EECON1, regs::WR, false);
            self.set_raw_bit(regs::EECON1, regs::EEIF, true);
        }
    }

    fn eeprom_addr(&self) -> usize {
        usize::from(self.data[usize::from(regs::EEADR)]) % EEPROM_SIZE
    }

    /// Reads a single bit (0 or 1) of a register through bank resolution.
    pub fn get_bit(&self, addr: u8, bit: u8) -> u8 {
        self.get_file(addr) >> (bit & 0b111) & 1
    }
    /// Sets a single bit of a register through bank resolution (read-modify-write).
    pub fn set_bit(&mut self, addr: u8, bit: u8) -> WriteEffect {
        let value = self.get_file(addr) | 1 << (bit & 0b111);
        self.set_file(addr, value)
    }
    /// Clears a single bit of a register through bank resolution (read-modify-write).
    pub fn clear_bit(&mut self, addr: u8, bit: u8) -> WriteEffect {
        let value = self.get_file(addr) & !(1 << (bit & 0b111));
        self.set_file(addr, value)
    }

    /// Sets `STATUS<Z>`.
    pub fn set_zero_flag(&mut self) {
        self.set_status_bit(regs::Z, true);
    }
    /// Clears `STATUS<Z>`.
    pub fn clear_zero_flag(&mut self) {
        self.set_status_bit(regs::Z, false);
    }
    /// Sets `STATUS<Z>` if the value is zero, clearing it otherwise.
    pub fn update_zero_flag(&mut self, value: u8) {
        self.set_status_bit(regs::Z, value == 0);
    }

    /// Reads a `STATUS` bit.
    pub fn status_bit(&self, bit: u8) -> bool {
        self.get_raw_bit(regs::STATUS, bit)
    }
    /// Writes a `STATUS` bit (in both banks).
    pub fn set_status_bit(&mut self, bit: u8, value: bool) {
        self.set_raw_bit(regs::STATUS, bit, value);
    }

    /// Gets the value of a physical cell.
    ///
    /// This is **only** meant to be used to query the state of the register file.
    /// Unlike [`RegisterFile::get_file`], this does not apply bank resolution
    /// and does not apply EEPROM read semantics.
    pub fn get_raw(&self, phys: u8) -> u8 {
        // RegisterFile could implement Index<u8>, but it doesn't as a lint against using this function incorrectly.
        self.data[usize::from(phys)]
    }
    /// Reads a bit of a physical cell.
    pub fn get_raw_bit(&self, phys: u8, bit: u8) -> bool {
        self.data[usize::from(phys)] >> bit & 1 != 0
    }

    /// Writes a physical cell (and its mirror, if the register is aliased) without any side effects.
    pub(super) fn set_raw(&mut self, phys: u8, value: u8) {
        match Self::is_aliased(phys) {
            true => {
                self.write_cell(phys & 0x7F, value);
                self.write_cell(phys | 0x80, value);
            },
            false => self.write_cell(phys, value),
        }
    }
    pub(super) fn set_raw_bit(&mut self, phys: u8, bit: u8, value: bool) {
        let data = with_bit(self.data[usize::from(phys)], bit, value);
        self.set_raw(phys, data);
    }
    fn write_cell(&mut self, phys: u8, value: u8) {
        let cell = &mut self.data[usize::from(phys)];
        let mut accesses = AccessSet::WRITTEN;
        if *cell != value {
            accesses |= AccessSet::MODIFIED;
        }
        *cell = value;
        self.observer.update_mem_accesses(phys, accesses);
    }

    /// Mirrors the program counter's low byte into PCL without jumping.
    pub(super) fn sync_pcl(&mut self, pc: u16) {
        self.set_raw(regs::PCL, pc as u8);
    }

    /// The data EEPROM.
    pub fn eeprom(&self) -> &[u8; EEPROM_SIZE] {
        &self.eeprom
    }
    /// Mutable access to the data EEPROM (e.g., to preload it).
    pub fn eeprom_mut(&mut self) -> &mut [u8; EEPROM_SIZE] {
        &mut self.eeprom
    }
}
impl Default for RegisterFile {
    fn default() -> Self {
        Self::new(&mut 0u8)
    }
}

fn with_bit(byte: u8, bit: u8, value: bool) -> u8 {
    match value {
        true  => byte | 1 << bit,
        false => byte & !(1 << bit),
    }
}
