//! Utilities to debug simulation.
//!
//! The key type here is [`Breakpoint`], which can be appended to the [`Simulator`]'s
//! breakpoints field to cause the run loops to pause.
//!
//! Breakpoints flagged directly on instructions (see [`ProcessorInstruction::is_breakpoint`])
//! are checked alongside these.
//!
//! [`ProcessorInstruction::is_breakpoint`]: crate::ast::ProcessorInstruction::is_breakpoint
use std::fmt::Write;

use super::Simulator;

/// Common breakpoints.
#[derive(PartialEq, Eq, Hash, Clone)]
pub enum Breakpoint {
    /// Break when the PC is equal to the given value.
    Pc(u16),

    /// Break when the instruction at PC came from the given listing line.
    Line(usize),

    /// Break when the given physical register file cell holds a matching value.
    File {
        /// Physical address to check (bank 1 cells are `0x80`-`0xFF`).
        addr: u8,
        /// Predicate to break against.
        value: Comparator
    },

    /// Break when the working register holds a matching value.
    W(Comparator),
}

impl Breakpoint where Breakpoint: Send + Sync { /* assert Breakpoint is send/sync */ }

impl Breakpoint {
    /// Checks if a break should occur.
    pub fn check(&self, sim: &Simulator) -> bool {
        match self {
            Breakpoint::Pc(expected) => *expected == sim.pc(),
            Breakpoint::Line(line) => sim.current_instr().is_some_and(|i| i.source_line() == *line),
            Breakpoint::File { addr, value: cmp } => cmp.check(sim.reg_file.get_raw(*addr)),
            Breakpoint::W(cmp) => cmp.check(sim.w()),
        }
    }

    fn fmt_bp(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        match self {
            Self::Pc(expected) => {
                write!(f, "PC == 0x{expected:03X}")?;
            },
            Self::Line(line) => {
                write!(f, "line == {line}")?;
            },
            Self::File { addr, value } => {
                write!(f, "file[0x{addr:02X}] ")?;
                value.fmt_cmp(f)?;
            },
            Self::W(value) => {
                f.write_str("W ")?;
                value.fmt_cmp(f)?;
            },
        }
        Ok(())
    }
}
impl std::fmt::Debug for Breakpoint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("Breakpoint(")?;
        self.fmt_bp(f)?;
        f.write_char(')')
    }
}
/// A predicate on a byte value, used by [`Breakpoint::File`] and [`Breakpoint::W`].
#[derive(PartialEq, Eq, Hash, Debug, Clone, Copy)]
pub enum Comparator {
    /// Never breaks.
    Never,
    /// Break if the desired value is less than the provided value.
    Lt(u8),
    /// Break if the desired value is equal to the provided value.
    Eq(u8),
    /// Break if the desired value is less than or equal to the provided value.
    Le(u8),
    /// Break if the desired value is greater than the provided value.
    Gt(u8),
    /// Break if the desired value is not equal to the provided value.
    Ne(u8),
    /// Break if the desired value is greater than or equal to the provided value.
    Ge(u8),
    /// Break if all of the bits of the mask are set.
    BitsSet(u8),
    /// Always breaks.
    Always
}
impl Comparator {
    /// Checks if the operand passes the comparator.
    pub fn check(&self, operand: u8) -> bool {
        match *self {
            Comparator::Never  => false,
            Comparator::Lt(r)  => operand < r,
            Comparator::Eq(r)  => operand == r,
            Comparator::Le(r)  => operand <= r,
            Comparator::Gt(r)  => operand > r,
            Comparator::Ne(r)  => operand != r,
            Comparator::Ge(r)  => operand >= r,
            Comparator::BitsSet(m) => operand & m == m,
            Comparator::Always => true,
        }
    }

    fn fmt_cmp(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Comparator::Never  => f.write_str("never"),
            Comparator::Lt(r)  => write!(f, "< 0x{r:02X}"),
            Comparator::Eq(r)  => write!(f, "== 0x{r:02X}"),
            Comparator::Le(r)  => write!(f, "<= 0x{r:02X}"),
            Comparator::Gt(r)  => write!(f, "> 0x{r:02X}"),
            Comparator::Ne(r)  => write!(f, "!= 0x{r:02X}"),
            Comparator::Ge(r)  => write!(f, ">= 0x{r:02X}"),
            Comparator::BitsSet(m) => write!(f, "& 0x{m:02X} == 0x{m:02X}"),
            Comparator::Always => f.write_str("always"),
        }
    }
}
