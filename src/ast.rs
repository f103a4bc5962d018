//! Components relating to the instructions handed to the simulator.
//!
//! This module holds:
//! - [`Instruction`] (one line of a program listing, as produced by a loader),
//! - [`ProcessorInstruction`] (a listing line that carries an opcode),
//! - and [`sim::SimInstr`] (a decoded opcode).
//!
//! The operand types ([`FileReg`], [`Dest`], [`BitIdx`]) describe the fixed
//! bit fields of the 14-bit instruction word.

pub mod sim;

/// A 7-bit file register address taken from an opcode (the `f` field).
///
/// The bank this address refers to is decided by `STATUS<RP0>` at the time of access.
///
/// ## Examples
///
/// ```text
/// MOVWF 0x20
///       ~~~~
/// BSF   0x03, 5
///       ~~~~
/// ```
#[derive(Debug, PartialEq, Eq, Hash, Clone, Copy)]
pub struct FileReg(pub(crate) u8);

impl FileReg {
    /// Creates a file register address, truncating it to 7 bits.
    pub fn new_trunc(addr: u8) -> Self {
        FileReg(addr & 0x7F)
    }
    /// Gets the 7-bit address of this register.
    pub fn addr(self) -> u8 {
        self.0
    }
}
impl std::fmt::Display for FileReg {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "0x{:02X}", self.0)
    }
}

/// The destination of a byte-oriented file register operation (the `d` field).
#[derive(Debug, PartialEq, Eq, Hash, Clone, Copy)]
pub enum Dest {
    /// Store the result in the working register (`d = 0`).
    W,
    /// Store the result back into the file register (`d = 1`).
    F
}
impl Dest {
    pub(crate) fn from_bit(bit: u16) -> Self {
        match bit & 1 {
            0 => Dest::W,
            _ => Dest::F,
        }
    }
    pub(crate) fn bit(self) -> u16 {
        match self {
            Dest::W => 0,
            Dest::F => 1,
        }
    }
}
impl std::fmt::Display for Dest {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Dest::W => f.write_str("w"),
            Dest::F => f.write_str("f"),
        }
    }
}

/// A bit index between 0 and 7 (the `b` field of bit-oriented operations).
#[derive(Debug, PartialEq, Eq, Hash, Clone, Copy)]
pub struct BitIdx(pub(crate) u8);
impl BitIdx {
    /// Creates a bit index, truncating it to 3 bits.
    pub fn new_trunc(bit: u8) -> Self {
        BitIdx(bit & 0b111)
    }
    /// Gets the bit index. This is always between 0 and 7.
    pub fn get(self) -> u8 {
        self.0
    }
}
impl std::fmt::Display for BitIdx {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// An instruction executable by the simulator.
///
/// This is the unit the simulator's program memory is made of.
/// Besides the opcode, it keeps the line it came from in the listing
/// (so the shell can highlight the current line) and a breakpoint flag
/// (which the shell can toggle at any time).
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ProcessorInstruction {
    opcode: u16,
    source_line: usize,
    /// Whether a run loop should pause when this instruction is reached.
    pub is_breakpoint: bool
}
impl ProcessorInstruction {
    /// Creates a new processor instruction.
    ///
    /// Only the 14 least significant bits of the opcode are kept.
    pub fn new(opcode: u16, source_line: usize) -> Self {
        Self { opcode: opcode & 0x3FFF, source_line, is_breakpoint: false }
    }
    /// The 14-bit opcode.
    pub fn opcode(&self) -> u16 {
        self.opcode
    }
    /// The 1-based line in the listing this instruction came from.
    pub fn source_line(&self) -> usize {
        self.source_line
    }
}

/// One line of a loaded listing.
///
/// Only [`Instruction::Processor`] lines end up in program memory.
/// The other variants exist so a loader can hand over the full listing
/// in order.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Instruction {
    /// A comment-only line.
    Comment {
        /// Line in the listing.
        line: usize,
        /// Text of the line.
        text: String
    },
    /// An assembler directive (e.g., `ORG`, `EQU`, `LIST`).
    Directive {
        /// Line in the listing.
        line: usize,
        /// Text of the line.
        text: String
    },
    /// An instruction with an opcode.
    Processor(ProcessorInstruction)
}
impl Instruction {
    /// The line in the listing this item came from.
    pub fn source_line(&self) -> usize {
        match self {
            Instruction::Comment { line, .. } => *line,
            Instruction::Directive { line, .. } => *line,
            Instruction::Processor(instr) => instr.source_line(),
        }
    }
    /// Gets the processor instruction if this line has one.
    pub fn as_processor(&self) -> Option<&ProcessorInstruction> {
        match self {
            Instruction::Processor(instr) => Some(instr),
            _ => None
        }
    }
}
impl From<ProcessorInstruction> for Instruction {
    fn from(value: ProcessorInstruction) -> Self {
        Instruction::Processor(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn opcode_is_14_bits() {
        let instr = ProcessorInstruction::new(0xFFFF, 7);
        assert_eq!(instr.opcode(), 0x3FFF);
        assert_eq!(instr.source_line(), 7);
        assert!(!instr.is_breakpoint);
    }

    #[test]
    fn listing_lines() {
        let comment = Instruction::Comment { line: 1, text: "; main".to_string() };
        let processor = Instruction::from(ProcessorInstruction::new(0x0000, 2));

        assert_eq!(comment.source_line(), 1);
        assert_eq!(processor.source_line(), 2);
        assert!(comment.as_processor().is_none());
        assert_eq!(processor.as_processor().map(|i| i.opcode()), Some(0x0000));
    }

    #[test]
    fn operands_truncate() {
        assert_eq!(FileReg::new_trunc(0x86).addr(), 0x06);
        assert_eq!(BitIdx::new_trunc(9).get(), 1);
        assert_eq!(FileReg::new_trunc(0x20).to_string(), "0x20");
    }
}
