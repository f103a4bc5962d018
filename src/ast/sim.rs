//! Decoded instructions.
//!
//! An opcode is classified exactly once against [`DECODE_TABLE`]
//! (an ordered list of mask/pattern pairs) and turned into a [`SimInstr`],
//! which the simulator then executes through a single `match`.

use super::{BitIdx, Dest, FileReg};

/// The kind of an instruction, without its operands.
#[derive(Debug, PartialEq, Eq, Hash, Clone, Copy)]
#[allow(missing_docs)]
pub enum OpKind {
    Addwf, Andwf, Clrf, Clrw, Comf, Decf, Decfsz, Incf, Incfsz,
    Iorwf, Movf, Movwf, Nop, Rlf, Rrf, Subwf, Swapf, Xorwf,
    Bcf, Bsf, Btfsc, Btfss,
    Addlw, Andlw, Call, Clrwdt, Goto, Iorlw, Movlw,
    Retfie, Retlw, Return, Sleep, Sublw, Xorlw,
}

/// Mask/pattern pairs for every instruction.
///
/// An opcode `op` is of kind `k` iff `op & mask == pattern`.
/// The encodings are disjoint, so at most one entry matches any opcode.
pub const DECODE_TABLE: [(u16, u16, OpKind); 35] = [
    (0x3F00, 0x0700, OpKind::Addwf),
    (0x3F00, 0x0500, OpKind::Andwf),
    (0x3F80, 0x0180, OpKind::Clrf),
    (0x3F80, 0x0100, OpKind::Clrw),
    (0x3F00, 0x0900, OpKind::Comf),
    (0x3F00, 0x0300, OpKind::Decf),
    (0x3F00, 0x0B00, OpKind::Decfsz),
    (0x3F00, 0x0A00, OpKind::Incf),
    (0x3F00, 0x0F00, OpKind::Incfsz),
    (0x3F00, 0x0400, OpKind::Iorwf),
    (0x3F00, 0x0800, OpKind::Movf),
    (0x3F80, 0x0080, OpKind::Movwf),
    (0x3F9F, 0x0000, OpKind::Nop),
    (0x3F00, 0x0D00, OpKind::Rlf),
    (0x3F00, 0x0C00, OpKind::Rrf),
    (0x3F00, 0x0200, OpKind::Subwf),
    (0x3F00, 0x0E00, OpKind::Swapf),
    (0x3F00, 0x0600, OpKind::Xorwf),

    (0x3C00, 0x1000, OpKind::Bcf),
    (0x3C00, 0x1400, OpKind::Bsf),
    (0x3C00, 0x1800, OpKind::Btfsc),
    (0x3C00, 0x1C00, OpKind::Btfss),

    (0x3E00, 0x3E00, OpKind::Addlw),
    (0x3F00, 0x3900, OpKind::Andlw),
    (0x3800, 0x2000, OpKind::Call),
    (0x3FFF, 0x0064, OpKind::Clrwdt),
    (0x3800, 0x2800, OpKind::Goto),
    (0x3F00, 0x3800, OpKind::Iorlw),
    (0x3C00, 0x3000, OpKind::Movlw),
    (0x3FFF, 0x0009, OpKind::Retfie),
    (0x3C00, 0x3400, OpKind::Retlw),
    (0x3FFF, 0x0008, OpKind::Return),
    (0x3FFF, 0x0063, OpKind::Sleep),
    (0x3E00, 0x3C00, OpKind::Sublw),
    (0x3F00, 0x3A00, OpKind::Xorlw),
];

impl OpKind {
    /// Classifies an opcode, returning `None` for reserved encodings.
    pub fn classify(opcode: u16) -> Option<Self> {
        let opcode = opcode & 0x3FFF;
        DECODE_TABLE.iter()
            .find(|&&(mask, pattern, _)| opcode & mask == pattern)
            .map(|&(_, _, kind)| kind)
    }

    /// The bit pattern identifying this instruction.
    pub fn pattern(self) -> u16 {
        DECODE_TABLE.iter()
            .find(|&&(_, _, kind)| kind == self)
            .map_or(0, |&(_, pattern, _)| pattern)
    }

    /// Mnemonic of this instruction.
    pub fn mnemonic(self) -> &'static str {
        match self {
            OpKind::Addwf  => "ADDWF",
            OpKind::Andwf  => "ANDWF",
            OpKind::Clrf   => "CLRF",
            OpKind::Clrw   => "CLRW",
            OpKind::Comf   => "COMF",
            OpKind::Decf   => "DECF",
            OpKind::Decfsz => "DECFSZ",
            OpKind::Incf   => "INCF",
            OpKind::Incfsz => "INCFSZ",
            OpKind::Iorwf  => "IORWF",
            OpKind::Movf   => "MOVF",
            OpKind::Movwf  => "MOVWF",
            OpKind::Nop    => "NOP",
            OpKind::Rlf    => "RLF",
            OpKind::Rrf    => "RRF",
            OpKind::Subwf  => "SUBWF",
            OpKind::Swapf  => "SWAPF",
            OpKind::Xorwf  => "XORWF",
            OpKind::Bcf    => "BCF",
            OpKind::Bsf    => "BSF",
            OpKind::Btfsc  => "BTFSC",
            OpKind::Btfss  => "BTFSS",
            OpKind::Addlw  => "ADDLW",
            OpKind::Andlw  => "ANDLW",
            OpKind::Call   => "CALL",
            OpKind::Clrwdt => "CLRWDT",
            OpKind::Goto   => "GOTO",
            OpKind::Iorlw  => "IORLW",
            OpKind::Movlw  => "MOVLW",
            OpKind::Retfie => "RETFIE",
            OpKind::Retlw  => "RETLW",
            OpKind::Return => "RETURN",
            OpKind::Sleep  => "SLEEP",
            OpKind::Sublw  => "SUBLW",
            OpKind::Xorlw  => "XORLW",
        }
    }
}

/// A decoded instruction with its operands.
///
/// Byte-oriented file operations carry a [`FileReg`] and a [`Dest`],
/// bit-oriented ones a [`FileReg`] and a [`BitIdx`],
/// literal operations an 8-bit literal and `CALL`/`GOTO` an 11-bit address.
#[derive(Debug, PartialEq, Eq, Hash, Clone, Copy)]
#[allow(missing_docs)]
pub enum SimInstr {
    Addwf(FileReg, Dest),
    Andwf(FileReg, Dest),
    Clrf(FileReg),
    Clrw,
    Comf(FileReg, Dest),
    Decf(FileReg, Dest),
    Decfsz(FileReg, Dest),
    Incf(FileReg, Dest),
    Incfsz(FileReg, Dest),
    Iorwf(FileReg, Dest),
    Movf(FileReg, Dest),
    Movwf(FileReg),
    Nop,
    Rlf(FileReg, Dest),
    Rrf(FileReg, Dest),
    Subwf(FileReg, Dest),
    Swapf(FileReg, Dest),
    Xorwf(FileReg, Dest),

    Bcf(FileReg, BitIdx),
    Bsf(FileReg, BitIdx),
    Btfsc(FileReg, BitIdx),
    Btfss(FileReg, BitIdx),

    Addlw(u8),
    Andlw(u8),
    Call(u16),
    Clrwdt,
    Goto(u16),
    Iorlw(u8),
    Movlw(u8),
    Retfie,
    Retlw(u8),
    Return,
    Sleep,
    Sublw(u8),
    Xorlw(u8),
}

impl SimInstr {
    /// Decodes an opcode.
    ///
    /// Returns `None` if the opcode is a reserved encoding
    /// (the simulator executes those as a no-op cycle).
    pub fn decode(opcode: u16) -> Option<Self> {
        let kind = OpKind::classify(opcode)?;

        let f = FileReg(get_bits(opcode, 0..7) as u8);
        let d = Dest::from_bit(get_bits(opcode, 7..8));
        let b = BitIdx(get_bits(opcode, 7..10) as u8);
        let k = get_bits(opcode, 0..8) as u8;
        let addr = get_bits(opcode, 0..11);

        let instr = match kind {
            OpKind::Addwf  => Self::Addwf(f, d),
            OpKind::Andwf  => Self::Andwf(f, d),
            OpKind::Clrf   => Self::Clrf(f),
            OpKind::Clrw   => Self::Clrw,
            OpKind::Comf   => Self::Comf(f, d),
            OpKind::Decf   => Self::Decf(f, d),
            OpKind::Decfsz => Self::Decfsz(f, d),
            OpKind::Incf   => Self::Incf(f, d),
            OpKind::Incfsz => Self::Incfsz(f, d),
            OpKind::Iorwf  => Self::Iorwf(f, d),
            OpKind::Movf   => Self::Movf(f, d),
            OpKind::Movwf  => Self::Movwf(f),
            OpKind::Nop    => Self::Nop,
            OpKind::Rlf    => Self::Rlf(f, d),
            OpKind::Rrf    => Self::Rrf(f, d),
            OpKind::Subwf  => Self::Subwf(f, d),
            OpKind::Swapf  => Self::Swapf(f, d),
            OpKind::Xorwf  => Self::Xorwf(f, d),
            OpKind::Bcf    => Self::Bcf(f, b),
            OpKind::Bsf    => Self::Bsf(f, b),
            OpKind::Btfsc  => Self::Btfsc(f, b),
            OpKind::Btfss  => Self::Btfss(f, b),
            OpKind::Addlw  => Self::Addlw(k),
            OpKind::Andlw  => Self::Andlw(k),
            OpKind::Call   => Self::Call(addr),
            OpKind::Clrwdt => Self::Clrwdt,
            OpKind::Goto   => Self::Goto(addr),
            OpKind::Iorlw  => Self::Iorlw(k),
            OpKind::Movlw  => Self::Movlw(k),
            OpKind::Retfie => Self::Retfie,
            OpKind::Retlw  => Self::Retlw(k),
            OpKind::Return => Self::Return,
            OpKind::Sleep  => Self::Sleep,
            OpKind::Sublw  => Self::Sublw(k),
            OpKind::Xorlw  => Self::Xorlw(k),
        };
        Some(instr)
    }

    /// The kind of this instruction.
    pub fn kind(&self) -> OpKind {
        match self {
            SimInstr::Addwf(..)  => OpKind::Addwf,
            SimInstr::Andwf(..)  => OpKind::Andwf,
            SimInstr::Clrf(_)    => OpKind::Clrf,
            SimInstr::Clrw       => OpKind::Clrw,
            SimInstr::Comf(..)   => OpKind::Comf,
            SimInstr::Decf(..)   => OpKind::Decf,
            SimInstr::Decfsz(..) => OpKind::Decfsz,
            SimInstr::Incf(..)   => OpKind::Incf,
            SimInstr::Incfsz(..) => OpKind::Incfsz,
            SimInstr::Iorwf(..)  => OpKind::Iorwf,
            SimInstr::Movf(..)   => OpKind::Movf,
            SimInstr::Movwf(_)   => OpKind::Movwf,
            SimInstr::Nop        => OpKind::Nop,
            SimInstr::Rlf(..)    => OpKind::Rlf,
            SimInstr::Rrf(..)    => OpKind::Rrf,
            SimInstr::Subwf(..)  => OpKind::Subwf,
            SimInstr::Swapf(..)  => OpKind::Swapf,
            SimInstr::Xorwf(..)  => OpKind::Xorwf,
            SimInstr::Bcf(..)    => OpKind::Bcf,
            SimInstr::Bsf(..)    => OpKind::Bsf,
            SimInstr::Btfsc(..)  => OpKind::Btfsc,
            SimInstr::Btfss(..)  => OpKind::Btfss,
            SimInstr::Addlw(_)   => OpKind::Addlw,
            SimInstr::Andlw(_)   => OpKind::Andlw,
            SimInstr::Call(_)    => OpKind::Call,
            SimInstr::Clrwdt     => OpKind::Clrwdt,
            SimInstr::Goto(_)    => OpKind::Goto,
            SimInstr::Iorlw(_)   => OpKind::Iorlw,
            SimInstr::Movlw(_)   => OpKind::Movlw,
            SimInstr::Retfie     => OpKind::Retfie,
            SimInstr::Retlw(_)   => OpKind::Retlw,
            SimInstr::Return     => OpKind::Return,
            SimInstr::Sleep      => OpKind::Sleep,
            SimInstr::Sublw(_)   => OpKind::Sublw,
            SimInstr::Xorlw(_)   => OpKind::Xorlw,
        }
    }

    /// Encodes this instruction into its 14-bit opcode.
    pub fn encode(&self) -> u16 {
        let pattern = self.kind().pattern();
        let fd = |f: &FileReg, d: &Dest| pattern | (d.bit() << 7) | u16::from(f.0);
        let fb = |f: &FileReg, b: &BitIdx| pattern | (u16::from(b.0) << 7) | u16::from(f.0);

        match self {
            SimInstr::Addwf(f, d)
            | SimInstr::Andwf(f, d)
            | SimInstr::Comf(f, d)
            | SimInstr::Decf(f, d)
            | SimInstr::Decfsz(f, d)
            | SimInstr::Incf(f, d)
            | SimInstr::Incfsz(f, d)
            | SimInstr::Iorwf(f, d)
            | SimInstr::Movf(f, d)
            | SimInstr::Rlf(f, d)
            | SimInstr::Rrf(f, d)
            | SimInstr::Subwf(f, d)
            | SimInstr::Swapf(f, d)
            | SimInstr::Xorwf(f, d) => fd(f, d),
            SimInstr::Clrf(f)  => fd(f, &Dest::F),
            SimInstr::Movwf(f) => fd(f, &Dest::F),

            SimInstr::Bcf(f, b)
            | SimInstr::Bsf(f, b)
            | SimInstr::Btfsc(f, b)
            | SimInstr::Btfss(f, b) => fb(f, b),

            SimInstr::Addlw(k)
            | SimInstr::Andlw(k)
            | SimInstr::Iorlw(k)
            | SimInstr::Movlw(k)
            | SimInstr::Retlw(k)
            | SimInstr::Sublw(k)
            | SimInstr::Xorlw(k) => pattern | u16::from(*k),

            SimInstr::Call(addr) | SimInstr::Goto(addr) => pattern | (addr & 0x7FF),

            SimInstr::Clrw
            | SimInstr::Nop
            | SimInstr::Clrwdt
            | SimInstr::Retfie
            | SimInstr::Return
            | SimInstr::Sleep => pattern,
        }
    }

    /// Whether this instruction always takes two cycles.
    ///
    /// Skip instructions (`BTFSC`, `DECFSZ`, ...) only take two cycles
    /// when the skip is taken, so they are not included here.
    pub fn is_control_transfer(&self) -> bool {
        matches!(
            self,
            SimInstr::Call(_) | SimInstr::Goto(_) | SimInstr::Return | SimInstr::Retlw(_) | SimInstr::Retfie
        )
    }
}

impl std::fmt::Display for SimInstr {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mnemonic = self.kind().mnemonic();
        match self {
            SimInstr::Addwf(r, d)
            | SimInstr::Andwf(r, d)
            | SimInstr::Comf(r, d)
            | SimInstr::Decf(r, d)
            | SimInstr::Decfsz(r, d)
            | SimInstr::Incf(r, d)
            | SimInstr::Incfsz(r, d)
            | SimInstr::Iorwf(r, d)
            | SimInstr::Movf(r, d)
            | SimInstr::Rlf(r, d)
            | SimInstr::Rrf(r, d)
            | SimInstr::Subwf(r, d)
            | SimInstr::Swapf(r, d)
            | SimInstr::Xorwf(r, d) => write!(f, "{mnemonic} {r}, {d}"),
            SimInstr::Clrf(r) | SimInstr::Movwf(r) => write!(f, "{mnemonic} {r}"),

            SimInstr::Bcf(r, b)
            | SimInstr::Bsf(r, b)
            | SimInstr::Btfsc(r, b)
            | SimInstr::Btfss(r, b) => write!(f, "{mnemonic} {r}, {b}"),

            SimInstr::Addlw(k)
            | SimInstr::Andlw(k)
            | SimInstr::Iorlw(k)
            | SimInstr::Movlw(k)
            | SimInstr::Retlw(k)
            | SimInstr::Sublw(k)
            | SimInstr::Xorlw(k) => write!(f, "{mnemonic} 0x{k:02X}"),

            SimInstr::Call(addr) | SimInstr::Goto(addr) => write!(f, "{mnemonic} 0x{addr:03X}"),

            SimInstr::Clrw
            | SimInstr::Nop
            | SimInstr::Clrwdt
            | SimInstr::Retfie
            | SimInstr::Return
            | SimInstr::Sleep => f.write_str(mnemonic),
        }
    }
}

fn get_bits(n: u16, r: std::ops::Range<usize>) -> u16 {
    let len = r.end - r.start;
    (n >> r.start) & ((1 << len) - 1)
}
