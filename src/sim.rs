//! Simulating and execution for PIC16 programs.
//!
//! This module is focused on executing pre-assembled opcodes (i.e., a list of [`Instruction`]s).
//!
//! This module consists of:
//! - [`Simulator`]: The struct that simulates the microcontroller.
//! - [`mem`]: The module handling the banked register file and the EEPROM.
//! - [`device`]: The module handling Timer0, the watchdog, and interrupts.
//! - [`debug`]: The module handling types of breakpoints for the simulator.
//! - [`frame`]: The module handling the return-address stack.
//! - [`view`]: The module handling notifications to the shell displaying the simulator.
//! - [`observer`]: The module tracking which registers changed.
//!
//! # Usage
//!
//! To simulate some code, you need to instantiate a Simulator, load a program to it, and reset it:
//!
//! ```
//! use pic16_sim::ast::{Instruction, ProcessorInstruction};
//! use pic16_sim::sim::Simulator;
//!
//! let program: Vec<Instruction> = vec![
//!     Instruction::Comment { line: 1, text: "; count up".to_string() },
//!     ProcessorInstruction::new(0x3E01, 2).into(), // ADDLW 0x01
//!     ProcessorInstruction::new(0x2800, 3).into(), // GOTO 0
//! ];
//!
//! let mut sim = Simulator::new(Default::default());
//! sim.load_program(&program);
//! sim.reset();
//!
//! sim.step().unwrap();
//! assert_eq!(sim.w(), 1);
//! assert_eq!(sim.pc(), 1);
//! sim.step().unwrap();
//! assert_eq!(sim.pc(), 0);
//! ```
//!
//! ## Flags
//!
//! Here, we define `sim` to have the default flags.
//! We could also configure the simulator by editing the flags. For example,
//! if we wish to disable the watchdog, we can edit the flags like so:
//!
//! ```
//! # use pic16_sim::sim::{Simulator, SimFlags};
//! let mut sim = Simulator::new(SimFlags { watchdog_enabled: false, ..Default::default() });
//! ```
//!
//! All of the available flags can be found in [`SimFlags`].
//!
//! ## Execution
//!
//! Beyond the basic [`Simulator::step`] (which executes one instruction),
//! there are also:
//! - [`Simulator::run`]: runs until the clock is stopped or a breakpoint is hit
//! - [`Simulator::run_while`], [`Simulator::run_with_limit`]: more advanced programmatic execution
//!
//! The clock ([`Simulator::clock`]) is an atomic flag, so a shell on another thread can stop a run.
//!
//! ## Querying State
//!
//! - The working register and the program counter are available through [`Simulator::w`] and [`Simulator::pc`].
//! - The register file is available through [`Simulator::reg_file`].
//! - Registers can be written like the shell would (e.g., toggling an input pin) with
//!   [`Simulator::set_file`], [`Simulator::set_bit`], [`Simulator::clear_bit`] and [`Simulator::toggle_bit`].
//!   These apply the same side effects as instruction writes.
//!
//! ```
//! use pic16_sim::sim::Simulator;
//! use pic16_sim::sim::mem::regs;
//!
//! let mut sim = Simulator::new(Default::default());
//! sim.set_bit(regs::PORTB, 4); // RB4 is an input on power-on
//! assert_eq!(sim.reg_file().get_bit(regs::INTCON, regs::RBIF), 1);
//! ```
pub mod debug;
pub mod device;
pub mod frame;
pub mod mem;
pub mod observer;
pub mod view;

use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, info, trace, warn};

use crate::ast::sim::SimInstr;
use crate::ast::{Dest, FileReg, Instruction, ProcessorInstruction};
use debug::Breakpoint;
use device::{ClockedDevice, InterruptSource, Timer0, Watchdog, WatchdogEvent};
use frame::{FrameStack, FrameType};
use mem::{regs, ByteCreateStrategy, RegisterFile, WriteEffect, EEPROM_SIZE};
use observer::{AccessObserver, AccessSet};
use view::{SimView, SourceView};

/// Errors that can occur during simulation.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SimErr {
    /// The simulator was stepped without a loaded program.
    #[error("no program is loaded")]
    EmptyProgram,
    /// The program counter points past the end of the loaded program.
    #[error("program counter 0x{pc:03X} is outside of the loaded program ({len} instructions)")]
    PcOutOfRange {
        /// The program counter.
        pc: u16,
        /// The number of loaded instructions.
        len: usize
    },
    /// A `CALL` or interrupt was entered with a full return stack.
    #[error("return stack overflowed (depth {depth})")]
    StackOverflow {
        /// The configured stack depth.
        depth: usize
    },
    /// A return instruction was executed with an empty return stack.
    #[error("return executed with an empty return stack")]
    StackUnderflow,
}

/// Reason for why execution paused if it wasn't due to an error.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug, Default)]
enum PauseCondition {
    /// The clock was stopped.
    ClockOff,
    /// Program hit a breakpoint.
    Breakpoint,
    /// Program hit a tripwire condition.
    Tripwire,
    /// Program hit an error and did not pause successfully.
    #[default]
    Unsuccessful
}

/// Configuration flags for [`Simulator`].
///
/// These can be modified after the `Simulator` is created with [`Simulator::new`]
/// and their effects should still apply.
///
/// Read the field descriptions for more details.
#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub struct SimFlags {
    /// The creation strategy for general purpose registers on power-on.
    ///
    /// Special function registers always take their hardware power-on values.
    ///
    /// By default, this flag is [`ByteCreateStrategy::default`] (all zeroes).
    pub machine_init: ByteCreateStrategy,

    /// The depth of the hardware return stack (`None` for unbounded).
    ///
    /// This flag only goes into effect after a `Simulator::new` or `Simulator::reset` call.
    ///
    /// By default, this flag is `Some(8)`.
    pub stack_depth: Option<usize>,

    /// Whether the watchdog timer is running (the WDTE configuration fuse).
    ///
    /// By default, this flag is `true`.
    pub watchdog_enabled: bool,

    /// The unscaled watchdog time-out period.
    ///
    /// By default, this flag is 18 ms.
    pub watchdog_timeout: Duration,

    /// Simulated time per instruction cycle (four oscillator periods).
    ///
    /// By default, this flag is 1 µs (a 4 MHz crystal).
    pub cycle_time: Duration,
}

impl Default for SimFlags {
    fn default() -> Self {
        Self {
            machine_init: Default::default(),
            stack_depth: Some(8),
            watchdog_enabled: true,
            watchdog_timeout: Duration::from_millis(18),
            cycle_time: Duration::from_micros(1),
        }
    }
}

/// Program counter mask (1K words of program memory).
const PC_MASK: u16 = 0x3FF;
/// Where execution starts after a reset.
const RESET_VECTOR: u16 = 0x000;
/// Where execution jumps on an interrupt.
const INTERRUPT_VECTOR: u16 = 0x004;

/// An arithmetic result with its carry flags.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Arith {
    result: u8,
    carry: bool,
    digit_carry: bool,
}
impl Arith {
    /// `a + b`.
    fn add(a: u8, b: u8) -> Self {
        let (result, carry) = a.overflowing_add(b);
        Self { result, carry, digit_carry: (a & 0xF) + (b & 0xF) > 0xF }
    }
    /// `a - w`. C and DC are inverted borrows.
    fn sub(a: u8, w: u8) -> Self {
        Self {
            result: a.wrapping_sub(w),
            carry: w <= a,
            digit_carry: (w & 0xF) <= (a & 0xF),
        }
    }
}

/// The start/stop flag of a run.
///
/// If unset, the run loops stop before the next step.
pub type Clock = Arc<AtomicBool>;

/// How the program counter moves after an instruction executes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Flow {
    /// Continue with the next instruction.
    Next,
    /// Skip the next instruction (two cycles).
    Skip,
    /// Jump to an address (two cycles).
    Jump(u16),
    /// Stay at this instruction (`SLEEP`).
    Stay,
}

/// Executes PIC16 programs.
#[derive(Debug)]
pub struct Simulator {
    // ------------------ SIMULATION STATE ------------------
    // Calling [`Simulator::reset`] resets these values.

    /// The register file (data memory and EEPROM).
    reg_file: RegisterFile,

    /// The working register.
    w: u8,

    /// The program counter.
    pc: u16,

    /// The return stack.
    pub frame_stack: FrameStack,

    /// Whether the core is halted by `SLEEP`.
    sleeping: bool,

    /// Timer0 state outside of TMR0.
    timer0: Timer0,

    /// Watchdog accumulator.
    watchdog: Watchdog,

    /// Jump requested by a PCL write during the current instruction.
    pending_jump: Option<u16>,

    /// Indicates the reason why the last execution (via [`Simulator::run_while`] and adjacent)
    /// had paused.
    pause_condition: PauseCondition,

    // ------------------ CONFIG/DEBUG STATE ------------------
    // Calling [`Simulator::reset`] does not reset these values.

    /// The loaded program.
    program: Vec<ProcessorInstruction>,

    /// Simulated time since the stopwatch was last reset.
    runtime: Duration,

    /// Machine cycles since this `Simulator` was created.
    cycles_run: u64,

    /// Start/stop flag.
    ///
    /// This is publicly accessible via a reference through [`Simulator::clock`].
    clock: Clock,

    /// Configuration settings for the simulator.
    ///
    /// These are preserved between resets.
    ///
    /// See [`SimFlags`] for more details on what configuration
    /// settings are available.
    pub flags: SimFlags,

    /// Breakpoints for the simulator.
    pub breakpoints: HashSet<Breakpoint>,

    /// Receives line changes and elapsed time.
    pub view: SimView,
}
impl Simulator where Simulator: Send + Sync {}

impl Simulator {
    /// Creates a new simulator with the provided flags, in its power-on state,
    /// but without a loaded program.
    pub fn new(flags: SimFlags) -> Self {
        let mut filler = flags.machine_init.generator();

        Self {
            reg_file: RegisterFile::new(&mut filler),
            w: 0,
            pc: RESET_VECTOR,
            frame_stack: FrameStack::new(flags.stack_depth),
            sleeping: false,
            timer0: Timer0::new(),
            watchdog: Watchdog::new(flags.watchdog_enabled, flags.watchdog_timeout, flags.cycle_time),
            pending_jump: None,
            pause_condition: Default::default(),

            program: vec![],
            runtime: Duration::ZERO,
            cycles_run: 0,
            clock: Arc::default(),
            flags,
            breakpoints: Default::default(),
            view: Default::default(),
        }
    }

    /// Replaces the loaded program.
    ///
    /// Only processor instructions are kept (in listing order).
    /// Comments and directives only exist in the listing.
    ///
    /// This does not reset the simulator. Call [`Simulator::reset`] before stepping.
    pub fn load_program(&mut self, listing: &[Instruction]) {
        self.program = listing.iter()
            .filter_map(Instruction::as_processor)
            .cloned()
            .collect();
    }

    /// Copies bytes into the data EEPROM, starting at address 0.
    ///
    /// Bytes past the end of the EEPROM are ignored.
    pub fn load_eeprom(&mut self, data: &[u8]) {
        let len = data.len().min(EEPROM_SIZE);
        self.reg_file.eeprom_mut()[..len].copy_from_slice(&data[..len]);
    }

    /// Resets the simulator (power-on reset).
    ///
    /// This restores the register file to its power-on values, sets PC and W to 0,
    /// and clears the sleep state, the return stack, and the timer and watchdog counters.
    /// The current line is reported to the view.
    ///
    /// Note that this function preserves:
    /// - Flags
    /// - Breakpoints
    /// - The loaded program
    /// - The EEPROM contents
    /// - The stopwatch (see [`Simulator::reset_stopwatch`])
    /// - Clock reference (i.e., anything with access to the Simulator's clock can still control it)
    pub fn reset(&mut self) {
        self.reset_state();
        debug!("reset");
        self.notify_line();
    }

    /// [`Simulator::reset`] without reporting the line to the view.
    fn reset_state(&mut self) {
        let mut filler = self.flags.machine_init.generator();
        self.reg_file.clear_memory(&mut filler);

        self.w = 0;
        self.frame_stack = FrameStack::new(self.flags.stack_depth);
        self.sleeping = false;
        self.timer0.reset();
        self.watchdog.reset();
        self.pending_jump = None;
        self.set_pc(RESET_VECTOR);
    }

    /// The working register.
    pub fn w(&self) -> u8 {
        self.w
    }

    /// The program counter.
    pub fn pc(&self) -> u16 {
        self.pc
    }

    /// The `STATUS` register.
    pub fn status(&self) -> u8 {
        self.reg_file.get_raw(regs::STATUS)
    }

    /// Gets a reference to the register file.
    ///
    /// Writes go through [`Simulator::set_file`] and related methods,
    /// so their side effects cannot be skipped.
    pub fn reg_file(&self) -> &RegisterFile {
        &self.reg_file
    }

    /// Whether the core is halted by `SLEEP`.
    pub fn is_sleeping(&self) -> bool {
        self.sleeping
    }

    /// Gets a reference to the Timer0 state.
    pub fn timer0(&self) -> &Timer0 {
        &self.timer0
    }

    /// Gets a reference to the watchdog state.
    pub fn watchdog(&self) -> &Watchdog {
        &self.watchdog
    }

    /// The loaded program.
    pub fn program(&self) -> &[ProcessorInstruction] {
        &self.program
    }

    /// The instruction at PC, if PC is within the program.
    pub fn current_instr(&self) -> Option<&ProcessorInstruction> {
        self.program.get(usize::from(self.pc))
    }

    /// Simulated time since the stopwatch was last reset.
    pub fn runtime(&self) -> Duration {
        self.runtime
    }

    /// Resets the stopwatch to zero.
    pub fn reset_stopwatch(&mut self) {
        self.runtime = Duration::ZERO;
    }

    /// The number of machine cycles executed since this `Simulator` was created.
    pub fn cycles_run(&self) -> u64 {
        self.cycles_run
    }

    /// Gets a reference to the clock.
    pub fn clock(&self) -> &Clock {
        // The clock field is not exposed because that allows someone to swap it
        // with another AtomicBool, which would disconnect anyone holding the old one.
        &self.clock
    }

    /// Gets a reference to the register change observer.
    pub fn observer(&self) -> &AccessObserver {
        &self.reg_file.observer
    }

    /// Takes all register changes since the last call, in physical address order.
    pub fn take_changes(&mut self) -> impl Iterator<Item=(u8, AccessSet)> {
        self.reg_file.observer.take_mem_accesses()
    }

    /// Indicates whether the last execution of the simulator hit a breakpoint.
    pub fn hit_breakpoint(&self) -> bool {
        matches!(self.pause_condition, PauseCondition::Breakpoint)
    }

    /// Indicates whether the last execution of the simulator stopped because the clock was stopped.
    pub fn hit_clock_stop(&self) -> bool {
        matches!(self.pause_condition, PauseCondition::ClockOff)
    }

    /// Sets the breakpoint flag of the instruction at the given program index.
    ///
    /// Returns false if there is no instruction at that index.
    pub fn set_breakpoint(&mut self, index: usize, enabled: bool) -> bool {
        match self.program.get_mut(index) {
            Some(instr) => {
                instr.is_breakpoint = enabled;
                true
            },
            None => false
        }
    }

    /// Flips the breakpoint flag of the instruction at the given program index,
    /// returning the new state.
    pub fn toggle_breakpoint(&mut self, index: usize) -> Option<bool> {
        let instr = self.program.get_mut(index)?;
        instr.is_breakpoint = !instr.is_breakpoint;
        Some(instr.is_breakpoint)
    }

    /// Writes a register the way the shell would.
    ///
    /// Bank resolution and all write side effects apply (see [`RegisterFile::set_file`]).
    pub fn set_file(&mut self, addr: u8, value: u8) {
        let effect = self.reg_file.set_file(addr, value);
        self.apply_external(effect);
    }

    /// Sets one bit of a register the way the shell would.
    pub fn set_bit(&mut self, addr: u8, bit: u8) {
        let effect = self.reg_file.set_bit(addr, bit);
        self.apply_external(effect);
    }

    /// Clears one bit of a register the way the shell would.
    pub fn clear_bit(&mut self, addr: u8, bit: u8) {
        let effect = self.reg_file.clear_bit(addr, bit);
        self.apply_external(effect);
    }

    /// Flips one bit of a register the way the shell would (e.g., a port pin button).
    pub fn toggle_bit(&mut self, addr: u8, bit: u8) {
        match self.reg_file.get_bit(addr, bit) {
            0 => self.set_bit(addr, bit),
            _ => self.clear_bit(addr, bit),
        }
    }

    /// Applies a write effect that happened outside of instruction execution.
    fn apply_external(&mut self, effect: WriteEffect) {
        self.apply_effect(effect);
        if let Some(target) = self.pending_jump.take() {
            self.set_pc(target);
            self.notify_line();
        }
    }

    /// Applies the side effect of a register write.
    fn apply_effect(&mut self, effect: WriteEffect) {
        match effect {
            WriteEffect::None => {},
            WriteEffect::Tmr0Written => self.timer0.tmr0_written(),
            WriteEffect::PcWritten(target) => self.pending_jump = Some(target & PC_MASK),
        }
    }

    /// Sets the PC, keeping PCL in sync.
    fn set_pc(&mut self, addr: u16) {
        self.pc = addr & PC_MASK;
        self.reg_file.sync_pcl(self.pc);
    }

    /// Reports the line of the instruction at PC to the view.
    fn notify_line(&self) {
        if let Some(instr) = self.current_instr() {
            self.view.set_current_line(instr.source_line());
        }
    }

    /// Copies the flags into the peripherals that use them.
    fn sync_flags(&mut self) {
        self.watchdog.enabled = self.flags.watchdog_enabled;
        self.watchdog.timeout = self.flags.watchdog_timeout;
        self.watchdog.cycle_time = self.flags.cycle_time;
    }

    /// Advances the peripherals by one machine cycle.
    ///
    /// Returns false if the watchdog timed out (and the core was woken or reset),
    /// which ends the current step.
    fn tick(&mut self) -> bool {
        self.cycles_run = self.cycles_run.wrapping_add(1);
        self.runtime += self.flags.cycle_time;

        match self.watchdog.tick(&mut self.reg_file, self.sleeping) {
            WatchdogEvent::None => {
                self.timer0.tick(&mut self.reg_file, self.sleeping);
                true
            },
            WatchdogEvent::Wake => {
                debug!(pc = self.pc, "watchdog woke the core");
                self.sleeping = false;
                self.reg_file.set_status_bit(regs::TO, false);
                self.set_pc(self.pc + 1);
                false
            },
            WatchdogEvent::Reset => {
                warn!(pc = self.pc, "watchdog time-out, resetting");
                // the step reports the new line once it finishes
                self.reset_state();
                self.reg_file.set_status_bit(regs::PD, false);
                false
            },
        }
    }

    /// Enters the interrupt vector.
    fn enter_interrupt(&mut self, source: InterruptSource) -> Result<(), SimErr> {
        let return_addr = match self.sleeping {
            // resume after the SLEEP instruction
            true  => (self.pc + 1) & PC_MASK,
            false => self.pc,
        };
        debug!(?source, return_addr, "interrupt");

        // a failed push leaves the core as it was
        self.frame_stack.push_frame(return_addr, INTERRUPT_VECTOR, FrameType::Interrupt)?;
        self.sleeping = false;
        self.reg_file.set_raw_bit(regs::INTCON, regs::GIE, false);
        self.set_pc(INTERRUPT_VECTOR);
        Ok(())
    }

    /// Simulate one step: take a pending interrupt or execute one instruction.
    ///
    /// This returns the simulated time the step consumed
    /// (one or two cycles, see [`SimFlags::cycle_time`]), which is also reported to the view.
    ///
    /// # Errors
    /// - [`SimErr::EmptyProgram`] if no program is loaded.
    /// - [`SimErr::PcOutOfRange`] if the PC is past the end of the program.
    /// - [`SimErr::StackOverflow`] and [`SimErr::StackUnderflow`] for return stack misuse.
    pub fn step(&mut self) -> Result<Duration, SimErr> {
        if self.program.is_empty() {
            return Err(SimErr::EmptyProgram);
        }
        self.sync_flags();
        let start = self.runtime;

        self.step_inner()?;

        let elapsed = self.runtime.saturating_sub(start);
        self.notify_line();
        self.view.elapsed(elapsed);
        Ok(elapsed)
    }

    fn step_inner(&mut self) -> Result<(), SimErr> {
        if let Some(source) = device::poll_interrupt(&self.reg_file) {
            self.enter_interrupt(source)?;
            self.tick();
            return Ok(());
        }
        if self.sleeping && device::pending_interrupt(&self.reg_file).is_some() {
            // enabled flag with GIE clear: wake up and continue after SLEEP
            debug!(pc = self.pc, "interrupt flag woke the core");
            self.sleeping = false;
            self.set_pc(self.pc + 1);
        }

        if !self.tick() || self.sleeping {
            return Ok(());
        }

        let pc = self.pc;
        let opcode = self.program.get(usize::from(pc))
            .ok_or(SimErr::PcOutOfRange { pc, len: self.program.len() })?
            .opcode();

        // PCL reads as the address of the next instruction during execution
        self.reg_file.sync_pcl(pc + 1);

        let flow = match SimInstr::decode(opcode) {
            Some(instr) => {
                trace!(pc, %instr, w = self.w);
                self.execute(instr)?
            },
            None => {
                warn!(pc, opcode, "unknown opcode, executing as NOP");
                Flow::Next
            }
        };
        let flow = self.pending_jump.take().map_or(flow, Flow::Jump);

        match flow {
            Flow::Next => self.set_pc(pc + 1),
            Flow::Stay => self.set_pc(pc),
            Flow::Skip => {
                self.set_pc(pc + 2);
                self.tick();
            },
            Flow::Jump(target) => {
                self.set_pc(target);
                self.tick();
            },
        }

        Ok(())
    }

    /// Reads a file register operand.
    fn read_f(&self, f: FileReg) -> u8 {
        self.reg_file.get_file(f.addr())
    }
    /// Writes a file register operand.
    fn write_f(&mut self, f: FileReg, value: u8) {
        let effect = self.reg_file.set_file(f.addr(), value);
        self.apply_effect(effect);
    }
    /// Stores a result into W or the file register.
    fn store(&mut self, f: FileReg, d: Dest, value: u8) {
        match d {
            Dest::W => self.w = value,
            Dest::F => self.write_f(f, value),
        }
    }

    /// Stores a result, then updates Z.
    ///
    /// Flags are written last, so they win over a result stored into `STATUS`.
    fn store_logic(&mut self, f: FileReg, d: Dest, result: u8) {
        self.store(f, d, result);
        self.reg_file.update_zero_flag(result);
    }
    /// Stores an arithmetic result, then updates C, DC and Z.
    fn store_arith(&mut self, f: FileReg, d: Dest, r: Arith) {
        self.store(f, d, r.result);
        self.set_arith_flags(r);
    }
    fn set_arith_flags(&mut self, r: Arith) {
        self.reg_file.set_status_bit(regs::C, r.carry);
        self.reg_file.set_status_bit(regs::DC, r.digit_carry);
        self.reg_file.update_zero_flag(r.result);
    }

    /// `GOTO`/`CALL` target from the 11-bit literal and `PCLATH<4:3>`.
    fn branch_target(&self, k: u16) -> u16 {
        let pclath = u16::from(self.reg_file.get_raw(regs::PCLATH));
        ((pclath & 0x18) << 8 | k & 0x7FF) & PC_MASK
    }

    fn execute(&mut self, instr: SimInstr) -> Result<Flow, SimErr> {
        let next = (self.pc + 1) & PC_MASK;

        let flow = match instr {
            SimInstr::Addwf(f, d) => {
                let r = Arith::add(self.w, self.read_f(f));
                self.store_arith(f, d, r);
                Flow::Next
            },
            SimInstr::Andwf(f, d) => {
                let result = self.w & self.read_f(f);
                self.store_logic(f, d, result);
                Flow::Next
            },
            SimInstr::Clrf(f) => {
                self.write_f(f, 0);
                self.reg_file.set_zero_flag();
                Flow::Next
            },
            SimInstr::Clrw => {
                self.w = 0;
                self.reg_file.set_zero_flag();
                Flow::Next
            },
            SimInstr::Comf(f, d) => {
                let result = !self.read_f(f);
                self.store_logic(f, d, result);
                Flow::Next
            },
            SimInstr::Decf(f, d) => {
                let result = self.read_f(f).wrapping_sub(1);
                self.store_logic(f, d, result);
                Flow::Next
            },
            SimInstr::Decfsz(f, d) => {
                let result = self.read_f(f).wrapping_sub(1);
                self.store(f, d, result);
                match result {
                    0 => Flow::Skip,
                    _ => Flow::Next,
                }
            },
            SimInstr::Incf(f, d) => {
                let result = self.read_f(f).wrapping_add(1);
                self.store_logic(f, d, result);
                Flow::Next
            },
            SimInstr::Incfsz(f, d) => {
                let result = self.read_f(f).wrapping_add(1);
                self.store(f, d, result);
                match result {
                    0 => Flow::Skip,
                    _ => Flow::Next,
                }
            },
            SimInstr::Iorwf(f, d) => {
                let result = self.w | self.read_f(f);
                self.store_logic(f, d, result);
                Flow::Next
            },
            SimInstr::Movf(f, d) => {
                let result = self.read_f(f);
                self.store_logic(f, d, result);
                Flow::Next
            },
            SimInstr::Movwf(f) => {
                self.write_f(f, self.w);
                Flow::Next
            },
            SimInstr::Nop => Flow::Next,
            SimInstr::Rlf(f, d) => {
                let value = self.read_f(f);
                let carry_in = u8::from(self.reg_file.status_bit(regs::C));
                self.store(f, d, value << 1 | carry_in);
                self.reg_file.set_status_bit(regs::C, value & 0x80 != 0);
                Flow::Next
            },
            SimInstr::Rrf(f, d) => {
                let value = self.read_f(f);
                let carry_in = u8::from(self.reg_file.status_bit(regs::C));
                self.store(f, d, value >> 1 | carry_in << 7);
                self.reg_file.set_status_bit(regs::C, value & 0x01 != 0);
                Flow::Next
            },
            SimInstr::Subwf(f, d) => {
                let r = Arith::sub(self.read_f(f), self.w);
                self.store_arith(f, d, r);
                Flow::Next
            },
            SimInstr::Swapf(f, d) => {
                let result = self.read_f(f).rotate_left(4);
                self.store(f, d, result);
                Flow::Next
            },
            SimInstr::Xorwf(f, d) => {
                let result = self.w ^ self.read_f(f);
                self.store_logic(f, d, result);
                Flow::Next
            },

            SimInstr::Bcf(f, b) => {
                let effect = self.reg_file.clear_bit(f.addr(), b.get());
                self.apply_effect(effect);
                Flow::Next
            },
            SimInstr::Bsf(f, b) => {
                let effect = self.reg_file.set_bit(f.addr(), b.get());
                self.apply_effect(effect);
                Flow::Next
            },
            SimInstr::Btfsc(f, b) => match self.reg_file.get_bit(f.addr(), b.get()) {
                0 => Flow::Skip,
                _ => Flow::Next,
            },
            SimInstr::Btfss(f, b) => match self.reg_file.get_bit(f.addr(), b.get()) {
                0 => Flow::Next,
                _ => Flow::Skip,
            },

            SimInstr::Addlw(k) => {
                let r = Arith::add(self.w, k);
                self.w = r.result;
                self.set_arith_flags(r);
                Flow::Next
            },
            SimInstr::Andlw(k) => {
                self.w &= k;
                self.reg_file.update_zero_flag(self.w);
                Flow::Next
            },
            SimInstr::Call(k) => {
                let target = self.branch_target(k);
                self.frame_stack.push_frame(next, target, FrameType::Call)?;
                Flow::Jump(target)
            },
            SimInstr::Clrwdt => {
                self.watchdog.clear();
                if self.reg_file.get_raw_bit(regs::OPTION_REG, regs::PSA) {
                    self.timer0.clear_prescaler();
                }
                self.reg_file.set_status_bit(regs::TO, true);
                self.reg_file.set_status_bit(regs::PD, true);
                Flow::Next
            },
            SimInstr::Goto(k) => Flow::Jump(self.branch_target(k)),
            SimInstr::Iorlw(k) => {
                self.w |= k;
                self.reg_file.update_zero_flag(self.w);
                Flow::Next
            },
            SimInstr::Movlw(k) => {
                self.w = k;
                Flow::Next
            },
            SimInstr::Retfie => {
                let target = self.frame_stack.pop_frame()?;
                self.reg_file.set_raw_bit(regs::INTCON, regs::GIE, true);
                Flow::Jump(target)
            },
            SimInstr::Retlw(k) => {
                self.w = k;
                Flow::Jump(self.frame_stack.pop_frame()?)
            },
            SimInstr::Return => Flow::Jump(self.frame_stack.pop_frame()?),
            SimInstr::Sleep => {
                debug!(pc = self.pc, "sleep");
                self.sleeping = true;
                self.watchdog.clear();
                self.reg_file.set_status_bit(regs::TO, true);
                self.reg_file.set_status_bit(regs::PD, false);
                Flow::Stay
            },
            SimInstr::Sublw(k) => {
                let r = Arith::sub(k, self.w);
                self.w = r.result;
                self.set_arith_flags(r);
                Flow::Next
            },
            SimInstr::Xorlw(k) => {
                self.w ^= k;
                self.reg_file.update_zero_flag(self.w);
                Flow::Next
            },
        };

        Ok(flow)
    }

    /// Runs until the tripwire condition returns false (or any of the typical breaks occur).
    ///
    /// The typical break conditions are:
    /// - the clock is set to false
    /// - the instruction at PC is flagged as a breakpoint
    /// - A breakpoint matches
    pub fn run_while(&mut self, mut tripwire: impl FnMut(&mut Simulator) -> bool) -> Result<(), SimErr> {
        std::mem::take(&mut self.pause_condition);
        self.clock.store(true, Ordering::Relaxed);

        // event loop
        // run until:
        // 1. the clock is set to false
        // 2. the tripwire condition returns false
        // 3. any of the breakpoints are hit
        let result = loop {
            // Clock turned off:
            if !self.clock.load(Ordering::Relaxed) {
                break Ok(PauseCondition::ClockOff);
            }
            // Tripwire turned off:
            if !tripwire(self) {
                break Ok(PauseCondition::Tripwire);
            }

            // Run a step:
            if let Err(e) = self.step() {
                break Err(e);
            }

            // After executing, check that any breakpoints were hit.
            let flagged = self.current_instr().is_some_and(|i| i.is_breakpoint);
            if flagged || self.breakpoints.iter().any(|bp| bp.check(self)) {
                info!(pc = self.pc, "breakpoint hit");
                break Ok(PauseCondition::Breakpoint);
            }
        };

        self.clock.store(false, Ordering::Relaxed);
        self.pause_condition = result?;
        Ok(())
    }

    /// Execute the program.
    ///
    /// A microcontroller program never ends, so this blocks until a breakpoint is hit
    /// or the clock is stopped (e.g., from another thread).
    /// If you would like to limit the maximum number of steps to execute, consider [`Simulator::run_with_limit`].
    pub fn run(&mut self) -> Result<(), SimErr> {
        self.run_while(|_| true)
    }

    /// Execute the program with a limit on how many steps to execute.
    ///
    /// This blocks until the program pauses or until the number of steps to execute has been hit.
    pub fn run_with_limit(&mut self, max_steps: u64) -> Result<(), SimErr> {
        let mut steps = 0;
        self.run_while(|_| {
            steps += 1;
            steps <= max_steps
        })
    }
}
impl Default for Simulator {
    fn default() -> Self {
        Self::new(Default::default())
    }
}

#[cfg(test)]
mod tests {
    use proptest::prelude::*;

    use super::*;
    use crate::ast::BitIdx;
    use crate::sim::view::{BufferedView, ChannelView, ViewEvent};

    fn f(addr: u8) -> FileReg {
        FileReg::new_trunc(addr)
    }

    /// Creates a simulator with the given program (line numbers 1, 2, ...), reset.
    fn sim_with(instrs: &[SimInstr]) -> Simulator {
        let listing: Vec<Instruction> = instrs.iter()
            .enumerate()
            .map(|(i, instr)| ProcessorInstruction::new(instr.encode(), i + 1).into())
            .collect();

        let mut sim = Simulator::new(Default::default());
        sim.load_program(&listing);
        sim.reset();
        sim
    }

    fn step_n(sim: &mut Simulator, n: usize) {
        for _ in 0..n {
            sim.step().unwrap();
        }
    }

    fn status(sim: &Simulator, bit: u8) -> bool {
        sim.reg_file().status_bit(bit)
    }

    #[test]
    fn empty_program() {
        let mut sim = Simulator::default();
        assert_eq!(sim.step(), Err(SimErr::EmptyProgram));
    }

    #[test]
    fn pc_out_of_range() {
        let mut sim = sim_with(&[SimInstr::Nop]);
        sim.step().unwrap();
        assert_eq!(sim.step(), Err(SimErr::PcOutOfRange { pc: 1, len: 1 }));
    }

    #[test]
    fn load_program_skips_non_processor_lines() {
        let listing = vec![
            Instruction::Comment { line: 1, text: "; hello".to_string() },
            Instruction::Directive { line: 2, text: "list p=16f84".to_string() },
            ProcessorInstruction::new(0x3005, 3).into(),
        ];
        let mut sim = Simulator::default();
        sim.load_program(&listing);
        assert_eq!(sim.program().len(), 1);
        assert_eq!(sim.program()[0].source_line(), 3);
    }

    #[test]
    fn step_returns_elapsed_time() {
        let mut sim = sim_with(&[SimInstr::Nop, SimInstr::Goto(0)]);
        assert_eq!(sim.step().unwrap(), Duration::from_micros(1));
        assert_eq!(sim.step().unwrap(), Duration::from_micros(2));
        assert_eq!(sim.runtime(), Duration::from_micros(3));
        assert_eq!(sim.cycles_run(), 3);

        sim.reset_stopwatch();
        assert_eq!(sim.runtime(), Duration::ZERO);
        assert_eq!(sim.cycles_run(), 3);
    }

    #[test]
    fn unknown_opcode_is_nop() {
        let listing: Vec<Instruction> = vec![
            ProcessorInstruction::new(0x0001, 1).into(),
            ProcessorInstruction::new(0x0000, 2).into(),
        ];
        let mut sim = Simulator::default();
        sim.load_program(&listing);
        sim.reset();
        let before = sim.status();
        sim.step().unwrap();
        assert_eq!(sim.pc(), 1);
        assert_eq!(sim.w(), 0);
        assert_eq!(sim.status(), before);
    }

    #[test]
    fn subwf_flags() {
        // 5 - 3
        let mut sim = sim_with(&[
            SimInstr::Movlw(5),
            SimInstr::Movwf(f(0x20)),
            SimInstr::Movlw(3),
            SimInstr::Subwf(f(0x20), Dest::F),
        ]);
        step_n(&mut sim, 4);
        assert_eq!(sim.reg_file().get_file(0x20), 2);
        assert!(status(&sim, regs::C));
        assert!(status(&sim, regs::DC));
        assert!(!status(&sim, regs::Z));

        // 3 - 5 borrows
        let mut sim = sim_with(&[
            SimInstr::Movlw(3),
            SimInstr::Movwf(f(0x20)),
            SimInstr::Movlw(5),
            SimInstr::Subwf(f(0x20), Dest::W),
        ]);
        step_n(&mut sim, 4);
        assert_eq!(sim.w(), 0xFE);
        assert!(!status(&sim, regs::C));
        assert!(!status(&sim, regs::DC));
    }

    #[test]
    fn sublw_is_literal_minus_w() {
        let mut sim = sim_with(&[SimInstr::Movlw(0x10), SimInstr::Sublw(0x10)]);
        step_n(&mut sim, 2);
        assert_eq!(sim.w(), 0);
        assert!(status(&sim, regs::Z));
        assert!(status(&sim, regs::C));

        let mut sim = sim_with(&[SimInstr::Movlw(0x01), SimInstr::Sublw(0x10)]);
        step_n(&mut sim, 2);
        assert_eq!(sim.w(), 0x0F);
        assert!(status(&sim, regs::C));
        assert!(!status(&sim, regs::DC));
    }

    #[test]
    fn logic_and_moves() {
        let mut sim = sim_with(&[
            SimInstr::Movlw(0xF0),
            SimInstr::Movwf(f(0x21)),
            SimInstr::Movlw(0x3C),
            SimInstr::Andwf(f(0x21), Dest::W),  // W = 0x30
            SimInstr::Iorlw(0x01),              // W = 0x31
            SimInstr::Xorwf(f(0x21), Dest::F),  // f = 0xC1
            SimInstr::Comf(f(0x21), Dest::W),   // W = 0x3E
            SimInstr::Swapf(f(0x21), Dest::F),  // f = 0x1C
            SimInstr::Xorlw(0x3E),              // W = 0
        ]);
        step_n(&mut sim, 4);
        assert_eq!(sim.w(), 0x30);
        step_n(&mut sim, 1);
        assert_eq!(sim.w(), 0x31);
        step_n(&mut sim, 1);
        assert_eq!(sim.reg_file().get_file(0x21), 0xC1);
        step_n(&mut sim, 1);
        assert_eq!(sim.w(), 0x3E);
        step_n(&mut sim, 1);
        assert_eq!(sim.reg_file().get_file(0x21), 0x1C);
        step_n(&mut sim, 1);
        assert_eq!(sim.w(), 0);
        assert!(status(&sim, regs::Z));
    }

    #[test]
    fn flags_win_over_status_result() {
        // STATUS = 0x18, so the sum is 0x19 with C set, but the addition clears C
        let mut sim = sim_with(&[SimInstr::Movlw(0x01), SimInstr::Addwf(f(regs::STATUS), Dest::F)]);
        step_n(&mut sim, 2);
        assert_eq!(sim.status(), 0x18);

        let mut sim = sim_with(&[SimInstr::Clrf(f(regs::STATUS))]);
        step_n(&mut sim, 1);
        assert_eq!(sim.status(), 1 << regs::Z);
    }

    #[test]
    fn movf_sets_zero() {
        let mut sim = sim_with(&[SimInstr::Movlw(1), SimInstr::Movf(f(0x22), Dest::W)]);
        step_n(&mut sim, 2);
        assert_eq!(sim.w(), 0);
        assert!(status(&sim, regs::Z));
    }

    #[test]
    fn clrf_sets_zero() {
        let mut sim = sim_with(&[
            SimInstr::Movlw(9),
            SimInstr::Movwf(f(0x20)),
            SimInstr::Clrf(f(0x20)),
        ]);
        step_n(&mut sim, 3);
        assert_eq!(sim.reg_file().get_file(0x20), 0);
        assert!(status(&sim, regs::Z));
    }

    #[test]
    fn incf_decf() {
        let mut sim = sim_with(&[
            SimInstr::Incf(f(0x20), Dest::F),
            SimInstr::Decf(f(0x20), Dest::F),
            SimInstr::Decf(f(0x20), Dest::W),
        ]);
        step_n(&mut sim, 1);
        assert_eq!(sim.reg_file().get_file(0x20), 1);
        assert!(!status(&sim, regs::Z));
        step_n(&mut sim, 1);
        assert_eq!(sim.reg_file().get_file(0x20), 0);
        assert!(status(&sim, regs::Z));
        step_n(&mut sim, 1);
        assert_eq!(sim.w(), 0xFF);
        assert_eq!(sim.reg_file().get_file(0x20), 0);
    }

    #[test]
    fn decfsz_skips_on_zero() {
        let mut sim = sim_with(&[
            SimInstr::Movlw(2),
            SimInstr::Movwf(f(0x20)),
            SimInstr::Decfsz(f(0x20), Dest::F), // 2
            SimInstr::Goto(2),
            SimInstr::Nop,
        ]);
        step_n(&mut sim, 3);
        assert_eq!(sim.pc(), 3);
        step_n(&mut sim, 1);
        assert_eq!(sim.pc(), 2);

        let cycles = sim.cycles_run();
        sim.step().unwrap();
        assert_eq!(sim.pc(), 4);
        assert_eq!(sim.cycles_run() - cycles, 2);
        assert_eq!(sim.reg_file().get_file(0x20), 0);
    }

    #[test]
    fn incfsz_skips_on_zero() {
        let mut sim = sim_with(&[
            SimInstr::Movlw(0xFF),
            SimInstr::Movwf(f(0x20)),
            SimInstr::Incfsz(f(0x20), Dest::W),
            SimInstr::Nop,
            SimInstr::Nop,
        ]);
        step_n(&mut sim, 3);
        assert_eq!(sim.pc(), 4);
        assert_eq!(sim.w(), 0);
        assert_eq!(sim.reg_file().get_file(0x20), 0xFF);
    }

    #[test]
    fn bit_test_skips() {
        let mut sim = sim_with(&[
            SimInstr::Bsf(f(0x20), BitIdx::new_trunc(3)),
            SimInstr::Btfss(f(0x20), BitIdx::new_trunc(3)),
            SimInstr::Nop,
            SimInstr::Btfsc(f(0x20), BitIdx::new_trunc(3)),
            SimInstr::Bcf(f(0x20), BitIdx::new_trunc(3)),
            SimInstr::Btfsc(f(0x20), BitIdx::new_trunc(3)),
            SimInstr::Nop,
            SimInstr::Nop,
        ]);
        step_n(&mut sim, 2);
        assert_eq!(sim.pc(), 3);
        step_n(&mut sim, 1);
        assert_eq!(sim.pc(), 4);
        step_n(&mut sim, 2);
        assert_eq!(sim.pc(), 7);
        assert_eq!(sim.reg_file().get_file(0x20), 0);
    }

    #[test]
    fn bsf_selects_bank() {
        let mut sim = sim_with(&[
            SimInstr::Bsf(f(regs::STATUS), BitIdx::new_trunc(regs::RP0)),
            SimInstr::Movlw(0x0F),
            SimInstr::Movwf(f(0x06)), // TRISB in bank 1
            SimInstr::Bcf(f(regs::STATUS), BitIdx::new_trunc(regs::RP0)),
        ]);
        step_n(&mut sim, 4);
        assert_eq!(sim.reg_file().get_raw(regs::TRISB), 0x0F);
        assert_eq!(sim.reg_file().get_raw(regs::PORTB), 0x00);
        assert!(!status(&sim, regs::RP0));
    }

    #[test]
    fn retlw_table() {
        let mut sim = sim_with(&[
            SimInstr::Call(3),
            SimInstr::Nop,
            SimInstr::Nop,
            SimInstr::Retlw(0x42),
        ]);
        step_n(&mut sim, 2);
        assert_eq!(sim.w(), 0x42);
        assert_eq!(sim.pc(), 1);
        assert!(sim.frame_stack.is_empty());
    }

    #[test]
    fn computed_goto_through_pcl() {
        // ADDWF PCL, F jumps relative to the next instruction
        let mut sim = sim_with(&[
            SimInstr::Movlw(2),
            SimInstr::Clrf(f(regs::PCLATH)),
            SimInstr::Addwf(f(regs::PCL), Dest::F),
            SimInstr::Retlw(0),
            SimInstr::Retlw(1),
            SimInstr::Retlw(2),
        ]);
        step_n(&mut sim, 2);
        let cycles = sim.cycles_run();
        sim.step().unwrap();
        assert_eq!(sim.pc(), 5);
        assert_eq!(sim.reg_file().get_raw(regs::PCL), 5);
        assert_eq!(sim.cycles_run() - cycles, 2);
    }

    #[test]
    fn pcl_tracks_pc() {
        let mut sim = sim_with(&[SimInstr::Nop, SimInstr::Nop, SimInstr::Goto(0)]);
        step_n(&mut sim, 2);
        assert_eq!(sim.reg_file().get_file(regs::PCL), 2);
        step_n(&mut sim, 1);
        assert_eq!(sim.reg_file().get_file(regs::PCL), 0);
    }

    #[test]
    fn stack_overflow_is_reported() {
        let mut sim = sim_with(&[SimInstr::Call(0)]);
        for _ in 0..8 {
            sim.step().unwrap();
        }
        assert_eq!(sim.step(), Err(SimErr::StackOverflow { depth: 8 }));

        sim.flags.stack_depth = None;
        sim.reset();
        for _ in 0..20 {
            sim.step().unwrap();
        }
        assert_eq!(sim.frame_stack.len(), 20);
    }

    #[test]
    fn control_transfers_take_two_cycles() {
        let instrs = [
            SimInstr::Nop,
            SimInstr::Movlw(1),
            SimInstr::Movwf(f(0x20)),
            SimInstr::Clrw,
            SimInstr::Goto(3),
            SimInstr::Call(3),
            SimInstr::Return,
            SimInstr::Retlw(0x42),
            SimInstr::Retfie,
        ];
        for instr in instrs {
            // CALL 1 gives the returns a frame to pop
            let mut sim = sim_with(&[SimInstr::Call(1), instr, SimInstr::Nop, SimInstr::Nop]);
            sim.step().unwrap();

            let expected = match instr.is_control_transfer() {
                true  => Duration::from_micros(2),
                false => Duration::from_micros(1),
            };
            assert_eq!(sim.step(), Ok(expected), "{instr}");
        }
    }

    #[test]
    fn interrupt_overflow_keeps_sleeping() {
        let mut sim = sim_with(&[
            SimInstr::Call(2),
            SimInstr::Nop,
            SimInstr::Movlw(1 << regs::GIE | 1 << regs::RBIE),
            SimInstr::Movwf(f(regs::INTCON)),
            SimInstr::Sleep,
            SimInstr::Return,
        ]);
        sim.flags.watchdog_enabled = false;
        sim.flags.stack_depth = Some(1);
        sim.reset();
        step_n(&mut sim, 5);
        assert!(sim.is_sleeping());
        assert_eq!(sim.pc(), 4);

        sim.toggle_bit(regs::PORTB, 4);
        assert_eq!(sim.step(), Err(SimErr::StackOverflow { depth: 1 }));
        assert!(sim.is_sleeping());
        assert_eq!(sim.pc(), 4);
        assert_eq!(sim.frame_stack.len(), 1);
    }

    #[test]
    fn return_from_empty_stack() {
        let mut sim = sim_with(&[SimInstr::Return]);
        assert_eq!(sim.step(), Err(SimErr::StackUnderflow));
    }

    #[test]
    fn interrupt_entry_and_retfie() {
        let mut sim = sim_with(&[
            SimInstr::Movlw(1 << regs::GIE | 1 << regs::T0IE | 1 << regs::T0IF),
            SimInstr::Movwf(f(regs::INTCON)),
            SimInstr::Nop,
            SimInstr::Nop,
            // vector
            SimInstr::Bcf(f(regs::INTCON), BitIdx::new_trunc(regs::T0IF)),
            SimInstr::Retfie,
        ]);
        step_n(&mut sim, 2);
        assert_eq!(sim.pc(), 2);

        // interrupt taken instead of executing the NOP at 2
        sim.step().unwrap();
        assert_eq!(sim.pc(), 4);
        assert_eq!(sim.reg_file().get_bit(regs::INTCON, regs::GIE), 0);
        assert_eq!(sim.frame_stack.frames()[0].frame_type, FrameType::Interrupt);

        step_n(&mut sim, 2);
        assert_eq!(sim.pc(), 2);
        assert_eq!(sim.reg_file().get_bit(regs::INTCON, regs::GIE), 1);
        assert_eq!(sim.reg_file().get_bit(regs::INTCON, regs::T0IF), 0);
        assert!(sim.frame_stack.is_empty());
    }

    #[test]
    fn gie_clear_blocks_interrupts() {
        let mut sim = sim_with(&[
            SimInstr::Movlw(1 << regs::T0IE | 1 << regs::T0IF),
            SimInstr::Movwf(f(regs::INTCON)),
            SimInstr::Nop,
        ]);
        step_n(&mut sim, 3);
        assert_eq!(sim.pc(), 3);
        assert!(sim.frame_stack.is_empty());
    }

    #[test]
    fn sleep_holds_pc() {
        let mut sim = sim_with(&[SimInstr::Sleep, SimInstr::Nop]);
        sim.flags.watchdog_enabled = false;
        step_n(&mut sim, 3);
        assert!(sim.is_sleeping());
        assert_eq!(sim.pc(), 0);
        assert!(status(&sim, regs::TO));
        assert!(!status(&sim, regs::PD));
    }

    #[test]
    fn watchdog_wakes_from_sleep() {
        let mut sim = sim_with(&[SimInstr::Sleep, SimInstr::Nop]);
        sim.flags.watchdog_timeout = Duration::from_micros(3);
        // OPTION_REG power-on has PSA = 1, PS = 7: use the unscaled timeout instead
        sim.set_file(regs::OPTION_REG, 0x00);

        // SLEEP clears the watchdog, so three more cycles are needed
        step_n(&mut sim, 3);
        assert!(sim.is_sleeping());
        step_n(&mut sim, 1);
        assert!(!sim.is_sleeping());
        assert_eq!(sim.pc(), 1);
        assert!(!status(&sim, regs::TO));
    }

    #[test]
    fn watchdog_resets_when_running() {
        let mut sim = sim_with(&[
            SimInstr::Movlw(7),
            SimInstr::Goto(0),
        ]);
        sim.flags.watchdog_timeout = Duration::from_micros(4);
        sim.set_file(regs::OPTION_REG, 0x00);

        // 1 + 2 cycles, then the 4th cycle times out
        step_n(&mut sim, 3);
        assert_eq!(sim.pc(), 0);
        assert_eq!(sim.w(), 0);
        assert!(!status(&sim, regs::PD));
        assert_eq!(sim.reg_file().get_raw(regs::OPTION_REG), 0xFF);
    }

    #[test]
    fn watchdog_reset_reports_line_once() {
        let mut sim = sim_with(&[
            SimInstr::Movlw(7),
            SimInstr::Goto(0),
        ]);
        sim.flags.watchdog_timeout = Duration::from_micros(4);
        sim.set_file(regs::OPTION_REG, 0x00);
        let view = BufferedView::new();
        sim.view = view.clone().into();

        step_n(&mut sim, 3);
        assert_eq!(sim.pc(), 0);
        let events = view.get_events().read().unwrap().clone();
        assert_eq!(events, [
            ViewEvent::Line(2),
            ViewEvent::Elapsed(Duration::from_micros(1)),
            ViewEvent::Line(1),
            ViewEvent::Elapsed(Duration::from_micros(2)),
            ViewEvent::Line(1),
            ViewEvent::Elapsed(Duration::from_micros(1)),
        ]);
    }

    #[test]
    fn clrwdt_sets_status() {
        let mut sim = sim_with(&[SimInstr::Nop, SimInstr::Clrwdt]);
        sim.set_file(regs::STATUS, 0x00);
        sim.step().unwrap();
        assert_eq!(sim.watchdog().elapsed(), Duration::from_micros(1));

        sim.step().unwrap();
        assert!(status(&sim, regs::TO));
        assert!(status(&sim, regs::PD));
        assert_eq!(sim.watchdog().elapsed(), Duration::ZERO);
    }

    #[test]
    fn interrupt_flag_wakes_without_gie() {
        let mut sim = sim_with(&[
            SimInstr::Bsf(f(regs::INTCON), BitIdx::new_trunc(regs::RBIE)),
            SimInstr::Sleep,
            SimInstr::Nop,
        ]);
        sim.flags.watchdog_enabled = false;
        step_n(&mut sim, 3);
        assert!(sim.is_sleeping());

        sim.toggle_bit(regs::PORTB, 7);
        sim.step().unwrap();
        assert!(!sim.is_sleeping());
        assert_eq!(sim.pc(), 3);
    }

    #[test]
    fn interrupt_during_sleep_returns_after_sleep() {
        let mut sim = sim_with(&[
            SimInstr::Movlw(1 << regs::GIE | 1 << regs::RBIE),
            SimInstr::Movwf(f(regs::INTCON)),
            SimInstr::Sleep,
            SimInstr::Nop,
            SimInstr::Retfie,
        ]);
        sim.flags.watchdog_enabled = false;
        step_n(&mut sim, 3);
        assert!(sim.is_sleeping());

        sim.toggle_bit(regs::PORTB, 4);
        sim.step().unwrap();
        assert_eq!(sim.pc(), 4);
        assert!(!sim.is_sleeping());
        assert_eq!(sim.frame_stack.frames()[0].return_addr, 3);
    }

    #[test]
    fn eeprom_survives_reset() {
        let mut sim = sim_with(&[SimInstr::Nop]);
        sim.load_eeprom(&[1, 2, 3]);
        sim.reset();
        assert_eq!(&sim.reg_file().eeprom()[..4], &[1, 2, 3, 0]);
    }

    #[test]
    fn shell_pcl_write_moves_pc() {
        let mut sim = sim_with(&[SimInstr::Nop, SimInstr::Nop, SimInstr::Nop]);
        sim.set_file(regs::PCLATH, 0);
        sim.set_file(regs::PCL, 2);
        assert_eq!(sim.pc(), 2);
    }

    #[test]
    fn view_receives_lines_and_time() {
        let mut sim = sim_with(&[SimInstr::Nop, SimInstr::Goto(0)]);
        let view = BufferedView::new();
        sim.view = view.clone().into();

        sim.reset();
        step_n(&mut sim, 2);
        let events = view.get_events().read().unwrap().clone();
        assert_eq!(events, [
            ViewEvent::Line(1),
            ViewEvent::Line(2),
            ViewEvent::Elapsed(Duration::from_micros(1)),
            ViewEvent::Line(1),
            ViewEvent::Elapsed(Duration::from_micros(2)),
        ]);
    }

    #[test]
    fn channel_view_stays_bounded() {
        let mut sim = sim_with(&[SimInstr::Goto(0)]);
        let (view, rx) = ChannelView::with_capacity(16);
        sim.view = view.into();

        sim.run_with_limit(1000).unwrap();
        assert_eq!(rx.len(), 16);
        assert_eq!(rx.try_recv(), Ok(ViewEvent::Line(1)));
    }

    #[test]
    fn run_stops_at_flagged_instruction() {
        let mut sim = sim_with(&[SimInstr::Nop, SimInstr::Nop, SimInstr::Nop, SimInstr::Goto(0)]);
        assert!(sim.set_breakpoint(2, true));
        assert!(!sim.set_breakpoint(10, true));

        sim.run().unwrap();
        assert!(sim.hit_breakpoint());
        assert_eq!(sim.pc(), 2);

        assert_eq!(sim.toggle_breakpoint(2), Some(false));
        sim.run_with_limit(3).unwrap();
        assert!(!sim.hit_breakpoint());
        assert_eq!(sim.pc(), 1);
    }

    #[test]
    fn run_stops_at_breakpoint() {
        let mut sim = sim_with(&[SimInstr::Incf(f(0x20), Dest::F), SimInstr::Goto(0)]);
        sim.breakpoints.insert(Breakpoint::File { addr: 0x20, value: debug::Comparator::Eq(3) });
        sim.run().unwrap();
        assert!(sim.hit_breakpoint());
        assert_eq!(sim.reg_file().get_file(0x20), 3);

        sim.breakpoints.clear();
        sim.breakpoints.insert(Breakpoint::Line(2));
        sim.run().unwrap();
        assert_eq!(sim.pc(), 1);
    }

    #[test]
    fn clock_stops_run() {
        let mut sim = sim_with(&[SimInstr::Goto(0)]);
        let clock = Arc::clone(sim.clock());
        sim.run_while(|s| {
            if s.cycles_run() >= 10 {
                clock.store(false, Ordering::Relaxed);
            }
            true
        }).unwrap();
        assert!(sim.hit_clock_stop());
        assert!(!sim.clock().load(Ordering::Relaxed));
    }

    #[test]
    fn changes_are_tracked() {
        let mut sim = sim_with(&[SimInstr::Movlw(1), SimInstr::Movwf(f(0x30))]);
        step_n(&mut sim, 1);
        let _ = sim.take_changes().count();
        step_n(&mut sim, 1);
        let changes: Vec<_> = sim.take_changes()
            .filter(|(_, a)| a.modified())
            .map(|(addr, _)| addr)
            .collect();
        assert!(changes.contains(&0x30));
        assert!(changes.contains(&0xB0));
    }

    proptest! {
        #[test]
        fn addwf_flags(a in any::<u8>(), b in any::<u8>()) {
            let mut sim = sim_with(&[
                SimInstr::Movlw(b),
                SimInstr::Movwf(f(0x20)),
                SimInstr::Movlw(a),
                SimInstr::Addwf(f(0x20), Dest::F),
            ]);
            step_n(&mut sim, 4);

            let result = a.wrapping_add(b);
            prop_assert_eq!(sim.reg_file().get_file(0x20), result);
            prop_assert_eq!(sim.w(), a);
            prop_assert_eq!(status(&sim, regs::C), u16::from(a) + u16::from(b) > 0xFF);
            prop_assert_eq!(status(&sim, regs::DC), (a & 0xF) + (b & 0xF) > 0xF);
            prop_assert_eq!(status(&sim, regs::Z), result == 0);
        }

        #[test]
        fn rotate_round_trip(value in any::<u8>(), carry in any::<bool>(), left_first in any::<bool>()) {
            let set_carry = match carry {
                true  => SimInstr::Bsf(f(regs::STATUS), BitIdx::new_trunc(regs::C)),
                false => SimInstr::Bcf(f(regs::STATUS), BitIdx::new_trunc(regs::C)),
            };
            let (first, second) = match left_first {
                true  => (SimInstr::Rlf(f(0x20), Dest::F), SimInstr::Rrf(f(0x20), Dest::F)),
                false => (SimInstr::Rrf(f(0x20), Dest::F), SimInstr::Rlf(f(0x20), Dest::F)),
            };
            let mut sim = sim_with(&[
                SimInstr::Movlw(value),
                SimInstr::Movwf(f(0x20)),
                set_carry,
                first,
                second,
            ]);
            step_n(&mut sim, 5);

            prop_assert_eq!(sim.reg_file().get_file(0x20), value);
            prop_assert_eq!(status(&sim, regs::C), carry);
        }
    }
}
