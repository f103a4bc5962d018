//! An instruction-level simulator for PIC16 family microcontrollers.
//!
//! This is meant to be the execution backend of a teaching IDE:
//! a shell loads an assembler listing, steps or runs it, and displays the
//! register file, the current source line, and the elapsed time.
//!
//! # Usage
//!
//! The simulator executes pre-assembled opcodes. Each listing line becomes an [`ast::Instruction`]:
//! ```
//! use pic16_sim::ast::{Instruction, ProcessorInstruction};
//!
//! let listing: Vec<Instruction> = vec![
//!     Instruction::Directive { line: 1, text: "org 0".to_string() },
//!     ProcessorInstruction::new(0x3011, 2).into(), // MOVLW 0x11
//!     ProcessorInstruction::new(0x00A0, 3).into(), // MOVWF 0x20
//!     ProcessorInstruction::new(0x2802, 4).into(), // GOTO 2
//! ];
//! ```
//!
//! Once a listing has been created, it can be executed with the simulator:
//! ```
//! # use pic16_sim::ast::{Instruction, ProcessorInstruction};
//! # let listing: Vec<Instruction> = vec![
//! #     ProcessorInstruction::new(0x3011, 2).into(),
//! #     ProcessorInstruction::new(0x00A0, 3).into(),
//! #     ProcessorInstruction::new(0x2802, 4).into(),
//! # ];
//! use pic16_sim::sim::Simulator;
//!
//! let mut simulator = Simulator::new(Default::default());
//! simulator.load_program(&listing);
//! simulator.reset();
//! simulator.run_with_limit(10).unwrap(); // <-- Result can be handled accordingly
//!
//! assert_eq!(simulator.reg_file().get_file(0x20), 0x11);
//! ```
//!
//! If more granularity is needed for simulation, there are also breakpoints and a stop flag.
//! See the [`sim`] module for more details.
#![warn(missing_docs)]

pub mod ast;
pub mod sim;
