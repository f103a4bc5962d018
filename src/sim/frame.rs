//! The return-address stack and call frame management.
//!
//! This module exposes:
//! - [`FrameStack`]: The hardware return stack used by the Simulator.
//! - [`Frame`]: All the data from a given frame.
//! - [`FrameType`]: Whether a frame was entered through `CALL` or an interrupt.

use super::SimErr;

/// Where this frame came from.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum FrameType {
    /// Frame came from a `CALL` instruction.
    Call,
    /// Frame came from interrupt entry.
    Interrupt
}

/// A frame entry.
///
/// Only `return_addr` exists on hardware.
/// The rest is kept so a shell can show a call trace.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Frame {
    /// The address execution resumes at when this frame is popped.
    pub return_addr: u16,

    /// The address the frame was entered at.
    ///
    /// For calls, this is the start of the callee subroutine.
    /// For interrupts, this is the interrupt vector.
    pub callee_addr: u16,

    /// Whether this frame is from a call or an interrupt.
    pub frame_type: FrameType,
}

/// The stack of return addresses.
///
/// `CALL` and interrupt entry push, `RETURN`, `RETLW` and `RETFIE` pop.
/// The depth is bounded by the `stack_depth` flag of the Simulator
/// (8 on hardware). Exceeding it is reported as [`SimErr::StackOverflow`]
/// instead of silently wrapping like the chip does.
#[derive(Debug, Clone)]
pub struct FrameStack {
    frames: Vec<Frame>,
    depth: Option<usize>
}

impl FrameStack {
    /// Creates a new frame stack with the given maximum depth (`None` for unbounded).
    pub(super) fn new(depth: Option<usize>) -> Self {
        Self {
            frames: Vec::with_capacity(depth.unwrap_or(8)),
            depth
        }
    }

    /// Gets the current number of frames entered.
    pub fn len(&self) -> usize {
        self.frames.len()
    }

    /// Tests whether the frame stack is at top level execution.
    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }

    /// The maximum number of frames (`None` if unbounded).
    pub fn depth(&self) -> Option<usize> {
        self.depth
    }

    /// Gets the list of current frames, oldest first.
    pub fn frames(&self) -> &[Frame] {
        &self.frames
    }

    /// Pushes a new frame to the frame stack.
    ///
    /// This should be called at the instruction where a call or interrupt entry occurs.
    pub(super) fn push_frame(&mut self, return_addr: u16, callee_addr: u16, frame_type: FrameType) -> Result<(), SimErr> {
        if let Some(depth) = self.depth {
            if self.frames.len() >= depth {
                return Err(SimErr::StackOverflow { depth });
            }
        }

        self.frames.push(Frame { return_addr, callee_addr, frame_type });
        Ok(())
    }

    /// Pops a frame from the frame stack, returning the address to resume at.
    ///
    /// This should be called at the instruction where a return occurs.
    pub(super) fn pop_frame(&mut self) -> Result<u16, SimErr> {
        self.frames.pop()
            .map(|f| f.return_addr)
            .ok_or(SimErr::StackUnderflow)
    }
}
impl Default for FrameStack {
    fn default() -> Self {
        Self::new(Some(8))
    }
}
