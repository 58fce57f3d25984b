//! Pre-dispatch hook seam

use crate::opcode::Opcode;
use crate::stack::Stack;
use crate::state::StateAccess;
use forksim_primitives::Address;
use std::convert::Infallible;

/// What a hook can see of the frame about to execute an opcode
#[derive(Debug)]
pub struct FrameView<'a> {
    /// Opcode about to run
    pub opcode: Opcode,
    /// Address whose storage the frame operates on
    pub address: Address,
    /// Operand stack, untouched by the opcode yet
    pub stack: &'a Stack,
    /// Call depth, 0 for the outermost frame
    pub depth: usize,
    /// Program counter
    pub pc: usize,
}

/// Runs before every opcode dispatch, in every frame.
///
/// An `Err` aborts the whole execution, enclosing frames included, and is
/// returned from [`crate::Interpreter::run_hooked`] as is.
pub trait OpcodeHook {
    /// Error that aborts execution
    type Error;

    /// Called before gas is charged for `frame.opcode`
    fn before_opcode<S: StateAccess>(
        &mut self,
        frame: &FrameView<'_>,
        state: &mut S,
    ) -> Result<(), Self::Error>;
}

/// Hook that does nothing
#[derive(Clone, Copy, Debug, Default)]
pub struct NoHook;

impl OpcodeHook for NoHook {
    type Error = Infallible;

    fn before_opcode<S: StateAccess>(
        &mut self,
        _frame: &FrameView<'_>,
        _state: &mut S,
    ) -> Result<(), Self::Error> {
        Ok(())
    }
}
