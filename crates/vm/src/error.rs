//! Runtime errors for the Kenpali VM.
//!
//! Guest-level failures are ordinary [`ErrorValue`]s that travel through
//! the VM's own recovery protocol. Only the one that escapes every recovery
//! point reaches the host, as [`RuntimeError::Uncaught`]. The remaining
//! variants are host faults: a malformed or inconsistent program. Every
//! fault carries the instruction offset (`at`) where it was detected.

use kenpali_common::ErrorValue;
use thiserror::Error;

/// Errors that end a VM execution.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum RuntimeError {
    /// A guest error escaped every recovery point.
    #[error("uncaught {0}")]
    Uncaught(ErrorValue),

    /// Pop on an empty stack, or below the current call's floor.
    #[error("stack underflow at instruction {at}")]
    StackUnderflow { at: usize },

    /// The word at the program counter is not an opcode.
    #[error("invalid opcode at instruction {at}")]
    InvalidOpcode { at: usize },

    /// The instruction's operands run past the end of the code.
    #[error("missing operand at instruction {at}")]
    MissingOperand { at: usize },

    /// The program counter left the code without returning.
    #[error("unexpected end of program at instruction {at}")]
    UnexpectedEndOfProgram { at: usize },

    #[error("no scope frame at instruction {at}")]
    NoScopeFrame { at: usize },

    #[error("no call frame at instruction {at}")]
    NoCallFrame { at: usize },

    /// An array builder instruction found something else on top.
    #[error("expected an array on the stack at instruction {at}")]
    NotAnArray { at: usize },

    #[error("expected an object on the stack at instruction {at}")]
    NotAnObject { at: usize },

    /// A closure instruction found something other than a fresh closure.
    #[error("expected a closure on the stack at instruction {at}")]
    NotAFunction { at: usize },

    #[error("constant {index} out of range at instruction {at}")]
    ConstantOutOfRange { at: usize, index: usize },

    #[error("platform value {index} out of range at instruction {at}")]
    PlatformOutOfRange { at: usize, index: usize },

    /// A local slot outside the stack.
    #[error("slot {index} out of range at instruction {at}")]
    SlotOutOfRange { at: usize, index: usize },

    #[error("upvalue {index} out of range at instruction {at}")]
    UpvalueOutOfRange { at: usize, index: usize },
}

impl RuntimeError {
    /// The escaped guest error, if that is what ended execution.
    pub fn uncaught(&self) -> Option<&ErrorValue> {
        match self {
            RuntimeError::Uncaught(error) => Some(error),
            _ => None,
        }
    }
}
