//! Opcode definitions for the Kenpali instruction set.
//!
//! An instruction is one opcode word followed by zero, one, or two operand
//! words. The operand count is fixed per opcode (see [`Opcode::arity`]).

use crate::error::DecodeError;

/// Identifies the operation to perform.
///
/// The `#[repr(u8)]` attribute gives each variant the stable value written
/// into the instruction stream.
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Opcode {
    // Stack literals
    /// Push constant `arg1` from the constant table.
    Value = 0x01,
    /// Push platform value `arg1` (a host-provided function or value).
    Platform = 0x02,
    /// Drop the top of the stack.
    Discard = 0x03,
    /// Push `arg1` uninitialized slots.
    Reserve = 0x04,

    // Local variables
    /// Pop the top of the stack into slot `arg2` of the scope `arg1` frames out.
    WriteLocal = 0x10,
    /// Push slot `arg2` of the scope `arg1` frames out.
    ReadLocal = 0x11,

    // Scope bracketing
    /// Push a scope frame whose base is `arg1` slots below the stack top.
    PushScope = 0x18,
    /// Pop the result, pop the scope frame, truncate to its base, push the result.
    PopScope = 0x19,

    // Array builders
    /// Push an empty array.
    Array = 0x20,
    /// Pop a value and append it to the array below it.
    ArrayPush = 0x21,
    /// Pop a sequence and append all its elements to the array below it.
    ArrayExtend = 0x22,
    /// Reverse the array on top of the stack in place.
    ArrayReverse = 0x23,
    /// Replace the array on top of the stack with a fresh copy.
    ArrayCopy = 0x24,
    /// Pop an array, push its first `arg1` elements, then the remaining tail.
    ArrayCut = 0x25,
    /// Pop the last element of the array on top (which stays) and push it.
    /// `arg1` is the element's 1-based position, for error messages.
    ArrayPop = 0x26,
    /// As `ArrayPop`, then skip `arg1` words; when empty, fall through to
    /// the default-value code instead.
    ArrayPopOrDefault = 0x27,

    // Object builders
    /// Push an empty object.
    Object = 0x30,
    /// Pop a value and a key, and insert them into the object below.
    ObjectPush = 0x31,
    /// Pop an object and merge its entries into the object below.
    ObjectMerge = 0x32,
    /// Replace the object on top of the stack with a fresh copy.
    ObjectCopy = 0x33,
    /// Remove property `constants[arg1]` from the object on top and push it.
    ObjectPop = 0x34,
    /// As `ObjectPop`, then skip `arg2` words; when absent, fall through to
    /// the default-value code instead.
    ObjectPopOrDefault = 0x35,

    // Functions and closures
    /// Push a closure whose code starts at absolute offset `arg1`.
    Function = 0x40,
    /// Attach the upvalue for slot `arg2` of the scope `arg1` frames out to
    /// the closure on top of the stack.
    Closure = 0x41,
    /// Attach the running closure's upvalue `arg1` to the closure on top.
    ClosureUpvalue = 0x42,
    /// Call the callee at the base of the top scope frame with the
    /// positional array and named object above it.
    Call = 0x43,
    /// Return the top of the stack to the caller.
    Return = 0x44,

    // Upvalues
    /// Push the value of the running closure's upvalue `arg1`.
    ReadUpvalue = 0x48,
    /// Close the open upvalue for slot `arg1` of the top scope frame.
    Capture = 0x49,

    // Indexing
    /// Pop a key and a collection, push the element or property.
    Index = 0x50,

    // Control
    /// Push a recovery target `arg1` words past the end of this instruction.
    Catch = 0x60,
    /// Pop the most recent recovery target of the top scope frame.
    Uncatch = 0x61,
    /// Check the top of the stack against schema `constants[arg1]`.
    Validate = 0x62,
}

/// All valid opcodes, in definition order. Useful for exhaustive testing.
pub const ALL_OPCODES: [Opcode; 33] = [
    Opcode::Value,
    Opcode::Platform,
    Opcode::Discard,
    Opcode::Reserve,
    Opcode::WriteLocal,
    Opcode::ReadLocal,
    Opcode::PushScope,
    Opcode::PopScope,
    Opcode::Array,
    Opcode::ArrayPush,
    Opcode::ArrayExtend,
    Opcode::ArrayReverse,
    Opcode::ArrayCopy,
    Opcode::ArrayCut,
    Opcode::ArrayPop,
    Opcode::ArrayPopOrDefault,
    Opcode::Object,
    Opcode::ObjectPush,
    Opcode::ObjectMerge,
    Opcode::ObjectCopy,
    Opcode::ObjectPop,
    Opcode::ObjectPopOrDefault,
    Opcode::Function,
    Opcode::Closure,
    Opcode::ClosureUpvalue,
    Opcode::Call,
    Opcode::Return,
    Opcode::ReadUpvalue,
    Opcode::Capture,
    Opcode::Index,
    Opcode::Catch,
    Opcode::Uncatch,
    Opcode::Validate,
];

impl TryFrom<u32> for Opcode {
    type Error = DecodeError;

    fn try_from(word: u32) -> Result<Self, Self::Error> {
        let byte = u8::try_from(word).map_err(|_| DecodeError::UnknownOpcode(word))?;
        match byte {
            0x01 => Ok(Opcode::Value),
            0x02 => Ok(Opcode::Platform),
            0x03 => Ok(Opcode::Discard),
            0x04 => Ok(Opcode::Reserve),

            0x10 => Ok(Opcode::WriteLocal),
            0x11 => Ok(Opcode::ReadLocal),

            0x18 => Ok(Opcode::PushScope),
            0x19 => Ok(Opcode::PopScope),

            0x20 => Ok(Opcode::Array),
            0x21 => Ok(Opcode::ArrayPush),
            0x22 => Ok(Opcode::ArrayExtend),
            0x23 => Ok(Opcode::ArrayReverse),
            0x24 => Ok(Opcode::ArrayCopy),
            0x25 => Ok(Opcode::ArrayCut),
            0x26 => Ok(Opcode::ArrayPop),
            0x27 => Ok(Opcode::ArrayPopOrDefault),

            0x30 => Ok(Opcode::Object),
            0x31 => Ok(Opcode::ObjectPush),
            0x32 => Ok(Opcode::ObjectMerge),
            0x33 => Ok(Opcode::ObjectCopy),
            0x34 => Ok(Opcode::ObjectPop),
            0x35 => Ok(Opcode::ObjectPopOrDefault),

            0x40 => Ok(Opcode::Function),
            0x41 => Ok(Opcode::Closure),
            0x42 => Ok(Opcode::ClosureUpvalue),
            0x43 => Ok(Opcode::Call),
            0x44 => Ok(Opcode::Return),

            0x48 => Ok(Opcode::ReadUpvalue),
            0x49 => Ok(Opcode::Capture),

            0x50 => Ok(Opcode::Index),

            0x60 => Ok(Opcode::Catch),
            0x61 => Ok(Opcode::Uncatch),
            0x62 => Ok(Opcode::Validate),

            _ => Err(DecodeError::UnknownOpcode(word)),
        }
    }
}

impl Opcode {
    /// Returns the mnemonic used by the disassembler.
    pub fn mnemonic(&self) -> &'static str {
        match self {
            Opcode::Value => "VALUE",
            Opcode::Platform => "PLATFORM",
            Opcode::Discard => "DISCARD",
            Opcode::Reserve => "RESERVE",
            Opcode::WriteLocal => "WRITE_LOCAL",
            Opcode::ReadLocal => "READ_LOCAL",
            Opcode::PushScope => "PUSH_SCOPE",
            Opcode::PopScope => "POP_SCOPE",
            Opcode::Array => "ARRAY",
            Opcode::ArrayPush => "ARRAY_PUSH",
            Opcode::ArrayExtend => "ARRAY_EXTEND",
            Opcode::ArrayReverse => "ARRAY_REVERSE",
            Opcode::ArrayCopy => "ARRAY_COPY",
            Opcode::ArrayCut => "ARRAY_CUT",
            Opcode::ArrayPop => "ARRAY_POP",
            Opcode::ArrayPopOrDefault => "ARRAY_POP_OR_DEFAULT",
            Opcode::Object => "OBJECT",
            Opcode::ObjectPush => "OBJECT_PUSH",
            Opcode::ObjectMerge => "OBJECT_MERGE",
            Opcode::ObjectCopy => "OBJECT_COPY",
            Opcode::ObjectPop => "OBJECT_POP",
            Opcode::ObjectPopOrDefault => "OBJECT_POP_OR_DEFAULT",
            Opcode::Function => "FUNCTION",
            Opcode::Closure => "CLOSURE",
            Opcode::ClosureUpvalue => "CLOSURE_UPVALUE",
            Opcode::Call => "CALL",
            Opcode::Return => "RETURN",
            Opcode::ReadUpvalue => "READ_UPVALUE",
            Opcode::Capture => "CAPTURE",
            Opcode::Index => "INDEX",
            Opcode::Catch => "CATCH",
            Opcode::Uncatch => "UNCATCH",
            Opcode::Validate => "VALIDATE",
        }
    }

    /// Number of operand words following the opcode word.
    pub fn arity(&self) -> usize {
        match self {
            Opcode::Discard
            | Opcode::PopScope
            | Opcode::Array
            | Opcode::ArrayPush
            | Opcode::ArrayExtend
            | Opcode::ArrayReverse
            | Opcode::ArrayCopy
            | Opcode::Object
            | Opcode::ObjectPush
            | Opcode::ObjectMerge
            | Opcode::ObjectCopy
            | Opcode::Call
            | Opcode::Return
            | Opcode::Index
            | Opcode::Uncatch => 0,

            Opcode::Value
            | Opcode::Platform
            | Opcode::Reserve
            | Opcode::PushScope
            | Opcode::ArrayCut
            | Opcode::ArrayPop
            | Opcode::ArrayPopOrDefault
            | Opcode::ObjectPop
            | Opcode::Function
            | Opcode::ClosureUpvalue
            | Opcode::ReadUpvalue
            | Opcode::Capture
            | Opcode::Catch
            | Opcode::Validate => 1,

            Opcode::WriteLocal
            | Opcode::ReadLocal
            | Opcode::ObjectPopOrDefault
            | Opcode::Closure => 2,
        }
    }
}
