//! Kenpali common types: instruction set, values and program encoding.
//!
//! This crate provides the data structures shared by the compiler and
//! the virtual machine:
//!
//! - [`Opcode`] and [`Instruction`]: the instruction set and its word layout
//! - [`Value`]: runtime values, including [`Function`]s, [`ErrorValue`]s
//!   and lazy [`Stream`]s
//! - [`Program`]: compiled code plus constant, platform-value, diagnostic
//!   and function tables, with the `KPB1` binary container
//! - [`Expr`]: the expression trees the compiler consumes
//! - [`Library`]: named definitions layered under every program
//! - [`Runtime`]: the callback seam native functions use to call guest code

pub mod ast;
mod codec;
pub mod error;
pub mod function;
pub mod instruction;
pub mod library;
pub mod opcode;
pub mod program;
pub mod reader;
pub mod runtime;
pub mod stream;
pub mod value;

// Re-export commonly used types at the crate root.
pub use ast::{ArrayElement, ArrayPatternElement, Expr, ObjectElement, ObjectPatternElement, Pattern};
pub use error::{AstError, DecodeError, EncodeError};
pub use function::{Bindings, Closure, Function, NativeFunction, Param, Params, Upvalue, UpvalueCell};
pub use instruction::Instruction;
pub use library::{Definition, Library};
pub use opcode::Opcode;
pub use program::{Diagnostic, FunctionEntry, PlatformResolver, PlatformValue, Program};
pub use runtime::Runtime;
pub use stream::{Stream, StreamNode};
pub use value::{ErrorValue, Map, Value};
