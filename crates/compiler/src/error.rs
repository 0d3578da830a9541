//! Error types for the Kenpali compiler.

use thiserror::Error;

/// Errors produced while compiling an expression tree.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CompileError {
    /// A name reference matched no scope, host name or library definition.
    #[error("name not defined: {name}")]
    NameNotDefined { name: String },

    /// A qualified reference named a module the host did not provide.
    #[error("unknown module '{module}' (referenced by {name})")]
    UnknownModule { module: String, name: String },

    #[error("module '{module}' has no name '{name}'")]
    NameNotInModule { module: String, name: String },

    /// The tree is well-formed data but cannot be compiled.
    #[error("invalid expression: {reason}")]
    InvalidAst { reason: String },

    #[error("too many {table} ({count})")]
    TooManyConstants { table: &'static str, count: usize },
}

impl CompileError {
    /// The error kind as named in guest-visible error values.
    pub fn kind(&self) -> &'static str {
        match self {
            CompileError::NameNotDefined { .. } => "nameNotDefined",
            CompileError::UnknownModule { .. } => "unknownModule",
            CompileError::NameNotInModule { .. } => "nameNotInModule",
            CompileError::InvalidAst { .. } => "invalidAst",
            CompileError::TooManyConstants { .. } => "tooManyConstants",
        }
    }
}
