//! Errors for decoding, encoding and reading Kenpali programs.

use thiserror::Error;

/// Errors that occur while decoding a binary program.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DecodeError {
    /// Word does not name an opcode.
    #[error("unknown opcode: {0:#04x}")]
    UnknownOpcode(u32),

    /// Input ended before a complete field could be read.
    #[error("truncated input at byte {at}")]
    Truncated { at: usize },

    /// Missing `KPB1` header.
    #[error("not a Kenpali program (bad magic)")]
    BadMagic,

    #[error("unsupported program version {0}")]
    UnsupportedVersion(u32),

    #[error("invalid UTF-8 at byte {at}")]
    InvalidUtf8 { at: usize },

    #[error("unknown constant tag {tag} at byte {at}")]
    UnknownConstantTag { tag: u8, at: usize },

    /// The resolver did not recognize a platform value name.
    #[error("unknown platform value '{0}'")]
    UnknownPlatformValue(String),

    /// An instruction's operand words run past the end of the code.
    #[error("incomplete instruction at word {at}")]
    IncompleteInstruction { at: usize },

    /// An operand refers outside its table or the code.
    #[error("operand {operand} out of range (limit {limit}) at word {at}")]
    OperandOutOfRange { at: usize, operand: u32, limit: usize },

    /// A section declares more data than its byte length allows.
    #[error("malformed {section} section at byte {at}")]
    MalformedSection { section: &'static str, at: usize },
}

/// Errors that occur while encoding a program.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EncodeError {
    /// Constants must be plain data.
    #[error("constant {index} is a {kind} and cannot be serialized")]
    UnsupportedConstant { index: usize, kind: &'static str },

    #[error("section too large to encode: {0} bytes")]
    TooLarge(usize),
}

/// Errors from reading an expression tree out of its data form.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AstError {
    #[error("not an expression: {0}")]
    NotAnExpression(String),

    #[error("not a pattern: {0}")]
    NotAPattern(String),
}

impl AstError {
    /// The error kind as it appears in Kenpali error values.
    pub fn kind(&self) -> &'static str {
        match self {
            AstError::NotAnExpression(_) => "notAnExpression",
            AstError::NotAPattern(_) => "notAPattern",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_unknown_opcode() {
        assert_eq!(
            DecodeError::UnknownOpcode(0x7f).to_string(),
            "unknown opcode: 0x7f"
        );
    }

    #[test]
    fn display_operand_out_of_range() {
        assert_eq!(
            DecodeError::OperandOutOfRange {
                at: 4,
                operand: 9,
                limit: 2
            }
            .to_string(),
            "operand 9 out of range (limit 2) at word 4"
        );
    }

    #[test]
    fn display_unsupported_constant() {
        assert_eq!(
            EncodeError::UnsupportedConstant {
                index: 3,
                kind: "function"
            }
            .to_string(),
            "constant 3 is a function and cannot be serialized"
        );
    }
}
