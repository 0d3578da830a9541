//! Compiled program representation and its binary container.
//!
//! Binary files (`.kpb`) are little-endian:
//!
//! ```text
//! "KPB1"
//! u32 version
//! u32 offset of the instruction section
//! u32 offset of the constant section
//! u32 offset of the platform-value section
//! u32 offset of the diagnostic section
//! u32 offset of the function table
//! ```
//!
//! Every section starts with a `u32` entry count. Instruction entries are
//! raw words; all other entries are prefixed with their byte length.

use crate::codec::{Reader, Writer};
use crate::error::{DecodeError, EncodeError};
use crate::instruction::instructions;
use crate::opcode::Opcode;
use crate::value::Value;

pub const MAGIC: &[u8; 4] = b"KPB1";
pub const VERSION: u32 = 1;
const HEADER_LEN: usize = 4 + 6 * 4;

/// Error-message metadata for the instruction at one offset.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Diagnostic {
    pub name: String,
    /// The instruction binds a function argument.
    pub is_argument: bool,
}

/// A host value referenced by name.
#[derive(Debug, Clone)]
pub struct PlatformValue {
    pub name: String,
    pub value: Value,
}

/// Platform values are identified by name.
impl PartialEq for PlatformValue {
    fn eq(&self, other: &Self) -> bool {
        self.name == other.name
    }
}

/// Start of one compiled function.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FunctionEntry {
    pub name: String,
    pub offset: usize,
}

/// Maps platform value names back to values while decoding.
pub trait PlatformResolver {
    fn resolve(&self, name: &str) -> Option<Value>;
}

/// A compiled Kenpali program. Execution starts at offset 0.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Program {
    /// The instruction stream.
    pub code: Vec<u32>,
    /// Parallel to `code`; set only at instruction starts.
    pub diagnostics: Vec<Option<Diagnostic>>,
    pub constants: Vec<Value>,
    pub platform_values: Vec<PlatformValue>,
    /// Sorted by offset.
    pub functions: Vec<FunctionEntry>,
}

impl Program {
    /// Number of code words.
    pub fn len(&self) -> usize {
        self.code.len()
    }

    pub fn is_empty(&self) -> bool {
        self.code.is_empty()
    }

    pub fn diagnostic(&self, at: usize) -> Option<&Diagnostic> {
        self.diagnostics.get(at).and_then(Option::as_ref)
    }

    /// The function that starts exactly at `offset`.
    pub fn function_at(&self, offset: usize) -> Option<&FunctionEntry> {
        self.functions
            .binary_search_by_key(&offset, |f| f.offset)
            .ok()
            .map(|i| &self.functions[i])
    }

    /// Check that every instruction decodes and every operand is in range.
    pub fn validate(&self) -> Result<(), DecodeError> {
        let code_len = self.code.len();
        let out_of_range = |at: usize, operand: u32, limit: usize| {
            if (operand as usize) < limit {
                Ok(())
            } else {
                Err(DecodeError::OperandOutOfRange { at, operand, limit })
            }
        };
        // Relative jumps may land exactly at the end of the code.
        let jump = |at: usize, end: usize, operand: u32| {
            if end + operand as usize <= code_len {
                Ok(())
            } else {
                Err(DecodeError::OperandOutOfRange {
                    at,
                    operand,
                    limit: code_len - end,
                })
            }
        };

        for item in instructions(&self.code) {
            let (at, instr) = item?;
            let end = at + instr.width();
            match instr.opcode {
                Opcode::Value | Opcode::Validate | Opcode::ObjectPop => {
                    out_of_range(at, instr.arg1(), self.constants.len())?
                }
                Opcode::ObjectPopOrDefault => {
                    out_of_range(at, instr.arg1(), self.constants.len())?;
                    jump(at, end, instr.arg2())?;
                }
                Opcode::Platform => out_of_range(at, instr.arg1(), self.platform_values.len())?,
                Opcode::Function => {
                    if self.function_at(instr.arg1() as usize).is_none() {
                        return Err(DecodeError::OperandOutOfRange {
                            at,
                            operand: instr.arg1(),
                            limit: code_len,
                        });
                    }
                }
                Opcode::ArrayPopOrDefault | Opcode::Catch => jump(at, end, instr.arg1())?,
                _ => {}
            }
        }
        Ok(())
    }

    /// Encode the program into the binary container format.
    pub fn encode(&self) -> Result<Vec<u8>, EncodeError> {
        let mut w = Writer::default();
        w.bytes.extend_from_slice(MAGIC);
        w.u32(VERSION);
        let directory = w.bytes.len();
        for _ in 0..5 {
            w.u32(0);
        }

        let mut offsets = [0u32; 5];

        offsets[0] = offset(&w)?;
        w.len_u32(self.code.len())?;
        for &word in &self.code {
            w.u32(word);
        }

        offsets[1] = offset(&w)?;
        w.len_u32(self.constants.len())?;
        for (index, constant) in self.constants.iter().enumerate() {
            w.entry(|e| e.constant(constant, index))?;
        }

        offsets[2] = offset(&w)?;
        w.len_u32(self.platform_values.len())?;
        for platform in &self.platform_values {
            w.entry(|e| {
                e.bytes.extend_from_slice(platform.name.as_bytes());
                Ok(())
            })?;
        }

        offsets[3] = offset(&w)?;
        let diagnostics: Vec<_> = self
            .diagnostics
            .iter()
            .enumerate()
            .filter_map(|(at, d)| d.as_ref().map(|d| (at, d)))
            .collect();
        w.len_u32(diagnostics.len())?;
        for (at, diagnostic) in diagnostics {
            w.entry(|e| {
                e.len_u32(at)?;
                e.u8(u8::from(diagnostic.is_argument));
                e.bytes.extend_from_slice(diagnostic.name.as_bytes());
                Ok(())
            })?;
        }

        offsets[4] = offset(&w)?;
        w.len_u32(self.functions.len())?;
        for function in &self.functions {
            w.entry(|e| {
                e.len_u32(function.offset)?;
                e.bytes.extend_from_slice(function.name.as_bytes());
                Ok(())
            })?;
        }

        for (i, &section) in offsets.iter().enumerate() {
            w.patch_u32(directory + i * 4, section);
        }
        Ok(w.bytes)
    }

    /// Decode a binary program, resolving platform values by name.
    pub fn decode(bytes: &[u8], resolver: &dyn PlatformResolver) -> Result<Self, DecodeError> {
        if bytes.len() < HEADER_LEN {
            return Err(DecodeError::Truncated { at: bytes.len() });
        }
        if &bytes[..4] != MAGIC {
            return Err(DecodeError::BadMagic);
        }
        let mut header = Reader::new(bytes, 4);
        let version = header.u32()?;
        if version != VERSION {
            return Err(DecodeError::UnsupportedVersion(version));
        }
        let mut offsets = [0usize; 5];
        for slot in offsets.iter_mut() {
            *slot = header.usize()?;
        }

        let mut r = Reader::new(bytes, offsets[0]);
        let count = r.usize()?;
        let mut code = Vec::new();
        for _ in 0..count {
            code.push(r.u32()?);
        }

        let constants = entries(bytes, offsets[1], "constant", |r, _| r.constant())?;

        let platform_values = entries(bytes, offsets[2], "platform value", |r, len| {
            let name = r.utf8(len)?;
            let value = resolver
                .resolve(&name)
                .ok_or_else(|| DecodeError::UnknownPlatformValue(name.clone()))?;
            Ok(PlatformValue { name, value })
        })?;

        let mut diagnostics = vec![None; code.len()];
        let records = entries(bytes, offsets[3], "diagnostic", |r, len| {
            let start = r.pos;
            let at = r.usize()?;
            let flags = r.u8()?;
            let name_len = len
                .checked_sub(r.pos - start)
                .ok_or(DecodeError::MalformedSection {
                    section: "diagnostic",
                    at: start,
                })?;
            let name = r.utf8(name_len)?;
            Ok((at, start, Diagnostic {
                name,
                is_argument: flags & 1 != 0,
            }))
        })?;
        for (at, start, diagnostic) in records {
            let slot = diagnostics.get_mut(at).ok_or(DecodeError::MalformedSection {
                section: "diagnostic",
                at: start,
            })?;
            *slot = Some(diagnostic);
        }

        let functions = entries(bytes, offsets[4], "function", |r, len| {
            let start = r.pos;
            let offset = r.usize()?;
            let name_len = len.checked_sub(4).ok_or(DecodeError::MalformedSection {
                section: "function",
                at: start,
            })?;
            Ok(FunctionEntry {
                name: r.utf8(name_len)?,
                offset,
            })
        })?;

        let program = Program {
            code,
            diagnostics,
            constants,
            platform_values,
            functions,
        };
        program.validate()?;
        Ok(program)
    }
}

fn offset(w: &Writer) -> Result<u32, EncodeError> {
    u32::try_from(w.bytes.len()).map_err(|_| EncodeError::TooLarge(w.bytes.len()))
}

/// Read a length-prefixed section, checking each entry consumes exactly
/// its declared length.
fn entries<T, F>(
    bytes: &[u8],
    at: usize,
    section: &'static str,
    mut read: F,
) -> Result<Vec<T>, DecodeError>
where
    F: FnMut(&mut Reader<'_>, usize) -> Result<T, DecodeError>,
{
    let mut r = Reader::new(bytes, at);
    let count = r.usize()?;
    let mut out = Vec::new();
    for _ in 0..count {
        let len = r.usize()?;
        let start = r.pos;
        let item = read(&mut r, len)?;
        if r.pos != start + len {
            return Err(DecodeError::MalformedSection { section, at: start });
        }
        out.push(item);
    }
    Ok(out)
}
