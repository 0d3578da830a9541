//! Decoded view of one instruction in a word stream.
//!
//! Code is a flat `Vec<u32>`: an opcode word followed by
//! [`Opcode::arity`] operand words. Unused operand slots read as 0.

use crate::error::DecodeError;
use crate::opcode::Opcode;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Instruction {
    pub opcode: Opcode,
    pub operands: [u32; 2],
}

impl Instruction {
    pub fn new(opcode: Opcode, operands: &[u32]) -> Self {
        let mut words = [0; 2];
        for (slot, &operand) in words.iter_mut().zip(operands) {
            *slot = operand;
        }
        Self {
            opcode,
            operands: words,
        }
    }

    /// Decode the instruction starting at word `at`.
    pub fn decode(code: &[u32], at: usize) -> Result<Self, DecodeError> {
        let word = *code.get(at).ok_or(DecodeError::IncompleteInstruction { at })?;
        let opcode = Opcode::try_from(word)?;
        let arity = opcode.arity();
        let operands = code
            .get(at + 1..at + 1 + arity)
            .ok_or(DecodeError::IncompleteInstruction { at })?;
        Ok(Self::new(opcode, operands))
    }

    /// Append this instruction's words to `code`.
    pub fn encode_into(&self, code: &mut Vec<u32>) {
        code.push(self.opcode as u8 as u32);
        code.extend_from_slice(&self.operands[..self.opcode.arity()]);
    }

    /// Number of words the instruction occupies.
    pub fn width(&self) -> usize {
        1 + self.opcode.arity()
    }

    pub fn arg1(&self) -> u32 {
        self.operands[0]
    }

    pub fn arg2(&self) -> u32 {
        self.operands[1]
    }
}

/// Iterate `(offset, instruction)` pairs over a word stream.
pub fn instructions(code: &[u32]) -> Instructions<'_> {
    Instructions { code, at: 0 }
}

pub struct Instructions<'a> {
    code: &'a [u32],
    at: usize,
}

impl Iterator for Instructions<'_> {
    type Item = Result<(usize, Instruction), DecodeError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.at >= self.code.len() {
            return None;
        }
        let at = self.at;
        match Instruction::decode(self.code, at) {
            Ok(instr) => {
                self.at += instr.width();
                Some(Ok((at, instr)))
            }
            Err(e) => {
                // Stop after the first malformed instruction.
                self.at = self.code.len();
                Some(Err(e))
            }
        }
    }
}
