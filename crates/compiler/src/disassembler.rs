//! Disassembler: program → readable listing.
//!
//! One line per instruction: word offset, mnemonic, operands. `VALUE` shows
//! the constant and `PLATFORM` the platform value's name. Diagnostics follow
//! a `;`. Each function is introduced by a `name:` label line.

use kenpali_common::instruction::instructions;
use kenpali_common::{Opcode, Program};

/// Render `program` as text, one instruction per line.
pub fn disassemble(program: &Program) -> String {
    let mut out = String::new();

    for item in instructions(&program.code) {
        let (at, instr) = match item {
            Ok(decoded) => decoded,
            Err(e) => {
                out.push_str(&format!("; {e}\n"));
                break;
            }
        };
        if let Some(function) = program.function_at(at) {
            out.push_str(&format!("{}:\n", function.name));
        }

        let mnemonic = instr.opcode.mnemonic();
        let mut line = match instr.opcode {
            Opcode::Value | Opcode::Validate | Opcode::ObjectPop => {
                let operand = match program.constants.get(instr.arg1() as usize) {
                    Some(value) => value.to_string(),
                    None => format!("#{}", instr.arg1()),
                };
                format!("{at:04} {mnemonic} {operand}")
            }
            Opcode::ObjectPopOrDefault => {
                let key = match program.constants.get(instr.arg1() as usize) {
                    Some(value) => value.to_string(),
                    None => format!("#{}", instr.arg1()),
                };
                format!("{at:04} {mnemonic} {key} {}", instr.arg2())
            }
            Opcode::Platform => {
                let name = match program.platform_values.get(instr.arg1() as usize) {
                    Some(platform) => platform.name.clone(),
                    None => format!("#{}", instr.arg1()),
                };
                format!("{at:04} {mnemonic} {name}")
            }
            opcode => match opcode.arity() {
                0 => format!("{at:04} {mnemonic}"),
                1 => format!("{at:04} {mnemonic} {}", instr.arg1()),
                _ => format!("{at:04} {mnemonic} {} {}", instr.arg1(), instr.arg2()),
            },
        };

        if let Some(diagnostic) = program.diagnostic(at) {
            line.push_str(&format!(" ; {}", diagnostic.name));
            if diagnostic.is_argument {
                line.push_str(" (arg)");
            }
        }
        out.push_str(&line);
        out.push('\n');
    }

    out
}
