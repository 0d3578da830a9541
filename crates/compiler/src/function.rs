//! Per-function instruction buffers and the final linking pass.

use kenpali_common::{Diagnostic, FunctionEntry, Instruction, Opcode};
use tracing::trace;

/// Where a closure finds one captured variable when it is created.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum UpvalueRef {
    /// A slot of the enclosing function's scope `depth` frames out.
    Local { depth: u32, slot: u32 },
    /// An upvalue the enclosing function itself captured.
    Upvalue { index: u32 },
}

/// A forward jump waiting for its landing point.
#[derive(Debug, Clone, Copy)]
pub(crate) struct Jump {
    word: usize,
    from: usize,
}

#[derive(Debug)]
pub(crate) struct CompiledFunction {
    pub name: String,
    code: Vec<u32>,
    diagnostics: Vec<Option<Diagnostic>>,
    pub upvalues: Vec<UpvalueRef>,
    /// `(word, function index)` pairs patched with absolute offsets at link time.
    placeholders: Vec<(usize, usize)>,
    /// Index of the function's boundary scope on the compiler's scope stack.
    pub scope: usize,
}

impl CompiledFunction {
    pub fn new(name: &str, scope: usize) -> Self {
        Self {
            name: name.to_string(),
            code: Vec::new(),
            diagnostics: Vec::new(),
            upvalues: Vec::new(),
            placeholders: Vec::new(),
            scope,
        }
    }

    pub fn emit(&mut self, opcode: Opcode, operands: &[u32]) -> usize {
        let at = self.code.len();
        Instruction::new(opcode, operands).encode_into(&mut self.code);
        self.diagnostics.resize(self.code.len(), None);
        at
    }

    pub fn emit_with(&mut self, opcode: Opcode, operands: &[u32], diagnostic: Option<Diagnostic>) -> usize {
        let at = self.emit(opcode, operands);
        self.diagnostics[at] = diagnostic;
        at
    }

    /// Emit an instruction whose last operand is a relative forward jump.
    pub fn emit_jump(&mut self, opcode: Opcode, operands: &[u32]) -> Jump {
        let mut words = operands.to_vec();
        words.push(0);
        let at = self.emit(opcode, &words);
        Jump {
            word: at + words.len(),
            from: self.code.len(),
        }
    }

    /// Point `jump` at the next instruction to be emitted.
    pub fn land(&mut self, jump: Jump) {
        self.code[jump.word] = (self.code.len() - jump.from) as u32;
    }

    /// `FUNCTION` with a placeholder for the target's offset.
    pub fn emit_function(&mut self, index: usize) {
        let at = self.emit(Opcode::Function, &[0]);
        self.placeholders.push((at + 1, index));
    }

    /// Register a captured variable, reusing an identical entry.
    pub fn upvalue(&mut self, upvalue: UpvalueRef) -> u32 {
        if let Some(index) = self.upvalues.iter().position(|u| *u == upvalue) {
            return index as u32;
        }
        self.upvalues.push(upvalue);
        (self.upvalues.len() - 1) as u32
    }

    pub fn len(&self) -> usize {
        self.code.len()
    }
}

/// Linked code, diagnostics and function table.
pub(crate) struct Linked {
    pub code: Vec<u32>,
    pub diagnostics: Vec<Option<Diagnostic>>,
    pub functions: Vec<FunctionEntry>,
}

/// Concatenate functions in index order and patch every `FUNCTION` operand.
pub(crate) fn link(functions: Vec<CompiledFunction>) -> Linked {
    let mut offsets = Vec::with_capacity(functions.len());
    let mut total = 0;
    for function in &functions {
        offsets.push(total);
        total += function.len();
    }

    let mut linked = Linked {
        code: Vec::with_capacity(total),
        diagnostics: Vec::with_capacity(total),
        functions: Vec::with_capacity(functions.len()),
    };
    for (function, &offset) in functions.into_iter().zip(&offsets) {
        trace!(function = %function.name, offset, words = function.len(), "linking function");
        let mut code = function.code;
        for (word, index) in function.placeholders {
            code[word] = offsets[index] as u32;
        }
        linked.code.extend(code);
        linked.diagnostics.extend(function.diagnostics);
        linked.functions.push(FunctionEntry {
            name: function.name,
            offset,
        });
    }
    linked
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn jumps_are_relative_to_the_end_of_the_instruction() {
        let mut f = CompiledFunction::new("f", 0);
        let jump = f.emit_jump(Opcode::Catch, &[]);
        f.emit(Opcode::Value, &[0]);
        f.emit(Opcode::Uncatch, &[]);
        f.land(jump);
        assert_eq!(f.code, vec![Opcode::Catch as u32, 3, Opcode::Value as u32, 0, Opcode::Uncatch as u32]);
    }

    #[test]
    fn object_pop_or_default_jump_is_the_second_operand() {
        let mut f = CompiledFunction::new("f", 0);
        let jump = f.emit_jump(Opcode::ObjectPopOrDefault, &[7]);
        f.emit(Opcode::Value, &[1]);
        f.land(jump);
        assert_eq!(f.code[..3], [Opcode::ObjectPopOrDefault as u32, 7, 2]);
    }

    #[test]
    fn upvalues_are_deduplicated() {
        let mut f = CompiledFunction::new("f", 1);
        let a = f.upvalue(UpvalueRef::Local { depth: 0, slot: 3 });
        let b = f.upvalue(UpvalueRef::Upvalue { index: 0 });
        let c = f.upvalue(UpvalueRef::Local { depth: 0, slot: 3 });
        assert_eq!((a, b, c), (0, 1, 0));
    }

    #[test]
    fn link_patches_function_offsets() {
        let mut main = CompiledFunction::new("$main", 0);
        main.emit_function(1);
        main.emit(Opcode::Return, &[]);
        let mut inner = CompiledFunction::new("inner", 1);
        inner.emit_with(
            Opcode::ReadLocal,
            &[0, 1],
            Some(Diagnostic {
                name: "x".to_string(),
                is_argument: false,
            }),
        );
        inner.emit(Opcode::Return, &[]);

        let linked = link(vec![main, inner]);
        assert_eq!(linked.code[1], 3);
        assert_eq!(
            linked.functions,
            vec![
                FunctionEntry { name: "$main".to_string(), offset: 0 },
                FunctionEntry { name: "inner".to_string(), offset: 3 },
            ]
        );
        assert_eq!(linked.diagnostics.len(), linked.code.len());
        assert!(linked.diagnostics[3].is_some());
    }
}
