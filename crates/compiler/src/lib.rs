//! Kenpali compiler: expression trees → bytecode programs.
//!
//! Scoping is resolved entirely at compile time. Every lexical scope gets a
//! VM scope frame, local names are addressed by `(frame depth, slot)`, and
//! names used across a function boundary become upvalues threaded through
//! each intervening function. Library source definitions are compiled into
//! a program only when it can reach them.
//!
//! # Usage
//!
//! ```
//! use kenpali_common::Expr;
//! use kenpali_compiler::{compile, disassemble, CompileOptions};
//!
//! let expr = Expr::call(Expr::name("plus"), vec![Expr::literal(1), Expr::literal(2)]);
//! let program = compile(&expr, &CompileOptions::default()).unwrap();
//! assert!(disassemble(&program).contains("PLATFORM plus"));
//! ```

pub mod error;

mod disassembler;
mod emit;
mod function;
mod library;
mod scope;

pub use disassembler::disassemble;
pub use error::CompileError;

use indexmap::IndexMap;
use kenpali_common::{Expr, Library, Map, Program, Value};

use emit::Emitter;

/// Host-supplied names for one compilation.
#[derive(Debug, Clone, Default)]
pub struct CompileOptions {
    /// Extra top-level names, shadowing library definitions.
    pub names: Map,
    /// Values for qualified (`from`) references, by module name.
    pub modules: IndexMap<String, Map>,
}

impl CompileOptions {
    pub fn with_name(mut self, name: &str, value: impl Into<Value>) -> Self {
        self.names.insert(name.to_string(), value.into());
        self
    }

    pub fn with_module(mut self, name: &str, exports: Map) -> Self {
        self.modules.insert(name.to_string(), exports);
        self
    }
}

/// A compiler bound to one library.
#[derive(Debug, Clone)]
pub struct Compiler {
    library: Library,
}

impl Compiler {
    pub fn new(library: Library) -> Self {
        Self { library }
    }

    pub fn library(&self) -> &Library {
        &self.library
    }

    pub fn compile(&self, expr: &Expr, options: &CompileOptions) -> Result<Program, CompileError> {
        Emitter::new(&self.library, options).program(expr)
    }
}

impl Default for Compiler {
    /// A compiler over the standard library.
    fn default() -> Self {
        Self::new(kenpali_stdlib::standard_library())
    }
}

/// Compile `expr` against the standard library.
pub fn compile(expr: &Expr, options: &CompileOptions) -> Result<Program, CompileError> {
    Compiler::default().compile(expr, options)
}
