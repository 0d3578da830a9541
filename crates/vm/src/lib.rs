//! Kenpali virtual machine: executes compiled bytecode programs.
//!
//! The VM is a stack machine with:
//! - An operand stack holding locals, temporaries and argument bundles
//! - Scope frames, each with a stack of recovery targets for `catching`
//! - Call frames recording where each closure call returns to
//! - A table of open upvalues, closed when their slots leave the stack
//!
//! Native functions call back into guest code through the
//! [`Runtime`](kenpali_common::Runtime) trait, which re-enters the
//! dispatch loop above a fresh floor.
//!
//! # Usage
//!
//! ```
//! use kenpali_common::{Expr, Value};
//! use kenpali_compiler::{compile, CompileOptions};
//! use kenpali_vm::{run, RunOptions};
//!
//! let expr = Expr::call(Expr::name("plus"), vec![Expr::literal(1), Expr::literal(2)]);
//! let program = compile(&expr, &CompileOptions::default()).unwrap();
//!
//! let result = run(&program, &RunOptions::default()).unwrap();
//! assert_eq!(result, Value::from(3));
//! ```

pub mod error;
pub mod execute;
pub mod machine;

pub use error::RuntimeError;
pub use machine::VM;

use std::time::Duration;

use kenpali_common::{Map, Program, Value};

/// Default bound on native callbacks nested inside one another.
pub const DEFAULT_CALL_DEPTH_LIMIT: usize = 128;

/// Resource budgets for one execution. Steps and time default to
/// unlimited.
#[derive(Debug, Clone, PartialEq)]
pub struct RunOptions {
    /// Maximum number of instructions to execute.
    pub step_limit: Option<u64>,
    pub time_limit: Option<Duration>,
    /// Maximum number of dispatch loops running at once. Each native
    /// callback into guest code (`map`, `if`, ...) runs its own loop on the
    /// host stack; a closure calling a closure does not.
    pub call_depth_limit: usize,
}

impl Default for RunOptions {
    fn default() -> Self {
        Self {
            step_limit: None,
            time_limit: None,
            call_depth_limit: DEFAULT_CALL_DEPTH_LIMIT,
        }
    }
}

impl RunOptions {
    pub fn with_step_limit(mut self, steps: u64) -> Self {
        self.step_limit = Some(steps);
        self
    }

    /// Negative and non-finite budgets are treated as zero.
    pub fn with_time_limit_seconds(mut self, seconds: f64) -> Self {
        let seconds = if seconds.is_finite() && seconds > 0.0 { seconds } else { 0.0 };
        self.time_limit = Some(Duration::from_secs_f64(seconds));
        self
    }

    pub fn with_call_depth_limit(mut self, depth: usize) -> Self {
        self.call_depth_limit = depth;
        self
    }
}

/// Execute a program and return its result.
///
/// # Errors
///
/// [`RuntimeError::Uncaught`] when a guest error escapes every `catching`
/// (including `stepLimitExceeded` and `timeLimitExceeded`, which cannot be
/// caught, and `callDepthExceeded`, which can); any other variant when the
/// program itself is malformed.
pub fn run(program: &Program, options: &RunOptions) -> Result<Value, RuntimeError> {
    VM::new(program, options).run()
}

/// Call a function value produced by `program` with the given arguments.
///
/// Closures must come from a run of the same program, since they address
/// its code by offset. Their captured variables must already be closed,
/// which holds for any closure a completed run returned.
pub fn call(
    program: &Program,
    function: &Value,
    args: Vec<Value>,
    named: Map,
    options: &RunOptions,
) -> Result<Value, RuntimeError> {
    VM::new(program, options).invoke(function, args, named)
}
