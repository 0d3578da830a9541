//! VM state management: operand stack, scope and call frames, upvalues,
//! the recovery protocol and resource limits.

use std::cell::RefCell;
use std::collections::BTreeMap;
use std::rc::Rc;
use std::time::Instant;

use kenpali_common::{ErrorValue, Function, Map, Program, Runtime, Upvalue, UpvalueCell, Value};
use tracing::{debug, trace};

use crate::error::RuntimeError;
use crate::RunOptions;

/// One lexical scope's stack base and pending recovery targets.
#[derive(Debug, Clone)]
pub(crate) struct ScopeFrame {
    pub base: usize,
    pub recovery: Vec<usize>,
}

/// One function invocation.
#[derive(Debug, Clone, Copy)]
pub(crate) struct CallFrame {
    /// Stack index of the callee; the argument bundles follow it.
    pub base: usize,
    /// `None` at a host boundary: `RETURN` hands its value to the host.
    pub return_pc: Option<usize>,
}

/// Lowest frames the current dispatch loop may unwind to.
#[derive(Debug, Clone, Copy, Default)]
pub(crate) struct Floor {
    pub scopes: usize,
    pub calls: usize,
    pub stack: usize,
}

/// Why the dispatch loop stopped early.
#[derive(Debug)]
pub(crate) enum Trap {
    /// A guest error that found no recovery target above the floor.
    Error(ErrorValue),
    Fault(RuntimeError),
}

impl From<ErrorValue> for Trap {
    fn from(error: ErrorValue) -> Self {
        Trap::Error(error)
    }
}

impl From<RuntimeError> for Trap {
    fn from(fault: RuntimeError) -> Self {
        Trap::Fault(fault)
    }
}

/// The Kenpali virtual machine.
pub struct VM<'a> {
    pub(crate) program: &'a Program,
    pub(crate) options: RunOptions,
    /// Operand stack. `None` marks a reserved slot not yet assigned.
    pub(crate) stack: Vec<Option<Value>>,
    pub(crate) scopes: Vec<ScopeFrame>,
    pub(crate) calls: Vec<CallFrame>,
    /// Upvalues still pointing into the stack, by absolute slot.
    pub(crate) open_upvalues: BTreeMap<usize, UpvalueCell>,
    pub(crate) pc: usize,
    /// Start of the instruction being executed.
    pub(crate) at: usize,
    pub(crate) steps: u64,
    pub(crate) started: Instant,
    /// A host fault raised inside a nested call, reported once the native
    /// that made the call returns.
    pub(crate) fault: Option<RuntimeError>,
    /// A resource limit was hit; recovery targets are ignored from now on.
    pub(crate) exhausted: bool,
    pub(crate) floor: Floor,
    /// Dispatch loops currently running.
    pub(crate) depth: usize,
}

impl<'a> VM<'a> {
    pub fn new(program: &'a Program, options: &RunOptions) -> Self {
        Self {
            program,
            options: options.clone(),
            stack: Vec::new(),
            scopes: Vec::new(),
            calls: Vec::new(),
            open_upvalues: BTreeMap::new(),
            pc: 0,
            at: 0,
            steps: 0,
            started: Instant::now(),
            fault: None,
            exhausted: false,
            floor: Floor::default(),
            depth: 0,
        }
    }

    /// Instructions executed so far.
    pub fn steps(&self) -> u64 {
        self.steps
    }

    /// Run the program from offset 0.
    pub fn run(&mut self) -> Result<Value, RuntimeError> {
        debug!(words = self.program.len(), "run started");
        self.started = Instant::now();
        let result = self.enter(0, Value::Null, Vec::new(), Map::new());
        self.finish(result)
    }

    /// Call a function value from the host.
    pub fn invoke(&mut self, callee: &Value, args: Vec<Value>, named: Map) -> Result<Value, RuntimeError> {
        self.started = Instant::now();
        let result = Runtime::call(self, callee, args, named);
        let result = match (result, self.fault.take()) {
            (_, Some(fault)) => Err(Trap::Fault(fault)),
            (Ok(value), None) => Ok(value),
            (Err(error), None) => Err(Trap::Error(error)),
        };
        self.finish(result)
    }

    fn finish(&mut self, result: Result<Value, Trap>) -> Result<Value, RuntimeError> {
        self.truncate(0);
        self.scopes.clear();
        self.calls.clear();
        debug!(steps = self.steps, "run finished");
        match result {
            Ok(value) => Ok(value),
            Err(Trap::Error(error)) => {
                debug!(kind = %error.kind, "uncaught error");
                Err(RuntimeError::Uncaught(error))
            }
            Err(Trap::Fault(fault)) => Err(fault),
        }
    }

    /// Run the function at `target` to completion above a fresh floor.
    ///
    /// Pushes the callee and argument bundles as the function's scope,
    /// with a host-boundary call frame so its `RETURN` ends the loop.
    ///
    /// Past the call depth limit nothing is pushed and `callDepthExceeded`
    /// is returned for the caller to raise.
    pub(crate) fn enter(&mut self, target: usize, callee: Value, args: Vec<Value>, named: Map) -> Result<Value, Trap> {
        let limit = self.options.call_depth_limit;
        if self.depth >= limit {
            debug!(limit, "call depth exceeded");
            return Err(Trap::Error(
                ErrorValue::new("callDepthExceeded").with("callDepthLimit", limit as f64),
            ));
        }
        trace!(target, depth = self.depth, "entering dispatch loop");
        self.depth += 1;
        let saved_floor = self.floor;
        let saved_pc = self.pc;
        let saved_at = self.at;
        self.floor = Floor {
            scopes: self.scopes.len(),
            calls: self.calls.len(),
            stack: self.stack.len(),
        };

        let base = self.stack.len();
        self.stack.push(Some(callee));
        self.stack.push(Some(Value::array(args)));
        self.stack.push(Some(Value::object(named)));
        self.scopes.push(ScopeFrame {
            base,
            recovery: Vec::new(),
        });
        self.calls.push(CallFrame {
            base,
            return_pc: None,
        });
        self.pc = target;

        let result = self.execute();
        self.depth -= 1;

        self.calls.truncate(self.floor.calls);
        self.scopes.truncate(self.floor.scopes);
        self.truncate(self.floor.stack);
        self.floor = saved_floor;
        self.pc = saved_pc;
        self.at = saved_at;
        result
    }

    // ============================================================
    // Stack
    // ============================================================

    pub(crate) fn push(&mut self, value: Value) {
        self.stack.push(Some(value));
    }

    pub(crate) fn pop(&mut self) -> Result<Value, RuntimeError> {
        if self.stack.len() <= self.floor.stack {
            return Err(RuntimeError::StackUnderflow { at: self.at });
        }
        match self.stack.pop() {
            Some(Some(value)) => Ok(value),
            _ => Err(RuntimeError::StackUnderflow { at: self.at }),
        }
    }

    pub(crate) fn top_mut(&mut self) -> Result<&mut Value, RuntimeError> {
        match self.stack.last_mut() {
            Some(Some(value)) => Ok(value),
            _ => Err(RuntimeError::StackUnderflow { at: self.at }),
        }
    }

    /// Cut the stack to `len`, closing every upvalue at or above it.
    pub(crate) fn truncate(&mut self, len: usize) {
        let closing = self.open_upvalues.split_off(&len);
        for (index, cell) in closing {
            let value = self.stack.get(index).cloned().flatten();
            *cell.borrow_mut() = Upvalue::Closed(value);
        }
        self.stack.truncate(len);
    }

    /// Absolute stack index of `slot` in the scope `depth` frames out.
    pub(crate) fn slot_index(&self, depth: u32, slot: u32) -> Result<usize, RuntimeError> {
        let depth = depth as usize;
        if depth >= self.scopes.len() {
            return Err(RuntimeError::NoScopeFrame { at: self.at });
        }
        let index = self.scopes[self.scopes.len() - 1 - depth].base + slot as usize;
        if index >= self.stack.len() {
            return Err(RuntimeError::SlotOutOfRange { at: self.at, index });
        }
        Ok(index)
    }

    pub(crate) fn scope_mut(&mut self) -> Result<&mut ScopeFrame, RuntimeError> {
        let at = self.at;
        if self.scopes.len() <= self.floor.scopes {
            return Err(RuntimeError::NoScopeFrame { at });
        }
        self.scopes.last_mut().ok_or(RuntimeError::NoScopeFrame { at })
    }

    /// The closure whose code is running.
    pub(crate) fn current_closure(&self) -> Result<&Value, RuntimeError> {
        let frame = self.calls.last().ok_or(RuntimeError::NoCallFrame { at: self.at })?;
        match self.stack.get(frame.base) {
            Some(Some(value)) => Ok(value),
            _ => Err(RuntimeError::StackUnderflow { at: self.at }),
        }
    }

    // ============================================================
    // Upvalues
    // ============================================================

    /// The shared upvalue for absolute slot `index`.
    pub(crate) fn open_upvalue(&mut self, index: usize) -> UpvalueCell {
        self.open_upvalues
            .entry(index)
            .or_insert_with(|| Rc::new(RefCell::new(Upvalue::Open(index))))
            .clone()
    }

    /// Close the upvalue for absolute slot `index`, if one is open.
    pub(crate) fn close_upvalue(&mut self, index: usize) {
        if let Some(cell) = self.open_upvalues.remove(&index) {
            let value = self.stack.get(index).cloned().flatten();
            *cell.borrow_mut() = Upvalue::Closed(value);
        }
    }

    // ============================================================
    // Recovery protocol
    // ============================================================

    /// Route a guest error to the innermost recovery target above the floor.
    ///
    /// Call frames entered inside the unwound region add one trace entry
    /// each. With no target, everything above the floor is unwound and the
    /// error is returned to the caller of the dispatch loop.
    pub(crate) fn raise(&mut self, mut error: ErrorValue) -> Result<(), Trap> {
        while !self.exhausted && self.scopes.len() > self.floor.scopes {
            let last = self.scopes.len() - 1;
            if let Some(target) = self.scopes[last].recovery.pop() {
                let base = self.scopes[last].base;
                self.unwind_calls(base, &mut error);
                self.truncate(base);
                self.push(Value::error(error));
                self.pc = target;
                return Ok(());
            }
            self.scopes.pop();
        }

        self.unwind_calls(self.floor.stack, &mut error);
        self.scopes.truncate(self.floor.scopes);
        self.truncate(self.floor.stack);
        Err(Trap::Error(error))
    }

    fn unwind_calls(&mut self, base: usize, error: &mut ErrorValue) {
        while self.calls.len() > self.floor.calls {
            let Some(frame) = self.calls.last().copied() else {
                break;
            };
            if frame.base < base {
                break;
            }
            if let Some(Some(Value::Function(f))) = self.stack.get(frame.base) {
                error.trace.push(f.name().to_string());
            }
            self.calls.pop();
        }
    }

    /// Count one step and check the budgets.
    pub(crate) fn check_limits(&mut self) -> Result<(), ErrorValue> {
        self.steps += 1;
        if let Some(limit) = self.options.step_limit {
            if self.steps > limit {
                self.exhausted = true;
                return Err(ErrorValue::new("stepLimitExceeded").with("stepLimit", limit as f64));
            }
        }
        if let Some(limit) = self.options.time_limit {
            if self.started.elapsed() > limit {
                self.exhausted = true;
                return Err(ErrorValue::new("timeLimitExceeded").with("timeLimitSeconds", limit.as_secs_f64()));
            }
        }
        Ok(())
    }
}

impl Runtime for VM<'_> {
    /// Re-enter the dispatch loop for a closure, or bind and run a native.
    ///
    /// A host fault inside the nested run is kept in `fault` and reported
    /// by the instruction that made the outer native call.
    fn call(&mut self, callee: &Value, args: Vec<Value>, named: Map) -> Result<Value, ErrorValue> {
        match callee {
            Value::Function(function) => match function.as_ref() {
                Function::Closure(closure) => {
                    trace!(function = %closure.name, "callback");
                    match self.enter(closure.target, callee.clone(), args, named) {
                        Ok(value) => Ok(value),
                        Err(Trap::Error(error)) => Err(error),
                        Err(Trap::Fault(fault)) => {
                            let error = ErrorValue::new("hostFault").with("message", fault.to_string());
                            self.fault = Some(fault);
                            Err(error)
                        }
                    }
                }
                Function::Native(native) => kenpali_binder::call_native(self, native, args, named),
            },
            other => Err(ErrorValue::new("notCallable").with("value", other.clone())),
        }
    }
}
