//! Main execution loop and opcode dispatch for the Kenpali VM.

use std::rc::Rc;

use kenpali_common::{Closure, DecodeError, ErrorValue, Function, Instruction, Map, Opcode, Upvalue, Value};
use tracing::trace;

use crate::error::RuntimeError;
use crate::machine::{CallFrame, ScopeFrame, Trap, VM};

impl<'a> VM<'a> {
    /// Run instructions until the host-boundary `RETURN` of the current
    /// floor, or until an error escapes it.
    pub(crate) fn execute(&mut self) -> Result<Value, Trap> {
        loop {
            let outcome = match self.check_limits() {
                Ok(()) => self.step(),
                Err(error) => Err(Trap::Error(error)),
            };
            match outcome {
                Ok(None) => {}
                Ok(Some(value)) => return Ok(value),
                Err(Trap::Error(error)) => self.raise(error)?,
                Err(fault) => return Err(fault),
            }
        }
    }

    /// Execute one instruction. `Some` carries the value handed back at a
    /// host boundary.
    fn step(&mut self) -> Result<Option<Value>, Trap> {
        let instr = self.fetch()?;
        self.pc = self.at + instr.width();

        match instr.opcode {
            // Stack literals
            Opcode::Value => self.exec_value(&instr)?,
            Opcode::Platform => self.exec_platform(&instr)?,
            Opcode::Discard => {
                self.pop()?;
            }
            Opcode::Reserve => {
                for _ in 0..instr.arg1() {
                    self.stack.push(None);
                }
            }

            // Local variables
            Opcode::WriteLocal => self.exec_write_local(&instr)?,
            Opcode::ReadLocal => self.exec_read_local(&instr)?,

            // Scope bracketing
            Opcode::PushScope => self.exec_push_scope(&instr)?,
            Opcode::PopScope => self.exec_pop_scope()?,

            // Array builders
            Opcode::Array => self.push(Value::array(Vec::new())),
            Opcode::ArrayPush => self.exec_array_push()?,
            Opcode::ArrayExtend => self.exec_array_extend()?,
            Opcode::ArrayReverse => self.top_array()?.reverse(),
            Opcode::ArrayCopy => self.exec_array_copy()?,
            Opcode::ArrayCut => self.exec_array_cut(&instr)?,
            Opcode::ArrayPop => self.exec_array_pop(&instr)?,
            Opcode::ArrayPopOrDefault => self.exec_array_pop_or_default(&instr)?,

            // Object builders
            Opcode::Object => self.push(Value::object(Map::new())),
            Opcode::ObjectPush => self.exec_object_push()?,
            Opcode::ObjectMerge => self.exec_object_merge()?,
            Opcode::ObjectCopy => self.exec_object_copy()?,
            Opcode::ObjectPop => self.exec_object_pop(&instr)?,
            Opcode::ObjectPopOrDefault => self.exec_object_pop_or_default(&instr)?,

            // Functions and closures
            Opcode::Function => self.exec_function(&instr),
            Opcode::Closure => self.exec_closure(&instr)?,
            Opcode::ClosureUpvalue => self.exec_closure_upvalue(&instr)?,
            Opcode::Call => self.exec_call()?,
            Opcode::Return => return self.exec_return(),

            // Upvalues
            Opcode::ReadUpvalue => self.exec_read_upvalue(&instr)?,
            Opcode::Capture => {
                let base = self.scope_mut()?.base;
                self.close_upvalue(base + instr.arg1() as usize);
            }

            // Indexing
            Opcode::Index => self.exec_index()?,

            // Control
            Opcode::Catch => {
                let target = self.pc + instr.arg1() as usize;
                self.scope_mut()?.recovery.push(target);
            }
            Opcode::Uncatch => {
                self.scope_mut()?.recovery.pop();
            }
            Opcode::Validate => self.exec_validate(&instr)?,
        }
        Ok(None)
    }

    fn fetch(&mut self) -> Result<Instruction, RuntimeError> {
        self.at = self.pc;
        let at = self.at;
        Instruction::decode(&self.program.code, at).map_err(|e| match e {
            DecodeError::UnknownOpcode(_) => RuntimeError::InvalidOpcode { at },
            _ if at >= self.program.code.len() => RuntimeError::UnexpectedEndOfProgram { at },
            _ => RuntimeError::MissingOperand { at },
        })
    }

    /// The diagnostic name recorded for the current instruction.
    fn diagnostic_name(&self) -> Option<(&'a str, bool)> {
        let program = self.program;
        program
            .diagnostic(self.at)
            .map(|d| (d.name.as_str(), d.is_argument))
    }

    fn constant(&self, index: u32) -> Result<&'a Value, RuntimeError> {
        let program = self.program;
        program
            .constants
            .get(index as usize)
            .ok_or(RuntimeError::ConstantOutOfRange {
                at: self.at,
                index: index as usize,
            })
    }

    fn used_before_assignment(&self) -> ErrorValue {
        let name = self.diagnostic_name().map_or("<unknown>", |(name, _)| name);
        ErrorValue::new("nameUsedBeforeAssignment").with("name", name)
    }

    // ============================================================
    // Stack literals and locals
    // ============================================================

    fn exec_value(&mut self, instr: &Instruction) -> Result<(), RuntimeError> {
        let value = self.constant(instr.arg1())?.clone();
        self.push(value);
        Ok(())
    }

    fn exec_platform(&mut self, instr: &Instruction) -> Result<(), RuntimeError> {
        let index = instr.arg1() as usize;
        let entry = self
            .program
            .platform_values
            .get(index)
            .ok_or(RuntimeError::PlatformOutOfRange { at: self.at, index })?;
        self.push(entry.value.clone());
        Ok(())
    }

    fn exec_write_local(&mut self, instr: &Instruction) -> Result<(), RuntimeError> {
        let value = self.pop()?;
        let index = self.slot_index(instr.arg1(), instr.arg2())?;
        self.stack[index] = Some(value);
        Ok(())
    }

    fn exec_read_local(&mut self, instr: &Instruction) -> Result<(), Trap> {
        let index = self.slot_index(instr.arg1(), instr.arg2())?;
        match self.stack[index].clone() {
            Some(value) => {
                self.push(value);
                Ok(())
            }
            None => Err(self.used_before_assignment().into()),
        }
    }

    // ============================================================
    // Scopes
    // ============================================================

    fn exec_push_scope(&mut self, instr: &Instruction) -> Result<(), RuntimeError> {
        let size = instr.arg1() as usize;
        let available = self.stack.len().saturating_sub(self.floor.stack);
        if size > available {
            return Err(RuntimeError::StackUnderflow { at: self.at });
        }
        self.scopes.push(ScopeFrame {
            base: self.stack.len() - size,
            recovery: Vec::new(),
        });
        Ok(())
    }

    fn exec_pop_scope(&mut self) -> Result<(), RuntimeError> {
        let result = self.pop()?;
        let frame = self.scope_mut()?.base;
        self.scopes.pop();
        self.truncate(frame);
        self.push(result);
        Ok(())
    }

    // ============================================================
    // Arrays
    // ============================================================

    fn top_array(&mut self) -> Result<&mut Vec<Value>, RuntimeError> {
        let at = self.at;
        match self.top_mut()? {
            Value::Array(elements) => Ok(Rc::make_mut(elements)),
            _ => Err(RuntimeError::NotAnArray { at }),
        }
    }

    fn top_object(&mut self) -> Result<&mut Map, RuntimeError> {
        let at = self.at;
        match self.top_mut()? {
            Value::Object(entries) => Ok(Rc::make_mut(entries)),
            _ => Err(RuntimeError::NotAnObject { at }),
        }
    }

    fn exec_array_push(&mut self) -> Result<(), RuntimeError> {
        let value = self.pop()?;
        self.top_array()?.push(value);
        Ok(())
    }

    fn exec_array_extend(&mut self) -> Result<(), Trap> {
        let sequence = self.pop()?;
        let elements = match &sequence {
            Value::Array(elements) => elements.to_vec(),
            Value::String(s) => s.chars().map(|c| Value::from(c.to_string())).collect(),
            Value::Stream(stream) => stream.to_vec(self)?,
            other => {
                return Err(kenpali_binder::errors::wrong_type(other, Value::from("sequence")).into());
            }
        };
        self.top_array()?.extend(elements);
        Ok(())
    }

    fn exec_array_copy(&mut self) -> Result<(), RuntimeError> {
        let fresh = self.top_array()?.clone();
        *self.top_mut()? = Value::array(fresh);
        Ok(())
    }

    fn exec_array_cut(&mut self, instr: &Instruction) -> Result<(), RuntimeError> {
        let mut head = match self.pop()? {
            Value::Array(elements) => Rc::unwrap_or_clone(elements),
            _ => return Err(RuntimeError::NotAnArray { at: self.at }),
        };
        let split = (instr.arg1() as usize).min(head.len());
        let tail = head.split_off(split);
        self.push(Value::array(head));
        self.push(Value::array(tail));
        Ok(())
    }

    fn exec_array_pop(&mut self, instr: &Instruction) -> Result<(), Trap> {
        let popped = self.top_array()?.pop();
        match popped {
            Some(value) => {
                self.push(value);
                Ok(())
            }
            None => {
                let error = match self.diagnostic_name() {
                    Some((name, true)) => kenpali_binder::errors::missing_argument(name),
                    _ => ErrorValue::new("missingElement").with("index", instr.arg1() as usize),
                };
                Err(error.into())
            }
        }
    }

    fn exec_array_pop_or_default(&mut self, instr: &Instruction) -> Result<(), RuntimeError> {
        if let Some(value) = self.top_array()?.pop() {
            self.push(value);
            self.pc += instr.arg1() as usize;
        }
        Ok(())
    }

    // ============================================================
    // Objects
    // ============================================================

    fn exec_object_push(&mut self) -> Result<(), Trap> {
        let value = self.pop()?;
        let key = match self.pop()? {
            Value::String(key) => key.to_string(),
            other => return Err(kenpali_binder::errors::wrong_type(&other, Value::from("string")).into()),
        };
        self.top_object()?.insert(key, value);
        Ok(())
    }

    fn exec_object_merge(&mut self) -> Result<(), Trap> {
        let value = self.pop()?;
        let Value::Object(entries) = &value else {
            return Err(kenpali_binder::errors::wrong_type(&value, Value::from("object")).into());
        };
        let target = self.top_object()?;
        for (key, entry) in entries.iter() {
            target.insert(key.clone(), entry.clone());
        }
        Ok(())
    }

    fn exec_object_copy(&mut self) -> Result<(), RuntimeError> {
        let fresh = self.top_object()?.clone();
        *self.top_mut()? = Value::object(fresh);
        Ok(())
    }

    fn property_key(&self, index: u32) -> Result<&'a str, RuntimeError> {
        let at = self.at;
        self.constant(index)?
            .as_str()
            .ok_or(RuntimeError::ConstantOutOfRange { at, index: index as usize })
    }

    fn exec_object_pop(&mut self, instr: &Instruction) -> Result<(), Trap> {
        let key = self.property_key(instr.arg1())?;
        let popped = self.top_object()?.shift_remove(key);
        match popped {
            Some(value) => {
                self.push(value);
                Ok(())
            }
            None => {
                let error = match self.diagnostic_name() {
                    Some((name, true)) => kenpali_binder::errors::missing_argument(name),
                    _ => ErrorValue::new("missingProperty").with("key", key),
                };
                Err(error.into())
            }
        }
    }

    fn exec_object_pop_or_default(&mut self, instr: &Instruction) -> Result<(), RuntimeError> {
        let key = self.property_key(instr.arg1())?;
        if let Some(value) = self.top_object()?.shift_remove(key) {
            self.push(value);
            self.pc += instr.arg2() as usize;
        }
        Ok(())
    }

    // ============================================================
    // Functions and closures
    // ============================================================

    fn exec_function(&mut self, instr: &Instruction) {
        let target = instr.arg1() as usize;
        let name = self
            .program
            .function_at(target)
            .map_or("<anonymous>", |entry| entry.name.as_str());
        self.push(Value::Function(Rc::new(Function::Closure(Closure {
            name: Rc::from(name),
            target,
            upvalues: Vec::new(),
        }))));
    }

    /// The fresh closure on top of the stack, still uniquely owned.
    fn fresh_closure(&mut self) -> Result<&mut Closure, RuntimeError> {
        let at = self.at;
        match self.top_mut()? {
            Value::Function(function) => match Rc::get_mut(function) {
                Some(Function::Closure(closure)) => Ok(closure),
                _ => Err(RuntimeError::NotAFunction { at }),
            },
            _ => Err(RuntimeError::NotAFunction { at }),
        }
    }

    fn exec_closure(&mut self, instr: &Instruction) -> Result<(), RuntimeError> {
        let index = self.slot_index(instr.arg1(), instr.arg2())?;
        let cell = self.open_upvalue(index);
        self.fresh_closure()?.upvalues.push(cell);
        Ok(())
    }

    fn running_upvalue(&self, index: u32) -> Result<kenpali_common::UpvalueCell, RuntimeError> {
        let at = self.at;
        match self.current_closure()? {
            Value::Function(function) => match function.as_ref() {
                Function::Closure(closure) => closure
                    .upvalues
                    .get(index as usize)
                    .cloned()
                    .ok_or(RuntimeError::UpvalueOutOfRange { at, index: index as usize }),
                Function::Native(_) => Err(RuntimeError::NotAFunction { at }),
            },
            _ => Err(RuntimeError::NotAFunction { at }),
        }
    }

    fn exec_closure_upvalue(&mut self, instr: &Instruction) -> Result<(), RuntimeError> {
        let cell = self.running_upvalue(instr.arg1())?;
        self.fresh_closure()?.upvalues.push(cell);
        Ok(())
    }

    fn exec_read_upvalue(&mut self, instr: &Instruction) -> Result<(), Trap> {
        let cell = self.running_upvalue(instr.arg1())?;
        let value = match &*cell.borrow() {
            Upvalue::Open(index) => self.stack.get(*index).cloned().flatten(),
            Upvalue::Closed(value) => value.clone(),
        };
        match value {
            Some(value) => {
                self.push(value);
                Ok(())
            }
            None => Err(self.used_before_assignment().into()),
        }
    }

    /// Call the callee at the base of the top scope frame.
    fn exec_call(&mut self) -> Result<(), Trap> {
        let base = self.scope_mut()?.base;
        let bundle = |vm: &Self, offset: usize| match vm.stack.get(base + offset) {
            Some(Some(value)) => Ok(value.clone()),
            _ => Err(RuntimeError::StackUnderflow { at: vm.at }),
        };
        let callee = bundle(self, 0)?;
        let Value::Function(function) = &callee else {
            return Err(ErrorValue::new("notCallable").with("value", callee.clone()).into());
        };
        match function.as_ref() {
            Function::Closure(closure) => {
                trace!(function = %closure.name, "call");
                self.calls.push(CallFrame {
                    base,
                    return_pc: Some(self.pc),
                });
                self.pc = closure.target;
                Ok(())
            }
            Function::Native(native) => {
                trace!(function = %native.name, "native call");
                let args = match bundle(self, 1)? {
                    Value::Array(elements) => elements.to_vec(),
                    _ => return Err(RuntimeError::NotAnArray { at: self.at }.into()),
                };
                let named = match bundle(self, 2)? {
                    Value::Object(entries) => (*entries).clone(),
                    _ => return Err(RuntimeError::NotAnObject { at: self.at }.into()),
                };
                let result = kenpali_binder::call_native(self, native, args, named);
                if let Some(fault) = self.fault.take() {
                    return Err(fault.into());
                }
                let value = result?;
                self.truncate(base);
                self.push(value);
                Ok(())
            }
        }
    }

    fn exec_return(&mut self) -> Result<Option<Value>, Trap> {
        let result = self.pop()?;
        if self.calls.len() <= self.floor.calls {
            return Err(RuntimeError::NoCallFrame { at: self.at }.into());
        }
        let frame = self
            .calls
            .pop()
            .ok_or(RuntimeError::NoCallFrame { at: self.at })?;
        match frame.return_pc {
            Some(pc) => {
                self.truncate(frame.base);
                self.push(result);
                self.pc = pc;
                Ok(None)
            }
            None => Ok(Some(result)),
        }
    }

    // ============================================================
    // Indexing and validation
    // ============================================================

    fn exec_index(&mut self) -> Result<(), Trap> {
        let key = self.pop()?;
        let collection = self.pop()?;
        let value = match &collection {
            Value::Array(elements) => {
                let at = element_index(&collection, &key, elements.len())?;
                elements[at].clone()
            }
            Value::String(s) => {
                let chars: Vec<char> = s.chars().collect();
                let at = element_index(&collection, &key, chars.len())?;
                Value::from(chars[at].to_string())
            }
            Value::Stream(stream) => {
                let position = integer_index(&key)?;
                let found = if position > 0 {
                    stream.nth(self, (position - 1) as usize)?
                } else {
                    None
                };
                match found {
                    Some(value) => value,
                    None => {
                        let elements = stream.to_vec(self)?;
                        let at = element_index(&collection, &key, elements.len())?;
                        elements[at].clone()
                    }
                }
            }
            Value::Object(entries) => {
                let name = property_name(&key)?;
                entries
                    .get(name)
                    .cloned()
                    .ok_or_else(|| kenpali_binder::errors::missing_property(&collection, name))?
            }
            Value::Error(error) => {
                let name = property_name(&key)?;
                if name == "error" {
                    Value::from(error.kind.as_str())
                } else {
                    error
                        .detail(name)
                        .cloned()
                        .ok_or_else(|| kenpali_binder::errors::missing_property(&collection, name))?
                }
            }
            other => {
                let expected = Value::object_from([(
                    "either",
                    Value::array(vec![Value::from("sequence"), Value::from("object")]),
                )]);
                return Err(kenpali_binder::errors::wrong_type(other, expected).into());
            }
        };
        self.push(value);
        Ok(())
    }

    fn exec_validate(&mut self, instr: &Instruction) -> Result<(), Trap> {
        let schema = self.constant(instr.arg1())?;
        let value = self.top_mut()?.clone();
        if let Err(error) = kenpali_binder::validate(self, &value, schema) {
            if let Some(fault) = self.fault.take() {
                return Err(fault.into());
            }
            let error = match self.diagnostic_name() {
                Some((name, true)) => kenpali_binder::retag_argument_error(name, error),
                _ => error,
            };
            return Err(error.into());
        }
        Ok(())
    }
}

/// A numeric index that is a whole number.
fn integer_index(key: &Value) -> Result<i64, ErrorValue> {
    match key.as_number() {
        Some(n) if n.fract() == 0.0 && n.is_finite() => Ok(n as i64),
        _ => Err(kenpali_binder::errors::wrong_type(key, Value::from("number"))),
    }
}

/// Resolve a 1-based, possibly negative, index into `0..length`.
fn element_index(collection: &Value, key: &Value, length: usize) -> Result<usize, ErrorValue> {
    let position = integer_index(key)?;
    let len = length as i64;
    let resolved = if position < 0 { len + position } else { position - 1 };
    if position == 0 || resolved < 0 || resolved >= len {
        return Err(ErrorValue::new("indexOutOfBounds")
            .with("value", collection.clone())
            .with("length", length)
            .with("index", key.clone()));
    }
    Ok(resolved as usize)
}

fn property_name(key: &Value) -> Result<&str, ErrorValue> {
    key.as_str()
        .ok_or_else(|| kenpali_binder::errors::wrong_type(key, Value::from("string")))
}
