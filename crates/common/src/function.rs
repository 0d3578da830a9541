//! Function values: compiled closures and host-provided natives.

use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;

use crate::runtime::Runtime;
use crate::value::{ErrorValue, Map, Value};

/// Shared handle to an upvalue. All closures that capture the same stack
/// slot hold clones of the same cell.
pub type UpvalueCell = Rc<RefCell<Upvalue>>;

/// A captured variable.
#[derive(Debug, Clone, PartialEq)]
pub enum Upvalue {
    /// Still on the operand stack, at this absolute index.
    Open(usize),
    /// Closed over; `None` if the slot had not been assigned yet.
    Closed(Option<Value>),
}

/// Argument bindings handed to a native function body.
pub type Bindings = Map;

/// Body of a native function.
pub type NativeBody = dyn Fn(&mut dyn Runtime, Bindings) -> Result<Value, ErrorValue>;

/// A callable value.
pub enum Function {
    Closure(Closure),
    Native(NativeFunction),
}

/// A compiled function plus its captured variables.
#[derive(Debug, Clone)]
pub struct Closure {
    pub name: Rc<str>,
    /// Absolute code offset of the function's first instruction.
    pub target: usize,
    pub upvalues: Vec<UpvalueCell>,
}

/// A host-language function with declared parameters.
#[derive(Clone)]
pub struct NativeFunction {
    pub name: String,
    pub params: Params,
    body: Rc<NativeBody>,
}

impl NativeFunction {
    pub fn new<F>(name: &str, params: Params, body: F) -> Self
    where
        F: Fn(&mut dyn Runtime, Bindings) -> Result<Value, ErrorValue> + 'static,
    {
        Self {
            name: name.to_string(),
            params,
            body: Rc::new(body),
        }
    }

    /// Invoke the body with already-bound arguments.
    pub fn invoke(&self, runtime: &mut dyn Runtime, bindings: Bindings) -> Result<Value, ErrorValue> {
        (self.body)(runtime, bindings)
    }
}

impl Function {
    pub fn name(&self) -> &str {
        match self {
            Function::Closure(closure) => &closure.name,
            Function::Native(native) => &native.name,
        }
    }
}

impl fmt::Debug for Function {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Function::Closure(closure) => write!(
                f,
                "Closure({} @{}, {} upvalues)",
                closure.name,
                closure.target,
                closure.upvalues.len()
            ),
            Function::Native(native) => write!(f, "Native({})", native.name),
        }
    }
}

impl fmt::Debug for NativeFunction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NativeFunction")
            .field("name", &self.name)
            .field("params", &self.params)
            .finish()
    }
}

/// One declared parameter.
#[derive(Debug, Clone, PartialEq)]
pub struct Param {
    pub name: String,
    pub schema: Value,
    pub default: Option<Value>,
}

/// Declared parameter shape of a native function.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Params {
    pub positional: Vec<Param>,
    pub rest: Option<Param>,
    pub named: Vec<Param>,
    pub named_rest: Option<Param>,
}

impl Params {
    pub fn new() -> Self {
        Self::default()
    }

    /// Required positional parameter.
    pub fn param(mut self, name: &str, schema: impl Into<Value>) -> Self {
        self.positional.push(Param {
            name: name.to_string(),
            schema: schema.into(),
            default: None,
        });
        self
    }

    /// Positional parameter that falls back to `default` when absent.
    pub fn optional(mut self, name: &str, schema: impl Into<Value>, default: Value) -> Self {
        self.positional.push(Param {
            name: name.to_string(),
            schema: schema.into(),
            default: Some(default),
        });
        self
    }

    /// Collects the remaining positional arguments into an array.
    pub fn rest(mut self, name: &str, schema: impl Into<Value>) -> Self {
        self.rest = Some(Param {
            name: name.to_string(),
            schema: schema.into(),
            default: None,
        });
        self
    }

    /// Required named parameter.
    pub fn named(mut self, name: &str, schema: impl Into<Value>) -> Self {
        self.named.push(Param {
            name: name.to_string(),
            schema: schema.into(),
            default: None,
        });
        self
    }

    pub fn named_optional(mut self, name: &str, schema: impl Into<Value>, default: Value) -> Self {
        self.named.push(Param {
            name: name.to_string(),
            schema: schema.into(),
            default: Some(default),
        });
        self
    }

    /// Collects the unclaimed named arguments into an object.
    pub fn named_rest(mut self, name: &str, schema: impl Into<Value>) -> Self {
        self.named_rest = Some(Param {
            name: name.to_string(),
            schema: schema.into(),
            default: None,
        });
        self
    }
}

impl Value {
    /// Wrap a native function as a value.
    pub fn native<F>(name: &str, params: Params, body: F) -> Value
    where
        F: Fn(&mut dyn Runtime, Bindings) -> Result<Value, ErrorValue> + 'static,
    {
        Value::Function(Rc::new(Function::Native(NativeFunction::new(name, params, body))))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn params_builder_keeps_declaration_order() {
        let params = Params::new()
            .param("a", "number")
            .optional("b", "number", Value::from(1))
            .rest("others", "any")
            .named("on", "string");
        let names: Vec<_> = params.positional.iter().map(|p| p.name.as_str()).collect();
        assert_eq!(names, ["a", "b"]);
        assert_eq!(params.positional[1].default, Some(Value::from(1)));
        assert_eq!(params.rest.as_ref().map(|p| p.name.as_str()), Some("others"));
        assert_eq!(params.named[0].name, "on");
    }

    #[test]
    fn native_display_uses_its_name() {
        let f = Value::native("answer", Params::new(), |_, _| Ok(Value::from(42)));
        assert_eq!(f.to_string(), "function answer");
        assert_eq!(f.clone(), f);
    }

    #[test]
    fn shared_upvalue_cells_observe_closing() {
        let cell: UpvalueCell = Rc::new(RefCell::new(Upvalue::Open(4)));
        let other = Rc::clone(&cell);
        *cell.borrow_mut() = Upvalue::Closed(Some(Value::from(7)));
        assert_eq!(*other.borrow(), Upvalue::Closed(Some(Value::from(7))));
    }
}
