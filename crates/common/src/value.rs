//! Runtime value representation for the Kenpali VM.
//!
//! Compound values are reference counted. Arrays and objects are treated
//! as immutable once shared; builders mutate them through
//! [`Rc::make_mut`], which copies only when another reference exists.

use std::fmt;
use std::rc::Rc;

use indexmap::IndexMap;

use crate::function::Function;
use crate::stream::{Stream, StreamNode};

/// Ordered string-keyed mapping used for objects, error details and bindings.
pub type Map = IndexMap<String, Value>;

/// A runtime value.
#[derive(Clone)]
pub enum Value {
    Null,
    Boolean(bool),
    Number(f64),
    String(Rc<str>),
    Array(Rc<Vec<Value>>),
    Object(Rc<Map>),
    Function(Rc<Function>),
    Error(Rc<ErrorValue>),
    Stream(Stream),
}

/// A structured error: a kind tag, ordered detail fields and a call trace.
#[derive(Debug, Clone, PartialEq)]
pub struct ErrorValue {
    pub kind: String,
    pub details: Map,
    /// Names of the functions the error unwound through, innermost first.
    pub trace: Vec<String>,
}

impl ErrorValue {
    pub fn new(kind: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            details: Map::new(),
            trace: Vec::new(),
        }
    }

    /// Builder-style detail insertion.
    pub fn with(mut self, key: &str, value: impl Into<Value>) -> Self {
        self.details.insert(key.to_string(), value.into());
        self
    }

    pub fn detail(&self, key: &str) -> Option<&Value> {
        self.details.get(key)
    }

    /// The wrapped cause, if this error was raised because of another one.
    pub fn reason(&self) -> Option<&ErrorValue> {
        match self.details.get("reason") {
            Some(Value::Error(inner)) => Some(inner),
            _ => None,
        }
    }
}

impl Value {
    pub fn string(s: &str) -> Self {
        Value::String(Rc::from(s))
    }

    pub fn array(elements: Vec<Value>) -> Self {
        Value::Array(Rc::new(elements))
    }

    pub fn object(entries: Map) -> Self {
        Value::Object(Rc::new(entries))
    }

    /// Build an object from `(key, value)` pairs.
    pub fn object_from<I, K>(entries: I) -> Self
    where
        I: IntoIterator<Item = (K, Value)>,
        K: Into<String>,
    {
        Value::Object(Rc::new(
            entries.into_iter().map(|(k, v)| (k.into(), v)).collect(),
        ))
    }

    pub fn error(error: ErrorValue) -> Self {
        Value::Error(Rc::new(error))
    }

    /// Canonical type name, as used by type schemas.
    pub fn type_of(&self) -> &'static str {
        match self {
            Value::Null => "null",
            Value::Boolean(_) => "boolean",
            Value::Number(_) => "number",
            Value::String(_) => "string",
            Value::Array(_) => "array",
            Value::Object(_) => "object",
            Value::Function(_) => "function",
            Value::Error(_) => "error",
            Value::Stream(_) => "stream",
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    pub fn is_boolean(&self) -> bool {
        matches!(self, Value::Boolean(_))
    }

    pub fn is_number(&self) -> bool {
        matches!(self, Value::Number(_))
    }

    pub fn is_string(&self) -> bool {
        matches!(self, Value::String(_))
    }

    pub fn is_array(&self) -> bool {
        matches!(self, Value::Array(_))
    }

    pub fn is_object(&self) -> bool {
        matches!(self, Value::Object(_))
    }

    pub fn is_function(&self) -> bool {
        matches!(self, Value::Function(_))
    }

    pub fn is_error(&self) -> bool {
        matches!(self, Value::Error(_))
    }

    pub fn is_stream(&self) -> bool {
        matches!(self, Value::Stream(_))
    }

    /// Strings, arrays and streams.
    pub fn is_sequence(&self) -> bool {
        matches!(self, Value::String(_) | Value::Array(_) | Value::Stream(_))
    }

    pub fn as_number(&self) -> Option<f64> {
        match self {
            Value::Number(n) => Some(*n),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Boolean(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_array(&self) -> Option<&[Value]> {
        match self {
            Value::Array(elements) => Some(elements),
            _ => None,
        }
    }

    pub fn as_object(&self) -> Option<&Map> {
        match self {
            Value::Object(entries) => Some(entries),
            _ => None,
        }
    }

    /// Property lookup on objects; `None` for anything else.
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.as_object()?.get(key)
    }

    /// True when the value is plain data that can live in a constant table:
    /// no functions, errors or streams anywhere inside it.
    pub fn is_data(&self) -> bool {
        match self {
            Value::Null | Value::Boolean(_) | Value::Number(_) | Value::String(_) => true,
            Value::Array(elements) => elements.iter().all(Value::is_data),
            Value::Object(entries) => entries.values().all(Value::is_data),
            Value::Function(_) | Value::Error(_) | Value::Stream(_) => false,
        }
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Value::Null, Value::Null) => true,
            (Value::Boolean(a), Value::Boolean(b)) => a == b,
            (Value::Number(a), Value::Number(b)) => a == b,
            (Value::String(a), Value::String(b)) => a == b,
            (Value::Array(a), Value::Array(b)) => a == b,
            (Value::Object(a), Value::Object(b)) => {
                a.len() == b.len() && a.iter().all(|(k, v)| b.get(k) == Some(v))
            }
            (Value::Function(a), Value::Function(b)) => Rc::ptr_eq(a, b),
            (Value::Error(a), Value::Error(b)) => a.kind == b.kind && a.details == b.details,
            (Value::Stream(a), Value::Stream(b)) => a.ptr_eq(b),
            _ => false,
        }
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Boolean(b)
    }
}

impl From<f64> for Value {
    fn from(n: f64) -> Self {
        Value::Number(n)
    }
}

impl From<i32> for Value {
    fn from(n: i32) -> Self {
        Value::Number(f64::from(n))
    }
}

impl From<usize> for Value {
    fn from(n: usize) -> Self {
        Value::Number(n as f64)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::string(s)
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::String(Rc::from(s))
    }
}

impl From<Vec<Value>> for Value {
    fn from(elements: Vec<Value>) -> Self {
        Value::array(elements)
    }
}

impl From<Map> for Value {
    fn from(entries: Map) -> Self {
        Value::object(entries)
    }
}

impl From<ErrorValue> for Value {
    fn from(error: ErrorValue) -> Self {
        Value::error(error)
    }
}

impl fmt::Debug for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{self}")
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => write!(f, "null"),
            Value::Boolean(b) => write!(f, "{b}"),
            Value::Number(n) => write_number(f, *n),
            Value::String(s) => write_quoted(f, s),
            Value::Array(elements) => {
                write!(f, "[")?;
                write_list(f, elements)?;
                write!(f, "]")
            }
            Value::Object(entries) => write_entries(f, entries),
            Value::Function(func) => write!(f, "function {}", func.name()),
            Value::Error(error) => write!(f, "{error}"),
            Value::Stream(stream) => {
                write!(f, "stream [")?;
                let mut node = stream.peek();
                let mut first = true;
                loop {
                    match node {
                        Some(StreamNode::Cons(value, rest)) => {
                            if !first {
                                write!(f, ", ")?;
                            }
                            first = false;
                            write!(f, "{value}")?;
                            node = rest.peek();
                        }
                        Some(StreamNode::Empty) => break,
                        None => {
                            if !first {
                                write!(f, ", ")?;
                            }
                            write!(f, "...")?;
                            break;
                        }
                    }
                }
                write!(f, "]")
            }
        }
    }
}

impl fmt::Display for ErrorValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Error {{error: ")?;
        write_quoted(f, &self.kind)?;
        write!(f, ", details: ")?;
        write_entries(f, &self.details)?;
        write!(f, "}}")?;
        for name in &self.trace {
            write!(f, "\n  at {name}")?;
        }
        Ok(())
    }
}

fn write_number(f: &mut fmt::Formatter<'_>, n: f64) -> fmt::Result {
    if n.is_nan() {
        write!(f, "NaN")
    } else if n.is_infinite() {
        write!(f, "{}", if n > 0.0 { "Infinity" } else { "-Infinity" })
    } else if n.fract() == 0.0 && n.abs() < 1e15 {
        // -0 prints as 0
        write!(f, "{}", n as i64)
    } else {
        write!(f, "{n}")
    }
}

fn write_quoted(f: &mut fmt::Formatter<'_>, s: &str) -> fmt::Result {
    write!(f, "\"")?;
    for ch in s.chars() {
        match ch {
            '"' => write!(f, "\\\"")?,
            '\\' => write!(f, "\\\\")?,
            '\n' => write!(f, "\\n")?,
            '\t' => write!(f, "\\t")?,
            '\r' => write!(f, "\\r")?,
            c => write!(f, "{c}")?,
        }
    }
    write!(f, "\"")
}

fn write_list(f: &mut fmt::Formatter<'_>, elements: &[Value]) -> fmt::Result {
    for (i, element) in elements.iter().enumerate() {
        if i > 0 {
            write!(f, ", ")?;
        }
        write!(f, "{element}")?;
    }
    Ok(())
}

fn write_entries(f: &mut fmt::Formatter<'_>, entries: &Map) -> fmt::Result {
    write!(f, "{{")?;
    for (i, (key, value)) in entries.iter().enumerate() {
        if i > 0 {
            write!(f, ", ")?;
        }
        if is_identifier(key) {
            write!(f, "{key}")?;
        } else {
            write_quoted(f, key)?;
        }
        write!(f, ": {value}")?;
    }
    write!(f, "}}")
}

/// Keys that can be written without quotes.
pub fn is_identifier(key: &str) -> bool {
    let mut chars = key.chars();
    match chars.next() {
        Some(c) if c.is_alphabetic() || c == '_' => {}
        _ => return false,
    }
    chars.all(|c| c.is_alphanumeric() || c == '_')
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_scalars() {
        assert_eq!(Value::Null.to_string(), "null");
        assert_eq!(Value::Boolean(true).to_string(), "true");
        assert_eq!(Value::Number(3.0).to_string(), "3");
        assert_eq!(Value::Number(-2.0).to_string(), "-2");
        assert_eq!(Value::Number(2.5).to_string(), "2.5");
        assert_eq!(Value::Number(-0.0).to_string(), "0");
        assert_eq!(Value::Number(f64::NAN).to_string(), "NaN");
        assert_eq!(Value::Number(f64::NEG_INFINITY).to_string(), "-Infinity");
    }

    #[test]
    fn display_strings_are_quoted_and_escaped() {
        assert_eq!(Value::string("hi").to_string(), "\"hi\"");
        assert_eq!(
            Value::string("a\"b\\c\nd").to_string(),
            r#""a\"b\\c\nd""#
        );
    }

    #[test]
    fn display_collections() {
        let array = Value::array(vec![1.into(), "x".into(), Value::Null]);
        assert_eq!(array.to_string(), r#"[1, "x", null]"#);

        let object = Value::object_from([
            ("name", Value::from("Kenpali")),
            ("two words", Value::from(2)),
            ("_x1", Value::array(vec![])),
        ]);
        assert_eq!(
            object.to_string(),
            r#"{name: "Kenpali", "two words": 2, _x1: []}"#
        );
    }

    #[test]
    fn display_error_with_trace() {
        let mut error = ErrorValue::new("wrongType")
            .with("value", "foo")
            .with("expectedType", "number");
        error.trace.push("double".to_string());
        error.trace.push("main".to_string());
        assert_eq!(
            Value::error(error).to_string(),
            "Error {error: \"wrongType\", details: {value: \"foo\", expectedType: \"number\"}}\n  at double\n  at main"
        );
    }

    #[test]
    fn object_equality_ignores_key_order() {
        let a = Value::object_from([("a", Value::from(1)), ("b", Value::from(2))]);
        let b = Value::object_from([("b", Value::from(2)), ("a", Value::from(1))]);
        assert_eq!(a, b);
        let c = Value::object_from([("a", Value::from(1))]);
        assert_ne!(a, c);
    }

    #[test]
    fn deep_array_equality() {
        let a = Value::array(vec![Value::array(vec![1.into()]), "x".into()]);
        let b = Value::array(vec![Value::array(vec![1.into()]), "x".into()]);
        assert_eq!(a, b);
        assert_ne!(a, Value::array(vec![]));
        assert_ne!(Value::from(1), Value::from("1"));
    }

    #[test]
    fn errors_compare_by_kind_and_details_not_trace() {
        let mut a = ErrorValue::new("badValue").with("value", 1);
        let b = ErrorValue::new("badValue").with("value", 1);
        a.trace.push("f".to_string());
        assert_eq!(Value::error(a), Value::error(b));
    }

    #[test]
    fn type_names() {
        assert_eq!(Value::Null.type_of(), "null");
        assert_eq!(Value::from(true).type_of(), "boolean");
        assert_eq!(Value::from(1).type_of(), "number");
        assert_eq!(Value::from("s").type_of(), "string");
        assert_eq!(Value::array(vec![]).type_of(), "array");
        assert_eq!(Value::object(Map::new()).type_of(), "object");
        assert_eq!(Value::error(ErrorValue::new("x")).type_of(), "error");
        assert_eq!(Value::Stream(Stream::empty()).type_of(), "stream");
    }

    #[test]
    fn data_detection() {
        assert!(Value::array(vec![Value::object_from([("k", Value::Null)])]).is_data());
        assert!(!Value::array(vec![Value::error(ErrorValue::new("x"))]).is_data());
    }

    #[test]
    fn identifier_keys() {
        assert!(is_identifier("abc"));
        assert!(is_identifier("a1_b"));
        assert!(!is_identifier("1a"));
        assert!(!is_identifier(""));
        assert!(!is_identifier("a-b"));
    }

    #[test]
    fn stream_display_shows_forced_prefix() {
        let stream = Stream::from_values(vec![1.into(), 2.into()]);
        assert_eq!(Value::Stream(stream).to_string(), "stream [1, 2]");
        let pending = Stream::lazy(|_| Ok(StreamNode::Empty));
        assert_eq!(Value::Stream(pending).to_string(), "stream [...]");
    }
}
