//! Builtin functions implemented in Rust.

use kenpali_binder::errors::wrong_type;
use kenpali_common::stream::force_streams;
use kenpali_common::{Bindings, ErrorValue, Map, Params, Runtime, Stream, StreamNode, Value};

/// Every native builtin, in definition order.
pub fn natives() -> Vec<(&'static str, Value)> {
    vec![
        ("plus", plus()),
        ("minus", minus()),
        ("times", times()),
        ("dividedBy", divided_by()),
        ("negative", negative()),
        ("equals", equals()),
        ("isLessThan", is_less_than()),
        ("not", not()),
        ("if", if_()),
        ("typeOf", type_of()),
        ("isNull", is_type("isNull", Value::is_null)),
        ("isBoolean", is_type("isBoolean", Value::is_boolean)),
        ("isNumber", is_type("isNumber", Value::is_number)),
        ("isString", is_type("isString", Value::is_string)),
        ("isArray", is_type("isArray", Value::is_array)),
        ("isObject", is_type("isObject", Value::is_object)),
        ("isFunction", is_type("isFunction", Value::is_function)),
        ("isError", is_type("isError", Value::is_error)),
        ("isSequence", is_type("isSequence", Value::is_sequence)),
        ("length", length()),
        ("join", join()),
        ("toString", to_string()),
        ("toArray", to_array()),
        ("build", build()),
        ("map", map()),
        ("filter", filter()),
        ("keepFirst", keep_first()),
        ("error", error()),
        ("validate", validate()),
        ("matches", matches()),
    ]
}

fn arg<'b>(bindings: &'b Bindings, name: &str) -> Result<&'b Value, ErrorValue> {
    bindings
        .get(name)
        .ok_or_else(|| ErrorValue::new("missingArgument").with("name", name))
}

fn number(bindings: &Bindings, name: &str) -> Result<f64, ErrorValue> {
    let value = arg(bindings, name)?;
    value
        .as_number()
        .ok_or_else(|| wrong_type(value, Value::from("number")))
}

fn numbers(bindings: &Bindings, name: &str) -> Result<Vec<f64>, ErrorValue> {
    let value = arg(bindings, name)?;
    let elements = value
        .as_array()
        .ok_or_else(|| wrong_type(value, Value::from("array")))?;
    elements
        .iter()
        .map(|e| e.as_number().ok_or_else(|| wrong_type(e, Value::from("number"))))
        .collect()
}

fn string<'b>(bindings: &'b Bindings, name: &str) -> Result<&'b str, ErrorValue> {
    let value = arg(bindings, name)?;
    value
        .as_str()
        .ok_or_else(|| wrong_type(value, Value::from("string")))
}

fn boolean(value: &Value) -> Result<bool, ErrorValue> {
    value
        .as_bool()
        .ok_or_else(|| wrong_type(value, Value::from("boolean")))
}

/// Materialize any sequence as a vector of elements.
pub(crate) fn elements(runtime: &mut dyn Runtime, value: &Value) -> Result<Vec<Value>, ErrorValue> {
    match value {
        Value::Array(elements) => Ok(elements.to_vec()),
        Value::String(s) => Ok(s.chars().map(|c| Value::from(c.to_string())).collect()),
        Value::Stream(stream) => stream.to_vec(runtime),
        other => Err(wrong_type(other, Value::from("sequence"))),
    }
}

fn array_of(schema: &str) -> Value {
    Value::object_from([
        ("type", Value::from("array")),
        ("elements", Value::from(schema)),
    ])
}

fn plus() -> Value {
    Value::native("plus", Params::new().rest("numbers", "number"), |_, b| {
        Ok(Value::Number(numbers(&b, "numbers")?.iter().sum()))
    })
}

fn minus() -> Value {
    Value::native(
        "minus",
        Params::new().param("a", "number").param("b", "number"),
        |_, b| Ok(Value::Number(number(&b, "a")? - number(&b, "b")?)),
    )
}

fn times() -> Value {
    Value::native("times", Params::new().rest("numbers", "number"), |_, b| {
        Ok(Value::Number(numbers(&b, "numbers")?.iter().product()))
    })
}

fn divided_by() -> Value {
    Value::native(
        "dividedBy",
        Params::new().param("dividend", "number").param("divisor", "number"),
        |_, b| {
            let dividend = number(&b, "dividend")?;
            let divisor = number(&b, "divisor")?;
            if divisor == 0.0 {
                return Err(ErrorValue::new("divisionByZero").with("dividend", dividend));
            }
            Ok(Value::Number(dividend / divisor))
        },
    )
}

fn negative() -> Value {
    Value::native("negative", Params::new().param("x", "number"), |_, b| {
        Ok(Value::Number(-number(&b, "x")?))
    })
}

fn equals() -> Value {
    Value::native(
        "equals",
        Params::new().param("a", "any").param("b", "any"),
        |_, b| Ok(Value::Boolean(arg(&b, "a")? == arg(&b, "b")?)),
    )
}

fn is_less_than() -> Value {
    let comparable = Value::object_from([(
        "either",
        Value::array(vec![Value::from("number"), Value::from("string")]),
    )]);
    Value::native(
        "isLessThan",
        Params::new()
            .param("a", comparable.clone())
            .param("b", comparable),
        |_, b| match (arg(&b, "a")?, arg(&b, "b")?) {
            (Value::Number(x), Value::Number(y)) => Ok(Value::Boolean(x < y)),
            (Value::String(x), Value::String(y)) => Ok(Value::Boolean(x < y)),
            (x, y) => Err(wrong_type(y, Value::from(x.type_of()))),
        },
    )
}

fn not() -> Value {
    Value::native("not", Params::new().param("x", "boolean"), |_, b| {
        Ok(Value::Boolean(!boolean(arg(&b, "x")?)?))
    })
}

fn if_() -> Value {
    Value::native(
        "if",
        Params::new()
            .param("condition", "boolean")
            .named("then", "function")
            .named("else", "function"),
        |rt, b| {
            let branch = if boolean(arg(&b, "condition")?)? {
                arg(&b, "then")?
            } else {
                arg(&b, "else")?
            };
            rt.call(branch, Vec::new(), Map::new())
        },
    )
}

fn type_of() -> Value {
    Value::native("typeOf", Params::new().param("value", "any"), |_, b| {
        Ok(Value::from(arg(&b, "value")?.type_of()))
    })
}

fn is_type(name: &'static str, predicate: fn(&Value) -> bool) -> Value {
    Value::native(name, Params::new().param("value", "any"), move |_, b| {
        Ok(Value::Boolean(predicate(arg(&b, "value")?)))
    })
}

fn length() -> Value {
    Value::native("length", Params::new().param("sequence", "sequence"), |rt, b| {
        let len = match arg(&b, "sequence")? {
            Value::String(s) => s.chars().count(),
            Value::Array(elements) => elements.len(),
            other => elements(rt, other)?.len(),
        };
        Ok(Value::from(len))
    })
}

fn join() -> Value {
    Value::native(
        "join",
        Params::new()
            .param("strings", array_of("string"))
            .named_optional("on", "string", Value::from("")),
        |_, b| {
            let strings = arg(&b, "strings")?;
            let separator = string(&b, "on")?;
            let parts = strings
                .as_array()
                .ok_or_else(|| wrong_type(strings, Value::from("array")))?
                .iter()
                .map(|e| e.as_str().ok_or_else(|| wrong_type(e, Value::from("string"))))
                .collect::<Result<Vec<&str>, _>>()?;
            Ok(Value::from(parts.join(separator)))
        },
    )
}

fn to_string() -> Value {
    Value::native("toString", Params::new().param("value", "any"), |rt, b| {
        let value = arg(&b, "value")?;
        if let Value::String(_) = value {
            return Ok(value.clone());
        }
        force_streams(value, rt)?;
        Ok(Value::from(value.to_string()))
    })
}

fn to_array() -> Value {
    Value::native("toArray", Params::new().param("sequence", "sequence"), |rt, b| {
        Ok(Value::array(elements(rt, arg(&b, "sequence")?)?))
    })
}

/// `start`, `next(start)`, `next(next(start))`, ...
fn build() -> Value {
    Value::native(
        "build",
        Params::new().param("start", "any").param("next", "function"),
        |_, b| {
            let start = arg(&b, "start")?.clone();
            let next = arg(&b, "next")?.clone();
            Ok(Value::Stream(Stream::cons(start.clone(), successors(start, next))))
        },
    )
}

fn successors(seed: Value, next: Value) -> Stream {
    Stream::lazy(move |rt| {
        let value = rt.call(&next, vec![seed], Map::new())?;
        Ok(StreamNode::Cons(value.clone(), successors(value, next)))
    })
}

fn map() -> Value {
    Value::native(
        "map",
        Params::new().param("sequence", "sequence").param("f", "function"),
        |rt, b| {
            let f = arg(&b, "f")?.clone();
            match arg(&b, "sequence")? {
                Value::Stream(stream) => Ok(Value::Stream(map_stream(stream.clone(), f))),
                other => {
                    let mut out = Vec::new();
                    for element in elements(rt, other)? {
                        out.push(rt.call(&f, vec![element], Map::new())?);
                    }
                    Ok(Value::array(out))
                }
            }
        },
    )
}

fn map_stream(stream: Stream, f: Value) -> Stream {
    Stream::lazy(move |rt| match stream.force(rt)? {
        StreamNode::Empty => Ok(StreamNode::Empty),
        StreamNode::Cons(head, tail) => {
            let mapped = rt.call(&f, vec![head], Map::new())?;
            Ok(StreamNode::Cons(mapped, map_stream(tail, f)))
        }
    })
}

fn filter() -> Value {
    Value::native(
        "filter",
        Params::new()
            .param("sequence", "sequence")
            .param("condition", "function"),
        |rt, b| {
            let condition = arg(&b, "condition")?.clone();
            match arg(&b, "sequence")? {
                Value::Stream(stream) => Ok(Value::Stream(filter_stream(stream.clone(), condition))),
                other => {
                    let mut out = Vec::new();
                    for element in elements(rt, other)? {
                        let keep = rt.call(&condition, vec![element.clone()], Map::new())?;
                        if boolean(&keep)? {
                            out.push(element);
                        }
                    }
                    Ok(Value::array(out))
                }
            }
        },
    )
}

fn filter_stream(stream: Stream, condition: Value) -> Stream {
    Stream::lazy(move |rt| {
        let mut current = stream;
        loop {
            match current.force(rt)? {
                StreamNode::Empty => return Ok(StreamNode::Empty),
                StreamNode::Cons(head, tail) => {
                    let keep = rt.call(&condition, vec![head.clone()], Map::new())?;
                    if boolean(&keep)? {
                        return Ok(StreamNode::Cons(head, filter_stream(tail, condition)));
                    }
                    current = tail;
                }
            }
        }
    })
}

fn keep_first() -> Value {
    Value::native(
        "keepFirst",
        Params::new().param("sequence", "sequence").param("n", "number"),
        |rt, b| {
            let n = number(&b, "n")?.max(0.0) as usize;
            match arg(&b, "sequence")? {
                Value::Stream(stream) => {
                    let mut out = Vec::new();
                    let mut current = stream.clone();
                    while out.len() < n {
                        match current.force(rt)? {
                            StreamNode::Cons(head, tail) => {
                                out.push(head);
                                current = tail;
                            }
                            StreamNode::Empty => break,
                        }
                    }
                    Ok(Value::array(out))
                }
                other => Ok(Value::array(elements(rt, other)?.into_iter().take(n).collect())),
            }
        },
    )
}

fn error() -> Value {
    Value::native(
        "error",
        Params::new()
            .param("kind", "string")
            .named_optional("details", "object", Value::object(Map::new())),
        |_, b| {
            let mut raised = ErrorValue::new(string(&b, "kind")?);
            let details = arg(&b, "details")?;
            raised.details = details
                .as_object()
                .ok_or_else(|| wrong_type(details, Value::from("object")))?
                .clone();
            Err(raised)
        },
    )
}

fn validate() -> Value {
    Value::native(
        "validate",
        Params::new().param("value", "any").param("schema", "any"),
        |rt, b| {
            let value = arg(&b, "value")?;
            kenpali_binder::validate(rt, value, arg(&b, "schema")?)?;
            Ok(value.clone())
        },
    )
}

fn matches() -> Value {
    Value::native(
        "matches",
        Params::new().param("value", "any").param("schema", "any"),
        |rt, b| {
            let matched = kenpali_binder::matches(rt, arg(&b, "value")?, arg(&b, "schema")?)?;
            Ok(Value::Boolean(matched))
        },
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use kenpali_binder::call_native;
    use kenpali_common::Function;

    struct NativeOnly;

    impl Runtime for NativeOnly {
        fn call(&mut self, callee: &Value, args: Vec<Value>, named: Map) -> Result<Value, ErrorValue> {
            match callee {
                Value::Function(f) => match &**f {
                    Function::Native(native) => call_native(self, native, args, named),
                    Function::Closure(_) => Err(ErrorValue::new("notCallable")),
                },
                _ => Err(ErrorValue::new("notCallable")),
            }
        }
    }

    fn builtin(name: &str) -> Value {
        natives()
            .into_iter()
            .find(|(n, _)| *n == name)
            .map(|(_, v)| v)
            .unwrap()
    }

    fn call(name: &str, args: Vec<Value>) -> Result<Value, ErrorValue> {
        NativeOnly.call(&builtin(name), args, Map::new())
    }

    fn call_named(name: &str, args: Vec<Value>, named: Vec<(&str, Value)>) -> Result<Value, ErrorValue> {
        let named = named.into_iter().map(|(k, v)| (k.to_string(), v)).collect();
        NativeOnly.call(&builtin(name), args, named)
    }

    /// Run a native body on bindings that never went through the binder.
    fn invoke_unbound(name: &str, bindings: Vec<(&str, Value)>) -> Result<Value, ErrorValue> {
        let Value::Function(f) = builtin(name) else {
            panic!("{name} is not a function");
        };
        let Function::Native(native) = &*f else {
            panic!("{name} is not native");
        };
        let bindings = bindings.into_iter().map(|(k, v)| (k.to_string(), v)).collect();
        native.invoke(&mut NativeOnly, bindings)
    }

    #[test]
    fn join_rejects_unchecked_non_strings() {
        let mixed = Value::array(vec!["a".into(), 1.into()]);
        let error = invoke_unbound("join", vec![("strings", mixed), ("on", "-".into())]).unwrap_err();
        assert_eq!(error.kind, "wrongType");
        assert_eq!(error.detail("value"), Some(&Value::from(1)));

        let error = invoke_unbound("join", vec![("strings", Value::array(vec![])), ("on", 0.into())]).unwrap_err();
        assert_eq!(error.kind, "wrongType");
        assert_eq!(error.detail("expectedType"), Some(&Value::from("string")));

        let error = invoke_unbound("join", vec![("strings", "ab".into()), ("on", "".into())]).unwrap_err();
        assert_eq!(error.detail("expectedType"), Some(&Value::from("array")));
    }

    #[test]
    fn error_rejects_unchecked_kinds_and_details() {
        let error = invoke_unbound("error", vec![("kind", 3.into()), ("details", Value::object(Map::new()))]);
        assert_eq!(error.unwrap_err().detail("expectedType"), Some(&Value::from("string")));
        let error = invoke_unbound("error", vec![("kind", "boom".into()), ("details", Value::Null)]);
        assert_eq!(error.unwrap_err().detail("expectedType"), Some(&Value::from("object")));
    }

    #[test]
    fn arithmetic() {
        assert_eq!(call("plus", vec![1.into(), 2.into()]), Ok(Value::from(3)));
        assert_eq!(call("plus", vec![]), Ok(Value::from(0)));
        assert_eq!(call("minus", vec![5.into(), 7.into()]), Ok(Value::from(-2)));
        assert_eq!(call("times", vec![3.into(), 4.into()]), Ok(Value::from(12)));
        assert_eq!(call("dividedBy", vec![9.into(), 2.into()]), Ok(Value::from(4.5)));
        assert_eq!(call("negative", vec![3.into()]), Ok(Value::from(-3)));
    }

    #[test]
    fn division_by_zero_raises() {
        let error = call("dividedBy", vec![1.into(), 0.into()]).unwrap_err();
        assert_eq!(error.kind, "divisionByZero");
    }

    #[test]
    fn arguments_are_type_checked() {
        let error = call("plus", vec![1.into(), "two".into()]).unwrap_err();
        assert_eq!(error.kind, "wrongArgumentType");
        assert_eq!(error.detail("name"), Some(&Value::from("numbers")));
    }

    #[test]
    fn comparisons() {
        assert_eq!(call("isLessThan", vec![1.into(), 2.into()]), Ok(Value::from(true)));
        assert_eq!(call("isLessThan", vec!["b".into(), "a".into()]), Ok(Value::from(false)));
        assert_eq!(call("isLessThan", vec![1.into(), "a".into()]).unwrap_err().kind, "wrongType");
        assert_eq!(
            call("equals", vec![Value::array(vec![1.into()]), Value::array(vec![1.into()])]),
            Ok(Value::from(true))
        );
    }

    #[test]
    fn if_calls_the_chosen_branch() {
        let yes = Value::native("yes", Params::new(), |_, _| Ok(Value::from("yes")));
        let no = Value::native("no", Params::new(), |_, _| Ok(Value::from("no")));
        let result = call_named("if", vec![false.into()], vec![("then", yes), ("else", no)]);
        assert_eq!(result, Ok(Value::from("no")));
    }

    #[test]
    fn sequences() {
        assert_eq!(call("length", vec!["héllo".into()]), Ok(Value::from(5)));
        assert_eq!(
            call("toArray", vec!["ab".into()]),
            Ok(Value::array(vec!["a".into(), "b".into()]))
        );
        assert_eq!(
            call_named(
                "join",
                vec![Value::array(vec!["a".into(), "b".into()])],
                vec![("on", ", ".into())]
            ),
            Ok(Value::from("a, b"))
        );
    }

    #[test]
    fn build_is_lazy_and_infinite() {
        let stream = call("build", vec![1.into(), builtin("negative")]).unwrap();
        let first = call("keepFirst", vec![stream.clone(), 4.into()]).unwrap();
        assert_eq!(
            first,
            Value::array(vec![1.into(), (-1).into(), 1.into(), (-1).into()])
        );
        assert_eq!(stream.to_string(), "stream [1, -1, 1, -1, ...]");
    }

    #[test]
    fn map_and_filter_streams() {
        let stream = call("build", vec![2.into(), builtin("negative")]).unwrap();
        let mapped = call("map", vec![stream, builtin("negative")]).unwrap();
        let positive = call("filter", vec![mapped, builtin("isNumber")]).unwrap();
        let first = call("keepFirst", vec![positive, 2.into()]).unwrap();
        assert_eq!(first, Value::array(vec![(-2).into(), 2.into()]));
    }

    #[test]
    fn to_string_forces_streams() {
        let stream = Value::Stream(Stream::from_values(vec![1.into()]));
        assert_eq!(
            call("toString", vec![Value::array(vec![stream])]),
            Ok(Value::from("[stream [1]]"))
        );
        assert_eq!(call("toString", vec!["raw".into()]), Ok(Value::from("raw")));
    }

    #[test]
    fn error_raises_with_details() {
        let details = Value::object_from([("code", Value::from(7))]);
        let error = call_named("error", vec!["custom".into()], vec![("details", details)]).unwrap_err();
        assert_eq!(error.kind, "custom");
        assert_eq!(error.detail("code"), Some(&Value::from(7)));
    }

    #[test]
    fn validate_and_matches() {
        assert_eq!(call("validate", vec![3.into(), "number".into()]), Ok(Value::from(3)));
        assert_eq!(call("validate", vec!["x".into(), "number".into()]).unwrap_err().kind, "wrongType");
        assert_eq!(call("matches", vec!["x".into(), "number".into()]), Ok(Value::from(false)));
    }

    mod properties {
        use super::*;
        use proptest::prelude::*;

        proptest! {
            #[test]
            fn plus_and_minus_are_inverse(a in -1000i32..1000, b in -1000i32..1000) {
                let sum = call("plus", vec![a.into(), b.into()]).unwrap();
                prop_assert_eq!(call("minus", vec![sum, b.into()]), Ok(Value::from(a)));
            }

            #[test]
            fn to_array_preserves_length(text in "[a-zé]{0,8}") {
                let chars = call("toArray", vec![text.as_str().into()]).unwrap();
                let len = call("length", vec![chars]).unwrap();
                prop_assert_eq!(len, call("length", vec![text.as_str().into()]).unwrap());
            }
        }
    }
}
