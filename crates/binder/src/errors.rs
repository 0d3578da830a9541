//! Constructors for the error values the binder raises.

use kenpali_common::{ErrorValue, Value};

pub fn wrong_type(value: &Value, expected: Value) -> ErrorValue {
    ErrorValue::new("wrongType")
        .with("value", value.clone())
        .with("expectedType", expected)
}

/// A `where` condition returned something other than `true`.
pub fn bad_value_condition(value: &Value, condition: &Value) -> ErrorValue {
    ErrorValue::new("badValue")
        .with("value", value.clone())
        .with("condition", condition.clone())
}

/// The value is not one of the listed literals.
pub fn bad_value_options(value: &Value, options: &Value) -> ErrorValue {
    ErrorValue::new("badValue")
        .with("value", value.clone())
        .with("options", options.clone())
}

/// No union branch matched and not every failure was a type mismatch.
pub fn bad_value_errors(value: &Value, errors: Vec<ErrorValue>) -> ErrorValue {
    ErrorValue::new("badValue")
        .with("value", value.clone())
        .with(
            "errors",
            Value::array(errors.into_iter().map(Value::error).collect()),
        )
}

/// `index` is 1-based.
pub fn missing_element(value: &Value, index: usize) -> ErrorValue {
    ErrorValue::new("missingElement")
        .with("value", value.clone())
        .with("index", index)
}

pub fn bad_element(value: &Value, index: usize, reason: ErrorValue) -> ErrorValue {
    ErrorValue::new("badElement")
        .with("value", value.clone())
        .with("index", index)
        .with("reason", reason)
}

pub fn missing_property(value: &Value, key: &str) -> ErrorValue {
    ErrorValue::new("missingProperty")
        .with("value", value.clone())
        .with("key", key)
}

pub fn bad_property(value: &Value, key: &str, reason: ErrorValue) -> ErrorValue {
    ErrorValue::new("badProperty")
        .with("value", value.clone())
        .with("key", key)
        .with("reason", reason)
}

pub fn bad_key(value: &Value, key: &str, reason: ErrorValue) -> ErrorValue {
    ErrorValue::new("badKey")
        .with("value", value.clone())
        .with("key", key)
        .with("reason", reason)
}

pub fn invalid_schema(schema: &Value) -> ErrorValue {
    ErrorValue::new("invalidSchema").with("schema", schema.clone())
}

pub fn missing_argument(name: &str) -> ErrorValue {
    ErrorValue::new("missingArgument").with("name", name)
}

pub fn wrong_argument_type(name: &str, value: Value, expected: Value) -> ErrorValue {
    ErrorValue::new("wrongArgumentType")
        .with("name", name)
        .with("value", value)
        .with("expectedType", expected)
}

pub fn bad_argument_value(name: &str, value: Value, reason: ErrorValue) -> ErrorValue {
    ErrorValue::new("badArgumentValue")
        .with("name", name)
        .with("value", value)
        .with("reason", reason)
}

/// Kinds produced by a failed match, as opposed to a broken schema or an
/// error raised by a `where` condition.
pub fn is_mismatch(error: &ErrorValue) -> bool {
    matches!(
        error.kind.as_str(),
        "wrongType"
            | "badValue"
            | "missingElement"
            | "badElement"
            | "missingProperty"
            | "badProperty"
            | "badKey"
    )
}
