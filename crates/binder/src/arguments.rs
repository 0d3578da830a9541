//! Binding call arguments to declared parameters.

use kenpali_common::{Bindings, ErrorValue, Map, NativeFunction, Param, Params, Runtime, Value};

use crate::errors::{bad_argument_value, missing_argument, wrong_argument_type};
use crate::validate;

/// Bind positional and named arguments to `params`.
///
/// Extra positional arguments without a rest parameter are ignored, as are
/// unclaimed named arguments without a named rest parameter.
pub fn bind_arguments(
    runtime: &mut dyn Runtime,
    params: &Params,
    args: Vec<Value>,
    mut named: Map,
) -> Result<Bindings, ErrorValue> {
    let mut out = Bindings::new();
    let mut args = args.into_iter();

    for param in &params.positional {
        let value = match args.next() {
            Some(value) => {
                check_argument(runtime, param, &value)?;
                value
            }
            None => default_for(param)?,
        };
        out.insert(param.name.clone(), value);
    }
    if let Some(rest) = &params.rest {
        let tail: Vec<Value> = args.collect();
        for value in &tail {
            check_argument(runtime, rest, value)?;
        }
        out.insert(rest.name.clone(), Value::array(tail));
    }

    for param in &params.named {
        let value = match named.shift_remove(&param.name) {
            Some(value) => {
                check_argument(runtime, param, &value)?;
                value
            }
            None => default_for(param)?,
        };
        out.insert(param.name.clone(), value);
    }
    if let Some(rest) = &params.named_rest {
        for value in named.values() {
            check_argument(runtime, rest, value)?;
        }
        out.insert(rest.name.clone(), Value::object(named));
    }
    Ok(out)
}

/// Bind arguments and run a native function.
pub fn call_native(
    runtime: &mut dyn Runtime,
    native: &NativeFunction,
    args: Vec<Value>,
    named: Map,
) -> Result<Value, ErrorValue> {
    let bindings = bind_arguments(runtime, &native.params, args, named)?;
    native.invoke(runtime, bindings)
}

fn default_for(param: &Param) -> Result<Value, ErrorValue> {
    param
        .default
        .clone()
        .ok_or_else(|| missing_argument(&param.name))
}

fn check_argument(runtime: &mut dyn Runtime, param: &Param, value: &Value) -> Result<(), ErrorValue> {
    validate(runtime, value, &param.schema).map_err(|e| retag_argument_error(&param.name, e))
}

/// Restate a binder error in terms of the argument `name`.
///
/// `wrongType` becomes `wrongArgumentType`; other mismatches become
/// `badArgumentValue` with the original error as the reason. Errors that
/// are not mismatches pass through unchanged.
pub fn retag_argument_error(name: &str, error: ErrorValue) -> ErrorValue {
    let value = error.detail("value").cloned().unwrap_or(Value::Null);
    match error.kind.as_str() {
        "wrongType" => {
            let expected = error.detail("expectedType").cloned().unwrap_or(Value::Null);
            wrong_argument_type(name, value, expected)
        }
        _ if crate::errors::is_mismatch(&error) => bad_argument_value(name, value, error),
        _ => error,
    }
}
