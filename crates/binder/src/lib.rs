//! Kenpali schema binder.
//!
//! Checks values against data-described schemas and collects the names the
//! schema binds. The same machinery validates native function arguments
//! and backs the `validate` and `matches` builtins.
//!
//! # Usage
//!
//! ```
//! use kenpali_binder::bind;
//! use kenpali_common::{ErrorValue, Map, Runtime, Value};
//!
//! struct NoCallbacks;
//! impl Runtime for NoCallbacks {
//!     fn call(&mut self, _: &Value, _: Vec<Value>, _: Map) -> Result<Value, ErrorValue> {
//!         Err(ErrorValue::new("notCallable"))
//!     }
//! }
//!
//! let schema = Value::object_from([
//!     ("bind", Value::from("number")),
//!     ("as", Value::from("n")),
//! ]);
//! let bindings = bind(&mut NoCallbacks, &Value::from(3), &schema).unwrap();
//! assert_eq!(bindings["n"], Value::from(3));
//! ```

pub mod arguments;
pub mod errors;
mod schema;

pub use arguments::{bind_arguments, call_native, retag_argument_error};
pub use schema::bindable_names;

use kenpali_common::{Bindings, ErrorValue, Runtime, Value};

use schema::Binder;

/// Match `value` against `schema`, returning the bound names.
///
/// `where` conditions are invoked through `runtime`.
pub fn bind(runtime: &mut dyn Runtime, value: &Value, schema: &Value) -> Result<Bindings, ErrorValue> {
    let mut out = Bindings::new();
    Binder { runtime }.bind_into(value, schema, &mut out)?;
    Ok(out)
}

/// Match `value` against `schema`, discarding bindings.
pub fn validate(runtime: &mut dyn Runtime, value: &Value, schema: &Value) -> Result<(), ErrorValue> {
    bind(runtime, value, schema).map(|_| ())
}

/// `Ok(false)` on a mismatch. Broken schemas and errors raised by `where`
/// conditions still propagate.
pub fn matches(runtime: &mut dyn Runtime, value: &Value, schema: &Value) -> Result<bool, ErrorValue> {
    match bind(runtime, value, schema) {
        Ok(_) => Ok(true),
        Err(error) if errors::is_mismatch(&error) => Ok(false),
        Err(error) => Err(error),
    }
}

#[cfg(test)]
mod proptests {
    use super::*;
    use kenpali_common::Map;
    use proptest::prelude::*;

    struct NoCallbacks;

    impl Runtime for NoCallbacks {
        fn call(&mut self, _: &Value, _: Vec<Value>, _: Map) -> Result<Value, ErrorValue> {
            Err(ErrorValue::new("notCallable"))
        }
    }

    fn arb_value() -> impl Strategy<Value = Value> {
        let leaf = prop_oneof![
            Just(Value::Null),
            any::<bool>().prop_map(Value::Boolean),
            (-100i32..100).prop_map(Value::from),
            "[a-c]{0,3}".prop_map(Value::from),
        ];
        leaf.prop_recursive(2, 12, 3, |inner| {
            prop_oneof![
                prop::collection::vec(inner.clone(), 0..3).prop_map(Value::array),
                prop::collection::vec(("[a-c]", inner), 0..3).prop_map(Value::object_from),
            ]
        })
    }

    fn arb_type() -> impl Strategy<Value = Value> {
        prop::sample::select(vec![
            "any", "null", "boolean", "number", "string", "array", "object", "sequence",
        ])
        .prop_map(Value::from)
    }

    fn bound(schema: Value, name: &str) -> Value {
        Value::object_from([("bind", schema), ("as", Value::from(name))])
    }

    fn arb_schema() -> impl Strategy<Value = Value> {
        let leaf = prop_oneof![
            arb_type(),
            (arb_type(), "[x-z]").prop_map(|(t, n)| bound(t, &n)),
            prop::collection::vec(arb_value(), 1..3)
                .prop_map(|opts| Value::object_from([("oneOf", Value::array(opts))])),
        ];
        leaf.prop_recursive(2, 10, 3, |inner| {
            prop_oneof![
                prop::collection::vec(inner.clone(), 1..3)
                    .prop_map(|s| Value::object_from([("either", Value::array(s))])),
                prop::collection::vec(inner.clone(), 0..3).prop_map(|s| Value::object_from([
                    ("type", Value::from("array")),
                    ("shape", Value::array(s)),
                ])),
                prop::collection::vec(("[a-c]", inner.clone()), 0..3).prop_map(|s| {
                    Value::object_from([
                        ("type", Value::from("object")),
                        ("shape", Value::object_from(s)),
                    ])
                }),
                (inner, "[x-z]").prop_map(|(s, n)| bound(s, &n)),
            ]
        })
    }

    fn sorted(mut names: Vec<String>) -> Vec<String> {
        names.sort();
        names
    }

    proptest! {
        /// A successful bind produces exactly the schema's bindable names.
        #[test]
        fn bind_totality(value in arb_value(), schema in arb_schema()) {
            match bind(&mut NoCallbacks, &value, &schema) {
                Ok(bindings) => {
                    let keys: Vec<String> = bindings.keys().cloned().collect();
                    prop_assert_eq!(sorted(keys), sorted(bindable_names(&schema)));
                }
                Err(error) => prop_assert!(errors::is_mismatch(&error), "{}", error),
            }
        }

        /// A union matches iff one of its branches does; two type
        /// mismatches combine their expected types.
        #[test]
        fn union_law(value in arb_value(), a in arb_type(), b in arb_type()) {
            let either = Value::object_from([("either", Value::array(vec![a.clone(), b.clone()]))]);
            let ra = bind(&mut NoCallbacks, &value, &a);
            let rb = bind(&mut NoCallbacks, &value, &b);
            let combined = bind(&mut NoCallbacks, &value, &either);
            prop_assert_eq!(combined.is_ok(), ra.is_ok() || rb.is_ok());
            if let (Err(_), Err(_)) = (&ra, &rb) {
                let error = combined.unwrap_err();
                prop_assert_eq!(error.kind.as_str(), "wrongType");
                let expected = Value::object_from([("either", Value::array(vec![a, b]))]);
                prop_assert_eq!(error.detail("expectedType"), Some(&expected));
            }
        }
    }
}
