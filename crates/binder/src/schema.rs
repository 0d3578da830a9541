//! Recursive schema matching.
//!
//! Schemas are plain values:
//!
//! ```text
//! "number"                                  type name
//! {type: "array", elements: S}              every element matches S
//! {type: "array", shape: [S1, {rest: S}]}   tuple with optional rest tail
//! {type: "object", shape: {k: S}}           record; `{rest: S}` collects the rest
//! {type: "object", keys: S, values: S}      mapping constraints
//! {type: T, where: f}                       side condition
//! {oneOf: [v1, v2]}                         literal alternatives
//! {either: [S1, S2]}                        union
//! {bind: S, as: "name"}                     bind the matched value
//! {default: v, of: S}                       shape entry used when absent
//! ```
//!
//! `{rest: S}` may carry an `as` name to bind the collected tail.
//! Names appearing inside `elements`, `keys`, `values` and rest schemas
//! are not bound.

use std::collections::HashSet;

use kenpali_common::{Bindings, ErrorValue, Map, Runtime, Value};

use crate::errors::{
    bad_element, bad_key, bad_property, bad_value_condition, bad_value_errors, bad_value_options,
    invalid_schema, missing_element, missing_property, wrong_type,
};

pub(crate) struct Binder<'r> {
    pub(crate) runtime: &'r mut dyn Runtime,
}

impl Binder<'_> {
    pub(crate) fn bind_into(
        &mut self,
        value: &Value,
        schema: &Value,
        out: &mut Bindings,
    ) -> Result<(), ErrorValue> {
        let fields = match schema {
            Value::String(type_name) => return check_type(value, type_name, schema),
            Value::Object(fields) => fields,
            _ => return Err(invalid_schema(schema)),
        };

        if let Some(branches) = fields.get("either") {
            return self.bind_either(value, branches, schema, out);
        }
        if let Some(options) = fields.get("oneOf") {
            let Value::Array(list) = options else {
                return Err(invalid_schema(schema));
            };
            return if list.iter().any(|option| option == value) {
                Ok(())
            } else {
                Err(bad_value_options(value, options))
            };
        }
        if let Some(inner) = fields.get("bind") {
            let Some(name) = fields.get("as").and_then(Value::as_str) else {
                return Err(invalid_schema(schema));
            };
            self.bind_into(value, inner, out)?;
            out.insert(name.to_string(), value.clone());
            return Ok(());
        }
        if fields.contains_key("default") {
            let Some(inner) = fields.get("of") else {
                return Err(invalid_schema(schema));
            };
            return self.bind_into(value, inner, out);
        }
        if let Some(Value::String(type_name)) = fields.get("type") {
            return self.bind_typed(value, type_name, fields, schema, out);
        }
        Err(invalid_schema(schema))
    }

    /// Match without keeping any bindings.
    fn check(&mut self, value: &Value, schema: &Value) -> Result<(), ErrorValue> {
        let mut scratch = Bindings::new();
        self.bind_into(value, schema, &mut scratch)
    }

    fn bind_typed(
        &mut self,
        value: &Value,
        type_name: &str,
        fields: &Map,
        schema: &Value,
        out: &mut Bindings,
    ) -> Result<(), ErrorValue> {
        check_type(value, type_name, schema)?;

        if let Some(element_schema) = fields.get("elements") {
            let Value::Array(elements) = value else {
                return Err(wrong_type(value, Value::from("array")));
            };
            for (i, element) in elements.iter().enumerate() {
                self.check(element, element_schema)
                    .map_err(|reason| bad_element(value, i + 1, reason))?;
            }
        }

        match fields.get("shape") {
            None => {}
            Some(Value::Array(shape)) => {
                let Value::Array(elements) = value else {
                    return Err(wrong_type(value, Value::from("array")));
                };
                self.bind_tuple(value, elements, shape, schema, out)?;
            }
            Some(Value::Object(shape)) => {
                let Value::Object(entries) = value else {
                    return Err(wrong_type(value, Value::from("object")));
                };
                self.bind_record(value, entries, shape, schema, out)?;
            }
            Some(_) => return Err(invalid_schema(schema)),
        }

        if fields.contains_key("keys") || fields.contains_key("values") {
            let Value::Object(entries) = value else {
                return Err(wrong_type(value, Value::from("object")));
            };
            if let Some(key_schema) = fields.get("keys") {
                for key in entries.keys() {
                    self.check(&Value::from(key.as_str()), key_schema)
                        .map_err(|reason| bad_key(value, key, reason))?;
                }
            }
            if let Some(value_schema) = fields.get("values") {
                for (key, element) in entries.iter() {
                    self.check(element, value_schema)
                        .map_err(|reason| bad_property(value, key, reason))?;
                }
            }
        }

        if let Some(condition) = fields.get("where") {
            let result = self
                .runtime
                .call(condition, vec![value.clone()], Map::new())?;
            if result != Value::Boolean(true) {
                return Err(bad_value_condition(value, condition));
            }
        }
        Ok(())
    }

    fn bind_tuple(
        &mut self,
        value: &Value,
        elements: &[Value],
        shape: &[Value],
        schema: &Value,
        out: &mut Bindings,
    ) -> Result<(), ErrorValue> {
        let (fixed, rest) = match shape.split_last() {
            Some((last, init)) if is_rest(last) => (init, Some(last)),
            _ => (shape, None),
        };

        for (i, entry) in fixed.iter().enumerate() {
            if is_rest(entry) {
                return Err(invalid_schema(schema));
            }
            let (inner, default) = split_default(entry);
            match (elements.get(i), default) {
                (Some(element), _) => self
                    .bind_into(element, inner, out)
                    .map_err(|reason| bad_element(value, i + 1, reason))?,
                (None, Some(default)) => self
                    .bind_into(default, inner, out)
                    .map_err(|reason| bad_element(value, i + 1, reason))?,
                (None, None) => return Err(missing_element(value, i + 1)),
            }
        }

        if let Some(rest) = rest {
            let tail = elements.get(fixed.len()..).unwrap_or(&[]);
            let element_schema = rest_schema(rest, schema)?;
            for (j, element) in tail.iter().enumerate() {
                self.check(element, element_schema)
                    .map_err(|reason| bad_element(value, fixed.len() + j + 1, reason))?;
            }
            if let Some(name) = rest_name(rest) {
                out.insert(name.to_string(), Value::array(tail.to_vec()));
            }
        }
        Ok(())
    }

    fn bind_record(
        &mut self,
        value: &Value,
        entries: &Map,
        shape: &Map,
        schema: &Value,
        out: &mut Bindings,
    ) -> Result<(), ErrorValue> {
        let mut rest = None;
        for (key, entry) in shape.iter() {
            if is_rest(entry) {
                if rest.is_some() {
                    return Err(invalid_schema(schema));
                }
                rest = Some(entry);
                continue;
            }
            let (inner, default) = split_default(entry);
            match (entries.get(key), default) {
                (Some(property), _) => self
                    .bind_into(property, inner, out)
                    .map_err(|reason| bad_property(value, key, reason))?,
                (None, Some(default)) => self
                    .bind_into(default, inner, out)
                    .map_err(|reason| bad_property(value, key, reason))?,
                (None, None) => return Err(missing_property(value, key)),
            }
        }

        if let Some(rest) = rest {
            let element_schema = rest_schema(rest, schema)?;
            let mut leftover = Map::new();
            for (key, property) in entries.iter() {
                if shape.contains_key(key) {
                    continue;
                }
                self.check(property, element_schema)
                    .map_err(|reason| bad_property(value, key, reason))?;
                leftover.insert(key.clone(), property.clone());
            }
            if let Some(name) = rest_name(rest) {
                out.insert(name.to_string(), Value::object(leftover));
            }
        }
        Ok(())
    }

    fn bind_either(
        &mut self,
        value: &Value,
        branches: &Value,
        schema: &Value,
        out: &mut Bindings,
    ) -> Result<(), ErrorValue> {
        let Value::Array(branches) = branches else {
            return Err(invalid_schema(schema));
        };
        let mut results = Vec::with_capacity(branches.len());
        for branch in branches.iter() {
            let mut bindings = Bindings::new();
            let result = self.bind_into(value, branch, &mut bindings);
            if let Err(error) = &result {
                if error.kind == "invalidSchema" {
                    return result;
                }
            }
            results.push(result.map(|()| bindings));
        }

        if let Some(first) = results.iter().position(Result::is_ok) {
            if let Some(Ok(bindings)) = results.get(first) {
                for (name, bound) in bindings {
                    out.insert(name.clone(), bound.clone());
                }
            }
            for (branch, result) in branches.iter().zip(&results) {
                match result {
                    Ok(bindings) => {
                        for (name, bound) in bindings {
                            if !out.contains_key(name) {
                                out.insert(name.clone(), bound.clone());
                            }
                        }
                    }
                    // Names only this branch declares hold its failure.
                    Err(error) => {
                        for name in bindable_names(branch) {
                            if !out.contains_key(&name) {
                                out.insert(name, Value::error(error.clone()));
                            }
                        }
                    }
                }
            }
            return Ok(());
        }

        let errors: Vec<ErrorValue> = results.into_iter().filter_map(Result::err).collect();
        if !errors.is_empty() && errors.iter().all(|e| e.kind == "wrongType") {
            let mut expected = Vec::new();
            for error in &errors {
                match error.detail("expectedType") {
                    Some(Value::Object(nested)) => match nested.get("either") {
                        Some(Value::Array(types)) => expected.extend(types.iter().cloned()),
                        _ => expected.push(Value::Object(nested.clone())),
                    },
                    Some(other) => expected.push(other.clone()),
                    None => {}
                }
            }
            return Err(wrong_type(
                value,
                Value::object_from([("either", Value::array(expected))]),
            ));
        }
        Err(bad_value_errors(value, errors))
    }
}

fn check_type(value: &Value, type_name: &str, schema: &Value) -> Result<(), ErrorValue> {
    let ok = match type_name {
        "any" => true,
        "sequence" => value.is_sequence(),
        "null" | "boolean" | "number" | "string" | "array" | "object" | "function" | "error"
        | "stream" => value.type_of() == type_name,
        _ => return Err(invalid_schema(schema)),
    };
    if ok {
        Ok(())
    } else {
        Err(wrong_type(value, Value::from(type_name)))
    }
}

fn is_rest(entry: &Value) -> bool {
    entry.as_object().is_some_and(|fields| fields.contains_key("rest"))
}

fn rest_schema<'s>(rest: &'s Value, schema: &Value) -> Result<&'s Value, ErrorValue> {
    rest.get("rest").ok_or_else(|| invalid_schema(schema))
}

fn rest_name(rest: &Value) -> Option<&str> {
    rest.get("as").and_then(Value::as_str)
}

/// Split `{default: v, of: S}` into `(S, Some(v))`.
fn split_default(entry: &Value) -> (&Value, Option<&Value>) {
    match entry.as_object() {
        Some(fields) => match (fields.get("default"), fields.get("of")) {
            (Some(default), Some(inner)) => (inner, Some(default)),
            _ => (entry, None),
        },
        None => (entry, None),
    }
}

/// Every name a successful bind against `schema` produces.
pub fn bindable_names(schema: &Value) -> Vec<String> {
    let mut names = Vec::new();
    let mut seen = HashSet::new();
    collect_names(schema, &mut names, &mut seen);
    names
}

fn collect_names(schema: &Value, names: &mut Vec<String>, seen: &mut HashSet<String>) {
    let Some(fields) = schema.as_object() else {
        return;
    };
    let mut add = |name: &str, names: &mut Vec<String>| {
        if seen.insert(name.to_string()) {
            names.push(name.to_string());
        }
    };

    if let Some(Value::Array(branches)) = fields.get("either") {
        for branch in branches.iter() {
            let mut inner = Vec::new();
            collect_names(branch, &mut inner, &mut HashSet::new());
            for name in inner {
                add(&name, names);
            }
        }
        return;
    }
    if fields.contains_key("oneOf") {
        return;
    }
    if let Some(inner) = fields.get("bind") {
        let mut nested = Vec::new();
        collect_names(inner, &mut nested, &mut HashSet::new());
        for name in nested {
            add(&name, names);
        }
        if let Some(name) = fields.get("as").and_then(Value::as_str) {
            add(name, names);
        }
        return;
    }
    if fields.contains_key("default") {
        if let Some(inner) = fields.get("of") {
            let mut nested = Vec::new();
            collect_names(inner, &mut nested, &mut HashSet::new());
            for name in nested {
                add(&name, names);
            }
        }
        return;
    }

    let entries: Vec<&Value> = match fields.get("shape") {
        Some(Value::Array(shape)) => shape.iter().collect(),
        Some(Value::Object(shape)) => shape.values().collect(),
        _ => Vec::new(),
    };
    for entry in entries {
        if is_rest(entry) {
            if let Some(name) = rest_name(entry) {
                add(name, names);
            }
            continue;
        }
        let mut nested = Vec::new();
        collect_names(split_default(entry).0, &mut nested, &mut HashSet::new());
        for name in nested {
            add(&name, names);
        }
    }
}
