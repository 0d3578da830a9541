//! Reading expression trees from their data form.
//!
//! Parsers outside this workspace hand over programs as plain values:
//!
//! ```text
//! {literal: 42}
//! {name: "plus", from: "module"}
//! {array: [e, {spread: e}]}
//! {object: [[keyExpr, valueExpr], {spread: e}]}
//! {defining: [[pattern, e], ...], result: e}
//! {given: {params: [...], namedParams: [...]}, result: e}
//! {calling: e, args: [...], namedArgs: [...]}
//! {indexing: e, at: e}
//! {catching: e}
//! ```

use crate::ast::{ArrayElement, ArrayPatternElement, Expr, ObjectElement, ObjectPatternElement, Pattern};
use crate::error::AstError;
use crate::value::{Map, Value};

impl Expr {
    /// Read an expression from its data form.
    pub fn from_value(value: &Value) -> Result<Expr, AstError> {
        let node = value
            .as_object()
            .ok_or_else(|| AstError::NotAnExpression(value.to_string()))?;

        if let Some(literal) = node.get("literal") {
            return Ok(Expr::Literal(literal.clone()));
        }
        if let Some(name) = node.get("name") {
            let name = name
                .as_str()
                .ok_or_else(|| AstError::NotAnExpression(value.to_string()))?;
            let from = match node.get("from") {
                None => None,
                Some(Value::String(module)) => Some(module.to_string()),
                Some(_) => return Err(AstError::NotAnExpression(value.to_string())),
            };
            return Ok(Expr::Name {
                name: name.to_string(),
                from,
            });
        }
        if let Some(elements) = node.get("array") {
            return Ok(Expr::Array(read_array_elements(elements)?));
        }
        if let Some(entries) = node.get("object") {
            return Ok(Expr::Object(read_object_elements(entries)?));
        }
        if let Some(definitions) = node.get("defining") {
            let items = list(definitions, value)?;
            let mut out = Vec::with_capacity(items.len());
            for item in items {
                match item.as_array() {
                    Some([pattern, expr]) => out.push((read_pattern(pattern)?, Expr::from_value(expr)?)),
                    _ => return Err(AstError::NotAnExpression(item.to_string())),
                }
            }
            return Ok(Expr::Defining {
                definitions: out,
                result: Box::new(read_result(node, value)?),
            });
        }
        if let Some(given) = node.get("given") {
            let signature = given
                .as_object()
                .ok_or_else(|| AstError::NotAnExpression(value.to_string()))?;
            let params = match signature.get("params") {
                Some(params) => read_array_pattern(params)?,
                None => Vec::new(),
            };
            let named_params = match signature.get("namedParams") {
                Some(params) => read_object_pattern(params)?,
                None => Vec::new(),
            };
            return Ok(Expr::Given {
                params,
                named_params,
                result: Box::new(read_result(node, value)?),
            });
        }
        if let Some(callee) = node.get("calling") {
            let args = match node.get("args") {
                Some(args) => read_array_elements(args)?,
                None => Vec::new(),
            };
            let named_args = match node.get("namedArgs") {
                Some(named) => read_object_elements(named)?,
                None => Vec::new(),
            };
            return Ok(Expr::Calling {
                callee: Box::new(Expr::from_value(callee)?),
                args,
                named_args,
            });
        }
        if let Some(collection) = node.get("indexing") {
            let at = node
                .get("at")
                .ok_or_else(|| AstError::NotAnExpression(value.to_string()))?;
            return Ok(Expr::Indexing {
                collection: Box::new(Expr::from_value(collection)?),
                at: Box::new(Expr::from_value(at)?),
            });
        }
        if let Some(inner) = node.get("catching") {
            return Ok(Expr::Catching(Box::new(Expr::from_value(inner)?)));
        }
        Err(AstError::NotAnExpression(value.to_string()))
    }
}

fn list<'a>(value: &'a Value, whole: &Value) -> Result<&'a [Value], AstError> {
    value
        .as_array()
        .ok_or_else(|| AstError::NotAnExpression(whole.to_string()))
}

fn read_result(node: &Map, whole: &Value) -> Result<Expr, AstError> {
    let result = node
        .get("result")
        .ok_or_else(|| AstError::NotAnExpression(whole.to_string()))?;
    Expr::from_value(result)
}

fn read_array_elements(value: &Value) -> Result<Vec<ArrayElement>, AstError> {
    list(value, value)?
        .iter()
        .map(|element| match element.get("spread") {
            Some(spread) => Ok(ArrayElement::Spread(Expr::from_value(spread)?)),
            None => Ok(ArrayElement::Item(Expr::from_value(element)?)),
        })
        .collect()
}

fn read_object_elements(value: &Value) -> Result<Vec<ObjectElement>, AstError> {
    list(value, value)?
        .iter()
        .map(|entry| {
            if let Some(spread) = entry.get("spread") {
                return Ok(ObjectElement::Spread(Expr::from_value(spread)?));
            }
            match entry.as_array() {
                Some([key, value]) => Ok(ObjectElement::Entry(
                    Expr::from_value(key)?,
                    Expr::from_value(value)?,
                )),
                _ => Err(AstError::NotAnExpression(entry.to_string())),
            }
        })
        .collect()
}

/// Read a destructuring pattern.
pub fn read_pattern(value: &Value) -> Result<Pattern, AstError> {
    match value {
        Value::String(name) => Ok(Pattern::Name(name.to_string())),
        Value::Object(node) => {
            if let Some(elements) = node.get("arrayPattern") {
                Ok(Pattern::Array(read_array_pattern(elements)?))
            } else if let Some(entries) = node.get("objectPattern") {
                Ok(Pattern::Object(read_object_pattern(entries)?))
            } else if let Some(inner) = node.get("checked") {
                let schema = node
                    .get("schema")
                    .ok_or_else(|| AstError::NotAPattern(value.to_string()))?;
                Ok(Pattern::Checked {
                    pattern: Box::new(read_pattern(inner)?),
                    schema: schema.clone(),
                })
            } else {
                Err(AstError::NotAPattern(value.to_string()))
            }
        }
        _ => Err(AstError::NotAPattern(value.to_string())),
    }
}

fn read_array_pattern(value: &Value) -> Result<Vec<ArrayPatternElement>, AstError> {
    let elements = value
        .as_array()
        .ok_or_else(|| AstError::NotAPattern(value.to_string()))?;
    elements
        .iter()
        .map(|element| {
            if let Some(rest) = element.get("rest") {
                return Ok(ArrayPatternElement::Rest(read_pattern(rest)?));
            }
            if let Some(default) = element.get("defaultValue") {
                let target = element
                    .get("name")
                    .ok_or_else(|| AstError::NotAPattern(element.to_string()))?;
                return Ok(ArrayPatternElement::Optional(
                    read_pattern(target)?,
                    Expr::from_value(default)?,
                ));
            }
            Ok(ArrayPatternElement::Required(read_pattern(element)?))
        })
        .collect()
}

fn read_object_pattern(value: &Value) -> Result<Vec<ObjectPatternElement>, AstError> {
    let entries = value
        .as_array()
        .ok_or_else(|| AstError::NotAPattern(value.to_string()))?;
    entries
        .iter()
        .map(|entry| match entry {
            Value::String(key) => Ok(ObjectPatternElement::Property {
                key: key.to_string(),
                pattern: Pattern::Name(key.to_string()),
                default: None,
            }),
            Value::Object(node) => {
                if let Some(rest) = node.get("rest") {
                    return Ok(ObjectPatternElement::Rest(read_pattern(rest)?));
                }
                let key = node
                    .get("key")
                    .and_then(Value::as_str)
                    .ok_or_else(|| AstError::NotAPattern(entry.to_string()))?;
                let pattern = match node.get("name") {
                    Some(target) => read_pattern(target)?,
                    None => Pattern::Name(key.to_string()),
                };
                let default = match node.get("defaultValue") {
                    Some(default) => Some(Expr::from_value(default)?),
                    None => None,
                };
                Ok(ObjectPatternElement::Property {
                    key: key.to_string(),
                    pattern,
                    default,
                })
            }
            _ => Err(AstError::NotAPattern(entry.to_string())),
        })
        .collect()
}
