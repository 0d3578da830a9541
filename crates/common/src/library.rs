//! Named definitions available to every compiled program.

use indexmap::IndexMap;

use crate::ast::Expr;
use crate::value::Value;

/// One library entry.
#[derive(Debug, Clone, PartialEq)]
pub enum Definition {
    /// Compiled into the program only when reachable from it.
    Source(Expr),
    /// A host value loaded directly (natives become platform values).
    Value(Value),
}

/// An ordered table of library definitions.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Library {
    definitions: IndexMap<String, Definition>,
}

impl Library {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn define_source(&mut self, name: &str, expr: Expr) -> &mut Self {
        self.definitions
            .insert(name.to_string(), Definition::Source(expr));
        self
    }

    pub fn define_value(&mut self, name: &str, value: Value) -> &mut Self {
        self.definitions
            .insert(name.to_string(), Definition::Value(value));
        self
    }

    pub fn get(&self, name: &str) -> Option<&Definition> {
        self.definitions.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.definitions.contains_key(name)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Definition)> {
        self.definitions.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn len(&self) -> usize {
        self.definitions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.definitions.is_empty()
    }
}
