//! Reachability over library definitions.
//!
//! Only source definitions reachable from the program's free names are
//! compiled into it.

use std::collections::HashSet;

use indexmap::IndexSet;
use kenpali_common::{
    ArrayElement, ArrayPatternElement, Definition, Expr, Library, ObjectElement, ObjectPatternElement,
    Pattern,
};
use tracing::debug;

/// Unqualified names `expr` uses without binding them, in first-use order.
pub(crate) fn free_names(expr: &Expr) -> IndexSet<String> {
    let mut visitor = FreeNames::default();
    visitor.expr(expr);
    visitor.free
}

#[derive(Default)]
struct FreeNames {
    bound: Vec<HashSet<String>>,
    free: IndexSet<String>,
}

impl FreeNames {
    fn is_bound(&self, name: &str) -> bool {
        self.bound.iter().any(|scope| scope.contains(name))
    }

    fn bind<'p>(&mut self, patterns: impl IntoIterator<Item = &'p Pattern>) {
        let names = patterns
            .into_iter()
            .flat_map(|p| p.names())
            .map(str::to_string)
            .collect();
        self.bound.push(names);
    }

    fn expr(&mut self, expr: &Expr) {
        match expr {
            Expr::Literal(_) => {}
            Expr::Name { name, from: None } => {
                if !self.is_bound(name) {
                    self.free.insert(name.clone());
                }
            }
            Expr::Name { .. } => {}
            Expr::Array(elements) => {
                for element in elements {
                    match element {
                        ArrayElement::Item(e) | ArrayElement::Spread(e) => self.expr(e),
                    }
                }
            }
            Expr::Object(entries) => self.object(entries),
            Expr::Defining { definitions, result } => {
                self.bind(definitions.iter().map(|(p, _)| p));
                for (pattern, value) in definitions {
                    self.pattern(pattern);
                    self.expr(value);
                }
                self.expr(result);
                self.bound.pop();
            }
            Expr::Given {
                params,
                named_params,
                result,
            } => {
                self.bind(
                    params
                        .iter()
                        .map(ArrayPatternElement::pattern)
                        .chain(named_params.iter().map(ObjectPatternElement::pattern)),
                );
                for param in params {
                    self.array_element(param);
                }
                for param in named_params {
                    self.object_element(param);
                }
                self.expr(result);
                self.bound.pop();
            }
            Expr::Calling {
                callee,
                args,
                named_args,
            } => {
                self.expr(callee);
                for arg in args {
                    match arg {
                        ArrayElement::Item(e) | ArrayElement::Spread(e) => self.expr(e),
                    }
                }
                self.object(named_args);
            }
            Expr::Indexing { collection, at } => {
                self.expr(collection);
                self.expr(at);
            }
            Expr::Catching(inner) => self.expr(inner),
        }
    }

    fn object(&mut self, entries: &[ObjectElement]) {
        for entry in entries {
            match entry {
                ObjectElement::Entry(key, value) => {
                    self.expr(key);
                    self.expr(value);
                }
                ObjectElement::Spread(e) => self.expr(e),
            }
        }
    }

    /// Default expressions nested in a pattern.
    fn pattern(&mut self, pattern: &Pattern) {
        match pattern {
            Pattern::Name(_) => {}
            Pattern::Array(elements) => {
                for element in elements {
                    self.array_element(element);
                }
            }
            Pattern::Object(entries) => {
                for entry in entries {
                    self.object_element(entry);
                }
            }
            Pattern::Checked { pattern, .. } => self.pattern(pattern),
        }
    }

    fn array_element(&mut self, element: &ArrayPatternElement) {
        if let ArrayPatternElement::Optional(_, default) = element {
            self.expr(default);
        }
        self.pattern(element.pattern());
    }

    fn object_element(&mut self, entry: &ObjectPatternElement) {
        if let ObjectPatternElement::Property {
            default: Some(default),
            ..
        } = entry
        {
            self.expr(default);
        }
        self.pattern(entry.pattern());
    }
}

/// The source definitions transitively reachable from `roots`, in library
/// order.
pub(crate) fn reachable<'l>(library: &'l Library, roots: IndexSet<String>) -> Vec<(&'l str, &'l Expr)> {
    let mut seen: HashSet<String> = HashSet::new();
    let mut pending: Vec<String> = roots.into_iter().collect();
    while let Some(name) = pending.pop() {
        if seen.contains(&name) {
            continue;
        }
        if let Some(Definition::Source(expr)) = library.get(&name) {
            pending.extend(free_names(expr));
            seen.insert(name);
        }
    }

    let retained: Vec<(&str, &Expr)> = library
        .iter()
        .filter_map(|(name, definition)| match definition {
            Definition::Source(expr) if seen.contains(name) => Some((name, expr)),
            _ => None,
        })
        .collect();
    debug!(
        retained = retained.len(),
        available = library.len(),
        "library reachability"
    );
    retained
}
