//! Expression trees consumed by the compiler.
//!
//! External parsers produce these either directly or in the data form read
//! by [`Expr::from_value`](crate::reader).

use crate::value::Value;

#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    Literal(Value),
    Array(Vec<ArrayElement>),
    /// Entries with computed keys; a key must evaluate to a string.
    Object(Vec<ObjectElement>),
    /// A name reference, optionally qualified by a module.
    Name { name: String, from: Option<String> },
    Defining {
        definitions: Vec<(Pattern, Expr)>,
        result: Box<Expr>,
    },
    /// A function literal.
    Given {
        params: Vec<ArrayPatternElement>,
        named_params: Vec<ObjectPatternElement>,
        result: Box<Expr>,
    },
    Calling {
        callee: Box<Expr>,
        args: Vec<ArrayElement>,
        named_args: Vec<ObjectElement>,
    },
    Indexing { collection: Box<Expr>, at: Box<Expr> },
    /// Evaluates to the raised error instead of propagating it.
    Catching(Box<Expr>),
}

#[derive(Debug, Clone, PartialEq)]
pub enum ArrayElement {
    Item(Expr),
    Spread(Expr),
}

#[derive(Debug, Clone, PartialEq)]
pub enum ObjectElement {
    Entry(Expr, Expr),
    Spread(Expr),
}

/// A destructuring target.
#[derive(Debug, Clone, PartialEq)]
pub enum Pattern {
    Name(String),
    Array(Vec<ArrayPatternElement>),
    Object(Vec<ObjectPatternElement>),
    /// Validate the value against `schema` before destructuring it.
    Checked { pattern: Box<Pattern>, schema: Value },
}

#[derive(Debug, Clone, PartialEq)]
pub enum ArrayPatternElement {
    Required(Pattern),
    Optional(Pattern, Expr),
    Rest(Pattern),
}

#[derive(Debug, Clone, PartialEq)]
pub enum ObjectPatternElement {
    Property {
        key: String,
        pattern: Pattern,
        default: Option<Expr>,
    },
    Rest(Pattern),
}

impl Pattern {
    /// Every name this pattern binds, in declaration order.
    pub fn names(&self) -> Vec<&str> {
        let mut out = Vec::new();
        self.collect_names(&mut out);
        out
    }

    pub(crate) fn collect_names<'a>(&'a self, out: &mut Vec<&'a str>) {
        match self {
            Pattern::Name(name) => out.push(name),
            Pattern::Array(elements) => {
                for element in elements {
                    element.pattern().collect_names(out);
                }
            }
            Pattern::Object(entries) => {
                for entry in entries {
                    entry.pattern().collect_names(out);
                }
            }
            Pattern::Checked { pattern, .. } => pattern.collect_names(out),
        }
    }

    /// A short name for error messages: the bound name for simple
    /// patterns, otherwise `None`.
    pub fn label(&self) -> Option<&str> {
        match self {
            Pattern::Name(name) => Some(name),
            Pattern::Checked { pattern, .. } => pattern.label(),
            Pattern::Array(_) | Pattern::Object(_) => None,
        }
    }
}

impl ArrayPatternElement {
    pub fn pattern(&self) -> &Pattern {
        match self {
            ArrayPatternElement::Required(p)
            | ArrayPatternElement::Optional(p, _)
            | ArrayPatternElement::Rest(p) => p,
        }
    }
}

impl ObjectPatternElement {
    pub fn pattern(&self) -> &Pattern {
        match self {
            ObjectPatternElement::Property { pattern, .. } => pattern,
            ObjectPatternElement::Rest(p) => p,
        }
    }
}

// Construction helpers, mostly for hosts and tests building trees by hand.
impl Expr {
    pub fn literal(value: impl Into<Value>) -> Self {
        Expr::Literal(value.into())
    }

    pub fn name(name: &str) -> Self {
        Expr::Name {
            name: name.to_string(),
            from: None,
        }
    }

    pub fn name_from(name: &str, module: &str) -> Self {
        Expr::Name {
            name: name.to_string(),
            from: Some(module.to_string()),
        }
    }

    pub fn array(elements: Vec<Expr>) -> Self {
        Expr::Array(elements.into_iter().map(ArrayElement::Item).collect())
    }

    /// Object literal with constant keys.
    pub fn object(entries: Vec<(&str, Expr)>) -> Self {
        Expr::Object(
            entries
                .into_iter()
                .map(|(k, v)| ObjectElement::Entry(Expr::literal(k), v))
                .collect(),
        )
    }

    /// Positional-only call.
    pub fn call(callee: Expr, args: Vec<Expr>) -> Self {
        Expr::Calling {
            callee: Box::new(callee),
            args: args.into_iter().map(ArrayElement::Item).collect(),
            named_args: Vec::new(),
        }
    }

    pub fn call_named(callee: Expr, args: Vec<Expr>, named: Vec<(&str, Expr)>) -> Self {
        Expr::Calling {
            callee: Box::new(callee),
            args: args.into_iter().map(ArrayElement::Item).collect(),
            named_args: named
                .into_iter()
                .map(|(k, v)| ObjectElement::Entry(Expr::literal(k), v))
                .collect(),
        }
    }

    /// Function with plain positional parameter names.
    pub fn given(params: &[&str], result: Expr) -> Self {
        Expr::Given {
            params: params
                .iter()
                .map(|p| ArrayPatternElement::Required(Pattern::Name(p.to_string())))
                .collect(),
            named_params: Vec::new(),
            result: Box::new(result),
        }
    }

    /// A defining block whose definitions all bind plain names.
    pub fn defining(definitions: Vec<(&str, Expr)>, result: Expr) -> Self {
        Expr::Defining {
            definitions: definitions
                .into_iter()
                .map(|(name, value)| (Pattern::Name(name.to_string()), value))
                .collect(),
            result: Box::new(result),
        }
    }

    pub fn index(collection: Expr, at: Expr) -> Self {
        Expr::Indexing {
            collection: Box::new(collection),
            at: Box::new(at),
        }
    }

    pub fn catching(expr: Expr) -> Self {
        Expr::Catching(Box::new(expr))
    }
}
