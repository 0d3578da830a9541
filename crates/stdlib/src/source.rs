//! Builtins written in Kenpali itself.
//!
//! These compile into a program only when something in it refers to them.

use kenpali_common::{ArrayElement, Expr};

fn call(name: &str, args: Vec<Expr>) -> Expr {
    Expr::call(Expr::name(name), args)
}

fn n(x: i32) -> Expr {
    Expr::literal(x)
}

fn x() -> Expr {
    Expr::name("x")
}

fn a() -> Expr {
    Expr::name("a")
}

fn b() -> Expr {
    Expr::name("b")
}

/// Every source builtin, in definition order.
pub fn definitions() -> Vec<(&'static str, Expr)> {
    vec![
        ("increment", Expr::given(&["x"], call("plus", vec![x(), n(1)]))),
        ("decrement", Expr::given(&["x"], call("minus", vec![x(), n(1)]))),
        ("isMoreThan", Expr::given(&["a", "b"], call("isLessThan", vec![b(), a()]))),
        (
            "isAtMost",
            Expr::given(&["a", "b"], call("not", vec![call("isLessThan", vec![b(), a()])])),
        ),
        (
            "isAtLeast",
            Expr::given(&["a", "b"], call("not", vec![call("isLessThan", vec![a(), b()])])),
        ),
        (
            "isNotEqual",
            Expr::given(&["a", "b"], call("not", vec![call("equals", vec![a(), b()])])),
        ),
        (
            "absolute",
            Expr::given(
                &["x"],
                Expr::call_named(
                    Expr::name("if"),
                    vec![call("isLessThan", vec![x(), n(0)])],
                    vec![
                        ("then", Expr::given(&[], call("negative", vec![x()]))),
                        ("else", Expr::given(&[], x())),
                    ],
                ),
            ),
        ),
        (
            "sum",
            Expr::given(
                &["numbers"],
                Expr::Calling {
                    callee: Box::new(Expr::name("plus")),
                    args: vec![ArrayElement::Spread(Expr::name("numbers"))],
                    named_args: Vec::new(),
                },
            ),
        ),
        (
            "count",
            Expr::given(
                &["sequence", "condition"],
                call(
                    "length",
                    vec![call("filter", vec![Expr::name("sequence"), Expr::name("condition")])],
                ),
            ),
        ),
    ]
}
