//! Integration tests for the Kenpali VM.
//!
//! Programs are built as expression trees, compiled against the standard
//! library and run end to end.

use std::time::{Duration, Instant};

use kenpali_common::{
    ArrayPatternElement, ErrorValue, Expr, Instruction, Map, ObjectPatternElement, Opcode, Pattern, Program,
    Value,
};
use kenpali_compiler::{compile, CompileOptions};
use kenpali_stdlib::StandardPlatform;
use kenpali_vm::{call, run, RunOptions, RuntimeError, VM};
use proptest::prelude::*;

// ============================================================
// Helper functions
// ============================================================

fn call_fn(name: &str, args: Vec<Expr>) -> Expr {
    Expr::call(Expr::name(name), args)
}

fn lit(value: impl Into<Value>) -> Expr {
    Expr::literal(value)
}

fn program(expr: &Expr) -> Program {
    compile(expr, &CompileOptions::default()).unwrap()
}

fn eval(expr: &Expr) -> Value {
    run(&program(expr), &RunOptions::default()).unwrap()
}

/// Run and expect an escaping guest error.
fn eval_err(expr: &Expr) -> ErrorValue {
    match run(&program(expr), &RunOptions::default()) {
        Err(RuntimeError::Uncaught(error)) => error,
        other => panic!("expected an uncaught error, got {other:?}"),
    }
}

/// Run `expr` inside `catching` and expect the result to be an error.
fn caught(expr: Expr) -> ErrorValue {
    match eval(&Expr::catching(expr)) {
        Value::Error(error) => (*error).clone(),
        other => panic!("expected an error value, got {other}"),
    }
}

fn name(n: &str) -> Pattern {
    Pattern::Name(n.to_string())
}

/// Hand-assembled program with a single `$main` function.
fn assembled(instrs: &[Instruction], constants: Vec<Value>) -> Program {
    let mut code = Vec::new();
    for instr in instrs {
        instr.encode_into(&mut code);
    }
    Program {
        diagnostics: vec![None; code.len()],
        code,
        constants,
        platform_values: Vec::new(),
        functions: vec![kenpali_common::FunctionEntry {
            name: "$main".to_string(),
            offset: 0,
        }],
    }
}

// ============================================================
// End-to-end scenarios
// ============================================================

#[test]
fn plus_adds() {
    assert_eq!(eval(&call_fn("plus", vec![lit(1), lit(2)])), Value::from(3));
}

#[test]
fn defined_function_doubles() {
    let expr = Expr::defining(
        vec![("f", Expr::given(&["x"], call_fn("times", vec![Expr::name("x"), lit(2)])))],
        call_fn("f", vec![lit(21)]),
    );
    assert_eq!(eval(&expr), Value::from(42));
}

#[test]
fn closure_outlives_two_scopes() {
    // call(call(defining x = 10 in () => () => x))
    let maker = Expr::defining(
        vec![("x", lit(10))],
        Expr::given(&[], Expr::given(&[], Expr::name("x"))),
    );
    let expr = Expr::call(Expr::call(maker, vec![]), vec![]);
    assert_eq!(eval(&expr), Value::from(10));
}

#[test]
fn closure_sees_value_at_scope_exit() {
    // The closure is created before `y` is assigned but read after.
    let expr = Expr::call(
        Expr::defining(
            vec![("f", Expr::given(&[], Expr::name("y"))), ("y", lit(7))],
            Expr::name("f"),
        ),
        vec![],
    );
    assert_eq!(eval(&expr), Value::from(7));
}

#[test]
fn binder_reports_wrong_type() {
    let error = caught(call_fn("validate", vec![lit("foo"), lit("number")]));
    assert_eq!(error.kind, "wrongType");
    assert_eq!(error.detail("expectedType"), Some(&Value::from("number")));
}

#[test]
fn binder_reports_missing_tuple_element() {
    let schema = Value::object_from([
        ("type", Value::from("array")),
        ("shape", Value::array(vec![Value::from("number"), Value::from("number")])),
    ]);
    let error = caught(call_fn(
        "validate",
        vec![Expr::array(vec![lit(42)]), Expr::literal(schema)],
    ));
    assert_eq!(error.kind, "missingElement");
    assert_eq!(error.detail("index"), Some(&Value::from(2)));
}

#[test]
fn division_by_zero_is_caught_as_a_value() {
    let error = caught(call_fn("dividedBy", vec![lit(1), lit(0)]));
    assert_eq!(error.kind, "divisionByZero");
    assert_eq!(error.detail("dividend"), Some(&Value::from(1)));
}

#[test]
fn uncaught_errors_reach_the_host() {
    let error = eval_err(&call_fn("dividedBy", vec![lit(1), lit(0)]));
    assert_eq!(error.kind, "divisionByZero");
    assert!(error.trace.is_empty());
}

// ============================================================
// Library definitions
// ============================================================

#[test]
fn source_definitions_run() {
    assert_eq!(eval(&call_fn("increment", vec![lit(4)])), Value::from(5));
    assert_eq!(eval(&call_fn("absolute", vec![lit(-3)])), Value::from(3));
    assert_eq!(
        eval(&call_fn("isAtMost", vec![lit(2), lit(2)])),
        Value::Boolean(true)
    );
    let numbers = Expr::array(vec![lit(1), lit(2), lit(3)]);
    assert_eq!(eval(&call_fn("sum", vec![numbers])), Value::from(6));
}

#[test]
fn natives_call_back_into_closures() {
    let double = Expr::given(&["x"], call_fn("times", vec![Expr::name("x"), lit(2)]));
    let expr = call_fn("map", vec![Expr::array(vec![lit(1), lit(2)]), double]);
    assert_eq!(eval(&expr), Value::array(vec![Value::from(2), Value::from(4)]));
}

#[test]
fn streams_are_indexed_lazily() {
    let naturals = call_fn("build", vec![lit(1), Expr::name("increment")]);
    assert_eq!(eval(&Expr::index(naturals, lit(5))), Value::from(5));
}

#[test]
fn count_filters_a_stream_prefix() {
    let evens = Expr::given(&["n"], call_fn("equals", vec![Expr::name("n"), lit(2)]));
    let prefix = call_fn(
        "keepFirst",
        vec![call_fn("build", vec![lit(1), Expr::name("increment")]), lit(4)],
    );
    assert_eq!(eval(&call_fn("count", vec![prefix, evens])), Value::from(1));
}

#[test]
fn host_names_are_visible() {
    let options = CompileOptions::default().with_name("answer", 41);
    let program = compile(&call_fn("increment", vec![Expr::name("answer")]), &options).unwrap();
    assert_eq!(run(&program, &RunOptions::default()).unwrap(), Value::from(42));
}

// ============================================================
// Recovery protocol
// ============================================================

#[test]
fn trace_names_each_unwound_function() {
    let expr = Expr::defining(
        vec![
            ("inner", Expr::given(&[], call_fn("dividedBy", vec![lit(1), lit(0)]))),
            ("outer", Expr::given(&[], call_fn("inner", vec![]))),
        ],
        Expr::catching(call_fn("outer", vec![])),
    );
    let Value::Error(error) = eval(&expr) else {
        panic!("expected an error value");
    };
    assert_eq!(error.trace, vec!["inner".to_string(), "outer".to_string()]);
}

#[test]
fn innermost_catch_wins() {
    // catching([catching(error("a")), error("b")])
    let inner = Expr::catching(call_fn("error", vec![lit("a")]));
    let expr = Expr::catching(Expr::array(vec![inner, call_fn("error", vec![lit("b")])]));
    let Value::Error(error) = eval(&expr) else {
        panic!("expected an error value");
    };
    assert_eq!(error.kind, "b");
}

#[test]
fn successful_catch_returns_the_value() {
    let expr = Expr::array(vec![
        Expr::catching(lit(1)),
        Expr::catching(call_fn("error", vec![lit("x")])),
        lit(3),
    ]);
    let Value::Array(elements) = eval(&expr) else {
        panic!("expected an array");
    };
    assert_eq!(elements[0], Value::from(1));
    assert!(elements[1].is_error());
    assert_eq!(elements[2], Value::from(3));
}

#[test]
fn errors_raised_in_callbacks_unwind_through_natives() {
    let failing = Expr::given(&["x"], call_fn("error", vec![lit("boom")]));
    let expr = call_fn("map", vec![Expr::array(vec![lit(1)]), failing]);
    let error = caught(expr);
    assert_eq!(error.kind, "boom");
    assert_eq!(error.trace, vec!["<anonymous>".to_string()]);
}

#[test]
fn calling_a_non_function() {
    let error = caught(Expr::call(lit(3), vec![]));
    assert_eq!(error.kind, "notCallable");
    assert_eq!(error.detail("value"), Some(&Value::from(3)));
}

// ============================================================
// Resource limits
// ============================================================

fn endless() -> Expr {
    call_fn(
        "length",
        vec![call_fn("build", vec![lit(1), Expr::name("increment")])],
    )
}

#[test]
fn step_limit_stops_endless_streams() {
    let program = program(&endless());
    let mut vm = VM::new(&program, &RunOptions::default().with_step_limit(1000));
    let error = vm.run().unwrap_err();
    assert_eq!(error.uncaught().map(|e| e.kind.as_str()), Some("stepLimitExceeded"));
    assert!(vm.steps() <= 1001, "ran {} steps", vm.steps());
}

#[test]
fn step_limit_cannot_be_caught() {
    let program = program(&Expr::catching(endless()));
    let error = run(&program, &RunOptions::default().with_step_limit(1000)).unwrap_err();
    assert_eq!(error.uncaught().map(|e| e.kind.as_str()), Some("stepLimitExceeded"));
}

#[test]
fn time_limit_cannot_be_caught() {
    let program = program(&Expr::catching(endless()));
    let started = Instant::now();
    let error = run(&program, &RunOptions::default().with_time_limit_seconds(0.1)).unwrap_err();
    assert_eq!(error.uncaught().map(|e| e.kind.as_str()), Some("timeLimitExceeded"));
    assert!(started.elapsed() < Duration::from_secs(5));
}

#[test]
fn limits_are_not_hit_by_short_programs() {
    let program = program(&call_fn("plus", vec![lit(1), lit(2)]));
    let options = RunOptions::default().with_step_limit(1000).with_time_limit_seconds(10.0);
    assert_eq!(run(&program, &options).unwrap(), Value::from(3));
}

/// `f(n)` sums `n` down to 0, recursing through the branches of `if` so that
/// every level is a native callback.
fn sum_through_if(n: f64) -> Expr {
    let n_ref = || Expr::name("n");
    let body = Expr::call_named(
        Expr::name("if"),
        vec![call_fn("isLessThan", vec![n_ref(), lit(1)])],
        vec![
            ("then", Expr::given(&[], lit(0))),
            (
                "else",
                Expr::given(
                    &[],
                    call_fn(
                        "plus",
                        vec![n_ref(), call_fn("f", vec![call_fn("minus", vec![n_ref(), lit(1)])])],
                    ),
                ),
            ),
        ],
    );
    Expr::defining(vec![("f", Expr::given(&["n"], body))], call_fn("f", vec![lit(n)]))
}

/// Run `f` on a thread with room for the default number of nested loops.
/// Values hold `Rc`s, so results cross back as plain data.
fn with_large_stack<T: Send + 'static>(f: impl FnOnce() -> T + Send + 'static) -> T {
    std::thread::Builder::new()
        .stack_size(256 * 1024 * 1024)
        .spawn(f)
        .unwrap()
        .join()
        .unwrap()
}

#[test]
fn deep_callback_recursion_raises_call_depth_exceeded() {
    let (kind, limit) = with_large_stack(|| {
        let error = eval_err(&sum_through_if(100_000.0));
        (error.kind.clone(), error.detail("callDepthLimit").and_then(Value::as_number))
    });
    assert_eq!(kind, "callDepthExceeded");
    assert_eq!(limit, Some(128.0));
}

#[test]
fn call_depth_exceeded_can_be_caught() {
    let kind = with_large_stack(|| caught(sum_through_if(100_000.0)).kind);
    assert_eq!(kind, "callDepthExceeded");
}

#[test]
fn callback_recursion_within_the_limit_completes() {
    let result = with_large_stack(|| eval(&sum_through_if(50.0)).as_number());
    assert_eq!(result, Some(1275.0));
}

#[test]
fn call_depth_limit_is_configurable() {
    let options = RunOptions::default().with_call_depth_limit(10);
    let error = run(&program(&sum_through_if(20.0)), &options).unwrap_err();
    assert_eq!(error.uncaught().map(|e| e.kind.as_str()), Some("callDepthExceeded"));
    assert_eq!(run(&program(&sum_through_if(5.0)), &options).unwrap(), Value::from(15));
}

#[test]
fn closure_calls_do_not_count_toward_call_depth() {
    let expr = Expr::defining(
        vec![
            ("g", Expr::given(&["x"], call_fn("times", vec![Expr::name("x"), lit(2)]))),
            ("f", Expr::given(&["x"], call_fn("g", vec![Expr::name("x")]))),
        ],
        call_fn("f", vec![lit(21)]),
    );
    let options = RunOptions::default().with_call_depth_limit(1);
    assert_eq!(run(&program(&expr), &options).unwrap(), Value::from(42));
}

#[test]
fn long_forced_streams_are_freed() {
    let prefix = call_fn(
        "keepFirst",
        vec![call_fn("build", vec![lit(1), Expr::name("increment")]), lit(150_000)],
    );
    assert_eq!(eval(&call_fn("length", vec![prefix])), Value::from(150_000));
}

// ============================================================
// Arguments and patterns
// ============================================================

#[test]
fn missing_argument_names_the_parameter() {
    let expr = Expr::call(Expr::given(&["x"], Expr::name("x")), vec![]);
    let error = caught(expr);
    assert_eq!(error.kind, "missingArgument");
    assert_eq!(error.detail("name"), Some(&Value::from("x")));
}

#[test]
fn checked_parameter_reports_wrong_argument_type() {
    let checked = Pattern::Checked {
        pattern: Box::new(name("n")),
        schema: Value::from("number"),
    };
    let function = Expr::Given {
        params: vec![ArrayPatternElement::Required(checked)],
        named_params: Vec::new(),
        result: Box::new(Expr::name("n")),
    };
    let error = caught(Expr::call(function, vec![lit("a")]));
    assert_eq!(error.kind, "wrongArgumentType");
    assert_eq!(error.detail("name"), Some(&Value::from("n")));
    assert_eq!(error.detail("value"), Some(&Value::from("a")));
}

#[test]
fn optional_and_named_parameters_take_defaults() {
    let function = Expr::Given {
        params: vec![ArrayPatternElement::Optional(name("x"), lit(1))],
        named_params: vec![ObjectPatternElement::Property {
            key: "by".to_string(),
            pattern: name("by"),
            default: Some(lit(10)),
        }],
        result: Box::new(call_fn("times", vec![Expr::name("x"), Expr::name("by")])),
    };
    let defaults = Expr::call(function.clone(), vec![]);
    assert_eq!(eval(&defaults), Value::from(10));

    let given = Expr::call_named(function, vec![lit(3)], vec![("by", lit(2))]);
    assert_eq!(eval(&given), Value::from(6));
}

#[test]
fn array_pattern_with_rest() {
    let pattern = Pattern::Array(vec![
        ArrayPatternElement::Required(name("first")),
        ArrayPatternElement::Rest(name("others")),
    ]);
    let expr = Expr::Defining {
        definitions: vec![(pattern, Expr::array(vec![lit(1), lit(2), lit(3)]))],
        result: Box::new(Expr::array(vec![Expr::name("first"), Expr::name("others")])),
    };
    assert_eq!(
        eval(&expr),
        Value::array(vec![
            Value::from(1),
            Value::array(vec![Value::from(2), Value::from(3)]),
        ])
    );
}

#[test]
fn object_pattern_with_rest() {
    let pattern = Pattern::Object(vec![
        ObjectPatternElement::Property {
            key: "a".to_string(),
            pattern: name("a"),
            default: None,
        },
        ObjectPatternElement::Rest(name("others")),
    ]);
    let expr = Expr::Defining {
        definitions: vec![(pattern, Expr::object(vec![("a", lit(1)), ("b", lit(2))]))],
        result: Box::new(Expr::array(vec![Expr::name("a"), Expr::name("others")])),
    };
    assert_eq!(
        eval(&expr),
        Value::array(vec![
            Value::from(1),
            Value::object_from([("b", Value::from(2))]),
        ])
    );
}

#[test]
fn destructuring_errors() {
    let short = Expr::Defining {
        definitions: vec![(
            Pattern::Array(vec![
                ArrayPatternElement::Required(name("a")),
                ArrayPatternElement::Required(name("b")),
            ]),
            Expr::array(vec![lit(1)]),
        )],
        result: Box::new(Expr::name("b")),
    };
    let error = caught(short);
    assert_eq!(error.kind, "missingElement");
    assert_eq!(error.detail("index"), Some(&Value::from(2)));

    let absent = Expr::Defining {
        definitions: vec![(
            Pattern::Object(vec![ObjectPatternElement::Property {
                key: "k".to_string(),
                pattern: name("k"),
                default: None,
            }]),
            Expr::object(vec![]),
        )],
        result: Box::new(Expr::name("k")),
    };
    let error = caught(absent);
    assert_eq!(error.kind, "missingProperty");
    assert_eq!(error.detail("key"), Some(&Value::from("k")));

    let not_array = Expr::Defining {
        definitions: vec![(Pattern::Array(vec![]), lit(5))],
        result: Box::new(lit(0)),
    };
    assert_eq!(caught(not_array).kind, "wrongType");
}

#[test]
fn name_used_before_assignment() {
    let expr = Expr::defining(vec![("a", Expr::name("b")), ("b", lit(1))], Expr::name("a"));
    let error = caught(expr);
    assert_eq!(error.kind, "nameUsedBeforeAssignment");
    assert_eq!(error.detail("name"), Some(&Value::from("b")));
}

// ============================================================
// Arrays, objects and indexing
// ============================================================

#[test]
fn spreads_build_arrays_and_objects() {
    let expr = Expr::Array(vec![
        kenpali_common::ArrayElement::Item(lit(1)),
        kenpali_common::ArrayElement::Spread(Expr::array(vec![lit(2), lit(3)])),
        kenpali_common::ArrayElement::Spread(lit("ab")),
    ]);
    assert_eq!(
        eval(&expr),
        Value::array(vec![
            Value::from(1),
            Value::from(2),
            Value::from(3),
            Value::from("a"),
            Value::from("b"),
        ])
    );

    let object = Expr::Object(vec![
        kenpali_common::ObjectElement::Entry(lit("a"), lit(1)),
        kenpali_common::ObjectElement::Spread(Expr::object(vec![("b", lit(2))])),
    ]);
    assert_eq!(
        eval(&object),
        Value::object_from([("a", Value::from(1)), ("b", Value::from(2))])
    );
}

#[test]
fn computed_keys_must_be_strings() {
    let object = Expr::Object(vec![kenpali_common::ObjectElement::Entry(lit(1), lit(1))]);
    assert_eq!(caught(object).kind, "wrongType");
}

#[test]
fn indexing_sequences() {
    let array = || Expr::array(vec![lit(10), lit(20), lit(30)]);
    assert_eq!(eval(&Expr::index(array(), lit(1))), Value::from(10));
    assert_eq!(eval(&Expr::index(array(), lit(-1))), Value::from(30));
    assert_eq!(eval(&Expr::index(lit("héllo"), lit(2))), Value::from("é"));

    let error = caught(Expr::index(array(), lit(4)));
    assert_eq!(error.kind, "indexOutOfBounds");
    assert_eq!(error.detail("length"), Some(&Value::from(3)));
    assert_eq!(caught(Expr::index(array(), lit(0))).kind, "indexOutOfBounds");
    assert_eq!(caught(Expr::index(array(), lit(1.5))).kind, "wrongType");
}

#[test]
fn indexing_objects_and_errors() {
    let object = Expr::object(vec![("a", lit(1))]);
    assert_eq!(eval(&Expr::index(object.clone(), lit("a"))), Value::from(1));
    assert_eq!(caught(Expr::index(object, lit("b"))).kind, "missingProperty");

    let error = Expr::catching(call_fn("dividedBy", vec![lit(4), lit(0)]));
    assert_eq!(eval(&Expr::index(error.clone(), lit("error"))), Value::from("divisionByZero"));
    assert_eq!(eval(&Expr::index(error, lit("dividend"))), Value::from(4));

    let wrong = caught(Expr::index(lit(true), lit(1)));
    assert_eq!(wrong.kind, "wrongType");
}

// ============================================================
// Host calls
// ============================================================

#[test]
fn host_can_call_returned_closures() {
    let make = Expr::defining(
        vec![("factor", lit(3))],
        Expr::given(&["x"], call_fn("times", vec![Expr::name("x"), Expr::name("factor")])),
    );
    let program = program(&make);
    let options = RunOptions::default();
    let function = run(&program, &options).unwrap();
    assert!(function.is_function());

    let result = call(&program, &function, vec![Value::from(4)], Map::new(), &options).unwrap();
    assert_eq!(result, Value::from(12));

    let error = call(&program, &function, vec![], Map::new(), &options).unwrap_err();
    assert_eq!(error.uncaught().map(|e| e.kind.as_str()), Some("missingArgument"));
}

#[test]
fn host_can_call_natives() {
    let program = program(&lit(0));
    let plus = kenpali_stdlib::builtin("plus").unwrap();
    let result = call(
        &program,
        &plus,
        vec![Value::from(2), Value::from(5)],
        Map::new(),
        &RunOptions::default(),
    )
    .unwrap();
    assert_eq!(result, Value::from(7));
}

// ============================================================
// Host faults
// ============================================================

#[test]
fn invalid_opcode_is_a_fault() {
    let mut program = assembled(&[], Vec::new());
    program.code = vec![0xEE];
    program.diagnostics = vec![None];
    assert_eq!(
        run(&program, &RunOptions::default()),
        Err(RuntimeError::InvalidOpcode { at: 0 })
    );
}

#[test]
fn running_off_the_end_is_a_fault() {
    let program = assembled(&[Instruction::new(Opcode::Value, &[0])], vec![Value::from(1)]);
    assert_eq!(
        run(&program, &RunOptions::default()),
        Err(RuntimeError::UnexpectedEndOfProgram { at: 2 })
    );
}

#[test]
fn stack_underflow_is_a_fault() {
    let program = assembled(&[Instruction::new(Opcode::Return, &[])], Vec::new());
    // The entry frame holds the callee and argument bundles; RETURN pops
    // the named bundle, so underflow needs four pops.
    let program_underflow = assembled(
        &[
            Instruction::new(Opcode::Discard, &[]),
            Instruction::new(Opcode::Discard, &[]),
            Instruction::new(Opcode::Discard, &[]),
            Instruction::new(Opcode::Return, &[]),
        ],
        Vec::new(),
    );
    assert_eq!(
        run(&program, &RunOptions::default()),
        Ok(Value::object(Map::new()))
    );
    assert_eq!(
        run(&program_underflow, &RunOptions::default()),
        Err(RuntimeError::StackUnderflow { at: 3 })
    );
}

#[test]
fn constant_out_of_range_is_a_fault() {
    let program = assembled(
        &[
            Instruction::new(Opcode::Value, &[4]),
            Instruction::new(Opcode::Return, &[]),
        ],
        Vec::new(),
    );
    assert_eq!(
        run(&program, &RunOptions::default()),
        Err(RuntimeError::ConstantOutOfRange { at: 0, index: 4 })
    );
}

#[test]
fn catch_handles_guest_errors_in_assembled_code() {
    // The recovery target is the POP_SCOPE; slot 0 is reserved but never written.
    let program = assembled(
        &[
            Instruction::new(Opcode::PushScope, &[0]),
            Instruction::new(Opcode::Reserve, &[1]),
            Instruction::new(Opcode::Catch, &[4]),
            Instruction::new(Opcode::ReadLocal, &[0, 0]),
            Instruction::new(Opcode::Uncatch, &[]),
            Instruction::new(Opcode::PopScope, &[]),
            Instruction::new(Opcode::Return, &[]),
        ],
        Vec::new(),
    );
    let result = run(&program, &RunOptions::default()).unwrap();
    let Value::Error(error) = result else {
        panic!("expected an error value");
    };
    assert_eq!(error.kind, "nameUsedBeforeAssignment");
}

// ============================================================
// Property tests
// ============================================================

fn arb_expr() -> impl Strategy<Value = Expr> {
    let leaf = prop_oneof![
        (-50i32..50).prop_map(Expr::literal),
        "[a-z]{0,3}".prop_map(|s| Expr::literal(s.as_str())),
    ];
    leaf.prop_recursive(3, 20, 3, |inner| {
        prop_oneof![
            prop::collection::vec(inner.clone(), 0..3).prop_map(Expr::array),
            (inner.clone(), inner.clone()).prop_map(|(a, b)| call_fn("plus", vec![a, b])),
            inner.clone().prop_map(|a| call_fn("increment", vec![a])),
            inner.clone().prop_map(Expr::catching),
            (inner.clone(), inner.clone()).prop_map(|(v, body)| Expr::defining(
                vec![("v", v)],
                Expr::array(vec![Expr::name("v"), body])
            )),
            inner.prop_map(|body| Expr::call(
                Expr::given(&["a"], Expr::array(vec![Expr::name("a"), body])),
                vec![Expr::literal(1)]
            )),
        ]
    })
}

fn outcome(result: Result<Value, RuntimeError>) -> Result<Value, String> {
    result.map_err(|e| match e {
        RuntimeError::Uncaught(error) => error.kind,
        other => format!("fault: {other}"),
    })
}

proptest! {
    /// A decoded program behaves exactly like the one that was encoded.
    #[test]
    fn decoded_programs_run_the_same(expr in arb_expr()) {
        let original = program(&expr);
        let decoded = Program::decode(&original.encode().unwrap(), &StandardPlatform).unwrap();
        let options = RunOptions::default().with_step_limit(100_000);
        let expected = outcome(run(&original, &options));
        prop_assert!(!matches!(&expected, Err(kind) if kind.starts_with("fault")), "{expected:?}");
        prop_assert_eq!(outcome(run(&decoded, &options)), expected);
    }

    /// Wrapping any expression in `catching` never lets a guest error escape.
    #[test]
    fn catching_contains_guest_errors(expr in arb_expr()) {
        let result = run(&program(&Expr::catching(expr)), &RunOptions::default());
        prop_assert!(result.is_ok(), "{result:?}");
    }
}
