//! Kenpali CLI: compile, run and disassemble programs.
//!
//! Exit codes:
//! - 0: Success
//! - 1: Input/decode/compile error
//! - 3: Runtime error (including an uncaught guest error)

mod commands;
mod json;

use std::process;

use tracing_subscriber::{fmt, EnvFilter};

fn main() {
    init_logging();
    let args: Vec<String> = std::env::args().collect();

    if args.len() < 2 {
        print_usage();
        process::exit(1);
    }

    let result = match args[1].as_str() {
        "compile" => commands::compile(&args[2..]),
        "run" => commands::run(&args[2..]),
        "eval" => commands::eval(&args[2..]),
        "disassemble" => commands::disassemble(&args[2..]),
        "--help" | "-h" | "help" => {
            print_usage();
            process::exit(0);
        }
        other => {
            eprintln!("error: unknown command '{other}'");
            eprintln!();
            print_usage();
            process::exit(1);
        }
    };

    if let Err(code) = result {
        process::exit(code);
    }
}

/// Log to stderr, filtered by `RUST_LOG` (default `warn`).
fn init_logging() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

fn print_usage() {
    eprintln!("Usage: kenpali <command> [args]");
    eprintln!();
    eprintln!("Commands:");
    eprintln!("  compile <ast.json> [-o out.kpb] [--names names.json]   Compile an expression tree");
    eprintln!("  run <prog.kpb|ast.json> [limits]                       Execute a program");
    eprintln!("  eval <ast.json> [--names names.json] [limits]          Compile and execute");
    eprintln!("  disassemble <prog.kpb|ast.json>                        Print the instruction listing");
    eprintln!();
    eprintln!("Limits:");
    eprintln!("  --step-limit N           Stop after N instructions");
    eprintln!("  --time-limit SECONDS     Stop after SECONDS of wall-clock time");
    eprintln!("  --call-depth-limit N     Allow N nested callbacks (default 128)");
}
