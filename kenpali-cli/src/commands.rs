//! CLI command implementations.

use std::fs;

use kenpali_common::program::MAGIC;
use kenpali_common::{Expr, Program};
use kenpali_compiler::CompileOptions;
use kenpali_stdlib::StandardPlatform;
use kenpali_vm::{RunOptions, RuntimeError};
use tracing::debug;

use crate::json;

/// Compile a JSON expression tree to a .kpb binary.
pub fn compile(args: &[String]) -> Result<(), i32> {
    let Some(input) = args.first() else {
        eprintln!("error: compile requires an input file");
        eprintln!("Usage: kenpali compile <ast.json> [-o out.kpb] [--names names.json]");
        return Err(1);
    };
    let flags = Flags::parse(&args[1..])?;

    let output = match &flags.output {
        Some(output) => output.clone(),
        None => match input.strip_suffix(".json") {
            Some(stem) => format!("{stem}.kpb"),
            None => format!("{input}.kpb"),
        },
    };

    let program = compile_file(input, &flags)?;
    let bytes = program.encode().map_err(|e| {
        eprintln!("error: {e}");
        1
    })?;

    fs::write(&output, &bytes).map_err(|e| {
        eprintln!("error: cannot write '{output}': {e}");
        1
    })?;

    eprintln!(
        "compiled {} words, {} functions ({} bytes) -> {output}",
        program.len(),
        program.functions.len(),
        bytes.len()
    );
    Ok(())
}

/// Execute a .kpb binary, or compile and execute a JSON expression tree.
pub fn run(args: &[String]) -> Result<(), i32> {
    let Some(input) = args.first() else {
        eprintln!("error: run requires an input file");
        eprintln!("Usage: kenpali run <prog.kpb|ast.json> [--step-limit N] [--time-limit SECONDS]");
        return Err(1);
    };
    let flags = Flags::parse(&args[1..])?;
    let program = read_program(input, &flags)?;
    execute(&program, &flags)
}

/// Compile and execute a JSON expression tree without writing a binary.
pub fn eval(args: &[String]) -> Result<(), i32> {
    let Some(input) = args.first() else {
        eprintln!("error: eval requires an input file");
        eprintln!("Usage: kenpali eval <ast.json> [--names names.json] [--step-limit N] [--time-limit SECONDS]");
        return Err(1);
    };
    let flags = Flags::parse(&args[1..])?;
    let program = compile_file(input, &flags)?;
    execute(&program, &flags)
}

/// Print the instruction listing of a program.
pub fn disassemble(args: &[String]) -> Result<(), i32> {
    let Some(input) = args.first() else {
        eprintln!("error: disassemble requires an input file");
        eprintln!("Usage: kenpali disassemble <prog.kpb|ast.json>");
        return Err(1);
    };
    let flags = Flags::parse(&args[1..])?;
    let program = read_program(input, &flags)?;
    print!("{}", kenpali_compiler::disassemble(&program));
    Ok(())
}

fn execute(program: &Program, flags: &Flags) -> Result<(), i32> {
    match kenpali_vm::run(program, &flags.run_options()) {
        Ok(value) => {
            println!("{value}");
            Ok(())
        }
        Err(RuntimeError::Uncaught(error)) => {
            eprintln!("uncaught error: {error}");
            Err(3)
        }
        Err(e) => {
            eprintln!("runtime error: {e}");
            Err(3)
        }
    }
}

/// A binary program if the file starts with the container magic,
/// otherwise a JSON expression tree to compile.
fn read_program(path: &str, flags: &Flags) -> Result<Program, i32> {
    let bytes = fs::read(path).map_err(|e| {
        eprintln!("error: cannot read '{path}': {e}");
        1
    })?;

    if bytes.starts_with(MAGIC) {
        debug!(path, bytes = bytes.len(), "decoding binary program");
        return Program::decode(&bytes, &StandardPlatform).map_err(|e| {
            eprintln!("error: invalid binary: {e}");
            1
        });
    }
    let text = String::from_utf8(bytes).map_err(|_| {
        eprintln!("error: '{path}' is neither a program binary nor UTF-8 JSON");
        1
    })?;
    compile_text(path, &text, flags)
}

fn compile_file(path: &str, flags: &Flags) -> Result<Program, i32> {
    let text = fs::read_to_string(path).map_err(|e| {
        eprintln!("error: cannot read '{path}': {e}");
        1
    })?;
    compile_text(path, &text, flags)
}

fn compile_text(path: &str, text: &str, flags: &Flags) -> Result<Program, i32> {
    let data = json::parse(text).map_err(|e| {
        eprintln!("error: invalid JSON in '{path}': {e}");
        1
    })?;
    let expr = Expr::from_value(&data).map_err(|e| {
        eprintln!("error: {e}");
        1
    })?;

    let options = flags.compile_options()?;
    kenpali_compiler::compile(&expr, &options).map_err(|e| {
        eprintln!("error: {e}");
        1
    })
}

/// Flags shared by every command.
#[derive(Debug, Default)]
struct Flags {
    output: Option<String>,
    names: Option<String>,
    step_limit: Option<u64>,
    time_limit: Option<f64>,
    call_depth_limit: Option<usize>,
}

impl Flags {
    fn parse(args: &[String]) -> Result<Self, i32> {
        let mut flags = Flags::default();
        let mut i = 0;
        while i < args.len() {
            let flag = args[i].as_str();
            let Some(value) = args.get(i + 1) else {
                eprintln!("error: {flag} requires a value");
                return Err(1);
            };
            match flag {
                "-o" => flags.output = Some(value.clone()),
                "--names" => flags.names = Some(value.clone()),
                "--step-limit" => flags.step_limit = Some(parse_number(flag, value)?),
                "--time-limit" => flags.time_limit = Some(parse_number(flag, value)?),
                "--call-depth-limit" => flags.call_depth_limit = Some(parse_number(flag, value)?),
                other => {
                    eprintln!("error: unknown flag '{other}'");
                    return Err(1);
                }
            }
            i += 2;
        }
        Ok(flags)
    }

    fn run_options(&self) -> RunOptions {
        let mut options = RunOptions::default();
        if let Some(steps) = self.step_limit {
            options = options.with_step_limit(steps);
        }
        if let Some(seconds) = self.time_limit {
            options = options.with_time_limit_seconds(seconds);
        }
        if let Some(depth) = self.call_depth_limit {
            options = options.with_call_depth_limit(depth);
        }
        options
    }

    /// Host names come from a JSON object file.
    fn compile_options(&self) -> Result<CompileOptions, i32> {
        let mut options = CompileOptions::default();
        let Some(path) = &self.names else {
            return Ok(options);
        };
        let text = fs::read_to_string(path).map_err(|e| {
            eprintln!("error: cannot read '{path}': {e}");
            1
        })?;
        let data = json::parse(&text).map_err(|e| {
            eprintln!("error: invalid JSON in '{path}': {e}");
            1
        })?;
        let Some(names) = data.as_object() else {
            eprintln!("error: '{path}' must contain a JSON object of names");
            return Err(1);
        };
        for (name, value) in names {
            options = options.with_name(name, value.clone());
        }
        Ok(options)
    }
}

fn parse_number<T: std::str::FromStr>(flag: &str, value: &str) -> Result<T, i32> {
    value.parse().map_err(|_| {
        eprintln!("error: {flag} expects a number, got '{value}'");
        1
    })
}
