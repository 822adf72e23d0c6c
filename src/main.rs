// lark - A Lox-flavoured scripting language with a bytecode VM
// Copyright (c) 2025 Tom Waddington. MIT licensed.

use std::env;
use std::fs;
use std::path::Path;
use std::process;

use anyhow::{Context, Result, anyhow};
use rustyline::DefaultEditor;
use rustyline::error::ReadlineError;

use lark_vm::{InterpretResult, Vm, debug};

/// Sysexits-style codes: data error for a bad program, software error for a
/// failed run.
const EXIT_COMPILE_ERROR: i32 = 65;
const EXIT_RUNTIME_ERROR: i32 = 70;
const EXIT_USAGE: i32 = 64;

fn main() {
    let args: Vec<String> = env::args().skip(1).collect();

    match args.first().map(String::as_str) {
        Some("--version") | Some("-v") => {
            println!("Lark v{}", env!("CARGO_PKG_VERSION"));
        }
        Some("--dump") => match args.get(1) {
            Some(path) => dump_file(path),
            None => {
                eprintln!("Usage: lark --dump <script>");
                process::exit(EXIT_USAGE);
            }
        },
        Some("--help") | Some("-h") => help(),
        Some(path) if path.starts_with('-') => {
            eprintln!("Unknown option: {}", path);
            help();
            process::exit(EXIT_USAGE);
        }
        Some(path) => run_file(path),
        None => {
            if let Err(e) = run_repl() {
                eprintln!("{}", e);
                process::exit(EXIT_RUNTIME_ERROR);
            }
        }
    }
}

fn help() {
    println!(
        r#"Usage:
    lark                 Start an interactive session
    lark <script>        Run a script file
    lark --dump <script> Compile a script and print its bytecode
    lark --version       Print the version
"#
    );
}

/// Run a script file, mapping the outcome to an exit code.
fn run_file(path: &str) {
    let source = match read_source(path) {
        Ok(source) => source,
        Err(e) => {
            eprintln!("{:#}", e);
            process::exit(EXIT_USAGE);
        }
    };

    let mut vm = Vm::new();
    match vm.interpret(&source) {
        InterpretResult::Ok => {}
        InterpretResult::CompileError => process::exit(EXIT_COMPILE_ERROR),
        InterpretResult::RuntimeError => process::exit(EXIT_RUNTIME_ERROR),
    }
}

/// Compile a script and print its disassembly instead of executing it.
fn dump_file(path: &str) {
    let source = match read_source(path) {
        Ok(source) => source,
        Err(e) => {
            eprintln!("{:#}", e);
            process::exit(EXIT_USAGE);
        }
    };

    match debug::dump_source(&source) {
        Ok(listing) => print!("{}", listing),
        Err(errors) => {
            for error in errors {
                eprintln!("{}", error);
            }
            process::exit(EXIT_COMPILE_ERROR);
        }
    }
}

fn read_source(path: &str) -> Result<String> {
    let path = Path::new(path);
    fs::read_to_string(path).with_context(|| format!("Error reading '{}'", path.display()))
}

/// Interactive session. One VM for the whole session, so definitions and
/// interned strings carry across lines.
fn run_repl() -> Result<()> {
    println!("Lark v{} (ctrl-d to quit)", env!("CARGO_PKG_VERSION"));

    let mut editor =
        DefaultEditor::new().map_err(|e| anyhow!("Failed to initialise line editor: {}", e))?;
    let mut vm = Vm::new();

    loop {
        match editor.readline("> ") {
            Ok(line) => {
                if line.trim().is_empty() {
                    continue;
                }
                let _ = editor.add_history_entry(&line);
                // Errors were already reported on stderr; the session keeps
                // going either way.
                vm.interpret(&line);
            }
            Err(ReadlineError::Interrupted) | Err(ReadlineError::Eof) => break,
            Err(e) => return Err(anyhow!("Failed to read input: {}", e)),
        }
    }

    Ok(())
}
