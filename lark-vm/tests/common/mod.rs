// lark-vm - Common test utilities
// Copyright (c) 2025 Tom Waddington. MIT licensed.

//! Shared test helpers for the interpreter integration tests.
//!
//! Every script is executed under both dispatch strategies and the outputs
//! compared; a behavioural difference between them is itself a test
//! failure, whatever the script does.

use std::cell::RefCell;
use std::io::Write;
use std::rc::Rc;

use lark_vm::{DispatchMode, InterpretResult, Vm};

/// An in-memory `Write` target the test can read back.
#[derive(Clone, Default)]
pub struct SharedBuffer(Rc<RefCell<Vec<u8>>>);

impl SharedBuffer {
    pub fn contents(&self) -> String {
        String::from_utf8_lossy(&self.0.borrow()).into_owned()
    }
}

impl Write for SharedBuffer {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.0.borrow_mut().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}

pub struct RunOutput {
    pub result: InterpretResult,
    pub stdout: String,
    pub stderr: String,
}

/// Run a script in a fresh VM under one dispatch strategy.
#[allow(dead_code)]
pub fn run_with(mode: DispatchMode, source: &str) -> RunOutput {
    let mut vm = Vm::new();
    vm.set_dispatch(mode);
    run_in(&mut vm, source)
}

/// Run a script in an existing VM, capturing its output.
#[allow(dead_code)]
pub fn run_in(vm: &mut Vm, source: &str) -> RunOutput {
    let out = SharedBuffer::default();
    let err = SharedBuffer::default();
    vm.set_output(Box::new(out.clone()));
    vm.set_error_output(Box::new(err.clone()));
    let result = vm.interpret(source);
    RunOutput {
        result,
        stdout: out.contents(),
        stderr: err.contents(),
    }
}

/// Run a script under both dispatch strategies and require identical
/// behaviour; returns the switch-mode run.
#[allow(dead_code)]
pub fn run(source: &str) -> RunOutput {
    let switch = run_with(DispatchMode::Switch, source);
    let threaded = run_with(DispatchMode::Threaded, source);
    assert_eq!(
        switch.result, threaded.result,
        "dispatch strategies disagree on result for:\n{}",
        source
    );
    assert_eq!(
        switch.stdout, threaded.stdout,
        "dispatch strategies disagree on output for:\n{}",
        source
    );
    switch
}

/// Assert a script runs cleanly and prints exactly `expected` lines.
#[allow(dead_code)]
pub fn expect_output(source: &str, expected: &[&str]) {
    let output = run(source);
    assert_eq!(
        output.result,
        InterpretResult::Ok,
        "script failed:\n{}\nstderr:\n{}",
        source,
        output.stderr
    );
    let lines: Vec<&str> = output.stdout.lines().collect();
    assert_eq!(lines, expected, "wrong output for:\n{}", source);
}

/// Assert a script fails at runtime with the given message.
#[allow(dead_code)]
pub fn expect_runtime_error(source: &str, message: &str) {
    let output = run(source);
    assert_eq!(
        output.result,
        InterpretResult::RuntimeError,
        "expected runtime error for:\n{}\nstdout:\n{}",
        source,
        output.stdout
    );
    assert!(
        output.stderr.contains(message),
        "stderr {:?} should contain {:?} for:\n{}",
        output.stderr,
        message,
        source
    );
}

/// Assert a script is rejected at compile time with the given message.
#[allow(dead_code)]
pub fn expect_compile_error(source: &str, message: &str) {
    let output = run(source);
    assert_eq!(
        output.result,
        InterpretResult::CompileError,
        "expected compile error for:\n{}",
        source
    );
    assert!(
        output.stderr.contains(message),
        "stderr {:?} should contain {:?} for:\n{}",
        output.stderr,
        message,
        source
    );
}
