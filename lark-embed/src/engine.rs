// lark-embed - Engine implementation
// Copyright (c) 2025 Tom Waddington. MIT licensed.

//! The Engine struct - main entry point for embedding Lark.

use std::cell::RefCell;
use std::fmt;
use std::io::Write;
use std::path::Path;
use std::rc::Rc;

use lark_vm::{InterpretResult, Vm};

use crate::convert::IntoLark;

/// Errors surfaced to the host application.
#[derive(Debug, Clone)]
pub enum Error {
    /// The source did not compile; the message holds every diagnostic.
    Compile(String),
    /// Execution failed; the message holds the error and its backtrace.
    Runtime(String),
    /// The script file could not be read.
    Io(String),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::Compile(message) => write!(f, "compile error:\n{}", message),
            Error::Runtime(message) => write!(f, "runtime error:\n{}", message),
            Error::Io(message) => write!(f, "{}", message),
        }
    }
}

impl std::error::Error for Error {}

/// Result type for embedding operations.
pub type Result<T> = std::result::Result<T, Error>;

#[derive(Clone, Default)]
struct Buffer(Rc<RefCell<Vec<u8>>>);

impl Buffer {
    fn drain(&self) -> String {
        let mut bytes = self.0.borrow_mut();
        let text = String::from_utf8_lossy(&bytes).into_owned();
        bytes.clear();
        text
    }
}

impl Write for Buffer {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.0.borrow_mut().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}

/// The Lark scripting engine.
///
/// `Engine` wraps a [`Vm`] and captures everything the script prints, so a
/// host application can evaluate code and collect its output without
/// touching the process's stdout.
///
/// Globals and interned strings persist across [`Engine::eval`] calls, the
/// same sharing the REPL relies on. The engine is not thread-safe; give
/// each thread its own.
///
/// # Example
///
/// ```
/// use lark_embed::Engine;
///
/// let mut engine = Engine::new();
/// let output = engine.eval("print 1 + 2;").unwrap();
/// assert_eq!(output, "3\n");
/// ```
pub struct Engine {
    vm: Vm,
    out: Buffer,
    err: Buffer,
}

impl Engine {
    /// Create an engine with the built-in natives installed.
    pub fn new() -> Self {
        let mut vm = Vm::new();
        let out = Buffer::default();
        let err = Buffer::default();
        vm.set_output(Box::new(out.clone()));
        vm.set_error_output(Box::new(err.clone()));
        Engine { vm, out, err }
    }

    /// Evaluate a string of Lark code and return what it printed.
    ///
    /// # Errors
    ///
    /// [`Error::Compile`] if the source does not parse, [`Error::Runtime`]
    /// if execution fails; either carries the rendered diagnostics.
    pub fn eval(&mut self, source: &str) -> Result<String> {
        let result = self.vm.interpret(source);
        let output = self.out.drain();
        let diagnostics = self.err.drain();
        match result {
            InterpretResult::Ok => Ok(output),
            InterpretResult::CompileError => Err(Error::Compile(diagnostics)),
            InterpretResult::RuntimeError => Err(Error::Runtime(diagnostics)),
        }
    }

    /// Evaluate a script file and return what it printed.
    pub fn eval_file(&mut self, path: impl AsRef<Path>) -> Result<String> {
        let path = path.as_ref();
        let source = std::fs::read_to_string(path)
            .map_err(|e| Error::Io(format!("Error reading '{}': {}", path.display(), e)))?;
        self.eval(&source)
    }

    /// Define a global visible to subsequently evaluated code.
    ///
    /// # Example
    ///
    /// ```
    /// use lark_embed::Engine;
    ///
    /// let mut engine = Engine::new();
    /// engine.set_global("limit", 3.0);
    /// assert_eq!(engine.eval("print limit * 2;").unwrap(), "6\n");
    /// ```
    pub fn set_global(&mut self, name: &str, value: impl IntoLark) {
        let value = value.into_lark(&mut self.vm);
        self.vm.define_global(name, value);
    }

    /// Direct access to the underlying VM, for hosts that need to install
    /// native functions.
    pub fn vm_mut(&mut self) -> &mut Vm {
        &mut self.vm
    }
}

impl Default for Engine {
    fn default() -> Self {
        Self::new()
    }
}
