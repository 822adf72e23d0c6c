// lark-vm - Compiler front end
// Copyright (c) 2025 Tom Waddington. MIT licensed.

//! Single-pass bytecode compiler for Lark.
//!
//! There is no syntax tree: the compiler pulls tokens from the scanner and
//! emits bytecode as it parses, resolving lexical scopes and upvalue
//! captures on the way. See [`codegen`] for the parser itself.

pub mod codegen;

use std::fmt;

pub use codegen::compile;

/// Where in the source a compile error points.
#[derive(Debug, Clone)]
pub enum ErrorAt {
    /// At the end of the source.
    End,
    /// At a concrete lexeme.
    Lexeme(String),
    /// At a scanner error token; the message already says what was wrong.
    Bare,
}

/// A compile-time diagnostic.
///
/// Parsing continues in panic mode after an error, so one compile can
/// produce several of these, one per independent mistake.
#[derive(Debug, Clone)]
pub struct CompileError {
    pub line: u32,
    pub at: ErrorAt,
    pub message: String,
}

impl fmt::Display for CompileError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[line {}] Error", self.line)?;
        match &self.at {
            ErrorAt::End => write!(f, " at end")?,
            ErrorAt::Lexeme(lexeme) => write!(f, " at '{}'", lexeme)?,
            ErrorAt::Bare => {}
        }
        write!(f, ": {}", self.message)
    }
}

impl std::error::Error for CompileError {}
