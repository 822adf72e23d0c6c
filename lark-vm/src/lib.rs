// lark-vm - Bytecode compiler and virtual machine for the Lark programming language
// Copyright (c) 2025 Tom Waddington. MIT licensed.

//! # lark-vm
//!
//! Bytecode compiler and stack-based virtual machine for the Lark
//! programming language. Source text is compiled in a single pass to flat
//! bytecode and executed directly; there is no syntax tree. The VM carries
//! first-class functions with lexical closures, single-inheritance classes
//! with bound methods, and a tracing mark–sweep garbage collector over an
//! interned-string object heap.

pub mod chunk;
pub mod compiler;
pub mod debug;
pub mod heap;
pub mod natives;
pub mod object;
pub mod opcode;
pub mod table;
pub mod value;
pub mod vm;

pub use chunk::Chunk;
pub use compiler::{CompileError, compile};
pub use opcode::OpCode;
pub use value::{ObjRef, Value};
pub use vm::{DispatchMode, InterpretResult, RuntimeError, Vm};
