// lark-embed - High-level embedding API for the Lark programming language
// Copyright (c) 2025 Tom Waddington. MIT licensed.

//! # lark-embed
//!
//! High-level embedding API for the Lark programming language: evaluate
//! scripts, capture their output, and pass Rust values in as globals.

pub mod convert;
pub mod engine;

pub use convert::IntoLark;
pub use engine::{Engine, Error, Result};
