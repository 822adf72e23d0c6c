// lark-embed - Rust to Lark value conversion
// Copyright (c) 2025 Tom Waddington. MIT licensed.

//! Conversions from Rust values to Lark values.

use lark_vm::{Value, Vm};

/// Types that can cross into the VM as a Lark value.
///
/// Strings go through the VM so they are interned like every other Lark
/// string, which is why the conversion takes the VM.
pub trait IntoLark {
    fn into_lark(self, vm: &mut Vm) -> Value;
}

impl IntoLark for Value {
    fn into_lark(self, _vm: &mut Vm) -> Value {
        self
    }
}

impl IntoLark for () {
    fn into_lark(self, _vm: &mut Vm) -> Value {
        Value::Nil
    }
}

impl IntoLark for bool {
    fn into_lark(self, _vm: &mut Vm) -> Value {
        Value::Bool(self)
    }
}

impl IntoLark for f64 {
    fn into_lark(self, _vm: &mut Vm) -> Value {
        Value::Number(self)
    }
}

impl IntoLark for i32 {
    fn into_lark(self, _vm: &mut Vm) -> Value {
        Value::Number(self as f64)
    }
}

impl IntoLark for &str {
    fn into_lark(self, vm: &mut Vm) -> Value {
        vm.make_string(self)
    }
}

impl IntoLark for String {
    fn into_lark(self, vm: &mut Vm) -> Value {
        vm.make_string(&self)
    }
}
