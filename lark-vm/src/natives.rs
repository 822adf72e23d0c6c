// lark-vm - Built-in native functions
// Copyright (c) 2025 Tom Waddington. MIT licensed.

//! Built-in native functions.
//!
//! Natives follow the `fn(&mut Vm, argc) -> Result<Value>` ABI: arguments
//! sit on top of the VM stack when the native runs, and the VM pops them
//! (plus the callee slot) and pushes the returned value afterwards. None of
//! the built-ins take arguments, and like every native they run
//! synchronously and must not re-enter the interpreter.

use crate::value::Value;
use crate::vm::{Result, Vm};

/// Install the built-in natives as globals.
pub fn install(vm: &mut Vm) {
    vm.define_native("clock", clock_native);
    vm.define_native("exit", exit_native);
    vm.define_native("gc", gc_native);
    vm.define_native("gcHeapSize", gc_heap_size_native);
}

/// `clock()` - seconds elapsed since the VM was created.
fn clock_native(vm: &mut Vm, _argc: usize) -> Result<Value> {
    Ok(Value::Number(vm.uptime_seconds()))
}

/// `exit()` - terminate the process with code 0.
fn exit_native(_vm: &mut Vm, _argc: usize) -> Result<Value> {
    std::process::exit(0);
}

/// `gc()` - run a full collection; returns the number of bytes freed.
fn gc_native(vm: &mut Vm, _argc: usize) -> Result<Value> {
    let freed = vm.collect_garbage();
    Ok(Value::Number(freed as f64))
}

/// `gcHeapSize()` - current allocation footprint in bytes.
fn gc_heap_size_native(vm: &mut Vm, _argc: usize) -> Result<Value> {
    Ok(Value::Number(vm.bytes_allocated() as f64))
}
