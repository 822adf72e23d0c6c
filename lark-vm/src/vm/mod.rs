// lark-vm - Stack-based virtual machine for executing Lark bytecode
// Copyright (c) 2025 Tom Waddington. MIT licensed.

//! Stack-based virtual machine for executing Lark bytecode.
//!
//! The VM owns the object heap, the globals table, and the value stack. One
//! VM can run any number of `interpret` calls; globals and interned strings
//! persist between them, which is what makes the REPL work.

pub mod dispatch;
pub mod frame;
pub mod stack;

use std::fmt;
use std::io::{self, Write};
use std::rc::Rc;
use std::time::Instant;

use crate::compiler::compile;
use crate::heap::Heap;
use crate::object::{
    NativeFn, Obj, ObjBoundMethod, ObjClosure, ObjInstance, ObjUpvalue, UpvalueSlot,
};
use crate::opcode::OpCode;
use crate::table::Table;
use crate::value::{ObjRef, Value};

pub use dispatch::DispatchMode;
pub use frame::CallFrame;
pub use stack::ValueStack;

/// Maximum call depth.
pub const FRAMES_MAX: usize = 64;

/// Maximum value-stack depth: one full window of 256 slots per frame.
pub const STACK_MAX: usize = FRAMES_MAX * 256;

/// Outcome of one `interpret` call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InterpretResult {
    Ok,
    CompileError,
    RuntimeError,
}

/// Runtime error during VM execution.
#[derive(Debug, Clone)]
pub enum RuntimeError {
    /// Unary minus on a non-number.
    OperandMustBeNumber,
    /// Arithmetic or comparison on non-numbers.
    OperandsMustBeNumbers,
    /// `+` on anything but two numbers or two strings.
    OperandsMustBeNumbersOrStrings,
    /// Read or write of a global that was never defined.
    UndefinedVariable(String),
    /// Property access that matched neither a field nor a method.
    UndefinedProperty(String),
    /// Call of a value that is not callable.
    NotCallable,
    /// Property read on a non-instance.
    OnlyInstancesHaveProperties,
    /// Field write on a non-instance.
    OnlyInstancesHaveFields,
    /// Method invocation on a non-instance.
    OnlyInstancesHaveMethods,
    /// `<` clause naming a non-class.
    SuperclassMustBeClass,
    /// Arity mismatch.
    ExpectedArguments { expected: u8, got: usize },
    /// Too many nested calls or value-stack slots.
    StackOverflow,
    /// Internal invariant violation.
    StackUnderflow,
    /// Internal error.
    Internal(String),
}

impl fmt::Display for RuntimeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RuntimeError::OperandMustBeNumber => write!(f, "Operand must be a number."),
            RuntimeError::OperandsMustBeNumbers => write!(f, "Operands must be numbers."),
            RuntimeError::OperandsMustBeNumbersOrStrings => {
                write!(f, "Operands must be two numbers or two strings.")
            }
            RuntimeError::UndefinedVariable(name) => {
                write!(f, "Undefined variable '{}'.", name)
            }
            RuntimeError::UndefinedProperty(name) => {
                write!(f, "Undefined property '{}'.", name)
            }
            RuntimeError::NotCallable => write!(f, "Can only call functions and classes."),
            RuntimeError::OnlyInstancesHaveProperties => {
                write!(f, "Only instances have properties.")
            }
            RuntimeError::OnlyInstancesHaveFields => write!(f, "Only instances have fields."),
            RuntimeError::OnlyInstancesHaveMethods => write!(f, "Only instances have methods."),
            RuntimeError::SuperclassMustBeClass => write!(f, "Superclass must be a class."),
            RuntimeError::ExpectedArguments { expected, got } => {
                write!(f, "Expected {} arguments but got {}.", expected, got)
            }
            RuntimeError::StackOverflow => write!(f, "Stack overflow."),
            RuntimeError::StackUnderflow => write!(f, "Stack underflow."),
            RuntimeError::Internal(message) => write!(f, "Internal error: {}", message),
        }
    }
}

impl std::error::Error for RuntimeError {}

/// Result type for VM operations.
pub type Result<T> = std::result::Result<T, RuntimeError>;

/// Whether the dispatch loop keeps going or the script has finished.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flow {
    Continue,
    Halt,
}

/// The Lark virtual machine.
pub struct Vm {
    stack: ValueStack,
    frames: Vec<CallFrame>,
    pub(crate) heap: Heap,
    globals: Table,
    /// Upvalues whose variable is still on the stack, in strictly
    /// descending slot order.
    open_upvalues: Vec<ObjRef>,
    /// The interned `"init"`, looked up on every class call.
    init_string: ObjRef,
    started: Instant,
    dispatch: DispatchMode,
    out: Box<dyn Write>,
    err: Box<dyn Write>,
}

impl Vm {
    /// Create a VM with the built-in natives installed, printing to
    /// stdout/stderr.
    pub fn new() -> Self {
        let mut heap = Heap::new();
        let init_string = heap.intern("init");
        let mut vm = Vm {
            stack: ValueStack::new(),
            frames: Vec::new(),
            heap,
            globals: Table::new(),
            open_upvalues: Vec::new(),
            init_string,
            started: Instant::now(),
            dispatch: DispatchMode::Switch,
            out: Box::new(io::stdout()),
            err: Box::new(io::stderr()),
        };
        crate::natives::install(&mut vm);
        vm
    }

    /// Select the dispatch strategy. Both behave identically; see
    /// [`DispatchMode`].
    pub fn set_dispatch(&mut self, mode: DispatchMode) {
        self.dispatch = mode;
    }

    /// Redirect program output (`print`).
    pub fn set_output(&mut self, out: Box<dyn Write>) {
        self.out = out;
    }

    /// Redirect error reporting (compile diagnostics and runtime traces).
    pub fn set_error_output(&mut self, err: Box<dyn Write>) {
        self.err = err;
    }

    /// Compile and run a source string.
    ///
    /// Globals and interned strings persist into the next call; the value
    /// and call stacks always start empty.
    pub fn interpret(&mut self, source: &str) -> InterpretResult {
        let function = match compile(source, &mut self.heap) {
            Ok(function) => function,
            Err(errors) => {
                for error in &errors {
                    let _ = writeln!(self.err, "{}", error);
                }
                return InterpretResult::CompileError;
            }
        };

        let closure = self.heap.alloc(Obj::Closure(ObjClosure {
            function,
            upvalues: Vec::new(),
        }));
        match self.run_script(closure) {
            Ok(()) => InterpretResult::Ok,
            Err(error) => {
                self.report_runtime_error(&error);
                InterpretResult::RuntimeError
            }
        }
    }

    fn run_script(&mut self, closure: ObjRef) -> Result<()> {
        self.stack.push(Value::Obj(closure))?;
        self.call_closure(closure, 0)?;
        self.run()
    }

    fn run(&mut self) -> Result<()> {
        match self.dispatch {
            DispatchMode::Switch => self.run_switch(),
            DispatchMode::Threaded => self.run_threaded(),
        }
    }

    /// Dispatch via a `match` on the decoded opcode.
    fn run_switch(&mut self) -> Result<()> {
        loop {
            let op = self.decode()?;
            match op {
                OpCode::Constant => self.op_constant()?,
                OpCode::Nil => self.op_nil()?,
                OpCode::True => self.op_true()?,
                OpCode::False => self.op_false()?,
                OpCode::Pop => self.op_pop()?,
                OpCode::GetLocal => self.op_get_local()?,
                OpCode::SetLocal => self.op_set_local()?,
                OpCode::GetGlobal => self.op_get_global()?,
                OpCode::DefineGlobal => self.op_define_global()?,
                OpCode::SetGlobal => self.op_set_global()?,
                OpCode::GetUpvalue => self.op_get_upvalue()?,
                OpCode::SetUpvalue => self.op_set_upvalue()?,
                OpCode::GetProperty => self.op_get_property()?,
                OpCode::SetProperty => self.op_set_property()?,
                OpCode::GetSuper => self.op_get_super()?,
                OpCode::Equal => self.op_equal()?,
                OpCode::Greater => self.op_greater()?,
                OpCode::Less => self.op_less()?,
                OpCode::Add => self.op_add()?,
                OpCode::Subtract => self.op_subtract()?,
                OpCode::Multiply => self.op_multiply()?,
                OpCode::Divide => self.op_divide()?,
                OpCode::Not => self.op_not()?,
                OpCode::Negate => self.op_negate()?,
                OpCode::Print => self.op_print()?,
                OpCode::Jump => self.op_jump()?,
                OpCode::JumpIfFalse => self.op_jump_if_false()?,
                OpCode::Loop => self.op_loop()?,
                OpCode::Call => self.op_call()?,
                OpCode::Invoke => self.op_invoke()?,
                OpCode::SuperInvoke => self.op_super_invoke()?,
                OpCode::Closure => self.op_closure()?,
                OpCode::CloseUpvalue => self.op_close_upvalue()?,
                OpCode::Return => {
                    if self.op_return()? == Flow::Halt {
                        return Ok(());
                    }
                }
                OpCode::Class => self.op_class()?,
                OpCode::Inherit => self.op_inherit()?,
                OpCode::Method => self.op_method()?,
            }
        }
    }

    /// Dispatch via the precomputed handler table in [`dispatch`].
    fn run_threaded(&mut self) -> Result<()> {
        loop {
            let op = self.decode()?;
            match dispatch::HANDLERS[op as usize](self)? {
                Flow::Continue => {}
                Flow::Halt => return Ok(()),
            }
        }
    }

    // =========================================================================
    // Instruction stream
    // =========================================================================

    fn decode(&mut self) -> Result<OpCode> {
        let byte = self.read_byte();
        OpCode::from_byte(byte)
            .ok_or_else(|| RuntimeError::Internal(format!("invalid opcode {}", byte)))
    }

    fn frame(&self) -> &CallFrame {
        self.frames.last().expect("no active frame")
    }

    fn frame_mut(&mut self) -> &mut CallFrame {
        self.frames.last_mut().expect("no active frame")
    }

    /// Read the next code byte. The compiler always terminates a chunk with
    /// a return, so the instruction pointer stays in bounds.
    fn read_byte(&mut self) -> u8 {
        let frame = self.frames.last_mut().expect("no active frame");
        let byte = frame.chunk.code[frame.ip];
        frame.ip += 1;
        byte
    }

    fn read_u16(&mut self) -> u16 {
        let high = self.read_byte();
        let low = self.read_byte();
        u16::from_be_bytes([high, low])
    }

    fn read_constant(&mut self) -> Value {
        let index = self.read_byte() as usize;
        self.frame().chunk.constants[index]
    }

    fn read_string(&mut self) -> ObjRef {
        self.read_constant()
            .as_obj()
            .expect("name constant must be a string")
    }

    // =========================================================================
    // Allocation & collection
    // =========================================================================

    /// Allocate through the VM so collection can happen first, while every
    /// live object is visible from the roots.
    fn alloc(&mut self, obj: Obj) -> ObjRef {
        if self.heap.should_gc() {
            self.collect_garbage();
        }
        self.heap.alloc(obj)
    }

    fn intern(&mut self, chars: &str) -> ObjRef {
        if self.heap.should_gc() {
            self.collect_garbage();
        }
        self.heap.intern(chars)
    }

    /// Run a full collection now. Returns the number of bytes freed.
    pub fn collect_garbage(&mut self) -> usize {
        let mut roots: Vec<ObjRef> = Vec::new();
        for value in self.stack.iter() {
            if let Value::Obj(r) = value {
                roots.push(*r);
            }
        }
        for frame in &self.frames {
            roots.push(frame.closure);
        }
        roots.extend_from_slice(&self.open_upvalues);
        for (key, value) in self.globals.iter() {
            roots.push(key.obj);
            if let Value::Obj(r) = value {
                roots.push(r);
            }
        }
        roots.push(self.init_string);
        self.heap.collect(roots)
    }

    /// Current allocation footprint in bytes.
    pub fn bytes_allocated(&self) -> usize {
        self.heap.bytes_allocated()
    }

    /// Seconds since this VM was created.
    pub(crate) fn uptime_seconds(&self) -> f64 {
        self.started.elapsed().as_secs_f64()
    }

    /// Allocate (or reuse) an interned string value.
    pub fn make_string(&mut self, chars: &str) -> Value {
        Value::Obj(self.intern(chars))
    }

    /// Define a global variable, replacing any existing one.
    pub fn define_global(&mut self, name: &str, value: Value) {
        let name = self.heap.intern(name);
        let key = self.heap.key(name);
        self.globals.set(key, value);
    }

    /// Install a native function under the given global name.
    pub fn define_native(&mut self, name: &str, function: NativeFn) {
        let native = self.heap.alloc(Obj::Native(crate::object::ObjNative { function }));
        self.define_global(name, Value::Obj(native));
    }

    // =========================================================================
    // Error reporting
    // =========================================================================

    fn report_runtime_error(&mut self, error: &RuntimeError) {
        let _ = writeln!(self.err, "{}", error);

        for frame in self.frames.iter().rev() {
            // ip already advanced past the faulting instruction.
            let line = frame.chunk.line(frame.ip - 1);
            let function = self.heap.closure(frame.closure).function;
            match self.heap.function(function).name {
                Some(name) => {
                    let _ = writeln!(
                        self.err,
                        "[line {}] in {}()",
                        line,
                        self.heap.string(name).chars
                    );
                }
                None => {
                    let _ = writeln!(self.err, "[line {}] in script", line);
                }
            }
        }

        self.reset_stack();
    }

    fn reset_stack(&mut self) {
        self.stack.clear();
        self.frames.clear();
        self.open_upvalues.clear();
    }

    // =========================================================================
    // Calls
    // =========================================================================

    fn call_value(&mut self, callee: Value, argc: usize) -> Result<()> {
        let Some(r) = callee.as_obj() else {
            return Err(RuntimeError::NotCallable);
        };

        if let Obj::BoundMethod(bound) = self.heap.get(r) {
            let (receiver, method) = (bound.receiver, bound.method);
            let slot = self.stack.len() - argc - 1;
            self.stack.set(slot, receiver)?;
            return self.call_closure(method, argc);
        }

        if let Obj::Class(_) = self.heap.get(r) {
            // The callee slot becomes the fresh instance: slot zero of the
            // initializer frame, and the call's result.
            let instance = self.alloc(Obj::Instance(ObjInstance {
                class: r,
                fields: Table::new(),
            }));
            let slot = self.stack.len() - argc - 1;
            self.stack.set(slot, Value::Obj(instance))?;

            let key = self.heap.key(self.init_string);
            if let Some(initializer) = self.heap.class(r).methods.get(key) {
                let initializer = initializer.as_obj().expect("initializer must be a closure");
                return self.call_closure(initializer, argc);
            }
            if argc != 0 {
                return Err(RuntimeError::ExpectedArguments {
                    expected: 0,
                    got: argc,
                });
            }
            return Ok(());
        }

        if let Obj::Closure(_) = self.heap.get(r) {
            return self.call_closure(r, argc);
        }

        if let Obj::Native(native) = self.heap.get(r) {
            let function = native.function;
            let result = function(self, argc)?;
            self.stack.truncate(self.stack.len() - argc - 1);
            return self.stack.push(result);
        }

        Err(RuntimeError::NotCallable)
    }

    fn call_closure(&mut self, closure: ObjRef, argc: usize) -> Result<()> {
        let function_ref = self.heap.closure(closure).function;
        let function = self.heap.function(function_ref);
        let arity = function.arity;
        let chunk = Rc::clone(&function.chunk);

        if argc != arity as usize {
            return Err(RuntimeError::ExpectedArguments {
                expected: arity,
                got: argc,
            });
        }
        if self.frames.len() == FRAMES_MAX {
            return Err(RuntimeError::StackOverflow);
        }

        let slots = self.stack.len() - argc - 1;
        self.frames.push(CallFrame::new(closure, slots, chunk));
        Ok(())
    }

    fn invoke(&mut self, name: ObjRef, argc: usize) -> Result<()> {
        let receiver = self.stack.peek(argc)?;
        let instance = receiver
            .as_obj()
            .filter(|r| matches!(self.heap.get(*r), Obj::Instance(_)))
            .ok_or(RuntimeError::OnlyInstancesHaveMethods)?;

        // A field holding a callable shadows any method of the same name.
        let key = self.heap.key(name);
        if let Some(value) = self.heap.instance(instance).fields.get(key) {
            let slot = self.stack.len() - argc - 1;
            self.stack.set(slot, value)?;
            return self.call_value(value, argc);
        }

        let class = self.heap.instance(instance).class;
        self.invoke_from_class(class, name, argc)
    }

    fn invoke_from_class(&mut self, class: ObjRef, name: ObjRef, argc: usize) -> Result<()> {
        let key = self.heap.key(name);
        let Some(method) = self.heap.class(class).methods.get(key) else {
            return Err(RuntimeError::UndefinedProperty(
                self.heap.string(name).chars.to_string(),
            ));
        };
        self.call_closure(method.as_obj().expect("method must be a closure"), argc)
    }

    fn bind_method(&mut self, class: ObjRef, name: ObjRef) -> Result<()> {
        let key = self.heap.key(name);
        let Some(method) = self.heap.class(class).methods.get(key) else {
            return Err(RuntimeError::UndefinedProperty(
                self.heap.string(name).chars.to_string(),
            ));
        };
        let method = method.as_obj().expect("method must be a closure");

        let receiver = self.stack.peek(0)?;
        let bound = self.alloc(Obj::BoundMethod(ObjBoundMethod { receiver, method }));
        self.stack.pop()?;
        self.stack.push(Value::Obj(bound))
    }

    // =========================================================================
    // Upvalues
    // =========================================================================

    /// Find or create the upvalue for an absolute stack slot, keeping the
    /// open list strictly descending so closing can stop at the boundary.
    fn capture_upvalue(&mut self, slot: usize) -> ObjRef {
        let mut index = 0;
        while index < self.open_upvalues.len() {
            let open_slot = self.open_slot(self.open_upvalues[index]);
            if open_slot <= slot {
                if open_slot == slot {
                    return self.open_upvalues[index];
                }
                break;
            }
            index += 1;
        }

        let created = self.alloc(Obj::Upvalue(ObjUpvalue {
            slot: UpvalueSlot::Open(slot),
        }));
        self.open_upvalues.insert(index, created);
        created
    }

    /// Close every open upvalue at or above `boundary`, moving the stack
    /// value into the upvalue cell.
    fn close_upvalues(&mut self, boundary: usize) -> Result<()> {
        while let Some(&first) = self.open_upvalues.first() {
            let slot = self.open_slot(first);
            if slot < boundary {
                break;
            }
            self.open_upvalues.remove(0);
            let value = self.stack.get(slot)?;
            self.heap.upvalue_mut(first).slot = UpvalueSlot::Closed(value);
        }
        Ok(())
    }

    fn open_slot(&self, upvalue: ObjRef) -> usize {
        match self.heap.upvalue(upvalue).slot {
            UpvalueSlot::Open(slot) => slot,
            UpvalueSlot::Closed(_) => unreachable!("closed upvalue in open list"),
        }
    }

    // =========================================================================
    // Instruction implementations
    // =========================================================================
    //
    // Both dispatch loops funnel into these, so the strategies cannot
    // diverge in behaviour.

    fn op_constant(&mut self) -> Result<()> {
        let value = self.read_constant();
        self.stack.push(value)
    }

    fn op_nil(&mut self) -> Result<()> {
        self.stack.push(Value::Nil)
    }

    fn op_true(&mut self) -> Result<()> {
        self.stack.push(Value::Bool(true))
    }

    fn op_false(&mut self) -> Result<()> {
        self.stack.push(Value::Bool(false))
    }

    fn op_pop(&mut self) -> Result<()> {
        self.stack.pop()?;
        Ok(())
    }

    fn op_get_local(&mut self) -> Result<()> {
        let slot = self.read_byte() as usize;
        let base = self.frame().slots;
        let value = self.stack.get(base + slot)?;
        self.stack.push(value)
    }

    fn op_set_local(&mut self) -> Result<()> {
        let slot = self.read_byte() as usize;
        let base = self.frame().slots;
        let value = self.stack.peek(0)?;
        self.stack.set(base + slot, value)
    }

    fn op_get_global(&mut self) -> Result<()> {
        let name = self.read_string();
        let key = self.heap.key(name);
        match self.globals.get(key) {
            Some(value) => self.stack.push(value),
            None => Err(RuntimeError::UndefinedVariable(
                self.heap.string(name).chars.to_string(),
            )),
        }
    }

    fn op_define_global(&mut self) -> Result<()> {
        let name = self.read_string();
        let key = self.heap.key(name);
        let value = self.stack.peek(0)?;
        self.globals.set(key, value);
        self.stack.pop()?;
        Ok(())
    }

    fn op_set_global(&mut self) -> Result<()> {
        let name = self.read_string();
        let key = self.heap.key(name);
        let value = self.stack.peek(0)?;
        if !self.globals.set_existing(key, value) {
            return Err(RuntimeError::UndefinedVariable(
                self.heap.string(name).chars.to_string(),
            ));
        }
        Ok(())
    }

    fn op_get_upvalue(&mut self) -> Result<()> {
        let index = self.read_byte() as usize;
        let upvalue = self.heap.closure(self.frame().closure).upvalues[index];
        let value = match self.heap.upvalue(upvalue).slot {
            UpvalueSlot::Open(slot) => self.stack.get(slot)?,
            UpvalueSlot::Closed(value) => value,
        };
        self.stack.push(value)
    }

    fn op_set_upvalue(&mut self) -> Result<()> {
        let index = self.read_byte() as usize;
        let upvalue = self.heap.closure(self.frame().closure).upvalues[index];
        let value = self.stack.peek(0)?;
        match self.heap.upvalue(upvalue).slot {
            UpvalueSlot::Open(slot) => self.stack.set(slot, value)?,
            UpvalueSlot::Closed(_) => {
                self.heap.upvalue_mut(upvalue).slot = UpvalueSlot::Closed(value);
            }
        }
        Ok(())
    }

    fn op_get_property(&mut self) -> Result<()> {
        let name = self.read_string();
        let receiver = self.stack.peek(0)?;
        let instance = receiver
            .as_obj()
            .filter(|r| matches!(self.heap.get(*r), Obj::Instance(_)))
            .ok_or(RuntimeError::OnlyInstancesHaveProperties)?;

        let key = self.heap.key(name);
        if let Some(value) = self.heap.instance(instance).fields.get(key) {
            self.stack.pop()?;
            return self.stack.push(value);
        }

        let class = self.heap.instance(instance).class;
        self.bind_method(class, name)
    }

    fn op_set_property(&mut self) -> Result<()> {
        let name = self.read_string();
        let target = self.stack.peek(1)?;
        let instance = target
            .as_obj()
            .filter(|r| matches!(self.heap.get(*r), Obj::Instance(_)))
            .ok_or(RuntimeError::OnlyInstancesHaveFields)?;

        let key = self.heap.key(name);
        let value = self.stack.peek(0)?;
        self.heap.instance_mut(instance).fields.set(key, value);

        // The assigned value is the expression's result.
        let value = self.stack.pop()?;
        self.stack.pop()?;
        self.stack.push(value)
    }

    fn op_get_super(&mut self) -> Result<()> {
        let name = self.read_string();
        let superclass = self
            .stack
            .pop()?
            .as_obj()
            .expect("superclass slot must hold a class");
        self.bind_method(superclass, name)
    }

    fn op_equal(&mut self) -> Result<()> {
        let b = self.stack.pop()?;
        let a = self.stack.pop()?;
        self.stack.push(Value::Bool(a == b))
    }

    fn binary_number_op(&mut self, op: impl Fn(f64, f64) -> Value) -> Result<()> {
        let (Value::Number(b), Value::Number(a)) = (self.stack.peek(0)?, self.stack.peek(1)?)
        else {
            return Err(RuntimeError::OperandsMustBeNumbers);
        };
        self.stack.pop()?;
        self.stack.pop()?;
        self.stack.push(op(a, b))
    }

    fn op_greater(&mut self) -> Result<()> {
        self.binary_number_op(|a, b| Value::Bool(a > b))
    }

    fn op_less(&mut self) -> Result<()> {
        self.binary_number_op(|a, b| Value::Bool(a < b))
    }

    fn op_add(&mut self) -> Result<()> {
        let b = self.stack.peek(0)?;
        let a = self.stack.peek(1)?;
        match (a, b) {
            (Value::Number(a), Value::Number(b)) => {
                self.stack.pop()?;
                self.stack.pop()?;
                self.stack.push(Value::Number(a + b))
            }
            (Value::Obj(x), Value::Obj(y))
                if matches!(self.heap.get(x), Obj::Str(_))
                    && matches!(self.heap.get(y), Obj::Str(_)) =>
            {
                self.concatenate(x, y)
            }
            _ => Err(RuntimeError::OperandsMustBeNumbersOrStrings),
        }
    }

    /// Concatenate two strings. The operands stay on the stack until the
    /// result exists, so a collection triggered by the new allocation still
    /// sees them as roots.
    fn concatenate(&mut self, a: ObjRef, b: ObjRef) -> Result<()> {
        let a_chars = &self.heap.string(a).chars;
        let b_chars = &self.heap.string(b).chars;
        let mut chars = String::with_capacity(a_chars.len() + b_chars.len());
        chars.push_str(a_chars);
        chars.push_str(b_chars);

        let result = self.intern(&chars);
        self.stack.pop()?;
        self.stack.pop()?;
        self.stack.push(Value::Obj(result))
    }

    fn op_subtract(&mut self) -> Result<()> {
        self.binary_number_op(|a, b| Value::Number(a - b))
    }

    fn op_multiply(&mut self) -> Result<()> {
        self.binary_number_op(|a, b| Value::Number(a * b))
    }

    fn op_divide(&mut self) -> Result<()> {
        self.binary_number_op(|a, b| Value::Number(a / b))
    }

    fn op_not(&mut self) -> Result<()> {
        let value = self.stack.pop()?;
        self.stack.push(Value::Bool(value.is_falsey()))
    }

    fn op_negate(&mut self) -> Result<()> {
        let Value::Number(n) = self.stack.peek(0)? else {
            return Err(RuntimeError::OperandMustBeNumber);
        };
        self.stack.pop()?;
        self.stack.push(Value::Number(-n))
    }

    fn op_print(&mut self) -> Result<()> {
        let value = self.stack.pop()?;
        let text = self.heap.format_value(value);
        let _ = writeln!(self.out, "{}", text);
        Ok(())
    }

    fn op_jump(&mut self) -> Result<()> {
        let offset = self.read_u16() as usize;
        self.frame_mut().ip += offset;
        Ok(())
    }

    fn op_jump_if_false(&mut self) -> Result<()> {
        let offset = self.read_u16() as usize;
        if self.stack.peek(0)?.is_falsey() {
            self.frame_mut().ip += offset;
        }
        Ok(())
    }

    fn op_loop(&mut self) -> Result<()> {
        let offset = self.read_u16() as usize;
        self.frame_mut().ip -= offset;
        Ok(())
    }

    fn op_call(&mut self) -> Result<()> {
        let argc = self.read_byte() as usize;
        let callee = self.stack.peek(argc)?;
        self.call_value(callee, argc)
    }

    fn op_invoke(&mut self) -> Result<()> {
        let name = self.read_string();
        let argc = self.read_byte() as usize;
        self.invoke(name, argc)
    }

    fn op_super_invoke(&mut self) -> Result<()> {
        let name = self.read_string();
        let argc = self.read_byte() as usize;
        let superclass = self
            .stack
            .pop()?
            .as_obj()
            .expect("superclass slot must hold a class");
        self.invoke_from_class(superclass, name, argc)
    }

    fn op_closure(&mut self) -> Result<()> {
        let function = self
            .read_constant()
            .as_obj()
            .expect("closure operand must be a function constant");
        let upvalue_count = self.heap.function(function).upvalue_count;

        // Push the closure before resolving captures: capturing can
        // allocate, and the half-built closure must be reachable.
        let closure = self.alloc(Obj::Closure(ObjClosure {
            function,
            upvalues: Vec::with_capacity(upvalue_count),
        }));
        self.stack.push(Value::Obj(closure))?;

        for _ in 0..upvalue_count {
            let is_local = self.read_byte() == 1;
            let index = self.read_byte() as usize;
            let upvalue = if is_local {
                let slot = self.frame().slots + index;
                self.capture_upvalue(slot)
            } else {
                self.heap.closure(self.frame().closure).upvalues[index]
            };
            self.heap.closure_mut(closure).upvalues.push(upvalue);
        }
        Ok(())
    }

    fn op_close_upvalue(&mut self) -> Result<()> {
        self.close_upvalues(self.stack.len() - 1)?;
        self.stack.pop()?;
        Ok(())
    }

    fn op_return(&mut self) -> Result<Flow> {
        let result = self.stack.pop()?;
        let frame = self.frames.pop().expect("no active frame");
        self.close_upvalues(frame.slots)?;
        self.stack.truncate(frame.slots);

        if self.frames.is_empty() {
            return Ok(Flow::Halt);
        }
        self.stack.push(result)?;
        Ok(Flow::Continue)
    }

    fn op_class(&mut self) -> Result<()> {
        let name = self.read_string();
        let class = self.alloc(Obj::Class(crate::object::ObjClass {
            name,
            methods: Table::new(),
        }));
        self.stack.push(Value::Obj(class))
    }

    fn op_inherit(&mut self) -> Result<()> {
        let superclass = self
            .stack
            .peek(1)?
            .as_obj()
            .filter(|r| matches!(self.heap.get(*r), Obj::Class(_)))
            .ok_or(RuntimeError::SuperclassMustBeClass)?;

        // Copy-down inheritance: subclass method tables start as a snapshot
        // of the superclass, so lookup never walks a chain.
        let methods = self.heap.class(superclass).methods.clone();
        let subclass = self
            .stack
            .peek(0)?
            .as_obj()
            .expect("subclass slot must hold a class");
        self.heap.class_mut(subclass).methods.add_all(&methods);
        self.stack.pop()?;
        Ok(())
    }

    fn op_method(&mut self) -> Result<()> {
        let name = self.read_string();
        let key = self.heap.key(name);
        let method = self.stack.peek(0)?;
        let class = self
            .stack
            .peek(1)?
            .as_obj()
            .expect("class slot must hold a class");
        self.heap.class_mut(class).methods.set(key, method);
        self.stack.pop()?;
        Ok(())
    }
}

impl Default for Vm {
    fn default() -> Self {
        Self::new()
    }
}
