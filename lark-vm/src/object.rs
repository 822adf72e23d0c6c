// lark-vm - Heap object variants
// Copyright (c) 2025 Tom Waddington. MIT licensed.

//! Heap object variants.
//!
//! Every heap allocation is one of these variants, stored in a slot of the
//! [`Heap`](crate::heap::Heap) and addressed by [`ObjRef`]. The split
//! between [`ObjFunction`] (the compiled prototype, shared) and
//! [`ObjClosure`] (the runtime pairing with captured upvalues) mirrors the
//! chunk/closure split in the compiler.

use std::rc::Rc;

use crate::chunk::Chunk;
use crate::table::Table;
use crate::value::{ObjRef, Value};
use crate::vm::{Result, Vm};

/// An interned string. Immutable; the FNV-1a hash is computed once at
/// interning time.
#[derive(Debug)]
pub struct ObjStr {
    pub chars: Box<str>,
    pub hash: u32,
}

/// A compiled function prototype.
///
/// Produced by the compiler and never mutated afterwards; the chunk is
/// shared via `Rc` with every call frame executing it.
#[derive(Debug)]
pub struct ObjFunction {
    pub arity: u8,
    pub upvalue_count: usize,
    pub chunk: Rc<Chunk>,
    /// Interned name, `None` for the top-level script.
    pub name: Option<ObjRef>,
}

/// A host function callable from Lark code.
///
/// The callee reads its arguments from the VM stack window and returns the
/// result value; the VM pops the arguments and callee slot itself.
pub type NativeFn = fn(&mut Vm, usize) -> Result<Value>;

#[derive(Debug)]
pub struct ObjNative {
    pub function: NativeFn,
}

/// A function paired with its captured upvalues. One is created every time
/// a `Closure` instruction runs, so closures over the same function may
/// share or differ in their upvalue bindings.
#[derive(Debug)]
pub struct ObjClosure {
    pub function: ObjRef,
    pub upvalues: Vec<ObjRef>,
}

/// Where an upvalue's variable currently lives.
#[derive(Debug, Clone, Copy)]
pub enum UpvalueSlot {
    /// The variable is still live on the value stack at this absolute slot.
    Open(usize),
    /// The variable has been hoisted into the upvalue itself.
    Closed(Value),
}

/// A heap cell mediating access to a captured variable.
#[derive(Debug)]
pub struct ObjUpvalue {
    pub slot: UpvalueSlot,
}

#[derive(Debug)]
pub struct ObjClass {
    pub name: ObjRef,
    pub methods: Table,
}

#[derive(Debug)]
pub struct ObjInstance {
    pub class: ObjRef,
    pub fields: Table,
}

/// A method extracted from an instance, remembering its receiver.
#[derive(Debug)]
pub struct ObjBoundMethod {
    pub receiver: Value,
    /// Always a closure.
    pub method: ObjRef,
}

/// A heap object.
#[derive(Debug)]
pub enum Obj {
    Str(ObjStr),
    Function(ObjFunction),
    Native(ObjNative),
    Closure(ObjClosure),
    Upvalue(ObjUpvalue),
    Class(ObjClass),
    Instance(ObjInstance),
    BoundMethod(ObjBoundMethod),
}

impl Obj {
    /// Push every object this one references onto the gray worklist.
    ///
    /// Regular tables are strong: both keys and values are traced. The
    /// intern set is not an object field, so weakness is handled by the
    /// heap, not here.
    pub fn trace(&self, gray: &mut Vec<ObjRef>) {
        match self {
            Obj::Str(_) | Obj::Native(_) => {}
            Obj::Function(f) => {
                if let Some(name) = f.name {
                    gray.push(name);
                }
                for constant in &f.chunk.constants {
                    if let Value::Obj(r) = constant {
                        gray.push(*r);
                    }
                }
            }
            Obj::Closure(c) => {
                gray.push(c.function);
                gray.extend(&c.upvalues);
            }
            Obj::Upvalue(u) => {
                if let UpvalueSlot::Closed(Value::Obj(r)) = u.slot {
                    gray.push(r);
                }
            }
            Obj::Class(c) => {
                gray.push(c.name);
                trace_table(&c.methods, gray);
            }
            Obj::Instance(i) => {
                gray.push(i.class);
                trace_table(&i.fields, gray);
            }
            Obj::BoundMethod(b) => {
                if let Value::Obj(r) = b.receiver {
                    gray.push(r);
                }
                gray.push(b.method);
            }
        }
    }

    /// Approximate heap footprint in bytes, used for the GC trigger.
    pub fn size_bytes(&self) -> usize {
        let payload = match self {
            Obj::Str(s) => s.chars.len(),
            Obj::Function(f) => {
                f.chunk.code.len()
                    + f.chunk.constants.len() * std::mem::size_of::<Value>()
                    + f.chunk.lines.len() * std::mem::size_of::<u32>()
            }
            Obj::Native(_) => 0,
            Obj::Closure(c) => c.upvalues.len() * std::mem::size_of::<ObjRef>(),
            Obj::Upvalue(_) => 0,
            Obj::Class(c) => c.methods.size_bytes(),
            Obj::Instance(i) => i.fields.size_bytes(),
            Obj::BoundMethod(_) => 0,
        };
        std::mem::size_of::<Obj>() + payload
    }

    /// The value's type, as shown in diagnostics.
    pub fn kind_name(&self) -> &'static str {
        match self {
            Obj::Str(_) => "string",
            Obj::Function(_) => "function",
            Obj::Native(_) => "native function",
            Obj::Closure(_) => "function",
            Obj::Upvalue(_) => "upvalue",
            Obj::Class(_) => "class",
            Obj::Instance(_) => "instance",
            Obj::BoundMethod(_) => "method",
        }
    }
}

fn trace_table(table: &Table, gray: &mut Vec<ObjRef>) {
    for (key, value) in table.iter() {
        gray.push(key.obj);
        if let Value::Obj(r) = value {
            gray.push(r);
        }
    }
}
