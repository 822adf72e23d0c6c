// lark-vm - Bytecode disassembler
// Copyright (c) 2025 Tom Waddington. MIT licensed.

//! Bytecode disassembler.
//!
//! Renders chunks in a readable column format, used by the CLI's `--dump`
//! flag and by tests that check the line table against the source.

use crate::chunk::Chunk;
use crate::compiler::{CompileError, compile};
use crate::heap::Heap;
use crate::opcode::OpCode;
use crate::value::Value;

/// Disassemble a whole chunk under a header.
pub fn disassemble_chunk(heap: &Heap, chunk: &Chunk, name: &str) -> String {
    let mut out = format!("== {} ==\n", name);
    let mut offset = 0;
    while offset < chunk.code.len() {
        let (text, next) = disassemble_instruction(heap, chunk, offset);
        out.push_str(&text);
        out.push('\n');
        offset = next;
    }
    out
}

/// Disassemble the instruction at `offset`.
///
/// Returns the rendered line and the offset of the next instruction.
pub fn disassemble_instruction(heap: &Heap, chunk: &Chunk, offset: usize) -> (String, usize) {
    let mut line = format!("{:04} ", offset);
    if offset > 0 && chunk.line(offset) == chunk.line(offset - 1) {
        line.push_str("   | ");
    } else {
        line.push_str(&format!("{:4} ", chunk.line(offset)));
    }

    let Some(op) = OpCode::from_byte(chunk.code[offset]) else {
        line.push_str(&format!("Unknown opcode {}", chunk.code[offset]));
        return (line, offset + 1);
    };

    match op {
        OpCode::Constant
        | OpCode::GetGlobal
        | OpCode::DefineGlobal
        | OpCode::SetGlobal
        | OpCode::GetProperty
        | OpCode::SetProperty
        | OpCode::GetSuper
        | OpCode::Class
        | OpCode::Method => {
            let index = chunk.code[offset + 1];
            line.push_str(&format!(
                "{:<16} {:4} '{}'",
                op.name(),
                index,
                heap.format_value(chunk.constants[index as usize])
            ));
            (line, offset + 2)
        }
        OpCode::GetLocal | OpCode::SetLocal | OpCode::GetUpvalue | OpCode::SetUpvalue
        | OpCode::Call => {
            let operand = chunk.code[offset + 1];
            line.push_str(&format!("{:<16} {:4}", op.name(), operand));
            (line, offset + 2)
        }
        OpCode::Jump | OpCode::JumpIfFalse | OpCode::Loop => {
            let jump = u16::from_be_bytes([chunk.code[offset + 1], chunk.code[offset + 2]]);
            let target = if op == OpCode::Loop {
                offset + 3 - jump as usize
            } else {
                offset + 3 + jump as usize
            };
            line.push_str(&format!("{:<16} {:4} -> {}", op.name(), offset, target));
            (line, offset + 3)
        }
        OpCode::Invoke | OpCode::SuperInvoke => {
            let index = chunk.code[offset + 1];
            let argc = chunk.code[offset + 2];
            line.push_str(&format!(
                "{:<16} ({} args) {:4} '{}'",
                op.name(),
                argc,
                index,
                heap.format_value(chunk.constants[index as usize])
            ));
            (line, offset + 3)
        }
        OpCode::Closure => {
            let index = chunk.code[offset + 1];
            let constant = chunk.constants[index as usize];
            line.push_str(&format!(
                "{:<16} {:4} {}",
                op.name(),
                index,
                heap.format_value(constant)
            ));
            let mut next = offset + 2;

            // Each captured variable is a trailing (is_local, index) pair.
            let function = constant
                .as_obj()
                .expect("closure operand must be a function constant");
            for _ in 0..heap.function(function).upvalue_count {
                let is_local = chunk.code[next];
                let slot = chunk.code[next + 1];
                line.push_str(&format!(
                    "\n{:04}    |                     {} {}",
                    next,
                    if is_local == 1 { "local" } else { "upvalue" },
                    slot
                ));
                next += 2;
            }
            (line, next)
        }
        _ => {
            line.push_str(op.name());
            (line, offset + 1)
        }
    }
}

/// Compile a source string and render the disassembly of the script and
/// every function in it.
pub fn dump_source(source: &str) -> Result<String, Vec<CompileError>> {
    let mut heap = Heap::new();
    let script = compile(source, &mut heap)?;

    let mut out = String::new();
    let mut pending = vec![script];
    while let Some(function) = pending.pop() {
        let f = heap.function(function);
        let name = match f.name {
            Some(name) => format!("fn {}", heap.string(name).chars),
            None => "script".to_string(),
        };
        let chunk = f.chunk.clone();
        // Nested functions appear as constants in the enclosing chunk.
        for constant in &chunk.constants {
            if let Value::Obj(r) = constant
                && matches!(heap.get(*r), crate::object::Obj::Function(_))
            {
                pending.push(*r);
            }
        }
        out.push_str(&disassemble_chunk(&heap, &chunk, &name));
    }
    Ok(out)
}
