// lark-vm - Disassembler and line table tests
// Copyright (c) 2025 Tom Waddington. MIT licensed.

use lark_vm::compile;
use lark_vm::debug::{disassemble_instruction, dump_source};
use lark_vm::heap::Heap;

#[test]
fn line_table_covers_every_code_byte() {
    let mut heap = Heap::new();
    let script = compile("var a = 1;\nvar b = 2;\nprint a + b;\n", &mut heap).expect("compiles");
    let chunk = heap.function(script).chunk.clone();
    assert_eq!(chunk.code.len(), chunk.lines.len());
}

#[test]
fn walking_instructions_recovers_source_lines() {
    let mut heap = Heap::new();
    let source = "var a = 1;\nvar b = 2;\nprint a + b;\n";
    let script = compile(source, &mut heap).expect("compiles");
    let chunk = heap.function(script).chunk.clone();

    let mut offset = 0;
    let mut lines = Vec::new();
    let mut previous_line = 0;
    while offset < chunk.code.len() {
        let (_, next) = disassemble_instruction(&heap, &chunk, offset);
        let line = chunk.line(offset);
        // A straight-line script's lines never go backwards.
        assert!(
            line >= previous_line,
            "line went backwards at offset {}: {} < {}",
            offset,
            line,
            previous_line
        );
        previous_line = line;
        lines.push(line);
        offset = next;
    }

    // Each statement contributed at least one instruction on its line.
    for expected in 1..=3 {
        assert!(
            lines.contains(&expected),
            "no instruction recorded for line {}: {:?}",
            expected,
            lines
        );
    }
}

#[test]
fn operand_bytes_share_the_opcode_line() {
    let mut heap = Heap::new();
    let script = compile("print 1;", &mut heap).expect("compiles");
    let chunk = heap.function(script).chunk.clone();
    // Constant opcode and its index operand both map to line 1.
    assert_eq!(chunk.line(0), 1);
    assert_eq!(chunk.line(1), 1);
}

#[test]
fn dump_includes_script_and_nested_functions() {
    let dump = dump_source("fun greet(name) { print \"hi \" + name; }\ngreet(\"you\");\n")
        .expect("compiles");
    assert!(dump.contains("== script =="), "dump: {}", dump);
    assert!(dump.contains("== fn greet =="), "dump: {}", dump);
    assert!(dump.contains("CONSTANT"), "dump: {}", dump);
    assert!(dump.contains("RETURN"), "dump: {}", dump);
}

#[test]
fn dump_reports_compile_errors() {
    let errors = dump_source("var = broken;").expect_err("must fail");
    assert!(!errors.is_empty());
    assert!(errors[0].to_string().contains("Expect variable name."));
}

#[test]
fn closure_disassembly_lists_captures() {
    let dump = dump_source(
        "fun outer() { var x = 1; fun inner() { return x; } return inner; }\n",
    )
    .expect("compiles");
    assert!(dump.contains("CLOSURE"), "dump: {}", dump);
    assert!(dump.contains("local"), "dump: {}", dump);
}
