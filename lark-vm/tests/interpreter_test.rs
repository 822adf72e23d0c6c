// lark-vm - Interpreter tests: expressions, statements, control flow
// Copyright (c) 2025 Tom Waddington. MIT licensed.

mod common;

use common::*;
use lark_vm::{InterpretResult, Vm};

// =============================================================================
// Arithmetic & precedence
// =============================================================================

#[test]
fn arithmetic_precedence() {
    expect_output("print 1 + 2 * 3 - 4 / 2;", &["5"]);
}

#[test]
fn grouping_overrides_precedence() {
    expect_output("print (1 + 2) * 3;", &["9"]);
    expect_output("print -(1 + 2);", &["-3"]);
}

#[test]
fn unary_minus_binds_tighter_than_binary() {
    expect_output("print -2 * 3;", &["-6"]);
    expect_output("print 2 - -3;", &["5"]);
}

#[test]
fn division_produces_fractions() {
    expect_output("print 5 / 2;", &["2.5"]);
}

#[test]
fn number_formatting() {
    expect_output("print 1.0;", &["1"]);
    expect_output("print 0.5;", &["0.5"]);
    expect_output("print 100;", &["100"]);
}

// =============================================================================
// Ternary & hex literals
// =============================================================================

#[test]
fn ternary_with_hex_literal() {
    expect_output("print 0xFF > 0 ? \"yes\" : \"no\";", &["yes"]);
}

#[test]
fn hex_literals() {
    expect_output("print 0x10;", &["16"]);
    expect_output("print 0XFF;", &["255"]);
    expect_output("print 0x0;", &["0"]);
}

#[test]
fn ternary_is_right_associative() {
    // a ? b : (c ? d : e)
    expect_output("print false ? 1 : true ? 2 : 3;", &["2"]);
    expect_output("print false ? 1 : false ? 2 : 3;", &["3"]);
}

#[test]
fn ternary_arms_run_lazily() {
    expect_output(
        "var picked = true ? \"then\" : undefinedGlobal; print picked;",
        &["then"],
    );
}

// =============================================================================
// Strings & interning
// =============================================================================

#[test]
fn concat_equals_interned_literal() {
    expect_output("print \"foo\" + \"bar\" == \"foobar\";", &["true"]);
}

#[test]
fn string_concatenation_chains() {
    expect_output("print \"a\" + \"b\" + \"c\";", &["abc"]);
}

#[test]
fn string_comparison_is_by_content() {
    expect_output("print \"a\" == \"a\";", &["true"]);
    expect_output("print \"a\" == \"b\";", &["false"]);
    expect_output("print \"a\" != \"b\";", &["true"]);
}

#[test]
fn strings_and_numbers_are_never_equal() {
    expect_output("print \"1\" == 1;", &["false"]);
}

// =============================================================================
// Truthiness
// =============================================================================

#[test]
fn only_nil_and_false_are_falsey() {
    expect_output("print !!nil;", &["false"]);
    expect_output("print !!false;", &["false"]);
    expect_output("print !!true;", &["true"]);
    expect_output("print !!0;", &["true"]);
    expect_output("print !!\"\";", &["true"]);
    expect_output("print !!\"text\";", &["true"]);
}

#[test]
fn comparisons() {
    expect_output("print 1 < 2;", &["true"]);
    expect_output("print 2 <= 2;", &["true"]);
    expect_output("print 3 > 4;", &["false"]);
    expect_output("print 4 >= 5;", &["false"]);
    expect_output("print nil == nil;", &["true"]);
    expect_output("print 1 == 1;", &["true"]);
    expect_output("print 1 != 2;", &["true"]);
}

// =============================================================================
// Variables & scoping
// =============================================================================

#[test]
fn global_declaration_and_assignment() {
    expect_output("var a = 1; a = 2; print a;", &["2"]);
    expect_output("var a; print a;", &["nil"]);
}

#[test]
fn assignment_is_an_expression() {
    expect_output("var a = 1; var b = a = 3; print a; print b;", &["3", "3"]);
}

#[test]
fn locals_shadow_globals() {
    expect_output(
        "var a = \"global\"; { var a = \"local\"; print a; } print a;",
        &["local", "global"],
    );
}

#[test]
fn nested_block_scopes() {
    expect_output(
        "var a = 1; { var a = 2; { var a = 3; print a; } print a; } print a;",
        &["3", "2", "1"],
    );
}

#[test]
fn globals_persist_across_interpret_calls() {
    let mut vm = Vm::new();
    let first = run_in(&mut vm, "var shared = 41;");
    assert_eq!(first.result, InterpretResult::Ok);
    let second = run_in(&mut vm, "print shared + 1;");
    assert_eq!(second.result, InterpretResult::Ok);
    assert_eq!(second.stdout, "42\n");
}

// =============================================================================
// Control flow
// =============================================================================

#[test]
fn if_else() {
    expect_output("if (true) print \"then\"; else print \"else\";", &["then"]);
    expect_output("if (false) print \"then\"; else print \"else\";", &["else"]);
    expect_output("if (nil) print \"then\";", &[]);
}

#[test]
fn while_loop() {
    expect_output(
        "var i = 0; while (i < 3) { print i; i = i + 1; }",
        &["0", "1", "2"],
    );
}

#[test]
fn for_loop() {
    expect_output(
        "for (var i = 0; i < 3; i = i + 1) print i;",
        &["0", "1", "2"],
    );
}

#[test]
fn for_loop_without_clauses() {
    // No condition or increment: only a return can leave the loop.
    expect_output(
        "fun f() { for (;;) { return \"done\"; } } print f();",
        &["done"],
    );
}

#[test]
fn for_loop_condition_only() {
    expect_output(
        "var i = 0; for (; i < 2;) { print i; i = i + 1; }",
        &["0", "1"],
    );
}

#[test]
fn and_or_short_circuit() {
    expect_output("print true and \"right\";", &["right"]);
    expect_output("print false and \"right\";", &["false"]);
    expect_output("print nil or \"fallback\";", &["fallback"]);
    expect_output("print \"left\" or \"right\";", &["left"]);
}

#[test]
fn short_circuit_skips_side_effects() {
    expect_output(
        "fun boom() { print \"boom\"; return true; } false and boom(); print \"ok\";",
        &["ok"],
    );
    expect_output(
        "fun boom() { print \"boom\"; return true; } true or boom(); print \"ok\";",
        &["ok"],
    );
}

// =============================================================================
// Functions
// =============================================================================

#[test]
fn function_declaration_and_call() {
    expect_output("fun add(a, b) { return a + b; } print add(1, 2);", &["3"]);
}

#[test]
fn function_without_return_yields_nil() {
    expect_output("fun noop() {} print noop();", &["nil"]);
}

#[test]
fn recursion() {
    expect_output(
        "fun fib(n) { if (n < 2) return n; return fib(n - 1) + fib(n - 2); } print fib(10);",
        &["55"],
    );
}

#[test]
fn functions_are_first_class() {
    expect_output(
        "fun twice(f, x) { return f(f(x)); } fun inc(n) { return n + 1; } print twice(inc, 5);",
        &["7"],
    );
}

#[test]
fn function_prints_by_name() {
    expect_output("fun named() {} print named;", &["<fn named>"]);
    expect_output("print clock;", &["<native fn>"]);
}
