// lark-vm - Closure and upvalue tests
// Copyright (c) 2025 Tom Waddington. MIT licensed.

mod common;

use common::*;

#[test]
fn counter_keeps_private_state() {
    expect_output(
        "fun makeCounter() { var n = 0; fun c() { n = n + 1; return n; } return c; }\n\
         var c = makeCounter(); print c(); print c(); print c();",
        &["1", "2", "3"],
    );
}

#[test]
fn counters_do_not_share_state() {
    expect_output(
        "fun makeCounter() { var n = 0; fun c() { n = n + 1; return n; } return c; }\n\
         var a = makeCounter(); var b = makeCounter();\n\
         print a(); print a(); print b();",
        &["1", "2", "1"],
    );
}

#[test]
fn closure_reads_value_at_close_time() {
    expect_output(
        "var f; { var x = \"inside\"; fun g() { print x; } f = g; } f();",
        &["inside"],
    );
}

#[test]
fn closures_share_one_upvalue_cell() {
    // Both closures capture the same variable; writes through one are
    // visible through the other, before and after the scope exits.
    expect_output(
        "var get; var set;\n\
         { var shared = \"initial\";\n\
           fun g() { return shared; }\n\
           fun s(v) { shared = v; }\n\
           get = g; set = s; }\n\
         print get(); set(\"updated\"); print get();",
        &["initial", "updated"],
    );
}

#[test]
fn open_upvalue_writes_are_visible_to_the_stack_slot() {
    expect_output(
        "{ var x = 1; fun bump() { x = x + 1; } bump(); bump(); print x; }",
        &["3"],
    );
}

#[test]
fn transitive_capture_through_nested_functions() {
    expect_output(
        "fun outer() { var x = \"captured\"; fun middle() { fun inner() { print x; } inner(); } middle(); }\n\
         outer();",
        &["captured"],
    );
}

#[test]
fn returned_nested_closure_keeps_outermost_variable() {
    expect_output(
        "fun outer() { var x = 10; fun middle() { fun inner() { return x; } return inner; } return middle(); }\n\
         print outer()();",
        &["10"],
    );
}

#[test]
fn sibling_closures_in_one_scope() {
    expect_output(
        "fun pair() { var n = 0; fun inc() { n = n + 1; } fun get() { return n; } inc(); inc(); return get; }\n\
         print pair()();",
        &["2"],
    );
}

#[test]
fn for_loop_variable_is_one_shared_binding() {
    // The `var` in a for clause is hoisted to the loop scope: every
    // iteration's closures capture the same variable, so they all see its
    // final value.
    expect_output(
        "var a; var b;\n\
         for (var i = 0; i < 2; i = i + 1) {\n\
           fun f() { return i; }\n\
           if (i == 0) a = f; else b = f;\n\
         }\n\
         print a(); print b();",
        &["2", "2"],
    );
}

#[test]
fn body_local_redeclared_each_iteration_is_fresh() {
    // Declaring inside the body creates a new binding per iteration.
    expect_output(
        "var a; var b;\n\
         for (var i = 0; i < 2; i = i + 1) {\n\
           var j = i;\n\
           fun f() { return j; }\n\
           if (i == 0) a = f; else b = f;\n\
         }\n\
         print a(); print b();",
        &["0", "1"],
    );
}

#[test]
fn while_loop_closures_capture_per_iteration_locals() {
    expect_output(
        "var first; var i = 0;\n\
         while (i < 3) { var captured = i * 10; fun f() { return captured; } if (i == 0) first = f; i = i + 1; }\n\
         print first();",
        &["0"],
    );
}

#[test]
fn closure_over_parameter() {
    expect_output(
        "fun adder(n) { fun add(x) { return x + n; } return add; }\n\
         var add5 = adder(5); print add5(3); print add5(10);",
        &["8", "15"],
    );
}

#[test]
fn assignment_through_closed_upvalue() {
    expect_output(
        "fun make() { var v = 1; fun set(x) { v = x; } fun get() { return v; } set(99); return get; }\n\
         print make()();",
        &["99"],
    );
}
