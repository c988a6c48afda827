//! Closure and upvalue behavior: capture, sharing, closing.

mod common;

use common::assert_prints;

#[test]
fn test_counters_are_independent() {
    assert_prints(
        "fun mk() { var n = 0; fun inc() { n = n + 1; return n; } return inc; } \
         var a = mk(); var b = mk(); \
         print a(); print a(); print b();",
        &["1", "2", "1"],
    );
}

#[test]
fn test_two_closures_share_one_upvalue() {
    assert_prints(
        "fun pair() { \
           var shared = 0; \
           fun set(v) { shared = v; } \
           fun get() { return shared; } \
           set(7); \
           print get(); \
         } \
         pair();",
        &["7"],
    );
}

#[test]
fn test_sharing_survives_the_defining_frame() {
    // Both closures escape; the variable lives on past pair's return,
    // still shared through one closed upvalue.
    assert_prints(
        "var set; var get; \
         fun pair() { \
           var shared = \"initial\"; \
           fun s(v) { shared = v; } \
           fun g() { return shared; } \
           set = s; get = g; \
         } \
         pair(); \
         print get(); \
         set(\"updated\"); \
         print get();",
        &["initial", "updated"],
    );
}

#[test]
fn test_closure_sees_later_assignment() {
    assert_prints(
        "var f; \
         { \
           var x = 1; \
           fun read() { return x; } \
           f = read; \
           x = 2; \
         } \
         print f();",
        &["2"],
    );
}

#[test]
fn test_block_exit_closes_upvalue() {
    // After the block, x only exists inside the closed upvalue.
    assert_prints(
        "var f; \
         { var x = \"captured\"; fun get() { return x; } f = get; } \
         print f();",
        &["captured"],
    );
}

#[test]
fn test_function_return_closes_parameters() {
    assert_prints(
        "fun capture(value) { fun get() { return value; } return get; } \
         var a = capture(\"one\"); var b = capture(\"two\"); \
         print a(); print b();",
        &["one", "two"],
    );
}

#[test]
fn test_loop_variable_is_shared_by_iteration_closures() {
    // One `i` for the whole loop: every closure sees its final value.
    assert_prints(
        "var first; var second; \
         for (var i = 0; i < 2; i = i + 1) { \
           fun get() { return i; } \
           if (first == nil) first = get; else second = get; \
         } \
         print first(); print second();",
        &["2", "2"],
    );
}

#[test]
fn test_body_local_is_fresh_per_iteration() {
    assert_prints(
        "var first; var second; \
         for (var i = 0; i < 2; i = i + 1) { \
           var snapshot = i; \
           fun get() { return snapshot; } \
           if (first == nil) first = get; else second = get; \
         } \
         print first(); print second();",
        &["0", "1"],
    );
}

#[test]
fn test_transitive_capture_through_middle_function() {
    assert_prints(
        "fun outer() { \
           var x = \"through\"; \
           fun middle() { \
             fun inner() { return x; } \
             return inner; \
           } \
           return middle(); \
         } \
         print outer()();",
        &["through"],
    );
}

#[test]
fn test_capture_does_not_copy_before_close() {
    assert_prints(
        "fun run() { \
           var sum = 0; \
           fun add(n) { sum = sum + n; } \
           add(1); add(2); add(3); \
           return sum; \
         } \
         print run();",
        &["6"],
    );
}

#[test]
fn test_closure_in_method_captures_this() {
    assert_prints(
        "class Named { \
           init(name) { this.name = name; } \
           getter() { fun get() { return this.name; } return get; } \
         } \
         var g = Named(\"lox\").getter(); \
         print g();",
        &["lox"],
    );
}
