//! Error outcomes: compile errors refuse to run, runtime errors unwind.

mod common;

use common::run;
use vlox_vm::InterpretError;

fn expect_runtime(source: &str) {
    let (result, output) = run(source);
    assert_eq!(result, Err(InterpretError::Runtime), "source: {source}");
    // Output produced before the error is kept; nothing after it.
    drop(output);
}

fn expect_compile(source: &str) {
    let (result, output) = run(source);
    assert_eq!(result, Err(InterpretError::Compile), "source: {source}");
    assert_eq!(output, "", "compile errors must not execute: {source}");
}

#[test]
fn test_undefined_variable_read() {
    expect_runtime("print missing;");
}

#[test]
fn test_undefined_variable_assignment() {
    expect_runtime("missing = 1;");
}

#[test]
fn test_assignment_to_undefined_does_not_define() {
    // The failed assignment must not leave a binding behind in the
    // same VM's globals.
    let mut vm = vlox_vm::Vm::new();
    assert_eq!(vm.interpret("ghost = 1;"), Err(InterpretError::Runtime));
    assert_eq!(vm.interpret("print ghost;"), Err(InterpretError::Runtime));
}

#[test]
fn test_calling_a_number() {
    expect_runtime("var x = 7; x();");
}

#[test]
fn test_calling_nil() {
    expect_runtime("nil();");
}

#[test]
fn test_arity_mismatch() {
    expect_runtime("fun two(a, b) {} two(1);");
    expect_runtime("fun none() {} none(1);");
}

#[test]
fn test_class_without_init_rejects_arguments() {
    expect_runtime("class C {} C(1);");
}

#[test]
fn test_property_on_non_instance() {
    expect_runtime("var s = \"text\"; print s.length;");
    expect_runtime("print (1).half;");
}

#[test]
fn test_field_write_on_non_instance() {
    expect_runtime("var n = 1; n.field = 2;");
}

#[test]
fn test_method_call_on_non_instance() {
    expect_runtime("var s = \"text\"; s.trim();");
}

#[test]
fn test_undefined_property() {
    expect_runtime("class C {} print C().missing;");
}

#[test]
fn test_undefined_method_via_super() {
    expect_runtime(
        "class A {} class B < A { m() { super.nothing(); } } B().m();",
    );
}

#[test]
fn test_superclass_must_be_a_class() {
    expect_runtime("var NotAClass = 1; class Sub < NotAClass {}");
}

#[test]
fn test_operand_type_errors() {
    expect_runtime("print 1 + nil;");
    expect_runtime("print true + false;");
    expect_runtime("print 1 - \"a\";");
    expect_runtime("print \"a\" * 2;");
    expect_runtime("print 1 < \"a\";");
    expect_runtime("print -\"negate me\";");
}

#[test]
fn test_stack_overflow_on_unbounded_recursion() {
    expect_runtime("fun f() { f(); } f();");
}

#[test]
fn test_output_before_error_is_kept() {
    let (result, output) = run("print \"before\"; missing;");
    assert_eq!(result, Err(InterpretError::Runtime));
    assert_eq!(output, "before\n");
}

#[test]
fn test_compile_errors_do_not_run() {
    expect_compile("print 1");
    expect_compile("var 1 = 2;");
    expect_compile("print \"before error\"; if;");
    expect_compile("return 1;");
    expect_compile("{ var a = a; }");
}

#[test]
fn test_scan_errors_are_compile_errors() {
    expect_compile("var a = @;");
    expect_compile("\"unterminated");
}
