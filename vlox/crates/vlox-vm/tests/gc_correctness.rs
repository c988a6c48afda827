//! Collector correctness: reachable objects survive, garbage does not,
//! and collection never changes observable behavior.

mod common;

use common::{assert_prints, run, run_stressed, run_with};
use vlox_core::GcConfig;
use vlox_vm::{Vm, VmConfig};

fn tiny_heap_config() -> VmConfig {
    VmConfig {
        gc: GcConfig {
            // A few objects' worth: collections happen constantly.
            first_threshold: 512,
            growth_factor: 2,
            stress: false,
        },
        ..VmConfig::default()
    }
}

#[test]
fn test_explicit_collection_reclaims_garbage() {
    let mut vm = Vm::new();
    // The block's strings become unreachable when it exits; the
    // concatenation results are fresh allocations, not literals held
    // by the script's constant pool.
    vm.interpret("{ var t = \"aaa\" + \"bbb\"; t = t + \"ccc\"; }")
        .expect("program runs");
    let before = vm.heap().object_count();
    vm.collect_garbage();
    let after = vm.heap().object_count();
    assert!(after < before, "collection freed nothing ({before} -> {after})");
}

#[test]
fn test_globals_survive_collection() {
    let mut vm = Vm::new();
    vm.interpret("var keep = \"kept\" + \" string\";").expect("runs");
    vm.collect_garbage();
    assert!(vm.interpret("print keep == \"kept string\";").is_ok());
}

#[test]
fn test_repeated_collection_is_idempotent() {
    let mut vm = Vm::new();
    vm.interpret("var a = \"x\" + \"y\";").expect("runs");
    vm.collect_garbage();
    let count = vm.heap().object_count();
    vm.collect_garbage();
    assert_eq!(vm.heap().object_count(), count);
}

#[test]
fn test_closed_upvalues_survive_collection() {
    // The captured value is reachable only through the closed upvalue.
    assert_prints(
        "var f; \
         { var secret = \"hidden \" + \"value\"; fun get() { return secret; } f = get; } \
         print f();",
        &["hidden value"],
    );
    // Same program under constant collection pressure.
    let (result, output) = run_stressed(
        "var f; \
         { var secret = \"hidden \" + \"value\"; fun get() { return secret; } f = get; } \
         print f();",
    );
    assert!(result.is_ok());
    assert_eq!(output, "hidden value\n");
}

#[test]
fn test_heavy_churn_under_tiny_heap() {
    // Builds and drops thousands of strings; a missed root or a bad
    // sweep shows up as wrong output or a panic.
    let source = "var acc = \"\"; \
                  for (var i = 0; i < 200; i = i + 1) { \
                    var waste = \"tmp\" + \"oral\"; \
                    acc = acc + \"x\"; \
                  } \
                  print acc == acc; print \"done\";";
    let (result, output) = run_with(tiny_heap_config(), source);
    assert!(result.is_ok());
    assert_eq!(output, "true\ndone\n");
}

#[test]
fn test_stress_mode_matches_default_output() {
    let programs = [
        "print 1 + 2 * 3;",
        "var a = \"hi\"; var b = \" there\"; print a + b;",
        "fun mk() { var x = 0; fun inc() { x = x + 1; return x; } return inc; } \
         var f = mk(); print f(); print f(); print f();",
        "class A { greet() { print \"A\"; } } \
         class B < A { greet() { super.greet(); print \"B\"; } } \
         B().greet();",
        "class P { init(x) { this.x = x; } } var p = P(42); print p.x;",
        "for (var i = 0; i < 3; i = i + 1) { print i; }",
        "class Ring { init(n) { this.n = n; this.next = nil; } } \
         var a = Ring(1); var b = Ring(2); \
         a.next = b; b.next = a; \
         print a.next.n; print b.next.n;",
    ];
    for source in programs {
        let plain = run(source);
        let stressed = run_stressed(source);
        assert_eq!(plain, stressed, "stress diverged on: {source}");
    }
}

#[test]
fn test_cyclic_instances_are_collected() {
    // Two instances referencing each other die together once the block
    // exits; reference counting would leak them, tracing must not.
    let mut vm = Vm::new();
    vm.interpret(
        "class Node { init() { this.peer = nil; } } \
         { var a = Node(); var b = Node(); a.peer = b; b.peer = a; }",
    )
    .expect("runs");
    let before = vm.heap().object_count();
    vm.collect_garbage();
    assert!(vm.heap().object_count() < before);
    // The VM still works afterwards.
    vm.interpret("print \"alive\";").expect("still runs");
}

#[test]
fn test_interned_strings_can_die() {
    let mut vm = Vm::new();
    // A string only the intern set knows about: created, then dropped.
    vm.interpret("{ var tmp = \"doomed\" + \" string\"; }").expect("runs");
    vm.collect_garbage();
    let after_first = vm.heap().object_count();
    vm.collect_garbage();
    // Nothing else to free: the doomed string went in the first cycle.
    assert_eq!(vm.heap().object_count(), after_first);
}
