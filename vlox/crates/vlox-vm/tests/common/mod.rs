//! Shared helpers for VM integration tests.

use std::cell::RefCell;
use std::io::Write;
use std::rc::Rc;
use vlox_core::GcConfig;
use vlox_vm::{InterpretError, Vm, VmConfig};

/// A `Write` sink tests can read back after the VM is done with it.
#[derive(Clone)]
pub struct SharedBuffer(Rc<RefCell<Vec<u8>>>);

impl SharedBuffer {
    pub fn new() -> Self {
        SharedBuffer(Rc::new(RefCell::new(Vec::new())))
    }

    pub fn contents(&self) -> String {
        String::from_utf8(self.0.borrow().clone()).expect("vm output is UTF-8")
    }
}

impl Write for SharedBuffer {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.0.borrow_mut().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}

/// Runs `source` on a fresh VM; returns the outcome and captured
/// stdout.
pub fn run(source: &str) -> (Result<(), InterpretError>, String) {
    run_with(VmConfig::default(), source)
}

/// Runs `source` with GC stress mode on.
#[allow(dead_code)]
pub fn run_stressed(source: &str) -> (Result<(), InterpretError>, String) {
    let config = VmConfig {
        gc: GcConfig {
            stress: true,
            ..GcConfig::default()
        },
        ..VmConfig::default()
    };
    run_with(config, source)
}

pub fn run_with(config: VmConfig, source: &str) -> (Result<(), InterpretError>, String) {
    let buffer = SharedBuffer::new();
    let mut vm = Vm::with_config(config, Box::new(buffer.clone()));
    let result = vm.interpret(source);
    (result, buffer.contents())
}

/// Asserts `source` runs cleanly and prints exactly `expected` (one
/// line per element).
#[allow(dead_code)]
pub fn assert_prints(source: &str, expected: &[&str]) {
    let (result, output) = run(source);
    assert_eq!(result, Ok(()), "program failed: {source}");
    let mut want = expected.join("\n");
    if !want.is_empty() {
        want.push('\n');
    }
    assert_eq!(output, want, "unexpected output for: {source}");
}
