//! Bytecode disassembler.
//!
//! Renders chunks and single instructions in a readable columnar form,
//! used by the VM's instruction tracing and by tests that pin down
//! emitted code. Purely observational; never mutates anything.

use vlox_core::{Chunk, Heap, OpCode, Value};

/// Disassembles a whole chunk under a header line.
///
/// # Example
///
/// ```
/// use vlox_core::{GcConfig, Heap, Strings};
///
/// let mut heap = Heap::new(GcConfig::default());
/// let mut strings = Strings::new();
/// let script = vlox_compiler::compile("print 1;", &mut heap, &mut strings).unwrap();
/// let text = vlox_vm::disassemble_chunk(&heap, &heap.function(script).chunk, "script");
/// assert!(text.contains("Constant"));
/// assert!(text.contains("Print"));
/// ```
pub fn disassemble_chunk(heap: &Heap, chunk: &Chunk, name: &str) -> String {
    let mut text = format!("== {name} ==\n");
    let mut offset = 0;
    while offset < chunk.len() {
        let (line, next) = disassemble_instruction(heap, chunk, offset);
        text.push_str(&line);
        text.push('\n');
        offset = next;
    }
    text
}

/// Disassembles the instruction at `offset`; returns its rendering and
/// the offset of the next instruction.
pub fn disassemble_instruction(heap: &Heap, chunk: &Chunk, offset: usize) -> (String, usize) {
    let mut text = format!("{offset:04} ");
    if offset > 0 && chunk.line(offset) == chunk.line(offset - 1) {
        text.push_str("   | ");
    } else {
        text.push_str(&format!("{:4} ", chunk.line(offset)));
    }

    let byte = chunk.byte(offset);
    let op = match OpCode::try_from(byte) {
        Ok(op) => op,
        Err(_) => {
            text.push_str(&format!("Unknown opcode {byte}"));
            return (text, offset + 1);
        }
    };

    use OpCode::*;
    let next = match op {
        Nil | True | False | Pop | Equal | Greater | Less | Add | Subtract | Multiply
        | Divide | Not | Negate | Print | CloseUpvalue | Return | Inherit => {
            text.push_str(&format!("{op:?}"));
            offset + 1
        }
        Constant | GetGlobal | DefineGlobal | SetGlobal | GetProperty | SetProperty
        | GetSuper | Class | Method => {
            let index = chunk.byte(offset + 1);
            let constant = chunk.constant(index as usize);
            text.push_str(&format!(
                "{op:?} {index} '{}'",
                render_constant(heap, constant)
            ));
            offset + 2
        }
        GetLocal | SetLocal | GetUpvalue | SetUpvalue | Call => {
            let operand = chunk.byte(offset + 1);
            text.push_str(&format!("{op:?} {operand}"));
            offset + 2
        }
        Jump | JumpIfFalse => {
            let jump = operand_u16(chunk, offset + 1) as usize;
            text.push_str(&format!("{op:?} {offset} -> {}", offset + 3 + jump));
            offset + 3
        }
        Loop => {
            let jump = operand_u16(chunk, offset + 1) as usize;
            text.push_str(&format!("{op:?} {offset} -> {}", offset + 3 - jump));
            offset + 3
        }
        Invoke | InvokeSuper => {
            let index = chunk.byte(offset + 1);
            let arg_count = chunk.byte(offset + 2);
            let constant = chunk.constant(index as usize);
            text.push_str(&format!(
                "{op:?} ({arg_count} args) {index} '{}'",
                render_constant(heap, constant)
            ));
            offset + 3
        }
        Closure => {
            let index = chunk.byte(offset + 1);
            let constant = chunk.constant(index as usize);
            text.push_str(&format!(
                "{op:?} {index} {}",
                render_constant(heap, constant)
            ));
            let mut next = offset + 2;
            if let Value::Obj(function) = constant {
                for _ in 0..heap.function(function).upvalue_count {
                    let is_local = chunk.byte(next);
                    let slot = chunk.byte(next + 1);
                    text.push_str(&format!(
                        "\n{next:04}    |      {} {slot}",
                        if is_local != 0 { "local" } else { "upvalue" }
                    ));
                    next += 2;
                }
            }
            next
        }
    };

    (text, next)
}

fn operand_u16(chunk: &Chunk, offset: usize) -> u16 {
    u16::from_be_bytes([chunk.byte(offset), chunk.byte(offset + 1)])
}

fn render_constant(heap: &Heap, constant: Value) -> String {
    heap.format_value(constant)
}
