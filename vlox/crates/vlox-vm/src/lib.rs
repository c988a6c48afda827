//! vlox-vm - The bytecode virtual machine
//!
//! Executes the chunks produced by `vlox-compiler` on a value stack with
//! explicit call frames. The VM owns the whole runtime world: the object
//! heap, the string intern set, the globals table, the open-upvalue
//! list, and the garbage collector that ties them together.
//!
//! One call does everything: [`Vm::interpret`] takes a source string,
//! compiles it, and runs it, distinguishing compile errors from runtime
//! errors in its result. Runtime errors print a message and a stack
//! trace to stderr, unwind completely, and leave the VM reusable (the
//! REPL relies on that).
//!
//! Collection runs only from the VM's allocation points, where every
//! live object is reachable from the roots: the value stack, the call
//! frames, the open-upvalue list, the globals, and the cached `init`
//! string. The intern set is deliberately not a root, which is what
//! makes it weak.

mod debug;
mod gc;
mod natives;
mod vm;

pub use debug::{disassemble_chunk, disassemble_instruction};
pub use vm::{InterpretError, Vm, VmConfig, FRAMES_MAX, STACK_MAX};
