//! The VM: value stack, call frames, and the dispatch loop.

use crate::natives;
use log::trace;
use std::io::{self, Write};
use thiserror::Error;
use vlox_core::{
    BoundMethodObj, ClosureObj, GcConfig, Heap, InstanceObj, NativeFn, ObjKind, ObjRef, OpCode,
    Strings, Table, UpvalueObj, UpvalueState, Value,
};

/// Maximum call depth. Exceeding it is the runtime `Stack overflow.`
/// error.
pub const FRAMES_MAX: usize = 64;

/// Value-stack capacity: every frame can use a full window of 256
/// slots.
pub const STACK_MAX: usize = FRAMES_MAX * 256;

/// How an interpretation failed. A missing variant is success.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Error)]
pub enum InterpretError {
    /// The source did not compile; diagnostics went to stderr, nothing
    /// ran.
    #[error("compile error")]
    Compile,
    /// Execution raised a runtime error; the message and stack trace
    /// went to stderr and the VM unwound completely.
    #[error("runtime error")]
    Runtime,
}

/// VM construction options.
#[derive(Clone, Debug, Default)]
pub struct VmConfig {
    /// Collector tuning (thresholds, stress mode).
    pub gc: GcConfig,
    /// Log every instruction (with stack contents) at `trace!` level.
    pub trace: bool,
}

/// One in-progress call: the closure being run, its instruction offset,
/// and the stack index of its slot zero (the callee or `this`).
#[derive(Clone, Copy)]
pub(crate) struct CallFrame {
    pub(crate) closure: ObjRef,
    /// The closure's function, cached to skip a hop per fetch.
    pub(crate) function: ObjRef,
    pub(crate) ip: usize,
    pub(crate) slots: usize,
}

/// The virtual machine. Owns the heap and all runtime state; reusable
/// across [`Vm::interpret`] calls, which is what a REPL session is.
///
/// # Example
///
/// ```
/// use vlox_vm::Vm;
///
/// let mut vm = Vm::new();
/// assert!(vm.interpret("print 1 + 2 * 3;").is_ok());
/// ```
pub struct Vm {
    // Fields are crate-visible for the collector in `gc`, which walks
    // the roots directly.
    pub(crate) heap: Heap,
    pub(crate) strings: Strings,
    pub(crate) globals: Table,
    pub(crate) stack: Vec<Value>,
    pub(crate) frames: Vec<CallFrame>,
    /// Head of the open-upvalue list, sorted by decreasing stack slot.
    pub(crate) open_upvalues: Option<ObjRef>,
    /// The interned `"init"` string, cached for constructor dispatch
    /// and pinned as a GC root.
    pub(crate) init_string: ObjRef,
    /// Reusable gray-stack storage for the collector.
    pub(crate) gray: Vec<ObjRef>,
    out: Box<dyn Write>,
    trace: bool,
}

impl Vm {
    /// A VM with default configuration, printing to stdout.
    pub fn new() -> Self {
        Self::with_config(VmConfig::default(), Box::new(io::stdout()))
    }

    /// A VM with explicit configuration and `print` sink.
    pub fn with_config(config: VmConfig, out: Box<dyn Write>) -> Self {
        let mut heap = Heap::new(config.gc);
        let mut strings = Strings::new();
        let init_string = strings.intern(&mut heap, "init");

        let mut vm = Vm {
            heap,
            strings,
            globals: Table::new(),
            stack: Vec::with_capacity(STACK_MAX),
            frames: Vec::with_capacity(FRAMES_MAX),
            open_upvalues: None,
            init_string,
            gray: Vec::new(),
            out,
            trace: config.trace,
        };
        vm.define_native("clock", natives::clock);
        vm
    }

    /// Read-only view of the heap, for tools and tests.
    pub fn heap(&self) -> &Heap {
        &self.heap
    }

    /// Compiles and runs `source`.
    ///
    /// Returns `Ok(())` on success, [`InterpretError::Compile`] when the
    /// source does not compile (after printing diagnostics to stderr),
    /// and [`InterpretError::Runtime`] when execution raises (after
    /// printing the error and stack trace to stderr).
    pub fn interpret(&mut self, source: &str) -> Result<(), InterpretError> {
        let function = match vlox_compiler::compile(source, &mut self.heap, &mut self.strings) {
            Ok(function) => function,
            Err(diagnostics) => {
                let mut stderr = io::stderr();
                let _ = diagnostics.render(&mut stderr);
                return Err(InterpretError::Compile);
            }
        };

        // Root the script function across the closure allocation.
        self.push(Value::Obj(function));
        self.collect_if_needed();
        let closure = self.heap.allocate(ObjKind::Closure(ClosureObj {
            function,
            upvalues: Vec::new(),
        }));
        self.pop();
        self.push(Value::Obj(closure));
        self.call(closure, 0)?;

        self.run()
    }

    // ------------------------------------------------------------------
    // Stack
    // ------------------------------------------------------------------

    #[inline]
    fn push(&mut self, value: Value) {
        self.stack.push(value);
    }

    #[inline]
    fn pop(&mut self) -> Value {
        match self.stack.pop() {
            Some(value) => value,
            None => panic!("pop from empty value stack"),
        }
    }

    #[inline]
    fn peek(&self, distance: usize) -> Value {
        self.stack[self.stack.len() - 1 - distance]
    }

    fn reset_stack(&mut self) {
        self.stack.clear();
        self.frames.clear();
        self.open_upvalues = None;
    }

    // ------------------------------------------------------------------
    // Bytecode fetch
    // ------------------------------------------------------------------

    #[inline]
    fn read_byte(&mut self) -> u8 {
        let index = self.frames.len() - 1;
        let frame = &mut self.frames[index];
        let byte = self.heap.function(frame.function).chunk.byte(frame.ip);
        frame.ip += 1;
        byte
    }

    #[inline]
    fn read_u16(&mut self) -> u16 {
        let high = self.read_byte();
        let low = self.read_byte();
        u16::from_be_bytes([high, low])
    }

    #[inline]
    fn read_constant(&mut self) -> Value {
        let index = self.read_byte() as usize;
        let frame = self.frames[self.frames.len() - 1];
        self.heap.function(frame.function).chunk.constant(index)
    }

    /// Reads a name-constant operand. The compiler only emits string
    /// constants in name position.
    #[inline]
    fn read_string(&mut self) -> ObjRef {
        match self.read_constant() {
            Value::Obj(r) => r,
            other => unreachable!("name constant must be a string, found {other:?}"),
        }
    }

    // ------------------------------------------------------------------
    // Errors
    // ------------------------------------------------------------------

    /// Reports a runtime error: message plus a stack trace, innermost
    /// frame first, then unwinds the whole VM.
    fn runtime_error(&mut self, message: &str) -> Result<(), InterpretError> {
        eprintln!("{message}");

        for frame in self.frames.iter().rev() {
            let function = self.heap.function(frame.function);
            // ip already advanced past the faulting instruction.
            let instruction = frame.ip.saturating_sub(1);
            let line = function.chunk.line(instruction);
            match function.name {
                Some(name) => eprintln!("[line {line}] in {}", self.heap.string_text(name)),
                None => eprintln!("[line {line}] in script"),
            }
        }

        self.reset_stack();
        Err(InterpretError::Runtime)
    }

    // ------------------------------------------------------------------
    // The dispatch loop
    // ------------------------------------------------------------------

    fn run(&mut self) -> Result<(), InterpretError> {
        loop {
            if self.trace {
                self.trace_instruction();
            }

            let byte = self.read_byte();
            let op = match OpCode::try_from(byte) {
                Ok(op) => op,
                Err(_) => return self.runtime_error(&format!("Unknown opcode {byte}.")),
            };

            match op {
                OpCode::Constant => {
                    let value = self.read_constant();
                    self.push(value);
                }
                OpCode::Nil => self.push(Value::Nil),
                OpCode::True => self.push(Value::Bool(true)),
                OpCode::False => self.push(Value::Bool(false)),
                OpCode::Pop => {
                    self.pop();
                }

                OpCode::GetLocal => {
                    let slot = self.read_byte() as usize;
                    let base = self.frames[self.frames.len() - 1].slots;
                    let value = self.stack[base + slot];
                    self.push(value);
                }
                OpCode::SetLocal => {
                    let slot = self.read_byte() as usize;
                    let base = self.frames[self.frames.len() - 1].slots;
                    self.stack[base + slot] = self.peek(0);
                }

                OpCode::GetGlobal => {
                    let name = self.read_string();
                    let key = self.heap.string_key(name);
                    match self.globals.get(key) {
                        Some(value) => self.push(value),
                        None => {
                            let message =
                                format!("Undefined variable '{}'.", self.heap.string_text(name));
                            return self.runtime_error(&message);
                        }
                    }
                }
                OpCode::DefineGlobal => {
                    let name = self.read_string();
                    let key = self.heap.string_key(name);
                    let value = self.peek(0);
                    self.globals.set(key, value);
                    self.pop();
                }
                OpCode::SetGlobal => {
                    let name = self.read_string();
                    let key = self.heap.string_key(name);
                    let value = self.peek(0);
                    // A set may not create: undo the insert and raise.
                    if self.globals.set(key, value) {
                        self.globals.delete(key);
                        let message =
                            format!("Undefined variable '{}'.", self.heap.string_text(name));
                        return self.runtime_error(&message);
                    }
                }

                OpCode::GetUpvalue => {
                    let slot = self.read_byte() as usize;
                    let frame = self.frames[self.frames.len() - 1];
                    let upvalue = self.heap.closure(frame.closure).upvalues[slot];
                    let value = match self.heap.upvalue(upvalue).state {
                        UpvalueState::Open(location) => self.stack[location],
                        UpvalueState::Closed(value) => value,
                    };
                    self.push(value);
                }
                OpCode::SetUpvalue => {
                    let slot = self.read_byte() as usize;
                    let frame = self.frames[self.frames.len() - 1];
                    let upvalue = self.heap.closure(frame.closure).upvalues[slot];
                    let value = self.peek(0);
                    match self.heap.upvalue(upvalue).state {
                        UpvalueState::Open(location) => self.stack[location] = value,
                        UpvalueState::Closed(_) => {
                            self.heap.upvalue_mut(upvalue).state = UpvalueState::Closed(value);
                        }
                    }
                }

                OpCode::GetProperty => {
                    let name = self.read_string();
                    let receiver = self.peek(0);
                    let instance = match self.as_instance(receiver) {
                        Some(instance) => instance,
                        None => return self.runtime_error("Only instances have properties."),
                    };

                    let key = self.heap.string_key(name);
                    if let Some(value) = self.heap.instance(instance).fields.get(key) {
                        self.pop(); // receiver
                        self.push(value);
                    } else {
                        let class = self.heap.instance(instance).class;
                        self.bind_method(class, name)?;
                    }
                }
                OpCode::SetProperty => {
                    let name = self.read_string();
                    let instance = match self.as_instance(self.peek(1)) {
                        Some(instance) => instance,
                        None => return self.runtime_error("Only instances have fields."),
                    };

                    let key = self.heap.string_key(name);
                    let value = self.peek(0);
                    self.heap.instance_mut(instance).fields.set(key, value);

                    let value = self.pop();
                    self.pop(); // receiver
                    self.push(value);
                }
                OpCode::GetSuper => {
                    let name = self.read_string();
                    let superclass = match self.pop() {
                        Value::Obj(r) => r,
                        other => unreachable!("superclass slot held {other:?}"),
                    };
                    self.bind_method(superclass, name)?;
                }

                OpCode::Equal => {
                    let b = self.pop();
                    let a = self.pop();
                    self.push(Value::Bool(a == b));
                }
                OpCode::Greater => self.binary_compare(op)?,
                OpCode::Less => self.binary_compare(op)?,
                OpCode::Add => self.add()?,
                OpCode::Subtract => self.binary_arithmetic(op)?,
                OpCode::Multiply => self.binary_arithmetic(op)?,
                OpCode::Divide => self.binary_arithmetic(op)?,
                OpCode::Not => {
                    let value = self.pop();
                    self.push(Value::Bool(value.is_falsey()));
                }
                OpCode::Negate => {
                    let Some(n) = self.peek(0).as_number() else {
                        return self.runtime_error("Operand must be a number.");
                    };
                    self.pop();
                    self.push(Value::Number(-n));
                }

                OpCode::Print => {
                    let value = self.pop();
                    let text = self.heap.format_value(value);
                    let _ = writeln!(self.out, "{text}");
                }

                OpCode::Jump => {
                    let offset = self.read_u16() as usize;
                    let index = self.frames.len() - 1;
                    self.frames[index].ip += offset;
                }
                OpCode::JumpIfFalse => {
                    let offset = self.read_u16() as usize;
                    if self.peek(0).is_falsey() {
                        let index = self.frames.len() - 1;
                        self.frames[index].ip += offset;
                    }
                }
                OpCode::Loop => {
                    let offset = self.read_u16() as usize;
                    let index = self.frames.len() - 1;
                    self.frames[index].ip -= offset;
                }

                OpCode::Call => {
                    let arg_count = self.read_byte() as usize;
                    let callee = self.peek(arg_count);
                    self.call_value(callee, arg_count)?;
                }
                OpCode::Invoke => {
                    let name = self.read_string();
                    let arg_count = self.read_byte() as usize;
                    self.invoke(name, arg_count)?;
                }
                OpCode::InvokeSuper => {
                    let name = self.read_string();
                    let arg_count = self.read_byte() as usize;
                    let superclass = match self.pop() {
                        Value::Obj(r) => r,
                        other => unreachable!("superclass slot held {other:?}"),
                    };
                    self.invoke_from_class(superclass, name, arg_count)?;
                }

                OpCode::Closure => {
                    let function = match self.read_constant() {
                        Value::Obj(r) => r,
                        other => unreachable!("closure constant must be a function: {other:?}"),
                    };
                    // Allocate first, push immediately: the closure must
                    // be rooted before any capture can allocate.
                    self.collect_if_needed();
                    let upvalue_count = self.heap.function(function).upvalue_count;
                    let closure = self.heap.allocate(ObjKind::Closure(ClosureObj {
                        function,
                        upvalues: Vec::with_capacity(upvalue_count),
                    }));
                    self.push(Value::Obj(closure));

                    for _ in 0..upvalue_count {
                        let is_local = self.read_byte() != 0;
                        let index = self.read_byte() as usize;
                        let upvalue = if is_local {
                            let base = self.frames[self.frames.len() - 1].slots;
                            self.capture_upvalue(base + index)
                        } else {
                            let enclosing = self.frames[self.frames.len() - 1].closure;
                            self.heap.closure(enclosing).upvalues[index]
                        };
                        self.heap.closure_mut(closure).upvalues.push(upvalue);
                    }
                }
                OpCode::CloseUpvalue => {
                    self.close_upvalues(self.stack.len() - 1);
                    self.pop();
                }

                OpCode::Return => {
                    let result = self.pop();
                    let frame = self.frames[self.frames.len() - 1];
                    self.close_upvalues(frame.slots);
                    self.frames.pop();

                    if self.frames.is_empty() {
                        // The script closure itself.
                        self.pop();
                        return Ok(());
                    }

                    // The returned value replaces the whole callee window.
                    self.stack.truncate(frame.slots);
                    self.push(result);
                }

                OpCode::Class => {
                    let name = self.read_string();
                    self.collect_if_needed();
                    let class = self.heap.allocate(ObjKind::Class(vlox_core::ClassObj {
                        name,
                        methods: Table::new(),
                    }));
                    self.push(Value::Obj(class));
                }
                OpCode::Inherit => {
                    let superclass = match self.peek(1) {
                        Value::Obj(r) if matches!(self.heap.obj(r).kind, ObjKind::Class(_)) => r,
                        _ => return self.runtime_error("Superclass must be a class."),
                    };
                    let subclass = match self.peek(0) {
                        Value::Obj(r) => r,
                        other => unreachable!("subclass slot held {other:?}"),
                    };
                    // Copy-down inheritance: methods defined on the
                    // superclass later do not appear on the subclass.
                    let methods: Vec<_> = self.heap.class(superclass).methods.iter().collect();
                    for (key, value) in methods {
                        self.heap.class_mut(subclass).methods.set(key, value);
                    }
                    self.pop(); // subclass
                }
                OpCode::Method => {
                    let name = self.read_string();
                    let method = self.peek(0);
                    let class = match self.peek(1) {
                        Value::Obj(r) => r,
                        other => unreachable!("method target held {other:?}"),
                    };
                    let key = self.heap.string_key(name);
                    self.heap.class_mut(class).methods.set(key, method);
                    self.pop();
                }
            }
        }
    }

    // ------------------------------------------------------------------
    // Arithmetic
    // ------------------------------------------------------------------

    fn binary_arithmetic(&mut self, op: OpCode) -> Result<(), InterpretError> {
        let (Some(b), Some(a)) = (self.peek(0).as_number(), self.peek(1).as_number()) else {
            return self.runtime_error("Operands must be numbers.");
        };
        self.pop();
        self.pop();
        let result = match op {
            OpCode::Subtract => a - b,
            OpCode::Multiply => a * b,
            OpCode::Divide => a / b,
            _ => unreachable!("not an arithmetic opcode: {op:?}"),
        };
        self.push(Value::Number(result));
        Ok(())
    }

    fn binary_compare(&mut self, op: OpCode) -> Result<(), InterpretError> {
        let (Some(b), Some(a)) = (self.peek(0).as_number(), self.peek(1).as_number()) else {
            return self.runtime_error("Operands must be numbers.");
        };
        self.pop();
        self.pop();
        let result = match op {
            OpCode::Greater => a > b,
            OpCode::Less => a < b,
            _ => unreachable!("not a comparison opcode: {op:?}"),
        };
        self.push(Value::Bool(result));
        Ok(())
    }

    /// `+`: numeric addition, string concatenation, or concatenation
    /// with one operand stringified when the other is a string.
    fn add(&mut self) -> Result<(), InterpretError> {
        let b = self.peek(0);
        let a = self.peek(1);

        if let (Value::Number(x), Value::Number(y)) = (a, b) {
            self.pop();
            self.pop();
            self.push(Value::Number(x + y));
            return Ok(());
        }

        if self.is_string(a) || self.is_string(b) {
            // Operands stay on the stack through the allocation.
            let text = format!("{}{}", self.heap.format_value(a), self.heap.format_value(b));
            self.collect_if_needed();
            let result = self.strings.intern(&mut self.heap, &text);
            self.pop();
            self.pop();
            self.push(Value::Obj(result));
            return Ok(());
        }

        self.runtime_error("Operands must be two numbers or two strings.")
    }

    fn is_string(&self, value: Value) -> bool {
        matches!(value, Value::Obj(r) if matches!(self.heap.obj(r).kind, ObjKind::String(_)))
    }

    fn as_instance(&self, value: Value) -> Option<ObjRef> {
        match value {
            Value::Obj(r) if matches!(self.heap.obj(r).kind, ObjKind::Instance(_)) => Some(r),
            _ => None,
        }
    }

    // ------------------------------------------------------------------
    // Calls
    // ------------------------------------------------------------------

    /// Dispatches a call on any value; non-callables raise.
    fn call_value(&mut self, callee: Value, arg_count: usize) -> Result<(), InterpretError> {
        enum Kind {
            Closure,
            Class,
            Bound(Value, ObjRef),
            Native(NativeFn),
            NotCallable,
        }

        let kind = match callee {
            Value::Obj(r) => match &self.heap.obj(r).kind {
                ObjKind::Closure(_) => Kind::Closure,
                ObjKind::Class(_) => Kind::Class,
                ObjKind::BoundMethod(bound) => Kind::Bound(bound.receiver, bound.method),
                ObjKind::Native(native) => Kind::Native(native.function),
                _ => Kind::NotCallable,
            },
            _ => Kind::NotCallable,
        };

        match kind {
            Kind::Closure => {
                let closure = match callee {
                    Value::Obj(r) => r,
                    _ => unreachable!(),
                };
                self.call(closure, arg_count)
            }
            Kind::Class => {
                let class = match callee {
                    Value::Obj(r) => r,
                    _ => unreachable!(),
                };
                // The callee slot becomes `this` for the initializer.
                self.collect_if_needed();
                let instance = self.heap.allocate(ObjKind::Instance(InstanceObj {
                    class,
                    fields: Table::new(),
                }));
                let slot = self.stack.len() - arg_count - 1;
                self.stack[slot] = Value::Obj(instance);

                let init_key = self.heap.string_key(self.init_string);
                match self.heap.class(class).methods.get(init_key) {
                    Some(Value::Obj(initializer)) => self.call(initializer, arg_count),
                    Some(other) => unreachable!("initializer was {other:?}"),
                    None if arg_count != 0 => {
                        let message = format!("Expected 0 arguments but got {arg_count}.");
                        self.runtime_error(&message)
                    }
                    None => Ok(()),
                }
            }
            Kind::Bound(receiver, method) => {
                let slot = self.stack.len() - arg_count - 1;
                self.stack[slot] = receiver;
                self.call(method, arg_count)
            }
            Kind::Native(function) => {
                let args_start = self.stack.len() - arg_count;
                let result = function(&self.stack[args_start..]);
                self.stack.truncate(args_start - 1);
                self.push(result);
                Ok(())
            }
            Kind::NotCallable => self.runtime_error("Can only call functions and classes."),
        }
    }

    /// Pushes a frame for `closure`. Checks arity and frame depth.
    fn call(&mut self, closure: ObjRef, arg_count: usize) -> Result<(), InterpretError> {
        let function = self.heap.closure(closure).function;
        let arity = self.heap.function(function).arity;
        if arg_count != arity {
            let message = format!("Expected {arity} arguments but got {arg_count}.");
            return self.runtime_error(&message);
        }

        if self.frames.len() == FRAMES_MAX {
            return self.runtime_error("Stack overflow.");
        }

        self.frames.push(CallFrame {
            closure,
            function,
            ip: 0,
            slots: self.stack.len() - arg_count - 1,
        });
        Ok(())
    }

    /// `receiver.name(args)` fused: a field shadowing the method name
    /// is called as a value; otherwise the method is called directly,
    /// skipping the bound-method allocation.
    fn invoke(&mut self, name: ObjRef, arg_count: usize) -> Result<(), InterpretError> {
        let receiver = self.peek(arg_count);
        let Some(instance) = self.as_instance(receiver) else {
            return self.runtime_error("Only instances have methods.");
        };

        let key = self.heap.string_key(name);
        if let Some(field) = self.heap.instance(instance).fields.get(key) {
            let slot = self.stack.len() - arg_count - 1;
            self.stack[slot] = field;
            return self.call_value(field, arg_count);
        }

        let class = self.heap.instance(instance).class;
        self.invoke_from_class(class, name, arg_count)
    }

    fn invoke_from_class(
        &mut self,
        class: ObjRef,
        name: ObjRef,
        arg_count: usize,
    ) -> Result<(), InterpretError> {
        let key = self.heap.string_key(name);
        match self.heap.class(class).methods.get(key) {
            Some(Value::Obj(method)) => self.call(method, arg_count),
            Some(other) => unreachable!("method table held {other:?}"),
            None => {
                let message = format!("Undefined property '{}'.", self.heap.string_text(name));
                self.runtime_error(&message)
            }
        }
    }

    /// Replaces the instance on top of the stack with a bound method
    /// for `name`, or raises if the class has no such method.
    fn bind_method(&mut self, class: ObjRef, name: ObjRef) -> Result<(), InterpretError> {
        let key = self.heap.string_key(name);
        let method = match self.heap.class(class).methods.get(key) {
            Some(Value::Obj(method)) => method,
            Some(other) => unreachable!("method table held {other:?}"),
            None => {
                let message = format!("Undefined property '{}'.", self.heap.string_text(name));
                return self.runtime_error(&message);
            }
        };

        let receiver = self.peek(0);
        self.collect_if_needed();
        let bound = self.heap.allocate(ObjKind::BoundMethod(BoundMethodObj {
            receiver,
            method,
        }));
        self.pop();
        self.push(Value::Obj(bound));
        Ok(())
    }

    // ------------------------------------------------------------------
    // Upvalues
    // ------------------------------------------------------------------

    /// Returns the open upvalue watching `slot`, creating and splicing
    /// a new one into the sorted list if none exists.
    fn capture_upvalue(&mut self, slot: usize) -> ObjRef {
        let mut previous: Option<ObjRef> = None;
        let mut current = self.open_upvalues;

        while let Some(r) = current {
            let upvalue = self.heap.upvalue(r);
            let location = match upvalue.state {
                UpvalueState::Open(location) => location,
                UpvalueState::Closed(_) => unreachable!("closed upvalue on the open list"),
            };
            if location <= slot {
                break;
            }
            previous = Some(r);
            current = upvalue.next_open;
        }

        if let Some(r) = current {
            if matches!(self.heap.upvalue(r).state, UpvalueState::Open(location) if location == slot)
            {
                return r;
            }
        }

        // The closure under construction is on the stack, and every
        // open upvalue is a root, so collecting here is safe.
        self.collect_if_needed();
        let created = self.heap.allocate(ObjKind::Upvalue(UpvalueObj {
            state: UpvalueState::Open(slot),
            next_open: current,
        }));

        match previous {
            Some(previous) => self.heap.upvalue_mut(previous).next_open = Some(created),
            None => self.open_upvalues = Some(created),
        }
        created
    }

    /// Closes every open upvalue watching slot `last` or above: the
    /// value moves into the upvalue, which leaves the open list.
    fn close_upvalues(&mut self, last: usize) {
        while let Some(r) = self.open_upvalues {
            let location = match self.heap.upvalue(r).state {
                UpvalueState::Open(location) => location,
                UpvalueState::Closed(_) => unreachable!("closed upvalue on the open list"),
            };
            if location < last {
                break;
            }

            let value = self.stack[location];
            let upvalue = self.heap.upvalue_mut(r);
            let next = upvalue.next_open;
            upvalue.state = UpvalueState::Closed(value);
            upvalue.next_open = None;
            self.open_upvalues = next;
        }
    }

    // ------------------------------------------------------------------
    // Setup helpers
    // ------------------------------------------------------------------

    fn define_native(&mut self, name: &str, function: NativeFn) {
        let name = self.strings.intern(&mut self.heap, name);
        let key = self.heap.string_key(name);
        let native = self.heap.allocate(ObjKind::Native(vlox_core::NativeObj { function }));
        self.globals.set(key, Value::Obj(native));
    }

    fn trace_instruction(&mut self) {
        let frame = self.frames[self.frames.len() - 1];
        let mut stack_text = String::new();
        for &value in &self.stack {
            stack_text.push_str(&format!("[ {} ]", self.heap.format_value(value)));
        }
        trace!("          {stack_text}");
        let chunk = &self.heap.function(frame.function).chunk;
        let (text, _) = crate::debug::disassemble_instruction(&self.heap, chunk, frame.ip);
        trace!("{text}");
    }
}

impl Default for Vm {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_push_pop_peek() {
        let mut vm = Vm::new();
        vm.push(Value::Number(1.0));
        vm.push(Value::Number(2.0));
        assert_eq!(vm.peek(0), Value::Number(2.0));
        assert_eq!(vm.peek(1), Value::Number(1.0));
        assert_eq!(vm.pop(), Value::Number(2.0));
        assert_eq!(vm.pop(), Value::Number(1.0));
    }

    #[test]
    #[should_panic(expected = "pop from empty value stack")]
    fn test_pop_empty_stack_panics() {
        let mut vm = Vm::new();
        vm.pop();
    }

    #[test]
    fn test_clock_is_predefined() {
        let mut vm = Vm::new();
        assert!(vm.interpret("var t = clock(); print t >= 0;").is_ok());
    }

    #[test]
    fn test_vm_is_reusable_after_runtime_error() {
        let mut vm = Vm::new();
        assert_eq!(vm.interpret("nosuch;"), Err(InterpretError::Runtime));
        assert!(vm.interpret("var x = 1; print x;").is_ok());
    }

    #[test]
    fn test_globals_persist_across_interprets() {
        let mut vm = Vm::new();
        assert!(vm.interpret("var shared = 41;").is_ok());
        assert!(vm.interpret("shared = shared + 1; print shared;").is_ok());
    }
}
