//! vlox-compiler - Single-pass compiler from Lox source to bytecode
//!
//! There is no AST. A Pratt parser pulls tokens from the scanner and
//! emits bytecode directly into the chunk of the function being
//! compiled, patching forward jumps when their targets become known.
//! Nested function declarations push a fresh per-function state (locals,
//! scope depth, upvalue descriptors) onto a stack; resolving a name
//! walks that stack outward, capturing enclosing locals as upvalues on
//! the way.
//!
//! Errors never abort the parse: the compiler records a diagnostic,
//! enters panic mode so follow-on noise is suppressed, and resumes at
//! the next statement boundary. A compile that reported anything
//! returns all its diagnostics and no function.
//!
//! The compiler allocates in the provided heap (functions, interned
//! strings for identifiers and literals) but never triggers a
//! collection; collection runs only from the VM's runtime allocation
//! points, where the roots are known.

mod diagnostics;
mod edge_cases;
mod expr;
mod stmt;

pub use diagnostics::{Diagnostic, Diagnostics};

use rustc_hash::FxHashMap;
use vlox_core::{FunctionObj, Heap, ObjKind, ObjRef, OpCode, Strings, Value, MAX_CONSTANTS};
use vlox_lex::{Scanner, Token, TokenKind};

/// Max locals per function (one-byte slot operand).
pub const MAX_LOCALS: usize = 256;
/// Max upvalues per function (one-byte index operand).
pub const MAX_UPVALUES: usize = 256;

/// Compiles Lox source to a script function in `heap`.
///
/// On success returns the function object for the top-level script
/// (arity 0, no name). On failure returns every diagnostic the parse
/// produced; no function is returned and nothing should be executed.
///
/// # Example
///
/// ```
/// use vlox_core::{GcConfig, Heap, Strings};
///
/// let mut heap = Heap::new(GcConfig::default());
/// let mut strings = Strings::new();
/// let script = vlox_compiler::compile("print 1 + 2;", &mut heap, &mut strings);
/// assert!(script.is_ok());
/// ```
pub fn compile(
    source: &str,
    heap: &mut Heap,
    strings: &mut Strings,
) -> Result<ObjRef, Diagnostics> {
    let mut compiler = Compiler::new(source, heap, strings);
    compiler.advance();
    while !compiler.matches(TokenKind::Eof) {
        compiler.declaration();
    }
    compiler.finish()
}

/// What kind of function body is being compiled. Drives `this` binding
/// and the implicit return value.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum FunctionKind {
    /// The top-level script.
    Script,
    /// A `fun` declaration.
    Function,
    /// A method in a class body.
    Method,
    /// The method named `init`; returns `this` implicitly and rejects
    /// `return <expr>;`.
    Initializer,
}

/// Token window and error state shared by the whole parse.
pub(crate) struct ParserState<'src> {
    scanner: Scanner<'src>,
    pub(crate) current: Token<'src>,
    pub(crate) previous: Token<'src>,
    panic_mode: bool,
    diagnostics: Diagnostics,
}

/// One local slot: its name, the scope depth it was declared at
/// (`-1` while declared-but-uninitialized), and whether any nested
/// function captured it (which turns its `Pop` into `CloseUpvalue`).
struct Local<'src> {
    name: &'src str,
    depth: i32,
    is_captured: bool,
}

/// A compile-time upvalue descriptor, emitted after the `Closure`
/// instruction: capture an enclosing local (`is_local`) or forward an
/// enclosing upvalue.
#[derive(Clone, Copy, PartialEq, Eq)]
pub(crate) struct UpvalueDesc {
    pub(crate) index: u8,
    pub(crate) is_local: bool,
}

/// Per-function compile state. Nested function declarations stack these;
/// the enclosing chain is walked for upvalue resolution.
struct FunctionState<'src> {
    function: ObjRef,
    kind: FunctionKind,
    locals: Vec<Local<'src>>,
    scope_depth: i32,
    upvalues: Vec<UpvalueDesc>,
    /// Constant-pool slots already handed out for identifier strings,
    /// so repeated references to one name share a slot.
    ident_constants: FxHashMap<ObjRef, u8>,
}

/// Per-class compile state: tracks whether `super` is legal.
struct ClassState {
    has_superclass: bool,
}

/// The compiler proper. Created per compile; see [`compile`].
pub(crate) struct Compiler<'src, 'ctx> {
    pub(crate) parser: ParserState<'src>,
    pub(crate) heap: &'ctx mut Heap,
    pub(crate) strings: &'ctx mut Strings,
    states: Vec<FunctionState<'src>>,
    classes: Vec<ClassState>,
}

impl<'src, 'ctx> Compiler<'src, 'ctx> {
    fn new(source: &'src str, heap: &'ctx mut Heap, strings: &'ctx mut Strings) -> Self {
        let parser = ParserState {
            scanner: Scanner::new(source),
            current: Token::synthetic(""),
            previous: Token::synthetic(""),
            panic_mode: false,
            diagnostics: Diagnostics::new(),
        };
        let mut compiler = Compiler {
            parser,
            heap,
            strings,
            states: Vec::new(),
            classes: Vec::new(),
        };
        compiler.begin_function(FunctionKind::Script, None);
        compiler
    }

    fn finish(mut self) -> Result<ObjRef, Diagnostics> {
        let (function, _) = self.end_function();
        if self.parser.diagnostics.has_errors() {
            Err(self.parser.diagnostics)
        } else {
            Ok(function)
        }
    }

    // ------------------------------------------------------------------
    // Function state
    // ------------------------------------------------------------------

    fn begin_function(&mut self, kind: FunctionKind, name: Option<&'src str>) {
        let mut function = FunctionObj::new();
        if let Some(name) = name {
            function.name = Some(self.strings.intern(self.heap, name));
        }
        let function = self.heap.allocate(ObjKind::Function(function));

        // Slot zero belongs to the callee: the closure itself in plain
        // functions, the receiver in methods and initializers.
        let slot_zero = if kind == FunctionKind::Function { "" } else { "this" };
        let mut locals = Vec::new();
        locals.push(Local {
            name: slot_zero,
            depth: 0,
            is_captured: false,
        });

        self.states.push(FunctionState {
            function,
            kind,
            locals,
            scope_depth: 0,
            upvalues: Vec::new(),
            ident_constants: FxHashMap::default(),
        });
    }

    /// Ends the innermost function: emits the implicit return and hands
    /// back the function plus its upvalue descriptors for the enclosing
    /// `Closure` instruction.
    fn end_function(&mut self) -> (ObjRef, Vec<UpvalueDesc>) {
        self.emit_return();
        let state = match self.states.pop() {
            Some(state) => state,
            None => unreachable!("function states underflow"),
        };
        self.heap.function_mut(state.function).upvalue_count = state.upvalues.len();
        (state.function, state.upvalues)
    }

    #[inline]
    fn top(&self) -> usize {
        self.states.len() - 1
    }

    pub(crate) fn current_function(&self) -> ObjRef {
        self.states[self.top()].function
    }

    pub(crate) fn current_kind(&self) -> FunctionKind {
        self.states[self.top()].kind
    }

    pub(crate) fn in_class(&self) -> bool {
        !self.classes.is_empty()
    }

    pub(crate) fn class_has_superclass(&self) -> bool {
        self.classes
            .last()
            .map(|class| class.has_superclass)
            .unwrap_or(false)
    }

    fn push_class(&mut self) {
        self.classes.push(ClassState {
            has_superclass: false,
        });
    }

    fn set_class_superclass(&mut self) {
        if let Some(class) = self.classes.last_mut() {
            class.has_superclass = true;
        }
    }

    fn pop_class(&mut self) {
        self.classes.pop();
    }

    // ------------------------------------------------------------------
    // Token plumbing
    // ------------------------------------------------------------------

    pub(crate) fn advance(&mut self) {
        self.parser.previous = self.parser.current;
        loop {
            self.parser.current = self.parser.scanner.next_token();
            if self.parser.current.kind != TokenKind::Error {
                break;
            }
            let token = self.parser.current;
            self.error_at(token, token.lexeme);
        }
    }

    pub(crate) fn consume(&mut self, kind: TokenKind, message: &str) {
        if self.parser.current.kind == kind {
            self.advance();
        } else {
            self.error_at_current(message);
        }
    }

    pub(crate) fn check(&self, kind: TokenKind) -> bool {
        self.parser.current.kind == kind
    }

    pub(crate) fn matches(&mut self, kind: TokenKind) -> bool {
        if !self.check(kind) {
            return false;
        }
        self.advance();
        true
    }

    // ------------------------------------------------------------------
    // Errors
    // ------------------------------------------------------------------

    /// Reports an error at the token just consumed.
    pub(crate) fn error(&mut self, message: &str) {
        self.error_at(self.parser.previous, message);
    }

    /// Reports an error at the token about to be consumed.
    pub(crate) fn error_at_current(&mut self, message: &str) {
        self.error_at(self.parser.current, message);
    }

    fn error_at(&mut self, token: Token<'src>, message: &str) {
        // Panic mode swallows everything until synchronization, so one
        // mistake reports once.
        if self.parser.panic_mode {
            return;
        }
        self.parser.panic_mode = true;
        self.parser.diagnostics.push(Diagnostic::at(&token, message));
    }

    /// Leaves panic mode by skipping to a statement boundary: just past
    /// a `;`, or just before a statement keyword.
    pub(crate) fn synchronize(&mut self) {
        self.parser.panic_mode = false;

        while self.parser.current.kind != TokenKind::Eof {
            if self.parser.previous.kind == TokenKind::Semicolon {
                return;
            }
            match self.parser.current.kind {
                TokenKind::Class
                | TokenKind::Fun
                | TokenKind::Var
                | TokenKind::For
                | TokenKind::If
                | TokenKind::While
                | TokenKind::Print
                | TokenKind::Return => return,
                _ => {}
            }
            self.advance();
        }
    }

    pub(crate) fn in_panic_mode(&self) -> bool {
        self.parser.panic_mode
    }

    // ------------------------------------------------------------------
    // Emission
    // ------------------------------------------------------------------

    pub(crate) fn emit_byte(&mut self, byte: u8) {
        let line = self.parser.previous.line;
        let function = self.current_function();
        self.heap.function_mut(function).chunk.write_byte(byte, line);
    }

    pub(crate) fn emit_op(&mut self, op: OpCode) {
        self.emit_byte(op.into());
    }

    pub(crate) fn emit_ops(&mut self, first: OpCode, second: OpCode) {
        self.emit_op(first);
        self.emit_op(second);
    }

    pub(crate) fn emit_op_byte(&mut self, op: OpCode, byte: u8) {
        self.emit_op(op);
        self.emit_byte(byte);
    }

    /// The implicit return: `this` from initializers, `nil` elsewhere.
    pub(crate) fn emit_return(&mut self) {
        if self.current_kind() == FunctionKind::Initializer {
            self.emit_op_byte(OpCode::GetLocal, 0);
        } else {
            self.emit_op(OpCode::Nil);
        }
        self.emit_op(OpCode::Return);
    }

    pub(crate) fn emit_constant(&mut self, value: Value) {
        let index = self.make_constant(value);
        self.emit_op_byte(OpCode::Constant, index);
    }

    /// Adds `value` to the current constant pool, reporting an error at
    /// the 256-entry cap.
    pub(crate) fn make_constant(&mut self, value: Value) -> u8 {
        let function = self.current_function();
        if self.heap.function(function).chunk.constants().len() >= MAX_CONSTANTS {
            self.error("Too many constants in one chunk.");
            return 0;
        }
        self.heap.function_mut(function).chunk.add_constant(value) as u8
    }

    /// Constant-pool slot for an identifier string, de-duplicated per
    /// chunk.
    pub(crate) fn identifier_constant(&mut self, name: &str) -> u8 {
        let string = self.strings.intern(self.heap, name);
        let top = self.top();
        if let Some(&index) = self.states[top].ident_constants.get(&string) {
            return index;
        }
        let index = self.make_constant(Value::Obj(string));
        self.states[top].ident_constants.insert(string, index);
        index
    }

    pub(crate) fn chunk_len(&self) -> usize {
        self.heap.function(self.current_function()).chunk.len()
    }

    /// Emits a jump with a placeholder offset; returns the operand
    /// position for [`Compiler::patch_jump`].
    pub(crate) fn emit_jump(&mut self, op: OpCode) -> usize {
        self.emit_op(op);
        self.emit_byte(0xff);
        self.emit_byte(0xff);
        self.chunk_len() - 2
    }

    /// Points the placeholder at `offset` to the current end of code.
    pub(crate) fn patch_jump(&mut self, offset: usize) {
        // -2 adjusts for the operand itself: the jump is relative to the
        // byte after it.
        let jump = self.chunk_len() - offset - 2;
        if jump > u16::MAX as usize {
            self.error("Too much code to jump over.");
        }

        let function = self.current_function();
        let chunk = &mut self.heap.function_mut(function).chunk;
        chunk.patch_byte(offset, ((jump >> 8) & 0xff) as u8);
        chunk.patch_byte(offset + 1, (jump & 0xff) as u8);
    }

    /// Emits a backward jump to `loop_start`.
    pub(crate) fn emit_loop(&mut self, loop_start: usize) {
        self.emit_op(OpCode::Loop);

        let offset = self.chunk_len() - loop_start + 2;
        if offset > u16::MAX as usize {
            self.error("Loop body too large.");
        }

        self.emit_byte(((offset >> 8) & 0xff) as u8);
        self.emit_byte((offset & 0xff) as u8);
    }

    // ------------------------------------------------------------------
    // Scopes, locals, upvalues
    // ------------------------------------------------------------------

    pub(crate) fn begin_scope(&mut self) {
        let top = self.top();
        self.states[top].scope_depth += 1;
    }

    /// Closes the innermost scope, popping its locals. Captured locals
    /// are hoisted with `CloseUpvalue` instead of plain `Pop`.
    pub(crate) fn end_scope(&mut self) {
        let top = self.top();
        self.states[top].scope_depth -= 1;

        loop {
            let doomed = {
                let state = &self.states[top];
                match state.locals.last() {
                    Some(local) if local.depth > state.scope_depth => Some(local.is_captured),
                    _ => None,
                }
            };
            match doomed {
                Some(true) => self.emit_op(OpCode::CloseUpvalue),
                Some(false) => self.emit_op(OpCode::Pop),
                None => break,
            }
            self.states[top].locals.pop();
        }
    }

    pub(crate) fn add_local(&mut self, name: &'src str) {
        let top = self.top();
        if self.states[top].locals.len() == MAX_LOCALS {
            self.error("Too many local variables in function.");
            return;
        }
        self.states[top].locals.push(Local {
            name,
            depth: -1,
            is_captured: false,
        });
    }

    /// Registers the just-parsed identifier as a local in the current
    /// scope (no-op for globals), rejecting same-scope redeclaration.
    pub(crate) fn declare_variable(&mut self) {
        let top = self.top();
        if self.states[top].scope_depth == 0 {
            return;
        }

        let name = self.parser.previous.lexeme;
        let mut duplicate = false;
        for local in self.states[top].locals.iter().rev() {
            if local.depth != -1 && local.depth < self.states[top].scope_depth {
                break;
            }
            if local.name == name {
                duplicate = true;
                break;
            }
        }
        if duplicate {
            self.error("Already a variable with this name in this scope.");
        }
        self.add_local(name);
    }

    /// Consumes a variable name. Returns its name-constant index for
    /// globals, 0 for locals (which live on the stack, not in a table).
    pub(crate) fn parse_variable(&mut self, message: &str) -> u8 {
        self.consume(TokenKind::Identifier, message);
        self.declare_variable();
        if self.states[self.top()].scope_depth > 0 {
            return 0;
        }
        self.identifier_constant(self.parser.previous.lexeme)
    }

    /// Flips the newest local from declared to initialized.
    pub(crate) fn mark_initialized(&mut self) {
        let top = self.top();
        if self.states[top].scope_depth == 0 {
            return;
        }
        let depth = self.states[top].scope_depth;
        if let Some(local) = self.states[top].locals.last_mut() {
            local.depth = depth;
        }
    }

    pub(crate) fn define_variable(&mut self, global: u8) {
        if self.states[self.top()].scope_depth > 0 {
            self.mark_initialized();
            return;
        }
        self.emit_op_byte(OpCode::DefineGlobal, global);
    }

    /// Resolves `name` among the locals of function state
    /// `state_index`, newest first.
    fn resolve_local(&mut self, state_index: usize, name: &str) -> Option<u8> {
        for i in (0..self.states[state_index].locals.len()).rev() {
            if self.states[state_index].locals[i].name == name {
                if self.states[state_index].locals[i].depth == -1 {
                    self.error("Can't read local variable in its own initializer.");
                }
                return Some(i as u8);
            }
        }
        None
    }

    /// Resolves `name` as an upvalue of function state `state_index`,
    /// capturing through every enclosing function on the way in.
    fn resolve_upvalue(&mut self, state_index: usize, name: &str) -> Option<u8> {
        if state_index == 0 {
            return None;
        }
        let enclosing = state_index - 1;

        if let Some(local) = self.resolve_local(enclosing, name) {
            self.states[enclosing].locals[local as usize].is_captured = true;
            return Some(self.add_upvalue(state_index, local, true));
        }

        if let Some(upvalue) = self.resolve_upvalue(enclosing, name) {
            return Some(self.add_upvalue(state_index, upvalue, false));
        }

        None
    }

    /// Adds an upvalue descriptor, de-duplicated by `(index, is_local)`.
    fn add_upvalue(&mut self, state_index: usize, index: u8, is_local: bool) -> u8 {
        let desc = UpvalueDesc { index, is_local };
        for (i, existing) in self.states[state_index].upvalues.iter().enumerate() {
            if *existing == desc {
                return i as u8;
            }
        }

        if self.states[state_index].upvalues.len() == MAX_UPVALUES {
            self.error("Too many closure variables in function.");
            return 0;
        }

        self.states[state_index].upvalues.push(desc);
        (self.states[state_index].upvalues.len() - 1) as u8
    }

    /// Emits the load or store for a name: local slot, upvalue, or
    /// late-bound global.
    pub(crate) fn named_variable(&mut self, name: &'src str, can_assign: bool) {
        let top = self.top();
        let (get_op, set_op, arg) = if let Some(slot) = self.resolve_local(top, name) {
            (OpCode::GetLocal, OpCode::SetLocal, slot)
        } else if let Some(slot) = self.resolve_upvalue(top, name) {
            (OpCode::GetUpvalue, OpCode::SetUpvalue, slot)
        } else {
            let index = self.identifier_constant(name);
            (OpCode::GetGlobal, OpCode::SetGlobal, index)
        };

        if can_assign && self.matches(TokenKind::Equal) {
            self.expression();
            self.emit_op_byte(set_op, arg);
        } else {
            self.emit_op_byte(get_op, arg);
        }
    }
}
