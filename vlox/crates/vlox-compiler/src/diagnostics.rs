//! Compile-error collection and rendering.
//!
//! The compiler never aborts on a syntax error: it records a diagnostic,
//! enters panic mode to suppress the cascade, and resynchronizes at the
//! next statement boundary. All diagnostics from one compile are
//! collected here; the caller decides when and where to render them
//! (the VM prints them to stderr before refusing to run).

use std::fmt;
use vlox_lex::{Token, TokenKind};

/// One compile error, formatted as
/// `[line N] Error at '<lexeme>': <message>` (or `at end` for EOF).
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Diagnostic {
    /// Source line of the offending token.
    pub line: u32,
    /// The offending lexeme, or `None` at end of input and for scanner
    /// error tokens (whose lexeme is already a message).
    pub lexeme: Option<String>,
    /// What went wrong.
    pub message: String,
    /// True when the offending token was EOF.
    pub at_end: bool,
}

impl Diagnostic {
    /// Builds a diagnostic for an error reported at `token`.
    pub fn at(token: &Token<'_>, message: &str) -> Self {
        let (lexeme, at_end) = match token.kind {
            TokenKind::Eof => (None, true),
            // Scanner error tokens carry a message, not source text.
            TokenKind::Error => (None, false),
            _ => (Some(token.lexeme.to_string()), false),
        };
        Diagnostic {
            line: token.line,
            lexeme,
            message: message.to_string(),
            at_end,
        }
    }
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[line {}] Error", self.line)?;
        if self.at_end {
            write!(f, " at end")?;
        } else if let Some(lexeme) = &self.lexeme {
            write!(f, " at '{lexeme}'")?;
        }
        write!(f, ": {}", self.message)
    }
}

/// The diagnostics collected by one compile.
#[derive(Debug, Default)]
pub struct Diagnostics {
    list: Vec<Diagnostic>,
}

impl Diagnostics {
    /// Creates an empty collection.
    pub fn new() -> Self {
        Diagnostics { list: Vec::new() }
    }

    /// Records a diagnostic.
    pub fn push(&mut self, diagnostic: Diagnostic) {
        self.list.push(diagnostic);
    }

    /// True once any error has been recorded.
    pub fn has_errors(&self) -> bool {
        !self.list.is_empty()
    }

    /// Number of recorded errors.
    pub fn len(&self) -> usize {
        self.list.len()
    }

    /// True when nothing has been recorded.
    pub fn is_empty(&self) -> bool {
        self.list.is_empty()
    }

    /// Iterates the recorded errors in source order.
    pub fn iter(&self) -> impl Iterator<Item = &Diagnostic> {
        self.list.iter()
    }

    /// Writes every diagnostic, one per line, to `out`.
    pub fn render(&self, out: &mut dyn std::io::Write) -> std::io::Result<()> {
        for diagnostic in &self.list {
            writeln!(out, "{diagnostic}")?;
        }
        Ok(())
    }
}
