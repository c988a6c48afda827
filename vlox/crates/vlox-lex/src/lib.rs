//! vlox-lex - Lexical Analyzer for Lox source
//!
//! This crate turns a Lox source string into a lazy stream of tokens, one
//! at a time on demand. There is no token buffer: the compiler pulls the
//! next token exactly when it needs it, and tokens borrow their lexemes
//! straight out of the source string, so the whole phase allocates nothing.
//!
//! The scanner recognizes:
//!
//! - single-character tokens: `( ) [ ] { } , . - + ; / *`
//! - one-or-two character tokens: `! != = == < <= > >=`
//! - `"..."` string literals (newlines allowed inside, line counter kept)
//! - number literals: digits with an optional `.` followed by digits
//! - identifiers `[A-Za-z_][A-Za-z_0-9]*` and the sixteen reserved words
//!
//! Malformed input never aborts the scan; it produces an `Error` token
//! whose lexeme is the message text, and scanning continues after it.
//! Once the end of input is reached, `Eof` is returned on every further
//! call.

mod cursor;
mod edge_cases;
mod scanner;
mod token;

pub use cursor::Cursor;
pub use scanner::Scanner;
pub use token::{Token, TokenKind};
