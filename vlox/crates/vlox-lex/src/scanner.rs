//! The Lox scanner.
//!
//! A single-pass, zero-allocation tokenizer. Each call to
//! [`Scanner::next_token`] skips whitespace and `//` comments, then
//! dispatches on the first byte of the next lexeme.

use crate::cursor::Cursor;
use crate::token::{keyword_kind, Token, TokenKind};

/// Scans Lox source into tokens on demand.
///
/// # Example
///
/// ```
/// use vlox_lex::{Scanner, TokenKind};
///
/// let mut scanner = Scanner::new("1 + 2;");
/// assert_eq!(scanner.next_token().kind, TokenKind::Number);
/// assert_eq!(scanner.next_token().kind, TokenKind::Plus);
/// assert_eq!(scanner.next_token().kind, TokenKind::Number);
/// assert_eq!(scanner.next_token().kind, TokenKind::Semicolon);
/// assert_eq!(scanner.next_token().kind, TokenKind::Eof);
/// ```
pub struct Scanner<'src> {
    cursor: Cursor<'src>,

    /// Start position of the token currently being scanned.
    start: usize,

    /// Line the current token started on. Strings may span lines, and
    /// the token reports where it began, not where it ended.
    start_line: u32,
}

impl<'src> Scanner<'src> {
    /// Creates a scanner over `source`.
    pub fn new(source: &'src str) -> Self {
        Self {
            cursor: Cursor::new(source),
            start: 0,
            start_line: 1,
        }
    }

    /// Returns the next token. At end of input this returns an `Eof`
    /// token on every call.
    pub fn next_token(&mut self) -> Token<'src> {
        self.skip_whitespace();
        self.start = self.cursor.position();
        self.start_line = self.cursor.line();

        if self.cursor.is_at_end() {
            return self.make_token(TokenKind::Eof);
        }

        let byte = self.cursor.advance();
        if is_ident_start(byte) {
            return self.identifier();
        }
        if byte.is_ascii_digit() {
            return self.number();
        }

        match byte {
            b'(' => self.make_token(TokenKind::LeftParen),
            b')' => self.make_token(TokenKind::RightParen),
            b'[' => self.make_token(TokenKind::LeftBracket),
            b']' => self.make_token(TokenKind::RightBracket),
            b'{' => self.make_token(TokenKind::LeftBrace),
            b'}' => self.make_token(TokenKind::RightBrace),
            b';' => self.make_token(TokenKind::Semicolon),
            b',' => self.make_token(TokenKind::Comma),
            b'.' => self.make_token(TokenKind::Dot),
            b'-' => self.make_token(TokenKind::Minus),
            b'+' => self.make_token(TokenKind::Plus),
            b'/' => self.make_token(TokenKind::Slash),
            b'*' => self.make_token(TokenKind::Star),
            b'!' => {
                let kind = if self.cursor.matches(b'=') {
                    TokenKind::BangEqual
                } else {
                    TokenKind::Bang
                };
                self.make_token(kind)
            }
            b'=' => {
                let kind = if self.cursor.matches(b'=') {
                    TokenKind::EqualEqual
                } else {
                    TokenKind::Equal
                };
                self.make_token(kind)
            }
            b'<' => {
                let kind = if self.cursor.matches(b'=') {
                    TokenKind::LessEqual
                } else {
                    TokenKind::Less
                };
                self.make_token(kind)
            }
            b'>' => {
                let kind = if self.cursor.matches(b'=') {
                    TokenKind::GreaterEqual
                } else {
                    TokenKind::Greater
                };
                self.make_token(kind)
            }
            b'"' => self.string(),
            _ => self.error_token("Unexpected character."),
        }
    }

    /// Skips spaces, tabs, carriage returns, newlines, and `//` line
    /// comments. Newlines bump the cursor's line counter.
    fn skip_whitespace(&mut self) {
        loop {
            match self.cursor.peek() {
                b' ' | b'\r' | b'\t' | b'\n' => {
                    self.cursor.advance();
                }
                b'/' => {
                    if self.cursor.peek_next() == b'/' {
                        while self.cursor.peek() != b'\n' && !self.cursor.is_at_end() {
                            self.cursor.advance();
                        }
                    } else {
                        return;
                    }
                }
                _ => return,
            }
        }
    }

    fn string(&mut self) -> Token<'src> {
        while self.cursor.peek() != b'"' && !self.cursor.is_at_end() {
            self.cursor.advance();
        }

        if self.cursor.is_at_end() {
            return self.error_token("Unterminated string.");
        }

        self.cursor.advance(); // closing quote
        self.make_token(TokenKind::String)
    }

    fn number(&mut self) -> Token<'src> {
        while self.cursor.peek().is_ascii_digit() {
            self.cursor.advance();
        }

        // A fractional part requires at least one digit after the dot.
        if self.cursor.peek() == b'.' && self.cursor.peek_next().is_ascii_digit() {
            self.cursor.advance();
            while self.cursor.peek().is_ascii_digit() {
                self.cursor.advance();
            }
        }

        self.make_token(TokenKind::Number)
    }

    fn identifier(&mut self) -> Token<'src> {
        while is_ident_continue(self.cursor.peek()) {
            self.cursor.advance();
        }

        let lexeme = self.cursor.slice_from(self.start);
        let kind = keyword_kind(lexeme).unwrap_or(TokenKind::Identifier);
        self.make_token(kind)
    }

    fn make_token(&self, kind: TokenKind) -> Token<'src> {
        Token {
            kind,
            lexeme: self.cursor.slice_from(self.start),
            line: self.start_line,
        }
    }

    fn error_token(&self, message: &'static str) -> Token<'src> {
        Token {
            kind: TokenKind::Error,
            lexeme: message,
            line: self.cursor.line(),
        }
    }
}

#[inline]
fn is_ident_start(byte: u8) -> bool {
    byte.is_ascii_alphabetic() || byte == b'_'
}

#[inline]
fn is_ident_continue(byte: u8) -> bool {
    byte.is_ascii_alphanumeric() || byte == b'_'
}
