//! Edge case tests for vlox-lex

#[cfg(test)]
mod tests {
    use crate::{Scanner, Token, TokenKind};

    fn scan_all(source: &str) -> Vec<Token<'_>> {
        let mut scanner = Scanner::new(source);
        let mut tokens = Vec::new();
        loop {
            let token = scanner.next_token();
            let done = token.kind == TokenKind::Eof;
            tokens.push(token);
            if done {
                break;
            }
        }
        tokens
    }

    #[test]
    fn test_edge_empty_source() {
        let tokens = scan_all("");
        assert_eq!(tokens.len(), 1);
        assert_eq!(tokens[0].kind, TokenKind::Eof);
    }

    #[test]
    fn test_edge_whitespace_only() {
        let tokens = scan_all("  \t\r\n  \n");
        assert_eq!(tokens.len(), 1);
        assert_eq!(tokens[0].kind, TokenKind::Eof);
        assert_eq!(tokens[0].line, 3);
    }

    #[test]
    fn test_edge_comment_only() {
        let tokens = scan_all("// nothing here");
        assert_eq!(tokens.len(), 1);
        assert_eq!(tokens[0].kind, TokenKind::Eof);
    }

    #[test]
    fn test_edge_comment_at_eof_without_newline() {
        let tokens = scan_all("var x; // trailing");
        assert_eq!(tokens[0].kind, TokenKind::Var);
        assert_eq!(tokens.last().unwrap().kind, TokenKind::Eof);
    }

    #[test]
    fn test_edge_long_identifier() {
        let name = "a".repeat(10_000);
        let tokens = scan_all(&name);
        assert_eq!(tokens[0].kind, TokenKind::Identifier);
        assert_eq!(tokens[0].lexeme.len(), 10_000);
    }

    #[test]
    fn test_edge_underscore_identifiers() {
        let tokens = scan_all("_ __ _private _1");
        assert!(tokens[..4]
            .iter()
            .all(|t| t.kind == TokenKind::Identifier));
    }

    #[test]
    fn test_edge_keyword_casing() {
        let tokens = scan_all("Var var VAR");
        assert_eq!(tokens[0].kind, TokenKind::Identifier);
        assert_eq!(tokens[1].kind, TokenKind::Var);
        assert_eq!(tokens[2].kind, TokenKind::Identifier);
    }

    #[test]
    fn test_edge_empty_string_literal() {
        let tokens = scan_all("\"\"");
        assert_eq!(tokens[0].kind, TokenKind::String);
        assert_eq!(tokens[0].lexeme, "\"\"");
    }

    #[test]
    fn test_edge_string_with_comment_inside() {
        let tokens = scan_all("\"// not a comment\"");
        assert_eq!(tokens[0].kind, TokenKind::String);
    }

    #[test]
    fn test_edge_unterminated_string_reports_final_line() {
        let tokens = scan_all("\"spans\nlines");
        assert_eq!(tokens[0].kind, TokenKind::Error);
        assert_eq!(tokens[0].lexeme, "Unterminated string.");
        assert_eq!(tokens[0].line, 2);
    }

    #[test]
    fn test_edge_error_then_recovery() {
        // The scanner keeps going after an error token.
        let tokens = scan_all("# var");
        assert_eq!(tokens[0].kind, TokenKind::Error);
        assert_eq!(tokens[1].kind, TokenKind::Var);
    }

    #[test]
    fn test_edge_leading_dot_is_not_a_number() {
        let tokens = scan_all(".5");
        assert_eq!(tokens[0].kind, TokenKind::Dot);
        assert_eq!(tokens[1].kind, TokenKind::Number);
    }

    #[test]
    fn test_edge_adjacent_operators() {
        let tokens = scan_all("===");
        assert_eq!(tokens[0].kind, TokenKind::EqualEqual);
        assert_eq!(tokens[1].kind, TokenKind::Equal);
    }

    #[test]
    fn test_edge_bang_bang() {
        let tokens = scan_all("!!x");
        assert_eq!(tokens[0].kind, TokenKind::Bang);
        assert_eq!(tokens[1].kind, TokenKind::Bang);
        assert_eq!(tokens[2].kind, TokenKind::Identifier);
    }

    #[test]
    fn test_edge_no_token_spans_whitespace() {
        for token in scan_all("a b\tc\nd") {
            if token.kind != TokenKind::Eof {
                assert!(!token.lexeme.contains(char::is_whitespace));
            }
        }
    }

    mod properties {
        use super::*;
        use proptest::prelude::*;

        proptest! {
            /// The scanner terminates and never panics on arbitrary
            /// ASCII input.
            #[test]
            fn scanning_always_terminates(source in "[ -~\n\t\r]{0,400}") {
                let mut scanner = Scanner::new(&source);
                let mut count = 0usize;
                loop {
                    let token = scanner.next_token();
                    if token.kind == TokenKind::Eof {
                        break;
                    }
                    count += 1;
                    prop_assert!(count <= source.len() + 1);
                }
            }

            /// Every non-error lexeme is a verbatim slice of the input.
            #[test]
            fn lexemes_come_from_source(source in "[ -~\n]{0,200}") {
                let mut scanner = Scanner::new(&source);
                loop {
                    let token = scanner.next_token();
                    match token.kind {
                        TokenKind::Eof => break,
                        TokenKind::Error => {}
                        _ => prop_assert!(source.contains(token.lexeme)),
                    }
                }
            }
        }
    }
}
