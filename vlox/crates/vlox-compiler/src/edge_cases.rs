//! Edge case tests for vlox-compiler

#[cfg(test)]
mod tests {
    use crate::{compile, Diagnostics};
    use vlox_core::{GcConfig, Heap, ObjRef, Strings};

    fn try_compile(source: &str) -> Result<(Heap, ObjRef), Diagnostics> {
        let mut heap = Heap::new(GcConfig::default());
        let mut strings = Strings::new();
        match compile(source, &mut heap, &mut strings) {
            Ok(function) => Ok((heap, function)),
            Err(diagnostics) => Err(diagnostics),
        }
    }

    #[test]
    fn test_edge_empty_source_compiles() {
        let (heap, function) = try_compile("").expect("empty source is a valid script");
        // Just the implicit return.
        assert_eq!(heap.function(function).chunk.len(), 2);
    }

    #[test]
    fn test_edge_comment_only_source() {
        assert!(try_compile("// nothing\n// at all\n").is_ok());
    }

    #[test]
    fn test_edge_deeply_nested_blocks() {
        let mut source = String::new();
        for _ in 0..64 {
            source.push('{');
        }
        source.push_str("var x = 1;");
        for _ in 0..64 {
            source.push('}');
        }
        assert!(try_compile(&source).is_ok());
    }

    #[test]
    fn test_edge_deeply_nested_expressions() {
        let mut source = String::from("print ");
        for _ in 0..40 {
            source.push('(');
        }
        source.push('1');
        for _ in 0..40 {
            source.push(')');
        }
        source.push(';');
        assert!(try_compile(&source).is_ok());
    }

    #[test]
    fn test_edge_error_recovery_spans_statements() {
        // Errors in three distinct statements each get reported.
        let diagnostics = try_compile("var; print +; if;").expect_err("all broken");
        assert!(diagnostics.len() >= 3);
    }

    #[test]
    fn test_edge_error_at_eof() {
        let diagnostics = try_compile("print 1").expect_err("missing semicolon");
        assert!(diagnostics.iter().any(|d| d.at_end));
    }

    #[test]
    fn test_edge_scanner_error_reaches_diagnostics() {
        let diagnostics = try_compile("var a = @;").expect_err("bad character");
        assert!(diagnostics
            .iter()
            .any(|d| d.message == "Unexpected character."));
    }

    #[test]
    fn test_edge_unterminated_string_reported() {
        let diagnostics = try_compile("var s = \"oops;").expect_err("open string");
        assert!(diagnostics
            .iter()
            .any(|d| d.message == "Unterminated string."));
    }

    #[test]
    fn test_edge_local_limit() {
        // 255 locals fit (slot zero is reserved); 256 do not.
        let mut source = String::from("{");
        for i in 0..256 {
            source.push_str(&format!("var l{i} = 0;"));
        }
        source.push('}');
        let diagnostics = try_compile(&source).expect_err("local overflow");
        assert!(diagnostics
            .iter()
            .any(|d| d.message == "Too many local variables in function."));
    }

    #[test]
    fn test_edge_255_locals_are_fine() {
        let mut source = String::from("{");
        for i in 0..255 {
            source.push_str(&format!("var l{i} = 0;"));
        }
        source.push('}');
        assert!(try_compile(&source).is_ok());
    }

    #[test]
    fn test_edge_argument_limit() {
        // Identifier arguments share one constant slot, so the pool cap
        // stays out of the way and the argument cap itself reports.
        let args = vec!["a"; 256].join(", ");
        let diagnostics = try_compile(&format!("var a = 0; fun f() {{}} f({args});"))
            .expect_err("argument overflow");
        assert!(diagnostics
            .iter()
            .any(|d| d.message == "Can't have more than 255 arguments."));
    }

    #[test]
    fn test_edge_parameter_limit() {
        let params = (0..256).map(|i| format!("p{i}")).collect::<Vec<_>>().join(", ");
        let diagnostics =
            try_compile(&format!("fun f({params}) {{}}")).expect_err("parameter overflow");
        assert!(diagnostics
            .iter()
            .any(|d| d.message == "Can't have more than 255 parameters."));
    }

    #[test]
    fn test_edge_shadowing_in_inner_scope_is_legal() {
        assert!(try_compile("var a = 1; { var a = 2; { var a = 3; } }").is_ok());
    }

    #[test]
    fn test_edge_assignment_to_grouping_rejected() {
        let diagnostics = try_compile("(a) = 1;").expect_err("bad target");
        assert!(diagnostics
            .iter()
            .any(|d| d.message == "Invalid assignment target."));
    }

    #[test]
    fn test_edge_chained_assignment_is_right_associative() {
        assert!(try_compile("var a; var b; a = b = 1;").is_ok());
    }

    #[test]
    fn test_edge_this_inside_nested_function_in_method() {
        // A function nested in a method still sits inside the class, so
        // `this` resolves (as an upvalue chain to slot zero).
        assert!(try_compile("class C { m() { fun f() { return this; } return f; } }").is_ok());
    }

    #[test]
    fn test_edge_empty_class_with_inheritance() {
        assert!(try_compile("class A {} class B < A {}").is_ok());
    }

    #[test]
    fn test_edge_for_with_all_clauses_empty() {
        // An unconditional loop parses; nothing requires it to be run.
        assert!(try_compile("fun f() { for (;;) return 1; }").is_ok());
    }

    mod properties {
        use super::*;
        use proptest::prelude::*;

        /// A tiny grammar subset: arithmetic, vars, if/while, function
        /// definitions. Everything generated is syntactically valid, so
        /// the compiler must accept it; the point is that nothing in
        /// this space can panic or hang the parser.
        fn program() -> impl Strategy<Value = String> {
            let expr = prop_oneof![
                (0u32..100).prop_map(|n| n.to_string()),
                "[a-d]".prop_map(|v| v),
                ((0u32..100), (0u32..100)).prop_map(|(a, b)| format!("{a} + {b}")),
                ((0u32..100), (0u32..100)).prop_map(|(a, b)| format!("{a} * ({b} - 1)")),
            ];
            let stmt = expr.prop_flat_map(|e| {
                prop_oneof![
                    Just(format!("var a = {e};")),
                    Just(format!("print {e};")),
                    Just(format!("if ({e} > 10) print {e};")),
                    Just(format!("var b = 0; while (b < 3) b = b + 1;")),
                    Just(format!("fun f(x) {{ return x + {e}; }}")),
                ]
            });
            prop::collection::vec(stmt, 0..12).prop_map(|stmts| stmts.join("\n"))
        }

        proptest! {
            #[test]
            fn generated_programs_never_crash_the_compiler(source in program()) {
                let mut heap = Heap::new(GcConfig::default());
                let mut strings = Strings::new();
                // Accept or report errors, never panic.
                let _ = compile(&source, &mut heap, &mut strings);
            }

            #[test]
            fn arbitrary_ascii_never_crashes_the_compiler(source in "[ -~\n]{0,200}") {
                let mut heap = Heap::new(GcConfig::default());
                let mut strings = Strings::new();
                let _ = compile(&source, &mut heap, &mut strings);
            }
        }
    }
}
