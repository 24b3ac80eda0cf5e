pub mod ast;
pub mod error;
pub mod parser;

pub use ast::*;
pub use error::{ParseError, ParseResult};
pub use parser::Parser;

use monkey_lexer::tokenize as lex;

pub fn parse(source: &str) -> (Program, Vec<monkey_lexer::LexError>, Vec<ParseError>) {
    let (tokens, lex_errors) = lex(source);
    let mut parser = Parser::new(tokens);
    let program = parser.parse();
    (program, lex_errors, parser.errors)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse_ok(src: &str) -> Program {
        let (program, lex_errors, parse_errors) = parse(src);
        assert!(lex_errors.is_empty(),   "Lex errors: {:?}", lex_errors);
        assert!(parse_errors.is_empty(), "Parse errors: {:?}", parse_errors);
        program
    }
    fn first_stmt(src: &str) -> StmtKind { parse_ok(src).stmts.into_iter().next().unwrap().inner }
    fn first_expr(src: &str) -> ExprKind {
        match first_stmt(src) {
            StmtKind::Expr(e) => e.inner,
            StmtKind::Let { value, .. } => value.inner,
            StmtKind::Return(e) => e.inner,
            #[allow(unreachable_patterns)]
            other => panic!("Expected Expr/Let/Return, got {:?}", other),
        }
    }

    // ── Literals ──────────────────────────────────────────────────────────
    #[test] fn test_int_literal()    { assert_eq!(first_expr("5;"), ExprKind::Int(5)); }
    #[test] fn test_bool_literal()   { assert_eq!(first_expr("true;"), ExprKind::Bool(true)); }
    #[test] fn test_string_literal() { assert_eq!(first_expr(r#""hello""#), ExprKind::Str("hello".to_string())); }
    #[test] fn test_ident()          { assert_eq!(first_expr("foobar;"), ExprKind::Ident("foobar".to_string())); }

    // ── Let / return ──────────────────────────────────────────────────────
    #[test] fn test_let_statement() {
        assert!(matches!(first_stmt("let x = 5;"), StmtKind::Let { name, .. } if name == "x"));
    }
    #[test] fn test_return_statement() {
        assert!(matches!(first_stmt("return 10;"), StmtKind::Return(_)));
    }

    // ── Operators ─────────────────────────────────────────────────────────
    #[test] fn test_prefix_bang() { assert!(matches!(first_expr("!true;"), ExprKind::Prefix { op, .. } if op == "!")); }
    #[test] fn test_prefix_minus(){ assert!(matches!(first_expr("-15;"), ExprKind::Prefix { op, .. } if op == "-")); }
    #[test] fn test_infix_add()   { assert!(matches!(first_expr("5 + 5;"), ExprKind::Infix { op, .. } if op == "+")); }
    #[test] fn test_precedence_mul_over_add() {
        match first_expr("1 + 2 * 3;") {
            ExprKind::Infix { op, right, .. } => {
                assert_eq!(op, "+");
                assert!(matches!(right.inner, ExprKind::Infix { op, .. } if op == "*"));
            }
            other => panic!("unexpected {:?}", other),
        }
    }
    #[test] fn test_grouped_expression() {
        match first_expr("(1 + 2) * 3;") {
            ExprKind::Infix { op, left, .. } => {
                assert_eq!(op, "*");
                assert!(matches!(left.inner, ExprKind::Infix { op, .. } if op == "+"));
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    // ── Functions / calls ─────────────────────────────────────────────────
    #[test] fn test_function_literal() {
        match first_expr("fn(x, y) { x + y; }") {
            ExprKind::FunctionLiteral { params, body } => {
                assert_eq!(params, vec!["x".to_string(), "y".to_string()]);
                assert_eq!(body.len(), 1);
            }
            other => panic!("unexpected {:?}", other),
        }
    }
    #[test] fn test_call_expression() {
        match first_expr("add(1, 2 * 3, 4 + 5);") {
            ExprKind::Call { args, .. } => assert_eq!(args.len(), 3),
            other => panic!("unexpected {:?}", other),
        }
    }

    // ── If/else ───────────────────────────────────────────────────────────
    #[test] fn test_if_expression() {
        match first_expr("if (x < y) { x }") {
            ExprKind::If { alternative, consequence, .. } => {
                assert!(alternative.is_none());
                assert_eq!(consequence.len(), 1);
            }
            other => panic!("unexpected {:?}", other),
        }
    }
    #[test] fn test_if_else_expression() {
        match first_expr("if (x < y) { x } else { y }") {
            ExprKind::If { alternative, .. } => assert!(alternative.is_some()),
            other => panic!("unexpected {:?}", other),
        }
    }

    // ── Arrays / hashes / index ───────────────────────────────────────────
    #[test] fn test_array_literal() {
        match first_expr("[1, 2 * 2, 3 + 3]") {
            ExprKind::Array(items) => assert_eq!(items.len(), 3),
            other => panic!("unexpected {:?}", other),
        }
    }
    #[test] fn test_index_expression() {
        assert!(matches!(first_expr("myArray[1 + 1]"), ExprKind::Index { .. }));
    }
    #[test] fn test_hash_literal_string_keys() {
        match first_expr(r#"{"one": 1, "two": 2}"#) {
            ExprKind::Hash(pairs) => assert_eq!(pairs.len(), 2),
            other => panic!("unexpected {:?}", other),
        }
    }
    #[test] fn test_empty_hash_literal() {
        match first_expr("{}") {
            ExprKind::Hash(pairs) => assert!(pairs.is_empty()),
            other => panic!("unexpected {:?}", other),
        }
    }

    // ── Error recovery ────────────────────────────────────────────────────
    #[test] fn test_parse_error_reports_unexpected_token() {
        let (_, _, errors) = parse("let = 5;");
        assert!(!errors.is_empty());
    }

    // ── Whole-program sanity ──────────────────────────────────────────────
    #[test] fn test_full_program() {
        let src = r#"
            let add = fn(a, b) { a + b; };
            let result = add(5, 10);
            if (result > 10) { return result; } else { return 0; }
        "#;
        let program = parse_ok(src);
        assert_eq!(program.stmts.len(), 3);
    }
}
