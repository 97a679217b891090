//! Rill parser: recursive descent over the token stream, producing the
//! owned surface AST.
//!
//! The parser stops at the first unexpected token and reports it with its
//! position; the remaining input of the declaration is discarded.

pub mod ast;
pub mod error;
mod parser;

use rill_common::diag::Diagnostic;
use rill_common::token::TokenKind;
use rill_lexer::Lexer;

pub use error::ParseError;

use ast::Decl;

/// Result of parsing a Rill program: the declarations that parsed, plus any
/// parse diagnostic. With the first-error strategy, `errors` holds at most
/// one entry.
pub struct Parse {
    pub decls: Vec<Decl>,
    pub errors: Vec<Diagnostic>,
}

impl Parse {
    /// Whether parsing completed without errors.
    pub fn ok(&self) -> bool {
        self.errors.is_empty()
    }
}

/// Parse a sequence of `;`-terminated declarations.
///
/// The final semicolon may be omitted at end of input, which lets callers
/// feed a single expression without a terminator.
pub fn parse(source: &str) -> Parse {
    let tokens = Lexer::tokenize(source);
    let mut p = parser::Parser::new(tokens, source);
    let mut decls = Vec::new();
    let mut errors = Vec::new();

    while !p.at(TokenKind::Eof) {
        match p.decl() {
            Ok(decl) => {
                decls.push(decl);
                if !p.eat(TokenKind::Semicolon) {
                    if p.at(TokenKind::Eof) {
                        break;
                    }
                    errors.push(p.unexpected("`;`").into_diagnostic());
                    break;
                }
                // Tolerate stray extra semicolons between declarations.
                while p.eat(TokenKind::Semicolon) {}
            }
            Err(e) => {
                errors.push(e.into_diagnostic());
                break;
            }
        }
    }

    Parse { decls, errors }
}

#[cfg(test)]
mod tests {
    use super::ast::*;
    use super::*;

    fn parse_one(source: &str) -> Decl {
        let parse = parse(source);
        assert!(parse.ok(), "parse errors: {:?}", parse.errors);
        assert_eq!(parse.decls.len(), 1, "expected one declaration");
        parse.decls.into_iter().next().unwrap()
    }

    fn parse_expr(source: &str) -> Expr {
        match parse_one(source).kind {
            DeclKind::Expr(e) => e,
            other => panic!("expected expression declaration, got {other:?}"),
        }
    }

    #[test]
    fn parse_arithmetic_precedence() {
        let e = parse_expr("1 + 2 * 3;");
        match e.kind {
            ExprKind::Binop(BinOp::Plus, _, rhs) => match rhs.kind {
                ExprKind::Binop(BinOp::Times, _, _) => {}
                other => panic!("expected `*` under `+`, got {other:?}"),
            },
            other => panic!("expected `+` at top, got {other:?}"),
        }
    }

    #[test]
    fn parse_cons_right_associative() {
        let e = parse_expr("1 :: 2 :: [];");
        match e.kind {
            ExprKind::Binop(BinOp::Cons, _, rhs) => {
                assert!(matches!(rhs.kind, ExprKind::Binop(BinOp::Cons, _, _)));
            }
            other => panic!("expected cons chain, got {other:?}"),
        }
    }

    #[test]
    fn parse_application_binds_tighter_than_infix() {
        let e = parse_expr("f 1 + g 2;");
        match e.kind {
            ExprKind::Binop(BinOp::Plus, lhs, rhs) => {
                assert!(matches!(lhs.kind, ExprKind::App(_, _)));
                assert!(matches!(rhs.kind, ExprKind::App(_, _)));
            }
            other => panic!("expected `+` of applications, got {other:?}"),
        }
    }

    #[test]
    fn parse_record_sugar() {
        let e = parse_expr("{a, e.b, #c x, d = 1};");
        match e.kind {
            ExprKind::Record(fields) => {
                let labels: Vec<&str> = fields.iter().map(|f| f.label.as_str()).collect();
                assert_eq!(labels, vec!["a", "b", "c", "d"]);
            }
            other => panic!("expected record, got {other:?}"),
        }
    }

    #[test]
    fn parse_record_sugar_without_derivable_label_fails() {
        let parse = parse("{a + 1};");
        assert!(!parse.ok());
        assert!(parse.errors[0].message.contains("field label"));
    }

    #[test]
    fn parse_fun_with_clauses() {
        let d = parse_one("fun f 1 = \"one\" | f 2 = \"two\";");
        match d.kind {
            DeclKind::Fun(binds) => {
                assert_eq!(binds.len(), 1);
                assert_eq!(binds[0].name, "f");
                assert_eq!(binds[0].clauses.len(), 2);
            }
            other => panic!("expected fun, got {other:?}"),
        }
    }

    #[test]
    fn parse_datatype() {
        let d = parse_one("datatype 'a tree = Leaf of 'a | Node of 'a tree * 'a tree;");
        match d.kind {
            DeclKind::Datatype(binds) => {
                assert_eq!(binds[0].name, "tree");
                assert_eq!(binds[0].params, vec!["a"]);
                assert_eq!(binds[0].ctors.len(), 2);
                assert!(binds[0].ctors[0].arg.is_some());
            }
            other => panic!("expected datatype, got {other:?}"),
        }
    }

    #[test]
    fn parse_from_pipeline() {
        let e = parse_expr("from i in [3, 1, 2] where i < 3 yield i * 10;");
        match e.kind {
            ExprKind::From(q) => {
                assert_eq!(q.scans.len(), 1);
                assert!(matches!(q.scans[0].kind, ScanKind::Source(_)));
                assert_eq!(q.steps.len(), 2);
                assert!(matches!(q.steps[0].kind, StepKind::Where(_)));
                assert!(matches!(q.steps[1].kind, StepKind::Yield(_)));
            }
            other => panic!("expected from, got {other:?}"),
        }
    }

    #[test]
    fn parse_unbounded_scan() {
        let e = parse_expr("from b where b;");
        match e.kind {
            ExprKind::From(q) => {
                assert!(matches!(q.scans[0].kind, ScanKind::Unbounded));
            }
            other => panic!("expected from, got {other:?}"),
        }
    }

    #[test]
    fn parse_group_compute() {
        let e = parse_expr("from e in xs group e.a compute sb = sum of e.b;");
        match e.kind {
            ExprKind::From(q) => match &q.steps[0].kind {
                StepKind::Group { keys, aggs } => {
                    assert_eq!(keys[0].0, "a");
                    assert_eq!(aggs[0].label, "sb");
                    assert!(aggs[0].arg.is_some());
                }
                other => panic!("expected group, got {other:?}"),
            },
            other => panic!("expected from, got {other:?}"),
        }
    }

    #[test]
    fn parse_terminal_compute() {
        let e = parse_expr("from i in [1,2,3] compute sum over i;");
        match e.kind {
            ExprKind::From(q) => match &q.steps[0].kind {
                StepKind::Compute(aggs) => {
                    assert_eq!(aggs[0].label, "sum");
                }
                other => panic!("expected compute, got {other:?}"),
            },
            other => panic!("expected from, got {other:?}"),
        }
    }

    #[test]
    fn parse_forall_requires_require() {
        let parse = parse("forall i in [1,2] where i > 0;");
        assert!(!parse.ok());
        assert!(parse.errors[0].message.contains("require"));
    }

    #[test]
    fn parse_compute_rejected_in_exists() {
        let parse = parse("exists i in [1,2] compute sum over i;");
        assert!(!parse.ok());
    }

    #[test]
    fn parse_let_with_and_bindings() {
        let e = parse_expr("let val x = 1 and y = 2 in x + y end;");
        match e.kind {
            ExprKind::Let(decls, _) => match &decls[0].kind {
                DeclKind::Val { binds, .. } => assert_eq!(binds.len(), 2),
                other => panic!("expected val, got {other:?}"),
            },
            other => panic!("expected let, got {other:?}"),
        }
    }

    #[test]
    fn parse_case_with_cons_pattern() {
        let e = parse_expr("case xs of x :: rest => x | [] => 0;");
        match e.kind {
            ExprKind::Case(_, arms) => {
                assert_eq!(arms.len(), 2);
                assert!(matches!(arms[0].pat.kind, PatKind::Cons(_, _)));
                assert!(matches!(arms[1].pat.kind, PatKind::List(ref v) if v.is_empty()));
            }
            other => panic!("expected case, got {other:?}"),
        }
    }

    #[test]
    fn parse_flex_record_pattern() {
        let e = parse_expr("fn {a, ...} => a;");
        match e.kind {
            ExprKind::Fn(arms) => match &arms[0].pat.kind {
                PatKind::Record { fields, flex } => {
                    assert_eq!(fields.len(), 1);
                    assert!(*flex);
                }
                other => panic!("expected record pattern, got {other:?}"),
            },
            other => panic!("expected fn, got {other:?}"),
        }
    }

    #[test]
    fn parse_annotation_and_selector() {
        let e = parse_expr("#b {a = 1, b = 2} : int;");
        assert!(matches!(e.kind, ExprKind::Annot(_, _)));
    }

    #[test]
    fn parse_over_and_inst() {
        let d = parse_one("over plus;");
        assert!(matches!(d.kind, DeclKind::Over(ref n) if n == "plus"));
        let d = parse_one("val inst plus = fn (x, y) => x + y;");
        match d.kind {
            DeclKind::Val { inst, .. } => assert!(inst),
            other => panic!("expected val inst, got {other:?}"),
        }
    }

    #[test]
    fn parse_signature() {
        let d = parse_one("signature S = sig val x : int val f : int -> int end;");
        match d.kind {
            DeclKind::Signature { name, specs } => {
                assert_eq!(name, "S");
                assert_eq!(specs.len(), 2);
            }
            other => panic!("expected signature, got {other:?}"),
        }
    }

    #[test]
    fn parse_exception_and_handle() {
        let d = parse_one("exception Overdrawn of int;");
        assert!(matches!(d.kind, DeclKind::Exception { .. }));
        let e = parse_expr("f x handle Overdrawn n => n | Div => 0;");
        assert!(matches!(e.kind, ExprKind::Handle(_, _)));
    }

    #[test]
    fn parse_union_with_distinct() {
        let e = parse_expr("from i in xs union distinct ys, zs;");
        match e.kind {
            ExprKind::From(q) => match &q.steps[0].kind {
                StepKind::Set {
                    op,
                    distinct,
                    sources,
                } => {
                    assert_eq!(*op, SetOp::Union);
                    assert!(*distinct);
                    assert_eq!(sources.len(), 2);
                }
                other => panic!("expected set step, got {other:?}"),
            },
            other => panic!("expected from, got {other:?}"),
        }
    }

    #[test]
    fn parse_order_desc() {
        let e = parse_expr("from i in xs order i desc, i;");
        match e.kind {
            ExprKind::From(q) => match &q.steps[0].kind {
                StepKind::Order(keys) => {
                    assert!(keys[0].desc);
                    assert!(!keys[1].desc);
                }
                other => panic!("expected order, got {other:?}"),
            },
            other => panic!("expected from, got {other:?}"),
        }
    }

    #[test]
    fn parse_quoted_reserved_word_as_name() {
        let d = parse_one("val `from` = 1;");
        match d.kind {
            DeclKind::Val { binds, .. } => {
                assert!(matches!(binds[0].pat.kind, PatKind::Ident(ref n) if n == "from"));
            }
            other => panic!("expected val, got {other:?}"),
        }
    }

    #[test]
    fn parse_error_reports_position() {
        let parse = parse("val x = ;");
        assert!(!parse.ok());
        assert_eq!(parse.errors[0].span.start, 8);
    }
}
