//! Integration tests for the parser: whole programs, positions carried on
//! nodes, and error positions.

use rill_parser::ast::{DeclKind, ExprKind};

#[test]
fn multi_declaration_program_parses() {
    let src = "datatype color = Red | Green | Blue;\n\
               fun show Red = \"red\" | show Green = \"green\" | show Blue = \"blue\";\n\
               map show [Red, Blue];";
    let parse = rill_parser::parse(src);
    assert!(parse.ok(), "parse errors: {:?}", parse.errors);
    assert_eq!(parse.decls.len(), 3);
    assert!(matches!(parse.decls[0].kind, DeclKind::Datatype(_)));
    assert!(matches!(parse.decls[1].kind, DeclKind::Fun(_)));
    assert!(matches!(parse.decls[2].kind, DeclKind::Expr(_)));
}

#[test]
fn spans_point_into_the_source() {
    let src = "val answer = 42;";
    let parse = rill_parser::parse(src);
    assert!(parse.ok());
    let DeclKind::Val { binds, .. } = &parse.decls[0].kind else {
        panic!("expected a val declaration");
    };
    let rhs = &binds[0].expr;
    assert_eq!(&src[rhs.span.start as usize..rhs.span.end as usize], "42");
}

#[test]
fn node_ids_are_unique_within_a_parse() {
    let src = "(1, 2, [3, 4], {a = 5});";
    let parse = rill_parser::parse(src);
    assert!(parse.ok());
    let DeclKind::Expr(e) = &parse.decls[0].kind else {
        panic!("expected an expression");
    };
    let mut ids = Vec::new();
    collect_ids(e, &mut ids);
    let before = ids.len();
    ids.sort_by_key(|id| id.0);
    ids.dedup();
    assert_eq!(ids.len(), before, "node ids must not repeat");
}

fn collect_ids(e: &rill_parser::ast::Expr, out: &mut Vec<rill_parser::ast::NodeId>) {
    out.push(e.id);
    match &e.kind {
        ExprKind::Tuple(items) | ExprKind::List(items) => {
            items.iter().for_each(|i| collect_ids(i, out))
        }
        ExprKind::Record(fields) => fields.iter().for_each(|f| collect_ids(&f.expr, out)),
        _ => {}
    }
}

#[test]
fn error_cites_the_first_unexpected_token() {
    let src = "val x = if 1 then 2;";
    let parse = rill_parser::parse(src);
    assert!(!parse.ok());
    let diag = &parse.errors[0];
    // The error arrives no later than the declaration terminator.
    assert!(diag.span.start <= src.len() as u32);
    assert!(diag.message.contains("expected"));
}

#[test]
fn nested_query_in_scan_source() {
    let src = "from i in (from j in [1,2] yield j * 2) yield i + 1;";
    let parse = rill_parser::parse(src);
    assert!(parse.ok(), "parse errors: {:?}", parse.errors);
    let DeclKind::Expr(e) = &parse.decls[0].kind else {
        panic!("expected an expression");
    };
    assert!(matches!(e.kind, ExprKind::From(_)));
}
