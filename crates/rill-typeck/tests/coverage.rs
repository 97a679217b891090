//! Integration tests for match coverage analysis on real declarations:
//! non-exhaustive and redundant clause reporting across datatypes, bools,
//! lists, tuples, and literals.

use rill_typeck::{check_decl, initial_env, TypeckOptions, TypeError, TypeckResult};

fn check_with(src: &str, opts: &TypeckOptions) -> Vec<TypeckResult> {
    let parse = rill_parser::parse(src);
    assert!(parse.ok(), "parse errors: {:?}", parse.errors);
    let (mut env, mut registry) = initial_env();
    parse
        .decls
        .iter()
        .map(|d| check_decl(d, &mut env, &mut registry, opts))
        .collect()
}

fn warnings(src: &str) -> Vec<TypeError> {
    check_with(src, &TypeckOptions::default())
        .into_iter()
        .flat_map(|r| {
            assert!(r.ok(), "type errors: {:?}", r.errors);
            r.warnings
        })
        .collect()
}

fn has_nonexhaustive(warnings: &[TypeError]) -> bool {
    warnings
        .iter()
        .any(|w| matches!(w, TypeError::NonExhaustiveMatch { .. }))
}

fn has_redundant(warnings: &[TypeError]) -> bool {
    warnings
        .iter()
        .any(|w| matches!(w, TypeError::RedundantClause { .. }))
}

#[test]
fn fun_over_int_literals_warns_nonexhaustive() {
    let w = warnings("fun f 1 = \"one\" | f 2 = \"two\";");
    assert!(has_nonexhaustive(&w), "expected NON-EXHAUSTIVE, got {w:?}");
}

#[test]
fn fun_with_catchall_is_ok() {
    let w = warnings("fun f 1 = \"one\" | f _ = \"many\";");
    assert!(w.is_empty(), "expected no warnings, got {w:?}");
}

#[test]
fn bool_case_both_arms_is_ok() {
    let w = warnings("case true of true => 1 | false => 2;");
    assert!(w.is_empty(), "expected no warnings, got {w:?}");
}

#[test]
fn bool_case_single_arm_warns() {
    let w = warnings("case true of true => 1;");
    assert!(has_nonexhaustive(&w));
}

#[test]
fn clause_after_wildcard_is_redundant() {
    let w = warnings("case 1 of _ => 0 | 1 => 1;");
    assert!(has_redundant(&w), "expected REDUNDANT, got {w:?}");
}

#[test]
fn duplicate_constructor_clause_is_redundant() {
    let src = "datatype color = Red | Green; \
               fun name c = case c of Red => 1 | Green => 2 | Red => 3;";
    let w = warnings(src);
    assert!(has_redundant(&w));
}

#[test]
fn datatype_missing_constructor_warns() {
    let src = "datatype color = Red | Green | Blue; \
               fun name c = case c of Red => 1 | Green => 2;";
    let w = warnings(src);
    assert!(has_nonexhaustive(&w));
}

#[test]
fn list_nil_and_cons_is_exhaustive() {
    let w = warnings("fun len xs = case xs of [] => 0 | _ :: rest => 1 + len rest;");
    assert!(w.is_empty(), "expected no warnings, got {w:?}");
}

#[test]
fn list_fixed_lengths_warn() {
    let w = warnings("fun f xs = case xs of [] => 0 | [_] => 1;");
    assert!(has_nonexhaustive(&w));
}

#[test]
fn tuple_of_bools_cross_product_is_exhaustive() {
    let src = "fn p => case p of (true, _) => 1 | (false, true) => 2 | (false, false) => 3;";
    let w = warnings(src);
    assert!(w.is_empty(), "expected no warnings, got {w:?}");
}

#[test]
fn option_requires_both_constructors() {
    let w = warnings("fn x => case x of SOME _ => 1;");
    assert!(has_nonexhaustive(&w));
    let w = warnings("fn x => case x of SOME _ => 1 | NONE => 0;");
    assert!(w.is_empty(), "expected no warnings, got {w:?}");
}

#[test]
fn coverage_can_be_disabled() {
    let opts = TypeckOptions {
        match_coverage_enabled: false,
    };
    let results = check_with("fun f 1 = \"one\";", &opts);
    assert!(results.iter().all(|r| r.warnings.is_empty()));
}

#[test]
fn fun_multi_argument_coverage_spans_all_columns() {
    let w = warnings("fun f true true = 1 | f false _ = 2;");
    assert!(has_nonexhaustive(&w), "missing (true, false), got {w:?}");
    let w = warnings("fun f true true = 1 | f false _ = 2 | f true false = 3;");
    assert!(w.is_empty(), "expected no warnings, got {w:?}");
}
