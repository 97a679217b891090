//! Integration tests for relational pipeline typing: scans, steps, row
//! re-binding, grouping, aggregates, set operations, orderedness, and the
//! quantifiers.

use rill_typeck::{
    check_decl, initial_env, TypeckOptions, TypeckResult, TypePrinter, TypeError, TypeRegistry,
};

fn check_source(src: &str) -> (Vec<TypeckResult>, TypeRegistry) {
    let parse = rill_parser::parse(src);
    assert!(parse.ok(), "parse errors: {:?}", parse.errors);
    let (mut env, mut registry) = initial_env();
    let opts = TypeckOptions::default();
    let results = parse
        .decls
        .iter()
        .map(|d| check_decl(d, &mut env, &mut registry, &opts))
        .collect();
    (results, registry)
}

fn last_type(src: &str) -> String {
    let (results, registry) = check_source(src);
    let result = results.last().expect("at least one declaration");
    assert!(result.ok(), "type errors: {:?}", result.errors);
    let (_, scheme) = result
        .bound_values
        .last()
        .expect("expected a value binding");
    TypePrinter::new(&registry).print_scheme(scheme)
}

fn last_errors(src: &str) -> Vec<TypeError> {
    let (results, _) = check_source(src);
    results
        .last()
        .expect("at least one declaration")
        .errors
        .clone()
}

#[test]
fn scan_where_yield() {
    assert_eq!(
        last_type("from i in [3, 1, 2] where i < 3 yield i * 10;"),
        "int list"
    );
}

#[test]
fn default_row_of_single_scan_is_scalar() {
    assert_eq!(last_type("from i in [1, 2, 3];"), "int list");
}

#[test]
fn default_row_of_two_scans_is_record() {
    assert_eq!(
        last_type("from i in [1], s in [\"a\"];"),
        "{i:int, s:string} list"
    );
}

#[test]
fn empty_from_is_unit_list() {
    assert_eq!(last_type("from;"), "unit list");
}

#[test]
fn where_requires_bool() {
    let errors = last_errors("from i in [1] where i;");
    assert!(errors
        .iter()
        .any(|e| matches!(e, TypeError::Mismatch { .. })));
}

#[test]
fn group_compute_builds_record_row() {
    let src = "from e in [{a=2,b=3},{a=2,b=1},{a=1,b=1}] \
               group e.a compute sb = sum of e.b;";
    assert_eq!(last_type(src), "{a:int, sb:int} list");
}

#[test]
fn group_single_key_still_records() {
    assert_eq!(
        last_type("from e in [{a=1,b=2}] group e.a;"),
        "{a:int} list"
    );
}

#[test]
fn terminal_compute_is_scalar() {
    assert_eq!(last_type("from i in [1,2,3] compute sum over i;"), "int");
}

#[test]
fn terminal_compute_two_aggregates_is_record() {
    assert_eq!(
        last_type("from i in [1,2,3] compute s = sum over i, n = count over i;"),
        "{n:int, s:int}"
    );
}

#[test]
fn duplicate_group_labels_are_reported() {
    let errors = last_errors("from e in [{a=1}] group e.a compute a = count over e;");
    assert!(errors
        .iter()
        .any(|e| matches!(e, TypeError::DuplicateField { .. })));
}

#[test]
fn yield_record_introduces_field_bindings() {
    let src = "from i in [1,2] yield {sq = i * i, c = i} where sq > 1 yield sq + c;";
    assert_eq!(last_type(src), "int list");
}

#[test]
fn join_extends_row() {
    let src = "from i in [1,2] join s in [\"a\"] on i = 1 yield {i, s};";
    assert_eq!(last_type(src), "{i:int, s:string} list");
}

#[test]
fn order_take_skip_on_list() {
    assert_eq!(
        last_type("from i in [3,1,2] order i desc skip 1 take 1;"),
        "int list"
    );
}

#[test]
fn scan_from_bag_is_unordered() {
    assert_eq!(last_type("from i in bag [1,2];"), "int bag");
}

#[test]
fn take_on_unordered_pipeline_is_reported() {
    let errors = last_errors("from i in bag [1,2] take 1;");
    assert!(errors
        .iter()
        .any(|e| matches!(e, TypeError::StepNeedsOrder { .. })));
}

#[test]
fn order_reimposes_order_on_bag() {
    assert_eq!(last_type("from i in bag [1,2] order i take 1;"), "int list");
}

#[test]
fn unorder_switches_to_bag() {
    assert_eq!(last_type("from i in [1,2] unorder;"), "int bag");
}

#[test]
fn union_keeps_row_type() {
    assert_eq!(last_type("from i in [1,2] union [3, 4];"), "int list");
}

#[test]
fn union_element_mismatch_is_reported() {
    let errors = last_errors("from i in [1,2] union [\"a\"];");
    assert!(errors
        .iter()
        .any(|e| matches!(e, TypeError::Mismatch { .. })));
}

#[test]
fn into_applies_collection_function() {
    assert_eq!(last_type("from i in [1,2,3] into length;"), "int");
}

#[test]
fn through_rebinds_row() {
    let src = "from i in [1,2,3] through j in (fn xs => map (fn x => x * 2) xs) yield j + 1;";
    assert_eq!(last_type(src), "int list");
}

#[test]
fn exists_is_bool() {
    assert_eq!(last_type("exists i in [1,2] where i > 1;"), "bool");
}

#[test]
fn forall_is_bool() {
    assert_eq!(last_type("forall i in [1,2] require i > 0;"), "bool");
}

#[test]
fn unbounded_scan_types_from_predicate() {
    assert_eq!(last_type("from b where b;"), "bool list");
}

#[test]
fn distinct_preserves_row() {
    assert_eq!(last_type("from i in [1,1,2] distinct;"), "int list");
}
