//! Integration tests for core Hindley-Milner inference: literals,
//! let-polymorphism, the value restriction, records and flex records,
//! datatypes, and overload resolution.

use rill_typeck::{
    check_decl, initial_env, TypeckOptions, TypeckResult, TypeEnv, TypePrinter, TypeError,
    TypeRegistry,
};

// ── Helpers ────────────────────────────────────────────────────────────

struct Checked {
    results: Vec<TypeckResult>,
    env: TypeEnv,
    registry: TypeRegistry,
}

/// Parse Rill source and type-check each declaration in order against one
/// accumulated environment.
fn check_source(src: &str) -> Checked {
    let parse = rill_parser::parse(src);
    assert!(parse.ok(), "parse errors: {:?}", parse.errors);
    let (mut env, mut registry) = initial_env();
    let opts = TypeckOptions::default();
    let results = parse
        .decls
        .iter()
        .map(|d| check_decl(d, &mut env, &mut registry, &opts))
        .collect();
    Checked {
        results,
        env,
        registry,
    }
}

/// The printed scheme of the last value bound by the last declaration.
fn last_type(src: &str) -> String {
    let checked = check_source(src);
    let result = checked.results.last().expect("at least one declaration");
    assert!(result.ok(), "type errors: {:?}", result.errors);
    let (_, scheme) = result
        .bound_values
        .last()
        .expect("expected a value binding");
    TypePrinter::new(&checked.registry).print_scheme(scheme)
}

fn last_errors(src: &str) -> Vec<TypeError> {
    let checked = check_source(src);
    checked
        .results
        .last()
        .expect("at least one declaration")
        .errors
        .clone()
}

// ── Literals and operators ─────────────────────────────────────────────

#[test]
fn int_addition() {
    assert_eq!(last_type("1 + 2;"), "int");
}

#[test]
fn real_addition_selects_real_instance() {
    assert_eq!(last_type("1.5 + 2.5;"), "real");
}

#[test]
fn mixed_arithmetic_is_rejected() {
    let errors = last_errors("1 + 2.5;");
    assert!(
        errors
            .iter()
            .any(|e| matches!(e, TypeError::NoOverloadInstance { .. })),
        "expected overload failure, got {errors:?}"
    );
}

#[test]
fn string_concatenation() {
    assert_eq!(last_type("\"a\" ^ \"b\";"), "string");
}

#[test]
fn real_division_is_monomorphic() {
    assert_eq!(last_type("1.0 / 2.0;"), "real");
}

#[test]
fn div_mod_are_integer() {
    assert_eq!(last_type("7 div 2;"), "int");
    assert_eq!(last_type("7 mod 2;"), "int");
}

#[test]
fn comparison_is_overloaded() {
    assert_eq!(last_type("\"a\" < \"b\";"), "bool");
    assert_eq!(last_type("#\"a\" < #\"b\";"), "bool");
}

#[test]
fn negation_literal_and_operator() {
    assert_eq!(last_type("~3;"), "int");
    assert_eq!(last_type("val x = 3; ~x;"), "int");
    assert_eq!(last_type("~3.5;"), "real");
}

// ── Functions and polymorphism ─────────────────────────────────────────

#[test]
fn identity_generalizes() {
    assert_eq!(last_type("fn x => x;"), "'a -> 'a");
}

#[test]
fn polymorphic_function_used_at_two_types() {
    let src = "val id = fn x => x; (id 1, id \"a\");";
    assert_eq!(last_type(src), "int * string");
}

#[test]
fn fun_factorial() {
    assert_eq!(
        last_type("fun fact n = if n = 0 then 1 else n * fact (n - 1);"),
        "int -> int"
    );
}

#[test]
fn fun_curried_arguments() {
    assert_eq!(last_type("fun add x y = x + y;"), "int -> int -> int");
}

#[test]
fn mutual_recursion_via_and() {
    let src = "fun even n = if n = 0 then true else odd (n - 1) \
               and odd n = if n = 0 then false else even (n - 1); even 4;";
    assert_eq!(last_type(src), "bool");
}

#[test]
fn value_restriction_blocks_generalization() {
    let errors = last_errors("val xs = rev [];");
    assert!(
        errors
            .iter()
            .any(|e| matches!(e, TypeError::UnresolvedTopLevel { .. })),
        "expected value-restriction report, got {errors:?}"
    );
}

#[test]
fn list_literal_is_a_value_and_generalizes() {
    assert_eq!(last_type("[];"), "'a list");
}

#[test]
fn composition_operator() {
    let src = "val f = fn x => x + 1; val g = fn x => x * 2; f o g;";
    assert_eq!(last_type(src), "int -> int");
}

// ── let and and-bindings ───────────────────────────────────────────────

#[test]
fn and_bindings_see_outer_scope() {
    // The second `x` shadows for the body, but both right-hand sides are
    // checked in the outer environment.
    assert_eq!(last_type("let val x = 1 and x = 2 in x end;"), "int");
}

#[test]
fn let_bound_polymorphism() {
    assert_eq!(
        last_type("let val id = fn x => x in (id 1, id true) end;"),
        "int * bool"
    );
}

// ── Records, tuples, selectors ─────────────────────────────────────────

#[test]
fn record_fields_are_canonicalized() {
    assert_eq!(last_type("{b = 1, a = 2};"), "{a:int, b:int}");
}

#[test]
fn tuple_types_print_as_products() {
    assert_eq!(last_type("(1, \"x\", true);"), "int * string * bool");
}

#[test]
fn selector_resolves_against_record() {
    assert_eq!(last_type("#b {a = 1, b = true};"), "bool");
}

#[test]
fn dot_selection() {
    assert_eq!(last_type("val r = {a = 1, b = \"s\"}; r.b;"), "string");
}

#[test]
fn tuple_ordinal_selection() {
    assert_eq!(last_type("#2 (7, \"x\");"), "string");
}

#[test]
fn missing_field_is_reported() {
    let errors = last_errors("#c {a = 1, b = 2};");
    assert!(
        errors
            .iter()
            .any(|e| matches!(e, TypeError::NoSuchField { .. })),
        "expected NoSuchField, got {errors:?}"
    );
}

#[test]
fn duplicate_field_is_reported() {
    let errors = last_errors("{a = 1, a = 2};");
    assert!(errors
        .iter()
        .any(|e| matches!(e, TypeError::DuplicateField { .. })));
}

#[test]
fn unresolved_flex_record_is_reported() {
    let errors = last_errors("fn r => r.x;");
    assert!(
        errors
            .iter()
            .any(|e| matches!(e, TypeError::UnresolvedFlexRecord { .. })),
        "expected UnresolvedFlexRecord, got {errors:?}"
    );
}

#[test]
fn flex_record_resolved_by_annotation() {
    assert_eq!(
        last_type("fn (r : {x:int, y:bool}) => r.x;"),
        "{x:int, y:bool} -> int"
    );
}

#[test]
fn flex_pattern_resolved_by_application_site() {
    let src = "val f = fn (r : {a:int, b:string}) => r; fn {a, ...} => a;";
    // The flex pattern alone cannot resolve; expect the diagnostic.
    let errors = last_errors(src);
    assert!(errors
        .iter()
        .any(|e| matches!(e, TypeError::UnresolvedFlexRecord { .. })));
}

// ── Datatypes ──────────────────────────────────────────────────────────

#[test]
fn datatype_constructor_application() {
    let src = "datatype 'a tree = Leaf of 'a | Node of 'a tree * 'a tree; \
               Node (Leaf 1, Leaf 2);";
    assert_eq!(last_type(src), "int tree");
}

#[test]
fn nilary_constructors_are_values() {
    let src = "datatype color = Red | Green | Blue; Green;";
    assert_eq!(last_type(src), "color");
}

#[test]
fn option_is_predefined() {
    assert_eq!(last_type("SOME 3;"), "int option");
    assert_eq!(last_type("NONE;"), "'a option");
}

#[test]
fn constructor_pattern_in_case() {
    let src = "datatype 'a tree = Leaf of 'a | Node of 'a tree * 'a tree; \
               fun depth t = case t of Leaf _ => 1 | Node (l, r) => 1 + depth l;";
    assert_eq!(last_type(src), "'a tree -> int");
}

#[test]
fn mutually_recursive_datatypes() {
    let src = "datatype forest = Forest of tree list and tree = Tree of forest; \
               Forest [];";
    assert_eq!(last_type(src), "forest");
}

#[test]
fn type_alias_expands() {
    assert_eq!(
        last_type("type point = {x:int, y:int}; fn (p : point) => p.x;"),
        "{x:int, y:int} -> int"
    );
}

// ── Overloads ──────────────────────────────────────────────────────────

#[test]
fn user_overload_group_selects_unique_instance() {
    let src = "over double; \
               val inst double = fn (x : int) => x * 2; \
               val inst double = fn (s : string) => s ^ s; \
               double 21;";
    assert_eq!(last_type(src), "int");
}

#[test]
fn user_overload_other_instance() {
    let src = "over double; \
               val inst double = fn (x : int) => x * 2; \
               val inst double = fn (s : string) => s ^ s; \
               double \"ab\";";
    assert_eq!(last_type(src), "string");
}

#[test]
fn overload_without_match_is_reported() {
    let src = "over double; val inst double = fn (x : int) => x * 2; double 1.5;";
    let errors = last_errors(src);
    assert!(errors
        .iter()
        .any(|e| matches!(e, TypeError::NoOverloadInstance { .. })));
}

#[test]
fn inst_on_non_overload_is_reported() {
    let errors = last_errors("val inst rev = fn (x : int) => x;");
    assert!(errors
        .iter()
        .any(|e| matches!(e, TypeError::NotAnOverload { .. })));
}

// ── Exceptions ─────────────────────────────────────────────────────────

#[test]
fn raise_has_any_type() {
    assert_eq!(
        last_type("exception Boom; fn x => if x then 1 else raise Boom;"),
        "bool -> int"
    );
}

#[test]
fn handle_unifies_with_body() {
    let src = "exception Overdrawn of int; \
               (raise Overdrawn 5) handle Overdrawn n => n;";
    assert_eq!(last_type(src), "int");
}

// ── Annotations and signatures ─────────────────────────────────────────

#[test]
fn annotation_constrains() {
    assert_eq!(last_type("(fn x => x) : int -> int;"), "int -> int");
}

#[test]
fn annotation_mismatch_is_reported() {
    let errors = last_errors("1 : string;");
    assert!(errors
        .iter()
        .any(|e| matches!(e, TypeError::Mismatch { .. })));
}

#[test]
fn signature_declaration_is_accepted() {
    let checked = check_source("signature S = sig val x : int val f : 'a -> 'a end;");
    assert!(checked.results[0].ok());
    assert!(checked.env.lookup("S").is_some());
}

#[test]
fn unbound_variable_is_reported() {
    let errors = last_errors("nonesuch + 1;");
    assert!(errors
        .iter()
        .any(|e| matches!(e, TypeError::UnboundVariable { .. })));
}

#[test]
fn unknown_type_constructor_is_reported() {
    let errors = last_errors("1 : widget;");
    assert!(errors
        .iter()
        .any(|e| matches!(e, TypeError::UnboundTyCon { .. })));
}
