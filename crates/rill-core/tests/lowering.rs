//! Integration tests driving source text through parse, typecheck,
//! lowering, and normalization, asserting on the shape of the core terms
//! produced.

use rill_core::{
    lower_decl, normalize_decl, CoreDecl, CoreExpr, CoreKind, CoreStep, FreshGen, Lit,
    NormalizeOptions,
};
use rill_typeck::{check_decl, initial_env, TypeckOptions};

/// Parse, check, lower, and normalize every declaration; return the core
/// declarations.
fn pipeline_with(src: &str, opts: &NormalizeOptions) -> Vec<CoreDecl> {
    let parse = rill_parser::parse(src);
    assert!(parse.ok(), "parse errors: {:?}", parse.errors);
    let (mut env, mut registry) = initial_env();
    let ty_opts = TypeckOptions::default();
    let mut fresh = FreshGen::new();
    parse
        .decls
        .iter()
        .map(|d| {
            let checked = check_decl(d, &mut env, &mut registry, &ty_opts);
            assert!(checked.ok(), "type errors: {:?}", checked.errors);
            let lowered = lower_decl(d, &checked, &env, &registry, &mut fresh);
            normalize_decl(lowered, opts, &registry, &mut fresh)
                .expect("normalization succeeds")
        })
        .collect()
}

fn pipeline(src: &str) -> Vec<CoreDecl> {
    pipeline_with(src, &NormalizeOptions::default())
}

/// The right-hand side of the last `val` binding.
fn last_rhs(decls: &[CoreDecl]) -> &CoreExpr {
    match decls.last().expect("at least one declaration") {
        CoreDecl::Vals(binds) => &binds.last().expect("a binding").rhs,
        other => panic!("expected vals, got {other:?}"),
    }
}

// ── Lowering shapes ────────────────────────────────────────────────────

#[test]
fn fun_clauses_collapse_to_fn_over_case() {
    let decls = pipeline("fun f 1 = \"one\" | f _ = \"many\";");
    match decls.last() {
        Some(CoreDecl::Rec(binds)) => {
            assert_eq!(binds[0].0, "f");
            match &binds[0].1.kind {
                CoreKind::Fn { body, .. } => {
                    assert!(
                        matches!(body.kind, CoreKind::CompiledCase { .. }),
                        "clause body should be a compiled case, got {:?}",
                        body.kind
                    );
                }
                other => panic!("expected fn, got {other:?}"),
            }
        }
        other => panic!("expected rec group, got {other:?}"),
    }
}

#[test]
fn if_lowers_to_two_armed_case() {
    let opts = NormalizeOptions {
        inline_pass_count: 0,
        ..NormalizeOptions::default()
    };
    let decls = pipeline_with("val x = if true then 1 else 2;", &opts);
    match &last_rhs(&decls).kind {
        CoreKind::CompiledCase { arms, .. } => assert_eq!(arms.len(), 2),
        other => panic!("expected compiled case, got {other:?}"),
    }
}

#[test]
fn exists_lowers_to_non_empty_test() {
    let opts = NormalizeOptions {
        inline_pass_count: 0,
        ..NormalizeOptions::default()
    };
    let decls = pipeline_with("exists i in [1,2] where i > 1;", &opts);
    match &last_rhs(&decls).kind {
        CoreKind::Apply { func, arg } => {
            assert!(
                matches!(&func.kind, CoreKind::Var(n) if n == rill_core::NON_EMPTY),
                "expected the emptiness test, got {:?}",
                func.kind
            );
            assert!(matches!(arg.kind, CoreKind::From(_)));
        }
        other => panic!("expected application, got {other:?}"),
    }
}

#[test]
fn forall_lowers_to_empty_test_over_negated_require() {
    let opts = NormalizeOptions {
        inline_pass_count: 0,
        ..NormalizeOptions::default()
    };
    let decls = pipeline_with("forall i in [1,2] require i > 0;", &opts);
    match &last_rhs(&decls).kind {
        CoreKind::Apply { func, arg } => {
            assert!(matches!(&func.kind, CoreKind::Var(n) if n == rill_core::EMPTY));
            let CoreKind::From(query) = &arg.kind else {
                panic!("expected pipeline argument");
            };
            let Some(CoreStep::Where(pred)) = query.steps.last() else {
                panic!("expected trailing where");
            };
            match &pred.kind {
                CoreKind::Apply { func, .. } => {
                    assert!(matches!(&func.kind, CoreKind::Var(n) if n == "not"));
                }
                other => panic!("expected negation, got {other:?}"),
            }
        }
        other => panic!("expected application, got {other:?}"),
    }
}

// ── Inlining ───────────────────────────────────────────────────────────

#[test]
fn atomic_binding_inlines() {
    let decls = pipeline("val y = let val x = 1 in x + x end;");
    // After inlining there is no residual let.
    let mut lets = 0;
    count_lets(last_rhs(&decls), &mut lets);
    assert_eq!(lets, 0, "atomic binding should substitute away");
}

#[test]
fn no_inlining_when_pass_count_is_zero() {
    let opts = NormalizeOptions {
        inline_pass_count: 0,
        ..NormalizeOptions::default()
    };
    let decls = pipeline_with("val y = let val x = 1 in x + x end;", &opts);
    let mut lets = 0;
    count_lets(last_rhs(&decls), &mut lets);
    assert!(lets > 0, "pass count 0 must keep the binding");
}

fn count_lets(e: &CoreExpr, n: &mut usize) {
    if matches!(e.kind, CoreKind::Let { .. }) {
        *n += 1;
    }
    // A shallow walk over the few shapes these tests produce.
    match &e.kind {
        CoreKind::Let { rhs, body, .. } => {
            count_lets(rhs, n);
            count_lets(body, n);
        }
        CoreKind::Apply { func, arg } => {
            count_lets(func, n);
            count_lets(arg, n);
        }
        CoreKind::Record(fields) => fields.iter().for_each(|(_, f)| count_lets(f, n)),
        CoreKind::CompiledCase { scrutinee, arms, .. } => {
            count_lets(scrutinee, n);
            arms.iter().for_each(|a| count_lets(&a.body, n));
        }
        _ => {}
    }
}

// ── Fusion ─────────────────────────────────────────────────────────────

#[test]
fn map_over_literal_becomes_pipeline() {
    let decls = pipeline("val xs = map (fn x => x * 2) [1, 2, 3];");
    match &last_rhs(&decls).kind {
        CoreKind::From(query) => {
            assert!(matches!(query.steps[0], CoreStep::Scan { .. }));
            assert!(query
                .steps
                .iter()
                .any(|s| matches!(s, CoreStep::Yield(_))));
        }
        other => panic!("expected pipeline, got {other:?}"),
    }
}

#[test]
fn map_filter_chain_fuses_into_one_pipeline() {
    let decls =
        pipeline("val xs = map (fn x => x + 1) (filter (fn x => x > 1) [1, 2, 3]);");
    match &last_rhs(&decls).kind {
        CoreKind::From(query) => {
            let scans = query
                .steps
                .iter()
                .filter(|s| matches!(s, CoreStep::Scan { .. }))
                .count();
            assert_eq!(scans, 1, "chain should fuse to a single scan");
            assert!(query
                .steps
                .iter()
                .any(|s| matches!(s, CoreStep::Where(_))));
        }
        other => panic!("expected pipeline, got {other:?}"),
    }
}

#[test]
fn nested_from_flattens() {
    let decls = pipeline("val xs = from i in (from j in [1,2,3] yield j * 2) where i > 2;");
    match &last_rhs(&decls).kind {
        CoreKind::From(query) => {
            let nested = query.steps.iter().any(|s| match s {
                CoreStep::Scan {
                    source: Some(src), ..
                } => matches!(src.kind, CoreKind::From(_)),
                _ => false,
            });
            assert!(!nested, "inner pipeline should have been spliced");
        }
        other => panic!("expected pipeline, got {other:?}"),
    }
}

#[test]
fn adjacent_wheres_merge() {
    let decls = pipeline("val xs = from i in [1,2,3] where i > 0 where i < 3;");
    match &last_rhs(&decls).kind {
        CoreKind::From(query) => {
            let wheres = query
                .steps
                .iter()
                .filter(|s| matches!(s, CoreStep::Where(_)))
                .count();
            assert_eq!(wheres, 1, "consecutive wheres should merge");
        }
        other => panic!("expected pipeline, got {other:?}"),
    }
}

// ── Extent solving ─────────────────────────────────────────────────────

#[test]
fn bool_extent_is_enumerated() {
    let decls = pipeline("val xs = from b where b;");
    match &last_rhs(&decls).kind {
        CoreKind::From(query) => match &query.steps[0] {
            CoreStep::Scan {
                source: Some(src), ..
            } => match &src.kind {
                CoreKind::MkList(items) => {
                    assert_eq!(items.len(), 2);
                    assert!(matches!(items[0].kind, CoreKind::Lit(Lit::Bool(false))));
                    assert!(matches!(items[1].kind, CoreKind::Lit(Lit::Bool(true))));
                }
                other => panic!("expected enumerated extent, got {other:?}"),
            },
            other => panic!("expected solved scan, got {other:?}"),
        },
        other => panic!("expected pipeline, got {other:?}"),
    }
}

#[test]
fn membership_constraint_supplies_extent() {
    let decls = pipeline("val xs = from v where v elem [1, 2, 3];");
    match &last_rhs(&decls).kind {
        CoreKind::From(query) => match &query.steps[0] {
            CoreStep::Scan { source, .. } => {
                assert!(source.is_some(), "elem constraint should supply the scan");
            }
            other => panic!("expected scan, got {other:?}"),
        },
        other => panic!("expected pipeline, got {other:?}"),
    }
}

#[test]
fn enumerable_datatype_extent() {
    let decls = pipeline(
        "datatype suit = Clubs | Diamonds | Hearts | Spades; val xs = from s where s = Hearts;",
    );
    match &last_rhs(&decls).kind {
        CoreKind::From(query) => match &query.steps[0] {
            CoreStep::Scan {
                source: Some(src), ..
            } => {
                // The `s = Hearts` equality narrows the extent to one row.
                match &src.kind {
                    CoreKind::MkList(items) => assert_eq!(items.len(), 1),
                    other => panic!("expected singleton extent, got {other:?}"),
                }
            }
            other => panic!("expected solved scan, got {other:?}"),
        },
        other => panic!("expected pipeline, got {other:?}"),
    }
}

#[test]
fn unbounded_extent_is_a_diagnostic() {
    let parse = rill_parser::parse("val xs = from s where String.size s = 0;");
    assert!(parse.ok());
    let (mut env, mut registry) = initial_env();
    let checked = check_decl(
        &parse.decls[0],
        &mut env,
        &mut registry,
        &TypeckOptions::default(),
    );
    assert!(checked.ok(), "type errors: {:?}", checked.errors);
    let mut fresh = FreshGen::new();
    let lowered = lower_decl(&parse.decls[0], &checked, &env, &registry, &mut fresh);
    let result = normalize_decl(
        lowered,
        &NormalizeOptions::default(),
        &registry,
        &mut fresh,
    );
    let err = result.expect_err("unbounded extent must be reported");
    assert!(
        err.message.contains("extent"),
        "unexpected message: {}",
        err.message
    );
}
