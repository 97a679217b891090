//! Query fusion.
//!
//! Rewrites adjacent pipeline steps into fewer steps:
//! - a scan whose source is itself a pipeline flattens into the outer one
//! - consecutive `where` steps merge into one conjunction
//! - a record `yield` followed by another `yield` inlines its bindings
//! - identity `yield`s (reproducing exactly the current row) drop
//!
//! `map`/`filter` were already lowered to pipelines, so chains of them
//! fuse here with no extra rules.

use rill_common::span::Span;
use rill_typeck::{Label, Type};

use crate::term::{
    row_shape, CoreArm, CoreExpr, CoreKind, CorePat, CorePatKind, CoreQuery, CoreStep, FreshGen,
    Lit, RowShape,
};

use super::inline::{map_children, subst};

/// One fusion pass, bottom-up. Returns the rewritten expression and
/// whether anything changed.
pub fn pass(expr: CoreExpr, fresh: &mut FreshGen) -> (CoreExpr, bool) {
    let mut changed = false;
    let out = walk(expr, fresh, &mut changed);
    (out, changed)
}

fn walk(expr: CoreExpr, fresh: &mut FreshGen, changed: &mut bool) -> CoreExpr {
    let CoreExpr { ty, span, kind } = map_children(expr, &mut |e| walk(e, fresh, changed));
    match kind {
        CoreKind::From(mut query) => {
            while fuse_query(&mut query, fresh) {
                *changed = true;
            }
            CoreExpr {
                ty,
                span,
                kind: CoreKind::From(query),
            }
        }
        kind => CoreExpr { ty, span, kind },
    }
}

/// Apply one fusion rewrite to the pipeline. Returns whether one fired.
fn fuse_query(query: &mut CoreQuery, fresh: &mut FreshGen) -> bool {
    flatten_nested_scan(query)
        || merge_adjacent_wheres(query)
        || inline_yield_into_yield(query, fresh)
        || drop_identity_yield(query)
}

// ── Rule: flatten `from v in (from ...)` ──────────────────────────────

fn flatten_nested_scan(query: &mut CoreQuery) -> bool {
    // Only the leading scan fuses: later scans sit inside the loop nest of
    // earlier binders, where splicing would reorder the nest.
    let Some(CoreStep::Scan {
        pat,
        source: Some(source),
    }) = query.steps.first()
    else {
        return false;
    };
    let CorePatKind::Var(outer_var) = &pat.kind else {
        return false;
    };
    let CoreKind::From(inner) = &source.kind else {
        return false;
    };
    if has_terminal(inner) {
        return false;
    }
    let outer_var = outer_var.clone();
    let mut inner = (**inner).clone();
    if !ensure_explicit_yield(&mut inner) {
        return false;
    }

    // The outer pipeline's implicit final row depends on its binding
    // shape, which splicing changes; make it explicit first. A pipeline
    // already ending in a yield (or anonymous row) is unaffected.
    ensure_explicit_yield(query);

    let Some(CoreStep::Yield(inner_row)) = inner.steps.pop() else {
        unreachable!("ensure_explicit_yield leaves a trailing yield");
    };

    // `from v in (from ... yield e)`: the inner steps become outer steps;
    // unless the names already coincide, a rewrite binding `yield {v = e}`
    // re-establishes the outer variable.
    let coincides = matches!(&inner_row.kind, CoreKind::Var(n) if *n == outer_var);
    let mut spliced = inner.steps;
    if !coincides {
        let row_ty = Type::record(vec![(
            Label::new(outer_var.clone()),
            inner_row.ty.clone(),
        )]);
        spliced.push(CoreStep::Yield(CoreExpr::new(
            row_ty,
            inner_row.span,
            CoreKind::Record(vec![(Label::new(outer_var), inner_row)]),
        )));
    }

    let tail = query.steps.split_off(1);
    spliced.extend(tail);
    query.steps = spliced;
    query.ordered = query.ordered && inner.ordered;
    true
}

fn has_terminal(query: &CoreQuery) -> bool {
    matches!(
        query.steps.last(),
        Some(CoreStep::Compute(_)) | Some(CoreStep::Into(_))
    )
}

/// Append an explicit `yield` reproducing the current row when the
/// pipeline ends with it implicit. Returns false when the row cannot be
/// reconstructed (an anonymous yield followed by filtering steps).
fn ensure_explicit_yield(query: &mut CoreQuery) -> bool {
    if has_terminal(query) {
        return false;
    }
    if matches!(query.steps.last(), Some(CoreStep::Yield(_))) {
        return true;
    }
    match row_shape(&query.steps) {
        RowShape::Anon(_) => false,
        shape => {
            query.steps.push(CoreStep::Yield(row_expr(&shape)));
            true
        }
    }
}

/// The expression reproducing the current row from its bindings.
fn row_expr(shape: &RowShape) -> CoreExpr {
    let span = Span::point(0);
    match shape {
        RowShape::Unit => CoreExpr::new(Type::unit(), span, CoreKind::Lit(Lit::Unit)),
        RowShape::Scalar(name, ty) => {
            CoreExpr::new(ty.clone(), span, CoreKind::Var(name.clone()))
        }
        RowShape::Record(fields) => {
            let ty = shape.row_type();
            CoreExpr::new(
                ty,
                span,
                CoreKind::Record(
                    fields
                        .iter()
                        .map(|(n, t)| {
                            (
                                Label::new(n.clone()),
                                CoreExpr::new(t.clone(), span, CoreKind::Var(n.clone())),
                            )
                        })
                        .collect(),
                ),
            )
        }
        RowShape::Anon(ty) => CoreExpr::new(ty.clone(), span, CoreKind::Lit(Lit::Unit)),
    }
}

// ── Rule: merge consecutive wheres ─────────────────────────────────────

fn merge_adjacent_wheres(query: &mut CoreQuery) -> bool {
    for i in 0..query.steps.len().saturating_sub(1) {
        if matches!(&query.steps[i], CoreStep::Where(_))
            && matches!(&query.steps[i + 1], CoreStep::Where(_))
        {
            let CoreStep::Where(second) = query.steps.remove(i + 1) else {
                unreachable!("checked above");
            };
            let CoreStep::Where(first) = &mut query.steps[i] else {
                unreachable!("checked above");
            };
            let taken = std::mem::replace(first, placeholder());
            *first = conjoin(taken, second);
            return true;
        }
    }
    false
}

/// Build `a andalso b` in its lowered two-armed case form, which the
/// extent solver also recognizes as a conjunction.
fn conjoin(a: CoreExpr, b: CoreExpr) -> CoreExpr {
    let span = a.span;
    CoreExpr::new(
        Type::bool(),
        span,
        CoreKind::Case {
            scrutinee: Box::new(a),
            arms: vec![
                CoreArm {
                    pat: bool_pat(true, span),
                    guard: None,
                    body: b,
                },
                CoreArm {
                    pat: bool_pat(false, span),
                    guard: None,
                    body: CoreExpr::new(Type::bool(), span, CoreKind::Lit(Lit::Bool(false))),
                },
            ],
        },
    )
}

fn bool_pat(b: bool, span: Span) -> CorePat {
    CorePat {
        ty: Type::bool(),
        span,
        kind: CorePatKind::Lit(Lit::Bool(b)),
    }
}

fn placeholder() -> CoreExpr {
    CoreExpr::new(Type::unit(), Span::point(0), CoreKind::Lit(Lit::Unit))
}

// ── Rule: yield-record into yield ──────────────────────────────────────

fn inline_yield_into_yield(query: &mut CoreQuery, fresh: &mut FreshGen) -> bool {
    for i in 0..query.steps.len().saturating_sub(1) {
        let CoreStep::Yield(first) = &query.steps[i] else {
            continue;
        };
        let CoreKind::Record(fields) = &first.kind else {
            continue;
        };
        let Type::Record(type_fields) = &first.ty else {
            continue;
        };
        if Type::as_tuple(type_fields).is_some() {
            continue;
        }
        if !matches!(&query.steps[i + 1], CoreStep::Yield(_)) {
            continue;
        }

        let fields = fields.clone();
        let CoreStep::Yield(second) = query.steps.remove(i + 1) else {
            unreachable!("checked above");
        };

        // Simultaneous substitution: route through fresh temporaries so
        // one field's expression cannot leak into another's.
        let temps: Vec<(String, Label, CoreExpr)> = fields
            .into_iter()
            .map(|(label, e)| (fresh.fresh("y"), label, e))
            .collect();
        let mut rewritten = second;
        for (temp, label, _) in &temps {
            let stand_in = CoreExpr::new(
                placeholder().ty,
                rewritten.span,
                CoreKind::Var(temp.clone()),
            );
            rewritten = subst(rewritten, label.as_str(), &stand_in, fresh);
        }
        for (temp, _, e) in temps {
            rewritten = subst(rewritten, &temp, &e, fresh);
        }
        query.steps[i] = CoreStep::Yield(rewritten);
        return true;
    }
    false
}

// ── Rule: drop identity yields ─────────────────────────────────────────

fn drop_identity_yield(query: &mut CoreQuery) -> bool {
    for i in 0..query.steps.len() {
        let CoreStep::Yield(e) = &query.steps[i] else {
            continue;
        };
        let shape = row_shape(&query.steps[..i]);
        let identity = match (&e.kind, &shape) {
            (CoreKind::Var(n), RowShape::Scalar(name, _)) => n == name,
            (CoreKind::Record(fields), RowShape::Record(names)) => {
                fields.len() == names.len()
                    && fields.iter().zip(names).all(|((label, fe), (name, _))| {
                        label.as_str() == name
                            && matches!(&fe.kind, CoreKind::Var(v) if v == name)
                    })
            }
            _ => false,
        };
        if identity {
            query.steps.remove(i);
            return true;
        }
    }
    false
}
