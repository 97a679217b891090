//! Extent solver for unconstrained scans.
//!
//! `from v where P` names no source for `v`; before evaluation the
//! normalizer must reify `v`'s extent. Finite types enumerate directly
//! (booleans, unit, nullary-constructor datatypes, options and records
//! over those). Otherwise the predicates following the scan are searched
//! for membership (`v elem e`) and equality (`v = e`, `v.f = e`)
//! constraints; the narrowing predicates stay in place as filters, so
//! intersecting multiple constraints comes for free. A scan that is still
//! unbounded after both attempts is a compile-time diagnostic.

use rill_common::diag::Diagnostic;
use rill_common::span::Span;
use rill_typeck::{DataId, Label, Prim, Type, TypeRegistry};

use crate::term::{CoreExpr, CoreKind, CorePatKind, CoreQuery, CoreStep, Lit};

use super::inline::map_children;

/// Solve every unconstrained scan in the expression, or report the first
/// unbounded one.
pub fn solve(expr: CoreExpr, registry: &TypeRegistry) -> Result<CoreExpr, Diagnostic> {
    let mut failure: Option<Diagnostic> = None;
    let out = walk(expr, registry, &mut failure);
    match failure {
        Some(diag) => Err(diag),
        None => Ok(out),
    }
}

fn walk(
    expr: CoreExpr,
    registry: &TypeRegistry,
    failure: &mut Option<Diagnostic>,
) -> CoreExpr {
    let CoreExpr { ty, span, kind } = map_children(expr, &mut |e| walk(e, registry, failure));
    let kind = match kind {
        CoreKind::From(mut query) => {
            solve_query(&mut query, registry, failure);
            CoreKind::From(query)
        }
        other => other,
    };
    CoreExpr { ty, span, kind }
}

fn solve_query(
    query: &mut CoreQuery,
    registry: &TypeRegistry,
    failure: &mut Option<Diagnostic>,
) {
    for i in 0..query.steps.len() {
        let CoreStep::Scan { pat, source: None } = &query.steps[i] else {
            continue;
        };
        let var = match &pat.kind {
            CorePatKind::Var(v) => v.clone(),
            _ => continue,
        };
        let elem_ty = pat.ty.clone();
        let pat_span = pat.span;

        // Gather the predicates that follow the scan, split into
        // conjuncts.
        let mut conjuncts = Vec::new();
        for later in &query.steps[i + 1..] {
            match later {
                CoreStep::Where(pred) => split_conjuncts(pred, &mut conjuncts),
                // Steps that rebind the row end the predicates' scope.
                CoreStep::Yield(_)
                | CoreStep::Group { .. }
                | CoreStep::Through { .. } => break,
                _ => {}
            }
        }

        let solved = solve_var(&var, &elem_ty, &conjuncts, registry, pat_span);
        match solved {
            Some(source) => {
                if let CoreStep::Scan { source: slot, .. } = &mut query.steps[i] {
                    *slot = Some(source);
                }
            }
            None => {
                if failure.is_none() {
                    *failure = Some(Diagnostic::error(
                        format!("cannot derive a finite extent for {var}"),
                        pat_span,
                    ));
                }
            }
        }
    }
}

/// An extent for one scan variable: a collection expression to scan.
fn solve_var(
    var: &str,
    elem_ty: &Type,
    conjuncts: &[&CoreExpr],
    registry: &TypeRegistry,
    span: Span,
) -> Option<CoreExpr> {
    // Membership: `v elem e` narrows the extent to `e` itself.
    for c in conjuncts {
        if let Some(source) = as_membership(c, var) {
            return Some(source.clone());
        }
    }

    // Equality on the whole variable: `v = e` makes a one-row extent.
    for c in conjuncts {
        if let Some(value) = as_equality(c, var) {
            return Some(singleton(value.clone(), elem_ty, span));
        }
    }

    // Type-driven enumeration, with per-field equality pins for records.
    let values = enumerate(elem_ty, registry, &|label| {
        conjuncts
            .iter()
            .find_map(|c| as_field_equality(c, var, label))
            .cloned()
    })?;
    Some(CoreExpr::new(
        Type::list(elem_ty.clone()),
        span,
        CoreKind::MkList(values),
    ))
}

fn singleton(value: CoreExpr, elem_ty: &Type, span: Span) -> CoreExpr {
    CoreExpr::new(
        Type::list(elem_ty.clone()),
        span,
        CoreKind::MkList(vec![value]),
    )
}

/// Split the lowered form of `a andalso b` (a two-armed boolean case)
/// into conjuncts.
fn split_conjuncts<'e>(pred: &'e CoreExpr, out: &mut Vec<&'e CoreExpr>) {
    if let CoreKind::Case { scrutinee, arms } = &pred.kind {
        if arms.len() == 2 {
            let true_first = matches!(arms[0].pat.kind, CorePatKind::Lit(Lit::Bool(true)));
            let false_body =
                matches!(arms[1].body.kind, CoreKind::Lit(Lit::Bool(false)));
            if true_first && false_body && arms[0].guard.is_none() {
                split_conjuncts(scrutinee, out);
                split_conjuncts(&arms[0].body, out);
                return;
            }
        }
    }
    out.push(pred);
}

/// `v elem e` (either overload instance), with `e` not mentioning `v`.
fn as_membership<'e>(pred: &'e CoreExpr, var: &str) -> Option<&'e CoreExpr> {
    let CoreKind::Apply { func, arg } = &pred.kind else {
        return None;
    };
    let name = match &func.kind {
        CoreKind::Var(n) | CoreKind::VarInst(n, _) => n.as_str(),
        _ => return None,
    };
    if name != "elem" {
        return None;
    }
    let CoreKind::Record(fields) = &arg.kind else {
        return None;
    };
    let [(_, lhs), (_, rhs)] = fields.as_slice() else {
        return None;
    };
    if matches!(&lhs.kind, CoreKind::Var(v) if v == var) && !rhs.free_vars().contains(var) {
        Some(rhs)
    } else {
        None
    }
}

/// `v = e` or `e = v`, with `e` not mentioning `v`.
fn as_equality<'e>(pred: &'e CoreExpr, var: &str) -> Option<&'e CoreExpr> {
    let (lhs, rhs) = as_eq_operands(pred)?;
    if matches!(&lhs.kind, CoreKind::Var(v) if v == var) && !rhs.free_vars().contains(var) {
        return Some(rhs);
    }
    if matches!(&rhs.kind, CoreKind::Var(v) if v == var) && !lhs.free_vars().contains(var) {
        return Some(lhs);
    }
    None
}

/// `v.f = e` or `e = v.f`, pinning one projection of the variable.
fn as_field_equality<'e>(pred: &'e CoreExpr, var: &str, label: &Label) -> Option<&'e CoreExpr> {
    let (lhs, rhs) = as_eq_operands(pred)?;
    let is_projection = |e: &CoreExpr| {
        matches!(&e.kind, CoreKind::Select(base, l)
            if l == label && matches!(&base.kind, CoreKind::Var(v) if v == var))
    };
    if is_projection(lhs) && !rhs.free_vars().contains(var) {
        return Some(rhs);
    }
    if is_projection(rhs) && !lhs.free_vars().contains(var) {
        return Some(lhs);
    }
    None
}

fn as_eq_operands(pred: &CoreExpr) -> Option<(&CoreExpr, &CoreExpr)> {
    let CoreKind::Apply { func, arg } = &pred.kind else {
        return None;
    };
    match &func.kind {
        CoreKind::Var(n) | CoreKind::VarInst(n, _) if n == "=" => {}
        _ => return None,
    }
    let CoreKind::Record(fields) = &arg.kind else {
        return None;
    };
    match fields.as_slice() {
        [(_, lhs), (_, rhs)] => Some((lhs, rhs)),
        _ => None,
    }
}

/// Enumerate the inhabitants of a finite type as literal expressions.
/// `pin` supplies an expression for a record field that a predicate has
/// already fixed, collapsing that dimension of the product.
fn enumerate(
    ty: &Type,
    registry: &TypeRegistry,
    pin: &dyn Fn(&Label) -> Option<CoreExpr>,
) -> Option<Vec<CoreExpr>> {
    let span = Span::point(0);
    match ty {
        Type::Prim(Prim::Bool) => Some(vec![
            CoreExpr::new(ty.clone(), span, CoreKind::Lit(Lit::Bool(false))),
            CoreExpr::new(ty.clone(), span, CoreKind::Lit(Lit::Bool(true))),
        ]),
        Type::Prim(Prim::Unit) => Some(vec![CoreExpr::new(
            ty.clone(),
            span,
            CoreKind::Lit(Lit::Unit),
        )]),
        Type::Data(id, args) => enumerate_datatype(*id, args, ty, registry),
        Type::Record(fields) => {
            // Cartesian product over the fields, using pinned expressions
            // where predicates fixed a projection.
            let mut columns: Vec<(Label, Vec<CoreExpr>)> = Vec::new();
            for (label, field_ty) in fields {
                let choices = match pin(label) {
                    Some(e) => vec![e],
                    None => enumerate(field_ty, registry, &|_| None)?,
                };
                columns.push((label.clone(), choices));
            }
            let mut rows: Vec<Vec<(Label, CoreExpr)>> = vec![Vec::new()];
            for (label, choices) in columns {
                let mut next = Vec::new();
                for row in &rows {
                    for choice in &choices {
                        let mut extended = row.clone();
                        extended.push((label.clone(), choice.clone()));
                        next.push(extended);
                    }
                }
                rows = next;
            }
            Some(
                rows.into_iter()
                    .map(|fields| CoreExpr::new(ty.clone(), span, CoreKind::Record(fields)))
                    .collect(),
            )
        }
        _ => None,
    }
}

fn enumerate_datatype(
    id: DataId,
    args: &[Type],
    ty: &Type,
    registry: &TypeRegistry,
) -> Option<Vec<CoreExpr>> {
    let span = Span::point(0);
    let def = registry.get(id).clone();

    // All-nullary datatypes enumerate to their constructors.
    if registry.is_enumerable(id) {
        return Some(
            def.ctors
                .iter()
                .map(|c| {
                    CoreExpr::new(
                        ty.clone(),
                        span,
                        CoreKind::Ctor {
                            name: c.name.clone(),
                            data: id,
                            arg: None,
                        },
                    )
                })
                .collect(),
        );
    }

    // `t option` for finite `t`: NONE plus SOME of each inhabitant.
    if id == registry.option_id() {
        let inner = args.first()?;
        let inner_values = enumerate(inner, registry, &|_| None)?;
        let mut values = vec![CoreExpr::new(
            ty.clone(),
            span,
            CoreKind::Ctor {
                name: "NONE".to_string(),
                data: id,
                arg: None,
            },
        )];
        for v in inner_values {
            values.push(CoreExpr::new(
                ty.clone(),
                span,
                CoreKind::Ctor {
                    name: "SOME".to_string(),
                    data: id,
                    arg: Some(Box::new(v)),
                },
            ));
        }
        return Some(values);
    }

    None
}
