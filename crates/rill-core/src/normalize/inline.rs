//! Inlining and dead-binding elimination.
//!
//! Each `let v = e in b` is classified by `v`'s usage in `b`:
//! DEAD (dropped when `e` cannot raise), ATOMIC (substituted
//! unconditionally), ONCE_SAFE (one use, not under a lambda or inside a
//! conditionally evaluated branch), MULTI_SAFE (several uses of a cheap
//! total expression), or MULTI_UNSAFE (kept). Substitution alpha-renames
//! binders that would capture, drawing fresh names from the compile
//! unit's shared counter. Letrec groups lose bindings nothing references.

use rustc_hash::FxHashSet;

use crate::term::{
    CoreArm, CoreExpr, CoreKind, CorePat, CorePatKind, CoreQuery, CoreStep, FreshGen,
};

/// Size bound for MULTI_SAFE substitution.
const MULTI_SAFE_MAX_SIZE: usize = 8;

/// One inlining pass, bottom-up. Returns the rewritten expression and
/// whether anything changed.
pub fn pass(expr: CoreExpr, fresh: &mut FreshGen) -> (CoreExpr, bool) {
    let mut changed = false;
    let out = walk(expr, fresh, &mut changed);
    (out, changed)
}

fn walk(expr: CoreExpr, fresh: &mut FreshGen, changed: &mut bool) -> CoreExpr {
    let CoreExpr { ty, span, kind } = map_children(expr, &mut |e| walk(e, fresh, changed));
    match kind {
        CoreKind::Let { name, rhs, body } => {
            let usage = usage_of(&body, &name);
            let rhs_pure = is_pure(&rhs);

            // DEAD: no use. The binding can only go if evaluating the
            // right-hand side cannot raise.
            if usage.count == 0 && rhs_pure {
                *changed = true;
                return *body;
            }

            let rep_free = rhs.free_vars();
            let substitutable = !captures_query_labels(&body, &rep_free);

            let should_substitute = substitutable
                && (is_atomic(&rhs)
                    || (usage.count == 1 && !usage.guarded && rhs_pure)
                    || (usage.count > 1 && rhs_pure && size(&rhs) <= MULTI_SAFE_MAX_SIZE));

            if should_substitute {
                *changed = true;
                return subst(*body, &name, &rhs, fresh);
            }

            CoreExpr {
                ty,
                span,
                kind: CoreKind::Let { name, rhs, body },
            }
        }
        CoreKind::Letrec { binds, body } => {
            // Drop bindings that neither the body nor a surviving binding
            // references.
            let mut needed: FxHashSet<String> = body
                .free_vars()
                .into_iter()
                .filter(|n| binds.iter().any(|(b, _)| b == n))
                .collect();
            loop {
                let mut grew = false;
                for (name, rhs) in &binds {
                    if needed.contains(name) {
                        for f in rhs.free_vars() {
                            if binds.iter().any(|(b, _)| *b == f) && needed.insert(f) {
                                grew = true;
                            }
                        }
                    }
                }
                if !grew {
                    break;
                }
            }
            if needed.len() < binds.len() {
                *changed = true;
            }
            let kept: Vec<(String, CoreExpr)> = binds
                .into_iter()
                .filter(|(name, _)| needed.contains(name))
                .collect();
            if kept.is_empty() {
                return *body;
            }
            CoreExpr {
                ty,
                span,
                kind: CoreKind::Letrec { binds: kept, body },
            }
        }
        kind => CoreExpr { ty, span, kind },
    }
}

// ── Classification helpers ─────────────────────────────────────────────

/// ATOMIC right-hand sides: substituting them can never duplicate work.
fn is_atomic(e: &CoreExpr) -> bool {
    matches!(
        e.kind,
        CoreKind::Lit(_)
            | CoreKind::Var(_)
            | CoreKind::VarInst(_, _)
            | CoreKind::Ctor { arg: None, .. }
            | CoreKind::Exn { arg: None, .. }
    )
}

/// Total, effect-free expressions: safe to drop or duplicate.
fn is_pure(e: &CoreExpr) -> bool {
    match &e.kind {
        CoreKind::Lit(_) | CoreKind::Var(_) | CoreKind::VarInst(_, _) | CoreKind::Fn { .. } => {
            true
        }
        CoreKind::Record(fields) => fields.iter().all(|(_, f)| is_pure(f)),
        CoreKind::Select(base, _) => is_pure(base),
        CoreKind::Ctor { arg, .. } | CoreKind::Exn { arg, .. } => {
            arg.as_ref().map(|a| is_pure(a)).unwrap_or(true)
        }
        CoreKind::MkList(items) => items.iter().all(is_pure),
        // Applications can raise or diverge; cases can raise Match; the
        // rest touch control flow or the backend.
        _ => false,
    }
}

fn size(e: &CoreExpr) -> usize {
    let mut n = 1;
    visit_children(e, &mut |c| n += size(c));
    n
}

struct Usage {
    count: usize,
    /// Some use sits under a lambda or inside a branch that might not be
    /// taken (or might be taken many times).
    guarded: bool,
}

fn usage_of(body: &CoreExpr, name: &str) -> Usage {
    let mut usage = Usage {
        count: 0,
        guarded: false,
    };
    count_uses(body, name, false, &mut usage);
    usage
}

fn count_uses(e: &CoreExpr, name: &str, guarded: bool, usage: &mut Usage) {
    match &e.kind {
        CoreKind::Var(n) | CoreKind::VarInst(n, _) => {
            if n == name {
                usage.count += 1;
                usage.guarded |= guarded;
            }
        }
        CoreKind::Fn { param, body } => {
            if param != name {
                count_uses(body, name, true, usage);
            }
        }
        CoreKind::Let {
            name: bound,
            rhs,
            body,
        } => {
            count_uses(rhs, name, guarded, usage);
            if bound != name {
                count_uses(body, name, guarded, usage);
            }
        }
        CoreKind::Letrec { binds, body } => {
            if binds.iter().any(|(b, _)| b == name) {
                return;
            }
            for (_, rhs) in binds {
                count_uses(rhs, name, true, usage);
            }
            count_uses(body, name, guarded, usage);
        }
        CoreKind::Case { scrutinee, arms } | CoreKind::CompiledCase { scrutinee, arms, .. } => {
            count_uses(scrutinee, name, guarded, usage);
            for arm in arms {
                if arm.pat.bound_vars().iter().any(|v| v == name) {
                    continue;
                }
                if let Some(g) = &arm.guard {
                    count_uses(g, name, true, usage);
                }
                count_uses(&arm.body, name, true, usage);
            }
        }
        CoreKind::Handle { body, arms } => {
            count_uses(body, name, guarded, usage);
            for arm in arms {
                if arm.pat.bound_vars().iter().any(|v| v == name) {
                    continue;
                }
                if let Some(g) = &arm.guard {
                    count_uses(g, name, true, usage);
                }
                count_uses(&arm.body, name, true, usage);
            }
        }
        CoreKind::From(query) => {
            // Steps run once per row; treat every use as guarded.
            let mut shadowed = false;
            for step in &query.steps {
                if shadowed {
                    break;
                }
                step_exprs(step, &mut |e| count_uses(e, name, true, usage));
                shadowed |= step_binds_name(step, name);
            }
        }
        _ => visit_children(e, &mut |c| count_uses(c, name, guarded, usage)),
    }
}

// ── Substitution ───────────────────────────────────────────────────────

/// Capture-avoiding substitution of `rep` for free occurrences of `name`.
pub fn subst(e: CoreExpr, name: &str, rep: &CoreExpr, fresh: &mut FreshGen) -> CoreExpr {
    let rep_free = rep.free_vars();
    subst_inner(e, name, rep, &rep_free, fresh)
}

fn subst_inner(
    e: CoreExpr,
    name: &str,
    rep: &CoreExpr,
    rep_free: &FxHashSet<String>,
    fresh: &mut FreshGen,
) -> CoreExpr {
    if let CoreKind::Var(n) = &e.kind {
        if n == name {
            return rep.clone();
        }
    }
    let ty = e.ty.clone();
    let span = e.span;
    match e.kind {
        kind @ (CoreKind::Var(_) | CoreKind::VarInst(_, _) | CoreKind::Lit(_)) => {
            CoreExpr { ty, span, kind }
        }

        CoreKind::Fn { param, body } => {
            if param == name {
                return CoreExpr {
                    ty,
                    span,
                    kind: CoreKind::Fn { param, body },
                };
            }
            let (param, body) = if rep_free.contains(&param) {
                let renamed = fresh.fresh(&param);
                let body = rename_var(*body, &param, &renamed);
                (renamed, Box::new(body))
            } else {
                (param, body)
            };
            CoreExpr {
                ty,
                span,
                kind: CoreKind::Fn {
                    param,
                    body: Box::new(subst_inner(*body, name, rep, rep_free, fresh)),
                },
            }
        }

        CoreKind::Let {
            name: bound,
            rhs,
            body,
        } => {
            let rhs = Box::new(subst_inner(*rhs, name, rep, rep_free, fresh));
            if bound == name {
                return CoreExpr {
                    ty,
                    span,
                    kind: CoreKind::Let { name: bound, rhs, body },
                };
            }
            let (bound, body) = if rep_free.contains(&bound) {
                let renamed = fresh.fresh(&bound);
                let body = rename_var(*body, &bound, &renamed);
                (renamed, Box::new(body))
            } else {
                (bound, body)
            };
            CoreExpr {
                ty,
                span,
                kind: CoreKind::Let {
                    name: bound,
                    rhs,
                    body: Box::new(subst_inner(*body, name, rep, rep_free, fresh)),
                },
            }
        }

        CoreKind::Letrec { binds, body } => {
            if binds.iter().any(|(b, _)| b == name) {
                return CoreExpr {
                    ty,
                    span,
                    kind: CoreKind::Letrec { binds, body },
                };
            }
            let mut binds = binds;
            let mut body = body;
            for i in 0..binds.len() {
                if rep_free.contains(&binds[i].0) {
                    let old = binds[i].0.clone();
                    let renamed = fresh.fresh(&old);
                    for (_, rhs) in binds.iter_mut() {
                        let taken = std::mem::replace(rhs, placeholder());
                        *rhs = rename_var(taken, &old, &renamed);
                    }
                    let taken = std::mem::replace(&mut *body, placeholder());
                    *body = rename_var(taken, &old, &renamed);
                    binds[i].0 = renamed;
                }
            }
            let binds = binds
                .into_iter()
                .map(|(n, rhs)| (n, subst_inner(rhs, name, rep, rep_free, fresh)))
                .collect();
            CoreExpr {
                ty,
                span,
                kind: CoreKind::Letrec {
                    binds,
                    body: Box::new(subst_inner(*body, name, rep, rep_free, fresh)),
                },
            }
        }

        CoreKind::Case { scrutinee, arms } => {
            let scrutinee = Box::new(subst_inner(*scrutinee, name, rep, rep_free, fresh));
            let arms = arms
                .into_iter()
                .map(|arm| subst_arm(arm, name, rep, rep_free, fresh))
                .collect();
            CoreExpr {
                ty,
                span,
                kind: CoreKind::Case { scrutinee, arms },
            }
        }

        CoreKind::CompiledCase {
            scrutinee,
            tree,
            arms,
        } => {
            let scrutinee = Box::new(subst_inner(*scrutinee, name, rep, rep_free, fresh));
            let arms = arms
                .into_iter()
                .map(|arm| subst_arm(arm, name, rep, rep_free, fresh))
                .collect();
            CoreExpr {
                ty,
                span,
                kind: CoreKind::CompiledCase {
                    scrutinee,
                    tree,
                    arms,
                },
            }
        }

        CoreKind::Handle { body, arms } => {
            let body = Box::new(subst_inner(*body, name, rep, rep_free, fresh));
            let arms = arms
                .into_iter()
                .map(|arm| subst_arm(arm, name, rep, rep_free, fresh))
                .collect();
            CoreExpr {
                ty,
                span,
                kind: CoreKind::Handle { body, arms },
            }
        }

        CoreKind::From(query) => {
            let query = subst_query(*query, name, rep, rep_free, fresh);
            CoreExpr {
                ty,
                span,
                kind: CoreKind::From(Box::new(query)),
            }
        }

        kind => {
            let e = CoreExpr { ty, span, kind };
            map_children(e, &mut |c| subst_inner(c, name, rep, rep_free, fresh))
        }
    }
}

fn subst_arm(
    mut arm: CoreArm,
    name: &str,
    rep: &CoreExpr,
    rep_free: &FxHashSet<String>,
    fresh: &mut FreshGen,
) -> CoreArm {
    if arm.pat.bound_vars().iter().any(|v| v == name) {
        return arm;
    }
    for var in arm.pat.bound_vars() {
        if rep_free.contains(&var) {
            let renamed = fresh.fresh(&var);
            rename_in_pat(&mut arm.pat, &var, &renamed);
            if let Some(g) = arm.guard.take() {
                arm.guard = Some(rename_var(g, &var, &renamed));
            }
            let body = std::mem::replace(&mut arm.body, placeholder());
            arm.body = rename_var(body, &var, &renamed);
        }
    }
    CoreArm {
        pat: arm.pat,
        guard: arm
            .guard
            .map(|g| subst_inner(g, name, rep, rep_free, fresh)),
        body: subst_inner(arm.body, name, rep, rep_free, fresh),
    }
}

fn subst_query(
    mut query: CoreQuery,
    name: &str,
    rep: &CoreExpr,
    rep_free: &FxHashSet<String>,
    fresh: &mut FreshGen,
) -> CoreQuery {
    // Steps are scoped left to right: a binder shadows `name` for the
    // remaining steps, and a binder colliding with the replacement's free
    // variables is renamed in its pattern and in every later step until
    // something rebinds it.
    let mut shadowed = false;
    let mut pending: Vec<(String, String)> = Vec::new();
    let steps = std::mem::take(&mut query.steps);
    let mut out = Vec::with_capacity(steps.len());

    for mut step in steps {
        // Renames from earlier binders apply to this step's expressions.
        for (old, new) in &pending {
            step_exprs_mut(&mut step, &mut |e| {
                let taken = std::mem::replace(e, placeholder());
                *e = rename_var(taken, old, new);
            });
        }
        // A step rebinding a renamed variable ends that rename's scope.
        pending.retain(|(old, _)| !step_binds_name(&step, old));

        if !shadowed {
            step_exprs_mut(&mut step, &mut |e| {
                let taken = std::mem::replace(e, placeholder());
                *e = subst_inner(taken, name, rep, rep_free, fresh);
            });
            shadowed |= step_binds_name(&step, name);

            // Rename this step's binders that would capture replacement
            // variables in later steps.
            if let CoreStep::Scan { pat, .. } | CoreStep::Through { pat, .. } = &mut step {
                for var in pat.bound_vars() {
                    if var != name && rep_free.contains(&var) {
                        let renamed = fresh.fresh(&var);
                        rename_in_pat(pat, &var, &renamed);
                        pending.push((var, renamed));
                    }
                }
            }
        }
        out.push(step);
    }
    query.steps = out;
    query
}

/// Rename every free occurrence of a variable. The new name is fresh, so
/// renaming cannot capture.
fn rename_var(e: CoreExpr, old: &str, new: &str) -> CoreExpr {
    let rep = CoreExpr {
        ty: e.ty.clone(),
        span: e.span,
        kind: CoreKind::Var(new.to_string()),
    };
    // A fresh target never collides, so a throwaway generator suffices.
    let mut gen = FreshGen::new();
    subst_var_only(e, old, &rep, &mut gen)
}

fn subst_var_only(e: CoreExpr, old: &str, rep: &CoreExpr, fresh: &mut FreshGen) -> CoreExpr {
    let rep_free = rep.free_vars();
    subst_inner(e, old, rep, &rep_free, fresh)
}

fn rename_in_pat(pat: &mut CorePat, old: &str, new: &str) {
    match &mut pat.kind {
        CorePatKind::Var(n) => {
            if n == old {
                *n = new.to_string();
            }
        }
        CorePatKind::As(n, inner) => {
            if n == old {
                *n = new.to_string();
            }
            rename_in_pat(inner, old, new);
        }
        CorePatKind::Ctor { arg, .. } | CorePatKind::ExnCtor { arg, .. } => {
            if let Some(p) = arg {
                rename_in_pat(p, old, new);
            }
        }
        CorePatKind::Record(fields) => {
            for (_, p) in fields {
                rename_in_pat(p, old, new);
            }
        }
        CorePatKind::Cons(h, t) => {
            rename_in_pat(h, old, new);
            rename_in_pat(t, old, new);
        }
        CorePatKind::Wild | CorePatKind::Lit(_) | CorePatKind::EmptyList => {}
    }
}

fn placeholder() -> CoreExpr {
    CoreExpr {
        ty: rill_typeck::Type::unit(),
        span: rill_common::span::Span::new(0, 0),
        kind: CoreKind::Lit(crate::term::Lit::Unit),
    }
}

// ── Query-label capture check ──────────────────────────────────────────

/// Group keys, aggregate labels, and record-yield fields introduce binding
/// names that cannot be alpha-renamed (they are data labels). If the
/// replacement's free variables collide with any of them, substitution
/// into the body is unsafe and the binding is kept instead.
fn captures_query_labels(body: &CoreExpr, rep_free: &FxHashSet<String>) -> bool {
    if rep_free.is_empty() {
        return false;
    }
    let mut captured = false;
    find_query_labels(body, &mut |label| {
        if rep_free.contains(label) {
            captured = true;
        }
    });
    captured
}

fn find_query_labels(e: &CoreExpr, f: &mut dyn FnMut(&str)) {
    if let CoreKind::From(query) = &e.kind {
        for step in &query.steps {
            match step {
                CoreStep::Group { keys, aggs } => {
                    for (l, _) in keys {
                        f(l.as_str());
                    }
                    for a in aggs {
                        f(a.label.as_str());
                    }
                }
                CoreStep::Yield(y) => {
                    if let rill_typeck::Type::Record(fields) = &y.ty {
                        if rill_typeck::Type::as_tuple(fields).is_none() {
                            for (l, _) in fields {
                                f(l.as_str());
                            }
                        }
                    }
                }
                _ => {}
            }
        }
    }
    visit_children(e, &mut |c| find_query_labels(c, f));
}

// ── Structural traversal ───────────────────────────────────────────────

/// Apply `f` to every direct child expression.
pub fn map_children(e: CoreExpr, f: &mut dyn FnMut(CoreExpr) -> CoreExpr) -> CoreExpr {
    let CoreExpr { ty, span, kind } = e;
    let kind = match kind {
        CoreKind::Record(fields) => CoreKind::Record(
            fields.into_iter().map(|(l, e)| (l, f(e))).collect(),
        ),
        CoreKind::Select(base, label) => CoreKind::Select(Box::new(f(*base)), label),
        CoreKind::Ctor { name, data, arg } => CoreKind::Ctor {
            name,
            data,
            arg: arg.map(|a| Box::new(f(*a))),
        },
        CoreKind::Exn { name, arg } => CoreKind::Exn {
            name,
            arg: arg.map(|a| Box::new(f(*a))),
        },
        CoreKind::MkList(items) => CoreKind::MkList(items.into_iter().map(f).collect()),
        CoreKind::Fn { param, body } => CoreKind::Fn {
            param,
            body: Box::new(f(*body)),
        },
        CoreKind::Apply { func, arg } => CoreKind::Apply {
            func: Box::new(f(*func)),
            arg: Box::new(f(*arg)),
        },
        CoreKind::Let { name, rhs, body } => CoreKind::Let {
            name,
            rhs: Box::new(f(*rhs)),
            body: Box::new(f(*body)),
        },
        CoreKind::Letrec { binds, body } => CoreKind::Letrec {
            binds: binds.into_iter().map(|(n, e)| (n, f(e))).collect(),
            body: Box::new(f(*body)),
        },
        CoreKind::Case { scrutinee, arms } => CoreKind::Case {
            scrutinee: Box::new(f(*scrutinee)),
            arms: arms.into_iter().map(|a| map_arm(a, f)).collect(),
        },
        CoreKind::CompiledCase {
            scrutinee,
            tree,
            arms,
        } => CoreKind::CompiledCase {
            scrutinee: Box::new(f(*scrutinee)),
            tree,
            arms: arms.into_iter().map(|a| map_arm(a, f)).collect(),
        },
        CoreKind::From(mut query) => {
            for step in &mut query.steps {
                step_exprs_mut(step, &mut |e| {
                    let taken = std::mem::replace(e, placeholder());
                    *e = f(taken);
                });
            }
            CoreKind::From(query)
        }
        CoreKind::Raise(e) => CoreKind::Raise(Box::new(f(*e))),
        CoreKind::Handle { body, arms } => CoreKind::Handle {
            body: Box::new(f(*body)),
            arms: arms.into_iter().map(|a| map_arm(a, f)).collect(),
        },
        other @ (CoreKind::Lit(_)
        | CoreKind::Var(_)
        | CoreKind::VarInst(_, _)
        | CoreKind::Backend(_)) => other,
    };
    CoreExpr { ty, span, kind }
}

fn map_arm(arm: CoreArm, f: &mut dyn FnMut(CoreExpr) -> CoreExpr) -> CoreArm {
    CoreArm {
        pat: arm.pat,
        guard: arm.guard.map(|g| f(g)),
        body: f(arm.body),
    }
}

/// Visit every direct child expression.
pub fn visit_children(e: &CoreExpr, f: &mut dyn FnMut(&CoreExpr)) {
    match &e.kind {
        CoreKind::Record(fields) => fields.iter().for_each(|(_, e)| f(e)),
        CoreKind::Select(base, _) => f(base),
        CoreKind::Ctor { arg, .. } | CoreKind::Exn { arg, .. } => {
            if let Some(a) = arg {
                f(a);
            }
        }
        CoreKind::MkList(items) => items.iter().for_each(&mut *f),
        CoreKind::Fn { body, .. } => f(body),
        CoreKind::Apply { func, arg } => {
            f(func);
            f(arg);
        }
        CoreKind::Let { rhs, body, .. } => {
            f(rhs);
            f(body);
        }
        CoreKind::Letrec { binds, body } => {
            binds.iter().for_each(|(_, e)| f(e));
            f(body);
        }
        CoreKind::Case { scrutinee, arms } | CoreKind::CompiledCase { scrutinee, arms, .. } => {
            f(scrutinee);
            for arm in arms {
                if let Some(g) = &arm.guard {
                    f(g);
                }
                f(&arm.body);
            }
        }
        CoreKind::From(query) => {
            for step in &query.steps {
                step_exprs(step, &mut |e| f(e));
            }
        }
        CoreKind::Raise(e) => f(e),
        CoreKind::Handle { body, arms } => {
            f(body);
            for arm in arms {
                if let Some(g) = &arm.guard {
                    f(g);
                }
                f(&arm.body);
            }
        }
        CoreKind::Lit(_) | CoreKind::Var(_) | CoreKind::VarInst(_, _) | CoreKind::Backend(_) => {}
    }
}

/// Visit every expression embedded in a step.
pub fn step_exprs(step: &CoreStep, f: &mut dyn FnMut(&CoreExpr)) {
    match step {
        CoreStep::Scan { source, .. } => {
            if let Some(s) = source {
                f(s);
            }
        }
        CoreStep::Where(e)
        | CoreStep::Yield(e)
        | CoreStep::Take(e)
        | CoreStep::Skip(e)
        | CoreStep::Into(e) => f(e),
        CoreStep::Group { keys, aggs } => {
            keys.iter().for_each(|(_, e)| f(e));
            for a in aggs {
                f(&a.func);
                if let Some(arg) = &a.arg {
                    f(arg);
                }
            }
        }
        CoreStep::Order { keys } => keys.iter().for_each(|(e, _)| f(e)),
        CoreStep::Union { sources, .. }
        | CoreStep::Intersect { sources, .. }
        | CoreStep::Except { sources, .. } => sources.iter().for_each(&mut *f),
        CoreStep::Through { func, .. } => f(func),
        CoreStep::Compute(aggs) => {
            for a in aggs {
                f(&a.func);
                if let Some(arg) = &a.arg {
                    f(arg);
                }
            }
        }
        CoreStep::Distinct | CoreStep::Unorder => {}
    }
}

/// Mutate every expression embedded in a step.
pub fn step_exprs_mut(step: &mut CoreStep, f: &mut dyn FnMut(&mut CoreExpr)) {
    match step {
        CoreStep::Scan { source, .. } => {
            if let Some(s) = source {
                f(s);
            }
        }
        CoreStep::Where(e)
        | CoreStep::Yield(e)
        | CoreStep::Take(e)
        | CoreStep::Skip(e)
        | CoreStep::Into(e) => f(e),
        CoreStep::Group { keys, aggs } => {
            keys.iter_mut().for_each(|(_, e)| f(e));
            for a in aggs {
                f(&mut a.func);
                if let Some(arg) = &mut a.arg {
                    f(arg);
                }
            }
        }
        CoreStep::Order { keys } => keys.iter_mut().for_each(|(e, _)| f(e)),
        CoreStep::Union { sources, .. }
        | CoreStep::Intersect { sources, .. }
        | CoreStep::Except { sources, .. } => sources.iter_mut().for_each(&mut *f),
        CoreStep::Through { func, .. } => f(func),
        CoreStep::Compute(aggs) => {
            for a in aggs {
                f(&mut a.func);
                if let Some(arg) = &mut a.arg {
                    f(arg);
                }
            }
        }
        CoreStep::Distinct | CoreStep::Unorder => {}
    }
}

/// Whether a step introduces a binding with the given name (shadowing it
/// for the remaining steps).
fn step_binds_name(step: &CoreStep, name: &str) -> bool {
    match step {
        CoreStep::Scan { pat, .. } | CoreStep::Through { pat, .. } => {
            pat.bound_vars().iter().any(|v| v == name)
        }
        CoreStep::Group { keys, aggs } => {
            keys.iter().any(|(l, _)| l.as_str() == name)
                || aggs.iter().any(|a| a.label.as_str() == name)
        }
        CoreStep::Yield(e) => match &e.ty {
            rill_typeck::Type::Record(fields)
                if rill_typeck::Type::as_tuple(fields).is_none() =>
            {
                fields.iter().any(|(l, _)| l.as_str() == name)
            }
            _ => false,
        },
        _ => false,
    }
}
