//! Unification engine for Hindley-Milner type inference.
//!
//! Implements the core unification algorithm using `ena`'s union-find
//! table: occurs check, level-based generalization, scheme instantiation,
//! flex-record rows, and snapshot/rollback for the trial unifications that
//! overload resolution performs.

use ena::unify::InPlaceUnificationTable;
use rill_common::span::Span;
use rustc_hash::FxHashMap;

use crate::error::{ConstraintOrigin, TypeError};
use crate::ty::{Label, Scheme, Type, TyVar};

/// An open record row attached to an unresolved type variable: the fields
/// that have been projected so far, plus the position of the first
/// projection (for the unresolved-flex diagnostic).
#[derive(Clone, Debug)]
pub struct FlexRow {
    pub fields: Vec<(Label, Type)>,
    pub span: Span,
}

impl FlexRow {
    fn get(&self, label: &Label) -> Option<&Type> {
        self.fields
            .iter()
            .find(|(l, _)| l == label)
            .map(|(_, t)| t)
    }
}

/// The inference context: the unification table, level state, flex rows,
/// and accumulated errors.
pub struct InferCtx {
    /// The union-find unification table (ena).
    table: InPlaceUnificationTable<TyVar>,
    /// Current let-nesting level for generalization.
    current_level: u32,
    /// Level at which each type variable was created, indexed by `TyVar.0`.
    var_levels: Vec<u32>,
    /// Open record rows, keyed by the root variable of their class.
    flex_rows: FxHashMap<TyVar, FlexRow>,
    /// Type errors accumulated during inference.
    pub errors: Vec<TypeError>,
    /// Warnings accumulated during inference (match coverage).
    pub warnings: Vec<TypeError>,
}

impl InferCtx {
    /// Create a new, empty inference context.
    pub fn new() -> Self {
        InferCtx {
            table: InPlaceUnificationTable::new(),
            current_level: 0,
            var_levels: Vec::new(),
            flex_rows: FxHashMap::default(),
            errors: Vec::new(),
            warnings: Vec::new(),
        }
    }

    // ── Type variable creation ──────────────────────────────────────────

    /// Create a fresh type variable at the current level.
    pub fn fresh_var(&mut self) -> Type {
        let var = self.table.new_key(None);
        while self.var_levels.len() <= var.0 as usize {
            self.var_levels.push(0);
        }
        self.var_levels[var.0 as usize] = self.current_level;
        Type::Var(var)
    }

    // ── Resolution ──────────────────────────────────────────────────────

    /// Resolve a type by following union-find indirection. Unbound
    /// variables normalize to their root key so that unified-but-unbound
    /// variables compare equal.
    pub fn resolve(&mut self, ty: Type) -> Type {
        match ty {
            Type::Var(v) => match self.table.probe_value(v) {
                Some(inner) => self.resolve(inner),
                None => Type::Var(self.table.find(v)),
            },
            Type::Fn(a, b) => {
                let a = self.resolve(*a);
                let b = self.resolve(*b);
                Type::fun(a, b)
            }
            Type::Record(fields) => Type::Record(
                fields
                    .into_iter()
                    .map(|(l, t)| {
                        let t = self.resolve(t);
                        (l, t)
                    })
                    .collect(),
            ),
            Type::List(t) => {
                let t = self.resolve(*t);
                Type::list(t)
            }
            Type::Bag(t) => {
                let t = self.resolve(*t);
                Type::bag(t)
            }
            Type::Data(id, args) => Type::Data(
                id,
                args.into_iter().map(|a| self.resolve(a)).collect(),
            ),
            other => other,
        }
    }

    // ── Occurs check ────────────────────────────────────────────────────

    /// Check whether a type variable occurs anywhere within a type. This
    /// rejects infinite types like `'a ~ 'a -> int`.
    pub fn occurs_in(&mut self, var: TyVar, ty: &Type) -> bool {
        match ty {
            Type::Var(v) => {
                if self.table.unioned(*v, var) {
                    return true;
                }
                match self.table.probe_value(*v) {
                    Some(inner) => self.occurs_in(var, &inner),
                    None => false,
                }
            }
            Type::Prim(_) => false,
            Type::Fn(a, b) => self.occurs_in(var, a) || self.occurs_in(var, b),
            Type::Record(fields) => fields.iter().any(|(_, t)| self.occurs_in(var, t)),
            Type::List(t) | Type::Bag(t) => self.occurs_in(var, t),
            Type::Data(_, args) => args.iter().any(|a| self.occurs_in(var, a)),
        }
    }

    // ── Flex rows ───────────────────────────────────────────────────────

    /// Record that `label` is projected from the given unresolved variable,
    /// returning the field's type. Creates or extends the flex row.
    pub fn flex_project(&mut self, var: TyVar, label: Label, span: Span) -> Type {
        let root = self.table.find(var);
        if let Some(row) = self.flex_rows.get(&root) {
            if let Some(t) = row.get(&label) {
                return t.clone();
            }
        }
        let field_ty = self.fresh_var();
        let row = self.flex_rows.entry(root).or_insert(FlexRow {
            fields: Vec::new(),
            span,
        });
        row.fields.push((label, field_ty.clone()));
        row.fields.sort_by(|a, b| a.0.cmp(&b.0));
        field_ty
    }

    /// The flex row attached to a variable's class, if any.
    pub fn flex_row_of(&mut self, var: TyVar) -> Option<FlexRow> {
        let root = self.table.find(var);
        self.flex_rows.get(&root).cloned()
    }

    /// Flex rows still attached to unresolved variables. Non-empty after a
    /// declaration means the program never pinned the record down.
    pub fn unresolved_flex_spans(&mut self) -> Vec<Span> {
        let entries: Vec<(TyVar, Span)> = self
            .flex_rows
            .iter()
            .map(|(v, row)| (*v, row.span))
            .collect();
        let mut spans = Vec::new();
        for (v, span) in entries {
            if self.table.probe_value(v).is_none() {
                spans.push(span);
            }
        }
        spans
    }

    // ── Unification ─────────────────────────────────────────────────────

    /// Unify two types, making them equal. On failure an error is recorded
    /// in `self.errors` and also returned.
    pub fn unify(
        &mut self,
        a: Type,
        b: Type,
        origin: ConstraintOrigin,
    ) -> Result<(), TypeError> {
        let a = self.resolve(a);
        let b = self.resolve(b);

        match (a, b) {
            (Type::Var(v1), Type::Var(v2)) if v1 == v2 => Ok(()),

            // Variable meets variable: union them and merge flex rows.
            (Type::Var(v1), Type::Var(v2)) => {
                let row1 = self.flex_rows.remove(&self.table.find(v1));
                let row2 = self.flex_rows.remove(&self.table.find(v2));
                self.table
                    .unify_var_var(v1, v2)
                    .expect("unifying two unbound vars should not fail");
                let root = self.table.find(v1);
                match (row1, row2) {
                    (Some(r1), Some(r2)) => {
                        let mut merged = r1.fields.clone();
                        for (label, t2) in r2.fields {
                            match r1.get(&label) {
                                Some(t1) => {
                                    self.unify(t1.clone(), t2, origin)?;
                                }
                                None => merged.push((label, t2)),
                            }
                        }
                        merged.sort_by(|x, y| x.0.cmp(&y.0));
                        self.flex_rows.insert(
                            root,
                            FlexRow {
                                fields: merged,
                                span: r1.span,
                            },
                        );
                    }
                    (Some(r), None) | (None, Some(r)) => {
                        self.flex_rows.insert(root, r);
                    }
                    (None, None) => {}
                }
                Ok(())
            }

            // Variable meets concrete type: occurs check, flex-row check,
            // then bind.
            (Type::Var(v), ty) | (ty, Type::Var(v)) => {
                if self.occurs_in(v, &ty) {
                    let err = TypeError::InfiniteType { var: v, ty, origin };
                    self.errors.push(err.clone());
                    return Err(err);
                }
                if let Some(row) = self.flex_rows.remove(&self.table.find(v)) {
                    match &ty {
                        Type::Record(fields) => {
                            for (label, field_ty) in &row.fields {
                                match fields.iter().find(|(l, _)| l == label) {
                                    Some((_, t)) => {
                                        self.unify(field_ty.clone(), t.clone(), origin)?;
                                    }
                                    None => {
                                        let err = TypeError::NoSuchField {
                                            ty: ty.clone(),
                                            label: label.as_str().to_string(),
                                            span: row.span,
                                        };
                                        self.errors.push(err.clone());
                                        return Err(err);
                                    }
                                }
                            }
                        }
                        _ => {
                            let err = TypeError::Mismatch {
                                expected: Type::Record(row.fields.clone()),
                                found: ty,
                                origin,
                            };
                            self.errors.push(err.clone());
                            return Err(err);
                        }
                    }
                }
                self.table
                    .unify_var_value(v, Some(ty))
                    .expect("binding a var after occurs check should not fail");
                Ok(())
            }

            (Type::Prim(p1), Type::Prim(p2)) if p1 == p2 => Ok(()),

            (Type::Fn(a1, r1), Type::Fn(a2, r2)) => {
                self.unify(*a1, *a2, origin)?;
                self.unify(*r1, *r2, origin)
            }

            (Type::List(t1), Type::List(t2)) => self.unify(*t1, *t2, origin),
            (Type::Bag(t1), Type::Bag(t2)) => self.unify(*t1, *t2, origin),

            (Type::Record(f1), Type::Record(f2)) => {
                let same_shape = f1.len() == f2.len()
                    && f1.iter().zip(f2.iter()).all(|((l1, _), (l2, _))| l1 == l2);
                if !same_shape {
                    let err = TypeError::Mismatch {
                        expected: Type::Record(f1),
                        found: Type::Record(f2),
                        origin,
                    };
                    self.errors.push(err.clone());
                    return Err(err);
                }
                for ((_, t1), (_, t2)) in f1.into_iter().zip(f2.into_iter()) {
                    self.unify(t1, t2, origin)?;
                }
                Ok(())
            }

            (Type::Data(id1, args1), Type::Data(id2, args2))
                if id1 == id2 && args1.len() == args2.len() =>
            {
                for (x, y) in args1.into_iter().zip(args2.into_iter()) {
                    self.unify(x, y, origin)?;
                }
                Ok(())
            }

            (a, b) => {
                let err = TypeError::Mismatch {
                    expected: a,
                    found: b,
                    origin,
                };
                self.errors.push(err.clone());
                Err(err)
            }
        }
    }

    /// Probe whether two types would unify, keeping none of the effects
    /// either way. Overload resolution uses this to count the instances
    /// that accept an argument before committing to the unique one.
    pub fn probe(&mut self, a: Type, b: Type) -> bool {
        let snapshot = self.table.snapshot();
        let flex_saved = self.flex_rows.clone();
        let errors_len = self.errors.len();
        let ok = self.unify(a, b, ConstraintOrigin::Builtin).is_ok();
        self.table.rollback_to(snapshot);
        self.flex_rows = flex_saved;
        self.errors.truncate(errors_len);
        ok
    }

    /// Unify speculatively: on failure, roll the table back and drop the
    /// recorded error. Used by overload resolution to probe instances.
    pub fn try_unify(&mut self, a: Type, b: Type) -> bool {
        let snapshot = self.table.snapshot();
        let flex_saved = self.flex_rows.clone();
        let errors_len = self.errors.len();
        match self.unify(a, b, ConstraintOrigin::Builtin) {
            Ok(()) => {
                self.table.commit(snapshot);
                true
            }
            Err(_) => {
                self.table.rollback_to(snapshot);
                self.flex_rows = flex_saved;
                self.errors.truncate(errors_len);
                false
            }
        }
    }

    // ── Level management ────────────────────────────────────────────────

    /// Enter a new let-binding level.
    pub fn enter_level(&mut self) {
        self.current_level += 1;
    }

    /// Leave the current let-binding level.
    pub fn leave_level(&mut self) {
        debug_assert!(self.current_level > 0, "cannot leave level 0");
        self.current_level -= 1;
    }

    // ── Generalization ──────────────────────────────────────────────────

    /// Generalize a type into a polymorphic scheme: quantify the variables
    /// created at a deeper level than the current one. Variables carrying an
    /// unresolved flex row stay free so the end-of-declaration check can
    /// report them.
    pub fn generalize(&mut self, ty: Type) -> Scheme {
        let resolved = self.resolve(ty);
        let mut free = Vec::new();
        resolved.collect_vars(&mut free);
        let mut vars = Vec::new();
        for v in free {
            let root = self.table.find(v);
            let level = self.var_levels.get(root.0 as usize).copied().unwrap_or(0);
            if level > self.current_level
                && !self.flex_rows.contains_key(&root)
                && !vars.contains(&root)
            {
                vars.push(root);
            }
        }
        Scheme { vars, ty: resolved }
    }

    // ── Instantiation ───────────────────────────────────────────────────

    /// Instantiate a scheme with fresh type variables.
    pub fn instantiate(&mut self, scheme: &Scheme) -> Type {
        if scheme.vars.is_empty() {
            return scheme.ty.clone();
        }
        let substitution: FxHashMap<TyVar, Type> = scheme
            .vars
            .iter()
            .map(|v| (*v, self.fresh_var()))
            .collect();
        scheme.ty.subst(&substitution)
    }
}

impl Default for InferCtx {
    fn default() -> Self {
        Self::new()
    }
}

// ── Tests ──────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ty::Label;

    fn origin() -> ConstraintOrigin {
        ConstraintOrigin::Builtin
    }

    #[test]
    fn unify_two_fresh_vars() {
        let mut ctx = InferCtx::new();
        let a = ctx.fresh_var();
        let b = ctx.fresh_var();
        assert!(ctx.unify(a.clone(), b.clone(), origin()).is_ok());
        assert!(ctx.unify(a.clone(), Type::int(), origin()).is_ok());
        assert_eq!(ctx.resolve(a), Type::int());
        assert_eq!(ctx.resolve(b), Type::int());
    }

    #[test]
    fn unify_mismatch() {
        let mut ctx = InferCtx::new();
        let result = ctx.unify(Type::int(), Type::string(), origin());
        assert!(matches!(result, Err(TypeError::Mismatch { .. })));
        assert_eq!(ctx.errors.len(), 1);
    }

    #[test]
    fn occurs_check_rejects_infinite_type() {
        let mut ctx = InferCtx::new();
        let a = ctx.fresh_var();
        let fun = Type::fun(a.clone(), Type::int());
        let result = ctx.unify(a, fun, origin());
        assert!(matches!(result, Err(TypeError::InfiniteType { .. })));
    }

    #[test]
    fn generalize_and_instantiate() {
        let mut ctx = InferCtx::new();
        ctx.enter_level();
        let a = ctx.fresh_var();
        let identity = Type::fun(a.clone(), a);
        ctx.leave_level();

        let scheme = ctx.generalize(identity);
        assert_eq!(scheme.vars.len(), 1);

        let inst1 = ctx.instantiate(&scheme);
        let inst2 = ctx.instantiate(&scheme);
        assert_ne!(ctx.resolve(inst1), ctx.resolve(inst2));
    }

    #[test]
    fn vars_at_outer_level_do_not_generalize() {
        let mut ctx = InferCtx::new();
        let a = ctx.fresh_var(); // level 0
        ctx.enter_level();
        let scheme = ctx.generalize(Type::fun(a.clone(), a));
        ctx.leave_level();
        assert!(scheme.vars.is_empty(), "outer-level var must stay free");
    }

    #[test]
    fn flex_row_resolves_against_record() {
        let mut ctx = InferCtx::new();
        let v = ctx.fresh_var();
        let Type::Var(var) = v.clone() else { unreachable!() };
        let field = ctx.flex_project(var, Label::new("a"), Span::new(0, 1));

        let record = Type::record(vec![
            (Label::new("a"), Type::int()),
            (Label::new("b"), Type::string()),
        ]);
        assert!(ctx.unify(v.clone(), record.clone(), origin()).is_ok());
        assert_eq!(ctx.resolve(field), Type::int());
        assert_eq!(ctx.resolve(v), record);
        assert!(ctx.unresolved_flex_spans().is_empty());
    }

    #[test]
    fn flex_row_missing_field_is_error() {
        let mut ctx = InferCtx::new();
        let v = ctx.fresh_var();
        let Type::Var(var) = v.clone() else { unreachable!() };
        ctx.flex_project(var, Label::new("z"), Span::new(0, 1));

        let record = Type::record(vec![(Label::new("a"), Type::int())]);
        let result = ctx.unify(v, record, origin());
        assert!(matches!(result, Err(TypeError::NoSuchField { .. })));
    }

    #[test]
    fn unresolved_flex_is_reported() {
        let mut ctx = InferCtx::new();
        let v = ctx.fresh_var();
        let Type::Var(var) = v else { unreachable!() };
        ctx.flex_project(var, Label::new("a"), Span::new(3, 7));
        let spans = ctx.unresolved_flex_spans();
        assert_eq!(spans, vec![Span::new(3, 7)]);
    }

    #[test]
    fn try_unify_rolls_back_on_failure() {
        let mut ctx = InferCtx::new();
        let a = ctx.fresh_var();
        assert!(!ctx.try_unify(
            Type::fun(a.clone(), Type::int()),
            Type::fun(Type::string(), Type::bool())
        ));
        // The failed trial must not have bound `a` or recorded an error.
        assert!(ctx.errors.is_empty());
        assert!(matches!(ctx.resolve(a.clone()), Type::Var(_)));
        assert!(ctx.try_unify(a.clone(), Type::int()));
        assert_eq!(ctx.resolve(a), Type::int());
    }

    #[test]
    fn record_field_mismatch() {
        let mut ctx = InferCtx::new();
        let r1 = Type::record(vec![(Label::new("a"), Type::int())]);
        let r2 = Type::record(vec![(Label::new("b"), Type::int())]);
        assert!(ctx.unify(r1, r2, origin()).is_err());
    }
}
