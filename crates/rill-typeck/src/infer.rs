//! Algorithm-J inference engine for Rill.
//!
//! Walks the surface AST, generates constraints, and solves them through
//! the union-find table in [`InferCtx`]. Implements Hindley-Milner
//! inference with:
//! - let-polymorphism (level-based generalize + instantiate)
//! - the value restriction on `val`/`fun` right-hand sides
//! - flex records (open rows from `#f e` / `e.f` projections)
//! - bounded ad-hoc overloading (`over` groups, unique-instance selection)
//! - user datatypes through the interning registry
//! - relational pipeline typing (`from` / `exists` / `forall`)
//! - match coverage analysis (usefulness + exhaustiveness)

use rill_common::span::Span;
use rill_parser::ast::{
    Agg, Arm, BinOp, Decl, DeclKind, Expr, ExprKind, FunBind, NodeId, Pat, PatKind, Query,
    Scan, ScanKind, StepKind, TyExpr, TyExprKind,
};
use rustc_hash::FxHashMap;

use crate::builtins;
use crate::env::{Binding, TypeEnv};
use crate::error::{ConstraintOrigin, TypeError};
use crate::exhaustiveness::{self, ACtor, APat, CtorSig, PatSpace, Signature};
use crate::ty::{CtorDef, DataId, Label, Prim, Scheme, Type, TypeRegistry, TyVar};
use crate::unify::InferCtx;

/// Options consumed by the inferencer.
#[derive(Clone, Debug)]
pub struct TypeckOptions {
    /// Whether match coverage (redundancy + exhaustiveness) runs.
    pub match_coverage_enabled: bool,
}

impl Default for TypeckOptions {
    fn default() -> Self {
        TypeckOptions {
            match_coverage_enabled: true,
        }
    }
}

/// The result of checking one top-level declaration.
pub struct TypeckResult {
    /// Fully resolved type of every expression and pattern node.
    pub types: FxHashMap<NodeId, Type>,
    /// Chosen overload instance per call-site node.
    pub overload_choices: FxHashMap<NodeId, usize>,
    /// New value bindings, in declaration order, with self-contained
    /// schemes (as stored into the environment).
    pub bound_values: Vec<(String, Scheme)>,
    pub errors: Vec<TypeError>,
    pub warnings: Vec<TypeError>,
}

impl TypeckResult {
    pub fn ok(&self) -> bool {
        self.errors.is_empty()
    }
}

/// Create a fresh global environment with the builtins installed.
pub fn initial_env() -> (TypeEnv, TypeRegistry) {
    let mut env = TypeEnv::new();
    builtins::install(&mut env);
    (env, TypeRegistry::new())
}

/// Type-check one top-level declaration against the accumulated session
/// environment, updating it in place.
pub fn check_decl(
    decl: &Decl,
    env: &mut TypeEnv,
    registry: &mut TypeRegistry,
    opts: &TypeckOptions,
) -> TypeckResult {
    let mut inferencer = Inferencer {
        ctx: InferCtx::new(),
        env,
        registry,
        opts,
        types: FxHashMap::default(),
        overload_choices: FxHashMap::default(),
        decl_tyvars: FxHashMap::default(),
        bound: Vec::new(),
    };
    inferencer.infer_decl(decl, true);
    inferencer.finish(decl.span)
}

struct Inferencer<'e> {
    ctx: InferCtx,
    env: &'e mut TypeEnv,
    registry: &'e mut TypeRegistry,
    opts: &'e TypeckOptions,
    types: FxHashMap<NodeId, Type>,
    overload_choices: FxHashMap<NodeId, usize>,
    /// `'a`-style annotation variables, scoped to the declaration.
    decl_tyvars: FxHashMap<String, Type>,
    /// Value bindings introduced at the top level, in order.
    bound: Vec<(String, Scheme)>,
}

impl Inferencer<'_> {
    // ── Finalization ───────────────────────────────────────────────────

    fn finish(mut self, decl_span: Span) -> TypeckResult {
        // Flex records must be pinned down by the end of the declaration.
        for span in self.ctx.unresolved_flex_spans() {
            self.ctx.errors.push(TypeError::UnresolvedFlexRecord { span });
        }

        // Resolve the node-type table.
        let types = self
            .types
            .into_iter()
            .map(|(id, ty)| (id, self.ctx.resolve(ty)))
            .collect();

        // Normalize top-level bindings to self-contained schemes, checking
        // that nothing escaped generalization.
        let mut bound_values = Vec::new();
        for (name, scheme) in std::mem::take(&mut self.bound) {
            let resolved = self.ctx.resolve(scheme.ty.clone());
            let mut free = Vec::new();
            resolved.collect_vars(&mut free);
            let quantified: Vec<TyVar> = scheme.vars.clone();
            if free.iter().any(|v| !quantified.contains(v)) {
                self.ctx.errors.push(TypeError::UnresolvedTopLevel {
                    name: name.clone(),
                    span: decl_span,
                });
            }
            let normalized = Scheme::normalize_from_ty(resolved);
            self.env
                .insert(name.clone(), Binding::Val(normalized.clone()));
            bound_values.push((name, normalized));
        }

        TypeckResult {
            types,
            overload_choices: self.overload_choices,
            bound_values,
            errors: self.ctx.errors,
            warnings: self.ctx.warnings,
        }
    }

    fn record(&mut self, id: NodeId, ty: Type) -> Type {
        self.types.insert(id, ty.clone());
        ty
    }

    fn error(&mut self, err: TypeError) -> Type {
        self.ctx.errors.push(err);
        self.ctx.fresh_var()
    }

    fn unify(&mut self, a: Type, b: Type, origin: ConstraintOrigin) {
        let _ = self.ctx.unify(a, b, origin);
    }

    // ── Declarations ───────────────────────────────────────────────────

    fn infer_decl(&mut self, decl: &Decl, top: bool) {
        match &decl.kind {
            DeclKind::Val { rec, inst, binds } => {
                if *inst {
                    self.infer_val_inst(binds);
                } else if *rec {
                    self.infer_val_rec(binds, top);
                } else {
                    self.infer_val(binds, top);
                }
            }
            DeclKind::Fun(binds) => self.infer_fun(binds, decl.span, top),
            DeclKind::Datatype(binds) => self.infer_datatype(binds),
            DeclKind::TypeAlias { params, name, ty } => {
                self.infer_type_alias(params, name, ty)
            }
            DeclKind::Over(name) => {
                self.env
                    .insert(name.clone(), Binding::Overload(Vec::new()));
            }
            DeclKind::Exception { name, arg } => {
                let arg_ty = arg.as_ref().map(|t| {
                    let mut scope = FxHashMap::default();
                    let ty = self.resolve_tyexpr(t, &mut scope);
                    self.close_template(ty, &scope, &[], t.span)
                });
                self.env.insert(name.clone(), Binding::Exn(arg_ty));
            }
            DeclKind::Signature { name, specs } => {
                let mut entries = Vec::new();
                for spec in specs {
                    let mut scope = FxHashMap::default();
                    let ty = self.resolve_tyexpr(&spec.ty, &mut scope);
                    let resolved = self.ctx.resolve(ty);
                    entries.push((spec.name.clone(), Scheme::normalize_from_ty(resolved)));
                }
                self.env.insert(name.clone(), Binding::Signature(entries));
            }
            DeclKind::Expr(e) => {
                self.ctx.enter_level();
                let ty = self.infer_expr(e);
                self.ctx.leave_level();
                let scheme = if is_syntactic_value(e) {
                    self.ctx.generalize(ty)
                } else {
                    Scheme::mono(self.ctx.resolve(ty))
                };
                self.bind_value("it".to_string(), scheme, top);
            }
        }
    }

    /// Insert a value binding; top-level bindings are also queued for
    /// normalization in `finish`.
    fn bind_value(&mut self, name: String, scheme: Scheme, top: bool) {
        self.env
            .insert(name.clone(), Binding::Val(scheme.clone()));
        if top {
            self.bound.push((name, scheme));
        }
    }

    /// `val p = e [and q = f]`: all right-hand sides are inferred in the
    /// outer scope first, so later `and` arms see the outer bindings.
    fn infer_val(&mut self, binds: &[rill_parser::ast::ValBind], top: bool) {
        self.ctx.enter_level();
        let rhs_tys: Vec<Type> = binds.iter().map(|b| self.infer_expr(&b.expr)).collect();
        self.ctx.leave_level();

        for (bind, rhs_ty) in binds.iter().zip(rhs_tys) {
            let before: Vec<String> = bind.pat.bound_vars();
            self.infer_pat(&bind.pat, rhs_ty);
            let generalizable = is_syntactic_value(&bind.expr);
            for name in before {
                let ty = match self.env.lookup(&name) {
                    Some(Binding::Val(s)) => s.ty.clone(),
                    _ => continue,
                };
                let scheme = if generalizable {
                    self.ctx.generalize(ty)
                } else {
                    Scheme::mono(ty)
                };
                self.bind_value(name, scheme, top);
            }
        }
    }

    /// `val rec f = fn ...`: names are in scope in their own right-hand
    /// sides. Patterns must be plain variables.
    fn infer_val_rec(&mut self, binds: &[rill_parser::ast::ValBind], top: bool) {
        self.ctx.enter_level();
        let mut names = Vec::new();
        for bind in binds {
            match &bind.pat.kind {
                PatKind::Ident(name) => {
                    let v = self.ctx.fresh_var();
                    self.record(bind.pat.id, v.clone());
                    self.env
                        .insert(name.clone(), Binding::Val(Scheme::mono(v.clone())));
                    names.push((name.clone(), v));
                }
                _ => {
                    self.ctx
                        .errors
                        .push(TypeError::InvalidRecPattern { span: bind.pat.span });
                    names.push((String::new(), self.ctx.fresh_var()));
                }
            }
        }
        for (bind, (_, v)) in binds.iter().zip(&names) {
            let rhs = self.infer_expr(&bind.expr);
            self.unify(v.clone(), rhs, ConstraintOrigin::Expr(bind.span));
        }
        self.ctx.leave_level();
        for (name, v) in names {
            if name.is_empty() {
                continue;
            }
            let scheme = self.ctx.generalize(v);
            self.bind_value(name, scheme, top);
        }
    }

    /// `val inst x = e`: add an instance to the overload group `x`.
    /// Instances are never generalized.
    fn infer_val_inst(&mut self, binds: &[rill_parser::ast::ValBind]) {
        for bind in binds {
            let name = match &bind.pat.kind {
                PatKind::Ident(name) => name.clone(),
                _ => {
                    self.ctx
                        .errors
                        .push(TypeError::InvalidRecPattern { span: bind.pat.span });
                    continue;
                }
            };
            let rhs = self.infer_expr(&bind.expr);
            let resolved = self.ctx.resolve(rhs.clone());
            self.record(bind.pat.id, rhs);
            let mut free = Vec::new();
            resolved.collect_vars(&mut free);
            if !free.is_empty() {
                self.ctx.errors.push(TypeError::UnresolvedTopLevel {
                    name: name.clone(),
                    span: bind.span,
                });
            }
            if !self
                .env
                .add_overload_instance(&name, Scheme::mono(resolved))
            {
                self.ctx.errors.push(TypeError::NotAnOverload {
                    name,
                    span: bind.pat.span,
                });
            }
        }
    }

    /// `fun` groups: mutually recursive; each bind's clauses collapse to a
    /// single curried function type.
    fn infer_fun(&mut self, binds: &[FunBind], decl_span: Span, top: bool) {
        self.ctx.enter_level();
        let fn_vars: Vec<Type> = binds
            .iter()
            .map(|bind| {
                let v = self.ctx.fresh_var();
                self.env
                    .insert(bind.name.clone(), Binding::Val(Scheme::mono(v.clone())));
                v
            })
            .collect();

        for (bind, fn_var) in binds.iter().zip(&fn_vars) {
            let arity = bind.clauses[0].pats.len();
            // One argument variable per position, shared across clauses.
            let arg_vars: Vec<Type> = (0..arity).map(|_| self.ctx.fresh_var()).collect();
            let result_var = self.ctx.fresh_var();

            for clause in &bind.clauses {
                self.env.push_scope();
                if clause.pats.len() == arity {
                    for (pat, arg) in clause.pats.iter().zip(&arg_vars) {
                        self.infer_pat(pat, arg.clone());
                    }
                } else {
                    for pat in &clause.pats {
                        let v = self.ctx.fresh_var();
                        self.infer_pat(pat, v);
                    }
                    let expected = self.fn_shape(&arg_vars, result_var.clone());
                    let found = self.clause_shape(clause, &result_var);
                    self.unify(expected, found, ConstraintOrigin::Expr(clause.span));
                }
                let body_ty = self.infer_expr(&clause.body);
                if let Some(ret) = &clause.ret_ty {
                    let annotated = self.resolve_decl_tyexpr(ret);
                    self.unify(
                        body_ty.clone(),
                        annotated,
                        ConstraintOrigin::Annotation(ret.span),
                    );
                }
                self.unify(
                    body_ty,
                    result_var.clone(),
                    ConstraintOrigin::Branches(clause.span),
                );
                self.env.pop_scope();
            }

            let fn_ty = self.fn_shape(&arg_vars, result_var);
            self.unify(fn_var.clone(), fn_ty, ConstraintOrigin::Expr(bind.span));

            // Coverage over the clause matrix (one column per curried arg).
            self.check_fun_coverage(bind, &arg_vars, decl_span);
        }
        self.ctx.leave_level();

        for (bind, v) in binds.iter().zip(fn_vars) {
            let scheme = self.ctx.generalize(v);
            self.bind_value(bind.name.clone(), scheme, top);
        }
    }

    fn fn_shape(&self, args: &[Type], result: Type) -> Type {
        args.iter()
            .rev()
            .fold(result, |acc, a| Type::fun(a.clone(), acc))
    }

    fn clause_shape(&mut self, clause: &rill_parser::ast::FunClause, result: &Type) -> Type {
        let tys: Vec<Type> = clause
            .pats
            .iter()
            .map(|p| self.types.get(&p.id).cloned().unwrap_or(Type::unit()))
            .collect();
        self.fn_shape(&tys, result.clone())
    }

    fn infer_datatype(&mut self, binds: &[rill_parser::ast::DatatypeBind]) {
        // First pass: reserve ids so mutually recursive references resolve.
        let ids: Vec<DataId> = binds
            .iter()
            .map(|b| self.registry.declare(&b.name, b.params.len()))
            .collect();

        for (bind, id) in binds.iter().zip(&ids) {
            let mut scope: FxHashMap<String, Type> = FxHashMap::default();
            for (i, p) in bind.params.iter().enumerate() {
                scope.insert(p.clone(), Type::Var(TyVar(i as u32)));
            }
            let ctors: Vec<CtorDef> = bind
                .ctors
                .iter()
                .map(|c| {
                    let arg = c.arg.as_ref().map(|t| {
                        let ty = self.resolve_tyexpr(t, &mut scope);
                        self.close_template(ty, &scope, &bind.params, t.span)
                    });
                    CtorDef {
                        name: c.name.clone(),
                        arg,
                    }
                })
                .collect();
            for c in &ctors {
                self.env.insert(c.name.clone(), Binding::Ctor(*id));
            }
            self.registry.define(*id, ctors);
        }
    }

    fn infer_type_alias(&mut self, params: &[String], name: &str, ty: &TyExpr) {
        let mut scope: FxHashMap<String, Type> = FxHashMap::default();
        let vars: Vec<TyVar> = params
            .iter()
            .enumerate()
            .map(|(i, p)| {
                scope.insert(p.clone(), Type::Var(TyVar(i as u32)));
                TyVar(i as u32)
            })
            .collect();
        let resolved = self.resolve_tyexpr(ty, &mut scope);
        let resolved = self.close_template(resolved, &scope, params, ty.span);
        self.env.insert(
            name.to_string(),
            Binding::TyAlias {
                params: vars,
                ty: resolved,
            },
        );
    }

    /// Stored type templates (datatype constructors, aliases, exception
    /// payloads) refer to their parameters as small variable indexes and
    /// must not capture this declaration's inference variables. Any type
    /// variable that is not a declared parameter is reported and replaced
    /// with unit so the template stays self-contained across declarations.
    fn close_template(
        &mut self,
        ty: Type,
        scope: &FxHashMap<String, Type>,
        params: &[String],
        span: Span,
    ) -> Type {
        let mut map: FxHashMap<TyVar, Type> = FxHashMap::default();
        for (name, t) in scope {
            if params.iter().any(|p| p == name) {
                continue;
            }
            if let Type::Var(v) = t {
                if map.insert(*v, Type::unit()).is_none() {
                    self.ctx.errors.push(TypeError::UnboundTyCon {
                        name: format!("'{name}"),
                        span,
                    });
                }
            }
        }
        if map.is_empty() {
            ty
        } else {
            ty.subst(&map)
        }
    }

    // ── Type expressions ───────────────────────────────────────────────

    /// Resolve a type expression against a declaration's `'a` scope.
    fn resolve_decl_tyexpr(&mut self, ty: &TyExpr) -> Type {
        let mut scope = std::mem::take(&mut self.decl_tyvars);
        let out = self.resolve_tyexpr(ty, &mut scope);
        self.decl_tyvars = scope;
        out
    }

    fn resolve_tyexpr(
        &mut self,
        ty: &TyExpr,
        scope: &mut FxHashMap<String, Type>,
    ) -> Type {
        match &ty.kind {
            TyExprKind::Var(name) => match scope.get(name) {
                Some(t) => t.clone(),
                None => {
                    let v = self.ctx.fresh_var();
                    scope.insert(name.clone(), v.clone());
                    v
                }
            },
            TyExprKind::Unit => Type::unit(),
            TyExprKind::Fn(a, b) => {
                let a = self.resolve_tyexpr(a, scope);
                let b = self.resolve_tyexpr(b, scope);
                Type::fun(a, b)
            }
            TyExprKind::Tuple(items) => {
                let items = items
                    .iter()
                    .map(|t| self.resolve_tyexpr(t, scope))
                    .collect();
                Type::tuple(items)
            }
            TyExprKind::Record(fields) => {
                let fields = fields
                    .iter()
                    .map(|(l, t)| (Label::new(l.clone()), self.resolve_tyexpr(t, scope)))
                    .collect();
                Type::record(fields)
            }
            TyExprKind::Con(name, args) => {
                let arg_tys: Vec<Type> = args
                    .iter()
                    .map(|t| self.resolve_tyexpr(t, scope))
                    .collect();
                self.resolve_tycon(name, arg_tys, ty.span)
            }
        }
    }

    fn resolve_tycon(&mut self, name: &str, args: Vec<Type>, span: Span) -> Type {
        let prim = match name {
            "int" => Some(Prim::Int),
            "real" => Some(Prim::Real),
            "bool" => Some(Prim::Bool),
            "char" => Some(Prim::Char),
            "string" => Some(Prim::Str),
            "unit" => Some(Prim::Unit),
            "exn" => Some(Prim::Exn),
            _ => None,
        };
        if let Some(p) = prim {
            if !args.is_empty() {
                return self.error(TypeError::TyConArity {
                    name: name.to_string(),
                    expected: 0,
                    found: args.len(),
                    span,
                });
            }
            return Type::Prim(p);
        }
        match name {
            "list" | "bag" => {
                if args.len() != 1 {
                    return self.error(TypeError::TyConArity {
                        name: name.to_string(),
                        expected: 1,
                        found: args.len(),
                        span,
                    });
                }
                let elem = args.into_iter().next().expect("one argument");
                if name == "list" {
                    Type::list(elem)
                } else {
                    Type::bag(elem)
                }
            }
            _ => {
                if let Some(Binding::TyAlias { params, ty }) =
                    self.env.lookup(name).cloned()
                {
                    if params.len() != args.len() {
                        return self.error(TypeError::TyConArity {
                            name: name.to_string(),
                            expected: params.len(),
                            found: args.len(),
                            span,
                        });
                    }
                    let map: FxHashMap<TyVar, Type> =
                        params.into_iter().zip(args).collect();
                    return ty.subst(&map);
                }
                match self.registry.lookup(name) {
                    Some(id) => {
                        let arity = self.registry.get(id).arity;
                        if arity != args.len() {
                            return self.error(TypeError::TyConArity {
                                name: name.to_string(),
                                expected: arity,
                                found: args.len(),
                                span,
                            });
                        }
                        Type::Data(id, args)
                    }
                    None => self.error(TypeError::UnboundTyCon {
                        name: name.to_string(),
                        span,
                    }),
                }
            }
        }
    }

    // ── Expressions ────────────────────────────────────────────────────

    fn infer_expr(&mut self, expr: &Expr) -> Type {
        let ty = self.infer_expr_kind(expr);
        self.record(expr.id, ty)
    }

    fn infer_expr_kind(&mut self, expr: &Expr) -> Type {
        let span = expr.span;
        match &expr.kind {
            ExprKind::Int(_) => Type::int(),
            ExprKind::Real(_) => Type::real(),
            ExprKind::Str(_) => Type::string(),
            ExprKind::Char(_) => Type::char(),
            ExprKind::Bool(_) => Type::bool(),
            ExprKind::Unit => Type::unit(),

            ExprKind::Ident(name) => self.infer_ident(name, span),

            ExprKind::Tuple(items) => {
                let tys = items.iter().map(|e| self.infer_expr(e)).collect();
                Type::tuple(tys)
            }

            ExprKind::List(items) => {
                let elem = self.ctx.fresh_var();
                for item in items {
                    let t = self.infer_expr(item);
                    self.unify(t, elem.clone(), ConstraintOrigin::Expr(item.span));
                }
                Type::list(elem)
            }

            ExprKind::Record(fields) => {
                let mut seen: Vec<&str> = Vec::new();
                let mut tys = Vec::new();
                for f in fields {
                    if seen.contains(&f.label.as_str()) {
                        self.ctx.errors.push(TypeError::DuplicateField {
                            label: f.label.clone(),
                            span: f.span,
                        });
                    }
                    seen.push(&f.label);
                    let t = self.infer_expr(&f.expr);
                    tys.push((Label::new(f.label.clone()), t));
                }
                Type::record(tys)
            }

            ExprKind::Select(e, label) => {
                let te = self.infer_expr(e);
                self.project_field(te, label, span)
            }

            ExprKind::Selector(label) => {
                let v = self.ctx.fresh_var();
                let field = self.project_field(v.clone(), label, span);
                Type::fun(v, field)
            }

            ExprKind::If(cond, then_branch, else_branch) => {
                let tc = self.infer_expr(cond);
                self.unify(tc, Type::bool(), ConstraintOrigin::Condition(cond.span));
                let tt = self.infer_expr(then_branch);
                let te = self.infer_expr(else_branch);
                self.unify(
                    tt.clone(),
                    te,
                    ConstraintOrigin::Branches(else_branch.span),
                );
                tt
            }

            ExprKind::Case(scrutinee, arms) => {
                let ts = self.infer_expr(scrutinee);
                let result = self.ctx.fresh_var();
                self.infer_arms(arms, ts.clone(), result.clone());
                self.check_match(arms, ts, span);
                result
            }

            ExprKind::Fn(arms) => {
                let arg = self.ctx.fresh_var();
                let result = self.ctx.fresh_var();
                self.infer_arms(arms, arg.clone(), result.clone());
                self.check_match(arms, arg.clone(), span);
                Type::fun(arg, result)
            }

            ExprKind::Handle(body, arms) => {
                let tb = self.infer_expr(body);
                self.infer_arms(arms, Type::exn(), tb.clone());
                tb
            }

            ExprKind::Raise(e) => {
                let te = self.infer_expr(e);
                self.unify(te, Type::exn(), ConstraintOrigin::Expr(e.span));
                self.ctx.fresh_var()
            }

            ExprKind::Let(decls, body) => {
                self.env.push_scope();
                for d in decls {
                    self.infer_decl(d, false);
                }
                let t = self.infer_expr(body);
                self.env.pop_scope();
                t
            }

            ExprKind::App(f, arg) => {
                // Overloaded callee: pick the unique matching instance.
                if let ExprKind::Ident(name) = &f.kind {
                    if let Some(Binding::Overload(instances)) =
                        self.env.lookup(name).cloned()
                    {
                        let ta = self.infer_expr(arg);
                        return self.resolve_overload(name, &instances, ta, f.id, span);
                    }
                }
                let tf = self.infer_expr(f);
                let ta = self.infer_expr(arg);
                let ret = self.ctx.fresh_var();
                self.unify(
                    tf,
                    Type::fun(ta, ret.clone()),
                    ConstraintOrigin::Apply(span),
                );
                ret
            }

            ExprKind::Binop(op, lhs, rhs) => self.infer_binop(*op, lhs, rhs, expr.id, span),

            ExprKind::Negate(e) => {
                let te = self.infer_expr(e);
                match self.env.lookup("~").cloned() {
                    Some(Binding::Overload(instances)) => {
                        self.resolve_overload("~", &instances, te, expr.id, span)
                    }
                    _ => {
                        self.unify(te.clone(), Type::int(), ConstraintOrigin::Expr(span));
                        te
                    }
                }
            }

            ExprKind::Annot(e, ty) => {
                let te = self.infer_expr(e);
                let annotated = self.resolve_decl_tyexpr(ty);
                self.unify(
                    te,
                    annotated.clone(),
                    ConstraintOrigin::Annotation(ty.span),
                );
                annotated
            }

            ExprKind::From(q) => self.infer_query(q, Quantifier::From),
            ExprKind::Exists(q) => self.infer_query(q, Quantifier::Exists),
            ExprKind::Forall(q) => self.infer_query(q, Quantifier::Forall),
        }
    }

    fn infer_ident(&mut self, name: &str, span: Span) -> Type {
        match self.env.lookup(name).cloned() {
            Some(Binding::Val(scheme)) => self.ctx.instantiate(&scheme),
            Some(Binding::Ctor(id)) => self.ctor_type(name, id),
            Some(Binding::Exn(arg)) => match arg {
                None => Type::exn(),
                Some(t) => Type::fun(t, Type::exn()),
            },
            Some(Binding::Overload(_)) => self.error(TypeError::AmbiguousOverload {
                name: name.to_string(),
                span,
            }),
            Some(Binding::TyAlias { .. }) | Some(Binding::Signature(_)) | None => {
                self.error(TypeError::UnboundVariable {
                    name: name.to_string(),
                    span,
                })
            }
        }
    }

    /// The type of a constructor used as an expression: a value for nilary
    /// constructors, a function otherwise.
    fn ctor_type(&mut self, name: &str, id: DataId) -> Type {
        let def = self.registry.get(id).clone();
        let args: Vec<Type> = (0..def.arity).map(|_| self.ctx.fresh_var()).collect();
        let data_ty = Type::Data(id, args.clone());
        let ctor = def
            .ctors
            .iter()
            .find(|c| c.name == name)
            .expect("constructor binding always names a registered ctor");
        match &ctor.arg {
            None => data_ty,
            Some(arg) => {
                let map: FxHashMap<TyVar, Type> = (0..def.arity)
                    .map(|i| (TyVar(i as u32), args[i].clone()))
                    .collect();
                Type::fun(arg.subst(&map), data_ty)
            }
        }
    }

    fn infer_binop(
        &mut self,
        op: BinOp,
        lhs: &Expr,
        rhs: &Expr,
        node: NodeId,
        span: Span,
    ) -> Type {
        match op {
            BinOp::Andalso | BinOp::Orelse | BinOp::Implies => {
                let tl = self.infer_expr(lhs);
                self.unify(tl, Type::bool(), ConstraintOrigin::Condition(lhs.span));
                let tr = self.infer_expr(rhs);
                self.unify(tr, Type::bool(), ConstraintOrigin::Condition(rhs.span));
                Type::bool()
            }
            _ => {
                let tl = self.infer_expr(lhs);
                let tr = self.infer_expr(rhs);
                let arg = Type::tuple(vec![tl, tr]);
                match self.env.lookup(op.name()).cloned() {
                    Some(Binding::Overload(instances)) => {
                        self.resolve_overload(op.name(), &instances, arg, node, span)
                    }
                    Some(Binding::Val(scheme)) => {
                        let tf = self.ctx.instantiate(&scheme);
                        let ret = self.ctx.fresh_var();
                        self.unify(
                            tf,
                            Type::fun(arg, ret.clone()),
                            ConstraintOrigin::Apply(span),
                        );
                        ret
                    }
                    _ => self.error(TypeError::UnboundVariable {
                        name: op.name().to_string(),
                        span,
                    }),
                }
            }
        }
    }

    /// Select the unique overload instance whose argument type accepts
    /// `arg_ty`. Exactly one match commits; zero or several are errors.
    fn resolve_overload(
        &mut self,
        name: &str,
        instances: &[Scheme],
        arg_ty: Type,
        choice_node: NodeId,
        span: Span,
    ) -> Type {
        let mut matching = Vec::new();
        for (i, inst) in instances.iter().enumerate() {
            let inst_ty = self.ctx.instantiate(inst);
            if let Type::Fn(param, _) = &inst_ty {
                if self.probe_unify((**param).clone(), arg_ty.clone()) {
                    matching.push(i);
                }
            }
        }
        match matching.as_slice() {
            [index] => {
                let inst_ty = self.ctx.instantiate(&instances[*index]);
                let ret = self.ctx.fresh_var();
                self.unify(
                    inst_ty.clone(),
                    Type::fun(arg_ty, ret.clone()),
                    ConstraintOrigin::Apply(span),
                );
                self.overload_choices.insert(choice_node, *index);
                self.types.insert(choice_node, inst_ty);
                ret
            }
            [] => {
                let found = self.ctx.resolve(arg_ty);
                self.error(TypeError::NoOverloadInstance {
                    name: name.to_string(),
                    found,
                    span,
                })
            }
            _ => self.error(TypeError::AmbiguousOverload {
                name: name.to_string(),
                span,
            }),
        }
    }

    /// Probe a unification without keeping any of its effects.
    fn probe_unify(&mut self, a: Type, b: Type) -> bool {
        self.ctx.probe(a, b)
    }

    fn project_field(&mut self, te: Type, label: &str, span: Span) -> Type {
        let resolved = self.ctx.resolve(te);
        match resolved {
            Type::Record(fields) => {
                match fields.iter().find(|(l, _)| l.as_str() == label) {
                    Some((_, t)) => t.clone(),
                    None => self.error(TypeError::NoSuchField {
                        ty: Type::Record(fields),
                        label: label.to_string(),
                        span,
                    }),
                }
            }
            Type::Var(v) => self.ctx.flex_project(v, Label::new(label), span),
            other => self.error(TypeError::NoSuchField {
                ty: other,
                label: label.to_string(),
                span,
            }),
        }
    }

    fn infer_arms(&mut self, arms: &[Arm], scrutinee: Type, result: Type) {
        for arm in arms {
            self.env.push_scope();
            self.infer_pat(&arm.pat, scrutinee.clone());
            let tb = self.infer_expr(&arm.body);
            self.unify(tb, result.clone(), ConstraintOrigin::Branches(arm.body.span));
            self.env.pop_scope();
        }
    }

    // ── Patterns ───────────────────────────────────────────────────────

    fn infer_pat(&mut self, pat: &Pat, expected: Type) {
        self.types.insert(pat.id, expected.clone());
        let span = pat.span;
        match &pat.kind {
            PatKind::Wildcard => {}
            PatKind::Int(_) => {
                self.unify(expected, Type::int(), ConstraintOrigin::Pattern(span))
            }
            PatKind::Str(_) => {
                self.unify(expected, Type::string(), ConstraintOrigin::Pattern(span))
            }
            PatKind::Char(_) => {
                self.unify(expected, Type::char(), ConstraintOrigin::Pattern(span))
            }
            PatKind::Bool(_) => {
                self.unify(expected, Type::bool(), ConstraintOrigin::Pattern(span))
            }
            PatKind::Unit => {
                self.unify(expected, Type::unit(), ConstraintOrigin::Pattern(span))
            }
            PatKind::Ident(name) => match self.env.lookup(name).cloned() {
                Some(Binding::Ctor(id))
                    if self
                        .registry
                        .lookup_ctor(name)
                        .map(|(cid, idx)| {
                            cid == id && self.registry.get(cid).ctors[idx].arg.is_none()
                        })
                        .unwrap_or(false) =>
                {
                    let ty = self.ctor_type(name, id);
                    self.unify(expected, ty, ConstraintOrigin::Pattern(span));
                }
                Some(Binding::Ctor(_)) => {
                    self.ctx.errors.push(TypeError::CtorArity {
                        name: name.clone(),
                        takes_arg: true,
                        span,
                    });
                }
                Some(Binding::Exn(None)) => {
                    self.unify(expected, Type::exn(), ConstraintOrigin::Pattern(span));
                }
                _ => {
                    self.env
                        .insert(name.clone(), Binding::Val(Scheme::mono(expected)));
                }
            },
            PatKind::Ctor(name, arg) => match self.env.lookup(name).cloned() {
                Some(Binding::Ctor(id)) => {
                    let def = self.registry.get(id).clone();
                    let args: Vec<Type> =
                        (0..def.arity).map(|_| self.ctx.fresh_var()).collect();
                    self.unify(
                        expected,
                        Type::Data(id, args.clone()),
                        ConstraintOrigin::Pattern(span),
                    );
                    let ctor = def.ctors.iter().find(|c| c.name == *name);
                    match ctor.and_then(|c| c.arg.clone()) {
                        Some(arg_ty) => {
                            let map: FxHashMap<TyVar, Type> = (0..def.arity)
                                .map(|i| (TyVar(i as u32), args[i].clone()))
                                .collect();
                            self.infer_pat(arg, arg_ty.subst(&map));
                        }
                        None => {
                            self.ctx.errors.push(TypeError::CtorArity {
                                name: name.clone(),
                                takes_arg: false,
                                span,
                            });
                        }
                    }
                }
                Some(Binding::Exn(payload)) => {
                    self.unify(expected, Type::exn(), ConstraintOrigin::Pattern(span));
                    match payload {
                        Some(t) => self.infer_pat(arg, t),
                        None => {
                            self.ctx.errors.push(TypeError::CtorArity {
                                name: name.clone(),
                                takes_arg: false,
                                span,
                            });
                        }
                    }
                }
                _ => {
                    self.ctx.errors.push(TypeError::UnboundVariable {
                        name: name.clone(),
                        span,
                    });
                }
            },
            PatKind::Tuple(items) => {
                let item_tys: Vec<Type> =
                    (0..items.len()).map(|_| self.ctx.fresh_var()).collect();
                self.unify(
                    expected,
                    Type::tuple(item_tys.clone()),
                    ConstraintOrigin::Pattern(span),
                );
                for (p, t) in items.iter().zip(item_tys) {
                    self.infer_pat(p, t);
                }
            }
            PatKind::Record { fields, flex } => {
                if *flex {
                    let v = self.ctx.fresh_var();
                    self.unify(expected, v.clone(), ConstraintOrigin::Pattern(span));
                    if let Type::Var(var) = self.ctx.resolve(v.clone()) {
                        for f in fields {
                            let field_ty =
                                self.ctx.flex_project(var, Label::new(&f.label), f.span);
                            self.infer_pat(&f.pat, field_ty);
                        }
                    } else {
                        // Already resolved to a record: check fields exist.
                        for f in fields {
                            let field_ty =
                                self.project_field(v.clone(), &f.label, f.span);
                            self.infer_pat(&f.pat, field_ty);
                        }
                    }
                } else {
                    let field_tys: Vec<(Label, Type)> = fields
                        .iter()
                        .map(|f| (Label::new(&f.label), self.ctx.fresh_var()))
                        .collect();
                    self.unify(
                        expected,
                        Type::record(field_tys.clone()),
                        ConstraintOrigin::Pattern(span),
                    );
                    for f in fields {
                        let t = field_tys
                            .iter()
                            .find(|(l, _)| l.as_str() == f.label)
                            .map(|(_, t)| t.clone())
                            .expect("field type exists by construction");
                        self.infer_pat(&f.pat, t);
                    }
                }
            }
            PatKind::As(name, inner) => {
                self.env.insert(
                    name.clone(),
                    Binding::Val(Scheme::mono(expected.clone())),
                );
                self.infer_pat(inner, expected);
            }
            PatKind::Cons(head, tail) => {
                let elem = self.ctx.fresh_var();
                self.unify(
                    expected,
                    Type::list(elem.clone()),
                    ConstraintOrigin::Pattern(span),
                );
                self.infer_pat(head, elem.clone());
                self.infer_pat(tail, Type::list(elem));
            }
            PatKind::List(items) => {
                let elem = self.ctx.fresh_var();
                self.unify(
                    expected,
                    Type::list(elem.clone()),
                    ConstraintOrigin::Pattern(span),
                );
                for p in items {
                    self.infer_pat(p, elem.clone());
                }
            }
            PatKind::Annot(inner, ty) => {
                let annotated = self.resolve_decl_tyexpr(ty);
                self.unify(
                    expected.clone(),
                    annotated,
                    ConstraintOrigin::Annotation(ty.span),
                );
                self.infer_pat(inner, expected);
            }
        }
    }

    // ── Relational pipelines ───────────────────────────────────────────

    fn infer_query(&mut self, q: &Query, quantifier: Quantifier) -> Type {
        self.env.push_scope();
        let mut row = RowState {
            bindings: Vec::new(),
            anon: None,
            ordered: true,
            force_record: false,
        };

        for scan in &q.scans {
            self.infer_scan(scan, &mut row);
        }

        let mut terminal: Option<Type> = None;
        for step in &q.steps {
            match &step.kind {
                StepKind::Where(e) | StepKind::Require(e) => {
                    let t = self.infer_expr(e);
                    self.unify(t, Type::bool(), ConstraintOrigin::Condition(e.span));
                }
                StepKind::Join { scans, on } => {
                    for scan in scans {
                        self.infer_scan(scan, &mut row);
                    }
                    if let Some(on) = on {
                        let t = self.infer_expr(on);
                        self.unify(t, Type::bool(), ConstraintOrigin::Condition(on.span));
                    }
                }
                StepKind::Yield(e) => {
                    let te = self.infer_expr(e);
                    let resolved = self.ctx.resolve(te.clone());
                    self.env.pop_scope();
                    self.env.push_scope();
                    match resolved {
                        Type::Record(ref fields) if Type::as_tuple(fields).is_none() => {
                            row.bindings = fields
                                .iter()
                                .map(|(l, t)| (l.as_str().to_string(), t.clone()))
                                .collect();
                            row.anon = None;
                            row.force_record = true;
                            for (name, ty) in row.bindings.clone() {
                                self.env
                                    .insert(name, Binding::Val(Scheme::mono(ty)));
                            }
                        }
                        _ => {
                            row.bindings = Vec::new();
                            row.anon = Some(te);
                            row.force_record = false;
                        }
                    }
                }
                StepKind::Group { keys, aggs } => {
                    let mut new_fields: Vec<(String, Type)> = Vec::new();
                    for (label, e) in keys {
                        let t = self.infer_expr(e);
                        if new_fields.iter().any(|(l, _)| l == label) {
                            self.ctx.errors.push(TypeError::DuplicateField {
                                label: label.clone(),
                                span: step.span,
                            });
                        }
                        new_fields.push((label.clone(), t));
                    }
                    for agg in aggs {
                        let t = self.infer_agg(agg, &row);
                        if new_fields.iter().any(|(l, _)| l == &agg.label) {
                            self.ctx.errors.push(TypeError::DuplicateField {
                                label: agg.label.clone(),
                                span: agg.span,
                            });
                        }
                        new_fields.push((agg.label.clone(), t));
                    }
                    self.env.pop_scope();
                    self.env.push_scope();
                    for (name, ty) in &new_fields {
                        self.env
                            .insert(name.clone(), Binding::Val(Scheme::mono(ty.clone())));
                    }
                    row.bindings = new_fields;
                    row.anon = None;
                    row.force_record = true;
                }
                StepKind::Order(keys) => {
                    for key in keys {
                        self.infer_expr(&key.expr);
                    }
                    row.ordered = true;
                }
                StepKind::Take(e) | StepKind::Skip(e) => {
                    let t = self.infer_expr(e);
                    self.unify(t, Type::int(), ConstraintOrigin::QueryStep(e.span));
                    if !row.ordered {
                        let step_name = match &step.kind {
                            StepKind::Take(_) => "take",
                            _ => "skip",
                        };
                        self.ctx.errors.push(TypeError::StepNeedsOrder {
                            step: step_name,
                            span: step.span,
                        });
                    }
                }
                StepKind::Distinct => {}
                StepKind::Unorder => row.ordered = false,
                StepKind::Through { pat, func } => {
                    let in_coll = row.collection(self.row_type(&row));
                    let out_elem = self.ctx.fresh_var();
                    let tf = self.infer_expr(func);
                    self.unify(
                        tf,
                        Type::fun(in_coll, Type::list(out_elem.clone())),
                        ConstraintOrigin::QueryStep(func.span),
                    );
                    self.env.pop_scope();
                    self.env.push_scope();
                    self.infer_pat(pat, out_elem.clone());
                    row.bindings = pat
                        .bound_vars()
                        .into_iter()
                        .map(|name| {
                            let ty = match self.env.lookup(&name) {
                                Some(Binding::Val(s)) => s.ty.clone(),
                                _ => Type::unit(),
                            };
                            (name, ty)
                        })
                        .collect();
                    row.anon = if row.bindings.is_empty() {
                        Some(out_elem)
                    } else {
                        None
                    };
                    row.force_record = false;
                }
                StepKind::Set { op, sources, .. } => {
                    let row_ty = self.row_type(&row);
                    for src in sources {
                        let ts = self.infer_expr(src);
                        match self.ctx.resolve(ts.clone()) {
                            Type::Bag(elem) => {
                                self.unify(
                                    *elem,
                                    row_ty.clone(),
                                    ConstraintOrigin::QueryStep(src.span),
                                );
                                row.ordered = false;
                            }
                            Type::List(elem) => {
                                self.unify(
                                    *elem,
                                    row_ty.clone(),
                                    ConstraintOrigin::QueryStep(src.span),
                                );
                            }
                            _ => {
                                self.unify(
                                    ts,
                                    Type::list(row_ty.clone()),
                                    ConstraintOrigin::QueryStep(src.span),
                                );
                            }
                        }
                    }
                    let _ = op;
                }
                StepKind::Compute(aggs) => {
                    let tys: Vec<(String, Type)> = aggs
                        .iter()
                        .map(|agg| (agg.label.clone(), self.infer_agg(agg, &row)))
                        .collect();
                    let result = if tys.len() == 1 {
                        tys.into_iter().next().expect("one aggregate").1
                    } else {
                        let mut seen: Vec<&str> = Vec::new();
                        for (l, _) in &tys {
                            if seen.contains(&l.as_str()) {
                                self.ctx.errors.push(TypeError::DuplicateField {
                                    label: l.clone(),
                                    span: step.span,
                                });
                            }
                            seen.push(l);
                        }
                        Type::record(
                            tys.into_iter()
                                .map(|(l, t)| (Label::new(l), t))
                                .collect(),
                        )
                    };
                    terminal = Some(result);
                }
                StepKind::Into(f) => {
                    let coll = row.collection(self.row_type(&row));
                    let ret = self.ctx.fresh_var();
                    let tf = self.infer_expr(f);
                    self.unify(
                        tf,
                        Type::fun(coll, ret.clone()),
                        ConstraintOrigin::QueryStep(f.span),
                    );
                    terminal = Some(ret);
                }
            }
        }

        let row_ty = self.row_type(&row);
        self.env.pop_scope();

        match quantifier {
            Quantifier::Exists | Quantifier::Forall => Type::bool(),
            Quantifier::From => match terminal {
                Some(t) => t,
                None => row.collection(row_ty),
            },
        }
    }

    fn infer_scan(&mut self, scan: &Scan, row: &mut RowState) {
        let elem_ty = match &scan.kind {
            ScanKind::Source(e) => {
                let te = self.infer_expr(e);
                match self.ctx.resolve(te.clone()) {
                    Type::List(t) => *t,
                    Type::Bag(t) => {
                        row.ordered = false;
                        *t
                    }
                    Type::Var(_) => {
                        let elem = self.ctx.fresh_var();
                        self.unify(
                            te,
                            Type::list(elem.clone()),
                            ConstraintOrigin::QueryStep(e.span),
                        );
                        elem
                    }
                    other => {
                        let elem = self.ctx.fresh_var();
                        self.ctx.errors.push(TypeError::Mismatch {
                            expected: Type::list(elem.clone()),
                            found: other,
                            origin: ConstraintOrigin::QueryStep(e.span),
                        });
                        elem
                    }
                }
            }
            ScanKind::Value(e) => self.infer_expr(e),
            ScanKind::Unbounded => self.ctx.fresh_var(),
        };
        self.infer_pat(&scan.pat, elem_ty);
        for name in scan.pat.bound_vars() {
            let ty = match self.env.lookup(&name) {
                Some(Binding::Val(s)) => s.ty.clone(),
                _ => continue,
            };
            row.bindings.push((name, ty));
        }
        row.anon = None;
    }

    /// Type an aggregate application: the function receives the collection
    /// of its argument values (or of whole rows when no argument is given).
    fn infer_agg(&mut self, agg: &Agg, row: &RowState) -> Type {
        let arg_ty = match &agg.arg {
            Some(e) => self.infer_expr(e),
            None => self.row_type(row),
        };
        let coll = row.collection(arg_ty);
        if let ExprKind::Ident(name) = &agg.func.kind {
            if let Some(Binding::Overload(instances)) = self.env.lookup(name).cloned() {
                return self.resolve_overload(
                    name,
                    &instances,
                    coll,
                    agg.func.id,
                    agg.span,
                );
            }
        }
        let tf = self.infer_expr(&agg.func);
        let ret = self.ctx.fresh_var();
        self.unify(
            tf,
            Type::fun(coll, ret.clone()),
            ConstraintOrigin::Apply(agg.span),
        );
        ret
    }

    fn row_type(&mut self, row: &RowState) -> Type {
        if let Some(t) = &row.anon {
            return t.clone();
        }
        match row.bindings.len() {
            0 => Type::unit(),
            1 if !row.force_record => row.bindings[0].1.clone(),
            _ => Type::record(
                row.bindings
                    .iter()
                    .map(|(n, t)| (Label::new(n.clone()), t.clone()))
                    .collect(),
            ),
        }
    }

    // ── Match coverage ─────────────────────────────────────────────────

    fn check_match(&mut self, arms: &[Arm], scrutinee: Type, whole_span: Span) {
        if !self.opts.match_coverage_enabled {
            return;
        }
        let ty = self.ctx.resolve(scrutinee);
        let apats: Vec<APat> = arms
            .iter()
            .map(|arm| self.abstract_pat(&arm.pat))
            .collect();
        let space = SpaceProvider {
            registry: self.registry,
        };
        for i in exhaustiveness::redundant_clauses(&apats, &ty, &space) {
            self.ctx
                .warnings
                .push(TypeError::RedundantClause { span: arms[i].span });
        }
        if !exhaustiveness::is_exhaustive(&apats, &ty, &space) {
            self.ctx
                .warnings
                .push(TypeError::NonExhaustiveMatch { span: whole_span });
        }
    }

    fn check_fun_coverage(&mut self, bind: &FunBind, arg_vars: &[Type], decl_span: Span) {
        if !self.opts.match_coverage_enabled {
            return;
        }
        let types: Vec<Type> = arg_vars
            .iter()
            .map(|t| self.ctx.resolve(t.clone()))
            .collect();
        let rows: Vec<Vec<APat>> = bind
            .clauses
            .iter()
            .map(|c| c.pats.iter().map(|p| self.abstract_pat(p)).collect())
            .collect();
        let space = SpaceProvider {
            registry: self.registry,
        };
        for (i, row) in rows.iter().enumerate() {
            if row.len() != types.len() {
                continue;
            }
            if !exhaustiveness::is_useful(&rows[..i], row, &types, &space) {
                self.ctx.warnings.push(TypeError::RedundantClause {
                    span: bind.clauses[i].span,
                });
            }
        }
        let wildcard: Vec<APat> = types.iter().map(|_| APat::Wild).collect();
        if exhaustiveness::is_useful(&rows, &wildcard, &types, &space) {
            self.ctx
                .warnings
                .push(TypeError::NonExhaustiveMatch { span: decl_span });
        }
    }

    /// Translate a surface pattern into the abstract form the coverage
    /// algorithm consumes. Variables become wildcards; layered and
    /// annotated patterns delegate to their inner pattern.
    fn abstract_pat(&mut self, pat: &Pat) -> APat {
        match &pat.kind {
            PatKind::Wildcard => APat::Wild,
            PatKind::Unit => APat::ctor(ACtor::Unit, vec![]),
            PatKind::Bool(b) => APat::ctor(ACtor::Bool(*b), vec![]),
            PatKind::Int(n) => APat::ctor(ACtor::IntLit(n.to_string()), vec![]),
            PatKind::Str(s) => APat::ctor(ACtor::StrLit(s.clone()), vec![]),
            PatKind::Char(c) => APat::ctor(ACtor::CharLit(*c), vec![]),
            PatKind::Ident(name) => match self.registry.lookup_ctor(name) {
                Some((id, index))
                    if matches!(self.env.lookup(name), Some(Binding::Ctor(_))) =>
                {
                    APat::ctor(
                        ACtor::Variant {
                            data: id.0,
                            index,
                        },
                        vec![],
                    )
                }
                _ => APat::Wild,
            },
            PatKind::Ctor(name, arg) => match self.registry.lookup_ctor(name) {
                Some((id, index)) => {
                    let inner = self.abstract_pat(arg);
                    APat::ctor(
                        ACtor::Variant {
                            data: id.0,
                            index,
                        },
                        vec![inner],
                    )
                }
                // Exception patterns live in an open space.
                None => APat::Wild,
            },
            PatKind::Tuple(items) => APat::ctor(
                ACtor::Record(items.len()),
                items.iter().map(|p| self.abstract_pat(p)).collect(),
            ),
            PatKind::Record { fields, .. } => {
                // Expand against the resolved record type so that omitted
                // and `...`-elided fields become wildcards in canonical
                // field order.
                let ty = self
                    .types
                    .get(&pat.id)
                    .cloned()
                    .map(|t| self.ctx.resolve(t));
                match ty {
                    Some(Type::Record(type_fields)) => {
                        let args: Vec<APat> = type_fields
                            .iter()
                            .map(|(label, _)| {
                                fields
                                    .iter()
                                    .find(|f| f.label == label.as_str())
                                    .map(|f| self.abstract_pat(&f.pat))
                                    .unwrap_or(APat::Wild)
                            })
                            .collect();
                        APat::ctor(ACtor::Record(type_fields.len()), args)
                    }
                    _ => APat::Wild,
                }
            }
            PatKind::As(_, inner) => self.abstract_pat(inner),
            PatKind::Annot(inner, _) => self.abstract_pat(inner),
            PatKind::Cons(head, tail) => {
                let h = self.abstract_pat(head);
                let t = self.abstract_pat(tail);
                APat::ctor(ACtor::Cons, vec![h, t])
            }
            PatKind::List(items) => {
                let mut acc = APat::ctor(ACtor::Nil, vec![]);
                for p in items.iter().rev() {
                    let h = self.abstract_pat(p);
                    acc = APat::ctor(ACtor::Cons, vec![h, acc]);
                }
                acc
            }
        }
    }
}

/// Which quantifier introduced the pipeline.
#[derive(Clone, Copy, PartialEq, Eq)]
enum Quantifier {
    From,
    Exists,
    Forall,
}

/// The current row shape of a pipeline: named bindings, or an anonymous
/// row type after a non-record `yield`, plus orderedness. `group` and a
/// record `yield` force the row to stay a record even with one field; a
/// single scan binding is a scalar row.
struct RowState {
    bindings: Vec<(String, Type)>,
    anon: Option<Type>,
    ordered: bool,
    force_record: bool,
}

impl RowState {
    fn collection(&self, elem: Type) -> Type {
        if self.ordered {
            Type::list(elem)
        } else {
            Type::bag(elem)
        }
    }
}

/// Supplies constructor signatures for coverage analysis from the datatype
/// registry.
struct SpaceProvider<'r> {
    registry: &'r TypeRegistry,
}

impl PatSpace for SpaceProvider<'_> {
    fn constructors(&self, ty: &Type) -> Signature {
        match ty {
            Type::Prim(Prim::Bool) => Signature::Complete(vec![
                CtorSig {
                    ctor: ACtor::Bool(false),
                    args: vec![],
                },
                CtorSig {
                    ctor: ACtor::Bool(true),
                    args: vec![],
                },
            ]),
            Type::Prim(Prim::Unit) => Signature::Complete(vec![CtorSig {
                ctor: ACtor::Unit,
                args: vec![],
            }]),
            Type::List(elem) => Signature::Complete(vec![
                CtorSig {
                    ctor: ACtor::Nil,
                    args: vec![],
                },
                CtorSig {
                    ctor: ACtor::Cons,
                    args: vec![(**elem).clone(), ty.clone()],
                },
            ]),
            Type::Record(fields) => Signature::Complete(vec![CtorSig {
                ctor: ACtor::Record(fields.len()),
                args: fields.iter().map(|(_, t)| t.clone()).collect(),
            }]),
            Type::Data(id, args) => {
                let def = self.registry.get(*id);
                let map: FxHashMap<TyVar, Type> = (0..def.arity)
                    .map(|i| {
                        (
                            TyVar(i as u32),
                            args.get(i).cloned().unwrap_or(Type::unit()),
                        )
                    })
                    .collect();
                Signature::Complete(
                    def.ctors
                        .iter()
                        .enumerate()
                        .map(|(index, c)| CtorSig {
                            ctor: ACtor::Variant {
                                data: id.0,
                                index,
                            },
                            args: c.arg.iter().map(|t| t.subst(&map)).collect(),
                        })
                        .collect(),
                )
            }
            _ => Signature::Infinite,
        }
    }

    fn ctor_args(&self, ty: &Type, ctor: &ACtor) -> Vec<Type> {
        match self.constructors(ty) {
            Signature::Complete(sigs) => sigs
                .into_iter()
                .find(|s| &s.ctor == ctor)
                .map(|s| s.args)
                .unwrap_or_default(),
            Signature::Infinite => Vec::new(),
        }
    }
}

/// The value restriction's notion of a syntactic value: literals,
/// variables, functions, constructors applied to values, and tuples,
/// records, and lists of values.
pub fn is_syntactic_value(expr: &Expr) -> bool {
    match &expr.kind {
        ExprKind::Int(_)
        | ExprKind::Real(_)
        | ExprKind::Str(_)
        | ExprKind::Char(_)
        | ExprKind::Bool(_)
        | ExprKind::Unit
        | ExprKind::Ident(_)
        | ExprKind::Selector(_)
        | ExprKind::Fn(_) => true,
        ExprKind::Tuple(items) | ExprKind::List(items) => {
            items.iter().all(is_syntactic_value)
        }
        ExprKind::Record(fields) => fields.iter().all(|f| is_syntactic_value(&f.expr)),
        ExprKind::Annot(e, _) => is_syntactic_value(e),
        // A constructor application to a value is a value; a general
        // application is not, and we cannot tell constructors apart here
        // without the environment, so only the conservative cases pass.
        _ => false,
    }
}
