//! Lowering: typed surface AST to the core calculus.
//!
//! Multi-clause `fun` groups collapse to single-argument function chains
//! over a `case` on the tupled arguments; record sugar becomes explicit
//! field selection; `let` patterns become `case`; `if` and the short-
//! circuit connectives become two-armed `case`s; `from` pipelines become
//! canonical step vectors; `exists`/`forall` become emptiness tests over
//! pipelines; and full applications of `map`/`filter` over collections
//! are rewritten into pipelines so query fusion sees them uniformly.

use rill_common::span::Span;
use rill_parser::ast::{
    Arm, BinOp, Decl, DeclKind, Expr, ExprKind, NodeId, Pat, PatKind, Query, Scan, ScanKind,
    SetOp, StepKind,
};
use rill_typeck::{Binding, Label, Type, TypeEnv, TypeRegistry, TypeckResult};
use rustc_hash::FxHashMap;

use crate::term::{
    CoreAgg, CoreArm, CoreDecl, CoreExpr, CoreKind, CorePat, CorePatKind, CoreQuery, CoreStep,
    CoreValBind, FreshGen, Lit,
};

/// The internal names `exists` and `forall` lower to. They contain a dot,
/// so no source identifier can shadow them.
pub const NON_EMPTY: &str = "Relational.nonEmpty";
pub const EMPTY: &str = "Relational.empty";

/// Lower one type-checked declaration.
pub fn lower_decl(
    decl: &Decl,
    checked: &TypeckResult,
    env: &TypeEnv,
    registry: &TypeRegistry,
    fresh: &mut FreshGen,
) -> CoreDecl {
    let mut lowerer = Lowerer {
        types: &checked.types,
        choices: &checked.overload_choices,
        env,
        registry,
        fresh,
        locals: Vec::new(),
    };
    lowerer.lower_decl(decl)
}

struct Lowerer<'a> {
    types: &'a FxHashMap<NodeId, Type>,
    choices: &'a FxHashMap<NodeId, usize>,
    env: &'a TypeEnv,
    registry: &'a TypeRegistry,
    fresh: &'a mut FreshGen,
    /// Locally bound names, which shadow constructor and overload
    /// bindings during identifier classification.
    locals: Vec<String>,
}

impl Lowerer<'_> {
    fn ty(&self, id: NodeId) -> Type {
        self.types.get(&id).cloned().unwrap_or(Type::unit())
    }

    // ── Declarations ───────────────────────────────────────────────────

    fn lower_decl(&mut self, decl: &Decl) -> CoreDecl {
        match &decl.kind {
            DeclKind::Val { inst: true, binds, .. } => {
                let bind = &binds[0];
                let name = match &bind.pat.kind {
                    PatKind::Ident(n) => n.clone(),
                    _ => String::new(),
                };
                CoreDecl::Instance {
                    name,
                    rhs: self.lower_expr(&bind.expr),
                }
            }
            DeclKind::Val {
                rec: true, binds, ..
            } => CoreDecl::Rec(
                binds
                    .iter()
                    .filter_map(|b| match &b.pat.kind {
                        PatKind::Ident(name) => {
                            Some((name.clone(), self.lower_rec_rhs(binds, &b.expr)))
                        }
                        _ => None,
                    })
                    .collect(),
            ),
            DeclKind::Val { binds, .. } => CoreDecl::Vals(
                binds
                    .iter()
                    .map(|b| CoreValBind {
                        pat: self.lower_pat(&b.pat),
                        rhs: self.lower_expr(&b.expr),
                    })
                    .collect(),
            ),
            DeclKind::Fun(binds) => {
                let names: Vec<String> = binds.iter().map(|b| b.name.clone()).collect();
                let n = names.len();
                self.locals.extend(names.clone());
                let group = binds
                    .iter()
                    .map(|b| (b.name.clone(), self.lower_fun_bind(b)))
                    .collect();
                self.locals.truncate(self.locals.len() - n);
                CoreDecl::Rec(group)
            }
            DeclKind::Exception { name, arg } => CoreDecl::Exception {
                name: name.clone(),
                has_arg: arg.is_some(),
            },
            DeclKind::Expr(e) => {
                let rhs = self.lower_expr(e);
                CoreDecl::Vals(vec![CoreValBind {
                    pat: CorePat {
                        ty: rhs.ty.clone(),
                        span: e.span,
                        kind: CorePatKind::Var("it".to_string()),
                    },
                    rhs,
                }])
            }
            DeclKind::Datatype(_)
            | DeclKind::TypeAlias { .. }
            | DeclKind::Over(_)
            | DeclKind::Signature { .. } => CoreDecl::Static,
        }
    }

    /// The right-hand side of one `val rec` binding, with the whole group
    /// in scope.
    fn lower_rec_rhs(
        &mut self,
        binds: &[rill_parser::ast::ValBind],
        expr: &Expr,
    ) -> CoreExpr {
        let names: Vec<String> = binds
            .iter()
            .filter_map(|b| match &b.pat.kind {
                PatKind::Ident(n) => Some(n.clone()),
                _ => None,
            })
            .collect();
        let n = names.len();
        self.locals.extend(names);
        let out = self.lower_expr(expr);
        self.locals.truncate(self.locals.len() - n);
        out
    }

    /// A `fun` bind: clauses collapse to a chain of single-argument
    /// functions whose body cases on the tupled arguments.
    fn lower_fun_bind(&mut self, bind: &rill_parser::ast::FunBind) -> CoreExpr {
        let arity = bind.clauses[0].pats.len();
        let span = bind.span;

        // Simple case: one clause whose patterns are all plain variables.
        let first = &bind.clauses[0];
        if bind.clauses.len() == 1
            && first.pats.iter().all(|p| {
                matches!(&p.kind, PatKind::Ident(n) if !self.names_a_constructor(n))
            })
        {
            let names: Vec<String> = first
                .pats
                .iter()
                .map(|p| match &p.kind {
                    PatKind::Ident(n) => n.clone(),
                    _ => unreachable!("guarded above"),
                })
                .collect();
            self.locals.extend(names.clone());
            let body = self.lower_expr(&first.body);
            self.locals.truncate(self.locals.len() - names.len());
            let mut out = body;
            for (pat, name) in first.pats.iter().zip(names).rev() {
                let fn_ty = Type::fun(self.ty(pat.id), out.ty.clone());
                out = CoreExpr::new(
                    fn_ty,
                    span,
                    CoreKind::Fn {
                        param: name,
                        body: Box::new(out),
                    },
                );
            }
            return out;
        }

        // General case: parameters a0..an, body `case (a0, ..., an) of ...`.
        let params: Vec<(String, Type)> = (0..arity)
            .map(|i| {
                let ty = bind
                    .clauses
                    .first()
                    .and_then(|c| c.pats.get(i))
                    .map(|p| self.ty(p.id))
                    .unwrap_or(Type::unit());
                (self.fresh.fresh("a"), ty)
            })
            .collect();

        let arms: Vec<CoreArm> = bind
            .clauses
            .iter()
            .map(|clause| {
                let vars: Vec<String> = clause
                    .pats
                    .iter()
                    .flat_map(|p| p.bound_vars())
                    .collect();
                let n = vars.len();
                self.locals.extend(vars);
                let pats: Vec<CorePat> =
                    clause.pats.iter().map(|p| self.lower_pat(p)).collect();
                let body = self.lower_expr(&clause.body);
                self.locals.truncate(self.locals.len() - n);
                let pat = if pats.len() == 1 {
                    pats.into_iter().next().expect("one pattern")
                } else {
                    tuple_pat(pats, clause.span)
                };
                CoreArm {
                    pat,
                    guard: None,
                    body,
                }
            })
            .collect();

        let body_ty = arms
            .first()
            .map(|a| a.body.ty.clone())
            .unwrap_or(Type::unit());
        let scrutinee = if params.len() == 1 {
            CoreExpr::new(
                params[0].1.clone(),
                span,
                CoreKind::Var(params[0].0.clone()),
            )
        } else {
            let fields: Vec<(Label, CoreExpr)> = params
                .iter()
                .enumerate()
                .map(|(i, (name, ty))| {
                    (
                        Label::new((i + 1).to_string()),
                        CoreExpr::new(ty.clone(), span, CoreKind::Var(name.clone())),
                    )
                })
                .collect();
            CoreExpr::new(
                Type::tuple(params.iter().map(|(_, t)| t.clone()).collect()),
                span,
                CoreKind::Record(fields),
            )
        };

        let mut out = CoreExpr::new(
            body_ty,
            span,
            CoreKind::Case {
                scrutinee: Box::new(scrutinee),
                arms,
            },
        );
        for (name, ty) in params.into_iter().rev() {
            let fn_ty = Type::fun(ty, out.ty.clone());
            out = CoreExpr::new(
                fn_ty,
                span,
                CoreKind::Fn {
                    param: name,
                    body: Box::new(out),
                },
            );
        }
        out
    }

    // ── Expressions ────────────────────────────────────────────────────

    fn lower_expr(&mut self, expr: &Expr) -> CoreExpr {
        let ty = self.ty(expr.id);
        let span = expr.span;
        match &expr.kind {
            ExprKind::Int(n) => CoreExpr::new(ty, span, CoreKind::Lit(Lit::Int(n.clone()))),
            ExprKind::Real(r) => CoreExpr::new(ty, span, CoreKind::Lit(Lit::Real(*r))),
            ExprKind::Str(s) => CoreExpr::new(ty, span, CoreKind::Lit(Lit::Str(s.clone()))),
            ExprKind::Char(c) => CoreExpr::new(ty, span, CoreKind::Lit(Lit::Char(*c))),
            ExprKind::Bool(b) => CoreExpr::new(ty, span, CoreKind::Lit(Lit::Bool(*b))),
            ExprKind::Unit => CoreExpr::new(ty, span, CoreKind::Lit(Lit::Unit)),

            ExprKind::Ident(name) => self.lower_ident(name, expr.id, ty, span),

            ExprKind::Tuple(items) => {
                let fields = items
                    .iter()
                    .enumerate()
                    .map(|(i, e)| (Label::new((i + 1).to_string()), self.lower_expr(e)))
                    .collect();
                CoreExpr::new(ty, span, CoreKind::Record(fields))
            }

            ExprKind::List(items) => {
                let lowered = items.iter().map(|e| self.lower_expr(e)).collect();
                CoreExpr::new(ty, span, CoreKind::MkList(lowered))
            }

            ExprKind::Record(fields) => self.lower_record(fields, ty, span),

            ExprKind::Select(e, label) => {
                let base = self.lower_expr(e);
                CoreExpr::new(
                    ty,
                    span,
                    CoreKind::Select(Box::new(base), Label::new(label.clone())),
                )
            }

            ExprKind::Selector(label) => {
                // `#f` becomes `fn v => v.f`.
                let v = self.fresh.fresh("v");
                let (arg_ty, field_ty) = match &ty {
                    Type::Fn(a, b) => ((**a).clone(), (**b).clone()),
                    _ => (Type::unit(), Type::unit()),
                };
                let body = CoreExpr::new(
                    field_ty,
                    span,
                    CoreKind::Select(
                        Box::new(CoreExpr::new(arg_ty, span, CoreKind::Var(v.clone()))),
                        Label::new(label.clone()),
                    ),
                );
                CoreExpr::new(
                    ty,
                    span,
                    CoreKind::Fn {
                        param: v,
                        body: Box::new(body),
                    },
                )
            }

            ExprKind::If(c, t, e) => {
                let cond = self.lower_expr(c);
                let then_branch = self.lower_expr(t);
                let else_branch = self.lower_expr(e);
                mk_if(cond, then_branch, else_branch, ty, span)
            }

            ExprKind::Case(scrutinee, arms) => {
                let s = self.lower_expr(scrutinee);
                let lowered = self.lower_arms(arms);
                CoreExpr::new(
                    ty,
                    span,
                    CoreKind::Case {
                        scrutinee: Box::new(s),
                        arms: lowered,
                    },
                )
            }

            ExprKind::Fn(arms) => self.lower_fn(arms, ty, span),

            ExprKind::Handle(body, arms) => {
                let b = self.lower_expr(body);
                let lowered = self.lower_arms(arms);
                CoreExpr::new(
                    ty,
                    span,
                    CoreKind::Handle {
                        body: Box::new(b),
                        arms: lowered,
                    },
                )
            }

            ExprKind::Raise(e) => {
                let inner = self.lower_expr(e);
                CoreExpr::new(ty, span, CoreKind::Raise(Box::new(inner)))
            }

            ExprKind::Let(decls, body) => self.lower_let(decls, body, ty, span),

            ExprKind::App(f, arg) => self.lower_app(f, arg, ty, span),

            ExprKind::Binop(op, lhs, rhs) => {
                self.lower_binop(*op, lhs, rhs, expr.id, ty, span)
            }

            ExprKind::Negate(e) => {
                let operand = self.lower_expr(e);
                let func = self.op_ref("~", expr.id, operand.ty.clone(), ty.clone(), span);
                CoreExpr::new(
                    ty,
                    span,
                    CoreKind::Apply {
                        func: Box::new(func),
                        arg: Box::new(operand),
                    },
                )
            }

            ExprKind::Annot(e, _) => self.lower_expr(e),

            ExprKind::From(q) => {
                let query = self.lower_query(q, &ty);
                CoreExpr::new(ty, span, CoreKind::From(Box::new(query)))
            }

            ExprKind::Exists(q) => self.lower_quantifier(q, ty, span, NON_EMPTY, None),

            ExprKind::Forall(q) => {
                // `forall E require C` tests that `from E where not C` is
                // empty.
                self.lower_quantifier(q, ty, span, EMPTY, Some(()))
            }
        }
    }

    fn lower_quantifier(
        &mut self,
        q: &Query,
        ty: Type,
        span: Span,
        test: &str,
        negate_require: Option<()>,
    ) -> CoreExpr {
        let mut query = self.lower_query(q, &Type::list(Type::unit()));
        if negate_require.is_some() {
            // The parser guarantees `require` is the final step.
            if let Some(CoreStep::Where(pred)) = query.steps.pop() {
                let negated = CoreExpr::new(
                    Type::bool(),
                    pred.span,
                    CoreKind::Apply {
                        func: Box::new(CoreExpr::new(
                            Type::fun(Type::bool(), Type::bool()),
                            pred.span,
                            CoreKind::Var("not".to_string()),
                        )),
                        arg: Box::new(pred),
                    },
                );
                query.steps.push(CoreStep::Where(negated));
            }
        }
        let from = CoreExpr::new(
            Type::list(query.elem_ty.clone()),
            span,
            CoreKind::From(Box::new(query)),
        );
        CoreExpr::new(
            ty,
            span,
            CoreKind::Apply {
                func: Box::new(CoreExpr::new(
                    Type::fun(from.ty.clone(), Type::bool()),
                    span,
                    CoreKind::Var(test.to_string()),
                )),
                arg: Box::new(from),
            },
        )
    }

    fn lower_ident(&mut self, name: &str, id: NodeId, ty: Type, span: Span) -> CoreExpr {
        if self.locals.iter().any(|l| l == name) {
            return CoreExpr::new(ty, span, CoreKind::Var(name.to_string()));
        }
        match self.env.lookup(name) {
            Some(Binding::Ctor(data)) => {
                let takes_arg = self
                    .registry
                    .lookup_ctor(name)
                    .map(|(d, i)| self.registry.get(d).ctors[i].arg.is_some() && d == *data)
                    .unwrap_or(false);
                if takes_arg {
                    // Constructor as a function value: eta-expand.
                    let v = self.fresh.fresh("v");
                    let (arg_ty, res_ty) = match &ty {
                        Type::Fn(a, b) => ((**a).clone(), (**b).clone()),
                        _ => (Type::unit(), ty.clone()),
                    };
                    let body = CoreExpr::new(
                        res_ty,
                        span,
                        CoreKind::Ctor {
                            name: name.to_string(),
                            data: *data,
                            arg: Some(Box::new(CoreExpr::new(
                                arg_ty,
                                span,
                                CoreKind::Var(v.clone()),
                            ))),
                        },
                    );
                    CoreExpr::new(
                        ty,
                        span,
                        CoreKind::Fn {
                            param: v,
                            body: Box::new(body),
                        },
                    )
                } else {
                    CoreExpr::new(
                        ty,
                        span,
                        CoreKind::Ctor {
                            name: name.to_string(),
                            data: *data,
                            arg: None,
                        },
                    )
                }
            }
            Some(Binding::Exn(arg)) => match arg {
                None => CoreExpr::new(
                    ty,
                    span,
                    CoreKind::Exn {
                        name: name.to_string(),
                        arg: None,
                    },
                ),
                Some(payload_ty) => {
                    let v = self.fresh.fresh("v");
                    let body = CoreExpr::new(
                        Type::exn(),
                        span,
                        CoreKind::Exn {
                            name: name.to_string(),
                            arg: Some(Box::new(CoreExpr::new(
                                payload_ty.clone(),
                                span,
                                CoreKind::Var(v.clone()),
                            ))),
                        },
                    );
                    CoreExpr::new(
                        ty,
                        span,
                        CoreKind::Fn {
                            param: v,
                            body: Box::new(body),
                        },
                    )
                }
            },
            Some(Binding::Overload(_)) => match self.choices.get(&id) {
                Some(index) => CoreExpr::new(
                    ty,
                    span,
                    CoreKind::VarInst(name.to_string(), *index),
                ),
                None => CoreExpr::new(ty, span, CoreKind::Var(name.to_string())),
            },
            _ => CoreExpr::new(ty, span, CoreKind::Var(name.to_string())),
        }
    }

    /// Record literal: canonical field order for the value, source order
    /// for evaluation. When the orders differ, each field is bound to a
    /// temporary first.
    fn lower_record(
        &mut self,
        fields: &[rill_parser::ast::Field],
        ty: Type,
        span: Span,
    ) -> CoreExpr {
        let mut labeled: Vec<(Label, CoreExpr)> = fields
            .iter()
            .map(|f| (Label::new(f.label.clone()), self.lower_expr(&f.expr)))
            .collect();
        let already_canonical = labeled.windows(2).all(|w| w[0].0 <= w[1].0);
        if already_canonical {
            labeled.sort_by(|a, b| a.0.cmp(&b.0));
            return CoreExpr::new(ty, span, CoreKind::Record(labeled));
        }

        // Bind fields in source order, then assemble in canonical order.
        let mut bound: Vec<(Label, String, CoreExpr)> = Vec::new();
        for (label, e) in labeled {
            let name = self.fresh.fresh("f");
            bound.push((label, name, e));
        }
        let mut canonical: Vec<(Label, CoreExpr)> = bound
            .iter()
            .map(|(label, name, e)| {
                (
                    label.clone(),
                    CoreExpr::new(e.ty.clone(), span, CoreKind::Var(name.clone())),
                )
            })
            .collect();
        canonical.sort_by(|a, b| a.0.cmp(&b.0));
        let mut out = CoreExpr::new(ty, span, CoreKind::Record(canonical));
        for (_, name, e) in bound.into_iter().rev() {
            let out_ty = out.ty.clone();
            out = CoreExpr::new(
                out_ty,
                span,
                CoreKind::Let {
                    name,
                    rhs: Box::new(e),
                    body: Box::new(out),
                },
            );
        }
        out
    }

    fn lower_fn(&mut self, arms: &[Arm], ty: Type, span: Span) -> CoreExpr {
        if arms.len() == 1 {
            if let PatKind::Ident(name) = &arms[0].pat.kind {
                if !self.names_a_constructor(name) {
                    self.locals.push(name.clone());
                    let body = self.lower_expr(&arms[0].body);
                    self.locals.pop();
                    return CoreExpr::new(
                        ty,
                        span,
                        CoreKind::Fn {
                            param: name.clone(),
                            body: Box::new(body),
                        },
                    );
                }
            }
            if let PatKind::Wildcard = &arms[0].pat.kind {
                let body = self.lower_expr(&arms[0].body);
                return CoreExpr::new(
                    ty,
                    span,
                    CoreKind::Fn {
                        param: self.fresh.fresh("v"),
                        body: Box::new(body),
                    },
                );
            }
        }
        let v = self.fresh.fresh("v");
        let arg_ty = match &ty {
            Type::Fn(a, _) => (**a).clone(),
            _ => Type::unit(),
        };
        let lowered = self.lower_arms(arms);
        let body_ty = lowered
            .first()
            .map(|a| a.body.ty.clone())
            .unwrap_or(Type::unit());
        let case = CoreExpr::new(
            body_ty,
            span,
            CoreKind::Case {
                scrutinee: Box::new(CoreExpr::new(arg_ty, span, CoreKind::Var(v.clone()))),
                arms: lowered,
            },
        );
        CoreExpr::new(
            ty,
            span,
            CoreKind::Fn {
                param: v,
                body: Box::new(case),
            },
        )
    }

    fn lower_arms(&mut self, arms: &[Arm]) -> Vec<CoreArm> {
        arms.iter()
            .map(|arm| {
                let vars = arm.pat.bound_vars();
                let n = vars.len();
                self.locals.extend(vars);
                let pat = self.lower_pat(&arm.pat);
                let body = self.lower_expr(&arm.body);
                self.locals.truncate(self.locals.len() - n);
                CoreArm {
                    pat,
                    guard: None,
                    body,
                }
            })
            .collect()
    }

    fn lower_let(
        &mut self,
        decls: &[Decl],
        body: &Expr,
        ty: Type,
        span: Span,
    ) -> CoreExpr {
        let locals_before = self.locals.len();
        let chain = self.lower_let_chain(decls, body, span);
        self.locals.truncate(locals_before);
        // The chain carries the body's type at each wrapper.
        let mut out = chain;
        out.ty = ty;
        out
    }

    fn lower_let_chain(&mut self, decls: &[Decl], body: &Expr, span: Span) -> CoreExpr {
        let Some((first, rest)) = decls.split_first() else {
            return self.lower_expr(body);
        };
        match &first.kind {
            DeclKind::Val {
                rec: false,
                inst: false,
                binds,
            } => {
                // Evaluate all right-hand sides before any pattern binds,
                // so `and`-siblings see the outer scope.
                let lowered_rhs: Vec<CoreExpr> =
                    binds.iter().map(|b| self.lower_expr(&b.expr)).collect();
                let temps: Vec<String> =
                    binds.iter().map(|_| self.fresh.fresh("t")).collect();
                for bind in binds {
                    self.locals.extend(bind.pat.bound_vars());
                }
                let pats: Vec<CorePat> =
                    binds.iter().map(|b| self.lower_pat(&b.pat)).collect();
                let mut out = self.lower_let_chain(rest, body, span);
                // Innermost first: match each temp against its pattern.
                for (temp, pat) in temps.iter().zip(pats).rev() {
                    let scrutinee = CoreExpr::new(
                        pat.ty.clone(),
                        span,
                        CoreKind::Var(temp.clone()),
                    );
                    out = match &pat.kind {
                        CorePatKind::Var(name) => {
                            let name = name.clone();
                            let out_ty = out.ty.clone();
                            CoreExpr::new(
                                out_ty,
                                span,
                                CoreKind::Let {
                                    name,
                                    rhs: Box::new(scrutinee),
                                    body: Box::new(out),
                                },
                            )
                        }
                        _ => {
                            let out_ty = out.ty.clone();
                            CoreExpr::new(
                                out_ty,
                                span,
                                CoreKind::Case {
                                    scrutinee: Box::new(scrutinee),
                                    arms: vec![CoreArm {
                                        pat,
                                        guard: None,
                                        body: out,
                                    }],
                                },
                            )
                        }
                    };
                }
                for (temp, rhs) in temps.into_iter().zip(lowered_rhs).rev() {
                    let out_ty = out.ty.clone();
                    out = CoreExpr::new(
                        out_ty,
                        span,
                        CoreKind::Let {
                            name: temp,
                            rhs: Box::new(rhs),
                            body: Box::new(out),
                        },
                    );
                }
                out
            }
            DeclKind::Val {
                rec: true, binds, ..
            } => {
                let names: Vec<String> = binds
                    .iter()
                    .filter_map(|b| match &b.pat.kind {
                        PatKind::Ident(n) => Some(n.clone()),
                        _ => None,
                    })
                    .collect();
                self.locals.extend(names.clone());
                let group: Vec<(String, CoreExpr)> = binds
                    .iter()
                    .zip(&names)
                    .map(|(b, n)| (n.clone(), self.lower_expr(&b.expr)))
                    .collect();
                let rest_body = self.lower_let_chain(rest, body, span);
                let ty = rest_body.ty.clone();
                CoreExpr::new(
                    ty,
                    span,
                    CoreKind::Letrec {
                        binds: group,
                        body: Box::new(rest_body),
                    },
                )
            }
            DeclKind::Fun(binds) => {
                let names: Vec<String> = binds.iter().map(|b| b.name.clone()).collect();
                self.locals.extend(names.clone());
                let group: Vec<(String, CoreExpr)> = binds
                    .iter()
                    .map(|b| (b.name.clone(), self.lower_fun_bind(b)))
                    .collect();
                let rest_body = self.lower_let_chain(rest, body, span);
                let ty = rest_body.ty.clone();
                CoreExpr::new(
                    ty,
                    span,
                    CoreKind::Letrec {
                        binds: group,
                        body: Box::new(rest_body),
                    },
                )
            }
            DeclKind::Expr(e) => {
                let rhs = self.lower_expr(e);
                let rest_body = self.lower_let_chain(rest, body, span);
                let ty = rest_body.ty.clone();
                CoreExpr::new(
                    ty,
                    span,
                    CoreKind::Let {
                        name: self.fresh.fresh("ignore"),
                        rhs: Box::new(rhs),
                        body: Box::new(rest_body),
                    },
                )
            }
            // Static declarations contribute nothing at runtime.
            _ => self.lower_let_chain(rest, body, span),
        }
    }

    fn lower_app(&mut self, f: &Expr, arg: &Expr, ty: Type, span: Span) -> CoreExpr {
        // `map f xs` / `filter p xs` over a known collection become
        // pipelines so fusion applies uniformly.
        if let Some(rewritten) = self.recognize_map_filter(f, arg, &ty, span) {
            return rewritten;
        }

        // Constructor and exception application.
        if let ExprKind::Ident(name) = &f.kind {
            if !self.locals.iter().any(|l| l == name) {
                match self.env.lookup(name) {
                    Some(Binding::Ctor(data)) => {
                        let lowered = self.lower_expr(arg);
                        return CoreExpr::new(
                            ty,
                            span,
                            CoreKind::Ctor {
                                name: name.clone(),
                                data: *data,
                                arg: Some(Box::new(lowered)),
                            },
                        );
                    }
                    Some(Binding::Exn(Some(_))) => {
                        let lowered = self.lower_expr(arg);
                        return CoreExpr::new(
                            ty,
                            span,
                            CoreKind::Exn {
                                name: name.clone(),
                                arg: Some(Box::new(lowered)),
                            },
                        );
                    }
                    _ => {}
                }
            }
        }

        let func = self.lower_expr(f);
        let lowered_arg = self.lower_expr(arg);
        CoreExpr::new(
            ty,
            span,
            CoreKind::Apply {
                func: Box::new(func),
                arg: Box::new(lowered_arg),
            },
        )
    }

    /// Recognize `map f xs` and `filter p xs` (the builtin bindings, fully
    /// applied) and lower them to equivalent pipelines.
    fn recognize_map_filter(
        &mut self,
        f: &Expr,
        xs: &Expr,
        ty: &Type,
        span: Span,
    ) -> Option<CoreExpr> {
        let ExprKind::App(inner_f, func_arg) = &f.kind else {
            return None;
        };
        let ExprKind::Ident(name) = &inner_f.kind else {
            return None;
        };
        if self.locals.iter().any(|l| l == name) {
            return None;
        }
        if name != "map" && name != "filter" {
            return None;
        }
        if !matches!(self.env.lookup(name), Some(Binding::Val(_))) {
            return None;
        }

        let elem_ty = match self.ty(xs.id) {
            Type::List(t) => (*t).clone(),
            _ => return None,
        };
        let out_elem_ty = match ty {
            Type::List(t) => (**t).clone(),
            _ => return None,
        };

        let source = self.lower_expr(xs);
        let func = self.lower_expr(func_arg);
        let v = self.fresh.fresh("v");
        let var = |t: Type, name: &str| CoreExpr::new(t, span, CoreKind::Var(name.to_string()));

        let apply_to_v = |func: CoreExpr, result_ty: Type, v: &str, elem_ty: &Type| {
            CoreExpr::new(
                result_ty,
                span,
                CoreKind::Apply {
                    func: Box::new(func),
                    arg: Box::new(CoreExpr::new(
                        elem_ty.clone(),
                        span,
                        CoreKind::Var(v.to_string()),
                    )),
                },
            )
        };

        let scan = CoreStep::Scan {
            pat: CorePat {
                ty: elem_ty.clone(),
                span,
                kind: CorePatKind::Var(v.clone()),
            },
            source: Some(source),
        };
        let steps = if name == "map" {
            vec![
                scan,
                CoreStep::Yield(apply_to_v(func, out_elem_ty.clone(), &v, &elem_ty)),
            ]
        } else {
            vec![
                scan,
                CoreStep::Where(apply_to_v(func, Type::bool(), &v, &elem_ty)),
                CoreStep::Yield(var(elem_ty.clone(), &v)),
            ]
        };

        Some(CoreExpr::new(
            ty.clone(),
            span,
            CoreKind::From(Box::new(CoreQuery {
                steps,
                elem_ty: out_elem_ty,
                ordered: true,
            })),
        ))
    }

    fn lower_binop(
        &mut self,
        op: BinOp,
        lhs: &Expr,
        rhs: &Expr,
        node: NodeId,
        ty: Type,
        span: Span,
    ) -> CoreExpr {
        match op {
            BinOp::Andalso => {
                let l = self.lower_expr(lhs);
                let r = self.lower_expr(rhs);
                mk_if(l, r, bool_lit(false, span), ty, span)
            }
            BinOp::Orelse => {
                let l = self.lower_expr(lhs);
                let r = self.lower_expr(rhs);
                mk_if(l, bool_lit(true, span), r, ty, span)
            }
            BinOp::Implies => {
                let l = self.lower_expr(lhs);
                let r = self.lower_expr(rhs);
                mk_if(l, r, bool_lit(true, span), ty, span)
            }
            _ => {
                let l = self.lower_expr(lhs);
                let r = self.lower_expr(rhs);
                let arg_ty = Type::tuple(vec![l.ty.clone(), r.ty.clone()]);
                let func = self.op_ref(op.name(), node, arg_ty.clone(), ty.clone(), span);
                let arg = CoreExpr::new(
                    arg_ty,
                    span,
                    CoreKind::Record(vec![
                        (Label::new("1"), l),
                        (Label::new("2"), r),
                    ]),
                );
                CoreExpr::new(
                    ty,
                    span,
                    CoreKind::Apply {
                        func: Box::new(func),
                        arg: Box::new(arg),
                    },
                )
            }
        }
    }

    /// A reference to an operator or overloaded function, elaborated to a
    /// specific instance when inference chose one for this node.
    fn op_ref(&self, name: &str, node: NodeId, arg_ty: Type, ret_ty: Type, span: Span) -> CoreExpr {
        let fn_ty = Type::fun(arg_ty, ret_ty);
        match self.choices.get(&node) {
            Some(index) => CoreExpr::new(
                fn_ty,
                span,
                CoreKind::VarInst(name.to_string(), *index),
            ),
            None => CoreExpr::new(fn_ty, span, CoreKind::Var(name.to_string())),
        }
    }

    fn names_a_constructor(&self, name: &str) -> bool {
        if self.locals.iter().any(|l| l == name) {
            return false;
        }
        matches!(
            self.env.lookup(name),
            Some(Binding::Ctor(_)) | Some(Binding::Exn(_))
        )
    }

    // ── Patterns ───────────────────────────────────────────────────────

    fn lower_pat(&mut self, pat: &Pat) -> CorePat {
        let ty = self.ty(pat.id);
        let span = pat.span;
        let kind = match &pat.kind {
            PatKind::Wildcard => CorePatKind::Wild,
            PatKind::Int(n) => CorePatKind::Lit(Lit::Int(n.clone())),
            PatKind::Str(s) => CorePatKind::Lit(Lit::Str(s.clone())),
            PatKind::Char(c) => CorePatKind::Lit(Lit::Char(*c)),
            PatKind::Bool(b) => CorePatKind::Lit(Lit::Bool(*b)),
            PatKind::Unit => CorePatKind::Lit(Lit::Unit),
            PatKind::Ident(name) => {
                match self.registry.lookup_ctor(name) {
                    Some((data, index))
                        if matches!(self.env.lookup(name), Some(Binding::Ctor(_)))
                            && !self.pattern_var_shadows(name) =>
                    {
                        CorePatKind::Ctor {
                            name: name.clone(),
                            data,
                            index,
                            arg: None,
                        }
                    }
                    _ => match self.env.lookup(name) {
                        Some(Binding::Exn(None)) if !self.pattern_var_shadows(name) => {
                            CorePatKind::ExnCtor {
                                name: name.clone(),
                                arg: None,
                            }
                        }
                        _ => CorePatKind::Var(name.clone()),
                    },
                }
            }
            PatKind::Ctor(name, arg) => match self.registry.lookup_ctor(name) {
                Some((data, index)) => CorePatKind::Ctor {
                    name: name.clone(),
                    data,
                    index,
                    arg: Some(Box::new(self.lower_pat(arg))),
                },
                None => CorePatKind::ExnCtor {
                    name: name.clone(),
                    arg: Some(Box::new(self.lower_pat(arg))),
                },
            },
            PatKind::Tuple(items) => {
                let pats = items
                    .iter()
                    .enumerate()
                    .map(|(i, p)| (Label::new((i + 1).to_string()), self.lower_pat(p)))
                    .collect();
                CorePatKind::Record(pats)
            }
            PatKind::Record { fields, .. } => {
                // Inference resolved the full field set; expand to a closed
                // canonical record pattern with wildcards for elided fields.
                match &ty {
                    Type::Record(type_fields) => {
                        let pats = type_fields
                            .iter()
                            .map(|(label, field_ty)| {
                                let sub = fields
                                    .iter()
                                    .find(|f| f.label == label.as_str())
                                    .map(|f| self.lower_pat(&f.pat))
                                    .unwrap_or(CorePat {
                                        ty: field_ty.clone(),
                                        span,
                                        kind: CorePatKind::Wild,
                                    });
                                (label.clone(), sub)
                            })
                            .collect();
                        CorePatKind::Record(pats)
                    }
                    _ => CorePatKind::Wild,
                }
            }
            PatKind::As(name, inner) => {
                CorePatKind::As(name.clone(), Box::new(self.lower_pat(inner)))
            }
            PatKind::Cons(h, t) => CorePatKind::Cons(
                Box::new(self.lower_pat(h)),
                Box::new(self.lower_pat(t)),
            ),
            PatKind::List(items) => {
                let mut acc = CorePat {
                    ty: ty.clone(),
                    span,
                    kind: CorePatKind::EmptyList,
                };
                for p in items.iter().rev() {
                    let head = self.lower_pat(p);
                    acc = CorePat {
                        ty: ty.clone(),
                        span,
                        kind: CorePatKind::Cons(Box::new(head), Box::new(acc)),
                    };
                }
                return acc;
            }
            PatKind::Annot(inner, _) => return self.lower_pat(inner),
        };
        CorePat { ty, span, kind }
    }

    /// Inference treats an identifier pattern as a variable when it is not
    /// a nilary constructor; mirror that here.
    fn pattern_var_shadows(&self, name: &str) -> bool {
        match self.registry.lookup_ctor(name) {
            Some((data, index)) => self.registry.get(data).ctors[index].arg.is_some(),
            None => false,
        }
    }

    // ── Pipelines ──────────────────────────────────────────────────────

    fn lower_query(&mut self, q: &Query, from_ty: &Type) -> CoreQuery {
        let locals_before = self.locals.len();
        let mut steps = Vec::new();
        for scan in &q.scans {
            steps.push(self.lower_scan(scan));
        }
        let mut ordered = true;
        for step in &q.steps {
            match &step.kind {
                StepKind::Where(e) | StepKind::Require(e) => {
                    steps.push(CoreStep::Where(self.lower_expr(e)));
                }
                StepKind::Join { scans, on } => {
                    for scan in scans {
                        steps.push(self.lower_scan(scan));
                    }
                    if let Some(on) = on {
                        steps.push(CoreStep::Where(self.lower_expr(on)));
                    }
                }
                StepKind::Yield(e) => {
                    let lowered = self.lower_expr(e);
                    // A record yield introduces its fields as bindings.
                    if let Type::Record(fields) = &lowered.ty {
                        if Type::as_tuple(fields).is_none() {
                            for (l, _) in fields {
                                self.locals.push(l.as_str().to_string());
                            }
                        }
                    }
                    steps.push(CoreStep::Yield(lowered));
                }
                StepKind::Group { keys, aggs } => {
                    let lowered_keys: Vec<(Label, CoreExpr)> = keys
                        .iter()
                        .map(|(l, e)| (Label::new(l.clone()), self.lower_expr(e)))
                        .collect();
                    let lowered_aggs: Vec<CoreAgg> =
                        aggs.iter().map(|a| self.lower_agg(a)).collect();
                    for (l, _) in &lowered_keys {
                        self.locals.push(l.as_str().to_string());
                    }
                    for a in &lowered_aggs {
                        self.locals.push(a.label.as_str().to_string());
                    }
                    steps.push(CoreStep::Group {
                        keys: lowered_keys,
                        aggs: lowered_aggs,
                    });
                }
                StepKind::Order(keys) => {
                    let lowered = keys
                        .iter()
                        .map(|k| (self.lower_expr(&k.expr), k.desc))
                        .collect();
                    steps.push(CoreStep::Order { keys: lowered });
                    ordered = true;
                }
                StepKind::Take(e) => steps.push(CoreStep::Take(self.lower_expr(e))),
                StepKind::Skip(e) => steps.push(CoreStep::Skip(self.lower_expr(e))),
                StepKind::Distinct => steps.push(CoreStep::Distinct),
                StepKind::Unorder => {
                    steps.push(CoreStep::Unorder);
                    ordered = false;
                }
                StepKind::Through { pat, func } => {
                    let f = self.lower_expr(func);
                    self.locals.extend(pat.bound_vars());
                    let p = self.lower_pat(pat);
                    steps.push(CoreStep::Through { pat: p, func: f });
                }
                StepKind::Set {
                    op,
                    distinct,
                    sources,
                } => {
                    let lowered: Vec<CoreExpr> =
                        sources.iter().map(|e| self.lower_expr(e)).collect();
                    if lowered.iter().any(|s| matches!(s.ty, Type::Bag(_))) {
                        ordered = false;
                    }
                    steps.push(match op {
                        SetOp::Union => CoreStep::Union {
                            distinct: *distinct,
                            sources: lowered,
                        },
                        SetOp::Intersect => CoreStep::Intersect {
                            distinct: *distinct,
                            sources: lowered,
                        },
                        SetOp::Except => CoreStep::Except {
                            distinct: *distinct,
                            sources: lowered,
                        },
                    });
                }
                StepKind::Compute(aggs) => {
                    let lowered = aggs.iter().map(|a| self.lower_agg(a)).collect();
                    steps.push(CoreStep::Compute(lowered));
                }
                StepKind::Into(f) => {
                    let lowered = self.lower_expr(f);
                    steps.push(CoreStep::Into(lowered));
                }
            }
        }
        self.locals.truncate(locals_before);

        let elem_ty = match from_ty {
            Type::List(t) | Type::Bag(t) => (**t).clone(),
            _ => Type::unit(),
        };
        if matches!(from_ty, Type::Bag(_)) {
            ordered = false;
        }
        CoreQuery {
            steps,
            elem_ty,
            ordered,
        }
    }

    fn lower_scan(&mut self, scan: &Scan) -> CoreStep {
        let source = match &scan.kind {
            ScanKind::Source(e) => Some(self.lower_expr(e)),
            ScanKind::Value(e) => {
                // `p = e` binds a single row.
                let lowered = self.lower_expr(e);
                Some(CoreExpr::new(
                    Type::list(lowered.ty.clone()),
                    scan.span,
                    CoreKind::MkList(vec![lowered]),
                ))
            }
            ScanKind::Unbounded => None,
        };
        self.locals.extend(scan.pat.bound_vars());
        let pat = self.lower_pat(&scan.pat);
        CoreStep::Scan { pat, source }
    }

    fn lower_agg(&mut self, agg: &rill_parser::ast::Agg) -> CoreAgg {
        let func = match &agg.func.kind {
            ExprKind::Ident(name) => {
                let func_ty = self.ty(agg.func.id);
                self.op_ref(name, agg.func.id, Type::unit(), Type::unit(), agg.func.span)
                    .with_ty(func_ty)
            }
            _ => self.lower_expr(&agg.func),
        };
        CoreAgg {
            label: Label::new(agg.label.clone()),
            func,
            arg: agg.arg.as_ref().map(|e| self.lower_expr(e)),
        }
    }
}

impl CoreExpr {
    fn with_ty(mut self, ty: Type) -> CoreExpr {
        self.ty = ty;
        self
    }
}

fn bool_lit(b: bool, span: Span) -> CoreExpr {
    CoreExpr::new(Type::bool(), span, CoreKind::Lit(Lit::Bool(b)))
}

fn bool_pat(b: bool, span: Span) -> CorePat {
    CorePat {
        ty: Type::bool(),
        span,
        kind: CorePatKind::Lit(Lit::Bool(b)),
    }
}

/// `if c then t else e` as a two-armed case.
fn mk_if(cond: CoreExpr, then_branch: CoreExpr, else_branch: CoreExpr, ty: Type, span: Span) -> CoreExpr {
    CoreExpr::new(
        ty,
        span,
        CoreKind::Case {
            scrutinee: Box::new(cond),
            arms: vec![
                CoreArm {
                    pat: bool_pat(true, span),
                    guard: None,
                    body: then_branch,
                },
                CoreArm {
                    pat: bool_pat(false, span),
                    guard: None,
                    body: else_branch,
                },
            ],
        },
    )
}

fn tuple_pat(pats: Vec<CorePat>, span: Span) -> CorePat {
    let ty = Type::tuple(pats.iter().map(|p| p.ty.clone()).collect());
    let fields = pats
        .into_iter()
        .enumerate()
        .map(|(i, p)| (Label::new((i + 1).to_string()), p))
        .collect();
    CorePat {
        ty,
        span,
        kind: CorePatKind::Record(fields),
    }
}
