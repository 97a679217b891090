//! The typed core calculus.
//!
//! A smaller language than the surface AST: single-argument functions,
//! single-binding lets, letrec groups, case, canonicalized relational
//! pipelines, and opaque backend plans. Every node carries the type the
//! inferencer assigned to the corresponding surface node, plus a source
//! position for runtime diagnostics.

use num_bigint::BigInt;
use rill_common::span::Span;
use rill_typeck::{DataId, Label, Type};
use rustc_hash::FxHashSet;

use crate::pattern::DecisionTree;
use crate::pushdown::BackendPlan;

/// A literal value shared by core expressions and core patterns.
#[derive(Clone, Debug, PartialEq)]
pub enum Lit {
    Int(BigInt),
    Real(f64),
    Str(String),
    Char(char),
    Bool(bool),
    Unit,
}

/// A typed core expression.
#[derive(Clone, Debug)]
pub struct CoreExpr {
    pub ty: Type,
    pub span: Span,
    pub kind: CoreKind,
}

impl CoreExpr {
    pub fn new(ty: Type, span: Span, kind: CoreKind) -> Self {
        CoreExpr { ty, span, kind }
    }
}

/// Every core expression form.
#[derive(Clone, Debug)]
pub enum CoreKind {
    Lit(Lit),
    /// A variable reference.
    Var(String),
    /// A reference to one instance of an overload group, selected by the
    /// inferencer.
    VarInst(String, usize),
    /// Record construction (tuples are records with numeric labels).
    /// Fields are in canonical label order; evaluation order is the order
    /// given here, which lowering keeps as written in the source.
    Record(Vec<(Label, CoreExpr)>),
    /// Field selection.
    Select(Box<CoreExpr>, Label),
    /// Datatype constructor application (or a nilary constructor value).
    Ctor {
        name: String,
        data: DataId,
        arg: Option<Box<CoreExpr>>,
    },
    /// Exception constructor application.
    Exn {
        name: String,
        arg: Option<Box<CoreExpr>>,
    },
    /// List literal.
    MkList(Vec<CoreExpr>),
    /// Single-argument function.
    Fn { param: String, body: Box<CoreExpr> },
    Apply {
        func: Box<CoreExpr>,
        arg: Box<CoreExpr>,
    },
    /// Non-recursive single binding.
    Let {
        name: String,
        rhs: Box<CoreExpr>,
        body: Box<CoreExpr>,
    },
    /// Mutually recursive function bindings.
    Letrec {
        binds: Vec<(String, CoreExpr)>,
        body: Box<CoreExpr>,
    },
    Case {
        scrutinee: Box<CoreExpr>,
        arms: Vec<CoreArm>,
    },
    /// A case whose clause matrix has been compiled to a decision tree.
    /// The arms are retained for their guards and bodies; the tree's
    /// leaves index into them.
    CompiledCase {
        scrutinee: Box<CoreExpr>,
        tree: DecisionTree,
        arms: Vec<CoreArm>,
    },
    From(Box<CoreQuery>),
    Raise(Box<CoreExpr>),
    Handle {
        body: Box<CoreExpr>,
        arms: Vec<CoreArm>,
    },
    /// An opaque plan delegated to the relational backend.
    Backend(BackendPlan),
}

/// One arm of a core `case` or `handle`.
#[derive(Clone, Debug)]
pub struct CoreArm {
    pub pat: CorePat,
    pub guard: Option<CoreExpr>,
    pub body: CoreExpr,
}

/// A typed core pattern.
#[derive(Clone, Debug)]
pub struct CorePat {
    pub ty: Type,
    pub span: Span,
    pub kind: CorePatKind,
}

#[derive(Clone, Debug)]
pub enum CorePatKind {
    Wild,
    Var(String),
    Lit(Lit),
    Ctor {
        name: String,
        data: DataId,
        index: usize,
        arg: Option<Box<CorePat>>,
    },
    ExnCtor {
        name: String,
        arg: Option<Box<CorePat>>,
    },
    /// Closed record pattern in canonical field order (flex records are
    /// resolved by inference before lowering).
    Record(Vec<(Label, CorePat)>),
    Cons(Box<CorePat>, Box<CorePat>),
    EmptyList,
    As(String, Box<CorePat>),
}

impl CorePat {
    /// Variable names bound by this pattern.
    pub fn bound_vars(&self) -> Vec<String> {
        let mut out = Vec::new();
        self.collect_vars(&mut out);
        out
    }

    fn collect_vars(&self, out: &mut Vec<String>) {
        match &self.kind {
            CorePatKind::Var(name) => out.push(name.clone()),
            CorePatKind::Ctor { arg, .. } | CorePatKind::ExnCtor { arg, .. } => {
                if let Some(p) = arg {
                    p.collect_vars(out);
                }
            }
            CorePatKind::Record(fields) => {
                for (_, p) in fields {
                    p.collect_vars(out);
                }
            }
            CorePatKind::Cons(h, t) => {
                h.collect_vars(out);
                t.collect_vars(out);
            }
            CorePatKind::As(name, inner) => {
                out.push(name.clone());
                inner.collect_vars(out);
            }
            CorePatKind::Wild | CorePatKind::Lit(_) | CorePatKind::EmptyList => {}
        }
    }
}

// ── Relational pipelines ───────────────────────────────────────────────

/// A canonicalized pipeline: an ordered step vector ending in an explicit
/// `Yield` (lowering inserts one when the source leaves the row implicit),
/// optionally followed by a terminal `Compute` or `Into`.
#[derive(Clone, Debug)]
pub struct CoreQuery {
    pub steps: Vec<CoreStep>,
    /// Element type of the produced collection (meaningless under a
    /// terminal `Compute`/`Into`, which replace the collection).
    pub elem_ty: Type,
    /// Whether the pipeline is ordered at its end.
    pub ordered: bool,
}

#[derive(Clone, Debug)]
pub enum CoreStep {
    /// A scan; `source: None` is an unconstrained scan the extent solver
    /// must supply before evaluation.
    Scan {
        pat: CorePat,
        source: Option<CoreExpr>,
    },
    Where(CoreExpr),
    Yield(CoreExpr),
    Group {
        keys: Vec<(Label, CoreExpr)>,
        aggs: Vec<CoreAgg>,
    },
    Order {
        keys: Vec<(CoreExpr, bool)>,
    },
    Take(CoreExpr),
    Skip(CoreExpr),
    Distinct,
    Unorder,
    Union {
        distinct: bool,
        sources: Vec<CoreExpr>,
    },
    Intersect {
        distinct: bool,
        sources: Vec<CoreExpr>,
    },
    Except {
        distinct: bool,
        sources: Vec<CoreExpr>,
    },
    Through {
        pat: CorePat,
        func: CoreExpr,
    },
    Compute(Vec<CoreAgg>),
    Into(CoreExpr),
}

/// One aggregate application: the function receives the collection of the
/// argument expression's values (or of whole rows when `arg` is `None`).
#[derive(Clone, Debug)]
pub struct CoreAgg {
    pub label: Label,
    pub func: CoreExpr,
    pub arg: Option<CoreExpr>,
}

// ── Declarations ───────────────────────────────────────────────────────

/// A lowered top-level declaration, ready for normalization + evaluation.
#[derive(Clone, Debug)]
pub enum CoreDecl {
    /// `val` bindings (including the anonymous `it` binding).
    Vals(Vec<CoreValBind>),
    /// A recursive group (`val rec` / `fun`).
    Rec(Vec<(String, CoreExpr)>),
    /// `val inst x = e`: append an instance to the overload group value.
    Instance { name: String, rhs: CoreExpr },
    /// `exception E [of ty]`: register the exception constructor.
    Exception { name: String, has_arg: bool },
    /// Purely static declarations (datatype, type, over, signature).
    Static,
}

/// One `val` binding.
#[derive(Clone, Debug)]
pub struct CoreValBind {
    pub pat: CorePat,
    pub rhs: CoreExpr,
}

// ── Free variables ─────────────────────────────────────────────────────

impl CoreExpr {
    /// Free variable names of the expression.
    pub fn free_vars(&self) -> FxHashSet<String> {
        let mut free = FxHashSet::default();
        let mut bound = Vec::new();
        self.collect_free(&mut bound, &mut free);
        free
    }

    fn collect_free(&self, bound: &mut Vec<String>, free: &mut FxHashSet<String>) {
        match &self.kind {
            CoreKind::Var(name) | CoreKind::VarInst(name, _) => {
                if !bound.iter().any(|b| b == name) {
                    free.insert(name.clone());
                }
            }
            CoreKind::Lit(_) => {}
            CoreKind::Record(fields) => {
                for (_, e) in fields {
                    e.collect_free(bound, free);
                }
            }
            CoreKind::Select(e, _) => e.collect_free(bound, free),
            CoreKind::Ctor { arg, .. } | CoreKind::Exn { arg, .. } => {
                if let Some(e) = arg {
                    e.collect_free(bound, free);
                }
            }
            CoreKind::MkList(items) => {
                for e in items {
                    e.collect_free(bound, free);
                }
            }
            CoreKind::Fn { param, body } => {
                bound.push(param.clone());
                body.collect_free(bound, free);
                bound.pop();
            }
            CoreKind::Apply { func, arg } => {
                func.collect_free(bound, free);
                arg.collect_free(bound, free);
            }
            CoreKind::Let { name, rhs, body } => {
                rhs.collect_free(bound, free);
                bound.push(name.clone());
                body.collect_free(bound, free);
                bound.pop();
            }
            CoreKind::Letrec { binds, body } => {
                for (name, _) in binds {
                    bound.push(name.clone());
                }
                for (_, rhs) in binds {
                    rhs.collect_free(bound, free);
                }
                body.collect_free(bound, free);
                for _ in binds {
                    bound.pop();
                }
            }
            CoreKind::Case { scrutinee, arms }
            | CoreKind::CompiledCase {
                scrutinee, arms, ..
            } => {
                scrutinee.collect_free(bound, free);
                for arm in arms {
                    let vars = arm.pat.bound_vars();
                    let n = vars.len();
                    bound.extend(vars);
                    if let Some(g) = &arm.guard {
                        g.collect_free(bound, free);
                    }
                    arm.body.collect_free(bound, free);
                    bound.truncate(bound.len() - n);
                }
            }
            CoreKind::From(query) => {
                let mut scope = 0usize;
                for step in &query.steps {
                    match step {
                        CoreStep::Scan { pat, source } => {
                            if let Some(src) = source {
                                src.collect_free(bound, free);
                            }
                            let vars = pat.bound_vars();
                            scope += vars.len();
                            bound.extend(vars);
                        }
                        CoreStep::Where(e) | CoreStep::Yield(e) | CoreStep::Take(e)
                        | CoreStep::Skip(e) | CoreStep::Into(e) => {
                            e.collect_free(bound, free);
                        }
                        CoreStep::Group { keys, aggs } => {
                            for (_, e) in keys {
                                e.collect_free(bound, free);
                            }
                            for agg in aggs {
                                agg.func.collect_free(bound, free);
                                if let Some(a) = &agg.arg {
                                    a.collect_free(bound, free);
                                }
                            }
                            // Grouping rebinds the row to key + aggregate
                            // names; approximate by keeping prior binders.
                            let labels: Vec<String> = keys
                                .iter()
                                .map(|(l, _)| l.as_str().to_string())
                                .chain(aggs.iter().map(|a| a.label.as_str().to_string()))
                                .collect();
                            scope += labels.len();
                            bound.extend(labels);
                        }
                        CoreStep::Order { keys } => {
                            for (e, _) in keys {
                                e.collect_free(bound, free);
                            }
                        }
                        CoreStep::Union { sources, .. }
                        | CoreStep::Intersect { sources, .. }
                        | CoreStep::Except { sources, .. } => {
                            for e in sources {
                                e.collect_free(bound, free);
                            }
                        }
                        CoreStep::Through { pat, func } => {
                            func.collect_free(bound, free);
                            let vars = pat.bound_vars();
                            scope += vars.len();
                            bound.extend(vars);
                        }
                        CoreStep::Compute(aggs) => {
                            for agg in aggs {
                                agg.func.collect_free(bound, free);
                                if let Some(a) = &agg.arg {
                                    a.collect_free(bound, free);
                                }
                            }
                        }
                        CoreStep::Distinct | CoreStep::Unorder => {}
                    }
                }
                bound.truncate(bound.len() - scope);
            }
            CoreKind::Raise(e) => e.collect_free(bound, free),
            CoreKind::Handle { body, arms } => {
                body.collect_free(bound, free);
                for arm in arms {
                    let vars = arm.pat.bound_vars();
                    let n = vars.len();
                    bound.extend(vars);
                    if let Some(g) = &arm.guard {
                        g.collect_free(bound, free);
                    }
                    arm.body.collect_free(bound, free);
                    bound.truncate(bound.len() - n);
                }
            }
            CoreKind::Backend(plan) => {
                for free_var in &plan.free_vars {
                    if !bound.iter().any(|b| b == &free_var.name) {
                        free.insert(free_var.name.clone());
                    }
                }
            }
        }
    }
}

// ── Row shape ──────────────────────────────────────────────────────────

/// The statically known shape of a pipeline's current row: what the
/// evaluator materializes when the pipeline ends without an explicit
/// `yield`, and what fusion materializes before it splices pipelines.
#[derive(Clone, Debug, PartialEq)]
pub enum RowShape {
    /// No bindings: one `()` row.
    Unit,
    /// A single scan binding: the row is the bound value itself.
    Scalar(String, Type),
    /// Multiple bindings, or a `group`/record-`yield` row: a record in
    /// canonical label order.
    Record(Vec<(String, Type)>),
    /// A non-record `yield` already produced the row value.
    Anon(Type),
}

impl RowShape {
    /// The row's element type.
    pub fn row_type(&self) -> Type {
        match self {
            RowShape::Unit => Type::unit(),
            RowShape::Scalar(_, t) => t.clone(),
            RowShape::Record(fields) => Type::record(
                fields
                    .iter()
                    .map(|(n, t)| (Label::new(n.clone()), t.clone()))
                    .collect(),
            ),
            RowShape::Anon(t) => t.clone(),
        }
    }
}

/// Compute the row shape after the given steps.
pub fn row_shape(steps: &[CoreStep]) -> RowShape {
    let mut names: Vec<(String, Type)> = Vec::new();
    let mut force_record = false;
    let mut anon: Option<Type> = None;

    for step in steps {
        match step {
            CoreStep::Scan { pat, .. } => {
                collect_pat_bindings(pat, &mut names);
                anon = None;
            }
            CoreStep::Group { keys, aggs } => {
                names = keys
                    .iter()
                    .map(|(l, e)| (l.as_str().to_string(), e.ty.clone()))
                    .chain(aggs.iter().map(|a| {
                        let ret = match &a.func.ty {
                            Type::Fn(_, r) => (**r).clone(),
                            _ => Type::unit(),
                        };
                        (a.label.as_str().to_string(), ret)
                    }))
                    .collect();
                force_record = true;
                anon = None;
            }
            CoreStep::Yield(e) => match &e.ty {
                Type::Record(fields) if Type::as_tuple(fields).is_none() => {
                    names = fields
                        .iter()
                        .map(|(l, t)| (l.as_str().to_string(), t.clone()))
                        .collect();
                    force_record = true;
                    anon = None;
                }
                _ => {
                    names.clear();
                    force_record = false;
                    anon = Some(e.ty.clone());
                }
            },
            CoreStep::Through { pat, .. } => {
                names.clear();
                force_record = false;
                collect_pat_bindings(pat, &mut names);
                anon = if names.is_empty() {
                    Some(pat.ty.clone())
                } else {
                    None
                };
            }
            _ => {}
        }
    }

    if let Some(t) = anon {
        return RowShape::Anon(t);
    }
    match names.len() {
        0 => RowShape::Unit,
        1 if !force_record => {
            let (n, t) = names.into_iter().next().expect("one binding");
            RowShape::Scalar(n, t)
        }
        _ => {
            names.sort_by(|a, b| Label::new(a.0.clone()).cmp(&Label::new(b.0.clone())));
            RowShape::Record(names)
        }
    }
}

fn collect_pat_bindings(pat: &CorePat, out: &mut Vec<(String, Type)>) {
    match &pat.kind {
        CorePatKind::Var(name) => out.push((name.clone(), pat.ty.clone())),
        CorePatKind::As(name, inner) => {
            out.push((name.clone(), pat.ty.clone()));
            collect_pat_bindings(inner, out);
        }
        CorePatKind::Ctor { arg, .. } | CorePatKind::ExnCtor { arg, .. } => {
            if let Some(p) = arg {
                collect_pat_bindings(p, out);
            }
        }
        CorePatKind::Record(fields) => {
            for (_, p) in fields {
                collect_pat_bindings(p, out);
            }
        }
        CorePatKind::Cons(h, t) => {
            collect_pat_bindings(h, out);
            collect_pat_bindings(t, out);
        }
        CorePatKind::Wild | CorePatKind::Lit(_) | CorePatKind::EmptyList => {}
    }
}

/// Fresh-name supply for a compile unit. Lowering and normalization share
/// one counter so generated names never collide.
#[derive(Debug, Default)]
pub struct FreshGen {
    next: u32,
}

impl FreshGen {
    pub fn new() -> Self {
        FreshGen { next: 0 }
    }

    /// A fresh name with the given hint. Generated names contain `#`,
    /// which no source identifier can.
    pub fn fresh(&mut self, hint: &str) -> String {
        let n = self.next;
        self.next += 1;
        format!("{hint}#{n}")
    }
}
