//! Relational pipeline nodes: the head scans and ordered steps shared by
//! `from`, `exists`, and `forall`.

use rill_common::span::Span;

use super::expr::Expr;
use super::pat::Pat;

/// A parsed pipeline: one or more head scans followed by ordered steps.
#[derive(Debug, Clone)]
pub struct Query {
    pub scans: Vec<Scan>,
    pub steps: Vec<Step>,
    pub span: Span,
}

/// One scan of the pipeline head (or of a `join` step).
#[derive(Debug, Clone)]
pub struct Scan {
    pub pat: Pat,
    pub kind: ScanKind,
    pub span: Span,
}

/// The three scan forms of the head grammar.
#[derive(Debug, Clone)]
pub enum ScanKind {
    /// `p in e` -- iterate over a collection.
    Source(Expr),
    /// `p = e` -- bind a single value.
    Value(Expr),
    /// Bare `v` -- an unconstrained variable whose extent the normalizer
    /// must solve.
    Unbounded,
}

/// A pipeline step with position.
#[derive(Debug, Clone)]
pub struct Step {
    pub kind: StepKind,
    pub span: Span,
}

/// Every pipeline step form.
#[derive(Debug, Clone)]
pub enum StepKind {
    /// `where e`
    Where(Expr),
    /// `join scans [on e]`
    Join {
        scans: Vec<Scan>,
        on: Option<Expr>,
    },
    /// `group keys [compute aggs]`
    Group {
        keys: Vec<(String, Expr)>,
        aggs: Vec<Agg>,
    },
    /// `order keys`
    Order(Vec<OrderKey>),
    /// `take e`
    Take(Expr),
    /// `skip e`
    Skip(Expr),
    /// `distinct`
    Distinct,
    /// `unorder`
    Unorder,
    /// `yield e`
    Yield(Expr),
    /// `through p in f`
    Through { pat: Pat, func: Expr },
    /// Terminal `compute aggs`.
    Compute(Vec<Agg>),
    /// Terminal `into f`.
    Into(Expr),
    /// `require e` -- the terminal step of `forall`.
    Require(Expr),
    /// `union` / `intersect` / `except`, with the other source collections.
    Set {
        op: SetOp,
        distinct: bool,
        sources: Vec<Expr>,
    },
}

/// The three multiset operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SetOp {
    Union,
    Intersect,
    Except,
}

/// One aggregate item: `[label =] f (of | over) arg`, or a bare aggregate
/// function such as `count`. The label defaults to the function's name.
#[derive(Debug, Clone)]
pub struct Agg {
    pub label: String,
    pub func: Expr,
    pub arg: Option<Expr>,
    pub span: Span,
}

/// One ordering key with per-key direction.
#[derive(Debug, Clone)]
pub struct OrderKey {
    pub expr: Expr,
    pub desc: bool,
}
