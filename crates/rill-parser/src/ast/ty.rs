//! Surface type expressions, as written in annotations and declarations.

use rill_common::span::Span;

/// A type expression with position.
#[derive(Debug, Clone)]
pub struct TyExpr {
    pub span: Span,
    pub kind: TyExprKind,
}

/// Every surface type form. Primitive names (`int`, `bool`, ...) and user
/// datatypes both arrive as [`TyExprKind::Con`]; resolution happens in the
/// type checker.
#[derive(Debug, Clone)]
pub enum TyExprKind {
    /// A type variable, e.g. `'a`. The name excludes the leading quote.
    Var(String),
    /// A (possibly applied) type constructor: `int`, `int list`,
    /// `(int, string) pair`.
    Con(String, Vec<TyExpr>),
    /// Function type `t -> t`.
    Fn(Box<TyExpr>, Box<TyExpr>),
    /// Product type `t * t * t`.
    Tuple(Vec<TyExpr>),
    /// Record type `{a: int, b: string}`.
    Record(Vec<(String, TyExpr)>),
    /// Unit `()` written as a type.
    Unit,
}
