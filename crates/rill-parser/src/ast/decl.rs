//! Declaration nodes of the surface AST.

use rill_common::span::Span;

use super::expr::Expr;
use super::pat::Pat;
use super::ty::TyExpr;

/// A top-level or `let`-local declaration.
#[derive(Debug, Clone)]
pub struct Decl {
    pub span: Span,
    pub kind: DeclKind,
}

/// Every declaration form.
#[derive(Debug, Clone)]
pub enum DeclKind {
    /// `val [rec] p = e [and p = e ...]`, and `val inst x = e` for overload
    /// instances.
    Val {
        rec: bool,
        inst: bool,
        binds: Vec<ValBind>,
    },
    /// `fun f p = e [| f p = e ...] [and g ...]`.
    Fun(Vec<FunBind>),
    /// `datatype 'a t = A | B of ty [and ...]`.
    Datatype(Vec<DatatypeBind>),
    /// `type [tyvars] name = ty`.
    TypeAlias {
        params: Vec<String>,
        name: String,
        ty: TyExpr,
    },
    /// `over name` -- declares an overload group.
    Over(String),
    /// `exception E [of ty]`.
    Exception {
        name: String,
        arg: Option<TyExpr>,
    },
    /// `signature S = sig val x : ty ... end`.
    Signature {
        name: String,
        specs: Vec<SigSpec>,
    },
    /// A bare expression; the REPL binds its value to `it`.
    Expr(Expr),
}

/// One `val` binding.
#[derive(Debug, Clone)]
pub struct ValBind {
    pub pat: Pat,
    pub expr: Expr,
    pub span: Span,
}

/// One function bound by `fun`, with one or more clauses.
#[derive(Debug, Clone)]
pub struct FunBind {
    pub name: String,
    pub clauses: Vec<FunClause>,
    pub span: Span,
}

/// One clause of a `fun` binding: curried argument patterns, an optional
/// result annotation, and the body.
#[derive(Debug, Clone)]
pub struct FunClause {
    pub pats: Vec<Pat>,
    pub ret_ty: Option<TyExpr>,
    pub body: Expr,
    pub span: Span,
}

/// One datatype bound by `datatype`, possibly in a mutually recursive group.
#[derive(Debug, Clone)]
pub struct DatatypeBind {
    pub params: Vec<String>,
    pub name: String,
    pub ctors: Vec<ConBind>,
    pub span: Span,
}

/// One constructor of a datatype: a name and an optional argument type.
#[derive(Debug, Clone)]
pub struct ConBind {
    pub name: String,
    pub arg: Option<TyExpr>,
    pub span: Span,
}

/// One value description inside a signature.
#[derive(Debug, Clone)]
pub struct SigSpec {
    pub name: String,
    pub ty: TyExpr,
    pub span: Span,
}
