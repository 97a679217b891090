//! Expression nodes of the surface AST.

use num_bigint::BigInt;
use rill_common::span::Span;

use super::NodeId;
use super::pat::Pat;
use super::query::Query;
use super::ty::TyExpr;

/// An expression with identity and position.
#[derive(Debug, Clone)]
pub struct Expr {
    pub id: NodeId,
    pub span: Span,
    pub kind: ExprKind,
}

/// Every surface expression form.
#[derive(Debug, Clone)]
pub enum ExprKind {
    /// Integer literal (arbitrary precision, sign already applied).
    Int(BigInt),
    /// Real literal.
    Real(f64),
    /// String literal, escapes resolved.
    Str(String),
    /// Character literal.
    Char(char),
    /// Boolean literal.
    Bool(bool),
    /// Unit `()`.
    Unit,
    /// Identifier reference.
    Ident(String),
    /// Tuple `(a, b, c)` of two or more elements.
    Tuple(Vec<Expr>),
    /// List literal `[a, b, c]`.
    List(Vec<Expr>),
    /// Record literal with labels resolved from the sugar forms.
    Record(Vec<Field>),
    /// Field access `e.f`.
    Select(Box<Expr>, String),
    /// Field selector `#f` as a first-class function.
    Selector(String),
    /// `if c then t else e`.
    If(Box<Expr>, Box<Expr>, Box<Expr>),
    /// `case e of p => e | ...`.
    Case(Box<Expr>, Vec<Arm>),
    /// `let decls in body end`.
    Let(Vec<super::decl::Decl>, Box<Expr>),
    /// `fn p => e | ...`.
    Fn(Vec<Arm>),
    /// Application `f x`.
    App(Box<Expr>, Box<Expr>),
    /// Infix operator application.
    Binop(BinOp, Box<Expr>, Box<Expr>),
    /// Unary negation `~e`.
    Negate(Box<Expr>),
    /// Type-annotated expression `e : ty`.
    Annot(Box<Expr>, TyExpr),
    /// A `from` pipeline.
    From(Box<Query>),
    /// `exists` quantifier over a pipeline.
    Exists(Box<Query>),
    /// `forall ... require c` quantifier over a pipeline.
    Forall(Box<Query>),
    /// `raise e`.
    Raise(Box<Expr>),
    /// `e handle p => e | ...`.
    Handle(Box<Expr>, Vec<Arm>),
}

/// One resolved record field: `label = expr`.
#[derive(Debug, Clone)]
pub struct Field {
    pub label: String,
    pub expr: Expr,
    pub span: Span,
}

/// One arm of a `case`, `fn`, or `handle` match.
#[derive(Debug, Clone)]
pub struct Arm {
    pub pat: Pat,
    pub body: Expr,
    pub span: Span,
}

/// Infix operators, in source form. Arithmetic and comparison operators
/// resolve to overload instances during inference.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinOp {
    Andalso,
    Orelse,
    Implies,
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
    Elem,
    NotElem,
    Cons,
    Append,
    Plus,
    Minus,
    Caret,
    Times,
    Divide,
    Div,
    Mod,
    Compose,
}

impl BinOp {
    /// Source text of the operator, used in diagnostics and for looking up
    /// the operator's binding in the environment.
    pub fn name(self) -> &'static str {
        match self {
            BinOp::Andalso => "andalso",
            BinOp::Orelse => "orelse",
            BinOp::Implies => "implies",
            BinOp::Eq => "=",
            BinOp::Ne => "<>",
            BinOp::Lt => "<",
            BinOp::Le => "<=",
            BinOp::Gt => ">",
            BinOp::Ge => ">=",
            BinOp::Elem => "elem",
            BinOp::NotElem => "notelem",
            BinOp::Cons => "::",
            BinOp::Append => "@",
            BinOp::Plus => "+",
            BinOp::Minus => "-",
            BinOp::Caret => "^",
            BinOp::Times => "*",
            BinOp::Divide => "/",
            BinOp::Div => "div",
            BinOp::Mod => "mod",
            BinOp::Compose => "o",
        }
    }
}
