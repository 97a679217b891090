//! Pattern nodes of the surface AST.

use num_bigint::BigInt;
use rill_common::span::Span;

use super::NodeId;

/// A pattern with identity and position.
#[derive(Debug, Clone)]
pub struct Pat {
    pub id: NodeId,
    pub span: Span,
    pub kind: PatKind,
}

/// Every surface pattern form.
#[derive(Debug, Clone)]
pub enum PatKind {
    /// `_`
    Wildcard,
    /// Integer literal pattern.
    Int(BigInt),
    /// String literal pattern.
    Str(String),
    /// Character literal pattern.
    Char(char),
    /// Boolean literal pattern.
    Bool(bool),
    /// Unit `()`.
    Unit,
    /// Variable binding, or a nilary constructor once resolved.
    Ident(String),
    /// Constructor application `C p`.
    Ctor(String, Box<Pat>),
    /// Tuple pattern.
    Tuple(Vec<Pat>),
    /// Record pattern; `flex` is true when `...` closes the field list.
    Record {
        fields: Vec<RecordFieldPat>,
        flex: bool,
    },
    /// Layered pattern `v as p`.
    As(String, Box<Pat>),
    /// Cons pattern `p :: p`.
    Cons(Box<Pat>, Box<Pat>),
    /// List pattern `[p, p]`.
    List(Vec<Pat>),
    /// Type-annotated pattern `p : ty`.
    Annot(Box<Pat>, super::ty::TyExpr),
}

/// One field of a record pattern: `label = pat`, with `{a}` short for
/// `{a = a}`.
#[derive(Debug, Clone)]
pub struct RecordFieldPat {
    pub label: String,
    pub pat: Pat,
    pub span: Span,
}

impl Pat {
    /// The variable names bound by this pattern, in left-to-right order.
    pub fn bound_vars(&self) -> Vec<String> {
        let mut out = Vec::new();
        self.collect_vars(&mut out);
        out
    }

    fn collect_vars(&self, out: &mut Vec<String>) {
        match &self.kind {
            PatKind::Ident(name) => out.push(name.clone()),
            PatKind::Ctor(_, arg) => arg.collect_vars(out),
            PatKind::Tuple(items) | PatKind::List(items) => {
                for p in items {
                    p.collect_vars(out);
                }
            }
            PatKind::Record { fields, .. } => {
                for f in fields {
                    f.pat.collect_vars(out);
                }
            }
            PatKind::As(name, inner) => {
                out.push(name.clone());
                inner.collect_vars(out);
            }
            PatKind::Cons(head, tail) => {
                head.collect_vars(out);
                tail.collect_vars(out);
            }
            PatKind::Annot(inner, _) => inner.collect_vars(out),
            PatKind::Wildcard
            | PatKind::Int(_)
            | PatKind::Str(_)
            | PatKind::Char(_)
            | PatKind::Bool(_)
            | PatKind::Unit => {}
        }
    }
}
