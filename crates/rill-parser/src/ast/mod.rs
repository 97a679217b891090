//! The Rill surface AST.
//!
//! An owned tree, one variant per syntactic category, with a [`Span`] on
//! every node. Expressions and patterns additionally carry a [`NodeId`] so
//! the type inferencer can record a type for each node without rebuilding
//! the tree.

pub mod decl;
pub mod expr;
pub mod pat;
pub mod query;
pub mod ty;

pub use decl::{ConBind, Decl, DeclKind, DatatypeBind, FunBind, FunClause, SigSpec, ValBind};
pub use expr::{Arm, BinOp, Expr, ExprKind, Field};
pub use pat::{Pat, PatKind, RecordFieldPat};
pub use query::{Agg, OrderKey, Query, Scan, ScanKind, SetOp, Step, StepKind};
pub use ty::{TyExpr, TyExprKind};

use serde::Serialize;

/// Identity of an expression or pattern node, assigned by the parser.
///
/// The inferencer populates a `NodeId -> Type` table; the lowerer reads it.
/// Ids are dense and unique within one parse unit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub struct NodeId(pub u32);
