//! Rill type checker: Hindley-Milner inference with let-polymorphism,
//! user datatypes, flex records, bounded ad-hoc overloading, relational
//! pipeline typing, and match coverage analysis.

pub mod builtins;
pub mod diagnostics;
pub mod env;
pub mod error;
pub mod exhaustiveness;
pub mod infer;
pub mod print;
pub mod ty;
pub mod unify;

pub use env::{Binding, TypeEnv};
pub use error::{ConstraintOrigin, TypeError};
pub use infer::{check_decl, initial_env, is_syntactic_value, TypeckOptions, TypeckResult};
pub use print::{type_text, TypePrinter};
pub use ty::{CtorDef, DataId, DatatypeDef, Label, Prim, Scheme, Type, TypeRegistry, TyVar};
pub use unify::InferCtx;
