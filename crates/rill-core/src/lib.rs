//! Rill core: the typed core calculus, the lowering from the typed
//! surface AST, and the normalizer (inlining, query fusion, extent
//! solving, backend push-down, pattern compilation).

pub mod lower;
pub mod normalize;
pub mod pattern;
pub mod pushdown;
pub mod term;

pub use lower::{lower_decl, EMPTY, NON_EMPTY};
pub use normalize::{normalize, normalize_decl, NormalizeOptions};
pub use pattern::{AccessPath, DecisionTree, TestCtor};
pub use pushdown::{BackendPlan, FreeVarRef, Plan, PushdownOptions, Scalar, TypeDesc};
pub use term::{
    row_shape, CoreAgg, CoreArm, CoreDecl, CoreExpr, CoreKind, CorePat, CorePatKind,
    CoreQuery, CoreStep, CoreValBind, FreshGen, Lit, RowShape,
};
