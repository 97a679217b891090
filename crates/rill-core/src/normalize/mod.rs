//! The core normalizer: inlining and dead-binding elimination, query
//! fusion, extent solving, backend push-down, and pattern compilation.
//!
//! Every pass is semantics-preserving; the evaluator relies on the extent
//! solver having supplied a source for every scan.

pub mod extent;
pub mod fuse;
pub mod inline;

use rill_common::diag::Diagnostic;
use rill_typeck::TypeRegistry;
use rustc_hash::FxHashSet;

use crate::pattern::compile_match;
use crate::pushdown::{push_down, PushdownOptions};
use crate::term::{CoreDecl, CoreExpr, CoreKind, CoreValBind, FreshGen};

use inline::map_children;

/// Normalizer configuration.
#[derive(Clone, Debug)]
pub struct NormalizeOptions {
    /// Upper bound on inline/fuse iterations; 0 disables inlining.
    pub inline_pass_count: u32,
    /// Whether a pipeline may span the evaluator/backend boundary.
    pub hybrid: bool,
    /// Names bound to external backend tables.
    pub external_tables: FxHashSet<String>,
}

impl Default for NormalizeOptions {
    fn default() -> Self {
        NormalizeOptions {
            inline_pass_count: 10,
            hybrid: false,
            external_tables: FxHashSet::default(),
        }
    }
}

/// Normalize one expression.
pub fn normalize(
    expr: CoreExpr,
    opts: &NormalizeOptions,
    registry: &TypeRegistry,
    fresh: &mut FreshGen,
) -> Result<CoreExpr, Diagnostic> {
    let mut e = expr;

    // Inline and fuse to a fixed point, bounded by the pass count so
    // pathological inputs cannot blow up.
    for _ in 0..opts.inline_pass_count {
        let (e1, inlined) = inline::pass(e, fresh);
        let (e2, fused) = fuse::pass(e1, fresh);
        e = e2;
        if !inlined && !fused {
            break;
        }
    }

    let e = extent::solve(e, registry)?;
    let e = apply_pushdown(e, opts);
    Ok(compile_cases(e, registry))
}

/// Normalize a lowered declaration.
pub fn normalize_decl(
    decl: CoreDecl,
    opts: &NormalizeOptions,
    registry: &TypeRegistry,
    fresh: &mut FreshGen,
) -> Result<CoreDecl, Diagnostic> {
    Ok(match decl {
        CoreDecl::Vals(binds) => CoreDecl::Vals(
            binds
                .into_iter()
                .map(|b| {
                    Ok(CoreValBind {
                        pat: b.pat,
                        rhs: normalize(b.rhs, opts, registry, fresh)?,
                    })
                })
                .collect::<Result<_, Diagnostic>>()?,
        ),
        CoreDecl::Rec(binds) => CoreDecl::Rec(
            binds
                .into_iter()
                .map(|(n, e)| Ok((n, normalize(e, opts, registry, fresh)?)))
                .collect::<Result<_, Diagnostic>>()?,
        ),
        CoreDecl::Instance { name, rhs } => CoreDecl::Instance {
            name,
            rhs: normalize(rhs, opts, registry, fresh)?,
        },
        other => other,
    })
}

fn apply_pushdown(expr: CoreExpr, opts: &NormalizeOptions) -> CoreExpr {
    if opts.external_tables.is_empty() {
        return expr;
    }
    let pd_opts = PushdownOptions {
        hybrid: opts.hybrid,
        external_tables: opts.external_tables.clone(),
    };
    map_pushdown(expr, &pd_opts)
}

fn map_pushdown(expr: CoreExpr, opts: &PushdownOptions) -> CoreExpr {
    let CoreExpr { ty, span, kind } = map_children(expr, &mut |e| map_pushdown(e, opts));
    let kind = match kind {
        CoreKind::From(query) => match push_down(&query, opts) {
            Some(rewritten) => CoreKind::From(Box::new(rewritten)),
            None => CoreKind::From(query),
        },
        other => other,
    };
    CoreExpr { ty, span, kind }
}

/// Compile every remaining `case` into a decision tree.
fn compile_cases(expr: CoreExpr, registry: &TypeRegistry) -> CoreExpr {
    let CoreExpr { ty, span, kind } = map_children(expr, &mut |e| compile_cases(e, registry));
    let kind = match kind {
        CoreKind::Case { scrutinee, arms } => {
            let tree = compile_match(&arms, registry);
            CoreKind::CompiledCase {
                scrutinee,
                tree,
                arms,
            }
        }
        other => other,
    };
    CoreExpr { ty, span, kind }
}
