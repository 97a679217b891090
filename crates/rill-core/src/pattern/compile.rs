//! Pattern matrix to decision tree compiler.
//!
//! The clause matrix (rows = clauses, columns = positions in the
//! scrutinee) is specialized constructor by constructor: variable and
//! layered patterns turn into bindings on their column's access path,
//! wildcard rows survive every specialization, and rows headed by a
//! different constructor drop out. Source clause order decides which leaf
//! wins; a guarded leaf carries the tree of the remaining rows as its
//! fallthrough.

use rill_typeck::{Type, TypeRegistry};

use crate::term::{CoreArm, CorePat, CorePatKind, Lit};

use super::{AccessPath, DecisionTree, TestCtor};

/// A row in the pattern matrix: one pattern per column, plus metadata from
/// the original clause.
#[derive(Clone, Debug)]
struct PatRow {
    patterns: Vec<CorePat>,
    /// Original clause index (preserved through specialization).
    arm_index: usize,
    has_guard: bool,
    /// Variable bindings collected so far.
    bindings: Vec<(String, AccessPath)>,
}

/// The pattern matrix with an access path per column.
#[derive(Clone, Debug)]
struct PatMatrix {
    rows: Vec<PatRow>,
    column_paths: Vec<AccessPath>,
}

/// Compile a clause list into a decision tree.
pub fn compile_match(arms: &[CoreArm], registry: &TypeRegistry) -> DecisionTree {
    let rows = arms
        .iter()
        .enumerate()
        .map(|(i, arm)| {
            let mut row = PatRow {
                patterns: vec![arm.pat.clone()],
                arm_index: i,
                has_guard: arm.guard.is_some(),
                bindings: Vec::new(),
            };
            simplify_row(&mut row, &[AccessPath::Root]);
            row
        })
        .collect();
    let matrix = PatMatrix {
        rows,
        column_paths: vec![AccessPath::Root],
    };
    compile_matrix(matrix, registry)
}

/// Strip variable and layered patterns from a row, moving them into the
/// bindings list. Afterwards every column is a wildcard or a constructor.
fn simplify_row(row: &mut PatRow, paths: &[AccessPath]) {
    for (pat, path) in row.patterns.iter_mut().zip(paths) {
        loop {
            match &pat.kind {
                CorePatKind::Var(name) => {
                    row.bindings.push((name.clone(), path.clone()));
                    pat.kind = CorePatKind::Wild;
                }
                CorePatKind::As(name, inner) => {
                    row.bindings.push((name.clone(), path.clone()));
                    let inner = (**inner).clone();
                    *pat = inner;
                }
                _ => break,
            }
        }
    }
}

fn compile_matrix(matrix: PatMatrix, registry: &TypeRegistry) -> DecisionTree {
    // No rows: match failure.
    let Some(first) = matrix.rows.first() else {
        return DecisionTree::Fail;
    };

    // First row all wildcards: it wins. A guard makes the remaining rows
    // its fallthrough.
    if first
        .patterns
        .iter()
        .all(|p| matches!(p.kind, CorePatKind::Wild))
    {
        let fallthrough = if first.has_guard {
            let rest = PatMatrix {
                rows: matrix.rows[1..].to_vec(),
                column_paths: matrix.column_paths.clone(),
            };
            Some(Box::new(compile_matrix(rest, registry)))
        } else {
            None
        };
        return DecisionTree::Leaf {
            arm: first.arm_index,
            bindings: first.bindings.clone(),
            fallthrough,
        };
    }

    // Pick the leftmost column where the first row has a constructor.
    let col = first
        .patterns
        .iter()
        .position(|p| !matches!(p.kind, CorePatKind::Wild))
        .expect("some column is a constructor");
    let col_path = matrix.column_paths[col].clone();
    let col_ty = first.patterns[col].ty.clone();

    // Head constructors in this column, in first-appearance order.
    let mut heads: Vec<TestCtor> = Vec::new();
    for row in &matrix.rows {
        if let Some(test) = head_ctor(&row.patterns[col]) {
            if !heads.contains(&test) {
                heads.push(test);
            }
        }
    }

    let mut cases = Vec::new();
    for head in &heads {
        let specialized = specialize(&matrix, col, head);
        cases.push((head.clone(), compile_matrix(specialized, registry)));
    }

    let default = if signature_complete(&heads, &col_ty, registry) {
        None
    } else {
        let defaulted = default_matrix(&matrix, col);
        Some(Box::new(compile_matrix(defaulted, registry)))
    };

    DecisionTree::Switch {
        path: col_path,
        cases,
        default,
    }
}

/// The test a column pattern performs, if it is a constructor pattern.
fn head_ctor(pat: &CorePat) -> Option<TestCtor> {
    match &pat.kind {
        CorePatKind::Wild | CorePatKind::Var(_) | CorePatKind::As(_, _) => None,
        CorePatKind::Lit(lit) => Some(match lit {
            Lit::Int(n) => TestCtor::Int(n.clone()),
            Lit::Str(s) => TestCtor::Str(s.clone()),
            Lit::Char(c) => TestCtor::Char(*c),
            Lit::Bool(b) => TestCtor::Bool(*b),
            Lit::Unit => TestCtor::Unit,
            Lit::Real(_) => TestCtor::Unit, // real patterns do not exist
        }),
        CorePatKind::Ctor { data, index, .. } => Some(TestCtor::Variant {
            data: *data,
            index: *index,
        }),
        CorePatKind::ExnCtor { name, .. } => Some(TestCtor::Exn(name.clone())),
        CorePatKind::Record(fields) => Some(TestCtor::Record(fields.len())),
        CorePatKind::Cons(_, _) => Some(TestCtor::Cons),
        CorePatKind::EmptyList => Some(TestCtor::Nil),
    }
}

/// Sub-patterns a constructor pattern exposes, aligned with
/// `TestCtor::sub_paths`.
fn sub_patterns(pat: &CorePat, test: &TestCtor) -> Vec<CorePat> {
    match (&pat.kind, test) {
        (CorePatKind::Ctor { arg, .. }, TestCtor::Variant { .. })
        | (CorePatKind::ExnCtor { arg, .. }, TestCtor::Exn(_)) => match arg {
            Some(p) => vec![(**p).clone()],
            None => vec![wild_like(pat)],
        },
        (CorePatKind::Record(fields), TestCtor::Record(_)) => {
            fields.iter().map(|(_, p)| p.clone()).collect()
        }
        (CorePatKind::Cons(h, t), TestCtor::Cons) => vec![(**h).clone(), (**t).clone()],
        _ => Vec::new(),
    }
}

fn wild_like(pat: &CorePat) -> CorePat {
    CorePat {
        ty: Type::unit(),
        span: pat.span,
        kind: CorePatKind::Wild,
    }
}

fn wildcards(n: usize, like: &CorePat) -> Vec<CorePat> {
    (0..n).map(|_| wild_like(like)).collect()
}

/// Specialize the matrix for one constructor at one column.
fn specialize(matrix: &PatMatrix, col: usize, test: &TestCtor) -> PatMatrix {
    let arity = test.arity();
    let sub_paths = test.sub_paths(&matrix.column_paths[col]);

    let mut column_paths = matrix.column_paths.clone();
    column_paths.splice(col..=col, sub_paths.clone());

    let mut rows = Vec::new();
    for row in &matrix.rows {
        let head = head_ctor(&row.patterns[col]);
        let subs = match head {
            Some(h) if &h == test => sub_patterns(&row.patterns[col], test),
            Some(_) => continue,
            None => wildcards(arity, &row.patterns[col]),
        };
        let mut new_row = row.clone();
        new_row.patterns.splice(col..=col, subs);
        simplify_row(&mut new_row, &column_paths);
        rows.push(new_row);
    }

    PatMatrix { rows, column_paths }
}

/// The default matrix: rows with a wildcard at the column, column removed.
fn default_matrix(matrix: &PatMatrix, col: usize) -> PatMatrix {
    let mut column_paths = matrix.column_paths.clone();
    column_paths.remove(col);
    let rows = matrix
        .rows
        .iter()
        .filter(|row| matches!(row.patterns[col].kind, CorePatKind::Wild))
        .map(|row| {
            let mut new_row = row.clone();
            new_row.patterns.remove(col);
            new_row
        })
        .collect();
    PatMatrix { rows, column_paths }
}

/// Whether the head constructors cover the column type completely, making
/// a default branch unnecessary.
fn signature_complete(heads: &[TestCtor], ty: &Type, registry: &TypeRegistry) -> bool {
    match ty {
        Type::Prim(rill_typeck::Prim::Bool) => {
            heads.contains(&TestCtor::Bool(true)) && heads.contains(&TestCtor::Bool(false))
        }
        Type::Prim(rill_typeck::Prim::Unit) => heads.contains(&TestCtor::Unit),
        Type::List(_) => heads.contains(&TestCtor::Nil) && heads.contains(&TestCtor::Cons),
        Type::Record(_) => heads.iter().any(|h| matches!(h, TestCtor::Record(_))),
        Type::Data(id, _) => {
            let count = registry.get(*id).ctors.len();
            let mut seen = vec![false; count];
            for h in heads {
                if let TestCtor::Variant { data, index } = h {
                    if data == id && *index < count {
                        seen[*index] = true;
                    }
                }
            }
            seen.iter().all(|s| *s)
        }
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rill_common::span::Span;
    use rill_typeck::TypeRegistry;
    use crate::term::{CoreExpr, CoreKind};

    fn pat(ty: Type, kind: CorePatKind) -> CorePat {
        CorePat {
            ty,
            span: Span::new(0, 0),
            kind,
        }
    }

    fn body(n: i64) -> CoreExpr {
        CoreExpr::new(
            Type::int(),
            Span::new(0, 0),
            CoreKind::Lit(Lit::Int(n.into())),
        )
    }

    fn arm(p: CorePat, n: i64) -> CoreArm {
        CoreArm {
            pat: p,
            guard: None,
            body: body(n),
        }
    }

    #[test]
    fn single_wildcard_compiles_to_leaf() {
        let registry = TypeRegistry::new();
        let tree = compile_match(
            &[arm(pat(Type::int(), CorePatKind::Wild), 1)],
            &registry,
        );
        match tree {
            DecisionTree::Leaf { arm: 0, .. } => {}
            other => panic!("expected leaf, got {other:?}"),
        }
    }

    #[test]
    fn variable_pattern_binds_root() {
        let registry = TypeRegistry::new();
        let tree = compile_match(
            &[arm(pat(Type::int(), CorePatKind::Var("x".to_string())), 1)],
            &registry,
        );
        match tree {
            DecisionTree::Leaf { bindings, .. } => {
                assert_eq!(bindings, vec![("x".to_string(), AccessPath::Root)]);
            }
            other => panic!("expected leaf, got {other:?}"),
        }
    }

    #[test]
    fn bool_clauses_switch_without_default() {
        let registry = TypeRegistry::new();
        let tree = compile_match(
            &[
                arm(pat(Type::bool(), CorePatKind::Lit(Lit::Bool(true))), 1),
                arm(pat(Type::bool(), CorePatKind::Lit(Lit::Bool(false))), 2),
            ],
            &registry,
        );
        match tree {
            DecisionTree::Switch { cases, default, .. } => {
                assert_eq!(cases.len(), 2);
                assert!(default.is_none(), "complete signature needs no default");
            }
            other => panic!("expected switch, got {other:?}"),
        }
    }

    #[test]
    fn int_literals_keep_a_default() {
        let registry = TypeRegistry::new();
        let tree = compile_match(
            &[
                arm(pat(Type::int(), CorePatKind::Lit(Lit::Int(1.into()))), 1),
                arm(pat(Type::int(), CorePatKind::Wild), 2),
            ],
            &registry,
        );
        match tree {
            DecisionTree::Switch { cases, default, .. } => {
                assert_eq!(cases.len(), 1);
                assert!(default.is_some(), "open signature keeps a default");
            }
            other => panic!("expected switch, got {other:?}"),
        }
    }

    #[test]
    fn cons_pattern_decomposes_into_head_and_tail() {
        let registry = TypeRegistry::new();
        let list_ty = Type::list(Type::int());
        let cons = pat(
            list_ty.clone(),
            CorePatKind::Cons(
                Box::new(pat(Type::int(), CorePatKind::Var("h".to_string()))),
                Box::new(pat(list_ty.clone(), CorePatKind::Var("t".to_string()))),
            ),
        );
        let tree = compile_match(
            &[
                arm(cons, 1),
                arm(pat(list_ty, CorePatKind::EmptyList), 2),
            ],
            &registry,
        );
        match tree {
            DecisionTree::Switch { cases, default, .. } => {
                assert_eq!(cases.len(), 2);
                assert!(default.is_none());
                match &cases[0].1 {
                    DecisionTree::Leaf { bindings, .. } => {
                        assert_eq!(bindings.len(), 2);
                        assert_eq!(bindings[0].0, "h");
                        assert_eq!(bindings[0].1, AccessPath::Root.head());
                        assert_eq!(bindings[1].1, AccessPath::Root.tail());
                    }
                    other => panic!("expected leaf under cons, got {other:?}"),
                }
            }
            other => panic!("expected switch, got {other:?}"),
        }
    }

    #[test]
    fn guarded_leaf_falls_through() {
        let registry = TypeRegistry::new();
        let guarded = CoreArm {
            pat: pat(Type::int(), CorePatKind::Var("x".to_string())),
            guard: Some(CoreExpr::new(
                Type::bool(),
                Span::new(0, 0),
                CoreKind::Lit(Lit::Bool(false)),
            )),
            body: body(1),
        };
        let tree = compile_match(
            &[guarded, arm(pat(Type::int(), CorePatKind::Wild), 2)],
            &registry,
        );
        match tree {
            DecisionTree::Leaf {
                arm: 0,
                fallthrough: Some(rest),
                ..
            } => match *rest {
                DecisionTree::Leaf { arm: 1, .. } => {}
                other => panic!("expected fallthrough leaf, got {other:?}"),
            },
            other => panic!("expected guarded leaf, got {other:?}"),
        }
    }
}
