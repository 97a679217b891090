//! Maranget's usefulness algorithm for exhaustiveness and redundancy
//! checking ("Warnings for Pattern Matching", 2007).
//!
//! The module operates on an abstract pattern representation (`APat`), not
//! AST nodes. Translation from AST patterns happens in the inferencer,
//! which also supplies the constructor signatures of each column type
//! through the [`PatSpace`] trait -- keeping this module free of registry
//! and unifier concerns, and keeping recursive datatypes from forcing an
//! infinite eager type expansion.
//!
//! The core predicate `is_useful(matrix, row, types, space)` decides
//! whether a new pattern row adds any coverage to the existing matrix.
//! Exhaustiveness (is a wildcard useful after all arms?) and redundancy
//! (is each arm useful given its predecessors?) are both expressed with it.

use crate::ty::Type;

/// An abstract constructor: every pattern is a constructor applied to
/// sub-patterns, or a wildcard.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ACtor {
    /// `()`
    Unit,
    /// `true` / `false`
    Bool(bool),
    /// The single constructor of an n-field record or tuple.
    Record(usize),
    /// A datatype constructor, identified by datatype id and index.
    Variant { data: u32, index: usize },
    /// `[]`
    Nil,
    /// `_ :: _`
    Cons,
    /// Integer literal (decimal text). Literal types are open.
    IntLit(String),
    /// String literal.
    StrLit(String),
    /// Character literal.
    CharLit(char),
}

/// Abstract pattern: wildcard (also variables) or constructor application.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum APat {
    Wild,
    Ctor { ctor: ACtor, args: Vec<APat> },
}

impl APat {
    pub fn ctor(ctor: ACtor, args: Vec<APat>) -> APat {
        APat::Ctor { ctor, args }
    }
}

/// One constructor of a column type's signature: its abstract identity and
/// the types of its sub-patterns.
#[derive(Clone, Debug)]
pub struct CtorSig {
    pub ctor: ACtor,
    pub args: Vec<Type>,
}

/// The constructor signature of a type: a complete finite set, or an open
/// set (numeric, string, and character literals; functions; collections
/// that patterns cannot fully enumerate).
pub enum Signature {
    Complete(Vec<CtorSig>),
    Infinite,
}

/// Supplies constructor signatures per column type. Implemented by the
/// inferencer against its registry; kept abstract here.
pub trait PatSpace {
    fn constructors(&self, ty: &Type) -> Signature;
    /// Sub-pattern types of a constructor at the given column type.
    fn ctor_args(&self, ty: &Type, ctor: &ACtor) -> Vec<Type>;
}

/// Core usefulness predicate (Algorithm U). Returns `true` if `row` matches
/// some value that no row of `matrix` matches.
pub fn is_useful(
    matrix: &[Vec<APat>],
    row: &[APat],
    types: &[Type],
    space: &dyn PatSpace,
) -> bool {
    // No columns left: the row is useful iff nothing above covered it.
    if row.is_empty() {
        return matrix.is_empty();
    }

    match &row[0] {
        APat::Ctor { ctor, args } => {
            let arg_types = space.ctor_args(&types[0], ctor);
            let specialized = specialize(matrix, ctor, args.len());
            let mut new_row = args.clone();
            new_row.extend_from_slice(&row[1..]);
            let mut new_types = arg_types;
            new_types.extend_from_slice(&types[1..]);
            is_useful(&specialized, &new_row, &new_types, space)
        }
        APat::Wild => {
            let heads = column_heads(matrix);
            match space.constructors(&types[0]) {
                Signature::Complete(sigs)
                    if !sigs.is_empty()
                        && sigs.iter().all(|sig| heads.contains(&sig.ctor)) =>
                {
                    // The matrix column covers a complete signature: the
                    // wildcard is useful iff it is useful under some
                    // constructor.
                    sigs.iter().any(|sig| {
                        let specialized = specialize(matrix, &sig.ctor, sig.args.len());
                        let mut new_row = vec![APat::Wild; sig.args.len()];
                        new_row.extend_from_slice(&row[1..]);
                        let mut new_types = sig.args.clone();
                        new_types.extend_from_slice(&types[1..]);
                        is_useful(&specialized, &new_row, &new_types, space)
                    })
                }
                _ => {
                    // Incomplete signature: the default matrix decides.
                    let defaulted = default_matrix(matrix);
                    is_useful(&defaulted, &row[1..], &types[1..], space)
                }
            }
        }
    }
}

/// Check a clause list for exhaustiveness: is a wildcard still useful after
/// every clause?
pub fn is_exhaustive(arms: &[APat], scrutinee: &Type, space: &dyn PatSpace) -> bool {
    let matrix: Vec<Vec<APat>> = arms.iter().map(|p| vec![p.clone()]).collect();
    !is_useful(
        &matrix,
        &[APat::Wild],
        std::slice::from_ref(scrutinee),
        space,
    )
}

/// Indices (0-based) of clauses that are unreachable given their
/// predecessors.
pub fn redundant_clauses(arms: &[APat], scrutinee: &Type, space: &dyn PatSpace) -> Vec<usize> {
    let mut redundant = Vec::new();
    for i in 0..arms.len() {
        let matrix: Vec<Vec<APat>> = arms[..i].iter().map(|p| vec![p.clone()]).collect();
        if !is_useful(
            &matrix,
            std::slice::from_ref(&arms[i]),
            std::slice::from_ref(scrutinee),
            space,
        ) {
            redundant.push(i);
        }
    }
    redundant
}

/// The constructors appearing at the head of the matrix's first column.
fn column_heads(matrix: &[Vec<APat>]) -> Vec<ACtor> {
    let mut heads = Vec::new();
    for row in matrix {
        if let Some(APat::Ctor { ctor, .. }) = row.first() {
            if !heads.contains(ctor) {
                heads.push(ctor.clone());
            }
        }
    }
    heads
}

/// Specialize the matrix for a constructor: rows headed by the same
/// constructor expose their sub-patterns, wildcard rows expand to
/// wildcards, and rows headed by a different constructor drop out.
fn specialize(matrix: &[Vec<APat>], ctor: &ACtor, arity: usize) -> Vec<Vec<APat>> {
    let mut out = Vec::new();
    for row in matrix {
        match row.first() {
            Some(APat::Ctor { ctor: c, args }) if c == ctor => {
                let mut new_row = args.clone();
                new_row.extend_from_slice(&row[1..]);
                out.push(new_row);
            }
            Some(APat::Wild) => {
                let mut new_row = vec![APat::Wild; arity];
                new_row.extend_from_slice(&row[1..]);
                out.push(new_row);
            }
            _ => {}
        }
    }
    out
}

/// The default matrix: wildcard-headed rows with the head removed.
fn default_matrix(matrix: &[Vec<APat>]) -> Vec<Vec<APat>> {
    matrix
        .iter()
        .filter_map(|row| match row.first() {
            Some(APat::Wild) => Some(row[1..].to_vec()),
            _ => None,
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ty::{DataId, Prim};

    // ── A tiny pattern space for tests ───────────────────────────────

    /// Bool, unit, list, tuples, and one two-variant datatype
    /// (`Leaf of int | Node`), everything else infinite.
    struct TestSpace;

    const TREE: u32 = 99;

    impl PatSpace for TestSpace {
        fn constructors(&self, ty: &Type) -> Signature {
            match ty {
                Type::Prim(Prim::Bool) => Signature::Complete(vec![
                    CtorSig {
                        ctor: ACtor::Bool(false),
                        args: vec![],
                    },
                    CtorSig {
                        ctor: ACtor::Bool(true),
                        args: vec![],
                    },
                ]),
                Type::Prim(Prim::Unit) => Signature::Complete(vec![CtorSig {
                    ctor: ACtor::Unit,
                    args: vec![],
                }]),
                Type::List(elem) => Signature::Complete(vec![
                    CtorSig {
                        ctor: ACtor::Nil,
                        args: vec![],
                    },
                    CtorSig {
                        ctor: ACtor::Cons,
                        args: vec![(**elem).clone(), ty.clone()],
                    },
                ]),
                Type::Record(fields) => Signature::Complete(vec![CtorSig {
                    ctor: ACtor::Record(fields.len()),
                    args: fields.iter().map(|(_, t)| t.clone()).collect(),
                }]),
                Type::Data(DataId(TREE), _) => Signature::Complete(vec![
                    CtorSig {
                        ctor: ACtor::Variant {
                            data: TREE,
                            index: 0,
                        },
                        args: vec![Type::int()],
                    },
                    CtorSig {
                        ctor: ACtor::Variant {
                            data: TREE,
                            index: 1,
                        },
                        args: vec![],
                    },
                ]),
                _ => Signature::Infinite,
            }
        }

        fn ctor_args(&self, ty: &Type, ctor: &ACtor) -> Vec<Type> {
            match self.constructors(ty) {
                Signature::Complete(sigs) => sigs
                    .into_iter()
                    .find(|s| &s.ctor == ctor)
                    .map(|s| s.args)
                    .unwrap_or_default(),
                Signature::Infinite => Vec::new(),
            }
        }
    }

    fn wild() -> APat {
        APat::Wild
    }

    fn lit_bool(b: bool) -> APat {
        APat::ctor(ACtor::Bool(b), vec![])
    }

    fn lit_int(n: i64) -> APat {
        APat::ctor(ACtor::IntLit(n.to_string()), vec![])
    }

    fn nil() -> APat {
        APat::ctor(ACtor::Nil, vec![])
    }

    fn cons(h: APat, t: APat) -> APat {
        APat::ctor(ACtor::Cons, vec![h, t])
    }

    fn leaf(p: APat) -> APat {
        APat::ctor(
            ACtor::Variant {
                data: TREE,
                index: 0,
            },
            vec![p],
        )
    }

    fn node() -> APat {
        APat::ctor(
            ACtor::Variant {
                data: TREE,
                index: 1,
            },
            vec![],
        )
    }

    fn tree_ty() -> Type {
        Type::Data(DataId(TREE), vec![])
    }

    #[test]
    fn anything_is_useful_against_empty_matrix() {
        assert!(is_useful(&[], &[wild()], &[Type::int()], &TestSpace));
    }

    #[test]
    fn bool_both_literals_is_exhaustive() {
        let arms = [lit_bool(true), lit_bool(false)];
        assert!(is_exhaustive(&arms, &Type::bool(), &TestSpace));
    }

    #[test]
    fn bool_single_literal_is_not_exhaustive() {
        let arms = [lit_bool(true)];
        assert!(!is_exhaustive(&arms, &Type::bool(), &TestSpace));
    }

    #[test]
    fn int_literals_never_exhaust() {
        let arms = [lit_int(1), lit_int(2)];
        assert!(!is_exhaustive(&arms, &Type::int(), &TestSpace));
    }

    #[test]
    fn int_literals_with_wildcard_exhaust() {
        let arms = [lit_int(1), lit_int(2), wild()];
        assert!(is_exhaustive(&arms, &Type::int(), &TestSpace));
    }

    #[test]
    fn list_nil_cons_exhausts() {
        let arms = [nil(), cons(wild(), wild())];
        assert!(is_exhaustive(&arms, &Type::list(Type::int()), &TestSpace));
    }

    #[test]
    fn list_missing_deep_case_is_not_exhaustive() {
        // [] and [_] but not longer lists.
        let arms = [nil(), cons(wild(), nil())];
        assert!(!is_exhaustive(&arms, &Type::list(Type::int()), &TestSpace));
    }

    #[test]
    fn variant_coverage() {
        let arms = [leaf(wild()), node()];
        assert!(is_exhaustive(&arms, &tree_ty(), &TestSpace));
        let arms = [leaf(wild())];
        assert!(!is_exhaustive(&arms, &tree_ty(), &TestSpace));
    }

    #[test]
    fn duplicate_literal_clause_is_redundant() {
        let arms = [lit_int(1), lit_int(1), wild()];
        assert_eq!(redundant_clauses(&arms, &Type::int(), &TestSpace), vec![1]);
    }

    #[test]
    fn clause_after_wildcard_is_redundant() {
        let arms = [wild(), lit_bool(true)];
        assert_eq!(
            redundant_clauses(&arms, &Type::bool(), &TestSpace),
            vec![1]
        );
    }

    #[test]
    fn tuple_of_bools_full_cross_product_exhausts() {
        let pair = |a: APat, b: APat| APat::ctor(ACtor::Record(2), vec![a, b]);
        let arms = [
            pair(lit_bool(false), lit_bool(false)),
            pair(lit_bool(false), lit_bool(true)),
            pair(lit_bool(true), wild()),
        ];
        let ty = Type::tuple(vec![Type::bool(), Type::bool()]);
        assert!(is_exhaustive(&arms, &ty, &TestSpace));

        let arms = [
            pair(lit_bool(false), lit_bool(false)),
            pair(lit_bool(true), wild()),
        ];
        assert!(!is_exhaustive(&arms, &ty, &TestSpace));
    }
}
