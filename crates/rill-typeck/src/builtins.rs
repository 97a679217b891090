//! The initial type environment: operators, the small standard library,
//! structure records (`String`, `Real`, `Relational`), and the overload
//! groups for arithmetic, comparison, and the aggregate functions.
//!
//! The value half of every binding lives in the evaluator's builtin table
//! under the same name; the two tables must stay aligned.

use crate::env::{Binding, TypeEnv};
use crate::ty::{Label, Scheme, Type, TyVar};

fn a() -> Type {
    Type::Var(TyVar(0))
}

fn b() -> Type {
    Type::Var(TyVar(1))
}

fn c() -> Type {
    Type::Var(TyVar(2))
}

/// A scheme quantified over the variables actually used in `ty`.
fn poly(ty: Type) -> Scheme {
    Scheme::normalize_from_ty(ty)
}

fn mono(ty: Type) -> Scheme {
    Scheme::mono(ty)
}

/// Binary operator type: `l * r -> result`.
fn binop(l: Type, r: Type, result: Type) -> Type {
    Type::fun(Type::tuple(vec![l, r]), result)
}

/// Install every initial binding into the global scope.
pub fn install(env: &mut TypeEnv) {
    // ── Arithmetic: overloaded over int and real ───────────────────────
    for op in ["+", "-", "*"] {
        env.insert(
            op.to_string(),
            Binding::Overload(vec![
                mono(binop(Type::int(), Type::int(), Type::int())),
                mono(binop(Type::real(), Type::real(), Type::real())),
            ]),
        );
    }
    env.insert(
        "/".to_string(),
        Binding::Val(mono(binop(Type::real(), Type::real(), Type::real()))),
    );
    for op in ["div", "mod"] {
        env.insert(
            op.to_string(),
            Binding::Val(mono(binop(Type::int(), Type::int(), Type::int()))),
        );
    }
    env.insert(
        "^".to_string(),
        Binding::Val(mono(binop(Type::string(), Type::string(), Type::string()))),
    );
    env.insert(
        "~".to_string(),
        Binding::Overload(vec![
            mono(Type::fun(Type::int(), Type::int())),
            mono(Type::fun(Type::real(), Type::real())),
        ]),
    );
    env.insert(
        "abs".to_string(),
        Binding::Overload(vec![
            mono(Type::fun(Type::int(), Type::int())),
            mono(Type::fun(Type::real(), Type::real())),
        ]),
    );

    // ── Equality and ordering ──────────────────────────────────────────
    for op in ["=", "<>"] {
        env.insert(
            op.to_string(),
            Binding::Val(poly(binop(a(), a(), Type::bool()))),
        );
    }
    for op in ["<", "<=", ">", ">="] {
        env.insert(
            op.to_string(),
            Binding::Overload(vec![
                mono(binop(Type::int(), Type::int(), Type::bool())),
                mono(binop(Type::real(), Type::real(), Type::bool())),
                mono(binop(Type::string(), Type::string(), Type::bool())),
                mono(binop(Type::char(), Type::char(), Type::bool())),
            ]),
        );
    }

    // ── Lists, bags, membership ────────────────────────────────────────
    env.insert(
        "::".to_string(),
        Binding::Val(poly(binop(a(), Type::list(a()), Type::list(a())))),
    );
    env.insert(
        "@".to_string(),
        Binding::Val(poly(binop(
            Type::list(a()),
            Type::list(a()),
            Type::list(a()),
        ))),
    );
    for op in ["elem", "notelem"] {
        env.insert(
            op.to_string(),
            Binding::Overload(vec![
                poly(binop(a(), Type::list(a()), Type::bool())),
                poly(binop(a(), Type::bag(a()), Type::bool())),
            ]),
        );
    }
    env.insert(
        "o".to_string(),
        Binding::Val(poly(binop(
            Type::fun(b(), c()),
            Type::fun(a(), b()),
            Type::fun(a(), c()),
        ))),
    );

    env.insert(
        "not".to_string(),
        Binding::Val(mono(Type::fun(Type::bool(), Type::bool()))),
    );
    env.insert(
        "map".to_string(),
        Binding::Val(poly(Type::fun(
            Type::fun(a(), b()),
            Type::fun(Type::list(a()), Type::list(b())),
        ))),
    );
    env.insert(
        "filter".to_string(),
        Binding::Val(poly(Type::fun(
            Type::fun(a(), Type::bool()),
            Type::fun(Type::list(a()), Type::list(a())),
        ))),
    );
    env.insert(
        "hd".to_string(),
        Binding::Val(poly(Type::fun(Type::list(a()), a()))),
    );
    env.insert(
        "tl".to_string(),
        Binding::Val(poly(Type::fun(Type::list(a()), Type::list(a())))),
    );
    env.insert(
        "rev".to_string(),
        Binding::Val(poly(Type::fun(Type::list(a()), Type::list(a())))),
    );
    env.insert(
        "length".to_string(),
        Binding::Val(poly(Type::fun(Type::list(a()), Type::int()))),
    );
    env.insert(
        "bag".to_string(),
        Binding::Val(poly(Type::fun(Type::list(a()), Type::bag(a())))),
    );

    // ── Characters and conversions ─────────────────────────────────────
    env.insert(
        "chr".to_string(),
        Binding::Val(mono(Type::fun(Type::int(), Type::char()))),
    );
    env.insert(
        "ord".to_string(),
        Binding::Val(mono(Type::fun(Type::char(), Type::int()))),
    );
    env.insert(
        "ceil".to_string(),
        Binding::Val(mono(Type::fun(Type::real(), Type::int()))),
    );
    env.insert(
        "floor".to_string(),
        Binding::Val(mono(Type::fun(Type::real(), Type::int()))),
    );

    // ── Structure records ──────────────────────────────────────────────
    env.insert(
        "String".to_string(),
        Binding::Val(mono(Type::record(vec![
            (
                Label::new("size"),
                Type::fun(Type::string(), Type::int()),
            ),
            (
                Label::new("sub"),
                Type::fun(
                    Type::tuple(vec![Type::string(), Type::int()]),
                    Type::char(),
                ),
            ),
        ]))),
    );
    env.insert(
        "Real".to_string(),
        Binding::Val(mono(Type::record(vec![(
            Label::new("signBit"),
            Type::fun(Type::real(), Type::bool()),
        )]))),
    );

    // ── Aggregates: overloaded over element type and collection kind ───
    env.insert(
        "sum".to_string(),
        Binding::Overload(vec![
            mono(Type::fun(Type::list(Type::int()), Type::int())),
            mono(Type::fun(Type::list(Type::real()), Type::real())),
            mono(Type::fun(Type::bag(Type::int()), Type::int())),
            mono(Type::fun(Type::bag(Type::real()), Type::real())),
        ]),
    );
    env.insert(
        "count".to_string(),
        Binding::Overload(vec![
            poly(Type::fun(Type::list(a()), Type::int())),
            poly(Type::fun(Type::bag(a()), Type::int())),
        ]),
    );
    for op in ["min", "max"] {
        env.insert(
            op.to_string(),
            Binding::Overload(vec![
                mono(Type::fun(Type::list(Type::int()), Type::int())),
                mono(Type::fun(Type::list(Type::real()), Type::real())),
                mono(Type::fun(Type::bag(Type::int()), Type::int())),
                mono(Type::fun(Type::bag(Type::real()), Type::real())),
            ]),
        );
    }
    env.insert(
        "avg".to_string(),
        Binding::Overload(vec![
            mono(Type::fun(Type::list(Type::int()), Type::int())),
            mono(Type::fun(Type::list(Type::real()), Type::real())),
            mono(Type::fun(Type::bag(Type::int()), Type::int())),
            mono(Type::fun(Type::bag(Type::real()), Type::real())),
        ]),
    );

    // ── Recursive-query fixpoint ───────────────────────────────────────
    env.insert(
        "iterate".to_string(),
        Binding::Val(poly(Type::fun(
            Type::tuple(vec![
                Type::list(a()),
                Type::fun(
                    Type::tuple(vec![Type::list(a()), Type::list(a())]),
                    Type::list(a()),
                ),
            ]),
            Type::list(a()),
        ))),
    );

    // ── Built-in exception taxonomy ────────────────────────────────────
    for exn in [
        "Match", "Bind", "Div", "Overflow", "Subscript", "Domain", "Size", "Chr", "Empty",
    ] {
        env.insert(exn.to_string(), Binding::Exn(None));
    }
    // `Error` carries the failure message (`use` and internal faults).
    env.insert("Error".to_string(), Binding::Exn(Some(Type::string())));

    // ── Script loading ─────────────────────────────────────────────────
    env.insert(
        "use".to_string(),
        Binding::Val(mono(Type::fun(Type::string(), Type::unit()))),
    );
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn install_binds_operators_and_stdlib() {
        let mut env = TypeEnv::new();
        install(&mut env);
        assert!(matches!(env.lookup("+"), Some(Binding::Overload(v)) if v.len() == 2));
        assert!(matches!(env.lookup("="), Some(Binding::Val(_))));
        assert!(matches!(env.lookup("sum"), Some(Binding::Overload(v)) if v.len() == 4));
        assert!(env.lookup("map").is_some());
        assert!(env.lookup("iterate").is_some());
        assert!(env.lookup("String").is_some());
        assert!(matches!(env.lookup("Div"), Some(Binding::Exn(None))));
        assert!(matches!(env.lookup("Error"), Some(Binding::Exn(Some(_)))));
    }

    #[test]
    fn equality_scheme_is_polymorphic() {
        let mut env = TypeEnv::new();
        install(&mut env);
        match env.lookup("=") {
            Some(Binding::Val(scheme)) => assert_eq!(scheme.vars.len(), 1),
            other => panic!("expected value binding, got {other:?}"),
        }
    }
}
