//! The initial value environment and the builtin call table.
//!
//! Every name installed here has a type-side twin in
//! `rill_typeck::builtins`; the two tables must stay aligned, including
//! the order of overload instances. Arithmetic and aggregate instances
//! share one implementation each and dispatch on the value kind, so the
//! instance index only matters to the type checker.

use std::rc::Rc;

use num_bigint::BigInt;
use num_traits::{Signed, ToPrimitive, Zero};
use rill_common::span::Span;
use rill_typeck::Label;
use rustc_hash::FxHashMap;

use crate::env::Env;
use crate::eval::Evaluator;
use crate::value::{cmp_values, values_equal, Builtin, EvalResult, Packet, Value};

fn b(name: &'static str, arity: u8) -> Value {
    Value::Builtin(Builtin::new(name, arity))
}

fn overload(name: &'static str, arity: u8, instances: usize) -> Value {
    Value::Overload(Rc::new(vec![b(name, arity); instances]))
}

/// Build the global value environment with every builtin installed.
pub fn install() -> FxHashMap<String, Value> {
    let mut g = FxHashMap::default();

    // Arithmetic overload groups (int, real).
    for op in ["+", "-", "*"] {
        g.insert(op.to_string(), overload(op, 1, 2));
    }
    g.insert("/".to_string(), b("/", 1));
    g.insert("div".to_string(), b("div", 1));
    g.insert("mod".to_string(), b("mod", 1));
    g.insert("^".to_string(), b("^", 1));
    g.insert("~".to_string(), overload("~", 1, 2));
    g.insert("abs".to_string(), overload("abs", 1, 2));

    g.insert("=".to_string(), b("=", 1));
    g.insert("<>".to_string(), b("<>", 1));
    for op in ["<", "<=", ">", ">="] {
        g.insert(op.to_string(), overload(op, 1, 4));
    }

    g.insert("::".to_string(), b("::", 1));
    g.insert("@".to_string(), b("@", 1));
    g.insert("elem".to_string(), overload("elem", 1, 2));
    g.insert("notelem".to_string(), overload("notelem", 1, 2));
    g.insert("o".to_string(), b("o", 1));

    g.insert("not".to_string(), b("not", 1));
    g.insert("map".to_string(), b("map", 2));
    g.insert("filter".to_string(), b("filter", 2));
    g.insert("hd".to_string(), b("hd", 1));
    g.insert("tl".to_string(), b("tl", 1));
    g.insert("rev".to_string(), b("rev", 1));
    g.insert("length".to_string(), b("length", 1));
    g.insert("bag".to_string(), b("bag", 1));
    g.insert("chr".to_string(), b("chr", 1));
    g.insert("ord".to_string(), b("ord", 1));
    g.insert("ceil".to_string(), b("ceil", 1));
    g.insert("floor".to_string(), b("floor", 1));

    g.insert(
        "String".to_string(),
        Value::record(vec![
            (Label::new("size"), b("String.size", 1)),
            (Label::new("sub"), b("String.sub", 1)),
        ]),
    );
    g.insert(
        "Real".to_string(),
        Value::record(vec![(Label::new("signBit"), b("Real.signBit", 1))]),
    );

    for agg in ["sum", "min", "max", "avg"] {
        g.insert(agg.to_string(), overload(agg, 1, 4));
    }
    g.insert("count".to_string(), overload("count", 1, 2));

    g.insert("iterate".to_string(), b("iterate", 1));
    g.insert("use".to_string(), b("use", 1));

    g.insert(rill_core::NON_EMPTY.to_string(), b("Relational.nonEmpty", 1));
    g.insert(rill_core::EMPTY.to_string(), b("Relational.empty", 1));

    g
}

/// An environment rooted at a fresh builtin table; the REPL session layers
/// its own globals over this.
pub fn initial_env() -> Env {
    Env::root(Rc::new(install()))
}

// ── The call table ─────────────────────────────────────────────────────

/// Execute a builtin whose arguments are all present.
pub fn call(
    ev: &mut Evaluator,
    name: &'static str,
    mut args: Vec<Value>,
    span: Span,
) -> EvalResult<Value> {
    match name {
        "+" | "-" | "*" => arith(name, &args[0], span),
        "/" => match pair(&args[0]) {
            (Value::Real(x), Value::Real(y)) => Ok(Value::Real(x / y)),
            _ => type_error(name, span),
        },
        "div" => int_div_mod(&args[0], span, true),
        "mod" => int_div_mod(&args[0], span, false),
        "^" => match pair(&args[0]) {
            (Value::Str(x), Value::Str(y)) => Ok(Value::str(format!("{x}{y}"))),
            _ => type_error(name, span),
        },
        "~" => match &args[0] {
            Value::Int(n) => Ok(Value::Int(-n)),
            Value::Real(r) => Ok(Value::Real(-r)),
            _ => type_error(name, span),
        },
        "abs" => match &args[0] {
            Value::Int(n) => Ok(Value::Int(n.abs())),
            Value::Real(r) => Ok(Value::Real(r.abs())),
            _ => type_error(name, span),
        },

        "=" => {
            let (x, y) = pair(&args[0]);
            Ok(Value::Bool(values_equal(x, y)))
        }
        "<>" => {
            let (x, y) = pair(&args[0]);
            Ok(Value::Bool(!values_equal(x, y)))
        }
        "<" | "<=" | ">" | ">=" => {
            let (x, y) = pair(&args[0]);
            let ord = cmp_values(x, y);
            Ok(Value::Bool(match name {
                "<" => ord.is_lt(),
                "<=" => ord.is_le(),
                ">" => ord.is_gt(),
                _ => ord.is_ge(),
            }))
        }

        "::" => match pair(&args[0]) {
            (head, Value::List(tail)) => {
                let mut items = Vec::with_capacity(tail.len() + 1);
                items.push(head.clone());
                items.extend(tail.iter().cloned());
                Ok(Value::list(items))
            }
            _ => type_error(name, span),
        },
        "@" => match pair(&args[0]) {
            (Value::List(x), Value::List(y)) => {
                let mut items = x.to_vec();
                items.extend(y.iter().cloned());
                Ok(Value::list(items))
            }
            _ => type_error(name, span),
        },
        "elem" | "notelem" => {
            let (x, coll) = pair(&args[0]);
            let items = coll
                .collection_items()
                .ok_or_else(|| Packet::with_message("Error", "not a collection", span))?;
            let found = items.iter().any(|v| values_equal(v, x));
            Ok(Value::Bool(if name == "elem" { found } else { !found }))
        }
        "o" => {
            let (f, g) = pair(&args[0]);
            Ok(Value::Builtin(Builtin {
                name: "o.apply",
                arity: 3,
                args: vec![f.clone(), g.clone()],
            }))
        }
        "o.apply" => {
            let x = args.pop().expect("the composed argument");
            let g = args.pop().expect("the inner function");
            let f = args.pop().expect("the outer function");
            let inner = ev.apply(g, x, span)?;
            ev.apply(f, inner, span)
        }

        "not" => match &args[0] {
            Value::Bool(v) => Ok(Value::Bool(!v)),
            _ => type_error(name, span),
        },

        "map" => {
            let xs = args.pop().expect("the collection");
            let f = args.pop().expect("the function");
            let items = xs
                .collection_items()
                .ok_or_else(|| Packet::with_message("Error", "not a collection", span))?
                .to_vec();
            let mut out = Vec::with_capacity(items.len());
            for item in items {
                out.push(ev.apply(f.clone(), item, span)?);
            }
            Ok(Value::list(out))
        }
        "filter" => {
            let xs = args.pop().expect("the collection");
            let f = args.pop().expect("the predicate");
            let items = xs
                .collection_items()
                .ok_or_else(|| Packet::with_message("Error", "not a collection", span))?
                .to_vec();
            let mut out = Vec::new();
            for item in items {
                if matches!(ev.apply(f.clone(), item.clone(), span)?, Value::Bool(true)) {
                    out.push(item);
                }
            }
            Ok(Value::list(out))
        }

        "hd" => match &args[0] {
            Value::List(items) => items
                .first()
                .cloned()
                .ok_or_else(|| Packet::new("Empty", span)),
            _ => type_error(name, span),
        },
        "tl" => match &args[0] {
            Value::List(items) => {
                if items.is_empty() {
                    Err(Packet::new("Empty", span))
                } else {
                    Ok(Value::list(items[1..].to_vec()))
                }
            }
            _ => type_error(name, span),
        },
        "rev" => match &args[0] {
            Value::List(items) => {
                let mut out = items.to_vec();
                out.reverse();
                Ok(Value::list(out))
            }
            _ => type_error(name, span),
        },
        "length" => match &args[0] {
            Value::List(items) => Ok(Value::Int(BigInt::from(items.len()))),
            _ => type_error(name, span),
        },
        "bag" => match &args[0] {
            Value::List(items) => Ok(Value::bag(items.to_vec())),
            _ => type_error(name, span),
        },

        "chr" => match &args[0] {
            Value::Int(n) => match n.to_u32().filter(|c| *c < 256) {
                Some(c) => Ok(Value::Char(char::from_u32(c).expect("latin-1 code"))),
                None => Err(Packet::new("Chr", span)),
            },
            _ => type_error(name, span),
        },
        "ord" => match &args[0] {
            Value::Char(c) => Ok(Value::Int(BigInt::from(*c as u32))),
            _ => type_error(name, span),
        },
        "ceil" | "floor" => match &args[0] {
            Value::Real(r) => {
                if r.is_nan() {
                    return Err(Packet::new("Domain", span));
                }
                if r.is_infinite() {
                    return Err(Packet::new("Overflow", span));
                }
                let rounded = if name == "ceil" { r.ceil() } else { r.floor() };
                Ok(Value::Int(
                    BigInt::from(rounded as i64),
                ))
            }
            _ => type_error(name, span),
        },

        "String.size" => match &args[0] {
            Value::Str(s) => Ok(Value::Int(BigInt::from(s.chars().count()))),
            _ => type_error(name, span),
        },
        "String.sub" => match pair(&args[0]) {
            (Value::Str(s), Value::Int(i)) => i
                .to_usize()
                .and_then(|i| s.chars().nth(i))
                .map(Value::Char)
                .ok_or_else(|| Packet::new("Subscript", span)),
            _ => type_error(name, span),
        },
        "Real.signBit" => match &args[0] {
            // NaN counts as negative and `~NaN` as positive, the inverse
            // of the raw IEEE sign bit; `-0.0`, negative reals, and `-inf`
            // follow the bit as usual.
            Value::Real(r) => Ok(Value::Bool(if r.is_nan() {
                !r.is_sign_negative()
            } else {
                r.is_sign_negative()
            })),
            _ => type_error(name, span),
        },

        "sum" => fold_numeric(&args[0], span, |acc, v| match (acc, v) {
            (Value::Int(a), Value::Int(b)) => Ok(Value::Int(a + b)),
            (Value::Real(a), Value::Real(b)) => Ok(Value::Real(a + b)),
            (Value::Int(a), Value::Real(b)) if a.is_zero() => Ok(Value::Real(*b)),
            _ => type_error("sum", span),
        }),
        "count" => {
            let items = collection(&args[0], span)?;
            Ok(Value::Int(BigInt::from(items.len())))
        }
        "min" | "max" => {
            let items = collection(&args[0], span)?;
            let mut best: Option<Value> = None;
            for item in items {
                best = Some(match best {
                    None => item.clone(),
                    Some(current) => {
                        let keep_new = if name == "min" {
                            cmp_values(item, &current).is_lt()
                        } else {
                            cmp_values(item, &current).is_gt()
                        };
                        if keep_new {
                            item.clone()
                        } else {
                            current
                        }
                    }
                });
            }
            best.ok_or_else(|| Packet::new("Empty", span))
        }
        "avg" => {
            let items = collection(&args[0], span)?;
            if items.is_empty() {
                return Err(Packet::new("Empty", span));
            }
            let n = items.len();
            match &items[0] {
                Value::Int(_) => {
                    let mut total = BigInt::from(0);
                    for item in items {
                        match item {
                            Value::Int(v) => total += v,
                            _ => return type_error("avg", span),
                        }
                    }
                    Ok(Value::Int(floor_div(&total, &BigInt::from(n))))
                }
                Value::Real(_) => {
                    let mut total = 0.0;
                    for item in items {
                        match item {
                            Value::Real(v) => total += v,
                            _ => return type_error("avg", span),
                        }
                    }
                    Ok(Value::Real(total / n as f64))
                }
                _ => type_error("avg", span),
            }
        }

        "iterate" => {
            let (seed, step) = pair(&args[0]);
            let step = step.clone();
            let mut total: Vec<Value> = collection(seed, span)?.to_vec();
            let mut frontier = total.clone();
            while !frontier.is_empty() {
                let produced = ev.apply(
                    step.clone(),
                    Value::record(vec![
                        (Label::new("1"), Value::list(total.clone())),
                        (Label::new("2"), Value::list(frontier.clone())),
                    ]),
                    span,
                )?;
                let produced = collection(&produced, span)?.to_vec();
                // Monotone union: only rows not yet accumulated stay new.
                let mut added = Vec::new();
                for item in produced {
                    if !total.iter().any(|v| values_equal(v, &item)) {
                        total.push(item.clone());
                        added.push(item);
                    }
                }
                frontier = added;
            }
            Ok(Value::list(total))
        }

        "Relational.nonEmpty" => {
            let items = collection(&args[0], span)?;
            Ok(Value::Bool(!items.is_empty()))
        }
        "Relational.empty" => {
            let items = collection(&args[0], span)?;
            Ok(Value::Bool(items.is_empty()))
        }

        "use" => Err(Packet::with_message(
            "Error",
            "use is only available at the top level",
            span,
        )),

        other => Err(Packet::with_message(
            "Error",
            &format!("unknown builtin {other}"),
            span,
        )),
    }
}

// ── Helpers ────────────────────────────────────────────────────────────

/// Split a tuple argument into its two components.
fn pair(v: &Value) -> (&Value, &Value) {
    match v {
        Value::Record(fields) if fields.len() == 2 => (&fields[0].1, &fields[1].1),
        _ => (v, v),
    }
}

fn collection<'v>(v: &'v Value, span: Span) -> EvalResult<&'v [Value]> {
    v.collection_items()
        .ok_or_else(|| Packet::with_message("Error", "expected a collection", span))
}

fn type_error(name: &str, span: Span) -> EvalResult<Value> {
    Err(Packet::with_message(
        "Error",
        &format!("{name}: unexpected operand"),
        span,
    ))
}

fn arith(name: &str, arg: &Value, span: Span) -> EvalResult<Value> {
    match pair(arg) {
        (Value::Int(x), Value::Int(y)) => Ok(Value::Int(match name {
            "+" => x + y,
            "-" => x - y,
            _ => x * y,
        })),
        (Value::Real(x), Value::Real(y)) => Ok(Value::Real(match name {
            "+" => x + y,
            "-" => x - y,
            _ => x * y,
        })),
        _ => type_error(name, span),
    }
}

/// `div`/`mod` follow ML semantics: floor division, remainder with the
/// divisor's sign, `Div` on a zero divisor.
fn int_div_mod(arg: &Value, span: Span, want_div: bool) -> EvalResult<Value> {
    match pair(arg) {
        (Value::Int(x), Value::Int(y)) => {
            if y.is_zero() {
                return Err(Packet::new("Div", span));
            }
            if want_div {
                Ok(Value::Int(floor_div(x, y)))
            } else {
                Ok(Value::Int(floor_mod(x, y)))
            }
        }
        _ => type_error("div", span),
    }
}

fn floor_div(x: &BigInt, y: &BigInt) -> BigInt {
    let q = x / y;
    let r = x % y;
    if !r.is_zero() && (r.sign() != y.sign()) {
        q - 1
    } else {
        q
    }
}

fn floor_mod(x: &BigInt, y: &BigInt) -> BigInt {
    let r = x % y;
    if !r.is_zero() && (r.sign() != y.sign()) {
        r + y
    } else {
        r
    }
}

/// Fold a numeric collection with the zero of `int` as the empty seed
/// (promoted to real on the first real element).
fn fold_numeric(
    v: &Value,
    span: Span,
    f: impl Fn(Value, &Value) -> EvalResult<Value>,
) -> EvalResult<Value> {
    let items = collection(v, span)?;
    let mut acc = Value::Int(BigInt::from(0));
    for item in items {
        acc = f(acc, item)?;
    }
    Ok(acc)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn int(n: i64) -> BigInt {
        BigInt::from(n)
    }

    #[test]
    fn floor_division_follows_ml_semantics() {
        assert_eq!(floor_div(&int(7), &int(2)), int(3));
        assert_eq!(floor_div(&int(-7), &int(2)), int(-4));
        assert_eq!(floor_div(&int(7), &int(-2)), int(-4));
        assert_eq!(floor_div(&int(-7), &int(-2)), int(3));
    }

    #[test]
    fn remainder_takes_divisor_sign() {
        assert_eq!(floor_mod(&int(7), &int(2)), int(1));
        assert_eq!(floor_mod(&int(-7), &int(2)), int(1));
        assert_eq!(floor_mod(&int(7), &int(-2)), int(-1));
        assert_eq!(floor_mod(&int(-7), &int(-2)), int(-1));
    }

    #[test]
    fn sign_bit_treats_nan_as_negative() {
        let registry = rill_typeck::TypeRegistry::new();
        let mut ev = crate::eval::Evaluator::new(&registry);
        let span = Span::new(0, 0);
        let mut sign_bit = |r: f64| match call(&mut ev, "Real.signBit", vec![Value::Real(r)], span)
        {
            Ok(Value::Bool(b)) => b,
            other => panic!("expected a boolean, got {other:?}"),
        };
        // Fixed bit patterns: quiet NaN with the sign bit clear and set.
        let nan = f64::from_bits(0x7FF8_0000_0000_0000);
        let negated_nan = f64::from_bits(0xFFF8_0000_0000_0000);
        assert!(sign_bit(nan), "NaN counts as negative");
        assert!(!sign_bit(negated_nan), "~NaN counts as positive");
        assert!(sign_bit(-0.0));
        assert!(sign_bit(f64::NEG_INFINITY));
        assert!(sign_bit(-1.5));
        assert!(!sign_bit(1.5));
    }

    #[test]
    fn install_aligns_with_type_side_names() {
        let g = install();
        for name in [
            "+", "-", "*", "/", "div", "mod", "^", "~", "abs", "=", "<>", "<", "<=", ">",
            ">=", "::", "@", "elem", "notelem", "o", "not", "map", "filter", "hd", "tl",
            "rev", "length", "bag", "chr", "ord", "ceil", "floor", "String", "Real", "sum",
            "count", "min", "max", "avg", "iterate", "use",
        ] {
            assert!(g.contains_key(name), "missing builtin {name}");
        }
    }
}
