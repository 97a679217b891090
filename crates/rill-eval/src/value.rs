//! Runtime values.
//!
//! Values are shared by immutable `Rc` reference; closures capture their
//! environment the same way. Integers are arbitrary-precision. A total
//! order over values backs grouping, `distinct`, ordering, and the set
//! operations, which keeps evaluation deterministic.

use std::cell::RefCell;
use std::cmp::Ordering;
use std::rc::Rc;

use num_bigint::BigInt;
use rill_common::span::Span;
use rill_core::CoreExpr;
use rill_typeck::{DataId, Label};

use crate::env::Env;

/// A runtime value.
#[derive(Clone, Debug)]
pub enum Value {
    Int(BigInt),
    Real(f64),
    Bool(bool),
    Char(char),
    Str(Rc<str>),
    /// Record or tuple: fields in canonical label order.
    Record(Rc<Vec<(Label, Value)>>),
    List(Rc<Vec<Value>>),
    /// Unordered multiset.
    Bag(Rc<Vec<Value>>),
    /// Datatype constructor application.
    Ctor {
        name: Rc<str>,
        data: DataId,
        index: usize,
        arg: Option<Rc<Value>>,
    },
    /// An exception value (constructor applied to its payload).
    Exn(Rc<ExnValue>),
    Closure(Rc<Closure>),
    Builtin(Builtin),
    /// An overload group; `VarInst` references select one instance.
    Overload(Rc<Vec<Value>>),
    Unit,
}

/// An exception value: name, optional payload, and the position of the
/// constructor application for diagnostics.
#[derive(Clone, Debug)]
pub struct ExnValue {
    pub name: String,
    pub payload: Option<Value>,
    pub span: Span,
}

/// A closure: a single-argument function body with its captured
/// environment. The environment cell is patched once after `letrec`
/// groups are tied.
#[derive(Debug)]
pub struct Closure {
    pub param: String,
    pub body: CoreExpr,
    pub env: RefCell<Env>,
}

/// A built-in function: a name into the builtin table, the number of
/// applications it expects, and the arguments collected so far.
#[derive(Clone, Debug)]
pub struct Builtin {
    pub name: &'static str,
    pub arity: u8,
    pub args: Vec<Value>,
}

impl Builtin {
    pub fn new(name: &'static str, arity: u8) -> Builtin {
        Builtin {
            name,
            arity,
            args: Vec::new(),
        }
    }
}

/// The ML exception packet carried through `Result`.
#[derive(Clone, Debug)]
pub struct Packet {
    pub name: String,
    pub payload: Option<Value>,
    pub span: Span,
}

impl Packet {
    pub fn new(name: &str, span: Span) -> Packet {
        Packet {
            name: name.to_string(),
            payload: None,
            span,
        }
    }

    pub fn with_message(name: &str, message: &str, span: Span) -> Packet {
        Packet {
            name: name.to_string(),
            payload: Some(Value::Str(Rc::from(message))),
            span,
        }
    }
}

pub type EvalResult<T> = Result<T, Packet>;

impl Value {
    pub fn str(s: impl AsRef<str>) -> Value {
        Value::Str(Rc::from(s.as_ref()))
    }

    pub fn list(items: Vec<Value>) -> Value {
        Value::List(Rc::new(items))
    }

    pub fn bag(items: Vec<Value>) -> Value {
        Value::Bag(Rc::new(items))
    }

    pub fn record(fields: Vec<(Label, Value)>) -> Value {
        Value::Record(Rc::new(fields))
    }

    pub fn int(n: i64) -> Value {
        Value::Int(BigInt::from(n))
    }

    /// Items of a list or bag value.
    pub fn collection_items(&self) -> Option<&[Value]> {
        match self {
            Value::List(items) | Value::Bag(items) => Some(items),
            _ => None,
        }
    }

    /// A field of a record value, by label.
    pub fn field(&self, label: &Label) -> Option<&Value> {
        match self {
            Value::Record(fields) => fields
                .iter()
                .find(|(l, _)| l == label)
                .map(|(_, v)| v),
            _ => None,
        }
    }
}

// ── Total order ────────────────────────────────────────────────────────

/// Total order over values of one type. Reals use the IEEE total order;
/// functions compare equal (they never reach ordered contexts through a
/// well-typed program).
pub fn cmp_values(a: &Value, b: &Value) -> Ordering {
    match (a, b) {
        (Value::Int(x), Value::Int(y)) => x.cmp(y),
        (Value::Real(x), Value::Real(y)) => x.total_cmp(y),
        (Value::Bool(x), Value::Bool(y)) => x.cmp(y),
        (Value::Char(x), Value::Char(y)) => x.cmp(y),
        (Value::Str(x), Value::Str(y)) => x.cmp(y),
        (Value::Unit, Value::Unit) => Ordering::Equal,
        (Value::Record(x), Value::Record(y)) => {
            for ((_, va), (_, vb)) in x.iter().zip(y.iter()) {
                match cmp_values(va, vb) {
                    Ordering::Equal => continue,
                    other => return other,
                }
            }
            x.len().cmp(&y.len())
        }
        (Value::List(x), Value::List(y)) | (Value::Bag(x), Value::Bag(y)) => {
            for (va, vb) in x.iter().zip(y.iter()) {
                match cmp_values(va, vb) {
                    Ordering::Equal => continue,
                    other => return other,
                }
            }
            x.len().cmp(&y.len())
        }
        (
            Value::Ctor {
                index: ia, arg: aa, ..
            },
            Value::Ctor {
                index: ib, arg: ab, ..
            },
        ) => match ia.cmp(ib) {
            Ordering::Equal => match (aa, ab) {
                (Some(x), Some(y)) => cmp_values(x, y),
                (None, None) => Ordering::Equal,
                (None, Some(_)) => Ordering::Less,
                (Some(_), None) => Ordering::Greater,
            },
            other => other,
        },
        (Value::Exn(x), Value::Exn(y)) => match x.name.cmp(&y.name) {
            Ordering::Equal => match (&x.payload, &y.payload) {
                (Some(px), Some(py)) => cmp_values(px, py),
                (None, None) => Ordering::Equal,
                (None, Some(_)) => Ordering::Less,
                (Some(_), None) => Ordering::Greater,
            },
            other => other,
        },
        // Mixed or functional values: stable but arbitrary.
        _ => Ordering::Equal,
    }
}

/// Structural equality, as the `=` operator sees it.
pub fn values_equal(a: &Value, b: &Value) -> bool {
    cmp_values(a, b) == Ordering::Equal
}

/// An ordering wrapper so values can key `BTreeMap`s (grouping, distinct,
/// multiset operations).
#[derive(Clone, Debug)]
pub struct OrdValue(pub Value);

impl PartialEq for OrdValue {
    fn eq(&self, other: &Self) -> bool {
        values_equal(&self.0, &other.0)
    }
}

impl Eq for OrdValue {}

impl PartialOrd for OrdValue {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for OrdValue {
    fn cmp(&self, other: &Self) -> Ordering {
        cmp_values(&self.0, &other.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn int_ordering() {
        assert_eq!(cmp_values(&Value::int(1), &Value::int(2)), Ordering::Less);
        assert!(values_equal(&Value::int(5), &Value::int(5)));
    }

    #[test]
    fn list_ordering_is_lexicographic() {
        let a = Value::list(vec![Value::int(1), Value::int(2)]);
        let b = Value::list(vec![Value::int(1), Value::int(3)]);
        assert_eq!(cmp_values(&a, &b), Ordering::Less);
        let shorter = Value::list(vec![Value::int(1)]);
        assert_eq!(cmp_values(&shorter, &a), Ordering::Less);
    }

    #[test]
    fn record_equality_is_fieldwise() {
        let a = Value::record(vec![
            (Label::new("a"), Value::int(1)),
            (Label::new("b"), Value::int(2)),
        ]);
        let b = Value::record(vec![
            (Label::new("a"), Value::int(1)),
            (Label::new("b"), Value::int(2)),
        ]);
        assert!(values_equal(&a, &b));
    }

    #[test]
    fn real_total_order_handles_nan() {
        let nan = Value::Real(f64::NAN);
        assert_eq!(cmp_values(&nan, &nan), Ordering::Equal);
        assert_eq!(
            cmp_values(&Value::Real(f64::NEG_INFINITY), &Value::Real(0.0)),
            Ordering::Less
        );
    }
}
