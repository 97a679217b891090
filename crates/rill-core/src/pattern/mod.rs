//! Decision trees for compiled pattern matches.
//!
//! A `case` with multiple clauses compiles into a tree of constructor
//! tests over access paths into the scrutinee. Source clause order is
//! preserved; tests may be shared between clauses. Guards sit at leaves;
//! a failing guard falls through to the tree compiled from the remaining
//! clauses.

mod compile;

pub use compile::compile_match;

use num_bigint::BigInt;
use rill_typeck::DataId;

/// How to reach a sub-value of the scrutinee.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum AccessPath {
    /// The scrutinee itself.
    Root,
    /// The nth field of a record or tuple, in canonical label order.
    Field(Box<AccessPath>, usize),
    /// The payload of a datatype or exception constructor.
    Payload(Box<AccessPath>),
    /// Head of a non-empty list.
    Head(Box<AccessPath>),
    /// Tail of a non-empty list.
    Tail(Box<AccessPath>),
}

impl AccessPath {
    pub fn field(self, index: usize) -> AccessPath {
        AccessPath::Field(Box::new(self), index)
    }

    pub fn payload(self) -> AccessPath {
        AccessPath::Payload(Box::new(self))
    }

    pub fn head(self) -> AccessPath {
        AccessPath::Head(Box::new(self))
    }

    pub fn tail(self) -> AccessPath {
        AccessPath::Tail(Box::new(self))
    }
}

/// A constructor test performed by a switch node.
#[derive(Clone, Debug, PartialEq)]
pub enum TestCtor {
    Bool(bool),
    Int(BigInt),
    Str(String),
    Char(char),
    Unit,
    /// A datatype constructor.
    Variant { data: DataId, index: usize },
    /// An exception constructor, tested by name.
    Exn(String),
    Nil,
    Cons,
    /// The single constructor of an n-field record; never fails, only
    /// decomposes.
    Record(usize),
}

impl TestCtor {
    /// Number of sub-values the test exposes.
    pub fn arity(&self) -> usize {
        match self {
            TestCtor::Record(n) => *n,
            TestCtor::Cons => 2,
            TestCtor::Variant { .. } | TestCtor::Exn(_) => 1,
            _ => 0,
        }
    }

    /// Access paths of the exposed sub-values.
    pub fn sub_paths(&self, path: &AccessPath) -> Vec<AccessPath> {
        match self {
            TestCtor::Record(n) => (0..*n).map(|i| path.clone().field(i)).collect(),
            TestCtor::Cons => vec![path.clone().head(), path.clone().tail()],
            TestCtor::Variant { .. } | TestCtor::Exn(_) => vec![path.clone().payload()],
            _ => Vec::new(),
        }
    }
}

/// The compiled decision tree.
#[derive(Clone, Debug)]
pub enum DecisionTree {
    /// No clause matches: the evaluator raises `Match`.
    Fail,
    /// Clause `arm` matches. `bindings` map its variables to access
    /// paths. If the clause has a guard and it evaluates to false, the
    /// evaluator continues with `fallthrough`.
    Leaf {
        arm: usize,
        bindings: Vec<(String, AccessPath)>,
        fallthrough: Option<Box<DecisionTree>>,
    },
    /// Test the value at `path` against each constructor case in turn.
    Switch {
        path: AccessPath,
        cases: Vec<(TestCtor, DecisionTree)>,
        default: Option<Box<DecisionTree>>,
    },
}
