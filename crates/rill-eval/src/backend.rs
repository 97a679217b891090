//! The relational backend bridge.
//!
//! The evaluator hands a backend an opaque logical plan plus the values
//! of the plan's free scalar references (each with its JSON type
//! descriptor) and consumes the returned row bag. The in-memory table
//! backend below implements the interface for named tables registered in
//! a session; it doubles as the test double for push-down.

use num_bigint::BigInt;
use rill_core::{Plan, Scalar, TypeDesc};
use rill_typeck::Label;
use rustc_hash::FxHashMap;

use crate::value::{cmp_values, values_equal, Value};

/// A relational backend: executes a plan, returning materialized rows.
pub trait Backend {
    fn execute(
        &self,
        plan: &Plan,
        free: &[(String, TypeDesc, Value)],
    ) -> Result<Vec<Value>, String>;
}

/// An in-memory backend over named tables of record rows.
#[derive(Default)]
pub struct MemoryBackend {
    tables: FxHashMap<String, Vec<Value>>,
}

impl MemoryBackend {
    pub fn new() -> MemoryBackend {
        MemoryBackend::default()
    }

    /// Register a table. Rows should be record values.
    pub fn add_table(&mut self, name: impl Into<String>, rows: Vec<Value>) {
        self.tables.insert(name.into(), rows);
    }

    pub fn table_names(&self) -> Vec<String> {
        self.tables.keys().cloned().collect()
    }
}

impl Backend for MemoryBackend {
    fn execute(
        &self,
        plan: &Plan,
        free: &[(String, TypeDesc, Value)],
    ) -> Result<Vec<Value>, String> {
        let params: FxHashMap<&str, &Value> = free
            .iter()
            .map(|(name, _, value)| (name.as_str(), value))
            .collect();
        self.run(plan, &params)
    }
}

impl MemoryBackend {
    fn run(
        &self,
        plan: &Plan,
        params: &FxHashMap<&str, &Value>,
    ) -> Result<Vec<Value>, String> {
        match plan {
            Plan::Table { name } => self
                .tables
                .get(name)
                .cloned()
                .ok_or_else(|| format!("unknown table {name}")),
            Plan::Filter { input, predicate } => {
                let rows = self.run(input, params)?;
                let mut out = Vec::new();
                for row in rows {
                    match eval_scalar(predicate, &row, params)? {
                        Value::Bool(true) => out.push(row),
                        Value::Bool(false) => {}
                        other => {
                            return Err(format!("filter predicate produced {other:?}"))
                        }
                    }
                }
                Ok(out)
            }
            Plan::Project { input, fields } => {
                let rows = self.run(input, params)?;
                let mut out = Vec::with_capacity(rows.len());
                for row in rows {
                    let mut projected: Vec<(Label, Value)> = Vec::new();
                    for (name, scalar) in fields {
                        projected
                            .push((Label::new(name.clone()), eval_scalar(scalar, &row, params)?));
                    }
                    projected.sort_by(|a, b| a.0.cmp(&b.0));
                    out.push(Value::record(projected));
                }
                Ok(out)
            }
        }
    }
}

fn eval_scalar(
    scalar: &Scalar,
    row: &Value,
    params: &FxHashMap<&str, &Value>,
) -> Result<Value, String> {
    match scalar {
        Scalar::Int(text) => text
            .parse::<BigInt>()
            .map(Value::Int)
            .map_err(|e| e.to_string()),
        Scalar::Real(r) => Ok(Value::Real(*r)),
        Scalar::Str(s) => Ok(Value::str(s)),
        Scalar::Bool(b) => Ok(Value::Bool(*b)),
        Scalar::Column(name) => row
            .field(&Label::new(name.clone()))
            .cloned()
            .ok_or_else(|| format!("row has no column {name}")),
        Scalar::Param(name) => params
            .get(name.as_str())
            .map(|v| (*v).clone())
            .ok_or_else(|| format!("missing parameter {name}")),
        Scalar::Op { op, args } => {
            let values: Vec<Value> = args
                .iter()
                .map(|a| eval_scalar(a, row, params))
                .collect::<Result<_, _>>()?;
            apply_op(op, &values)
        }
    }
}

fn apply_op(op: &str, args: &[Value]) -> Result<Value, String> {
    match (op, args) {
        ("not", [Value::Bool(b)]) => Ok(Value::Bool(!b)),
        ("andalso", [Value::Bool(a), Value::Bool(b)]) => Ok(Value::Bool(*a && *b)),
        ("orelse", [Value::Bool(a), Value::Bool(b)]) => Ok(Value::Bool(*a || *b)),
        ("=", [a, b]) => Ok(Value::Bool(values_equal(a, b))),
        ("<>", [a, b]) => Ok(Value::Bool(!values_equal(a, b))),
        ("<", [a, b]) => Ok(Value::Bool(cmp_values(a, b).is_lt())),
        ("<=", [a, b]) => Ok(Value::Bool(cmp_values(a, b).is_le())),
        (">", [a, b]) => Ok(Value::Bool(cmp_values(a, b).is_gt())),
        (">=", [a, b]) => Ok(Value::Bool(cmp_values(a, b).is_ge())),
        ("+", [Value::Int(a), Value::Int(b)]) => Ok(Value::Int(a + b)),
        ("-", [Value::Int(a), Value::Int(b)]) => Ok(Value::Int(a - b)),
        ("*", [Value::Int(a), Value::Int(b)]) => Ok(Value::Int(a * b)),
        ("+", [Value::Real(a), Value::Real(b)]) => Ok(Value::Real(a + b)),
        ("-", [Value::Real(a), Value::Real(b)]) => Ok(Value::Real(a - b)),
        ("*", [Value::Real(a), Value::Real(b)]) => Ok(Value::Real(a * b)),
        ("/", [Value::Real(a), Value::Real(b)]) => Ok(Value::Real(a / b)),
        _ => Err(format!("backend cannot apply {op}")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rill_core::Scalar;

    fn row(a: i64, b: i64) -> Value {
        Value::record(vec![
            (Label::new("a"), Value::int(a)),
            (Label::new("b"), Value::int(b)),
        ])
    }

    #[test]
    fn table_scan_and_filter() {
        let mut backend = MemoryBackend::new();
        backend.add_table("t", vec![row(1, 10), row(2, 20), row(3, 30)]);
        let plan = Plan::Filter {
            input: Box::new(Plan::Table {
                name: "t".to_string(),
            }),
            predicate: Scalar::Op {
                op: "<".to_string(),
                args: vec![Scalar::Column("a".to_string()), Scalar::Int("3".to_string())],
            },
        };
        let rows = backend.execute(&plan, &[]).expect("plan runs");
        assert_eq!(rows.len(), 2);
    }

    #[test]
    fn parameters_reach_predicates() {
        let mut backend = MemoryBackend::new();
        backend.add_table("t", vec![row(1, 10), row(2, 20)]);
        let plan = Plan::Filter {
            input: Box::new(Plan::Table {
                name: "t".to_string(),
            }),
            predicate: Scalar::Op {
                op: "=".to_string(),
                args: vec![
                    Scalar::Column("a".to_string()),
                    Scalar::Param("x".to_string()),
                ],
            },
        };
        let free = vec![(
            "x".to_string(),
            TypeDesc::of(&rill_typeck::Type::int()).expect("int descriptor"),
            Value::int(2),
        )];
        let rows = backend.execute(&plan, &free).expect("plan runs");
        assert_eq!(rows.len(), 1);
    }

    #[test]
    fn projection_builds_records() {
        let mut backend = MemoryBackend::new();
        backend.add_table("t", vec![row(1, 10)]);
        let plan = Plan::Project {
            input: Box::new(Plan::Table {
                name: "t".to_string(),
            }),
            fields: vec![(
                "double".to_string(),
                Scalar::Op {
                    op: "*".to_string(),
                    args: vec![Scalar::Column("b".to_string()), Scalar::Int("2".to_string())],
                },
            )],
        };
        let rows = backend.execute(&plan, &[]).expect("plan runs");
        match &rows[0] {
            Value::Record(fields) => {
                assert_eq!(fields[0].0.as_str(), "double");
                assert!(values_equal(&fields[0].1, &Value::int(20)));
            }
            other => panic!("expected record, got {other:?}"),
        }
    }

    #[test]
    fn unknown_table_is_an_error() {
        let backend = MemoryBackend::new();
        let plan = Plan::Table {
            name: "missing".to_string(),
        };
        assert!(backend.execute(&plan, &[]).is_err());
    }
}
