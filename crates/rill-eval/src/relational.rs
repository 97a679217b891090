//! Relational pipeline evaluation.
//!
//! A pipeline is an explicit loop nest: each scan opens an iterator over
//! its source, and each step transforms the current row sequence. Rows
//! carry both their binding environment (for the step expressions) and
//! their value under the pipeline's current row shape. `group` goes
//! through an ordered map from key to accumulated rows, `order` is a
//! stable sort with per-key direction, and the set operations are
//! multiset operations.

use std::collections::{BTreeMap, BTreeSet};

use rill_common::span::Span;
use rill_core::{CoreAgg, CoreExpr, CorePat, CoreQuery, CoreStep};
use rill_typeck::{Label, Type};
use num_traits::ToPrimitive;

use crate::env::Env;
use crate::eval::Evaluator;
use crate::value::{EvalResult, OrdValue, Packet, Value};

/// One row: the environment its bindings extend, and its value under the
/// current row shape.
type Row = (Env, Value);

/// The statically tracked row shape, mirrored from the type checker.
#[derive(Clone, Debug, Default)]
struct Shape {
    names: Vec<String>,
    force_record: bool,
    anon: bool,
}

impl Shape {
    fn scan(&mut self, pat: &CorePat) {
        self.names.extend(pat.bound_vars());
        self.anon = false;
    }

    fn rebind(&mut self, names: Vec<String>, force_record: bool) {
        self.anon = names.is_empty();
        self.names = names;
        self.force_record = force_record;
    }

    /// Construct the row value from the bindings in `env`.
    fn row_value(&self, env: &Env, current: &Value) -> Value {
        if self.anon {
            return current.clone();
        }
        match self.names.len() {
            0 => Value::Unit,
            1 if !self.force_record => env
                .lookup(&self.names[0])
                .unwrap_or(Value::Unit),
            _ => {
                let mut fields: Vec<(Label, Value)> = self
                    .names
                    .iter()
                    .map(|n| {
                        (
                            Label::new(n.clone()),
                            env.lookup(n).unwrap_or(Value::Unit),
                        )
                    })
                    .collect();
                fields.sort_by(|a, b| a.0.cmp(&b.0));
                Value::record(fields)
            }
        }
    }

    /// Rebuild a row environment from a row value (for set-operation
    /// sources, whose rows arrive as plain values).
    fn env_of_value(&self, base: &Env, value: &Value) -> Env {
        if self.anon {
            return base.clone();
        }
        match self.names.len() {
            0 => base.clone(),
            1 if !self.force_record => base.bind(self.names[0].clone(), value.clone()),
            _ => match value {
                Value::Record(fields) => base.bind_all(
                    fields
                        .iter()
                        .map(|(l, v)| (l.as_str().to_string(), v.clone())),
                ),
                _ => base.clone(),
            },
        }
    }
}

/// Evaluate a pipeline to its collection (or, under a terminal `compute`
/// or `into`, its scalar) value.
pub fn eval_query(
    ev: &mut Evaluator,
    env: &Env,
    query: &CoreQuery,
    span: Span,
) -> EvalResult<Value> {
    let mut rows: Vec<Row> = vec![(env.clone(), Value::Unit)];
    let mut ordered = true;
    let mut shape = Shape::default();

    for step in &query.steps {
        match step {
            CoreStep::Scan { pat, source } => {
                let source = source.as_ref().ok_or_else(|| {
                    Packet::with_message(
                        "Error",
                        "unsolved scan reached the evaluator",
                        pat.span,
                    )
                })?;
                shape.scan(pat);
                let mut next = Vec::new();
                for (renv, _) in &rows {
                    let coll = ev.eval(renv, source)?;
                    let items = match &coll {
                        Value::List(items) => items.clone(),
                        Value::Bag(items) => {
                            ordered = false;
                            items.clone()
                        }
                        _ => {
                            return Err(Packet::with_message(
                                "Error",
                                "scan source is not a collection",
                                pat.span,
                            ))
                        }
                    };
                    for item in items.iter() {
                        let mut binds = Vec::new();
                        if ev.match_pat(item, pat, &mut binds) {
                            let env2 = renv.bind_all(binds);
                            let value = shape.row_value(&env2, item);
                            next.push((env2, value));
                        }
                    }
                }
                rows = next;
            }

            CoreStep::Where(pred) => {
                let mut next = Vec::new();
                for row in rows {
                    match ev.eval(&row.0, pred)? {
                        Value::Bool(true) => next.push(row),
                        Value::Bool(false) => {}
                        _ => {
                            return Err(Packet::with_message(
                                "Error",
                                "where predicate is not a boolean",
                                pred.span,
                            ))
                        }
                    }
                }
                rows = next;
            }

            CoreStep::Yield(e) => {
                let record_fields = yield_record_fields(e);
                let mut next = Vec::new();
                for (renv, _) in rows {
                    let value = ev.eval(&renv, e)?;
                    let env2 = match &record_fields {
                        Some(_) => match &value {
                            Value::Record(fields) => renv.bind_all(
                                fields
                                    .iter()
                                    .map(|(l, v)| (l.as_str().to_string(), v.clone())),
                            ),
                            _ => renv,
                        },
                        None => renv,
                    };
                    next.push((env2, value));
                }
                rows = next;
                match record_fields {
                    Some(names) => shape.rebind(names, true),
                    None => shape.rebind(Vec::new(), false),
                }
            }

            CoreStep::Group { keys, aggs } => {
                let mut groups: BTreeMap<OrdValue, Vec<Row>> = BTreeMap::new();
                for row in rows {
                    let mut key_vals = Vec::with_capacity(keys.len());
                    for (_, key) in keys {
                        key_vals.push(ev.eval(&row.0, key)?);
                    }
                    groups
                        .entry(OrdValue(Value::list(key_vals)))
                        .or_default()
                        .push(row);
                }

                let mut next = Vec::new();
                for (OrdValue(key_value), group_rows) in groups {
                    let key_vals = match &key_value {
                        Value::List(items) => items.clone(),
                        _ => unreachable!("group keys are collected in a list"),
                    };
                    let mut binds: Vec<(String, Value)> = keys
                        .iter()
                        .zip(key_vals.iter())
                        .map(|((label, _), v)| (label.as_str().to_string(), v.clone()))
                        .collect();
                    for agg in aggs {
                        let value = eval_agg(ev, env, &group_rows, agg, ordered, span)?;
                        binds.push((agg.label.as_str().to_string(), value));
                    }
                    let mut fields: Vec<(Label, Value)> = binds
                        .iter()
                        .map(|(n, v)| (Label::new(n.clone()), v.clone()))
                        .collect();
                    fields.sort_by(|a, b| a.0.cmp(&b.0));
                    let value = Value::record(fields);
                    let env2 = env.bind_all(binds);
                    next.push((env2, value));
                }
                rows = next;
                shape.rebind(
                    keys.iter()
                        .map(|(l, _)| l.as_str().to_string())
                        .chain(aggs.iter().map(|a| a.label.as_str().to_string()))
                        .collect(),
                    true,
                );
            }

            CoreStep::Order { keys } => {
                let mut decorated: Vec<(Vec<Value>, Row)> = Vec::with_capacity(rows.len());
                for row in rows {
                    let mut key_vals = Vec::with_capacity(keys.len());
                    for (key, _) in keys {
                        key_vals.push(ev.eval(&row.0, key)?);
                    }
                    decorated.push((key_vals, row));
                }
                decorated.sort_by(|(ka, _), (kb, _)| {
                    for (i, (_, desc)) in keys.iter().enumerate() {
                        let ord = crate::value::cmp_values(&ka[i], &kb[i]);
                        let ord = if *desc { ord.reverse() } else { ord };
                        if ord != std::cmp::Ordering::Equal {
                            return ord;
                        }
                    }
                    std::cmp::Ordering::Equal
                });
                rows = decorated.into_iter().map(|(_, row)| row).collect();
                ordered = true;
            }

            CoreStep::Take(e) => {
                let n = int_arg(ev, env, e)?;
                rows.truncate(n);
            }

            CoreStep::Skip(e) => {
                let n = int_arg(ev, env, e)?;
                rows.drain(..n.min(rows.len()));
            }

            CoreStep::Distinct => {
                rows = distinct_rows(rows);
            }

            CoreStep::Unorder => ordered = false,

            CoreStep::Union {
                distinct,
                sources,
            } => {
                for src in sources {
                    let coll = ev.eval(env, src)?;
                    if matches!(coll, Value::Bag(_)) {
                        ordered = false;
                    }
                    let items = coll
                        .collection_items()
                        .ok_or_else(|| non_collection(src))?
                        .to_vec();
                    let items = if *distinct { dedupe(items) } else { items };
                    for item in items {
                        let env2 = shape.env_of_value(env, &item);
                        rows.push((env2, item));
                    }
                }
                if *distinct {
                    rows = distinct_rows(rows);
                }
            }

            CoreStep::Intersect { distinct, sources } => {
                for src in sources {
                    let coll = ev.eval(env, src)?;
                    if matches!(coll, Value::Bag(_)) {
                        ordered = false;
                    }
                    let items = coll
                        .collection_items()
                        .ok_or_else(|| non_collection(src))?;
                    let mut counts: BTreeMap<OrdValue, usize> = BTreeMap::new();
                    for item in items {
                        *counts.entry(OrdValue(item.clone())).or_default() += 1;
                    }
                    rows.retain_mut(|row| {
                        match counts.get_mut(&OrdValue(row.1.clone())) {
                            Some(n) if *n > 0 => {
                                *n -= 1;
                                true
                            }
                            _ => false,
                        }
                    });
                }
                if *distinct {
                    rows = distinct_rows(rows);
                }
            }

            CoreStep::Except { distinct, sources } => {
                for src in sources {
                    let coll = ev.eval(env, src)?;
                    if matches!(coll, Value::Bag(_)) {
                        ordered = false;
                    }
                    let items = coll
                        .collection_items()
                        .ok_or_else(|| non_collection(src))?;
                    let mut counts: BTreeMap<OrdValue, usize> = BTreeMap::new();
                    for item in items {
                        *counts.entry(OrdValue(item.clone())).or_default() += 1;
                    }
                    rows.retain_mut(|row| {
                        match counts.get_mut(&OrdValue(row.1.clone())) {
                            Some(n) if *n > 0 => {
                                *n -= 1;
                                false
                            }
                            _ => true,
                        }
                    });
                }
                if *distinct {
                    rows = distinct_rows(rows);
                }
            }

            CoreStep::Through { pat, func } => {
                let coll = collection_value(&rows, ordered);
                let f = ev.eval(env, func)?;
                let result = ev.apply(f, coll, span)?;
                let items = match &result {
                    Value::List(items) => items.clone(),
                    Value::Bag(items) => {
                        ordered = false;
                        items.clone()
                    }
                    _ => return Err(non_collection(func)),
                };
                shape.rebind(pat.bound_vars(), false);
                let mut next = Vec::new();
                for item in items.iter() {
                    let mut binds = Vec::new();
                    if ev.match_pat(item, pat, &mut binds) {
                        let env2 = env.bind_all(binds);
                        next.push((env2, item.clone()));
                    }
                }
                rows = next;
            }

            CoreStep::Compute(aggs) => {
                if aggs.len() == 1 {
                    return eval_agg(ev, env, &rows, &aggs[0], ordered, span);
                }
                let mut fields = Vec::with_capacity(aggs.len());
                for agg in aggs {
                    let value = eval_agg(ev, env, &rows, agg, ordered, span)?;
                    fields.push((agg.label.clone(), value));
                }
                fields.sort_by(|a, b| a.0.cmp(&b.0));
                return Ok(Value::record(fields));
            }

            CoreStep::Into(func) => {
                let coll = collection_value(&rows, ordered);
                let f = ev.eval(env, func)?;
                return ev.apply(f, coll, span);
            }
        }
    }

    Ok(collection_value(&rows, ordered))
}

/// The labels of a record-typed yield, which introduce field bindings.
fn yield_record_fields(e: &CoreExpr) -> Option<Vec<String>> {
    match &e.ty {
        Type::Record(fields) if Type::as_tuple(fields).is_none() => Some(
            fields
                .iter()
                .map(|(l, _)| l.as_str().to_string())
                .collect(),
        ),
        _ => None,
    }
}

/// Apply one aggregate: the function receives the collection of argument
/// values (or of whole rows).
fn eval_agg(
    ev: &mut Evaluator,
    base: &Env,
    rows: &[Row],
    agg: &CoreAgg,
    ordered: bool,
    span: Span,
) -> EvalResult<Value> {
    let func_env = rows.first().map(|(e, _)| e.clone()).unwrap_or(base.clone());
    let f = ev.eval(&func_env, &agg.func)?;
    let mut values = Vec::with_capacity(rows.len());
    for (renv, rval) in rows {
        values.push(match &agg.arg {
            Some(e) => ev.eval(renv, e)?,
            None => rval.clone(),
        });
    }
    let coll = if ordered {
        Value::list(values)
    } else {
        Value::bag(values)
    };
    ev.apply(f, coll, span)
}

fn collection_value(rows: &[Row], ordered: bool) -> Value {
    let values: Vec<Value> = rows.iter().map(|(_, v)| v.clone()).collect();
    if ordered {
        Value::list(values)
    } else {
        Value::bag(values)
    }
}

fn distinct_rows(rows: Vec<Row>) -> Vec<Row> {
    let mut seen: BTreeSet<OrdValue> = BTreeSet::new();
    rows.into_iter()
        .filter(|(_, v)| seen.insert(OrdValue(v.clone())))
        .collect()
}

fn dedupe(items: Vec<Value>) -> Vec<Value> {
    let mut seen: BTreeSet<OrdValue> = BTreeSet::new();
    items
        .into_iter()
        .filter(|v| seen.insert(OrdValue(v.clone())))
        .collect()
}

fn int_arg(ev: &mut Evaluator, env: &Env, e: &CoreExpr) -> EvalResult<usize> {
    match ev.eval(env, e)? {
        Value::Int(n) => Ok(n.to_usize().unwrap_or(0)),
        _ => Err(Packet::with_message(
            "Error",
            "take/skip count is not an integer",
            e.span,
        )),
    }
}

fn non_collection(e: &CoreExpr) -> Packet {
    Packet::with_message("Error", "expected a collection", e.span)
}
