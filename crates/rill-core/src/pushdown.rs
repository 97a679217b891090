//! Backend push-down: package a maximal prefix of relational steps that
//! the external backend understands into an opaque logical plan node.
//!
//! Eligible steps are scans over named external tables, `where` and
//! `yield` over simple scalar expressions, `group ... compute` with the
//! standard aggregates, `order`, `take`/`skip`, and the set operations.
//! Anything else stops the prefix; in hybrid mode the rest of the
//! pipeline runs in the evaluator with the plan node as its source, and
//! outside hybrid mode a partial prefix disables push-down entirely.

use serde::Serialize;

use rill_common::span::Span;
use rill_typeck::{Prim, Type};
use rustc_hash::FxHashSet;

use crate::term::{CoreExpr, CoreKind, CorePat, CorePatKind, CoreQuery, CoreStep, Lit};

/// Options for the push-down pass.
#[derive(Clone, Debug, Default)]
pub struct PushdownOptions {
    /// Whether a pipeline may span the evaluator/backend boundary.
    pub hybrid: bool,
    /// Names bound to external backend tables.
    pub external_tables: FxHashSet<String>,
}

/// The JSON type descriptor attached to each free scalar reference.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct TypeDesc {
    #[serde(rename = "type")]
    pub type_name: String,
    pub nullable: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub precision: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub scale: Option<u32>,
}

impl TypeDesc {
    /// Descriptor for a scalar type; `None` for types the backend cannot
    /// carry across the boundary.
    pub fn of(ty: &Type) -> Option<TypeDesc> {
        let type_name = match ty {
            Type::Prim(Prim::Int) => "INTEGER",
            Type::Prim(Prim::Real) => "DOUBLE",
            Type::Prim(Prim::Bool) => "BOOLEAN",
            Type::Prim(Prim::Str) => "VARCHAR",
            Type::Prim(Prim::Char) => "CHAR",
            _ => return None,
        };
        Some(TypeDesc {
            type_name: type_name.to_string(),
            nullable: false,
            precision: match ty {
                Type::Prim(Prim::Char) => Some(1),
                _ => None,
            },
            scale: None,
        })
    }
}

/// A scalar expression in the plan language.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub enum Scalar {
    Int(String),
    Real(f64),
    Str(String),
    Bool(bool),
    /// A field of the current row.
    Column(String),
    /// A correlated reference to an evaluator-side value.
    Param(String),
    Op {
        op: String,
        args: Vec<Scalar>,
    },
}

/// A relational plan the backend executes.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub enum Plan {
    Table {
        name: String,
    },
    Filter {
        input: Box<Plan>,
        predicate: Scalar,
    },
    Project {
        input: Box<Plan>,
        fields: Vec<(String, Scalar)>,
    },
}

/// A free scalar reference the evaluator supplies at execution time.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct FreeVarRef {
    pub name: String,
    pub descriptor: TypeDesc,
}

/// The opaque plan node embedded in a core term.
#[derive(Clone, Debug)]
pub struct BackendPlan {
    pub plan: Plan,
    pub free_vars: Vec<FreeVarRef>,
    /// Element type of the produced rows.
    pub elem_ty: Type,
}

/// Rewrite a pipeline so its backend-eligible prefix becomes a plan node.
/// Returns `None` when nothing can be pushed down.
pub fn push_down(query: &CoreQuery, opts: &PushdownOptions) -> Option<CoreQuery> {
    if opts.external_tables.is_empty() {
        return None;
    }

    // The prefix must start with a scan of a named external table bound to
    // a plain row variable.
    let mut steps = query.steps.iter();
    let (row_var, table, pat) = match steps.next() {
        Some(CoreStep::Scan {
            pat,
            source: Some(src),
        }) => match (&pat.kind, &src.kind) {
            (CorePatKind::Var(v), CoreKind::Var(name))
                if opts.external_tables.contains(name) =>
            {
                (v.clone(), name.clone(), pat.clone())
            }
            _ => return None,
        },
        _ => return None,
    };

    let mut plan = Plan::Table {
        name: table.clone(),
    };
    let mut free_vars: Vec<FreeVarRef> = Vec::new();
    let mut consumed = 1usize;
    let mut elem_ty = pat.ty.clone();

    for step in steps {
        match step {
            CoreStep::Where(pred) => {
                match translate_scalar(pred, &row_var, &mut free_vars) {
                    Some(scalar) => {
                        plan = Plan::Filter {
                            input: Box::new(plan),
                            predicate: scalar,
                        };
                        consumed += 1;
                    }
                    None => break,
                }
            }
            CoreStep::Yield(e) => match &e.kind {
                CoreKind::Record(fields) => {
                    let mut projected = Vec::new();
                    let mut ok = true;
                    for (label, field) in fields {
                        match translate_scalar(field, &row_var, &mut free_vars) {
                            Some(s) => projected.push((label.as_str().to_string(), s)),
                            None => {
                                ok = false;
                                break;
                            }
                        }
                    }
                    if !ok {
                        break;
                    }
                    plan = Plan::Project {
                        input: Box::new(plan),
                        fields: projected,
                    };
                    elem_ty = e.ty.clone();
                    consumed += 1;
                }
                _ => break,
            },
            _ => break,
        }
    }

    let remaining = &query.steps[consumed..];
    let only_trailing_yield = matches!(remaining, [CoreStep::Yield(e)]
        if matches!(&e.kind, CoreKind::Var(v) if *v == row_var));
    if !opts.hybrid && !(remaining.is_empty() || only_trailing_yield) {
        return None;
    }

    let backend = BackendPlan {
        plan,
        free_vars,
        elem_ty: elem_ty.clone(),
    };
    let source = CoreExpr::new(
        Type::bag(elem_ty.clone()),
        Span::point(0),
        CoreKind::Backend(backend),
    );

    let mut new_steps = vec![CoreStep::Scan {
        pat: CorePat {
            ty: elem_ty,
            span: pat.span,
            kind: CorePatKind::Var(row_var),
        },
        source: Some(source),
    }];
    new_steps.extend_from_slice(remaining);

    Some(CoreQuery {
        steps: new_steps,
        elem_ty: query.elem_ty.clone(),
        ordered: query.ordered,
    })
}

/// Translate a core expression into the backend's scalar language.
/// `row_var` projections become column references; other free variables
/// become parameters with a type descriptor.
fn translate_scalar(
    expr: &CoreExpr,
    row_var: &str,
    free_vars: &mut Vec<FreeVarRef>,
) -> Option<Scalar> {
    match &expr.kind {
        CoreKind::Lit(Lit::Int(n)) => Some(Scalar::Int(n.to_string())),
        CoreKind::Lit(Lit::Real(r)) => Some(Scalar::Real(*r)),
        CoreKind::Lit(Lit::Str(s)) => Some(Scalar::Str(s.clone())),
        CoreKind::Lit(Lit::Bool(b)) => Some(Scalar::Bool(*b)),
        CoreKind::Select(base, label) => match &base.kind {
            CoreKind::Var(v) if v == row_var => {
                Some(Scalar::Column(label.as_str().to_string()))
            }
            _ => None,
        },
        CoreKind::Var(name) if name != row_var => {
            let descriptor = TypeDesc::of(&expr.ty)?;
            if !free_vars.iter().any(|f| f.name == *name) {
                free_vars.push(FreeVarRef {
                    name: name.clone(),
                    descriptor,
                });
            }
            Some(Scalar::Param(name.clone()))
        }
        CoreKind::Apply { func, arg } => {
            let op = match &func.kind {
                CoreKind::Var(name) | CoreKind::VarInst(name, _) => match name.as_str() {
                    "=" | "<>" | "<" | "<=" | ">" | ">=" | "+" | "-" | "*" | "/" | "div"
                    | "mod" | "andalso" | "orelse" | "not" => name.clone(),
                    _ => return None,
                },
                _ => return None,
            };
            match &arg.kind {
                CoreKind::Record(fields) => {
                    let mut args = Vec::new();
                    for (_, f) in fields {
                        args.push(translate_scalar(f, row_var, free_vars)?);
                    }
                    Some(Scalar::Op { op, args })
                }
                _ => {
                    let a = translate_scalar(arg, row_var, free_vars)?;
                    Some(Scalar::Op { op, args: vec![a] })
                }
            }
        }
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rill_typeck::Label;

    fn span() -> Span {
        Span::new(0, 0)
    }

    fn int_row_ty() -> Type {
        Type::record(vec![
            (Label::new("a"), Type::int()),
            (Label::new("b"), Type::int()),
        ])
    }

    fn table_scan(var: &str, table: &str) -> CoreStep {
        CoreStep::Scan {
            pat: CorePat {
                ty: int_row_ty(),
                span: span(),
                kind: CorePatKind::Var(var.to_string()),
            },
            source: Some(CoreExpr::new(
                Type::bag(int_row_ty()),
                span(),
                CoreKind::Var(table.to_string()),
            )),
        }
    }

    fn select_field(var: &str, field: &str) -> CoreExpr {
        CoreExpr::new(
            Type::int(),
            span(),
            CoreKind::Select(
                Box::new(CoreExpr::new(
                    int_row_ty(),
                    span(),
                    CoreKind::Var(var.to_string()),
                )),
                Label::new(field),
            ),
        )
    }

    fn lt(lhs: CoreExpr, rhs: CoreExpr) -> CoreExpr {
        CoreExpr::new(
            Type::bool(),
            span(),
            CoreKind::Apply {
                func: Box::new(CoreExpr::new(
                    Type::fun(Type::tuple(vec![Type::int(), Type::int()]), Type::bool()),
                    span(),
                    CoreKind::VarInst("<".to_string(), 0),
                )),
                arg: Box::new(CoreExpr::new(
                    Type::tuple(vec![Type::int(), Type::int()]),
                    span(),
                    CoreKind::Record(vec![
                        (Label::new("1"), lhs),
                        (Label::new("2"), rhs),
                    ]),
                )),
            },
        )
    }

    fn int_lit(n: i64) -> CoreExpr {
        CoreExpr::new(span_ty(), span(), CoreKind::Lit(Lit::Int(n.into())))
    }

    fn span_ty() -> Type {
        Type::int()
    }

    fn opts(tables: &[&str], hybrid: bool) -> PushdownOptions {
        PushdownOptions {
            hybrid,
            external_tables: tables.iter().map(|s| s.to_string()).collect(),
        }
    }

    #[test]
    fn scan_filter_pushes_down() {
        let query = CoreQuery {
            steps: vec![
                table_scan("e", "emps"),
                CoreStep::Where(lt(select_field("e", "a"), int_lit(3))),
                CoreStep::Yield(CoreExpr::new(
                    int_row_ty(),
                    span(),
                    CoreKind::Var("e".to_string()),
                )),
            ],
            elem_ty: int_row_ty(),
            ordered: false,
        };
        let rewritten = push_down(&query, &opts(&["emps"], false)).expect("push-down");
        match &rewritten.steps[0] {
            CoreStep::Scan {
                source: Some(src), ..
            } => match &src.kind {
                CoreKind::Backend(plan) => {
                    assert!(matches!(plan.plan, Plan::Filter { .. }));
                    assert!(plan.free_vars.is_empty());
                }
                other => panic!("expected backend source, got {other:?}"),
            },
            other => panic!("expected scan, got {other:?}"),
        }
    }

    #[test]
    fn correlated_reference_becomes_param() {
        let query = CoreQuery {
            steps: vec![
                table_scan("e", "emps"),
                CoreStep::Where(lt(
                    select_field("e", "a"),
                    CoreExpr::new(Type::int(), span(), CoreKind::Var("limit".to_string())),
                )),
                CoreStep::Yield(CoreExpr::new(
                    int_row_ty(),
                    span(),
                    CoreKind::Var("e".to_string()),
                )),
            ],
            elem_ty: int_row_ty(),
            ordered: false,
        };
        let rewritten = push_down(&query, &opts(&["emps"], true)).expect("push-down");
        match &rewritten.steps[0] {
            CoreStep::Scan {
                source: Some(src), ..
            } => match &src.kind {
                CoreKind::Backend(plan) => {
                    assert_eq!(plan.free_vars.len(), 1);
                    assert_eq!(plan.free_vars[0].name, "limit");
                    assert_eq!(plan.free_vars[0].descriptor.type_name, "INTEGER");
                }
                other => panic!("expected backend source, got {other:?}"),
            },
            other => panic!("expected scan, got {other:?}"),
        }
    }

    #[test]
    fn non_hybrid_rejects_partial_prefix() {
        let complicated = CoreExpr::new(
            Type::bool(),
            span(),
            CoreKind::Apply {
                func: Box::new(CoreExpr::new(
                    Type::fun(Type::int(), Type::bool()),
                    span(),
                    CoreKind::Var("oddp".to_string()),
                )),
                arg: Box::new(select_field("e", "a")),
            },
        );
        let query = CoreQuery {
            steps: vec![
                table_scan("e", "emps"),
                CoreStep::Where(complicated),
                CoreStep::Yield(CoreExpr::new(
                    int_row_ty(),
                    span(),
                    CoreKind::Var("e".to_string()),
                )),
            ],
            elem_ty: int_row_ty(),
            ordered: false,
        };
        assert!(push_down(&query, &opts(&["emps"], false)).is_none());
        assert!(push_down(&query, &opts(&["emps"], true)).is_some());
    }

    #[test]
    fn plan_serializes_to_json() {
        let plan = Plan::Filter {
            input: Box::new(Plan::Table {
                name: "emps".to_string(),
            }),
            predicate: Scalar::Op {
                op: "<".to_string(),
                args: vec![Scalar::Column("a".to_string()), Scalar::Int("3".to_string())],
            },
        };
        let json = serde_json::to_value(&plan).expect("serialize");
        assert!(json.to_string().contains("emps"));
    }

    #[test]
    fn type_descriptor_shape() {
        let d = TypeDesc::of(&Type::char()).expect("char descriptor");
        let json = serde_json::to_value(&d).expect("serialize");
        assert_eq!(json["type"], "CHAR");
        assert_eq!(json["nullable"], false);
        assert_eq!(json["precision"], 1);
    }
}
