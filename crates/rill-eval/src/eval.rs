//! The tree-walking evaluator.
//!
//! A recursive interpreter over core terms: strict, left-to-right, with
//! persistent environments. ML exceptions travel as the `Err` side of
//! `Result`; `handle` is the only construct that catches them. Compiled
//! matches execute their decision tree; the plain sequential matcher
//! remains for un-normalized terms and for `val` pattern bindings.

use std::cell::RefCell;
use std::rc::Rc;

use rill_common::span::Span;
use rill_core::{
    AccessPath, CoreArm, CoreDecl, CoreExpr, CoreKind, CorePat, CorePatKind, DecisionTree,
    Lit, TestCtor,
};
use rill_typeck::TypeRegistry;

use crate::backend::Backend;
use crate::builtins;
use crate::env::Env;
use crate::relational;
use crate::value::{values_equal, Builtin, Closure, EvalResult, ExnValue, Packet, Value};

/// The evaluator: registry for constructor metadata, an optional backend
/// bridge, and a recursion bound.
pub struct Evaluator<'a> {
    pub registry: &'a TypeRegistry,
    pub backend: Option<&'a dyn Backend>,
    pub max_recursion_depth: u32,
    depth: u32,
}

impl<'a> Evaluator<'a> {
    pub fn new(registry: &'a TypeRegistry) -> Evaluator<'a> {
        Evaluator {
            registry,
            backend: None,
            max_recursion_depth: 10_000,
            depth: 0,
        }
    }

    pub fn with_backend(registry: &'a TypeRegistry, backend: &'a dyn Backend) -> Evaluator<'a> {
        Evaluator {
            registry,
            backend: Some(backend),
            max_recursion_depth: 10_000,
            depth: 0,
        }
    }

    // ── Declarations ───────────────────────────────────────────────────

    /// Evaluate a lowered declaration, returning the new global bindings
    /// in order. A failing `val` pattern raises `Bind`.
    pub fn run_decl(&mut self, env: &Env, decl: &CoreDecl) -> EvalResult<Vec<(String, Value)>> {
        match decl {
            CoreDecl::Vals(binds) => {
                let mut out = Vec::new();
                for bind in binds {
                    let value = self.eval(env, &bind.rhs)?;
                    let mut captured = Vec::new();
                    if !self.match_pat(&value, &bind.pat, &mut captured) {
                        return Err(Packet::new("Bind", bind.pat.span));
                    }
                    out.extend(captured);
                }
                Ok(out)
            }
            CoreDecl::Rec(binds) => {
                let env2 = self.tie_letrec(env, binds)?;
                Ok(binds
                    .iter()
                    .map(|(name, _)| {
                        let value = env2
                            .lookup(name)
                            .expect("letrec binds its own names");
                        (name.clone(), value)
                    })
                    .collect())
            }
            CoreDecl::Instance { name, rhs } => {
                let instance = self.eval(env, rhs)?;
                let group = match env.lookup(name) {
                    Some(Value::Overload(instances)) => {
                        let mut v = (*instances).clone();
                        v.push(instance);
                        v
                    }
                    _ => vec![instance],
                };
                Ok(vec![(name.clone(), Value::Overload(Rc::new(group)))])
            }
            CoreDecl::Exception { .. } | CoreDecl::Static => Ok(Vec::new()),
        }
    }

    // ── Expressions ────────────────────────────────────────────────────

    pub fn eval(&mut self, env: &Env, expr: &CoreExpr) -> EvalResult<Value> {
        let span = expr.span;
        match &expr.kind {
            CoreKind::Lit(lit) => Ok(lit_value(lit)),

            CoreKind::Var(name) => env.lookup(name).ok_or_else(|| {
                Packet::with_message("Error", &format!("unbound variable {name}"), span)
            }),

            CoreKind::VarInst(name, index) => {
                let value = env.lookup(name).ok_or_else(|| {
                    Packet::with_message("Error", &format!("unbound variable {name}"), span)
                })?;
                match value {
                    Value::Overload(instances) => {
                        instances.get(*index).cloned().ok_or_else(|| {
                            Packet::with_message(
                                "Error",
                                &format!("no instance {index} of {name}"),
                                span,
                            )
                        })
                    }
                    other => Ok(other),
                }
            }

            CoreKind::Record(fields) => {
                let mut out = Vec::with_capacity(fields.len());
                for (label, e) in fields {
                    out.push((label.clone(), self.eval(env, e)?));
                }
                Ok(Value::record(out))
            }

            CoreKind::Select(base, label) => {
                let value = self.eval(env, base)?;
                value.field(label).cloned().ok_or_else(|| {
                    Packet::with_message("Error", &format!("no field {label}"), span)
                })
            }

            CoreKind::Ctor { name, data, arg } => {
                let index = self
                    .registry
                    .get(*data)
                    .ctors
                    .iter()
                    .position(|c| c.name == *name)
                    .unwrap_or(0);
                let arg = match arg {
                    Some(e) => Some(Rc::new(self.eval(env, e)?)),
                    None => None,
                };
                Ok(Value::Ctor {
                    name: Rc::from(name.as_str()),
                    data: *data,
                    index,
                    arg,
                })
            }

            CoreKind::Exn { name, arg } => {
                let payload = match arg {
                    Some(e) => Some(self.eval(env, e)?),
                    None => None,
                };
                Ok(Value::Exn(Rc::new(ExnValue {
                    name: name.clone(),
                    payload,
                    span,
                })))
            }

            CoreKind::MkList(items) => {
                let mut out = Vec::with_capacity(items.len());
                for e in items {
                    out.push(self.eval(env, e)?);
                }
                Ok(Value::list(out))
            }

            CoreKind::Fn { param, body } => Ok(Value::Closure(Rc::new(Closure {
                param: param.clone(),
                body: (**body).clone(),
                env: RefCell::new(env.clone()),
            }))),

            CoreKind::Apply { func, arg } => {
                let f = self.eval(env, func)?;
                let a = self.eval(env, arg)?;
                self.apply(f, a, span)
            }

            CoreKind::Let { name, rhs, body } => {
                let value = self.eval(env, rhs)?;
                let env2 = env.bind(name.clone(), value);
                self.eval(&env2, body)
            }

            CoreKind::Letrec { binds, body } => {
                let env2 = self.tie_letrec(env, binds)?;
                self.eval(&env2, body)
            }

            CoreKind::Case { scrutinee, arms } => {
                let value = self.eval(env, scrutinee)?;
                self.eval_sequential_match(env, &value, arms, span)
            }

            CoreKind::CompiledCase {
                scrutinee,
                tree,
                arms,
            } => {
                let value = self.eval(env, scrutinee)?;
                self.exec_tree(env, &value, tree, arms, span)
            }

            CoreKind::From(query) => relational::eval_query(self, env, query, span),

            CoreKind::Raise(e) => {
                let value = self.eval(env, e)?;
                match value {
                    Value::Exn(exn) => Err(Packet {
                        name: exn.name.clone(),
                        payload: exn.payload.clone(),
                        span,
                    }),
                    _ => Err(Packet::with_message("Error", "raise of non-exception", span)),
                }
            }

            CoreKind::Handle { body, arms } => match self.eval(env, body) {
                Ok(v) => Ok(v),
                Err(packet) => {
                    let exn = Value::Exn(Rc::new(ExnValue {
                        name: packet.name.clone(),
                        payload: packet.payload.clone(),
                        span: packet.span,
                    }));
                    for arm in arms {
                        let mut binds = Vec::new();
                        if self.match_pat(&exn, &arm.pat, &mut binds) {
                            let env2 = env.bind_all(binds);
                            if let Some(guard) = &arm.guard {
                                match self.eval(&env2, guard)? {
                                    Value::Bool(true) => {}
                                    _ => continue,
                                }
                            }
                            return self.eval(&env2, &arm.body);
                        }
                    }
                    Err(packet)
                }
            },

            CoreKind::Backend(plan) => {
                let backend = self.backend.ok_or_else(|| {
                    Packet::with_message("Error", "no relational backend configured", span)
                })?;
                let mut free = Vec::new();
                for fv in &plan.free_vars {
                    let value = env.lookup(&fv.name).ok_or_else(|| {
                        Packet::with_message(
                            "Error",
                            &format!("unbound backend parameter {}", fv.name),
                            span,
                        )
                    })?;
                    free.push((fv.name.clone(), fv.descriptor.clone(), value));
                }
                let rows = backend
                    .execute(&plan.plan, &free)
                    .map_err(|e| Packet::with_message("Error", &e, span))?;
                Ok(Value::bag(rows))
            }
        }
    }

    /// Apply a function value to an argument.
    pub fn apply(&mut self, f: Value, arg: Value, span: Span) -> EvalResult<Value> {
        match f {
            Value::Closure(closure) => {
                if self.depth >= self.max_recursion_depth {
                    return Err(Packet::with_message(
                        "Error",
                        "recursion limit exceeded",
                        span,
                    ));
                }
                self.depth += 1;
                let captured = closure.env.borrow().clone();
                let env = captured.bind(closure.param.clone(), arg);
                let result = self.eval(&env, &closure.body);
                self.depth -= 1;
                result
            }
            Value::Builtin(mut builtin) => {
                builtin.args.push(arg);
                if builtin.args.len() as u8 >= builtin.arity {
                    let Builtin { name, args, .. } = builtin;
                    builtins::call(self, name, args, span)
                } else {
                    Ok(Value::Builtin(builtin))
                }
            }
            Value::Overload(_) => Err(Packet::with_message(
                "Error",
                "cannot apply an unresolved overload",
                span,
            )),
            _ => Err(Packet::with_message("Error", "applying a non-function", span)),
        }
    }

    /// Tie a recursive group: closures first, environments patched after.
    fn tie_letrec(&mut self, env: &Env, binds: &[(String, CoreExpr)]) -> EvalResult<Env> {
        let mut closures: Vec<(String, Option<Rc<Closure>>)> = Vec::new();
        let mut env2 = env.clone();
        for (name, rhs) in binds {
            match &rhs.kind {
                CoreKind::Fn { param, body } => {
                    let closure = Rc::new(Closure {
                        param: param.clone(),
                        body: (**body).clone(),
                        env: RefCell::new(env.clone()),
                    });
                    env2 = env2.bind(name.clone(), Value::Closure(closure.clone()));
                    closures.push((name.clone(), Some(closure)));
                }
                _ => {
                    let value = self.eval(&env2, rhs)?;
                    env2 = env2.bind(name.clone(), value);
                    closures.push((name.clone(), None));
                }
            }
        }
        for (_, closure) in closures.iter().flat_map(|(n, c)| c.as_ref().map(|c| (n, c))) {
            *closure.env.borrow_mut() = env2.clone();
        }
        Ok(env2)
    }

    // ── Sequential pattern matching ────────────────────────────────────

    fn eval_sequential_match(
        &mut self,
        env: &Env,
        value: &Value,
        arms: &[CoreArm],
        span: Span,
    ) -> EvalResult<Value> {
        for arm in arms {
            let mut binds = Vec::new();
            if self.match_pat(value, &arm.pat, &mut binds) {
                let env2 = env.bind_all(binds);
                if let Some(guard) = &arm.guard {
                    match self.eval(&env2, guard)? {
                        Value::Bool(true) => {}
                        _ => continue,
                    }
                }
                return self.eval(&env2, &arm.body);
            }
        }
        Err(Packet::new("Match", span))
    }

    /// Match a value against a pattern, collecting bindings. Public so the
    /// session and the relational interpreter can bind scan rows and `val`
    /// patterns.
    pub fn match_pat(
        &self,
        value: &Value,
        pat: &CorePat,
        binds: &mut Vec<(String, Value)>,
    ) -> bool {
        match &pat.kind {
            CorePatKind::Wild => true,
            CorePatKind::Var(name) => {
                binds.push((name.clone(), value.clone()));
                true
            }
            CorePatKind::Lit(lit) => values_equal(value, &lit_value(lit)),
            CorePatKind::Ctor { index, arg, .. } => match value {
                Value::Ctor {
                    index: vi,
                    arg: varg,
                    ..
                } => {
                    if vi != index {
                        return false;
                    }
                    match (arg, varg) {
                        (Some(p), Some(v)) => self.match_pat(v, p, binds),
                        (None, None) => true,
                        _ => false,
                    }
                }
                _ => false,
            },
            CorePatKind::ExnCtor { name, arg } => match value {
                Value::Exn(exn) => {
                    if exn.name != *name {
                        return false;
                    }
                    match (arg, &exn.payload) {
                        (Some(p), Some(v)) => self.match_pat(v, p, binds),
                        (None, _) => true,
                        (Some(_), None) => false,
                    }
                }
                _ => false,
            },
            CorePatKind::Record(fields) => match value {
                Value::Record(vfields) => fields.iter().all(|(label, p)| {
                    vfields
                        .iter()
                        .find(|(l, _)| l == label)
                        .map(|(_, v)| self.match_pat(v, p, binds))
                        .unwrap_or(false)
                }),
                Value::Unit => fields.is_empty(),
                _ => false,
            },
            CorePatKind::Cons(head, tail) => match value {
                Value::List(items) => match items.split_first() {
                    Some((h, t)) => {
                        self.match_pat(h, head, binds)
                            && self.match_pat(&Value::list(t.to_vec()), tail, binds)
                    }
                    None => false,
                },
                _ => false,
            },
            CorePatKind::EmptyList => {
                matches!(value, Value::List(items) if items.is_empty())
            }
            CorePatKind::As(name, inner) => {
                binds.push((name.clone(), value.clone()));
                self.match_pat(value, inner, binds)
            }
        }
    }

    // ── Decision tree execution ────────────────────────────────────────

    fn exec_tree(
        &mut self,
        env: &Env,
        scrutinee: &Value,
        tree: &DecisionTree,
        arms: &[CoreArm],
        span: Span,
    ) -> EvalResult<Value> {
        match tree {
            DecisionTree::Fail => Err(Packet::new("Match", span)),
            DecisionTree::Leaf {
                arm,
                bindings,
                fallthrough,
            } => {
                let binds: Vec<(String, Value)> = bindings
                    .iter()
                    .map(|(name, path)| (name.clone(), resolve_path(scrutinee, path)))
                    .collect();
                let env2 = env.bind_all(binds);
                let arm = &arms[*arm];
                if let Some(guard) = &arm.guard {
                    match self.eval(&env2, guard)? {
                        Value::Bool(true) => {}
                        _ => {
                            return match fallthrough {
                                Some(rest) => {
                                    self.exec_tree(env, scrutinee, rest, arms, span)
                                }
                                None => Err(Packet::new("Match", span)),
                            }
                        }
                    }
                }
                self.eval(&env2, &arm.body)
            }
            DecisionTree::Switch {
                path,
                cases,
                default,
            } => {
                let value = resolve_path(scrutinee, path);
                for (test, subtree) in cases {
                    if test_matches(test, &value) {
                        return self.exec_tree(env, scrutinee, subtree, arms, span);
                    }
                }
                match default {
                    Some(rest) => self.exec_tree(env, scrutinee, rest, arms, span),
                    None => Err(Packet::new("Match", span)),
                }
            }
        }
    }
}

/// Extract the sub-value a path names. Paths come from pattern
/// compilation, so they are valid for any value that reached their switch.
fn resolve_path(value: &Value, path: &AccessPath) -> Value {
    match path {
        AccessPath::Root => value.clone(),
        AccessPath::Field(base, index) => {
            let base = resolve_path(value, base);
            match base {
                Value::Record(fields) => fields[*index].1.clone(),
                other => other,
            }
        }
        AccessPath::Payload(base) => {
            let base = resolve_path(value, base);
            match base {
                Value::Ctor { arg: Some(v), .. } => (*v).clone(),
                Value::Exn(exn) => exn.payload.clone().unwrap_or(Value::Unit),
                other => other,
            }
        }
        AccessPath::Head(base) => {
            let base = resolve_path(value, base);
            match base {
                Value::List(items) => items[0].clone(),
                other => other,
            }
        }
        AccessPath::Tail(base) => {
            let base = resolve_path(value, base);
            match base {
                Value::List(items) => Value::list(items[1..].to_vec()),
                other => other,
            }
        }
    }
}

fn test_matches(test: &TestCtor, value: &Value) -> bool {
    match (test, value) {
        (TestCtor::Bool(b), Value::Bool(v)) => b == v,
        (TestCtor::Int(n), Value::Int(v)) => n == v,
        (TestCtor::Str(s), Value::Str(v)) => s.as_str() == &**v,
        (TestCtor::Char(c), Value::Char(v)) => c == v,
        (TestCtor::Unit, _) => true,
        (TestCtor::Variant { index, .. }, Value::Ctor { index: vi, .. }) => index == vi,
        (TestCtor::Exn(name), Value::Exn(exn)) => *name == exn.name,
        (TestCtor::Nil, Value::List(items)) => items.is_empty(),
        (TestCtor::Cons, Value::List(items)) => !items.is_empty(),
        (TestCtor::Record(_), _) => true,
        _ => false,
    }
}

fn lit_value(lit: &Lit) -> Value {
    match lit {
        Lit::Int(n) => Value::Int(n.clone()),
        Lit::Real(r) => Value::Real(*r),
        Lit::Str(s) => Value::str(s),
        Lit::Char(c) => Value::Char(*c),
        Lit::Bool(b) => Value::Bool(*b),
        Lit::Unit => Value::Unit,
    }
}
