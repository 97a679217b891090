//! The evaluator's persistent environment.
//!
//! A global map of session bindings at the root, extended by immutable
//! frames for local bindings. Extension produces a new environment that
//! shares structure with its parent; closures keep the environment they
//! captured alive by reference.

use std::rc::Rc;

use rustc_hash::FxHashMap;

use crate::value::Value;

#[derive(Clone, Debug)]
pub struct Env {
    node: Rc<EnvNode>,
}

#[derive(Debug)]
enum EnvNode {
    Root(Rc<FxHashMap<String, Value>>),
    Frame {
        parent: Env,
        name: String,
        value: Value,
    },
}

impl Env {
    /// An environment over the given global bindings.
    pub fn root(globals: Rc<FxHashMap<String, Value>>) -> Env {
        Env {
            node: Rc::new(EnvNode::Root(globals)),
        }
    }

    /// An empty environment.
    pub fn empty() -> Env {
        Env::root(Rc::new(FxHashMap::default()))
    }

    /// Extend with one binding, sharing structure with `self`.
    pub fn bind(&self, name: String, value: Value) -> Env {
        Env {
            node: Rc::new(EnvNode::Frame {
                parent: self.clone(),
                name,
                value,
            }),
        }
    }

    /// Extend with several bindings.
    pub fn bind_all(&self, binds: impl IntoIterator<Item = (String, Value)>) -> Env {
        let mut env = self.clone();
        for (name, value) in binds {
            env = env.bind(name, value);
        }
        env
    }

    /// Look up a name, innermost frame first.
    pub fn lookup(&self, name: &str) -> Option<Value> {
        let mut node = &self.node;
        loop {
            match node.as_ref() {
                EnvNode::Frame {
                    parent,
                    name: n,
                    value,
                } => {
                    if n == name {
                        return Some(value.clone());
                    }
                    node = &parent.node;
                }
                EnvNode::Root(globals) => return globals.get(name).cloned(),
            }
        }
    }
}
