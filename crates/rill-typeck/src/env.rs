//! Type environment with scope stack.
//!
//! Maps identifiers to their bindings: values (schemes), datatype
//! constructors, exception constructors, overload groups, type aliases, and
//! named signatures. A scope stack implements lexical scoping: entering a
//! function, match arm, or `let` body pushes a frame; leaving pops it.

use rustc_hash::FxHashMap;

use crate::ty::{DataId, Scheme, Type, TyVar};

/// What an identifier means.
#[derive(Clone, Debug)]
pub enum Binding {
    /// A value with its type scheme.
    Val(Scheme),
    /// A datatype constructor; argument and result types come from the
    /// registry entry for the datatype.
    Ctor(DataId),
    /// An exception constructor with its optional payload type.
    Exn(Option<Type>),
    /// An overload group: the instance schemes registered so far.
    Overload(Vec<Scheme>),
    /// A type alias: parameters and the aliased type (parameters appear as
    /// `Type::Var` over the listed variables).
    TyAlias { params: Vec<TyVar>, ty: Type },
    /// A named signature: value descriptions.
    Signature(Vec<(String, Scheme)>),
}

/// A type environment: a stack of scopes mapping names to bindings.
///
/// Lookup searches from the innermost scope outward. The global scope is
/// the accumulated REPL session environment.
pub struct TypeEnv {
    scopes: Vec<FxHashMap<String, Binding>>,
}

impl TypeEnv {
    /// Create a new environment with one empty global scope.
    pub fn new() -> Self {
        TypeEnv {
            scopes: vec![FxHashMap::default()],
        }
    }

    /// Push a new empty scope onto the stack.
    pub fn push_scope(&mut self) {
        self.scopes.push(FxHashMap::default());
    }

    /// Pop the top scope from the stack.
    ///
    /// # Panics
    ///
    /// Panics if called when only the global scope remains.
    pub fn pop_scope(&mut self) {
        assert!(self.scopes.len() > 1, "cannot pop the global scope");
        self.scopes.pop();
    }

    /// Insert a binding into the current (topmost) scope.
    pub fn insert(&mut self, name: String, binding: Binding) {
        self.scopes
            .last_mut()
            .expect("scope stack should never be empty")
            .insert(name, binding);
    }

    /// Look up a name, searching from the innermost scope outward.
    pub fn lookup(&self, name: &str) -> Option<&Binding> {
        for scope in self.scopes.iter().rev() {
            if let Some(binding) = scope.get(name) {
                return Some(binding);
            }
        }
        None
    }

    /// Add an instance scheme to the overload group bound to `name`.
    /// Returns false if the name is not bound to an overload group.
    pub fn add_overload_instance(&mut self, name: &str, instance: Scheme) -> bool {
        for scope in self.scopes.iter_mut().rev() {
            if let Some(binding) = scope.get_mut(name) {
                return match binding {
                    Binding::Overload(instances) => {
                        instances.push(instance);
                        true
                    }
                    _ => false,
                };
            }
        }
        false
    }

    /// Names bound in the topmost scope, in insertion-independent order.
    pub fn top_scope_names(&self) -> Vec<String> {
        self.scopes
            .last()
            .map(|s| s.keys().cloned().collect())
            .unwrap_or_default()
    }
}

impl Default for TypeEnv {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ty::Type;

    #[test]
    fn lookup_in_current_scope() {
        let mut env = TypeEnv::new();
        env.insert("x".into(), Binding::Val(Scheme::mono(Type::int())));
        assert!(env.lookup("x").is_some());
        assert!(env.lookup("y").is_none());
    }

    #[test]
    fn shadowing_and_scope_exit() {
        let mut env = TypeEnv::new();
        env.insert("x".into(), Binding::Val(Scheme::mono(Type::int())));

        env.push_scope();
        env.insert("x".into(), Binding::Val(Scheme::mono(Type::string())));
        match env.lookup("x") {
            Some(Binding::Val(s)) => assert_eq!(s.ty, Type::string()),
            other => panic!("expected value binding, got {other:?}"),
        }

        env.pop_scope();
        match env.lookup("x") {
            Some(Binding::Val(s)) => assert_eq!(s.ty, Type::int()),
            other => panic!("expected value binding, got {other:?}"),
        }
    }

    #[test]
    fn overload_instances_accumulate() {
        let mut env = TypeEnv::new();
        env.insert("plus".into(), Binding::Overload(Vec::new()));
        assert!(env.add_overload_instance(
            "plus",
            Scheme::mono(Type::fun(Type::int(), Type::int()))
        ));
        match env.lookup("plus") {
            Some(Binding::Overload(instances)) => assert_eq!(instances.len(), 1),
            other => panic!("expected overload, got {other:?}"),
        }
    }

    #[test]
    fn add_instance_to_non_overload_fails() {
        let mut env = TypeEnv::new();
        env.insert("x".into(), Binding::Val(Scheme::mono(Type::int())));
        assert!(!env.add_overload_instance("x", Scheme::mono(Type::int())));
    }
}
