//! Type representation for the Rill type system.
//!
//! Defines the core `Type` enum, type variables (`TyVar`), record labels
//! with their canonical ordering, interned datatype definitions, and
//! polymorphic type schemes. These form the foundation of Hindley-Milner
//! inference.

use std::cmp::Ordering;
use std::fmt;

use rustc_hash::FxHashMap;

/// A type variable, identified by a `u32` index into the unification table.
///
/// Type variables are created during inference and unified with concrete
/// types or other variables. The `ena` crate handles the union-find
/// mechanics.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TyVar(pub u32);

/// The primitive types.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum Prim {
    Int,
    Real,
    Bool,
    Char,
    Str,
    Unit,
    /// The type of exception values.
    Exn,
}

impl Prim {
    pub fn name(self) -> &'static str {
        match self {
            Prim::Int => "int",
            Prim::Real => "real",
            Prim::Bool => "bool",
            Prim::Char => "char",
            Prim::Str => "string",
            Prim::Unit => "unit",
            Prim::Exn => "exn",
        }
    }
}

/// A record field label with the canonical ordering: numeric labels first
/// (in numeric order), then alphabetic labels lexicographically. Tuples are
/// records labeled `"1"`, `"2"`, ...
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct Label(pub String);

impl Label {
    pub fn new(s: impl Into<String>) -> Self {
        Label(s.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    fn numeric(&self) -> Option<u64> {
        self.0.parse::<u64>().ok()
    }
}

impl PartialOrd for Label {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Label {
    fn cmp(&self, other: &Self) -> Ordering {
        match (self.numeric(), other.numeric()) {
            (Some(a), Some(b)) => a.cmp(&b),
            (Some(_), None) => Ordering::Less,
            (None, Some(_)) => Ordering::Greater,
            (None, None) => self.0.cmp(&other.0),
        }
    }
}

impl fmt::Display for Label {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Identity of an interned datatype definition in the [`TypeRegistry`].
///
/// Recursive and mutually recursive datatypes refer to each other by id,
/// never by owned reference, so the ownership graph stays a tree.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub struct DataId(pub u32);

/// A Rill type.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum Type {
    /// An inference variable (unresolved during inference).
    Var(TyVar),
    /// A primitive type.
    Prim(Prim),
    /// A function type `a -> b`.
    Fn(Box<Type>, Box<Type>),
    /// A record type. The field list is always sorted by canonical label
    /// order; tuples are records with labels `"1"`, `"2"`, ...
    Record(Vec<(Label, Type)>),
    /// An ordered collection `t list`.
    List(Box<Type>),
    /// An unordered multiset `t bag`.
    Bag(Box<Type>),
    /// A named datatype applied to its arguments.
    Data(DataId, Vec<Type>),
}

impl Type {
    pub fn int() -> Type {
        Type::Prim(Prim::Int)
    }

    pub fn real() -> Type {
        Type::Prim(Prim::Real)
    }

    pub fn bool() -> Type {
        Type::Prim(Prim::Bool)
    }

    pub fn char() -> Type {
        Type::Prim(Prim::Char)
    }

    pub fn string() -> Type {
        Type::Prim(Prim::Str)
    }

    pub fn unit() -> Type {
        Type::Prim(Prim::Unit)
    }

    pub fn exn() -> Type {
        Type::Prim(Prim::Exn)
    }

    pub fn fun(arg: Type, ret: Type) -> Type {
        Type::Fn(Box::new(arg), Box::new(ret))
    }

    pub fn list(elem: Type) -> Type {
        Type::List(Box::new(elem))
    }

    pub fn bag(elem: Type) -> Type {
        Type::Bag(Box::new(elem))
    }

    /// Build a tuple type: a record with labels `"1"`, `"2"`, ...
    pub fn tuple(items: Vec<Type>) -> Type {
        let fields = items
            .into_iter()
            .enumerate()
            .map(|(i, t)| (Label::new((i + 1).to_string()), t))
            .collect();
        Type::Record(fields)
    }

    /// Build a record type from unsorted fields.
    pub fn record(mut fields: Vec<(Label, Type)>) -> Type {
        fields.sort_by(|a, b| a.0.cmp(&b.0));
        Type::Record(fields)
    }

    /// If this record's labels are exactly `"1"`..`"n"` with n >= 2, view it
    /// as a tuple.
    pub fn as_tuple(fields: &[(Label, Type)]) -> Option<Vec<&Type>> {
        if fields.len() < 2 {
            return None;
        }
        for (i, (label, _)) in fields.iter().enumerate() {
            if label.as_str() != (i + 1).to_string() {
                return None;
            }
        }
        Some(fields.iter().map(|(_, t)| t).collect())
    }

    /// Collect all type variables, in order of first appearance.
    pub fn collect_vars(&self, out: &mut Vec<TyVar>) {
        match self {
            Type::Var(v) => out.push(*v),
            Type::Prim(_) => {}
            Type::Fn(a, b) => {
                a.collect_vars(out);
                b.collect_vars(out);
            }
            Type::Record(fields) => {
                for (_, t) in fields {
                    t.collect_vars(out);
                }
            }
            Type::List(t) | Type::Bag(t) => t.collect_vars(out),
            Type::Data(_, args) => {
                for a in args {
                    a.collect_vars(out);
                }
            }
        }
    }

    /// Apply a variable substitution throughout the type.
    pub fn subst(&self, map: &FxHashMap<TyVar, Type>) -> Type {
        match self {
            Type::Var(v) => map.get(v).cloned().unwrap_or_else(|| self.clone()),
            Type::Prim(_) => self.clone(),
            Type::Fn(a, b) => Type::fun(a.subst(map), b.subst(map)),
            Type::Record(fields) => Type::Record(
                fields
                    .iter()
                    .map(|(l, t)| (l.clone(), t.subst(map)))
                    .collect(),
            ),
            Type::List(t) => Type::list(t.subst(map)),
            Type::Bag(t) => Type::bag(t.subst(map)),
            Type::Data(id, args) => {
                Type::Data(*id, args.iter().map(|a| a.subst(map)).collect())
            }
        }
    }
}

/// A polymorphic type scheme: a type with universally quantified variables.
///
/// Schemes stored in the environment are self-contained: their quantified
/// variables are remapped to small sequential ids so they never index into
/// a later compile unit's unification table.
#[derive(Clone, Debug)]
pub struct Scheme {
    /// The quantified (generic) type variables.
    pub vars: Vec<TyVar>,
    /// The underlying type (may reference vars).
    pub ty: Type,
}

impl Scheme {
    /// Create a monomorphic scheme (no quantified variables).
    pub fn mono(ty: Type) -> Self {
        Scheme {
            vars: Vec::new(),
            ty,
        }
    }

    /// Create a self-contained scheme from a resolved type by quantifying
    /// all free variables, remapped to sequential ids starting from 0.
    pub fn normalize_from_ty(ty: Type) -> Self {
        let mut seen: Vec<TyVar> = Vec::new();
        ty.collect_vars(&mut seen);
        if seen.is_empty() {
            return Scheme {
                vars: Vec::new(),
                ty,
            };
        }
        let mut mapping: FxHashMap<TyVar, Type> = FxHashMap::default();
        let mut vars = Vec::new();
        let mut next_id = 0u32;
        for v in &seen {
            if !mapping.contains_key(v) {
                mapping.insert(*v, Type::Var(TyVar(next_id)));
                vars.push(TyVar(next_id));
                next_id += 1;
            }
        }
        Scheme {
            vars,
            ty: ty.subst(&mapping),
        }
    }
}

// ── Datatype registry ──────────────────────────────────────────────────

/// One constructor of a datatype. The argument type refers to the
/// datatype's parameters as `Type::Var(TyVar(i))` for parameter index `i`;
/// it must always be instantiated before unification.
#[derive(Clone, Debug)]
pub struct CtorDef {
    pub name: String,
    pub arg: Option<Type>,
}

/// An interned datatype definition.
#[derive(Clone, Debug)]
pub struct DatatypeDef {
    pub name: String,
    /// Number of type parameters.
    pub arity: usize,
    pub ctors: Vec<CtorDef>,
}

/// The interning table for datatype definitions, keyed by a monotonic id.
///
/// Types hold [`DataId`]s, never owned references, which flattens the
/// ownership graph even for mutually recursive datatype groups.
#[derive(Clone, Debug, Default)]
pub struct TypeRegistry {
    defs: Vec<DatatypeDef>,
    by_name: FxHashMap<String, DataId>,
    /// Constructor name -> (datatype, constructor index).
    ctor_index: FxHashMap<String, (DataId, usize)>,
}

impl TypeRegistry {
    /// An empty registry with the built-in `option` datatype registered.
    pub fn new() -> Self {
        let mut registry = TypeRegistry::default();
        let option = registry.declare("option", 1);
        registry.define(
            option,
            vec![
                CtorDef {
                    name: "NONE".to_string(),
                    arg: None,
                },
                CtorDef {
                    name: "SOME".to_string(),
                    arg: Some(Type::Var(TyVar(0))),
                },
            ],
        );
        registry
    }

    /// Reserve an id for a named datatype with the given parameter count.
    /// The constructors are filled in later via [`TypeRegistry::define`],
    /// which is what lets mutually recursive groups reference each other.
    pub fn declare(&mut self, name: &str, arity: usize) -> DataId {
        let id = DataId(self.defs.len() as u32);
        self.defs.push(DatatypeDef {
            name: name.to_string(),
            arity,
            ctors: Vec::new(),
        });
        self.by_name.insert(name.to_string(), id);
        id
    }

    /// Fill in the constructors of a declared datatype.
    pub fn define(&mut self, id: DataId, ctors: Vec<CtorDef>) {
        for (i, c) in ctors.iter().enumerate() {
            self.ctor_index.insert(c.name.clone(), (id, i));
        }
        self.defs[id.0 as usize].ctors = ctors;
    }

    pub fn get(&self, id: DataId) -> &DatatypeDef {
        &self.defs[id.0 as usize]
    }

    pub fn lookup(&self, name: &str) -> Option<DataId> {
        self.by_name.get(name).copied()
    }

    /// Look up a constructor by name.
    pub fn lookup_ctor(&self, name: &str) -> Option<(DataId, usize)> {
        self.ctor_index.get(name).copied()
    }

    /// The id of the built-in `option` datatype.
    pub fn option_id(&self) -> DataId {
        self.lookup("option").expect("option is always registered")
    }

    /// Whether every constructor of the datatype is nullary, making the
    /// datatype enumerable for extent solving.
    pub fn is_enumerable(&self, id: DataId) -> bool {
        let def = self.get(id);
        !def.ctors.is_empty() && def.ctors.iter().all(|c| c.arg.is_none())
    }
}

// ── ena trait implementations ──────────────────────────────────────────

impl ena::unify::UnifyKey for TyVar {
    type Value = Option<Type>;

    fn index(&self) -> u32 {
        self.0
    }

    fn from_index(u: u32) -> Self {
        TyVar(u)
    }

    fn tag() -> &'static str {
        "TyVar"
    }
}

impl ena::unify::EqUnifyValue for Type {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn label_order_numeric_first() {
        let mut labels = vec![
            Label::new("b"),
            Label::new("10"),
            Label::new("2"),
            Label::new("a"),
        ];
        labels.sort();
        let names: Vec<&str> = labels.iter().map(|l| l.as_str()).collect();
        assert_eq!(names, vec!["2", "10", "a", "b"]);
    }

    #[test]
    fn tuple_is_canonical_record() {
        let t = Type::tuple(vec![Type::int(), Type::string()]);
        match &t {
            Type::Record(fields) => {
                assert_eq!(fields[0].0.as_str(), "1");
                assert_eq!(fields[1].0.as_str(), "2");
                assert!(Type::as_tuple(fields).is_some());
            }
            other => panic!("expected record, got {other:?}"),
        }
    }

    #[test]
    fn record_sorts_fields() {
        let t = Type::record(vec![
            (Label::new("b"), Type::int()),
            (Label::new("a"), Type::int()),
        ]);
        match &t {
            Type::Record(fields) => {
                assert_eq!(fields[0].0.as_str(), "a");
                assert!(Type::as_tuple(fields).is_none());
            }
            other => panic!("expected record, got {other:?}"),
        }
    }

    #[test]
    fn scheme_normalization_remaps_vars() {
        let ty = Type::fun(Type::Var(TyVar(40)), Type::Var(TyVar(40)));
        let scheme = Scheme::normalize_from_ty(ty);
        assert_eq!(scheme.vars, vec![TyVar(0)]);
        assert_eq!(
            scheme.ty,
            Type::fun(Type::Var(TyVar(0)), Type::Var(TyVar(0)))
        );
    }

    #[test]
    fn registry_interns_option() {
        let registry = TypeRegistry::new();
        let id = registry.option_id();
        let def = registry.get(id);
        assert_eq!(def.name, "option");
        assert_eq!(def.ctors.len(), 2);
        assert_eq!(registry.lookup_ctor("SOME"), Some((id, 1)));
        assert!(!registry.is_enumerable(id));
    }
}
