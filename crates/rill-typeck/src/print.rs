//! Type printing in the conventional ML grammar.
//!
//! The arrow is right-associative, `*` products are non-associative, and
//! constructor application (`list`, `bag`, `option`, user datatypes) is
//! postfix. Records print as `{label:ty, ...}` in canonical label order,
//! and type variables as `'a`, `'b`, ... in order of first appearance
//! (quantified variables first).

use rustc_hash::FxHashMap;

use crate::ty::{Scheme, Type, TypeRegistry, TyVar};

/// Printing precedence, outermost-loosest.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
enum Prec {
    Arrow,
    Product,
    Apply,
}

/// Prints types against a datatype registry, assigning stable names to the
/// type variables it encounters.
pub struct TypePrinter<'a> {
    registry: &'a TypeRegistry,
    names: FxHashMap<TyVar, String>,
}

impl<'a> TypePrinter<'a> {
    pub fn new(registry: &'a TypeRegistry) -> Self {
        Self {
            registry,
            names: FxHashMap::default(),
        }
    }

    /// Print a type.
    pub fn print(&mut self, ty: &Type) -> String {
        self.go(ty, Prec::Arrow)
    }

    /// Print a scheme. Quantified variables are named first so they come
    /// out as `'a`, `'b`, ... in binder order.
    pub fn print_scheme(&mut self, scheme: &Scheme) -> String {
        for v in &scheme.vars {
            self.var_name(*v);
        }
        self.print(&scheme.ty)
    }

    fn var_name(&mut self, v: TyVar) -> String {
        if let Some(name) = self.names.get(&v) {
            return name.clone();
        }
        let n = self.names.len();
        let name = if n < 26 {
            format!("'{}", (b'a' + n as u8) as char)
        } else {
            format!("'v{n}")
        };
        self.names.insert(v, name.clone());
        name
    }

    fn go(&mut self, ty: &Type, prec: Prec) -> String {
        match ty {
            Type::Var(v) => self.var_name(*v),
            Type::Prim(p) => p.name().to_string(),
            Type::Fn(a, b) => {
                let text = format!("{} -> {}", self.go(a, Prec::Product), self.go(b, Prec::Arrow));
                self.wrap(text, prec > Prec::Arrow)
            }
            Type::Record(fields) => {
                if fields.is_empty() {
                    return "unit".to_string();
                }
                if Type::as_tuple(fields).is_some() {
                    let text = fields
                        .iter()
                        .map(|(_, t)| self.go(t, Prec::Apply))
                        .collect::<Vec<_>>()
                        .join(" * ");
                    self.wrap(text, prec > Prec::Product)
                } else {
                    let body = fields
                        .iter()
                        .map(|(l, t)| format!("{l}:{}", self.go(t, Prec::Arrow)))
                        .collect::<Vec<_>>()
                        .join(", ");
                    format!("{{{body}}}")
                }
            }
            // Postfix application binds tighter than `*`, so `int list`
            // never needs parentheses of its own; only its argument might.
            Type::List(t) => format!("{} list", self.go(t, Prec::Apply)),
            Type::Bag(t) => format!("{} bag", self.go(t, Prec::Apply)),
            Type::Data(id, args) => {
                let name = self.registry.get(*id).name.clone();
                match args.len() {
                    0 => name,
                    1 => format!("{} {name}", self.go(&args[0], Prec::Apply)),
                    _ => {
                        let list = args
                            .iter()
                            .map(|a| self.go(a, Prec::Arrow))
                            .collect::<Vec<_>>()
                            .join(", ");
                        format!("({list}) {name}")
                    }
                }
            }
        }
    }

    fn wrap(&self, text: String, parens: bool) -> String {
        if parens {
            format!("({text})")
        } else {
            text
        }
    }
}

/// One-shot convenience: print a type with a fresh printer.
pub fn type_text(registry: &TypeRegistry, ty: &Type) -> String {
    TypePrinter::new(registry).print(ty)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ty::Label;

    fn registry() -> TypeRegistry {
        TypeRegistry::new()
    }

    #[test]
    fn print_primitives_and_lists() {
        let r = registry();
        assert_eq!(type_text(&r, &Type::int()), "int");
        assert_eq!(type_text(&r, &Type::list(Type::int())), "int list");
        assert_eq!(
            type_text(&r, &Type::list(Type::list(Type::bool()))),
            "bool list list"
        );
        assert_eq!(type_text(&r, &Type::bag(Type::string())), "string bag");
    }

    #[test]
    fn print_arrow_right_associative() {
        let r = registry();
        let t = Type::fun(Type::int(), Type::fun(Type::int(), Type::int()));
        assert_eq!(type_text(&r, &t), "int -> int -> int");
        let t = Type::fun(Type::fun(Type::int(), Type::int()), Type::int());
        assert_eq!(type_text(&r, &t), "(int -> int) -> int");
    }

    #[test]
    fn print_tuple_and_record() {
        let r = registry();
        let t = Type::tuple(vec![Type::int(), Type::string()]);
        assert_eq!(type_text(&r, &t), "int * string");
        let t = Type::record(vec![
            (Label::new("sb"), Type::int()),
            (Label::new("a"), Type::int()),
        ]);
        assert_eq!(type_text(&r, &t), "{a:int, sb:int}");
    }

    #[test]
    fn print_function_in_tuple_needs_parens() {
        let r = registry();
        let t = Type::tuple(vec![Type::fun(Type::int(), Type::int()), Type::int()]);
        assert_eq!(type_text(&r, &t), "(int -> int) * int");
    }

    #[test]
    fn print_list_of_tuples_needs_parens() {
        let r = registry();
        let t = Type::list(Type::tuple(vec![Type::int(), Type::int()]));
        assert_eq!(type_text(&r, &t), "(int * int) list");
    }

    #[test]
    fn print_datatype_application() {
        let r = registry();
        let opt = r.option_id();
        assert_eq!(
            type_text(&r, &Type::Data(opt, vec![Type::int()])),
            "int option"
        );
    }

    #[test]
    fn print_scheme_vars_in_binder_order() {
        let r = registry();
        let scheme = Scheme {
            vars: vec![TyVar(0), TyVar(1)],
            ty: Type::fun(Type::Var(TyVar(0)), Type::Var(TyVar(1))),
        };
        let mut p = TypePrinter::new(&r);
        assert_eq!(p.print_scheme(&scheme), "'a -> 'b");
    }
}
