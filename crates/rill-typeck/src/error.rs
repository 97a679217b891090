//! Type error types with provenance tracking.
//!
//! Every unification failure carries a `ConstraintOrigin` recording where
//! the constraint was generated, so the rendered message points at the
//! narrower term rather than at the whole declaration.

use rill_common::diag::Diagnostic;
use rill_common::span::Span;

use crate::print::TypePrinter;
use crate::ty::{Type, TypeRegistry, TyVar};

/// The origin of a type constraint: where in the source did we decide these
/// two types should be equal?
#[derive(Clone, Copy, Debug)]
pub enum ConstraintOrigin {
    /// A general expression constraint.
    Expr(Span),
    /// A pattern against the scrutinee or binding type.
    Pattern(Span),
    /// A function applied to an argument.
    Apply(Span),
    /// The condition of an `if` or a `where`/`require` step.
    Condition(Span),
    /// The branches of an `if` or the arms of a `case`.
    Branches(Span),
    /// An explicit type annotation.
    Annotation(Span),
    /// A step of a relational pipeline.
    QueryStep(Span),
    /// Synthetic constraint from a built-in.
    Builtin,
}

impl ConstraintOrigin {
    pub fn span(&self) -> Option<Span> {
        match self {
            ConstraintOrigin::Expr(s)
            | ConstraintOrigin::Pattern(s)
            | ConstraintOrigin::Apply(s)
            | ConstraintOrigin::Condition(s)
            | ConstraintOrigin::Branches(s)
            | ConstraintOrigin::Annotation(s)
            | ConstraintOrigin::QueryStep(s) => Some(*s),
            ConstraintOrigin::Builtin => None,
        }
    }
}

/// A type error found during inference.
#[derive(Clone, Debug)]
pub enum TypeError {
    /// Two types that should be equal are not.
    Mismatch {
        expected: Type,
        found: Type,
        origin: ConstraintOrigin,
    },
    /// A type variable occurs in its own solution (infinite type).
    InfiniteType {
        var: TyVar,
        ty: Type,
        origin: ConstraintOrigin,
    },
    /// A name is used but not bound in scope.
    UnboundVariable { name: String, span: Span },
    /// A type constructor name is unknown.
    UnboundTyCon { name: String, span: Span },
    /// A type constructor applied to the wrong number of arguments.
    TyConArity {
        name: String,
        expected: usize,
        found: usize,
        span: Span,
    },
    /// A record expression or group row repeats a label.
    DuplicateField { label: String, span: Span },
    /// A field selection on a type with no such field.
    NoSuchField {
        ty: Type,
        label: String,
        span: Span,
    },
    /// A flex record was never resolved to a concrete record type by the
    /// end of the enclosing declaration.
    UnresolvedFlexRecord { span: Span },
    /// No overload instance matches the argument type.
    NoOverloadInstance {
        name: String,
        found: Type,
        span: Span,
    },
    /// More than one overload instance matches the argument type.
    AmbiguousOverload { name: String, span: Span },
    /// `val inst` names something that is not an overload group.
    NotAnOverload { name: String, span: Span },
    /// A declaration's type still contains unresolved meta-variables at the
    /// top level (value restriction kept them from generalizing).
    UnresolvedTopLevel { name: String, span: Span },
    /// A match has a clause that can never be reached.
    RedundantClause { span: Span },
    /// A match does not cover its scrutinee type.
    NonExhaustiveMatch { span: Span },
    /// An ordered-only step used in an unordered pipeline.
    StepNeedsOrder { step: &'static str, span: Span },
    /// `val rec` requires a plain variable pattern.
    InvalidRecPattern { span: Span },
    /// A constructor pattern with the wrong argument shape.
    CtorArity {
        name: String,
        takes_arg: bool,
        span: Span,
    },
}

impl TypeError {
    /// The primary position of the error.
    pub fn span(&self) -> Option<Span> {
        match self {
            TypeError::Mismatch { origin, .. } | TypeError::InfiniteType { origin, .. } => {
                origin.span()
            }
            TypeError::UnboundVariable { span, .. }
            | TypeError::UnboundTyCon { span, .. }
            | TypeError::TyConArity { span, .. }
            | TypeError::DuplicateField { span, .. }
            | TypeError::NoSuchField { span, .. }
            | TypeError::UnresolvedFlexRecord { span }
            | TypeError::NoOverloadInstance { span, .. }
            | TypeError::AmbiguousOverload { span, .. }
            | TypeError::NotAnOverload { span, .. }
            | TypeError::UnresolvedTopLevel { span, .. }
            | TypeError::RedundantClause { span }
            | TypeError::NonExhaustiveMatch { span }
            | TypeError::StepNeedsOrder { span, .. }
            | TypeError::InvalidRecPattern { span }
            | TypeError::CtorArity { span, .. } => Some(*span),
        }
    }

    /// Whether the error is reported as a warning. Match-coverage findings
    /// warn; everything else is an error.
    pub fn is_warning(&self) -> bool {
        matches!(
            self,
            TypeError::RedundantClause { .. } | TypeError::NonExhaustiveMatch { .. }
        )
    }

    /// Render the message text against a datatype registry (needed to print
    /// the types involved).
    pub fn message(&self, registry: &TypeRegistry) -> String {
        let mut p = TypePrinter::new(registry);
        match self {
            TypeError::Mismatch {
                expected, found, ..
            } => {
                let e = p.print(expected);
                let f = p.print(found);
                format!("type mismatch: expected {e}, found {f}")
            }
            TypeError::InfiniteType { ty, .. } => {
                format!("infinite type: variable occurs in {}", p.print(ty))
            }
            TypeError::UnboundVariable { name, .. } => {
                format!("unbound variable or constructor: {name}")
            }
            TypeError::UnboundTyCon { name, .. } => format!("unknown type constructor: {name}"),
            TypeError::TyConArity {
                name,
                expected,
                found,
                ..
            } => format!(
                "type constructor {name} expects {expected} argument(s), found {found}"
            ),
            TypeError::DuplicateField { label, .. } => {
                format!("duplicate field label: {label}")
            }
            TypeError::NoSuchField { ty, label, .. } => {
                format!("type {} has no field {label}", p.print(ty))
            }
            TypeError::UnresolvedFlexRecord { .. } => {
                "unresolved flex record (can't tell what fields there are)".to_string()
            }
            TypeError::NoOverloadInstance { name, found, .. } => format!(
                "no instance of {name} matches argument type {}",
                p.print(found)
            ),
            TypeError::AmbiguousOverload { name, .. } => {
                format!("ambiguous use of overloaded {name}")
            }
            TypeError::NotAnOverload { name, .. } => {
                format!("{name} is not declared as an overload group")
            }
            TypeError::UnresolvedTopLevel { name, .. } => format!(
                "type of {name} contains unresolved type variables (value restriction)"
            ),
            TypeError::RedundantClause { .. } => "match redundant".to_string(),
            TypeError::NonExhaustiveMatch { .. } => "match nonexhaustive".to_string(),
            TypeError::StepNeedsOrder { step, .. } => {
                format!("`{step}` requires an ordered pipeline")
            }
            TypeError::InvalidRecPattern { .. } => {
                "val rec requires a plain variable binding".to_string()
            }
            TypeError::CtorArity {
                name, takes_arg, ..
            } => {
                if *takes_arg {
                    format!("constructor {name} requires an argument")
                } else {
                    format!("constructor {name} takes no argument")
                }
            }
        }
    }

    /// Convert to the stage-independent diagnostic form.
    pub fn to_diagnostic(&self, registry: &TypeRegistry, fallback: Span) -> Diagnostic {
        let span = self.span().unwrap_or(fallback);
        let message = self.message(registry);
        if self.is_warning() {
            Diagnostic::warning(message, span)
        } else {
            Diagnostic::error(message, span)
        }
    }
}
