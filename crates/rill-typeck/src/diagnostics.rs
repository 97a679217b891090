//! Ariadne-based diagnostic rendering for type errors.
//!
//! The REPL and the script runner use the plain one-line form from
//! `rill_common::diag`; this module renders the richer labeled report for
//! interactive terminal sessions. Output is colorless so snapshots stay
//! stable.

use std::ops::Range;

use ariadne::{Color, Config, Label, Report, ReportKind, Source};
use rill_common::span::Span;

use crate::error::TypeError;
use crate::print::TypePrinter;
use crate::ty::TypeRegistry;

/// Assign a stable code to each TypeError variant.
fn error_code(err: &TypeError) -> &'static str {
    match err {
        TypeError::Mismatch { .. } => "E0001",
        TypeError::InfiniteType { .. } => "E0002",
        TypeError::UnboundVariable { .. } => "E0003",
        TypeError::UnboundTyCon { .. } => "E0004",
        TypeError::TyConArity { .. } => "E0005",
        TypeError::DuplicateField { .. } => "E0006",
        TypeError::NoSuchField { .. } => "E0007",
        TypeError::UnresolvedFlexRecord { .. } => "E0008",
        TypeError::NoOverloadInstance { .. } => "E0009",
        TypeError::AmbiguousOverload { .. } => "E0010",
        TypeError::NotAnOverload { .. } => "E0011",
        TypeError::UnresolvedTopLevel { .. } => "E0012",
        TypeError::StepNeedsOrder { .. } => "E0013",
        TypeError::InvalidRecPattern { .. } => "E0014",
        TypeError::CtorArity { .. } => "E0015",
        TypeError::RedundantClause { .. } => "W0001",
        TypeError::NonExhaustiveMatch { .. } => "W0002",
    }
}

fn span_range(span: Span, source_len: usize) -> Range<usize> {
    let start = (span.start as usize).min(source_len);
    let end = (span.end as usize).min(source_len).max(start);
    if start == end {
        start..(start + 1).min(source_len.max(1))
    } else {
        start..end
    }
}

/// Render a type error into a formatted, labeled report string.
pub fn render_diagnostic(error: &TypeError, registry: &TypeRegistry, source: &str) -> String {
    let config = Config::default().with_color(false);
    let message = error.message(registry);
    let code = error_code(error);
    let range = span_range(
        error.span().unwrap_or(Span::new(0, source.len() as u32)),
        source.len(),
    );

    let kind = if error.is_warning() {
        ReportKind::Warning
    } else {
        ReportKind::Error
    };
    let label_color = if error.is_warning() {
        Color::Yellow
    } else {
        Color::Red
    };

    let mut builder = Report::build(kind, range.clone())
        .with_code(code)
        .with_message(&message)
        .with_config(config)
        .with_label(Label::new(range).with_message(label_text(error, registry)).with_color(label_color));

    if let Some(help) = help_text(error) {
        builder.set_help(help);
    }

    let mut buf = Vec::new();
    builder
        .finish()
        .write(Source::from(source), &mut buf)
        .expect("failed to write diagnostic");
    String::from_utf8(buf).expect("diagnostic output should be valid UTF-8")
}

fn label_text(error: &TypeError, registry: &TypeRegistry) -> String {
    let mut p = TypePrinter::new(registry);
    match error {
        TypeError::Mismatch {
            expected, found, ..
        } => format!("expected {}, found {}", p.print(expected), p.print(found)),
        TypeError::UnboundVariable { .. } => "not found in this scope".to_string(),
        TypeError::NonExhaustiveMatch { .. } => "these clauses do not cover every value".to_string(),
        TypeError::RedundantClause { .. } => "this clause is unreachable".to_string(),
        TypeError::UnresolvedFlexRecord { .. } => "projected here".to_string(),
        other => other.message(registry),
    }
}

fn help_text(error: &TypeError) -> Option<String> {
    match error {
        TypeError::NonExhaustiveMatch { .. } => {
            Some("add the missing clauses or a wildcard `_` clause".to_string())
        }
        TypeError::RedundantClause { .. } => {
            Some("remove this clause or reorder the match".to_string())
        }
        TypeError::UnresolvedFlexRecord { .. } => Some(
            "annotate the record so all of its fields are known".to_string(),
        ),
        TypeError::AmbiguousOverload { .. } => {
            Some("annotate the argument to pick one instance".to_string())
        }
        TypeError::InfiniteType { .. } => {
            Some("a value cannot have a type that refers to itself".to_string())
        }
        _ => None,
    }
}
