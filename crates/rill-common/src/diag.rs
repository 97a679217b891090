use std::fmt;

use serde::Serialize;

use crate::span::{LineIndex, Span};

/// Diagnostic severity. Warnings do not abort the pipeline; errors do.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Severity {
    Warning,
    Error,
}

/// A stage-independent diagnostic with location information.
///
/// Every stage of the pipeline (lexer, parser, type checker, normalizer,
/// evaluator) reports problems as `Diagnostic` values. Rendering to the
/// user-visible one-line form happens in [`Diagnostic::render`], which needs
/// the source name and a [`LineIndex`] for the input unit.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Diagnostic {
    pub severity: Severity,
    pub message: String,
    pub span: Span,
}

impl Diagnostic {
    /// Create an error diagnostic.
    pub fn error(message: impl Into<String>, span: Span) -> Self {
        Self {
            severity: Severity::Error,
            message: message.into(),
            span,
        }
    }

    /// Create a warning diagnostic.
    pub fn warning(message: impl Into<String>, span: Span) -> Self {
        Self {
            severity: Severity::Warning,
            message: message.into(),
            span,
        }
    }

    /// Render as `<source>:<line>.<col>-<line>.<col> <message>`, with a
    /// leading `Warning: ` on the message for warnings.
    pub fn render(&self, source_name: &str, index: &LineIndex) -> String {
        let pos = index.span_text(self.span);
        match self.severity {
            Severity::Error => format!("{source_name}:{pos} {}", self.message),
            Severity::Warning => format!("{source_name}:{pos} Warning: {}", self.message),
        }
    }
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn render_error() {
        let src = "val x = 1 + true;";
        let idx = LineIndex::new(src);
        let d = Diagnostic::error("type mismatch: int vs bool", Span::new(12, 16));
        assert_eq!(
            d.render("stdIn", &idx),
            "stdIn:1.13-1.17 type mismatch: int vs bool"
        );
    }

    #[test]
    fn render_warning_prefix() {
        let idx = LineIndex::new("fun f 1 = 2;");
        let d = Diagnostic::warning("match nonexhaustive", Span::new(0, 11));
        assert!(d.render("stdIn", &idx).contains("Warning: match nonexhaustive"));
    }
}
