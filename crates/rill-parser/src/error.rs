use std::fmt;

use rill_common::diag::Diagnostic;
use rill_common::span::Span;

/// A parse error: the first unexpected token, with its position.
#[derive(Debug, Clone, PartialEq)]
pub struct ParseError {
    pub message: String,
    pub span: Span,
}

impl ParseError {
    pub fn new(message: impl Into<String>, span: Span) -> Self {
        Self {
            message: message.into(),
            span,
        }
    }

    /// Convert into the stage-independent diagnostic form.
    pub fn into_diagnostic(self) -> Diagnostic {
        Diagnostic::error(self.message, self.span)
    }
}

impl fmt::Display for ParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::error::Error for ParseError {}
