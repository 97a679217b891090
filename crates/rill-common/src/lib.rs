// Rill common -- shared types for every stage of the interpreter pipeline.

pub mod diag;
pub mod span;
pub mod token;

pub use diag::{Diagnostic, Severity};
pub use span::{LineIndex, Span};
pub use token::{keyword_from_str, Token, TokenKind};
