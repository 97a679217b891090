//! Recursive-descent parser for Rill.
//!
//! The parser consumes the token stream from `rill-lexer` and builds the
//! owned surface AST directly. Expressions use Pratt-style binding powers;
//! declarations, patterns, and pipeline steps are plain recursive descent.
//! The first unexpected token aborts the parse with a positioned error.

pub(crate) mod expressions;
pub(crate) mod items;
pub(crate) mod patterns;
pub(crate) mod query;

use num_bigint::BigInt;
use rill_common::span::Span;
use rill_common::token::{Token, TokenKind};

use crate::ast::NodeId;
use crate::error::ParseError;

/// The parse result type used throughout the parser.
pub(crate) type PResult<T> = Result<T, ParseError>;

/// Recursive-descent parser state: a token stream, a position, and the
/// node-id counter for the parse unit.
pub(crate) struct Parser<'src> {
    /// All tokens from the lexer (including Eof).
    tokens: Vec<Token>,
    /// Current position in the token stream.
    pos: usize,
    /// Original source text (for extracting token text via spans).
    source: &'src str,
    /// End offset of the most recently consumed token, for span merging.
    prev_end: u32,
    /// Next node id to hand out.
    next_id: u32,
}

impl<'src> Parser<'src> {
    /// Create a new parser from a token stream and source text.
    pub(crate) fn new(tokens: Vec<Token>, source: &'src str) -> Self {
        Self {
            tokens,
            pos: 0,
            source,
            prev_end: 0,
            next_id: 0,
        }
    }

    // ── Lookahead ──────────────────────────────────────────────────────

    /// The kind of the current token. `Eof` past the end.
    pub(crate) fn current(&self) -> TokenKind {
        self.tokens
            .get(self.pos)
            .map(|t| t.kind.clone())
            .unwrap_or(TokenKind::Eof)
    }

    /// The kind of the Nth token ahead. `nth(0)` is `current()`.
    pub(crate) fn nth(&self, n: usize) -> TokenKind {
        self.tokens
            .get(self.pos + n)
            .map(|t| t.kind.clone())
            .unwrap_or(TokenKind::Eof)
    }

    /// Whether the current token matches the given kind.
    pub(crate) fn at(&self, kind: TokenKind) -> bool {
        self.current() == kind
    }

    /// The text of the current token. Back-tick quotes are stripped so a
    /// quoted identifier yields its bare name.
    pub(crate) fn current_text(&self) -> &'src str {
        let span = self.current_span();
        let text = &self.source[span.start as usize..span.end as usize];
        text.strip_prefix('`')
            .and_then(|t| t.strip_suffix('`'))
            .unwrap_or(text)
    }

    /// The span of the current token; a zero-length span at end of input.
    pub(crate) fn current_span(&self) -> Span {
        match self.tokens.get(self.pos) {
            Some(t) => t.span,
            None => Span::point(self.source.len() as u32),
        }
    }

    /// Span from a start offset to the end of the last consumed token.
    pub(crate) fn span_from(&self, start: u32) -> Span {
        Span::new(start, self.prev_end.max(start))
    }

    // ── Consumption ────────────────────────────────────────────────────

    /// Consume the current token and return it.
    pub(crate) fn advance(&mut self) -> Token {
        let token = self
            .tokens
            .get(self.pos)
            .cloned()
            .unwrap_or_else(|| Token::new(TokenKind::Eof, self.prev_end, self.prev_end));
        if token.kind != TokenKind::Eof {
            self.pos += 1;
        }
        self.prev_end = token.span.end;
        token
    }

    /// Consume the current token if it matches, otherwise report an error
    /// naming the expectation.
    pub(crate) fn expect(&mut self, kind: TokenKind, what: &str) -> PResult<Token> {
        if self.at(kind) {
            Ok(self.advance())
        } else {
            Err(self.unexpected(what))
        }
    }

    /// Consume the current token if it matches; report whether it did.
    pub(crate) fn eat(&mut self, kind: TokenKind) -> bool {
        if self.at(kind) {
            self.advance();
            true
        } else {
            false
        }
    }

    /// Build an error for the current (unexpected) token.
    pub(crate) fn unexpected(&self, what: &str) -> ParseError {
        let found = match self.current() {
            TokenKind::Eof => "end of input".to_string(),
            TokenKind::Error => "invalid token".to_string(),
            _ => format!("`{}`", self.current_text()),
        };
        ParseError::new(
            format!("expected {what}, found {found}"),
            self.current_span(),
        )
    }

    /// Hand out a fresh node id.
    pub(crate) fn fresh_id(&mut self) -> NodeId {
        let id = NodeId(self.next_id);
        self.next_id += 1;
        id
    }

    // ── Literal decoding ───────────────────────────────────────────────

    /// Decode an integer literal token (`~` negative sign).
    pub(crate) fn decode_int(text: &str) -> BigInt {
        let normalized = text.replace('~', "-");
        normalized
            .parse::<BigInt>()
            .unwrap_or_else(|_| BigInt::from(0))
    }

    /// Decode a real literal token (`~` signs in mantissa and exponent).
    pub(crate) fn decode_real(text: &str) -> f64 {
        let normalized = text.replace('~', "-");
        normalized.parse::<f64>().unwrap_or(0.0)
    }

    /// Decode the body of a string literal token, resolving the ML escape
    /// set. The token text includes the surrounding quotes.
    pub(crate) fn decode_string(text: &str, span: Span) -> PResult<String> {
        let body = &text[1..text.len() - 1];
        let mut out = String::with_capacity(body.len());
        let mut chars = body.chars();
        while let Some(c) = chars.next() {
            if c != '\\' {
                out.push(c);
                continue;
            }
            match chars.next() {
                Some('\\') => out.push('\\'),
                Some('"') => out.push('"'),
                Some('n') => out.push('\n'),
                Some('t') => out.push('\t'),
                Some('r') => out.push('\r'),
                Some('f') => out.push('\u{000C}'),
                Some('b') => out.push('\u{0008}'),
                Some('a') => out.push('\u{0007}'),
                Some('v') => out.push('\u{000B}'),
                Some('^') => match chars.next() {
                    Some(ctrl) if ('@'..='_').contains(&ctrl) => {
                        out.push(char::from((ctrl as u8) - b'@'));
                    }
                    _ => return Err(ParseError::new("invalid control escape", span)),
                },
                Some(d) if d.is_ascii_digit() => {
                    let d2 = chars.next();
                    let d3 = chars.next();
                    match (d2, d3) {
                        (Some(d2), Some(d3)) if d2.is_ascii_digit() && d3.is_ascii_digit() => {
                            let code = (d as u32 - '0' as u32) * 100
                                + (d2 as u32 - '0' as u32) * 10
                                + (d3 as u32 - '0' as u32);
                            match char::from_u32(code) {
                                Some(ch) if code < 256 => out.push(ch),
                                _ => {
                                    return Err(ParseError::new(
                                        "character escape out of range",
                                        span,
                                    ))
                                }
                            }
                        }
                        _ => return Err(ParseError::new("invalid decimal escape", span)),
                    }
                }
                _ => return Err(ParseError::new("invalid escape sequence", span)),
            }
        }
        Ok(out)
    }

    /// Decode a character literal token (`#"x"` form).
    pub(crate) fn decode_char(text: &str, span: Span) -> PResult<char> {
        // Strip `#"` and the closing quote, then reuse string decoding.
        let inner = &text[1..];
        let body = Self::decode_string(inner, span)?;
        let mut chars = body.chars();
        match (chars.next(), chars.next()) {
            (Some(c), None) => Ok(c),
            _ => Err(ParseError::new("character literal must be one character", span)),
        }
    }
}
