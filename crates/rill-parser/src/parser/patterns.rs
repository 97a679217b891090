//! Pattern parser for Rill.

use rill_common::token::TokenKind;

use crate::ast::{Pat, PatKind, RecordFieldPat};
use crate::error::ParseError;

use super::{Parser, PResult};

impl Parser<'_> {
    /// Parse a full pattern, including `::` chains, layered `as` patterns,
    /// and type annotations.
    pub(crate) fn pat(&mut self) -> PResult<Pat> {
        let start = self.current_span().start;
        let mut p = self.pat_cons()?;
        while self.at(TokenKind::Colon) {
            self.advance();
            let ty = self.ty_expr()?;
            p = self.mk_pat(start, PatKind::Annot(Box::new(p), ty));
        }
        Ok(p)
    }

    /// `p :: p :: p` is right-associative.
    fn pat_cons(&mut self) -> PResult<Pat> {
        let start = self.current_span().start;
        let head = self.pat_app()?;
        if self.eat(TokenKind::ConsOp) {
            let tail = self.pat_cons()?;
            Ok(self.mk_pat(start, PatKind::Cons(Box::new(head), Box::new(tail))))
        } else {
            Ok(head)
        }
    }

    /// Constructor application and layered patterns.
    fn pat_app(&mut self) -> PResult<Pat> {
        let start = self.current_span().start;
        if self.at(TokenKind::Ident) {
            // `v as p` -- layered pattern.
            if self.nth(1) == TokenKind::As {
                let name = self.current_text().to_string();
                self.advance(); // name
                self.advance(); // as
                let inner = self.pat_cons()?;
                return Ok(self.mk_pat(start, PatKind::As(name, Box::new(inner))));
            }
            // `C p` -- constructor application.
            if self.at_pat_atom_start_ahead(1) {
                let name = self.current_text().to_string();
                self.advance();
                let arg = self.pat_atom()?;
                return Ok(self.mk_pat(start, PatKind::Ctor(name, Box::new(arg))));
            }
        }
        self.pat_atom()
    }

    /// Whether the Nth token ahead can begin an atomic pattern.
    fn at_pat_atom_start_ahead(&self, n: usize) -> bool {
        matches!(
            self.nth(n),
            TokenKind::Underscore
                | TokenKind::Ident
                | TokenKind::IntLiteral
                | TokenKind::StringLiteral
                | TokenKind::CharLiteral
                | TokenKind::True
                | TokenKind::False
                | TokenKind::LParen
                | TokenKind::LBracket
                | TokenKind::LBrace
        )
    }

    /// Whether the current token can begin an atomic pattern. Used by the
    /// `fun` clause parser to collect curried argument patterns.
    pub(crate) fn at_pat_atom_start(&self) -> bool {
        self.at_pat_atom_start_ahead(0)
    }

    /// Parse an atomic pattern.
    pub(crate) fn pat_atom(&mut self) -> PResult<Pat> {
        let start = self.current_span().start;
        match self.current() {
            TokenKind::Underscore => {
                self.advance();
                Ok(self.mk_pat(start, PatKind::Wildcard))
            }
            TokenKind::IntLiteral => {
                let text = self.current_text().to_string();
                self.advance();
                Ok(self.mk_pat(start, PatKind::Int(Self::decode_int(&text))))
            }
            TokenKind::StringLiteral => {
                let span = self.current_span();
                let text = self.current_text().to_string();
                self.advance();
                let value = Self::decode_string(&text, span)?;
                Ok(self.mk_pat(start, PatKind::Str(value)))
            }
            TokenKind::CharLiteral => {
                let span = self.current_span();
                let text = self.current_text().to_string();
                self.advance();
                let value = Self::decode_char(&text, span)?;
                Ok(self.mk_pat(start, PatKind::Char(value)))
            }
            TokenKind::True => {
                self.advance();
                Ok(self.mk_pat(start, PatKind::Bool(true)))
            }
            TokenKind::False => {
                self.advance();
                Ok(self.mk_pat(start, PatKind::Bool(false)))
            }
            TokenKind::Ident => {
                let name = self.current_text().to_string();
                self.advance();
                Ok(self.mk_pat(start, PatKind::Ident(name)))
            }
            TokenKind::LParen => self.paren_pat(),
            TokenKind::LBracket => self.list_pat(),
            TokenKind::LBrace => self.record_pat(),
            _ => Err(self.unexpected("a pattern")),
        }
    }

    /// `()`, `(p)`, or `(p, p, ...)`.
    fn paren_pat(&mut self) -> PResult<Pat> {
        let start = self.current_span().start;
        self.advance(); // (
        if self.eat(TokenKind::RParen) {
            return Ok(self.mk_pat(start, PatKind::Unit));
        }
        let first = self.pat()?;
        if self.at(TokenKind::Comma) {
            let mut items = vec![first];
            while self.eat(TokenKind::Comma) {
                items.push(self.pat()?);
            }
            self.expect(TokenKind::RParen, "`)`")?;
            Ok(self.mk_pat(start, PatKind::Tuple(items)))
        } else {
            self.expect(TokenKind::RParen, "`)` or `,`")?;
            Ok(first)
        }
    }

    /// `[p, p, ...]`.
    fn list_pat(&mut self) -> PResult<Pat> {
        let start = self.current_span().start;
        self.advance(); // [
        let mut items = Vec::new();
        if !self.at(TokenKind::RBracket) {
            items.push(self.pat()?);
            while self.eat(TokenKind::Comma) {
                items.push(self.pat()?);
            }
        }
        self.expect(TokenKind::RBracket, "`]`")?;
        Ok(self.mk_pat(start, PatKind::List(items)))
    }

    /// `{a, b = p, ...}` -- a trailing ellipsis marks the record as open.
    fn record_pat(&mut self) -> PResult<Pat> {
        let start = self.current_span().start;
        self.advance(); // {
        let mut fields = Vec::new();
        let mut flex = false;
        loop {
            if self.at(TokenKind::Ellipsis) {
                self.advance();
                flex = true;
                break;
            }
            let field_start = self.current_span().start;
            let label_span = self.current_span();
            let label = match self.current() {
                TokenKind::Ident | TokenKind::IntLiteral => {
                    let t = self.current_text().to_string();
                    self.advance();
                    t
                }
                _ => return Err(self.unexpected("a field label or `...`")),
            };
            let pat = if self.eat(TokenKind::Eq) {
                self.pat()?
            } else {
                // `{a}` binds the field to a variable of the same name.
                let id = self.fresh_id();
                Pat {
                    id,
                    span: label_span,
                    kind: PatKind::Ident(label.clone()),
                }
            };
            fields.push(RecordFieldPat {
                label,
                pat,
                span: self.span_from(field_start),
            });
            if !self.eat(TokenKind::Comma) {
                break;
            }
        }
        self.expect(TokenKind::RBrace, "`}`")?;
        if fields.is_empty() && !flex {
            return Err(ParseError::new(
                "record pattern must name at least one field",
                self.span_from(start),
            ));
        }
        Ok(self.mk_pat(
            start,
            PatKind::Record { fields, flex },
        ))
    }

    pub(crate) fn mk_pat(&mut self, start: u32, kind: PatKind) -> Pat {
        Pat {
            id: self.fresh_id(),
            span: self.span_from(start),
            kind,
        }
    }
}
