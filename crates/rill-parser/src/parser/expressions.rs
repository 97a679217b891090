//! Pratt expression parser for Rill.
//!
//! Binding powers follow the operator table of the language reference:
//! the logical connectives are the loosest tier, then comparisons and
//! membership tests, then right-associative `::`/`@`, additive, then
//! multiplicative, then function application, with field selection
//! tightest of all.

use rill_common::token::TokenKind;

use crate::ast::{Arm, BinOp, Expr, ExprKind, Field};
use crate::error::ParseError;

use super::{query, Parser, PResult};

// ── Binding power tables ───────────────────────────────────────────────

/// Returns (left_bp, right_bp, operator) for infix operators.
///
/// Left < right means left-associative; left > right right-associative.
fn infix_binding_power(op: &TokenKind) -> Option<(u8, u8, BinOp)> {
    match op {
        // Logical connectives: one tier, left-associative.
        TokenKind::Andalso => Some((1, 2, BinOp::Andalso)),
        TokenKind::Orelse => Some((1, 2, BinOp::Orelse)),
        TokenKind::Implies => Some((1, 2, BinOp::Implies)),

        // Comparisons and membership.
        TokenKind::Eq => Some((3, 4, BinOp::Eq)),
        TokenKind::NotEq => Some((3, 4, BinOp::Ne)),
        TokenKind::Lt => Some((3, 4, BinOp::Lt)),
        TokenKind::LtEq => Some((3, 4, BinOp::Le)),
        TokenKind::Gt => Some((3, 4, BinOp::Gt)),
        TokenKind::GtEq => Some((3, 4, BinOp::Ge)),
        TokenKind::Elem => Some((3, 4, BinOp::Elem)),
        TokenKind::Notelem => Some((3, 4, BinOp::NotElem)),

        // List construction and append: right-associative.
        TokenKind::ConsOp => Some((6, 5, BinOp::Cons)),
        TokenKind::At => Some((6, 5, BinOp::Append)),

        // Additive and string concatenation.
        TokenKind::Plus => Some((7, 8, BinOp::Plus)),
        TokenKind::Minus => Some((7, 8, BinOp::Minus)),
        TokenKind::Caret => Some((7, 8, BinOp::Caret)),

        // Multiplicative and composition.
        TokenKind::Star => Some((9, 10, BinOp::Times)),
        TokenKind::Slash => Some((9, 10, BinOp::Divide)),
        TokenKind::Div => Some((9, 10, BinOp::Div)),
        TokenKind::Mod => Some((9, 10, BinOp::Mod)),
        TokenKind::O => Some((9, 10, BinOp::Compose)),

        _ => None,
    }
}

/// Function application binds tighter than every infix operator.
const APP_BP: u8 = 11;

impl Parser<'_> {
    // ── Entry point ────────────────────────────────────────────────────

    /// Parse a full expression, including the keyword-led forms that extend
    /// maximally to the right, a trailing `handle`, and type annotations.
    pub(crate) fn expr(&mut self) -> PResult<Expr> {
        let start = self.current_span().start;
        match self.current() {
            TokenKind::If => self.if_expr(),
            TokenKind::Case => self.case_expr(),
            TokenKind::Fn => self.fn_expr(),
            TokenKind::Raise => {
                self.advance();
                let body = self.expr()?;
                Ok(self.mk(start, ExprKind::Raise(Box::new(body))))
            }
            TokenKind::From => {
                self.advance();
                let q = query::pipeline(self, query::PipelineKind::From)?;
                Ok(self.mk(start, ExprKind::From(Box::new(q))))
            }
            TokenKind::Exists => {
                self.advance();
                let q = query::pipeline(self, query::PipelineKind::Exists)?;
                Ok(self.mk(start, ExprKind::Exists(Box::new(q))))
            }
            TokenKind::Forall => {
                self.advance();
                let q = query::pipeline(self, query::PipelineKind::Forall)?;
                Ok(self.mk(start, ExprKind::Forall(Box::new(q))))
            }
            _ => {
                let mut e = self.expr_bp(0)?;
                if self.at(TokenKind::Handle) {
                    self.advance();
                    let arms = self.match_arms()?;
                    e = self.mk(start, ExprKind::Handle(Box::new(e), arms));
                }
                while self.at(TokenKind::Colon) {
                    self.advance();
                    let ty = self.ty_expr()?;
                    e = self.mk(start, ExprKind::Annot(Box::new(e), ty));
                }
                Ok(e)
            }
        }
    }

    /// Parse an expression with the given minimum binding power. This is the
    /// core Pratt loop: parse an atom or prefix form, then fold postfix
    /// application and infix operators while they bind tightly enough.
    fn expr_bp(&mut self, min_bp: u8) -> PResult<Expr> {
        let start = self.current_span().start;
        let mut lhs = self.lhs()?;

        loop {
            let current = self.current();

            // ── Application by juxtaposition ──
            if APP_BP >= min_bp && self.at_atom_start() {
                let arg = self.atom()?;
                lhs = self.mk(start, ExprKind::App(Box::new(lhs), Box::new(arg)));
                continue;
            }

            // ── Infix operators ──
            if let Some((l_bp, r_bp, op)) = infix_binding_power(&current) {
                if l_bp < min_bp {
                    break;
                }
                self.advance();
                let rhs = self.expr_rhs(r_bp)?;
                lhs = self.mk(start, ExprKind::Binop(op, Box::new(lhs), Box::new(rhs)));
                continue;
            }

            break;
        }

        Ok(lhs)
    }

    /// Right operand of an infix operator. The keyword-led forms are legal
    /// here so that `1 + (case ...)`-style nesting does not need parentheses
    /// on the last operand: `x orelse raise E`, `k = if p then a else b`.
    fn expr_rhs(&mut self, r_bp: u8) -> PResult<Expr> {
        match self.current() {
            TokenKind::If
            | TokenKind::Case
            | TokenKind::Fn
            | TokenKind::Raise
            | TokenKind::From
            | TokenKind::Exists
            | TokenKind::Forall => self.expr(),
            _ => self.expr_bp(r_bp),
        }
    }

    /// Parse the left-hand side: a prefix negation or an atom.
    fn lhs(&mut self) -> PResult<Expr> {
        if self.at(TokenKind::Tilde) {
            let start = self.current_span().start;
            self.advance();
            let operand = self.expr_bp(APP_BP)?;
            return Ok(self.mk(start, ExprKind::Negate(Box::new(operand))));
        }
        self.atom()
    }

    /// Whether the current token can begin an atom (and therefore continue
    /// an application chain).
    fn at_atom_start(&self) -> bool {
        matches!(
            self.current(),
            TokenKind::Ident
                | TokenKind::IntLiteral
                | TokenKind::RealLiteral
                | TokenKind::StringLiteral
                | TokenKind::CharLiteral
                | TokenKind::True
                | TokenKind::False
                | TokenKind::LParen
                | TokenKind::LBracket
                | TokenKind::LBrace
                | TokenKind::Hash
                | TokenKind::Let
        )
    }

    /// Parse an atomic expression, then fold `.label` selections, which bind
    /// tightest of all.
    pub(crate) fn atom(&mut self) -> PResult<Expr> {
        let start = self.current_span().start;
        let mut e = self.atom_inner()?;
        while self.at(TokenKind::Dot) {
            self.advance();
            let label = self.field_label()?;
            e = self.mk(start, ExprKind::Select(Box::new(e), label));
        }
        Ok(e)
    }

    fn atom_inner(&mut self) -> PResult<Expr> {
        let start = self.current_span().start;
        match self.current() {
            TokenKind::IntLiteral => {
                let text = self.current_text().to_string();
                self.advance();
                Ok(self.mk(start, ExprKind::Int(Self::decode_int(&text))))
            }
            TokenKind::RealLiteral => {
                let text = self.current_text().to_string();
                self.advance();
                Ok(self.mk(start, ExprKind::Real(Self::decode_real(&text))))
            }
            TokenKind::StringLiteral => {
                let span = self.current_span();
                let text = self.current_text().to_string();
                self.advance();
                let value = Self::decode_string(&text, span)?;
                Ok(self.mk(start, ExprKind::Str(value)))
            }
            TokenKind::CharLiteral => {
                let span = self.current_span();
                let text = self.current_text().to_string();
                self.advance();
                let value = Self::decode_char(&text, span)?;
                Ok(self.mk(start, ExprKind::Char(value)))
            }
            TokenKind::True => {
                self.advance();
                Ok(self.mk(start, ExprKind::Bool(true)))
            }
            TokenKind::False => {
                self.advance();
                Ok(self.mk(start, ExprKind::Bool(false)))
            }
            TokenKind::Ident => {
                let name = self.current_text().to_string();
                self.advance();
                Ok(self.mk(start, ExprKind::Ident(name)))
            }
            TokenKind::Hash => {
                self.advance();
                let label = self.field_label()?;
                Ok(self.mk(start, ExprKind::Selector(label)))
            }
            TokenKind::LParen => self.paren_expr(),
            TokenKind::LBracket => self.list_expr(),
            TokenKind::LBrace => self.record_expr(),
            TokenKind::Let => self.let_expr(),
            _ => Err(self.unexpected("an expression")),
        }
    }

    /// A field label after `.` or `#`: an identifier or a tuple ordinal.
    fn field_label(&mut self) -> PResult<String> {
        match self.current() {
            TokenKind::Ident | TokenKind::IntLiteral => {
                let label = self.current_text().to_string();
                self.advance();
                Ok(label)
            }
            _ => Err(self.unexpected("a field label")),
        }
    }

    // ── Compound atoms ─────────────────────────────────────────────────

    /// `()`, `(e)`, or `(e, e, ...)`.
    fn paren_expr(&mut self) -> PResult<Expr> {
        let start = self.current_span().start;
        self.advance(); // (
        if self.eat(TokenKind::RParen) {
            return Ok(self.mk(start, ExprKind::Unit));
        }
        let first = self.expr()?;
        if self.at(TokenKind::Comma) {
            let mut items = vec![first];
            while self.eat(TokenKind::Comma) {
                items.push(self.expr()?);
            }
            self.expect(TokenKind::RParen, "`)`")?;
            Ok(self.mk(start, ExprKind::Tuple(items)))
        } else {
            self.expect(TokenKind::RParen, "`)` or `,`")?;
            Ok(first)
        }
    }

    /// `[e, e, ...]`.
    fn list_expr(&mut self) -> PResult<Expr> {
        let start = self.current_span().start;
        self.advance(); // [
        let mut items = Vec::new();
        if !self.at(TokenKind::RBracket) {
            items.push(self.expr()?);
            while self.eat(TokenKind::Comma) {
                items.push(self.expr()?);
            }
        }
        self.expect(TokenKind::RBracket, "`]`")?;
        Ok(self.mk(start, ExprKind::List(items)))
    }

    /// `{a, e.b, #c e, d = e}` with labels resolved per the record sugar.
    fn record_expr(&mut self) -> PResult<Expr> {
        let start = self.current_span().start;
        self.advance(); // {
        let mut fields = Vec::new();
        loop {
            fields.push(self.record_field()?);
            if !self.eat(TokenKind::Comma) {
                break;
            }
        }
        self.expect(TokenKind::RBrace, "`}`")?;
        Ok(self.mk(start, ExprKind::Record(fields)))
    }

    fn record_field(&mut self) -> PResult<Field> {
        let start = self.current_span().start;
        // Explicit `label = expr`.
        if self.at(TokenKind::Ident) && self.nth(1) == TokenKind::Eq {
            let label = self.current_text().to_string();
            self.advance();
            self.advance(); // =
            let expr = self.expr()?;
            return Ok(Field {
                label,
                expr,
                span: self.span_from(start),
            });
        }
        // Unlabeled field: the label must be derivable from the expression.
        let expr = self.expr()?;
        let span = self.span_from(start);
        match derive_label(&expr) {
            Some(label) => Ok(Field { label, expr, span }),
            None => Err(ParseError::new(
                "cannot derive a field label from this expression",
                span,
            )),
        }
    }

    /// `let decls in body end`.
    fn let_expr(&mut self) -> PResult<Expr> {
        let start = self.current_span().start;
        self.advance(); // let
        let mut decls = Vec::new();
        while !self.at(TokenKind::In) {
            decls.push(self.decl()?);
            // Declarations inside `let` may be separated by semicolons.
            while self.eat(TokenKind::Semicolon) {}
        }
        self.expect(TokenKind::In, "`in`")?;
        let body = self.expr()?;
        self.expect(TokenKind::End, "`end`")?;
        Ok(self.mk(start, ExprKind::Let(decls, Box::new(body))))
    }

    // ── Keyword-led forms ──────────────────────────────────────────────

    fn if_expr(&mut self) -> PResult<Expr> {
        let start = self.current_span().start;
        self.advance(); // if
        let cond = self.expr()?;
        self.expect(TokenKind::Then, "`then`")?;
        let then_branch = self.expr()?;
        self.expect(TokenKind::Else, "`else`")?;
        let else_branch = self.expr()?;
        Ok(self.mk(
            start,
            ExprKind::If(Box::new(cond), Box::new(then_branch), Box::new(else_branch)),
        ))
    }

    fn case_expr(&mut self) -> PResult<Expr> {
        let start = self.current_span().start;
        self.advance(); // case
        let scrutinee = self.expr()?;
        self.expect(TokenKind::Of, "`of`")?;
        let arms = self.match_arms()?;
        Ok(self.mk(start, ExprKind::Case(Box::new(scrutinee), arms)))
    }

    fn fn_expr(&mut self) -> PResult<Expr> {
        let start = self.current_span().start;
        self.advance(); // fn
        let arms = self.match_arms()?;
        Ok(self.mk(start, ExprKind::Fn(arms)))
    }

    /// A match: `p => e | p => e | ...`. Shared by `case`, `fn`, `handle`.
    pub(crate) fn match_arms(&mut self) -> PResult<Vec<Arm>> {
        let mut arms = Vec::new();
        loop {
            let start = self.current_span().start;
            let pat = self.pat()?;
            self.expect(TokenKind::FatArrow, "`=>`")?;
            let body = self.expr()?;
            arms.push(Arm {
                pat,
                body,
                span: self.span_from(start),
            });
            if !self.eat(TokenKind::Bar) {
                break;
            }
        }
        Ok(arms)
    }

    // ── Node construction ──────────────────────────────────────────────

    pub(crate) fn mk(&mut self, start: u32, kind: ExprKind) -> Expr {
        Expr {
            id: self.fresh_id(),
            span: self.span_from(start),
            kind,
        }
    }
}

/// Derive a record label from an unlabeled field expression: an identifier
/// contributes its own name, `e.f` contributes `f`, and `#f e` contributes
/// `f`.
pub(crate) fn derive_label(expr: &Expr) -> Option<String> {
    match &expr.kind {
        ExprKind::Ident(name) => Some(name.clone()),
        ExprKind::Select(_, label) => Some(label.clone()),
        ExprKind::App(f, _) => match &f.kind {
            ExprKind::Selector(label) => Some(label.clone()),
            _ => None,
        },
        _ => None,
    }
}
