//! Declaration and type-expression parsing for Rill.

use rill_common::token::TokenKind;

use crate::ast::{
    ConBind, DatatypeBind, Decl, DeclKind, FunBind, FunClause, SigSpec, TyExpr, TyExprKind,
    ValBind,
};
use crate::error::ParseError;

use super::{Parser, PResult};

impl Parser<'_> {
    /// Parse one declaration.
    pub(crate) fn decl(&mut self) -> PResult<Decl> {
        let start = self.current_span().start;
        let kind = match self.current() {
            TokenKind::Val => self.val_decl()?,
            TokenKind::Fun => self.fun_decl()?,
            TokenKind::Datatype => self.datatype_decl()?,
            TokenKind::Type => self.type_decl()?,
            TokenKind::Over => {
                self.advance();
                let name = self.ident("an overload name")?;
                DeclKind::Over(name)
            }
            TokenKind::Exception => self.exception_decl()?,
            TokenKind::Signature => self.signature_decl()?,
            _ => DeclKind::Expr(self.expr()?),
        };
        Ok(Decl {
            span: self.span_from(start),
            kind,
        })
    }

    fn ident(&mut self, what: &str) -> PResult<String> {
        if self.at(TokenKind::Ident) {
            let name = self.current_text().to_string();
            self.advance();
            Ok(name)
        } else {
            Err(self.unexpected(what))
        }
    }

    // ── val ────────────────────────────────────────────────────────────

    /// `val [rec] [inst] p = e [and p = e ...]`.
    fn val_decl(&mut self) -> PResult<DeclKind> {
        self.advance(); // val
        let rec = self.eat(TokenKind::Rec);
        let inst = self.eat(TokenKind::Inst);
        let mut binds = Vec::new();
        loop {
            let start = self.current_span().start;
            let pat = self.pat()?;
            self.expect(TokenKind::Eq, "`=`")?;
            let expr = self.expr()?;
            binds.push(ValBind {
                pat,
                expr,
                span: self.span_from(start),
            });
            if !self.eat(TokenKind::And) {
                break;
            }
        }
        Ok(DeclKind::Val { rec, inst, binds })
    }

    // ── fun ────────────────────────────────────────────────────────────

    /// `fun f p1 p2 = e [| f q1 q2 = e ...] [and g ...]`.
    fn fun_decl(&mut self) -> PResult<DeclKind> {
        self.advance(); // fun
        let mut binds = Vec::new();
        loop {
            binds.push(self.fun_bind()?);
            if !self.eat(TokenKind::And) {
                break;
            }
        }
        Ok(DeclKind::Fun(binds))
    }

    fn fun_bind(&mut self) -> PResult<FunBind> {
        let start = self.current_span().start;
        let name = self.ident("a function name")?;
        let mut clauses = vec![self.fun_clause()?];
        while self.eat(TokenKind::Bar) {
            let clause_name_span = self.current_span();
            let clause_name = self.ident("the function name")?;
            if clause_name != name {
                return Err(ParseError::new(
                    format!("clause name `{clause_name}` does not match `{name}`"),
                    clause_name_span,
                ));
            }
            clauses.push(self.fun_clause()?);
        }
        Ok(FunBind {
            name,
            clauses,
            span: self.span_from(start),
        })
    }

    /// One clause, after its name: curried atomic patterns, an optional
    /// result annotation, `=`, body.
    fn fun_clause(&mut self) -> PResult<FunClause> {
        let start = self.current_span().start;
        let mut pats = Vec::new();
        while self.at_pat_atom_start() {
            pats.push(self.pat_atom()?);
        }
        if pats.is_empty() {
            return Err(self.unexpected("an argument pattern"));
        }
        let ret_ty = if self.eat(TokenKind::Colon) {
            Some(self.ty_expr()?)
        } else {
            None
        };
        self.expect(TokenKind::Eq, "`=`")?;
        let body = self.expr()?;
        Ok(FunClause {
            pats,
            ret_ty,
            body,
            span: self.span_from(start),
        })
    }

    // ── datatype / type ────────────────────────────────────────────────

    /// `datatype ['a | ('a, 'b)] t = A | B of ty [and ...]`.
    fn datatype_decl(&mut self) -> PResult<DeclKind> {
        self.advance(); // datatype
        let mut binds = Vec::new();
        loop {
            binds.push(self.datatype_bind()?);
            if !self.eat(TokenKind::And) {
                break;
            }
        }
        Ok(DeclKind::Datatype(binds))
    }

    fn datatype_bind(&mut self) -> PResult<DatatypeBind> {
        let start = self.current_span().start;
        let params = self.ty_params()?;
        let name = self.ident("a datatype name")?;
        self.expect(TokenKind::Eq, "`=`")?;
        let mut ctors = Vec::new();
        loop {
            let ctor_start = self.current_span().start;
            let ctor_name = self.ident("a constructor name")?;
            let arg = if self.eat(TokenKind::Of) {
                Some(self.ty_expr()?)
            } else {
                None
            };
            ctors.push(ConBind {
                name: ctor_name,
                arg,
                span: self.span_from(ctor_start),
            });
            if !self.eat(TokenKind::Bar) {
                break;
            }
        }
        Ok(DatatypeBind {
            params,
            name,
            ctors,
            span: self.span_from(start),
        })
    }

    /// `type [tyvars] name = ty`.
    fn type_decl(&mut self) -> PResult<DeclKind> {
        self.advance(); // type
        let params = self.ty_params()?;
        let name = self.ident("a type name")?;
        self.expect(TokenKind::Eq, "`=`")?;
        let ty = self.ty_expr()?;
        Ok(DeclKind::TypeAlias { params, name, ty })
    }

    /// Type parameter list: nothing, `'a`, or `('a, 'b)`.
    fn ty_params(&mut self) -> PResult<Vec<String>> {
        if self.at(TokenKind::TyVarName) {
            let name = self.tyvar_name();
            self.advance();
            return Ok(vec![name]);
        }
        if self.at(TokenKind::LParen) && self.nth(1) == TokenKind::TyVarName {
            self.advance(); // (
            let mut params = Vec::new();
            loop {
                if !self.at(TokenKind::TyVarName) {
                    return Err(self.unexpected("a type variable"));
                }
                params.push(self.tyvar_name());
                self.advance();
                if !self.eat(TokenKind::Comma) {
                    break;
                }
            }
            self.expect(TokenKind::RParen, "`)`")?;
            return Ok(params);
        }
        Ok(Vec::new())
    }

    /// The name of the current type-variable token, without the quote.
    fn tyvar_name(&self) -> String {
        self.current_text().trim_start_matches('\'').to_string()
    }

    // ── exception / signature ──────────────────────────────────────────

    /// `exception E [of ty]`.
    fn exception_decl(&mut self) -> PResult<DeclKind> {
        self.advance(); // exception
        let name = self.ident("an exception name")?;
        let arg = if self.eat(TokenKind::Of) {
            Some(self.ty_expr()?)
        } else {
            None
        };
        Ok(DeclKind::Exception { name, arg })
    }

    /// `signature S = sig val x : ty ... end`.
    fn signature_decl(&mut self) -> PResult<DeclKind> {
        self.advance(); // signature
        let name = self.ident("a signature name")?;
        self.expect(TokenKind::Eq, "`=`")?;
        self.expect(TokenKind::Sig, "`sig`")?;
        let mut specs = Vec::new();
        while self.at(TokenKind::Val) {
            let start = self.current_span().start;
            self.advance(); // val
            let spec_name = self.ident("a value name")?;
            self.expect(TokenKind::Colon, "`:`")?;
            let ty = self.ty_expr()?;
            specs.push(SigSpec {
                name: spec_name,
                ty,
                span: self.span_from(start),
            });
        }
        self.expect(TokenKind::End, "`end`")?;
        Ok(DeclKind::Signature { name, specs })
    }

    // ── Type expressions ───────────────────────────────────────────────

    /// Parse a type expression. `->` is right-associative, `*` builds a
    /// non-associative product, and constructor application is postfix.
    pub(crate) fn ty_expr(&mut self) -> PResult<TyExpr> {
        let start = self.current_span().start;
        let lhs = self.ty_product()?;
        if self.eat(TokenKind::Arrow) {
            let rhs = self.ty_expr()?;
            Ok(TyExpr {
                span: self.span_from(start),
                kind: TyExprKind::Fn(Box::new(lhs), Box::new(rhs)),
            })
        } else {
            Ok(lhs)
        }
    }

    fn ty_product(&mut self) -> PResult<TyExpr> {
        let start = self.current_span().start;
        let first = self.ty_postfix()?;
        if !self.at(TokenKind::Star) {
            return Ok(first);
        }
        let mut items = vec![first];
        while self.eat(TokenKind::Star) {
            items.push(self.ty_postfix()?);
        }
        Ok(TyExpr {
            span: self.span_from(start),
            kind: TyExprKind::Tuple(items),
        })
    }

    /// Postfix constructor application: `int list`, `(int, string) pair`.
    fn ty_postfix(&mut self) -> PResult<TyExpr> {
        let start = self.current_span().start;
        let mut args: Vec<TyExpr>;

        if self.at(TokenKind::LParen) {
            self.advance(); // (
            if self.eat(TokenKind::RParen) {
                args = vec![TyExpr {
                    span: self.span_from(start),
                    kind: TyExprKind::Unit,
                }];
            } else {
                args = vec![self.ty_expr()?];
                while self.eat(TokenKind::Comma) {
                    args.push(self.ty_expr()?);
                }
                self.expect(TokenKind::RParen, "`)`")?;
            }
            if args.len() > 1 && !self.at(TokenKind::Ident) {
                return Err(self.unexpected("a type constructor"));
            }
        } else {
            args = vec![self.ty_atom()?];
        }

        while self.at(TokenKind::Ident) {
            let name = self.current_text().to_string();
            self.advance();
            let applied = TyExpr {
                span: self.span_from(start),
                kind: TyExprKind::Con(name, args),
            };
            args = vec![applied];
        }

        Ok(args.pop().expect("postfix type always has one result"))
    }

    fn ty_atom(&mut self) -> PResult<TyExpr> {
        let start = self.current_span().start;
        match self.current() {
            TokenKind::TyVarName => {
                let name = self.tyvar_name();
                self.advance();
                Ok(TyExpr {
                    span: self.span_from(start),
                    kind: TyExprKind::Var(name),
                })
            }
            TokenKind::Ident => {
                let name = self.current_text().to_string();
                self.advance();
                Ok(TyExpr {
                    span: self.span_from(start),
                    kind: TyExprKind::Con(name, Vec::new()),
                })
            }
            TokenKind::LBrace => {
                self.advance(); // {
                let mut fields = Vec::new();
                if !self.at(TokenKind::RBrace) {
                    loop {
                        let label = match self.current() {
                            TokenKind::Ident | TokenKind::IntLiteral => {
                                let t = self.current_text().to_string();
                                self.advance();
                                t
                            }
                            _ => return Err(self.unexpected("a field label")),
                        };
                        self.expect(TokenKind::Colon, "`:`")?;
                        let ty = self.ty_expr()?;
                        fields.push((label, ty));
                        if !self.eat(TokenKind::Comma) {
                            break;
                        }
                    }
                }
                self.expect(TokenKind::RBrace, "`}`")?;
                Ok(TyExpr {
                    span: self.span_from(start),
                    kind: TyExprKind::Record(fields),
                })
            }
            _ => Err(self.unexpected("a type")),
        }
    }
}
