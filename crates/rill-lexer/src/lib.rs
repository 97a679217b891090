// Rill lexer -- tokenizer for the Rill language.

mod cursor;

use cursor::Cursor;
use rill_common::token::{keyword_from_str, Token, TokenKind};

/// The Rill lexer. Converts source text into a stream of tokens.
///
/// Wraps a [`Cursor`] for byte-level iteration and implements
/// `Iterator<Item = Token>` so callers can consume tokens lazily or collect
/// them into a `Vec`. Whitespace and comments are skipped; malformed input
/// produces an `Error` token so the parser can recover and report a
/// positioned diagnostic.
pub struct Lexer<'src> {
    cursor: Cursor<'src>,
    /// Whether we have already emitted the `Eof` token.
    emitted_eof: bool,
}

impl<'src> Lexer<'src> {
    /// Create a new lexer for the given source text.
    pub fn new(source: &'src str) -> Self {
        Self {
            cursor: Cursor::new(source),
            emitted_eof: false,
        }
    }

    /// Convenience: tokenize the entire source into a `Vec<Token>`.
    ///
    /// The returned vector includes the final `Eof` token.
    pub fn tokenize(source: &str) -> Vec<Token> {
        Lexer::new(source).collect()
    }

    /// Produce the next token.
    fn produce_token(&mut self) -> Token {
        self.skip_trivia();

        let start = self.cursor.pos();

        let Some(c) = self.cursor.peek() else {
            return Token::new(TokenKind::Eof, start, start);
        };

        match c {
            // ── Delimiters ─────────────────────────────────────────────
            '(' => self.single_char_token(TokenKind::LParen, start),
            ')' => self.single_char_token(TokenKind::RParen, start),
            '[' => self.single_char_token(TokenKind::LBracket, start),
            ']' => self.single_char_token(TokenKind::RBracket, start),
            '{' => self.single_char_token(TokenKind::LBrace, start),
            '}' => self.single_char_token(TokenKind::RBrace, start),
            ',' => self.single_char_token(TokenKind::Comma, start),
            ';' => self.single_char_token(TokenKind::Semicolon, start),

            // ── Multi-character operators ──────────────────────────────
            '=' => self.lex_eq(start),
            '<' => self.lex_lt(start),
            '>' => self.lex_gt(start),
            ':' => self.lex_colon(start),
            '-' => self.lex_minus(start),
            '.' => self.lex_dot(start),
            '~' => self.lex_tilde(start),
            '#' => self.lex_hash(start),

            // ── Single-character operators ─────────────────────────────
            '+' => self.single_char_token(TokenKind::Plus, start),
            '^' => self.single_char_token(TokenKind::Caret, start),
            '*' => self.single_char_token(TokenKind::Star, start),
            '/' => self.single_char_token(TokenKind::Slash, start),
            '@' => self.single_char_token(TokenKind::At, start),
            '|' => self.single_char_token(TokenKind::Bar, start),
            '_' => self.single_char_token(TokenKind::Underscore, start),

            // ── Literals ───────────────────────────────────────────────
            '0'..='9' => self.lex_number(start, false),
            '"' => self.lex_string(start),

            // ── Type variables ─────────────────────────────────────────
            '\'' => self.lex_tyvar(start),

            // ── Quoted identifiers ─────────────────────────────────────
            '`' => self.lex_quoted_ident(start),

            // ── Identifiers and keywords ───────────────────────────────
            c if is_ident_start(c) => self.lex_ident(start),

            // ── Unknown character (error recovery) ─────────────────────
            _ => {
                self.cursor.advance();
                Token::new(TokenKind::Error, start, self.cursor.pos())
            }
        }
    }

    // ── Trivia ─────────────────────────────────────────────────────────

    /// Skip whitespace and comments. Comments are `(* ... *)` (nestable) and
    /// `(*)` to end of line.
    fn skip_trivia(&mut self) {
        loop {
            self.cursor
                .eat_while(|c| c == ' ' || c == '\t' || c == '\n' || c == '\r');
            if self.cursor.peek() == Some('(') && self.cursor.peek_next() == Some('*') {
                self.skip_comment();
            } else {
                break;
            }
        }
    }

    /// Skip one comment. The cursor is positioned at `(*`.
    fn skip_comment(&mut self) {
        self.cursor.advance(); // (
        self.cursor.advance(); // *
        if self.cursor.peek() == Some(')') {
            // `(*)` -- comment to end of line.
            self.cursor.advance();
            self.cursor.eat_while(|c| c != '\n');
            return;
        }
        // Nestable block comment. An unterminated comment just runs to EOF;
        // the parser will report the missing declaration terminator.
        let mut depth = 1u32;
        while depth > 0 {
            match self.cursor.peek() {
                None => return,
                Some('(') if self.cursor.peek_next() == Some('*') => {
                    self.cursor.advance();
                    self.cursor.advance();
                    depth += 1;
                }
                Some('*') if self.cursor.peek_next() == Some(')') => {
                    self.cursor.advance();
                    self.cursor.advance();
                    depth -= 1;
                }
                Some(_) => {
                    self.cursor.advance();
                }
            }
        }
    }

    // ── Helpers ────────────────────────────────────────────────────────

    /// Consume one character and return a token of the given kind.
    fn single_char_token(&mut self, kind: TokenKind, start: u32) -> Token {
        self.cursor.advance();
        Token::new(kind, start, self.cursor.pos())
    }

    // ── Operator lexing ────────────────────────────────────────────────

    /// `=` -> `Eq`, `=>` -> `FatArrow`
    fn lex_eq(&mut self, start: u32) -> Token {
        self.cursor.advance();
        if self.cursor.peek() == Some('>') {
            self.cursor.advance();
            Token::new(TokenKind::FatArrow, start, self.cursor.pos())
        } else {
            Token::new(TokenKind::Eq, start, self.cursor.pos())
        }
    }

    /// `<` -> `Lt`, `<=` -> `LtEq`, `<>` -> `NotEq`
    fn lex_lt(&mut self, start: u32) -> Token {
        self.cursor.advance();
        match self.cursor.peek() {
            Some('=') => {
                self.cursor.advance();
                Token::new(TokenKind::LtEq, start, self.cursor.pos())
            }
            Some('>') => {
                self.cursor.advance();
                Token::new(TokenKind::NotEq, start, self.cursor.pos())
            }
            _ => Token::new(TokenKind::Lt, start, self.cursor.pos()),
        }
    }

    /// `>` -> `Gt`, `>=` -> `GtEq`
    fn lex_gt(&mut self, start: u32) -> Token {
        self.cursor.advance();
        if self.cursor.peek() == Some('=') {
            self.cursor.advance();
            Token::new(TokenKind::GtEq, start, self.cursor.pos())
        } else {
            Token::new(TokenKind::Gt, start, self.cursor.pos())
        }
    }

    /// `:` -> `Colon`, `::` -> `ConsOp`
    fn lex_colon(&mut self, start: u32) -> Token {
        self.cursor.advance();
        if self.cursor.peek() == Some(':') {
            self.cursor.advance();
            Token::new(TokenKind::ConsOp, start, self.cursor.pos())
        } else {
            Token::new(TokenKind::Colon, start, self.cursor.pos())
        }
    }

    /// `-` -> `Minus`, `->` -> `Arrow`
    fn lex_minus(&mut self, start: u32) -> Token {
        self.cursor.advance();
        if self.cursor.peek() == Some('>') {
            self.cursor.advance();
            Token::new(TokenKind::Arrow, start, self.cursor.pos())
        } else {
            Token::new(TokenKind::Minus, start, self.cursor.pos())
        }
    }

    /// `.` -> `Dot`, `...` -> `Ellipsis`
    fn lex_dot(&mut self, start: u32) -> Token {
        self.cursor.advance();
        if self.cursor.peek() == Some('.') && self.cursor.peek_next() == Some('.') {
            self.cursor.advance();
            self.cursor.advance();
            Token::new(TokenKind::Ellipsis, start, self.cursor.pos())
        } else {
            Token::new(TokenKind::Dot, start, self.cursor.pos())
        }
    }

    /// `~` immediately followed by a digit starts a negative numeric literal;
    /// otherwise it is the unary negation operator.
    fn lex_tilde(&mut self, start: u32) -> Token {
        self.cursor.advance();
        if matches!(self.cursor.peek(), Some('0'..='9')) {
            self.lex_number(start, true)
        } else {
            Token::new(TokenKind::Tilde, start, self.cursor.pos())
        }
    }

    /// `#"` starts a character literal; bare `#` is the selector prefix.
    fn lex_hash(&mut self, start: u32) -> Token {
        self.cursor.advance();
        if self.cursor.peek() == Some('"') {
            self.cursor.advance();
            // Contents: one character or one escape sequence.
            match self.cursor.peek() {
                Some('\\') => {
                    if !self.eat_escape() {
                        return Token::new(TokenKind::Error, start, self.cursor.pos());
                    }
                }
                Some(c) if c != '"' => {
                    self.cursor.advance();
                }
                _ => return Token::new(TokenKind::Error, start, self.cursor.pos()),
            }
            if self.cursor.peek() == Some('"') {
                self.cursor.advance();
                Token::new(TokenKind::CharLiteral, start, self.cursor.pos())
            } else {
                Token::new(TokenKind::Error, start, self.cursor.pos())
            }
        } else {
            Token::new(TokenKind::Hash, start, self.cursor.pos())
        }
    }

    // ── Literal lexing ─────────────────────────────────────────────────

    /// Lex a numeric literal. `negated` means a leading `~` was consumed.
    /// Produces `IntLiteral` or, when a fraction or exponent is present,
    /// `RealLiteral`.
    fn lex_number(&mut self, start: u32, _negated: bool) -> Token {
        self.cursor.eat_while(|c| c.is_ascii_digit());
        let mut is_real = false;

        // Fraction: a dot followed by a digit. A bare dot is the selector.
        if self.cursor.peek() == Some('.')
            && matches!(self.cursor.peek_next(), Some('0'..='9'))
        {
            is_real = true;
            self.cursor.advance();
            self.cursor.eat_while(|c| c.is_ascii_digit());
        }

        // Exponent: `e`/`E` with optional `~` sign.
        if matches!(self.cursor.peek(), Some('e') | Some('E')) {
            let after_e = self.cursor.peek_next();
            let exp_ok = match after_e {
                Some('0'..='9') => true,
                Some('~') => true,
                _ => false,
            };
            if exp_ok {
                is_real = true;
                self.cursor.advance(); // e
                if self.cursor.peek() == Some('~') {
                    self.cursor.advance();
                }
                self.cursor.eat_while(|c| c.is_ascii_digit());
            }
        }

        let kind = if is_real {
            TokenKind::RealLiteral
        } else {
            TokenKind::IntLiteral
        };
        Token::new(kind, start, self.cursor.pos())
    }

    /// Lex a string literal. The standard ML escape set is accepted; an
    /// unterminated string or a bad escape yields an `Error` token.
    fn lex_string(&mut self, start: u32) -> Token {
        self.cursor.advance(); // opening quote
        loop {
            match self.cursor.peek() {
                None | Some('\n') => {
                    return Token::new(TokenKind::Error, start, self.cursor.pos());
                }
                Some('"') => {
                    self.cursor.advance();
                    return Token::new(TokenKind::StringLiteral, start, self.cursor.pos());
                }
                Some('\\') => {
                    if !self.eat_escape() {
                        return Token::new(TokenKind::Error, start, self.cursor.pos());
                    }
                }
                Some(_) => {
                    self.cursor.advance();
                }
            }
        }
    }

    /// Consume one escape sequence, cursor positioned at `\`. Returns false
    /// if the sequence is malformed.
    fn eat_escape(&mut self) -> bool {
        self.cursor.advance(); // backslash
        match self.cursor.peek() {
            Some('\\') | Some('"') | Some('n') | Some('t') | Some('r') | Some('f')
            | Some('b') | Some('a') | Some('v') => {
                self.cursor.advance();
                true
            }
            // `\^X` for control code X in `@`..`_`.
            Some('^') => {
                self.cursor.advance();
                match self.cursor.peek() {
                    Some(c) if ('@'..='_').contains(&c) => {
                        self.cursor.advance();
                        true
                    }
                    _ => false,
                }
            }
            // `\ddd` three-digit decimal.
            Some('0'..='9') => {
                for _ in 0..3 {
                    match self.cursor.peek() {
                        Some('0'..='9') => {
                            self.cursor.advance();
                        }
                        _ => return false,
                    }
                }
                true
            }
            _ => false,
        }
    }

    // ── Identifier lexing ──────────────────────────────────────────────

    /// Lex an identifier or keyword.
    fn lex_ident(&mut self, start: u32) -> Token {
        self.cursor.advance();
        self.cursor.eat_while(is_ident_continue);
        let text = self.cursor.slice(start, self.cursor.pos());
        let kind = keyword_from_str(text).unwrap_or(TokenKind::Ident);
        Token::new(kind, start, self.cursor.pos())
    }

    /// Lex a type variable: `'` followed by identifier characters.
    fn lex_tyvar(&mut self, start: u32) -> Token {
        self.cursor.advance(); // '
        if matches!(self.cursor.peek(), Some(c) if is_ident_start(c)) {
            self.cursor.advance();
            self.cursor.eat_while(is_ident_continue);
            Token::new(TokenKind::TyVarName, start, self.cursor.pos())
        } else {
            Token::new(TokenKind::Error, start, self.cursor.pos())
        }
    }

    /// Lex a back-tick quoted identifier, which allows reserved words as
    /// names: `` `from` ``.
    fn lex_quoted_ident(&mut self, start: u32) -> Token {
        self.cursor.advance(); // `
        self.cursor.eat_while(|c| c != '`' && c != '\n');
        if self.cursor.peek() == Some('`') {
            self.cursor.advance();
            Token::new(TokenKind::Ident, start, self.cursor.pos())
        } else {
            Token::new(TokenKind::Error, start, self.cursor.pos())
        }
    }
}

impl Iterator for Lexer<'_> {
    type Item = Token;

    fn next(&mut self) -> Option<Token> {
        if self.emitted_eof {
            return None;
        }
        let token = self.produce_token();
        if token.kind == TokenKind::Eof {
            self.emitted_eof = true;
        }
        Some(token)
    }
}

/// Whether a character can start an identifier.
fn is_ident_start(c: char) -> bool {
    c.is_alphabetic()
}

/// Whether a character can continue an identifier. Primes are allowed, as in
/// `x'` and `emp'`.
fn is_ident_continue(c: char) -> bool {
    c.is_alphanumeric() || c == '_' || c == '\''
}
