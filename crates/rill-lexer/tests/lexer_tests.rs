//! Integration tests for the lexer: span accuracy and full-program token
//! streams.

use rill_common::span::Span;
use rill_common::token::TokenKind;
use rill_lexer::Lexer;

#[test]
fn spans_cover_the_source_exactly() {
    let src = "val x = 42;";
    let tokens = Lexer::tokenize(src);
    let texts: Vec<&str> = tokens
        .iter()
        .take_while(|t| t.kind != TokenKind::Eof)
        .map(|t| &src[t.span.start as usize..t.span.end as usize])
        .collect();
    assert_eq!(texts, vec!["val", "x", "=", "42", ";"]);
}

#[test]
fn eof_sits_at_the_end_of_input() {
    let src = "1 + 2";
    let tokens = Lexer::tokenize(src);
    let eof = tokens.last().expect("eof token");
    assert_eq!(eof.kind, TokenKind::Eof);
    assert_eq!(eof.span, Span::new(5, 5));
}

#[test]
fn comments_do_not_shift_following_spans() {
    let src = "(* skip *) from";
    let tokens = Lexer::tokenize(src);
    assert_eq!(tokens[0].kind, TokenKind::From);
    assert_eq!(tokens[0].span, Span::new(11, 15));
}

#[test]
fn full_pipeline_program_tokenizes() {
    let src = "from e in emps where e.deptno = 10 group e.deptno compute n = count over e;";
    let kinds: Vec<TokenKind> = Lexer::tokenize(src).into_iter().map(|t| t.kind).collect();
    assert!(!kinds.contains(&TokenKind::Error), "no error tokens: {kinds:?}");
    assert!(kinds.contains(&TokenKind::Group));
    assert!(kinds.contains(&TokenKind::Compute));
    assert!(kinds.contains(&TokenKind::Over));
}

#[test]
fn error_token_recovers_and_continues() {
    let src = "1 ? 2";
    let kinds: Vec<TokenKind> = Lexer::tokenize(src).into_iter().map(|t| t.kind).collect();
    assert_eq!(
        kinds,
        vec![
            TokenKind::IntLiteral,
            TokenKind::Error,
            TokenKind::IntLiteral,
            TokenKind::Eof,
        ]
    );
}
