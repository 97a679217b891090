//! Pipeline parser: the shared step grammar of `from`, `exists`, `forall`.

use rill_common::token::TokenKind;

use crate::ast::{Agg, ExprKind, OrderKey, Query, Scan, ScanKind, SetOp, Step, StepKind};
use crate::error::ParseError;

use super::expressions::derive_label;
use super::{Parser, PResult};

/// Which quantifier introduced the pipeline. `exists`/`forall` forbid the
/// terminal `compute`/`into` steps, and `forall` must end in `require`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum PipelineKind {
    From,
    Exists,
    Forall,
}

/// Parse a pipeline after its introducing keyword has been consumed.
pub(crate) fn pipeline(p: &mut Parser, kind: PipelineKind) -> PResult<Query> {
    let start = p.current_span().start;

    // Head: zero or more scans.
    let mut scans = Vec::new();
    if p.at_pat_atom_start() {
        loop {
            scans.push(scan(p)?);
            if !p.eat(TokenKind::Comma) {
                break;
            }
        }
    }

    // Ordered steps.
    let mut steps = Vec::new();
    loop {
        let step_start = p.current_span().start;
        let step_kind = match p.current() {
            TokenKind::Where => {
                p.advance();
                StepKind::Where(p.expr()?)
            }
            TokenKind::Join => {
                p.advance();
                let mut join_scans = vec![scan(p)?];
                while p.eat(TokenKind::Comma) {
                    join_scans.push(scan(p)?);
                }
                let on = if p.eat(TokenKind::On) {
                    Some(p.expr()?)
                } else {
                    None
                };
                StepKind::Join {
                    scans: join_scans,
                    on,
                }
            }
            TokenKind::Group => group_step(p)?,
            TokenKind::Order => {
                p.advance();
                let mut keys = vec![order_key(p)?];
                while p.eat(TokenKind::Comma) {
                    keys.push(order_key(p)?);
                }
                StepKind::Order(keys)
            }
            TokenKind::Take => {
                p.advance();
                StepKind::Take(p.expr()?)
            }
            TokenKind::Skip => {
                p.advance();
                StepKind::Skip(p.expr()?)
            }
            TokenKind::Distinct => {
                p.advance();
                StepKind::Distinct
            }
            TokenKind::Unorder => {
                p.advance();
                StepKind::Unorder
            }
            TokenKind::Yield => {
                p.advance();
                StepKind::Yield(p.expr()?)
            }
            TokenKind::Through => {
                p.advance();
                let pat = p.pat()?;
                p.expect(TokenKind::In, "`in`")?;
                let func = p.expr()?;
                StepKind::Through { pat, func }
            }
            TokenKind::Compute => {
                p.advance();
                StepKind::Compute(agg_list(p)?)
            }
            TokenKind::Into => {
                p.advance();
                StepKind::Into(p.expr()?)
            }
            TokenKind::Require => {
                p.advance();
                StepKind::Require(p.expr()?)
            }
            TokenKind::Union => set_step(p, SetOp::Union)?,
            TokenKind::Intersect => set_step(p, SetOp::Intersect)?,
            TokenKind::Except => set_step(p, SetOp::Except)?,
            _ => break,
        };
        steps.push(Step {
            kind: step_kind,
            span: p.span_from(step_start),
        });
    }

    let query = Query {
        scans,
        steps,
        span: p.span_from(start),
    };
    validate(&query, kind)?;
    Ok(query)
}

/// One scan: `p in e`, `p = e`, or a bare unconstrained variable.
fn scan(p: &mut Parser) -> PResult<Scan> {
    let start = p.current_span().start;
    let pat = p.pat()?;
    let kind = if p.eat(TokenKind::In) {
        ScanKind::Source(p.expr()?)
    } else if p.eat(TokenKind::Eq) {
        ScanKind::Value(p.expr()?)
    } else {
        match &pat.kind {
            crate::ast::PatKind::Ident(_) => ScanKind::Unbounded,
            _ => {
                return Err(ParseError::new(
                    "an unconstrained scan must be a plain variable",
                    pat.span,
                ))
            }
        }
    };
    Ok(Scan {
        pat,
        kind,
        span: p.span_from(start),
    })
}

/// `group keys [compute aggs]`.
fn group_step(p: &mut Parser) -> PResult<StepKind> {
    p.advance(); // group
    let mut keys = Vec::new();
    if !p.at(TokenKind::Compute) {
        loop {
            let key_start = p.current_span().start;
            if p.at(TokenKind::Ident) && p.nth(1) == TokenKind::Eq {
                let label = p.current_text().to_string();
                p.advance();
                p.advance(); // =
                keys.push((label, p.expr()?));
            } else {
                let e = p.expr()?;
                match derive_label(&e) {
                    Some(label) => keys.push((label, e)),
                    None => {
                        return Err(ParseError::new(
                            "cannot derive a label for this group key",
                            p.span_from(key_start),
                        ))
                    }
                }
            }
            if !p.eat(TokenKind::Comma) {
                break;
            }
        }
    }
    let aggs = if p.eat(TokenKind::Compute) {
        agg_list(p)?
    } else {
        Vec::new()
    };
    Ok(StepKind::Group { keys, aggs })
}

/// Comma-separated aggregate items: `[label =] f (of | over) arg` or a bare
/// aggregate function.
fn agg_list(p: &mut Parser) -> PResult<Vec<Agg>> {
    let mut aggs = vec![agg(p)?];
    while p.eat(TokenKind::Comma) {
        aggs.push(agg(p)?);
    }
    Ok(aggs)
}

fn agg(p: &mut Parser) -> PResult<Agg> {
    let start = p.current_span().start;
    let explicit = if p.at(TokenKind::Ident) && p.nth(1) == TokenKind::Eq {
        let label = p.current_text().to_string();
        p.advance();
        p.advance(); // =
        Some(label)
    } else {
        None
    };
    let func = p.expr()?;
    let arg = if p.eat(TokenKind::Of) || p.eat(TokenKind::Over) {
        Some(p.expr()?)
    } else {
        None
    };
    let span = p.span_from(start);
    let label = match explicit {
        Some(l) => l,
        None => match &func.kind {
            ExprKind::Ident(name) => name.clone(),
            _ => {
                return Err(ParseError::new(
                    "aggregate needs a label: write `name = fn of expr`",
                    span,
                ))
            }
        },
    };
    Ok(Agg {
        label,
        func,
        arg,
        span,
    })
}

/// One ordering key with optional `desc` modifier.
fn order_key(p: &mut Parser) -> PResult<OrderKey> {
    let expr = p.expr()?;
    let desc = p.eat(TokenKind::Desc);
    Ok(OrderKey { expr, desc })
}

/// `union | intersect | except [distinct] e [, e ...]`.
fn set_step(p: &mut Parser, op: SetOp) -> PResult<StepKind> {
    p.advance(); // the operator keyword
    let distinct = p.eat(TokenKind::Distinct);
    let mut sources = vec![p.expr()?];
    while p.eat(TokenKind::Comma) {
        sources.push(p.expr()?);
    }
    Ok(StepKind::Set {
        op,
        distinct,
        sources,
    })
}

/// Step-position checks: terminal steps must be last, `compute`/`into` are
/// forbidden under the quantifiers, and `forall` must end in `require`.
fn validate(query: &Query, kind: PipelineKind) -> PResult<()> {
    let last = query.steps.len().saturating_sub(1);
    for (i, step) in query.steps.iter().enumerate() {
        match &step.kind {
            StepKind::Compute(_) | StepKind::Into(_) => {
                if kind != PipelineKind::From {
                    return Err(ParseError::new(
                        "`compute` and `into` are not allowed in exists/forall",
                        step.span,
                    ));
                }
                if i != last {
                    return Err(ParseError::new(
                        "`compute`/`into` must be the last step",
                        step.span,
                    ));
                }
            }
            StepKind::Require(_) => {
                if kind != PipelineKind::Forall {
                    return Err(ParseError::new(
                        "`require` is only allowed in forall",
                        step.span,
                    ));
                }
                if i != last {
                    return Err(ParseError::new(
                        "`require` must be the last step of forall",
                        step.span,
                    ));
                }
            }
            _ => {}
        }
    }
    if kind == PipelineKind::Forall
        && !matches!(
            query.steps.last().map(|s| &s.kind),
            Some(StepKind::Require(_))
        )
    {
        return Err(ParseError::new(
            "forall must end in a `require` step",
            query.span,
        ));
    }
    Ok(())
}
