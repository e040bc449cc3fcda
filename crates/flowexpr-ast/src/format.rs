//! Textual form of expressions.
//!
//! Formatting is the inverse of parsing up to token-format equivalence:
//! `parse(format(e))` yields an expression semantically equal to `e`.
//! Operator precedence dictates parenthesization; value sets print with the
//! `{…}` sugar when the tree shape allows it.

use std::fmt;

use flowexpr_token::{IntLiteral, TokenKind};

use crate::{Cmp, Expr, RelOp};

impl fmt::Display for Expr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt_expr(self, f, Ctx::Top)
    }
}

#[derive(Clone, Copy, PartialEq)]
enum Ctx {
    Top,
    InAnd,
    InOr,
}

fn fmt_expr(expr: &Expr, f: &mut fmt::Formatter<'_>, ctx: Ctx) -> fmt::Result {
    match expr {
        Expr::Cmp(cmp) => fmt_cmp(cmp, f),
        Expr::Boolean(b) => write!(f, "{}", u8::from(*b)),
        Expr::And(children) => {
            if let Some((symbol, cmps)) = as_value_set(children, RelOp::Ne) {
                return fmt_set(symbol, RelOp::Ne, cmps, f);
            }
            // Conjunctions parenthesize inside a disjunction for
            // readability, though precedence alone would not require it.
            let parens = ctx == Ctx::InOr;
            if parens {
                write!(f, "(")?;
            }
            for (i, child) in children.iter().enumerate() {
                if i > 0 {
                    write!(f, " && ")?;
                }
                fmt_expr(child, f, Ctx::InAnd)?;
            }
            if parens {
                write!(f, ")")?;
            }
            Ok(())
        }
        Expr::Or(children) => {
            if let Some((symbol, cmps)) = as_value_set(children, RelOp::Eq) {
                return fmt_set(symbol, RelOp::Eq, cmps, f);
            }
            // Disjunction binds loosest, so inside a conjunction it needs
            // parentheses.
            let parens = ctx == Ctx::InAnd;
            if parens {
                write!(f, "(")?;
            }
            for (i, child) in children.iter().enumerate() {
                if i > 0 {
                    write!(f, " || ")?;
                }
                fmt_expr(child, f, Ctx::InOr)?;
            }
            if parens {
                write!(f, ")")?;
            }
            Ok(())
        }
    }
}

/// Children forming a `{…}` set: all comparisons with `relop` against the
/// same non-predicate symbol.
fn as_value_set<'e>(children: &'e [Expr], relop: RelOp) -> Option<(&'e str, Vec<&'e Cmp>)> {
    let mut cmps = Vec::with_capacity(children.len());
    let mut symbol: Option<&str> = None;
    for child in children {
        let Expr::Cmp(cmp) = child else { return None };
        if cmp.relop != relop || cmp.symbol.is_predicate() {
            return None;
        }
        match symbol {
            None => symbol = Some(&cmp.symbol.name),
            Some(name) if name == cmp.symbol.name => {}
            Some(_) => return None,
        }
        cmps.push(cmp);
    }
    symbol.map(|name| (name, cmps))
}

fn fmt_set(symbol: &str, relop: RelOp, cmps: Vec<&Cmp>, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "{symbol} {} {{", relop.symbol())?;
    for (i, cmp) in cmps.iter().enumerate() {
        if i > 0 {
            write!(f, ", ")?;
        }
        fmt_constant(cmp, f)?;
    }
    write!(f, "}}")
}

fn fmt_cmp(cmp: &Cmp, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    if cmp.string.is_none() && cmp.symbol.is_predicate() {
        if cmp.value == 0 {
            write!(f, "!")?;
        }
        return write!(f, "{}", cmp.symbol.name);
    }
    write!(f, "{} {} ", cmp.symbol.name, cmp.relop.symbol())?;
    fmt_constant(cmp, f)
}

fn fmt_constant(cmp: &Cmp, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    if let Some(s) = &cmp.string {
        return write!(f, "{}", TokenKind::String(s.clone()));
    }
    let kind = if cmp.is_full_width() {
        TokenKind::Integer(IntLiteral::new(cmp.value, cmp.format))
    } else {
        TokenKind::MaskedInteger(IntLiteral::masked(cmp.value, cmp.mask, cmp.format))
    };
    write!(f, "{kind}")
}
