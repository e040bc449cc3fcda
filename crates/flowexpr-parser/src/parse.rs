//! Recursive-descent parser for match expressions.
//!
//! Grammar, loosest binding first:
//!
//! ```text
//! expr     := or-expr
//! or-expr  := and-expr ( '||' and-expr )*
//! and-expr := unary    ( '&&' unary    )*
//! unary    := '!' unary | primary
//! primary  := '(' expr ')'
//!           | symbol ( relop rhs )?
//!           | symbol '[' N ( '..' M )? ']' ( relop rhs )?
//! rhs      := scalar | '{' scalar ( ',' scalar )* '}'
//! ```
//!
//! A bare numeric symbol means `symbol != 0`; a bare Boolean symbol means
//! the predicate it names. `==` against a `{set}` builds a disjunction of
//! equalities, `!=` a conjunction of disequalities.

use std::sync::Arc;

use flowexpr_ast::{Cmp, Expr, RelOp};
use flowexpr_error::{ExprError, Result};
use flowexpr_lexer::Lexer;
use flowexpr_symtab::{Symbol, SymbolTable};
use flowexpr_token::{IntFormat, IntLiteral, Token, TokenKind, all_ones, mask_is_contiguous};

/// Parse `text` into a typed expression, resolving names in `symtab`.
pub fn compile(text: &str, symtab: &SymbolTable) -> Result<Expr> {
    let mut parser = Parser::new(text, symtab)?;
    let expr = parser.parse_expr()?;
    parser.expect_end()?;
    Ok(expr)
}

pub(crate) struct Parser<'a> {
    lexer: Lexer<'a>,
    token: Token,
    symtab: &'a SymbolTable,
}

impl<'a> Parser<'a> {
    pub(crate) fn new(text: &'a str, symtab: &'a SymbolTable) -> Result<Self> {
        let mut lexer = Lexer::new(text);
        let token = first_valid(&mut lexer)?;
        Ok(Parser { lexer, token, symtab })
    }

    pub(crate) fn advance(&mut self) -> Result<()> {
        self.token = first_valid(&mut self.lexer)?;
        Ok(())
    }

    fn syntax(&self, message: impl Into<String>) -> ExprError {
        ExprError::Syntax { message: message.into(), position: self.token.start }
    }

    pub(crate) fn at_end(&self) -> bool {
        self.token.kind == TokenKind::End
    }

    pub(crate) fn position(&self) -> usize {
        self.token.start
    }

    pub(crate) fn kind(&self) -> &TokenKind {
        &self.token.kind
    }

    pub(crate) fn expect_end(&self) -> Result<()> {
        if self.at_end() {
            Ok(())
        } else {
            Err(self.syntax(format!("unexpected `{}` after expression", self.token.text)))
        }
    }

    pub(crate) fn expect(&mut self, kind: TokenKind, what: &str) -> Result<()> {
        if self.token.kind == kind {
            self.advance()
        } else {
            Err(self.syntax(format!("expecting {what}")))
        }
    }

    pub(crate) fn parse_expr(&mut self) -> Result<Expr> {
        let mut children = vec![self.parse_and()?];
        while self.token.kind == TokenKind::LogOr {
            self.advance()?;
            children.push(self.parse_and()?);
        }
        Ok(Expr::or(children))
    }

    fn parse_and(&mut self) -> Result<Expr> {
        let mut children = vec![self.parse_unary()?];
        while self.token.kind == TokenKind::LogAnd {
            self.advance()?;
            children.push(self.parse_unary()?);
        }
        Ok(Expr::and(children))
    }

    fn parse_unary(&mut self) -> Result<Expr> {
        if self.token.kind == TokenKind::Not {
            self.advance()?;
            return Ok(self.parse_unary()?.negate());
        }
        self.parse_primary()
    }

    fn parse_primary(&mut self) -> Result<Expr> {
        match self.token.kind.clone() {
            TokenKind::LParen => {
                self.advance()?;
                let expr = self.parse_expr()?;
                self.expect(TokenKind::RParen, "`)`")?;
                Ok(expr)
            }
            // Formatted truth literals round-trip through here.
            TokenKind::Integer(lit) if lit.value <= 1 => {
                let value = lit.value;
                self.advance()?;
                Ok(Expr::Boolean(value == 1))
            }
            TokenKind::Id(name) => {
                let position = self.token.start;
                let symbol = self.symtab.resolve(&name, position)?;
                self.advance()?;
                let window = self.parse_window(&symbol)?;
                self.parse_comparison(symbol, window, position)
            }
            _ => Err(self.syntax(format!("unexpected `{}` where expression expected", self.token.text))),
        }
    }

    /// Optional `[N]` / `[N..M]` bit window after a symbol.
    pub(crate) fn parse_window(&mut self, symbol: &Arc<Symbol>) -> Result<Option<(u8, u8)>> {
        if self.token.kind != TokenKind::LSquare {
            return Ok(None);
        }
        let position = self.token.start;
        if symbol.is_string() || symbol.is_predicate() {
            return Err(ExprError::TypeMismatch {
                message: format!("`{}` is not a numeric field and has no bits", symbol.name),
                position,
            });
        }
        self.advance()?;
        let lo = self.parse_bit_index()?;
        let hi = if self.token.kind == TokenKind::DotDot {
            self.advance()?;
            self.parse_bit_index()?
        } else {
            lo
        };
        self.expect(TokenKind::RSquare, "`]`")?;
        if hi < lo || hi >= symbol.n_bits() {
            return Err(ExprError::SubfieldOutOfBounds { name: symbol.name.clone() });
        }
        Ok(Some((lo, hi)))
    }

    fn parse_bit_index(&mut self) -> Result<u8> {
        let TokenKind::Integer(lit) = self.token.kind.clone() else {
            return Err(self.syntax("expecting bit offset"));
        };
        if lit.value >= 128 {
            return Err(ExprError::RangeOverflow {
                message: format!("bit offset {} exceeds 127", lit.value),
                position: self.token.start,
            });
        }
        self.advance()?;
        Ok(lit.value as u8)
    }

    fn parse_relop(&mut self) -> Result<Option<RelOp>> {
        let relop = match self.token.kind {
            TokenKind::Eq => RelOp::Eq,
            TokenKind::Ne => RelOp::Ne,
            TokenKind::Lt => RelOp::Lt,
            TokenKind::Le => RelOp::Le,
            TokenKind::Gt => RelOp::Gt,
            TokenKind::Ge => RelOp::Ge,
            _ => return Ok(None),
        };
        self.advance()?;
        Ok(Some(relop))
    }

    fn parse_comparison(
        &mut self,
        symbol: Arc<Symbol>,
        window: Option<(u8, u8)>,
        position: usize,
    ) -> Result<Expr> {
        let Some(relop) = self.parse_relop()? else {
            // Bare reference: predicate truth, or `symbol != 0`.
            if symbol.is_predicate() {
                return Ok(predicate_ref(symbol, true));
            }
            if symbol.is_string() {
                return Err(ExprError::TypeMismatch {
                    message: format!("string symbol `{}` requires a comparison", symbol.name),
                    position,
                });
            }
            let (lo, hi) = window.unwrap_or((0, symbol.n_bits() - 1));
            let mask = all_ones(hi - lo + 1) << lo;
            let format = symbol.format();
            return Ok(Expr::Cmp(Cmp::numeric(symbol, RelOp::Ne, 0, mask, format)));
        };

        if symbol.is_predicate() {
            return Err(ExprError::TypeMismatch {
                message: format!("predicate `{}` cannot be compared to a value", symbol.name),
                position,
            });
        }

        if self.token.kind == TokenKind::LCurly {
            self.advance()?;
            let mut members = vec![self.parse_member(&symbol, window, relop)?];
            while self.token.kind == TokenKind::Comma {
                self.advance()?;
                members.push(self.parse_member(&symbol, window, relop)?);
            }
            self.expect(TokenKind::RCurly, "`}`")?;
            return match relop {
                RelOp::Eq => Ok(Expr::or(members)),
                RelOp::Ne => Ok(Expr::and(members)),
                _ => Err(ExprError::TypeMismatch {
                    message: "value sets take only `==` or `!=`".to_string(),
                    position,
                }),
            };
        }

        let member = self.parse_member(&symbol, window, relop)?;
        Ok(member)
    }

    /// One scalar comparison against `symbol`, type- and width-checked.
    fn parse_member(
        &mut self,
        symbol: &Arc<Symbol>,
        window: Option<(u8, u8)>,
        relop: RelOp,
    ) -> Result<Expr> {
        let position = self.token.start;
        match self.token.kind.clone() {
            TokenKind::String(value) => {
                if !symbol.is_string() {
                    return Err(ExprError::TypeMismatch {
                        message: format!("field `{}` takes numeric values", symbol.name),
                        position,
                    });
                }
                if relop.is_ordering() {
                    return Err(ExprError::TypeMismatch {
                        message: "strings take only `==` or `!=`".to_string(),
                        position,
                    });
                }
                self.advance()?;
                Ok(Expr::Cmp(Cmp::string(symbol.clone(), relop, &value)))
            }
            TokenKind::Integer(lit) => {
                self.advance()?;
                self.numeric_member(symbol, window, relop, lit, false, position)
            }
            TokenKind::MaskedInteger(lit) => {
                self.advance()?;
                self.numeric_member(symbol, window, relop, lit, true, position)
            }
            TokenKind::Id(_) => Err(self.syntax("expecting a constant on the right of a comparison")),
            _ => Err(self.syntax("expecting a constant")),
        }
    }

    fn numeric_member(
        &self,
        symbol: &Arc<Symbol>,
        window: Option<(u8, u8)>,
        relop: RelOp,
        lit: IntLiteral,
        explicit_mask: bool,
        position: usize,
    ) -> Result<Expr> {
        if symbol.is_string() {
            return Err(ExprError::TypeMismatch {
                message: format!("string symbol `{}` takes quoted values", symbol.name),
                position,
            });
        }
        let (lo, hi) = window.unwrap_or((0, symbol.n_bits() - 1));
        let width = hi - lo + 1;
        let width_mask = all_ones(width);

        let mask = if explicit_mask { lit.mask } else { width_mask };
        if mask & !width_mask != 0 {
            return Err(ExprError::RangeOverflow {
                message: format!("mask does not fit in {width} bits"),
                position,
            });
        }
        if lit.value & !width_mask != 0 {
            return Err(ExprError::RangeOverflow {
                message: format!(
                    "value {} does not fit in {width} bits of `{}`",
                    lit.value, symbol.name
                ),
                position,
            });
        }
        if relop.is_ordering() && !mask_is_contiguous(mask) {
            return Err(ExprError::InvalidMask {
                message: "ordering comparisons require a contiguous mask".to_string(),
                position,
            });
        }
        let format = if explicit_mask || lit.format != IntFormat::Decimal {
            lit.format
        } else {
            symbol.format()
        };
        Ok(Expr::Cmp(Cmp::numeric(
            symbol.clone(),
            relop,
            lit.value << lo,
            mask << lo,
            format,
        )))
    }
}

/// The `Cmp` form of a bare (or negated) predicate reference.
pub(crate) fn predicate_ref(symbol: Arc<Symbol>, truth: bool) -> Expr {
    Expr::Cmp(Cmp::numeric(symbol, RelOp::Eq, u128::from(truth), 1, IntFormat::Decimal))
}

/// Pull the next token, converting lexical errors into `ExprError::Lex`.
fn first_valid(lexer: &mut Lexer<'_>) -> Result<Token> {
    let token = lexer.next_token();
    if let TokenKind::Error(message) = token.kind {
        return Err(ExprError::Lex { message, position: token.start });
    }
    Ok(token)
}
