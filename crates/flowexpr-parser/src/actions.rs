//! Action-body parsing.
//!
//! The action assembler is an external collaborator; what the compiler owes
//! it is the parsed form of an action body — a list of field assignments —
//! together with the conjoined prerequisite expression of every written
//! field. The body grammar is a `;`-terminated statement list:
//!
//! ```text
//! body := ( target '=' constant ';' )*
//! target := symbol | symbol '[' N ( '..' M )? ']'
//! ```

use std::fmt;
use std::sync::Arc;

use flowexpr_ast::Expr;
use flowexpr_error::{ExprError, Result};
use flowexpr_symtab::{Symbol, SymbolTable};
use flowexpr_token::{IntLiteral, TokenKind, all_ones};

use crate::annotate::climb;
use crate::parse::Parser;

/// One parsed assignment, rewritten onto its base field.
#[derive(Debug, Clone, PartialEq)]
pub struct Load {
    /// Base field (or string symbol) being written
    pub symbol: Arc<Symbol>,
    /// Value, positioned within `mask`
    pub value: u128,
    /// Written bit window within the base field (contiguous)
    pub mask: u128,
    /// String value for string-valued targets
    pub string: Option<String>,
}

/// A parsed action body: the assignments plus the prerequisite expression
/// the assembler must guard them with.
#[derive(Debug, Clone, PartialEq)]
pub struct ActionBody {
    /// Assignments in source order
    pub loads: Vec<Load>,
    /// Conjoined, annotated prerequisites of all written fields
    pub prereq: Expr,
}

/// Parse a `;`-separated assignment list, resolving and width-checking
/// every target against `symtab`.
pub fn parse_assignments(text: &str, symtab: &SymbolTable) -> Result<ActionBody> {
    let mut parser = Parser::new(text, symtab)?;
    let mut loads = Vec::new();
    let mut prereqs = Vec::new();

    while !parser.at_end() {
        let (load, mut gates) = parse_statement(&mut parser, symtab)?;
        loads.push(load);
        prereqs.append(&mut gates);
    }
    Ok(ActionBody { loads, prereq: Expr::and(prereqs) })
}

fn parse_statement(
    parser: &mut Parser<'_>,
    symtab: &SymbolTable,
) -> Result<(Load, Vec<Expr>)> {
    let position = parser.position();
    let TokenKind::Id(name) = parser.kind().clone() else {
        return Err(ExprError::Syntax {
            message: "expecting a field name".to_string(),
            position,
        });
    };
    let symbol = symtab.resolve(&name, position)?;
    if symbol.is_predicate() {
        return Err(ExprError::TypeMismatch {
            message: format!("predicate `{name}` cannot be assigned"),
            position,
        });
    }
    parser.advance()?;
    let window = parser.parse_window(&symbol)?;
    parser.expect(TokenKind::Equals, "`=`")?;

    let mut nesting = Vec::new();
    let (gates, base, base_ofs) = climb(symbol.clone(), symtab, &mut nesting)?;

    let value_position = parser.position();
    let load = match parser.kind().clone() {
        TokenKind::String(value) => {
            if !symbol.is_string() {
                return Err(ExprError::TypeMismatch {
                    message: format!("field `{name}` takes numeric values"),
                    position: value_position,
                });
            }
            parser.advance()?;
            Load { symbol: base, value: 0, mask: 0, string: Some(value) }
        }
        TokenKind::Integer(lit) => {
            if symbol.is_string() {
                return Err(ExprError::TypeMismatch {
                    message: format!("string symbol `{name}` takes quoted values"),
                    position: value_position,
                });
            }
            parser.advance()?;
            numeric_load(&symbol, base, base_ofs, window, lit, value_position)?
        }
        TokenKind::MaskedInteger(_) => {
            return Err(ExprError::Syntax {
                message: "masked constants cannot be assigned".to_string(),
                position: value_position,
            });
        }
        _ => {
            return Err(ExprError::Syntax {
                message: "expecting a constant to assign".to_string(),
                position: value_position,
            });
        }
    };
    parser.expect(TokenKind::Semicolon, "`;`")?;
    Ok((load, gates))
}

fn numeric_load(
    symbol: &Arc<Symbol>,
    base: Arc<Symbol>,
    base_ofs: u8,
    window: Option<(u8, u8)>,
    lit: IntLiteral,
    position: usize,
) -> Result<Load> {
    let (lo, hi) = window.unwrap_or((0, symbol.n_bits() - 1));
    let width = hi - lo + 1;
    if lit.value & !all_ones(width) != 0 {
        return Err(ExprError::RangeOverflow {
            message: format!("value {} does not fit in {width} bits of `{}`", lit.value, symbol.name),
            position,
        });
    }
    let shift = lo + base_ofs;
    Ok(Load {
        symbol: base,
        value: lit.value << shift,
        mask: all_ones(width) << shift,
        string: None,
    })
}

impl fmt::Display for Load {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(s) = &self.string {
            return write!(f, "{} = {}", self.symbol.name, TokenKind::String(s.clone()));
        }
        let width = self.symbol.n_bits();
        if self.mask == all_ones(width) {
            return write!(f, "{} = {}", self.symbol.name, self.value);
        }
        let lo = self.mask.trailing_zeros() as u8;
        let hi = 127 - self.mask.leading_zeros() as u8;
        write!(f, "{}[{lo}..{hi}] = {}", self.symbol.name, self.value >> lo)
    }
}

#[cfg(test)]
mod tests {
    use flowexpr_symtab::FieldSpec;
    use pretty_assertions::assert_eq;

    use super::*;

    fn table() -> SymbolTable {
        let mut symtab = SymbolTable::new();
        symtab.add_field("eth.type", FieldSpec::new(0, 16), None, false).unwrap();
        symtab.add_predicate("ip4", "eth.type == 2048").unwrap();
        symtab.add_field("reg0", FieldSpec::new(1, 32), None, false).unwrap();
        symtab.add_field("ip.ttl", FieldSpec::new(2, 8), Some("ip4"), false).unwrap();
        symtab.add_subfield("reg0.flag", None, "reg0[5]").unwrap();
        symtab.add_string("outport", FieldSpec::new(3, 32), None).unwrap();
        symtab
    }

    #[test]
    fn assignments_parse_and_print() {
        let symtab = table();
        let body = parse_assignments("reg0 = 7; outport = \"lp1\";", &symtab).unwrap();
        assert_eq!(body.loads.len(), 2);
        assert_eq!(body.loads[0].to_string(), "reg0 = 7");
        assert_eq!(body.loads[1].to_string(), "outport = \"lp1\"");
        assert_eq!(body.prereq, Expr::Boolean(true));
    }

    #[test]
    fn windows_and_subfields_shift_into_base() {
        let symtab = table();
        let body = parse_assignments("reg0.flag = 1; reg0[8..15] = 3;", &symtab).unwrap();
        assert_eq!(body.loads[0].to_string(), "reg0[5..5] = 1");
        assert_eq!((body.loads[1].value, body.loads[1].mask), (3 << 8, 0xff00));
    }

    #[test]
    fn prereqs_are_conjoined_and_annotated() {
        let symtab = table();
        let body = parse_assignments("ip.ttl = 63;", &symtab).unwrap();
        assert_eq!(body.prereq.to_string(), "eth.type == 2048");
    }

    #[test]
    fn errors() {
        let symtab = table();
        assert!(matches!(
            parse_assignments("reg0 = 4294967296;", &symtab).unwrap_err(),
            ExprError::RangeOverflow { .. }
        ));
        assert!(matches!(
            parse_assignments("ip4 = 1;", &symtab).unwrap_err(),
            ExprError::TypeMismatch { .. }
        ));
        assert!(matches!(
            parse_assignments("outport = 3;", &symtab).unwrap_err(),
            ExprError::TypeMismatch { .. }
        ));
        assert!(matches!(
            parse_assignments("reg0 = 1/1;", &symtab).unwrap_err(),
            ExprError::Syntax { .. }
        ));
        assert!(matches!(
            parse_assignments("reg0 = 1", &symtab).unwrap_err(),
            ExprError::Syntax { .. }
        ));
    }
}
