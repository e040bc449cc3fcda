//! Symbol table for the flowexpr match-expression compiler.
//!
//! The table registers the names an expression may mention and is consulted
//! by the parser, annotator, simplifier, and matcher. It is read-only during
//! a compile: registration happens up front, and the pipeline only resolves.
//!
//! # Symbol kinds
//!
//! - **Fields** are fixed-width bit slots in a register set, optionally
//!   gated by a prerequisite expression and optionally flagged *must-crack*
//!   (masked equality installation is forbidden; equalities are expanded to
//!   exact values).
//! - **Predicates** name a Boolean expression over other symbols.
//! - **Sub-fields** alias a bit range of a base field, optionally gated by
//!   their own prerequisite.
//! - **String symbols** match a caller-supplied string against a
//!   `name → u32` map backed by a numeric field.
//!
//! Prerequisite and predicate texts are stored verbatim; the annotator
//! parses them lazily and detects recursive definitions with a nesting
//! stack, so a cycle surfaces as [`ExprError::PrereqCycle`] naming the
//! first repeated symbol.

use std::collections::HashMap;
use std::sync::Arc;

use flowexpr_error::{ExprError, Result};
use flowexpr_lexer::Lexer;
use flowexpr_token::{IntFormat, TokenKind};

/// A concrete packet/metadata field in the register set.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct FieldSpec {
    /// Register identifier the classifier matches on
    pub id: u32,
    /// Field width in bits (1..=128)
    pub n_bits: u8,
    /// Preferred display format for values of this field
    #[cfg_attr(feature = "serde", serde(skip))]
    pub format: IntFormat,
}

impl FieldSpec {
    /// A decimal-formatted field.
    pub fn new(id: u32, n_bits: u8) -> Self {
        FieldSpec { id, n_bits, format: IntFormat::Decimal }
    }

    /// Set the preferred display format.
    pub fn with_format(mut self, format: IntFormat) -> Self {
        self.format = format;
        self
    }
}

/// What a registered name stands for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SymbolKind {
    /// A concrete numeric field; `true` flags must-crack
    Field(FieldSpec, bool),
    /// A bit-range alias over another symbol
    Subfield {
        /// Name of the base field or sub-field
        base: String,
        /// Low bit within the base
        ofs: u8,
        /// Width of the alias
        n_bits: u8,
    },
    /// A named Boolean expression, stored as text
    Predicate {
        /// Defining expression, parsed lazily at annotation time
        expansion: String,
    },
    /// A string-valued symbol backed by a numeric field
    StringField(FieldSpec),
}

/// A named symbol with its optional prerequisite expression.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Symbol {
    /// Unique name, e.g. `tcp.dst` or `inport`
    pub name: String,
    /// Prerequisite text conjoined by the annotator, e.g. `tcp`
    pub prereq: Option<String>,
    /// Field, predicate, sub-field, or string classification
    pub kind: SymbolKind,
}

impl Symbol {
    /// Width of the symbol in bits. Predicates are one Boolean bit.
    pub fn n_bits(&self) -> u8 {
        match &self.kind {
            SymbolKind::Field(spec, _) | SymbolKind::StringField(spec) => spec.n_bits,
            SymbolKind::Subfield { n_bits, .. } => *n_bits,
            SymbolKind::Predicate { .. } => 1,
        }
    }

    /// Preferred display format for comparison values.
    pub fn format(&self) -> IntFormat {
        match &self.kind {
            SymbolKind::Field(spec, _) | SymbolKind::StringField(spec) => spec.format,
            SymbolKind::Subfield { .. } | SymbolKind::Predicate { .. } => IntFormat::Decimal,
        }
    }

    /// Whether comparisons against this symbol take string values.
    pub fn is_string(&self) -> bool {
        matches!(self.kind, SymbolKind::StringField(_))
    }

    /// Whether this name stands for a Boolean predicate.
    pub fn is_predicate(&self) -> bool {
        matches!(self.kind, SymbolKind::Predicate { .. })
    }

    /// Whether masked equalities must be cracked into exact values.
    pub fn must_crack(&self) -> bool {
        matches!(self.kind, SymbolKind::Field(_, true))
    }

    /// The backing register for fields and string symbols.
    pub fn field(&self) -> Option<&FieldSpec> {
        match &self.kind {
            SymbolKind::Field(spec, _) | SymbolKind::StringField(spec) => Some(spec),
            _ => None,
        }
    }
}

/// Registry of symbols, keyed by unique name.
#[derive(Debug, Default, Clone)]
pub struct SymbolTable {
    symbols: HashMap<String, Arc<Symbol>>,
}

impl SymbolTable {
    /// Create an empty table
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a concrete field.
    pub fn add_field(
        &mut self,
        name: &str,
        field: FieldSpec,
        prereq: Option<&str>,
        must_crack: bool,
    ) -> Result<()> {
        self.insert(Symbol {
            name: name.to_string(),
            prereq: prereq.map(str::to_string),
            kind: SymbolKind::Field(field, must_crack),
        })
    }

    /// Register a named Boolean predicate with its defining expression.
    pub fn add_predicate(&mut self, name: &str, expansion: &str) -> Result<()> {
        self.insert(Symbol {
            name: name.to_string(),
            prereq: None,
            kind: SymbolKind::Predicate { expansion: expansion.to_string() },
        })
    }

    /// Register a sub-field from a slice expression such as
    /// `vlan.tci[13..15]` or `vlan.tci[12]`.
    pub fn add_subfield(&mut self, name: &str, prereq: Option<&str>, slice: &str) -> Result<()> {
        let (base, lo, hi) = parse_slice(slice)?;
        let base_sym = self.resolve(&base, 0)?;
        match base_sym.kind {
            SymbolKind::Field(..) | SymbolKind::Subfield { .. } => {}
            _ => {
                return Err(ExprError::TypeMismatch {
                    message: format!("`{base}` is not a field and cannot be sliced"),
                    position: 0,
                });
            }
        }
        if hi < lo || hi >= base_sym.n_bits() {
            return Err(ExprError::SubfieldOutOfBounds { name: name.to_string() });
        }
        self.insert(Symbol {
            name: name.to_string(),
            prereq: prereq.map(str::to_string),
            kind: SymbolKind::Subfield { base, ofs: lo, n_bits: hi - lo + 1 },
        })
    }

    /// Register a string-valued symbol backed by a numeric field.
    pub fn add_string(&mut self, name: &str, field: FieldSpec, prereq: Option<&str>) -> Result<()> {
        self.insert(Symbol {
            name: name.to_string(),
            prereq: prereq.map(str::to_string),
            kind: SymbolKind::StringField(field),
        })
    }

    /// Look up a symbol by name.
    pub fn get(&self, name: &str) -> Option<&Arc<Symbol>> {
        self.symbols.get(name)
    }

    /// Look up a symbol, reporting `UnknownSymbol` at `position` on a miss.
    pub fn resolve(&self, name: &str, position: usize) -> Result<Arc<Symbol>> {
        self.symbols.get(name).cloned().ok_or_else(|| ExprError::UnknownSymbol {
            name: name.to_string(),
            position,
        })
    }

    /// Iterate over all registered symbols.
    pub fn iter(&self) -> impl Iterator<Item = &Arc<Symbol>> {
        self.symbols.values()
    }

    fn insert(&mut self, symbol: Symbol) -> Result<()> {
        if self.symbols.contains_key(&symbol.name) {
            return Err(ExprError::DuplicateSymbol { name: symbol.name });
        }
        self.symbols.insert(symbol.name.clone(), Arc::new(symbol));
        Ok(())
    }
}

/// Parse `base[LO..HI]` or `base[BIT]` with the expression lexer.
fn parse_slice(slice: &str) -> Result<(String, u8, u8)> {
    let syntax = |message: String, position: usize| ExprError::Syntax { message, position };
    let mut lexer = Lexer::new(slice);

    let token = lexer.next_token();
    let TokenKind::Id(base) = token.kind else {
        return Err(syntax(format!("`{slice}` is not a field slice"), token.start));
    };
    let token = lexer.next_token();
    if token.kind != TokenKind::LSquare {
        return Err(syntax("expecting `[`".to_string(), token.start));
    }
    let token = lexer.next_token();
    let TokenKind::Integer(lo) = token.kind else {
        return Err(syntax("expecting bit offset".to_string(), token.start));
    };
    let lo = bit_index(lo.value, token.start)?;

    let token = lexer.next_token();
    let hi = match token.kind {
        TokenKind::DotDot => {
            let token = lexer.next_token();
            let TokenKind::Integer(hi) = token.kind else {
                return Err(syntax("expecting bit offset".to_string(), token.start));
            };
            let hi = bit_index(hi.value, token.start)?;
            let token = lexer.next_token();
            if token.kind != TokenKind::RSquare {
                return Err(syntax("expecting `]`".to_string(), token.start));
            }
            hi
        }
        TokenKind::RSquare => lo,
        _ => return Err(syntax("expecting `..` or `]`".to_string(), token.start)),
    };
    let token = lexer.next_token();
    if token.kind != TokenKind::End {
        return Err(syntax("trailing garbage after slice".to_string(), token.start));
    }
    Ok((base, lo, hi))
}

fn bit_index(value: u128, position: usize) -> Result<u8> {
    if value >= 128 {
        return Err(ExprError::RangeOverflow {
            message: format!("bit offset {value} exceeds 127"),
            position,
        });
    }
    Ok(value as u8)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn table() -> SymbolTable {
        let mut symtab = SymbolTable::new();
        symtab.add_field("vlan.tci", FieldSpec::new(4, 16), None, false).unwrap();
        symtab
    }

    #[test]
    fn add_and_resolve_field() {
        let symtab = table();
        let sym = symtab.resolve("vlan.tci", 0).unwrap();
        assert_eq!(sym.n_bits(), 16);
        assert!(!sym.is_string());
    }

    #[test]
    fn duplicate_names_are_rejected() {
        let mut symtab = table();
        let err = symtab.add_field("vlan.tci", FieldSpec::new(9, 8), None, false).unwrap_err();
        assert_eq!(err, ExprError::DuplicateSymbol { name: "vlan.tci".into() });
    }

    #[test]
    fn unknown_symbol_reports_position() {
        let symtab = table();
        let err = symtab.resolve("nonesuch", 12).unwrap_err();
        assert_eq!(err.position(), Some(12));
    }

    #[test]
    fn subfield_ranges() {
        let mut symtab = table();
        symtab.add_subfield("vlan.present", None, "vlan.tci[12]").unwrap();
        symtab.add_subfield("vlan.pcp", Some("vlan.present"), "vlan.tci[13..15]").unwrap();

        let pcp = symtab.resolve("vlan.pcp", 0).unwrap();
        assert_eq!(pcp.n_bits(), 3);
        assert_eq!(
            pcp.kind,
            SymbolKind::Subfield { base: "vlan.tci".into(), ofs: 13, n_bits: 3 }
        );
    }

    #[test]
    fn subfield_bounds_are_checked() {
        let mut symtab = table();
        let err = symtab.add_subfield("bad", None, "vlan.tci[8..16]").unwrap_err();
        assert_eq!(err, ExprError::SubfieldOutOfBounds { name: "bad".into() });

        let err = symtab.add_subfield("worse", None, "vlan.tci[5..2]").unwrap_err();
        assert_eq!(err, ExprError::SubfieldOutOfBounds { name: "worse".into() });
    }

    #[test]
    fn subfield_of_string_is_rejected() {
        let mut symtab = table();
        symtab.add_string("inport", FieldSpec::new(7, 32), None).unwrap();
        let err = symtab.add_subfield("x", None, "inport[0]").unwrap_err();
        assert!(matches!(err, ExprError::TypeMismatch { .. }));
    }

    #[test]
    fn predicates_are_boolean() {
        let mut symtab = table();
        symtab.add_predicate("vlan", "vlan.tci != 0").unwrap();
        let sym = symtab.resolve("vlan", 0).unwrap();
        assert!(sym.is_predicate());
        assert_eq!(sym.n_bits(), 1);
    }
}
