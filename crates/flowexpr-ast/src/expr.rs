//! Expression tree: comparisons, conjunction, disjunction, and the
//! invariants the simplifier and normalizer maintain.

use std::sync::Arc;

use flowexpr_symtab::Symbol;
use flowexpr_token::{IntFormat, all_ones};

use crate::Assignment;

/// Relational operator of a comparison leaf.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RelOp {
    /// `==`
    Eq,
    /// `!=`
    Ne,
    /// `<`
    Lt,
    /// `<=`
    Le,
    /// `>`
    Gt,
    /// `>=`
    Ge,
}

impl RelOp {
    /// The operator satisfied exactly when `self` is not.
    pub fn negated(self) -> RelOp {
        match self {
            RelOp::Eq => RelOp::Ne,
            RelOp::Ne => RelOp::Eq,
            RelOp::Lt => RelOp::Ge,
            RelOp::Le => RelOp::Gt,
            RelOp::Gt => RelOp::Le,
            RelOp::Ge => RelOp::Lt,
        }
    }

    /// Whether this is an ordering operator (`<`, `<=`, `>`, `>=`).
    pub fn is_ordering(self) -> bool {
        matches!(self, RelOp::Lt | RelOp::Le | RelOp::Gt | RelOp::Ge)
    }

    /// Apply the operator to already-masked operands.
    pub fn evaluate(self, lhs: u128, rhs: u128) -> bool {
        match self {
            RelOp::Eq => lhs == rhs,
            RelOp::Ne => lhs != rhs,
            RelOp::Lt => lhs < rhs,
            RelOp::Le => lhs <= rhs,
            RelOp::Gt => lhs > rhs,
            RelOp::Ge => lhs >= rhs,
        }
    }

    /// Source spelling.
    pub fn symbol(self) -> &'static str {
        match self {
            RelOp::Eq => "==",
            RelOp::Ne => "!=",
            RelOp::Lt => "<",
            RelOp::Le => "<=",
            RelOp::Gt => ">",
            RelOp::Ge => ">=",
        }
    }
}

/// A comparison leaf: a symbol tested against a constant under a mask.
///
/// For numeric symbols `string` is `None` and `value & !mask == 0`; for
/// string symbols `value` and `mask` are unused. Equality ignores the
/// display `format`, mirroring token equivalence.
#[derive(Debug, Clone)]
pub struct Cmp {
    /// The tested symbol, with its width and flags
    pub symbol: Arc<Symbol>,
    /// Relational operator
    pub relop: RelOp,
    /// Comparison constant, positioned within the mask window
    pub value: u128,
    /// 1-bits select the compared bits of the field
    pub mask: u128,
    /// String constant for string-valued symbols
    pub string: Option<String>,
    /// Preferred display format of `value` and `mask`
    pub format: IntFormat,
}

impl Cmp {
    /// A numeric comparison.
    pub fn numeric(
        symbol: Arc<Symbol>,
        relop: RelOp,
        value: u128,
        mask: u128,
        format: IntFormat,
    ) -> Self {
        debug_assert_eq!(value & !mask, 0, "comparison value has unmasked bits");
        Cmp { symbol, relop, value, mask, string: None, format }
    }

    /// A string comparison (`==` or `!=` only).
    pub fn string(symbol: Arc<Symbol>, relop: RelOp, value: &str) -> Self {
        debug_assert!(matches!(relop, RelOp::Eq | RelOp::Ne));
        Cmp {
            symbol,
            relop,
            value: 0,
            mask: 0,
            string: Some(value.to_string()),
            format: IntFormat::Decimal,
        }
    }

    /// Whether the comparison covers the symbol's whole width.
    pub fn is_full_width(&self) -> bool {
        self.mask == all_ones(self.symbol.n_bits())
    }
}

impl PartialEq for Cmp {
    fn eq(&self, other: &Self) -> bool {
        self.symbol == other.symbol
            && self.relop == other.relop
            && self.value == other.value
            && self.mask == other.mask
            && self.string == other.string
    }
}

impl Eq for Cmp {}

/// An expression tree.
///
/// `And`/`Or` children are ordered and, once simplified, number at least
/// two with no child repeating the parent operator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Expr {
    /// Comparison leaf
    Cmp(Cmp),
    /// Conjunction of all children
    And(Vec<Expr>),
    /// Disjunction of any child
    Or(Vec<Expr>),
    /// Literal truth value
    Boolean(bool),
}

impl Expr {
    /// Conjunction, flattening nested `And`s and collapsing trivial cases.
    /// An empty conjunction is `true`.
    pub fn and(children: Vec<Expr>) -> Expr {
        Self::combine(children, true)
    }

    /// Disjunction, flattening nested `Or`s and collapsing trivial cases.
    /// An empty disjunction is `false`.
    pub fn or(children: Vec<Expr>) -> Expr {
        Self::combine(children, false)
    }

    fn combine(children: Vec<Expr>, is_and: bool) -> Expr {
        let mut flat = Vec::with_capacity(children.len());
        for child in children {
            match (is_and, child) {
                (true, Expr::And(sub)) | (false, Expr::Or(sub)) => flat.extend(sub),
                (_, child) => flat.push(child),
            }
        }
        match flat.len() {
            0 => Expr::Boolean(is_and),
            1 => flat.into_iter().next().unwrap_or(Expr::Boolean(is_and)),
            _ => {
                if is_and {
                    Expr::And(flat)
                } else {
                    Expr::Or(flat)
                }
            }
        }
    }

    /// Logical negation, pushed down to the leaves (De Morgan). There is no
    /// `Not` node: a negated predicate reference flips its truth value, a
    /// negated comparison flips its operator.
    pub fn negate(self) -> Expr {
        match self {
            Expr::Cmp(mut cmp) => {
                if cmp.string.is_none() && cmp.symbol.is_predicate() {
                    cmp.value ^= 1;
                } else {
                    cmp.relop = cmp.relop.negated();
                }
                Expr::Cmp(cmp)
            }
            Expr::And(children) => {
                Expr::or(children.into_iter().map(Expr::negate).collect())
            }
            Expr::Or(children) => {
                Expr::and(children.into_iter().map(Expr::negate).collect())
            }
            Expr::Boolean(b) => Expr::Boolean(!b),
        }
    }

    /// Structural invariants every simplified tree honors: `And`/`Or` carry
    /// at least two children and no child repeats the parent operator.
    pub fn honors_invariants(&self) -> bool {
        match self {
            Expr::Cmp(_) | Expr::Boolean(_) => true,
            Expr::And(children) => {
                children.len() >= 2
                    && children
                        .iter()
                        .all(|c| !matches!(c, Expr::And(_)) && c.honors_invariants())
            }
            Expr::Or(children) => {
                children.len() >= 2
                    && children
                        .iter()
                        .all(|c| !matches!(c, Expr::Or(_)) && c.honors_invariants())
            }
        }
    }

    /// The single symbol this expression tests, when it is a *generalized
    /// comparison*: a lone `Cmp`, or an `Or` of `Cmp`s on one symbol (a
    /// value set, which the matcher lowers as one conjunction clause).
    pub fn cmp_symbol(&self) -> Option<&Arc<Symbol>> {
        match self {
            Expr::Cmp(cmp) => Some(&cmp.symbol),
            Expr::Or(children) => {
                let mut symbol = None;
                for child in children {
                    let Expr::Cmp(cmp) = child else { return None };
                    match symbol {
                        None => symbol = Some(&cmp.symbol),
                        Some(prev) if *prev == cmp.symbol => {}
                        Some(_) => return None,
                    }
                }
                symbol
            }
            _ => None,
        }
    }

    /// Whether the tree is in the matcher-ready normal form: a disjunction
    /// of conjunctions whose members are generalized comparisons.
    pub fn is_normalized(&self) -> bool {
        fn normalized_and(children: &[Expr]) -> bool {
            children
                .iter()
                .all(|c| matches!(c, Expr::Boolean(false)) || c.cmp_symbol().is_some())
        }

        if !self.honors_invariants() {
            return false;
        }
        match self {
            Expr::Cmp(_) | Expr::Boolean(_) => true,
            Expr::And(children) => normalized_and(children),
            Expr::Or(children) => children.iter().all(|c| match c {
                Expr::Cmp(_) | Expr::Boolean(_) => true,
                Expr::And(sub) => normalized_and(sub),
                Expr::Or(_) => false,
            }),
        }
    }

    /// Truth value under the assignment `σ`. Predicates must have been
    /// expanded by annotation before evaluation is meaningful.
    pub fn evaluate(&self, assignment: &Assignment) -> bool {
        match self {
            Expr::Cmp(cmp) => match &cmp.string {
                Some(expected) => {
                    let actual = assignment.str(&cmp.symbol.name);
                    match cmp.relop {
                        RelOp::Eq => actual == Some(expected.as_str()),
                        _ => actual != Some(expected.as_str()),
                    }
                }
                None => {
                    let lhs = assignment.num(&cmp.symbol.name) & cmp.mask;
                    cmp.relop.evaluate(lhs, cmp.value)
                }
            },
            Expr::And(children) => children.iter().all(|c| c.evaluate(assignment)),
            Expr::Or(children) => children.iter().any(|c| c.evaluate(assignment)),
            Expr::Boolean(b) => *b,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use flowexpr_symtab::{FieldSpec, SymbolTable};

    fn symbol(symtab: &SymbolTable, name: &str) -> Arc<Symbol> {
        symtab.get(name).cloned().unwrap()
    }

    fn table() -> SymbolTable {
        let mut symtab = SymbolTable::new();
        symtab.add_field("a", FieldSpec::new(0, 3), None, false).unwrap();
        symtab.add_field("b", FieldSpec::new(1, 3), None, false).unwrap();
        symtab
    }

    fn eq(symtab: &SymbolTable, name: &str, value: u128) -> Expr {
        Expr::Cmp(Cmp::numeric(symbol(symtab, name), RelOp::Eq, value, 0x7, IntFormat::Decimal))
    }

    #[test]
    fn and_flattens() {
        let symtab = table();
        let inner = Expr::and(vec![eq(&symtab, "a", 1), eq(&symtab, "b", 2)]);
        let outer = Expr::and(vec![inner, eq(&symtab, "a", 3)]);
        let Expr::And(children) = &outer else { panic!("expected And") };
        assert_eq!(children.len(), 3);
        assert!(outer.honors_invariants());
    }

    #[test]
    fn singleton_collapses() {
        let symtab = table();
        assert_eq!(Expr::or(vec![eq(&symtab, "a", 1)]), eq(&symtab, "a", 1));
        assert_eq!(Expr::and(vec![]), Expr::Boolean(true));
        assert_eq!(Expr::or(vec![]), Expr::Boolean(false));
    }

    #[test]
    fn negate_applies_de_morgan() {
        let symtab = table();
        let expr = Expr::and(vec![eq(&symtab, "a", 1), eq(&symtab, "b", 2)]);
        let negated = expr.negate();
        let Expr::Or(children) = &negated else { panic!("expected Or") };
        assert!(
            children
                .iter()
                .all(|c| matches!(c, Expr::Cmp(cmp) if cmp.relop == RelOp::Ne))
        );
    }

    #[test]
    fn double_negation_is_identity() {
        let symtab = table();
        let expr = Expr::or(vec![eq(&symtab, "a", 1), eq(&symtab, "b", 2)]);
        assert_eq!(expr.clone().negate().negate(), expr);
    }

    #[test]
    fn cmp_symbol_spots_value_sets() {
        let symtab = table();
        let set = Expr::Or(vec![eq(&symtab, "a", 1), eq(&symtab, "a", 2)]);
        assert_eq!(set.cmp_symbol().map(|s| s.name.as_str()), Some("a"));

        let mixed = Expr::Or(vec![eq(&symtab, "a", 1), eq(&symtab, "b", 2)]);
        assert_eq!(mixed.cmp_symbol(), None);
    }

    #[test]
    fn normalized_accepts_sets_under_and() {
        let symtab = table();
        let set = Expr::Or(vec![eq(&symtab, "a", 1), eq(&symtab, "a", 2)]);
        let conj = Expr::And(vec![set, eq(&symtab, "b", 3)]);
        assert!(conj.is_normalized());
    }

    #[test]
    fn normalized_rejects_mixed_or_under_and() {
        let symtab = table();
        let mixed = Expr::Or(vec![eq(&symtab, "a", 1), eq(&symtab, "b", 2)]);
        let conj = Expr::And(vec![mixed, eq(&symtab, "b", 3)]);
        assert!(!conj.is_normalized());
        assert!(conj.honors_invariants());
    }

    #[test]
    fn evaluate_masks_the_field() {
        let symtab = table();
        let expr = eq(&symtab, "a", 5);
        let mut sigma = Assignment::new();
        sigma.set_num("a", 5);
        assert!(expr.evaluate(&sigma));
        sigma.set_num("a", 13); // bit 3 is outside the 3-bit mask
        assert!(expr.evaluate(&sigma));
        sigma.set_num("a", 4);
        assert!(!expr.evaluate(&sigma));
    }
}
