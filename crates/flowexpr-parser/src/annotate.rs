//! Annotation: predicate and sub-field expansion with prerequisite
//! propagation.
//!
//! After annotation an expression mentions only concrete fields and string
//! symbols. Predicate references are replaced by their defining expression
//! (negated when the reference was negated); sub-field references are
//! rewritten onto the base field with the value and mask shifted into
//! place; and every level's prerequisite expression is conjoined in front
//! of the comparison it gates.
//!
//! Expansion carries a nesting stack of the symbols currently being
//! expanded, so recursive prerequisite definitions terminate with a
//! [`PrereqCycle`](ExprError::PrereqCycle) error naming the first repeated
//! symbol.

use flowexpr_ast::{Cmp, Expr};
use flowexpr_error::{ExprError, Result};
use flowexpr_symtab::{SymbolKind, SymbolTable};

use crate::parse::compile;

/// Expand predicates and sub-fields and conjoin prerequisites.
///
/// Consumes `expr`; on error the partially-annotated tree is discarded.
pub fn annotate(expr: Expr, symtab: &SymbolTable) -> Result<Expr> {
    let mut nesting = Vec::new();
    annotate_expr(expr, symtab, &mut nesting)
}

fn annotate_expr(expr: Expr, symtab: &SymbolTable, nesting: &mut Vec<String>) -> Result<Expr> {
    match expr {
        Expr::Boolean(b) => Ok(Expr::Boolean(b)),
        Expr::And(children) => Ok(Expr::and(
            children
                .into_iter()
                .map(|c| annotate_expr(c, symtab, nesting))
                .collect::<Result<Vec<_>>>()?,
        )),
        Expr::Or(children) => {
            // A single-symbol value set annotates atomically: its members
            // share one symbol, so the prerequisite is conjoined once
            // around the whole set instead of once per member. Splitting
            // the set here would cost the matcher its conjunction groups.
            let set = Expr::Or(children);
            let set_symbol = set.cmp_symbol().filter(|s| !s.is_predicate()).cloned();
            let Expr::Or(children) = set else { unreachable!() };
            if let Some(symbol) = set_symbol {
                let (mut prereqs, base, ofs) = climb(symbol, symtab, nesting)?;
                let members = children
                    .into_iter()
                    .map(|member| {
                        let Expr::Cmp(mut cmp) = member else { unreachable!() };
                        cmp.value <<= ofs;
                        cmp.mask <<= ofs;
                        cmp.symbol = base.clone();
                        Expr::Cmp(cmp)
                    })
                    .collect();
                prereqs.push(Expr::Or(members));
                return Ok(Expr::and(prereqs));
            }
            Ok(Expr::or(
                children
                    .into_iter()
                    .map(|c| annotate_expr(c, symtab, nesting))
                    .collect::<Result<Vec<_>>>()?,
            ))
        }
        Expr::Cmp(cmp) => annotate_cmp(cmp, symtab, nesting),
    }
}

fn annotate_cmp(mut cmp: Cmp, symtab: &SymbolTable, nesting: &mut Vec<String>) -> Result<Expr> {
    if cmp.symbol.is_predicate() {
        let name = cmp.symbol.name.clone();
        let SymbolKind::Predicate { expansion } = &cmp.symbol.kind else { unreachable!() };
        let expansion = expansion.clone();
        enter(nesting, &name)?;
        let parsed = compile(&expansion, symtab)?;
        let oriented = if cmp.value == 1 { parsed } else { parsed.negate() };
        let expanded = annotate_expr(oriented, symtab, nesting)?;
        nesting.pop();
        return Ok(expanded);
    }

    let (mut prereqs, base, ofs) = climb(cmp.symbol.clone(), symtab, nesting)?;
    cmp.value <<= ofs;
    cmp.mask <<= ofs;
    cmp.symbol = base;
    prereqs.push(Expr::Cmp(cmp));
    Ok(Expr::and(prereqs))
}

/// Walk a sub-field reference down to its base field, collecting the
/// annotated prerequisite of every level and the accumulated bit offset.
pub(crate) fn climb(
    mut symbol: std::sync::Arc<flowexpr_symtab::Symbol>,
    symtab: &SymbolTable,
    nesting: &mut Vec<String>,
) -> Result<(Vec<Expr>, std::sync::Arc<flowexpr_symtab::Symbol>, u8)> {
    let mut prereqs = Vec::new();
    let mut total_ofs = 0u8;
    loop {
        if let Some(text) = symbol.prereq.clone() {
            prereqs.push(annotate_gated(&symbol.name.clone(), &text, symtab, nesting)?);
        }
        match symbol.kind.clone() {
            SymbolKind::Subfield { base, ofs, .. } => {
                total_ofs += ofs;
                symbol = symtab.resolve(&base, 0)?;
            }
            _ => break,
        }
    }
    Ok((prereqs, symbol, total_ofs))
}

/// Parse and annotate the prerequisite text of `owner`, guarding against
/// cycles through `owner` itself.
fn annotate_gated(
    owner: &str,
    text: &str,
    symtab: &SymbolTable,
    nesting: &mut Vec<String>,
) -> Result<Expr> {
    enter(nesting, owner)?;
    let parsed = compile(text, symtab)?;
    let annotated = annotate_expr(parsed, symtab, nesting)?;
    nesting.pop();
    Ok(annotated)
}

fn enter(nesting: &mut Vec<String>, name: &str) -> Result<()> {
    if nesting.iter().any(|n| n == name) {
        return Err(ExprError::PrereqCycle { name: name.to_string() });
    }
    nesting.push(name.to_string());
    Ok(())
}

#[cfg(test)]
mod tests {
    use flowexpr_symtab::FieldSpec;
    use flowexpr_token::IntFormat;
    use pretty_assertions::assert_eq;

    use super::*;

    /// eth/ip4/tcp slice of a realistic table.
    fn table() -> SymbolTable {
        let mut symtab = SymbolTable::new();
        symtab
            .add_field("eth.type", FieldSpec::new(0, 16).with_format(IntFormat::Hex), None, false)
            .unwrap();
        symtab.add_predicate("ip4", "eth.type == 0x800").unwrap();
        symtab.add_field("ip.proto", FieldSpec::new(1, 8), Some("ip4"), false).unwrap();
        symtab.add_predicate("tcp", "ip.proto == 6").unwrap();
        symtab.add_field("tcp.dst", FieldSpec::new(2, 16), Some("tcp"), false).unwrap();
        symtab.add_field("vlan.tci", FieldSpec::new(3, 16), None, false).unwrap();
        symtab.add_subfield("vlan.present", None, "vlan.tci[12]").unwrap();
        symtab
            .add_subfield("vlan.pcp", Some("vlan.present"), "vlan.tci[13..15]")
            .unwrap();
        symtab.add_string("inport", FieldSpec::new(4, 32), None).unwrap();
        symtab
    }

    fn annotated(symtab: &SymbolTable, text: &str) -> String {
        let expr = compile(text, symtab).unwrap();
        annotate(expr, symtab).unwrap().to_string()
    }

    #[test]
    fn predicate_expansion_with_prereq_chain() {
        let symtab = table();
        assert_eq!(
            annotated(&symtab, "ip4 && tcp.dst == 80"),
            "eth.type == 0x800 && eth.type == 0x800 && ip.proto == 6 && tcp.dst == 80"
        );
    }

    #[test]
    fn negated_predicate_expands_negated() {
        let symtab = table();
        assert_eq!(annotated(&symtab, "!ip4"), "eth.type != 0x800");
    }

    #[test]
    fn subfield_rewrites_to_base() {
        let symtab = table();
        // vlan.pcp == 5 pins bits 13..15 of vlan.tci and pulls in the
        // vlan.present prerequisite on bit 12.
        assert_eq!(
            annotated(&symtab, "vlan.pcp == 5"),
            "vlan.tci != 0/4096 && vlan.tci == 40960/57344"
        );
    }

    #[test]
    fn self_recursive_prereq_is_a_cycle() {
        let mut symtab = SymbolTable::new();
        symtab
            .add_field("self_recurse", FieldSpec::new(0, 8), Some("self_recurse != 0"), false)
            .unwrap();
        let expr = compile("self_recurse == 1", &symtab).unwrap();
        let err = annotate(expr, &symtab).unwrap_err();
        assert_eq!(err, ExprError::PrereqCycle { name: "self_recurse".into() });
    }

    #[test]
    fn mutually_recursive_prereqs_are_a_cycle() {
        let mut symtab = SymbolTable::new();
        symtab.add_field("a", FieldSpec::new(0, 8), Some("b != 0"), false).unwrap();
        symtab.add_field("b", FieldSpec::new(1, 8), Some("a != 0"), false).unwrap();
        let expr = compile("a == 1", &symtab).unwrap();
        let err = annotate(expr, &symtab).unwrap_err();
        assert_eq!(err, ExprError::PrereqCycle { name: "a".into() });
    }

    #[test]
    fn annotation_leaves_concrete_fields_alone() {
        let symtab = table();
        assert_eq!(annotated(&symtab, "eth.type == 0x806"), "eth.type == 0x806");
    }
}
