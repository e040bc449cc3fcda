//! Lowering of normalized expressions into classifier match tuples.
//!
//! [`to_matches`] turns a normalized expression (see
//! `flowexpr_passes::normalize`) into the multiset of concrete matches a
//! flow classifier installs. Each top-level disjunct becomes either one
//! plain match, several plain matches (a single value set distributes), or
//! a **conjunction group**: when a disjunct carries two or more value-set
//! clauses the classifier cannot natively AND, every alternative of every
//! clause is emitted as one match tagged `(conjunction_id, clause,
//! n_clauses)`, and the classifier accepts the rule only when one
//! alternative of each clause matches.
//!
//! `!=` leaves expand against their mask here: one single-bit alternative
//! per mask bit (the complement of the compared bit), or — on a must-crack
//! field — one exact-value alternative per non-matching value. String
//! equalities resolve through the caller-supplied `name → u32` map; an
//! unmapped name collapses its disjunct to `false` (vacuously true under
//! `!=`).
//!
//! Identical matches deduplicate by canonical tuple; a duplicate inside a
//! conjunction merges its memberships instead.

#![warn(clippy::all)]
#![allow(
    clippy::too_many_lines,
    clippy::module_name_repetitions,
    clippy::must_use_candidate,
    clippy::cast_possible_truncation,
    clippy::match_same_arms,
    clippy::uninlined_format_args
)]

use std::collections::{BTreeMap, HashMap};
use std::fmt;

use flowexpr_ast::{Cmp, Expr, RelOp};
use flowexpr_token::all_ones;

/// Membership of a match in a conjunction group.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Conjunction {
    /// Group identifier, unique within one `to_matches` call (1-based)
    pub id: u32,
    /// Clause index within the group (0-based)
    pub clause: u32,
    /// Number of clauses in the group (at least 2)
    pub n_clauses: u32,
}

/// One matched field: a masked value over a register.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct FieldMatch {
    /// Field name, carried for display only
    pub name: String,
    /// Field width in bits
    pub n_bits: u8,
    /// Matched value under `mask`
    pub value: u128,
    /// 1-bits participate in the match
    pub mask: u128,
}

/// A concrete match tuple, plus its conjunction memberships.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Match {
    /// Per-register constraints, keyed by field id
    pub fields: BTreeMap<u32, FieldMatch>,
    /// Conjunction groups this match belongs to; empty for a plain match
    pub conjunctions: Vec<Conjunction>,
}

impl Match {
    /// The match-everything tuple.
    pub fn new() -> Self {
        Self::default()
    }

    /// Constrain `field` to `value/mask`, merging with any existing
    /// constraint. Returns `false` when the constraints contradict.
    pub fn try_set(&mut self, field: u32, name: &str, n_bits: u8, value: u128, mask: u128) -> bool {
        match self.fields.entry(field) {
            std::collections::btree_map::Entry::Vacant(entry) => {
                entry.insert(FieldMatch { name: name.to_string(), n_bits, value, mask });
                true
            }
            std::collections::btree_map::Entry::Occupied(mut entry) => {
                let existing = entry.get_mut();
                let overlap = existing.mask & mask;
                if existing.value & overlap != value & overlap {
                    return false;
                }
                existing.value |= value;
                existing.mask |= mask;
                true
            }
        }
    }

    /// This match plus one more field constraint, unless they contradict.
    fn merged_with(&self, alt: &Alternative) -> Option<Match> {
        let mut merged = self.clone();
        if merged.try_set(alt.field, &alt.name, alt.n_bits, alt.value, alt.mask) {
            Some(merged)
        } else {
            None
        }
    }

    /// Whether a packet (field id → value) satisfies every constraint.
    pub fn matches_packet(&self, packet: &HashMap<u32, u128>) -> bool {
        self.fields.iter().all(|(id, fm)| {
            let observed = packet.get(id).copied().unwrap_or(0);
            observed & fm.mask == fm.value
        })
    }

    fn tuple_key(&self) -> Vec<(u32, u128, u128)> {
        self.fields.iter().map(|(id, fm)| (*id, fm.value, fm.mask)).collect()
    }
}

impl fmt::Display for Match {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.fields.is_empty() {
            write!(f, "(any)")?;
        }
        for (i, fm) in self.fields.values().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            if fm.mask == all_ones(fm.n_bits) {
                write!(f, "{}={}", fm.name, fm.value)?;
            } else {
                write!(f, "{}={:#x}/{:#x}", fm.name, fm.value, fm.mask)?;
            }
        }
        for conj in &self.conjunctions {
            write!(f, ": conjunction({}, {}/{})", conj.id, conj.clause, conj.n_clauses)?;
        }
        Ok(())
    }
}

/// The result of lowering one expression.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MatchList {
    /// Matches in the stable order produced by the normalizer
    pub matches: Vec<Match>,
    /// Number of conjunction groups allocated
    pub n_conjunctions: u32,
}

impl fmt::Display for MatchList {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.matches.is_empty() {
            return write!(f, "(no flows)");
        }
        for (i, m) in self.matches.iter().enumerate() {
            if i > 0 {
                writeln!(f)?;
            }
            write!(f, "{m}")?;
        }
        Ok(())
    }
}

/// One single-field alternative produced by lowering a leaf.
#[derive(Debug, Clone)]
struct Alternative {
    field: u32,
    name: String,
    n_bits: u8,
    value: u128,
    mask: u128,
}

enum Lowered {
    /// The leaf can never match
    False,
    /// The leaf always matches
    True,
    /// One or more single-field alternatives (their union)
    Alts(Vec<Alternative>),
}

/// Lower a normalized expression to classifier matches.
///
/// `string_map` resolves string-symbol values to numeric ids.
pub fn to_matches(expr: Expr, string_map: &HashMap<String, u32>) -> MatchList {
    let disjuncts = match expr {
        Expr::Or(children) => children,
        Expr::Boolean(false) => Vec::new(),
        other => vec![other],
    };

    let mut out = MatchList::default();
    let mut plain_index: HashMap<Vec<(u32, u128, u128)>, usize> = HashMap::new();
    let mut conj_index: HashMap<Vec<(u32, u128, u128)>, usize> = HashMap::new();

    for disjunct in disjuncts {
        lower_disjunct(disjunct, string_map, &mut out, &mut plain_index, &mut conj_index);
    }
    out
}

fn lower_disjunct(
    disjunct: Expr,
    string_map: &HashMap<String, u32>,
    out: &mut MatchList,
    plain_index: &mut HashMap<Vec<(u32, u128, u128)>, usize>,
    conj_index: &mut HashMap<Vec<(u32, u128, u128)>, usize>,
) {
    let clauses = match disjunct {
        Expr::And(children) => children,
        Expr::Boolean(false) => return,
        other => vec![other],
    };

    let mut base = Match::new();
    let mut clause_alts: Vec<Vec<Alternative>> = Vec::new();

    for clause in clauses {
        let lowered = match clause {
            Expr::Boolean(true) => continue,
            Expr::Boolean(false) => return,
            Expr::Cmp(cmp) => lower_cmp(&cmp, string_map),
            Expr::Or(members) => lower_set(&members, string_map),
            Expr::And(_) => {
                debug_assert!(false, "nested And in normalized expression");
                return;
            }
        };
        match lowered {
            Lowered::False => return,
            Lowered::True => {}
            Lowered::Alts(mut alts) => {
                if alts.len() == 1 {
                    let alt = alts.remove(0);
                    if !base.try_set(alt.field, &alt.name, alt.n_bits, alt.value, alt.mask) {
                        return;
                    }
                } else {
                    clause_alts.push(alts);
                }
            }
        }
    }

    match clause_alts.len() {
        0 => emit(base, out, plain_index, conj_index),
        1 => {
            for alt in &clause_alts[0] {
                if let Some(m) = base.merged_with(alt) {
                    emit(m, out, plain_index, conj_index);
                }
            }
        }
        n_clauses => {
            // Pre-merge every alternative with the shared base; an empty
            // clause makes the whole conjunction unsatisfiable, so no id is
            // allocated for it.
            let mut merged: Vec<Vec<Match>> = Vec::with_capacity(n_clauses);
            for alts in &clause_alts {
                let survivors: Vec<Match> =
                    alts.iter().filter_map(|alt| base.merged_with(alt)).collect();
                if survivors.is_empty() {
                    return;
                }
                merged.push(survivors);
            }
            out.n_conjunctions += 1;
            let id = out.n_conjunctions;
            for (clause, survivors) in merged.into_iter().enumerate() {
                for mut m in survivors {
                    m.conjunctions.push(Conjunction {
                        id,
                        clause: clause as u32,
                        n_clauses: n_clauses as u32,
                    });
                    emit(m, out, plain_index, conj_index);
                }
            }
        }
    }
}

/// Union of the alternatives of a value set's members. A vacuously-true
/// member (unmapped string under `!=`) makes the whole clause true.
fn lower_set(members: &[Expr], string_map: &HashMap<String, u32>) -> Lowered {
    let mut alts = Vec::new();
    for member in members {
        let Expr::Cmp(cmp) = member else {
            debug_assert!(false, "non-comparison in value set");
            return Lowered::False;
        };
        match lower_cmp(cmp, string_map) {
            Lowered::False => {}
            Lowered::True => return Lowered::True,
            Lowered::Alts(mut a) => alts.append(&mut a),
        }
    }
    if alts.is_empty() { Lowered::False } else { Lowered::Alts(alts) }
}

fn lower_cmp(cmp: &Cmp, string_map: &HashMap<String, u32>) -> Lowered {
    let Some(field) = cmp.symbol.field() else {
        debug_assert!(false, "unannotated symbol `{}` reached lowering", cmp.symbol.name);
        return Lowered::False;
    };
    let width = field.n_bits;
    let name = cmp.symbol.name.as_str();

    if let Some(s) = &cmp.string {
        let Some(&id) = string_map.get(s) else {
            // An unresolved name equals nothing.
            return match cmp.relop {
                RelOp::Eq => Lowered::False,
                _ => Lowered::True,
            };
        };
        let value = u128::from(id);
        return match cmp.relop {
            RelOp::Eq => Lowered::Alts(vec![Alternative {
                field: field.id,
                name: name.to_string(),
                n_bits: width,
                value,
                mask: all_ones(width),
            }]),
            _ => Lowered::Alts(ne_alternatives(field.id, name, width, value, all_ones(width), false)),
        };
    }

    match cmp.relop {
        RelOp::Eq => Lowered::Alts(vec![Alternative {
            field: field.id,
            name: name.to_string(),
            n_bits: width,
            value: cmp.value,
            mask: cmp.mask,
        }]),
        RelOp::Ne => Lowered::Alts(ne_alternatives(
            field.id,
            name,
            width,
            cmp.value,
            cmp.mask,
            cmp.symbol.must_crack(),
        )),
        _ => {
            debug_assert!(false, "ordering comparison reached lowering");
            Lowered::False
        }
    }
}

/// The alternatives of `x & mask != value`: one single-bit complement per
/// mask bit, or exact non-matching values on a must-crack field.
fn ne_alternatives(
    field: u32,
    name: &str,
    n_bits: u8,
    value: u128,
    mask: u128,
    must_crack: bool,
) -> Vec<Alternative> {
    let mut alts = Vec::new();
    if must_crack {
        // Must-crack fields are narrow by contract; exact-value expansion
        // over a wide field would be astronomical.
        debug_assert!(n_bits <= 16, "must-crack field of {n_bits} bits");
        for candidate in 0..1u128 << n_bits {
            if candidate & mask != value {
                alts.push(Alternative {
                    field,
                    name: name.to_string(),
                    n_bits,
                    value: candidate,
                    mask: all_ones(n_bits),
                });
            }
        }
        return alts;
    }
    for bit_index in 0..128 {
        let bit = 1u128 << bit_index;
        if mask & bit != 0 {
            alts.push(Alternative {
                field,
                name: name.to_string(),
                n_bits,
                value: (value & bit) ^ bit,
                mask: bit,
            });
        }
    }
    alts
}

/// Append a match, deduplicating by canonical tuple. A duplicate tuple in
/// a conjunction merges its membership into the existing match.
fn emit(
    m: Match,
    out: &mut MatchList,
    plain_index: &mut HashMap<Vec<(u32, u128, u128)>, usize>,
    conj_index: &mut HashMap<Vec<(u32, u128, u128)>, usize>,
) {
    let key = m.tuple_key();
    if m.conjunctions.is_empty() {
        if plain_index.contains_key(&key) {
            return;
        }
        plain_index.insert(key, out.matches.len());
        out.matches.push(m);
    } else if let Some(&index) = conj_index.get(&key) {
        for conj in m.conjunctions {
            if !out.matches[index].conjunctions.contains(&conj) {
                out.matches[index].conjunctions.push(conj);
            }
        }
    } else {
        conj_index.insert(key, out.matches.len());
        out.matches.push(m);
    }
}

#[cfg(test)]
mod tests {
    use flowexpr_ast::SymbolTable;
    use flowexpr_parser::{annotate, compile};
    use flowexpr_passes::{normalize, simplify};
    use flowexpr_symtab::FieldSpec;
    use flowexpr_token::IntFormat;
    use pretty_assertions::assert_eq;

    use super::*;

    fn table() -> SymbolTable {
        let mut symtab = SymbolTable::new();
        symtab
            .add_field("eth.type", FieldSpec::new(0, 16).with_format(IntFormat::Hex), None, false)
            .unwrap();
        symtab.add_predicate("ip4", "eth.type == 0x800").unwrap();
        symtab.add_field("ip.proto", FieldSpec::new(1, 8), Some("ip4"), false).unwrap();
        symtab.add_predicate("tcp", "ip.proto == 6").unwrap();
        symtab.add_field("tcp.dst", FieldSpec::new(2, 16), Some("tcp"), false).unwrap();
        symtab
            .add_field("ip4.src", FieldSpec::new(3, 32).with_format(IntFormat::Ipv4), Some("ip4"), false)
            .unwrap();
        symtab.add_field("n0", FieldSpec::new(10, 3), None, false).unwrap();
        symtab.add_string("inport", FieldSpec::new(20, 16), None).unwrap();
        symtab.add_string("outport", FieldSpec::new(21, 16), None).unwrap();
        symtab
    }

    fn flows(symtab: &SymbolTable, text: &str, map: &HashMap<String, u32>) -> MatchList {
        let expr = annotate(compile(text, symtab).unwrap(), symtab).unwrap();
        to_matches(normalize(simplify(expr)), map)
    }

    fn no_strings() -> HashMap<String, u32> {
        HashMap::new()
    }

    #[test]
    fn single_conjunction_is_one_match() {
        let symtab = table();
        let list = flows(&symtab, "ip4 && tcp.dst == 80", &no_strings());
        assert_eq!(list.matches.len(), 1);
        assert_eq!(list.n_conjunctions, 0);
        assert_eq!(
            list.matches[0].to_string(),
            "eth.type=2048, ip.proto=6, tcp.dst=80"
        );
    }

    #[test]
    fn top_level_set_distributes_to_plain_matches() {
        let symtab = table();
        let list = flows(&symtab, "tcp.dst == {80, 443}", &no_strings());
        // Two port matches sharing the eth/ip prerequisites; no conjunction.
        assert_eq!(list.matches.len(), 2);
        assert_eq!(list.n_conjunctions, 0);
    }

    #[test]
    fn cidr_lowers_to_one_masked_match() {
        let symtab = table();
        let list = flows(&symtab, "ip4.src == 10.0.0.0/8", &no_strings());
        assert_eq!(list.matches.len(), 1);
        let fm = &list.matches[0].fields[&3];
        assert_eq!((fm.value, fm.mask), (0x0a00_0000, 0xff00_0000));
    }

    #[test]
    fn two_sets_form_a_conjunction_group() {
        let symtab = table();
        let list = flows(
            &symtab,
            "tcp.dst == {80, 443} && ip4.src == {10.0.0.1, 10.0.0.2}",
            &no_strings(),
        );
        assert_eq!(list.n_conjunctions, 1);
        // Two alternatives per clause, each tagged with the group.
        let tagged: Vec<_> = list
            .matches
            .iter()
            .filter(|m| !m.conjunctions.is_empty())
            .collect();
        assert_eq!(tagged.len(), 4);
        assert!(tagged.iter().all(|m| m.conjunctions[0].n_clauses == 2));
        let clauses: Vec<u32> = tagged.iter().map(|m| m.conjunctions[0].clause).collect();
        assert_eq!(clauses.iter().filter(|&&c| c == 0).count(), 2);
        assert_eq!(clauses.iter().filter(|&&c| c == 1).count(), 2);
    }

    #[test]
    fn disequality_cracks_per_bit() {
        let symtab = table();
        let list = flows(&symtab, "n0 != 5", &no_strings());
        // 3-bit field: one single-bit alternative per bit.
        assert_eq!(list.matches.len(), 3);
        assert_eq!(list.n_conjunctions, 0);
        for m in &list.matches {
            let fm = &m.fields[&10];
            assert_eq!(fm.mask.count_ones(), 1);
            assert_eq!(fm.value, fm.mask & !5);
        }
    }

    #[test]
    fn strings_resolve_through_the_map() {
        let symtab = table();
        let mut map = HashMap::new();
        map.insert("lp1".to_string(), 7u32);

        let list = flows(&symtab, "inport == \"lp1\"", &map);
        assert_eq!(list.matches.len(), 1);
        let fm = &list.matches[0].fields[&20];
        assert_eq!((fm.value, fm.mask), (7, 0xffff));

        // Unmapped name: the equality can never hold.
        let list = flows(&symtab, "inport == \"ghost\"", &map);
        assert_eq!(list.matches.len(), 0);

        // ... and a disequality against it always holds.
        let list = flows(&symtab, "inport != \"ghost\"", &map);
        assert_eq!(list.matches.len(), 1);
        assert!(list.matches[0].fields.is_empty());
    }

    #[test]
    fn string_sets_join_conjunctions() {
        let symtab = table();
        let mut map = HashMap::new();
        map.insert("a".to_string(), 1u32);
        map.insert("b".to_string(), 2u32);
        map.insert("c".to_string(), 3u32);

        let list = flows(
            &symtab,
            "inport == {\"a\", \"b\"} && outport == {\"b\", \"c\"}",
            &map,
        );
        assert_eq!(list.n_conjunctions, 1);
        assert_eq!(list.matches.len(), 4);
    }

    #[test]
    fn boolean_extremes() {
        let symtab = table();
        let list = flows(&symtab, "1", &no_strings());
        assert_eq!(list.matches.len(), 1);
        assert!(list.matches[0].fields.is_empty());

        let list = flows(&symtab, "0", &no_strings());
        assert!(list.matches.is_empty());
    }

    #[test]
    fn duplicate_tuples_deduplicate() {
        let symtab = table();
        let list = flows(&symtab, "n0 == 1 || n0 == 1", &no_strings());
        assert_eq!(list.matches.len(), 1);
    }
}
