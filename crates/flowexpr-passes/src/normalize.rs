//! The normalizer: conjunction-capable disjunctive normal form.
//!
//! The normal form is a disjunction of conjunctions whose members are
//! *generalized comparisons*: a single `Cmp`, or an `Or` of `Cmp`s on one
//! symbol (a value set). Value sets are kept atomic under `And` — they are
//! what the matcher turns into conjunction groups — while any other `Or`
//! nested under an `And` is crushed by distribution.

use flowexpr_ast::{Cmp, Expr, RelOp};

use crate::simplify::merge_and;

/// Normalize a simplified expression into DNF.
///
/// The result satisfies [`Expr::is_normalized`] and evaluates identically
/// to the input under every assignment.
pub fn normalize(expr: Expr) -> Expr {
    match expr {
        Expr::Cmp(_) | Expr::Boolean(_) => expr,
        Expr::And(children) => normalize_and(children),
        Expr::Or(children) => normalize_or(children),
    }
}

fn normalize_and(children: Vec<Expr>) -> Expr {
    let mut flat = Vec::with_capacity(children.len());
    for child in children {
        match normalize(child) {
            Expr::Boolean(true) => {}
            Expr::Boolean(false) => return Expr::Boolean(false),
            Expr::And(sub) => flat.extend(sub),
            other => flat.push(other),
        }
    }

    let flat = match crush_sets(flat) {
        Some(children) => children,
        None => return Expr::Boolean(false),
    };

    // Crush disjunction: distribute the conjunction over the first child
    // that is an `Or` spanning more than one symbol, then renormalize. A
    // single-symbol `Or` is a value set and stays put.
    if let Some(index) = flat
        .iter()
        .position(|c| matches!(c, Expr::Or(_)) && c.cmp_symbol().is_none())
    {
        let mut rest = flat;
        let Expr::Or(branches) = rest.remove(index) else { unreachable!() };
        let disjuncts = branches
            .into_iter()
            .map(|branch| {
                let mut conj = rest.clone();
                conj.push(branch);
                Expr::and(conj)
            })
            .collect();
        return normalize_or(disjuncts);
    }

    match merge_and(flat) {
        Expr::And(children) => Expr::And(children),
        other => normalize(other),
    }
}

/// Intersect pure-equality constraints (plain `==` leaves and `{…}` sets)
/// that target the same symbol. Returns `None` when the conjunction is
/// unsatisfiable.
fn crush_sets(children: Vec<Expr>) -> Option<Vec<Expr>> {
    let mut result: Vec<Expr> = Vec::with_capacity(children.len());
    for child in children {
        let Some(incoming) = eq_alternatives(&child) else {
            result.push(child);
            continue;
        };
        let mut incoming = incoming;
        let mut i = 0;
        while i < result.len() {
            let Some(existing) = eq_alternatives(&result[i]) else {
                i += 1;
                continue;
            };
            if existing[0].symbol != incoming[0].symbol {
                i += 1;
                continue;
            }
            let mut intersection = Vec::new();
            for a in &existing {
                for b in &incoming {
                    if let Some(merged) = intersect_eq(a, b) {
                        if !intersection.contains(&merged) {
                            intersection.push(merged);
                        }
                    }
                }
            }
            if intersection.is_empty() {
                return None;
            }
            result.remove(i);
            incoming = intersection;
            // Rescan: the tightened constraint may intersect another set.
            i = 0;
        }
        let merged: Vec<Expr> = incoming.into_iter().map(Expr::Cmp).collect();
        result.push(Expr::or(merged));
    }
    Some(result)
}

/// The equality alternatives of a pure-equality constraint, or `None` when
/// the child is anything else.
fn eq_alternatives(expr: &Expr) -> Option<Vec<Cmp>> {
    match expr {
        Expr::Cmp(cmp) if cmp.relop == RelOp::Eq && cmp.string.is_none() => {
            Some(vec![cmp.clone()])
        }
        Expr::Or(children) => {
            let mut alts = Vec::with_capacity(children.len());
            let mut symbol = None;
            for child in children {
                let Expr::Cmp(cmp) = child else { return None };
                if cmp.relop != RelOp::Eq || cmp.string.is_some() {
                    return None;
                }
                match &symbol {
                    None => symbol = Some(cmp.symbol.clone()),
                    Some(prev) if *prev == cmp.symbol => {}
                    Some(_) => return None,
                }
                alts.push(cmp.clone());
            }
            Some(alts)
        }
        _ => None,
    }
}

/// Conjoin two equalities on one symbol into a single equality, or `None`
/// when they contradict.
fn intersect_eq(a: &Cmp, b: &Cmp) -> Option<Cmp> {
    let overlap = a.mask & b.mask;
    if a.value & overlap != b.value & overlap {
        return None;
    }
    let mut merged = a.clone();
    merged.value |= b.value;
    merged.mask |= b.mask;
    Some(merged)
}

fn normalize_or(children: Vec<Expr>) -> Expr {
    let mut flat: Vec<Expr> = Vec::with_capacity(children.len());
    for child in children {
        match normalize(child) {
            Expr::Boolean(false) => {}
            Expr::Boolean(true) => return Expr::Boolean(true),
            Expr::Or(sub) => {
                for c in sub {
                    if !flat.contains(&c) {
                        flat.push(c);
                    }
                }
            }
            other => {
                if !flat.contains(&other) {
                    flat.push(other);
                }
            }
        }
    }
    absorb(&mut flat);
    Expr::or(flat)
}

/// Absorption at the top disjunction: drop any disjunct that implies
/// another (`a || (a && b)` keeps only `a`).
fn absorb(disjuncts: &mut Vec<Expr>) {
    let mut i = 0;
    while i < disjuncts.len() {
        let implied_elsewhere = disjuncts
            .iter()
            .enumerate()
            .any(|(j, other)| j != i && implies(&disjuncts[i], other));
        if implied_elsewhere {
            disjuncts.remove(i);
        } else {
            i += 1;
        }
    }
}

/// Conservative structural implication between normalized disjuncts:
/// `a ⇒ b` when every clause of `b` is implied by some clause of `a`.
fn implies(a: &Expr, b: &Expr) -> bool {
    let clauses_b = clause_list(b);
    let clauses_a = clause_list(a);
    clauses_b
        .iter()
        .all(|cb| clauses_a.iter().any(|ca| clause_implies(ca, cb)))
}

fn clause_list(expr: &Expr) -> Vec<&Expr> {
    match expr {
        Expr::And(children) => children.iter().collect(),
        other => vec![other],
    }
}

/// Implication between generalized comparisons: every alternative of `a`
/// must imply some alternative of `b`.
fn clause_implies(a: &Expr, b: &Expr) -> bool {
    if a == b {
        return true;
    }
    let (Some(alts_a), Some(alts_b)) = (cmp_alternatives(a), cmp_alternatives(b)) else {
        return false;
    };
    alts_a
        .iter()
        .all(|ca| alts_b.iter().any(|cb| cmp_implies(ca, cb)))
}

fn cmp_alternatives(expr: &Expr) -> Option<Vec<&Cmp>> {
    match expr {
        Expr::Cmp(cmp) => Some(vec![cmp]),
        Expr::Or(children) => children
            .iter()
            .map(|c| match c {
                Expr::Cmp(cmp) => Some(cmp),
                _ => None,
            })
            .collect(),
        _ => None,
    }
}

/// Leaf-level implication.
fn cmp_implies(a: &Cmp, b: &Cmp) -> bool {
    if a.symbol != b.symbol {
        return false;
    }
    if a == b {
        return true;
    }
    if a.string.is_some() || b.string.is_some() {
        return match (&a.string, &b.string, a.relop, b.relop) {
            // s == "x" implies s != "y" for distinct names.
            (Some(x), Some(y), RelOp::Eq, RelOp::Ne) => x != y,
            _ => false,
        };
    }
    match (a.relop, b.relop) {
        // A tighter equality implies a looser one it agrees with.
        (RelOp::Eq, RelOp::Eq) => b.mask & !a.mask == 0 && a.value & b.mask == b.value,
        // An equality that differs from a disequality's pinned bits
        // implies it.
        (RelOp::Eq, RelOp::Ne) => {
            let overlap = a.mask & b.mask;
            b.mask & !a.mask == 0 && a.value & overlap != b.value & overlap
        }
        _ => false,
    }
}
