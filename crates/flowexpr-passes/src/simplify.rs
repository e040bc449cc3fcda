//! The simplifier: semantics-preserving algebraic identities.

use flowexpr_ast::{Cmp, Expr, RelOp};
use flowexpr_token::all_ones;

/// Simplify `expr` to a fixed point.
///
/// The result evaluates identically under every assignment and honors the
/// structural invariants: no nested same-operator nodes, no Boolean
/// children, no singleton `And`/`Or`, no contradictory or duplicate leaves
/// within one conjunction, and no ordering comparisons (they decompose into
/// unions of prefix matches).
pub fn simplify(expr: Expr) -> Expr {
    match expr {
        Expr::Boolean(b) => Expr::Boolean(b),
        Expr::Cmp(cmp) => simplify_cmp(cmp),
        Expr::And(children) => simplify_and(children),
        Expr::Or(children) => simplify_or(children),
    }
}

fn simplify_and(children: Vec<Expr>) -> Expr {
    let mut flat = Vec::with_capacity(children.len());
    for child in children {
        match simplify(child) {
            Expr::Boolean(true) => {}
            Expr::Boolean(false) => return Expr::Boolean(false),
            Expr::And(sub) => flat.extend(sub),
            other => flat.push(other),
        }
    }
    merge_and(flat)
}

fn simplify_or(children: Vec<Expr>) -> Expr {
    let mut flat: Vec<Expr> = Vec::with_capacity(children.len());
    for child in children {
        match simplify(child) {
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
    Expr::or(flat)
}

/// Merge the leaves of one conjunction pairwise until no rule applies.
pub(crate) fn merge_and(children: Vec<Expr>) -> Expr {
    let mut result: Vec<Expr> = Vec::with_capacity(children.len());
    'children: for child in children {
        let Expr::Cmp(mut incoming) = child else {
            // Value sets and other non-leaf children only deduplicate.
            if !result.contains(&child) {
                result.push(child);
            }
            continue;
        };
        let mut i = 0;
        while i < result.len() {
            let Expr::Cmp(existing) = &result[i] else {
                i += 1;
                continue;
            };
            if existing.symbol != incoming.symbol
                || existing.string.is_some() != incoming.string.is_some()
            {
                i += 1;
                continue;
            }
            match merge_pair(existing, &incoming) {
                Merge::False => return Expr::Boolean(false),
                Merge::DropNew => continue 'children,
                Merge::DropExisting => {
                    result.remove(i);
                }
                Merge::Replace(merged) => {
                    result.remove(i);
                    incoming = merged;
                }
                Merge::Keep => i += 1,
            }
        }
        result.push(Expr::Cmp(incoming));
    }
    Expr::and(result)
}

enum Merge {
    /// The conjunction is unsatisfiable
    False,
    /// The new leaf is implied by the existing one
    DropNew,
    /// The existing leaf is implied by the new one
    DropExisting,
    /// Both collapse into one leaf
    Replace(Cmp),
    /// No relationship
    Keep,
}

/// Combine two conjoined comparisons on the same symbol.
fn merge_pair(existing: &Cmp, incoming: &Cmp) -> Merge {
    if existing.string.is_some() {
        return merge_string_pair(existing, incoming);
    }
    match (existing.relop, incoming.relop) {
        (RelOp::Eq, RelOp::Eq) => {
            let overlap = existing.mask & incoming.mask;
            if existing.value & overlap != incoming.value & overlap {
                return Merge::False;
            }
            let mut merged = existing.clone();
            merged.value |= incoming.value;
            merged.mask |= incoming.mask;
            Merge::Replace(merged)
        }
        (RelOp::Eq, RelOp::Ne) => match eq_versus_ne(existing, incoming) {
            Some(true) => Merge::False,
            Some(false) => Merge::DropNew,
            None => Merge::Keep,
        },
        (RelOp::Ne, RelOp::Eq) => match eq_versus_ne(incoming, existing) {
            Some(true) => Merge::False,
            Some(false) => Merge::DropExisting,
            None => Merge::Keep,
        },
        (RelOp::Ne, RelOp::Ne) => {
            if existing == incoming {
                Merge::DropNew
            } else {
                Merge::Keep
            }
        }
        _ => Merge::Keep,
    }
}

/// Given `eq` holds, is `ne` contradicted (`Some(true)`), implied
/// (`Some(false)`), or independent (`None`)?
fn eq_versus_ne(eq: &Cmp, ne: &Cmp) -> Option<bool> {
    let overlap = eq.mask & ne.mask;
    if eq.value & overlap != ne.value & overlap {
        // The equality already differs from the disequality somewhere.
        return Some(false);
    }
    if ne.mask & !eq.mask == 0 {
        // The disequality's window is pinned entirely by the equality.
        return Some(true);
    }
    None
}

fn merge_string_pair(existing: &Cmp, incoming: &Cmp) -> Merge {
    let same = existing.string == incoming.string;
    match (existing.relop, incoming.relop) {
        (RelOp::Eq, RelOp::Eq) => {
            if same {
                Merge::DropNew
            } else {
                Merge::False
            }
        }
        (RelOp::Eq, RelOp::Ne) => {
            if same {
                Merge::False
            } else {
                Merge::DropNew
            }
        }
        (RelOp::Ne, RelOp::Eq) => {
            if same {
                Merge::False
            } else {
                Merge::DropExisting
            }
        }
        (RelOp::Ne, RelOp::Ne) => {
            if same {
                Merge::DropNew
            } else {
                Merge::Keep
            }
        }
        _ => Merge::Keep,
    }
}

fn simplify_cmp(cmp: Cmp) -> Expr {
    if cmp.string.is_some() || cmp.symbol.is_predicate() {
        return Expr::Cmp(cmp);
    }
    if cmp.mask == 0 {
        // A zero-mask comparison tests 0 against 0.
        return Expr::Boolean(cmp.relop.evaluate(0, cmp.value));
    }
    if cmp.relop.is_ordering() {
        return expand_ordering(&cmp);
    }
    crack_masked(cmp)
}

/// On a must-crack field, a partial-mask equality becomes the union of the
/// exact values it covers (dually, a disequality becomes the conjunction of
/// exact disequalities). Such fields are narrow by contract.
fn crack_masked(cmp: Cmp) -> Expr {
    let full = all_ones(cmp.symbol.n_bits());
    if !cmp.symbol.must_crack() || cmp.mask == full {
        return Expr::Cmp(cmp);
    }
    let free = full & !cmp.mask;
    let mut members = Vec::new();
    let mut subset = 0u128;
    loop {
        let mut exact = cmp.clone();
        exact.value = cmp.value | subset;
        exact.mask = full;
        members.push(Expr::Cmp(exact));
        if subset == free {
            break;
        }
        subset = subset.wrapping_sub(free) & free;
    }
    match cmp.relop {
        RelOp::Eq => Expr::or(members),
        _ => Expr::and(members),
    }
}

/// Decompose an ordering comparison into a union of prefix matches over
/// its (contiguous) mask window.
fn expand_ordering(cmp: &Cmp) -> Expr {
    let lo = cmp.mask.trailing_zeros() as u8;
    let width = cmp.mask.count_ones() as u8;
    let value = cmp.value >> lo;
    let full = all_ones(width);

    let mut tuples: Vec<(u128, u128)> = Vec::new();
    match cmp.relop {
        RelOp::Lt | RelOp::Le => {
            for bit in 0..width {
                if value >> bit & 1 == 1 {
                    tuples.push((value & !all_ones(bit + 1), full & !all_ones(bit)));
                }
            }
            if cmp.relop == RelOp::Le {
                tuples.push((value, full));
            }
        }
        RelOp::Gt | RelOp::Ge => {
            for bit in 0..width {
                if value >> bit & 1 == 0 {
                    tuples.push(((value & !all_ones(bit + 1)) | 1 << bit, full & !all_ones(bit)));
                }
            }
            if cmp.relop == RelOp::Ge {
                tuples.push((value, full));
            }
        }
        RelOp::Eq | RelOp::Ne => unreachable!("not an ordering comparison"),
    }

    let members = tuples
        .into_iter()
        .map(|(v, m)| {
            let eq = Cmp::numeric(cmp.symbol.clone(), RelOp::Eq, v << lo, m << lo, cmp.format);
            crack_masked(eq)
        })
        .collect();
    simplify(Expr::or(members))
}
