//! Enumeration machinery for the exhaustive driver: compositions, tree
//! shapes, the leaf digit cascade, and the assignment space.

use flowexpr_ast::{Assignment, Cmp, Expr, RelOp};
use flowexpr_symtab::SymbolTable;
use flowexpr_token::{IntFormat, all_ones, mask_is_contiguous};

/// All ordered ways to write `n` as a sum of positive integers.
pub fn compositions(n: u32) -> Vec<Vec<u32>> {
    if n == 0 {
        return vec![Vec::new()];
    }
    let mut out = Vec::new();
    for first in 1..=n {
        for mut rest in compositions(n - first) {
            rest.insert(0, first);
            out.push(rest);
        }
    }
    out
}

/// The shape of an expression tree: a leaf, or an operator node whose
/// children alternate operators with their parent.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Shape {
    /// One comparison leaf
    Leaf,
    /// An `&&`/`||` node (which of the two is fixed by depth parity)
    Node(Vec<Shape>),
}

impl Shape {
    /// Number of leaves in the shape.
    pub fn n_leaves(&self) -> usize {
        match self {
            Shape::Leaf => 1,
            Shape::Node(children) => children.iter().map(Shape::n_leaves).sum(),
        }
    }
}

/// All tree shapes with exactly `n` leaves: compositions of `n` into two or
/// more parts, with parts of three or more leaves decomposed recursively.
pub fn tree_shapes(n: u32) -> Vec<Shape> {
    if n == 1 {
        return vec![Shape::Leaf];
    }
    let mut out = Vec::new();
    for composition in compositions(n) {
        if composition.len() < 2 {
            continue;
        }
        // Cross product of the sub-shapes of every part.
        let per_part: Vec<Vec<Shape>> = composition.iter().map(|&p| tree_shapes(p)).collect();
        let mut stack: Vec<Vec<Shape>> = vec![Vec::new()];
        for options in &per_part {
            let mut next = Vec::with_capacity(stack.len() * options.len());
            for prefix in &stack {
                for option in options {
                    let mut chosen = prefix.clone();
                    chosen.push(option.clone());
                    next.push(chosen);
                }
            }
            stack = next;
        }
        out.extend(stack.into_iter().map(Shape::Node));
    }
    out
}

/// One possible comparison leaf in the digit cascade.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LeafChoice {
    /// `nI relop value/mask`
    Num {
        /// Variable index (`n0`, `n1`, …)
        var: usize,
        /// Relational operator
        relop: RelOp,
        /// Comparison value (1-bits within `mask` only)
        value: u128,
        /// Comparison mask
        mask: u128,
    },
    /// `sI == "value"` or `sI != "value"`
    Str {
        /// Variable index (`s0`, `s1`, …)
        var: usize,
        /// Equality or disequality
        relop: RelOp,
        /// `"0"` or `"1"`
        value: &'static str,
    },
}

/// The digit cascade of possible leaves over `nvars` numeric variables of
/// `bits` bits, `svars` one-bit string variables, and `relops`.
///
/// Mask enumeration skips the empty mask, values with 1-bits outside the
/// mask, and non-contiguous masks for ordering operators. Without `more`
/// only the full mask is used.
pub fn leaf_choices(
    nvars: usize,
    svars: usize,
    bits: u8,
    relops: &[RelOp],
    more: bool,
) -> Vec<LeafChoice> {
    let full = all_ones(bits);
    let masks: Vec<u128> = if more { (1..=full).collect() } else { vec![full] };

    let mut choices = Vec::new();
    for var in 0..nvars {
        for &relop in relops {
            for &mask in &masks {
                if relop.is_ordering() && !mask_is_contiguous(mask) {
                    continue;
                }
                let mut value = 0u128;
                loop {
                    choices.push(LeafChoice::Num { var, relop, value, mask });
                    if value == mask {
                        break;
                    }
                    // Next value within the mask (subset enumeration).
                    value = value.wrapping_sub(mask) & mask;
                }
            }
        }
    }
    for var in 0..svars {
        for relop in [RelOp::Eq, RelOp::Ne] {
            for value in ["0", "1"] {
                choices.push(LeafChoice::Str { var, relop, value });
            }
        }
    }
    choices
}

/// Build the expression for `shape` with the given leaves, rooted at `&&`
/// when `root_is_and` (operators alternate below). The number of leaves
/// must equal `shape.n_leaves()`.
pub fn build_shape(
    shape: &Shape,
    leaves: &[LeafChoice],
    root_is_and: bool,
    symtab: &SymbolTable,
) -> Expr {
    let mut index = 0;
    build(shape, leaves, root_is_and, symtab, &mut index)
}

fn build(
    shape: &Shape,
    leaves: &[LeafChoice],
    is_and: bool,
    symtab: &SymbolTable,
    index: &mut usize,
) -> Expr {
    match shape {
        Shape::Leaf => {
            let choice = &leaves[*index];
            *index += 1;
            leaf_expr(choice, symtab)
        }
        Shape::Node(children) => {
            let built: Vec<Expr> = children
                .iter()
                .map(|c| build(c, leaves, !is_and, symtab, index))
                .collect();
            // Preserve the shape exactly; the passes under test do the
            // flattening.
            if is_and { Expr::And(built) } else { Expr::Or(built) }
        }
    }
}

fn leaf_expr(choice: &LeafChoice, symtab: &SymbolTable) -> Expr {
    match choice {
        LeafChoice::Num { var, relop, value, mask } => {
            let symbol = symtab
                .get(&format!("n{var}"))
                .cloned()
                .expect("leaf variable registered");
            Expr::Cmp(Cmp::numeric(symbol, *relop, *value, *mask, IntFormat::Decimal))
        }
        LeafChoice::Str { var, relop, value } => {
            let symbol = symtab
                .get(&format!("s{var}"))
                .cloned()
                .expect("leaf variable registered");
            Expr::Cmp(Cmp::string(symbol, *relop, value))
        }
    }
}

/// Every assignment of `nvars` numeric variables of `bits` bits and
/// `svars` string variables over `{"0", "1"}`.
pub fn assignments(nvars: usize, svars: usize, bits: u8) -> Vec<Assignment> {
    let num_space = 1u128 << (bits as u32 * nvars as u32);
    let str_space = 1u32 << svars;

    let mut out = Vec::with_capacity((num_space as usize) * (str_space as usize));
    for num_digits in 0..num_space {
        for str_digits in 0..str_space {
            let mut sigma = Assignment::new();
            for var in 0..nvars {
                let value = num_digits >> (var as u32 * bits as u32) & all_ones(bits);
                sigma.set_num(&format!("n{var}"), value);
            }
            for var in 0..svars {
                let value = if str_digits >> var & 1 == 1 { "1" } else { "0" };
                sigma.set_str(&format!("s{var}"), value);
            }
            out.push(sigma);
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use crate::tables::test_symtab;

    use super::*;

    #[test]
    fn composition_counts() {
        // 2^(n-1) compositions of n.
        assert_eq!(compositions(1).len(), 1);
        assert_eq!(compositions(3).len(), 4);
        assert_eq!(compositions(4).len(), 8);
    }

    #[test]
    fn shape_counts() {
        assert_eq!(tree_shapes(1).len(), 1);
        assert_eq!(tree_shapes(2).len(), 1);
        assert_eq!(tree_shapes(3).len(), 3);
        assert_eq!(tree_shapes(4).len(), 11);
        for shape in tree_shapes(4) {
            assert_eq!(shape.n_leaves(), 4);
        }
    }

    #[test]
    fn leaves_skip_pathological_masks() {
        let choices = leaf_choices(1, 0, 2, &[RelOp::Eq, RelOp::Lt], true);
        for choice in &choices {
            let LeafChoice::Num { relop, value, mask, .. } = choice else {
                panic!("no string vars requested")
            };
            assert_ne!(*mask, 0);
            assert_eq!(value & !mask, 0);
            if relop.is_ordering() {
                assert!(mask_is_contiguous(*mask));
            }
        }
        // Eq: masks {1,2,3} with 2,2,4 values; Lt skips the non-contiguous
        // nothing at 2 bits (all of 1,2,3 are contiguous).
        assert_eq!(choices.len(), 16);
    }

    #[test]
    fn default_masks_are_full_width() {
        let choices = leaf_choices(2, 0, 3, &[RelOp::Eq], false);
        assert_eq!(choices.len(), 2 * 8);
    }

    #[test]
    fn built_shapes_alternate_operators() {
        let symtab = test_symtab(2, 0, 1);
        let shapes = tree_shapes(3);
        let leaves = vec![
            LeafChoice::Num { var: 0, relop: RelOp::Eq, value: 1, mask: 1 },
            LeafChoice::Num { var: 1, relop: RelOp::Eq, value: 0, mask: 1 },
            LeafChoice::Num { var: 0, relop: RelOp::Ne, value: 1, mask: 1 },
        ];
        let expr = build_shape(&shapes[0], &leaves, true, &symtab);
        match expr {
            Expr::And(children) => {
                assert!(children.iter().all(|c| !matches!(c, Expr::And(_))));
            }
            other => panic!("expected And at root, got {other:?}"),
        }
    }

    #[test]
    fn assignment_space_is_complete() {
        let sigmas = assignments(2, 1, 2);
        assert_eq!(sigmas.len(), 16 * 2);
        assert!(sigmas.iter().any(|s| s.num("n0") == 3 && s.num("n1") == 2));
        assert!(sigmas.iter().any(|s| s.str("s0") == Some("1")));
    }
}
