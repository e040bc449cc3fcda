//! Algebraic simplification and DNF normalization.
//!
//! [`simplify`] applies semantics-preserving identities until a fixed
//! point: Boolean absorption, same-operator flattening, same-field leaf
//! merging, expansion of ordering comparisons into prefix-match unions, and
//! must-crack expansion of masked equalities. Its output honors the
//! structural invariants checked by
//! [`Expr::honors_invariants`](flowexpr_ast::Expr::honors_invariants).
//!
//! [`normalize`] then produces the matcher-ready disjunctive normal form: a
//! disjunction of conjunctions whose members are single comparisons or
//! single-symbol value sets (the conjunction-group source), checked by
//! [`Expr::is_normalized`](flowexpr_ast::Expr::is_normalized).
//!
//! Both passes consume their input tree and preserve its truth value under
//! every assignment.

#![warn(clippy::all)]
#![allow(
    clippy::too_many_lines,
    clippy::module_name_repetitions,
    clippy::must_use_candidate,
    clippy::match_same_arms,
    clippy::uninlined_format_args
)]

mod normalize;
mod simplify;

pub use normalize::normalize;
pub use simplify::simplify;
