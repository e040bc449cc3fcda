//! Test-harness collaborators for the flowexpr compiler.
//!
//! The compiler core treats the flow classifier as a black box; this crate
//! supplies the model implementation the exhaustive test driver installs
//! compiled matches into, together with the enumeration machinery the
//! driver iterates with:
//!
//! - [`Classifier`] — a model classifier with OpenFlow-style conjunction
//!   acceptance (`insert` / `lookup`);
//! - [`tree_shapes`] and [`compositions`] — tree-shape enumeration up to a
//!   leaf count;
//! - [`leaf_choices`] and [`assignments`] — the digit cascade over
//!   relational operators, variables, values, and masks, and the
//!   assignment space to evaluate against;
//! - [`test_symtab`] and [`network_symtab`] — canned symbol tables: the
//!   `n0…`/`s0…` variable table the exhaustive driver compiles against,
//!   and a realistic eth/ip/tcp table for end-to-end scenarios.

#![warn(clippy::all)]
#![allow(
    clippy::module_name_repetitions,
    clippy::must_use_candidate,
    clippy::missing_panics_doc,
    clippy::cast_possible_truncation,
    clippy::uninlined_format_args
)]

mod classifier;
mod enumerate;
mod tables;

pub use classifier::Classifier;
pub use enumerate::{
    LeafChoice, Shape, assignments, build_shape, compositions, leaf_choices, tree_shapes,
};
pub use tables::{
    NUM_FIELD_BASE, STR_FIELD_BASE, harness_string_map, network_symtab, packet_for, test_symtab,
};
