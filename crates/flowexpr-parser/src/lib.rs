//! Parser and annotator for the flowexpr match-expression language.
//!
//! [`compile`] turns text into a typed [`Expr`](flowexpr_ast::Expr) using a
//! symbol table for name resolution; [`annotate`] then expands predicate
//! and sub-field references and conjoins prerequisite expressions, so the
//! result mentions only concrete fields and string symbols. Action bodies
//! (`field = value; …`) parse through [`parse_assignments`], which returns
//! the assignments together with the conjoined prerequisite of every
//! written field.
//!
//! # Pipeline position
//!
//! ```text
//! text ── compile ──▶ Expr ── annotate ──▶ Expr (fields only)
//!              ▲                   ▲
//!              └── SymbolTable ────┘
//! ```
//!
//! Each operation returns the first error it detects, carrying a byte
//! offset into the input where available.

#![warn(clippy::all)]
#![allow(
    clippy::too_many_lines,
    clippy::module_name_repetitions,
    clippy::must_use_candidate,
    clippy::missing_errors_doc,
    clippy::match_same_arms,
    clippy::uninlined_format_args
)]

mod actions;
mod annotate;
mod parse;

pub use actions::{ActionBody, Load, parse_assignments};
pub use annotate::annotate;
pub use parse::compile;
