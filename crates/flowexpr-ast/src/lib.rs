//! Expression AST for the flowexpr match-expression compiler.
//!
//! An expression is a tree of comparisons combined with `&&` and `||`:
//! there is no negation node, because `!` is pushed down to the leaves when
//! an expression is built (see [`Expr::negate`]). Every stage of the
//! pipeline consumes its input tree and returns a new one; nothing is
//! shared between stages.
//!
//! The [`Display`](std::fmt::Display) implementation produces text that
//! parses back to an equivalent expression, which the test driver uses to
//! check the round-trip property.

#![warn(clippy::all)]
#![allow(
    clippy::module_name_repetitions,
    clippy::must_use_candidate,
    clippy::missing_errors_doc,
    clippy::missing_panics_doc,
    clippy::match_same_arms,
    clippy::uninlined_format_args
)]

mod expr;
mod format;

use std::collections::HashMap;
use std::fmt;

pub use expr::{Cmp, Expr, RelOp};
pub use flowexpr_symtab::{FieldSpec, Symbol, SymbolKind, SymbolTable};
pub use flowexpr_token::IntFormat;

/// A variable assignment `σ` used to evaluate expressions in the test
/// harness: numeric values for fields, strings for string symbols.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct Assignment {
    nums: HashMap<String, u128>,
    strs: HashMap<String, String>,
}

impl Assignment {
    /// Empty assignment; unassigned numeric symbols read as 0.
    pub fn new() -> Self {
        Self::default()
    }

    /// Assign a numeric symbol.
    pub fn set_num(&mut self, name: &str, value: u128) {
        self.nums.insert(name.to_string(), value);
    }

    /// Assign a string symbol.
    pub fn set_str(&mut self, name: &str, value: &str) {
        self.strs.insert(name.to_string(), value.to_string());
    }

    /// Numeric value of `name`, defaulting to 0.
    pub fn num(&self, name: &str) -> u128 {
        self.nums.get(name).copied().unwrap_or(0)
    }

    /// String value of `name`, if assigned.
    pub fn str(&self, name: &str) -> Option<&str> {
        self.strs.get(name).map(String::as_str)
    }

    /// Numeric assignments in name order (for packet construction).
    pub fn nums(&self) -> impl Iterator<Item = (&str, u128)> {
        let mut entries: Vec<_> = self.nums.iter().map(|(k, v)| (k.as_str(), *v)).collect();
        entries.sort_unstable();
        entries.into_iter()
    }

    /// String assignments in name order.
    pub fn strs(&self) -> impl Iterator<Item = (&str, &str)> {
        let mut entries: Vec<_> =
            self.strs.iter().map(|(k, v)| (k.as_str(), v.as_str())).collect();
        entries.sort_unstable();
        entries.into_iter()
    }
}

impl fmt::Display for Assignment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut first = true;
        for (name, value) in self.nums() {
            if !first {
                write!(f, " ")?;
            }
            first = false;
            write!(f, "{name}={value}")?;
        }
        for (name, value) in self.strs() {
            if !first {
                write!(f, " ")?;
            }
            first = false;
            write!(f, "{name}=\"{value}\"")?;
        }
        if first {
            write!(f, "(empty)")?;
        }
        Ok(())
    }
}
