//! Error types for the flowexpr match-expression compiler.
//!
//! Every pipeline stage reports the first error it detects and refuses to
//! operate on erroneous input; no error kind is recovered internally.

use thiserror::Error;

/// Result type for compiler operations
pub type Result<T> = std::result::Result<T, ExprError>;

/// Errors produced by the lexer, parser, annotator, and matcher.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum ExprError {
    /// Lexical error (unterminated string, malformed number, ...)
    #[error("lexical error at offset {position}: {message}")]
    Lex { message: String, position: usize },

    /// Grammar violation or unexpected token
    #[error("syntax error at offset {position}: {message}")]
    Syntax { message: String, position: usize },

    /// Name not registered in the symbol table
    #[error("unknown symbol \"{name}\" at offset {position}")]
    UnknownSymbol { name: String, position: usize },

    /// Operation not applicable to the symbol's type
    #[error("type mismatch at offset {position}: {message}")]
    TypeMismatch { message: String, position: usize },

    /// Value or mask does not fit the field or bit window
    #[error("range overflow at offset {position}: {message}")]
    RangeOverflow { message: String, position: usize },

    /// Self- or mutually-recursive prerequisite chain
    #[error("recursive prerequisite involving symbol \"{name}\"")]
    PrereqCycle { name: String },

    /// Sub-field range does not fit inside its base field
    #[error("sub-field {name} does not fit within its base field")]
    SubfieldOutOfBounds { name: String },

    /// Ordering comparison against a non-contiguous mask
    #[error("invalid mask at offset {position}: {message}")]
    InvalidMask { message: String, position: usize },

    /// String value missing from the caller-supplied name map
    #[error("string \"{name}\" does not resolve to an id")]
    UnresolvedString { name: String },

    /// Symbol-table registration with an already-taken name
    #[error("duplicate symbol \"{name}\"")]
    DuplicateSymbol { name: String },
}

impl ExprError {
    /// Byte offset into the input where the error was detected, if known.
    pub fn position(&self) -> Option<usize> {
        match self {
            ExprError::Lex { position, .. }
            | ExprError::Syntax { position, .. }
            | ExprError::UnknownSymbol { position, .. }
            | ExprError::TypeMismatch { position, .. }
            | ExprError::RangeOverflow { position, .. }
            | ExprError::InvalidMask { position, .. } => Some(*position),
            ExprError::PrereqCycle { .. }
            | ExprError::SubfieldOutOfBounds { .. }
            | ExprError::UnresolvedString { .. }
            | ExprError::DuplicateSymbol { .. } => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn positions_are_reported() {
        let err = ExprError::Syntax { message: "expecting `)`".into(), position: 7 };
        assert_eq!(err.position(), Some(7));
        assert_eq!(err.to_string(), "syntax error at offset 7: expecting `)`");
    }

    #[test]
    fn cycle_has_no_position() {
        let err = ExprError::PrereqCycle { name: "self_recurse".into() };
        assert_eq!(err.position(), None);
    }
}
