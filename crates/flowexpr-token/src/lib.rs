//! Token definitions for the flowexpr match-expression language.
//!
//! This crate provides the shared token types produced by the lexer and
//! consumed by the parser, together with their canonical textual form.
//! Formatting is lossless: re-lexing the formatted text of any well-formed
//! token yields an equivalent token.

use std::fmt;
use std::hash::{Hash, Hasher};
use std::net::{Ipv4Addr, Ipv6Addr};
use std::sync::Arc;

/// Token produced by the lexer and consumed by the parser.
///
/// Stores the token kind, original source text, and byte span. The text is
/// kept in an `Arc<str>` so buffering and lookahead can clone tokens cheaply.
#[derive(Debug, Clone, PartialEq)]
pub struct Token {
    /// Token classification for parser decision making
    pub kind: TokenKind,
    /// Original source text for diagnostics
    pub text: Arc<str>,
    /// Starting byte position for error reporting
    pub start: usize,
    /// Ending byte position for span calculation
    pub end: usize,
}

impl Token {
    /// Create a new token
    pub fn new(kind: TokenKind, text: impl Into<Arc<str>>, start: usize, end: usize) -> Self {
        Token { kind, text: text.into(), start, end }
    }
}

/// Token classification for the match-expression language.
#[derive(Debug, Clone, PartialEq)]
pub enum TokenKind {
    /// Numeric literal without a mask: `80`, `0x800`, `10.0.0.0`, `fe80::1`,
    /// `00:01:02:03:04:05`
    Integer(IntLiteral),
    /// Masked numeric literal: `0x16/0x1e`, `10.0.0.0/8`,
    /// `192.168.0.0/255.255.0.0`
    MaskedInteger(IntLiteral),
    /// Quoted string with escapes decoded
    String(String),
    /// Identifier: letter or underscore, then letters, digits, underscores,
    /// or dots
    Id(String),

    /// `==` - equality
    Eq,
    /// `!=` - inequality
    Ne,
    /// `<` - less than
    Lt,
    /// `<=` - less than or equal
    Le,
    /// `>` - greater than
    Gt,
    /// `>=` - greater than or equal
    Ge,

    /// `=` - assignment (action bodies)
    Equals,
    /// `!` - logical negation
    Not,
    /// `&&` - logical AND
    LogAnd,
    /// `||` - logical OR
    LogOr,
    /// `&` - reserved punctuation
    Ampersand,
    /// `|` - reserved punctuation
    Pipe,
    /// `(` - left parenthesis
    LParen,
    /// `)` - right parenthesis
    RParen,
    /// `{` - left brace (value sets)
    LCurly,
    /// `}` - right brace
    RCurly,
    /// `[` - left bracket (bit ranges)
    LSquare,
    /// `]` - right bracket
    RSquare,
    /// `..` - bit-range separator
    DotDot,
    /// `::` - reserved punctuation
    DoubleColon,
    /// `,` - list separator
    Comma,
    /// `;` - statement terminator (action bodies)
    Semicolon,

    /// End of input; the lexer keeps producing `End` once reached
    End,
    /// Lexical error carrying a descriptive message
    Error(String),
}

/// Preferred display format of a numeric literal.
///
/// A display hint only: two literals with equal value and mask are
/// equivalent regardless of format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum IntFormat {
    /// Plain decimal: `80`
    #[default]
    Decimal,
    /// Hexadecimal: `0x800`
    Hex,
    /// Dotted quad: `10.0.0.0`
    Ipv4,
    /// Colon-hex groups with `::` compression: `fe80::1`
    Ipv6,
    /// Six colon-hex octet pairs: `00:01:02:03:04:05`
    Ethernet,
}

/// A 128-bit numeric literal with its mask and display format.
///
/// The mask of a bare integer is all-ones and is narrowed to the declared
/// field width by the parser. Equality and hashing ignore `format`, so a
/// hex 0 compares equal to a decimal 0.
#[derive(Debug, Clone, Copy)]
pub struct IntLiteral {
    /// Literal value, big-endian canonicalized at parse time
    pub value: u128,
    /// Mask; 1-bits select the compared bits
    pub mask: u128,
    /// Display hint for formatting
    pub format: IntFormat,
}

impl IntLiteral {
    /// A bare literal with an all-ones mask.
    pub fn new(value: u128, format: IntFormat) -> Self {
        IntLiteral { value, mask: u128::MAX, format }
    }

    /// A masked literal.
    pub fn masked(value: u128, mask: u128, format: IntFormat) -> Self {
        IntLiteral { value, mask, format }
    }
}

impl PartialEq for IntLiteral {
    fn eq(&self, other: &Self) -> bool {
        self.value == other.value && self.mask == other.mask
    }
}

impl Eq for IntLiteral {}

impl Hash for IntLiteral {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.value.hash(state);
        self.mask.hash(state);
    }
}

/// Bit mask with the low `n_bits` bits set.
pub fn all_ones(n_bits: u8) -> u128 {
    if n_bits >= 128 { u128::MAX } else { (1u128 << n_bits) - 1 }
}

/// Prefix mask of `len` leading 1-bits within a `width`-bit field.
pub fn prefix_mask(width: u8, len: u8) -> u128 {
    debug_assert!(len <= width);
    all_ones(width) & !all_ones(width - len)
}

/// The CIDR prefix length of `mask` within `width` bits, if `mask` is a
/// contiguous run of 1-bits anchored at the top of the field.
pub fn prefix_len(width: u8, mask: u128) -> Option<u8> {
    for len in 0..=width {
        if mask == prefix_mask(width, len) {
            return Some(len);
        }
    }
    None
}

/// Whether `mask` is a contiguous run of 1-bits (anywhere in the word).
/// Ordering comparisons require contiguous masks.
pub fn mask_is_contiguous(mask: u128) -> bool {
    if mask == 0 {
        return false;
    }
    let shifted = mask >> mask.trailing_zeros();
    (shifted & (shifted + 1)) == 0
}

fn format_value(value: u128, format: IntFormat, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match format {
        IntFormat::Decimal => write!(f, "{value}"),
        IntFormat::Hex => write!(f, "{value:#x}"),
        IntFormat::Ipv4 => write!(f, "{}", Ipv4Addr::from(value as u32)),
        // A bare `::` is punctuation to the lexer, so the all-zeros
        // address spells out one group.
        IntFormat::Ipv6 if value == 0 => write!(f, "::0"),
        IntFormat::Ipv6 => write!(f, "{}", Ipv6Addr::from(value)),
        IntFormat::Ethernet => {
            let b = value.to_be_bytes();
            write!(
                f,
                "{:02x}:{:02x}:{:02x}:{:02x}:{:02x}:{:02x}",
                b[10], b[11], b[12], b[13], b[14], b[15]
            )
        }
    }
}

impl fmt::Display for IntLiteral {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        format_value(self.value, self.format, f)
    }
}

impl IntLiteral {
    /// Format as a masked literal, preferring `/PREFIXLEN` for CIDR masks
    /// of address-formatted values.
    fn fmt_masked(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        format_value(self.value, self.format, f)?;
        let width = match self.format {
            IntFormat::Ipv4 => Some(32u8),
            IntFormat::Ipv6 => Some(128u8),
            _ => None,
        };
        if let Some(width) = width {
            if let Some(len) = prefix_len(width, self.mask) {
                return write!(f, "/{len}");
            }
        }
        write!(f, "/")?;
        format_value(self.mask, self.format, f)
    }
}

/// Escape a decoded string back into source form, including the quotes.
fn format_string(s: &str, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "\"")?;
    for c in s.chars() {
        match c {
            '"' => write!(f, "\\\"")?,
            '\\' => write!(f, "\\\\")?,
            '\n' => write!(f, "\\n")?,
            '\r' => write!(f, "\\r")?,
            '\t' => write!(f, "\\t")?,
            '\0' => write!(f, "\\0")?,
            c if (c as u32) < 0x20 => write!(f, "\\x{:02x}", c as u32)?,
            c => write!(f, "{c}")?,
        }
    }
    write!(f, "\"")
}

impl fmt::Display for TokenKind {
    /// Canonical text of the token. `End` formats as the empty string so
    /// that re-lexing it yields `End` again; `Error` formats as its message
    /// and is excluded from the round-trip guarantee.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TokenKind::Integer(lit) => lit.fmt(f),
            TokenKind::MaskedInteger(lit) => lit.fmt_masked(f),
            TokenKind::String(s) => format_string(s, f),
            TokenKind::Id(name) => write!(f, "{name}"),
            TokenKind::Eq => write!(f, "=="),
            TokenKind::Ne => write!(f, "!="),
            TokenKind::Lt => write!(f, "<"),
            TokenKind::Le => write!(f, "<="),
            TokenKind::Gt => write!(f, ">"),
            TokenKind::Ge => write!(f, ">="),
            TokenKind::Equals => write!(f, "="),
            TokenKind::Not => write!(f, "!"),
            TokenKind::LogAnd => write!(f, "&&"),
            TokenKind::LogOr => write!(f, "||"),
            TokenKind::Ampersand => write!(f, "&"),
            TokenKind::Pipe => write!(f, "|"),
            TokenKind::LParen => write!(f, "("),
            TokenKind::RParen => write!(f, ")"),
            TokenKind::LCurly => write!(f, "{{"),
            TokenKind::RCurly => write!(f, "}}"),
            TokenKind::LSquare => write!(f, "["),
            TokenKind::RSquare => write!(f, "]"),
            TokenKind::DotDot => write!(f, ".."),
            TokenKind::DoubleColon => write!(f, "::"),
            TokenKind::Comma => write!(f, ","),
            TokenKind::Semicolon => write!(f, ";"),
            TokenKind::End => Ok(()),
            TokenKind::Error(msg) => write!(f, "{msg}"),
        }
    }
}

impl fmt::Display for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.kind.fmt(f)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn literal_equality_ignores_format() {
        let hex = IntLiteral::new(0, IntFormat::Hex);
        let dec = IntLiteral::new(0, IntFormat::Decimal);
        assert_eq!(hex, dec);
    }

    #[test]
    fn prefix_masks() {
        assert_eq!(prefix_mask(32, 8), 0xff00_0000);
        assert_eq!(prefix_mask(32, 0), 0);
        assert_eq!(prefix_mask(32, 32), 0xffff_ffff);
        assert_eq!(prefix_len(32, 0xff00_0000), Some(8));
        assert_eq!(prefix_len(32, 0x00ff_0000), None);
    }

    #[test]
    fn contiguous_masks() {
        assert!(mask_is_contiguous(0b0111_1000));
        assert!(mask_is_contiguous(1));
        assert!(!mask_is_contiguous(0b101));
        assert!(!mask_is_contiguous(0));
    }

    #[test]
    fn format_ipv4_cidr() {
        let lit = IntLiteral::masked(0x0a00_0000, 0xff00_0000, IntFormat::Ipv4);
        assert_eq!(format!("{}", TokenKind::MaskedInteger(lit)), "10.0.0.0/8");
    }

    #[test]
    fn format_ipv4_non_cidr_mask() {
        let lit = IntLiteral::masked(0x0a00_0001, 0xff00_00ff, IntFormat::Ipv4);
        assert_eq!(format!("{}", TokenKind::MaskedInteger(lit)), "10.0.0.1/255.0.0.255");
    }

    #[test]
    fn format_ethernet() {
        let lit = IntLiteral::new(0x0001_0203_0405, IntFormat::Ethernet);
        assert_eq!(format!("{}", TokenKind::Integer(lit)), "00:01:02:03:04:05");
    }

    #[test]
    fn format_ipv6_compressed() {
        let lit = IntLiteral::new(1, IntFormat::Ipv6);
        assert_eq!(format!("{}", TokenKind::Integer(lit)), "::1");
    }

    #[test]
    fn format_string_escapes() {
        let kind = TokenKind::String("a\"b\\c\n".to_string());
        assert_eq!(format!("{kind}"), r#""a\"b\\c\n""#);
    }

    #[test]
    fn end_formats_empty() {
        assert_eq!(format!("{}", TokenKind::End), "");
    }
}
