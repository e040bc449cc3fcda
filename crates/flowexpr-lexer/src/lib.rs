//! Hand-written lexer for the flowexpr match-expression language.
//!
//! The lexer turns a single input buffer into successive [`Token`]s,
//! producing [`TokenKind::End`] at termination and thereafter (it is
//! restartable: calling [`Lexer::next_token`] past the end keeps returning
//! `End`). Lexical errors surface as [`TokenKind::Error`] tokens carrying a
//! descriptive message; the lexer skips the offending text and continues.
//!
//! # Literals
//!
//! Numeric literals keep their preferred display format so formatting is
//! lossless: decimal, hexadecimal (`0x…`), dotted-quad IPv4, colon-hex IPv6
//! (including `::` compression), and `xx:xx:xx:xx:xx:xx` Ethernet addresses
//! all share the 128-bit integer path. A literal may carry a mask, written
//! `V/M`, or `V/LEN` for IPv4/IPv6 values where a decimal `LEN` synthesizes
//! a CIDR prefix mask.
//!
//! # Usage
//!
//! ```
//! use flowexpr_lexer::Lexer;
//! use flowexpr_token::TokenKind;
//!
//! let mut lexer = Lexer::new("tcp.dst == {80, 443}");
//! assert_eq!(lexer.next_token().kind, TokenKind::Id("tcp.dst".into()));
//! assert_eq!(lexer.next_token().kind, TokenKind::Eq);
//! assert_eq!(lexer.next_token().kind, TokenKind::LCurly);
//! ```

#![warn(clippy::all)]
#![allow(
    clippy::too_many_lines,
    clippy::module_name_repetitions,
    clippy::cast_possible_truncation,
    clippy::must_use_candidate,
    clippy::missing_errors_doc,
    clippy::missing_panics_doc,
    clippy::match_same_arms,
    clippy::redundant_else,
    clippy::uninlined_format_args
)]

use std::net::{Ipv4Addr, Ipv6Addr};

use memchr::memchr2;

pub use flowexpr_token::{IntFormat, IntLiteral, Token, TokenKind};
use flowexpr_token::prefix_mask;

/// Streaming lexer over a single input buffer.
pub struct Lexer<'a> {
    input: &'a str,
    /// Cached input bytes for faster access
    input_bytes: &'a [u8],
    position: usize,
    /// Start position of the current token
    token_start: usize,
}

impl<'a> Lexer<'a> {
    /// Create a new lexer for the given input
    pub fn new(input: &'a str) -> Self {
        Self { input, input_bytes: input.as_bytes(), position: 0, token_start: 0 }
    }

    /// Byte offset of the next character to be lexed.
    pub fn position(&self) -> usize {
        self.position
    }

    /// Get the next token from the input.
    ///
    /// Returns `TokenKind::End` once the input is exhausted, and keeps
    /// returning it on subsequent calls.
    pub fn next_token(&mut self) -> Token {
        self.skip_whitespace();
        self.token_start = self.position;

        let Some(&b) = self.input_bytes.get(self.position) else {
            return self.token(TokenKind::End);
        };

        match b {
            b'(' => self.single(TokenKind::LParen),
            b')' => self.single(TokenKind::RParen),
            b'{' => self.single(TokenKind::LCurly),
            b'}' => self.single(TokenKind::RCurly),
            b'[' => self.single(TokenKind::LSquare),
            b']' => self.single(TokenKind::RSquare),
            b',' => self.single(TokenKind::Comma),
            b';' => self.single(TokenKind::Semicolon),
            b'=' => {
                self.position += 1;
                if self.eat(b'=') { self.token(TokenKind::Eq) } else { self.token(TokenKind::Equals) }
            }
            b'!' => {
                self.position += 1;
                if self.eat(b'=') { self.token(TokenKind::Ne) } else { self.token(TokenKind::Not) }
            }
            b'<' => {
                self.position += 1;
                if self.eat(b'=') { self.token(TokenKind::Le) } else { self.token(TokenKind::Lt) }
            }
            b'>' => {
                self.position += 1;
                if self.eat(b'=') { self.token(TokenKind::Ge) } else { self.token(TokenKind::Gt) }
            }
            b'&' => {
                self.position += 1;
                if self.eat(b'&') { self.token(TokenKind::LogAnd) } else { self.token(TokenKind::Ampersand) }
            }
            b'|' => {
                self.position += 1;
                if self.eat(b'|') { self.token(TokenKind::LogOr) } else { self.token(TokenKind::Pipe) }
            }
            b'.' => {
                self.position += 1;
                if self.eat(b'.') {
                    self.token(TokenKind::DotDot)
                } else {
                    self.error("unexpected `.`".to_string())
                }
            }
            b':' => self.lex_colon(),
            b'"' => self.lex_string(),
            b'0'..=b'9' => self.lex_number(),
            b'a'..=b'f' | b'A'..=b'F' => {
                // Hex letters may begin an address literal (fe80::1); an
                // identifier otherwise.
                if self.number_run_has_colon() {
                    self.lex_number()
                } else {
                    self.lex_id()
                }
            }
            b'g'..=b'z' | b'G'..=b'Z' | b'_' => self.lex_id(),
            _ => {
                let c = self.current_char();
                self.position += c.len_utf8();
                self.error(format!("unexpected character `{c}`"))
            }
        }
    }

    fn skip_whitespace(&mut self) {
        while let Some(&b) = self.input_bytes.get(self.position) {
            if b.is_ascii_whitespace() {
                self.position += 1;
            } else {
                break;
            }
        }
    }

    fn current_char(&self) -> char {
        self.input[self.position..].chars().next().unwrap_or('\0')
    }

    fn peek(&self, ahead: usize) -> u8 {
        self.input_bytes.get(self.position + ahead).copied().unwrap_or(0)
    }

    fn eat(&mut self, expected: u8) -> bool {
        if self.input_bytes.get(self.position) == Some(&expected) {
            self.position += 1;
            true
        } else {
            false
        }
    }

    fn single(&mut self, kind: TokenKind) -> Token {
        self.position += 1;
        self.token(kind)
    }

    fn token(&self, kind: TokenKind) -> Token {
        Token::new(kind, &self.input[self.token_start..self.position], self.token_start, self.position)
    }

    fn error(&self, message: String) -> Token {
        self.token(TokenKind::Error(message))
    }

    /// `::` begins an IPv6 literal when an address follows (`::1`); a bare
    /// `::` is punctuation. A lone `:` is not a token.
    fn lex_colon(&mut self) -> Token {
        if self.peek(1) != b':' {
            self.position += 1;
            return self.error("unexpected `:`".to_string());
        }
        if is_number_byte(self.peek(2)) {
            self.lex_number()
        } else {
            self.position += 2;
            self.token(TokenKind::DoubleColon)
        }
    }

    /// Whether the maximal numeric-character run at the cursor contains a
    /// colon, i.e. looks like a MAC or IPv6 address rather than an
    /// identifier.
    fn number_run_has_colon(&self) -> bool {
        let mut pos = self.position;
        while let Some(&b) = self.input_bytes.get(pos) {
            if b == b':' {
                return true;
            }
            // An identifier character other than hex digits or dots ends
            // the numeric interpretation.
            if !matches!(b, b'0'..=b'9' | b'a'..=b'f' | b'A'..=b'F' | b'.') {
                return false;
            }
            // A `..` is the bit-range operator, never part of a number.
            if b == b'.' && self.input_bytes.get(pos + 1) == Some(&b'.') {
                return false;
            }
            pos += 1;
        }
        false
    }

    /// Consume the maximal run of characters that can appear inside a
    /// numeric literal, stopping before `..`.
    fn scan_number_text(&mut self) -> &'a str {
        let start = self.position;
        while let Some(&b) = self.input_bytes.get(self.position) {
            if !is_number_byte(b) {
                break;
            }
            if b == b'.' && self.input_bytes.get(self.position + 1) == Some(&b'.') {
                break;
            }
            self.position += 1;
        }
        &self.input[start..self.position]
    }

    fn lex_number(&mut self) -> Token {
        let value = match self.parse_integer() {
            Ok(lit) => lit,
            Err(msg) => return self.error(msg),
        };

        if !self.eat(b'/') {
            return self.token(TokenKind::Integer(value));
        }

        let mask = match self.parse_integer() {
            Ok(lit) => lit,
            Err(msg) => return self.error(msg),
        };
        match apply_mask(&value, &mask) {
            Ok(lit) => self.token(TokenKind::MaskedInteger(lit)),
            Err(msg) => self.error(msg),
        }
    }

    /// Parse one unmasked integer at the cursor, classifying it as decimal,
    /// hex, IPv4, IPv6, or Ethernet by shape.
    fn parse_integer(&mut self) -> Result<IntLiteral, String> {
        let text = self.scan_number_text();
        if text.is_empty() {
            return Err("expecting number".to_string());
        }

        if text.contains(':') {
            if let Some(value) = parse_ethernet(text) {
                return Ok(IntLiteral::new(value, IntFormat::Ethernet));
            }
            return match text.parse::<Ipv6Addr>() {
                Ok(addr) => Ok(IntLiteral::new(u128::from(addr), IntFormat::Ipv6)),
                Err(_) => Err(format!("`{text}` is not a valid address")),
            };
        }
        if text.contains('.') {
            return match text.parse::<Ipv4Addr>() {
                Ok(addr) => Ok(IntLiteral::new(u128::from(u32::from(addr)), IntFormat::Ipv4)),
                Err(_) => Err(format!("`{text}` is not a valid IPv4 address")),
            };
        }
        if let Some(digits) = text.strip_prefix("0x").or_else(|| text.strip_prefix("0X")) {
            if digits.is_empty() {
                return Err("hexadecimal constant has no digits".to_string());
            }
            let significant = digits.trim_start_matches('0');
            if significant.len() > 32 {
                return Err("constant overflows 128 bits".to_string());
            }
            return match u128::from_str_radix(digits, 16) {
                Ok(value) => Ok(IntLiteral::new(value, IntFormat::Hex)),
                Err(_) => Err(format!("`{text}` is not a valid number")),
            };
        }
        if text.bytes().all(|b| b.is_ascii_digit()) {
            return match text.parse::<u128>() {
                Ok(value) => Ok(IntLiteral::new(value, IntFormat::Decimal)),
                Err(_) => Err("constant overflows 128 bits".to_string()),
            };
        }
        Err(format!("`{text}` is not a valid number"))
    }

    fn lex_string(&mut self) -> Token {
        debug_assert_eq!(self.input_bytes[self.position], b'"');
        self.position += 1;
        let mut value = String::new();
        loop {
            let rest = &self.input_bytes[self.position..];
            let Some(idx) = memchr2(b'"', b'\\', rest) else {
                self.position = self.input_bytes.len();
                return self.error("unterminated string".to_string());
            };
            value.push_str(&self.input[self.position..self.position + idx]);
            self.position += idx;
            if self.input_bytes[self.position] == b'"' {
                self.position += 1;
                return self.token(TokenKind::String(value));
            }
            // Backslash escape.
            self.position += 1;
            match self.input_bytes.get(self.position).copied() {
                Some(b'"') => value.push('"'),
                Some(b'\\') => value.push('\\'),
                Some(b'n') => value.push('\n'),
                Some(b'r') => value.push('\r'),
                Some(b't') => value.push('\t'),
                Some(b'0') => value.push('\0'),
                Some(b'x') => {
                    let hi = self.peek(1);
                    let lo = self.peek(2);
                    let (Some(hi), Some(lo)) =
                        ((hi as char).to_digit(16), (lo as char).to_digit(16))
                    else {
                        self.skip_to_string_end();
                        return self.error("invalid `\\x` escape".to_string());
                    };
                    self.position += 2;
                    match char::from_u32(hi * 16 + lo) {
                        Some(c) => value.push(c),
                        None => {
                            self.skip_to_string_end();
                            return self.error("invalid `\\x` escape".to_string());
                        }
                    }
                }
                Some(b) => {
                    let c = b as char;
                    self.skip_to_string_end();
                    return self.error(format!("invalid escape `\\{c}`"));
                }
                None => {
                    return self.error("unterminated string".to_string());
                }
            }
            self.position += 1;
        }
    }

    /// After a bad escape, consume up to the closing quote so lexing can
    /// continue with the following token.
    fn skip_to_string_end(&mut self) {
        while let Some(&b) = self.input_bytes.get(self.position) {
            self.position += 1;
            if b == b'"' {
                break;
            }
        }
    }

    fn lex_id(&mut self) -> Token {
        let start = self.position;
        self.position += 1;
        while let Some(&b) = self.input_bytes.get(self.position) {
            match b {
                b'a'..=b'z' | b'A'..=b'Z' | b'0'..=b'9' | b'_' => self.position += 1,
                // A dot joins name segments (`tcp.dst`) but only when a
                // segment character follows; `..` stays a separate token.
                b'.' if matches!(
                    self.input_bytes.get(self.position + 1),
                    Some(b'a'..=b'z' | b'A'..=b'Z' | b'0'..=b'9' | b'_')
                ) =>
                {
                    self.position += 1;
                }
                _ => break,
            }
        }
        self.token(TokenKind::Id(self.input[start..self.position].to_string()))
    }
}

fn is_number_byte(b: u8) -> bool {
    matches!(b, b'0'..=b'9' | b'a'..=b'f' | b'A'..=b'F' | b'x' | b'X' | b':' | b'.')
}

/// `xx:xx:xx:xx:xx:xx` with exactly two hex digits per group.
fn parse_ethernet(text: &str) -> Option<u128> {
    let groups: Vec<&str> = text.split(':').collect();
    if groups.len() != 6 {
        return None;
    }
    let mut value = 0u128;
    for group in groups {
        if group.len() != 2 {
            return None;
        }
        let octet = u8::from_str_radix(group, 16).ok()?;
        value = value << 8 | u128::from(octet);
    }
    Some(value)
}

/// Combine a value literal with its mask literal, synthesizing CIDR prefix
/// masks for address-formatted values.
fn apply_mask(value: &IntLiteral, mask: &IntLiteral) -> Result<IntLiteral, String> {
    let mask_bits = match (value.format, mask.format) {
        (IntFormat::Ipv4, IntFormat::Decimal) => {
            if mask.value > 32 {
                return Err(format!("IPv4 prefix length {} is greater than 32", mask.value));
            }
            prefix_mask(32, mask.value as u8)
        }
        (IntFormat::Ipv6, IntFormat::Decimal) => {
            if mask.value > 128 {
                return Err(format!("IPv6 prefix length {} is greater than 128", mask.value));
            }
            prefix_mask(128, mask.value as u8)
        }
        _ => mask.value,
    };
    if mask_bits == 0 {
        return Err("zero mask is not allowed".to_string());
    }
    if value.value & !mask_bits != 0 {
        return Err("value contains unmasked 1-bits".to_string());
    }
    Ok(IntLiteral::masked(value.value, mask_bits, value.format))
}

impl Iterator for Lexer<'_> {
    type Item = Token;

    fn next(&mut self) -> Option<Self::Item> {
        let token = self.next_token();
        if token.kind == TokenKind::End { None } else { Some(token) }
    }
}
