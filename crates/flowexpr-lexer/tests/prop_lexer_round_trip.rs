//! Property tests: the lexer terminates on arbitrary input, and formatting
//! any well-formed token produces text that re-lexes to an equivalent token.

use flowexpr_lexer::Lexer;
use flowexpr_token::{IntFormat, IntLiteral, TokenKind};
use proptest::prelude::*;

fn relex_one(text: &str) -> TokenKind {
    let mut lexer = Lexer::new(text);
    let token = lexer.next_token();
    assert_ne!(token.kind, TokenKind::End, "empty relex of {text:?}");
    assert_eq!(lexer.next_token().kind, TokenKind::End, "{text:?} should be one token");
    token.kind
}

proptest! {
    #![proptest_config(ProptestConfig {
        cases: 512,
        ..ProptestConfig::default()
    })]

    #[test]
    fn lexer_terminates_without_panics(s in ".{0,200}") {
        let mut lexer = Lexer::new(&s);
        // Every call consumes at least one byte or returns End, so this
        // bound can only be hit by a lexer bug.
        let max_expected_tokens = s.len() + 10;
        for _ in 0..max_expected_tokens {
            if lexer.next_token().kind == TokenKind::End {
                return Ok(());
            }
        }
        prop_assert!(false, "lexer failed to terminate on input of len={}", s.len());
    }

    #[test]
    fn integer_tokens_round_trip(value in any::<u128>(), which in 0u8..3) {
        let format = match which {
            0 => IntFormat::Decimal,
            1 => IntFormat::Hex,
            _ => IntFormat::Ipv6,
        };
        let kind = TokenKind::Integer(IntLiteral::new(value, format));
        let relexed = relex_one(&kind.to_string());
        prop_assert_eq!(relexed, kind);
    }

    #[test]
    fn ipv4_tokens_round_trip(value in any::<u32>()) {
        let kind = TokenKind::Integer(IntLiteral::new(u128::from(value), IntFormat::Ipv4));
        let relexed = relex_one(&kind.to_string());
        prop_assert_eq!(relexed, kind);
    }

    #[test]
    fn ethernet_tokens_round_trip(value in 0u64..(1 << 48)) {
        let kind = TokenKind::Integer(IntLiteral::new(u128::from(value), IntFormat::Ethernet));
        let relexed = relex_one(&kind.to_string());
        prop_assert_eq!(relexed, kind);
    }

    #[test]
    fn cidr_tokens_round_trip(value in any::<u32>(), len in 1u8..=32) {
        let mask = flowexpr_token::prefix_mask(32, len);
        let value = u128::from(value) & mask;
        let kind = TokenKind::MaskedInteger(IntLiteral::masked(value, mask, IntFormat::Ipv4));
        let relexed = relex_one(&kind.to_string());
        prop_assert_eq!(relexed, kind);
    }

    #[test]
    fn masked_hex_tokens_round_trip(mask in 1u128..=u128::MAX, value in any::<u128>()) {
        let value = value & mask;
        let kind = TokenKind::MaskedInteger(IntLiteral::masked(value, mask, IntFormat::Hex));
        let relexed = relex_one(&kind.to_string());
        prop_assert_eq!(relexed, kind);
    }

    #[test]
    fn string_tokens_round_trip(s in "[ -~]{0,40}") {
        let kind = TokenKind::String(s);
        let relexed = relex_one(&kind.to_string());
        prop_assert_eq!(relexed, kind);
    }
}
