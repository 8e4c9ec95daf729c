//! Symbol syntax → market venue classification.

use finmux_common::Market;

/// Classify a symbol into its market venue.
///
/// Suffix rules win over digit-prefix rules, and matching is case-insensitive
/// on the suffix. The symbol is taken exactly as routed: no trimming, so any
/// whitespace defeats the letter and digit rules.
#[must_use]
pub fn classify_symbol(symbol: &str) -> Market {
    if let Some(market) = suffix_market(symbol) {
        return market;
    }

    let bytes = symbol.as_bytes();
    if (1..=5).contains(&bytes.len()) && bytes.iter().all(u8::is_ascii_uppercase) {
        return Market::Us;
    }

    if !bytes.is_empty() && bytes.iter().all(u8::is_ascii_digit) {
        if bytes.len() == 5 {
            return Market::Hk;
        }
        if bytes.len() == 6 {
            return match bytes[0] {
                b'6' | b'5' => Market::Sh,
                b'0' | b'2' | b'3' => Market::Sz,
                b'4' | b'8' => Market::Bj,
                _ => Market::Unknown,
            };
        }
    }

    Market::Unknown
}

fn suffix_market(symbol: &str) -> Option<Market> {
    let (_, suffix) = symbol.rsplit_once('.')?;
    match suffix.to_ascii_uppercase().as_str() {
        "SH" | "SS" => Some(Market::Sh),
        "SZ" => Some(Market::Sz),
        "BJ" => Some(Market::Bj),
        "HK" => Some(Market::Hk),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn suffix_rules() {
        assert_eq!(classify_symbol("601899.SH"), Market::Sh);
        assert_eq!(classify_symbol("600941.SS"), Market::Sh);
        assert_eq!(classify_symbol("000001.SZ"), Market::Sz);
        assert_eq!(classify_symbol("430047.BJ"), Market::Bj);
        assert_eq!(classify_symbol("0700.HK"), Market::Hk);
    }

    #[test]
    fn suffix_is_case_insensitive() {
        assert_eq!(classify_symbol("601899.sh"), Market::Sh);
        assert_eq!(classify_symbol("0700.hk"), Market::Hk);
    }

    #[test]
    fn suffix_wins_over_digit_prefix() {
        // A Shenzhen-looking code with an explicit SH suffix routes to SH.
        assert_eq!(classify_symbol("000001.SH"), Market::Sh);
    }

    #[test]
    fn bare_uppercase_letters_are_us() {
        assert_eq!(classify_symbol("A"), Market::Us);
        assert_eq!(classify_symbol("AAPL"), Market::Us);
        assert_eq!(classify_symbol("GOOGL"), Market::Us);
    }

    #[test]
    fn lowercase_or_long_tickers_are_unknown() {
        assert_eq!(classify_symbol("aapl"), Market::Unknown);
        assert_eq!(classify_symbol("ABCDEF"), Market::Unknown);
        assert_eq!(classify_symbol("BRK.A"), Market::Unknown);
    }

    #[test]
    fn digit_prefix_fallbacks() {
        assert_eq!(classify_symbol("601899"), Market::Sh);
        assert_eq!(classify_symbol("510300"), Market::Sh);
        assert_eq!(classify_symbol("000001"), Market::Sz);
        assert_eq!(classify_symbol("200011"), Market::Sz);
        assert_eq!(classify_symbol("300750"), Market::Sz);
        assert_eq!(classify_symbol("430047"), Market::Bj);
        assert_eq!(classify_symbol("830799"), Market::Bj);
        assert_eq!(classify_symbol("700000"), Market::Unknown);
    }

    #[test]
    fn five_digit_codes_are_hongkong() {
        assert_eq!(classify_symbol("00700"), Market::Hk);
        assert_eq!(classify_symbol("09988"), Market::Hk);
    }

    #[test]
    fn whitespace_is_not_trimmed() {
        assert_eq!(classify_symbol(" AAPL"), Market::Unknown);
        assert_eq!(classify_symbol("AAPL "), Market::Unknown);
        assert_eq!(classify_symbol("601899 "), Market::Unknown);
    }

    #[test]
    fn empty_and_odd_symbols_are_unknown() {
        assert_eq!(classify_symbol(""), Market::Unknown);
        assert_eq!(classify_symbol("1234567"), Market::Unknown);
        assert_eq!(classify_symbol("601899.XX"), Market::Unknown);
    }
}
