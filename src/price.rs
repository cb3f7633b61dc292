use regex::Regex;
use rust_decimal::Decimal;
use std::str::FromStr;
use std::sync::LazyLock;

static NON_PRICE_CHARS: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[^\d.]").expect("static price regex"));

/// Reduces scraped element text to a price.
///
/// Every character that is not an ASCII digit or `.` is dropped, so `"$1,299.99 CAD"`
/// becomes `1299.99`. Returns `None` when nothing parseable is left. The result is
/// rounded to two decimal places and can never be negative.
pub fn parse_price(raw: &str) -> Option<Decimal> {
    let cleaned = NON_PRICE_CHARS.replace_all(raw, "");
    if cleaned.is_empty() || !cleaned.chars().any(|c| c.is_ascii_digit()) {
        return None;
    }

    Decimal::from_str(&cleaned).ok().map(|price| price.round_dp(2))
}

/// A fetched price fires an alert when it is at or below the owner's target.
pub fn meets_target(price: Decimal, target: Option<Decimal>) -> bool {
    target.is_some_and(|target| price <= target)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case("$19.99 CAD", Decimal::new(1999, 2))]
    #[case("$1,299.99", Decimal::new(129999, 2))]
    #[case("  42 ", Decimal::new(42, 0))]
    #[case("Price: 7.5", Decimal::new(75, 1))]
    #[case("€ 10.456", Decimal::new(1046, 2))]
    #[case(".99", Decimal::new(99, 2))]
    #[case("-$5.00", Decimal::new(500, 2))]
    fn test_parse_price(#[case] raw: &str, #[case] expected: Decimal) {
        assert_eq!(parse_price(raw), Some(expected));
    }

    #[rstest]
    #[case("")]
    #[case("Out of stock")]
    #[case("...")]
    #[case("1.2.3")]
    #[case("Was $25.00 now $19.99")]
    fn test_parse_price_unparseable(#[case] raw: &str) {
        assert_eq!(parse_price(raw), None);
    }

    #[test]
    fn test_meets_target_is_inclusive() {
        let target = Some(Decimal::new(2000, 2));

        assert!(meets_target(Decimal::new(2000, 2), target));
        assert!(meets_target(Decimal::new(1999, 2), target));
        assert!(!meets_target(Decimal::new(2001, 2), target));
    }

    #[test]
    fn test_meets_target_without_target() {
        assert!(!meets_target(Decimal::ZERO, None));
    }
}
