//! Numeric normalizer for dirty financial cells.
//!
//! Parse failure is a value (`None`), never an error: callers decide whether
//! a missing number is tolerable.

use polars::prelude::AnyValue;

const CURRENCY_SYMBOLS: [char; 4] = ['$', '€', '£', '¥'];

/// Parse a dataframe cell into a finite float.
///
/// Numeric cells pass through, text cells go through [`parse_text`], nulls
/// and every other kind of cell yield `None`.
pub fn parse_number(value: &AnyValue<'_>) -> Option<f64> {
    let parsed = match value {
        AnyValue::Float64(v) => *v,
        AnyValue::Float32(v) => f64::from(*v),
        AnyValue::Int64(v) => *v as f64,
        AnyValue::Int32(v) => f64::from(*v),
        AnyValue::Int16(v) => f64::from(*v),
        AnyValue::Int8(v) => f64::from(*v),
        AnyValue::UInt64(v) => *v as f64,
        AnyValue::UInt32(v) => f64::from(*v),
        AnyValue::UInt16(v) => f64::from(*v),
        AnyValue::UInt8(v) => f64::from(*v),
        AnyValue::String(s) => return parse_text(s),
        AnyValue::StringOwned(s) => return parse_text(s.as_str()),
        _ => return None,
    };
    parsed.is_finite().then_some(parsed)
}

/// Parse raw text such as `"$1,234.50"`, `"(12.3)"` or `"4.5%"`.
pub fn parse_text(text: &str) -> Option<f64> {
    let trimmed = text.trim();
    if trimmed.is_empty() {
        return None;
    }

    let cleaned: String = trimmed
        .chars()
        .filter(|c| *c != ',' && *c != '%' && !c.is_whitespace() && !CURRENCY_SYMBOLS.contains(c))
        .collect();

    // Accounting negatives: every "(" reads as a minus sign, every ")" is dropped.
    let cleaned = cleaned.replace('(', "-").replace(')', "");

    let value: f64 = cleaned.parse().ok()?;
    value.is_finite().then_some(value)
}

#[cfg(test)]
mod tests {
    use super::*;
    use polars::prelude::PlSmallStr;

    #[test]
    fn strips_currency_and_thousands_separators() {
        assert_eq!(parse_text("$1,234.50"), Some(1234.50));
        assert_eq!(parse_text(" €2,000 "), Some(2000.0));
        assert_eq!(parse_text("£ 7"), Some(7.0));
    }

    #[test]
    fn parenthesized_values_are_negative() {
        assert_eq!(parse_text("(12.3)"), Some(-12.3));
        assert_eq!(parse_text("($1,000.00)"), Some(-1000.0));
        assert_eq!(parse_text("(12.3%)"), Some(-12.3));
    }

    #[test]
    fn stray_parentheses_follow_the_same_rule() {
        assert_eq!(parse_text("12.3)"), Some(12.3));
        // "(-5)" becomes "--5", which is not a number.
        assert_eq!(parse_text("(-5)"), None);
        assert_eq!(parse_text("-(5)"), None);
    }

    #[test]
    fn percent_sign_is_dropped_not_scaled() {
        assert_eq!(parse_text("4.25%"), Some(4.25));
    }

    #[test]
    fn blank_and_garbage_are_none() {
        assert_eq!(parse_text(""), None);
        assert_eq!(parse_text("   "), None);
        assert_eq!(parse_text("N/A"), None);
        assert_eq!(parse_text("--"), None);
    }

    #[test]
    fn non_finite_text_is_none() {
        assert_eq!(parse_text("nan"), None);
        assert_eq!(parse_text("inf"), None);
    }

    #[test]
    fn numeric_cells_pass_through() {
        assert_eq!(parse_number(&AnyValue::Float64(1.5)), Some(1.5));
        assert_eq!(parse_number(&AnyValue::Int64(-42)), Some(-42.0));
        assert_eq!(parse_number(&AnyValue::UInt32(7)), Some(7.0));
        assert_eq!(parse_number(&AnyValue::Float64(f64::NAN)), None);
    }

    #[test]
    fn null_and_text_cells() {
        assert_eq!(parse_number(&AnyValue::Null), None);
        assert_eq!(parse_number(&AnyValue::String("$1,234.50")), Some(1234.50));
        assert_eq!(
            parse_number(&AnyValue::StringOwned(PlSmallStr::from("(5)"))),
            Some(-5.0)
        );
        assert_eq!(parse_number(&AnyValue::Boolean(true)), None);
    }
}
