//! Number formatting for terminal tables and reports.

/// Missing values render as a dash.
pub const MISSING: &str = "-";

/// `1234567.891` with 2 decimals → `"1,234,567.89"` (sign not included).
fn grouped(value: f64, decimals: usize) -> String {
    let fixed = format!("{:.*}", decimals, value.abs());
    let (whole, frac) = match fixed.split_once('.') {
        Some((w, f)) => (w, Some(f)),
        None => (fixed.as_str(), None),
    };

    let mut out = String::with_capacity(fixed.len() + whole.len() / 3);
    for (i, ch) in whole.chars().enumerate() {
        if i > 0 && (whole.len() - i) % 3 == 0 {
            out.push(',');
        }
        out.push(ch);
    }
    if let Some(frac) = frac {
        out.push('.');
        out.push_str(frac);
    }
    out
}

/// Whole-dollar currency: `-$1,234`.
pub fn currency(value: f64) -> String {
    let sign = if value < 0.0 { "-" } else { "" };
    format!("{sign}${}", grouped(value, 0))
}

/// Plain number with thousands separators; `-` when missing.
pub fn number(value: Option<f64>, decimals: usize) -> String {
    match value {
        Some(v) => {
            let sign = if v < 0.0 { "-" } else { "" };
            format!("{sign}{}", grouped(v, decimals))
        }
        None => MISSING.to_string(),
    }
}

/// Signed delta: shares as `+1,234`, values as `+1,234.56`.
pub fn delta(value: Option<f64>, decimals: usize) -> String {
    match value {
        Some(v) => {
            let sign = if v < 0.0 { "-" } else { "+" };
            format!("{sign}{}", grouped(v, decimals))
        }
        None => MISSING.to_string(),
    }
}

pub fn share_delta(value: f64) -> String {
    delta(Some(value), 0)
}

pub fn value_delta(value: f64) -> String {
    delta(Some(value), 2)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn currency_has_no_decimals() {
        assert_eq!(currency(1234.4), "$1,234");
        assert_eq!(currency(-1234.0), "-$1,234");
        assert_eq!(currency(999.0), "$999");
        assert_eq!(currency(6_005_000.0), "$6,005,000");
    }

    #[test]
    fn deltas_are_signed() {
        assert_eq!(share_delta(1234.0), "+1,234");
        assert_eq!(share_delta(-50_000.0), "-50,000");
        assert_eq!(value_delta(1234.56), "+1,234.56");
        assert_eq!(value_delta(-0.5), "-0.50");
        assert_eq!(delta(None, 2), "-");
    }

    #[test]
    fn numbers_and_missing_values() {
        assert_eq!(number(Some(1_000_000.0), 0), "1,000,000");
        assert_eq!(number(Some(-15_000.0), 2), "-15,000.00");
        assert_eq!(number(Some(12.5), 2), "12.50");
        assert_eq!(number(None, 2), "-");
    }
}
