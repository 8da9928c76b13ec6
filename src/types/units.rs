//! Unit Conversion Utilities
//!
//! Helpers for converting between smallest units and decimal token amounts.

/// Decimals of the bridged stablecoin
pub const TOKEN_DECIMALS: u32 = 6;

/// Format a smallest-unit amount as a decimal string (e.g. 1500000 -> "1.500000")
pub fn format_units(amount: u128, decimals: u32) -> String {
    if decimals == 0 {
        return amount.to_string();
    }
    let scale = 10u128.pow(decimals);
    format!(
        "{}.{:0width$}",
        amount / scale,
        amount % scale,
        width = decimals as usize
    )
}

/// Human-readable amount, e.g. 1000000 -> "1,000,000 units (1.000000)"
pub fn units_to_display(amount: u128) -> String {
    format!(
        "{} units ({})",
        format_with_commas(amount),
        format_units(amount, TOKEN_DECIMALS)
    )
}

/// Parse a decimal token amount into smallest units
///
/// Rejects more fractional digits than `decimals` rather than rounding.
pub fn parse_units(s: &str, decimals: u32) -> Option<u128> {
    let cleaned = s.trim().replace(['_', ','], "");
    if cleaned.is_empty() {
        return None;
    }

    let (whole, frac) = match cleaned.split_once('.') {
        Some((w, f)) => (w, f),
        None => (cleaned.as_str(), ""),
    };

    if frac.len() > decimals as usize {
        return None;
    }
    if !whole.chars().all(|c| c.is_ascii_digit()) || !frac.chars().all(|c| c.is_ascii_digit()) {
        return None;
    }

    let whole: u128 = if whole.is_empty() { 0 } else { whole.parse().ok()? };
    let padded = format!("{:0<width$}", frac, width = decimals as usize);
    let frac: u128 = if padded.is_empty() { 0 } else { padded.parse().ok()? };

    whole
        .checked_mul(10u128.pow(decimals))?
        .checked_add(frac)
}

/// Parse a raw smallest-unit amount
pub fn parse_amount(s: &str) -> Option<u128> {
    s.trim().replace([',', '_'], "").parse().ok()
}

fn format_with_commas(n: u128) -> String {
    let s = n.to_string();
    let mut result = String::new();
    let chars: Vec<char> = s.chars().collect();

    for (i, c) in chars.iter().enumerate() {
        if i > 0 && (chars.len() - i) % 3 == 0 {
            result.push(',');
        }
        result.push(*c);
    }

    result
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_units() {
        assert_eq!(format_units(0, 6), "0.000000");
        assert_eq!(format_units(1, 6), "0.000001");
        assert_eq!(format_units(1_500_000, 6), "1.500000");
        assert_eq!(format_units(42, 0), "42");
    }

    #[test]
    fn test_parse_units() {
        assert_eq!(parse_units("1", 6), Some(1_000_000));
        assert_eq!(parse_units("1.5", 6), Some(1_500_000));
        assert_eq!(parse_units(".000001", 6), Some(1));
        assert_eq!(parse_units("1,000.25", 6), Some(1_000_250_000));
        assert_eq!(parse_units("1.0000001", 6), None);
        assert_eq!(parse_units("abc", 6), None);
        assert_eq!(parse_units("", 6), None);
    }

    #[test]
    fn test_display_format() {
        let display = units_to_display(1_000_000);
        assert!(display.contains("1,000,000"));
        assert!(display.contains("(1.000000)"));
    }

    #[test]
    fn test_parse_amount() {
        assert_eq!(parse_amount("1000"), Some(1000));
        assert_eq!(parse_amount("1_000_000"), Some(1_000_000));
        assert_eq!(parse_amount(" 42 "), Some(42));
        assert_eq!(parse_amount("-1"), None);
    }
}
