//! Unit Conversion Utilities
//!
//! Ledger amounts are raw integers in base units. Everything presented to a
//! user, and every snapshot field, is in natural units.

/// Decimals of the stable-value reserve asset
pub const RESERVE_DECIMALS: u32 = 6;

/// Decimals of the token contract
pub const TOKEN_DECIMALS: u32 = 18;

/// 10^decimals as u128
pub fn scale(decimals: u32) -> u128 {
    10u128.pow(decimals)
}

/// Convert a natural amount to base units, rounding to nearest
///
/// Negative, NaN and infinite inputs map to zero.
pub fn to_base_units(amount: f64, decimals: u32) -> u128 {
    if !amount.is_finite() || amount <= 0.0 {
        return 0;
    }
    (amount * scale(decimals) as f64).round() as u128
}

/// Convert base units to a natural amount
pub fn from_base_units(raw: u128, decimals: u32) -> f64 {
    raw as f64 / scale(decimals) as f64
}

/// Whole token units to token base units
pub fn units_to_token_base(units: u64) -> u128 {
    units as u128 * scale(TOKEN_DECIMALS)
}

/// Token base units to whole units, truncating dust
pub fn token_base_to_units(raw: u128) -> u64 {
    (raw / scale(TOKEN_DECIMALS)).min(u64::MAX as u128) as u64
}

/// Format reserve base units for display, e.g. "1,250.50"
pub fn format_reserve(raw: u128) -> String {
    let whole = raw / scale(RESERVE_DECIMALS);
    let cents = (raw % scale(RESERVE_DECIMALS)) / 10u128.pow(RESERVE_DECIMALS - 2);
    format!("{}.{:02}", format_with_commas(whole), cents)
}

/// Format number with thousands separators
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

/// Parse a user-entered whole-unit quantity
pub fn parse_units(s: &str) -> Option<u64> {
    s.trim().replace([',', '_'], "").parse().ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_base_unit_conversion() {
        assert_eq!(to_base_units(1.0, RESERVE_DECIMALS), 1_000_000);
        assert_eq!(to_base_units(1.1, RESERVE_DECIMALS), 1_100_000);
        assert_eq!(to_base_units(0.0000004, RESERVE_DECIMALS), 0);
        assert_eq!(to_base_units(-3.0, RESERVE_DECIMALS), 0);
        assert_eq!(to_base_units(f64::NAN, RESERVE_DECIMALS), 0);
        assert_eq!(from_base_units(2_500_000, RESERVE_DECIMALS), 2.5);
    }

    #[test]
    fn test_token_units() {
        assert_eq!(units_to_token_base(3), 3_000_000_000_000_000_000);
        assert_eq!(token_base_to_units(3_500_000_000_000_000_000), 3);
    }

    #[test]
    fn test_display_format() {
        assert_eq!(format_reserve(1_250_500_000), "1,250.50");
        assert_eq!(format_reserve(999), "0.00");
        assert_eq!(format_reserve(0), "0.00");
    }

    #[test]
    fn test_parse_units() {
        assert_eq!(parse_units("1000"), Some(1000));
        assert_eq!(parse_units("1,000"), Some(1000));
        assert_eq!(parse_units(" 1_000 "), Some(1000));
        assert_eq!(parse_units("-1"), None);
        assert_eq!(parse_units("abc"), None);
    }
}
