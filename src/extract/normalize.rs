use once_cell::sync::Lazy;
use regex::Regex;

use super::SkipReason;

/// Newlines, thousands separators and currency symbols.
static NOISE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"[\r\n,$€£¥₹]").expect("noise pattern should compile"));

/// Strip everything that is not part of the number itself.
pub fn clean_number(raw: &str) -> String {
    NOISE.replace_all(raw, "").trim().to_string()
}

/// Parse a market-cap cell into a non-negative finite float.
pub fn parse_market_cap(raw: &str) -> Result<f64, SkipReason> {
    let cleaned = clean_number(raw);
    let value: f64 = cleaned.parse().map_err(|_| SkipReason::InvalidNumber {
        raw: raw.trim().to_string(),
    })?;
    if !value.is_finite() || value < 0.0 {
        return Err(SkipReason::OutOfRange { value });
    }
    Ok(value)
}
