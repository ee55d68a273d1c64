//! Raw amount <-> decimal string conversion.

use crate::{error::UnitsError, ledger::Amount};

/// Renders `raw` with `decimals` fractional digits, trimming trailing zeros.
pub fn format_units(raw: Amount, decimals: u8) -> String {
    let Some(scale) = 10u128.checked_pow(decimals.into()) else {
        return format!("0.{:0>width$}", raw, width = decimals as usize)
            .trim_end_matches('0')
            .trim_end_matches('.')
            .to_string();
    };
    let whole = raw / scale;
    let frac = raw % scale;
    if frac == 0 {
        return whole.to_string();
    }
    let frac = format!("{:0>width$}", frac, width = decimals as usize);
    format!("{whole}.{}", frac.trim_end_matches('0'))
}

/// Parses a decimal string such as `"1.5"` into raw units.
pub fn parse_units(input: &str, decimals: u8) -> Result<Amount, UnitsError> {
    let input = input.trim().replace('_', "");
    if input.is_empty() || input == "." {
        return Err(UnitsError::Empty);
    }
    let (whole, frac) = input.split_once('.').unwrap_or((input.as_str(), ""));
    if let Some(bad) = whole.chars().chain(frac.chars()).find(|c| !c.is_ascii_digit()) {
        return Err(UnitsError::InvalidDigit(bad));
    }
    if frac.len() > decimals as usize {
        return Err(UnitsError::TooManyDecimals { max: decimals });
    }
    let scale = 10u128
        .checked_pow(decimals.into())
        .ok_or(UnitsError::Overflow)?;
    let whole: Amount = if whole.is_empty() {
        0
    } else {
        whole.parse().map_err(|_| UnitsError::Overflow)?
    };
    let frac_scaled: Amount = if frac.is_empty() {
        0
    } else {
        let digits: Amount = frac.parse().map_err(|_| UnitsError::Overflow)?;
        digits * 10u128.pow((decimals as usize - frac.len()) as u32)
    };
    whole
        .checked_mul(scale)
        .and_then(|w| w.checked_add(frac_scaled))
        .ok_or(UnitsError::Overflow)
}
