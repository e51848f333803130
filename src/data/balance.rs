use num_bigint::BigUint;

/// Default decimals when a token does not answer `decimals()`.
pub const DEFAULT_DECIMALS: u8 = 18;

/// Render a base-unit integer as `raw / 10^decimals`, truncated, without
/// trailing fractional zeros.
///
/// Works on arbitrary-precision integers; balances near 2^256 come through
/// exactly. Input that is not a non-negative base-10 integer, or a negative
/// `decimals`, is returned unchanged.
pub fn format_units(raw: &str, decimals: i64) -> String {
    let Ok(decimals) = u32::try_from(decimals) else {
        return raw.to_string();
    };
    let Some(value) = parse_decimal(raw) else {
        return raw.to_string();
    };
    if decimals == 0 {
        return raw.to_string();
    }

    let divisor = BigUint::from(10u32).pow(decimals);
    let whole = &value / &divisor;
    let fraction = &value % &divisor;

    if fraction.bits() == 0 {
        return whole.to_string();
    }

    let digits = fraction.to_string();
    let width = decimals as usize;
    let padded = format!("{}{digits}", "0".repeat(width.saturating_sub(digits.len())));
    format!("{whole}.{}", padded.trim_end_matches('0'))
}

/// Parse a "0x"-prefixed hex quantity (as returned by `eth_getBalance`) into
/// a big integer.
pub fn parse_quantity(hex: &str) -> Option<BigUint> {
    let digits = hex.trim().strip_prefix("0x")?;
    if digits.is_empty() {
        return Some(BigUint::default());
    }
    BigUint::parse_bytes(digits.as_bytes(), 16)
}

fn parse_decimal(raw: &str) -> Option<BigUint> {
    let trimmed = raw.trim();
    if trimmed.is_empty() || !trimmed.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    BigUint::parse_bytes(trimmed.as_bytes(), 10)
}
