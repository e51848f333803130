/// True for "0x" followed by exactly 40 hex digits (either case).
pub fn is_address(value: &str) -> bool {
    match value.strip_prefix("0x") {
        Some(hex) => hex.len() == 40 && hex.chars().all(|c| c.is_ascii_hexdigit()),
        None => false,
    }
}

/// True for "0x" followed by an even number of hex digits ("0x" alone is empty data).
pub fn is_hex_data(value: &str) -> bool {
    match value.strip_prefix("0x") {
        Some(hex) => hex.len() % 2 == 0 && hex.chars().all(|c| c.is_ascii_hexdigit()),
        None => false,
    }
}

/// Lowercase an address for use as a map key. Returns None for anything that
/// is not a well-formed address.
pub fn normalize_address(value: &str) -> Option<String> {
    let trimmed = value.trim();
    if is_address(trimmed) {
        Some(trimmed.to_ascii_lowercase())
    } else {
        None
    }
}

/// Parse a "0x"-prefixed hex quantity such as an `eth_blockNumber` result.
pub fn parse_hex_u64(value: &str) -> Option<u64> {
    let hex = value.trim().strip_prefix("0x")?;
    if hex.is_empty() {
        return None;
    }
    u64::from_str_radix(hex, 16).ok()
}
