//! Address normalization and the truncated `0x1234..5678` form some node logs print.

use std::sync::LazyLock;

use regex::Regex;

/// Length of a full `0x`-prefixed 20-byte address
pub const FULL_ADDRESS_LEN: usize = 42;

static TRUNCATED_ADDRESS: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^0x[a-fA-F0-9]{4,6}\.\.[a-fA-F0-9]{4}$").expect("static pattern compiles")
});

/// Lowercase an address for use as a map key
pub fn normalize(address: &str) -> String {
    address.trim().to_ascii_lowercase()
}

/// Whether `address` matches the truncated log form
pub fn is_truncated(address: &str) -> bool {
    TRUNCATED_ADDRESS.is_match(address)
}

/// Whether `address` looks like a complete address worth registering for expansion
pub fn is_full(address: &str) -> bool {
    address.len() >= FULL_ADDRESS_LEN && address.starts_with("0x")
}

/// Truncated form of a full address: first six chars, `..`, last four.
/// Short inputs are returned unchanged.
pub fn truncate(address: &str) -> String {
    if address.len() < 10 || !address.is_ascii() {
        return address.to_string();
    }
    format!("{}..{}", &address[..6], &address[address.len() - 4..])
}
