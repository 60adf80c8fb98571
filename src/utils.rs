use crate::constants::{BASE58_ALPHABET, LAMPORTS_PER_SOL};
use rust_decimal::prelude::*;

/// Safely convert Lamports (u64) to SOL (f64) for display/DB
pub fn lamports_to_sol(lamports: u64) -> f64 {
    let lamports_dec = Decimal::from(lamports);
    let divisor = Decimal::from(LAMPORTS_PER_SOL);

    (lamports_dec / divisor).to_f64().unwrap_or(0.0)
}

/// Whether a character belongs to the base58 alphabet
pub fn is_base58_char(c: char) -> bool {
    c.is_ascii() && BASE58_ALPHABET.contains(c)
}

/// Shorten an address for chat output (`7xKX...sgAsU`)
pub fn short_address(address: &str) -> String {
    if address.len() <= 12 || !address.is_ascii() {
        return address.to_string();
    }
    format!("{}...{}", &address[..4], &address[address.len() - 4..])
}
