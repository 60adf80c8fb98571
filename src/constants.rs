/// Solana token mint addresses
pub mod mints {
    /// Wrapped SOL (native pseudo-address used for swap routing)
    pub const SOL: &str = "So11111111111111111111111111111111111111112";
}

/// Log markers emitted by programs and matched by the heuristic classifier
pub mod markers {
    /// Swap instruction log line
    pub const SWAP_INSTRUCTION: &str = "Instruction: Swap";
    /// Lowercase wrapped-SOL mention
    pub const WSOL: &str = "wsol";
    /// Origin marker
    pub const FROM: &str = "from:";
    /// Destination marker
    pub const TO: &str = "to:";
    /// Native transfer prefix (`Transfer: <amount> SOL`)
    pub const TRANSFER_PREFIX: &str = "Transfer: ";
    /// Native transfer word
    pub const TRANSFER: &str = "Transfer";
    /// Lamport unit suffix
    pub const LAMPORTS: &str = "lamports";
}

/// Lamports per SOL
pub const LAMPORTS_PER_SOL: u64 = 1_000_000_000;

/// Base58 alphabet (Bitcoin ordering, no 0/O/I/l)
pub const BASE58_ALPHABET: &str = "123456789ABCDEFGHJKLMNPQRSTUVWXYZabcdefghijkmnopqrstuvwxyz";
