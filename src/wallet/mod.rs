//! Sweep account identity
//!
//! Derives the account keypair and address from the operator's mnemonic.
//!
//! # Architecture
//!
//! ```text
//! SecretPhrase → KeyDeriver → Keypair → Address
//! ```
//!
//! # Security
//!
//! - The phrase, seed and private key live only in zeroizing buffers
//! - Debug output of secret-holding types is redacted
//! - The keypair has a single owner for the life of the process

pub mod address;
pub mod keys;

pub use address::Address;
pub use keys::{Bip44Path, KeyDeriver, Keypair, SecretPhrase};

/// Drops per XRP
pub const DROPS_PER_XRP: u64 = 1_000_000;

/// Format a drop amount as XRP with six decimals
pub fn format_xrp(drops: u64) -> String {
    format!("{}.{:06}", drops / DROPS_PER_XRP, drops % DROPS_PER_XRP)
}

/// Convert whole XRP to drops
pub fn xrp_to_drops(xrp: u64) -> u64 {
    xrp.saturating_mul(DROPS_PER_XRP)
}
