//! Classic XRPL account addresses
//!
//! An address is the base58check encoding (Ripple alphabet, version 0) of
//! the 20-byte account ID `RIPEMD160(SHA256(public_key))`.

use std::fmt;
use std::str::FromStr;

use ripemd::Ripemd160;
use sha2::{Digest, Sha256};

use crate::error::{Error, Result};

/// Version byte prefixed to account IDs before encoding
const ACCOUNT_ID_VERSION: u8 = 0x00;

/// Length of an account ID in bytes
pub const ACCOUNT_ID_LEN: usize = 20;

/// Ledger-visible account identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Address {
    account_id: [u8; ACCOUNT_ID_LEN],
}

impl Address {
    /// Build an address from a raw account ID
    pub fn from_account_id(account_id: [u8; ACCOUNT_ID_LEN]) -> Self {
        Self { account_id }
    }

    /// Derive the address of a public key in ledger-native encoding
    pub fn from_public_key(public_key: &[u8]) -> Self {
        let sha = Sha256::digest(public_key);
        let ripe = Ripemd160::digest(sha);

        let mut account_id = [0u8; ACCOUNT_ID_LEN];
        account_id.copy_from_slice(&ripe);
        Self { account_id }
    }

    /// Raw 20-byte account ID
    pub fn account_id(&self) -> &[u8; ACCOUNT_ID_LEN] {
        &self.account_id
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut payload = Vec::with_capacity(1 + ACCOUNT_ID_LEN);
        payload.push(ACCOUNT_ID_VERSION);
        payload.extend_from_slice(&self.account_id);

        let encoded = bs58::encode(payload)
            .with_alphabet(bs58::Alphabet::RIPPLE)
            .with_check()
            .into_string();
        f.write_str(&encoded)
    }
}

impl FromStr for Address {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let s = s.trim();
        if !s.starts_with('r') {
            return Err(Error::InvalidAddress(format!(
                "{}: classic addresses start with 'r'",
                s
            )));
        }

        let decoded = bs58::decode(s)
            .with_alphabet(bs58::Alphabet::RIPPLE)
            .with_check(Some(ACCOUNT_ID_VERSION))
            .into_vec()
            .map_err(|e| Error::InvalidAddress(format!("{}: {}", s, e)))?;

        // Decoded payload keeps the version byte
        if decoded.len() != 1 + ACCOUNT_ID_LEN {
            return Err(Error::InvalidAddress(format!(
                "{}: expected {} byte account ID, got {}",
                s,
                ACCOUNT_ID_LEN,
                decoded.len().saturating_sub(1)
            )));
        }

        let mut account_id = [0u8; ACCOUNT_ID_LEN];
        account_id.copy_from_slice(&decoded[1..]);
        Ok(Self { account_id })
    }
}
