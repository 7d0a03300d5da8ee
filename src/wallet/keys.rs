//! Deterministic key derivation from a BIP-39 mnemonic
//!
//! The sweep account is derived along the BIP-44 path registered for the
//! XRP Ledger, `m/44'/144'/0'/0/0`. The 32 private-key bytes at the leaf
//! are used as an Ed25519 secret, and the public key is encoded the way
//! the ledger expects Ed25519 keys: `0xED` followed by the 32-byte key.
//!
//! Secrets never leave this module except through [`Keypair::sign`].

use std::fmt;

use bip32::{DerivationPath, XPrv};
use bip39::{Language, Mnemonic};
use ed25519_dalek::{Signer, SigningKey};
use tracing::debug;
use zeroize::Zeroizing;

use crate::error::{Error, Result};

use super::address::Address;

/// BIP-44 purpose
pub const BIP44_PURPOSE: u32 = 44;

/// SLIP-44 coin type registered for XRP
pub const XRP_COIN_TYPE: u32 = 144;

/// Prefix marking an Ed25519 public key in ledger-native encoding
pub const ED25519_KEY_PREFIX: u8 = 0xED;

/// Length of a ledger-native public key
pub const PUBLIC_KEY_LEN: usize = 33;

/// BIP-44 change index of the external (receiving) chain
pub const EXTERNAL_CHAIN: u32 = 0;

/// Hierarchical derivation path (purpose / coin / account / change / index)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Bip44Path {
    pub coin_type: u32,
    pub account: u32,
    pub change: u32,
    pub index: u32,
}

impl Bip44Path {
    /// First external address of account 0 on the XRP Ledger
    pub fn xrpl() -> Self {
        Self {
            coin_type: XRP_COIN_TYPE,
            account: 0,
            change: EXTERNAL_CHAIN,
            index: 0,
        }
    }

    fn to_derivation_path(self) -> Result<DerivationPath> {
        self.to_string()
            .parse()
            .map_err(|e| Error::Derivation(format!("Invalid path {}: {}", self, e)))
    }
}

impl fmt::Display for Bip44Path {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "m/{}'/{}'/{}'/{}/{}",
            BIP44_PURPOSE, self.coin_type, self.account, self.change, self.index
        )
    }
}

/// Secret recovery phrase
///
/// Zeroized on drop and redacted from debug output.
pub struct SecretPhrase(Zeroizing<String>);

impl SecretPhrase {
    pub fn new(phrase: impl Into<String>) -> Self {
        Self(Zeroizing::new(phrase.into()))
    }

    pub(crate) fn expose(&self) -> &str {
        self.0.as_str()
    }

    pub fn is_empty(&self) -> bool {
        self.0.trim().is_empty()
    }
}

impl fmt::Debug for SecretPhrase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("SecretPhrase(***)")
    }
}

/// Derived signing identity
///
/// Deliberately neither `Clone` nor `Copy`: exactly one owner holds the
/// signing key, and it is zeroized when that owner drops it.
pub struct Keypair {
    signing_key: SigningKey,
    public_key: [u8; PUBLIC_KEY_LEN],
    address: Address,
    path: Bip44Path,
}

impl Keypair {
    fn from_secret(secret: &[u8; 32], path: Bip44Path) -> Self {
        let signing_key = SigningKey::from_bytes(secret);

        let mut public_key = [0u8; PUBLIC_KEY_LEN];
        public_key[0] = ED25519_KEY_PREFIX;
        public_key[1..].copy_from_slice(signing_key.verifying_key().as_bytes());

        let address = Address::from_public_key(&public_key);

        Self {
            signing_key,
            public_key,
            address,
            path,
        }
    }

    /// Public key in ledger-native encoding (`ED` + 32 bytes)
    pub fn public_key(&self) -> &[u8; PUBLIC_KEY_LEN] {
        &self.public_key
    }

    /// Public key as uppercase hex, the form the ledger displays
    pub fn public_key_hex(&self) -> String {
        hex::encode_upper(self.public_key)
    }

    pub fn address(&self) -> Address {
        self.address
    }

    pub fn path(&self) -> Bip44Path {
        self.path
    }

    /// Sign a message with Ed25519
    pub fn sign(&self, message: &[u8]) -> [u8; 64] {
        self.signing_key.sign(message).to_bytes()
    }
}

impl fmt::Debug for Keypair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Keypair")
            .field("public_key", &self.public_key_hex())
            .field("address", &self.address.to_string())
            .field("path", &self.path.to_string())
            .finish_non_exhaustive()
    }
}

/// Derives ledger keypairs from mnemonic phrases
#[derive(Debug, Clone, Copy)]
pub struct KeyDeriver {
    path: Bip44Path,
}

impl Default for KeyDeriver {
    fn default() -> Self {
        Self::new(Bip44Path::xrpl())
    }
}

impl KeyDeriver {
    pub fn new(path: Bip44Path) -> Self {
        Self { path }
    }

    /// Derive the keypair for a mnemonic
    ///
    /// The seed is stretched with an empty BIP-39 passphrase. The same
    /// phrase always yields the same keypair and address.
    pub fn derive(&self, phrase: &SecretPhrase) -> Result<Keypair> {
        let mnemonic = Mnemonic::parse_in_normalized(Language::English, phrase.expose())
            .map_err(|e| Error::InvalidMnemonic(e.to_string()))?;

        let seed = Zeroizing::new(mnemonic.to_seed(""));
        drop(mnemonic);

        let path = self.path.to_derivation_path()?;
        let leaf = XPrv::derive_from_path(&seed[..], &path)
            .map_err(|e| Error::Derivation(format!("{}: {}", self.path, e)))?;

        let secret = Zeroizing::new(leaf.to_bytes());
        let keypair = Keypair::from_secret(&secret, self.path);

        debug!("Derived keypair at {}", self.path);
        Ok(keypair)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ed25519_dalek::{Signature, Verifier, VerifyingKey};

    const ABANDON: &str = "abandon abandon abandon abandon abandon abandon \
                           abandon abandon abandon abandon abandon about";
    const LEGAL_WINNER: &str =
        "legal winner thank year wave sausage worth useful legal winner thank yellow";

    fn derive(phrase: &str) -> Keypair {
        KeyDeriver::default()
            .derive(&SecretPhrase::new(phrase))
            .unwrap()
    }

    #[test]
    fn test_xrpl_path_display() {
        assert_eq!(Bip44Path::xrpl().to_string(), "m/44'/144'/0'/0/0");
    }

    #[test]
    fn test_known_answer_abandon() {
        let keypair = derive(ABANDON);
        assert_eq!(
            keypair.public_key_hex(),
            "ED7C8954FABFF012A38776AE6FF4BCEA6C9057639DAEFDEB62D6223FF5D470B399"
        );
        assert_eq!(
            keypair.address().to_string(),
            "rBo2fTwPahuUDZR5EzT4yGgpnqUjLUuutC"
        );
    }

    #[test]
    fn test_known_answer_legal_winner() {
        let keypair = derive(LEGAL_WINNER);
        assert_eq!(
            keypair.public_key_hex(),
            "ED18BA376CD22281BB46E793A6CEF386A880E4EDE6D4A8831F09D75DBB46800643"
        );
        assert_eq!(
            keypair.address().to_string(),
            "rfxcKjhmHafUd1ZZXGZ8fcg4w4dD1MKEBq"
        );
    }

    #[test]
    fn test_derivation_is_deterministic() {
        let first = derive(LEGAL_WINNER);
        let second = derive(LEGAL_WINNER);
        assert_eq!(first.public_key(), second.public_key());
        assert_eq!(first.address(), second.address());
        assert_eq!(first.sign(b"sweep"), second.sign(b"sweep"));
    }

    #[test]
    fn test_distinct_phrases_distinct_accounts() {
        assert_ne!(derive(ABANDON).address(), derive(LEGAL_WINNER).address());
    }

    #[test]
    fn test_bad_checksum_rejected() {
        let phrase = "abandon abandon abandon abandon abandon abandon \
                      abandon abandon abandon abandon abandon abandon";
        let result = KeyDeriver::default().derive(&SecretPhrase::new(phrase));
        assert!(matches!(result, Err(Error::InvalidMnemonic(_))));
    }

    #[test]
    fn test_unknown_word_rejected() {
        let phrase = "abandon abandon abandon abandon abandon abandon \
                      abandon abandon abandon abandon abandon lambo";
        let result = KeyDeriver::default().derive(&SecretPhrase::new(phrase));
        assert!(matches!(result, Err(Error::InvalidMnemonic(_))));
    }

    #[test]
    fn test_signature_verifies_against_public_key() {
        let keypair = derive(ABANDON);
        let message = b"STX\0payload";
        let signature = keypair.sign(message);

        let mut raw = [0u8; 32];
        raw.copy_from_slice(&keypair.public_key()[1..]);
        let verifying_key = VerifyingKey::from_bytes(&raw).unwrap();
        assert!(verifying_key
            .verify(message, &Signature::from_bytes(&signature))
            .is_ok());
    }

    #[test]
    fn test_secrets_redacted_from_debug() {
        let phrase = SecretPhrase::new(ABANDON);
        assert!(!format!("{:?}", phrase).contains("abandon"));

        let keypair = derive(ABANDON);
        let debug = format!("{:?}", keypair);
        assert!(debug.contains("rBo2fTwPahuUDZR5EzT4yGgpnqUjLUuutC"));
        assert!(!debug.contains("signing_key"));
    }
}
