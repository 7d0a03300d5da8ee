//! Canonical binary encoding for native XRP payments
//!
//! Covers only what a sweep needs: a `Payment` of native XRP, optionally
//! with a destination tag. Fields are written in canonical order (type
//! code, then field code).

use std::fmt;
use std::str::FromStr;

use sha2::{Digest, Sha512};

use crate::error::{Error, Result};
use crate::wallet::keys::PUBLIC_KEY_LEN;
use crate::wallet::{Address, Keypair};

/// Prefix of the data covered by a single signature
const HASH_PREFIX_TX_SIGN: [u8; 4] = *b"STX\0";

/// Prefix used when hashing a signed transaction for its ID
const HASH_PREFIX_TX_ID: [u8; 4] = *b"TXN\0";

/// Require a fully-canonical signature
pub const TF_FULLY_CANONICAL_SIG: u32 = 0x8000_0000;

/// Payment transaction type
const TT_PAYMENT: u16 = 0;

/// Native amounts must fit below the "positive" flag bit
const MAX_NATIVE_DROPS: u64 = (1 << 62) - 1;

const NATIVE_POSITIVE_BIT: u64 = 0x4000_0000_0000_0000;

// Type codes
const ST_UINT16: u8 = 1;
const ST_UINT32: u8 = 2;
const ST_AMOUNT: u8 = 6;
const ST_BLOB: u8 = 7;
const ST_ACCOUNT: u8 = 8;

/// Encode a field ID from its type and field codes
pub fn field_id(type_code: u8, field_code: u8) -> Vec<u8> {
    match (type_code < 16, field_code < 16) {
        (true, true) => vec![(type_code << 4) | field_code],
        (true, false) => vec![type_code << 4, field_code],
        (false, true) => vec![field_code, type_code],
        (false, false) => vec![0, type_code, field_code],
    }
}

/// Encode a variable-length prefix
pub fn length_prefix(len: usize) -> Result<Vec<u8>> {
    match len {
        0..=192 => Ok(vec![len as u8]),
        193..=12_480 => {
            let l = len - 193;
            Ok(vec![193 + (l >> 8) as u8, (l & 0xff) as u8])
        }
        12_481..=918_744 => {
            let l = len - 12_481;
            Ok(vec![
                241 + (l >> 16) as u8,
                ((l >> 8) & 0xff) as u8,
                (l & 0xff) as u8,
            ])
        }
        _ => Err(Error::Serialization(format!(
            "Variable-length field too long: {} bytes",
            len
        ))),
    }
}

/// Encode a native XRP amount in drops
pub fn native_amount(drops: u64) -> Result<[u8; 8]> {
    if drops > MAX_NATIVE_DROPS {
        return Err(Error::Serialization(format!(
            "Native amount out of range: {} drops",
            drops
        )));
    }
    Ok((drops | NATIVE_POSITIVE_BIT).to_be_bytes())
}

/// Ledger-assigned transaction identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TxHash([u8; 32]);

impl TxHash {
    /// SHA-512-half of `TXN\0 || blob`
    pub fn of_signed_blob(blob: &[u8]) -> Self {
        let mut hasher = Sha512::new();
        hasher.update(HASH_PREFIX_TX_ID);
        hasher.update(blob);
        let digest = hasher.finalize();

        let mut hash = [0u8; 32];
        hash.copy_from_slice(&digest[..32]);
        Self(hash)
    }

    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }
}

impl fmt::Display for TxHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&hex::encode_upper(self.0))
    }
}

impl FromStr for TxHash {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let bytes = hex::decode(s)
            .map_err(|e| Error::Deserialization(format!("Invalid transaction hash {}: {}", s, e)))?;
        let hash: [u8; 32] = bytes.try_into().map_err(|_| {
            Error::Deserialization(format!("Transaction hash must be 32 bytes: {}", s))
        })?;
        Ok(Self(hash))
    }
}

/// Native XRP payment, before signing
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Payment {
    pub account: Address,
    pub destination: Address,
    pub destination_tag: Option<u32>,
    /// Amount delivered, in drops
    pub amount: u64,
    /// Fee burned, in drops
    pub fee: u64,
    pub sequence: u32,
    pub last_ledger_sequence: u32,
    pub signing_pub_key: [u8; PUBLIC_KEY_LEN],
}

impl Payment {
    /// Serialize in canonical field order, with or without the signature
    fn serialize(&self, signature: Option<&[u8; 64]>) -> Result<Vec<u8>> {
        let mut out = Vec::with_capacity(256);

        out.extend(field_id(ST_UINT16, 2)); // TransactionType
        out.extend_from_slice(&TT_PAYMENT.to_be_bytes());

        out.extend(field_id(ST_UINT32, 2)); // Flags
        out.extend_from_slice(&TF_FULLY_CANONICAL_SIG.to_be_bytes());

        out.extend(field_id(ST_UINT32, 4)); // Sequence
        out.extend_from_slice(&self.sequence.to_be_bytes());

        if let Some(tag) = self.destination_tag {
            out.extend(field_id(ST_UINT32, 14)); // DestinationTag
            out.extend_from_slice(&tag.to_be_bytes());
        }

        out.extend(field_id(ST_UINT32, 27)); // LastLedgerSequence
        out.extend_from_slice(&self.last_ledger_sequence.to_be_bytes());

        out.extend(field_id(ST_AMOUNT, 1)); // Amount
        out.extend_from_slice(&native_amount(self.amount)?);

        out.extend(field_id(ST_AMOUNT, 8)); // Fee
        out.extend_from_slice(&native_amount(self.fee)?);

        out.extend(field_id(ST_BLOB, 3)); // SigningPubKey
        out.extend(length_prefix(self.signing_pub_key.len())?);
        out.extend_from_slice(&self.signing_pub_key);

        if let Some(signature) = signature {
            out.extend(field_id(ST_BLOB, 4)); // TxnSignature
            out.extend(length_prefix(signature.len())?);
            out.extend_from_slice(signature);
        }

        out.extend(field_id(ST_ACCOUNT, 1)); // Account
        out.extend(length_prefix(self.account.account_id().len())?);
        out.extend_from_slice(self.account.account_id());

        out.extend(field_id(ST_ACCOUNT, 3)); // Destination
        out.extend(length_prefix(self.destination.account_id().len())?);
        out.extend_from_slice(self.destination.account_id());

        Ok(out)
    }

    /// Bytes covered by the signature
    pub fn signing_data(&self) -> Result<Vec<u8>> {
        let mut data = HASH_PREFIX_TX_SIGN.to_vec();
        data.extend(self.serialize(None)?);
        Ok(data)
    }

    /// Sign with the account's keypair
    pub fn sign(self, keypair: &Keypair) -> Result<SignedTransaction> {
        if keypair.public_key() != &self.signing_pub_key {
            return Err(Error::TransactionBuild(
                "Signing key does not match SigningPubKey".to_string(),
            ));
        }

        let signature = keypair.sign(&self.signing_data()?);
        let blob = self.serialize(Some(&signature))?;
        let hash = TxHash::of_signed_blob(&blob);

        Ok(SignedTransaction {
            payment: self,
            blob,
            hash,
        })
    }
}

/// A signed payment, immutable once built
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignedTransaction {
    payment: Payment,
    blob: Vec<u8>,
    hash: TxHash,
}

impl SignedTransaction {
    pub fn payment(&self) -> &Payment {
        &self.payment
    }

    pub fn blob(&self) -> &[u8] {
        &self.blob
    }

    /// Blob in the uppercase hex form `submit` expects
    pub fn blob_hex(&self) -> String {
        hex::encode_upper(&self.blob)
    }

    pub fn hash(&self) -> TxHash {
        self.hash
    }

    pub fn amount(&self) -> u64 {
        self.payment.amount
    }

    pub fn last_ledger_sequence(&self) -> u32 {
        self.payment.last_ledger_sequence
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::wallet::{KeyDeriver, SecretPhrase};

    const ABANDON: &str = "abandon abandon abandon abandon abandon abandon \
                           abandon abandon abandon abandon abandon about";
    const GENESIS: &str = "rHb9CJAWyB4rj91VRWn96DkukG4bwdtyTh";

    fn sample_payment(keypair: &Keypair) -> Payment {
        Payment {
            account: keypair.address(),
            destination: GENESIS.parse().unwrap(),
            destination_tag: None,
            amount: 14_999_980,
            fee: 20,
            sequence: 7,
            last_ledger_sequence: 120,
            signing_pub_key: *keypair.public_key(),
        }
    }

    fn keypair() -> Keypair {
        KeyDeriver::default()
            .derive(&SecretPhrase::new(ABANDON))
            .unwrap()
    }

    #[test]
    fn test_field_id_encoding() {
        assert_eq!(field_id(1, 2), vec![0x12]);
        assert_eq!(field_id(2, 27), vec![0x20, 0x1B]);
        assert_eq!(field_id(8, 3), vec![0x83]);
        assert_eq!(field_id(16, 1), vec![0x01, 0x10]);
        assert_eq!(field_id(16, 17), vec![0x00, 0x10, 0x11]);
    }

    #[test]
    fn test_length_prefix() {
        assert_eq!(length_prefix(20).unwrap(), vec![20]);
        assert_eq!(length_prefix(192).unwrap(), vec![192]);
        assert_eq!(length_prefix(193).unwrap(), vec![193, 0]);
        assert_eq!(length_prefix(12_480).unwrap(), vec![240, 255]);
        assert_eq!(length_prefix(12_481).unwrap(), vec![241, 0, 0]);
        assert!(length_prefix(918_745).is_err());
    }

    #[test]
    fn test_native_amount_encoding() {
        assert_eq!(
            native_amount(1).unwrap(),
            [0x40, 0, 0, 0, 0, 0, 0, 0x01]
        );
        assert_eq!(
            native_amount(20).unwrap(),
            [0x40, 0, 0, 0, 0, 0, 0, 0x14]
        );
        assert!(native_amount(1 << 62).is_err());
    }

    #[test]
    fn test_signing_data_layout() {
        let keypair = keypair();
        let data = sample_payment(&keypair).signing_data().unwrap();
        assert_eq!(
            hex::encode_upper(&data),
            "53545800\
             12000022800000002400000007201B00000078614000000000E4E1AC68400000000000001473\
             21ED7C8954FABFF012A38776AE6FF4BCEA6C9057639DAEFDEB62D6223FF5D470B399\
             81147680082D2748E098278ED5B6D7C62A7F8B1E43D2\
             8314B5F762798A53D543A014CAF8B297CFF8F2F937E8"
        );
    }

    #[test]
    fn test_signed_blob_and_hash() {
        let keypair = keypair();
        let signed = sample_payment(&keypair).sign(&keypair).unwrap();
        assert_eq!(
            signed.blob_hex(),
            "12000022800000002400000007201B00000078614000000000E4E1AC68400000000000001473\
             21ED7C8954FABFF012A38776AE6FF4BCEA6C9057639DAEFDEB62D6223FF5D470B399\
             744040564C4469CA1FC73EA19AC9E2DB5479225BDF4932FD4628FB73035E94819DEECD\
             361F87D8A4B8226D3E5A66661B39F6B338BEA9708EC4B5D78BA6B9C8E8C60A\
             81147680082D2748E098278ED5B6D7C62A7F8B1E43D2\
             8314B5F762798A53D543A014CAF8B297CFF8F2F937E8"
        );
        assert_eq!(
            signed.hash().to_string(),
            "BE7EF441E8AA93B51D4FA545C0E278FB40C19120F51A7476820BA566264D73B5"
        );
        assert_eq!(signed.amount(), 14_999_980);
        assert_eq!(signed.last_ledger_sequence(), 120);
    }

    #[test]
    fn test_destination_tag_sits_between_sequence_and_last_ledger() {
        let keypair = keypair();
        let mut payment = sample_payment(&keypair);
        payment.destination_tag = Some(42);
        let data = payment.signing_data().unwrap();
        let hex = hex::encode_upper(&data);
        assert!(hex.contains("24000000072E0000002A201B00000078"));
    }

    #[test]
    fn test_sign_rejects_mismatched_key() {
        let keypair = keypair();
        let mut payment = sample_payment(&keypair);
        payment.signing_pub_key[1] ^= 0xff;
        assert!(matches!(
            payment.sign(&keypair),
            Err(Error::TransactionBuild(_))
        ));
    }

    #[test]
    fn test_tx_hash_parse() {
        let text = "BE7EF441E8AA93B51D4FA545C0E278FB40C19120F51A7476820BA566264D73B5";
        let hash: TxHash = text.parse().unwrap();
        assert_eq!(hash.to_string(), text);
        assert!("BEEF".parse::<TxHash>().is_err());
    }
}
