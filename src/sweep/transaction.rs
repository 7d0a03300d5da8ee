//! Transaction building for sweeps

use crate::error::{Error, Result};
use crate::ledger::codec::Payment;
use crate::ledger::{AccountState, SignedTransaction};
use crate::wallet::{Address, Keypair};

/// Builds and signs the sweep payment
#[derive(Debug, Clone, Copy)]
pub struct TransactionBuilder {
    /// Fee in drops, paid out of the policy's fee buffer
    fee: u64,
    /// Ledgers of validity after the observed validated ledger
    ledger_offset: u32,
    destination_tag: Option<u32>,
}

impl TransactionBuilder {
    pub fn new(fee: u64, ledger_offset: u32, destination_tag: Option<u32>) -> Self {
        Self {
            fee,
            ledger_offset,
            destination_tag,
        }
    }

    /// Build a signed payment of `amount` drops to `destination`
    ///
    /// Failures here mean misconfiguration, never transience.
    pub fn build_sweep(
        &self,
        keypair: &Keypair,
        destination: &Address,
        amount: u64,
        state: &AccountState,
    ) -> Result<SignedTransaction> {
        let (sequence, ledger_index) = match state {
            AccountState::Funded {
                sequence,
                ledger_index,
                ..
            } => (*sequence, *ledger_index),
            AccountState::NotFound => {
                return Err(Error::TransactionBuild(
                    "Cannot sweep from an account that does not exist".to_string(),
                ))
            }
        };

        if amount == 0 {
            return Err(Error::TransactionBuild("Refusing zero-value sweep".to_string()));
        }

        if *destination == keypair.address() {
            return Err(Error::TransactionBuild(format!(
                "Destination {} is the sweep account itself",
                destination
            )));
        }

        let last_ledger_sequence = ledger_index.checked_add(self.ledger_offset).ok_or_else(|| {
            Error::TransactionBuild(format!("LastLedgerSequence overflow at {}", ledger_index))
        })?;

        let payment = Payment {
            account: keypair.address(),
            destination: *destination,
            destination_tag: self.destination_tag,
            amount,
            fee: self.fee,
            sequence,
            last_ledger_sequence,
            signing_pub_key: *keypair.public_key(),
        };

        payment.sign(keypair)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::wallet::{KeyDeriver, SecretPhrase};

    const ABANDON: &str = "abandon abandon abandon abandon abandon abandon \
                           abandon abandon abandon abandon abandon about";

    fn keypair() -> Keypair {
        KeyDeriver::default()
            .derive(&SecretPhrase::new(ABANDON))
            .unwrap()
    }

    fn state() -> AccountState {
        AccountState::Funded {
            balance: 25_000_000,
            sequence: 7,
            ledger_index: 100,
        }
    }

    fn genesis() -> Address {
        "rHb9CJAWyB4rj91VRWn96DkukG4bwdtyTh".parse().unwrap()
    }

    #[test]
    fn test_build_sweep() {
        let keypair = keypair();
        let builder = TransactionBuilder::new(20, 20, None);
        let signed = builder
            .build_sweep(&keypair, &genesis(), 14_999_980, &state())
            .unwrap();

        assert_eq!(signed.amount(), 14_999_980);
        assert_eq!(signed.last_ledger_sequence(), 120);
        assert_eq!(signed.payment().sequence, 7);
        assert_eq!(signed.payment().fee, 20);
        assert_eq!(signed.payment().account, keypair.address());
        // Same inputs as the codec vector
        assert_eq!(
            signed.hash().to_string(),
            "BE7EF441E8AA93B51D4FA545C0E278FB40C19120F51A7476820BA566264D73B5"
        );
    }

    #[test]
    fn test_destination_tag_carried() {
        let keypair = keypair();
        let builder = TransactionBuilder::new(20, 20, Some(99));
        let signed = builder
            .build_sweep(&keypair, &genesis(), 1, &state())
            .unwrap();
        assert_eq!(signed.payment().destination_tag, Some(99));
    }

    #[test]
    fn test_refuses_self_destination() {
        let keypair = keypair();
        let builder = TransactionBuilder::new(20, 20, None);
        let result = builder.build_sweep(&keypair, &keypair.address(), 1, &state());
        assert!(matches!(result, Err(Error::TransactionBuild(_))));
    }

    #[test]
    fn test_refuses_zero_amount_and_missing_account() {
        let keypair = keypair();
        let builder = TransactionBuilder::new(20, 20, None);
        assert!(builder
            .build_sweep(&keypair, &genesis(), 0, &state())
            .is_err());
        assert!(builder
            .build_sweep(&keypair, &genesis(), 1, &AccountState::NotFound)
            .is_err());
    }

    #[test]
    fn test_construction_errors_are_fatal() {
        let keypair = keypair();
        let builder = TransactionBuilder::new(20, 20, None);
        let err = builder
            .build_sweep(&keypair, &keypair.address(), 1, &state())
            .unwrap_err();
        assert!(err.is_fatal());
    }
}
