//! XRP Ledger access
//!
//! The sweep controller only talks to the ledger through [`LedgerClient`].
//! [`rpc::JsonRpcClient`] is the production implementation; tests script
//! their own.

pub mod codec;
pub mod engine_result;
pub mod rpc;

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

use crate::error::Result;
use crate::wallet::Address;

pub use codec::{SignedTransaction, TxHash};
pub use rpc::JsonRpcClient;

/// Snapshot of the sweep account in the latest validated ledger
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AccountState {
    /// Account has never been funded (not yet activated)
    NotFound,
    /// Account exists
    Funded {
        /// Balance in drops
        balance: u64,
        /// Next sequence number to use
        sequence: u32,
        /// Validated ledger the snapshot was read from
        ledger_index: u32,
    },
}

impl AccountState {
    pub fn exists(&self) -> bool {
        matches!(self, AccountState::Funded { .. })
    }

    pub fn balance(&self) -> Option<u64> {
        match self {
            AccountState::Funded { balance, .. } => Some(*balance),
            AccountState::NotFound => None,
        }
    }
}

/// Preliminary result of handing a transaction to the network
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Submission {
    pub hash: TxHash,
    pub engine_result: String,
    pub message: String,
}

/// Where a submitted transaction stands
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FinalityStatus {
    /// Not yet in a validated ledger, and can still get there
    Pending,
    /// Included in a validated ledger with `tesSUCCESS`
    Confirmed { ledger_index: u32 },
    /// Included in a validated ledger with a failure code (fee claimed)
    Failed { code: String, ledger_index: u32 },
    /// `LastLedgerSequence` passed without inclusion; can never apply
    Expired { validated_ledger: u32 },
}

/// Result of a connectivity check
#[derive(Debug, Clone, Copy)]
pub struct LedgerHealth {
    pub validated_ledger: u32,
    pub latency: Duration,
}

/// Capability the sweep controller needs from the ledger
#[async_trait]
pub trait LedgerClient: Send + Sync {
    /// Fetch the account's state from the latest validated ledger
    ///
    /// An unfunded account is `Ok(AccountState::NotFound)`, never an error.
    async fn account_state(&self, address: &Address) -> Result<AccountState>;

    /// Submit a signed payment
    ///
    /// Rejections surface as `Error::TransientRejection` or
    /// `Error::PermanentRejection`; transport errors mean the outcome is
    /// unknown.
    async fn submit_payment(&self, transaction: &SignedTransaction) -> Result<Submission>;

    /// Check whether a submitted transaction reached finality
    async fn finality(&self, hash: &TxHash, last_ledger_sequence: u32) -> Result<FinalityStatus>;

    /// Check connectivity
    async fn health(&self) -> Result<LedgerHealth>;
}

#[async_trait]
impl<T: LedgerClient + ?Sized> LedgerClient for Arc<T> {
    async fn account_state(&self, address: &Address) -> Result<AccountState> {
        (**self).account_state(address).await
    }

    async fn submit_payment(&self, transaction: &SignedTransaction) -> Result<Submission> {
        (**self).submit_payment(transaction).await
    }

    async fn finality(&self, hash: &TxHash, last_ledger_sequence: u32) -> Result<FinalityStatus> {
        (**self).finality(hash, last_ledger_sequence).await
    }

    async fn health(&self) -> Result<LedgerHealth> {
        (**self).health().await
    }
}
