//! rippled JSON-RPC client
//!
//! Speaks the HTTP JSON-RPC dialect of rippled: every call is a POST of
//! `{"method": ..., "params": [{...}]}` and every answer is wrapped in
//! `{"result": {...}}`, with errors reported inside `result` rather than
//! through HTTP status codes.

use std::time::{Duration, Instant};

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::{debug, warn};

use crate::config::RpcConfig;
use crate::error::{Error, Result};
use crate::wallet::Address;

use super::codec::{SignedTransaction, TxHash};
use super::engine_result::{classify_submission, SubmitVerdict, TES_SUCCESS};
use super::{AccountState, FinalityStatus, LedgerClient, LedgerHealth, Submission};

/// Public rippled JSON-RPC endpoint
pub const DEFAULT_RPC_URL: &str = "https://s1.ripple.com:51234";

/// JSON-RPC request envelope
#[derive(Debug, Serialize)]
struct RpcRequest<'a> {
    method: &'a str,
    params: [Value; 1],
}

/// JSON-RPC response envelope
#[derive(Debug, Deserialize)]
struct RpcResponse {
    result: Value,
}

/// Error reported by rippled inside `result`
#[derive(Debug, Clone, PartialEq, Eq)]
struct RippledError {
    error: String,
    message: String,
}

impl RippledError {
    fn from_result(result: &Value) -> Option<Self> {
        let is_error = result.get("status").and_then(Value::as_str) == Some("error")
            || result.get("error").is_some();
        if !is_error {
            return None;
        }

        let error = result
            .get("error")
            .and_then(Value::as_str)
            .unwrap_or("unknown")
            .to_string();
        let message = result
            .get("error_message")
            .or_else(|| result.get("error_exception"))
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string();

        Some(Self { error, message })
    }

    fn into_transport_error(self, method: &str) -> Error {
        Error::Rpc(format!("{} failed: {} {}", method, self.error, self.message))
    }
}

#[derive(Debug, Deserialize)]
struct AccountInfoResult {
    account_data: AccountData,
    ledger_index: Option<u32>,
    #[serde(default)]
    validated: bool,
}

#[derive(Debug, Deserialize)]
struct AccountData {
    #[serde(rename = "Balance")]
    balance: String,
    #[serde(rename = "Sequence")]
    sequence: u32,
}

#[derive(Debug, Deserialize)]
struct SubmitResult {
    engine_result: String,
    #[serde(default)]
    engine_result_message: String,
    tx_json: Option<SubmittedTx>,
}

#[derive(Debug, Deserialize)]
struct SubmittedTx {
    hash: Option<String>,
}

#[derive(Debug, Deserialize)]
struct TxResult {
    #[serde(default)]
    validated: bool,
    ledger_index: Option<u32>,
    meta: Option<TxMeta>,
}

#[derive(Debug, Deserialize)]
struct TxMeta {
    #[serde(rename = "TransactionResult")]
    transaction_result: String,
}

/// What a `tx` lookup found
#[derive(Debug, Clone, PartialEq, Eq)]
enum TxLookup {
    NotFound,
    Unvalidated,
    Validated { code: String, ledger_index: u32 },
}

/// Parse an `account_info` result
fn parse_account_info(result: Value) -> Result<AccountState> {
    if let Some(err) = RippledError::from_result(&result) {
        if err.error == "actNotFound" {
            return Ok(AccountState::NotFound);
        }
        return Err(err.into_transport_error("account_info"));
    }

    let info: AccountInfoResult = serde_json::from_value(result)?;
    if !info.validated {
        return Err(Error::Deserialization(
            "account_info answered from an unvalidated ledger".to_string(),
        ));
    }

    let ledger_index = info.ledger_index.ok_or_else(|| {
        Error::Deserialization("account_info result missing ledger_index".to_string())
    })?;

    let balance = info.account_data.balance.parse::<u64>().map_err(|e| {
        Error::Deserialization(format!(
            "Invalid Balance {:?}: {}",
            info.account_data.balance, e
        ))
    })?;

    Ok(AccountState::Funded {
        balance,
        sequence: info.account_data.sequence,
        ledger_index,
    })
}

/// Parse a `submit` result for a transaction whose hash we computed
fn parse_submit(result: Value, hash: TxHash) -> Result<Submission> {
    if let Some(err) = RippledError::from_result(&result) {
        return match err.error.as_str() {
            "invalidTransaction" | "invalidParams" => Err(Error::PermanentRejection {
                code: err.error,
                message: err.message,
            }),
            _ => Err(err.into_transport_error("submit")),
        };
    }

    let submit: SubmitResult = serde_json::from_value(result)?;

    if let Some(reported) = submit.tx_json.as_ref().and_then(|tx| tx.hash.as_deref()) {
        if !reported.eq_ignore_ascii_case(&hash.to_string()) {
            warn!("Server reported hash {} for transaction {}", reported, hash);
        }
    }

    match classify_submission(&submit.engine_result) {
        SubmitVerdict::Provisional => Ok(Submission {
            hash,
            engine_result: submit.engine_result,
            message: submit.engine_result_message,
        }),
        SubmitVerdict::Retry => Err(Error::TransientRejection {
            code: submit.engine_result,
            message: submit.engine_result_message,
        }),
        SubmitVerdict::Reject => Err(Error::PermanentRejection {
            code: submit.engine_result,
            message: submit.engine_result_message,
        }),
    }
}

/// Parse a `tx` result
fn parse_tx(result: Value) -> Result<TxLookup> {
    if let Some(err) = RippledError::from_result(&result) {
        if err.error == "txnNotFound" {
            return Ok(TxLookup::NotFound);
        }
        return Err(err.into_transport_error("tx"));
    }

    let tx: TxResult = serde_json::from_value(result)?;
    match (tx.validated, tx.meta, tx.ledger_index) {
        (true, Some(meta), Some(ledger_index)) => Ok(TxLookup::Validated {
            code: meta.transaction_result,
            ledger_index,
        }),
        _ => Ok(TxLookup::Unvalidated),
    }
}

/// Parse the index out of a `ledger` result
fn parse_ledger_index(result: Value) -> Result<u32> {
    if let Some(err) = RippledError::from_result(&result) {
        return Err(err.into_transport_error("ledger"));
    }

    if let Some(index) = result.get("ledger_index").and_then(Value::as_u64) {
        return u32::try_from(index)
            .map_err(|_| Error::Deserialization(format!("ledger_index out of range: {}", index)));
    }

    // Some servers only report it as a string inside the ledger header
    result
        .get("ledger")
        .and_then(|l| l.get("ledger_index"))
        .and_then(|v| match v {
            Value::String(s) => s.parse().ok(),
            Value::Number(n) => n.as_u64().and_then(|n| u32::try_from(n).ok()),
            _ => None,
        })
        .ok_or_else(|| Error::Deserialization("ledger result missing ledger_index".to_string()))
}

/// Ledger client over rippled's HTTP JSON-RPC interface
pub struct JsonRpcClient {
    client: Client,
    endpoint: String,
    timeout_ms: u64,
}

impl JsonRpcClient {
    /// Create a new client
    pub fn new(config: &RpcConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_millis(config.timeout_ms))
            .build()
            .map_err(|e| Error::Config(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self {
            client,
            endpoint: config.endpoint.clone(),
            timeout_ms: config.timeout_ms,
        })
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    /// Single JSON-RPC round trip
    async fn call(&self, method: &str, params: Value) -> Result<Value> {
        debug!("RPC {} -> {}", method, self.endpoint);

        let request = RpcRequest {
            method,
            params: [params],
        };

        let response = self
            .client
            .post(&self.endpoint)
            .json(&request)
            .send()
            .await
            .map_err(|e| self.transport_error(e))?;

        let status = response.status();
        if !status.is_success() {
            return Err(Error::Rpc(format!("{} returned HTTP {}", method, status)));
        }

        let body: RpcResponse = response.json().await.map_err(|e| self.transport_error(e))?;
        Ok(body.result)
    }

    fn transport_error(&self, e: reqwest::Error) -> Error {
        if e.is_timeout() {
            Error::RpcTimeout(self.timeout_ms)
        } else {
            Error::from(e)
        }
    }

    async fn validated_ledger_index(&self) -> Result<u32> {
        let result = self
            .call("ledger", json!({ "ledger_index": "validated" }))
            .await?;
        parse_ledger_index(result)
    }
}

#[async_trait]
impl LedgerClient for JsonRpcClient {
    async fn account_state(&self, address: &Address) -> Result<AccountState> {
        let result = self
            .call(
                "account_info",
                json!({
                    "account": address.to_string(),
                    "ledger_index": "validated",
                    "strict": true,
                }),
            )
            .await?;
        parse_account_info(result)
    }

    async fn submit_payment(&self, transaction: &SignedTransaction) -> Result<Submission> {
        let result = self
            .call("submit", json!({ "tx_blob": transaction.blob_hex() }))
            .await?;
        parse_submit(result, transaction.hash())
    }

    async fn finality(&self, hash: &TxHash, last_ledger_sequence: u32) -> Result<FinalityStatus> {
        // Read the validated index before the lookup: if the lookup then
        // misses, no ledger up to that index contains the transaction.
        let validated_ledger = self.validated_ledger_index().await?;

        let result = self
            .call("tx", json!({ "transaction": hash.to_string(), "binary": false }))
            .await?;

        Ok(match parse_tx(result)? {
            TxLookup::Validated { code, ledger_index } if code == TES_SUCCESS => {
                FinalityStatus::Confirmed { ledger_index }
            }
            TxLookup::Validated { code, ledger_index } => {
                FinalityStatus::Failed { code, ledger_index }
            }
            TxLookup::NotFound | TxLookup::Unvalidated
                if validated_ledger > last_ledger_sequence =>
            {
                FinalityStatus::Expired { validated_ledger }
            }
            TxLookup::NotFound | TxLookup::Unvalidated => FinalityStatus::Pending,
        })
    }

    async fn health(&self) -> Result<LedgerHealth> {
        let start = Instant::now();
        let validated_ledger = self.validated_ledger_index().await?;
        Ok(LedgerHealth {
            validated_ledger,
            latency: start.elapsed(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn hash() -> TxHash {
        "BE7EF441E8AA93B51D4FA545C0E278FB40C19120F51A7476820BA566264D73B5"
            .parse()
            .unwrap()
    }

    #[test]
    fn test_request_envelope() {
        let request = RpcRequest {
            method: "ledger",
            params: [json!({ "ledger_index": "validated" })],
        };
        assert_eq!(
            serde_json::to_value(&request).unwrap(),
            json!({ "method": "ledger", "params": [{ "ledger_index": "validated" }] })
        );
    }

    #[test]
    fn test_account_info_funded() {
        let result = json!({
            "account_data": {
                "Account": "rBo2fTwPahuUDZR5EzT4yGgpnqUjLUuutC",
                "Balance": "25000000",
                "Flags": 0,
                "OwnerCount": 0,
                "Sequence": 91_234_567u32
            },
            "ledger_hash": "ABCD",
            "ledger_index": 91_300_000u32,
            "status": "success",
            "validated": true
        });
        assert_eq!(
            parse_account_info(result).unwrap(),
            AccountState::Funded {
                balance: 25_000_000,
                sequence: 91_234_567,
                ledger_index: 91_300_000,
            }
        );
    }

    #[test]
    fn test_account_info_not_found_is_state_not_error() {
        let result = json!({
            "account": "rBo2fTwPahuUDZR5EzT4yGgpnqUjLUuutC",
            "error": "actNotFound",
            "error_code": 19,
            "error_message": "Account not found.",
            "ledger_index": 91_300_000u32,
            "status": "error",
            "validated": true
        });
        assert_eq!(parse_account_info(result).unwrap(), AccountState::NotFound);
    }

    #[test]
    fn test_account_info_server_error_is_transient() {
        let result = json!({ "error": "tooBusy", "status": "error" });
        let err = parse_account_info(result).unwrap_err();
        assert!(err.is_retryable());
    }

    #[test]
    fn test_account_info_bad_balance() {
        let result = json!({
            "account_data": { "Balance": "lots", "Sequence": 1 },
            "ledger_index": 5,
            "validated": true
        });
        assert!(matches!(
            parse_account_info(result),
            Err(Error::Deserialization(_))
        ));
    }

    #[test]
    fn test_submit_accepted() {
        let result = json!({
            "accepted": true,
            "engine_result": "tesSUCCESS",
            "engine_result_code": 0,
            "engine_result_message": "The transaction was applied. Only final in a validated ledger.",
            "tx_json": { "hash": hash().to_string() }
        });
        let submission = parse_submit(result, hash()).unwrap();
        assert_eq!(submission.hash, hash());
        assert_eq!(submission.engine_result, "tesSUCCESS");
    }

    #[test]
    fn test_submit_sequence_race_is_transient() {
        let result = json!({
            "engine_result": "tefPAST_SEQ",
            "engine_result_message": "This sequence number has already passed."
        });
        assert!(matches!(
            parse_submit(result, hash()),
            Err(Error::TransientRejection { code, .. }) if code == "tefPAST_SEQ"
        ));
    }

    #[test]
    fn test_submit_malformed_is_permanent() {
        let result = json!({
            "engine_result": "temDST_IS_SRC",
            "engine_result_message": "Destination may not be source."
        });
        assert!(matches!(
            parse_submit(result, hash()),
            Err(Error::PermanentRejection { code, .. }) if code == "temDST_IS_SRC"
        ));

        let result = json!({ "error": "invalidTransaction", "status": "error" });
        assert!(matches!(
            parse_submit(result, hash()),
            Err(Error::PermanentRejection { .. })
        ));
    }

    #[test]
    fn test_tx_lookup() {
        let validated = json!({
            "hash": hash().to_string(),
            "ledger_index": 91_300_003u32,
            "meta": { "TransactionResult": "tesSUCCESS" },
            "validated": true
        });
        assert_eq!(
            parse_tx(validated).unwrap(),
            TxLookup::Validated {
                code: "tesSUCCESS".to_string(),
                ledger_index: 91_300_003,
            }
        );

        let pending = json!({ "hash": hash().to_string(), "validated": false });
        assert_eq!(parse_tx(pending).unwrap(), TxLookup::Unvalidated);

        let missing = json!({ "error": "txnNotFound", "status": "error" });
        assert_eq!(parse_tx(missing).unwrap(), TxLookup::NotFound);
    }

    #[test]
    fn test_ledger_index_forms() {
        assert_eq!(
            parse_ledger_index(json!({ "ledger_index": 100, "validated": true })).unwrap(),
            100
        );
        assert_eq!(
            parse_ledger_index(json!({ "ledger": { "ledger_index": "101" } })).unwrap(),
            101
        );
        assert!(parse_ledger_index(json!({ "validated": true })).is_err());
    }
}
