//! Classification of rippled engine result codes
//!
//! Codes are grouped by prefix:
//! - `tes` success
//! - `tec` applied with a failure, fee claimed
//! - `tef` failed, cannot succeed as submitted
//! - `tel` local server error, not forwarded
//! - `tem` malformed transaction
//! - `ter` retry; may still be applied

/// Engine result for a successful transaction
pub const TES_SUCCESS: &str = "tesSUCCESS";

/// Validated failures that a fresh attempt cannot fix
const PERMANENT_TEC: &[&str] = &[
    "tecNO_DST",
    "tecNO_DST_INSUF_XRP",
    "tecDST_TAG_NEEDED",
    "tecNO_PERMISSION",
    "tecNO_TARGET",
];

/// What the controller should do after a submit response
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubmitVerdict {
    /// Transaction may still be included; wait for finality
    Provisional,
    /// Definitely not applied; re-plan from fresh state
    Retry,
    /// Malformed or unacceptable; abort
    Reject,
}

/// Classify the engine result of a `submit` call
pub fn classify_submission(code: &str) -> SubmitVerdict {
    match code {
        TES_SUCCESS | "tefALREADY" => SubmitVerdict::Provisional,
        c if c.starts_with("tec") || c.starts_with("ter") => SubmitVerdict::Provisional,
        c if c.starts_with("tef") || c.starts_with("tel") => SubmitVerdict::Retry,
        _ => SubmitVerdict::Reject,
    }
}

/// Whether a validated failure code rules out any retry
pub fn is_permanent_failure(code: &str) -> bool {
    PERMANENT_TEC.contains(&code) || code.starts_with("tem")
}
