//! Error types for the sweeper

use thiserror::Error;

/// Result type alias using our custom Error
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for the sweeper
#[derive(Error, Debug)]
pub enum Error {
    // Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Missing environment variable: {0}")]
    MissingEnvVar(String),

    #[error("Invalid address: {0}")]
    InvalidAddress(String),

    // Derivation errors
    #[error("Invalid mnemonic: {0}")]
    InvalidMnemonic(String),

    #[error("Key derivation failed: {0}")]
    Derivation(String),

    // RPC errors
    #[error("RPC error: {0}")]
    Rpc(String),

    #[error("RPC timeout after {0}ms")]
    RpcTimeout(u64),

    #[error("RPC connection failed: {0}")]
    RpcConnection(String),

    // Transaction errors
    #[error("Transaction build failed: {0}")]
    TransactionBuild(String),

    #[error("Submission rejected ({code}): {message}")]
    TransientRejection { code: String, message: String },

    #[error("Submission permanently rejected ({code}): {message}")]
    PermanentRejection { code: String, message: String },

    // Shutdown errors
    #[error("Interrupted before any transaction was submitted")]
    Interrupted,

    #[error("Interrupted with transaction {hash} in flight; outcome unknown")]
    UnknownOutcome { hash: String },

    // Serialization errors
    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Deserialization error: {0}")]
    Deserialization(String),
}

impl Error {
    /// Check if this error is retryable (transient)
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Error::Rpc(_)
                | Error::RpcTimeout(_)
                | Error::RpcConnection(_)
                | Error::Deserialization(_)
                | Error::TransientRejection { .. }
        )
    }

    /// Check if this error is a configuration or derivation failure
    ///
    /// These are detected before the controller starts and never retried.
    pub fn is_configuration(&self) -> bool {
        matches!(
            self,
            Error::Config(_)
                | Error::MissingEnvVar(_)
                | Error::InvalidAddress(_)
                | Error::InvalidMnemonic(_)
                | Error::Derivation(_)
        )
    }

    /// Check if this error must abort the process
    pub fn is_fatal(&self) -> bool {
        !self.is_retryable()
    }

    /// Process exit code for this error
    pub fn exit_code(&self) -> i32 {
        match self {
            Error::UnknownOutcome { .. } => 3,
            Error::Interrupted => 130,
            e if e.is_configuration() => 2,
            _ => 1,
        }
    }
}

// Conversion from reqwest errors
impl From<reqwest::Error> for Error {
    fn from(e: reqwest::Error) -> Self {
        if e.is_connect() {
            Error::RpcConnection(e.to_string())
        } else if e.is_decode() {
            Error::Deserialization(e.to_string())
        } else {
            Error::Rpc(e.to_string())
        }
    }
}

// Conversion from serde_json errors
impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Error::Deserialization(e.to_string())
    }
}
