//! XRP Ledger Balance Sweeper Library
//!
//! Derives an XRPL account from a mnemonic, watches its balance and
//! forwards everything above the reserve to a fixed destination.

pub mod cli;
pub mod config;
pub mod error;
pub mod ledger;
pub mod sweep;
pub mod wallet;

// Re-export commonly used types
pub use config::Config;
pub use error::{Error, Result};
