//! Configuration loading and validation

use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::Path;
use std::time::Duration;

use crate::error::Error;
use crate::ledger::rpc::DEFAULT_RPC_URL;
use crate::wallet::{Address, SecretPhrase};

// Re-export sweep policy
pub use crate::sweep::planner::PolicyConfig;

/// Environment variable holding the mnemonic
pub const MNEMONIC_ENV: &str = "XRPL_MNEMONIC";

/// Environment variable holding the destination address
pub const DESTINATION_ENV: &str = "XRPL_DESTINATION";

/// Main configuration structure
///
/// Holds no secrets; see [`Secrets`].
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub rpc: RpcConfig,
    #[serde(default)]
    pub policy: PolicyConfig,
    #[serde(default)]
    pub retry: RetryConfig,
    #[serde(default)]
    pub finality: FinalityConfig,
    #[serde(default)]
    pub sweep: SweepConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RpcConfig {
    #[serde(default = "default_rpc_endpoint")]
    pub endpoint: String,
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,
}

impl Default for RpcConfig {
    fn default() -> Self {
        Self {
            endpoint: default_rpc_endpoint(),
            timeout_ms: default_timeout_ms(),
        }
    }
}

/// Backoff applied after transport failures
#[derive(Debug, Clone, Deserialize)]
pub struct RetryConfig {
    #[serde(default = "default_retry_delay_ms")]
    pub initial_delay_ms: u64,
    #[serde(default = "default_retry_delay_ms")]
    pub max_delay_ms: u64,
    #[serde(default = "default_multiplier")]
    pub multiplier: f64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            initial_delay_ms: default_retry_delay_ms(),
            max_delay_ms: default_retry_delay_ms(),
            multiplier: default_multiplier(),
        }
    }
}

impl RetryConfig {
    pub fn initial_delay(&self) -> Duration {
        Duration::from_millis(self.initial_delay_ms)
    }

    pub fn max_delay(&self) -> Duration {
        Duration::from_millis(self.max_delay_ms)
    }
}

/// Waiting for a submitted transaction to validate
#[derive(Debug, Clone, Deserialize)]
pub struct FinalityConfig {
    #[serde(default = "default_finality_poll_ms")]
    pub poll_interval_ms: u64,
    /// Ledgers after the observed validated ledger before the tx expires
    #[serde(default = "default_ledger_offset")]
    pub ledger_offset: u32,
}

impl Default for FinalityConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: default_finality_poll_ms(),
            ledger_offset: default_ledger_offset(),
        }
    }
}

impl FinalityConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct SweepConfig {
    /// Destination tag required by some custodial destinations
    #[serde(default)]
    pub destination_tag: Option<u32>,
}

fn default_rpc_endpoint() -> String {
    DEFAULT_RPC_URL.to_string()
}

fn default_timeout_ms() -> u64 {
    10_000
}

fn default_retry_delay_ms() -> u64 {
    2_000
}

fn default_multiplier() -> f64 {
    1.5
}

fn default_finality_poll_ms() -> u64 {
    1_000
}

fn default_ledger_offset() -> u32 {
    20
}

impl Config {
    /// Load configuration from file and environment variables
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();

        let settings = config::Config::builder()
            // Load from file if exists
            .add_source(config::File::from(path).required(false))
            // Override with environment variables (e.g. SWEEP_POLICY__RESERVE_DROPS)
            .add_source(
                config::Environment::with_prefix("SWEEP")
                    .prefix_separator("_")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()
            .context("Failed to build configuration")?;

        let config: Config = settings
            .try_deserialize()
            .context("Failed to deserialize configuration")?;

        // Validate configuration
        config.validate()?;

        Ok(config)
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<()> {
        let endpoint = url::Url::parse(&self.rpc.endpoint)
            .with_context(|| format!("Invalid rpc.endpoint: {}", self.rpc.endpoint))?;
        if !matches!(endpoint.scheme(), "http" | "https") {
            anyhow::bail!("rpc.endpoint must be http(s), got {}", endpoint.scheme());
        }

        if self.rpc.timeout_ms == 0 {
            anyhow::bail!("rpc.timeout_ms must be positive");
        }

        if self.policy.poll_interval_ms == 0 {
            anyhow::bail!("policy.poll_interval_ms must be positive");
        }

        // Validate retry policy
        if self.retry.initial_delay_ms == 0 {
            anyhow::bail!("retry.initial_delay_ms must be positive");
        }
        if self.retry.max_delay_ms < self.retry.initial_delay_ms {
            anyhow::bail!(
                "retry.max_delay_ms ({}) cannot be below retry.initial_delay_ms ({})",
                self.retry.max_delay_ms,
                self.retry.initial_delay_ms
            );
        }
        if !(self.retry.multiplier >= 1.0) {
            anyhow::bail!("retry.multiplier must be at least 1.0");
        }

        if self.finality.poll_interval_ms == 0 {
            anyhow::bail!("finality.poll_interval_ms must be positive");
        }
        if self.finality.ledger_offset == 0 {
            anyhow::bail!("finality.ledger_offset must be at least 1");
        }

        // The fee is paid out of the buffer
        if self.policy.fee_buffer_drops < crate::sweep::planner::BASE_FEE_DROPS {
            tracing::warn!(
                "policy.fee_buffer_drops={} is below the {} drop base fee - sweeps will be rejected",
                self.policy.fee_buffer_drops,
                crate::sweep::planner::BASE_FEE_DROPS
            );
        }

        Ok(())
    }

    /// Get masked configuration for display (hide secrets)
    pub fn masked_display(&self) -> String {
        format!(
            r#"Configuration:
  RPC:
    endpoint: {}
    timeout: {}ms
  Policy:
    reserve: {} drops
    fee_buffer: {} drops
    poll_interval: {}ms
  Retry:
    initial_delay: {}ms
    max_delay: {}ms
    multiplier: {}
  Finality:
    poll_interval: {}ms
    ledger_offset: {}
  Sweep:
    destination_tag: {}
"#,
            mask_url(&self.rpc.endpoint),
            self.rpc.timeout_ms,
            self.policy.reserve_drops,
            self.policy.fee_buffer_drops,
            self.policy.poll_interval_ms,
            self.retry.initial_delay_ms,
            self.retry.max_delay_ms,
            self.retry.multiplier,
            self.finality.poll_interval_ms,
            self.finality.ledger_offset,
            self.sweep
                .destination_tag
                .map(|t| t.to_string())
                .unwrap_or_else(|| "(not set)".to_string()),
        )
    }
}

/// Mask URL for display (hide API keys in query params)
pub fn mask_url(url: &str) -> String {
    if let Some(idx) = url.find('?') {
        format!("{}?***", &url[..idx])
    } else {
        url.to_string()
    }
}

/// Secrets supplied by the environment at startup
#[derive(Debug)]
pub struct Secrets {
    pub phrase: SecretPhrase,
    pub destination: Address,
}

impl Secrets {
    /// Read `XRPL_MNEMONIC` and `XRPL_DESTINATION`
    ///
    /// The mnemonic is removed from the process environment once read.
    /// Call before spawning threads that touch the environment.
    pub fn from_env() -> crate::Result<Self> {
        let phrase = std::env::var(MNEMONIC_ENV).ok();
        std::env::remove_var(MNEMONIC_ENV);

        Self::from_values(phrase, std::env::var(DESTINATION_ENV).ok())
    }

    /// Validate raw secret values; absence of either is fatal
    pub fn from_values(phrase: Option<String>, destination: Option<String>) -> crate::Result<Self> {
        let phrase = SecretPhrase::new(phrase.unwrap_or_default());
        if phrase.is_empty() {
            return Err(Error::MissingEnvVar(MNEMONIC_ENV.to_string()));
        }

        let destination = destination
            .filter(|d| !d.trim().is_empty())
            .ok_or_else(|| Error::MissingEnvVar(DESTINATION_ENV.to_string()))?;
        let destination: Address = destination.parse()?;

        Ok(Self {
            phrase,
            destination,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.rpc.endpoint, "https://s1.ripple.com:51234");
        assert_eq!(config.policy.reserve_drops, 10_000_000);
        assert_eq!(config.policy.fee_buffer_drops, 20);
        assert_eq!(config.policy.poll_interval_ms, 2_000);
        assert_eq!(config.retry.initial_delay(), Duration::from_secs(2));
        assert_eq!(config.retry.max_delay(), Duration::from_secs(2));
        assert_eq!(config.finality.ledger_offset, 20);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_load_from_file() {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        writeln!(
            file,
            r#"
[rpc]
endpoint = "http://localhost:5005"

[policy]
reserve_drops = 1000000
fee_buffer_drops = 12

[sweep]
destination_tag = 7
"#
        )
        .unwrap();

        let config = Config::load(file.path()).unwrap();
        assert_eq!(config.rpc.endpoint, "http://localhost:5005");
        assert_eq!(config.rpc.timeout_ms, 10_000);
        assert_eq!(config.policy.reserve_drops, 1_000_000);
        assert_eq!(config.policy.fee_buffer_drops, 12);
        assert_eq!(config.policy.poll_interval_ms, 2_000);
        assert_eq!(config.sweep.destination_tag, Some(7));
    }

    #[test]
    fn test_missing_file_uses_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = Config::load(dir.path().join("absent.toml")).unwrap();
        assert_eq!(config.policy.reserve_drops, 10_000_000);
    }

    #[test]
    fn test_validation_rejects_bad_values() {
        let mut config = Config::default();
        config.rpc.endpoint = "ftp://example.com".to_string();
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.retry.max_delay_ms = 100;
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.retry.multiplier = 0.5;
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.finality.ledger_offset = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_mask_url() {
        assert_eq!(
            mask_url("https://rpc.example.com?key=secret"),
            "https://rpc.example.com?***"
        );
        assert_eq!(mask_url("https://s1.ripple.com:51234"), "https://s1.ripple.com:51234");
    }

    #[test]
    fn test_secrets_required() {
        let destination = Some("rHb9CJAWyB4rj91VRWn96DkukG4bwdtyTh".to_string());

        assert!(matches!(
            Secrets::from_values(None, destination.clone()),
            Err(Error::MissingEnvVar(v)) if v == MNEMONIC_ENV
        ));
        assert!(matches!(
            Secrets::from_values(Some("   ".to_string()), destination),
            Err(Error::MissingEnvVar(v)) if v == MNEMONIC_ENV
        ));
        assert!(matches!(
            Secrets::from_values(Some("abandon".to_string()), None),
            Err(Error::MissingEnvVar(v)) if v == DESTINATION_ENV
        ));
    }

    #[test]
    fn test_secrets_reject_malformed_destination() {
        let result = Secrets::from_values(
            Some("abandon".to_string()),
            Some("not-an-address".to_string()),
        );
        assert!(matches!(result, Err(Error::InvalidAddress(_))));
    }

    #[test]
    fn test_secrets_debug_redacts_phrase() {
        let secrets = Secrets::from_values(
            Some("abandon about".to_string()),
            Some("rHb9CJAWyB4rj91VRWn96DkukG4bwdtyTh".to_string()),
        )
        .unwrap();
        assert!(!format!("{:?}", secrets).contains("abandon"));
    }

    #[test]
    fn test_secrets_from_env_clears_mnemonic() {
        std::env::set_var(MNEMONIC_ENV, "abandon about");
        std::env::set_var(DESTINATION_ENV, "rHb9CJAWyB4rj91VRWn96DkukG4bwdtyTh");

        let secrets = Secrets::from_env().unwrap();
        assert_eq!(
            secrets.destination.to_string(),
            "rHb9CJAWyB4rj91VRWn96DkukG4bwdtyTh"
        );
        assert!(std::env::var(MNEMONIC_ENV).is_err());

        // A second read finds nothing left to take
        assert!(matches!(
            Secrets::from_env(),
            Err(Error::MissingEnvVar(v)) if v == MNEMONIC_ENV
        ));
        std::env::remove_var(DESTINATION_ENV);
    }
}
