//! Configuration management for the Safe executor
//!
//! Loads configuration from TOML files with environment variable substitution.

use crate::tx::classify::ErrorClassifier;
use crate::tx::gas::gwei;

use anyhow::{Context, Result};
use ethers::types::{Address, U256};
use lazy_static::lazy_static;
use regex::Regex;
use serde::Deserialize;
use std::env;
use std::path::Path;
use std::time::Duration;

lazy_static! {
    static ref ENV_VAR: Regex = Regex::new(r"\$\{([A-Z_][A-Z0-9_]*)\}").unwrap();
}

/// Root configuration structure
#[derive(Debug, Clone, Deserialize)]
pub struct Settings {
    pub chain: ChainConfig,
    #[serde(default)]
    pub wallet: WalletConfig,
    #[serde(default)]
    pub retry: RetryConfig,
    #[serde(default)]
    pub receipt: ReceiptConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ChainConfig {
    pub chain_id: u64,
    pub rpc_url: String,
    pub safe_address: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct WalletConfig {
    /// Environment variable holding the owner's hex private key
    #[serde(default = "default_private_key_env")]
    pub private_key_env: String,
}

impl Default for WalletConfig {
    fn default() -> Self {
        Self {
            private_key_env: default_private_key_env(),
        }
    }
}

/// Submission retry policy
#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(default)]
pub struct RetryConfig {
    /// Total submission attempts, including the first
    pub max_retries: u32,
    /// Base backoff; attempt `n` (zero-based) waits `backoff_ms * (n + 1)`
    pub backoff_ms: u64,
    /// Fee multiplier applied before every resubmission
    pub bump_multiplier: f64,
    /// Priority fee used when the network has no EIP-1559 suggestion
    pub priority_fee_gwei: u64,
    /// Gas limit when the caller supplies none
    pub default_gas_limit: u64,
    /// Replaces the built-in retryable error phrases
    pub retryable_phrases: Option<Vec<String>>,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            backoff_ms: 2000,
            bump_multiplier: 1.2,
            priority_fee_gwei: 30,
            // Large on purpose: the Safe forwards an inner call of unknown cost
            default_gas_limit: 10_000_000,
            retryable_phrases: None,
        }
    }
}

impl RetryConfig {
    /// Delay before the attempt following zero-based `attempt`
    pub fn backoff_for(&self, attempt: u32) -> Duration {
        Duration::from_millis(self.backoff_ms.saturating_mul(u64::from(attempt) + 1))
    }

    pub fn priority_fee(&self) -> U256 {
        gwei(self.priority_fee_gwei)
    }

    pub fn classifier(&self) -> ErrorClassifier {
        match &self.retryable_phrases {
            Some(phrases) => ErrorClassifier::new(phrases),
            None => ErrorClassifier::default(),
        }
    }

    fn validate(&self) -> Result<()> {
        if self.max_retries == 0 {
            anyhow::bail!("retry.max_retries must be at least 1");
        }
        if !self.bump_multiplier.is_finite() || self.bump_multiplier < 1.0 {
            anyhow::bail!(
                "retry.bump_multiplier must be a finite value >= 1.0, got {}",
                self.bump_multiplier
            );
        }
        if self.default_gas_limit == 0 {
            anyhow::bail!("retry.default_gas_limit must be non-zero");
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ReceiptConfig {
    pub wait: bool,
    pub timeout_secs: u64,
    pub poll_interval_ms: u64,
}

impl Default for ReceiptConfig {
    fn default() -> Self {
        Self {
            wait: true,
            timeout_secs: 600,
            poll_interval_ms: 2000,
        }
    }
}

#[derive(Debug, Clone, Copy, Deserialize, PartialEq, Default)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub format: LogFormat,
    pub filter: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            format: LogFormat::Pretty,
            filter: "info,safe_executor=debug".to_string(),
        }
    }
}

fn default_private_key_env() -> String {
    "PK".to_string()
}

impl Settings {
    /// Load settings from a configuration file
    pub fn load(config_path: &Path) -> Result<Self> {
        let config_str = std::fs::read_to_string(config_path)
            .with_context(|| format!("Failed to read config file: {:?}", config_path))?;

        Self::from_toml(&config_str)
    }

    /// Parse settings from TOML text, substituting `${VAR}` references first
    pub fn from_toml(config_str: &str) -> Result<Self> {
        let config_str = substitute_env_vars(config_str);

        let settings: Settings =
            toml::from_str(&config_str).with_context(|| "Failed to parse configuration")?;

        settings.validate()?;

        Ok(settings)
    }

    /// Validate configuration
    fn validate(&self) -> Result<()> {
        if self.chain.rpc_url.is_empty() {
            anyhow::bail!("chain.rpc_url must be set");
        }
        self.safe_address()?;
        self.retry.validate()?;

        if self.receipt.wait && self.receipt.poll_interval_ms == 0 {
            anyhow::bail!("receipt.poll_interval_ms must be non-zero");
        }

        Ok(())
    }

    /// Parsed Safe address
    pub fn safe_address(&self) -> Result<Address> {
        self.chain
            .safe_address
            .parse::<Address>()
            .map_err(|e| anyhow::anyhow!("Invalid Safe address {:?}: {:?}", self.chain.safe_address, e))
    }
}

/// Substitute environment variables in the format ${VAR_NAME}
fn substitute_env_vars(input: &str) -> String {
    let mut result = input.to_string();

    for cap in ENV_VAR.captures_iter(input) {
        let var_name = &cap[1];
        let var_value = env::var(var_name).unwrap_or_default();
        result = result.replace(&cap[0], &var_value);
    }

    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    const MINIMAL: &str = r#"
        [chain]
        chain_id = 137
        rpc_url = "https://polygon-rpc.com"
        safe_address = "0x1111111111111111111111111111111111111111"
    "#;

    #[test]
    fn test_env_var_substitution() {
        env::set_var("SAFE_EXEC_TEST_VAR", "test_value");
        let input = "url = \"https://api.example.com/${SAFE_EXEC_TEST_VAR}/endpoint\"";
        let result = substitute_env_vars(input);
        assert_eq!(result, "url = \"https://api.example.com/test_value/endpoint\"");
    }

    #[test]
    fn test_defaults() {
        let settings = Settings::from_toml(MINIMAL).unwrap();
        assert_eq!(settings.retry, RetryConfig::default());
        assert_eq!(settings.retry.max_retries, 3);
        assert_eq!(settings.retry.backoff_ms, 2000);
        assert_eq!(settings.retry.bump_multiplier, 1.2);
        assert_eq!(settings.retry.priority_fee(), gwei(30));
        assert_eq!(settings.retry.default_gas_limit, 10_000_000);
        assert_eq!(settings.wallet.private_key_env, "PK");
        assert!(settings.receipt.wait);
        assert_eq!(settings.receipt.timeout_secs, 600);
        assert_eq!(settings.logging.format, LogFormat::Pretty);
    }

    #[test]
    fn test_backoff_is_linear() {
        let retry = RetryConfig::default();
        assert_eq!(retry.backoff_for(0), Duration::from_millis(2000));
        assert_eq!(retry.backoff_for(1), Duration::from_millis(4000));
        assert_eq!(retry.backoff_for(2), Duration::from_millis(6000));
    }

    #[test]
    fn test_custom_retry_phrases() {
        let config = format!(
            "{}\n[retry]\nmax_retries = 5\nretryable_phrases = [\"Already Known\"]\n",
            MINIMAL
        );
        let settings = Settings::from_toml(&config).unwrap();
        assert_eq!(settings.retry.max_retries, 5);
        assert_eq!(settings.retry.backoff_ms, 2000);

        let classifier = settings.retry.classifier();
        assert!(classifier.is_retryable("already known"));
        assert!(!classifier.is_retryable("nonce too low"));
    }

    #[test]
    fn test_rejects_invalid_values() {
        let shrinking = format!("{}\n[retry]\nbump_multiplier = 0.9\n", MINIMAL);
        assert!(Settings::from_toml(&shrinking).is_err());

        let no_attempts = format!("{}\n[retry]\nmax_retries = 0\n", MINIMAL);
        assert!(Settings::from_toml(&no_attempts).is_err());

        let bad_address = MINIMAL.replace("0x1111111111111111111111111111111111111111", "0x1234");
        assert!(Settings::from_toml(&bad_address).is_err());
    }

    #[test]
    fn test_load_from_file() {
        env::set_var("SAFE_EXEC_TEST_RPC", "http://localhost:8545");
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            r#"
            [chain]
            chain_id = 31337
            rpc_url = "${{SAFE_EXEC_TEST_RPC}}"
            safe_address = "0x2222222222222222222222222222222222222222"

            [logging]
            format = "json"
            "#
        )
        .unwrap();

        let settings = Settings::load(file.path()).unwrap();
        assert_eq!(settings.chain.rpc_url, "http://localhost:8545");
        assert_eq!(settings.chain.chain_id, 31337);
        assert_eq!(settings.logging.format, LogFormat::Json);
        assert_eq!(
            settings.safe_address().unwrap(),
            Address::repeat_byte(0x22)
        );
    }
}
