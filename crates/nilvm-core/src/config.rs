//! Client configuration
//!
//! Loaded from a TOML or JSON file chosen by extension, then overridden by
//! `NILLION_*` environment variables, then validated.

use crate::effects::RetryPolicy;
use crate::types::PaymentMode;
use crate::{NilError, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// Prefix of every environment variable read by [`ClientConfig::merge_with_env`]
pub const ENV_PREFIX: &str = "NILLION_";

/// Retry settings for node calls
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetrySettings {
    /// Attempts per node call, first one included
    pub max_attempts: u32,
    /// Delay between attempts in milliseconds
    pub delay_ms: u64,
}

impl Default for RetrySettings {
    fn default() -> Self {
        Self {
            max_attempts: crate::effects::DEFAULT_MAX_ATTEMPTS,
            delay_ms: crate::effects::DEFAULT_RETRY_DELAY.as_millis() as u64,
        }
    }
}

impl RetrySettings {
    /// Build the retry policy these settings describe
    pub fn policy(&self) -> RetryPolicy {
        RetryPolicy::fixed(Duration::from_millis(self.delay_ms)).with_max_attempts(self.max_attempts)
    }
}

/// Configuration of a client session
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    /// Node used to discover the cluster
    pub bootnode_url: String,
    /// Payment chain RPC endpoint
    pub chain_url: String,
    /// Seed the user's identity key is derived from
    pub user_seed: String,
    /// Lifetime of node auth tokens in seconds
    pub auth_token_ttl_secs: u64,
    /// How priced operations are settled
    pub payment_mode: PaymentMode,
    /// Hex-encoded leader key used to verify quote signatures
    pub leader_public_key: Option<String>,
    /// Per-request timeout in seconds
    pub request_timeout_secs: u64,
    /// Retry settings for node calls
    pub retry: RetrySettings,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            bootnode_url: "http://127.0.0.1:43207".to_string(),
            chain_url: "http://127.0.0.1:48102".to_string(),
            user_seed: String::new(),
            auth_token_ttl_secs: 60,
            payment_mode: PaymentMode::default(),
            leader_public_key: None,
            request_timeout_secs: 30,
            retry: RetrySettings::default(),
        }
    }
}

impl ClientConfig {
    /// Load configuration from a `.toml` or `.json` file
    pub fn load_from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| NilError::internal(format!("Failed to read config file: {e}")))?;

        match path.extension().and_then(|ext| ext.to_str()) {
            Some("toml") => toml::from_str(&content)
                .map_err(|e| NilError::invalid(format!("Invalid TOML: {e}"))),
            Some("json") => serde_json::from_str(&content)
                .map_err(|e| NilError::invalid(format!("Invalid JSON: {e}"))),
            _ => Err(NilError::invalid("Unsupported file format")),
        }
    }

    /// Load, merge with the process environment and validate
    pub fn load(path: &Path) -> Result<Self> {
        let mut config = Self::load_from_file(path)?;
        config.merge_with_env()?;
        config.validate()?;
        Ok(config)
    }

    /// Override fields from `NILLION_*` environment variables
    pub fn merge_with_env(&mut self) -> Result<()> {
        self.merge_with_vars(|key| std::env::var(key).ok())
    }

    /// Override fields from a variable lookup
    pub fn merge_with_vars(&mut self, lookup: impl Fn(&str) -> Option<String>) -> Result<()> {
        for key in [
            "bootnode_url",
            "chain_url",
            "user_seed",
            "auth_token_ttl_secs",
            "payment_mode",
            "leader_public_key",
            "request_timeout_secs",
            "retry_max_attempts",
            "retry_delay_ms",
        ] {
            let var = format!("{ENV_PREFIX}{}", key.to_uppercase());
            if let Some(value) = lookup(&var) {
                self.set_from_string(key, &value)?;
            }
        }
        Ok(())
    }

    /// Set a single field from its string form
    pub fn set_from_string(&mut self, key: &str, value: &str) -> Result<()> {
        match key {
            "bootnode_url" => self.bootnode_url = value.to_string(),
            "chain_url" => self.chain_url = value.to_string(),
            "user_seed" => self.user_seed = value.to_string(),
            "auth_token_ttl_secs" => self.auth_token_ttl_secs = parse_number(key, value)?,
            "payment_mode" => {
                self.payment_mode = match value {
                    "from_balance" => PaymentMode::FromBalance,
                    "pay_per_operation" => PaymentMode::PayPerOperation,
                    other => {
                        return Err(NilError::invalid(format!("Unknown payment mode: {other}")))
                    }
                }
            }
            "leader_public_key" => self.leader_public_key = Some(value.to_string()),
            "request_timeout_secs" => self.request_timeout_secs = parse_number(key, value)?,
            "retry_max_attempts" => self.retry.max_attempts = parse_number(key, value)?,
            "retry_delay_ms" => self.retry.delay_ms = parse_number(key, value)?,
            _ => {
                return Err(NilError::invalid(format!(
                    "Unknown configuration key: {key}"
                )))
            }
        }
        Ok(())
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        for (name, value) in [("bootnode_url", &self.bootnode_url), ("chain_url", &self.chain_url)]
        {
            url::Url::parse(value)
                .map_err(|e| NilError::invalid(format!("Invalid {name} '{value}': {e}")))?;
        }
        if self.user_seed.is_empty() {
            return Err(NilError::invalid("user_seed cannot be empty"));
        }
        if self.auth_token_ttl_secs == 0 {
            return Err(NilError::invalid("auth_token_ttl_secs must be positive"));
        }
        if self.request_timeout_secs == 0 {
            return Err(NilError::invalid("request_timeout_secs must be positive"));
        }
        if self.retry.max_attempts == 0 {
            return Err(NilError::invalid("retry.max_attempts must be at least 1"));
        }
        if let Some(key) = &self.leader_public_key {
            let bytes = hex::decode(key)
                .map_err(|e| NilError::invalid(format!("Invalid leader_public_key: {e}")))?;
            if bytes.len() != 32 {
                return Err(NilError::invalid("leader_public_key must be 32 bytes"));
            }
        }
        Ok(())
    }

    /// Token lifetime as a duration
    pub fn auth_token_ttl(&self) -> Duration {
        Duration::from_secs(self.auth_token_ttl_secs)
    }

    /// Request timeout as a duration
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

fn parse_number<T: std::str::FromStr>(key: &str, value: &str) -> Result<T> {
    value
        .parse()
        .map_err(|_| NilError::invalid(format!("Invalid number for {key}: {value}")))
}
