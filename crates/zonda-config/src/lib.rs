//! Configuration loading for the zonda exchange history exporter.
//!
//! Settings live in a single YAML file with one section per exchange plus a
//! `global` section for fetch behavior shared by every exchange. String
//! values of the form `${VAR}` are replaced with the environment variable
//! `VAR` at load time; values whose variable is unset are kept verbatim so
//! the problem surfaces as an authentication failure rather than a silently
//! empty credential.
//!
//! # Example
//!
//! ```
//! use zonda_config::Config;
//!
//! let config = Config::from_yaml(
//!     r"
//! exchanges:
//!   okx:
//!     accounts:
//!       - name: main
//!         api_key: k
//!         api_secret: s
//!         account_type: trading
//!         passphrase: p
//! ",
//! )
//! .unwrap();
//!
//! let okx = config.exchange("okx").unwrap();
//! assert!(okx.enabled);
//! assert_eq!(okx.accounts[0].name, "main");
//! assert_eq!(config.global.retry_times, 3);
//! ```

#![doc = include_str!("../README.md")]
#![doc(issue_tracker_base_url = "https://github.com/factordynamics/zonda/issues/")]
#![cfg_attr(docsrs, feature(doc_cfg, doc_auto_cfg))]
#![warn(missing_docs)]
#![forbid(unsafe_code)]

use std::collections::BTreeMap;
use std::fmt;
use std::fs;
use std::path::Path;
use std::time::Duration;

use serde::Deserialize;
use thiserror::Error;

/// Errors that can occur while loading configuration.
#[derive(Error, Debug)]
pub enum ConfigError {
    /// The config file could not be read from disk.
    #[error("cannot read config file: {0}")]
    Read(#[from] std::io::Error),

    /// The file is not valid YAML or does not match the expected shape.
    #[error("cannot parse config: {0}")]
    Parse(#[from] serde_yaml::Error),
}

/// Top-level configuration: global fetch settings plus a section per exchange.
#[derive(Debug, Clone, Deserialize, Default)]
pub struct Config {
    /// Fetch settings shared by all exchanges.
    #[serde(default)]
    pub global: GlobalConfig,
    /// Per-exchange sections keyed by exchange identifier (e.g. `binance_pm`).
    #[serde(default)]
    pub exchanges: BTreeMap<String, ExchangeConfig>,
}

impl Config {
    /// Loads configuration from a YAML file.
    ///
    /// Environment references (`${VAR}`) are resolved before deserialization.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let text = fs::read_to_string(path)?;
        Self::from_yaml(&text)
    }

    /// Parses configuration from YAML text.
    ///
    /// Environment references (`${VAR}`) are resolved before deserialization.
    pub fn from_yaml(text: &str) -> Result<Self, ConfigError> {
        let raw: serde_yaml::Value = serde_yaml::from_str(text)?;
        let resolved = resolve_values(raw, &|name| std::env::var(name).ok());
        Ok(serde_yaml::from_value(resolved)?)
    }

    /// Returns the section for an exchange, if configured.
    #[must_use]
    pub fn exchange(&self, name: &str) -> Option<&ExchangeConfig> {
        self.exchanges.get(name)
    }

    /// Iterates over exchanges that are present and enabled.
    pub fn enabled_exchanges(&self) -> impl Iterator<Item = (&str, &ExchangeConfig)> {
        self.exchanges
            .iter()
            .filter(|(_, exchange)| exchange.enabled)
            .map(|(name, exchange)| (name.as_str(), exchange))
    }
}

/// Fetch settings shared by all exchanges.
#[derive(Debug, Clone, Deserialize)]
pub struct GlobalConfig {
    /// Optional HTTP(S) proxy URL for all outbound requests.
    #[serde(default)]
    pub proxy: Option<String>,
    /// Retry budget for failed requests.
    #[serde(default = "default_retry_times")]
    pub retry_times: u32,
    /// Per-request timeout in seconds.
    #[serde(rename = "timeout", default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl GlobalConfig {
    /// Per-request timeout as a [`Duration`].
    #[must_use]
    pub const fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

impl Default for GlobalConfig {
    fn default() -> Self {
        Self {
            proxy: None,
            retry_times: default_retry_times(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

/// One exchange section: a toggle, its accounts, and its rate-limit ceilings.
#[derive(Debug, Clone, Deserialize)]
pub struct ExchangeConfig {
    /// Whether this exchange participates in fetch sessions.
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    /// Accounts to fetch for this exchange.
    #[serde(default)]
    pub accounts: Vec<AccountConfig>,
    /// Rate-limit ceilings advertised by the exchange.
    #[serde(default)]
    pub rate_limit: RateLimitConfig,
}

impl ExchangeConfig {
    /// Looks up an account by name.
    #[must_use]
    pub fn account(&self, name: &str) -> Option<&AccountConfig> {
        self.accounts.iter().find(|account| account.name == name)
    }
}

impl Default for ExchangeConfig {
    fn default() -> Self {
        Self {
            enabled: default_enabled(),
            accounts: Vec::new(),
            rate_limit: RateLimitConfig::default(),
        }
    }
}

/// Credentials and metadata for one exchange account.
///
/// The `Debug` representation masks every credential field, so account
/// configs are safe to log at any level.
#[derive(Clone, Deserialize)]
pub struct AccountConfig {
    /// Account name, used in logs and output paths.
    pub name: String,
    /// API key.
    pub api_key: String,
    /// API secret used for request signing.
    pub api_secret: String,
    /// Exchange-specific account type (e.g. `portfolio_margin`, `trading`).
    pub account_type: String,
    /// API passphrase, required by some exchanges (e.g. OKX).
    #[serde(default)]
    pub passphrase: Option<String>,
    /// Environment flag, e.g. OKX `0` for live and `1` for demo trading.
    #[serde(default)]
    pub flag: Option<String>,
}

impl fmt::Debug for AccountConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AccountConfig")
            .field("name", &self.name)
            .field("api_key", &"***")
            .field("api_secret", &"***")
            .field("account_type", &self.account_type)
            .field("passphrase", &self.passphrase.as_ref().map(|_| "***"))
            .field("flag", &self.flag)
            .finish()
    }
}

/// Rate-limit ceilings for one exchange.
#[derive(Debug, Clone, Deserialize)]
pub struct RateLimitConfig {
    /// Maximum requests per minute.
    #[serde(default = "default_max_requests_per_minute")]
    pub max_requests_per_minute: u32,
    /// Maximum request weight per minute.
    #[serde(default = "default_max_weight_per_minute")]
    pub max_weight_per_minute: u32,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            max_requests_per_minute: default_max_requests_per_minute(),
            max_weight_per_minute: default_max_weight_per_minute(),
        }
    }
}

const fn default_retry_times() -> u32 {
    3
}

const fn default_timeout_secs() -> u64 {
    30
}

const fn default_enabled() -> bool {
    true
}

const fn default_max_requests_per_minute() -> u32 {
    1200
}

const fn default_max_weight_per_minute() -> u32 {
    6000
}

/// Recursively resolves `${VAR}` references in string values.
///
/// Only whole-string references are substituted; a `${VAR}` embedded in a
/// longer string is left alone, as is a reference whose variable is unset.
fn resolve_values(
    value: serde_yaml::Value,
    lookup: &impl Fn(&str) -> Option<String>,
) -> serde_yaml::Value {
    match value {
        serde_yaml::Value::Mapping(map) => serde_yaml::Value::Mapping(
            map.into_iter()
                .map(|(key, inner)| (key, resolve_values(inner, lookup)))
                .collect(),
        ),
        serde_yaml::Value::Sequence(items) => serde_yaml::Value::Sequence(
            items
                .into_iter()
                .map(|inner| resolve_values(inner, lookup))
                .collect(),
        ),
        serde_yaml::Value::String(text) => serde_yaml::Value::String(resolve_reference(text, lookup)),
        other => other,
    }
}

fn resolve_reference(text: String, lookup: &impl Fn(&str) -> Option<String>) -> String {
    let name = text
        .strip_prefix("${")
        .and_then(|rest| rest.strip_suffix('}'));
    match name {
        Some(name) => lookup(name).unwrap_or(text),
        None => text,
    }
}
