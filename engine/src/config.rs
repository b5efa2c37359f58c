//! Desk configuration.

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::time::Duration;

use fxdesk_common::{Currency, CurrencyRegistry};
use fxdesk_fx::adapters::{COINGECKO_DEFAULT_URL, EXCHANGERATE_DEFAULT_URL};
use fxdesk_fx::{RateCacheConfig, TtlPolicy};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Default config file looked up in the working directory.
pub const DEFAULT_CONFIG_FILE: &str = "fxdesk.toml";

/// Prefix of environment overrides (`FXDESK_DATA_DIR`, ...).
pub const ENV_PREFIX: &str = "FXDESK_";

/// Upper bound of every TTL, timeout and interval (ten years).
pub const MAX_DURATION_SECONDS: u64 = 10 * 365 * 24 * 60 * 60;

/// Configuration loading and validation errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Cannot read config file {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Cannot parse config file: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Invalid value '{value}' for {key}")]
    Env { key: String, value: String },

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

/// Desk configuration.
///
/// Every key is optional in the file; missing keys take their defaults.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DeskConfig {
    /// TTL of fiat quotes.
    pub rates_ttl_fiat_seconds: u64,
    /// TTL of crypto quotes.
    pub rates_ttl_crypto_seconds: u64,
    /// Currencies the desk trades, base included.
    pub supported_currencies: Vec<String>,
    /// Subset of `supported_currencies` that are crypto assets.
    pub crypto_currencies: Vec<String>,
    /// Currency trades are settled in.
    pub base_currency: String,
    /// Directory holding the JSON documents.
    pub data_dir: PathBuf,
    /// Base currency balance of a new portfolio.
    pub initial_balance: Decimal,
    pub fetch_timeout_seconds: u64,
    pub fiat_refresh_interval_seconds: u64,
    pub crypto_refresh_interval_seconds: u64,
    pub coingecko_url: String,
    pub exchangerate_url: String,
    /// Default log filter when `RUST_LOG` is unset.
    pub log_level: String,
}

impl Default for DeskConfig {
    fn default() -> Self {
        Self {
            rates_ttl_fiat_seconds: 86_400,
            rates_ttl_crypto_seconds: 300,
            supported_currencies: ["USD", "EUR", "GBP", "RUB", "BTC", "ETH", "SOL"]
                .iter()
                .map(|c| c.to_string())
                .collect(),
            crypto_currencies: ["BTC", "ETH", "SOL"].iter().map(|c| c.to_string()).collect(),
            base_currency: "USD".to_string(),
            data_dir: PathBuf::from("data"),
            initial_balance: Decimal::from(1000),
            fetch_timeout_seconds: 10,
            fiat_refresh_interval_seconds: 3600,
            crypto_refresh_interval_seconds: 300,
            coingecko_url: COINGECKO_DEFAULT_URL.to_string(),
            exchangerate_url: EXCHANGERATE_DEFAULT_URL.to_string(),
            log_level: "info".to_string(),
        }
    }
}

impl DeskConfig {
    /// Parse a TOML config file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml(&text)
    }

    pub fn from_toml(text: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(text)?)
    }

    /// Resolve the effective configuration.
    ///
    /// Reads `path` if given, otherwise `fxdesk.toml` if present, otherwise
    /// the defaults; then applies `FXDESK_*` overrides and validates.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let mut config = match path {
            Some(path) => Self::from_file(path)?,
            None if Path::new(DEFAULT_CONFIG_FILE).exists() => {
                Self::from_file(DEFAULT_CONFIG_FILE)?
            }
            None => Self::default(),
        };
        config.apply_env()?;
        config.validate()?;
        Ok(config)
    }

    /// Apply overrides from the process environment.
    pub fn apply_env(&mut self) -> Result<(), ConfigError> {
        self.apply_overrides(|key| std::env::var(format!("{}{}", ENV_PREFIX, key)).ok())
    }

    /// Apply overrides from a lookup keyed by upper-case config key.
    pub fn apply_overrides<F>(&mut self, lookup: F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        fn number<T: std::str::FromStr>(key: &str, value: &str) -> Result<T, ConfigError> {
            value.trim().parse().map_err(|_| ConfigError::Env {
                key: format!("{}{}", ENV_PREFIX, key),
                value: value.to_string(),
            })
        }

        fn list(value: &str) -> Vec<String> {
            value
                .split(',')
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(str::to_string)
                .collect()
        }

        if let Some(v) = lookup("RATES_TTL_FIAT_SECONDS") {
            self.rates_ttl_fiat_seconds = number("RATES_TTL_FIAT_SECONDS", &v)?;
        }
        if let Some(v) = lookup("RATES_TTL_CRYPTO_SECONDS") {
            self.rates_ttl_crypto_seconds = number("RATES_TTL_CRYPTO_SECONDS", &v)?;
        }
        if let Some(v) = lookup("SUPPORTED_CURRENCIES") {
            self.supported_currencies = list(&v);
        }
        if let Some(v) = lookup("CRYPTO_CURRENCIES") {
            self.crypto_currencies = list(&v);
        }
        if let Some(v) = lookup("BASE_CURRENCY") {
            self.base_currency = v.trim().to_string();
        }
        if let Some(v) = lookup("DATA_DIR") {
            self.data_dir = PathBuf::from(v);
        }
        if let Some(v) = lookup("INITIAL_BALANCE") {
            self.initial_balance = number("INITIAL_BALANCE", &v)?;
        }
        if let Some(v) = lookup("FETCH_TIMEOUT_SECONDS") {
            self.fetch_timeout_seconds = number("FETCH_TIMEOUT_SECONDS", &v)?;
        }
        if let Some(v) = lookup("FIAT_REFRESH_INTERVAL_SECONDS") {
            self.fiat_refresh_interval_seconds = number("FIAT_REFRESH_INTERVAL_SECONDS", &v)?;
        }
        if let Some(v) = lookup("CRYPTO_REFRESH_INTERVAL_SECONDS") {
            self.crypto_refresh_interval_seconds = number("CRYPTO_REFRESH_INTERVAL_SECONDS", &v)?;
        }
        if let Some(v) = lookup("COINGECKO_URL") {
            self.coingecko_url = v;
        }
        if let Some(v) = lookup("EXCHANGERATE_URL") {
            self.exchangerate_url = v;
        }
        if let Some(v) = lookup("LOG_LEVEL") {
            self.log_level = v;
        }

        Ok(())
    }

    /// Validate configuration.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let invalid = |msg: &str| Err(ConfigError::Invalid(msg.to_string()));

        for (key, seconds) in [
            ("rates_ttl_fiat_seconds", self.rates_ttl_fiat_seconds),
            ("rates_ttl_crypto_seconds", self.rates_ttl_crypto_seconds),
            ("fetch_timeout_seconds", self.fetch_timeout_seconds),
            ("fiat_refresh_interval_seconds", self.fiat_refresh_interval_seconds),
            ("crypto_refresh_interval_seconds", self.crypto_refresh_interval_seconds),
        ] {
            if !(1..=MAX_DURATION_SECONDS).contains(&seconds) {
                return Err(ConfigError::Invalid(format!(
                    "{} must be between 1 and {}, got {}",
                    key, MAX_DURATION_SECONDS, seconds
                )));
            }
        }
        if self.initial_balance.is_sign_negative() {
            return invalid("initial_balance cannot be negative");
        }
        if self.data_dir.as_os_str().is_empty() {
            return invalid("data_dir cannot be empty");
        }

        let supported: BTreeSet<String> = self.normalized(&self.supported_currencies);
        let base = self.base_currency.trim().to_uppercase();
        if !supported.contains(&base) {
            return Err(ConfigError::Invalid(format!(
                "base_currency {} is not in supported_currencies",
                base
            )));
        }
        if let Some(stray) = self
            .normalized(&self.crypto_currencies)
            .into_iter()
            .find(|c| !supported.contains(c))
        {
            return Err(ConfigError::Invalid(format!(
                "crypto currency {} is not in supported_currencies",
                stray
            )));
        }

        self.registry()?;
        Ok(())
    }

    /// Currency registry described by this configuration.
    pub fn registry(&self) -> Result<CurrencyRegistry, ConfigError> {
        let crypto = self.normalized(&self.crypto_currencies);
        CurrencyRegistry::from_codes(&self.supported_currencies, &crypto)
            .map_err(|e| ConfigError::Invalid(e.to_string()))
    }

    /// Currency every trade is priced in.
    pub fn base(&self, registry: &CurrencyRegistry) -> Result<Currency, ConfigError> {
        registry
            .resolve(&self.base_currency)
            .map_err(|e| ConfigError::Invalid(e.to_string()))
    }

    /// Values above [`MAX_DURATION_SECONDS`] are clamped to it.
    pub fn ttl_policy(&self) -> TtlPolicy {
        TtlPolicy {
            fiat: chrono::Duration::seconds(bounded(self.rates_ttl_fiat_seconds) as i64),
            crypto: chrono::Duration::seconds(bounded(self.rates_ttl_crypto_seconds) as i64),
        }
    }

    pub fn fetch_timeout(&self) -> Duration {
        Duration::from_secs(bounded(self.fetch_timeout_seconds))
    }

    pub fn fiat_refresh_interval(&self) -> Duration {
        Duration::from_secs(bounded(self.fiat_refresh_interval_seconds))
    }

    pub fn crypto_refresh_interval(&self) -> Duration {
        Duration::from_secs(bounded(self.crypto_refresh_interval_seconds))
    }

    /// Rate cache settings: every supported currency priced against the base.
    pub fn rate_cache_config(&self, registry: &CurrencyRegistry, base: &Currency) -> RateCacheConfig {
        RateCacheConfig {
            ttl: self.ttl_policy(),
            fetch_timeout: self.fetch_timeout(),
            pairs: registry.pairs_against(base),
        }
    }

    fn normalized(&self, codes: &[String]) -> BTreeSet<String> {
        codes.iter().map(|c| c.trim().to_uppercase()).collect()
    }
}

fn bounded(seconds: u64) -> u64 {
    seconds.min(MAX_DURATION_SECONDS)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;
    use std::collections::HashMap;

    #[test]
    fn test_default_config() {
        let config = DeskConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.ttl_policy(), TtlPolicy::default());
        assert_eq!(config.crypto_refresh_interval(), Duration::from_secs(300));
    }

    #[test]
    fn test_partial_file_keeps_defaults() {
        let config = DeskConfig::from_toml(
            r#"
            rates_ttl_crypto_seconds = 60
            data_dir = "/tmp/fxdesk"
            initial_balance = 250
            "#,
        )
        .unwrap();

        assert_eq!(config.rates_ttl_crypto_seconds, 60);
        assert_eq!(config.rates_ttl_fiat_seconds, 86_400);
        assert_eq!(config.data_dir, PathBuf::from("/tmp/fxdesk"));
        assert_eq!(config.initial_balance, dec!(250));
    }

    #[test]
    fn test_env_overrides() {
        let env: HashMap<&str, &str> = [
            ("RATES_TTL_FIAT_SECONDS", "3600"),
            ("SUPPORTED_CURRENCIES", "usd, eur ,btc"),
            ("CRYPTO_CURRENCIES", "btc"),
        ]
        .into_iter()
        .collect();
        let mut config = DeskConfig::default();

        config
            .apply_overrides(|key| env.get(key).map(|v| v.to_string()))
            .unwrap();

        assert_eq!(config.rates_ttl_fiat_seconds, 3600);
        assert_eq!(config.supported_currencies, vec!["usd", "eur", "btc"]);
        assert!(config.validate().is_ok());
        let registry = config.registry().unwrap();
        assert_eq!(registry.pairs_against(&Currency::usd()).len(), 2);
    }

    #[test]
    fn test_bad_env_value() {
        let mut config = DeskConfig::default();
        let err = config
            .apply_overrides(|key| (key == "FETCH_TIMEOUT_SECONDS").then(|| "soon".to_string()))
            .unwrap_err();
        assert!(matches!(err, ConfigError::Env { ref key, .. } if key == "FXDESK_FETCH_TIMEOUT_SECONDS"));
    }

    #[test]
    fn test_invalid_config() {
        let mut config = DeskConfig::default();
        config.base_currency = "CHF".to_string();
        assert!(config.validate().is_err());

        let mut config = DeskConfig::default();
        config.rates_ttl_crypto_seconds = 0;
        assert!(config.validate().is_err());

        let mut config = DeskConfig::default();
        config.crypto_currencies.push("DOGE".to_string());
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_duration_limits() {
        for seconds in [100_000_000_000_000, i64::MAX as u64, u64::MAX, MAX_DURATION_SECONDS + 1] {
            let mut config = DeskConfig::default();
            config.rates_ttl_crypto_seconds = seconds;
            assert!(matches!(config.validate(), Err(ConfigError::Invalid(_))));

            let mut config = DeskConfig::default();
            config.fiat_refresh_interval_seconds = seconds;
            assert!(config.validate().is_err());

            let mut config = DeskConfig::default();
            config.fetch_timeout_seconds = seconds;
            assert!(config.validate().is_err());
        }

        let mut config = DeskConfig::default();
        config.rates_ttl_fiat_seconds = MAX_DURATION_SECONDS;
        config.crypto_refresh_interval_seconds = MAX_DURATION_SECONDS;
        assert!(config.validate().is_ok());
        assert_eq!(
            config.ttl_policy().fiat,
            chrono::Duration::seconds(MAX_DURATION_SECONDS as i64)
        );

        // Unvalidated values never wrap or panic.
        config.rates_ttl_crypto_seconds = u64::MAX;
        config.fiat_refresh_interval_seconds = u64::MAX;
        assert!(config.ttl_policy().crypto > chrono::Duration::zero());
        assert_eq!(
            config.fiat_refresh_interval(),
            Duration::from_secs(MAX_DURATION_SECONDS)
        );
    }
}
