//! Currency, pair and quote types.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::{CommonError, CommonResult};
use crate::time::Timestamp;

/// Whether a currency is government-issued or a crypto asset.
///
/// The kind of a pair decides which TTL governs its cached quotes and which
/// rate source is asked for it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CurrencyKind {
    /// Fiat money (USD, EUR, ...).
    Fiat,
    /// Crypto asset (BTC, ETH, ...).
    Crypto,
}

impl fmt::Display for CurrencyKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CurrencyKind::Fiat => write!(f, "fiat"),
            CurrencyKind::Crypto => write!(f, "crypto"),
        }
    }
}

/// A currency code together with its kind.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Currency {
    code: String,
    kind: CurrencyKind,
}

impl Currency {
    /// Create a currency, normalizing and validating the code.
    ///
    /// Codes are upper-cased and trimmed, must be 2-5 characters long and must
    /// not contain whitespace.
    pub fn new(code: &str, kind: CurrencyKind) -> CommonResult<Self> {
        let code = code.trim().to_uppercase();
        if !(2..=5).contains(&code.chars().count()) || code.chars().any(char::is_whitespace) {
            return Err(CommonError::InvalidCurrencyCode(code));
        }
        Ok(Self { code, kind })
    }

    /// Get the currency code.
    pub fn code(&self) -> &str {
        &self.code
    }

    /// Get the currency kind.
    pub fn kind(&self) -> CurrencyKind {
        self.kind
    }

    pub fn is_crypto(&self) -> bool {
        self.kind == CurrencyKind::Crypto
    }

    /// Common currencies
    pub fn usd() -> Self {
        Self::known("USD", CurrencyKind::Fiat)
    }

    pub fn eur() -> Self {
        Self::known("EUR", CurrencyKind::Fiat)
    }

    pub fn gbp() -> Self {
        Self::known("GBP", CurrencyKind::Fiat)
    }

    pub fn btc() -> Self {
        Self::known("BTC", CurrencyKind::Crypto)
    }

    pub fn eth() -> Self {
        Self::known("ETH", CurrencyKind::Crypto)
    }

    fn known(code: &str, kind: CurrencyKind) -> Self {
        Self {
            code: code.to_string(),
            kind,
        }
    }
}

impl fmt::Display for Currency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.code)
    }
}

/// A normalized currency pair.
///
/// When one leg is crypto and the other fiat, the crypto leg is always the
/// base, so `BTC/USD` and `USD/BTC` address the same cache entry.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CurrencyPair {
    /// Base currency (being bought/sold).
    pub base: Currency,
    /// Quote currency (pricing currency).
    pub quote: Currency,
}

impl CurrencyPair {
    /// Create a new currency pair in normalized order.
    pub fn new(base: Currency, quote: Currency) -> Self {
        if !base.is_crypto() && quote.is_crypto() {
            Self {
                base: quote,
                quote: base,
            }
        } else {
            Self { base, quote }
        }
    }

    /// Crypto if either leg is crypto, otherwise fiat.
    pub fn kind(&self) -> CurrencyKind {
        if self.base.is_crypto() || self.quote.is_crypto() {
            CurrencyKind::Crypto
        } else {
            CurrencyKind::Fiat
        }
    }

    /// Document key form, e.g. `BTC_USD`.
    pub fn key(&self) -> String {
        format!("{}_{}", self.base.code(), self.quote.code())
    }

    /// Compact form used as the history id prefix, e.g. `BTCUSD`.
    pub fn compact(&self) -> String {
        format!("{}{}", self.base.code(), self.quote.code())
    }

    /// Whether either leg has the given code.
    pub fn involves(&self, code: &str) -> bool {
        self.base.code() == code || self.quote.code() == code
    }
}

impl fmt::Display for CurrencyPair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}_{}", self.base, self.quote)
    }
}

/// One price observation for a currency pair from one source at one instant.
///
/// `rate` is the price of one unit of `pair.base` expressed in `pair.quote`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Quote {
    /// The currency pair.
    pub pair: CurrencyPair,
    /// Units of quote currency per unit of base currency.
    pub rate: Decimal,
    /// Rate source name.
    pub source: String,
    /// When the source observed this rate.
    pub observed_at: Timestamp,
}

impl Quote {
    /// Create a new quote; the rate must be positive and the source named.
    pub fn new(
        pair: CurrencyPair,
        rate: Decimal,
        source: impl Into<String>,
        observed_at: Timestamp,
    ) -> CommonResult<Self> {
        let source = source.into();
        if rate <= Decimal::ZERO {
            return Err(CommonError::InvalidRate(format!("{} for {}", rate, pair)));
        }
        if source.trim().is_empty() {
            return Err(CommonError::InvalidRate(format!("empty source for {}", pair)));
        }
        Ok(Self {
            pair,
            rate,
            source: source.trim().to_string(),
            observed_at,
        })
    }

    /// Price of `amount` units of `currency` expressed in the other leg.
    ///
    /// Converting from the base multiplies by the rate; converting from the
    /// quote divides by it. Fails with `Overflow` instead of panicking when
    /// the result is out of the decimal range.
    pub fn convert(&self, amount: Decimal, currency: &Currency) -> CommonResult<Decimal> {
        let converted = if *currency == self.pair.base {
            amount.checked_mul(self.rate)
        } else if *currency == self.pair.quote {
            amount.checked_div(self.rate)
        } else {
            return Err(CommonError::InvalidPair(format!(
                "{} is not a leg of {}",
                currency, self.pair
            )));
        };
        converted.ok_or_else(|| {
            CommonError::Overflow(format!("{} {} at {} {}", amount, currency, self.rate, self.pair))
        })
    }
}
