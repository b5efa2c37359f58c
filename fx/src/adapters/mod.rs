//! HTTP rate sources.

mod coingecko;
mod exchangerate;

pub use coingecko::{CoinGeckoSource, COINGECKO_DEFAULT_URL};
pub use exchangerate::{ExchangeRateSource, EXCHANGERATE_API_KEY_ENV, EXCHANGERATE_DEFAULT_URL};

use std::str::FromStr;
use std::time::Duration;

use rust_decimal::Decimal;

use crate::error::{FxError, FxResult};

const USER_AGENT: &str = concat!("fxdesk/", env!("CARGO_PKG_VERSION"));

/// Build the HTTP client shared by a source's requests.
pub(crate) fn http_client(source: &str, timeout: Duration) -> FxResult<reqwest::Client> {
    reqwest::Client::builder()
        .user_agent(USER_AGENT)
        .timeout(timeout)
        .build()
        .map_err(|e| FxError::unavailable(source, format!("failed to build HTTP client: {}", e)))
}

/// Exact decimal value of a JSON number.
pub(crate) fn decimal_from_json(number: &serde_json::Number) -> Option<Decimal> {
    let text = number.to_string();
    Decimal::from_str(&text)
        .or_else(|_| Decimal::from_scientific(&text))
        .ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_decimal_from_json() {
        let value: serde_json::Value = serde_json::from_str("[59337.21, 1e-5, 3]").unwrap();
        let numbers: Vec<Decimal> = value
            .as_array()
            .unwrap()
            .iter()
            .map(|v| decimal_from_json(v.as_number().unwrap()).unwrap())
            .collect();

        assert_eq!(numbers, vec![dec!(59337.21), dec!(0.00001), dec!(3)]);
    }
}
