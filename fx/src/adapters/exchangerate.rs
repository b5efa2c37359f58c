use std::time::Duration;

use async_trait::async_trait;
use fxdesk_common::{now, CurrencyKind, CurrencyPair, Quote};
use serde::Deserialize;
use tracing::{debug, instrument, warn};

use super::{decimal_from_json, http_client};
use crate::error::{FxError, FxResult};
use crate::provider::RateSource;

pub const EXCHANGERATE_DEFAULT_URL: &str = "https://v6.exchangerate-api.com/v6";
pub const EXCHANGERATE_API_KEY_ENV: &str = "EXCHANGERATE_API_KEY";

const NAME: &str = "exchangerate";

/// Fiat rates from the ExchangeRate-API `pair` endpoint.
pub struct ExchangeRateSource {
    client: reqwest::Client,
    base_url: String,
    api_key: Option<String>,
}

#[derive(Debug, Deserialize)]
struct PairResponse {
    result: String,
    #[serde(default)]
    conversion_rate: Option<serde_json::Number>,
    #[serde(rename = "error-type", default)]
    error_type: Option<String>,
}

impl ExchangeRateSource {
    pub fn new(
        base_url: impl Into<String>,
        api_key: Option<String>,
        timeout: Duration,
    ) -> FxResult<Self> {
        Ok(Self {
            client: http_client(NAME, timeout)?,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key: api_key.filter(|k| !k.trim().is_empty()),
        })
    }

    /// Read the API key from `EXCHANGERATE_API_KEY`.
    pub fn from_env(base_url: impl Into<String>, timeout: Duration) -> FxResult<Self> {
        let api_key = std::env::var(EXCHANGERATE_API_KEY_ENV).ok();
        if api_key.is_none() {
            warn!(env = EXCHANGERATE_API_KEY_ENV, "API key not set; fiat refresh will fail");
        }
        Self::new(base_url, api_key, timeout)
    }

    fn interpret(&self, pair: &CurrencyPair, body: PairResponse) -> FxResult<Quote> {
        if body.result != "success" {
            let error_type = body.error_type.unwrap_or_else(|| "unknown".to_string());
            if error_type == "unsupported-code" {
                return Err(FxError::RateNotFound(pair.clone()));
            }
            return Err(FxError::unavailable(NAME, format!("provider error: {}", error_type)));
        }

        let rate = body
            .conversion_rate
            .as_ref()
            .and_then(decimal_from_json)
            .ok_or_else(|| FxError::RateNotFound(pair.clone()))?;

        Ok(Quote::new(pair.clone(), rate, NAME, now())?)
    }
}

#[async_trait]
impl RateSource for ExchangeRateSource {
    fn name(&self) -> &str {
        NAME
    }

    fn serves(&self, kind: CurrencyKind) -> bool {
        kind == CurrencyKind::Fiat
    }

    #[instrument(skip(self), fields(source = NAME, pair = %pair))]
    async fn fetch(&self, pair: &CurrencyPair) -> FxResult<Quote> {
        let api_key = self
            .api_key
            .as_deref()
            .ok_or_else(|| FxError::unavailable(NAME, format!("{} is not set", EXCHANGERATE_API_KEY_ENV)))?;

        let url = format!(
            "{}/{}/pair/{}/{}",
            self.base_url,
            api_key,
            pair.base.code(),
            pair.quote.code()
        );

        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| FxError::unavailable(NAME, format!("request failed: {}", e.without_url())))?;

        let status = response.status();
        let body: Result<PairResponse, _> = response.json().await;

        match body {
            // Error bodies carry `error-type` even on non-2xx statuses.
            Ok(body) if status.is_success() || body.result == "error" => {
                let quote = self.interpret(pair, body)?;
                debug!(rate = %quote.rate, "Rate received");
                Ok(quote)
            }
            Ok(_) => Err(FxError::unavailable(NAME, format!("HTTP status {}", status))),
            Err(e) if status.is_success() => Err(FxError::unavailable(
                NAME,
                format!("invalid response body: {}", e),
            )),
            Err(_) => Err(FxError::unavailable(NAME, format!("HTTP status {}", status))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use fxdesk_common::Currency;
    use rust_decimal_macros::dec;

    fn source() -> ExchangeRateSource {
        ExchangeRateSource::new(
            EXCHANGERATE_DEFAULT_URL,
            Some("key".to_string()),
            Duration::from_secs(1),
        )
        .unwrap()
    }

    fn eur_usd() -> CurrencyPair {
        CurrencyPair::new(Currency::eur(), Currency::usd())
    }

    #[test]
    fn test_success_body() {
        let body: PairResponse =
            serde_json::from_str(r#"{"result":"success","base_code":"EUR","target_code":"USD","conversion_rate":1.0786}"#)
                .unwrap();

        let quote = source().interpret(&eur_usd(), body).unwrap();

        assert_eq!(quote.rate, dec!(1.0786));
        assert_eq!(quote.source, "exchangerate");
    }

    #[test]
    fn test_unsupported_code_is_not_found() {
        let body: PairResponse =
            serde_json::from_str(r#"{"result":"error","error-type":"unsupported-code"}"#).unwrap();

        assert!(matches!(
            source().interpret(&eur_usd(), body),
            Err(FxError::RateNotFound(_))
        ));
    }

    #[test]
    fn test_other_provider_error_is_unavailable() {
        let body: PairResponse =
            serde_json::from_str(r#"{"result":"error","error-type":"quota-reached"}"#).unwrap();

        assert!(matches!(
            source().interpret(&eur_usd(), body),
            Err(FxError::SourceUnavailable { ref reason, .. }) if reason.contains("quota-reached")
        ));
    }

    #[tokio::test]
    async fn test_missing_key_is_unavailable() {
        let source =
            ExchangeRateSource::new(EXCHANGERATE_DEFAULT_URL, Some("  ".into()), Duration::from_secs(1))
                .unwrap();

        assert!(matches!(
            source.fetch(&eur_usd()).await,
            Err(FxError::SourceUnavailable { .. })
        ));
    }
}
