use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use fxdesk_common::{now, CurrencyKind, CurrencyPair, Quote};
use tracing::{debug, instrument};

use super::{decimal_from_json, http_client};
use crate::error::{FxError, FxResult};
use crate::provider::RateSource;

pub const COINGECKO_DEFAULT_URL: &str = "https://api.coingecko.com/api/v3";

const NAME: &str = "coingecko";

/// Crypto prices from the CoinGecko `simple/price` endpoint.
pub struct CoinGeckoSource {
    client: reqwest::Client,
    base_url: String,
    /// Ticker to CoinGecko coin id.
    ids: HashMap<String, String>,
}

impl CoinGeckoSource {
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> FxResult<Self> {
        let ids = [("BTC", "bitcoin"), ("ETH", "ethereum"), ("SOL", "solana")]
            .into_iter()
            .map(|(ticker, id)| (ticker.to_string(), id.to_string()))
            .collect();
        Ok(Self {
            client: http_client(NAME, timeout)?,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            ids,
        })
    }

    /// Map an additional ticker to its CoinGecko id.
    pub fn with_coin_id(mut self, ticker: &str, id: &str) -> Self {
        self.ids.insert(ticker.trim().to_uppercase(), id.to_string());
        self
    }

    fn coin_id(&self, pair: &CurrencyPair) -> FxResult<&str> {
        self.ids
            .get(pair.base.code())
            .map(String::as_str)
            .ok_or_else(|| FxError::RateNotFound(pair.clone()))
    }
}

#[async_trait]
impl RateSource for CoinGeckoSource {
    fn name(&self) -> &str {
        NAME
    }

    fn serves(&self, kind: CurrencyKind) -> bool {
        kind == CurrencyKind::Crypto
    }

    #[instrument(skip(self), fields(source = NAME, pair = %pair))]
    async fn fetch(&self, pair: &CurrencyPair) -> FxResult<Quote> {
        let id = self.coin_id(pair)?;
        let vs = pair.quote.code().to_lowercase();

        let response = self
            .client
            .get(format!("{}/simple/price", self.base_url))
            .query(&[("ids", id), ("vs_currencies", vs.as_str())])
            .send()
            .await
            .map_err(|e| FxError::unavailable(NAME, format!("request failed: {}", e)))?;

        if !response.status().is_success() {
            return Err(FxError::unavailable(
                NAME,
                format!("HTTP status {}", response.status()),
            ));
        }

        // {"bitcoin": {"usd": 59337.21}}
        let body: HashMap<String, HashMap<String, serde_json::Value>> = response
            .json()
            .await
            .map_err(|e| FxError::unavailable(NAME, format!("invalid response body: {}", e)))?;

        let rate = body
            .get(id)
            .and_then(|prices| prices.get(&vs))
            .and_then(serde_json::Value::as_number)
            .and_then(decimal_from_json)
            .ok_or_else(|| FxError::RateNotFound(pair.clone()))?;

        debug!(%rate, "Price received");
        Ok(Quote::new(pair.clone(), rate, NAME, now())?)
    }
}
