//! Persisted shape of the rates cache.

use std::collections::BTreeMap;

use fxdesk_common::{Quote, Timestamp};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Name of the document holding the latest quote per pair.
pub const RATES_DOCUMENT: &str = "rates";

/// Latest accepted quote for one pair.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RateEntry {
    pub rate: Decimal,
    /// Observation time of the quote.
    pub updated_at: Timestamp,
    pub source: String,
}

impl From<&Quote> for RateEntry {
    fn from(quote: &Quote) -> Self {
        Self {
            rate: quote.rate,
            updated_at: quote.observed_at,
            source: quote.source.clone(),
        }
    }
}

/// The `rates` document, keyed by `BASE_QUOTE`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RatesDocument {
    #[serde(default)]
    pub pairs: BTreeMap<String, RateEntry>,
    #[serde(default)]
    pub last_refresh: Option<Timestamp>,
}

impl RatesDocument {
    /// Store a quote if it is strictly newer than the stored one.
    ///
    /// Returns whether the entry was replaced.
    pub fn publish(&mut self, quote: &Quote) -> bool {
        let key = quote.pair.key();
        let newer = self
            .pairs
            .get(&key)
            .map_or(true, |existing| quote.observed_at > existing.updated_at);
        if newer {
            self.pairs.insert(key, RateEntry::from(quote));
        }
        newer
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone, Utc};
    use fxdesk_common::{Currency, CurrencyPair};
    use rust_decimal_macros::dec;

    #[test]
    fn test_publish_only_newer() {
        let pair = CurrencyPair::new(Currency::btc(), Currency::usd());
        let at = Utc.with_ymd_and_hms(2026, 1, 10, 15, 0, 0).unwrap();
        let mut doc = RatesDocument::default();

        assert!(doc.publish(&Quote::new(pair.clone(), dec!(100), "a", at).unwrap()));
        assert!(!doc.publish(&Quote::new(pair.clone(), dec!(200), "a", at).unwrap()));
        assert!(!doc.publish(
            &Quote::new(pair.clone(), dec!(300), "a", at - Duration::seconds(1)).unwrap()
        ));
        assert!(doc.publish(
            &Quote::new(pair, dec!(400), "a", at + Duration::seconds(1)).unwrap()
        ));

        assert_eq!(doc.pairs["BTC_USD"].rate, dec!(400));
    }

    #[test]
    fn test_document_shape() {
        let pair = CurrencyPair::new(Currency::eur(), Currency::usd());
        let at = Utc.with_ymd_and_hms(2026, 1, 10, 15, 0, 0).unwrap();
        let mut doc = RatesDocument::default();
        doc.publish(&Quote::new(pair, dec!(1.08), "exchangerate", at).unwrap());

        let json = serde_json::to_value(&doc).unwrap();

        assert_eq!(json["pairs"]["EUR_USD"]["rate"], "1.08");
        assert_eq!(json["pairs"]["EUR_USD"]["source"], "exchangerate");
        assert_eq!(json["pairs"]["EUR_USD"]["updated_at"], "2026-01-10T15:00:00Z");
    }
}
