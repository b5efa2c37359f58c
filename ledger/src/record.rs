//! Persisted shape of the history document.

use fxdesk_common::{HistoryId, Quote, Timestamp};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Current layout version of the history document.
pub const HISTORY_FORMAT_VERSION: u32 = 1;

/// One accepted quote.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistoryRecord {
    /// Deterministic id (`<PAIR>_<yyyyMMddTHHmmssZ>`).
    pub id: HistoryId,
    /// Pair key (`BTC_USD`).
    pub pair: String,
    /// Units of quote currency per unit of base currency.
    pub rate: Decimal,
    /// When the source observed the rate.
    pub observed_at: Timestamp,
    /// Source name.
    pub source: String,
}

impl HistoryRecord {
    pub fn from_quote(quote: &Quote) -> Self {
        Self {
            id: HistoryId::derive(&quote.pair, quote.observed_at),
            pair: quote.pair.key(),
            rate: quote.rate,
            observed_at: quote.observed_at,
            source: quote.source.clone(),
        }
    }

    /// Whether either leg of the record's pair has the given code.
    pub fn involves(&self, code: &str) -> bool {
        self.pair.split('_').any(|leg| leg.eq_ignore_ascii_case(code))
    }
}

/// Summary kept alongside the records.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistoryMeta {
    pub version: u32,
    pub total_records: usize,
    pub last_updated: Option<Timestamp>,
}

impl Default for HistoryMeta {
    fn default() -> Self {
        Self {
            version: HISTORY_FORMAT_VERSION,
            total_records: 0,
            last_updated: None,
        }
    }
}

/// The `exchange_rates` document.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistoryDocument {
    #[serde(default)]
    pub records: Vec<HistoryRecord>,
    #[serde(default)]
    pub meta: HistoryMeta,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use fxdesk_common::{Currency, CurrencyPair};
    use rust_decimal_macros::dec;

    #[test]
    fn test_record_document_shape() {
        let pair = CurrencyPair::new(Currency::btc(), Currency::usd());
        let at = Utc.with_ymd_and_hms(2026, 1, 10, 15, 0, 0).unwrap();
        let quote = Quote::new(pair, dec!(50000.5), "coingecko", at).unwrap();

        let record = HistoryRecord::from_quote(&quote);
        let json = serde_json::to_value(&record).unwrap();

        assert_eq!(json["id"], "BTCUSD_20260110T150000Z");
        assert_eq!(json["pair"], "BTC_USD");
        assert_eq!(json["rate"], "50000.5");
        assert_eq!(json["source"], "coingecko");
        assert!(record.involves("btc"));
        assert!(!record.involves("EUR"));
    }

    #[test]
    fn test_empty_document_parses() {
        let doc: HistoryDocument = serde_json::from_str("{}").unwrap();
        assert!(doc.records.is_empty());
        assert_eq!(doc.meta.version, HISTORY_FORMAT_VERSION);
    }
}
