//! Rate cache with per-kind TTL.
//!
//! The cache is the single owner of cache entries. A miss (or an expired
//! entry) triggers one fetch from the source serving the pair's kind; the
//! accepted quote is appended to the history ledger first and only then
//! published, so a crash in between costs a redundant refresh but never loses
//! history.

use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::Duration;
use dashmap::DashMap;
use futures::future::join_all;
use fxdesk_common::{
    is_expired_at, Clock, Currency, CurrencyKind, CurrencyPair, CurrencyRegistry, Quote,
    Timestamp,
};
use fxdesk_ledger::HistoryLedger;
use fxdesk_store::{DocumentKey, DocumentStore};
use tokio::sync::Mutex as AsyncMutex;
use tracing::{debug, info, instrument, warn};

use crate::document::{RatesDocument, RATES_DOCUMENT};
use crate::error::{FxError, FxResult};
use crate::provider::RateSource;

/// Time-to-live of a quote by pair kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TtlPolicy {
    pub fiat: Duration,
    pub crypto: Duration,
}

impl TtlPolicy {
    pub fn ttl(&self, kind: CurrencyKind) -> Duration {
        match kind {
            CurrencyKind::Fiat => self.fiat,
            CurrencyKind::Crypto => self.crypto,
        }
    }
}

impl Default for TtlPolicy {
    fn default() -> Self {
        Self {
            fiat: Duration::seconds(86_400),
            crypto: Duration::seconds(300),
        }
    }
}

/// What `get_with` does when a refresh fails and only a stale entry exists.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum StalePolicy {
    /// Fail with `RefreshFailed`.
    #[default]
    Reject,
    /// Return the stale entry, marked [`Freshness::Stale`].
    AllowStale,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Freshness {
    Fresh,
    Stale,
}

/// The live quote for a pair.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheEntry {
    pub quote: Quote,
    /// Always `quote.observed_at + ttl(pair.kind)`.
    pub expires_at: Timestamp,
}

impl CacheEntry {
    pub fn new(quote: Quote, ttl: &TtlPolicy) -> Self {
        let expires_at = quote.observed_at + ttl.ttl(quote.pair.kind());
        Self { quote, expires_at }
    }

    pub fn is_live_at(&self, at: Timestamp) -> bool {
        !is_expired_at(self.expires_at, at)
    }
}

/// A quote handed out by the cache, with its freshness made explicit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CachedQuote {
    pub quote: Quote,
    pub expires_at: Timestamp,
    pub freshness: Freshness,
}

impl CachedQuote {
    fn from_entry(entry: &CacheEntry, at: Timestamp) -> Self {
        let freshness = if entry.is_live_at(at) {
            Freshness::Fresh
        } else {
            Freshness::Stale
        };
        Self {
            quote: entry.quote.clone(),
            expires_at: entry.expires_at,
            freshness,
        }
    }

    pub fn is_stale(&self) -> bool {
        self.freshness == Freshness::Stale
    }
}

/// Configuration for the rate cache.
#[derive(Debug, Clone)]
pub struct RateCacheConfig {
    pub ttl: TtlPolicy,
    /// Upper bound on a single source fetch.
    pub fetch_timeout: std::time::Duration,
    /// Pairs refreshed by `refresh_all`.
    pub pairs: Vec<CurrencyPair>,
}

impl Default for RateCacheConfig {
    fn default() -> Self {
        Self {
            ttl: TtlPolicy::default(),
            fetch_timeout: std::time::Duration::from_secs(10),
            pairs: CurrencyRegistry::default().pairs_against(&Currency::usd()),
        }
    }
}

/// Per-pair outcome of a bulk refresh, keyed by `BASE_QUOTE`.
#[derive(Debug, Default)]
pub struct RefreshReport {
    pub outcomes: BTreeMap<String, FxResult<Quote>>,
}

impl RefreshReport {
    pub fn succeeded(&self) -> impl Iterator<Item = &Quote> {
        self.outcomes.values().filter_map(|r| r.as_ref().ok())
    }

    pub fn failed(&self) -> impl Iterator<Item = (&String, &FxError)> {
        self.outcomes
            .iter()
            .filter_map(|(key, r)| r.as_ref().err().map(|e| (key, e)))
    }

    pub fn success_count(&self) -> usize {
        self.succeeded().count()
    }

    pub fn failure_count(&self) -> usize {
        self.failed().count()
    }

    pub fn is_empty(&self) -> bool {
        self.outcomes.is_empty()
    }
}

/// TTL cache in front of the rate sources.
pub struct RateCache {
    config: RateCacheConfig,
    sources: Vec<Arc<dyn RateSource>>,
    ledger: HistoryLedger,
    store: Arc<DocumentStore>,
    key: DocumentKey,
    clock: Arc<dyn Clock>,
    entries: DashMap<CurrencyPair, CacheEntry>,
    /// Coalesces concurrent misses on one pair into a single fetch.
    refresh_guards: DashMap<CurrencyPair, Arc<AsyncMutex<()>>>,
}

impl RateCache {
    /// Create a cache, loading previously published quotes from the store.
    pub fn new(
        config: RateCacheConfig,
        sources: Vec<Arc<dyn RateSource>>,
        ledger: HistoryLedger,
        store: Arc<DocumentStore>,
        registry: &CurrencyRegistry,
        clock: Arc<dyn Clock>,
    ) -> FxResult<Self> {
        let key = DocumentKey::new(RATES_DOCUMENT)?;
        let document: RatesDocument = store.read(&key)?;

        let entries = DashMap::new();
        for (pair_key, entry) in &document.pairs {
            let pair = match registry.pair_from_key(pair_key) {
                Ok(pair) => pair,
                Err(e) => {
                    warn!(pair = %pair_key, error = %e, "Skipping cached rate for unsupported pair");
                    continue;
                }
            };
            match Quote::new(pair.clone(), entry.rate, entry.source.clone(), entry.updated_at) {
                Ok(quote) => {
                    entries.insert(pair, CacheEntry::new(quote, &config.ttl));
                }
                Err(e) => warn!(pair = %pair_key, error = %e, "Skipping invalid cached rate"),
            }
        }

        debug!(entries = entries.len(), sources = sources.len(), "Rate cache loaded");

        Ok(Self {
            config,
            sources,
            ledger,
            store,
            key,
            clock,
            entries,
            refresh_guards: DashMap::new(),
        })
    }

    /// Fresh quote for a pair, fetching on miss. Never serves stale.
    pub async fn get(&self, pair: &CurrencyPair) -> FxResult<Quote> {
        self.get_with(pair, StalePolicy::Reject)
            .await
            .map(|cached| cached.quote)
    }

    /// Quote for a pair under an explicit stale policy.
    ///
    /// If the refresh fails and an expired entry exists, `Reject` fails with
    /// `RefreshFailed` and `AllowStale` returns the entry marked stale. With
    /// no entry at all the source error is returned as is.
    #[instrument(skip(self), fields(pair = %pair))]
    pub async fn get_with(&self, pair: &CurrencyPair, policy: StalePolicy) -> FxResult<CachedQuote> {
        if let Some(hit) = self.live(pair) {
            debug!("Cache hit");
            return Ok(hit);
        }

        let guard = self.guard_for(pair);
        let _refreshing = guard.lock().await;

        if let Some(hit) = self.live(pair) {
            debug!("Refreshed by a concurrent caller");
            return Ok(hit);
        }

        debug!("Cache miss");
        match self.fetch(pair).await {
            Ok(quote) => {
                self.accept(std::slice::from_ref(&quote))?;
                let entry = CacheEntry::new(quote, &self.config.ttl);
                Ok(CachedQuote::from_entry(&entry, self.clock.now()))
            }
            Err(e) => self.on_fetch_failure(pair, policy, e),
        }
    }

    /// Refresh one pair now, ignoring TTL.
    #[instrument(skip(self), fields(pair = %pair))]
    pub async fn refresh(&self, pair: &CurrencyPair) -> FxResult<Quote> {
        let guard = self.guard_for(pair);
        let _refreshing = guard.lock().await;

        let quote = self.fetch(pair).await?;
        self.accept(std::slice::from_ref(&quote))?;
        Ok(quote)
    }

    /// Refresh every configured pair served by `source` (all pairs when
    /// `None`), ignoring TTL.
    ///
    /// Fetch failures are collected per pair and never abort the batch.
    /// Storage failures are fatal and returned as the error.
    #[instrument(skip(self))]
    pub async fn refresh_all(&self, source: Option<&str>) -> FxResult<RefreshReport> {
        let filter = source.map(|s| s.trim().to_lowercase());
        if let Some(name) = &filter {
            if !self.sources.iter().any(|s| s.name() == name) {
                return Err(FxError::UnknownSource(name.clone()));
            }
        }

        let targets: Vec<CurrencyPair> = self
            .config
            .pairs
            .iter()
            .filter(|pair| match (&filter, self.source_for(pair.kind())) {
                (None, _) => true,
                (Some(name), Some(source)) => source.name() == name,
                (Some(_), None) => false,
            })
            .cloned()
            .collect();

        info!(source = ?filter, pairs = targets.len(), "Refreshing rates");

        let results = join_all(targets.iter().map(|pair| self.fetch(pair))).await;

        let accepted: Vec<Quote> = results
            .iter()
            .filter_map(|r| r.as_ref().ok().cloned())
            .collect();
        if !accepted.is_empty() {
            self.accept(&accepted)?;
        }

        let mut report = RefreshReport::default();
        for (pair, result) in targets.iter().zip(results) {
            if let Err(e) = &result {
                warn!(pair = %pair, error = %e, "Pair refresh failed");
            }
            report.outcomes.insert(pair.key(), result);
        }

        info!(
            succeeded = report.success_count(),
            failed = report.failure_count(),
            "Refresh finished"
        );

        Ok(report)
    }

    /// Current entry for a pair without fetching.
    pub fn peek(&self, pair: &CurrencyPair) -> Option<CachedQuote> {
        let now = self.clock.now();
        self.entries
            .get(pair)
            .map(|entry| CachedQuote::from_entry(&entry, now))
    }

    /// Every cached entry, ordered by pair key.
    pub fn snapshot(&self) -> Vec<CachedQuote> {
        let now = self.clock.now();
        let mut all: Vec<CachedQuote> = self
            .entries
            .iter()
            .map(|entry| CachedQuote::from_entry(&entry, now))
            .collect();
        all.sort_by_key(|c| c.quote.pair.key());
        all
    }

    /// Time of the last successful publish, as persisted.
    pub fn last_refresh(&self) -> FxResult<Option<Timestamp>> {
        let document: RatesDocument = self.store.read(&self.key)?;
        Ok(document.last_refresh)
    }

    /// Names of the sources serving a kind.
    pub fn source_names_for(&self, kind: CurrencyKind) -> Vec<String> {
        self.sources
            .iter()
            .filter(|s| s.serves(kind))
            .map(|s| s.name().to_string())
            .collect()
    }

    pub fn ttl(&self) -> &TtlPolicy {
        &self.config.ttl
    }

    pub fn pairs(&self) -> &[CurrencyPair] {
        &self.config.pairs
    }

    fn live(&self, pair: &CurrencyPair) -> Option<CachedQuote> {
        let now = self.clock.now();
        self.entries
            .get(pair)
            .filter(|entry| entry.is_live_at(now))
            .map(|entry| CachedQuote::from_entry(&entry, now))
    }

    fn guard_for(&self, pair: &CurrencyPair) -> Arc<AsyncMutex<()>> {
        self.refresh_guards
            .entry(pair.clone())
            .or_insert_with(|| Arc::new(AsyncMutex::new(())))
            .clone()
    }

    fn source_for(&self, kind: CurrencyKind) -> Option<&Arc<dyn RateSource>> {
        self.sources.iter().find(|s| s.serves(kind))
    }

    async fn fetch(&self, pair: &CurrencyPair) -> FxResult<Quote> {
        let source = self
            .source_for(pair.kind())
            .ok_or_else(|| FxError::RateNotFound(pair.clone()))?;

        match tokio::time::timeout(self.config.fetch_timeout, source.fetch(pair)).await {
            Ok(result) => result,
            Err(_) => Err(FxError::unavailable(
                source.name(),
                format!("timed out after {:?}", self.config.fetch_timeout),
            )),
        }
    }

    /// Append to the ledger, then publish to the document and memory.
    fn accept(&self, quotes: &[Quote]) -> FxResult<()> {
        self.ledger.append_batch(quotes)?;

        let refreshed_at = self.clock.now();
        let published = self.store.update(&self.key, |doc: &mut RatesDocument| {
            let published: Vec<bool> = quotes.iter().map(|q| doc.publish(q)).collect();
            doc.last_refresh = Some(refreshed_at);
            Ok::<_, FxError>(published)
        })?;

        for (quote, published) in quotes.iter().zip(published) {
            if !published {
                debug!(pair = %quote.pair, "Quote not newer than published rate");
                continue;
            }
            let entry = CacheEntry::new(quote.clone(), &self.config.ttl);
            self.entries
                .entry(quote.pair.clone())
                .and_modify(|current| {
                    if entry.quote.observed_at > current.quote.observed_at {
                        *current = entry.clone();
                    }
                })
                .or_insert_with(|| entry.clone());
        }

        Ok(())
    }

    fn on_fetch_failure(
        &self,
        pair: &CurrencyPair,
        policy: StalePolicy,
        error: FxError,
    ) -> FxResult<CachedQuote> {
        let stale = match self.peek(pair) {
            Some(stale) => stale,
            None => return Err(error),
        };

        match policy {
            StalePolicy::Reject => Err(FxError::RefreshFailed {
                pair: pair.clone(),
                reason: error.to_string(),
            }),
            StalePolicy::AllowStale => {
                warn!(
                    pair = %pair,
                    expired_at = %stale.expires_at,
                    error = %error,
                    "Serving stale rate"
                );
                Ok(stale)
            }
        }
    }
}

impl std::fmt::Debug for RateCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RateCache")
            .field("entries", &self.entries.len())
            .field("sources", &self.sources.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use fxdesk_common::ManualClock;
    use rust_decimal_macros::dec;

    use crate::provider::{MockFailure, MockRateSource};

    struct Fixture {
        cache: RateCache,
        crypto: Arc<MockRateSource>,
        fiat: Arc<MockRateSource>,
        clock: Arc<ManualClock>,
        ledger: HistoryLedger,
    }

    fn start() -> Timestamp {
        Utc.with_ymd_and_hms(2026, 1, 10, 15, 0, 0).unwrap()
    }

    fn btc_usd() -> CurrencyPair {
        CurrencyPair::new(Currency::btc(), Currency::usd())
    }

    fn eur_usd() -> CurrencyPair {
        CurrencyPair::new(Currency::eur(), Currency::usd())
    }

    fn fixture_with(store: Arc<DocumentStore>, config: RateCacheConfig) -> Fixture {
        let clock = Arc::new(ManualClock::new(start()));
        let crypto = Arc::new(
            MockRateSource::new("coingecko", CurrencyKind::Crypto).with_clock(clock.clone()),
        );
        let fiat = Arc::new(
            MockRateSource::new("exchangerate", CurrencyKind::Fiat).with_clock(clock.clone()),
        );
        crypto.set_rate(&btc_usd(), dec!(50000));
        fiat.set_rate(&eur_usd(), dec!(1.08));

        let ledger = HistoryLedger::new(store.clone()).unwrap();
        let sources: Vec<Arc<dyn RateSource>> = vec![crypto.clone(), fiat.clone()];
        let cache = RateCache::new(
            config,
            sources,
            ledger.clone(),
            store,
            &CurrencyRegistry::default(),
            clock.clone(),
        )
        .unwrap();

        Fixture {
            cache,
            crypto,
            fiat,
            clock,
            ledger,
        }
    }

    fn fixture() -> Fixture {
        let config = RateCacheConfig {
            pairs: vec![btc_usd(), eur_usd()],
            ..Default::default()
        };
        fixture_with(Arc::new(DocumentStore::in_memory()), config)
    }

    #[tokio::test]
    async fn test_expiry_is_observation_plus_ttl() {
        let f = fixture();

        let crypto = f.cache.get_with(&btc_usd(), StalePolicy::Reject).await.unwrap();
        let fiat = f.cache.get_with(&eur_usd(), StalePolicy::Reject).await.unwrap();

        assert_eq!(crypto.expires_at, crypto.quote.observed_at + Duration::seconds(300));
        assert_eq!(fiat.expires_at, fiat.quote.observed_at + Duration::seconds(86_400));
        assert_eq!(f.cache.peek(&btc_usd()).unwrap().expires_at, crypto.expires_at);
    }

    #[tokio::test]
    async fn test_hits_within_ttl_fetch_once() {
        let f = fixture();

        for _ in 0..5 {
            let quote = f.cache.get(&btc_usd()).await.unwrap();
            assert_eq!(quote.rate, dec!(50000));
            f.clock.advance(Duration::seconds(30));
        }
        assert_eq!(f.crypto.calls(), 1);

        f.clock.advance(Duration::seconds(300));
        f.cache.get(&btc_usd()).await.unwrap();
        assert_eq!(f.crypto.calls(), 2);
    }

    #[tokio::test]
    async fn test_accepted_quote_is_recorded_in_history() {
        let f = fixture();

        f.cache.get(&btc_usd()).await.unwrap();
        f.cache.get(&btc_usd()).await.unwrap();

        let history = f.ledger.query(&btc_usd(), 10, None).unwrap().to_vec();
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].id.as_str(), "BTCUSD_20260110T150000Z");
        assert_eq!(f.cache.last_refresh().unwrap(), Some(start()));
    }

    #[tokio::test]
    async fn test_stale_entry_rejected_by_default() {
        let f = fixture();
        f.cache.get(&btc_usd()).await.unwrap();

        f.clock.advance(Duration::seconds(301));
        f.crypto.fail_with(Some(MockFailure::Unavailable));

        let err = f.cache.get(&btc_usd()).await.unwrap_err();
        assert!(matches!(err, FxError::RefreshFailed { ref pair, .. } if *pair == btc_usd()));

        let stale = f
            .cache
            .get_with(&btc_usd(), StalePolicy::AllowStale)
            .await
            .unwrap();
        assert!(stale.is_stale());
        assert_eq!(stale.quote.rate, dec!(50000));
    }

    #[tokio::test]
    async fn test_failure_without_entry_propagates_source_error() {
        let f = fixture();
        f.fiat.fail_with(Some(MockFailure::Unavailable));

        let err = f
            .cache
            .get_with(&eur_usd(), StalePolicy::AllowStale)
            .await
            .unwrap_err();
        assert!(matches!(err, FxError::SourceUnavailable { .. }));

        f.fiat.fail_with(Some(MockFailure::NotFound));
        assert!(matches!(
            f.cache.get(&eur_usd()).await,
            Err(FxError::RateNotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_refresh_all_filters_by_source() {
        let f = fixture();
        f.cache.refresh_all(None).await.unwrap();
        let fiat_before = f.cache.peek(&eur_usd()).unwrap();
        let crypto_before = f.cache.peek(&btc_usd()).unwrap();

        f.clock.advance(Duration::seconds(60));
        f.crypto.set_rate(&btc_usd(), dec!(51000));
        let report = f.cache.refresh_all(Some("coingecko")).await.unwrap();

        assert_eq!(report.outcomes.keys().collect::<Vec<_>>(), vec!["BTC_USD"]);
        assert_eq!(f.cache.peek(&eur_usd()).unwrap().expires_at, fiat_before.expires_at);
        let crypto_after = f.cache.peek(&btc_usd()).unwrap();
        assert_eq!(crypto_after.quote.rate, dec!(51000));
        assert_eq!(crypto_after.expires_at, crypto_before.expires_at + Duration::seconds(60));
        assert_eq!(f.fiat.calls(), 1);
    }

    #[tokio::test]
    async fn test_refresh_all_collects_failures() {
        let config = RateCacheConfig {
            pairs: vec![btc_usd(), CurrencyPair::new(Currency::eth(), Currency::usd()), eur_usd()],
            ..Default::default()
        };
        let f = fixture_with(Arc::new(DocumentStore::in_memory()), config);

        let report = f.cache.refresh_all(None).await.unwrap();

        assert_eq!(report.success_count(), 2);
        assert_eq!(report.failure_count(), 1);
        assert!(matches!(report.outcomes["ETH_USD"], Err(FxError::RateNotFound(_))));
        assert_eq!(f.ledger.len().unwrap(), 2);
    }

    #[tokio::test]
    async fn test_refresh_all_unknown_source() {
        let f = fixture();
        assert!(matches!(
            f.cache.refresh_all(Some("bloomberg")).await,
            Err(FxError::UnknownSource(_))
        ));
    }

    #[tokio::test]
    async fn test_concurrent_misses_coalesce() {
        let f = fixture();
        f.crypto
            .set_delay(Some(std::time::Duration::from_millis(50)));

        let pair = btc_usd();
        let (a, b) = tokio::join!(f.cache.get(&pair), f.cache.get(&pair));

        assert_eq!(a.unwrap(), b.unwrap());
        assert_eq!(f.crypto.calls(), 1);
    }

    #[tokio::test]
    async fn test_timeout_is_source_unavailable() {
        let config = RateCacheConfig {
            pairs: vec![btc_usd()],
            fetch_timeout: std::time::Duration::from_millis(20),
            ..Default::default()
        };
        let f = fixture_with(Arc::new(DocumentStore::in_memory()), config);
        f.crypto
            .set_delay(Some(std::time::Duration::from_millis(500)));

        let err = f.cache.get(&btc_usd()).await.unwrap_err();
        assert!(matches!(err, FxError::SourceUnavailable { ref reason, .. } if reason.contains("timed out")));
        assert!(f.cache.peek(&btc_usd()).is_none());
    }

    #[tokio::test]
    async fn test_entries_survive_restart() {
        let dir = tempfile::tempdir().unwrap();
        let store = Arc::new(DocumentStore::open(dir.path()).unwrap());
        let first = fixture_with(store.clone(), RateCacheConfig::default());
        let fetched = first.cache.get(&btc_usd()).await.unwrap();

        let second = fixture_with(store, RateCacheConfig::default());
        let restored = second.cache.peek(&btc_usd()).unwrap();

        assert_eq!(restored.quote, fetched);
        assert_eq!(restored.expires_at, fetched.observed_at + Duration::seconds(300));
        assert_eq!(second.cache.get(&btc_usd()).await.unwrap(), fetched);
        assert_eq!(second.crypto.calls(), 0);
    }
}
