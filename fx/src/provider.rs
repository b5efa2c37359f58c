//! Rate source trait and the in-memory mock source.

use async_trait::async_trait;
use fxdesk_common::{CurrencyKind, CurrencyPair, Quote};

use crate::error::FxResult;

/// A transport that can price currency pairs.
///
/// Sources know nothing about caching or TTL and never retry; a failed fetch
/// is reported as `SourceUnavailable` or `RateNotFound` and left to the
/// caller.
#[async_trait]
pub trait RateSource: Send + Sync {
    /// Stable name, used by `update-rates --source`.
    fn name(&self) -> &str;

    /// Whether this source prices pairs of the given kind.
    fn serves(&self, kind: CurrencyKind) -> bool;

    /// Fetch the current rate for a pair.
    async fn fetch(&self, pair: &CurrencyPair) -> FxResult<Quote>;
}

#[cfg(any(test, feature = "test-utils"))]
pub use mock::{MockFailure, MockRateSource};

#[cfg(any(test, feature = "test-utils"))]
mod mock {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use std::time::Duration;

    use async_trait::async_trait;
    use dashmap::DashMap;
    use fxdesk_common::{Clock, CurrencyKind, CurrencyPair, Quote, SystemClock};
    use parking_lot::Mutex;
    use rust_decimal::Decimal;

    use super::RateSource;
    use crate::error::{FxError, FxResult};

    /// Failure the mock should produce instead of a quote.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub enum MockFailure {
        Unavailable,
        NotFound,
    }

    /// Deterministic source for tests.
    pub struct MockRateSource {
        name: String,
        kind: CurrencyKind,
        rates: DashMap<String, Decimal>,
        calls: AtomicUsize,
        failure: Mutex<Option<MockFailure>>,
        delay: Mutex<Option<Duration>>,
        clock: Arc<dyn Clock>,
    }

    impl MockRateSource {
        pub fn new(name: impl Into<String>, kind: CurrencyKind) -> Self {
            Self {
                name: name.into(),
                kind,
                rates: DashMap::new(),
                calls: AtomicUsize::new(0),
                failure: Mutex::new(None),
                delay: Mutex::new(None),
                clock: Arc::new(SystemClock),
            }
        }

        /// Stamp quotes with this clock instead of the wall clock.
        pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
            self.clock = clock;
            self
        }

        pub fn set_rate(&self, pair: &CurrencyPair, rate: Decimal) {
            self.rates.insert(pair.key(), rate);
        }

        pub fn fail_with(&self, failure: Option<MockFailure>) {
            *self.failure.lock() = failure;
        }

        /// Sleep this long inside every fetch.
        pub fn set_delay(&self, delay: Option<Duration>) {
            *self.delay.lock() = delay;
        }

        /// Number of fetches made so far.
        pub fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl RateSource for MockRateSource {
        fn name(&self) -> &str {
            &self.name
        }

        fn serves(&self, kind: CurrencyKind) -> bool {
            self.kind == kind
        }

        async fn fetch(&self, pair: &CurrencyPair) -> FxResult<Quote> {
            self.calls.fetch_add(1, Ordering::SeqCst);

            let delay = *self.delay.lock();
            if let Some(delay) = delay {
                tokio::time::sleep(delay).await;
            }

            let failure = *self.failure.lock();
            match failure {
                Some(MockFailure::Unavailable) => {
                    return Err(FxError::unavailable(&self.name, "injected failure"))
                }
                Some(MockFailure::NotFound) => return Err(FxError::RateNotFound(pair.clone())),
                None => {}
            }

            let rate = self
                .rates
                .get(&pair.key())
                .map(|r| *r)
                .ok_or_else(|| FxError::RateNotFound(pair.clone()))?;

            Ok(Quote::new(pair.clone(), rate, self.name.clone(), self.clock.now())?)
        }
    }
}
