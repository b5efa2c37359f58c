//! fxdesk FX Rates
//!
//! Rate sources, the TTL rate cache and the background refresh scheduler.
//!
//! # Features
//!
//! - Pluggable rate sources, each serving fiat or crypto pairs
//! - Per-kind TTL with explicit stale-serving policy
//! - Every accepted quote is appended to the history ledger before it is
//!   published to the cache
//! - Bulk refresh filtered by source with per-pair outcomes
//!
//! # Example
//!
//! ```rust,ignore
//! use fxdesk_fx::{RateCache, RateCacheConfig, StalePolicy};
//!
//! let cache = RateCache::new(config, sources, ledger, store, registry, clock)?;
//!
//! // Fresh quote, fetching on miss
//! let quote = cache.get(&pair).await?;
//!
//! // Tolerate a stale quote if the source is down
//! let cached = cache.get_with(&pair, StalePolicy::AllowStale).await?;
//! if cached.is_stale() { /* show a warning */ }
//! ```

pub mod adapters;
pub mod cache;
pub mod document;
pub mod error;
pub mod provider;
pub mod scheduler;

pub use adapters::{CoinGeckoSource, ExchangeRateSource};
pub use cache::{
    CacheEntry, CachedQuote, Freshness, RateCache, RateCacheConfig, RefreshReport, StalePolicy,
    TtlPolicy,
};
pub use document::{RateEntry, RatesDocument, RATES_DOCUMENT};
pub use error::{FxError, FxResult};
pub use provider::RateSource;
pub use scheduler::RefreshScheduler;

#[cfg(any(test, feature = "test-utils"))]
pub use provider::{MockFailure, MockRateSource};
