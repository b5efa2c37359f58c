//! Periodic background refresh.

use std::sync::Arc;
use std::time::Duration;

use fxdesk_common::CurrencyKind;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{error, info, warn};

use crate::cache::RateCache;

/// Refreshes fiat and crypto rates on independent intervals.
///
/// A failed tick is logged and retried on the next tick; nothing is retried
/// within the same tick.
pub struct RefreshScheduler {
    cache: Arc<RateCache>,
    fiat_interval: Duration,
    crypto_interval: Duration,
    shutdown_tx: watch::Sender<bool>,
    handles: Vec<JoinHandle<()>>,
}

impl RefreshScheduler {
    pub fn new(cache: Arc<RateCache>, fiat_interval: Duration, crypto_interval: Duration) -> Self {
        let (shutdown_tx, _) = watch::channel(false);
        Self {
            cache,
            fiat_interval,
            crypto_interval,
            shutdown_tx,
            handles: Vec::new(),
        }
    }

    /// Spawn one loop per kind. The first tick fires immediately.
    pub fn start(&mut self) {
        if !self.handles.is_empty() {
            warn!("Refresh scheduler already running");
            return;
        }

        for (kind, period) in [
            (CurrencyKind::Fiat, self.fiat_interval),
            (CurrencyKind::Crypto, self.crypto_interval),
        ] {
            let sources = self.cache.source_names_for(kind);
            if sources.is_empty() {
                warn!(%kind, "No rate source serves this kind; not scheduling");
                continue;
            }

            let cache = self.cache.clone();
            let shutdown = self.shutdown_tx.subscribe();
            self.handles.push(tokio::spawn(run_loop(cache, kind, sources, period, shutdown)));
            info!(%kind, interval_secs = period.as_secs(), "Scheduled rate refresh");
        }
    }

    pub fn is_running(&self) -> bool {
        self.handles.iter().any(|h| !h.is_finished())
    }

    /// Signal both loops and wait for them to exit.
    pub async fn stop(&mut self) {
        let _ = self.shutdown_tx.send(true);
        for handle in self.handles.drain(..) {
            if let Err(e) = handle.await {
                error!(error = %e, "Refresh loop terminated abnormally");
            }
        }
        info!("Refresh scheduler stopped");
    }
}

impl Drop for RefreshScheduler {
    fn drop(&mut self) {
        let _ = self.shutdown_tx.send(true);
    }
}

async fn run_loop(
    cache: Arc<RateCache>,
    kind: CurrencyKind,
    sources: Vec<String>,
    period: Duration,
    mut shutdown: watch::Receiver<bool>,
) {
    let mut interval = tokio::time::interval(period);
    interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = interval.tick() => {
                for source in &sources {
                    match cache.refresh_all(Some(source)).await {
                        Ok(report) => info!(
                            %kind,
                            source = %source,
                            succeeded = report.success_count(),
                            failed = report.failure_count(),
                            "Scheduled refresh complete"
                        ),
                        Err(e) => error!(%kind, source = %source, error = %e, "Scheduled refresh failed"),
                    }
                }
            }
            changed = shutdown.changed() => {
                if changed.is_err() || *shutdown.borrow() {
                    break;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use fxdesk_common::{Currency, CurrencyPair, CurrencyRegistry, SystemClock};
    use fxdesk_ledger::HistoryLedger;
    use fxdesk_store::DocumentStore;
    use rust_decimal_macros::dec;

    use crate::cache::RateCacheConfig;
    use crate::provider::{MockRateSource, RateSource};

    #[tokio::test]
    async fn test_scheduler_refreshes_and_stops() {
        let store = Arc::new(DocumentStore::in_memory());
        let crypto = Arc::new(MockRateSource::new("coingecko", CurrencyKind::Crypto));
        let fiat = Arc::new(MockRateSource::new("exchangerate", CurrencyKind::Fiat));
        let btc = CurrencyPair::new(Currency::btc(), Currency::usd());
        let eur = CurrencyPair::new(Currency::eur(), Currency::usd());
        crypto.set_rate(&btc, dec!(50000));
        fiat.set_rate(&eur, dec!(1.08));

        let sources: Vec<Arc<dyn RateSource>> = vec![crypto.clone(), fiat.clone()];
        let cache = Arc::new(
            RateCache::new(
                RateCacheConfig {
                    pairs: vec![btc.clone(), eur.clone()],
                    ..Default::default()
                },
                sources,
                HistoryLedger::new(store.clone()).unwrap(),
                store,
                &CurrencyRegistry::default(),
                Arc::new(SystemClock),
            )
            .unwrap(),
        );

        let mut scheduler = RefreshScheduler::new(
            cache.clone(),
            Duration::from_secs(3600),
            Duration::from_millis(20),
        );
        scheduler.start();
        assert!(scheduler.is_running());

        tokio::time::sleep(Duration::from_millis(90)).await;
        scheduler.stop().await;

        assert!(!scheduler.is_running());
        assert_eq!(fiat.calls(), 1);
        assert!(crypto.calls() >= 2);
        assert!(cache.peek(&btc).is_some());
        assert!(cache.peek(&eur).is_some());

        let calls = crypto.calls();
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(crypto.calls(), calls);
    }
}
