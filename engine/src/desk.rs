//! The trade desk service.

use std::sync::Arc;

use fxdesk_common::{Clock, Currency, CurrencyPair, CurrencyRegistry, SystemClock};
use fxdesk_fx::{
    CachedQuote, CoinGeckoSource, ExchangeRateSource, FxError, RateCache, RateSource,
    RefreshReport, RefreshScheduler,
};
use fxdesk_ledger::{HistoryLedger, HistoryRecord};
use fxdesk_store::DocumentStore;
use parking_lot::RwLock;
use rust_decimal::Decimal;
use tokio::sync::Mutex as AsyncMutex;
use tracing::{debug, info, instrument};

use crate::config::DeskConfig;
use crate::error::{DeskError, DeskResult};
use crate::portfolio::{Portfolio, PortfolioBook};
use crate::state::DeskState;
use crate::trade::{TradeEngine, TradeReceipt, Valuation};
use crate::usecase::run_usecase;
use crate::users::{Session, User, UserRegistry};

/// Which cached rates `show_rates` lists.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum RateView {
    /// Every cached pair, ordered by key.
    #[default]
    All,
    /// The `n` highest rates.
    Top(usize),
    /// Pairs involving one currency.
    Currency(String),
}

/// Owns every long-lived component and exposes the usecases.
pub struct TradeDesk {
    config: DeskConfig,
    registry: CurrencyRegistry,
    base: Currency,
    ledger: HistoryLedger,
    cache: Arc<RateCache>,
    engine: TradeEngine,
    users: UserRegistry,
    state: RwLock<DeskState>,
    scheduler: AsyncMutex<Option<RefreshScheduler>>,
}

impl TradeDesk {
    /// Open the desk on `config.data_dir` with the live rate sources.
    pub fn open(config: DeskConfig) -> DeskResult<Self> {
        config.validate()?;
        let store = Arc::new(DocumentStore::open(&config.data_dir)?);
        let sources: Vec<Arc<dyn RateSource>> = vec![
            Arc::new(CoinGeckoSource::new(
                config.coingecko_url.clone(),
                config.fetch_timeout(),
            )?),
            Arc::new(ExchangeRateSource::from_env(
                config.exchangerate_url.clone(),
                config.fetch_timeout(),
            )?),
        ];
        Self::open_with(config, store, sources, Arc::new(SystemClock))
    }

    /// Open the desk on an explicit store, sources and clock.
    #[instrument(skip_all, fields(data_dir = %config.data_dir.display()))]
    pub fn open_with(
        config: DeskConfig,
        store: Arc<DocumentStore>,
        sources: Vec<Arc<dyn RateSource>>,
        clock: Arc<dyn Clock>,
    ) -> DeskResult<Self> {
        config.validate()?;

        let registry = config.registry()?;
        let base = config.base(&registry)?;

        let ledger = HistoryLedger::new(store.clone())?;
        let cache = Arc::new(RateCache::new(
            config.rate_cache_config(&registry, &base),
            sources,
            ledger.clone(),
            store.clone(),
            &registry,
            clock,
        )?);

        let book = PortfolioBook::new(store.clone())?;
        let users = UserRegistry::new(
            store,
            book.clone(),
            base.code(),
            config.initial_balance,
        )?;
        let engine = TradeEngine::new(book, cache.clone(), registry.clone(), base.clone());

        let desk = Self {
            config,
            registry,
            base,
            ledger,
            cache,
            engine,
            users,
            state: RwLock::new(DeskState::Starting),
            scheduler: AsyncMutex::new(None),
        };

        desk.set_state(DeskState::Running);
        info!(
            base = %desk.base,
            currencies = desk.registry.iter().count(),
            "Trade desk running"
        );
        Ok(desk)
    }

    pub fn state(&self) -> DeskState {
        *self.state.read()
    }

    pub fn config(&self) -> &DeskConfig {
        &self.config
    }

    pub fn base(&self) -> &Currency {
        &self.base
    }

    pub fn cache(&self) -> &Arc<RateCache> {
        &self.cache
    }

    pub async fn register(&self, username: &str, password: &str) -> DeskResult<User> {
        run_usecase("register", Some(username), async {
            self.ensure_running()?;
            Ok(self.users.register(username, password)?)
        })
        .await
    }

    pub async fn login(&self, username: &str, password: &str) -> DeskResult<Session> {
        run_usecase("login", Some(username), async {
            self.ensure_running()?;
            Ok(self.users.login(username, password)?)
        })
        .await
    }

    pub async fn logout(&self) -> DeskResult<Option<Session>> {
        let user = username(&self.users.current_user());
        run_usecase("logout", user.as_deref(), async {
            self.ensure_running()?;
            Ok(self.users.logout()?)
        })
        .await
    }

    /// The logged-in user, if any.
    pub fn whoami(&self) -> DeskResult<Option<Session>> {
        Ok(self.users.current_user()?)
    }

    pub async fn buy(&self, code: &str, amount: Decimal) -> DeskResult<TradeReceipt> {
        let session = self.users.current_user();
        let user = username(&session);
        run_usecase("buy", user.as_deref(), async {
            self.ensure_running()?;
            let session = session?.ok_or(DeskError::NotLoggedIn)?;
            Ok(self.engine.buy(session.user_id, code, amount).await?)
        })
        .await
    }

    pub async fn sell(&self, code: &str, amount: Decimal) -> DeskResult<TradeReceipt> {
        let session = self.users.current_user();
        let user = username(&session);
        run_usecase("sell", user.as_deref(), async {
            self.ensure_running()?;
            let session = session?.ok_or(DeskError::NotLoggedIn)?;
            Ok(self.engine.sell(session.user_id, code, amount).await?)
        })
        .await
    }

    /// Holdings of the logged-in user valued in `base` (the desk base by default).
    pub async fn show_portfolio(&self, base: Option<&str>) -> DeskResult<(Portfolio, Valuation)> {
        let session = self.users.current_user();
        let user = username(&session);
        run_usecase("show_portfolio", user.as_deref(), async {
            self.ensure_running()?;
            let session = session?.ok_or(DeskError::NotLoggedIn)?;
            let portfolio = self.engine.portfolio(session.user_id)?;
            let valuation = self.engine.valuation(session.user_id, base).await?;
            Ok((portfolio, valuation))
        })
        .await
    }

    /// Refresh every configured pair, or only those served by `source`.
    pub async fn update_rates(&self, source: Option<&str>) -> DeskResult<RefreshReport> {
        run_usecase("update_rates", None, async {
            self.ensure_running()?;
            Ok(self.cache.refresh_all(source).await?)
        })
        .await
    }

    /// Cached rates, without fetching.
    pub async fn show_rates(&self, view: RateView) -> DeskResult<Vec<CachedQuote>> {
        run_usecase("show_rates", None, async {
            self.ensure_running()?;
            let mut rates = self.cache.snapshot();
            match view {
                RateView::All => {}
                RateView::Top(n) => {
                    rates.sort_by(|a, b| b.quote.rate.cmp(&a.quote.rate));
                    rates.truncate(n);
                }
                RateView::Currency(code) => {
                    let currency = self.resolve(&code)?;
                    rates.retain(|c| c.quote.pair.involves(currency.code()));
                    if rates.is_empty() {
                        let pair = CurrencyPair::new(currency, self.base.clone());
                        return Err(FxError::RateNotFound(pair).into());
                    }
                }
            }
            Ok(rates)
        })
        .await
    }

    /// Newest history records first, optionally for one currency.
    pub async fn show_history(
        &self,
        currency: Option<&str>,
        limit: usize,
    ) -> DeskResult<Vec<HistoryRecord>> {
        run_usecase("show_history", None, async {
            self.ensure_running()?;
            let query = match currency {
                Some(code) => {
                    let currency = self.resolve(code)?;
                    self.ledger.query_currency(currency.code(), limit)?
                }
                None => self.ledger.query_all(limit)?,
            };
            Ok(query.to_vec())
        })
        .await
    }

    /// Start background refresh; a no-op if it is already running.
    pub async fn start_scheduler(&self) -> DeskResult<()> {
        self.ensure_running()?;
        let mut slot = self.scheduler.lock().await;
        if slot.is_none() {
            let mut scheduler = RefreshScheduler::new(
                self.cache.clone(),
                self.config.fiat_refresh_interval(),
                self.config.crypto_refresh_interval(),
            );
            scheduler.start();
            *slot = Some(scheduler);
        }
        Ok(())
    }

    pub async fn is_scheduling(&self) -> bool {
        self.scheduler
            .lock()
            .await
            .as_ref()
            .map(RefreshScheduler::is_running)
            .unwrap_or(false)
    }

    /// Stop background work and refuse further usecases.
    #[instrument(skip(self))]
    pub async fn shutdown(&self) {
        if self.state().is_terminal() {
            return;
        }
        info!("Shutting down trade desk");
        self.set_state(DeskState::ShuttingDown);

        if let Some(mut scheduler) = self.scheduler.lock().await.take() {
            scheduler.stop().await;
        }

        self.set_state(DeskState::Stopped);
        info!("Trade desk stopped");
    }

    fn set_state(&self, next: DeskState) {
        let mut state = self.state.write();
        let previous = *state;
        *state = next;
        debug!(from = %previous, to = %next, "Desk state change");
    }

    fn ensure_running(&self) -> DeskResult<()> {
        let state = self.state();
        if state.accepts_requests() {
            Ok(())
        } else {
            Err(DeskError::NotRunning(state))
        }
    }

    fn resolve(&self, code: &str) -> DeskResult<Currency> {
        self.registry
            .resolve(code)
            .map_err(|_| DeskError::UnknownCurrency(code.trim().to_uppercase()))
    }
}

fn username<E>(session: &Result<Option<Session>, E>) -> Option<String> {
    match session {
        Ok(Some(session)) => Some(session.username.clone()),
        _ => None,
    }
}
