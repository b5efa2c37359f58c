//! Trade execution engine.

use std::fmt;
use std::sync::Arc;

use fxdesk_common::{Currency, CurrencyPair, CurrencyRegistry, Quote, UserId};
use fxdesk_fx::{RateCache, StalePolicy};
use rust_decimal::Decimal;
use tracing::{info, instrument, warn};

use crate::error::{TradeError, TradeResult};
use crate::portfolio::{Portfolio, PortfolioBook};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TradeSide {
    Buy,
    Sell,
}

impl fmt::Display for TradeSide {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TradeSide::Buy => write!(f, "buy"),
            TradeSide::Sell => write!(f, "sell"),
        }
    }
}

/// Outcome of an executed trade.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TradeReceipt {
    pub side: TradeSide,
    /// Currency bought or sold.
    pub currency: String,
    pub amount: Decimal,
    /// Quote the trade was priced with.
    pub quote: Quote,
    /// Signed change of the base currency balance.
    pub base_delta: Decimal,
    /// Portfolio after the trade.
    pub balances_after: Portfolio,
}

/// One holding priced in the valuation currency.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValuationLine {
    pub currency: String,
    pub amount: Decimal,
    /// Units of valuation currency per unit of `currency`.
    pub rate: Option<Decimal>,
    pub value: Option<Decimal>,
    /// The rate came from an expired cache entry.
    pub stale: bool,
}

/// Portfolio priced in one currency.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Valuation {
    pub currency: String,
    pub lines: Vec<ValuationLine>,
    /// Sum of the lines that could be priced.
    pub total: Decimal,
}

impl Valuation {
    /// Holdings that could not be priced.
    pub fn unpriced(&self) -> impl Iterator<Item = &ValuationLine> {
        self.lines.iter().filter(|l| l.value.is_none())
    }
}

/// Applies buys and sells to portfolios at cached rates.
///
/// The quote is obtained before the portfolio document is locked, so a slow
/// rate fetch never blocks other trades.
pub struct TradeEngine {
    book: PortfolioBook,
    cache: Arc<RateCache>,
    registry: CurrencyRegistry,
    base: Currency,
}

impl TradeEngine {
    pub fn new(
        book: PortfolioBook,
        cache: Arc<RateCache>,
        registry: CurrencyRegistry,
        base: Currency,
    ) -> Self {
        Self {
            book,
            cache,
            registry,
            base,
        }
    }

    pub fn base(&self) -> &Currency {
        &self.base
    }

    /// Buy `amount` of `code`, paying in the base currency.
    #[instrument(skip(self), fields(user = %user))]
    pub async fn buy(&self, user: UserId, code: &str, amount: Decimal) -> TradeResult<TradeReceipt> {
        let (currency, quote) = self.price(code, amount).await?;
        let cost = quote.convert(amount, &currency)?;
        let base = self.base.code();

        let balances_after = self.book.update(user, |portfolio| {
            portfolio.debit(base, cost)?;
            portfolio.credit(currency.code(), amount)?;
            Ok(portfolio.clone())
        })?;

        info!(
            currency = %currency,
            %amount,
            rate = %quote.rate,
            %cost,
            "Buy executed"
        );

        Ok(TradeReceipt {
            side: TradeSide::Buy,
            currency: currency.code().to_string(),
            amount,
            quote,
            base_delta: -cost,
            balances_after,
        })
    }

    /// Sell `amount` of `code` for the base currency.
    #[instrument(skip(self), fields(user = %user))]
    pub async fn sell(&self, user: UserId, code: &str, amount: Decimal) -> TradeResult<TradeReceipt> {
        let (currency, quote) = self.price(code, amount).await?;
        let proceeds = quote.convert(amount, &currency)?;
        let base = self.base.code();

        let balances_after = self.book.update(user, |portfolio| {
            portfolio.debit(currency.code(), amount)?;
            portfolio.credit(base, proceeds)?;
            Ok(portfolio.clone())
        })?;

        info!(
            currency = %currency,
            %amount,
            rate = %quote.rate,
            %proceeds,
            "Sell executed"
        );

        Ok(TradeReceipt {
            side: TradeSide::Sell,
            currency: currency.code().to_string(),
            amount,
            quote,
            base_delta: proceeds,
            balances_after,
        })
    }

    pub fn portfolio(&self, user: UserId) -> TradeResult<Portfolio> {
        self.book.get(user)
    }

    /// Price every holding in `code` (the base currency when `None`).
    ///
    /// Expired rates are accepted and flagged; holdings whose rate cannot be
    /// obtained at all are listed without a value.
    pub async fn valuation(&self, user: UserId, code: Option<&str>) -> TradeResult<Valuation> {
        let target = match code {
            Some(code) => self.registry.resolve(code)?,
            None => self.base.clone(),
        };
        let portfolio = self.book.get(user)?;

        let mut lines = Vec::with_capacity(portfolio.holdings.len());
        let mut total = Decimal::ZERO;

        for (held, amount) in &portfolio.holdings {
            let line = if *held == target.code() {
                ValuationLine {
                    currency: held.clone(),
                    amount: *amount,
                    rate: Some(Decimal::ONE),
                    value: Some(*amount),
                    stale: false,
                }
            } else {
                self.value_line(held, *amount, &target).await
            };
            if let Some(value) = line.value {
                total = total.checked_add(value).ok_or_else(|| {
                    TradeError::AmountOverflow(format!("portfolio value in {}", target))
                })?;
            }
            lines.push(line);
        }

        Ok(Valuation {
            currency: target.code().to_string(),
            lines,
            total,
        })
    }

    async fn value_line(&self, held: &str, amount: Decimal, target: &Currency) -> ValuationLine {
        let mut line = ValuationLine {
            currency: held.to_string(),
            amount,
            rate: None,
            value: None,
            stale: false,
        };

        let currency = match self.registry.resolve(held) {
            Ok(currency) => currency,
            Err(e) => {
                warn!(currency = %held, error = %e, "Holding in unsupported currency");
                return line;
            }
        };

        let pair = CurrencyPair::new(currency.clone(), target.clone());
        match self.cache.get_with(&pair, StalePolicy::AllowStale).await {
            Ok(cached) => {
                line.stale = cached.is_stale();
                line.value = cached.quote.convert(amount, &currency).ok();
                line.rate = cached.quote.convert(Decimal::ONE, &currency).ok();
            }
            Err(e) => warn!(pair = %pair, error = %e, "Cannot value holding"),
        }
        line
    }

    /// Validate a trade request and obtain its quote.
    async fn price(&self, code: &str, amount: Decimal) -> TradeResult<(Currency, Quote)> {
        if amount <= Decimal::ZERO {
            return Err(TradeError::InvalidAmount(amount));
        }

        let currency = self.registry.resolve(code)?;
        if currency == self.base {
            return Err(TradeError::UnsupportedCurrency(currency.code().to_string()));
        }

        let pair = CurrencyPair::new(currency.clone(), self.base.clone());
        let quote = self
            .cache
            .get(&pair)
            .await
            .map_err(|source| TradeError::TradeFailed {
                reason: format!("no rate for {}: {}", pair, source),
                source,
            })?;

        Ok((currency, quote))
    }
}
