//! Portfolios and their document.

use std::collections::BTreeMap;
use std::sync::Arc;

use fxdesk_common::UserId;
use fxdesk_store::{DocumentKey, DocumentStore, StoreResult};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::error::{TradeError, TradeResult};

/// Name of the document holding every portfolio.
pub const PORTFOLIOS_DOCUMENT: &str = "portfolios";

/// Holdings of one user, keyed by currency code.
///
/// Amounts are never negative; a holding that reaches zero is removed.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Portfolio {
    #[serde(default)]
    pub holdings: BTreeMap<String, Decimal>,
}

impl Portfolio {
    /// Portfolio holding only `amount` of `code`.
    pub fn with_balance(code: &str, amount: Decimal) -> Self {
        let mut portfolio = Self::default();
        if !amount.is_zero() {
            portfolio.holdings.insert(code.to_string(), amount);
        }
        portfolio
    }

    pub fn balance(&self, code: &str) -> Decimal {
        self.holdings.get(code).copied().unwrap_or(Decimal::ZERO)
    }

    /// Add `amount` of `code`, failing without change if the balance would overflow.
    pub fn credit(&mut self, code: &str, amount: Decimal) -> TradeResult<()> {
        if amount.is_zero() {
            return Ok(());
        }
        let total = self.balance(code).checked_add(amount).ok_or_else(|| {
            TradeError::AmountOverflow(format!("{} balance plus {}", code, amount))
        })?;
        self.holdings.insert(code.to_string(), total);
        Ok(())
    }

    /// Remove `amount` of `code`, failing without change if the balance is short.
    pub fn debit(&mut self, code: &str, amount: Decimal) -> TradeResult<()> {
        let available = self.balance(code);
        if available < amount {
            return Err(TradeError::InsufficientFunds {
                currency: code.to_string(),
                required: amount,
                available,
            });
        }

        let remaining = available - amount;
        if remaining.is_zero() {
            self.holdings.remove(code);
        } else {
            self.holdings.insert(code.to_string(), remaining);
        }
        Ok(())
    }

    pub fn is_empty(&self) -> bool {
        self.holdings.is_empty()
    }
}

/// The `portfolios` document.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PortfoliosDocument {
    #[serde(default)]
    pub users: BTreeMap<UserId, Portfolio>,
}

/// Store-backed access to portfolios.
///
/// Every change is one read-modify-write of the portfolios document, so both
/// legs of a trade are persisted together or not at all.
#[derive(Debug, Clone)]
pub struct PortfolioBook {
    store: Arc<DocumentStore>,
    key: DocumentKey,
}

impl PortfolioBook {
    pub fn new(store: Arc<DocumentStore>) -> StoreResult<Self> {
        Ok(Self {
            store,
            key: DocumentKey::new(PORTFOLIOS_DOCUMENT)?,
        })
    }

    pub fn get(&self, user: UserId) -> TradeResult<Portfolio> {
        let doc: PortfoliosDocument = self.store.read(&self.key)?;
        doc.users
            .get(&user)
            .cloned()
            .ok_or(TradeError::PortfolioNotFound(user))
    }

    /// Create a portfolio unless one exists. Returns whether it was created.
    pub fn open(&self, user: UserId, initial: Portfolio) -> StoreResult<bool> {
        let created = self
            .store
            .update(&self.key, |doc: &mut PortfoliosDocument| -> StoreResult<bool> {
                if doc.users.contains_key(&user) {
                    return Ok(false);
                }
                doc.users.insert(user, initial);
                Ok(true)
            })?;
        if created {
            info!(user = %user, "Portfolio opened");
        }
        Ok(created)
    }

    /// Mutate one user's portfolio; nothing is persisted if `f` fails.
    pub fn update<R, F>(&self, user: UserId, f: F) -> TradeResult<R>
    where
        F: FnOnce(&mut Portfolio) -> TradeResult<R>,
    {
        self.store.update(&self.key, |doc: &mut PortfoliosDocument| {
            let portfolio = doc
                .users
                .get_mut(&user)
                .ok_or(TradeError::PortfolioNotFound(user))?;
            f(portfolio)
        })
    }
}
