//! Registry of supported currencies.

use std::collections::{BTreeMap, BTreeSet};

use crate::error::{CommonError, CommonResult};
use crate::monetary::{Currency, CurrencyKind, CurrencyPair};

/// The set of currencies the desk trades, keyed by code.
#[derive(Debug, Clone)]
pub struct CurrencyRegistry {
    currencies: BTreeMap<String, Currency>,
}

impl CurrencyRegistry {
    /// Build a registry from supported codes; codes listed in `crypto` are
    /// crypto assets, everything else is fiat.
    pub fn from_codes<'a>(
        supported: impl IntoIterator<Item = &'a String>,
        crypto: &BTreeSet<String>,
    ) -> CommonResult<Self> {
        let crypto: BTreeSet<String> = crypto.iter().map(|c| c.trim().to_uppercase()).collect();
        let mut currencies = BTreeMap::new();

        for code in supported {
            let normalized = code.trim().to_uppercase();
            let kind = if crypto.contains(&normalized) {
                CurrencyKind::Crypto
            } else {
                CurrencyKind::Fiat
            };
            let currency = Currency::new(&normalized, kind)?;
            currencies.insert(currency.code().to_string(), currency);
        }

        Ok(Self { currencies })
    }

    /// Resolve a code in any case to a supported currency.
    pub fn resolve(&self, code: &str) -> CommonResult<Currency> {
        let normalized = code.trim().to_uppercase();
        self.currencies
            .get(&normalized)
            .cloned()
            .ok_or(CommonError::UnknownCurrency(normalized))
    }

    /// Parse a `BASE_QUOTE` document key.
    pub fn pair_from_key(&self, key: &str) -> CommonResult<CurrencyPair> {
        let (base, quote) = key
            .split_once('_')
            .ok_or_else(|| CommonError::InvalidPair(key.to_string()))?;
        Ok(CurrencyPair::new(self.resolve(base)?, self.resolve(quote)?))
    }

    /// All supported currencies of the given kind.
    pub fn of_kind(&self, kind: CurrencyKind) -> impl Iterator<Item = &Currency> {
        self.currencies.values().filter(move |c| c.kind() == kind)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Currency> {
        self.currencies.values()
    }

    pub fn contains(&self, code: &str) -> bool {
        self.currencies.contains_key(&code.trim().to_uppercase())
    }

    /// Every pair of a supported currency against `base`, in key order.
    pub fn pairs_against(&self, base: &Currency) -> Vec<CurrencyPair> {
        let mut pairs: Vec<CurrencyPair> = self
            .currencies
            .values()
            .filter(|c| *c != base)
            .map(|c| CurrencyPair::new(c.clone(), base.clone()))
            .collect();
        pairs.sort_by_key(|p| p.key());
        pairs.dedup();
        pairs
    }
}

impl Default for CurrencyRegistry {
    fn default() -> Self {
        let supported: Vec<String> = ["USD", "EUR", "GBP", "RUB", "BTC", "ETH", "SOL"]
            .iter()
            .map(|c| c.to_string())
            .collect();
        let crypto: BTreeSet<String> = ["BTC", "ETH", "SOL"].iter().map(|c| c.to_string()).collect();
        // Built-in codes are all valid.
        Self::from_codes(&supported, &crypto).unwrap_or(Self {
            currencies: BTreeMap::new(),
        })
    }
}
