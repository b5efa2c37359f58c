//! FX error types.

use fxdesk_common::{CommonError, CurrencyPair};
use fxdesk_ledger::LedgerError;
use fxdesk_store::StoreError;
use thiserror::Error;

/// Errors that can occur while obtaining rates.
#[derive(Debug, Error)]
pub enum FxError {
    /// Transport or provider failure, including timeouts.
    #[error("Rate source '{provider}' unavailable: {reason}")]
    SourceUnavailable { provider: String, reason: String },

    /// No source can price the pair.
    #[error("Rate not found for {0}")]
    RateNotFound(CurrencyPair),

    /// A fresh quote could not be obtained and staleness is not permitted.
    #[error("Refresh failed for {pair}: {reason}")]
    RefreshFailed { pair: CurrencyPair, reason: String },

    /// `--source` filter names no configured source.
    #[error("Unknown rate source '{0}'")]
    UnknownSource(String),

    /// Source returned a value that is not a valid quote.
    #[error("Invalid quote: {0}")]
    InvalidQuote(#[from] CommonError),

    /// History ledger failure.
    #[error(transparent)]
    Ledger(#[from] LedgerError),

    /// Rates document failure.
    #[error(transparent)]
    Store(#[from] StoreError),
}

impl FxError {
    pub(crate) fn unavailable(provider: &str, reason: impl Into<String>) -> Self {
        FxError::SourceUnavailable {
            provider: provider.to_string(),
            reason: reason.into(),
        }
    }

    /// Check if this error comes from an unreadable document.
    pub fn is_corruption(&self) -> bool {
        match self {
            FxError::Store(e) => e.is_corruption(),
            FxError::Ledger(e) => e.is_corruption(),
            _ => false,
        }
    }
}

/// Result type for FX operations.
pub type FxResult<T> = Result<T, FxError>;
