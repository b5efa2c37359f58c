//! Ledger error types.

use fxdesk_common::HistoryId;
use fxdesk_store::StoreError;
use thiserror::Error;

/// Errors that can occur in the history ledger.
#[derive(Error, Debug)]
pub enum LedgerError {
    /// `since_id` does not reference a stored record.
    #[error("History record not found: {0}")]
    RecordNotFound(HistoryId),

    /// Underlying document store failure.
    #[error("Ledger storage error: {0}")]
    Store(#[from] StoreError),
}

impl LedgerError {
    /// Check if the ledger document is unreadable.
    pub fn is_corruption(&self) -> bool {
        matches!(self, LedgerError::Store(e) if e.is_corruption())
    }
}

/// Result type for ledger operations.
pub type LedgerResult<T> = Result<T, LedgerError>;
