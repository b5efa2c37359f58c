//! fxdesk History Ledger
//!
//! Append-only record of every quote the rate cache accepted. Record ids are
//! derived from the pair and the observation second, so re-appending the same
//! observation is detected and skipped rather than stored twice.

pub mod error;
pub mod ledger;
pub mod query;
pub mod record;

pub use error::{LedgerError, LedgerResult};
pub use ledger::{AppendOutcome, HistoryLedger, HISTORY_DOCUMENT};
pub use query::{HistoryIter, HistoryQuery, RecordFilter};
pub use record::{HistoryDocument, HistoryMeta, HistoryRecord};
