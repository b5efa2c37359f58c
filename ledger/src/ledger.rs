//! History ledger over the document store.

use std::collections::HashSet;
use std::sync::Arc;

use fxdesk_common::{now, CurrencyPair, HistoryId, Quote};
use fxdesk_store::{DocumentKey, DocumentStore};
use tracing::{debug, info, instrument};

use crate::error::{LedgerError, LedgerResult};
use crate::query::{HistoryQuery, RecordFilter};
use crate::record::{HistoryDocument, HistoryRecord};

/// Name of the document holding the ledger.
pub const HISTORY_DOCUMENT: &str = "exchange_rates";

/// Result of appending one quote.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AppendOutcome {
    /// A new record was stored.
    Recorded(HistoryRecord),
    /// A record with the same id already exists; nothing was stored.
    Duplicate(HistoryId),
}

impl AppendOutcome {
    pub fn is_duplicate(&self) -> bool {
        matches!(self, AppendOutcome::Duplicate(_))
    }

    pub fn id(&self) -> &HistoryId {
        match self {
            AppendOutcome::Recorded(record) => &record.id,
            AppendOutcome::Duplicate(id) => id,
        }
    }
}

/// Append-only sequence of accepted quotes.
///
/// The ledger is the only writer of its document; records are never mutated
/// or removed once stored.
#[derive(Debug, Clone)]
pub struct HistoryLedger {
    store: Arc<DocumentStore>,
    key: DocumentKey,
}

impl HistoryLedger {
    pub fn new(store: Arc<DocumentStore>) -> LedgerResult<Self> {
        Ok(Self {
            store,
            key: DocumentKey::new(HISTORY_DOCUMENT)?,
        })
    }

    /// Append one quote.
    #[instrument(skip(self, quote), fields(pair = %quote.pair, source = %quote.source))]
    pub fn append(&self, quote: &Quote) -> LedgerResult<AppendOutcome> {
        let mut outcomes = self.append_batch(std::slice::from_ref(quote))?;
        Ok(outcomes.remove(0))
    }

    /// Append many quotes in a single read-modify-write.
    ///
    /// Outcomes are returned in input order. A quote colliding with a stored
    /// record, or with an earlier quote in the same batch, is a duplicate.
    pub fn append_batch(&self, quotes: &[Quote]) -> LedgerResult<Vec<AppendOutcome>> {
        if quotes.is_empty() {
            return Ok(Vec::new());
        }

        let outcomes = self
            .store
            .update(&self.key, |doc: &mut HistoryDocument| {
                let mut known: HashSet<HistoryId> =
                    doc.records.iter().map(|r| r.id.clone()).collect();
                let mut outcomes = Vec::with_capacity(quotes.len());

                for quote in quotes {
                    let record = HistoryRecord::from_quote(quote);
                    if known.insert(record.id.clone()) {
                        doc.records.push(record.clone());
                        outcomes.push(AppendOutcome::Recorded(record));
                    } else {
                        debug!(id = %record.id, "Duplicate history record skipped");
                        outcomes.push(AppendOutcome::Duplicate(record.id));
                    }
                }

                doc.meta.total_records = doc.records.len();
                doc.meta.last_updated = Some(now());
                Ok::<_, LedgerError>(outcomes)
            })?;

        let recorded = outcomes.iter().filter(|o| !o.is_duplicate()).count();
        info!(
            recorded,
            duplicates = outcomes.len() - recorded,
            "History appended"
        );

        Ok(outcomes)
    }

    /// Records of one pair, newest first, at most `limit`.
    ///
    /// With `since_id`, only records strictly newer than that record.
    pub fn query(
        &self,
        pair: &CurrencyPair,
        limit: usize,
        since_id: Option<&HistoryId>,
    ) -> LedgerResult<HistoryQuery> {
        self.select(RecordFilter::Pair(pair.key()), limit, since_id)
    }

    /// Records involving a currency on either leg, newest first.
    pub fn query_currency(&self, code: &str, limit: usize) -> LedgerResult<HistoryQuery> {
        self.select(RecordFilter::Currency(code.trim().to_uppercase()), limit, None)
    }

    /// Records of every pair, newest first.
    pub fn query_all(&self, limit: usize) -> LedgerResult<HistoryQuery> {
        self.select(RecordFilter::Any, limit, None)
    }

    /// Number of stored records.
    pub fn len(&self) -> LedgerResult<usize> {
        let doc: HistoryDocument = self.store.read(&self.key)?;
        Ok(doc.records.len())
    }

    pub fn is_empty(&self) -> LedgerResult<bool> {
        Ok(self.len()? == 0)
    }

    fn select(
        &self,
        filter: RecordFilter,
        limit: usize,
        since_id: Option<&HistoryId>,
    ) -> LedgerResult<HistoryQuery> {
        let doc: HistoryDocument = self.store.read(&self.key)?;

        let newer_than = match since_id {
            Some(id) => Some(
                doc.records
                    .iter()
                    .find(|r| &r.id == id)
                    .map(|r| r.observed_at)
                    .ok_or_else(|| LedgerError::RecordNotFound(id.clone()))?,
            ),
            None => None,
        };

        Ok(HistoryQuery::new(doc.records, filter, newer_than, limit))
    }
}
