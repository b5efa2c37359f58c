//! Lazy, restartable history queries.

use std::sync::Arc;

use fxdesk_common::Timestamp;

use crate::record::HistoryRecord;

/// Which records a query selects.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RecordFilter {
    /// Every record.
    Any,
    /// Records of exactly this pair key.
    Pair(String),
    /// Records whose pair has this currency as either leg.
    Currency(String),
}

impl RecordFilter {
    fn matches(&self, record: &HistoryRecord) -> bool {
        match self {
            RecordFilter::Any => true,
            RecordFilter::Pair(key) => &record.pair == key,
            RecordFilter::Currency(code) => record.involves(code),
        }
    }
}

/// Result of a ledger query.
///
/// Holds a snapshot of the ledger taken when the query was made, ordered by
/// `observed_at` descending. Matching records are produced on demand, and
/// every call to [`HistoryQuery::iter`] starts over from the newest record.
#[derive(Debug, Clone)]
pub struct HistoryQuery {
    snapshot: Arc<[HistoryRecord]>,
    filter: RecordFilter,
    newer_than: Option<Timestamp>,
    limit: usize,
}

impl HistoryQuery {
    pub(crate) fn new(
        mut records: Vec<HistoryRecord>,
        filter: RecordFilter,
        newer_than: Option<Timestamp>,
        limit: usize,
    ) -> Self {
        records.sort_by(|a, b| {
            b.observed_at
                .cmp(&a.observed_at)
                .then_with(|| b.id.cmp(&a.id))
        });
        Self {
            snapshot: records.into(),
            filter,
            newer_than,
            limit,
        }
    }

    /// Iterate from the newest matching record.
    pub fn iter(&self) -> HistoryIter<'_> {
        HistoryIter {
            query: self,
            position: 0,
            yielded: 0,
        }
    }

    pub fn limit(&self) -> usize {
        self.limit
    }

    /// Collect the matching records.
    pub fn to_vec(&self) -> Vec<HistoryRecord> {
        self.iter().cloned().collect()
    }
}

impl<'a> IntoIterator for &'a HistoryQuery {
    type Item = &'a HistoryRecord;
    type IntoIter = HistoryIter<'a>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

/// Iterator over a [`HistoryQuery`].
#[derive(Debug, Clone)]
pub struct HistoryIter<'a> {
    query: &'a HistoryQuery,
    position: usize,
    yielded: usize,
}

impl<'a> Iterator for HistoryIter<'a> {
    type Item = &'a HistoryRecord;

    fn next(&mut self) -> Option<Self::Item> {
        if self.yielded >= self.query.limit {
            return None;
        }
        while let Some(record) = self.query.snapshot.get(self.position) {
            self.position += 1;
            if let Some(bound) = self.query.newer_than {
                // Descending order: nothing after this point can qualify.
                if record.observed_at <= bound {
                    self.position = self.query.snapshot.len();
                    return None;
                }
            }
            if self.query.filter.matches(record) {
                self.yielded += 1;
                return Some(record);
            }
        }
        None
    }
}
