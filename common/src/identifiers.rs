//! Identifier types for fxdesk entities.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::monetary::CurrencyPair;
use crate::time::{truncate_to_second, Timestamp};

/// Format of the timestamp part of a history id (`yyyyMMddTHHmmssZ`).
pub const HISTORY_ID_TIME_FORMAT: &str = "%Y%m%dT%H%M%SZ";

/// Unique identifier for a registered user.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UserId(u64);

impl UserId {
    pub fn new(id: u64) -> Self {
        Self(id)
    }

    pub fn value(&self) -> u64 {
        self.0
    }

    /// The id following this one.
    pub fn next(&self) -> Self {
        Self(self.0 + 1)
    }
}

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for UserId {
    type Err = std::num::ParseIntError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self(s.trim().parse()?))
    }
}

/// Deterministic identifier of a history record.
///
/// Derived from the pair and the observation time truncated to the second,
/// in UTC, e.g. `BTCUSD_20260110T150000Z`. Two quotes for the same pair in the
/// same second map to the same id.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct HistoryId(String);

impl HistoryId {
    /// Derive the id for a pair observed at the given instant.
    pub fn derive(pair: &CurrencyPair, observed_at: Timestamp) -> Self {
        let second = truncate_to_second(observed_at);
        Self(format!(
            "{}_{}",
            pair.compact(),
            second.format(HISTORY_ID_TIME_FORMAT)
        ))
    }

    /// Get the ID as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for HistoryId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for HistoryId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}
