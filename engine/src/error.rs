//! Engine error types.

use fxdesk_common::{CommonError, UserId};
use fxdesk_crypto::CryptoError;
use fxdesk_fx::FxError;
use fxdesk_ledger::LedgerError;
use fxdesk_store::StoreError;
use rust_decimal::Decimal;
use thiserror::Error;

use crate::config::ConfigError;
use crate::state::DeskState;

/// Trade precondition and execution failures.
///
/// No variant is ever returned after a portfolio change was persisted.
#[derive(Debug, Error)]
pub enum TradeError {
    #[error("Amount must be positive, got {0}")]
    InvalidAmount(Decimal),

    #[error("Insufficient funds: need {required} {currency}, available {available}")]
    InsufficientFunds {
        currency: String,
        required: Decimal,
        available: Decimal,
    },

    #[error("Unknown currency '{0}'")]
    UnknownCurrency(String),

    /// Amount or resulting balance does not fit in a decimal.
    #[error("Amount out of range: {0}")]
    AmountOverflow(String),

    /// Currency is supported but cannot be traded (the base currency).
    #[error("Currency '{0}' cannot be traded")]
    UnsupportedCurrency(String),

    /// No rate could be obtained for the trade.
    #[error("Trade failed: {reason}")]
    TradeFailed {
        reason: String,
        #[source]
        source: FxError,
    },

    #[error("No portfolio for user {0}")]
    PortfolioNotFound(UserId),

    #[error(transparent)]
    Storage(#[from] StoreError),
}

impl From<CommonError> for TradeError {
    fn from(e: CommonError) -> Self {
        match e {
            CommonError::UnknownCurrency(code) => TradeError::UnknownCurrency(code),
            CommonError::InvalidCurrencyCode(code) => TradeError::UnknownCurrency(code),
            CommonError::Overflow(reason) => TradeError::AmountOverflow(reason),
            other => TradeError::UnsupportedCurrency(other.to_string()),
        }
    }
}

/// Result type for trade operations.
pub type TradeResult<T> = Result<T, TradeError>;

/// User registry failures.
#[derive(Debug, Error)]
pub enum UserError {
    #[error("Username cannot be empty")]
    EmptyUsername,

    #[error("Username '{0}' is already taken")]
    UsernameTaken(String),

    #[error("Password must be at least {min} characters")]
    WeakPassword { min: usize },

    #[error("User '{0}' not found")]
    UserNotFound(String),

    #[error("Invalid password")]
    InvalidCredentials,

    #[error(transparent)]
    Crypto(#[from] CryptoError),

    #[error(transparent)]
    Storage(#[from] StoreError),
}

/// Result type for user operations.
pub type UserResult<T> = Result<T, UserError>;

/// Errors surfaced by the service layer.
#[derive(Debug, Error)]
pub enum DeskError {
    #[error("Not logged in; run `login` first")]
    NotLoggedIn,

    #[error("Desk is not running (state: {0:?})")]
    NotRunning(DeskState),

    #[error("Unknown currency '{0}'")]
    UnknownCurrency(String),

    #[error(transparent)]
    Trade(#[from] TradeError),

    #[error(transparent)]
    User(#[from] UserError),

    #[error(transparent)]
    Rates(#[from] FxError),

    #[error(transparent)]
    History(#[from] LedgerError),

    #[error(transparent)]
    Storage(#[from] StoreError),

    #[error(transparent)]
    Config(#[from] ConfigError),
}

impl DeskError {
    /// Check if this error comes from an unreadable document.
    pub fn is_corruption(&self) -> bool {
        match self {
            DeskError::Storage(e) => e.is_corruption(),
            DeskError::Rates(e) => e.is_corruption(),
            DeskError::History(e) => e.is_corruption(),
            DeskError::Trade(TradeError::Storage(e)) => e.is_corruption(),
            DeskError::User(UserError::Storage(e)) => e.is_corruption(),
            _ => false,
        }
    }
}

/// Result type for service operations.
pub type DeskResult<T> = Result<T, DeskError>;
