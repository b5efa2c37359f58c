//! Error types shared by every fxdesk crate.

use thiserror::Error;

/// Validation errors for the shared domain types.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CommonError {
    /// Currency code is not in the registry.
    #[error("Unknown currency '{0}'")]
    UnknownCurrency(String),

    /// Currency code is malformed.
    #[error("Invalid currency code '{0}'")]
    InvalidCurrencyCode(String),

    /// Pair key or leg lookup is malformed.
    #[error("Invalid currency pair: {0}")]
    InvalidPair(String),

    /// Quote rate or source is not acceptable.
    #[error("Invalid rate: {0}")]
    InvalidRate(String),

    /// Result does not fit in a decimal.
    #[error("Arithmetic overflow: {0}")]
    Overflow(String),
}

/// Result type alias for shared domain operations.
pub type CommonResult<T> = std::result::Result<T, CommonError>;
