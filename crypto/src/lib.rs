//! fxdesk Credential Primitives
//!
//! Salted password digests for the user registry.

pub mod credentials;
pub mod hash;

pub use credentials::{generate_salt, hash_password, verify_password, SALT_BYTES};
pub use hash::{sha256, sha256_hex};

/// Errors from credential operations.
#[derive(Debug, thiserror::Error)]
pub enum CryptoError {
    #[error("Invalid salt: {0}")]
    InvalidSalt(String),
}

pub type Result<T> = std::result::Result<T, CryptoError>;
