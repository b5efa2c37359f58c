//! Salted password digests.
//!
//! A stored credential is `sha256_hex(password || salt)` together with the
//! salt itself, a short random hex string generated at registration.

use rand::rngs::OsRng;
use rand::RngCore;

use crate::hash::sha256_hex;
use crate::{CryptoError, Result};

/// Random bytes per salt (hex encoded, so twice as many characters).
pub const SALT_BYTES: usize = 4;

/// Generate a fresh random salt.
pub fn generate_salt() -> String {
    let mut bytes = [0u8; SALT_BYTES];
    OsRng.fill_bytes(&mut bytes);
    hex::encode(bytes)
}

/// Digest a password with its salt.
pub fn hash_password(password: &str, salt: &str) -> Result<String> {
    if salt.is_empty() || hex::decode(salt).is_err() {
        return Err(CryptoError::InvalidSalt(salt.to_string()));
    }
    let mut material = Vec::with_capacity(password.len() + salt.len());
    material.extend_from_slice(password.as_bytes());
    material.extend_from_slice(salt.as_bytes());
    Ok(sha256_hex(&material))
}

/// Check a password against a stored digest.
pub fn verify_password(password: &str, salt: &str, expected: &str) -> bool {
    match hash_password(password, salt) {
        Ok(actual) => constant_time_eq(actual.as_bytes(), expected.as_bytes()),
        Err(_) => false,
    }
}

fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    a.iter().zip(b).fold(0u8, |acc, (x, y)| acc | (x ^ y)) == 0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_salt_shape() {
        let salt = generate_salt();
        assert_eq!(salt.len(), SALT_BYTES * 2);
        assert!(salt.chars().all(|c| c.is_ascii_hexdigit()));
        assert_ne!(generate_salt(), generate_salt());
    }

    #[test]
    fn test_hash_is_password_then_salt() {
        let digest = hash_password("pass", "a1b2c3d4").unwrap();
        assert_eq!(digest, sha256_hex(b"passa1b2c3d4"));
    }

    #[test]
    fn test_verify() {
        let salt = generate_salt();
        let digest = hash_password("secret", &salt).unwrap();

        assert!(verify_password("secret", &salt, &digest));
        assert!(!verify_password("Secret", &salt, &digest));
        assert!(!verify_password("secret", "00000000", &digest));
    }

    #[test]
    fn test_invalid_salt() {
        assert!(hash_password("secret", "").is_err());
        assert!(hash_password("secret", "not-hex").is_err());
    }
}
