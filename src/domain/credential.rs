//! Credentials
//!
//! Passwords are stored as `hex(salt)$hex(sha256(salt || password))`.
//! Session tokens are random and only their SHA-256 digest is stored.

use std::fmt;

use rand::RngCore;
use sha2::{Digest, Sha256};
use subtle::ConstantTimeEq;

const SALT_LEN: usize = 16;
const TOKEN_LEN: usize = 32;

/// Salted password digest as persisted in the account store
#[derive(Clone, PartialEq, Eq, sqlx::Type)]
#[sqlx(transparent)]
pub struct PasswordHash(String);

impl PasswordHash {
    /// Hash a plain-text password with a fresh random salt
    pub fn new(password: &str) -> Self {
        let mut salt = [0u8; SALT_LEN];
        rand::thread_rng().fill_bytes(&mut salt);
        Self(format!("{}${}", hex::encode(salt), hex::encode(digest(&salt, password))))
    }

    /// Wrap a value read back from storage
    pub fn from_stored(stored: impl Into<String>) -> Self {
        Self(stored.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Check a plain-text candidate against this hash.
    ///
    /// Malformed stored values never verify.
    pub fn verify(&self, candidate: &str) -> bool {
        let Some((salt_hex, digest_hex)) = self.0.split_once('$') else {
            return false;
        };
        let (Ok(salt), Ok(expected)) = (hex::decode(salt_hex), hex::decode(digest_hex)) else {
            return false;
        };

        digest(&salt, candidate).as_slice().ct_eq(expected.as_slice()).into()
    }
}

impl fmt::Debug for PasswordHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("PasswordHash([REDACTED])")
    }
}

fn digest(salt: &[u8], password: &str) -> Vec<u8> {
    let mut hasher = Sha256::new();
    hasher.update(salt);
    hasher.update(password.as_bytes());
    hasher.finalize().to_vec()
}

// =========================================================================
// SessionToken
// =========================================================================

/// Bearer token handed out on login. Only [`SessionToken::digest`] is persisted.
#[derive(Clone, PartialEq, Eq)]
pub struct SessionToken(String);

impl SessionToken {
    pub fn generate() -> Self {
        let mut bytes = [0u8; TOKEN_LEN];
        rand::thread_rng().fill_bytes(&mut bytes);
        Self(hex::encode(bytes))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn digest(&self) -> String {
        token_digest(&self.0)
    }
}

impl fmt::Debug for SessionToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("SessionToken([REDACTED])")
    }
}

/// Storage key for a presented bearer token
pub fn token_digest(token: &str) -> String {
    hex::encode(Sha256::digest(token.trim().as_bytes()))
}
