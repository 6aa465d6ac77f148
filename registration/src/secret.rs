//! Salted secret digests.
//!
//! Registrants choose a password that gates edit and cancellation. It is
//! stored as `sha256$<salt>$<digest>` (both base64) and compared in constant
//! time. Documents imported from the previous system hold the password in
//! plain text; those still verify, by direct comparison.

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use rand::RngCore;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;

const SCHEME: &str = "sha256";
const SALT_LEN: usize = 16;

/// A stored secret.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SecretHash(String);

impl SecretHash {
    /// Hash `plain` with a fresh random salt.
    #[must_use]
    pub fn new(plain: &str) -> Self {
        let mut salt = [0u8; SALT_LEN];
        rand::thread_rng().fill_bytes(&mut salt);
        Self::with_salt(plain, &salt)
    }

    /// Hash `plain` with the given salt.
    #[must_use]
    pub fn with_salt(plain: &str, salt: &[u8]) -> Self {
        let digest = digest(salt, plain);
        Self(format!(
            "{SCHEME}${}${}",
            STANDARD.encode(salt),
            STANDARD.encode(digest)
        ))
    }

    /// Wrap a value read from storage as-is.
    #[must_use]
    pub fn from_stored(stored: impl Into<String>) -> Self {
        Self(stored.into())
    }

    /// Whether this value is a salted digest rather than a legacy plain secret.
    #[must_use]
    pub fn is_hashed(&self) -> bool {
        self.parts().is_some()
    }

    /// Check `candidate` against the stored secret.
    #[must_use]
    pub fn verify(&self, candidate: &str) -> bool {
        match self.parts() {
            Some((salt, expected)) => {
                constant_time_eq::constant_time_eq(&digest(&salt, candidate), &expected)
            },
            None => constant_time_eq::constant_time_eq(self.0.as_bytes(), candidate.as_bytes()),
        }
    }

    fn parts(&self) -> Option<(Vec<u8>, Vec<u8>)> {
        let mut parts = self.0.splitn(3, '$');
        if parts.next()? != SCHEME {
            return None;
        }
        let salt = STANDARD.decode(parts.next()?).ok()?;
        let digest = STANDARD.decode(parts.next()?).ok()?;
        Some((salt, digest))
    }
}

fn digest(salt: &[u8], plain: &str) -> Vec<u8> {
    let mut hasher = Sha256::new();
    hasher.update(salt);
    hasher.update(plain.as_bytes());
    hasher.finalize().to_vec()
}

impl fmt::Debug for SecretHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("SecretHash(..)")
    }
}
