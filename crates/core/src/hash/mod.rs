//! Content hashing of canonical forms.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use thiserror::Error;

use crate::model::CanonicalForm;

pub const HASH_HEX_LEN: usize = 64;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum HashError {
    #[error("malformed content hash {0:?}: expected {HASH_HEX_LEN} lowercase hex characters")]
    Malformed(String),
}

/// Why [`HashEngine::check`] rejected a form.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum VerifyFailure {
    #[error("hash mismatch: expected {expected}, computed {actual}")]
    Mismatch { expected: ContentHash, actual: ContentHash },

    #[error(transparent)]
    MalformedExpected(#[from] HashError),
}

/// SHA-256 of a canonical form, as 64 lowercase hex characters.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ContentHash(String);

impl ContentHash {
    pub fn parse(value: &str) -> Result<Self, HashError> {
        let valid = value.len() == HASH_HEX_LEN
            && value.bytes().all(|b| b.is_ascii_digit() || (b'a'..=b'f').contains(&b));
        if valid {
            Ok(Self(value.to_string()))
        } else {
            Err(HashError::Malformed(value.to_string()))
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ContentHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for ContentHash {
    type Err = HashError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl TryFrom<String> for ContentHash {
    type Error = HashError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<ContentHash> for String {
    fn from(hash: ContentHash) -> Self {
        hash.0
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct HashEngine;

impl HashEngine {
    pub fn new() -> Self {
        Self
    }

    pub fn hash(&self, form: &CanonicalForm) -> ContentHash {
        hash_bytes(form.as_bytes())
    }

    /// `true` iff `form` hashes to `expected`. Failure detail goes to the log.
    pub fn verify(&self, form: &CanonicalForm, expected: &str) -> bool {
        match self.check(form, expected) {
            Ok(()) => true,
            Err(failure) => {
                tracing::debug!(%failure, "canonical form failed verification");
                false
            }
        }
    }

    pub fn check(&self, form: &CanonicalForm, expected: &str) -> Result<(), VerifyFailure> {
        let expected = ContentHash::parse(expected)?;
        let actual = self.hash(form);
        if actual == expected {
            Ok(())
        } else {
            Err(VerifyFailure::Mismatch { expected, actual })
        }
    }
}

pub fn hash_bytes(bytes: &[u8]) -> ContentHash {
    ContentHash(format!("{:x}", Sha256::digest(bytes)))
}
