//! Baseline persistence.
//!
//! The engine reads and writes baselines only through the [`BaselineStore`]
//! trait. Two implementations ship with the crate:
//! - `MemoryBaselineStore`: in-process maps, used by tests and short-lived runs.
//! - `SqliteBaselineStore`: a small SQLite database with schema migrations.
//!
//! Writes for one artifact id are serialized by the caller through
//! [`KeyedLocks`]; stores only need to be safe for concurrent use.

mod baseline_db;
mod locks;
mod memory;

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::hash::ContentHash;
use crate::model::CanonicalForm;

pub use baseline_db::{DbError, DbResult, SqliteBaselineStore, CURRENT_SCHEMA_VERSION};
pub use locks::KeyedLocks;
pub use memory::MemoryBaselineStore;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error(transparent)]
    Db(#[from] DbError),

    /// A lock guarding store state was poisoned by a panicking writer.
    #[error("baseline store lock poisoned: {0}")]
    Poisoned(&'static str),

    #[error("stored baseline for `{artifact_id}` is corrupt: {reason}")]
    Corrupt { artifact_id: String, reason: String },
}

/// Cheap, non-cryptographic fingerprint of raw artifact bytes.
///
/// Equal checksums are taken to mean "unchanged"; a collision between
/// different contents makes the orchestrator skip a real change.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct StalenessChecksum {
    pub len: u64,
    pub crc: u32,
}

impl StalenessChecksum {
    pub fn of(content: &[u8]) -> Self {
        Self { len: content.len() as u64, crc: crc32fast::hash(content) }
    }
}

impl fmt::Display for StalenessChecksum {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{:08x}", self.len, self.crc)
    }
}

impl FromStr for StalenessChecksum {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (len, crc) = s.split_once('-').ok_or_else(|| format!("missing '-' in {s:?}"))?;
        let len = len.parse::<u64>().map_err(|e| format!("bad length in {s:?}: {e}"))?;
        let crc = u32::from_str_radix(crc, 16).map_err(|e| format!("bad crc in {s:?}: {e}"))?;
        Ok(Self { len, crc })
    }
}

impl Serialize for StalenessChecksum {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for StalenessChecksum {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        raw.parse().map_err(serde::de::Error::custom)
    }
}

/// The last accepted state of an artifact.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BaselineRecord {
    pub artifact_id: String,
    pub canonical_hash: ContentHash,
    pub staleness_checksum: StalenessChecksum,
    /// RFC 3339 timestamp of acceptance.
    pub accepted_at: String,
}

impl BaselineRecord {
    /// A record accepted now.
    pub fn new(
        artifact_id: impl Into<String>,
        canonical_hash: ContentHash,
        staleness_checksum: StalenessChecksum,
    ) -> Self {
        Self {
            artifact_id: artifact_id.into(),
            canonical_hash,
            staleness_checksum,
            accepted_at: chrono::Utc::now().to_rfc3339(),
        }
    }
}

/// Read/write access to accepted baselines.
///
/// `put` is reserved for explicit acceptance (and the first sighting of an
/// artifact); drift analysis itself never writes.
pub trait BaselineStore: Send + Sync {
    fn get(&self, artifact_id: &str) -> Result<Option<BaselineRecord>, StoreError>;

    fn put(&self, artifact_id: &str, record: BaselineRecord) -> Result<(), StoreError>;

    /// Canonical form the current baseline was accepted with, if kept.
    fn snapshot(&self, artifact_id: &str) -> Result<Option<CanonicalForm>, StoreError>;

    fn put_snapshot(&self, artifact_id: &str, form: &CanonicalForm) -> Result<(), StoreError>;

    /// Forget the baseline and its snapshot. Returns whether anything was stored.
    fn reset(&self, artifact_id: &str) -> Result<bool, StoreError>;

    fn stale_checksum(&self, content: &[u8]) -> StalenessChecksum {
        StalenessChecksum::of(content)
    }
}
