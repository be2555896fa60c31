//! drift-core
//!
//! Semantic hashing and drift detection for generated artifacts.
//!
//! Artifacts (RDF graphs, brace-structured source, JSON) are reduced to a
//! canonical form, hashed with SHA-256 and, when the hash moves away from the
//! accepted baseline, diffed structurally so cosmetic churn can be told apart
//! from changes that matter.
//!
//! The pipeline stages are usable on their own; [`services::DriftEngine`] and
//! [`services::BatchOrchestrator`] tie them to a [`db::BaselineStore`].

pub mod analysis;
pub mod budget;
pub mod canon;
pub mod config;
pub mod db;
pub mod hash;
pub mod model;
pub mod services;

pub use analysis::{DiffAnalyzer, DriftClassifier, DriftReport};
pub use canon::{CanonError, Canonicalizer, ParseError};
pub use config::EngineConfig;
pub use db::{BaselineRecord, BaselineStore, MemoryBaselineStore, SqliteBaselineStore};
pub use hash::{ContentHash, HashEngine};
pub use model::{Artifact, CanonicalForm, ChangeKind, DiffEntry, Format, Severity};
pub use services::{BatchOrchestrator, BatchReport, DriftEngine};

/// Returns the library version as encoded at compile time.
pub fn version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}
