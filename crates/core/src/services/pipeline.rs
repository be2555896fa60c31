//! Single-artifact pipeline: canonicalize, hash, diff, classify.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::analysis::{DiffAnalyzer, DriftClassifier, DriftReport, InvariantViolation};
use crate::budget::{Deadline, TimedOut};
use crate::canon::{CanonError, Canonicalizer, ParseError};
use crate::config::{ConfigError, EngineConfig};
use crate::db::{BaselineRecord, BaselineStore, KeyedLocks, StalenessChecksum, StoreError};
use crate::hash::{ContentHash, HashEngine};
use crate::model::{Artifact, CanonicalForm, ChangeKind, DiffEntry, NodeKind, Severity};

/// Why one artifact could not be analyzed.
#[derive(Debug, Error)]
pub enum ArtifactFailure {
    #[error(transparent)]
    Parse(#[from] ParseError),

    #[error("analysis timed out: {0}")]
    Timeout(#[from] TimedOut),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Invariant(#[from] InvariantViolation),
}

impl From<CanonError> for ArtifactFailure {
    fn from(err: CanonError) -> Self {
        match err {
            CanonError::Parse(e) => ArtifactFailure::Parse(e),
            CanonError::Timeout(e) => ArtifactFailure::Timeout(e),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    Parse,
    Timeout,
    Store,
    Invariant,
}

impl ArtifactFailure {
    pub fn kind(&self) -> FailureKind {
        match self {
            ArtifactFailure::Parse(_) => FailureKind::Parse,
            ArtifactFailure::Timeout(_) => FailureKind::Timeout,
            ArtifactFailure::Store(_) => FailureKind::Store,
            ArtifactFailure::Invariant(_) => FailureKind::Invariant,
        }
    }
}

/// Errors from engine-level calls outside a batch.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Canon(#[from] CanonError),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Failure(#[from] ArtifactFailure),
}

/// Instrumentation counters.
#[derive(Debug, Default)]
pub struct PipelineStats {
    canonicalized: AtomicUsize,
    hashed: AtomicUsize,
    diffed: AtomicUsize,
    skipped: AtomicUsize,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatsSnapshot {
    pub canonicalized: usize,
    pub hashed: usize,
    pub diffed: usize,
    pub skipped: usize,
}

impl PipelineStats {
    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            canonicalized: self.canonicalized.load(Ordering::SeqCst),
            hashed: self.hashed.load(Ordering::SeqCst),
            diffed: self.diffed.load(Ordering::SeqCst),
            skipped: self.skipped.load(Ordering::SeqCst),
        }
    }

    pub(crate) fn record_skip(&self) {
        self.skipped.fetch_add(1, Ordering::SeqCst);
    }

    fn bump(counter: &AtomicUsize) {
        counter.fetch_add(1, Ordering::SeqCst);
    }
}

/// Result of a full pipeline pass over one artifact.
#[derive(Debug, Clone)]
pub struct Analysis {
    pub report: DriftReport,
    pub form: CanonicalForm,
    pub hash: ContentHash,
    pub checksum: StalenessChecksum,
}

/// Runs the per-artifact pipeline against a [`BaselineStore`].
pub struct DriftEngine<'s> {
    store: &'s dyn BaselineStore,
    config: EngineConfig,
    canonicalizer: Canonicalizer,
    hasher: HashEngine,
    analyzer: DiffAnalyzer,
    classifier: DriftClassifier,
    locks: KeyedLocks,
    stats: PipelineStats,
}

impl<'s> DriftEngine<'s> {
    pub fn new(store: &'s dyn BaselineStore, config: EngineConfig) -> Result<Self, EngineError> {
        config.validate()?;
        let classifier = DriftClassifier::new(config.drift_threshold)?;
        Ok(Self {
            store,
            analyzer: DiffAnalyzer::new(config.reorder_policy),
            config,
            canonicalizer: Canonicalizer::new(),
            hasher: HashEngine::new(),
            classifier,
            locks: KeyedLocks::new(),
            stats: PipelineStats::default(),
        })
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn store(&self) -> &'s dyn BaselineStore {
        self.store
    }

    pub fn classifier(&self) -> &DriftClassifier {
        &self.classifier
    }

    pub fn stats(&self) -> StatsSnapshot {
        self.stats.snapshot()
    }

    pub(crate) fn pipeline_stats(&self) -> &PipelineStats {
        &self.stats
    }

    fn deadline(&self) -> Deadline {
        Deadline::after(Duration::from_millis(self.config.artifact_timeout_ms))
    }

    /// Analyze `artifact` against its stored baseline.
    pub fn analyze(&self, artifact: &Artifact) -> Result<DriftReport, ArtifactFailure> {
        let baseline = self.store.get(&artifact.id)?;
        Ok(self.analyze_against(artifact, baseline.as_ref())?.report)
    }

    /// Analyze against an explicit baseline record. A first-seen artifact
    /// (no record) gets a baseline recorded when the config asks for it.
    pub fn analyze_against(
        &self,
        artifact: &Artifact,
        baseline: Option<&BaselineRecord>,
    ) -> Result<Analysis, ArtifactFailure> {
        let analysis = self.run(artifact, baseline, &self.deadline())?;
        if baseline.is_none() && self.config.record_first_seen {
            self.store_baseline::<ArtifactFailure>(
                &artifact.id,
                &analysis.form,
                &analysis.hash,
                analysis.checksum,
            )?;
            tracing::debug!(artifact = %artifact.id, hash = %analysis.hash, "recorded first-seen baseline");
        }
        Ok(analysis)
    }

    fn run(
        &self,
        artifact: &Artifact,
        baseline: Option<&BaselineRecord>,
        deadline: &Deadline,
    ) -> Result<Analysis, ArtifactFailure> {
        let checksum = self.store.stale_checksum(&artifact.content);
        let form = self.canonicalize(artifact, deadline)?;

        // A snapshot only stands in for the record it was accepted with.
        let snapshot = match baseline {
            Some(record) => self
                .store
                .snapshot(&artifact.id)?
                .filter(|previous| self.hasher.hash(previous) == record.canonical_hash),
            None => None,
        };
        let hash = self.hash(&artifact.id, &form)?;
        deadline.check()?;

        let entries = match (baseline, snapshot.as_ref()) {
            (Some(record), _) if record.canonical_hash == hash => Vec::new(),
            (Some(_), Some(previous)) => {
                PipelineStats::bump(&self.stats.diffed);
                let entries = self.analyzer.diff_forms(previous, &form)?;
                deadline.check()?;
                entries
            }
            (Some(_), None) => vec![DiffEntry::new(
                ChangeKind::Modified,
                NodeKind::Document,
                NodeKind::Document.as_str(),
                Severity::Medium,
                "canonical hash changed and no baseline snapshot is stored",
            )],
            (None, _) => Vec::new(),
        };

        let report = self
            .classifier
            .classify(
                &artifact.id,
                baseline.map(|r| r.canonical_hash.as_str()),
                hash.as_str(),
                entries,
            )?
            .with_elapsed_ms(deadline.elapsed().as_millis() as u64);

        tracing::debug!(
            artifact = %artifact.id,
            drift = report.drift_detected(),
            severity = %report.severity(),
            entries = report.diff_entries().len(),
            "analyzed artifact"
        );
        Ok(Analysis { report, form, hash, checksum })
    }

    fn canonicalize(&self, artifact: &Artifact, deadline: &Deadline) -> Result<CanonicalForm, ArtifactFailure> {
        let form = self.canonicalizer.canonicalize_within(&artifact.content, artifact.format, deadline)?;
        PipelineStats::bump(&self.stats.canonicalized);
        if self.config.self_check {
            let again =
                self.canonicalizer.canonicalize_within(&artifact.content, artifact.format, deadline)?;
            if again != form {
                return Err(InvariantViolation::NonDeterministicCanonicalForm {
                    artifact_id: artifact.id.clone(),
                }
                .into());
            }
        }
        Ok(form)
    }

    fn hash(&self, artifact_id: &str, form: &CanonicalForm) -> Result<ContentHash, ArtifactFailure> {
        PipelineStats::bump(&self.stats.hashed);
        let hash = self.hasher.hash(form);
        if self.config.self_check && self.hasher.hash(form) != hash {
            return Err(InvariantViolation::NonDeterministicHash { artifact_id: artifact_id.to_string() }.into());
        }
        Ok(hash)
    }

    /// Accept the artifact's current content as its new baseline.
    ///
    /// Accepting content whose canonical hash and checksum are already stored
    /// leaves the record untouched.
    pub fn accept_baseline(&self, artifact: &Artifact) -> Result<BaselineRecord, EngineError> {
        let deadline = self.deadline();
        let form = self.canonicalize(artifact, &deadline)?;
        let hash = self.hasher.hash(&form);
        let checksum = self.store.stale_checksum(&artifact.content);
        self.store_baseline(&artifact.id, &form, &hash, checksum)
    }

    fn store_baseline<E: From<StoreError>>(
        &self,
        artifact_id: &str,
        form: &CanonicalForm,
        hash: &ContentHash,
        checksum: StalenessChecksum,
    ) -> Result<BaselineRecord, E> {
        self.locks.with_lock(artifact_id, || {
            if let Some(existing) = self.store.get(artifact_id)? {
                if existing.canonical_hash == *hash && existing.staleness_checksum == checksum {
                    return Ok(existing);
                }
            }
            let record = BaselineRecord::new(artifact_id, hash.clone(), checksum);
            self.store.put_snapshot(artifact_id, form)?;
            self.store.put(artifact_id, record.clone())?;
            tracing::info!(artifact = %artifact_id, hash = %hash, "baseline accepted");
            Ok(record)
        })
    }

    /// Drop the stored baseline. The next analysis treats the artifact as new.
    pub fn reset_baseline(&self, artifact_id: &str) -> Result<bool, EngineError> {
        let removed = self.locks.with_lock(artifact_id, || self.store.reset(artifact_id))?;
        Ok(removed)
    }
}
