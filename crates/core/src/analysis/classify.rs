//! Drift verdicts and signal-to-noise accounting.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::config::ConfigError;
use crate::hash::{ContentHash, HashError};
use crate::model::{ChangeKind, DiffEntry, Severity};

/// Minimum precision the engine must reach over a labelled mixed corpus.
pub const SNR_ACCEPTANCE_THRESHOLD: f64 = 0.90;

/// A programming error detected while producing a verdict.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum InvariantViolation {
    #[error("{kind} entry for `{identifier}` carries no severity")]
    UnratedChange { kind: ChangeKind, identifier: String },

    #[error("{count} diff entries reported although both hashes are {hash}")]
    EntriesForEqualHashes { hash: ContentHash, count: usize },

    #[error("canonical form of `{artifact_id}` differs between two runs on the same input")]
    NonDeterministicCanonicalForm { artifact_id: String },

    #[error("hash of `{artifact_id}` differs between two runs on the same canonical form")]
    NonDeterministicHash { artifact_id: String },

    #[error(transparent)]
    Hash(#[from] HashError),
}

/// Verdict for one artifact. Built once by [`DriftClassifier::classify`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DriftReport {
    artifact_id: String,
    baseline_hash: Option<ContentHash>,
    current_hash: ContentHash,
    drift_detected: bool,
    severity: Severity,
    signal_to_noise_ratio: f64,
    diff_entries: Vec<DiffEntry>,
    elapsed_ms: u64,
}

impl DriftReport {
    pub fn artifact_id(&self) -> &str {
        &self.artifact_id
    }

    pub fn baseline_hash(&self) -> Option<&ContentHash> {
        self.baseline_hash.as_ref()
    }

    pub fn current_hash(&self) -> &ContentHash {
        &self.current_hash
    }

    pub fn drift_detected(&self) -> bool {
        self.drift_detected
    }

    pub fn severity(&self) -> Severity {
        self.severity
    }

    pub fn signal_to_noise_ratio(&self) -> f64 {
        self.signal_to_noise_ratio
    }

    pub fn diff_entries(&self) -> &[DiffEntry] {
        &self.diff_entries
    }

    pub fn elapsed_ms(&self) -> u64 {
        self.elapsed_ms
    }

    pub(crate) fn with_elapsed_ms(mut self, elapsed_ms: u64) -> Self {
        self.elapsed_ms = elapsed_ms;
        self
    }
}

#[derive(Debug, Clone, Copy)]
pub struct DriftClassifier {
    threshold: Severity,
}

impl Default for DriftClassifier {
    fn default() -> Self {
        Self { threshold: Severity::Low }
    }
}

impl DriftClassifier {
    /// `threshold` is the least severity that counts as drift; `None` is rejected.
    pub fn new(threshold: Severity) -> Result<Self, ConfigError> {
        if threshold == Severity::None {
            return Err(ConfigError::InvalidSeverityThreshold(threshold.to_string()));
        }
        Ok(Self { threshold })
    }

    pub fn threshold(&self) -> Severity {
        self.threshold
    }

    pub fn is_significant(&self, entry: &DiffEntry) -> bool {
        entry.severity >= self.threshold
    }

    /// Combine the hash comparison and diff entries into a verdict.
    ///
    /// A missing baseline hash means the artifact has not been seen before;
    /// it never counts as drift.
    pub fn classify(
        &self,
        artifact_id: &str,
        baseline_hash: Option<&str>,
        current_hash: &str,
        entries: Vec<DiffEntry>,
    ) -> Result<DriftReport, InvariantViolation> {
        let current_hash = ContentHash::parse(current_hash)?;
        let baseline_hash = baseline_hash.map(ContentHash::parse).transpose()?;

        for entry in &entries {
            let rated = match entry.kind {
                ChangeKind::Added | ChangeKind::Removed | ChangeKind::Modified => {
                    entry.severity != Severity::None
                }
                ChangeKind::Reordered => true,
            };
            if !rated {
                return Err(InvariantViolation::UnratedChange {
                    kind: entry.kind,
                    identifier: entry.identifier.clone(),
                });
            }
        }

        let hashes_differ = baseline_hash.as_ref().is_some_and(|b| *b != current_hash);
        if baseline_hash.is_some() && !hashes_differ && !entries.is_empty() {
            return Err(InvariantViolation::EntriesForEqualHashes {
                hash: current_hash,
                count: entries.len(),
            });
        }

        let significant = entries.iter().filter(|e| self.is_significant(e)).count();
        let severity = entries.iter().map(|e| e.severity).max().unwrap_or(Severity::None);
        let signal_to_noise_ratio = ratio(significant, entries.len() - significant);

        Ok(DriftReport {
            artifact_id: artifact_id.to_string(),
            baseline_hash,
            current_hash,
            drift_detected: hashes_differ && significant > 0,
            severity,
            signal_to_noise_ratio,
            diff_entries: entries,
            elapsed_ms: 0,
        })
    }
}

fn ratio(signal: usize, noise: usize) -> f64 {
    if signal + noise == 0 {
        1.0
    } else {
        signal as f64 / (signal + noise) as f64
    }
}

/// Significant vs. cosmetic entry counts accumulated over a batch.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignalTally {
    pub significant: usize,
    pub cosmetic: usize,
}

impl SignalTally {
    pub fn record(&mut self, report: &DriftReport, classifier: &DriftClassifier) {
        for entry in report.diff_entries() {
            if classifier.is_significant(entry) {
                self.significant += 1;
            } else {
                self.cosmetic += 1;
            }
        }
    }

    pub fn merge(&mut self, other: SignalTally) {
        self.significant += other.significant;
        self.cosmetic += other.cosmetic;
    }

    pub fn ratio(&self) -> f64 {
        ratio(self.significant, self.cosmetic)
    }
}

/// Verdicts scored against known labels (did the artifact really change?).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccuracyTally {
    pub true_positives: usize,
    pub false_positives: usize,
    pub false_negatives: usize,
    pub true_negatives: usize,
}

impl AccuracyTally {
    pub fn record(&mut self, semantic_change: bool, drift_detected: bool) {
        match (semantic_change, drift_detected) {
            (true, true) => self.true_positives += 1,
            (false, true) => self.false_positives += 1,
            (true, false) => self.false_negatives += 1,
            (false, false) => self.true_negatives += 1,
        }
    }

    /// True flags over all flags.
    pub fn signal_to_noise_ratio(&self) -> f64 {
        ratio(self.true_positives, self.false_positives)
    }

    pub fn flagged(&self) -> usize {
        self.true_positives + self.false_positives
    }

    pub fn meets_acceptance(&self) -> bool {
        self.signal_to_noise_ratio() >= SNR_ACCEPTANCE_THRESHOLD
    }
}
