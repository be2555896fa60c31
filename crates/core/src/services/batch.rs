//! Batch runs over many artifacts with a bounded worker pool.

use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, RwLock};
use std::time::Instant;

use serde::Serialize;
use thiserror::Error;

use crate::analysis::{DriftReport, InvariantViolation, SignalTally};
use crate::db::{BaselineRecord, StalenessChecksum};
use crate::hash::ContentHash;
use crate::model::{Artifact, Severity};
use crate::services::pipeline::{ArtifactFailure, DriftEngine, FailureKind};

/// Cooperative cancellation flag, checked between artifacts.
#[derive(Debug, Clone, Default)]
pub struct CancellationToken(Arc<AtomicBool>);

impl CancellationToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

#[derive(Debug, Error)]
pub enum BatchError {
    #[error("invariant violated while analyzing `{artifact_id}`: {violation}")]
    Invariant { artifact_id: String, violation: InvariantViolation },

    #[error("batch state lock poisoned: {0}")]
    Poisoned(&'static str),

    #[error("a batch worker panicked")]
    WorkerPanicked,
}

/// A per-artifact failure that did not stop the batch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ArtifactError {
    pub artifact_id: String,
    pub kind: FailureKind,
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ArtifactOutcome {
    Analyzed { report: DriftReport },
    /// Unchanged since the last run against the same baseline, or identical to
    /// the accepted content; carries the verdict that still applies.
    Skipped { artifact_id: String, prior: Option<DriftReport> },
    Failed { error: ArtifactError },
}

impl ArtifactOutcome {
    pub fn artifact_id(&self) -> &str {
        match self {
            ArtifactOutcome::Analyzed { report } => report.artifact_id(),
            ArtifactOutcome::Skipped { artifact_id, .. } => artifact_id,
            ArtifactOutcome::Failed { error } => &error.artifact_id,
        }
    }

    pub fn report(&self) -> Option<&DriftReport> {
        match self {
            ArtifactOutcome::Analyzed { report } => Some(report),
            ArtifactOutcome::Skipped { prior, .. } => prior.as_ref(),
            ArtifactOutcome::Failed { .. } => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BatchReport {
    pub analyzed: usize,
    pub skipped: usize,
    pub drift_count: usize,
    /// Analyzed artifacts by report severity.
    pub by_severity: BTreeMap<Severity, usize>,
    pub errors: Vec<ArtifactError>,
    pub elapsed_ms: u64,
    /// One entry per processed artifact, in input order.
    pub outcomes: Vec<ArtifactOutcome>,
    /// Set when the run stopped early; the report covers what finished.
    pub cancelled: bool,
    pub signal: SignalTally,
    pub signal_to_noise_ratio: f64,
}

/// An artifact paired with the baseline the caller fetched for it, if any.
#[derive(Debug, Clone)]
pub struct BatchItem {
    pub artifact: Artifact,
    pub baseline: Option<BaselineRecord>,
}

impl BatchItem {
    pub fn new(artifact: Artifact, baseline: Option<BaselineRecord>) -> Self {
        Self { artifact, baseline }
    }
}

#[derive(Debug, Clone)]
struct LastRun {
    checksum: StalenessChecksum,
    /// Baseline hash in effect once the verdict was produced.
    baseline: Option<ContentHash>,
    report: DriftReport,
}

enum Step {
    Done(ArtifactOutcome),
    Fatal { artifact_id: String, violation: InvariantViolation },
}

/// Runs the drift pipeline over many artifacts.
///
/// Remembers the checksum and verdict of every artifact it analyzed so
/// later runs can skip unchanged content. A remembered verdict is reused only
/// while the baseline it was computed against is still the one in effect.
pub struct BatchOrchestrator<'s> {
    engine: DriftEngine<'s>,
    last_run: RwLock<HashMap<String, LastRun>>,
}

impl<'s> BatchOrchestrator<'s> {
    pub fn new(engine: DriftEngine<'s>) -> Self {
        Self { engine, last_run: RwLock::new(HashMap::new()) }
    }

    pub fn engine(&self) -> &DriftEngine<'s> {
        &self.engine
    }

    /// Run every artifact, looking baselines up in the engine's store.
    pub fn run(&self, artifacts: &[Artifact]) -> Result<BatchReport, BatchError> {
        let items: Vec<BatchItem> = artifacts.iter().cloned().map(|a| BatchItem::new(a, None)).collect();
        self.run_batch(&items, &CancellationToken::new())
    }

    /// Run `items` until done or cancelled.
    ///
    /// An item without a baseline falls back to the store's record.
    pub fn run_batch(
        &self,
        items: &[BatchItem],
        cancel: &CancellationToken,
    ) -> Result<BatchReport, BatchError> {
        let started = Instant::now();
        let workers = self.engine.config().worker_count().clamp(1, items.len().max(1));
        tracing::debug!(artifacts = items.len(), workers, "starting batch");
        let drained = drain(items, workers, cancel, |item| self.process(item))?;

        if let Some((artifact_id, violation)) = drained.fatal {
            tracing::warn!(artifact = %artifact_id, %violation, "batch aborted on invariant violation");
            return Err(BatchError::Invariant { artifact_id, violation });
        }

        let report = self.assemble(drained.outcomes, items.len(), cancel.is_cancelled(), started);
        tracing::info!(
            analyzed = report.analyzed,
            skipped = report.skipped,
            drift = report.drift_count,
            errors = report.errors.len(),
            cancelled = report.cancelled,
            elapsed_ms = report.elapsed_ms,
            "batch finished"
        );
        Ok(report)
    }

    fn process(&self, item: &BatchItem) -> Result<Step, BatchError> {
        let artifact = &item.artifact;
        let baseline = match &item.baseline {
            Some(record) => Some(record.clone()),
            None => match self.engine.store().get(&artifact.id) {
                Ok(record) => record,
                Err(err) => return Ok(Step::Done(failed(artifact, &ArtifactFailure::Store(err)))),
            },
        };

        let checksum = self.engine.store().stale_checksum(&artifact.content);
        let baseline_hash = baseline.as_ref().map(|r| &r.canonical_hash);
        let previous = self
            .previous_run(&artifact.id)?
            .filter(|p| p.checksum == checksum && p.baseline.as_ref() == baseline_hash);

        if let Some(previous) = previous {
            return Ok(self.skip(artifact, previous.report));
        }
        if let Some(record) = baseline.as_ref().filter(|r| r.staleness_checksum == checksum) {
            // Same bytes as the accepted content, so the hashes are equal.
            let hash = record.canonical_hash.as_str();
            return match self.engine.classifier().classify(&artifact.id, Some(hash), hash, Vec::new()) {
                Ok(report) => Ok(self.skip(artifact, report)),
                Err(violation) => Ok(Step::Fatal { artifact_id: artifact.id.clone(), violation }),
            };
        }

        match self.engine.analyze_against(artifact, baseline.as_ref()) {
            Ok(analysis) => {
                let in_effect = match baseline_hash {
                    Some(hash) => Some(hash.clone()),
                    None if self.engine.config().record_first_seen => Some(analysis.hash.clone()),
                    None => None,
                };
                let mut last_run = self.last_run.write().map_err(|_| BatchError::Poisoned("last-run cache"))?;
                last_run.insert(
                    artifact.id.clone(),
                    LastRun { checksum: analysis.checksum, baseline: in_effect, report: analysis.report.clone() },
                );
                Ok(Step::Done(ArtifactOutcome::Analyzed { report: analysis.report }))
            }
            Err(ArtifactFailure::Invariant(violation)) => {
                Ok(Step::Fatal { artifact_id: artifact.id.clone(), violation })
            }
            Err(failure) => {
                tracing::warn!(artifact = %artifact.id, kind = ?failure.kind(), error = %failure, "artifact failed");
                Ok(Step::Done(failed(artifact, &failure)))
            }
        }
    }

    fn skip(&self, artifact: &Artifact, prior: DriftReport) -> Step {
        self.engine.pipeline_stats().record_skip();
        tracing::debug!(artifact = %artifact.id, drift = prior.drift_detected(), "skipped unchanged artifact");
        Step::Done(ArtifactOutcome::Skipped { artifact_id: artifact.id.clone(), prior: Some(prior) })
    }

    fn previous_run(&self, artifact_id: &str) -> Result<Option<LastRun>, BatchError> {
        let last_run = self.last_run.read().map_err(|_| BatchError::Poisoned("last-run cache"))?;
        Ok(last_run.get(artifact_id).cloned())
    }

    fn assemble(
        &self,
        mut results: Vec<(usize, ArtifactOutcome)>,
        total: usize,
        cancelled: bool,
        started: Instant,
    ) -> BatchReport {
        results.sort_by_key(|(index, _)| *index);
        let classifier = self.engine.classifier();

        let mut report = BatchReport {
            analyzed: 0,
            skipped: 0,
            drift_count: 0,
            by_severity: BTreeMap::new(),
            errors: Vec::new(),
            elapsed_ms: 0,
            outcomes: Vec::with_capacity(results.len()),
            cancelled: cancelled && results.len() < total,
            signal: SignalTally::default(),
            signal_to_noise_ratio: 1.0,
        };
        for (_, outcome) in results {
            match &outcome {
                ArtifactOutcome::Analyzed { report: drift } => {
                    report.analyzed += 1;
                    if drift.drift_detected() {
                        report.drift_count += 1;
                    }
                    *report.by_severity.entry(drift.severity()).or_default() += 1;
                    report.signal.record(drift, classifier);
                }
                ArtifactOutcome::Skipped { .. } => report.skipped += 1,
                ArtifactOutcome::Failed { error } => report.errors.push(error.clone()),
            }
            report.outcomes.push(outcome);
        }
        report.signal_to_noise_ratio = report.signal.ratio();
        report.elapsed_ms = started.elapsed().as_millis() as u64;
        report
    }
}

struct Drained {
    outcomes: Vec<(usize, ArtifactOutcome)>,
    fatal: Option<(String, InvariantViolation)>,
}

/// Pull items off a shared index on `workers` scoped threads until the list
/// is exhausted, the caller cancels, or a step turns fatal.
fn drain<T: Sync>(
    items: &[T],
    workers: usize,
    cancel: &CancellationToken,
    process: impl Fn(&T) -> Result<Step, BatchError> + Sync,
) -> Result<Drained, BatchError> {
    let next = AtomicUsize::new(0);
    let stop = AtomicBool::new(false);
    let fatal: Mutex<Option<(String, InvariantViolation)>> = Mutex::new(None);

    let outcomes = std::thread::scope(|scope| {
        let handles: Vec<_> = (0..workers)
            .map(|_| {
                scope.spawn(|| {
                    let mut done = Vec::new();
                    loop {
                        if cancel.is_cancelled() || stop.load(Ordering::SeqCst) {
                            break;
                        }
                        let index = next.fetch_add(1, Ordering::SeqCst);
                        let Some(item) = items.get(index) else {
                            break;
                        };
                        let step = match process(item) {
                            Ok(step) => step,
                            Err(err) => return Err(err),
                        };
                        match step {
                            Step::Done(outcome) => done.push((index, outcome)),
                            Step::Fatal { artifact_id, violation } => {
                                if let Ok(mut slot) = fatal.lock() {
                                    slot.get_or_insert((artifact_id, violation));
                                }
                                stop.store(true, Ordering::SeqCst);
                                break;
                            }
                        }
                    }
                    Ok(done)
                })
            })
            .collect();

        let mut all = Vec::new();
        for handle in handles {
            match handle.join() {
                Ok(Ok(done)) => all.extend(done),
                Ok(Err(err)) => return Err(err),
                Err(_) => return Err(BatchError::WorkerPanicked),
            }
        }
        Ok(all)
    })?;

    let fatal = fatal.into_inner().map_err(|_| BatchError::Poisoned("fatal slot"))?;
    Ok(Drained { outcomes, fatal })
}

fn failed(artifact: &Artifact, failure: &ArtifactFailure) -> ArtifactOutcome {
    ArtifactOutcome::Failed {
        error: ArtifactError {
            artifact_id: artifact.id.clone(),
            kind: failure.kind(),
            message: failure.to_string(),
        },
    }
}
