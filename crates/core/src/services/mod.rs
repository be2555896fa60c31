//! Orchestration on top of the canonicalize/hash/diff/classify stages.

pub mod batch;
pub mod pipeline;

pub use batch::{
    ArtifactError, ArtifactOutcome, BatchError, BatchItem, BatchOrchestrator, BatchReport,
    CancellationToken,
};
pub use pipeline::{
    Analysis, ArtifactFailure, DriftEngine, EngineError, FailureKind, PipelineStats, StatsSnapshot,
};
