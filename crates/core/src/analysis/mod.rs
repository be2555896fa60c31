//! Structural comparison of canonical forms and drift classification.

pub mod build;
pub mod classify;
pub mod diff;
pub mod tree;

pub use build::build_tree;
pub use classify::{
    AccuracyTally, DriftClassifier, DriftReport, InvariantViolation, SignalTally,
    SNR_ACCEPTANCE_THRESHOLD,
};
pub use diff::DiffAnalyzer;
pub use tree::{NodeFlags, NodeId, StructuralNode, StructuralTree};
