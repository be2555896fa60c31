use drift_core::analysis::{AccuracyTally, SNR_ACCEPTANCE_THRESHOLD};
use drift_core::config::EngineConfig;
use drift_core::db::{BaselineStore, MemoryBaselineStore, SqliteBaselineStore};
use drift_core::hash::HashEngine;
use drift_core::model::{Artifact, ChangeKind, Format, Severity};
use drift_core::services::{
    ArtifactOutcome, BatchItem, BatchOrchestrator, CancellationToken, DriftEngine, FailureKind,
};

fn module(i: usize, id_type: &str) -> String {
    format!(
        "import {{ db }} from \"./db\";\n\n\
         export function getUser{i}(id: {id_type}): Promise<User> {{\n  return db.users.find(id);\n}}\n\n\
         export function countUsers{i}(): number {{\n  return db.users.count();\n}}\n"
    )
}

fn cosmetic_variant(i: usize) -> String {
    match i % 3 {
        // Comments and layout only.
        0 => format!(
            "// generated file, do not edit\nimport {{ db }} from \"./db\"\n\
             export function getUser{i}(\n  id: string\n): Promise<User>\n{{\n  /* lookup */\n  return db.users.find( id )\n}}\n\
             export function countUsers{i}(): number {{ return db.users.count() }}\n"
        ),
        // Declarations swapped.
        1 => format!(
            "import {{ db }} from \"./db\";\n\
             export function countUsers{i}(): number {{\n  return db.users.count();\n}}\n\
             export function getUser{i}(id: string): Promise<User> {{\n  return db.users.find(id);\n}}\n"
        ),
        // Trailing whitespace and blank lines.
        _ => format!("\n\n{}   \n\n", module(i, "string").replace('\n', "  \n")),
    }
}

fn artifact(i: usize, content: String) -> Artifact {
    Artifact::new(format!("src/generated/user{i}.ts"), content, Format::SourceText)
}

#[test]
fn mixed_corpus_flags_exactly_the_semantic_changes() {
    let store = MemoryBaselineStore::new();
    let engine = DriftEngine::new(&store, EngineConfig::default().with_workers(4)).expect("engine");
    for i in 0..100 {
        engine.accept_baseline(&artifact(i, module(i, "string"))).expect("accept");
    }
    let orchestrator = BatchOrchestrator::new(engine);

    // Every tenth artifact changes a parameter type; the rest are cosmetic.
    let candidates: Vec<Artifact> = (0..100)
        .map(|i| {
            let content = if i % 10 == 0 { module(i, "number") } else { cosmetic_variant(i) };
            artifact(i, content)
        })
        .collect();
    let report = orchestrator.run(&candidates).expect("batch");

    assert_eq!(report.analyzed, 100);
    assert_eq!(report.skipped, 0);
    assert!(report.errors.is_empty(), "errors: {:?}", report.errors);
    assert_eq!(report.drift_count, 10);
    assert_eq!(report.by_severity.get(&Severity::High), Some(&10));

    let mut accuracy = AccuracyTally::default();
    for (i, outcome) in report.outcomes.iter().enumerate() {
        assert_eq!(outcome.artifact_id(), candidates[i].id);
        let drift = outcome.report().expect("report").drift_detected();
        accuracy.record(i % 10 == 0, drift);
    }
    assert_eq!(accuracy.flagged(), 10);
    assert!(accuracy.signal_to_noise_ratio() >= SNR_ACCEPTANCE_THRESHOLD);
    assert!(accuracy.meets_acceptance());

    let flagged = report.outcomes[0].report().expect("report");
    assert!(flagged
        .diff_entries()
        .iter()
        .any(|e| e.kind == ChangeKind::Modified && e.identifier == "getUser0"));
}

#[test]
fn unchanged_artifacts_are_skipped_with_their_prior_verdict() {
    let store = MemoryBaselineStore::new();
    let engine = DriftEngine::new(&store, EngineConfig::default().with_workers(2)).expect("engine");
    engine.accept_baseline(&artifact(1, module(1, "string"))).expect("accept");
    let orchestrator = BatchOrchestrator::new(engine);

    let changed = vec![artifact(1, module(1, "number"))];
    let first = orchestrator.run(&changed).expect("first run");
    assert_eq!(first.analyzed, 1);
    assert_eq!(first.drift_count, 1);
    let before = orchestrator.engine().stats();

    let second = orchestrator.run(&changed).expect("second run");
    let after = orchestrator.engine().stats();
    assert_eq!(second.analyzed, 0);
    assert_eq!(second.skipped, 1);
    assert_eq!(after.canonicalized, before.canonicalized);
    assert_eq!(after.hashed, before.hashed);
    assert_eq!(after.skipped, before.skipped + 1);

    match &second.outcomes[0] {
        ArtifactOutcome::Skipped { artifact_id, prior } => {
            assert_eq!(artifact_id, &changed[0].id);
            assert_eq!(prior.as_ref(), first.outcomes[0].report());
        }
        other => panic!("expected skip, got {other:?}"),
    }
}

#[test]
fn accepting_the_drifted_content_clears_the_remembered_verdict() {
    let store = MemoryBaselineStore::new();
    let engine = DriftEngine::new(&store, EngineConfig::default()).expect("engine");
    engine.accept_baseline(&artifact(4, module(4, "string"))).expect("accept");
    let orchestrator = BatchOrchestrator::new(engine);

    let changed = vec![artifact(4, module(4, "number"))];
    assert_eq!(orchestrator.run(&changed).expect("first run").drift_count, 1);

    orchestrator.engine().accept_baseline(&changed[0]).expect("accept change");
    assert!(!orchestrator.engine().analyze(&changed[0]).expect("analyze").drift_detected());

    let after = orchestrator.run(&changed).expect("second run");
    assert_eq!(after.skipped, 1);
    assert_eq!(after.drift_count, 0);
    let prior = after.outcomes[0].report().expect("verdict");
    assert!(!prior.drift_detected());
    assert_eq!(prior.baseline_hash(), Some(prior.current_hash()));
}

#[test]
fn a_new_baseline_forces_unchanged_content_to_be_analyzed_again() {
    let store = MemoryBaselineStore::new();
    let engine = DriftEngine::new(&store, EngineConfig::default()).expect("engine");
    engine.accept_baseline(&artifact(1, module(1, "string"))).expect("accept");
    let orchestrator = BatchOrchestrator::new(engine);

    let candidate = vec![artifact(1, cosmetic_variant(1))];
    let first = orchestrator.run(&candidate).expect("first run");
    assert_eq!((first.analyzed, first.drift_count), (1, 0));

    orchestrator.engine().accept_baseline(&artifact(1, module(1, "number"))).expect("accept new");
    assert!(orchestrator.engine().analyze(&candidate[0]).expect("analyze").drift_detected());

    let second = orchestrator.run(&candidate).expect("second run");
    assert_eq!(second.skipped, 0);
    assert_eq!(second.analyzed, 1);
    assert_eq!(second.drift_count, 1);
}

#[test]
fn reset_baseline_forgets_the_remembered_verdict() {
    let store = MemoryBaselineStore::new();
    let engine = DriftEngine::new(&store, EngineConfig::default()).expect("engine");
    engine.accept_baseline(&artifact(6, module(6, "string"))).expect("accept");
    let orchestrator = BatchOrchestrator::new(engine);

    let changed = vec![artifact(6, module(6, "number"))];
    assert_eq!(orchestrator.run(&changed).expect("first run").drift_count, 1);
    assert!(orchestrator.engine().reset_baseline(&changed[0].id).expect("reset"));

    let after = orchestrator.run(&changed).expect("second run");
    assert_eq!(after.analyzed, 1);
    assert_eq!(after.drift_count, 0);
    assert!(after.outcomes[0].report().expect("report").baseline_hash().is_none());
}

#[test]
fn each_analysis_hashes_the_canonical_form_once() {
    let store = MemoryBaselineStore::new();
    let engine = DriftEngine::new(&store, EngineConfig::default()).expect("engine");
    engine.accept_baseline(&artifact(8, module(8, "string"))).expect("accept");

    // Appending a declaration extends the stored canonical form.
    let appended = artifact(8, format!("{}export const extra = 1;\n", module(8, "string")));
    let before = engine.stats();
    let report = engine.analyze(&appended).expect("analyze");
    let after = engine.stats();

    assert_eq!(after.hashed, before.hashed + 1);
    let form = drift_core::canon::canonicalize(&appended.content, Format::SourceText).expect("canon");
    assert_eq!(report.current_hash(), &HashEngine::new().hash(&form));
}

#[test]
fn content_identical_to_the_accepted_baseline_is_skipped() {
    let store = MemoryBaselineStore::new();
    let engine = DriftEngine::new(&store, EngineConfig::default()).expect("engine");
    let accepted = artifact(7, module(7, "string"));
    engine.accept_baseline(&accepted).expect("accept");
    let orchestrator = BatchOrchestrator::new(engine);

    let report = orchestrator.run(std::slice::from_ref(&accepted)).expect("batch");
    assert_eq!(report.skipped, 1);
    assert_eq!(orchestrator.engine().stats().canonicalized, 1);
}

#[test]
fn supplied_baseline_takes_precedence_over_the_store() {
    let store = MemoryBaselineStore::new();
    let engine = DriftEngine::new(&store, EngineConfig::default()).expect("engine");
    let old = engine.accept_baseline(&artifact(3, module(3, "string"))).expect("accept old");
    engine.accept_baseline(&artifact(3, module(3, "number"))).expect("accept new");
    let orchestrator = BatchOrchestrator::new(engine);

    // Same content as the stored baseline, but checked against the older record.
    let item = BatchItem::new(artifact(3, module(3, "number")), Some(old));
    let report = orchestrator.run_batch(&[item], &CancellationToken::new()).expect("batch");
    assert_eq!(report.analyzed, 1);
    assert_eq!(report.drift_count, 1);
}

#[test]
fn accepting_the_same_content_twice_is_a_no_op() {
    let store = MemoryBaselineStore::new();
    let engine = DriftEngine::new(&store, EngineConfig::default()).expect("engine");
    let art = artifact(5, module(5, "string"));

    let first = engine.accept_baseline(&art).expect("first accept");
    let second = engine.accept_baseline(&art).expect("second accept");
    assert_eq!(first, second);
    assert_eq!(store.put_count(), 1);

    // Cosmetic edits hash the same but change the checksum, so a record is written.
    let reformatted = artifact(5, format!("// header\n{}", module(5, "string")));
    let third = engine.accept_baseline(&reformatted).expect("third accept");
    assert_eq!(third.canonical_hash, first.canonical_hash);
    assert_eq!(store.put_count(), 2);
}

#[test]
fn first_sighting_records_a_baseline_without_drift() {
    let store = MemoryBaselineStore::new();
    let engine = DriftEngine::new(&store, EngineConfig::default()).expect("engine");
    let art = artifact(9, module(9, "string"));

    let report = engine.analyze(&art).expect("analyze");
    assert!(!report.drift_detected());
    assert!(report.baseline_hash().is_none());
    assert_eq!(
        store.get(&art.id).expect("get").map(|r| r.canonical_hash),
        Some(report.current_hash().clone())
    );

    let changed = engine.analyze(&artifact(9, module(9, "number"))).expect("analyze change");
    assert!(changed.drift_detected());
}

#[test]
fn reset_forgets_the_baseline() {
    let store = MemoryBaselineStore::new();
    let engine = DriftEngine::new(&store, EngineConfig::default()).expect("engine");
    let art = artifact(2, module(2, "string"));
    engine.accept_baseline(&art).expect("accept");

    assert!(engine.reset_baseline(&art.id).expect("reset"));
    assert!(!engine.reset_baseline(&art.id).expect("second reset"));
    assert!(store.get(&art.id).expect("get").is_none());
}

#[test]
fn malformed_artifact_does_not_stop_the_batch() {
    let store = MemoryBaselineStore::new();
    let engine = DriftEngine::new(&store, EngineConfig::default().with_workers(3)).expect("engine");
    let orchestrator = BatchOrchestrator::new(engine);

    let artifacts = vec![
        artifact(0, module(0, "string")),
        Artifact::new("broken.ts", "export function broken() {\n  return 1;\n", Format::SourceText),
        Artifact::new("broken.json", "{\"a\": }", Format::Json),
        artifact(3, module(3, "string")),
    ];
    let report = orchestrator.run(&artifacts).expect("batch");

    assert_eq!(report.analyzed, 2);
    assert_eq!(report.errors.len(), 2);
    assert!(report.errors.iter().all(|e| e.kind == FailureKind::Parse));
    assert_eq!(report.outcomes.len(), 4);
    assert!(matches!(&report.outcomes[1], ArtifactOutcome::Failed { error } if error.artifact_id == "broken.ts"));
}

#[test]
fn runaway_nesting_fails_only_its_own_artifact() {
    let store = MemoryBaselineStore::new();
    let engine = DriftEngine::new(&store, EngineConfig::default().with_workers(2)).expect("engine");
    let orchestrator = BatchOrchestrator::new(engine);

    let deep_source = format!("function f() {}{}", "{ ".repeat(5_000), "} ".repeat(5_001));
    let deep_turtle = format!(
        "<http://example.org/s> <http://example.org/p> {}<http://example.org/o>{} .",
        "[ <http://example.org/p> ".repeat(5_000),
        " ]".repeat(5_000)
    );
    let artifacts = vec![
        artifact(0, module(0, "string")),
        Artifact::new("deep.ts", deep_source, Format::SourceText),
        Artifact::new("deep.ttl", deep_turtle, Format::Turtle),
        artifact(3, module(3, "string")),
    ];
    let report = orchestrator.run(&artifacts).expect("batch");

    assert_eq!(report.analyzed, 2);
    assert_eq!(report.errors.len(), 2);
    assert!(report.errors.iter().all(|e| e.kind == FailureKind::Parse), "errors: {:?}", report.errors);
}

#[test]
fn slow_artifact_times_out_in_isolation() {
    let store = MemoryBaselineStore::new();
    let engine = DriftEngine::new(&store, EngineConfig::default().with_timeout_ms(1)).expect("engine");
    let orchestrator = BatchOrchestrator::new(engine);

    let mut huge = String::new();
    for i in 0..50_000 {
        huge.push_str(&format!("export const value{i} = compute({i}, \"{i}\");\n"));
    }
    let artifacts = vec![Artifact::new("huge.ts", huge, Format::SourceText)];
    let report = orchestrator.run(&artifacts).expect("batch");

    assert_eq!(report.errors.len(), 1);
    assert_eq!(report.errors[0].kind, FailureKind::Timeout);
}

#[test]
fn cancelled_batch_returns_partial_report() {
    let store = MemoryBaselineStore::new();
    let engine = DriftEngine::new(&store, EngineConfig::default()).expect("engine");
    let orchestrator = BatchOrchestrator::new(engine);
    let items: Vec<BatchItem> =
        (0..5).map(|i| BatchItem::new(artifact(i, module(i, "string")), None)).collect();

    let cancel = CancellationToken::new();
    cancel.cancel();
    let report = orchestrator.run_batch(&items, &cancel).expect("batch");

    assert!(report.cancelled);
    assert!(report.outcomes.is_empty());
    assert_eq!(report.analyzed, 0);
}

#[test]
fn batch_runs_against_sqlite_store() {
    let store = SqliteBaselineStore::open_in_memory().expect("open");
    let engine = DriftEngine::new(&store, EngineConfig::default().with_workers(2)).expect("engine");
    for i in 0..4 {
        engine.accept_baseline(&artifact(i, module(i, "string"))).expect("accept");
    }
    let orchestrator = BatchOrchestrator::new(engine);

    let candidates: Vec<Artifact> = (0..4)
        .map(|i| artifact(i, if i == 2 { module(i, "number") } else { cosmetic_variant(i) }))
        .collect();
    let report = orchestrator.run(&candidates).expect("batch");

    assert_eq!(report.analyzed, 4);
    assert_eq!(report.drift_count, 1);
    assert_eq!(store.count().expect("count"), 4);
}

#[test]
fn batch_report_serializes_to_json() {
    let store = MemoryBaselineStore::new();
    let engine = DriftEngine::new(&store, EngineConfig::default()).expect("engine");
    let orchestrator = BatchOrchestrator::new(engine);
    let report = orchestrator.run(&[artifact(0, module(0, "string"))]).expect("batch");

    let json = serde_json::to_value(&report).expect("serialize");
    assert_eq!(json["analyzed"], 1);
    assert_eq!(json["outcomes"][0]["status"], "analyzed");
}
