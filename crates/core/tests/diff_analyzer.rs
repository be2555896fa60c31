use drift_core::analysis::{build_tree, DiffAnalyzer, DriftClassifier};
use drift_core::canon::canonicalize;
use drift_core::config::ReorderPolicy;
use drift_core::hash::HashEngine;
use drift_core::model::{ChangeKind, DiffEntry, Format, NodeKind, Severity};

fn source_diff(base: &str, cand: &str) -> Vec<DiffEntry> {
    source_diff_with(ReorderPolicy::default(), base, cand)
}

fn source_diff_with(policy: ReorderPolicy, base: &str, cand: &str) -> Vec<DiffEntry> {
    let base = canonicalize(base.as_bytes(), Format::SourceText).expect("baseline");
    let cand = canonicalize(cand.as_bytes(), Format::SourceText).expect("candidate");
    DiffAnalyzer::new(policy).diff_forms(&base, &cand).expect("diff")
}

fn verdict(base: &str, cand: &str) -> (bool, Severity, Vec<DiffEntry>) {
    let engine = HashEngine::new();
    let base_form = canonicalize(base.as_bytes(), Format::SourceText).expect("baseline");
    let cand_form = canonicalize(cand.as_bytes(), Format::SourceText).expect("candidate");
    let entries = DiffAnalyzer::default().diff_forms(&base_form, &cand_form).expect("diff");
    let report = DriftClassifier::default()
        .classify(
            "api.ts",
            Some(engine.hash(&base_form).as_str()),
            engine.hash(&cand_form).as_str(),
            entries,
        )
        .expect("classify");
    (report.drift_detected(), report.severity(), report.diff_entries().to_vec())
}

#[test]
fn parameter_type_change_on_exported_function_is_high_drift() {
    let base = "export function getUserById(id: string): Promise<User> {\n  return db.users.find(id);\n}\n";
    let cand = "export function getUserById(id: number): Promise<User> {\n  return db.users.find(id);\n}\n";

    let (drift, severity, entries) = verdict(base, cand);
    assert!(drift);
    assert_eq!(severity, Severity::High);
    assert!(
        entries.iter().any(|e| e.kind == ChangeKind::Modified
            && e.identifier == "getUserById"
            && e.severity == Severity::High),
        "entries: {entries:?}"
    );
}

#[test]
fn removing_a_required_interface_field_is_breaking() {
    let base = "export interface User {\n  name: string;\n}\n";
    let cand = "export interface User {\n}\n";

    let (drift, severity, entries) = verdict(base, cand);
    assert!(drift);
    assert_eq!(severity, Severity::High);
    assert_eq!(entries.len(), 1, "entries: {entries:?}");
    assert_eq!(entries[0].kind, ChangeKind::Removed);
    assert_eq!(entries[0].node_kind, NodeKind::Field);
    assert_eq!(entries[0].identifier, "name");
    assert_eq!(entries[0].path, "User");
}

#[test]
fn swapping_two_functions_is_not_drift() {
    let base = "export function a() { return 1; }\nexport function b() { return 2; }\n";
    let cand = "export function b() { return 2; }\nexport function a() { return 1; }\n";

    let (drift, severity, entries) = verdict(base, cand);
    assert!(!drift);
    assert_eq!(severity, Severity::None);
    assert!(!entries.is_empty());
    assert!(entries.iter().all(|e| e.kind == ChangeKind::Reordered && e.severity == Severity::None));
}

#[test]
fn cosmetic_edits_produce_no_entries() {
    let base = "export const limit = 10;\nexport function f(x: number) { return x * limit; }\n";
    let cand = "// reformatted\nexport const limit = 10\nexport function f(\n  x: number\n) {\n  return x * limit;\n}\n";
    assert!(source_diff(base, cand).is_empty());
}

#[test]
fn adding_an_optional_field_is_low() {
    let base = "export interface User {\n  id: number;\n}\n";
    let cand = "export interface User {\n  id: number;\n  nickname?: string;\n}\n";

    let entries = source_diff(base, cand);
    assert_eq!(entries.len(), 1, "entries: {entries:?}");
    assert_eq!(entries[0].kind, ChangeKind::Added);
    assert_eq!(entries[0].identifier, "nickname");
    assert_eq!(entries[0].severity, Severity::Low);
}

#[test]
fn adding_a_required_field_to_an_exported_interface_is_medium() {
    let base = "export interface User {\n  id: number;\n}\n";
    let cand = "export interface User {\n  id: number;\n  email: string;\n}\n";

    let entries = source_diff(base, cand);
    assert_eq!(entries.len(), 1, "entries: {entries:?}");
    assert_eq!(entries[0].kind, ChangeKind::Added);
    assert_eq!(entries[0].severity, Severity::Medium);
}

#[test]
fn parameter_type_change_in_a_module_without_exports_is_high_drift() {
    let base = "function getUserById(id: string): User {\n  return users.get(id);\n}\n";
    let cand = "function getUserById(id: number): User {\n  return users.get(id);\n}\n";

    let (drift, severity, entries) = verdict(base, cand);
    assert!(drift);
    assert_eq!(severity, Severity::High, "entries: {entries:?}");
    assert_eq!(entries.len(), 1, "entries: {entries:?}");
    assert_eq!(entries[0].identifier, "getUserById");
}

#[test]
fn interface_method_signature_change_is_high_drift() {
    let base = "interface UserService {\n  getUserById(id: string): User;\n}\n";
    let cand = "interface UserService {\n  getUserById(id: number): User;\n}\n";

    let (drift, severity, entries) = verdict(base, cand);
    assert!(drift);
    assert_eq!(severity, Severity::High, "entries: {entries:?}");
    assert!(entries
        .iter()
        .any(|e| e.identifier == "getUserById" && e.kind == ChangeKind::Modified && e.path == "UserService"));
}

#[test]
fn unexported_helper_beside_exports_stays_medium() {
    let base = "export function run() { return helper(1); }\nfunction helper(x: number) { return x; }\n";
    let cand = "export function run() { return helper(1); }\nfunction helper(x: string) { return x; }\n";

    let entries = source_diff(base, cand);
    assert_eq!(entries.len(), 1, "entries: {entries:?}");
    assert_eq!(entries[0].identifier, "helper");
    assert_eq!(entries[0].severity, Severity::Medium);
}

#[test]
fn body_change_without_signature_change_is_medium() {
    let base = "function helper(x: number) { return x + 1; }\n";
    let cand = "function helper(x: number) { return x + 2; }\n";

    let entries = source_diff(base, cand);
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].kind, ChangeKind::Modified);
    assert_eq!(entries[0].severity, Severity::Medium);
}

#[test]
fn side_effect_import_reorder_is_escalated_under_evaluation_order() {
    let base = "import \"./polyfills\";\nimport \"./app\";\n";
    let cand = "import \"./app\";\nimport \"./polyfills\";\n";

    let escalated = source_diff_with(ReorderPolicy::EvaluationOrder, base, cand);
    assert_eq!(escalated.len(), 1, "entries: {escalated:?}");
    assert_eq!(escalated[0].kind, ChangeKind::Reordered);
    assert_eq!(escalated[0].severity, Severity::Low);

    let ignored = source_diff_with(ReorderPolicy::Never, base, cand);
    assert!(ignored.iter().all(|e| e.severity == Severity::None));
}

#[test]
fn named_import_reorder_is_cosmetic() {
    let base = "import { a } from \"./a\";\nimport { b } from \"./b\";\n";
    let cand = "import { b } from \"./b\";\nimport { a } from \"./a\";\n";
    let entries = source_diff(base, cand);
    assert!(entries.iter().all(|e| e.kind == ChangeKind::Reordered && e.severity == Severity::None));
}

#[test]
fn removing_a_type_used_by_an_exported_signature_is_high() {
    let base = "interface Options { verbose: boolean }\nexport function run(opts: Options) {}\n";
    let cand = "export function run(opts: Options) {}\n";

    let entries = source_diff(base, cand);
    let removed = entries
        .iter()
        .find(|e| e.kind == ChangeKind::Removed && e.identifier == "Options")
        .expect("Options removal");
    assert_eq!(removed.severity, Severity::High);
}

#[test]
fn rust_private_field_removal_is_medium() {
    let base = "pub struct Config {\n    pub name: String,\n    retries: u32,\n}\n";
    let cand = "pub struct Config {\n    pub name: String,\n}\n";

    let entries = source_diff(base, cand);
    assert_eq!(entries.len(), 1, "entries: {entries:?}");
    assert_eq!(entries[0].identifier, "retries");
    assert_eq!(entries[0].severity, Severity::Medium);
}

#[test]
fn ontology_change_in_a_graph_is_high() {
    let base = "<http://example.org/User> <http://www.w3.org/2000/01/rdf-schema#subClassOf> <http://example.org/Agent> .\n";
    let cand = "<http://example.org/User> <http://www.w3.org/2000/01/rdf-schema#subClassOf> <http://example.org/Thing> .\n";
    let base = canonicalize(base.as_bytes(), Format::NTriples).expect("base");
    let cand = canonicalize(cand.as_bytes(), Format::NTriples).expect("cand");

    let entries = DiffAnalyzer::default().diff_forms(&base, &cand).expect("diff");
    assert_eq!(entries.len(), 1, "entries: {entries:?}");
    assert_eq!(entries[0].kind, ChangeKind::Modified);
    assert_eq!(entries[0].node_kind, NodeKind::Property);
    assert_eq!(entries[0].severity, Severity::High);
}

#[test]
fn format_family_change_is_reported_once() {
    let graph = canonicalize(b"<http://e/s> <http://e/p> <http://e/o> .", Format::NTriples).expect("graph");
    let json = canonicalize(br#"{"s": "o"}"#, Format::Json).expect("json");

    let entries = DiffAnalyzer::default().diff_forms(&graph, &json).expect("diff");
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].node_kind, NodeKind::Document);
    assert_eq!(entries[0].severity, Severity::High);
}

#[test]
fn nested_change_is_reported_at_the_leaf() {
    let depth = 100;
    let mut base = String::new();
    for i in 0..depth {
        base.push_str(&format!("{{\"k{i}\": "));
    }
    base.push('1');
    base.push_str(&"}".repeat(depth));
    let cand = base.replacen(": 1}", ": 2}", 1);

    let base_form = canonicalize(base.as_bytes(), Format::Json).expect("base");
    let cand_form = canonicalize(cand.as_bytes(), Format::Json).expect("cand");
    let tree = build_tree(&base_form).expect("tree");
    assert_eq!(tree.len(), depth + 1);

    let entries = DiffAnalyzer::default().diff_forms(&base_form, &cand_form).expect("diff");
    assert_eq!(entries.len(), 1, "entries: {entries:?}");
    assert_eq!(entries[0].identifier, "k99");
    assert!(entries[0].path.starts_with("k0.k1.k2."));
    assert!(entries[0].path.ends_with(".k98"));
}
