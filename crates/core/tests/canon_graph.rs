use drift_core::canon::{canonicalize, CanonError};
use drift_core::model::{Format, FormatFamily};

const NTRIPLES: &str = r#"<http://example.org/alice> <http://xmlns.com/foaf/0.1/name> "Alice" .
<http://example.org/alice> <http://xmlns.com/foaf/0.1/knows> _:b0 .
_:b0 <http://xmlns.com/foaf/0.1/name> "Bob" .
_:b0 <http://www.w3.org/1999/02/22-rdf-syntax-ns#type> <http://xmlns.com/foaf/0.1/Person> .
"#;

const TURTLE: &str = r#"
@prefix foaf: <http://xmlns.com/foaf/0.1/> .
@prefix ex: <http://example.org/> .

# same graph, written the Turtle way
ex:alice foaf:name "Alice" ;
    foaf:knows [ a foaf:Person ; foaf:name "Bob" ] .
"#;

fn canon(text: &str, format: Format) -> String {
    canonicalize(text.as_bytes(), format).expect("canonicalize").as_str().to_string()
}

#[test]
fn same_graph_in_ntriples_and_turtle_has_one_canonical_form() {
    let from_nt = canonicalize(NTRIPLES.as_bytes(), Format::NTriples).expect("ntriples");
    let from_ttl = canonicalize(TURTLE.as_bytes(), Format::Turtle).expect("turtle");

    assert_eq!(from_nt.family(), FormatFamily::Graph);
    assert_eq!(from_nt, from_ttl);
    assert_eq!(from_nt.as_str().lines().count(), 4);
}

#[test]
fn statement_order_does_not_matter() {
    let mut lines: Vec<&str> = NTRIPLES.lines().collect();
    lines.reverse();
    let reversed = lines.join("\n");

    assert_eq!(canon(NTRIPLES, Format::NTriples), canon(&reversed, Format::NTriples));
}

#[test]
fn blank_node_labels_are_replaced_canonically() {
    let relabelled = NTRIPLES.replace("_:b0", "_:someOtherName");
    let a = canon(NTRIPLES, Format::NTriples);
    let b = canon(&relabelled, Format::NTriples);

    assert_eq!(a, b);
    assert!(a.contains("_:c14n0"), "canonical labels expected in:\n{a}");
    assert!(!a.contains("_:b0"));
}

#[test]
fn symmetric_blank_nodes_are_labelled_deterministically() {
    // Two interchangeable blank nodes pointing at each other.
    let doc = "_:x <http://example.org/p> _:y .\n_:y <http://example.org/p> _:x .\n";
    let swapped = "_:y <http://example.org/p> _:x .\n_:x <http://example.org/p> _:y .\n";

    let a = canon(doc, Format::NTriples);
    let b = canon(swapped, Format::NTriples);
    assert_eq!(a, b);
    assert!(a.contains("_:c14n0") && a.contains("_:c14n1"));
}

/// Directed cycles of the given lengths; node `n` is written as `label(n)`.
fn cycles(lengths: &[usize], label: impl Fn(usize) -> String) -> Vec<String> {
    let mut lines = Vec::new();
    let mut first = 0;
    for &len in lengths {
        for i in 0..len {
            let from = label(first + i);
            let to = label(first + (i + 1) % len);
            lines.push(format!("{from} <http://example.org/next> {to} ."));
        }
        first += len;
    }
    lines
}

#[test]
fn large_tied_classes_label_independently_of_input_names() {
    let plain = cycles(&[17, 5], |n| format!("_:a{n}")).join("\n");
    let renamed = cycles(&[17, 5], |n| format!("_:z{}", 21 - n)).join("\n");
    let mut reversed = cycles(&[17, 5], |n| format!("_:m{n:02}"));
    reversed.reverse();

    let expected = canon(&plain, Format::NTriples);
    assert_eq!(canon(&plain.replace("_:a", "_:z"), Format::NTriples), expected);
    assert_eq!(canon(&renamed, Format::NTriples), expected);
    assert_eq!(canon(&reversed.join("\n"), Format::NTriples), expected);
    assert_eq!(expected.lines().count(), 22);
    assert!(expected.contains("_:c14n21"));
}

#[test]
fn canonical_output_is_a_fixed_point() {
    let once = canon(TURTLE, Format::Turtle);
    let twice = canon(&once, Format::NQuads);
    assert_eq!(once, twice);
}

#[test]
fn duplicate_statements_collapse() {
    let doubled = format!("{NTRIPLES}{NTRIPLES}");
    assert_eq!(canon(NTRIPLES, Format::NTriples), canon(&doubled, Format::NTriples));
}

#[test]
fn explicit_xsd_string_matches_plain_literal() {
    let plain = r#"<http://example.org/s> <http://example.org/p> "v" ."#;
    let typed =
        r#"<http://example.org/s> <http://example.org/p> "v"^^<http://www.w3.org/2001/XMLSchema#string> ."#;
    assert_eq!(canon(plain, Format::NTriples), canon(typed, Format::NTriples));
}

#[test]
fn nquads_keep_graph_names() {
    let doc = "<http://example.org/s> <http://example.org/p> <http://example.org/o> <http://example.org/g> .\n";
    let out = canon(doc, Format::NQuads);
    assert_eq!(
        out,
        "<http://example.org/s> <http://example.org/p> <http://example.org/o> <http://example.org/g> .\n"
    );
}

#[test]
fn malformed_ntriples_reports_a_location() {
    let doc = "<http://example.org/s> <http://example.org/p> .\n";
    let err = canonicalize(doc.as_bytes(), Format::NTriples).expect_err("should fail");
    match err {
        CanonError::Parse(parse) => {
            assert_eq!(parse.format, Format::NTriples);
            assert_eq!(parse.location.line, 1);
        }
        other => panic!("expected parse error, got {other:?}"),
    }
}

#[test]
fn invalid_utf8_is_a_parse_error() {
    let bytes = b"<http://example.org/s> <http://example.org/p> \"\xff\" .\n";
    let err = canonicalize(bytes, Format::NTriples).expect_err("should fail");
    assert!(matches!(err, CanonError::Parse(_)));
}

#[test]
fn empty_document_canonicalizes_to_empty_form() {
    let form = canonicalize(b"# nothing here\n", Format::Turtle).expect("canonicalize");
    assert!(form.is_empty());
}

fn nested_property_lists(depth: usize) -> String {
    format!(
        "<http://example.org/s> <http://example.org/p> {}<http://example.org/o>{} .\n",
        "[ <http://example.org/p> ".repeat(depth),
        " ]".repeat(depth)
    )
}

#[test]
fn deeply_nested_turtle_is_a_parse_error() {
    match canonicalize(nested_property_lists(5_000).as_bytes(), Format::Turtle) {
        Err(CanonError::Parse(parse)) => {
            assert_eq!(parse.format, Format::Turtle);
            assert_eq!(parse.location.line, 1);
            assert!(parse.message.contains("nested"), "message: {}", parse.message);
        }
        other => panic!("expected parse error, got {other:?}"),
    }

    let collections = format!(
        "<http://example.org/s> <http://example.org/p> {}1{} .",
        "( ".repeat(5_000),
        " )".repeat(5_000)
    );
    assert!(matches!(canonicalize(collections.as_bytes(), Format::Turtle), Err(CanonError::Parse(_))));
}

#[test]
fn moderately_nested_turtle_still_canonicalizes() {
    let form = canonicalize(nested_property_lists(50).as_bytes(), Format::Turtle).expect("canonicalize");
    assert_eq!(form.as_str().lines().count(), 51);
}
