//! RDF graph canonicalization (N-Triples, N-Quads, Turtle).

pub mod labeling;
pub mod lexer;
pub mod parser;
pub mod term;

use crate::budget::Deadline;
use crate::canon::CanonError;
use crate::model::Format;

use self::term::{Quad, Term};

/// Parse `text` and emit the canonical N-Quads serialization.
pub fn canonicalize(text: &str, format: Format, deadline: &Deadline) -> Result<String, CanonError> {
    let mut quads = parse(text, format, deadline)?;
    quads.sort();
    quads.dedup();
    tracing::trace!(quads = quads.len(), %format, "parsed graph");
    Ok(labeling::canonical_nquads(&quads, deadline)?)
}

pub fn parse(text: &str, format: Format, deadline: &Deadline) -> Result<Vec<Quad>, CanonError> {
    match format {
        Format::Turtle => parser::parse_turtle(text, deadline),
        _ => parser::parse_nquads(text, format, deadline),
    }
}

/// Re-read canonical N-Quads, keeping the `c14nN` blank labels as written.
pub fn parse_canonical(text: &str) -> Result<Vec<Quad>, CanonError> {
    let quads = parser::parse_nquads(text, Format::NQuads, &Deadline::unbounded())?;
    Ok(quads
        .into_iter()
        .map(|quad| Quad {
            subject: plain_label(quad.subject),
            predicate: quad.predicate,
            object: plain_label(quad.object),
            graph: quad.graph.map(plain_label),
        })
        .collect())
}

fn plain_label(term: Term) -> Term {
    match term {
        Term::Blank(label) => match label.strip_prefix('u') {
            Some(plain) => Term::Blank(plain.to_string()),
            None => Term::Blank(label),
        },
        other => other,
    }
}
