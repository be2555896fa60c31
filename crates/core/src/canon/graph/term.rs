//! RDF terms and their canonical N-Quads serialization.

use std::fmt::Write as _;

pub const RDF_NS: &str = "http://www.w3.org/1999/02/22-rdf-syntax-ns#";
pub const RDFS_NS: &str = "http://www.w3.org/2000/01/rdf-schema#";
pub const XSD_NS: &str = "http://www.w3.org/2001/XMLSchema#";
pub const XSD_STRING: &str = "http://www.w3.org/2001/XMLSchema#string";

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Term {
    Iri(String),
    /// Blank node, keyed by a parser-local label.
    Blank(String),
    Literal(Literal),
}

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Literal {
    pub lexical: String,
    /// `None` means a plain `xsd:string` literal.
    pub datatype: Option<String>,
    pub language: Option<String>,
}

impl Literal {
    pub fn new(lexical: impl Into<String>, datatype: Option<String>, language: Option<String>) -> Self {
        let language = language.map(|l| l.to_ascii_lowercase());
        let datatype = match (datatype, &language) {
            (_, Some(_)) => None,
            (Some(dt), None) if dt == XSD_STRING => None,
            (dt, None) => dt,
        };
        Self { lexical: lexical.into(), datatype, language }
    }

    pub fn typed(lexical: impl Into<String>, datatype: &str) -> Self {
        Self::new(lexical, Some(datatype.to_string()), None)
    }
}

impl Term {
    pub fn iri(value: impl Into<String>) -> Self {
        Term::Iri(value.into())
    }

    pub fn is_blank(&self) -> bool {
        matches!(self, Term::Blank(_))
    }

    pub fn blank_label(&self) -> Option<&str> {
        match self {
            Term::Blank(label) => Some(label),
            _ => None,
        }
    }

    /// N-Quads text of this term, blank labels as stored.
    pub fn to_nquads(&self) -> String {
        let mut out = String::new();
        write_term(&mut out, self, &mut |label: &str| label.to_string());
        out
    }
}

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Quad {
    pub subject: Term,
    pub predicate: Term,
    pub object: Term,
    pub graph: Option<Term>,
}

impl Quad {
    pub fn terms(&self) -> impl Iterator<Item = &Term> {
        [&self.subject, &self.predicate, &self.object].into_iter().chain(self.graph.as_ref())
    }

    /// Serialize as one N-Quads line (without the trailing newline), naming
    /// blank nodes through `label`.
    pub fn to_nquads_with<F>(&self, mut label: F) -> String
    where
        F: FnMut(&str) -> String,
    {
        let mut out = String::with_capacity(96);
        write_term(&mut out, &self.subject, &mut label);
        out.push(' ');
        write_term(&mut out, &self.predicate, &mut label);
        out.push(' ');
        write_term(&mut out, &self.object, &mut label);
        if let Some(graph) = &self.graph {
            out.push(' ');
            write_term(&mut out, graph, &mut label);
        }
        out.push_str(" .");
        out
    }
}

fn write_term<F>(out: &mut String, term: &Term, label: &mut F)
where
    F: FnMut(&str) -> String,
{
    match term {
        Term::Iri(iri) => {
            out.push('<');
            out.push_str(iri);
            out.push('>');
        }
        Term::Blank(id) => {
            out.push_str("_:");
            out.push_str(&label(id));
        }
        Term::Literal(lit) => {
            out.push('"');
            escape_literal(out, &lit.lexical);
            out.push('"');
            if let Some(lang) = &lit.language {
                out.push('@');
                out.push_str(lang);
            } else if let Some(dt) = &lit.datatype {
                out.push_str("^^<");
                out.push_str(dt);
                out.push('>');
            }
        }
    }
}

fn escape_literal(out: &mut String, value: &str) {
    for ch in value.chars() {
        match ch {
            '\\' => out.push_str("\\\\"),
            '"' => out.push_str("\\\""),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\t' => out.push_str("\\t"),
            '\u{8}' => out.push_str("\\b"),
            '\u{c}' => out.push_str("\\f"),
            c if (c as u32) < 0x20 || c as u32 == 0x7f => {
                let _ = write!(out, "\\u{:04X}", c as u32);
            }
            c => out.push(c),
        }
    }
}
