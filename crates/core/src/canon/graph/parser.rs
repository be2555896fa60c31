//! N-Triples / N-Quads and Turtle parsers producing a flat quad list.

use std::collections::HashMap;

use crate::budget::Deadline;
use crate::canon::graph::lexer::{Lexer, Tok, Token};
use crate::canon::graph::term::{Literal, Quad, Term, RDF_NS, XSD_NS};
use crate::canon::{CanonError, Location, ParseError, MAX_NESTING};
use crate::model::Format;

const DEADLINE_STRIDE: usize = 256;

/// Parse line-oriented N-Triples or N-Quads.
pub fn parse_nquads(text: &str, format: Format, deadline: &Deadline) -> Result<Vec<Quad>, CanonError> {
    let tokens = Lexer::new(text, format).tokenize()?;
    let mut cursor = Cursor::new(tokens, format);
    let mut quads = Vec::new();
    let mut ticks = 0usize;

    while !cursor.at_end() {
        deadline.check_every(&mut ticks, DEADLINE_STRIDE)?;
        let token = cursor.next()?;
        let subject = match &token.tok {
            Tok::IriRef(iri) => Term::Iri(iri.clone()),
            Tok::Blank(label) => user_blank(label),
            _ => return Err(cursor.unexpected(&token, "subject").into()),
        };
        let token = cursor.next()?;
        let predicate = match &token.tok {
            Tok::IriRef(iri) => Term::Iri(iri.clone()),
            _ => return Err(cursor.unexpected(&token, "predicate IRI").into()),
        };
        let token = cursor.next()?;
        let object = match &token.tok {
            Tok::IriRef(iri) => Term::Iri(iri.clone()),
            Tok::Blank(label) => user_blank(label),
            Tok::Str(lexical) => cursor.literal_suffix(lexical.clone(), None)?,
            _ => return Err(cursor.unexpected(&token, "object").into()),
        };
        let graph = if cursor.peek_tok() == Some(&Tok::Dot) {
            None
        } else {
            let token = cursor.next()?;
            match &token.tok {
                Tok::IriRef(_) | Tok::Blank(_) if format == Format::NTriples => {
                    return Err(ParseError::new(
                        format,
                        token.at,
                        "graph terms are not allowed in N-Triples",
                    )
                    .into());
                }
                Tok::IriRef(iri) => Some(Term::Iri(iri.clone())),
                Tok::Blank(label) => Some(user_blank(label)),
                _ => return Err(cursor.unexpected(&token, "'.' or graph term").into()),
            }
        };
        cursor.expect_dot()?;
        quads.push(Quad { subject, predicate, object, graph });
    }
    Ok(quads)
}

/// Parse a Turtle document.
pub fn parse_turtle(text: &str, deadline: &Deadline) -> Result<Vec<Quad>, CanonError> {
    let tokens = Lexer::new(text, Format::Turtle).tokenize()?;
    let mut parser = TurtleParser {
        cursor: Cursor::new(tokens, Format::Turtle),
        prefixes: HashMap::new(),
        base: None,
        quads: Vec::new(),
        next_blank: 0,
        deadline,
        ticks: 0,
        depth: 0,
    };
    while !parser.cursor.at_end() {
        parser.statement()?;
    }
    Ok(parser.quads)
}

fn user_blank(label: &str) -> Term {
    Term::Blank(format!("u{label}"))
}

struct Cursor {
    tokens: Vec<Token>,
    pos: usize,
    format: Format,
}

impl Cursor {
    fn new(tokens: Vec<Token>, format: Format) -> Self {
        Self { tokens, pos: 0, format }
    }

    fn at_end(&self) -> bool {
        self.pos >= self.tokens.len()
    }

    fn peek_tok(&self) -> Option<&Tok> {
        self.tokens.get(self.pos).map(|t| &t.tok)
    }

    fn end_location(&self) -> Location {
        self.tokens.last().map_or(Location::start(), |t| t.at)
    }

    fn next(&mut self) -> Result<Token, ParseError> {
        let token = self.tokens.get(self.pos).cloned().ok_or_else(|| {
            ParseError::new(self.format, self.end_location(), "unexpected end of input")
        })?;
        self.pos += 1;
        Ok(token)
    }

    fn eat(&mut self, tok: &Tok) -> bool {
        if self.peek_tok() == Some(tok) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn expect_dot(&mut self) -> Result<(), ParseError> {
        let token = self.next()?;
        if token.tok == Tok::Dot {
            Ok(())
        } else {
            Err(self.unexpected(&token, "'.'"))
        }
    }

    fn unexpected(&self, token: &Token, expected: &str) -> ParseError {
        ParseError::new(self.format, token.at, format!("expected {expected}, found {:?}", token.tok))
    }

    /// Consume an optional `@lang` or `^^<datatype>` after a string.
    fn literal_suffix(
        &mut self,
        lexical: String,
        prefixed: Option<&dyn Fn(&Token) -> Result<String, ParseError>>,
    ) -> Result<Term, ParseError> {
        match self.peek_tok().cloned() {
            Some(Tok::LangTag(lang)) => {
                self.pos += 1;
                Ok(Term::Literal(Literal::new(lexical, None, Some(lang))))
            }
            Some(Tok::DatatypeMarker) => {
                self.pos += 1;
                let token = self.next()?;
                let datatype = match (&token.tok, prefixed) {
                    (Tok::IriRef(iri), _) => iri.clone(),
                    (Tok::PName { .. }, Some(resolve)) => resolve(&token)?,
                    _ => return Err(self.unexpected(&token, "datatype IRI")),
                };
                Ok(Term::Literal(Literal::new(lexical, Some(datatype), None)))
            }
            _ => Ok(Term::Literal(Literal::new(lexical, None, None))),
        }
    }
}

struct TurtleParser<'d> {
    cursor: Cursor,
    prefixes: HashMap<String, String>,
    base: Option<String>,
    quads: Vec<Quad>,
    next_blank: usize,
    deadline: &'d Deadline,
    ticks: usize,
    /// Open `[` and `(` groups.
    depth: usize,
}

impl TurtleParser<'_> {
    fn nested<T>(&mut self, parse: impl FnOnce(&mut Self) -> Result<T, CanonError>) -> Result<T, CanonError> {
        if self.depth >= MAX_NESTING {
            let at = self.cursor.tokens.get(self.cursor.pos).map_or_else(|| self.cursor.end_location(), |t| t.at);
            let message = format!("blank nodes and collections nested deeper than {MAX_NESTING}");
            return Err(ParseError::new(Format::Turtle, at, message).into());
        }
        self.depth += 1;
        let result = parse(self);
        self.depth -= 1;
        result
    }

    fn fresh_blank(&mut self) -> Term {
        self.next_blank += 1;
        Term::Blank(format!("g{}", self.next_blank))
    }

    fn emit(&mut self, subject: Term, predicate: Term, object: Term) {
        self.quads.push(Quad { subject, predicate, object, graph: None });
    }

    fn statement(&mut self) -> Result<(), CanonError> {
        self.deadline.check_every(&mut self.ticks, DEADLINE_STRIDE)?;
        match self.cursor.peek_tok().cloned() {
            Some(Tok::PrefixDecl { sparql }) => {
                self.cursor.pos += 1;
                let name = self.cursor.next()?;
                let Tok::PName { prefix, local } = &name.tok else {
                    return Err(self.cursor.unexpected(&name, "prefix name").into());
                };
                if !local.is_empty() {
                    return Err(self.cursor.unexpected(&name, "prefix name ending in ':'").into());
                }
                let iri = self.iri_ref_token()?;
                self.prefixes.insert(prefix.clone(), iri);
                if !sparql {
                    self.cursor.expect_dot()?;
                }
            }
            Some(Tok::BaseDecl { sparql }) => {
                self.cursor.pos += 1;
                let iri = self.iri_ref_token()?;
                self.base = Some(iri);
                if !sparql {
                    self.cursor.expect_dot()?;
                }
            }
            _ => {
                self.triples()?;
                self.cursor.expect_dot()?;
            }
        }
        Ok(())
    }

    fn iri_ref_token(&mut self) -> Result<String, ParseError> {
        let token = self.cursor.next()?;
        match &token.tok {
            Tok::IriRef(iri) => Ok(resolve_iri(self.base.as_deref(), iri)),
            _ => Err(self.cursor.unexpected(&token, "IRI reference")),
        }
    }

    fn triples(&mut self) -> Result<(), CanonError> {
        if self.cursor.peek_tok() == Some(&Tok::LBracket) {
            let subject = self.blank_node_property_list()?;
            if self.cursor.peek_tok() != Some(&Tok::Dot) {
                self.predicate_object_list(&subject)?;
            }
            return Ok(());
        }
        let subject = self.subject()?;
        self.predicate_object_list(&subject)
    }

    fn subject(&mut self) -> Result<Term, CanonError> {
        if self.cursor.peek_tok() == Some(&Tok::LParen) {
            return self.collection();
        }
        let token = self.cursor.next()?;
        match &token.tok {
            Tok::IriRef(_) | Tok::PName { .. } => Ok(Term::Iri(self.resolve(&token)?)),
            Tok::Blank(label) => Ok(user_blank(label)),
            _ => Err(self.cursor.unexpected(&token, "subject").into()),
        }
    }

    fn predicate_object_list(&mut self, subject: &Term) -> Result<(), CanonError> {
        loop {
            let verb = self.verb()?;
            self.object_list(subject, &verb)?;
            if !self.cursor.eat(&Tok::Semicolon) {
                return Ok(());
            }
            while self.cursor.eat(&Tok::Semicolon) {}
            if matches!(self.cursor.peek_tok(), Some(Tok::Dot | Tok::RBracket) | None) {
                return Ok(());
            }
        }
    }

    fn verb(&mut self) -> Result<Term, ParseError> {
        let token = self.cursor.next()?;
        match &token.tok {
            Tok::A => Ok(Term::iri(format!("{RDF_NS}type"))),
            Tok::IriRef(_) | Tok::PName { .. } => Ok(Term::Iri(self.resolve(&token)?)),
            _ => Err(self.cursor.unexpected(&token, "predicate")),
        }
    }

    fn object_list(&mut self, subject: &Term, predicate: &Term) -> Result<(), CanonError> {
        loop {
            let object = self.object()?;
            self.emit(subject.clone(), predicate.clone(), object);
            if !self.cursor.eat(&Tok::Comma) {
                return Ok(());
            }
        }
    }

    fn object(&mut self) -> Result<Term, CanonError> {
        self.deadline.check_every(&mut self.ticks, DEADLINE_STRIDE)?;
        match self.cursor.peek_tok().cloned() {
            Some(Tok::LParen) => return self.collection(),
            Some(Tok::LBracket) => return self.blank_node_property_list(),
            _ => {}
        }
        let token = self.cursor.next()?;
        let term = match &token.tok {
            Tok::IriRef(_) | Tok::PName { .. } => Term::Iri(self.resolve(&token)?),
            Tok::Blank(label) => user_blank(label),
            Tok::Str(lexical) => {
                let lexical = lexical.clone();
                let prefixes = &self.prefixes;
                let base = self.base.as_deref();
                let format = self.cursor.format;
                let resolve = |t: &Token| resolve_token(prefixes, base, format, t);
                self.cursor.literal_suffix(lexical, Some(&resolve))?
            }
            Tok::Integer(n) => Term::Literal(Literal::typed(n.as_str(), &format!("{XSD_NS}integer"))),
            Tok::Decimal(n) => Term::Literal(Literal::typed(n.as_str(), &format!("{XSD_NS}decimal"))),
            Tok::Double(n) => Term::Literal(Literal::typed(n.as_str(), &format!("{XSD_NS}double"))),
            Tok::Boolean(b) => {
                Term::Literal(Literal::typed(b.to_string(), &format!("{XSD_NS}boolean")))
            }
            _ => return Err(self.cursor.unexpected(&token, "object").into()),
        };
        Ok(term)
    }

    fn blank_node_property_list(&mut self) -> Result<Term, CanonError> {
        self.nested(Self::property_list_body)
    }

    fn property_list_body(&mut self) -> Result<Term, CanonError> {
        self.cursor.pos += 1;
        let node = self.fresh_blank();
        if self.cursor.eat(&Tok::RBracket) {
            return Ok(node);
        }
        self.predicate_object_list(&node)?;
        let token = self.cursor.next()?;
        if token.tok != Tok::RBracket {
            return Err(self.cursor.unexpected(&token, "']'").into());
        }
        Ok(node)
    }

    fn collection(&mut self) -> Result<Term, CanonError> {
        self.nested(Self::collection_body)
    }

    fn collection_body(&mut self) -> Result<Term, CanonError> {
        self.cursor.pos += 1;
        let mut items = Vec::new();
        while !self.cursor.eat(&Tok::RParen) {
            if self.cursor.at_end() {
                let at = self.cursor.end_location();
                return Err(ParseError::new(Format::Turtle, at, "unterminated collection").into());
            }
            items.push(self.object()?);
        }

        let nil = Term::iri(format!("{RDF_NS}nil"));
        if items.is_empty() {
            return Ok(nil);
        }
        let first = Term::iri(format!("{RDF_NS}first"));
        let rest = Term::iri(format!("{RDF_NS}rest"));
        let nodes: Vec<Term> = items.iter().map(|_| self.fresh_blank()).collect();
        for (idx, item) in items.into_iter().enumerate() {
            let next = nodes.get(idx + 1).cloned().unwrap_or_else(|| nil.clone());
            self.emit(nodes[idx].clone(), first.clone(), item);
            self.emit(nodes[idx].clone(), rest.clone(), next);
        }
        Ok(nodes[0].clone())
    }

    fn resolve(&self, token: &Token) -> Result<String, ParseError> {
        resolve_token(&self.prefixes, self.base.as_deref(), self.cursor.format, token)
    }
}

fn resolve_token(
    prefixes: &HashMap<String, String>,
    base: Option<&str>,
    format: Format,
    token: &Token,
) -> Result<String, ParseError> {
    match &token.tok {
        Tok::IriRef(iri) => Ok(resolve_iri(base, iri)),
        Tok::PName { prefix, local } => prefixes
            .get(prefix)
            .map(|ns| format!("{ns}{local}"))
            .ok_or_else(|| ParseError::new(format, token.at, format!("undefined prefix '{prefix}:'"))),
        other => Err(ParseError::new(format, token.at, format!("expected IRI, found {other:?}"))),
    }
}

/// Resolve a possibly relative IRI reference against `base`.
pub fn resolve_iri(base: Option<&str>, iri: &str) -> String {
    let Some(base) = base else {
        return iri.to_string();
    };
    if has_scheme(iri) {
        return iri.to_string();
    }
    if iri.is_empty() {
        return base.split('#').next().unwrap_or(base).to_string();
    }
    if iri.starts_with('#') {
        let stem = base.split('#').next().unwrap_or(base);
        return format!("{stem}{iri}");
    }
    if let Some(rest) = iri.strip_prefix("//") {
        let scheme = base.split(':').next().unwrap_or("http");
        return format!("{scheme}://{rest}");
    }
    if iri.starts_with('/') {
        let authority_end = base
            .find("://")
            .map(|i| i + 3)
            .and_then(|start| base[start..].find('/').map(|j| start + j))
            .unwrap_or(base.len());
        return format!("{}{iri}", &base[..authority_end]);
    }
    let stem = base.split(['#', '?']).next().unwrap_or(base);
    match stem.rfind('/') {
        Some(idx) => format!("{}{iri}", &stem[..=idx]),
        None => format!("{stem}{iri}"),
    }
}

fn has_scheme(iri: &str) -> bool {
    match iri.find(':') {
        Some(idx) if idx > 0 => {
            let scheme = &iri[..idx];
            scheme.chars().next().is_some_and(|c| c.is_ascii_alphabetic())
                && scheme.chars().all(|c| c.is_ascii_alphanumeric() || matches!(c, '+' | '-' | '.'))
        }
        _ => false,
    }
}
