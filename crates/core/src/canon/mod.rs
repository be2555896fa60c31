//! Canonicalization: turn raw artifact bytes into a deterministic normal form.
//!
//! - Graph formats are parsed into a quad set, blank nodes are relabeled
//!   canonically and the quads are emitted as sorted N-Quads.
//! - Source text is tokenized, stripped of comments and whitespace and
//!   re-rendered one item per line. Statement order is kept as-is.
//! - JSON is re-serialized with sorted keys.

pub mod graph;
pub mod json;
pub mod source;

use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::budget::{Deadline, TimedOut};
use crate::model::{CanonicalForm, Format};

/// Deepest bracket nesting the parsers accept; serde_json stops at the same depth.
pub const MAX_NESTING: usize = 128;

/// Position in the input, 1-based.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Location {
    pub line: usize,
    pub column: usize,
}

impl Location {
    pub fn new(line: usize, column: usize) -> Self {
        Self { line, column }
    }

    pub fn start() -> Self {
        Self { line: 1, column: 1 }
    }
}

impl fmt::Display for Location {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.line, self.column)
    }
}

/// Malformed content for the declared format.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{format} parse error at {location}: {message}")]
pub struct ParseError {
    pub format: Format,
    pub location: Location,
    pub message: String,
}

impl ParseError {
    pub fn new(format: Format, location: Location, message: impl Into<String>) -> Self {
        Self { format, location, message: message.into() }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CanonError {
    #[error(transparent)]
    Parse(#[from] ParseError),

    #[error(transparent)]
    Timeout(#[from] TimedOut),
}

/// Turns artifact bytes into their [`CanonicalForm`].
#[derive(Debug, Clone, Copy, Default)]
pub struct Canonicalizer;

impl Canonicalizer {
    pub fn new() -> Self {
        Self
    }

    /// Canonicalize without a time budget.
    pub fn canonicalize(&self, content: &[u8], format: Format) -> Result<CanonicalForm, CanonError> {
        self.canonicalize_within(content, format, &Deadline::unbounded())
    }

    pub fn canonicalize_within(
        &self,
        content: &[u8],
        format: Format,
        deadline: &Deadline,
    ) -> Result<CanonicalForm, CanonError> {
        let text = decode_utf8(content, format)?;
        let canonical = match format {
            Format::NTriples | Format::NQuads | Format::Turtle => {
                graph::canonicalize(text, format, deadline)?
            }
            Format::SourceText => source::canonicalize(text, deadline)?,
            Format::Json => json::canonicalize(text)?,
        };
        Ok(CanonicalForm::new(format.family(), canonical))
    }
}

/// Convenience wrapper around [`Canonicalizer::canonicalize`].
pub fn canonicalize(content: &[u8], format: Format) -> Result<CanonicalForm, CanonError> {
    Canonicalizer::new().canonicalize(content, format)
}

fn decode_utf8(content: &[u8], format: Format) -> Result<&str, ParseError> {
    let text = std::str::from_utf8(content).map_err(|err| {
        let valid = &content[..err.valid_up_to()];
        let prefix = String::from_utf8_lossy(valid);
        let line = prefix.matches('\n').count() + 1;
        let column = prefix.rsplit('\n').next().map_or(0, |l| l.chars().count()) + 1;
        ParseError::new(format, Location::new(line, column), "content is not valid UTF-8")
    })?;
    Ok(text.strip_prefix('\u{feff}').unwrap_or(text))
}
