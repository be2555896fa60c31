//! Core data model shared by every stage of the drift pipeline.
//!
//! Artifacts arrive from an external generator and are never mutated here.
//! Everything downstream (canonical forms, hashes, diff entries, reports)
//! is derived from them.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::config::ConfigError;

/// Serialization format an artifact is declared in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Format {
    /// Line-oriented N-Triples.
    NTriples,
    /// Line-oriented N-Quads (N-Triples plus an optional graph term).
    NQuads,
    /// Turtle (prefixes, predicate lists, blank-node property lists, collections).
    Turtle,
    /// Brace-structured source code (TypeScript, Rust, Java-like).
    SourceText,
    /// JSON documents.
    Json,
}

/// Equivalence family of a format. Canonical forms of the same family are comparable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FormatFamily {
    Graph,
    Source,
    Structured,
}

impl Format {
    pub fn family(self) -> FormatFamily {
        match self {
            Format::NTriples | Format::NQuads | Format::Turtle => FormatFamily::Graph,
            Format::SourceText => FormatFamily::Source,
            Format::Json => FormatFamily::Structured,
        }
    }

    /// Stable tag used in configuration files and storage.
    pub fn as_str(self) -> &'static str {
        match self {
            Format::NTriples => "ntriples",
            Format::NQuads => "nquads",
            Format::Turtle => "turtle",
            Format::SourceText => "source",
            Format::Json => "json",
        }
    }
}

impl fmt::Display for Format {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Format {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "ntriples" | "nt" => Ok(Format::NTriples),
            "nquads" | "nq" => Ok(Format::NQuads),
            "turtle" | "ttl" => Ok(Format::Turtle),
            "source" | "source_text" => Ok(Format::SourceText),
            "json" => Ok(Format::Json),
            other => Err(ConfigError::UnknownFormat(other.to_string())),
        }
    }
}

impl FormatFamily {
    pub fn as_str(self) -> &'static str {
        match self {
            FormatFamily::Graph => "graph",
            FormatFamily::Source => "source",
            FormatFamily::Structured => "structured",
        }
    }

    pub fn from_tag(tag: &str) -> Option<Self> {
        match tag {
            "graph" => Some(FormatFamily::Graph),
            "source" => Some(FormatFamily::Source),
            "structured" => Some(FormatFamily::Structured),
            _ => None,
        }
    }
}

/// A generated artifact handed to the engine.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Artifact {
    /// Stable identity of the artifact (typically its output path).
    pub id: String,
    /// Raw bytes as produced by the generator.
    pub content: Vec<u8>,
    /// Declared format of `content`.
    pub format: Format,
}

impl Artifact {
    pub fn new(id: impl Into<String>, content: impl Into<Vec<u8>>, format: Format) -> Self {
        Self { id: id.into(), content: content.into(), format }
    }
}

/// Deterministic normal form of an artifact.
///
/// Always valid UTF-8; two semantically equivalent artifacts of the same
/// family produce byte-identical forms.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CanonicalForm {
    family: FormatFamily,
    text: String,
}

impl CanonicalForm {
    pub(crate) fn new(family: FormatFamily, text: String) -> Self {
        Self { family, text }
    }

    /// Rebuild a form previously produced by the canonicalizer (e.g. loaded from a store).
    pub fn from_stored(family: FormatFamily, text: impl Into<String>) -> Self {
        Self { family, text: text.into() }
    }

    pub fn family(&self) -> FormatFamily {
        self.family
    }

    pub fn as_str(&self) -> &str {
        &self.text
    }

    pub fn as_bytes(&self) -> &[u8] {
        self.text.as_bytes()
    }

    pub fn len(&self) -> usize {
        self.text.len()
    }

    pub fn is_empty(&self) -> bool {
        self.text.is_empty()
    }
}

/// How much a single change matters. Ordered from least to most significant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    None,
    Low,
    Medium,
    High,
}

impl Severity {
    pub fn as_str(self) -> &'static str {
        match self {
            Severity::None => "none",
            Severity::Low => "low",
            Severity::Medium => "medium",
            Severity::High => "high",
        }
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Severity {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "none" => Ok(Severity::None),
            "low" => Ok(Severity::Low),
            "medium" => Ok(Severity::Medium),
            "high" => Ok(Severity::High),
            other => Err(ConfigError::InvalidSeverityThreshold(other.to_string())),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChangeKind {
    Added,
    Removed,
    Modified,
    Reordered,
}

impl ChangeKind {
    pub fn as_str(self) -> &'static str {
        match self {
            ChangeKind::Added => "added",
            ChangeKind::Removed => "removed",
            ChangeKind::Modified => "modified",
            ChangeKind::Reordered => "reordered",
        }
    }
}

impl fmt::Display for ChangeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Syntactic category of a structural tree node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NodeKind {
    Root,
    Import,
    Function,
    Method,
    Interface,
    Class,
    Struct,
    Enum,
    Variant,
    TypeAlias,
    Field,
    Variable,
    Module,
    Impl,
    Statement,
    Graph,
    Subject,
    Property,
    Member,
    Element,
    /// The whole artifact, used when no structural baseline is available.
    Document,
}

impl NodeKind {
    pub fn as_str(self) -> &'static str {
        match self {
            NodeKind::Root => "root",
            NodeKind::Import => "import",
            NodeKind::Function => "function",
            NodeKind::Method => "method",
            NodeKind::Interface => "interface",
            NodeKind::Class => "class",
            NodeKind::Struct => "struct",
            NodeKind::Enum => "enum",
            NodeKind::Variant => "variant",
            NodeKind::TypeAlias => "type_alias",
            NodeKind::Field => "field",
            NodeKind::Variable => "variable",
            NodeKind::Module => "module",
            NodeKind::Impl => "impl",
            NodeKind::Statement => "statement",
            NodeKind::Graph => "graph",
            NodeKind::Subject => "subject",
            NodeKind::Property => "property",
            NodeKind::Member => "member",
            NodeKind::Element => "element",
            NodeKind::Document => "document",
        }
    }

    /// Named source declarations that can form a module's surface.
    pub fn is_declaration(self) -> bool {
        matches!(
            self,
            NodeKind::Function
                | NodeKind::Interface
                | NodeKind::Class
                | NodeKind::Struct
                | NodeKind::Enum
                | NodeKind::TypeAlias
                | NodeKind::Variable
                | NodeKind::Module
        )
    }

    /// Kinds whose children are diffed member by member.
    pub fn is_container(self) -> bool {
        matches!(
            self,
            NodeKind::Root
                | NodeKind::Interface
                | NodeKind::Class
                | NodeKind::Struct
                | NodeKind::Enum
                | NodeKind::TypeAlias
                | NodeKind::Module
                | NodeKind::Impl
                | NodeKind::Graph
                | NodeKind::Subject
                | NodeKind::Member
                | NodeKind::Element
        )
    }
}

impl fmt::Display for NodeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One classified difference between a baseline and a candidate tree.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiffEntry {
    pub kind: ChangeKind,
    pub node_kind: NodeKind,
    /// Name of the changed node (or its kind when it has none).
    pub identifier: String,
    /// Dotted path of the enclosing declarations, e.g. `User` for `User.name`.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub path: String,
    pub severity: Severity,
    pub description: String,
}

impl DiffEntry {
    pub fn new(
        kind: ChangeKind,
        node_kind: NodeKind,
        identifier: impl Into<String>,
        severity: Severity,
        description: impl Into<String>,
    ) -> Self {
        Self {
            kind,
            node_kind,
            identifier: identifier.into(),
            path: String::new(),
            severity,
            description: description.into(),
        }
    }

    pub fn at(mut self, path: impl Into<String>) -> Self {
        self.path = path.into();
        self
    }

    /// Entries that carry semantic weight (everything but cosmetic reorders).
    pub fn is_significant(&self) -> bool {
        self.severity > Severity::None
    }
}
