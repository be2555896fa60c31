//! Build structural trees from canonical forms.

use std::collections::{BTreeMap, HashMap};

use serde_json::Value;

use crate::analysis::tree::{NodeId, StructuralNode, StructuralTree};
use crate::budget::Deadline;
use crate::canon::graph::term::{Quad, Term};
use crate::canon::source::lexer::{Token, TokenKind};
use crate::canon::source::parser::{decorator_len, join_tokens};
use crate::canon::source::Item;
use crate::canon::{self, CanonError};
use crate::hash::hash_bytes;
use crate::model::{CanonicalForm, FormatFamily, NodeKind};

/// Parse a canonical form back into a structural tree.
pub fn build_tree(form: &CanonicalForm) -> Result<StructuralTree, CanonError> {
    match form.family() {
        FormatFamily::Graph => Ok(graph_tree(&canon::graph::parse_canonical(form.as_str())?)),
        FormatFamily::Source => {
            let items = canon::source::parse(form.as_str(), &Deadline::unbounded())?;
            Ok(source_tree(&items))
        }
        FormatFamily::Structured => Ok(json_tree(&canon::json::parse(form.as_str())?)),
    }
}

fn digest(text: &str) -> String {
    hash_bytes(text.as_bytes()).as_str()[..16].to_string()
}

// ---------------------------------------------------------------------------
// Graphs: Root -> Graph -> Subject -> Property

fn term_text(term: &Term) -> String {
    term.to_nquads()
}

pub fn graph_tree(quads: &[Quad]) -> StructuralTree {
    // graph -> subject -> predicate -> objects
    let mut grouped: BTreeMap<String, BTreeMap<String, (bool, BTreeMap<String, Vec<String>>)>> =
        BTreeMap::new();
    for quad in quads {
        let graph = quad.graph.as_ref().map_or_else(|| "default".to_string(), term_text);
        let subject = term_text(&quad.subject);
        let entry = grouped
            .entry(graph)
            .or_default()
            .entry(subject)
            .or_insert_with(|| (!quad.subject.is_blank(), BTreeMap::new()));
        entry.1.entry(term_text(&quad.predicate)).or_default().push(term_text(&quad.object));
    }

    let mut tree = StructuralTree::new(StructuralNode::new(NodeKind::Root));
    let root = tree.root();
    for (graph, subjects) in grouped {
        let graph_id = tree.add_child(root, StructuralNode::new(NodeKind::Graph).with_identifier(graph));
        tree.node_mut(graph_id).flags.exported = true;
        for (subject, (named, properties)) in subjects {
            let subject_id =
                tree.add_child(graph_id, StructuralNode::new(NodeKind::Subject).with_identifier(subject));
            tree.node_mut(subject_id).flags.exported = named;
            for (predicate, mut objects) in properties {
                objects.sort();
                objects.dedup();
                tree.add_child(
                    subject_id,
                    StructuralNode::new(NodeKind::Property)
                        .with_identifier(predicate)
                        .with_signature(objects.join(" , ")),
                );
            }
        }
    }
    tree
}

// ---------------------------------------------------------------------------
// JSON: Root -> Member / Element

pub fn json_tree(value: &Value) -> StructuralTree {
    let mut tree = StructuralTree::new(StructuralNode::new(NodeKind::Root));
    let root = tree.root();
    match value {
        Value::Object(_) | Value::Array(_) => add_json_children(&mut tree, root, value),
        scalar => tree.node_mut(root).signature = Some(scalar.to_string()),
    }
    tree
}

fn add_json_children(tree: &mut StructuralTree, parent: NodeId, value: &Value) {
    let entries: Vec<(NodeKind, String, &Value)> = match value {
        Value::Object(map) => map.iter().map(|(k, v)| (NodeKind::Member, k.clone(), v)).collect(),
        Value::Array(items) => {
            items.iter().enumerate().map(|(i, v)| (NodeKind::Element, i.to_string(), v)).collect()
        }
        _ => return,
    };
    for (kind, identifier, child) in entries {
        let mut node = StructuralNode::new(kind).with_identifier(identifier);
        node.signature = Some(match child {
            Value::Object(_) => "object".to_string(),
            Value::Array(_) => "array".to_string(),
            scalar => scalar.to_string(),
        });
        let id = tree.add_child(parent, node);
        add_json_children(tree, id, child);
    }
}

// ---------------------------------------------------------------------------
// Source items

/// Leading words that qualify a declaration without naming it.
const MODIFIER_WORDS: &[&str] = &[
    "export", "default", "pub", "public", "private", "protected", "static", "readonly", "abstract",
    "async", "declare", "unsafe", "extern", "override", "get", "set",
];

const TYPE_KINDS: &[NodeKind] = &[
    NodeKind::Interface,
    NodeKind::Class,
    NodeKind::Struct,
    NodeKind::Enum,
    NodeKind::TypeAlias,
];

pub fn source_tree(items: &[Item]) -> StructuralTree {
    let mut tree = StructuralTree::new(StructuralNode::new(NodeKind::Root));
    let root = tree.root();
    for item in items {
        add_item(&mut tree, root, NodeKind::Root, item);
    }
    link_references(&mut tree);
    tree
}

struct Header<'t> {
    attributes: Vec<String>,
    exported: bool,
    private: bool,
    has_pub: bool,
    rest: &'t [Token],
}

fn split_header(tokens: &[Token]) -> Header<'_> {
    let mut attributes = Vec::new();
    let decorators = decorator_len(tokens);
    if decorators > 0 {
        attributes.push(join_tokens(&tokens[..decorators]));
    }
    let mut header = Header { attributes, exported: false, private: false, has_pub: false, rest: &[] };

    let mut i = decorators;
    while let Some(token) = tokens.get(i) {
        if token.kind != TokenKind::Ident || !MODIFIER_WORDS.contains(&token.text.as_str()) {
            break;
        }
        let next = tokens.get(i + 1);
        if token.text == "pub" && next.is_some_and(|t| t.is_punct("(")) {
            let close = tokens[i..].iter().position(|t| t.is_punct(")")).map_or(tokens.len(), |p| i + p + 1);
            header.attributes.push(join_tokens(&tokens[i..close]));
            header.private = true;
            i = close;
            continue;
        }
        let qualifies = match next {
            Some(t) if t.kind == TokenKind::Ident => true,
            Some(t) if t.kind == TokenKind::Str => token.text == "extern",
            Some(t) => t.is_punct("*") && token.text == "async",
            None => false,
        };
        if !qualifies {
            break;
        }
        match token.text.as_str() {
            "export" => header.exported = true,
            "pub" => {
                header.exported = true;
                header.has_pub = true;
            }
            "private" | "protected" => header.private = true,
            _ => {}
        }
        header.attributes.push(token.text.clone());
        i += 1;
        if token.text == "extern" && next.is_some_and(|t| t.kind == TokenKind::Str) {
            if let Some(abi) = next {
                header.attributes.push(abi.text.clone());
            }
            i += 1;
        }
    }
    header.rest = &tokens[i..];
    header
}

fn render_items(items: &[Item]) -> String {
    let mut out = String::new();
    for item in items {
        out.push_str(&item.header_text());
        match &item.body {
            Some(children) => {
                out.push_str(" {");
                out.push_str(&render_items(children));
                out.push('}');
            }
            None => out.push(';'),
        }
    }
    out
}

fn ident_at(tokens: &[Token], index: usize) -> Option<String> {
    tokens
        .get(index)
        .filter(|t| matches!(t.kind, TokenKind::Ident | TokenKind::Str))
        .map(|t| t.text.clone())
}

/// Index of the first `=` outside any bracket group.
fn top_level_assign(tokens: &[Token]) -> Option<usize> {
    let mut depth = 0usize;
    for (i, token) in tokens.iter().enumerate() {
        if token.kind != TokenKind::Punct {
            continue;
        }
        match token.text.as_str() {
            "(" | "[" | "{" => depth += 1,
            ")" | "]" | "}" => depth = depth.saturating_sub(1),
            "=" if depth == 0 => return Some(i),
            _ => {}
        }
    }
    None
}

fn is_member_context(context: NodeKind) -> bool {
    matches!(
        context,
        NodeKind::Class | NodeKind::Interface | NodeKind::Struct | NodeKind::Impl | NodeKind::TypeAlias
    )
}

/// Rust containers whose members are private unless marked `pub`.
fn needs_pub(tree: &StructuralTree, parent: NodeId) -> bool {
    let node = tree.node(parent);
    match node.kind {
        NodeKind::Struct => true,
        NodeKind::Impl => !node.signature.as_deref().unwrap_or("").contains(" for "),
        _ => false,
    }
}

fn add_item(tree: &mut StructuralTree, parent: NodeId, context: NodeKind, item: &Item) {
    let header = split_header(&item.header);
    let rest = header.rest;
    let keyword = rest.first().filter(|t| t.kind == TokenKind::Ident).map(|t| t.text.as_str());
    let member_context = is_member_context(context);

    let mut node = match keyword {
        Some("import") => import_node(rest),
        Some("use") if rest.len() > 1 => use_node(rest),
        Some("function" | "fn") => {
            let kind = if member_context { NodeKind::Method } else { NodeKind::Function };
            let name_at = if rest.get(1).is_some_and(|t| t.is_punct("*")) { 2 } else { 1 };
            declaration(kind, ident_at(rest, name_at), rest)
        }
        Some("class") => declaration(NodeKind::Class, ident_at(rest, 1), rest),
        Some("interface" | "trait") => declaration(NodeKind::Interface, ident_at(rest, 1), rest),
        Some("struct") => declaration(NodeKind::Struct, ident_at(rest, 1), rest),
        Some("enum") => declaration(NodeKind::Enum, ident_at(rest, 1), rest),
        Some("type") if rest.get(1).is_some_and(|t| t.kind == TokenKind::Ident) => {
            declaration(NodeKind::TypeAlias, ident_at(rest, 1), rest)
        }
        Some("impl") => impl_node(rest),
        Some("mod" | "namespace" | "module") if rest.len() > 1 => {
            declaration(NodeKind::Module, ident_at(rest, 1), rest)
        }
        Some("const" | "let" | "var" | "static") if rest.len() > 1 => variable_node(rest),
        _ if context == NodeKind::Enum => {
            let mut node = StructuralNode::new(NodeKind::Variant);
            node.identifier = ident_at(rest, 0);
            split_initializer(&mut node, rest, 1);
            node
        }
        _ if member_context && ident_at(rest, 0).is_some() => member_node(rest),
        _ if ident_at(rest, 0).is_some() && rest.get(1).is_some_and(|t| t.is_punct(":")) => {
            let mut node = StructuralNode::new(NodeKind::Variable);
            node.identifier = ident_at(rest, 0);
            split_initializer(&mut node, rest, 1);
            node
        }
        _ => statement_node(rest),
    };

    node.attributes = header.attributes;
    node.flags.private = header.private;
    if context == NodeKind::Root || context == NodeKind::Module {
        node.flags.exported = header.exported;
    } else {
        if needs_pub(tree, parent) && !header.has_pub {
            node.flags.private = true;
        }
        node.flags.exported = !node.flags.private;
    }

    let kind = node.kind;
    match &item.body {
        Some(children) if kind.is_container() => {
            let id = tree.add_child(parent, node);
            let child_context = if kind == NodeKind::Module { NodeKind::Module } else { kind };
            for child in children {
                add_item(tree, id, child_context, child);
            }
        }
        Some(children) => {
            let rendered = render_items(children);
            node.body = Some(match node.body.take() {
                Some(initializer) => digest(&format!("{initializer}{{{rendered}}}")),
                None => digest(&rendered),
            });
            tree.add_child(parent, node);
        }
        None => {
            if let Some(initializer) = node.body.take() {
                node.body = Some(digest(&initializer));
            }
            tree.add_child(parent, node);
        }
    }
}

fn declaration(kind: NodeKind, identifier: Option<String>, rest: &[Token]) -> StructuralNode {
    let mut node = StructuralNode::new(kind).with_signature(join_tokens(rest));
    node.identifier = identifier;
    node
}

fn import_node(rest: &[Token]) -> StructuralNode {
    let mut node = StructuralNode::new(NodeKind::Import);
    if let Some(module) = rest.get(1).filter(|t| t.kind == TokenKind::Str) {
        node.identifier = Some(module.text.clone());
        node.flags.side_effect = true;
        return node;
    }
    let from = rest
        .iter()
        .position(|t| t.is_ident("from"))
        .filter(|&i| rest.get(i + 1).is_some_and(|t| t.kind == TokenKind::Str));
    match from {
        Some(i) => {
            node.identifier = Some(rest[i + 1].text.clone());
            node.signature = Some(join_tokens(&rest[1..i]));
        }
        None => node.identifier = Some(join_tokens(&rest[1..])),
    }
    node
}

/// `use a::b::c` is keyed by `a::b`; the imported clause is the signature.
fn use_node(rest: &[Token]) -> StructuralNode {
    let mut node = StructuralNode::new(NodeKind::Import);
    let path = &rest[1..];
    match path.iter().rposition(|t| t.is_punct("::")) {
        Some(split) => {
            node.identifier = Some(path[..split].iter().map(|t| t.text.as_str()).collect());
            node.signature = Some(join_tokens(&path[split + 1..]));
        }
        None => node.identifier = Some(join_tokens(path)),
    }
    node
}

fn impl_node(rest: &[Token]) -> StructuralNode {
    // Skip `impl<...>` generics.
    let mut start = 1;
    if rest.get(1).is_some_and(|t| t.is_punct("<")) {
        let mut depth = 0usize;
        for (i, token) in rest.iter().enumerate().skip(1) {
            if token.is_punct("<") {
                depth += 1;
            } else if token.is_punct(">") {
                depth = depth.saturating_sub(1);
                if depth == 0 {
                    start = i + 1;
                    break;
                }
            }
        }
    }
    let target = &rest[start.min(rest.len())..];
    let mut node = StructuralNode::new(NodeKind::Impl).with_signature(join_tokens(rest));
    node.identifier = Some(join_tokens(target)).filter(|s| !s.is_empty());
    node
}

fn variable_node(rest: &[Token]) -> StructuralNode {
    let is_arrow = rest.iter().any(|t| t.is_punct("=>"));
    if is_arrow {
        return declaration(NodeKind::Function, ident_at(rest, 1), rest);
    }
    let mut node = StructuralNode::new(NodeKind::Variable);
    node.identifier = ident_at(rest, 1);
    split_initializer(&mut node, rest, 0);
    node
}

fn member_node(rest: &[Token]) -> StructuralNode {
    let kind = match rest.get(1) {
        Some(t) if t.is_punct("(") || t.is_punct("<") => NodeKind::Method,
        Some(t) if t.is_punct("?") && rest.get(2).is_some_and(|n| n.is_punct("(")) => NodeKind::Method,
        _ => NodeKind::Field,
    };
    if kind == NodeKind::Method {
        let mut node = declaration(kind, ident_at(rest, 0), rest);
        node.flags.optional = rest.get(1).is_some_and(|t| t.is_punct("?"));
        return node;
    }
    let mut node = StructuralNode::new(NodeKind::Field);
    node.identifier = ident_at(rest, 0);
    node.flags.optional = rest.get(1).is_some_and(|t| t.is_punct("?"));
    split_initializer(&mut node, rest, 1);
    node
}

fn statement_node(rest: &[Token]) -> StructuralNode {
    StructuralNode::new(NodeKind::Statement).with_signature(join_tokens(rest))
}

/// Signature is everything before a top-level `=`; the initializer text is
/// kept in `body` until it is digested.
fn split_initializer(node: &mut StructuralNode, rest: &[Token], signature_from: usize) {
    let from = signature_from.min(rest.len());
    match top_level_assign(rest) {
        Some(eq) => {
            let initializer = &rest[eq + 1..];
            node.signature = Some(join_tokens(&rest[from..eq.max(from)]));
            node.body = Some(join_tokens(initializer));
            node.flags.has_initializer = true;
            node.flags.initialized_by_call =
                initializer.iter().any(|t| t.is_punct("(") || t.is_ident("new"));
        }
        None => node.signature = Some(join_tokens(&rest[from..])),
    }
}

/// Link declarations to the named types their signatures mention.
fn link_references(tree: &mut StructuralTree) {
    let mut types: HashMap<String, NodeId> = HashMap::new();
    let mut impls: Vec<NodeId> = Vec::new();
    for id in tree.ids() {
        let node = tree.node(id);
        if TYPE_KINDS.contains(&node.kind) {
            if let Some(name) = &node.identifier {
                types.entry(name.clone()).or_insert(id);
            }
        } else if node.kind == NodeKind::Impl {
            impls.push(id);
        }
    }
    if types.is_empty() {
        return;
    }

    let mut edges: Vec<(NodeId, NodeId)> = Vec::new();
    for id in tree.ids() {
        let node = tree.node(id);
        let Some(signature) = &node.signature else {
            continue;
        };
        for word in signature.split(|c: char| !(c.is_alphanumeric() || c == '_' || c == '$')) {
            if let Some(&target) = types.get(word) {
                if node.identifier.as_deref() != Some(word) {
                    edges.push((id, target));
                }
            }
        }
    }
    // A type's inherent and trait impls are part of its surface.
    for impl_id in impls {
        let target = tree
            .node(impl_id)
            .identifier
            .as_deref()
            .and_then(|name| name.rsplit(" for ").next())
            .and_then(|name| name.split_whitespace().next())
            .and_then(|name| types.get(name).copied());
        if let Some(target) = target {
            edges.push((target, impl_id));
            edges.push((impl_id, target));
        }
    }
    for (from, to) in edges {
        tree.add_reference(from, to);
    }
}
