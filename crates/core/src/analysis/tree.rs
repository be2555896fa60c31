//! Arena-backed structural trees.
//!
//! Nodes are addressed by [`NodeId`] indices into a single vector. Children
//! always form a tree; `references` are extra edges between declarations
//! (a function returning `User`, two interfaces naming each other) and may
//! form cycles.

use std::collections::{HashSet, VecDeque};

use serde::Serialize;

use crate::model::NodeKind;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub struct NodeId(usize);

impl NodeId {
    pub fn index(self) -> usize {
        self.0
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct NodeFlags {
    /// Declared with `export` / `pub`, or a public member.
    pub exported: bool,
    /// Hidden member (`private`, `protected`, or a Rust member without `pub`).
    pub private: bool,
    /// Optional field (`name?: T`).
    pub optional: bool,
    /// Import evaluated for its side effects only.
    pub side_effect: bool,
    pub has_initializer: bool,
    /// Initializer contains a call, so its position can matter.
    pub initialized_by_call: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StructuralNode {
    pub kind: NodeKind,
    pub identifier: Option<String>,
    pub signature: Option<String>,
    /// Digest of an opaque body (function bodies, initializers).
    pub body: Option<String>,
    /// Decorators and modifiers, in source order.
    pub attributes: Vec<String>,
    pub children: Vec<NodeId>,
    pub references: Vec<NodeId>,
    pub flags: NodeFlags,
}

impl StructuralNode {
    pub fn new(kind: NodeKind) -> Self {
        Self {
            kind,
            identifier: None,
            signature: None,
            body: None,
            attributes: Vec::new(),
            children: Vec::new(),
            references: Vec::new(),
            flags: NodeFlags::default(),
        }
    }

    pub fn with_identifier(mut self, identifier: impl Into<String>) -> Self {
        self.identifier = Some(identifier.into());
        self
    }

    pub fn with_signature(mut self, signature: impl Into<String>) -> Self {
        self.signature = Some(signature.into());
        self
    }

    /// Identifier, or the kind name for anonymous nodes.
    pub fn display_name(&self) -> &str {
        self.identifier.as_deref().unwrap_or(self.kind.as_str())
    }

    /// Same signature, body, attributes and flags.
    pub fn same_content(&self, other: &StructuralNode) -> bool {
        self.signature == other.signature
            && self.body == other.body
            && self.attributes == other.attributes
            && self.flags == other.flags
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StructuralTree {
    nodes: Vec<StructuralNode>,
    root: NodeId,
}

impl StructuralTree {
    pub fn new(root: StructuralNode) -> Self {
        Self { nodes: vec![root], root: NodeId(0) }
    }

    pub fn root(&self) -> NodeId {
        self.root
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn node(&self, id: NodeId) -> &StructuralNode {
        &self.nodes[id.0]
    }

    pub fn node_mut(&mut self, id: NodeId) -> &mut StructuralNode {
        &mut self.nodes[id.0]
    }

    pub fn children(&self, id: NodeId) -> &[NodeId] {
        &self.nodes[id.0].children
    }

    pub fn ids(&self) -> impl Iterator<Item = NodeId> {
        (0..self.nodes.len()).map(NodeId)
    }

    pub fn add_child(&mut self, parent: NodeId, node: StructuralNode) -> NodeId {
        let id = NodeId(self.nodes.len());
        self.nodes.push(node);
        self.nodes[parent.0].children.push(id);
        id
    }

    pub fn add_reference(&mut self, from: NodeId, to: NodeId) {
        if from != to && !self.nodes[from.0].references.contains(&to) {
            self.nodes[from.0].references.push(to);
        }
    }

    /// Nodes reachable from exported top-level declarations through
    /// references and non-private members.
    ///
    /// A module without any `export`/`pub` marker exposes every top-level
    /// declaration. Interfaces are contracts wherever they are declared, so
    /// they seed the walk too.
    pub fn public_surface(&self) -> HashSet<NodeId> {
        let top = self.children(self.root);
        let any_exported = top.iter().any(|id| self.node(*id).flags.exported);
        let mut queue: VecDeque<NodeId> = top
            .iter()
            .copied()
            .filter(|id| {
                let node = self.node(*id);
                if any_exported {
                    node.flags.exported
                } else {
                    node.kind.is_declaration()
                }
            })
            .collect();
        queue.extend(
            (0..self.nodes.len()).map(NodeId).filter(|id| self.node(*id).kind == NodeKind::Interface),
        );

        let mut visited = HashSet::new();

        while let Some(id) = queue.pop_front() {
            if !visited.insert(id) {
                continue;
            }
            let node = self.node(id);
            queue.extend(node.references.iter().copied());
            queue.extend(node.children.iter().copied().filter(|c| !self.node(*c).flags.private));
        }
        visited
    }

    /// Content fingerprint of every subtree, indexed by node.
    ///
    /// Children are always allocated after their parent, so a reverse sweep
    /// sees every child before its parent.
    pub fn fingerprints(&self) -> Vec<String> {
        let mut prints = vec![String::new(); self.nodes.len()];
        for index in (0..self.nodes.len()).rev() {
            let node = &self.nodes[index];
            let mut print = format!(
                "{}|{}|{}|{}|{:?}",
                node.kind,
                node.identifier.as_deref().unwrap_or(""),
                node.signature.as_deref().unwrap_or(""),
                node.body.as_deref().unwrap_or(""),
                node.attributes,
            );
            for child in &node.children {
                print.push('[');
                print.push_str(&prints[child.0]);
                print.push(']');
            }
            prints[index] = crate::hash::hash_bytes(print.as_bytes()).as_str()[..16].to_string();
        }
        prints
    }
}
