//! Structural diff between a baseline and a candidate tree.
//!
//! Siblings are matched by `(kind, identifier, occurrence)`; anonymous nodes
//! match by content fingerprint first and then pair up in order. Matched
//! pairs whose content differs are `Modified`, matched pairs that moved
//! relative to the longest run of stable positions are `Reordered`.

use std::collections::{HashMap, HashSet};

use crate::analysis::build::build_tree;
use crate::analysis::tree::{NodeId, StructuralNode, StructuralTree};
use crate::canon::graph::term::{RDFS_NS, RDF_NS};
use crate::canon::CanonError;
use crate::config::ReorderPolicy;
use crate::model::{CanonicalForm, ChangeKind, DiffEntry, NodeKind, Severity};

#[derive(Debug, Clone, Copy, Default)]
pub struct DiffAnalyzer {
    policy: ReorderPolicy,
}

impl DiffAnalyzer {
    pub fn new(policy: ReorderPolicy) -> Self {
        Self { policy }
    }

    pub fn policy(&self) -> ReorderPolicy {
        self.policy
    }

    /// Build trees for both forms and diff them.
    pub fn diff_forms(
        &self,
        baseline: &CanonicalForm,
        candidate: &CanonicalForm,
    ) -> Result<Vec<DiffEntry>, CanonError> {
        if baseline.family() != candidate.family() {
            return Ok(vec![DiffEntry::new(
                ChangeKind::Modified,
                NodeKind::Document,
                NodeKind::Document.as_str(),
                Severity::High,
                format!(
                    "format family changed from {} to {}",
                    baseline.family().as_str(),
                    candidate.family().as_str()
                ),
            )]);
        }
        let base = build_tree(baseline)?;
        let cand = build_tree(candidate)?;
        Ok(self.diff(&base, &cand))
    }

    pub fn diff(&self, baseline: &StructuralTree, candidate: &StructuralTree) -> Vec<DiffEntry> {
        let mut walk = Walk {
            base: baseline,
            cand: candidate,
            base_surface: baseline.public_surface(),
            cand_surface: candidate.public_surface(),
            base_prints: baseline.fingerprints(),
            cand_prints: candidate.fingerprints(),
            policy: self.policy,
            entries: Vec::new(),
        };
        walk.run();
        walk.entries
    }
}

/// `diff` with the default reorder policy.
pub fn diff(baseline: &StructuralTree, candidate: &StructuralTree) -> Vec<DiffEntry> {
    DiffAnalyzer::default().diff(baseline, candidate)
}

struct Walk<'a> {
    base: &'a StructuralTree,
    cand: &'a StructuralTree,
    base_surface: HashSet<NodeId>,
    cand_surface: HashSet<NodeId>,
    base_prints: Vec<String>,
    cand_prints: Vec<String>,
    policy: ReorderPolicy,
    entries: Vec<DiffEntry>,
}

type MatchKey<'n> = (NodeKind, &'n str, usize);

impl<'a> Walk<'a> {
    fn run(&mut self) {
        let (base_root, cand_root) = (self.base.root(), self.cand.root());
        if self.base.node(base_root).signature != self.cand.node(cand_root).signature {
            self.entries.push(DiffEntry::new(
                ChangeKind::Modified,
                NodeKind::Document,
                NodeKind::Document.as_str(),
                Severity::Medium,
                "document value changed",
            ));
        }

        let mut stack: Vec<(NodeId, NodeId, String)> = vec![(base_root, cand_root, String::new())];
        while let Some((b, c, path)) = stack.pop() {
            let nested = self.compare_children(b, c, &path);
            // Reverse so siblings are reported in source order.
            stack.extend(nested.into_iter().rev());
        }
    }

    fn compare_children(&mut self, b: NodeId, c: NodeId, path: &str) -> Vec<(NodeId, NodeId, String)> {
        let (base, cand): (&'a StructuralTree, &'a StructuralTree) = (self.base, self.cand);
        let base_children = base.children(b);
        let cand_children = cand.children(c);
        let parent_is_root = b == base.root();

        let mut cand_by_key: HashMap<MatchKey<'a>, usize> = HashMap::new();
        let mut occurrences: HashMap<(NodeKind, &str), usize> = HashMap::new();
        let mut cand_anonymous: Vec<usize> = Vec::new();
        for (pos, &id) in cand_children.iter().enumerate() {
            let node = cand.node(id);
            match node.identifier.as_deref() {
                Some(name) => {
                    let n = occurrences.entry((node.kind, name)).or_default();
                    cand_by_key.insert((node.kind, name, *n), pos);
                    *n += 1;
                }
                None => cand_anonymous.push(pos),
            }
        }

        let mut pairs: Vec<(usize, usize)> = Vec::new();
        let mut cand_matched = vec![false; cand_children.len()];
        let mut base_unmatched: Vec<usize> = Vec::new();
        let mut base_anonymous: Vec<usize> = Vec::new();
        occurrences.clear();
        for (pos, &id) in base_children.iter().enumerate() {
            let node = base.node(id);
            match node.identifier.as_deref() {
                Some(name) => {
                    let n = occurrences.entry((node.kind, name)).or_default();
                    let key = (node.kind, name, *n);
                    *n += 1;
                    match cand_by_key.get(&key) {
                        Some(&cpos) => {
                            pairs.push((pos, cpos));
                            cand_matched[cpos] = true;
                        }
                        None => base_unmatched.push(pos),
                    }
                }
                None => base_anonymous.push(pos),
            }
        }

        // Anonymous nodes: identical content first, then pair leftovers in order.
        let mut leftovers: Vec<usize> = Vec::new();
        for bpos in base_anonymous {
            let print = &self.base_prints[base_children[bpos].index()];
            let found = cand_anonymous.iter().copied().find(|&cpos| {
                !cand_matched[cpos] && self.cand_prints[cand_children[cpos].index()] == *print
            });
            match found {
                Some(cpos) => {
                    pairs.push((bpos, cpos));
                    cand_matched[cpos] = true;
                }
                None => leftovers.push(bpos),
            }
        }
        let mut modified_anonymous: Vec<(usize, usize)> = Vec::new();
        for bpos in leftovers {
            let kind = base.node(base_children[bpos]).kind;
            let found = cand_anonymous
                .iter()
                .copied()
                .find(|&cpos| !cand_matched[cpos] && cand.node(cand_children[cpos]).kind == kind);
            match found {
                Some(cpos) => {
                    modified_anonymous.push((bpos, cpos));
                    cand_matched[cpos] = true;
                }
                None => base_unmatched.push(bpos),
            }
        }
        pairs.extend(modified_anonymous);
        pairs.sort_unstable();

        let mut nested = Vec::new();
        let mut unchanged: Vec<(usize, usize)> = Vec::new();
        for &(bpos, cpos) in &pairs {
            let (bid, cid) = (base_children[bpos], cand_children[cpos]);
            let (bn, cn) = (base.node(bid), cand.node(cid));
            if !bn.same_content(cn) {
                let severity = self.modified_severity(bid, cid);
                let description = describe_modification(bn, cn);
                self.push(ChangeKind::Modified, bn, path, severity, description);
            }
            if self.base_prints[bid.index()] == self.cand_prints[cid.index()] {
                unchanged.push((bpos, cpos));
            } else if !bn.children.is_empty() || !cn.children.is_empty() {
                nested.push((bid, cid, join_path(path, bn)));
            }
        }

        for &bpos in &base_unmatched {
            let bid = base_children[bpos];
            let node = base.node(bid);
            let severity = self.removed_severity(bid);
            let description = format!("{} `{}` removed", node.kind, node.display_name());
            self.push(ChangeKind::Removed, node, path, severity, description);
        }
        for (cpos, &cid) in cand_children.iter().enumerate() {
            if cand_matched[cpos] {
                continue;
            }
            let node = cand.node(cid);
            let severity = self.added_severity(c, cid, parent_is_root);
            let description = format!("{} `{}` added", node.kind, node.display_name());
            self.push(ChangeKind::Added, node, path, severity, description);
        }

        // Unchanged pairs outside the longest increasing run of candidate positions moved.
        let positions: Vec<usize> = unchanged.iter().map(|&(_, cpos)| cpos).collect();
        let stable = longest_increasing(&positions);
        for (i, &(bpos, cpos)) in unchanged.iter().enumerate() {
            if stable.contains(&i) {
                continue;
            }
            let node = cand.node(cand_children[cpos]);
            let severity = self.reorder_severity(node, parent_is_root);
            let description = format!(
                "{} `{}` moved from position {} to {}",
                node.kind,
                node.display_name(),
                bpos,
                cpos
            );
            self.push(ChangeKind::Reordered, node, path, severity, description);
        }

        nested
    }

    fn push(
        &mut self,
        kind: ChangeKind,
        node: &StructuralNode,
        path: &str,
        severity: Severity,
        description: String,
    ) {
        self.entries.push(
            DiffEntry::new(kind, node.kind, node.display_name(), severity, description).at(path),
        );
    }

    fn removed_severity(&self, id: NodeId) -> Severity {
        let node = self.base.node(id);
        let high = match node.kind {
            NodeKind::Subject => node.flags.exported,
            NodeKind::Property => is_ontology_property(node),
            NodeKind::Graph => true,
            NodeKind::Field => !node.flags.optional && !node.flags.private,
            NodeKind::Method => !node.flags.private,
            NodeKind::Member | NodeKind::Element => false,
            _ => node.flags.exported || self.base_surface.contains(&id),
        };
        if high {
            Severity::High
        } else {
            Severity::Medium
        }
    }

    fn modified_severity(&self, b: NodeId, c: NodeId) -> Severity {
        let (bn, cn) = (self.base.node(b), self.cand.node(c));
        if bn.kind == NodeKind::Import && is_wildcard_widening(bn, cn) {
            return Severity::Low;
        }
        if bn.kind == NodeKind::Property {
            return if is_ontology_property(bn) { Severity::High } else { Severity::Medium };
        }
        let public = self.base_surface.contains(&b) || self.cand_surface.contains(&c);
        let signature_changed = bn.signature != cn.signature || bn.flags.optional != cn.flags.optional;
        let visibility_narrowed = self.base_surface.contains(&b) && !self.cand_surface.contains(&c);
        if (public && signature_changed) || visibility_narrowed {
            Severity::High
        } else {
            Severity::Medium
        }
    }

    fn added_severity(&self, parent: NodeId, id: NodeId, parent_is_root: bool) -> Severity {
        let node = self.cand.node(id);
        let parent_public = self.cand_surface.contains(&parent);
        let medium = match node.kind {
            NodeKind::Field => {
                parent_public && !node.flags.optional && !node.flags.private && !node.flags.has_initializer
            }
            NodeKind::Variant => true,
            NodeKind::Statement => parent_is_root,
            _ => false,
        };
        if medium {
            Severity::Medium
        } else {
            Severity::Low
        }
    }

    fn reorder_severity(&self, node: &StructuralNode, parent_is_root: bool) -> Severity {
        let escalate = match self.policy {
            ReorderPolicy::Never => false,
            ReorderPolicy::Always => true,
            ReorderPolicy::EvaluationOrder => match node.kind {
                NodeKind::Import => node.flags.side_effect,
                NodeKind::Statement => parent_is_root,
                NodeKind::Field => node.flags.has_initializer,
                NodeKind::Variable => node.flags.initialized_by_call,
                _ => false,
            },
        };
        if escalate {
            Severity::Low
        } else {
            Severity::None
        }
    }
}

fn join_path(path: &str, node: &StructuralNode) -> String {
    if path.is_empty() {
        node.display_name().to_string()
    } else {
        format!("{path}.{}", node.display_name())
    }
}

fn describe_modification(bn: &StructuralNode, cn: &StructuralNode) -> String {
    let name = bn.display_name();
    if bn.signature != cn.signature {
        format!(
            "{} `{name}` signature changed: `{}` -> `{}`",
            bn.kind,
            bn.signature.as_deref().unwrap_or(""),
            cn.signature.as_deref().unwrap_or("")
        )
    } else if bn.attributes != cn.attributes || bn.flags != cn.flags {
        format!("{} `{name}` attributes changed", bn.kind)
    } else {
        format!("{} `{name}` body changed", bn.kind)
    }
}

fn is_ontology_property(node: &StructuralNode) -> bool {
    let Some(predicate) = node.identifier.as_deref() else {
        return false;
    };
    let iri = predicate.trim_start_matches('<').trim_end_matches('>');
    iri == format!("{RDF_NS}type") || iri.starts_with(RDFS_NS)
}

fn is_wildcard_widening(bn: &StructuralNode, cn: &StructuralNode) -> bool {
    let has_wildcard = |n: &StructuralNode| n.signature.as_deref().is_some_and(|s| s.contains('*'));
    !has_wildcard(bn) && has_wildcard(cn)
}

/// Indices (into `seq`) of one longest strictly increasing subsequence.
fn longest_increasing(seq: &[usize]) -> HashSet<usize> {
    // tails[k] = index of the smallest tail of an increasing run of length k + 1
    let mut tails: Vec<usize> = Vec::new();
    let mut prev: Vec<Option<usize>> = vec![None; seq.len()];
    for (i, &value) in seq.iter().enumerate() {
        let slot = tails.partition_point(|&t| seq[t] < value);
        if slot > 0 {
            prev[i] = Some(tails[slot - 1]);
        }
        if slot == tails.len() {
            tails.push(i);
        } else {
            tails[slot] = i;
        }
    }
    let mut members = HashSet::new();
    let mut cursor = tails.last().copied();
    while let Some(i) = cursor {
        members.insert(i);
        cursor = prev[i];
    }
    members
}
