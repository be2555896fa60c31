//! Canonical blank-node labeling.
//!
//! Each blank node starts from a first-degree hash of the quads it appears in
//! (itself as `_:a`, every other blank node as `_:z`). Hashes are then refined
//! by folding in the neighbours' hashes until the partition into hash classes
//! stops getting finer. Nodes still sharing a hash are separated by
//! individualization: every member of the smallest tied class is given a
//! distinct hash in turn, the partition is refined again, and the member whose
//! result serializes to the lexicographically smallest blank-node quad list
//! wins. Final labels `_:c14nN` follow ascending hash order.

use std::collections::{BTreeMap, HashMap, HashSet};

use sha2::digest::Output;
use sha2::{Digest, Sha256};

use crate::budget::{Deadline, TimedOut};
use crate::canon::graph::term::Quad;

type NodeHash = Output<Sha256>;

struct BlankGraph<'q> {
    quads: &'q [Quad],
    labels: Vec<&'q str>,
    index: HashMap<&'q str, usize>,
    /// Quads each blank node appears in.
    adjacency: Vec<Vec<usize>>,
    /// Quads mentioning at least one blank node.
    blank_quads: Vec<usize>,
}

impl<'q> BlankGraph<'q> {
    fn new(quads: &'q [Quad]) -> Self {
        let mut labels = Vec::new();
        let mut index: HashMap<&str, usize> = HashMap::new();
        let mut adjacency: Vec<Vec<usize>> = Vec::new();
        let mut blank_quads = Vec::new();

        for (qi, quad) in quads.iter().enumerate() {
            let mut seen_here: HashSet<usize> = HashSet::new();
            for label in quad.terms().filter_map(|t| t.blank_label()) {
                let idx = *index.entry(label).or_insert_with(|| {
                    labels.push(label);
                    adjacency.push(Vec::new());
                    labels.len() - 1
                });
                if seen_here.insert(idx) {
                    adjacency[idx].push(qi);
                }
            }
            if !seen_here.is_empty() {
                blank_quads.push(qi);
            }
        }
        Self { quads, labels, index, adjacency, blank_quads }
    }

    fn len(&self) -> usize {
        self.labels.len()
    }

    fn first_degree(&self) -> Vec<NodeHash> {
        (0..self.len())
            .map(|node| {
                let me = self.labels[node];
                let mut lines: Vec<String> = self.adjacency[node]
                    .iter()
                    .map(|&qi| {
                        self.quads[qi].to_nquads_with(|l| if l == me { "a".into() } else { "z".into() })
                    })
                    .collect();
                lines.sort();
                digest_lines(None, &lines)
            })
            .collect()
    }

    /// Refine until the number of distinct hashes stops growing.
    fn refine(&self, mut hashes: Vec<NodeHash>, deadline: &Deadline) -> Result<Vec<NodeHash>, TimedOut> {
        let mut classes = distinct(&hashes);
        loop {
            deadline.check()?;
            let names: Vec<String> = hashes.iter().map(|h| format!("{h:x}")).collect();
            let next: Vec<NodeHash> = (0..self.len())
                .map(|node| {
                    let mut lines: Vec<String> = self.adjacency[node]
                        .iter()
                        .map(|&qi| {
                            self.quads[qi].to_nquads_with(|l| {
                                let idx = self.index[l];
                                if idx == node {
                                    "a".into()
                                } else {
                                    names[idx].clone()
                                }
                            })
                        })
                        .collect();
                    lines.sort();
                    digest_lines(Some(&hashes[node]), &lines)
                })
                .collect();
            let next_classes = distinct(&next);
            hashes = next;
            if next_classes <= classes {
                return Ok(hashes);
            }
            classes = next_classes;
        }
    }

    /// Sorted serialization of every blank-node quad under the given hashes.
    fn blank_key(&self, hashes: &[NodeHash]) -> String {
        let names: Vec<String> = hashes.iter().map(|h| format!("{h:x}")).collect();
        let mut lines: Vec<String> = self
            .blank_quads
            .iter()
            .map(|&qi| self.quads[qi].to_nquads_with(|l| names[self.index[l]].clone()))
            .collect();
        lines.sort();
        lines.join("\n")
    }

    fn label(&self, deadline: &Deadline) -> Result<HashMap<&'q str, String>, TimedOut> {
        let mut hashes = self.refine(self.first_degree(), deadline)?;

        loop {
            let mut classes: BTreeMap<NodeHash, Vec<usize>> = BTreeMap::new();
            for (node, hash) in hashes.iter().enumerate() {
                classes.entry(*hash).or_default().push(node);
            }
            let Some(tied) = classes.into_values().find(|members| members.len() > 1) else {
                break;
            };

            // All members, so the choice never depends on input label order.
            let mut best: Option<(String, Vec<NodeHash>)> = None;
            for &candidate in &tied {
                deadline.check()?;
                let mut trial = hashes.clone();
                trial[candidate] = individualize(&trial[candidate]);
                let trial = self.refine(trial, deadline)?;
                let key = self.blank_key(&trial);
                if best.as_ref().map_or(true, |(best_key, _)| key < *best_key) {
                    best = Some((key, trial));
                }
            }
            match best {
                Some((_, chosen)) => hashes = chosen,
                None => break,
            }
        }

        let mut order: Vec<usize> = (0..self.len()).collect();
        order.sort_by(|a, b| hashes[*a].cmp(&hashes[*b]));
        Ok(order
            .into_iter()
            .enumerate()
            .map(|(rank, node)| (self.labels[node], format!("c14n{rank}")))
            .collect())
    }
}

/// Serialize `quads` as sorted, deduplicated canonical N-Quads text.
pub fn canonical_nquads(quads: &[Quad], deadline: &Deadline) -> Result<String, TimedOut> {
    let graph = BlankGraph::new(quads);
    let labels = graph.label(deadline)?;

    let mut lines: Vec<String> = quads
        .iter()
        .map(|quad| {
            quad.to_nquads_with(|l| labels.get(l).cloned().unwrap_or_else(|| l.to_string()))
        })
        .collect();
    lines.sort();
    lines.dedup();

    let mut out = String::with_capacity(lines.iter().map(|l| l.len() + 1).sum());
    for line in lines {
        out.push_str(&line);
        out.push('\n');
    }
    Ok(out)
}

fn digest_lines(seed: Option<&NodeHash>, lines: &[String]) -> NodeHash {
    let mut hasher = Sha256::new();
    if let Some(seed) = seed {
        hasher.update(seed);
    }
    for line in lines {
        hasher.update(line.as_bytes());
        hasher.update(b"\n");
    }
    hasher.finalize()
}

fn individualize(hash: &NodeHash) -> NodeHash {
    let mut hasher = Sha256::new();
    hasher.update(hash);
    hasher.update(b"individualized");
    hasher.finalize()
}

fn distinct(hashes: &[NodeHash]) -> usize {
    hashes.iter().collect::<HashSet<_>>().len()
}
