//! Decision tree geometry for the worldline space.
//!
//! The tree is built from the same [`Enumeration`] as the candidate generator, so leaf
//! `i` is candidate `i`. It never looks at simulation output; scores are overlaid
//! afterwards by candidate index.

use serde::Serialize;

use super::enumeration::Enumeration;
use super::error::PlanError;
use super::generator::{Partition, enumerate_partition, partition};
use super::types::{Branch, WorldlineCandidate};

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LayoutConfig {
    /// Horizontal distance between depths.
    pub level_spacing: f64,
    /// Vertical distance between neighbouring leaves.
    pub leaf_spacing: f64,
}

impl Default for LayoutConfig {
    fn default() -> Self {
        Self {
            level_spacing: 160.0,
            leaf_spacing: 48.0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum NodeKind {
    #[serde(rename_all = "camelCase")]
    Decision { branch_id: String, label: String },
    Leaf {
        candidate: usize,
        score: Option<u32>,
    },
    /// Stand-in for every leaf past the worldline cap.
    Clipped { count: u64 },
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Choice {
    Exclude,
    Include,
    Clipped,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TreeNode {
    pub depth: usize,
    pub x: f64,
    pub y: f64,
    #[serde(flatten)]
    pub kind: NodeKind,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TreeEdge {
    pub from: usize,
    pub to: usize,
    pub choice: Choice,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TreeLayout {
    pub nodes: Vec<TreeNode>,
    pub edges: Vec<TreeEdge>,
    pub clipped_count: u64,
    pub width: f64,
    pub height: f64,
}

impl TreeLayout {
    /// Leaf nodes in candidate order, excluding the clipped placeholder.
    pub fn leaves(&self) -> impl Iterator<Item = &TreeNode> {
        self.nodes
            .iter()
            .filter(|n| matches!(n.kind, NodeKind::Leaf { .. }))
    }

    /// Copies each candidate's score onto the leaf with the same index.
    pub fn overlay_scores(&mut self, candidates: &[WorldlineCandidate]) {
        for node in &mut self.nodes {
            if let NodeKind::Leaf { candidate, score } = &mut node.kind {
                *score = candidates.get(*candidate).and_then(|c| c.score);
            }
        }
    }
}

struct Builder<'a> {
    partition: &'a Partition,
    config: LayoutConfig,
    nodes: Vec<TreeNode>,
    edges: Vec<TreeEdge>,
    children: Vec<Vec<usize>>,
    next_slot: usize,
    next_candidate: usize,
    /// First decision node, in visit order, with an unmaterialized child.
    clip_parent: Option<usize>,
}

/// Lays out the decision tree for `selected` with the shared enumeration order and cap.
pub fn layout_tree(selected: &[Branch], config: LayoutConfig) -> Result<TreeLayout, PlanError> {
    let partition = partition(selected)?;
    let enumeration = enumerate_partition(&partition)?;

    let mut builder = Builder {
        partition: &partition,
        config,
        nodes: Vec::new(),
        edges: Vec::new(),
        children: Vec::new(),
        next_slot: 0,
        next_candidate: 0,
        clip_parent: None,
    };
    builder.build(0, &enumeration.masks, enumeration.decisions);

    if enumeration.is_clipped() {
        let parent = builder.clip_parent.unwrap_or(0);
        let node = builder.push_leaf(
            enumeration.decisions,
            NodeKind::Clipped {
                count: enumeration.clipped,
            },
        );
        builder.link(parent, node, Choice::Clipped);
    }

    Ok(builder.finish(enumeration.clipped))
}

impl Builder<'_> {
    fn build(&mut self, depth: usize, leaves: &[u64], decisions: usize) -> usize {
        if depth == decisions {
            let candidate = self.next_candidate;
            self.next_candidate += 1;
            return self.push_leaf(
                depth,
                NodeKind::Leaf {
                    candidate,
                    score: None,
                },
            );
        }

        let branch = &self.partition.uncertain[depth];
        let kind = NodeKind::Decision {
            branch_id: branch.id.clone(),
            label: branch.label.clone(),
        };
        let node = self.push_node(depth, 0.0, kind);

        // Leaves arrive in visit order, so the excluded side is a prefix.
        let split = leaves
            .iter()
            .position(|m| Enumeration::includes(*m, depth))
            .unwrap_or(leaves.len());
        let (excluded, included) = leaves.split_at(split);

        for (group, choice) in [(excluded, Choice::Exclude), (included, Choice::Include)] {
            if group.is_empty() {
                if self.clip_parent.is_none() {
                    self.clip_parent = Some(node);
                }
                continue;
            }
            let child = self.build(depth + 1, group, decisions);
            self.link(node, child, choice);
        }
        node
    }

    fn push_leaf(&mut self, depth: usize, kind: NodeKind) -> usize {
        let y = self.next_slot as f64 * self.config.leaf_spacing;
        self.next_slot += 1;
        self.push_node(depth, y, kind)
    }

    fn push_node(&mut self, depth: usize, y: f64, kind: NodeKind) -> usize {
        self.nodes.push(TreeNode {
            depth,
            x: depth as f64 * self.config.level_spacing,
            y,
            kind,
        });
        self.children.push(Vec::new());
        self.nodes.len() - 1
    }

    fn link(&mut self, from: usize, to: usize, choice: Choice) {
        self.children[from].push(to);
        self.edges.push(TreeEdge { from, to, choice });
    }

    fn finish(mut self, clipped_count: u64) -> TreeLayout {
        // Children always come after their parent, so a reverse sweep sees them first.
        let mut extents = self.nodes.iter().map(|n| (n.y, n.y)).collect::<Vec<_>>();
        for idx in (0..self.nodes.len()).rev() {
            let kids = &self.children[idx];
            if kids.is_empty() {
                continue;
            }
            let top = kids.iter().map(|k| extents[*k].0).fold(f64::INFINITY, f64::min);
            let bottom = kids
                .iter()
                .map(|k| extents[*k].1)
                .fold(f64::NEG_INFINITY, f64::max);
            extents[idx] = (top, bottom);
            self.nodes[idx].y = (top + bottom) / 2.0;
        }

        let width = self.nodes.iter().map(|n| n.x).fold(0.0, f64::max);
        let height = self.nodes.iter().map(|n| n.y).fold(0.0, f64::max);
        TreeLayout {
            nodes: self.nodes,
            edges: self.edges,
            clipped_count,
            width,
            height,
        }
    }
}
