#![forbid(unsafe_code)]

//! The weighted variable graph the arborescence solver runs on.
//!
//! Nodes are query variables plus synthetic middle nodes standing in for
//! edge-like fragments. Routing through a middle node is what forces the
//! solver to select that specific edge direction, so the middle node's
//! identity must be shared by both directions of the same logical edge:
//! its id is built from the *unordered* variable pair plus the edge kind.

use std::fmt;

use rustc_hash::FxHashMap;

use crate::types::Var;

/// The kind of physical edge a synthetic middle node stands in for.
#[derive(Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash, Debug)]
pub enum MiddleKind {
    /// Type membership.
    Isa,
    /// Subtyping.
    Sub,
    /// Role playing.
    RolePlayer,
    /// Attribute ownership.
    Has,
}

impl fmt::Display for MiddleKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            MiddleKind::Isa => "isa",
            MiddleKind::Sub => "sub",
            MiddleKind::RolePlayer => "role-player",
            MiddleKind::Has => "has",
        };
        write!(f, "{name}")
    }
}

/// Identity of a node in the variable graph: either a real query variable
/// or a synthetic middle node for an edge-like fragment.
///
/// The middle id carries the owning fragment set's index as a tag: the two
/// opposite-direction fragments of one constraint share a middle node, while
/// two distinct constraints over the same variable pair (say, the same
/// relation and player in two different roles) keep separate edges.
#[derive(Clone, Eq, PartialEq, Ord, PartialOrd, Hash, Debug)]
pub enum NodeId {
    /// A query variable.
    Var(Var),
    /// The synthetic node for the edge between two variables.
    Middle {
        /// The edge kind.
        kind: MiddleKind,
        /// Lexicographically smaller endpoint.
        low: Var,
        /// Lexicographically larger endpoint.
        high: Var,
        /// The owning fragment set.
        tag: usize,
    },
}

impl NodeId {
    /// The node for a query variable.
    pub fn var(v: impl Into<Var>) -> Self {
        NodeId::Var(v.into())
    }

    /// The shared middle node for the edge of `kind` between `a` and `b`
    /// contributed by fragment set `tag`, direction-agnostic.
    pub fn middle(kind: MiddleKind, a: &Var, b: &Var, tag: usize) -> Self {
        if a <= b {
            NodeId::Middle {
                kind,
                low: a.clone(),
                high: b.clone(),
                tag,
            }
        } else {
            NodeId::Middle {
                kind,
                low: b.clone(),
                high: a.clone(),
                tag,
            }
        }
    }

    /// True for synthetic middle nodes.
    pub fn is_middle(&self) -> bool {
        matches!(self, NodeId::Middle { .. })
    }

    /// A variable to name in diagnostics about this node.
    pub fn diagnostic_var(&self) -> &Var {
        match self {
            NodeId::Var(v) => v,
            NodeId::Middle { low, .. } => low,
        }
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NodeId::Var(v) => write!(f, "{v}"),
            NodeId::Middle {
                kind, low, high, ..
            } => write!(f, "[{kind}:{low}~{high}]"),
        }
    }
}

/// A directed edge between two graph nodes.
#[derive(Clone, Eq, PartialEq, Hash, Debug)]
pub struct DirectedEdge {
    /// Source node.
    pub from: NodeId,
    /// Destination node.
    pub to: NodeId,
}

impl DirectedEdge {
    /// Creates an edge from `from` to `to`.
    pub fn new(from: NodeId, to: NodeId) -> Self {
        Self { from, to }
    }
}

impl fmt::Display for DirectedEdge {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} -> {}", self.from, self.to)
    }
}

/// A value paired with a weight.
#[derive(Clone, Debug)]
pub struct Weighted<T> {
    /// The wrapped value.
    pub item: T,
    /// The weight.
    pub weight: f64,
}

/// Convenience constructor mirroring the call-site reading `weighted(e, w)`.
pub fn weighted<T>(item: T, weight: f64) -> Weighted<T> {
    Weighted { item, weight }
}

/// An edge-list weighted digraph with deterministic node numbering.
///
/// Nodes are numbered by first appearance in the edge list, which is what
/// makes tie-breaking in the solver reproducible across runs.
#[derive(Clone, Debug, Default)]
pub struct SparseWeightedGraph {
    nodes: Vec<NodeId>,
    index: FxHashMap<NodeId, usize>,
    edges: Vec<Weighted<DirectedEdge>>,
}

impl SparseWeightedGraph {
    /// Builds a graph from a weighted edge list, preserving insertion order.
    pub fn from_edges(edges: Vec<Weighted<DirectedEdge>>) -> Self {
        let mut graph = SparseWeightedGraph::default();
        for edge in &edges {
            graph.intern(edge.item.from.clone());
            graph.intern(edge.item.to.clone());
        }
        graph.edges = edges;
        graph
    }

    fn intern(&mut self, node: NodeId) -> usize {
        if let Some(&idx) = self.index.get(&node) {
            return idx;
        }
        let idx = self.nodes.len();
        self.index.insert(node.clone(), idx);
        self.nodes.push(node);
        idx
    }

    /// All nodes, in first-appearance order.
    pub fn nodes(&self) -> &[NodeId] {
        &self.nodes
    }

    /// All edges, in insertion order.
    pub fn edges(&self) -> &[Weighted<DirectedEdge>] {
        &self.edges
    }

    /// Number of nodes.
    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    /// True when the graph has no edges.
    pub fn is_empty(&self) -> bool {
        self.edges.is_empty()
    }

    /// Dense index of `node`, when present.
    pub fn index_of(&self, node: &NodeId) -> Option<usize> {
        self.index.get(node).copied()
    }
}
