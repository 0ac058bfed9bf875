//! The arborescence result type.

use rustc_hash::FxHashMap;

use crate::graph::NodeId;

/// A spanning structure with one designated root where every other covered
/// node has exactly one incoming edge and no cycles exist.
#[derive(Clone, Debug)]
pub struct Arborescence {
    root: NodeId,
    parents: FxHashMap<NodeId, NodeId>,
    weight: f64,
}

impl Arborescence {
    pub(crate) fn new(root: NodeId, parents: FxHashMap<NodeId, NodeId>, weight: f64) -> Self {
        Self {
            root,
            parents,
            weight,
        }
    }

    /// The root node.
    pub fn root(&self) -> &NodeId {
        &self.root
    }

    /// The selected parent of `node`, absent for the root.
    pub fn parent_of(&self, node: &NodeId) -> Option<&NodeId> {
        self.parents.get(node)
    }

    /// The child-to-parent map over all non-root covered nodes.
    pub fn parents(&self) -> &FxHashMap<NodeId, NodeId> {
        &self.parents
    }

    /// Sum of the selected edges' weights.
    pub fn weight(&self) -> f64 {
        self.weight
    }

    /// True when `node` is covered by this arborescence.
    pub fn contains(&self, node: &NodeId) -> bool {
        node == &self.root || self.parents.contains_key(node)
    }
}
