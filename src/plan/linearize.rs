//! Greedy linearization of one planned component.
//!
//! The arborescence fixes which fragment binds each variable; this pass
//! fixes *when*. Expansion starts at the root and always descends into the
//! reachable subtree with the smallest accumulated branch weight, emitting
//! each synthetic middle node's fragment on arrival and a variable node's
//! own fragments once their dependencies are bound. Whatever the tree walk
//! cannot place (a check whose dependency binds later, a node-only
//! component) is picked up by a dependency-respecting sweep.

use rustc_hash::{FxHashMap, FxHashSet};
use tracing::trace;

use crate::error::{PlanError, Result};
use crate::fragment::{Fragment, FragmentId, FragmentKind};
use crate::graph::NodeId;
use crate::spanning::Arborescence;
use crate::types::Var;

/// Maps each synthetic middle node and chosen parent to the fragment that
/// edge direction stands for.
pub(crate) type MiddleFragmentMap = FxHashMap<NodeId, FxHashMap<NodeId, FragmentId>>;

pub(crate) fn linearize_component(
    fragments: &[Fragment],
    component: &[FragmentId],
    arborescence: Option<&Arborescence>,
    middle_map: &MiddleFragmentMap,
    node_order: &[NodeId],
    emitted_sets: &mut FxHashSet<usize>,
    bound: &mut FxHashSet<Var>,
) -> Result<Vec<FragmentId>> {
    let mut out = Vec::new();

    // node-kind fragments grouped by their start variable, component order
    let mut node_fragments: FxHashMap<&Var, Vec<FragmentId>> = FxHashMap::default();
    for &fid in component {
        if !fragments[fid].is_edge() {
            node_fragments
                .entry(fragments[fid].start())
                .or_default()
                .push(fid);
        }
    }

    if let Some(arborescence) = arborescence {
        walk_tree(
            fragments,
            arborescence,
            middle_map,
            node_order,
            &node_fragments,
            emitted_sets,
            bound,
            &mut out,
        )?;
    }

    sweep(fragments, component, emitted_sets, bound, &mut out);
    trace!(emitted = out.len(), "plan.component.linearized");
    Ok(out)
}

/// True once every dependency of `fragment` is bound. Inequality checks
/// additionally need their own variable bound: they filter, never bind.
fn runnable(fragment: &Fragment, bound: &FxHashSet<Var>) -> bool {
    if !fragment.dependencies().iter().all(|dep| bound.contains(dep)) {
        return false;
    }
    match fragment.kind() {
        FragmentKind::Neq { .. } => bound.contains(fragment.start()),
        _ => true,
    }
}

#[allow(clippy::too_many_arguments)]
fn walk_tree(
    fragments: &[Fragment],
    arborescence: &Arborescence,
    middle_map: &MiddleFragmentMap,
    node_order: &[NodeId],
    node_fragments: &FxHashMap<&Var, Vec<FragmentId>>,
    emitted_sets: &mut FxHashSet<usize>,
    bound: &mut FxHashSet<Var>,
    out: &mut Vec<FragmentId>,
) -> Result<()> {
    // deterministic child lists, in graph node order
    let mut children: FxHashMap<&NodeId, Vec<&NodeId>> = FxHashMap::default();
    for node in node_order {
        if let Some(parent) = arborescence.parent_of(node) {
            children.entry(parent).or_default().push(node);
        }
    }

    let mut weights: FxHashMap<&NodeId, f64> = FxHashMap::default();
    branch_weight(
        arborescence.root(),
        arborescence,
        middle_map,
        &children,
        node_fragments,
        fragments,
        &mut weights,
    )?;

    let mut reachable: Vec<&NodeId> = vec![arborescence.root()];
    while !reachable.is_empty() {
        // smallest branch first; earliest-discovered wins ties
        let mut pick = 0;
        for idx in 1..reachable.len() {
            let candidate = weights.get(reachable[idx]).copied().unwrap_or(0.0);
            let current = weights.get(reachable[pick]).copied().unwrap_or(0.0);
            if candidate < current {
                pick = idx;
            }
        }
        let node = reachable.remove(pick);

        match node {
            NodeId::Middle { .. } => {
                let fid = selected_middle_fragment(node, arborescence, middle_map)?;
                let set = fragments[fid].set_index();
                if emitted_sets.insert(set) {
                    out.push(fid);
                }
            }
            NodeId::Var(var) => {
                bound.insert(var.clone());
                if let Some(fids) = node_fragments.get(var) {
                    let mut ready: Vec<FragmentId> = fids
                        .iter()
                        .copied()
                        .filter(|&fid| {
                            !emitted_sets.contains(&fragments[fid].set_index())
                                && runnable(&fragments[fid], bound)
                        })
                        .collect();
                    ready.sort_by(|&a, &b| {
                        fragments[a]
                            .cost()
                            .partial_cmp(&fragments[b].cost())
                            .unwrap_or(std::cmp::Ordering::Equal)
                    });
                    for fid in ready {
                        if emitted_sets.insert(fragments[fid].set_index()) {
                            out.push(fid);
                        }
                    }
                }
            }
        }

        if let Some(kids) = children.get(node) {
            reachable.extend(kids.iter().copied());
        }
    }
    Ok(())
}

/// The fragment selected by routing into `middle` from its chosen parent.
fn selected_middle_fragment(
    middle: &NodeId,
    arborescence: &Arborescence,
    middle_map: &MiddleFragmentMap,
) -> Result<FragmentId> {
    let parent = arborescence
        .parent_of(middle)
        .ok_or(PlanError::Internal("middle node without a parent"))?;
    middle_map
        .get(middle)
        .and_then(|by_parent| by_parent.get(parent))
        .copied()
        .ok_or(PlanError::Internal("middle node without a fragment"))
}

/// Accumulated cost of the subtree rooted at `node`: the edge fragment
/// reaching it, its own fragments (dependency-carrying ones discounted, as
/// they may run much later), and all children.
fn branch_weight<'a>(
    node: &'a NodeId,
    arborescence: &Arborescence,
    middle_map: &MiddleFragmentMap,
    children: &FxHashMap<&NodeId, Vec<&'a NodeId>>,
    node_fragments: &FxHashMap<&Var, Vec<FragmentId>>,
    fragments: &[Fragment],
    weights: &mut FxHashMap<&'a NodeId, f64>,
) -> Result<f64> {
    if let Some(&weight) = weights.get(node) {
        return Ok(weight);
    }
    let mut weight = match node {
        NodeId::Middle { .. } => {
            let fid = selected_middle_fragment(node, arborescence, middle_map)?;
            fragments[fid].cost()
        }
        NodeId::Var(var) => node_fragments
            .get(var)
            .map(|fids| {
                fids.iter()
                    .map(|&fid| {
                        let fragment = &fragments[fid];
                        if fragment.dependencies().is_empty() {
                            fragment.cost()
                        } else {
                            fragment.cost() / 2.0
                        }
                    })
                    .sum()
            })
            .unwrap_or(0.0),
    };
    if let Some(kids) = children.get(node) {
        for &child in kids {
            weight += branch_weight(
                child,
                arborescence,
                middle_map,
                children,
                node_fragments,
                fragments,
                weights,
            )?;
        }
    }
    weights.insert(node, weight);
    Ok(weight)
}

/// Emits every node fragment whose dependencies can still be satisfied.
/// Seeds node-only components, places checks whose dependencies were bound
/// after their variable's tree visit, and — run once more over the whole
/// conjunction — checks whose dependencies bind in a later component.
pub(crate) fn sweep(
    fragments: &[Fragment],
    component: &[FragmentId],
    emitted_sets: &mut FxHashSet<usize>,
    bound: &mut FxHashSet<Var>,
    out: &mut Vec<FragmentId>,
) {
    loop {
        let mut progressed = false;
        for &fid in component {
            let fragment = &fragments[fid];
            if fragment.is_edge() || emitted_sets.contains(&fragment.set_index()) {
                continue;
            }
            if runnable(fragment, bound) {
                emitted_sets.insert(fragment.set_index());
                bound.insert(fragment.start().clone());
                out.push(fid);
                progressed = true;
            }
        }
        if !progressed {
            break;
        }
    }
}
