//! Chu-Liu-Edmonds maximum arborescence with required and banned edges.
//!
//! The solver works on dense node indices in first-appearance order, which
//! fixes the tie-breaking rule: an incoming edge replaces the current best
//! only when strictly heavier, so the earliest-inserted edge wins ties and
//! plans stay reproducible across runs.

use rustc_hash::{FxHashMap, FxHashSet};
use tracing::trace;

use crate::error::{PlanError, Result};
use crate::graph::{DirectedEdge, NodeId, SparseWeightedGraph};
use crate::spanning::Arborescence;

/// An edge at one contraction level. `parent` points at the edge one level
/// up that this edge was derived from (at the outermost level it is the
/// edge's own index).
#[derive(Clone, Debug)]
struct Edge {
    from: usize,
    to: usize,
    weight: f64,
    parent: usize,
}

/// Computes the maximum-weight spanning arborescence of `graph` rooted at
/// `root`, honoring `required` edges (they always win selection at their
/// destination) and `banned` edges (removed from consideration entirely).
///
/// Fails with [`PlanError::ContradictoryEdgeConstraints`] when the required
/// and banned sets cannot be satisfied together, and with
/// [`PlanError::UnplannableQuery`] when some node cannot be reached from the
/// root at all.
pub fn max_arborescence(
    graph: &SparseWeightedGraph,
    root: &NodeId,
    required: &[DirectedEdge],
    banned: &[DirectedEdge],
) -> Result<Arborescence> {
    let root_idx = graph.index_of(root).ok_or_else(|| PlanError::UnplannableQuery {
        var: root.diagnostic_var().clone(),
    })?;

    let banned_pairs: FxHashSet<(usize, usize)> = banned
        .iter()
        .filter_map(|e| Some((graph.index_of(&e.from)?, graph.index_of(&e.to)?)))
        .collect();

    let mut required_pairs: Vec<(usize, usize)> = Vec::new();
    for edge in required {
        let (Some(from), Some(to)) = (graph.index_of(&edge.from), graph.index_of(&edge.to)) else {
            return Err(PlanError::ContradictoryEdgeConstraints {
                detail: format!("required edge {edge} references a node outside the graph"),
            });
        };
        if banned_pairs.contains(&(from, to)) {
            return Err(PlanError::ContradictoryEdgeConstraints {
                detail: format!("edge {edge} is both required and banned"),
            });
        }
        if to == root_idx {
            return Err(PlanError::ContradictoryEdgeConstraints {
                detail: format!("required edge {edge} targets the root"),
            });
        }
        if !required_pairs.contains(&(from, to)) {
            required_pairs.push((from, to));
        }
    }

    // two required edges into one node, or a cycle among required edges,
    // can never be part of any arborescence
    let mut required_parent: FxHashMap<usize, usize> = FxHashMap::default();
    for &(from, to) in &required_pairs {
        if required_parent.insert(to, from).is_some() {
            return Err(PlanError::ContradictoryEdgeConstraints {
                detail: format!("two required edges target {}", graph.nodes()[to]),
            });
        }
    }
    for &(_, start) in &required_pairs {
        let mut v = start;
        let mut steps = 0;
        while let Some(&parent) = required_parent.get(&v) {
            v = parent;
            steps += 1;
            if v == start || steps > required_pairs.len() {
                return Err(PlanError::ContradictoryEdgeConstraints {
                    detail: "required edges form a cycle".to_string(),
                });
            }
        }
    }

    // outermost edge list: banned edges, self loops, and edges into the
    // root are never candidates
    let mut edges: Vec<Edge> = Vec::with_capacity(graph.edges().len());
    for weighted_edge in graph.edges() {
        let (Some(from), Some(to)) = (
            graph.index_of(&weighted_edge.item.from),
            graph.index_of(&weighted_edge.item.to),
        ) else {
            continue;
        };
        if from == to || to == root_idx || banned_pairs.contains(&(from, to)) {
            continue;
        }
        let parent = edges.len();
        edges.push(Edge {
            from,
            to,
            weight: weighted_edge.weight,
            parent,
        });
    }

    let mut required_into: FxHashMap<usize, usize> = FxHashMap::default();
    for &(from, to) in &required_pairs {
        // force the heaviest instance when the pair occurs more than once
        let mut chosen: Option<usize> = None;
        for (idx, edge) in edges.iter().enumerate() {
            if edge.from == from && edge.to == to {
                match chosen {
                    None => chosen = Some(idx),
                    Some(cur) if edge.weight > edges[cur].weight => chosen = Some(idx),
                    _ => {}
                }
            }
        }
        let Some(idx) = chosen else {
            return Err(PlanError::ContradictoryEdgeConstraints {
                detail: format!(
                    "required edge {} -> {} is not present in the graph",
                    graph.nodes()[from],
                    graph.nodes()[to]
                ),
            });
        };
        required_into.insert(to, idx);
    }

    let n = graph.node_count();
    let reps: Vec<usize> = (0..n).collect();
    let forced: Vec<bool> = vec![false; n];
    let chosen = solve(n, &reps, &forced, &edges, root_idx, &required_into, graph)?;

    let mut parents = FxHashMap::default();
    let mut weight = 0.0;
    for (_, &edge_idx) in chosen.iter() {
        let edge = &edges[edge_idx];
        parents.insert(
            graph.nodes()[edge.to].clone(),
            graph.nodes()[edge.from].clone(),
        );
        weight += edge.weight;
    }
    trace!(root = %root, weight, nodes = n, "mst.solve.done");
    Ok(Arborescence::new(root.clone(), parents, weight))
}

/// One level of the contraction recursion. Returns the chosen incoming edge
/// (index into `edges`) for every non-root node at this level.
fn solve(
    n: usize,
    reps: &[usize],
    forced: &[bool],
    edges: &[Edge],
    root: usize,
    required_into: &FxHashMap<usize, usize>,
    graph: &SparseWeightedGraph,
) -> Result<FxHashMap<usize, usize>> {
    // best incoming edge per node; required edges win unconditionally,
    // otherwise strictly-heavier replaces so insertion order breaks ties
    let mut best: Vec<Option<usize>> = vec![None; n];
    for (&to, &edge_idx) in required_into {
        best[to] = Some(edge_idx);
    }
    for (idx, edge) in edges.iter().enumerate() {
        if edge.to == root || required_into.contains_key(&edge.to) {
            continue;
        }
        match best[edge.to] {
            None => best[edge.to] = Some(idx),
            Some(current) if edge.weight > edges[current].weight => best[edge.to] = Some(idx),
            _ => {}
        }
    }

    for v in 0..n {
        if v != root && best[v].is_none() {
            if forced[v] {
                return Err(PlanError::ContradictoryEdgeConstraints {
                    detail: "required edges form a cycle with no admissible break".to_string(),
                });
            }
            return Err(PlanError::UnplannableQuery {
                var: graph.nodes()[reps[v]].diagnostic_var().clone(),
            });
        }
    }

    // follow parent pointers to find a cycle among the selected edges
    let mut color = vec![0u8; n];
    color[root] = 2;
    let mut cycle: Option<Vec<usize>> = None;
    'outer: for start in 0..n {
        if color[start] != 0 {
            continue;
        }
        let mut path = Vec::new();
        let mut v = start;
        loop {
            if color[v] == 1 {
                let pos = path.iter().position(|&x| x == v).unwrap_or(0);
                let found = path[pos..].to_vec();
                for &p in &path {
                    color[p] = 2;
                }
                cycle = Some(found);
                break 'outer;
            }
            if color[v] == 2 {
                break;
            }
            color[v] = 1;
            path.push(v);
            match best[v] {
                Some(edge_idx) => v = edges[edge_idx].from,
                None => break,
            }
        }
        for &p in &path {
            color[p] = 2;
        }
    }

    let Some(cycle) = cycle else {
        let mut chosen = FxHashMap::default();
        for v in 0..n {
            if v != root {
                if let Some(edge_idx) = best[v] {
                    chosen.insert(v, edge_idx);
                }
            }
        }
        return Ok(chosen);
    };

    trace!(len = cycle.len(), "mst.contract");
    let cycle_set: FxHashSet<usize> = cycle.iter().copied().collect();
    let mut min_cycle_weight = f64::INFINITY;
    let mut chosen_in_cycle: FxHashMap<usize, usize> = FxHashMap::default();
    for &v in &cycle {
        let edge_idx = best[v].ok_or(PlanError::Internal("cycle node without best edge"))?;
        min_cycle_weight = min_cycle_weight.min(edges[edge_idx].weight);
        chosen_in_cycle.insert(v, edge_idx);
    }

    // renumber: non-cycle nodes keep their relative order, the contracted
    // super-node goes last
    let mut new_of_old: Vec<Option<usize>> = vec![None; n];
    let mut old_of_new: Vec<usize> = Vec::new();
    let mut reps_new: Vec<usize> = Vec::new();
    let mut forced_new: Vec<bool> = Vec::new();
    for v in 0..n {
        if !cycle_set.contains(&v) {
            new_of_old[v] = Some(old_of_new.len());
            old_of_new.push(v);
            reps_new.push(reps[v]);
            forced_new.push(forced[v]);
        }
    }
    let super_idx = old_of_new.len();
    reps_new.push(reps[cycle[0]]);
    forced_new.push(cycle.iter().all(|v| required_into.contains_key(v)));
    let n_new = super_idx + 1;

    let mut edges_new: Vec<Edge> = Vec::new();
    let mut entered_at: Vec<Option<usize>> = Vec::new();
    let mut new_edge_of_old: Vec<Option<usize>> = vec![None; edges.len()];
    for (idx, edge) in edges.iter().enumerate() {
        let from_in = cycle_set.contains(&edge.from);
        let to_in = cycle_set.contains(&edge.to);
        let new_edge = match (from_in, to_in) {
            (true, true) => continue,
            (false, true) => {
                // entering the cycle: an entering edge overrides the cycle's
                // selected edge at its destination, which a required edge
                // must never be
                if required_into.contains_key(&edge.to) {
                    continue;
                }
                let sacrificed = chosen_in_cycle[&edge.to];
                entered_at.push(Some(edge.to));
                Edge {
                    from: new_of_old[edge.from]
                        .ok_or(PlanError::Internal("entering edge source lost"))?,
                    to: super_idx,
                    weight: edge.weight - edges[sacrificed].weight + min_cycle_weight,
                    parent: idx,
                }
            }
            (true, false) => {
                entered_at.push(None);
                Edge {
                    from: super_idx,
                    to: new_of_old[edge.to]
                        .ok_or(PlanError::Internal("leaving edge target lost"))?,
                    weight: edge.weight,
                    parent: idx,
                }
            }
            (false, false) => {
                entered_at.push(None);
                Edge {
                    from: new_of_old[edge.from]
                        .ok_or(PlanError::Internal("edge source lost"))?,
                    to: new_of_old[edge.to].ok_or(PlanError::Internal("edge target lost"))?,
                    weight: edge.weight,
                    parent: idx,
                }
            }
        };
        new_edge_of_old[idx] = Some(edges_new.len());
        edges_new.push(new_edge);
    }

    let mut required_new: FxHashMap<usize, usize> = FxHashMap::default();
    for (&to, &edge_idx) in required_into {
        if cycle_set.contains(&to) {
            continue;
        }
        let new_to =
            new_of_old[to].ok_or(PlanError::Internal("required destination lost"))?;
        let new_edge = new_edge_of_old[edge_idx]
            .ok_or(PlanError::Internal("required edge lost in contraction"))?;
        required_new.insert(new_to, new_edge);
    }

    let chosen_contracted = solve(
        n_new,
        &reps_new,
        &forced_new,
        &edges_new,
        new_of_old[root].ok_or(PlanError::Internal("root contracted away"))?,
        &required_new,
        graph,
    )?;

    // expand: the edge entering the super-node overrides exactly one cycle
    // edge, every other cycle edge survives
    let mut chosen = FxHashMap::default();
    for (&node, &edge_idx) in &chosen_contracted {
        let parent_edge = edges_new[edge_idx].parent;
        if node == super_idx {
            let broken = entered_at[edge_idx]
                .ok_or(PlanError::Internal("super-node entered by non-entering edge"))?;
            chosen.insert(broken, parent_edge);
            for (&v, &cycle_edge) in &chosen_in_cycle {
                if v != broken {
                    chosen.insert(v, cycle_edge);
                }
            }
        } else {
            chosen.insert(old_of_new[node], parent_edge);
        }
    }
    Ok(chosen)
}
