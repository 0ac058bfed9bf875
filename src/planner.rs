//! The planner: from a constraint pattern to an executable traversal plan.
//!
//! One conjunction at a time: constraints expand into equivalent fragment
//! sets, the rewriter specializes them, costs freeze, and each connected
//! component of the variable graph gets a maximum arborescence solved from
//! a bounded set of candidate roots. The winning arborescences are
//! linearized and concatenated into one branch of the final plan.

use std::cmp::Ordering;
use std::sync::Arc;

use rustc_hash::{FxHashMap, FxHashSet};
use tracing::{debug, trace};

use crate::constraint::{Conjunction, Pattern};
use crate::error::{PlanError, Result};
use crate::fragment::sets::{self, fragment_sets};
use crate::fragment::{cost, Fragment, FragmentId};
use crate::graph::{weighted, DirectedEdge, NodeId, SparseWeightedGraph};
use crate::optimize;
use crate::plan::linearize::{self, linearize_component, MiddleFragmentMap};
use crate::plan::TraversalPlan;
use crate::schema::{SchemaProvider, StatsProvider};
use crate::spanning::{max_arborescence, Arborescence};
use crate::types::Var;

/// Planner configuration: one toggle per rewrite rule, plus the bound on
/// how many candidate roots the arborescence search tries per component.
#[derive(Clone, Debug)]
pub struct PlannerConfig {
    /// Fuse has-attribute plus literal equality into an index probe.
    pub attribute_index_fusion: bool,
    /// Drop duplicate and orphaned label sets.
    pub redundant_label_elimination: bool,
    /// Drop subtype sets the schema already implies.
    pub subtype_elimination: bool,
    /// Inline pinned role and relation types into role-player fragments.
    pub role_specialization: bool,
    /// Skip edge-instance checks for vertex-only types.
    pub instance_check_skipping: bool,
    /// Infer relation types from pinned role players.
    pub relation_type_inference: bool,
    /// Maximum number of candidate starting points tried per component.
    pub max_starting_points: usize,
}

impl Default for PlannerConfig {
    fn default() -> Self {
        Self {
            attribute_index_fusion: true,
            redundant_label_elimination: true,
            subtype_elimination: true,
            role_specialization: true,
            instance_check_skipping: true,
            relation_type_inference: true,
            max_starting_points: 3,
        }
    }
}

/// Query planner holding the configuration and the read-only collaborators.
///
/// Planning is synchronous and keeps no state across calls; a planner may
/// be shared freely between threads as long as the providers tolerate
/// concurrent reads.
pub struct Planner {
    config: PlannerConfig,
    schema: Arc<dyn SchemaProvider>,
    stats: Arc<dyn StatsProvider>,
}

impl Planner {
    /// Creates a planner with the given configuration and providers.
    pub fn new(
        config: PlannerConfig,
        schema: Arc<dyn SchemaProvider>,
        stats: Arc<dyn StatsProvider>,
    ) -> Self {
        Self {
            config,
            schema,
            stats,
        }
    }

    /// Plans every disjunctive branch of `pattern` independently and
    /// packages them as one traversal plan.
    pub fn plan(&self, pattern: &Pattern) -> Result<TraversalPlan> {
        let mut branches = Vec::with_capacity(pattern.branches.len());
        for conjunction in &pattern.branches {
            branches.push(self.plan_conjunction(conjunction)?);
        }
        let plan = TraversalPlan::new(branches);
        debug!(
            complexity = plan.complexity(),
            hash = plan.plan_hash(),
            "planner.done"
        );
        Ok(plan)
    }

    fn plan_conjunction(&self, conjunction: &Conjunction) -> Result<Vec<Fragment>> {
        let mut fragment_sets = fragment_sets(conjunction, self.schema.as_ref())?;
        let mut next_generated = 0u32;
        if self.config.relation_type_inference {
            optimize::infer_relation_types(
                &mut fragment_sets,
                self.schema.as_ref(),
                &mut next_generated,
            );
        }
        optimize::optimize(&mut fragment_sets, self.schema.as_ref(), &self.config);

        let mut fragments = sets::flatten(&fragment_sets);
        cost::assign_costs(&mut fragments, self.schema.as_ref(), self.stats.as_ref());

        let components = connected_components(&fragments);
        debug!(
            components = components.len(),
            fragments = fragments.len(),
            "planner.components"
        );

        let mut emitted_sets: FxHashSet<usize> = FxHashSet::default();
        let mut bound: FxHashSet<Var> = FxHashSet::default();
        let mut ordered: Vec<FragmentId> = Vec::new();
        for component in &components {
            let subplan =
                self.plan_component(&fragments, component, &mut emitted_sets, &mut bound)?;
            ordered.extend(subplan);
        }

        // checks whose dependencies bind in a later component than their own
        // variable land here, after everything is bound
        let every_fragment: Vec<FragmentId> = (0..fragments.len()).collect();
        linearize::sweep(
            &fragments,
            &every_fragment,
            &mut emitted_sets,
            &mut bound,
            &mut ordered,
        );

        // every constraint must have selected exactly one realization
        for (set_index, set) in fragment_sets.iter().enumerate() {
            if !emitted_sets.contains(&set_index) {
                let fragment = set
                    .fragments
                    .first()
                    .ok_or(PlanError::Internal("empty equivalent fragment set"))?;
                let var = fragment
                    .dependencies()
                    .iter()
                    .find(|dep| !bound.contains(*dep))
                    .cloned()
                    .unwrap_or_else(|| fragment.start().clone());
                return Err(PlanError::UnplannableQuery { var });
            }
        }

        Ok(ordered
            .into_iter()
            .map(|fid| fragments[fid].clone())
            .collect())
    }

    fn plan_component(
        &self,
        fragments: &[Fragment],
        component: &[FragmentId],
        emitted_sets: &mut FxHashSet<usize>,
        bound: &mut FxHashSet<Var>,
    ) -> Result<Vec<FragmentId>> {
        // project edge fragments into the weighted variable graph; the
        // middle node forces the solver to commit to one edge direction
        let mut edges = Vec::new();
        let mut middle_map: MiddleFragmentMap = FxHashMap::default();
        for &fid in component {
            let fragment = &fragments[fid];
            let (Some(end), Some(kind)) = (fragment.end(), fragment.kind().middle_kind()) else {
                continue;
            };
            let start_node = NodeId::Var(fragment.start().clone());
            let middle = NodeId::middle(kind, fragment.start(), end, fragment.set_index());
            edges.push(weighted(
                DirectedEdge::new(start_node.clone(), middle.clone()),
                -fragment.cost(),
            ));
            edges.push(weighted(
                DirectedEdge::new(middle.clone(), NodeId::Var(end.clone())),
                0.0,
            ));
            middle_map
                .entry(middle)
                .or_default()
                .insert(start_node, fid);
        }

        if edges.is_empty() {
            return linearize_component(
                fragments,
                component,
                None,
                &middle_map,
                &[],
                emitted_sets,
                bound,
            );
        }

        let graph = SparseWeightedGraph::from_edges(edges);
        let roots = self.starting_nodes(fragments, component, &graph);
        let mut best: Option<Arborescence> = None;
        let mut first_err: Option<PlanError> = None;
        for root in &roots {
            match max_arborescence(&graph, root, &[], &[]) {
                Ok(candidate) => {
                    let better = match &best {
                        None => true,
                        Some(current) => candidate.weight() > current.weight(),
                    };
                    if better {
                        best = Some(candidate);
                    }
                }
                Err(err) => {
                    if first_err.is_none() {
                        first_err = Some(err);
                    }
                }
            }
        }
        let Some(arborescence) = best else {
            return Err(
                first_err.unwrap_or(PlanError::Internal("component without root candidates"))
            );
        };
        trace!(
            root = %arborescence.root(),
            weight = arborescence.weight(),
            "planner.component.arborescence"
        );

        linearize_component(
            fragments,
            component,
            Some(&arborescence),
            &middle_map,
            graph.nodes(),
            emitted_sets,
            bound,
        )
    }

    /// Candidate roots for one component: the cheapest fixed-cost starting
    /// fragments, bounded by configuration. Components with no index-backed
    /// entry fall back to every variable node.
    fn starting_nodes(
        &self,
        fragments: &[Fragment],
        component: &[FragmentId],
        graph: &SparseWeightedGraph,
    ) -> Vec<NodeId> {
        let mut candidates: Vec<(f64, NodeId)> = Vec::new();
        for &fid in component {
            let fragment = &fragments[fid];
            if !fragment.has_fixed_cost() {
                continue;
            }
            let node = NodeId::Var(fragment.start().clone());
            if graph.index_of(&node).is_none() {
                continue;
            }
            let start_cost =
                cost::starting_point_cost(fragment, self.schema.as_ref(), self.stats.as_ref());
            match candidates.iter_mut().find(|(_, n)| n == &node) {
                Some(existing) => existing.0 = existing.0.min(start_cost),
                None => candidates.push((start_cost, node)),
            }
        }
        candidates.sort_by(|a, b| a.0.partial_cmp(&b.0).unwrap_or(Ordering::Equal));
        let roots: Vec<NodeId> = candidates
            .into_iter()
            .take(self.config.max_starting_points.max(1))
            .map(|(_, node)| node)
            .collect();
        if roots.is_empty() {
            return graph
                .nodes()
                .iter()
                .filter(|node| !node.is_middle())
                .cloned()
                .collect();
        }
        roots
    }
}

/// Groups fragments into maximal sets connected by shared variables.
/// Only start and end variables connect: a check's dependency may well be
/// bound by a different component, and the cross-component sweep places it
/// once everything is bound.
fn connected_components(fragments: &[Fragment]) -> Vec<Vec<FragmentId>> {
    let mut var_sets: Vec<FxHashSet<Var>> = Vec::new();
    let mut member_sets: Vec<Vec<FragmentId>> = Vec::new();
    for (fid, fragment) in fragments.iter().enumerate() {
        let mut vars: Vec<Var> = vec![fragment.start().clone()];
        if let Some(end) = fragment.end() {
            vars.push(end.clone());
        }
        let touching: Vec<usize> = var_sets
            .iter()
            .enumerate()
            .filter(|(_, set)| vars.iter().any(|v| set.contains(v)))
            .map(|(idx, _)| idx)
            .collect();
        match touching.split_first() {
            None => {
                var_sets.push(vars.into_iter().collect());
                member_sets.push(vec![fid]);
            }
            Some((&first, rest)) => {
                for var in vars {
                    var_sets[first].insert(var);
                }
                member_sets[first].push(fid);
                // merge later sets into the first, back to front so the
                // indices stay valid
                for &idx in rest.iter().rev() {
                    let vars = var_sets.remove(idx);
                    let members = member_sets.remove(idx);
                    var_sets[first].extend(vars);
                    member_sets[first].extend(members);
                }
            }
        }
    }
    member_sets
}
