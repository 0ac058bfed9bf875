//! Property tests: solver invariants over random graphs and planner
//! invariants over randomly generated constraint conjunctions.

use std::sync::Arc;

use proptest::prelude::*;
use rustc_hash::FxHashSet;
use trellis::constraint::{Comparison, Constraint, Pattern};
use trellis::graph::{weighted, DirectedEdge, NodeId, SparseWeightedGraph};
use trellis::schema::{InMemorySchema, NoStats};
use trellis::spanning::max_arborescence;
use trellis::types::{RoleId, TypeId, Var};
use trellis::{Planner, PlannerConfig};

fn node(i: usize) -> NodeId {
    NodeId::var(format!("n{i}").as_str())
}

/// A connected random digraph: a base fan out of the root guarantees every
/// node is reachable, extra edges make the solver work for it.
fn arb_graph() -> impl Strategy<Value = (usize, Vec<(usize, usize, u32)>)> {
    (2usize..8)
        .prop_flat_map(|n| {
            let base = prop::collection::vec(1u32..100, n - 1);
            let extras = prop::collection::vec((0..n, 1..n, 1u32..100), 0..20);
            (Just(n), base, extras)
        })
        .prop_map(|(n, base, extras)| {
            let mut edges: Vec<(usize, usize, u32)> = base
                .into_iter()
                .enumerate()
                .map(|(i, w)| (0, i + 1, w))
                .collect();
            for (from, to, w) in extras {
                if from != to {
                    edges.push((from, to, w));
                }
            }
            (n, edges)
        })
}

fn build(edges: &[(usize, usize, u32)]) -> SparseWeightedGraph {
    SparseWeightedGraph::from_edges(
        edges
            .iter()
            .map(|&(from, to, w)| weighted(DirectedEdge::new(node(from), node(to)), f64::from(w)))
            .collect(),
    )
}

proptest! {
    #[test]
    fn prop_arborescence_is_valid((n, edges) in arb_graph()) {
        let graph = build(&edges);
        let result =
            max_arborescence(&graph, &node(0), &[], &[]).expect("solvable by construction");

        // every non-root node has exactly one parent and no walk cycles
        prop_assert_eq!(result.parents().len(), n - 1);
        for i in 1..n {
            let mut steps = 0;
            let mut current = node(i);
            while let Some(parent) = result.parent_of(&current) {
                current = parent.clone();
                steps += 1;
                prop_assert!(steps <= n, "cycle reaching node {}", i);
            }
            prop_assert_eq!(&current, result.root());
        }

        // the reported weight is consistent with the selected parents: the
        // solver never picks a lighter parallel edge
        let mut expected = 0.0;
        for i in 1..n {
            let parent = result.parent_of(&node(i)).expect("covered");
            let best = edges
                .iter()
                .filter(|&&(from, to, _)| node(from) == *parent && to == i)
                .map(|&(_, _, w)| f64::from(w))
                .fold(f64::NEG_INFINITY, f64::max);
            expected += best;
        }
        prop_assert!((result.weight() - expected).abs() < 1e-6);
    }

    #[test]
    fn prop_required_edge_is_honored(
        (n, edges) in arb_graph(),
        pick in any::<prop::sample::Index>(),
    ) {
        let (from, to, _) = edges[pick.index(edges.len())];
        prop_assume!(to != 0 && from != to);
        let graph = build(&edges);
        let required = [DirectedEdge::new(node(from), node(to))];
        let result = max_arborescence(&graph, &node(0), &required, &[]).expect("still solvable");
        prop_assert_eq!(result.parent_of(&node(to)), Some(&node(from)));
        prop_assert_eq!(result.parents().len(), n - 1);
    }

    #[test]
    fn prop_banned_edges_are_absent((n, edges) in arb_graph(), seed in any::<u64>()) {
        // ban every edge between non-root nodes that matches the seed; the
        // root fan is kept, so the graph stays solvable
        let banned: Vec<DirectedEdge> = edges
            .iter()
            .enumerate()
            .filter(|&(i, &(from, _, _))| from != 0 && (seed >> (i % 64)) & 1 == 1)
            .map(|(_, &(from, to, _))| DirectedEdge::new(node(from), node(to)))
            .collect();
        let graph = build(&edges);
        let result = max_arborescence(&graph, &node(0), &[], &banned).expect("root fan remains");
        prop_assert_eq!(result.parents().len(), n - 1);
        for edge in &banned {
            prop_assert_ne!(result.parent_of(&edge.to), Some(&edge.from));
        }
    }
}

fn test_schema() -> InMemorySchema {
    InMemorySchema::new()
        .with_type("person", TypeId(1))
        .with_type("company", TypeId(2))
        .with_type("name", TypeId(10))
        .with_type("employment", TypeId(20))
        .with_role("employee", RoleId(1))
        .with_role("employer", RoleId(2))
        .with_relates(TypeId(20), RoleId(1))
        .with_relates(TypeId(20), RoleId(2))
        .with_plays(TypeId(1), RoleId(1))
        .with_plays(TypeId(2), RoleId(2))
}

/// One generation step for a random, plannable-by-construction conjunction.
#[derive(Clone, Debug)]
enum Step {
    NewTyped { company: bool },
    Attribute { owner: usize },
    Relation { player: usize },
    ValueEq { var: usize },
    Neq { a: usize, b: usize },
}

fn arb_steps() -> impl Strategy<Value = Vec<Step>> {
    let step = prop_oneof![
        any::<bool>().prop_map(|company| Step::NewTyped { company }),
        any::<prop::sample::Index>().prop_map(|i| Step::Attribute { owner: i.index(64) }),
        any::<prop::sample::Index>().prop_map(|i| Step::Relation { player: i.index(64) }),
        any::<prop::sample::Index>().prop_map(|i| Step::ValueEq { var: i.index(64) }),
        (any::<prop::sample::Index>(), any::<prop::sample::Index>()).prop_map(|(a, b)| Step::Neq {
            a: a.index(64),
            b: b.index(64),
        }),
    ];
    prop::collection::vec(step, 0..10)
}

/// Interprets the steps into a conjunction where every variable is bindable:
/// new instance variables arrive either with a label-pinned type or through
/// an edge from an existing variable.
fn conjunction_from(steps: &[Step]) -> Vec<Constraint> {
    let mut constraints = Vec::new();
    let mut instances: Vec<Var> = Vec::new();
    let mut fresh = 0usize;
    let name = |prefix: &str, fresh: &mut usize| {
        let var = Var::named(format!("{prefix}{fresh}"));
        *fresh += 1;
        var
    };

    // seed instance so indices always resolve
    let seed = name("x", &mut fresh);
    let seed_type = name("t", &mut fresh);
    constraints.push(Constraint::isa(seed.clone(), seed_type.clone()));
    constraints.push(Constraint::label(seed_type, "person"));
    instances.push(seed);

    for step in steps {
        match step {
            Step::NewTyped { company } => {
                let var = name("x", &mut fresh);
                let type_var = name("t", &mut fresh);
                constraints.push(Constraint::isa(var.clone(), type_var.clone()));
                constraints.push(Constraint::label(
                    type_var,
                    if *company { "company" } else { "person" },
                ));
                instances.push(var);
            }
            Step::Attribute { owner } => {
                let owner = instances[owner % instances.len()].clone();
                let attr = name("a", &mut fresh);
                constraints.push(Constraint::has(owner, attr.clone()));
                instances.push(attr);
            }
            Step::Relation { player } => {
                let player = instances[player % instances.len()].clone();
                let relation = name("r", &mut fresh);
                let type_var = name("t", &mut fresh);
                constraints.push(Constraint::links(relation.clone(), player, Some("employee")));
                constraints.push(Constraint::isa(relation.clone(), type_var.clone()));
                constraints.push(Constraint::label(type_var, "employment"));
                instances.push(relation);
            }
            Step::ValueEq { var } => {
                let var = instances[var % instances.len()].clone();
                constraints.push(Constraint::value(var, Comparison::eq("v")));
            }
            Step::Neq { a, b } => {
                let a = instances[a % instances.len()].clone();
                let b = instances[b % instances.len()].clone();
                if a != b {
                    constraints.push(Constraint::neq(a, b));
                }
            }
        }
    }
    constraints
}

proptest! {
    #[test]
    fn prop_plans_are_dependency_sound_and_cover_all_vars(steps in arb_steps()) {
        let constraints = conjunction_from(&steps);
        let pattern = Pattern::conjunction(constraints.clone());
        let planner = Planner::new(
            PlannerConfig::default(),
            Arc::new(test_schema()),
            Arc::new(NoStats),
        );
        let plan = planner
            .plan(&pattern)
            .expect("generated patterns are plannable");
        prop_assert_eq!(plan.branches().len(), 1);
        let branch = &plan.branches()[0];

        // selection keeps at most one fragment per constraint; rewrites
        // (index fusion, duplicate elimination) may merge sets but never
        // add any
        prop_assert!(!branch.is_empty());
        prop_assert!(branch.len() <= constraints.len());

        // dependency soundness
        let mut bound: FxHashSet<Var> = FxHashSet::default();
        for fragment in branch {
            for dep in fragment.dependencies() {
                prop_assert!(bound.contains(dep), "unbound dependency {}", dep);
            }
            bound.insert(fragment.start().clone());
            if let Some(end) = fragment.end() {
                bound.insert(end.clone());
            }
        }

        // coverage of every query variable
        for constraint in &constraints {
            for var in constraint.vars() {
                prop_assert!(bound.contains(var), "variable {} not covered", var);
            }
        }

        // planning again reproduces the same plan
        let again = planner.plan(&pattern).expect("plannable");
        prop_assert_eq!(again.plan_hash(), plan.plan_hash());
    }
}
