//! End-to-end planning tests against the public API.

use std::sync::Arc;

use rustc_hash::{FxHashMap, FxHashSet};
use trellis::constraint::{CmpOp, Comparison, Conjunction, Constraint, Pattern};
use trellis::fragment::FragmentKind;
use trellis::schema::{InMemorySchema, InMemoryStats, NoStats, SchemaProvider, StatsProvider};
use trellis::types::{RoleId, ThingId, TypeId, Var};
use trellis::{PlanError, Planner, PlannerConfig, TraversalPlan};

fn schema() -> InMemorySchema {
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

fn planner_with(config: PlannerConfig) -> Planner {
    Planner::new(config, Arc::new(schema()), Arc::new(NoStats))
}

fn planner() -> Planner {
    planner_with(PlannerConfig::default())
}

fn rules_off() -> PlannerConfig {
    PlannerConfig {
        attribute_index_fusion: false,
        redundant_label_elimination: false,
        subtype_elimination: false,
        role_specialization: false,
        instance_check_skipping: false,
        relation_type_inference: false,
        ..PlannerConfig::default()
    }
}

/// Every fragment's dependencies must be bound by an earlier fragment of
/// the same branch.
fn assert_dependencies_sound(plan: &TraversalPlan) {
    for branch in plan.branches() {
        let mut bound: FxHashSet<Var> = FxHashSet::default();
        for fragment in branch {
            for dep in fragment.dependencies() {
                assert!(
                    bound.contains(dep),
                    "dependency {dep} of {} not bound before use",
                    fragment.kind().name()
                );
            }
            bound.insert(fragment.start().clone());
            if let Some(end) = fragment.end() {
                bound.insert(end.clone());
            }
        }
    }
}

/// Every query variable must appear as the start or end of some fragment.
fn assert_covers(plan: &TraversalPlan, branch: usize, conjunction: &Conjunction) {
    let mut seen: FxHashSet<&Var> = FxHashSet::default();
    for fragment in &plan.branches()[branch] {
        seen.insert(fragment.start());
        if let Some(end) = fragment.end() {
            seen.insert(end);
        }
    }
    for constraint in &conjunction.constraints {
        for var in constraint.vars() {
            assert!(seen.contains(var), "variable {var} missing from plan");
        }
    }
}

#[test]
fn label_seeds_a_simple_isa_plan() {
    let pattern = Pattern::conjunction(vec![
        Constraint::isa("x", "t"),
        Constraint::label("t", "person"),
    ]);
    let plan = planner().plan(&pattern).expect("plans");
    let branch = &plan.branches()[0];
    assert_eq!(branch.len(), 2);
    assert_eq!(branch[0].kind().name(), "label");
    assert_eq!(branch[1].kind().name(), "isa-in");
    assert_dependencies_sound(&plan);
    assert_covers(&plan, 0, &pattern.branches[0]);
}

#[test]
fn id_probe_beats_type_scan_as_entry_point() {
    let pattern = Pattern::conjunction(vec![
        Constraint::id("x", ThingId(42)),
        Constraint::isa("x", "t"),
        Constraint::label("t", "person"),
    ]);
    let plan = planner().plan(&pattern).expect("plans");
    let branch = &plan.branches()[0];
    assert_eq!(branch[0].kind().name(), "id");
    assert_eq!(branch[1].kind().name(), "isa-out");
    assert_dependencies_sound(&plan);
}

#[test]
fn statistics_redirect_the_entry_point() {
    // a tiny company type makes its label the cheaper seed
    let stats = InMemoryStats::new()
        .with_instances(TypeId(1), 1_000_000)
        .with_instances(TypeId(2), 3);
    let planner = Planner::new(
        PlannerConfig::default(),
        Arc::new(schema()),
        Arc::new(stats),
    );
    let pattern = Pattern::conjunction(vec![
        Constraint::isa("x", "t"),
        Constraint::label("t", "person"),
        Constraint::isa("y", "u"),
        Constraint::label("u", "company"),
        Constraint::links("r", "x", Some("employee")),
        Constraint::links("r", "y", Some("employer")),
    ]);
    let plan = planner.plan(&pattern).expect("plans");
    let branch = &plan.branches()[0];
    assert_eq!(branch[0].kind().name(), "label");
    assert_eq!(branch[0].start(), &Var::named("u"));
    assert_dependencies_sound(&plan);
}

#[test]
fn attribute_index_fusion_produces_a_probe() {
    let pattern = Pattern::conjunction(vec![
        Constraint::has("x", "a"),
        Constraint::isa("a", "t"),
        Constraint::label("t", "name"),
        Constraint::value("a", Comparison::eq("bob")),
    ]);
    let plan = planner().plan(&pattern).expect("plans");
    let branch = &plan.branches()[0];
    let probe = branch
        .iter()
        .find(|f| matches!(f.kind(), FragmentKind::AttributeIndex { .. }))
        .expect("fused index probe in plan");
    assert_eq!(probe.start(), &Var::named("a"));
    // probe seeds the traversal, ownership follows from the attribute
    assert_eq!(branch[0].kind().name(), "attribute-index");
    assert!(branch.iter().any(|f| f.kind().name() == "has-in"));
    assert_dependencies_sound(&plan);
    assert_covers(&plan, 0, &pattern.branches[0]);
}

#[test]
fn optimization_never_increases_complexity() {
    let patterns = vec![
        Pattern::conjunction(vec![
            Constraint::has("x", "a"),
            Constraint::isa("a", "t"),
            Constraint::label("t", "name"),
            Constraint::value("a", Comparison::eq("bob")),
        ]),
        Pattern::conjunction(vec![
            Constraint::isa("x", "t"),
            Constraint::label("t", "person"),
            Constraint::label("u", "person"),
            Constraint::label("v", "employment"),
            Constraint::sub("t", "u"),
        ]),
        Pattern::conjunction(vec![
            Constraint::isa("p", "pt"),
            Constraint::label("pt", "person"),
            Constraint::links("r", "p", Some("employee")),
            Constraint::isa("r", "rt"),
            Constraint::label("rt", "employment"),
        ]),
    ];
    for pattern in patterns {
        let optimized = planner().plan(&pattern).expect("optimized plan");
        let raw = planner_with(rules_off()).plan(&pattern).expect("raw plan");
        assert!(
            optimized.complexity() <= raw.complexity() + 1e-9,
            "optimisation increased complexity: {} > {}",
            optimized.complexity(),
            raw.complexity()
        );
    }
}

#[test]
fn disjunction_branches_stay_separate() {
    let pattern = Pattern::disjunction(vec![
        Conjunction::new(vec![
            Constraint::isa("x", "t"),
            Constraint::label("t", "person"),
        ]),
        Conjunction::new(vec![
            Constraint::isa("x", "t"),
            Constraint::label("t", "company"),
        ]),
    ]);
    let plan = planner().plan(&pattern).expect("plans");
    assert_eq!(plan.branches().len(), 2);
    for branch in plan.branches() {
        assert_eq!(branch.len(), 2);
    }
    assert_dependencies_sound(&plan);
}

#[test]
fn inequality_runs_after_both_sides_bind() {
    let pattern = Pattern::conjunction(vec![
        Constraint::isa("x", "t"),
        Constraint::label("t", "person"),
        Constraint::isa("y", "u"),
        Constraint::label("u", "person"),
        Constraint::neq("x", Var::named("y")),
    ]);
    let plan = planner().plan(&pattern).expect("plans");
    assert_dependencies_sound(&plan);
    let branch = &plan.branches()[0];
    let neq_pos = branch
        .iter()
        .position(|f| matches!(f.kind(), FragmentKind::Neq { .. }))
        .expect("neq in plan");
    // both variables bound strictly before the check
    let bound_before: FxHashSet<&Var> = branch[..neq_pos]
        .iter()
        .flat_map(|f| {
            let mut vars = vec![f.start()];
            vars.extend(f.end());
            vars
        })
        .collect();
    assert!(bound_before.contains(&Var::named("x")));
    assert!(bound_before.contains(&Var::named("y")));
}

#[test]
fn relation_type_is_inferred_from_players() {
    let pattern = Pattern::conjunction(vec![
        Constraint::isa("p", "pt"),
        Constraint::label("pt", "person"),
        Constraint::links("r", "p", Some("employee")),
    ]);
    let plan = planner().plan(&pattern).expect("plans");
    let branch = &plan.branches()[0];
    // the inferred label and isa pair give the relation variable a pinned
    // type, so the plan has two extra fragments
    assert_eq!(branch.len(), 5);
    assert!(branch.iter().any(|f| {
        matches!(
            f.kind(),
            FragmentKind::IsaOut { .. } | FragmentKind::IsaIn { .. }
        ) && (f.start() == &Var::named("r") || f.end() == Some(&Var::named("r")))
    }));
    assert_dependencies_sound(&plan);
}

#[test]
fn transform_round_trips() {
    let pattern = Pattern::conjunction(vec![
        Constraint::id("x", ThingId(42)),
        Constraint::isa("x", "t"),
        Constraint::label("t", "person"),
    ]);
    let plan = planner().plan(&pattern).expect("plans");
    let mut mapping = FxHashMap::default();
    mapping.insert(ThingId(42), ThingId(1337));
    let transformed = plan.transform(&mapping);

    assert_eq!(transformed.branches().len(), plan.branches().len());
    for (before, after) in plan.branches()[0]
        .iter()
        .zip(transformed.branches()[0].iter())
    {
        assert_eq!(before.kind().name(), after.kind().name());
        assert_eq!(before.start(), after.start());
    }
    assert!((transformed.complexity() - plan.complexity()).abs() < 1e-12);
    assert_eq!(transformed.plan_hash(), plan.plan_hash());
    let id = transformed.branches()[0]
        .iter()
        .find_map(|f| match f.kind() {
            FragmentKind::Id { id } => Some(*id),
            _ => None,
        })
        .expect("id fragment");
    assert_eq!(id, ThingId(1337));
}

#[test]
fn unknown_label_aborts_planning() {
    let pattern = Pattern::conjunction(vec![
        Constraint::isa("x", "t"),
        Constraint::label("t", "unicorn"),
    ]);
    let err = planner().plan(&pattern).unwrap_err();
    assert!(matches!(err, PlanError::UnknownLabel { ref label } if label == "unicorn"));
    assert_eq!(err.code(), "UnknownLabel");
}

#[test]
fn unknown_role_aborts_planning() {
    let pattern = Pattern::conjunction(vec![Constraint::links("r", "p", Some("nemesis"))]);
    let err = planner().plan(&pattern).unwrap_err();
    assert!(matches!(err, PlanError::UnknownRole { .. }));
}

#[test]
fn unbound_value_dependency_is_unplannable() {
    // $a > $b where nothing ever binds $b
    let pattern = Pattern::conjunction(vec![
        Constraint::isa("a", "t"),
        Constraint::label("t", "name"),
        Constraint::value("a", Comparison::var(CmpOp::Gt, Var::named("b"))),
    ]);
    let err = planner().plan(&pattern).unwrap_err();
    match err {
        PlanError::UnplannableQuery { var } => assert_eq!(var, Var::named("b")),
        other => panic!("unexpected error {other:?}"),
    }
}

#[test]
fn unbindable_inequality_is_unplannable() {
    // $y is only mentioned by the inequality; nothing can ever bind it
    let pattern = Pattern::conjunction(vec![
        Constraint::id("x", ThingId(1)),
        Constraint::neq("x", Var::named("y")),
    ]);
    let err = planner().plan(&pattern).unwrap_err();
    assert!(matches!(err, PlanError::UnplannableQuery { .. }));
}

#[test]
fn plans_are_reproducible() {
    let pattern = Pattern::conjunction(vec![
        Constraint::isa("x", "t"),
        Constraint::label("t", "person"),
        Constraint::has("x", "a"),
        Constraint::isa("a", "u"),
        Constraint::label("u", "name"),
    ]);
    let first = planner().plan(&pattern).expect("plans");
    for _ in 0..5 {
        let again = planner().plan(&pattern).expect("plans");
        assert_eq!(again.plan_hash(), first.plan_hash());
        let names: Vec<&str> = again.branches()[0]
            .iter()
            .map(|f| f.kind().name())
            .collect();
        let expected: Vec<&str> = first.branches()[0]
            .iter()
            .map(|f| f.kind().name())
            .collect();
        assert_eq!(names, expected);
    }
}

#[test]
fn providers_are_only_read() {
    // planning twice with the same providers yields identical results;
    // the planner keeps no state between calls
    let schema: Arc<dyn SchemaProvider> = Arc::new(schema());
    let stats: Arc<dyn StatsProvider> = Arc::new(NoStats);
    let planner = Planner::new(PlannerConfig::default(), schema, stats);
    let pattern = Pattern::conjunction(vec![
        Constraint::isa("x", "t"),
        Constraint::label("t", "person"),
    ]);
    let a = planner.plan(&pattern).expect("plans");
    let b = planner.plan(&pattern).expect("plans");
    assert_eq!(a.plan_hash(), b.plan_hash());
    assert!((a.complexity() - b.complexity()).abs() < 1e-12);
}
