//! Cost estimation for fragments.
//!
//! Costs are natural-log cardinalities, so the sum of the costs along a plan
//! tracks the product of the branching factors the executor will see. Index
//! probes get a small fixed cost; traversal fragments get statistics-driven
//! estimates that degrade to conservative defaults when the statistics
//! collaborator has nothing to offer.

use rustc_hash::FxHashMap;
use tracing::trace;

use crate::fragment::{Fragment, FragmentKind};
use crate::schema::{SchemaProvider, StatsProvider};
use crate::types::{TypeId, Var};

/// Cost of a single index probe.
pub(crate) const COST_INDEX_PROBE: f64 = 1.0;
/// Cost of a post-binding filter check (value comparison, neq).
pub(crate) const COST_FILTER: f64 = 0.25;
/// Cost of following one edge to a unique neighbour.
pub(crate) const COST_ONE_HOP: f64 = 1.0;
/// Extra cost of seeding a plan from a value index rather than a label.
const COST_VALUE_INDEX_PENALTY: f64 = 1.0;

const DEFAULT_INSTANCES_PER_TYPE: f64 = 10_000.0;
const DEFAULT_SUBTYPES_PER_TYPE: f64 = 4.0;
const DEFAULT_PLAYERS_PER_RELATION: f64 = 3.0;
const DEFAULT_RELATIONS_PER_INSTANCE: f64 = 30.0;
const DEFAULT_ATTRIBUTES_PER_INSTANCE: f64 = 8.0;
const DEFAULT_OWNERS_PER_ATTRIBUTE: f64 = 50.0;
/// Fallback for seeding a component with no index-backed entry at all:
/// effectively a full graph scan.
const DEFAULT_SCAN_SIZE: f64 = 1_000_000.0;

fn log_count(count: f64) -> f64 {
    count.max(0.0).ln_1p()
}

/// Total instance count of `types` including their transitive subtypes,
/// from statistics where available.
fn instances_with_subtypes(
    types: &[TypeId],
    schema: &dyn SchemaProvider,
    stats: &dyn StatsProvider,
) -> f64 {
    let mut total = 0.0;
    let mut known = false;
    for &t in types {
        if let Some(count) = stats.instance_count(t) {
            total += count as f64;
            known = true;
        }
        for sub in schema.subtypes(t) {
            if let Some(count) = stats.instance_count(sub) {
                total += count as f64;
                known = true;
            }
        }
    }
    if known {
        total
    } else {
        DEFAULT_INSTANCES_PER_TYPE
    }
}

/// Assigns every fragment its in-plan cost, then freezes the estimates.
///
/// Statistics flow in through two channels: label fragments contribute a
/// per-type-variable instance estimate, which is propagated down subtype
/// edges and folded into the isa fragments that fan out from those type
/// variables (the expensive direction).
pub(crate) fn assign_costs(
    fragments: &mut [Fragment],
    schema: &dyn SchemaProvider,
    stats: &dyn StatsProvider,
) {
    // instance estimates for label-pinned type variables
    let mut type_var_counts: FxHashMap<Var, f64> = FxHashMap::default();
    for fragment in fragments.iter() {
        if let FragmentKind::Label { types } = fragment.kind() {
            let count = instances_with_subtypes(types, schema, stats);
            type_var_counts
                .entry(fragment.start().clone())
                .or_insert(count);
        }
    }

    // a subtype reachable from a pinned supertype inherits its estimate;
    // repeat until no new variable gains one (sub chains may be long)
    loop {
        let mut changed = false;
        for fragment in fragments.iter() {
            let (sub, sup) = match fragment.kind() {
                FragmentKind::SubOut => match fragment.end() {
                    Some(end) => (fragment.start(), end),
                    None => continue,
                },
                FragmentKind::SubIn => match fragment.end() {
                    Some(end) => (end, fragment.start()),
                    None => continue,
                },
                _ => continue,
            };
            if let Some(&count) = type_var_counts.get(sup) {
                if !type_var_counts.contains_key(sub) {
                    type_var_counts.insert(sub.clone(), count);
                    changed = true;
                }
            }
        }
        if !changed {
            break;
        }
    }

    for fragment in fragments.iter_mut() {
        let base = base_cost(fragment.kind(), stats);
        fragment.set_base_cost(base);
        if let FragmentKind::IsaIn { .. } = fragment.kind() {
            if let Some(&count) = type_var_counts.get(fragment.start()) {
                fragment.refine_cost(log_count(count));
            }
        }
    }
    trace!(
        fragments = fragments.len(),
        pinned_type_vars = type_var_counts.len(),
        "cost.assigned"
    );
}

fn base_cost(kind: &FragmentKind, stats: &dyn StatsProvider) -> f64 {
    match kind {
        FragmentKind::Label { .. }
        | FragmentKind::Id { .. }
        | FragmentKind::AttributeIndex { .. } => COST_INDEX_PROBE,
        FragmentKind::Value { cmp } => {
            if cmp.is_indexable_eq() {
                COST_INDEX_PROBE
            } else {
                COST_FILTER
            }
        }
        FragmentKind::Neq { .. } => COST_FILTER,
        FragmentKind::IsaOut { .. } => COST_ONE_HOP,
        FragmentKind::IsaIn { .. } => log_count(DEFAULT_INSTANCES_PER_TYPE),
        FragmentKind::SubOut => COST_ONE_HOP,
        FragmentKind::SubIn => log_count(DEFAULT_SUBTYPES_PER_TYPE),
        FragmentKind::RolePlayerOut { .. } => log_count(DEFAULT_PLAYERS_PER_RELATION),
        FragmentKind::RolePlayerIn {
            role,
            relation_types,
            ..
        } => {
            // the global relation count bounds the per-player fanout
            let mut fanout = DEFAULT_RELATIONS_PER_INSTANCE;
            if let [relation_type] = relation_types.as_slice() {
                if let Some(count) = stats.relation_count(*relation_type, *role) {
                    fanout = fanout.min(count as f64);
                }
            }
            log_count(fanout)
        }
        FragmentKind::HasOut => log_count(DEFAULT_ATTRIBUTES_PER_INSTANCE),
        FragmentKind::HasIn => log_count(DEFAULT_OWNERS_PER_ATTRIBUTE),
    }
}

/// Cost of using `fragment` to seed a disconnected component, with no prior
/// bindings to exploit. Distinct from the in-plan cost: a label probe is
/// cheap mid-plan but seeds a whole type scan as an entry point.
pub(crate) fn starting_point_cost(
    fragment: &Fragment,
    schema: &dyn SchemaProvider,
    stats: &dyn StatsProvider,
) -> f64 {
    match fragment.kind() {
        FragmentKind::Id { .. } | FragmentKind::AttributeIndex { .. } => COST_INDEX_PROBE,
        FragmentKind::Label { types } => {
            log_count(instances_with_subtypes(types, schema, stats))
        }
        FragmentKind::Value { cmp } if cmp.is_indexable_eq() => {
            COST_INDEX_PROBE + COST_VALUE_INDEX_PENALTY
        }
        _ => log_count(DEFAULT_SCAN_SIZE),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::constraint::{Conjunction, Constraint};
    use crate::fragment::sets::{flatten, fragment_sets};
    use crate::schema::{InMemorySchema, InMemoryStats, NoStats};

    fn frags(constraints: Vec<Constraint>, schema: &InMemorySchema) -> Vec<Fragment> {
        let sets = fragment_sets(&Conjunction::new(constraints), schema).unwrap();
        flatten(&sets)
    }

    #[test]
    fn label_statistics_refine_isa_in() {
        let schema = InMemorySchema::new().with_type("person", TypeId(1));
        let stats = InMemoryStats::new().with_instances(TypeId(1), 50);
        let mut fragments = frags(
            vec![Constraint::isa("x", "t"), Constraint::label("t", "person")],
            &schema,
        );
        assign_costs(&mut fragments, &schema, &stats);
        let isa_in = fragments
            .iter()
            .find(|f| matches!(f.kind(), FragmentKind::IsaIn { .. }))
            .unwrap();
        assert!((isa_in.cost() - 51f64.ln()).abs() < 1e-9);
    }

    #[test]
    fn missing_statistics_degrade_to_defaults() {
        let schema = InMemorySchema::new().with_type("person", TypeId(1));
        let mut fragments = frags(
            vec![Constraint::isa("x", "t"), Constraint::label("t", "person")],
            &schema,
        );
        assign_costs(&mut fragments, &schema, &NoStats);
        let isa_in = fragments
            .iter()
            .find(|f| matches!(f.kind(), FragmentKind::IsaIn { .. }))
            .unwrap();
        assert!((isa_in.cost() - DEFAULT_INSTANCES_PER_TYPE.ln_1p()).abs() < 1e-9);
    }

    #[test]
    fn subtype_chain_inherits_supertype_estimate() {
        let schema = InMemorySchema::new()
            .with_type("entity", TypeId(1))
            .with_type("person", TypeId(2))
            .with_subtype(TypeId(2), TypeId(1));
        let stats = InMemoryStats::new().with_instances(TypeId(1), 10);
        // $sup label entity; $sub sub $sup; $x isa $sub
        let mut fragments = frags(
            vec![
                Constraint::label("sup", "entity"),
                Constraint::sub("sub", "sup"),
                Constraint::isa("x", "sub"),
            ],
            &schema,
        );
        assign_costs(&mut fragments, &schema, &stats);
        let isa_in = fragments
            .iter()
            .find(|f| matches!(f.kind(), FragmentKind::IsaIn { .. }))
            .unwrap();
        // inherits the pinned supertype's estimate instead of the default
        assert!(isa_in.cost() < DEFAULT_INSTANCES_PER_TYPE.ln_1p());
    }

    #[test]
    fn starting_cost_exceeds_internal_cost_for_labels() {
        let schema = InMemorySchema::new().with_type("person", TypeId(1));
        let stats = InMemoryStats::new().with_instances(TypeId(1), 5_000);
        let mut fragments = frags(vec![Constraint::label("t", "person")], &schema);
        assign_costs(&mut fragments, &schema, &stats);
        let label = &fragments[0];
        assert_eq!(label.cost(), COST_INDEX_PROBE);
        assert!(starting_point_cost(label, &schema, &stats) > label.cost());
    }
}
