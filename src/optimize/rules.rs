//! The closed set of rewrite rules over equivalent fragment sets.

use rustc_hash::FxHashMap;
use smallvec::SmallVec;
use tracing::trace;

use crate::constraint::{CmpOp, Operand};
use crate::fragment::{EquivalentFragmentSet, Fragment, FragmentKind};
use crate::schema::SchemaProvider;
use crate::types::{TypeId, Value, Var};

/// Type pins established by single-label sets: variable -> resolved type.
fn label_pins(sets: &[EquivalentFragmentSet]) -> FxHashMap<Var, TypeId> {
    let mut pins = FxHashMap::default();
    for set in sets {
        if let Some((var, type_id)) = set.as_single_label() {
            pins.entry(var.clone()).or_insert(type_id);
        }
    }
    pins
}

/// Instance-variable pins: thing variable -> the type it is an instance of,
/// when that type variable is itself label-pinned.
fn isa_pins(
    sets: &[EquivalentFragmentSet],
    pins: &FxHashMap<Var, TypeId>,
) -> FxHashMap<Var, TypeId> {
    let mut out = FxHashMap::default();
    for set in sets {
        if let Some((thing, type_var)) = set.as_isa() {
            if let Some(&type_id) = pins.get(type_var) {
                out.entry(thing.clone()).or_insert(type_id);
            }
        }
    }
    out
}

fn eq_literal(set: &EquivalentFragmentSet) -> Option<(&Var, &Value)> {
    match set.fragments.as_slice() {
        [f] => match f.kind() {
            FragmentKind::Value { cmp } if cmp.op == CmpOp::Eq => match &cmp.rhs {
                Operand::Literal(value) => Some((f.start(), value)),
                Operand::Variable(_) => None,
            },
            _ => None,
        },
        _ => None,
    }
}

/// Attribute-index fusion: `$a isa $t; $t label L; $a == v` becomes a single
/// fixed-cost probe of the `(L, v)` attribute index, provided `L` has no
/// subtypes (the exact-label index would miss subtype instances). The label
/// set stays; the isa and value sets are replaced by the probe.
///
/// Applies at most one fusion per call; the fixed-point driver re-runs it.
pub(crate) fn attribute_index_fusion(
    sets: &mut Vec<EquivalentFragmentSet>,
    schema: &dyn SchemaProvider,
) -> bool {
    let pins = label_pins(sets);
    let mut fusion: Option<(usize, usize, TypeId, Value)> = None;
    'search: for (isa_idx, set) in sets.iter().enumerate() {
        let Some((thing, type_var)) = set.as_isa() else {
            continue;
        };
        let Some(&attribute_type) = pins.get(type_var) else {
            continue;
        };
        if !schema.subtypes(attribute_type).is_empty() {
            continue;
        }
        for (value_idx, other) in sets.iter().enumerate() {
            if let Some((attr, value)) = eq_literal(other) {
                if attr == thing {
                    fusion = Some((isa_idx, value_idx, attribute_type, value.clone()));
                    break 'search;
                }
            }
        }
    }
    let Some((isa_idx, value_idx, attribute_type, value)) = fusion else {
        return false;
    };
    let attr_var = match sets[isa_idx].as_isa() {
        Some((thing, _)) => thing.clone(),
        None => return false,
    };
    let constraint = sets[value_idx].constraint;
    trace!(attr = %attr_var, ty = %attribute_type, "optimise.fuse.attribute_index");
    sets[isa_idx] = EquivalentFragmentSet::new(
        constraint,
        vec![Fragment::new(
            FragmentKind::AttributeIndex {
                attribute_type,
                value,
            },
            attr_var,
            None,
            constraint,
        )],
    );
    sets.remove(value_idx);
    true
}

/// Redundant label elimination: duplicate label sets on one variable
/// collapse to the first, and a label set on a planner-generated variable
/// that nothing else references is dropped outright.
pub(crate) fn redundant_label_elimination(sets: &mut Vec<EquivalentFragmentSet>) -> bool {
    for i in 0..sets.len() {
        let Some(FragmentKind::Label { types }) =
            sets[i].fragments.first().map(|f| f.kind().clone())
        else {
            continue;
        };
        let var = sets[i].fragments[0].start().clone();
        for j in (i + 1)..sets.len() {
            if let Some(FragmentKind::Label { types: other }) =
                sets[j].fragments.first().map(|f| f.kind())
            {
                if sets[j].fragments[0].start() == &var && *other == types {
                    sets.remove(j);
                    return true;
                }
            }
        }
        if var.is_generated() {
            let referenced_elsewhere = sets
                .iter()
                .enumerate()
                .any(|(k, set)| k != i && set.vars().contains(&&var));
            if !referenced_elsewhere {
                sets.remove(i);
                return true;
            }
        }
    }
    false
}

/// Subtype-traversal elimination: `$a sub $b` is a tautology once both ends
/// are label-pinned and the schema already implies the relationship.
pub(crate) fn subtype_elimination(
    sets: &mut Vec<EquivalentFragmentSet>,
    schema: &dyn SchemaProvider,
) -> bool {
    let pins = label_pins(sets);
    for i in 0..sets.len() {
        let Some((sub, sup)) = sets[i].as_sub() else {
            continue;
        };
        let (Some(&sub_type), Some(&sup_type)) = (pins.get(sub), pins.get(sup)) else {
            continue;
        };
        if schema.is_subtype(sub_type, sup_type) {
            trace!(sub = %sub_type, sup = %sup_type, "optimise.drop.sub");
            sets.remove(i);
            return true;
        }
    }
    false
}

/// Role/relation specialization: a role-player fragment whose relation
/// variable is pinned to a concrete type gets that type (and its subtypes)
/// inlined; once both the role and the relation types are pinned, the
/// runtime role re-check is dropped.
pub(crate) fn role_specialization(
    sets: &mut Vec<EquivalentFragmentSet>,
    schema: &dyn SchemaProvider,
) -> bool {
    let pins = label_pins(sets);
    let instance_pins = isa_pins(sets, &pins);
    let mut changed = false;
    for set in sets.iter_mut() {
        let relation = match set.as_links() {
            Some((relation, _, _)) => relation.clone(),
            None => continue,
        };
        let pinned = instance_pins.get(&relation).copied();
        for fragment in &mut set.fragments {
            let (role, relation_types, role_checked) = match fragment.kind_mut() {
                FragmentKind::RolePlayerOut {
                    role,
                    relation_types,
                    role_checked,
                }
                | FragmentKind::RolePlayerIn {
                    role,
                    relation_types,
                    role_checked,
                } => (role, relation_types, role_checked),
                _ => continue,
            };
            if relation_types.is_empty() {
                if let Some(relation_type) = pinned {
                    let mut narrowed: SmallVec<[TypeId; 2]> = SmallVec::new();
                    narrowed.push(relation_type);
                    narrowed.extend(schema.subtypes(relation_type));
                    *relation_types = narrowed;
                    changed = true;
                }
            }
            if role.is_some() && *role_checked && !relation_types.is_empty() {
                *role_checked = false;
                changed = true;
            }
        }
    }
    changed
}

/// Instance-check skipping: when an isa target type is pinned and neither it
/// nor any subtype stores instances as edges, the extra edge-instance
/// existence check is unnecessary.
pub(crate) fn instance_check_skipping(
    sets: &mut Vec<EquivalentFragmentSet>,
    schema: &dyn SchemaProvider,
) -> bool {
    let pins = label_pins(sets);
    let mut changed = false;
    for set in sets.iter_mut() {
        let type_id = match set.as_isa().and_then(|(_, type_var)| pins.get(type_var)) {
            Some(&type_id) => type_id,
            None => continue,
        };
        if schema.has_edge_instances(type_id)
            || schema
                .subtypes(type_id)
                .iter()
                .any(|&sub| schema.has_edge_instances(sub))
        {
            continue;
        }
        for fragment in &mut set.fragments {
            match fragment.kind_mut() {
                FragmentKind::IsaOut { needs_edge_check }
                | FragmentKind::IsaIn { needs_edge_check } => {
                    if *needs_edge_check {
                        *needs_edge_check = false;
                        changed = true;
                    }
                }
                _ => {}
            }
        }
    }
    changed
}

/// Relation-type inference: an unlabelled relation variable whose role
/// players all have pinned types gains a label and isa pair when the schema
/// admits exactly one relation type for that combination. Runs once, before
/// the rewrite fixed point.
pub fn infer_relation_types(
    sets: &mut Vec<EquivalentFragmentSet>,
    schema: &dyn SchemaProvider,
    next_generated: &mut u32,
) -> bool {
    let pins = label_pins(sets);
    let instance_pins = isa_pins(sets, &pins);

    // relation variables in first-appearance order
    let mut relations: Vec<Var> = Vec::new();
    for set in sets.iter() {
        if let Some((relation, _, _)) = set.as_links() {
            if !relations.contains(relation) {
                relations.push(relation.clone());
            }
        }
    }

    let mut changed = false;
    for relation in relations {
        if instance_pins.contains_key(&relation) || pins.contains_key(&relation) {
            continue;
        }
        let already_typed = sets.iter().any(|set| {
            set.as_isa().map(|(thing, _)| thing == &relation).unwrap_or(false)
        });
        if already_typed {
            continue;
        }

        let mut candidates: Option<Vec<TypeId>> = None;
        let mut all_players_pinned = true;
        for set in sets.iter() {
            let Some((rel, player, role)) = set.as_links() else {
                continue;
            };
            if rel != &relation {
                continue;
            }
            let Some(&player_type) = instance_pins.get(player) else {
                all_players_pinned = false;
                break;
            };
            let involving = schema.relations_involving(player_type, role);
            candidates = Some(match candidates {
                None => involving,
                Some(existing) => existing
                    .into_iter()
                    .filter(|t| involving.contains(t))
                    .collect(),
            });
        }
        if !all_players_pinned {
            continue;
        }
        let Some(candidates) = candidates else {
            continue;
        };
        let [inferred] = candidates.as_slice() else {
            continue;
        };

        let constraint = sets
            .iter()
            .find_map(|set| {
                set.as_links()
                    .filter(|(rel, _, _)| *rel == &relation)
                    .map(|_| set.constraint)
            })
            .unwrap_or(0);
        let type_var = Var::Generated(*next_generated);
        *next_generated += 1;
        trace!(relation = %relation, inferred = %inferred, "optimise.infer.relation_type");

        let mut types: SmallVec<[TypeId; 2]> = SmallVec::new();
        types.push(*inferred);
        sets.push(EquivalentFragmentSet::new(
            constraint,
            vec![Fragment::new(
                FragmentKind::Label { types },
                type_var.clone(),
                None,
                constraint,
            )],
        ));
        sets.push(EquivalentFragmentSet::new(
            constraint,
            vec![
                Fragment::new(
                    FragmentKind::IsaOut {
                        needs_edge_check: true,
                    },
                    relation.clone(),
                    Some(type_var.clone()),
                    constraint,
                ),
                Fragment::new(
                    FragmentKind::IsaIn {
                        needs_edge_check: true,
                    },
                    type_var,
                    Some(relation.clone()),
                    constraint,
                ),
            ],
        ));
        changed = true;
    }
    changed
}
