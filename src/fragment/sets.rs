//! Equivalent fragment sets: interchangeable realizations of one constraint.

use smallvec::SmallVec;
use tracing::trace;

use crate::constraint::{Conjunction, Constraint};
use crate::error::Result;
use crate::fragment::{Fragment, FragmentKind};
use crate::schema::SchemaProvider;
use crate::types::{RoleId, TypeId, Var};

/// An unordered collection of fragments that are alternative physical
/// realizations of one logical constraint. Exactly one member is selected
/// per query plan; members agree on which variables they ultimately bind.
#[derive(Clone, Debug)]
pub struct EquivalentFragmentSet {
    /// Index of the originating constraint in the conjunction.
    pub constraint: usize,
    /// The alternative fragments, in generation order.
    pub fragments: Vec<Fragment>,
}

impl EquivalentFragmentSet {
    pub(crate) fn new(constraint: usize, fragments: Vec<Fragment>) -> Self {
        Self {
            constraint,
            fragments,
        }
    }

    /// The variables every member of this set mentions.
    pub fn vars(&self) -> Vec<&Var> {
        let mut out = Vec::new();
        for fragment in &self.fragments {
            for var in fragment.vars() {
                if !out.contains(&var) {
                    out.push(var);
                }
            }
        }
        out
    }

    /// True when this set realizes an isa constraint; returns
    /// `(thing, type_var)` when it does.
    pub fn as_isa(&self) -> Option<(&Var, &Var)> {
        self.fragments.iter().find_map(|f| match f.kind() {
            FragmentKind::IsaOut { .. } => Some((f.start(), f.end()?)),
            FragmentKind::IsaIn { .. } => Some((f.end()?, f.start())),
            _ => None,
        })
    }

    /// True when this set realizes a sub constraint; returns
    /// `(subtype, supertype)` when it does.
    pub fn as_sub(&self) -> Option<(&Var, &Var)> {
        self.fragments.iter().find_map(|f| match f.kind() {
            FragmentKind::SubOut => Some((f.start(), f.end()?)),
            FragmentKind::SubIn => Some((f.end()?, f.start())),
            _ => None,
        })
    }

    /// True when this set realizes a role-player constraint; returns
    /// `(relation, player, role)` when it does.
    pub fn as_links(&self) -> Option<(&Var, &Var, Option<RoleId>)> {
        self.fragments.iter().find_map(|f| match f.kind() {
            FragmentKind::RolePlayerOut { role, .. } => Some((f.start(), f.end()?, *role)),
            FragmentKind::RolePlayerIn { role, .. } => Some((f.end()?, f.start(), *role)),
            _ => None,
        })
    }

    /// The single resolved type when this is a one-label set.
    pub fn as_single_label(&self) -> Option<(&Var, TypeId)> {
        match self.fragments.as_slice() {
            [f] => match f.kind() {
                FragmentKind::Label { types } if types.len() == 1 => {
                    Some((f.start(), types[0]))
                }
                _ => None,
            },
            _ => None,
        }
    }

    /// The compared variable when this is a value set; returns the
    /// attribute variable and whether the comparison is an indexable
    /// literal equality.
    pub fn as_value(&self) -> Option<(&Var, bool)> {
        match self.fragments.as_slice() {
            [f] => match f.kind() {
                FragmentKind::Value { cmp } => Some((f.start(), cmp.is_indexable_eq())),
                _ => None,
            },
            _ => None,
        }
    }
}

/// Expands a conjunction into one equivalent fragment set per constraint.
///
/// Labels and role names resolve eagerly against the schema: an unknown
/// name aborts planning here rather than degrading to a guess.
pub fn fragment_sets(
    conjunction: &Conjunction,
    schema: &dyn SchemaProvider,
) -> Result<Vec<EquivalentFragmentSet>> {
    let mut sets = Vec::with_capacity(conjunction.constraints.len());
    for (index, constraint) in conjunction.constraints.iter().enumerate() {
        let fragments = match constraint {
            Constraint::Isa { thing, type_var } => vec![
                Fragment::new(
                    FragmentKind::IsaOut {
                        needs_edge_check: true,
                    },
                    thing.clone(),
                    Some(type_var.clone()),
                    index,
                ),
                Fragment::new(
                    FragmentKind::IsaIn {
                        needs_edge_check: true,
                    },
                    type_var.clone(),
                    Some(thing.clone()),
                    index,
                ),
            ],
            Constraint::Sub { subtype, supertype } => vec![
                Fragment::new(
                    FragmentKind::SubOut,
                    subtype.clone(),
                    Some(supertype.clone()),
                    index,
                ),
                Fragment::new(
                    FragmentKind::SubIn,
                    supertype.clone(),
                    Some(subtype.clone()),
                    index,
                ),
            ],
            Constraint::Links {
                relation,
                player,
                role,
            } => {
                let role_id = match role {
                    Some(name) => Some(schema.resolve_role(name)?),
                    None => None,
                };
                vec![
                    Fragment::new(
                        FragmentKind::RolePlayerOut {
                            role: role_id,
                            relation_types: SmallVec::new(),
                            role_checked: role_id.is_some(),
                        },
                        relation.clone(),
                        Some(player.clone()),
                        index,
                    ),
                    Fragment::new(
                        FragmentKind::RolePlayerIn {
                            role: role_id,
                            relation_types: SmallVec::new(),
                            role_checked: role_id.is_some(),
                        },
                        player.clone(),
                        Some(relation.clone()),
                        index,
                    ),
                ]
            }
            Constraint::Has { owner, attribute } => vec![
                Fragment::new(
                    FragmentKind::HasOut,
                    owner.clone(),
                    Some(attribute.clone()),
                    index,
                ),
                Fragment::new(
                    FragmentKind::HasIn,
                    attribute.clone(),
                    Some(owner.clone()),
                    index,
                ),
            ],
            Constraint::Label { type_var, label } => {
                let resolved = schema.resolve_label(label)?;
                let mut types = SmallVec::new();
                types.push(resolved);
                vec![Fragment::new(
                    FragmentKind::Label { types },
                    type_var.clone(),
                    None,
                    index,
                )]
            }
            Constraint::Id { thing, id } => vec![Fragment::new(
                FragmentKind::Id { id: *id },
                thing.clone(),
                None,
                index,
            )],
            Constraint::Value { attribute, cmp } => vec![Fragment::new(
                FragmentKind::Value { cmp: cmp.clone() },
                attribute.clone(),
                None,
                index,
            )],
            Constraint::Neq { lhs, rhs } => vec![
                Fragment::new(
                    FragmentKind::Neq { other: rhs.clone() },
                    lhs.clone(),
                    None,
                    index,
                ),
                Fragment::new(
                    FragmentKind::Neq { other: lhs.clone() },
                    rhs.clone(),
                    None,
                    index,
                ),
            ],
        };
        sets.push(EquivalentFragmentSet::new(index, fragments));
    }
    trace!(sets = sets.len(), "fragments.sets.built");
    Ok(sets)
}

/// Flattens fragment sets into one list, stamping each fragment with its
/// owning set index. The returned order is deterministic: set order, then
/// generation order within each set.
pub fn flatten(sets: &[EquivalentFragmentSet]) -> Vec<Fragment> {
    let mut fragments = Vec::new();
    for (set_index, set) in sets.iter().enumerate() {
        for fragment in &set.fragments {
            let mut fragment = fragment.clone();
            fragment.assign_set(set_index);
            fragments.push(fragment);
        }
    }
    fragments
}
