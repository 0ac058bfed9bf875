//! Schema and statistics collaborators consumed during planning.
//!
//! The planner never touches storage directly; it sees the schema through
//! [`SchemaProvider`] and cardinality estimates through [`StatsProvider`].
//! Both are read-only for the duration of one planning call, so concurrent
//! planning only requires the providers to be safe for shared reads.

use rustc_hash::{FxHashMap, FxHashSet};

use crate::error::{PlanError, Result};
use crate::types::{RoleId, TypeId};

/// Name-to-identifier resolution and type-hierarchy queries.
pub trait SchemaProvider {
    /// Resolves a type label to its identifier.
    fn resolve_label(&self, name: &str) -> Result<TypeId>;
    /// Resolves a role name to its identifier.
    fn resolve_role(&self, name: &str) -> Result<RoleId>;
    /// Returns true when `a` is `b` or a (transitive) subtype of `b`.
    fn is_subtype(&self, a: TypeId, b: TypeId) -> bool;
    /// All strict transitive subtypes of `t`, in registration order.
    fn subtypes(&self, t: TypeId) -> Vec<TypeId>;
    /// True when instances of `t` may be encoded as edges rather than
    /// vertices, requiring an extra existence check during traversal.
    fn has_edge_instances(&self, t: TypeId) -> bool;
    /// Relation types in which instances of `player` can participate,
    /// optionally narrowed to one role. Used for relation-type inference.
    fn relations_involving(&self, player: TypeId, role: Option<RoleId>) -> Vec<TypeId>;
}

/// Cardinality estimates backing the cost model.
///
/// Returning `None` means the statistic is unavailable; the cost model then
/// falls back to a conservative default rather than failing the plan.
pub trait StatsProvider {
    /// Expected number of instances of `t`, excluding subtypes.
    fn instance_count(&self, t: TypeId) -> Option<u64>;
    /// Expected number of relation instances of `relation`, optionally
    /// narrowed to those with a player in `role`.
    fn relation_count(&self, relation: TypeId, role: Option<RoleId>) -> Option<u64>;
}

/// Statistics provider that knows nothing; every estimate degrades to the
/// cost model's conservative defaults.
#[derive(Clone, Copy, Debug, Default)]
pub struct NoStats;

impl StatsProvider for NoStats {
    fn instance_count(&self, _t: TypeId) -> Option<u64> {
        None
    }

    fn relation_count(&self, _relation: TypeId, _role: Option<RoleId>) -> Option<u64> {
        None
    }
}

/// In-memory schema used by tests and embedders without a catalog.
#[derive(Default)]
pub struct InMemorySchema {
    labels: FxHashMap<String, TypeId>,
    roles: FxHashMap<String, RoleId>,
    supertype: FxHashMap<TypeId, TypeId>,
    // registration order preserved for deterministic subtype listings
    types_in_order: Vec<TypeId>,
    edge_instances: FxHashSet<TypeId>,
    relates: FxHashMap<TypeId, Vec<RoleId>>,
    plays: FxHashMap<TypeId, Vec<RoleId>>,
    relations_in_order: Vec<TypeId>,
}

impl InMemorySchema {
    /// Creates an empty schema.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a type label with its identifier.
    pub fn with_type(mut self, name: impl Into<String>, id: TypeId) -> Self {
        self.labels.insert(name.into(), id);
        self.types_in_order.push(id);
        self
    }

    /// Registers a role name with its identifier.
    pub fn with_role(mut self, name: impl Into<String>, id: RoleId) -> Self {
        self.roles.insert(name.into(), id);
        self
    }

    /// Declares `sub` a direct subtype of `sup`.
    pub fn with_subtype(mut self, sub: TypeId, sup: TypeId) -> Self {
        self.supertype.insert(sub, sup);
        self
    }

    /// Marks `t` as having edge-encoded instances.
    pub fn with_edge_instances(mut self, t: TypeId) -> Self {
        self.edge_instances.insert(t);
        self
    }

    /// Declares that relation type `relation` relates `role`.
    pub fn with_relates(mut self, relation: TypeId, role: RoleId) -> Self {
        if !self.relations_in_order.contains(&relation) {
            self.relations_in_order.push(relation);
        }
        self.relates.entry(relation).or_default().push(role);
        self
    }

    /// Declares that instances of `player` can play `role`.
    pub fn with_plays(mut self, player: TypeId, role: RoleId) -> Self {
        self.plays.entry(player).or_default().push(role);
        self
    }
}

impl SchemaProvider for InMemorySchema {
    fn resolve_label(&self, name: &str) -> Result<TypeId> {
        self.labels
            .get(name)
            .copied()
            .ok_or_else(|| PlanError::UnknownLabel {
                label: name.to_string(),
            })
    }

    fn resolve_role(&self, name: &str) -> Result<RoleId> {
        self.roles
            .get(name)
            .copied()
            .ok_or_else(|| PlanError::UnknownRole {
                role: name.to_string(),
            })
    }

    fn is_subtype(&self, a: TypeId, b: TypeId) -> bool {
        let mut current = a;
        loop {
            if current == b {
                return true;
            }
            match self.supertype.get(&current) {
                Some(&sup) => current = sup,
                None => return false,
            }
        }
    }

    fn subtypes(&self, t: TypeId) -> Vec<TypeId> {
        self.types_in_order
            .iter()
            .copied()
            .filter(|&candidate| candidate != t && self.is_subtype(candidate, t))
            .collect()
    }

    fn has_edge_instances(&self, t: TypeId) -> bool {
        self.edge_instances.contains(&t)
    }

    fn relations_involving(&self, player: TypeId, role: Option<RoleId>) -> Vec<TypeId> {
        let playable: Vec<RoleId> = match role {
            Some(r) => vec![r],
            None => self.plays.get(&player).cloned().unwrap_or_default(),
        };
        self.relations_in_order
            .iter()
            .copied()
            .filter(|relation| {
                self.relates
                    .get(relation)
                    .map(|roles| roles.iter().any(|r| playable.contains(r)))
                    .unwrap_or(false)
            })
            .collect()
    }
}

/// In-memory statistics used by tests and embedders.
#[derive(Default)]
pub struct InMemoryStats {
    instances: FxHashMap<TypeId, u64>,
    relations: FxHashMap<(TypeId, Option<RoleId>), u64>,
}

impl InMemoryStats {
    /// Creates empty statistics.
    pub fn new() -> Self {
        Self::default()
    }

    /// Records an instance count for `t`.
    pub fn with_instances(mut self, t: TypeId, count: u64) -> Self {
        self.instances.insert(t, count);
        self
    }

    /// Records a relation count for `(relation, role)`.
    pub fn with_relations(mut self, relation: TypeId, role: Option<RoleId>, count: u64) -> Self {
        self.relations.insert((relation, role), count);
        self
    }
}

impl StatsProvider for InMemoryStats {
    fn instance_count(&self, t: TypeId) -> Option<u64> {
        self.instances.get(&t).copied()
    }

    fn relation_count(&self, relation: TypeId, role: Option<RoleId>) -> Option<u64> {
        self.relations
            .get(&(relation, role))
            .or_else(|| self.relations.get(&(relation, None)))
            .copied()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unknown_label_is_an_error() {
        let schema = InMemorySchema::new().with_type("person", TypeId(1));
        assert_eq!(schema.resolve_label("person").unwrap(), TypeId(1));
        assert!(matches!(
            schema.resolve_label("martian"),
            Err(PlanError::UnknownLabel { .. })
        ));
    }

    #[test]
    fn subtyping_is_reflexive_and_transitive() {
        let schema = InMemorySchema::new()
            .with_type("entity", TypeId(1))
            .with_type("person", TypeId(2))
            .with_type("child", TypeId(3))
            .with_subtype(TypeId(2), TypeId(1))
            .with_subtype(TypeId(3), TypeId(2));
        assert!(schema.is_subtype(TypeId(2), TypeId(2)));
        assert!(schema.is_subtype(TypeId(3), TypeId(1)));
        assert!(!schema.is_subtype(TypeId(1), TypeId(3)));
        assert_eq!(schema.subtypes(TypeId(1)), vec![TypeId(2), TypeId(3)]);
    }

    #[test]
    fn relations_involving_narrows_by_role() {
        let schema = InMemorySchema::new()
            .with_type("employment", TypeId(10))
            .with_type("friendship", TypeId(11))
            .with_role("employee", RoleId(1))
            .with_role("friend", RoleId(2))
            .with_relates(TypeId(10), RoleId(1))
            .with_relates(TypeId(11), RoleId(2))
            .with_plays(TypeId(5), RoleId(1))
            .with_plays(TypeId(5), RoleId(2));
        assert_eq!(
            schema.relations_involving(TypeId(5), Some(RoleId(1))),
            vec![TypeId(10)]
        );
        assert_eq!(
            schema.relations_involving(TypeId(5), None),
            vec![TypeId(10), TypeId(11)]
        );
    }
}
