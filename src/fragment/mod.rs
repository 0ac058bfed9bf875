//! Fragments: the atomic, physically-executable traversal steps.
//!
//! One logical constraint expands into an [`EquivalentFragmentSet`] of
//! alternative fragments, one per traversal direction. Exactly one member of
//! each set survives into the emitted plan; the arborescence solver makes
//! that choice for edge-like fragments, the linearizer for the rest.

pub mod cost;
pub mod sets;

use smallvec::SmallVec;

use crate::constraint::{Comparison, Operand};
use crate::graph::MiddleKind;
use crate::types::{RoleId, ThingId, TypeId, Value, Var};

pub use sets::EquivalentFragmentSet;

/// Index of a fragment in the flattened per-conjunction fragment list.
pub type FragmentId = usize;

/// The concrete traversal operation a fragment performs.
#[derive(Clone, Debug, PartialEq)]
pub enum FragmentKind {
    /// Index lookup of the type vertices carrying one of the given labels.
    Label {
        /// The resolved type identifiers.
        types: SmallVec<[TypeId; 2]>,
    },
    /// Direct lookup of a concrete element by identifier.
    Id {
        /// The concrete identifier.
        id: ThingId,
    },
    /// Value test on an attribute; indexable only for literal equality.
    Value {
        /// The comparison to evaluate.
        cmp: Comparison,
    },
    /// Fused index probe binding an attribute by `(type, value)` directly.
    AttributeIndex {
        /// The attribute's resolved type.
        attribute_type: TypeId,
        /// The literal value to probe for.
        value: Value,
    },
    /// Inequality check against an already-bound variable.
    Neq {
        /// The variable the start must differ from.
        other: Var,
    },
    /// Instance to its type (cheap upward hop).
    IsaOut {
        /// Whether execution must also check edge-encoded instances.
        needs_edge_check: bool,
    },
    /// Type to its instances (fans out by instance count).
    IsaIn {
        /// Whether execution must also check edge-encoded instances.
        needs_edge_check: bool,
    },
    /// Subtype to supertype (walk up the hierarchy).
    SubOut,
    /// Supertype to its subtypes.
    SubIn,
    /// Relation instance to one of its role players.
    RolePlayerOut {
        /// Role restriction, when the constraint names one.
        role: Option<RoleId>,
        /// Relation types the edge may belong to; empty means unconstrained.
        relation_types: SmallVec<[TypeId; 2]>,
        /// Whether execution must re-check the role at runtime.
        role_checked: bool,
    },
    /// Role player to the relation instances it participates in.
    RolePlayerIn {
        /// Role restriction, when the constraint names one.
        role: Option<RoleId>,
        /// Relation types the edge may belong to; empty means unconstrained.
        relation_types: SmallVec<[TypeId; 2]>,
        /// Whether execution must re-check the role at runtime.
        role_checked: bool,
    },
    /// Owner to one of its attributes.
    HasOut,
    /// Attribute to its owners.
    HasIn,
}

impl FragmentKind {
    /// Short operation name used in logs, explains, and diagnostics.
    pub fn name(&self) -> &'static str {
        match self {
            FragmentKind::Label { .. } => "label",
            FragmentKind::Id { .. } => "id",
            FragmentKind::Value { .. } => "value",
            FragmentKind::AttributeIndex { .. } => "attribute-index",
            FragmentKind::Neq { .. } => "neq",
            FragmentKind::IsaOut { .. } => "isa-out",
            FragmentKind::IsaIn { .. } => "isa-in",
            FragmentKind::SubOut => "sub-out",
            FragmentKind::SubIn => "sub-in",
            FragmentKind::RolePlayerOut { .. } => "role-player-out",
            FragmentKind::RolePlayerIn { .. } => "role-player-in",
            FragmentKind::HasOut => "has-out",
            FragmentKind::HasIn => "has-in",
        }
    }

    /// The synthetic-node kind for fragments that are physical edges.
    pub fn middle_kind(&self) -> Option<MiddleKind> {
        match self {
            FragmentKind::IsaOut { .. } | FragmentKind::IsaIn { .. } => Some(MiddleKind::Isa),
            FragmentKind::SubOut | FragmentKind::SubIn => Some(MiddleKind::Sub),
            FragmentKind::RolePlayerOut { .. } | FragmentKind::RolePlayerIn { .. } => {
                Some(MiddleKind::RolePlayer)
            }
            FragmentKind::HasOut | FragmentKind::HasIn => Some(MiddleKind::Has),
            _ => None,
        }
    }
}

/// One directed, physically-executable traversal step.
///
/// Created once per candidate direction of a constraint; immutable except
/// for the cost, which is refined at most once before planning and frozen
/// afterwards.
#[derive(Clone, Debug)]
pub struct Fragment {
    kind: FragmentKind,
    start: Var,
    end: Option<Var>,
    dependencies: SmallVec<[Var; 2]>,
    cost: f64,
    cost_refined: bool,
    /// Index of the originating constraint in the conjunction.
    constraint: usize,
    /// Index of the owning equivalent-fragment set; assigned on flatten.
    set: usize,
}

impl Fragment {
    pub(crate) fn new(kind: FragmentKind, start: Var, end: Option<Var>, constraint: usize) -> Self {
        let mut dependencies = SmallVec::new();
        match &kind {
            FragmentKind::Neq { other } => dependencies.push(other.clone()),
            FragmentKind::Value { cmp } => {
                if let Operand::Variable(other) = &cmp.rhs {
                    dependencies.push(other.clone());
                }
            }
            _ => {}
        }
        Fragment {
            kind,
            start,
            end,
            dependencies,
            cost: 0.0,
            cost_refined: false,
            constraint,
            set: 0,
        }
    }

    /// The operation this fragment performs.
    pub fn kind(&self) -> &FragmentKind {
        &self.kind
    }

    pub(crate) fn kind_mut(&mut self) -> &mut FragmentKind {
        &mut self.kind
    }

    /// The variable this fragment starts from.
    pub fn start(&self) -> &Var {
        &self.start
    }

    /// The variable this fragment ends at, for edge-like fragments.
    pub fn end(&self) -> Option<&Var> {
        self.end.as_ref()
    }

    /// Variables that must be bound before this fragment may run.
    pub fn dependencies(&self) -> &[Var] {
        &self.dependencies
    }

    /// Every variable this fragment mentions: start, end, and dependencies.
    pub fn vars(&self) -> SmallVec<[&Var; 3]> {
        let mut out: SmallVec<[&Var; 3]> = SmallVec::new();
        out.push(&self.start);
        if let Some(end) = &self.end {
            out.push(end);
        }
        for dep in &self.dependencies {
            out.push(dep);
        }
        out
    }

    /// True when this fragment is backed by an index and its cost does not
    /// depend on live statistics.
    pub fn has_fixed_cost(&self) -> bool {
        match &self.kind {
            FragmentKind::Label { .. }
            | FragmentKind::Id { .. }
            | FragmentKind::AttributeIndex { .. } => true,
            FragmentKind::Value { cmp } => cmp.is_indexable_eq(),
            _ => false,
        }
    }

    /// True when this fragment traverses a physical edge and therefore gets
    /// a synthetic middle node in the variable graph.
    pub fn is_edge(&self) -> bool {
        self.end.is_some()
    }

    /// The estimated cost, frozen once planning begins.
    pub fn cost(&self) -> f64 {
        self.cost
    }

    /// Sets the initial cost estimate. Refinement afterwards goes through
    /// [`Fragment::refine_cost`] and happens at most once.
    pub(crate) fn set_base_cost(&mut self, cost: f64) {
        self.cost = cost;
    }

    /// Refines the cost with a statistics-informed estimate. The second and
    /// later refinements are ignored; the first one freezes the value.
    pub(crate) fn refine_cost(&mut self, cost: f64) {
        if self.cost_refined {
            return;
        }
        self.cost = cost;
        self.cost_refined = true;
    }

    /// Index of the originating constraint, for diagnostics.
    pub fn constraint_index(&self) -> usize {
        self.constraint
    }

    /// Index of the owning equivalent-fragment set.
    pub fn set_index(&self) -> usize {
        self.set
    }

    pub(crate) fn assign_set(&mut self, set: usize) {
        self.set = set;
    }

    pub(crate) fn remap_id(&mut self, mapping: &rustc_hash::FxHashMap<ThingId, ThingId>) {
        if let FragmentKind::Id { id } = &mut self.kind {
            if let Some(new) = mapping.get(id) {
                *id = *new;
            }
        }
    }
}
