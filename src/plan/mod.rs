//! The executable traversal plan and its serializable explain form.

pub(crate) mod linearize;

use rustc_hash::FxHashMap;
use serde::Serialize;
use xxhash_rust::xxh64::Xxh64;

use crate::constraint::Operand;
use crate::fragment::{Fragment, FragmentKind};
use crate::types::ThingId;

/// An ordered list of disjunctive branches, each an ordered list of
/// fragments, produced fresh for each planned query and immutable once
/// built. `complexity` is the aggregate estimated cost used to compare
/// candidate plans; the lowest-complexity plan wins.
#[derive(Clone, Debug)]
pub struct TraversalPlan {
    branches: Vec<Vec<Fragment>>,
    complexity: f64,
    plan_hash: u64,
}

impl TraversalPlan {
    pub(crate) fn new(branches: Vec<Vec<Fragment>>) -> Self {
        let complexity = branches
            .iter()
            .flat_map(|branch| branch.iter())
            .map(Fragment::cost)
            .sum();
        let plan_hash = compute_plan_hash(&branches);
        Self {
            branches,
            complexity,
            plan_hash,
        }
    }

    /// The ordered branches. The executor must process fragments strictly in
    /// the given order per branch and union results across branches.
    pub fn branches(&self) -> &[Vec<Fragment>] {
        &self.branches
    }

    /// Aggregate estimated cost across all branches.
    pub fn complexity(&self) -> f64 {
        self.complexity
    }

    /// Deterministic hash of the plan shape. Identifier literals are
    /// excluded, so plans differing only in substituted identifiers share a
    /// hash and a cached plan shape can be reused via [`Self::transform`].
    pub fn plan_hash(&self) -> u64 {
        self.plan_hash
    }

    /// Remaps concrete identifiers into the plan without re-planning.
    /// Fragment ordering, costs, complexity, and the plan hash all carry
    /// over; only the substituted identifiers differ.
    pub fn transform(&self, mapping: &FxHashMap<ThingId, ThingId>) -> TraversalPlan {
        let branches = self
            .branches
            .iter()
            .map(|branch| {
                branch
                    .iter()
                    .map(|fragment| {
                        let mut fragment = fragment.clone();
                        fragment.remap_id(mapping);
                        fragment
                    })
                    .collect()
            })
            .collect();
        TraversalPlan::new(branches)
    }

    /// Renders the plan as a serializable explain tree.
    pub fn explain(&self) -> PlanExplain {
        PlanExplain {
            branches: self
                .branches
                .iter()
                .map(|branch| {
                    branch
                        .iter()
                        .map(|fragment| ExplainFragment {
                            op: fragment.kind().name().to_string(),
                            start: fragment.start().to_string(),
                            end: fragment.end().map(|v| v.to_string()),
                            cost: fragment.cost(),
                        })
                        .collect()
                })
                .collect(),
            complexity: self.complexity,
            plan_hash: self.plan_hash,
        }
    }
}

/// Serializable explain output for a plan.
#[derive(Clone, Debug, Serialize)]
pub struct PlanExplain {
    /// One entry per disjunctive branch, fragments in execution order.
    pub branches: Vec<Vec<ExplainFragment>>,
    /// Aggregate estimated cost.
    pub complexity: f64,
    /// Deterministic plan-shape hash.
    pub plan_hash: u64,
}

impl PlanExplain {
    /// Renders the explain output as a JSON value.
    pub fn to_json(&self) -> serde_json::Value {
        serde_json::to_value(self).unwrap_or(serde_json::Value::Null)
    }
}

/// One fragment in the explain output.
#[derive(Clone, Debug, Serialize)]
pub struct ExplainFragment {
    /// The operation name.
    pub op: String,
    /// The starting variable.
    pub start: String,
    /// The ending variable, for edge fragments.
    pub end: Option<String>,
    /// The frozen cost estimate.
    pub cost: f64,
}

fn compute_plan_hash(branches: &[Vec<Fragment>]) -> u64 {
    let mut hasher = Xxh64::new(0);
    for branch in branches {
        hasher.update(b"|branch");
        for fragment in branch {
            hash_fragment(&mut hasher, fragment);
        }
    }
    hasher.digest()
}

/// Hashes the shape of one fragment. Concrete identifiers and literal
/// values are deliberately excluded so a transformed plan keeps its hash.
fn hash_fragment(hasher: &mut Xxh64, fragment: &Fragment) {
    hasher.update(fragment.kind().name().as_bytes());
    hasher.update(fragment.start().to_string().as_bytes());
    if let Some(end) = fragment.end() {
        hasher.update(end.to_string().as_bytes());
    }
    for dep in fragment.dependencies() {
        hasher.update(dep.to_string().as_bytes());
    }
    match fragment.kind() {
        FragmentKind::Label { types } => {
            for t in types {
                hasher.update(&t.0.to_le_bytes());
            }
        }
        FragmentKind::AttributeIndex { attribute_type, .. } => {
            hasher.update(&attribute_type.0.to_le_bytes());
        }
        FragmentKind::Value { cmp } => {
            hasher.update(format!("{:?}", cmp.op).as_bytes());
            if let Operand::Variable(var) = &cmp.rhs {
                hasher.update(var.to_string().as_bytes());
            }
        }
        FragmentKind::RolePlayerOut {
            role,
            relation_types,
            role_checked,
        }
        | FragmentKind::RolePlayerIn {
            role,
            relation_types,
            role_checked,
        } => {
            if let Some(role) = role {
                hasher.update(&role.0.to_le_bytes());
            }
            for t in relation_types {
                hasher.update(&t.0.to_le_bytes());
            }
            hasher.update(&[*role_checked as u8]);
        }
        FragmentKind::IsaOut { needs_edge_check } | FragmentKind::IsaIn { needs_edge_check } => {
            hasher.update(&[*needs_edge_check as u8]);
        }
        _ => {}
    }
}
