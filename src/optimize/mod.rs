//! Fixed-point rewriting of equivalent fragment sets.
//!
//! Each rule is semantics-preserving and monotonic: it only narrows,
//! removes, or specializes fragment sets compatible with constraints the
//! collection already implies. Applying one rule can expose the
//! precondition of another, so the driver loops until a full pass changes
//! nothing.

pub mod rules;

use tracing::{debug, trace};

use crate::fragment::EquivalentFragmentSet;
use crate::planner::PlannerConfig;
use crate::schema::SchemaProvider;

pub use rules::infer_relation_types;

/// Runs every enabled rewrite rule to a fixed point.
pub fn optimize(
    sets: &mut Vec<EquivalentFragmentSet>,
    schema: &dyn SchemaProvider,
    config: &PlannerConfig,
) {
    let before = sets.len();
    let mut passes = 0usize;
    loop {
        let mut changed = false;
        if config.attribute_index_fusion {
            let applied = rules::attribute_index_fusion(sets, schema);
            if applied {
                trace!(rule = "attribute-index-fusion", "optimise.rule.applied");
            }
            changed |= applied;
        }
        if config.redundant_label_elimination {
            let applied = rules::redundant_label_elimination(sets);
            if applied {
                trace!(rule = "redundant-label-elimination", "optimise.rule.applied");
            }
            changed |= applied;
        }
        if config.subtype_elimination {
            let applied = rules::subtype_elimination(sets, schema);
            if applied {
                trace!(rule = "subtype-elimination", "optimise.rule.applied");
            }
            changed |= applied;
        }
        if config.role_specialization {
            let applied = rules::role_specialization(sets, schema);
            if applied {
                trace!(rule = "role-specialization", "optimise.rule.applied");
            }
            changed |= applied;
        }
        if config.instance_check_skipping {
            let applied = rules::instance_check_skipping(sets, schema);
            if applied {
                trace!(rule = "instance-check-skipping", "optimise.rule.applied");
            }
            changed |= applied;
        }
        passes += 1;
        if !changed {
            break;
        }
    }
    debug!(
        passes,
        sets_before = before,
        sets_after = sets.len(),
        "optimise.done"
    );
}
