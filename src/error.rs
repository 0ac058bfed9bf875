#![forbid(unsafe_code)]
#![allow(missing_docs)]

//! Structured planning errors.
//!
//! Every failure is local to one `plan()` call and carries the constraint or
//! variable involved so callers can produce a useful diagnostic. Statistics
//! unavailability is deliberately *not* represented here: the cost model
//! degrades to conservative estimates instead of failing.

use thiserror::Error;

use crate::types::Var;

/// Errors surfaced while planning a query.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum PlanError {
    /// A label name did not resolve against the schema.
    #[error("unknown label '{label}'")]
    UnknownLabel { label: String },
    /// A role name did not resolve against the schema.
    #[error("unknown role '{role}'")]
    UnknownRole { role: String },
    /// A variable cannot be reached from any valid starting fragment.
    #[error("variable '{var}' cannot be reached from any starting point")]
    UnplannableQuery { var: Var },
    /// Required and banned edge sets cannot be satisfied together.
    #[error("contradictory edge constraints: {detail}")]
    ContradictoryEdgeConstraints { detail: String },
    /// A planner invariant was violated; indicates a bug, not bad input.
    #[error("internal planner invariant violated: {0}")]
    Internal(&'static str),
}

impl PlanError {
    /// Returns a machine-readable code for the error variant.
    pub fn code(&self) -> &'static str {
        match self {
            PlanError::UnknownLabel { .. } => "UnknownLabel",
            PlanError::UnknownRole { .. } => "UnknownRole",
            PlanError::UnplannableQuery { .. } => "UnplannableQuery",
            PlanError::ContradictoryEdgeConstraints { .. } => "ContradictoryEdgeConstraints",
            PlanError::Internal(_) => "Internal",
        }
    }
}

/// Convenience alias used throughout the crate.
pub type Result<T> = std::result::Result<T, PlanError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn codes_are_stable() {
        let err = PlanError::UnknownLabel {
            label: "person".into(),
        };
        assert_eq!(err.code(), "UnknownLabel");
        assert_eq!(err.to_string(), "unknown label 'person'");

        let err = PlanError::UnplannableQuery {
            var: Var::named("x"),
        };
        assert_eq!(err.code(), "UnplannableQuery");
        assert!(err.to_string().contains("$x"));
    }
}
